//! Package editor: add, remove and re-quantify the rows of one package.
//!
//! The editor keeps a working copy of its package's rows. Each accepted
//! change is silently autosaved; `save_package` performs the final checked
//! save. A confirmed package opens read-only and every mutation is rejected
//! locally.

use collo_allocation::{
    ensure_within_residual, residual, AllocationError, AllocationKey, Confirmations, DraftAllocation,
    PackageNumber, PackageState, Snapshot,
};
use collo_core::RowId;

use crate::notice::NoticeSink;
use crate::reference::ReferenceData;
use crate::session::{without_package, FulfillmentSession};
use crate::synchronizer::{SaveMode, SaveOutcome};
use crate::wip_store::WipStore;

/// Result of `PackageEditor::delete_row`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRemoval {
    Removed(SaveOutcome),
    /// The row is the package's last one: delete the whole package instead.
    PromptDeletePackage,
}

pub struct PackageEditor<'s, S, N>
where
    S: WipStore + ReferenceData,
    N: NoticeSink,
{
    session: &'s mut FulfillmentSession<S, N>,
    package: PackageNumber,
    /// Reservation holder while the package does not exist yet.
    holder: RowId,
    rows: Vec<DraftAllocation>,
    read_only: bool,
    delete_armed: bool,
}

impl<'s, S, N> PackageEditor<'s, S, N>
where
    S: WipStore + ReferenceData,
    N: NoticeSink,
{
    pub(crate) fn new(
        session: &'s mut FulfillmentSession<S, N>,
        package: PackageNumber,
        state: PackageState,
    ) -> Self {
        let holder = RowId::new();
        if state == PackageState::Absent {
            session.reservations.reserve(holder, package);
        }
        let rows = package_rows(session.snapshot(), package);
        tracing::debug!(%package, ?state, rows = rows.len(), "package editor opened");
        Self {
            session,
            package,
            holder,
            rows,
            read_only: state.is_locked(),
            delete_armed: false,
        }
    }

    pub fn package(&self) -> PackageNumber {
        self.package
    }

    pub fn rows(&self) -> &[DraftAllocation] {
        &self.rows
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_delete_armed(&self) -> bool {
        self.delete_armed
    }

    /// Quantity of `key` still assignable to this package.
    pub fn available(&self, key: &AllocationKey) -> u64 {
        self.limit(key).saturating_sub(self.quantity_of(key))
    }

    /// Scan or type a code: add one unit of the matching order line.
    pub fn add_by_code(&mut self, code: &str) -> Result<SaveOutcome, AllocationError> {
        self.ensure_mutable()?;

        let mut first_match = None;
        let mut chosen = None;
        for line in self.session.ledger().lines_matching(code) {
            let key = line.key();
            if self.available(&key) > 0 {
                chosen = Some(key);
                break;
            }
            first_match.get_or_insert(key);
        }

        let key = match (chosen, first_match) {
            (Some(key), _) => key,
            (None, Some(key)) => return self.session.alert_on_err(Err(AllocationError::NothingLeft(key))),
            (None, None) => {
                return self
                    .session
                    .alert_on_err(Err(AllocationError::UnknownCode(code.to_string())));
            }
        };

        let mut candidate = self.rows.clone();
        match candidate.iter_mut().find(|r| r.has_key(&key)) {
            Some(row) => row.quantity += 1,
            None => candidate.push(DraftAllocation::new(key, 1, self.package)),
        }
        self.apply(candidate)
    }

    /// Manual quantity entry for an existing row.
    pub fn set_quantity(&mut self, key: &AllocationKey, quantity: u64) -> Result<SaveOutcome, AllocationError> {
        self.ensure_mutable()?;
        self.ensure_row(key)?;
        let limit = self.limit(key);
        self.session
            .alert_on_err(ensure_within_residual(key, quantity, limit))?;

        let mut candidate = self.rows.clone();
        for row in candidate.iter_mut().filter(|r| r.has_key(key)) {
            row.quantity = quantity;
        }
        self.apply(candidate)
    }

    pub fn delete_row(&mut self, key: &AllocationKey) -> Result<RowRemoval, AllocationError> {
        self.ensure_mutable()?;
        self.ensure_row(key)?;
        if self.rows.len() == 1 {
            return Ok(RowRemoval::PromptDeletePackage);
        }

        let candidate: Vec<DraftAllocation> = self.rows.iter().filter(|r| !r.has_key(key)).cloned().collect();
        self.apply(candidate).map(RowRemoval::Removed)
    }

    /// First step of the package delete gesture.
    pub fn arm_delete(&mut self) -> Result<(), AllocationError> {
        self.ensure_mutable()?;
        self.delete_armed = true;
        Ok(())
    }

    /// Second step: remove every row and the confirmation entry (checked).
    pub fn delete_package(&mut self) -> Result<SaveOutcome, AllocationError> {
        if self.read_only {
            return self
                .session
                .alert_on_err(Err(AllocationError::PackageLocked(self.package)));
        }
        if !self.delete_armed {
            return self.session.alert_on_err(Err(AllocationError::DeleteNotArmed));
        }
        self.delete_armed = false;

        if self.session.package_state(self.package) == PackageState::Absent {
            // Never persisted: nothing to send.
            self.rows.clear();
            return Ok(SaveOutcome::Saved);
        }

        let outcome = self.session.delete_package(self.package)?;
        match outcome {
            SaveOutcome::Saved => self.rows.clear(),
            SaveOutcome::Conflict => self.reload(),
            SaveOutcome::Failed(_) => {}
        }
        Ok(outcome)
    }

    /// "Save package": one checked save of the working copy.
    pub fn save_package(&mut self) -> Result<SaveOutcome, AllocationError> {
        if self.read_only {
            return Ok(SaveOutcome::Saved);
        }
        self.session.ensure_writable()?;

        if package_rows(self.session.snapshot(), self.package) == self.rows {
            // Every change already reached the store through autosave.
            return Ok(SaveOutcome::Saved);
        }
        let (next, confirmations) = splice(self.session.snapshot(), self.package, &self.rows);
        self.session
            .alert_on_err(self.session.ledger().validate_next(&next, &confirmations))?;

        self.persist(SaveMode::Checked)
    }

    /// Close the editor, releasing its reservation.
    pub fn close(self) {}

    fn apply(&mut self, candidate: Vec<DraftAllocation>) -> Result<SaveOutcome, AllocationError> {
        self.delete_armed = false;
        let (next, confirmations) = splice(self.session.snapshot(), self.package, &candidate);
        self.session
            .alert_on_err(self.session.ledger().validate_next(&next, &confirmations))?;
        self.rows = candidate;
        self.persist(SaveMode::Silent)
    }

    /// Write the working copy spliced onto the latest snapshot. A refusal
    /// against that snapshot (e.g. the package was confirmed elsewhere)
    /// discards the working copy.
    fn persist(&mut self, mode: SaveMode) -> Result<SaveOutcome, AllocationError> {
        let package = self.package;
        let rows = self.rows.clone();
        match self
            .session
            .save_revalidated(mode, |fresh| splice(fresh, package, &rows))
        {
            Ok(outcome) => {
                if outcome.is_conflict() {
                    self.reload();
                }
                Ok(outcome)
            }
            Err(err) => {
                self.reload();
                Err(err)
            }
        }
    }

    fn ensure_mutable(&mut self) -> Result<(), AllocationError> {
        self.delete_armed = false;
        if self.read_only {
            return self
                .session
                .alert_on_err(Err(AllocationError::PackageLocked(self.package)));
        }
        self.session.ensure_writable()
    }

    fn ensure_row(&self, key: &AllocationKey) -> Result<(), AllocationError> {
        if self.rows.iter().any(|r| r.has_key(key)) {
            return Ok(());
        }
        self.session.alert_on_err(Err(AllocationError::NotInPackage {
            key: key.clone(),
            package: self.package,
        }))
    }

    /// Residual of `key` with this package's stored rows left out.
    fn limit(&self, key: &AllocationKey) -> u64 {
        residual(
            &self.session.ledger(),
            key,
            Some(self.package),
            self.session.pending.staged_except(None),
        )
    }

    fn quantity_of(&self, key: &AllocationKey) -> u64 {
        self.rows.iter().filter(|r| r.has_key(key)).map(|r| r.quantity).sum()
    }

    fn reload(&mut self) {
        self.rows = package_rows(self.session.snapshot(), self.package);
        self.read_only = self.session.package_state(self.package).is_locked();
    }
}

impl<S, N> Drop for PackageEditor<'_, S, N>
where
    S: WipStore + ReferenceData,
    N: NoticeSink,
{
    fn drop(&mut self) {
        self.session.reservations.release(self.holder);
    }
}

fn package_rows(snapshot: &Snapshot, package: PackageNumber) -> Vec<DraftAllocation> {
    snapshot
        .allocations
        .iter()
        .filter(|r| r.package_number == package)
        .cloned()
        .collect()
}

/// `snapshot` with this package's rows replaced by `rows`.
fn splice(snapshot: &Snapshot, package: PackageNumber, rows: &[DraftAllocation]) -> (Vec<DraftAllocation>, Confirmations) {
    let (mut next, mut confirmations) = without_package(snapshot, package);
    let confirmed = snapshot.confirmations.get(package);
    next.extend(rows.iter().cloned().map(|mut row| {
        row.confirmed = confirmed.unwrap_or(false);
        row
    }));
    if let Some(confirmed) = confirmed {
        confirmations.set(package, confirmed);
    }
    (next, confirmations)
}
