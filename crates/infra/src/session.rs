//! Fulfillment session: one operator editing one destination.
//!
//! The session owns every cache of the editing flow (reference data, the
//! adopted snapshot, reservations, pending rows). Exclusive `&mut` access
//! serializes its checked writes.

use chrono::Duration;

use collo_allocation::{
    residual, AllocationError, AllocationKey, AllocationLedger, Confirmations, DraftAllocation,
    PackageChange, PackageNumber, PackageSequencer, PackageState, PendingRow, PendingRows,
    Reservations, Snapshot,
};
use collo_core::{DestinationId, OperatorId, RowId};

use crate::cache::{ReferenceCache, ReferenceSet};
use crate::editor::PackageEditor;
use crate::notice::{Notice, NoticeSink};
use crate::reference::ReferenceData;
use crate::synchronizer::{SaveMode, SaveOutcome, WipSynchronizer};
use crate::wip_store::{WipStore, WipStoreError};

static NO_REFERENCE: ReferenceSet = ReferenceSet {
    order_lines: Vec::new(),
    historical: Vec::new(),
};

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Refetch reference data once the cached copy is older than this.
    pub reference_max_age: Option<Duration>,
}

pub struct FulfillmentSession<S, N> {
    pub(crate) sync: WipSynchronizer<S>,
    pub(crate) notices: N,
    pub(crate) reservations: Reservations,
    pub(crate) pending: PendingRows,
    config: SessionConfig,
    cache: ReferenceCache,
}

impl<S, N> FulfillmentSession<S, N>
where
    S: WipStore + ReferenceData,
    N: NoticeSink,
{
    pub fn open(
        store: S,
        destination: DestinationId,
        operator: OperatorId,
        config: SessionConfig,
        notices: N,
    ) -> Result<Self, WipStoreError> {
        let sync = WipSynchronizer::open(store, destination, operator)?;
        let mut session = Self {
            sync,
            notices,
            reservations: Reservations::new(),
            pending: PendingRows::new(),
            config,
            cache: ReferenceCache::new(),
        };
        session.refresh_reference()?;
        tracing::info!(%destination, %operator, "fulfillment session opened");
        Ok(session)
    }

    pub fn destination(&self) -> DestinationId {
        self.sync.destination()
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.sync.snapshot()
    }

    pub fn reference(&self) -> &ReferenceSet {
        self.cache.get(None).unwrap_or(&NO_REFERENCE)
    }

    pub fn pending_rows(&self) -> impl Iterator<Item = &PendingRow> + '_ {
        self.pending.iter()
    }

    pub fn reservations(&self) -> &Reservations {
        &self.reservations
    }

    pub fn refresh(&mut self) -> Result<(), WipStoreError> {
        self.sync.refresh()?;
        self.prune_reservations();
        Ok(())
    }

    pub fn refresh_reference(&mut self) -> Result<(), WipStoreError> {
        let destination = self.sync.destination();
        let order_lines = self.sync.store().order_lines(destination)?;
        let historical = self.sync.store().historical_allocations(destination)?;
        tracing::debug!(%destination, lines = order_lines.len(), "reference data loaded");
        self.cache.set(ReferenceSet {
            order_lines,
            historical,
        });
        Ok(())
    }

    /// Refetch reference data when the cached copy went stale. A failed
    /// refetch keeps the stale copy and emits a notice.
    fn ensure_reference(&mut self) {
        if self.cache.get(self.config.reference_max_age).is_some() {
            return;
        }
        if let Err(err) = self.refresh_reference() {
            self.notices.notify(Notice::Retryable(err.to_string()));
        }
    }

    pub fn ledger(&self) -> AllocationLedger<'_> {
        let reference = self.reference();
        AllocationLedger::from_snapshot(&reference.order_lines, &reference.historical, self.sync.snapshot())
    }

    pub fn sequencer(&self) -> PackageSequencer {
        PackageSequencer::from_ledger(&self.ledger())
    }

    /// Residual of `key`, net of every pending row.
    pub fn residual(&self, key: &AllocationKey, excluding_package: Option<PackageNumber>) -> u64 {
        residual(&self.ledger(), key, excluding_package, self.pending.staged_except(None))
    }

    pub fn next_required(&self) -> PackageNumber {
        self.sequencer().next_required(&self.reservations)
    }

    pub fn max_continuous(&self) -> u32 {
        self.sequencer().max_continuous()
    }

    pub fn package_state(&self, package: PackageNumber) -> PackageState {
        self.ledger().package_state(package)
    }

    pub fn open_row(&mut self, key: AllocationKey, quantity: u64) -> Result<RowId, AllocationError> {
        self.ensure_writable()?;
        self.ensure_reference();
        let ledger = {
            let reference = self.cache.get(None).unwrap_or(&NO_REFERENCE);
            AllocationLedger::from_snapshot(&reference.order_lines, &reference.historical, self.sync.snapshot())
        };
        let result = self.pending.open_row(&ledger, &mut self.reservations, key, quantity);
        self.alert_on_err(result)
    }

    pub fn set_row_quantity(&mut self, row: RowId, quantity: u64) -> Result<(), AllocationError> {
        self.ensure_writable()?;
        let reference = self.cache.get(None).unwrap_or(&NO_REFERENCE);
        let ledger =
            AllocationLedger::from_snapshot(&reference.order_lines, &reference.historical, self.sync.snapshot());
        let result = self.pending.set_quantity(&ledger, row, quantity);
        self.alert_on_err(result)
    }

    /// Repoint a pending row. Rejections snap the row back and raise an alert.
    pub fn set_row_package(&mut self, row: RowId, proposed: PackageNumber) -> Result<PackageChange, AllocationError> {
        self.ensure_writable()?;
        let reference = self.cache.get(None).unwrap_or(&NO_REFERENCE);
        let ledger =
            AllocationLedger::from_snapshot(&reference.order_lines, &reference.historical, self.sync.snapshot());
        let change = self
            .pending
            .set_package(&ledger, &mut self.reservations, row, proposed);
        let change = self.alert_on_err(change)?;

        if let Some(violation) = change.assignment.violation() {
            self.notices
                .notify(Notice::alert(&AllocationError::Sequence(violation)));
        }
        if let Some(merge) = change.merge {
            self.notices.notify(Notice::Info(format!(
                "rows merged into package {} (quantity {})",
                change.assignment.package(),
                merge.quantity
            )));
        }
        Ok(change)
    }

    pub fn remove_row(&mut self, row: RowId) -> Result<PendingRow, AllocationError> {
        self.ensure_writable()?;
        let result = self.pending.remove_row(&mut self.reservations, row);
        self.alert_on_err(result)
    }

    /// Commit every pending row with one checked save.
    pub fn commit_rows(&mut self) -> Result<SaveOutcome, AllocationError> {
        self.ensure_writable()?;
        if self.pending.is_empty() {
            return Ok(SaveOutcome::Saved);
        }

        let next = self.pending.merged_into(&self.sync.snapshot().allocations);
        let confirmations = self.sync.snapshot().confirmations.clone();
        self.alert_on_err(self.ledger().validate_next(&next, &confirmations))?;

        let row_ids: Vec<RowId> = self.pending.iter().map(|r| r.id).collect();
        let outcome = self.sync.save(next, confirmations, SaveMode::Checked);
        if outcome.is_saved() {
            for id in row_ids {
                self.reservations.release(id);
            }
            self.pending.clear();
        }
        self.settle(&outcome);
        Ok(outcome)
    }

    pub fn confirm_package(&mut self, package: PackageNumber) -> Result<SaveOutcome, AllocationError> {
        self.set_confirmed(package, true)
    }

    pub fn unconfirm_package(&mut self, package: PackageNumber) -> Result<SaveOutcome, AllocationError> {
        self.set_confirmed(package, false)
    }

    fn set_confirmed(&mut self, package: PackageNumber, confirmed: bool) -> Result<SaveOutcome, AllocationError> {
        self.ensure_writable()?;
        let state = self.package_state(package);
        if state == PackageState::Absent {
            return self.alert_on_err(Err(AllocationError::UnknownPackage(package)));
        }
        if state.is_locked() == confirmed {
            return Ok(SaveOutcome::Saved);
        }

        let snapshot = self.sync.snapshot();
        let mut confirmations = snapshot.confirmations.clone();
        confirmations.set(package, confirmed);
        let next: Vec<DraftAllocation> = snapshot
            .allocations
            .iter()
            .cloned()
            .map(|mut row| {
                if row.package_number == package {
                    row.confirmed = confirmed;
                }
                row
            })
            .collect();
        self.alert_on_err(self.ledger().validate_next(&next, &confirmations))?;

        let outcome = self.sync.save(next, confirmations, SaveMode::Checked);
        self.settle(&outcome);
        Ok(outcome)
    }

    /// Remove a package (rows and confirmation entry) with a checked save.
    pub fn delete_package(&mut self, package: PackageNumber) -> Result<SaveOutcome, AllocationError> {
        self.ensure_writable()?;
        match self.package_state(package) {
            PackageState::Absent => return self.alert_on_err(Err(AllocationError::UnknownPackage(package))),
            PackageState::Confirmed => return self.alert_on_err(Err(AllocationError::PackageLocked(package))),
            PackageState::Draft => {}
        }

        let (next, confirmations) = without_package(self.sync.snapshot(), package);
        self.alert_on_err(self.ledger().validate_next(&next, &confirmations))?;

        let outcome = self.sync.save(next, confirmations, SaveMode::Checked);
        self.settle(&outcome);
        Ok(outcome)
    }

    pub fn reset(&mut self) -> Result<SaveOutcome, AllocationError> {
        self.ensure_writable()?;
        let outcome = self.sync.reset();
        if outcome.is_saved() {
            self.pending.clear();
            self.reservations.clear();
        }
        self.settle(&outcome);
        Ok(outcome)
    }

    pub fn confirm_batch(&mut self) -> Result<SaveOutcome, AllocationError> {
        self.ensure_writable()?;
        let outcome = self.sync.confirm_batch();
        self.after_batch(&outcome);
        Ok(outcome)
    }

    /// Finalize the destination; every package must be confirmed first.
    pub fn close(&mut self) -> Result<SaveOutcome, AllocationError> {
        self.ensure_writable()?;
        let ledger = self.ledger();
        let confirmed = ledger.confirmed_packages();
        if let Some(open) = ledger.existing_packages().into_iter().find(|p| !confirmed.contains(p)) {
            return self.alert_on_err(Err(AllocationError::NotConfirmed(open)));
        }

        let outcome = self.sync.close();
        self.after_batch(&outcome);
        Ok(outcome)
    }

    /// Open the package editor on `package`.
    ///
    /// A confirmed package opens read-only. An existing package must lie
    /// within the contiguous prefix (+1); a new one must be the next
    /// required number and is reserved for the editor.
    pub fn open_package(&mut self, package: PackageNumber) -> Result<PackageEditor<'_, S, N>, AllocationError> {
        self.ensure_reference();
        let state = self.package_state(package);
        if state != PackageState::Confirmed {
            self.ensure_writable()?;
            let check = self.sequencer().check_open(&self.reservations, package);
            self.alert_on_err(check.map_err(AllocationError::from))?;
        }
        Ok(PackageEditor::new(self, package, state))
    }

    fn after_batch(&mut self, outcome: &SaveOutcome) {
        if outcome.is_saved() {
            // History changed under the cached reference data.
            if let Err(err) = self.refresh_reference() {
                self.notices.notify(Notice::Retryable(err.to_string()));
            }
        }
        self.settle(outcome);
    }

    pub(crate) fn ensure_writable(&self) -> Result<(), AllocationError> {
        if self.sync.snapshot().closed {
            return self.alert_on_err(Err(AllocationError::DestinationClosed));
        }
        Ok(())
    }

    /// Apply the session-wide consequences of a save outcome.
    pub(crate) fn settle(&mut self, outcome: &SaveOutcome) {
        match outcome {
            SaveOutcome::Saved => self.prune_reservations(),
            SaveOutcome::Conflict => {
                self.pending.clear();
                self.reservations.clear();
                self.notices.notify(Notice::UpdatedElsewhere);
            }
            SaveOutcome::Failed(err) => self.notices.notify(Notice::Retryable(err.to_string())),
        }
    }

    /// Save a next state built from the freshly fetched snapshot, re-validated
    /// against that snapshot before anything is written.
    pub(crate) fn save_revalidated(
        &mut self,
        mode: SaveMode,
        build: impl FnOnce(&Snapshot) -> (Vec<DraftAllocation>, Confirmations),
    ) -> Result<SaveOutcome, AllocationError> {
        let reference = self.cache.get(None).unwrap_or(&NO_REFERENCE);
        let result = self.sync.save_with(mode, |fresh| {
            let (next, confirmations) = build(fresh);
            AllocationLedger::from_snapshot(&reference.order_lines, &reference.historical, fresh)
                .validate_next(&next, &confirmations)?;
            Ok((next, confirmations))
        });

        match &result {
            Ok(outcome) => self.settle(outcome),
            Err(err) => {
                tracing::debug!(error = %err, "next state refused against latest wip");
                self.prune_reservations();
                self.notices.notify(Notice::alert(err));
            }
        }
        result
    }

    pub(crate) fn alert_on_err<T>(&self, result: Result<T, AllocationError>) -> Result<T, AllocationError> {
        if let Err(err) = &result {
            tracing::debug!(error = %err, "validation rejected");
            self.notices.notify(Notice::alert(err));
        }
        result
    }

    fn prune_reservations(&mut self) {
        let existing = self.ledger().existing_packages();
        let pruned = self.reservations.prune_existing(&existing);
        if !pruned.is_empty() {
            tracing::debug!(count = pruned.len(), "pruned reservations of existing packages");
        }
    }
}

/// Draft state with every row and the confirmation entry of `package` removed.
pub(crate) fn without_package(snapshot: &Snapshot, package: PackageNumber) -> (Vec<DraftAllocation>, Confirmations) {
    let rows = snapshot
        .allocations
        .iter()
        .filter(|r| r.package_number != package)
        .cloned()
        .collect();
    let mut confirmations = snapshot.confirmations.clone();
    confirmations.remove(package);
    (rows, confirmations)
}
