//! Pending new-allocation rows of a fulfillment session.
//!
//! A pending row stages a quantity for one (article, po) towards a package
//! number. Rows become draft allocations only when the session commits them.

use collo_core::RowId;

use crate::error::AllocationError;
use crate::ledger::AllocationLedger;
use crate::model::{AllocationKey, DraftAllocation, PackageNumber};
use crate::residual::{ensure_within_residual, residual};
use crate::sequencer::{Assignment, PackageSequencer, Reservations};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRow {
    pub id: RowId,
    pub key: AllocationKey,
    pub quantity: u64,
    pub package: PackageNumber,
}

/// Two pending rows collapsed into one after a package change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    pub kept: RowId,
    pub discarded: RowId,
    /// Quantity of the kept row after the merge.
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageChange {
    pub assignment: Assignment,
    pub merge: Option<Merge>,
}

#[derive(Debug, Clone, Default)]
pub struct PendingRows {
    rows: Vec<PendingRow>,
}

impl PendingRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingRow> + '_ {
        self.rows.iter()
    }

    pub fn get(&self, id: RowId) -> Option<&PendingRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Quantities held by open rows, optionally leaving one row out.
    pub fn staged_except(&self, except: Option<RowId>) -> impl Iterator<Item = (&AllocationKey, u64)> + '_ {
        self.rows
            .iter()
            .filter(move |r| Some(r.id) != except)
            .map(|r| (&r.key, r.quantity))
    }

    /// Open a row for `key`, defaulting to the next free package number.
    pub fn open_row(
        &mut self,
        ledger: &AllocationLedger<'_>,
        reservations: &mut Reservations,
        key: AllocationKey,
        quantity: u64,
    ) -> Result<RowId, AllocationError> {
        let left = residual(ledger, &key, None, self.staged_except(None));
        ensure_within_residual(&key, quantity, left)?;

        let id = RowId::new();
        let package = PackageSequencer::from_ledger(ledger).claim_next(reservations, id);
        tracing::debug!(row = %id, %key, quantity, %package, "opened pending row");
        self.rows.push(PendingRow {
            id,
            key,
            quantity,
            package,
        });
        Ok(id)
    }

    pub fn set_quantity(
        &mut self,
        ledger: &AllocationLedger<'_>,
        id: RowId,
        quantity: u64,
    ) -> Result<(), AllocationError> {
        let key = self.get(id).ok_or(AllocationError::UnknownRow(id))?.key.clone();
        let left = residual(ledger, &key, None, self.staged_except(Some(id)));
        ensure_within_residual(&key, quantity, left)?;

        if let Some(row) = self.rows.iter_mut().find(|r| r.id == id) {
            row.quantity = quantity;
        }
        Ok(())
    }

    /// Move a row to `proposed`.
    ///
    /// A rejected proposal is not an error: the row snaps to its fallback and
    /// the violation travels in the returned assignment. Moving onto an
    /// existing package that another row already targets for the same key
    /// merges the two rows; the other row survives.
    pub fn set_package(
        &mut self,
        ledger: &AllocationLedger<'_>,
        reservations: &mut Reservations,
        id: RowId,
        proposed: PackageNumber,
    ) -> Result<PackageChange, AllocationError> {
        let index = self
            .rows
            .iter()
            .position(|r| r.id == id)
            .ok_or(AllocationError::UnknownRow(id))?;

        let assignment = PackageSequencer::from_ledger(ledger).assign(reservations, id, proposed);
        self.rows[index].package = assignment.package();

        let merge = match assignment {
            Assignment::Existing(package) => self.merge_collision(reservations, index, package),
            _ => None,
        };
        Ok(PackageChange { assignment, merge })
    }

    pub fn remove_row(
        &mut self,
        reservations: &mut Reservations,
        id: RowId,
    ) -> Result<PendingRow, AllocationError> {
        let index = self
            .rows
            .iter()
            .position(|r| r.id == id)
            .ok_or(AllocationError::UnknownRow(id))?;
        reservations.release(id);
        Ok(self.rows.remove(index))
    }

    fn merge_collision(
        &mut self,
        reservations: &mut Reservations,
        moved: usize,
        package: PackageNumber,
    ) -> Option<Merge> {
        let moved_id = self.rows[moved].id;
        let other = self.rows.iter().position(|r| {
            r.id != moved_id && r.package == package && r.key == self.rows[moved].key
        })?;

        let discarded = self.rows.remove(moved);
        reservations.release(discarded.id);
        // `other` shifted down by one if it sat after the removed row.
        let other = if other > moved { other - 1 } else { other };
        let kept = &mut self.rows[other];
        kept.quantity = kept.quantity.saturating_add(discarded.quantity);

        tracing::debug!(kept = %kept.id, discarded = %discarded.id, %package, quantity = kept.quantity, "merged pending rows");
        Some(Merge {
            kept: kept.id,
            discarded: discarded.id,
            quantity: kept.quantity,
        })
    }

    /// The draft allocations that result from committing every pending row
    /// on top of `base`: quantities are summed into a matching row, else a new
    /// unconfirmed row is appended.
    pub fn merged_into(&self, base: &[DraftAllocation]) -> Vec<DraftAllocation> {
        let mut next = base.to_vec();
        for row in &self.rows {
            match next
                .iter_mut()
                .find(|a| a.has_key(&row.key) && a.package_number == row.package)
            {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(row.quantity),
                None => next.push(DraftAllocation::new(row.key.clone(), row.quantity, row.package)),
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Confirmations, OrderLine};
    use crate::sequencer::SequenceViolation;

    fn pkg(n: u32) -> PackageNumber {
        PackageNumber::new(n).unwrap()
    }

    fn key() -> AllocationKey {
        AllocationKey::new("SKU1", "PO1")
    }

    fn lines() -> Vec<OrderLine> {
        vec![OrderLine::new("PO1", "SKU1", 10), OrderLine::new("PO1", "SKU2", 4)]
    }

    fn base() -> Vec<DraftAllocation> {
        vec![
            DraftAllocation::new(key(), 2, pkg(1)),
            DraftAllocation::new(AllocationKey::new("SKU2", "PO1"), 1, pkg(2)),
        ]
    }

    #[test]
    fn rows_open_on_distinct_new_packages() {
        let order_lines = lines();
        let allocations = base();
        let confirmations = Confirmations::new();
        let ledger = AllocationLedger::new(&order_lines, &[], &allocations, &confirmations);
        let mut reservations = Reservations::new();
        let mut rows = PendingRows::new();

        let a = rows.open_row(&ledger, &mut reservations, key(), 1).unwrap();
        let b = rows.open_row(&ledger, &mut reservations, key(), 1).unwrap();
        assert_eq!(rows.get(a).unwrap().package, pkg(3));
        assert_eq!(rows.get(b).unwrap().package, pkg(4));
        assert_eq!(reservations.len(), 2);
    }

    #[test]
    fn open_row_counts_other_pending_rows_against_residual() {
        let order_lines = lines();
        let allocations = base();
        let confirmations = Confirmations::new();
        let ledger = AllocationLedger::new(&order_lines, &[], &allocations, &confirmations);
        let mut reservations = Reservations::new();
        let mut rows = PendingRows::new();

        rows.open_row(&ledger, &mut reservations, key(), 5).unwrap();
        // 10 ordered, 2 drafted, 5 staged.
        assert_eq!(
            rows.open_row(&ledger, &mut reservations, key(), 4),
            Err(AllocationError::ExceedsResidual {
                key: key(),
                requested: 4,
                residual: 3,
            })
        );
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn set_quantity_excludes_own_row_from_staged() {
        let order_lines = lines();
        let allocations = base();
        let confirmations = Confirmations::new();
        let ledger = AllocationLedger::new(&order_lines, &[], &allocations, &confirmations);
        let mut reservations = Reservations::new();
        let mut rows = PendingRows::new();

        let id = rows.open_row(&ledger, &mut reservations, key(), 5).unwrap();
        rows.set_quantity(&ledger, id, 8).unwrap();
        assert_eq!(rows.get(id).unwrap().quantity, 8);
        assert!(rows.set_quantity(&ledger, id, 9).is_err());
        assert_eq!(rows.get(id).unwrap().quantity, 8);
    }

    #[test]
    fn moving_onto_a_shared_existing_package_merges_rows() {
        let order_lines = lines();
        let allocations = base();
        let confirmations = Confirmations::new();
        let ledger = AllocationLedger::new(&order_lines, &[], &allocations, &confirmations);
        let mut reservations = Reservations::new();
        let mut rows = PendingRows::new();

        let a = rows.open_row(&ledger, &mut reservations, key(), 2).unwrap();
        let b = rows.open_row(&ledger, &mut reservations, key(), 3).unwrap();

        let first = rows.set_package(&ledger, &mut reservations, a, pkg(1)).unwrap();
        assert_eq!(first.assignment, Assignment::Existing(pkg(1)));
        assert_eq!(first.merge, None);

        let second = rows.set_package(&ledger, &mut reservations, b, pkg(1)).unwrap();
        assert_eq!(
            second.merge,
            Some(Merge {
                kept: a,
                discarded: b,
                quantity: 5,
            })
        );
        assert_eq!(rows.len(), 1);
        assert!(reservations.is_empty());

        let next = rows.merged_into(&allocations);
        let pkg1: Vec<u64> = next
            .iter()
            .filter(|r| r.package_number == pkg(1) && r.has_key(&key()))
            .map(|r| r.quantity)
            .collect();
        assert_eq!(pkg1, vec![7]);
        assert!(ledger.validate_next(&next, &confirmations).is_ok());
    }

    #[test]
    fn rejected_package_snaps_back_without_error() {
        let order_lines = lines();
        let allocations = base();
        let mut confirmations = Confirmations::new();
        confirmations.set(pkg(1), true);
        let ledger = AllocationLedger::new(&order_lines, &[], &allocations, &confirmations);
        let mut reservations = Reservations::new();
        let mut rows = PendingRows::new();

        let id = rows.open_row(&ledger, &mut reservations, key(), 1).unwrap();
        let change = rows.set_package(&ledger, &mut reservations, id, pkg(1)).unwrap();
        assert_eq!(
            change.assignment.violation(),
            Some(SequenceViolation::AlreadyConfirmed(pkg(1)))
        );
        assert_eq!(rows.get(id).unwrap().package, pkg(3));
        assert_eq!(reservations.get(id), Some(pkg(3)));
    }

    #[test]
    fn removing_a_row_releases_its_reservation() {
        let order_lines = lines();
        let allocations = base();
        let confirmations = Confirmations::new();
        let ledger = AllocationLedger::new(&order_lines, &[], &allocations, &confirmations);
        let mut reservations = Reservations::new();
        let mut rows = PendingRows::new();

        let a = rows.open_row(&ledger, &mut reservations, key(), 1).unwrap();
        rows.remove_row(&mut reservations, a).unwrap();
        assert!(reservations.is_empty());
        assert_eq!(
            rows.remove_row(&mut reservations, a),
            Err(AllocationError::UnknownRow(a))
        );

        // The freed number is handed out again.
        let b = rows.open_row(&ledger, &mut reservations, key(), 1).unwrap();
        assert_eq!(rows.get(b).unwrap().package, pkg(3));
    }

    #[test]
    fn merged_into_appends_rows_for_new_packages() {
        let order_lines = lines();
        let allocations = base();
        let confirmations = Confirmations::new();
        let ledger = AllocationLedger::new(&order_lines, &[], &allocations, &confirmations);
        let mut reservations = Reservations::new();
        let mut rows = PendingRows::new();

        rows.open_row(&ledger, &mut reservations, AllocationKey::new("SKU2", "PO1"), 2)
            .unwrap();
        let next = rows.merged_into(&allocations);
        assert_eq!(next.len(), 3);
        assert_eq!(next[2].package_number, pkg(3));
        assert!(!next[2].confirmed);
        assert!(ledger.validate_next(&next, &confirmations).is_ok());
    }
}
