use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::AllocationError;
use crate::model::{
    AllocationKey, Confirmations, DraftAllocation, HistoricalAllocation, OrderLine, PackageNumber,
    Snapshot,
};

/// Lifecycle state of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageState {
    Absent,
    Draft,
    Confirmed,
}

impl PackageState {
    pub fn is_locked(self) -> bool {
        matches!(self, PackageState::Confirmed)
    }
}

/// Read-only view over reference data and one draft state.
///
/// Every derived value (existing packages, totals, residuals) is recomputed on
/// demand from the borrowed slices; nothing is memoized.
#[derive(Debug, Clone, Copy)]
pub struct AllocationLedger<'a> {
    order_lines: &'a [OrderLine],
    historical: &'a [HistoricalAllocation],
    allocations: &'a [DraftAllocation],
    confirmations: &'a Confirmations,
}

impl<'a> AllocationLedger<'a> {
    pub fn new(
        order_lines: &'a [OrderLine],
        historical: &'a [HistoricalAllocation],
        allocations: &'a [DraftAllocation],
        confirmations: &'a Confirmations,
    ) -> Self {
        Self {
            order_lines,
            historical,
            allocations,
            confirmations,
        }
    }

    pub fn from_snapshot(
        order_lines: &'a [OrderLine],
        historical: &'a [HistoricalAllocation],
        snapshot: &'a Snapshot,
    ) -> Self {
        Self::new(
            order_lines,
            historical,
            &snapshot.allocations,
            &snapshot.confirmations,
        )
    }

    /// Same reference data over a proposed draft state.
    pub fn with_drafts<'b>(
        &self,
        allocations: &'b [DraftAllocation],
        confirmations: &'b Confirmations,
    ) -> AllocationLedger<'b>
    where
        'a: 'b,
    {
        AllocationLedger::new(self.order_lines, self.historical, allocations, confirmations)
    }

    pub fn order_lines(&self) -> &'a [OrderLine] {
        self.order_lines
    }

    pub fn allocations(&self) -> &'a [DraftAllocation] {
        self.allocations
    }

    pub fn confirmations(&self) -> &'a Confirmations {
        self.confirmations
    }

    /// Order lines whose article code or EAN equals `code`, in order-line order.
    pub fn lines_matching<'c>(&self, code: &'c str) -> impl Iterator<Item = &'a OrderLine> + use<'a, 'c> {
        self.order_lines.iter().filter(move |l| l.matches_code(code))
    }

    pub fn ordered_quantity(&self, key: &AllocationKey) -> u64 {
        self.order_lines
            .iter()
            .filter(|l| l.article_code == key.article_code && l.purchase_order_id == key.purchase_order_id)
            .map(|l| l.ordered_quantity)
            .fold(0, u64::saturating_add)
    }

    pub fn historical_quantity(&self, key: &AllocationKey) -> u64 {
        self.historical
            .iter()
            .filter(|h| h.article_code == key.article_code && h.purchase_order_id == key.purchase_order_id)
            .map(|h| h.quantity)
            .fold(0, u64::saturating_add)
    }

    /// Draft quantity for `key` across all packages except `excluding`.
    pub fn draft_quantity(&self, key: &AllocationKey, excluding: Option<PackageNumber>) -> u64 {
        self.allocations
            .iter()
            .filter(|a| a.has_key(key) && Some(a.package_number) != excluding)
            .map(|a| a.quantity)
            .fold(0, u64::saturating_add)
    }

    /// Packages with at least one row or an explicit confirmation entry.
    pub fn existing_packages(&self) -> BTreeSet<PackageNumber> {
        self.allocations
            .iter()
            .map(|a| a.package_number)
            .chain(self.confirmations.packages())
            .collect()
    }

    /// Confirmed packages. A row flagged confirmed locks its package even if the
    /// confirmation entry is missing.
    pub fn confirmed_packages(&self) -> BTreeSet<PackageNumber> {
        self.confirmations
            .iter()
            .filter_map(|(p, confirmed)| confirmed.then_some(p))
            .chain(
                self.allocations
                    .iter()
                    .filter(|a| a.confirmed)
                    .map(|a| a.package_number),
            )
            .collect()
    }

    pub fn is_confirmed(&self, package: PackageNumber) -> bool {
        self.confirmations.is_confirmed(package)
            || self
                .allocations
                .iter()
                .any(|a| a.package_number == package && a.confirmed)
    }

    pub fn package_exists(&self, package: PackageNumber) -> bool {
        self.confirmations.contains(package)
            || self.allocations.iter().any(|a| a.package_number == package)
    }

    pub fn package_state(&self, package: PackageNumber) -> PackageState {
        if self.is_confirmed(package) {
            PackageState::Confirmed
        } else if self.package_exists(package) {
            PackageState::Draft
        } else {
            PackageState::Absent
        }
    }

    pub fn package_rows(
        &self,
        package: PackageNumber,
    ) -> impl Iterator<Item = &'a DraftAllocation> + use<'a> {
        self.allocations
            .iter()
            .filter(move |a| a.package_number == package)
    }

    /// Validate a proposed next draft state against this (base) state.
    ///
    /// Checks, in order: positive quantities, row uniqueness, conservation per
    /// (article, po), contiguity of newly introduced packages, and immutability
    /// of packages confirmed in the base that stay confirmed.
    pub fn validate_next(
        &self,
        next: &[DraftAllocation],
        next_confirmations: &Confirmations,
    ) -> Result<(), AllocationError> {
        let mut seen = BTreeSet::new();
        let mut totals: BTreeMap<AllocationKey, u64> = BTreeMap::new();
        for row in next {
            if row.quantity == 0 {
                return Err(AllocationError::ZeroQuantity);
            }
            let key = row.key();
            if !seen.insert((key.clone(), row.package_number)) {
                return Err(AllocationError::DuplicateRow {
                    key,
                    package: row.package_number,
                });
            }
            let total = totals.entry(key).or_default();
            *total = total.saturating_add(row.quantity);
        }

        for (key, drafted) in &totals {
            let ordered = self.ordered_quantity(key);
            let allocated = self.historical_quantity(key).saturating_add(*drafted);
            if allocated > ordered {
                return Err(AllocationError::Conservation {
                    key: key.clone(),
                    allocated,
                    ordered,
                });
            }
        }

        let next_ledger = self.with_drafts(next, next_confirmations);
        let base_existing = self.existing_packages();
        let next_existing = next_ledger.existing_packages();
        for package in next_existing.difference(&base_existing) {
            if let Some(missing) = package.previous() {
                if !next_existing.contains(&missing) {
                    return Err(AllocationError::Contiguity {
                        package: *package,
                        missing,
                    });
                }
            }
        }

        for package in self.confirmed_packages() {
            // An explicit `false` is an unconfirm; anything else keeps the lock.
            if next_confirmations.get(package) == Some(false) {
                continue;
            }
            if next_confirmations.get(package) != Some(true)
                || row_quantities(self.package_rows(package)) != row_quantities(next_ledger.package_rows(package))
            {
                return Err(AllocationError::PackageLocked(package));
            }
        }

        Ok(())
    }
}

fn row_quantities<'r>(rows: impl Iterator<Item = &'r DraftAllocation>) -> BTreeMap<AllocationKey, u64> {
    rows.map(|r| (r.key(), r.quantity)).collect()
}
