use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::Utc;

use collo_allocation::{
    AllocationLedger, Confirmations, DraftAllocation, HistoricalAllocation, OrderLine, PackageNumber,
    Snapshot,
};
use collo_core::{DestinationId, OperatorId};

use super::r#trait::{WipStore, WipStoreError, WipWrite};
use crate::reference::ReferenceData;

#[derive(Debug, Clone, Default)]
struct DestinationState {
    snapshot: Snapshot,
    order_lines: Vec<OrderLine>,
    historical: Vec<HistoricalAllocation>,
}

impl DestinationState {
    fn stamp(&mut self, operator: OperatorId) {
        self.snapshot.version = self.snapshot.version.next();
        self.snapshot.updated_by = Some(operator);
        self.snapshot.updated_at = Some(Utc::now());
    }

    /// Move every row of every confirmed package into history.
    fn promote_confirmed(&mut self) -> BTreeSet<PackageNumber> {
        let confirmed = {
            let ledger = AllocationLedger::from_snapshot(&self.order_lines, &self.historical, &self.snapshot);
            ledger.confirmed_packages()
        };

        let (promoted, kept): (Vec<DraftAllocation>, Vec<DraftAllocation>) = self
            .snapshot
            .allocations
            .drain(..)
            .partition(|row| confirmed.contains(&row.package_number));
        self.snapshot.allocations = kept;

        for row in promoted {
            match self.historical.iter_mut().find(|h| {
                h.article_code == row.article_code && h.purchase_order_id == row.purchase_order_id
            }) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(row.quantity),
                None => self
                    .historical
                    .push(HistoricalAllocation::new(row.key(), row.quantity)),
            }
        }
        for package in &confirmed {
            self.snapshot.confirmations.remove(*package);
        }
        confirmed
    }
}

/// In-memory WIP store plus reference data, keyed by destination.
///
/// Intended for tests/dev and the demo HTTP service.
#[derive(Debug, Default)]
pub struct InMemoryWipStore {
    destinations: RwLock<HashMap<DestinationId, DestinationState>>,
}

impl InMemoryWipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the order lines of a destination.
    pub fn seed_order_lines(&self, destination: DestinationId, lines: Vec<OrderLine>) -> Result<(), WipStoreError> {
        self.with_state(destination, |state| {
            state.order_lines = lines;
            Ok(())
        })
    }

    pub fn seed_historical(
        &self,
        destination: DestinationId,
        historical: Vec<HistoricalAllocation>,
    ) -> Result<(), WipStoreError> {
        self.with_state(destination, |state| {
            state.historical = historical;
            Ok(())
        })
    }

    fn with_state<T>(
        &self,
        destination: DestinationId,
        f: impl FnOnce(&mut DestinationState) -> Result<T, WipStoreError>,
    ) -> Result<T, WipStoreError> {
        let mut map = self
            .destinations
            .write()
            .map_err(|_| WipStoreError::Unavailable("lock poisoned".to_string()))?;
        f(map.entry(destination).or_default())
    }

    fn read<T>(
        &self,
        destination: DestinationId,
        f: impl FnOnce(Option<&DestinationState>) -> T,
    ) -> Result<T, WipStoreError> {
        let map = self
            .destinations
            .read()
            .map_err(|_| WipStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(f(map.get(&destination)))
    }
}

fn ensure_open(destination: DestinationId, snapshot: &Snapshot) -> Result<(), WipStoreError> {
    if snapshot.closed {
        return Err(WipStoreError::Closed(destination));
    }
    Ok(())
}

fn ensure_well_formed(allocations: &[DraftAllocation]) -> Result<(), WipStoreError> {
    let mut seen = BTreeSet::new();
    for (idx, row) in allocations.iter().enumerate() {
        if row.quantity == 0 {
            return Err(WipStoreError::InvalidWrite(format!(
                "row {idx} has zero quantity"
            )));
        }
        if !seen.insert((row.key(), row.package_number)) {
            return Err(WipStoreError::InvalidWrite(format!(
                "row {idx} duplicates {} in package {}",
                row.key(),
                row.package_number
            )));
        }
    }
    Ok(())
}

impl WipStore for InMemoryWipStore {
    fn fetch(&self, destination: DestinationId) -> Result<Snapshot, WipStoreError> {
        self.read(destination, |state| {
            state.map(|s| s.snapshot.clone()).unwrap_or_default()
        })
    }

    fn write(
        &self,
        destination: DestinationId,
        write: WipWrite,
        operator: OperatorId,
    ) -> Result<Snapshot, WipStoreError> {
        self.with_state(destination, |state| {
            ensure_open(destination, &state.snapshot)?;

            let current = state.snapshot.version;
            if !write.expected().matches(current) {
                return Err(WipStoreError::Conflict {
                    expected: write.expected_version.unwrap_or(current),
                    found: current,
                });
            }

            let (allocations, confirmations) = if write.merge {
                (
                    write
                        .allocations
                        .unwrap_or_else(|| state.snapshot.allocations.clone()),
                    write
                        .confirmations
                        .unwrap_or_else(|| state.snapshot.confirmations.clone()),
                )
            } else {
                (
                    write.allocations.unwrap_or_default(),
                    write.confirmations.unwrap_or_else(Confirmations::new),
                )
            };
            ensure_well_formed(&allocations)?;

            state.snapshot.allocations = allocations;
            state.snapshot.confirmations = confirmations;
            state.stamp(operator);

            tracing::info!(
                %destination,
                %operator,
                version = %state.snapshot.version,
                rows = state.snapshot.allocations.len(),
                "wip written"
            );
            Ok(state.snapshot.clone())
        })
    }

    fn reset(&self, destination: DestinationId, operator: OperatorId) -> Result<Snapshot, WipStoreError> {
        self.with_state(destination, |state| {
            ensure_open(destination, &state.snapshot)?;
            state.snapshot.allocations.clear();
            state.snapshot.confirmations = Confirmations::new();
            state.stamp(operator);
            tracing::info!(%destination, %operator, version = %state.snapshot.version, "wip reset");
            Ok(state.snapshot.clone())
        })
    }

    fn confirm_batch(
        &self,
        destination: DestinationId,
        operator: OperatorId,
    ) -> Result<Snapshot, WipStoreError> {
        self.with_state(destination, |state| {
            ensure_open(destination, &state.snapshot)?;
            let promoted = state.promote_confirmed();
            state.snapshot.batch += 1;
            state.stamp(operator);
            tracing::info!(
                %destination,
                %operator,
                packages = promoted.len(),
                batch = state.snapshot.batch,
                "batch confirmed"
            );
            Ok(state.snapshot.clone())
        })
    }

    fn close(&self, destination: DestinationId, operator: OperatorId) -> Result<Snapshot, WipStoreError> {
        self.with_state(destination, |state| {
            ensure_open(destination, &state.snapshot)?;

            let unconfirmed: Vec<PackageNumber> = {
                let ledger =
                    AllocationLedger::from_snapshot(&state.order_lines, &state.historical, &state.snapshot);
                let confirmed = ledger.confirmed_packages();
                ledger
                    .existing_packages()
                    .into_iter()
                    .filter(|p| !confirmed.contains(p))
                    .collect()
            };
            if let Some(first) = unconfirmed.first() {
                return Err(WipStoreError::Precondition(format!(
                    "package {first} is not confirmed ({} unconfirmed)",
                    unconfirmed.len()
                )));
            }

            state.promote_confirmed();
            state.snapshot.closed = true;
            state.stamp(operator);
            tracing::info!(%destination, %operator, "destination closed");
            Ok(state.snapshot.clone())
        })
    }
}

impl ReferenceData for InMemoryWipStore {
    fn order_lines(&self, destination: DestinationId) -> Result<Vec<OrderLine>, WipStoreError> {
        self.read(destination, |state| {
            state.map(|s| s.order_lines.clone()).unwrap_or_default()
        })
    }

    fn historical_allocations(
        &self,
        destination: DestinationId,
    ) -> Result<Vec<HistoricalAllocation>, WipStoreError> {
        self.read(destination, |state| {
            state.map(|s| s.historical.clone()).unwrap_or_default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collo_allocation::AllocationKey;
    use collo_core::VersionToken;
    use proptest::prelude::*;

    fn pkg(n: u32) -> PackageNumber {
        PackageNumber::new(n).unwrap()
    }

    fn key() -> AllocationKey {
        AllocationKey::new("SKU1", "PO1")
    }

    fn seeded() -> (InMemoryWipStore, DestinationId, OperatorId) {
        let store = InMemoryWipStore::new();
        let destination = DestinationId::new();
        store
            .seed_order_lines(destination, vec![OrderLine::new("PO1", "SKU1", 10)])
            .unwrap();
        (store, destination, OperatorId::new())
    }

    #[test]
    fn unknown_destination_fetches_empty_snapshot() {
        let store = InMemoryWipStore::new();
        let snapshot = store.fetch(DestinationId::new()).unwrap();
        assert_eq!(snapshot, Snapshot::empty());
    }

    #[test]
    fn write_bumps_version_and_stamps_operator() {
        let (store, destination, operator) = seeded();
        let write = WipWrite::merge(vec![DraftAllocation::new(key(), 3, pkg(1))], Confirmations::new())
            .with_expected_version(VersionToken::INITIAL);

        let written = store.write(destination, write, operator).unwrap();
        assert_eq!(written.version, VersionToken::new(1));
        assert_eq!(written.updated_by, Some(operator));
        assert!(written.updated_at.is_some());
        assert_eq!(store.fetch(destination).unwrap(), written);
    }

    #[test]
    fn stale_expected_version_is_rejected() {
        let (store, destination, operator) = seeded();
        store
            .write(destination, WipWrite::merge(Vec::new(), Confirmations::new()), operator)
            .unwrap();

        let stale = WipWrite::merge(Vec::new(), Confirmations::new())
            .with_expected_version(VersionToken::INITIAL);
        let err = store.write(destination, stale, operator).unwrap_err();
        assert_eq!(
            err,
            WipStoreError::Conflict {
                expected: VersionToken::INITIAL,
                found: VersionToken::new(1),
            }
        );
    }

    #[test]
    fn merge_keeps_absent_fields_and_replace_clears_them() {
        let (store, destination, operator) = seeded();
        let mut confirmations = Confirmations::new();
        confirmations.set(pkg(1), false);
        store
            .write(
                destination,
                WipWrite::merge(vec![DraftAllocation::new(key(), 3, pkg(1))], confirmations.clone()),
                operator,
            )
            .unwrap();

        let only_rows = WipWrite {
            allocations: Some(vec![DraftAllocation::new(key(), 4, pkg(1))]),
            confirmations: None,
            merge: true,
            expected_version: None,
        };
        let merged = store.write(destination, only_rows.clone(), operator).unwrap();
        assert_eq!(merged.confirmations, confirmations);
        assert_eq!(merged.allocations[0].quantity, 4);

        let replaced = store
            .write(destination, WipWrite { merge: false, ..only_rows }, operator)
            .unwrap();
        assert!(replaced.confirmations.is_empty());
    }

    #[test]
    fn malformed_rows_are_rejected() {
        let (store, destination, operator) = seeded();
        let rows = vec![
            DraftAllocation::new(key(), 1, pkg(1)),
            DraftAllocation::new(key(), 2, pkg(1)),
        ];
        let err = store
            .write(destination, WipWrite::merge(rows, Confirmations::new()), operator)
            .unwrap_err();
        assert!(matches!(err, WipStoreError::InvalidWrite(_)));
        assert_eq!(store.fetch(destination).unwrap().version, VersionToken::INITIAL);
    }

    #[test]
    fn confirm_batch_promotes_confirmed_packages_into_history() {
        let (store, destination, operator) = seeded();
        let mut confirmations = Confirmations::new();
        confirmations.set(pkg(1), true);
        confirmations.set(pkg(2), false);
        let rows = vec![
            DraftAllocation::new(key(), 3, pkg(1)),
            DraftAllocation::new(key(), 2, pkg(2)),
        ];
        store
            .write(destination, WipWrite::merge(rows, confirmations), operator)
            .unwrap();

        let snapshot = store.confirm_batch(destination, operator).unwrap();
        assert_eq!(snapshot.batch, 2);
        assert_eq!(snapshot.allocations, vec![DraftAllocation::new(key(), 2, pkg(2))]);
        assert!(!snapshot.confirmations.contains(pkg(1)));
        assert_eq!(
            store.historical_allocations(destination).unwrap(),
            vec![HistoricalAllocation::new(key(), 3)]
        );
    }

    #[test]
    fn close_requires_every_package_confirmed() {
        let (store, destination, operator) = seeded();
        let mut confirmations = Confirmations::new();
        confirmations.set(pkg(1), false);
        store
            .write(
                destination,
                WipWrite::merge(vec![DraftAllocation::new(key(), 3, pkg(1))], confirmations),
                operator,
            )
            .unwrap();
        assert!(matches!(
            store.close(destination, operator),
            Err(WipStoreError::Precondition(_))
        ));

        let mut confirmations = Confirmations::new();
        confirmations.set(pkg(1), true);
        store
            .write(
                destination,
                WipWrite {
                    allocations: None,
                    confirmations: Some(confirmations),
                    merge: true,
                    expected_version: None,
                },
                operator,
            )
            .unwrap();

        let closed = store.close(destination, operator).unwrap();
        assert!(closed.closed);
        assert!(closed.allocations.is_empty());
        assert_eq!(
            store.reset(destination, operator),
            Err(WipStoreError::Closed(destination))
        );
    }

    #[test]
    fn lookup_article_matches_code_or_ean() {
        let store = InMemoryWipStore::new();
        let destination = DestinationId::new();
        store
            .seed_order_lines(
                destination,
                vec![OrderLine::new("PO1", "SKU1", 10).with_ean("8001234567890")],
            )
            .unwrap();

        let hit = store.lookup_article(destination, "8001234567890").unwrap();
        assert_eq!(hit.map(|l| l.key()), Some(key()));
        assert_eq!(store.lookup_article(destination, "nope").unwrap(), None);
    }

    proptest! {
        /// Property: every accepted write advances the version by exactly one,
        /// and a write pinned to any other version leaves the store untouched.
        #[test]
        fn accepted_writes_advance_version_by_one(
            quantities in prop::collection::vec(1u64..10, 1..8),
            stale_offset in 1u64..5
        ) {
            let (store, destination, operator) = seeded();
            for (i, qty) in quantities.iter().enumerate() {
                let current = store.fetch(destination).unwrap().version;
                prop_assert_eq!(current, VersionToken::new(i as u64));

                let stale = WipWrite::merge(Vec::new(), Confirmations::new())
                    .with_expected_version(VersionToken::new(current.value() + stale_offset));
                prop_assert!(store.write(destination, stale, operator).unwrap_err().is_conflict());

                let write = WipWrite::merge(vec![DraftAllocation::new(key(), *qty, pkg(1))], Confirmations::new())
                    .with_expected_version(current);
                let written = store.write(destination, write, operator).unwrap();
                prop_assert_eq!(written.version, current.next());
                prop_assert_eq!(written.allocations[0].quantity, *qty);
            }
        }
    }
}
