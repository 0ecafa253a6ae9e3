//! WIP synchronizer: optimistic-concurrency writes against the store.
//!
//! Every save fetches the latest snapshot first. A checked save is a conflict
//! when the snapshot moved since the local edits were computed, and the write
//! itself carries the fresh version so the store rejects a race between fetch
//! and write. A silent save is last-write-wins.

use std::convert::Infallible;

use collo_allocation::{Confirmations, DraftAllocation, Snapshot};
use collo_core::{DestinationId, OperatorId};

use crate::wip_store::{WipStore, WipStoreError, WipWrite};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Verify the version token (interactive commits).
    Checked,
    /// Skip the version check (live autosave).
    Silent,
}

/// Result of a save. Every outcome is recoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written; the returned snapshot is the new local truth.
    Saved,
    /// Updated elsewhere; local edits discarded and the latest snapshot adopted.
    Conflict,
    /// Transport or server failure; local state left untouched.
    Failed(WipStoreError),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SaveOutcome::Conflict)
    }
}

#[derive(Debug)]
pub struct WipSynchronizer<S> {
    store: S,
    destination: DestinationId,
    operator: OperatorId,
    snapshot: Snapshot,
}

impl<S: WipStore> WipSynchronizer<S> {
    pub fn open(store: S, destination: DestinationId, operator: OperatorId) -> Result<Self, WipStoreError> {
        let snapshot = store.fetch(destination)?;
        tracing::debug!(%destination, version = %snapshot.version, "wip opened");
        Ok(Self {
            store,
            destination,
            operator,
            snapshot,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn destination(&self) -> DestinationId {
        self.destination
    }

    pub fn operator(&self) -> OperatorId {
        self.operator
    }

    /// Last adopted snapshot (local truth).
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn refresh(&mut self) -> Result<&Snapshot, WipStoreError> {
        self.snapshot = self.store.fetch(self.destination)?;
        Ok(&self.snapshot)
    }

    pub fn save(
        &mut self,
        allocations: Vec<DraftAllocation>,
        confirmations: Confirmations,
        mode: SaveMode,
    ) -> SaveOutcome {
        match self.save_with(mode, move |_| Ok::<_, Infallible>((allocations, confirmations))) {
            Ok(outcome) => outcome,
            Err(never) => match never {},
        }
    }

    /// Save a next state built from the freshly fetched snapshot.
    ///
    /// `build` runs only when the write is actually attempted. When it
    /// refuses the fresh snapshot nothing is written, the fresh snapshot is
    /// adopted and its error is returned.
    pub fn save_with<E>(
        &mut self,
        mode: SaveMode,
        build: impl FnOnce(&Snapshot) -> Result<(Vec<DraftAllocation>, Confirmations), E>,
    ) -> Result<SaveOutcome, E> {
        let fresh = match self.store.fetch(self.destination) {
            Ok(s) => s,
            Err(err) => return Ok(self.failed(err)),
        };

        if mode == SaveMode::Checked && fresh.version != self.snapshot.version {
            tracing::warn!(
                destination = %self.destination,
                base = %self.snapshot.version,
                latest = %fresh.version,
                "wip updated elsewhere"
            );
            self.snapshot = fresh;
            return Ok(SaveOutcome::Conflict);
        }

        let (allocations, confirmations) = match build(&fresh) {
            Ok(next) => next,
            Err(err) => {
                tracing::warn!(
                    destination = %self.destination,
                    version = %fresh.version,
                    "next state refused against latest wip"
                );
                self.snapshot = fresh;
                return Err(err);
            }
        };
        let mut write = WipWrite::merge(allocations, confirmations);
        if mode == SaveMode::Checked {
            write = write.with_expected_version(fresh.version);
        }

        Ok(match self.store.write(self.destination, write, self.operator) {
            Ok(written) => {
                tracing::info!(
                    destination = %self.destination,
                    version = %written.version,
                    ?mode,
                    "wip saved"
                );
                self.snapshot = written;
                SaveOutcome::Saved
            }
            Err(err) if err.is_conflict() => {
                tracing::warn!(destination = %self.destination, error = %err, "wip write raced");
                self.reload_after_conflict();
                SaveOutcome::Conflict
            }
            Err(err) => self.failed(err),
        })
    }

    pub fn reset(&mut self) -> SaveOutcome {
        let result = self.store.reset(self.destination, self.operator);
        self.adopt(result, "wip reset")
    }

    pub fn confirm_batch(&mut self) -> SaveOutcome {
        let result = self.store.confirm_batch(self.destination, self.operator);
        self.adopt(result, "batch confirmed")
    }

    pub fn close(&mut self) -> SaveOutcome {
        let result = self.store.close(self.destination, self.operator);
        self.adopt(result, "destination closed")
    }

    fn adopt(&mut self, result: Result<Snapshot, WipStoreError>, what: &'static str) -> SaveOutcome {
        match result {
            Ok(snapshot) => {
                tracing::info!(destination = %self.destination, version = %snapshot.version, "{what}");
                self.snapshot = snapshot;
                SaveOutcome::Saved
            }
            Err(err) => self.failed(err),
        }
    }

    fn reload_after_conflict(&mut self) {
        match self.store.fetch(self.destination) {
            Ok(latest) => self.snapshot = latest,
            Err(err) => {
                tracing::warn!(destination = %self.destination, error = %err, "reload after conflict failed");
            }
        }
    }

    fn failed(&self, err: WipStoreError) -> SaveOutcome {
        tracing::warn!(destination = %self.destination, error = %err, "wip save failed");
        SaveOutcome::Failed(err)
    }
}
