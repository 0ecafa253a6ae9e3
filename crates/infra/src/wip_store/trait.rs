use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use collo_allocation::{Confirmations, DraftAllocation, Snapshot};
use collo_core::{DestinationId, ExpectedVersion, OperatorId, VersionToken};

/// Write payload for a destination's draft state.
///
/// With `merge = true` only the fields that are present replace the stored
/// ones. With `merge = false` the whole draft document is replaced and absent
/// fields become empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WipWrite {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocations: Option<Vec<DraftAllocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<Confirmations>,
    #[serde(default = "default_merge")]
    pub merge: bool,
    /// `None` skips the version check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<VersionToken>,
}

fn default_merge() -> bool {
    true
}

impl WipWrite {
    /// Merge-tagged write of a full next state.
    pub fn merge(allocations: Vec<DraftAllocation>, confirmations: Confirmations) -> Self {
        Self {
            allocations: Some(allocations),
            confirmations: Some(confirmations),
            merge: true,
            expected_version: None,
        }
    }

    pub fn with_expected_version(mut self, version: VersionToken) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn expected(&self) -> ExpectedVersion {
        ExpectedVersion::from_option(self.expected_version)
    }
}

/// Collaborator failure.
///
/// These are infrastructure outcomes (concurrency, lifecycle, transport) as
/// opposed to the local validation taxonomy in `collo_allocation`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WipStoreError {
    #[error("version mismatch (expected {expected}, found {found})")]
    Conflict {
        expected: VersionToken,
        found: VersionToken,
    },

    #[error("destination {0} is closed")]
    Closed(DestinationId),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid write: {0}")]
    InvalidWrite(String),
}

impl WipStoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, WipStoreError::Conflict { .. })
    }
}

/// Authoritative, server-held draft state per destination.
///
/// Every successful mutation returns the snapshot as written, with a fresh
/// version token.
pub trait WipStore: Send + Sync {
    fn fetch(&self, destination: DestinationId) -> Result<Snapshot, WipStoreError>;

    fn write(
        &self,
        destination: DestinationId,
        write: WipWrite,
        operator: OperatorId,
    ) -> Result<Snapshot, WipStoreError>;

    /// Drop every draft row and confirmation entry.
    fn reset(&self, destination: DestinationId, operator: OperatorId) -> Result<Snapshot, WipStoreError>;

    /// Promote confirmed packages into historical allocations and open the next batch.
    fn confirm_batch(
        &self,
        destination: DestinationId,
        operator: OperatorId,
    ) -> Result<Snapshot, WipStoreError>;

    /// Finalize the destination. Requires every package confirmed.
    fn close(&self, destination: DestinationId, operator: OperatorId) -> Result<Snapshot, WipStoreError>;
}

impl<S> WipStore for Arc<S>
where
    S: WipStore + ?Sized,
{
    fn fetch(&self, destination: DestinationId) -> Result<Snapshot, WipStoreError> {
        (**self).fetch(destination)
    }

    fn write(
        &self,
        destination: DestinationId,
        write: WipWrite,
        operator: OperatorId,
    ) -> Result<Snapshot, WipStoreError> {
        (**self).write(destination, write, operator)
    }

    fn reset(&self, destination: DestinationId, operator: OperatorId) -> Result<Snapshot, WipStoreError> {
        (**self).reset(destination, operator)
    }

    fn confirm_batch(
        &self,
        destination: DestinationId,
        operator: OperatorId,
    ) -> Result<Snapshot, WipStoreError> {
        (**self).confirm_batch(destination, operator)
    }

    fn close(&self, destination: DestinationId, operator: OperatorId) -> Result<Snapshot, WipStoreError> {
        (**self).close(destination, operator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_defaults_to_merge_without_version_check() {
        let write: WipWrite = serde_json::from_value(serde_json::json!({
            "allocations": []
        }))
        .unwrap();
        assert!(write.merge);
        assert!(write.confirmations.is_none());
        assert_eq!(write.expected(), ExpectedVersion::Any);
    }

    #[test]
    fn expected_version_round_trips_as_plain_number() {
        let write = WipWrite::merge(Vec::new(), Confirmations::new())
            .with_expected_version(VersionToken::new(7));
        let json = serde_json::to_value(&write).unwrap();
        assert_eq!(json["expected_version"], serde_json::json!(7));
        assert_eq!(write.expected(), ExpectedVersion::Exact(VersionToken::new(7)));
    }
}
