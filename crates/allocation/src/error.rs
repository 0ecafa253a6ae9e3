//! Validation taxonomy of the allocation engine.
//!
//! Every variant is resolved locally: it is surfaced to the operator and never
//! turns into network traffic.

use thiserror::Error;

use collo_core::RowId;

use crate::model::{AllocationKey, PackageNumber};
use crate::sequencer::SequenceViolation;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// A scanned/typed code matched no order line.
    #[error("no order line matches code '{0}'")]
    UnknownCode(String),

    /// The order line is fully allocated.
    #[error("nothing left to allocate for {0}")]
    NothingLeft(AllocationKey),

    #[error("quantity {requested} for {key} exceeds the residual {residual}")]
    ExceedsResidual {
        key: AllocationKey,
        requested: u64,
        residual: u64,
    },

    #[error("quantity must be positive")]
    ZeroQuantity,

    #[error("package {0} is confirmed and cannot be modified")]
    PackageLocked(PackageNumber),

    #[error("package {0} does not exist")]
    UnknownPackage(PackageNumber),

    #[error("package {0} is not confirmed")]
    NotConfirmed(PackageNumber),

    #[error("destination is closed")]
    DestinationClosed,

    #[error(transparent)]
    Sequence(#[from] SequenceViolation),

    #[error("conservation violated for {key}: {allocated} allocated of {ordered} ordered")]
    Conservation {
        key: AllocationKey,
        allocated: u64,
        ordered: u64,
    },

    #[error("package {package} cannot be introduced while package {missing} does not exist")]
    Contiguity {
        package: PackageNumber,
        missing: PackageNumber,
    },

    #[error("duplicate row for {key} in package {package}")]
    DuplicateRow {
        key: AllocationKey,
        package: PackageNumber,
    },

    #[error("pending row {0} not found")]
    UnknownRow(RowId),

    #[error("package {package} has no row for {key}")]
    NotInPackage {
        key: AllocationKey,
        package: PackageNumber,
    },

    /// Deleting a package is a two-step gesture.
    #[error("package deletion must be armed before it is confirmed")]
    DeleteNotArmed,
}
