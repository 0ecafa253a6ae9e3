//! Package allocation domain module.
//!
//! This crate contains the business rules for splitting ordered quantities
//! across numbered shipping packages, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage):
//!
//! - `model`: order lines, historical/draft allocations, confirmations, snapshot
//! - `ledger`: read-only view over reference data + draft state, commit validation
//! - `residual`: remaining allocatable quantity of an order line
//! - `sequencer`: contiguous package numbering and session-local reservations
//! - `pending`: open new-allocation input rows and collision merge

pub mod error;
pub mod ledger;
pub mod model;
pub mod pending;
pub mod residual;
pub mod sequencer;

pub use error::AllocationError;
pub use ledger::{AllocationLedger, PackageState};
pub use model::{
    AllocationKey, ArticleCode, Confirmations, DraftAllocation, HistoricalAllocation, OrderLine,
    PackageNumber, PurchaseOrderId, Snapshot,
};
pub use pending::{Merge, PackageChange, PendingRow, PendingRows};
pub use residual::{ensure_within_residual, residual};
pub use sequencer::{Assignment, PackageSequencer, Reservations, SequenceViolation};
