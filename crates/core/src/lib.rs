//! `collo-core`: shared building blocks for the package allocation engine.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! identifiers, the domain error model, and the optimistic-concurrency
//! version token.

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{DestinationId, OperatorId, RowId};
pub use version::{ExpectedVersion, VersionToken};
