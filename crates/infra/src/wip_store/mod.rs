//! Authoritative WIP (draft) state boundary.
//!
//! The store contract makes no storage assumptions; `InMemoryWipStore` is the
//! reference collaborator used by tests and by the HTTP service.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryWipStore;
pub use r#trait::{WipStore, WipStoreError, WipWrite};
