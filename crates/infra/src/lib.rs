//! Infrastructure layer: store contract, synchronization, editing sessions.
//!
//! - `wip_store` / `reference`: the collaborator contract and its in-memory implementation
//! - `cache`: session-owned reference data cache
//! - `synchronizer`: checked/silent saves with optimistic concurrency
//! - `session`: fulfillment session (pending rows, package operations, batches)
//! - `editor`: package editor
//! - `notice`: user-facing notices

pub mod cache;
pub mod editor;
pub mod notice;
pub mod reference;
pub mod session;
pub mod synchronizer;
pub mod wip_store;


pub use cache::{ReferenceCache, ReferenceSet};
pub use editor::{PackageEditor, RowRemoval};
pub use notice::{Notice, NoticeSink, RecordingNoticeSink};
pub use reference::ReferenceData;
pub use session::{FulfillmentSession, SessionConfig};
pub use synchronizer::{SaveMode, SaveOutcome, WipSynchronizer};
pub use wip_store::{InMemoryWipStore, WipStore, WipStoreError, WipWrite};
