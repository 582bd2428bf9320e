//! Persistence and cross-context sync
//!
//! The [`SyncCoordinator`] ties a context's [`Store`](crate::store::Store) to
//! its [`HybridStorage`](crate::storage::HybridStorage): local mutations are
//! persisted as exchange payloads, and payloads written by other contexts are
//! imported back without being re-persisted.

pub mod coordinator;
pub mod flags;

pub use coordinator::{CoordinatorHandle, LoadState, SyncCoordinator, SyncEvent, PERSISTENCE_KEY};
pub use flags::{SuppressionGuard, SyncFlags};
