//! Storage layer
//!
//! Adapters over the media a context can reach, and the facade that picks one.
//!
//! ## Architecture
//!
//! - **Adapters**: one per backend, all behind [`StorageAdapter`]
//!   - `extension`: structured values, native change broadcast
//!   - `object_store`: SQLite, announces writes with sync signals
//!   - `local`: text key-value area, broadcasts to other contexts
//!   - `memory`: process map, announces writes with sync signals
//! - **HybridStorage**: chooses the first available adapter once
//!
//! Media are shared between contexts through an [`Environment`].

pub mod adapter;
pub mod environment;
pub mod error;
pub mod extension;
pub mod hybrid;
pub mod local;
pub mod medium;
pub mod memory;
pub mod object_store;
pub mod schema;
pub mod signal;

pub use adapter::{
    Capacity, ChangeListener, ListenerId, StorageAdapter, StorageChange, StorageUsage,
};
pub use environment::{Environment, EnvironmentBuilder};
pub use error::{StorageError, StorageResult};
pub use extension::ExtensionAdapter;
pub use hybrid::{AdapterFactory, AdapterKind, HybridStorage, StorageInfo, UnknownAdapter};
pub use local::LocalAdapter;
pub use medium::{ContextId, ExtensionArea, LocalArea, MemoryArea};
pub use memory::MemoryAdapter;
pub use object_store::{ObjectDatabase, ObjectStoreAdapter};
pub use schema::{migrate, schema_version, SCHEMA_VERSION};
pub use signal::{SignalChannel, SyncSignal, SYNC_SIGNAL_KEY};
