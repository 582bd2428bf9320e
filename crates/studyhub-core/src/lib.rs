//! StudyHub Core Library
//!
//! Persistence and synchronization engine for StudyHub, a study planner whose
//! state lives in several execution contexts at once (tabs, popups, side
//! panels) that share storage but not memory.
//!
//! # Architecture
//!
//! - **Storage adapters**: one per backend, behind a uniform async contract
//! - **HybridStorage**: picks the first available adapter
//! - **Store**: the in-memory state and its change subscribers
//! - **SyncCoordinator**: persists local changes and imports remote ones
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let env = Environment::from_config(&config)?;
//! let storage = Arc::new(HybridStorage::open(&env, &config)?);
//! let mut sync = SyncCoordinator::start(storage, Arc::new(Mutex::new(Store::new())));
//! sync.ready().await;
//!
//! let store = sync.store();
//! let mut store = store.lock().await;
//! let course = store.add(Course::new("Chemistry"));
//! store.add(Task::new(course, "Lab report"));
//! ```
//!
//! # Modules
//!
//! - `storage`: adapters, media and the hybrid facade
//! - `store`: reactive state store
//! - `sync`: persistence/sync coordinator
//! - `transfer`: exchange payload export, import and merge
//! - `models`: state and record types
//! - `patch`: recursive in-place snapshot merge
//! - `config`: application configuration

pub mod config;
pub mod models;
pub mod patch;
pub mod storage;
pub mod store;
pub mod sync;
pub mod transfer;

pub use config::Config;
pub use models::{AppState, Course, CourseId, Priority, Task};
pub use storage::{Environment, HybridStorage, StorageError, StorageInfo};
pub use store::{Record, Section, Store, StoreEvent};
pub use sync::{CoordinatorHandle, LoadState, SyncCoordinator, SyncEvent, PERSISTENCE_KEY};
pub use transfer::{ExchangePayload, ImportMode, ImportSummary, TransferError};
