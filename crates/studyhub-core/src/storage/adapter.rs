//! The uniform adapter contract
//!
//! Every backend (extension storage, SQLite object store, local key-value
//! area, in-process memory) implements [`StorageAdapter`]. Values are
//! `serde_json::Value` at this boundary; text-only media serialize on write
//! and parse on read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::Value;

use super::error::StorageResult;

/// A change to one key of a medium
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}

/// Callback invoked for every change an adapter observes
pub type ChangeListener = Arc<dyn Fn(&StorageChange) + Send + Sync>;

/// Handle returned when registering a change listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Capacity of a medium, either a byte count or unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Bytes(u64),
    Unbounded,
}

impl Capacity {
    /// Remaining capacity once `used` bytes are taken
    pub fn remaining(self, used: u64) -> Capacity {
        match self {
            Capacity::Bytes(quota) => Capacity::Bytes(quota.saturating_sub(used)),
            Capacity::Unbounded => Capacity::Unbounded,
        }
    }

    /// Byte count, `None` when unbounded
    pub fn bytes(self) -> Option<u64> {
        match self {
            Capacity::Bytes(n) => Some(n),
            Capacity::Unbounded => None,
        }
    }
}

impl Serialize for Capacity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Capacity::Bytes(n) => serializer.serialize_u64(*n),
            Capacity::Unbounded => serializer.serialize_none(),
        }
    }
}

/// Raw usage numbers reported by an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub used: u64,
    pub available: Capacity,
    pub quota: Capacity,
}

impl StorageUsage {
    pub fn new(used: u64, quota: Capacity) -> Self {
        Self {
            used,
            available: quota.remaining(used),
            quota,
        }
    }
}

/// Uniform storage contract over one backend
///
/// Callers must check [`is_available`](StorageAdapter::is_available) before
/// relying on the async operations; an unavailable adapter answers every
/// operation with an error instead of panicking.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &'static str;

    /// Whether the backing medium can be used from this context
    ///
    /// Pure and synchronous: never touches the medium.
    fn is_available(&self) -> bool;

    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>>;

    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()>;

    async fn remove_item(&self, key: &str) -> StorageResult<()>;

    async fn clear(&self) -> StorageResult<()>;

    async fn usage(&self) -> StorageResult<StorageUsage>;

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId;

    fn remove_change_listener(&self, id: ListenerId) -> bool;
}

/// Listener registry shared between an adapter and its medium subscription
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, ChangeListener)>>,
}

impl ListenerSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, listener: ChangeListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every listener with the change
    ///
    /// The registry lock is released before callbacks run, so a listener may
    /// add or remove listeners.
    pub fn dispatch(&self, change: &StorageChange) {
        let snapshot: Vec<ChangeListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(change);
        }
    }
}

/// Bytes accounted for one entry: key length plus value length
pub fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}
