//! Shared storage media
//!
//! A medium is the storage surface that several execution contexts can
//! reach at once. Adapters are per-context views over a medium.
//!
//! - [`ExtensionArea`]: structured values, quota-reported, notifies every
//!   attached context including the writer
//! - [`LocalArea`]: text values, small quota, notifies every attached context
//!   except the writer; optionally backed by a JSON file
//! - [`MemoryArea`]: structured values in a process-wide map, no notifications

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::adapter::{entry_size, Capacity, StorageChange};
use super::error::{StorageError, StorageResult};

/// Identity of one execution context (a tab, popup or side panel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", &self.0.simple().to_string()[..8])
    }
}

/// Handle for a medium subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

type MediumCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Subscribers of one medium, tagged with the context they belong to
pub struct Subscribers<T> {
    next_id: AtomicU64,
    list: Mutex<Vec<(SubscriberId, ContextId, MediumCallback<T>)>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            list: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Subscribers<T> {
    pub fn subscribe(&self, context: ContextId, callback: MediumCallback<T>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.list).push((id, context, callback));
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        lock(&self.list).retain(|(existing, _, _)| *existing != id);
    }

    /// Deliver an event, skipping subscribers of `skip` when given
    fn notify(&self, event: &T, skip: Option<ContextId>) {
        let targets: Vec<MediumCallback<T>> = lock(&self.list)
            .iter()
            .filter(|(_, context, _)| Some(*context) != skip)
            .map(|(_, _, callback)| Arc::clone(callback))
            .collect();

        for callback in targets {
            callback(event);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ==================== Extension area ====================

/// Privileged key-value storage granted to the extension
pub struct ExtensionArea {
    entries: Mutex<BTreeMap<String, Value>>,
    quota: Capacity,
    subscribers: Subscribers<StorageChange>,
}

impl ExtensionArea {
    /// Create an area with a byte quota
    pub fn new(quota_bytes: u64) -> Self {
        Self::with_capacity(Capacity::Bytes(quota_bytes))
    }

    /// Create an area granted unlimited storage
    pub fn unlimited() -> Self {
        Self::with_capacity(Capacity::Unbounded)
    }

    fn with_capacity(quota: Capacity) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota,
            subscribers: Subscribers::default(),
        }
    }

    pub fn quota(&self) -> Capacity {
        self.quota
    }

    pub fn subscribe(
        &self,
        context: ContextId,
        callback: Arc<dyn Fn(&StorageChange) + Send + Sync>,
    ) -> SubscriberId {
        self.subscribers.subscribe(context, callback)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.unsubscribe(id);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.entries).get(key).cloned()
    }

    /// Store a value, notifying every subscriber (the writer's own included)
    pub fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        let old_value = {
            let mut entries = lock(&self.entries);
            if let Capacity::Bytes(quota) = self.quota {
                let current = bytes_in_use(&entries);
                let old_size = entries.get(key).map(|v| value_size(key, v)).unwrap_or(0);
                let needed = current - old_size + value_size(key, &value);
                if needed > quota {
                    return Err(StorageError::QuotaExceeded {
                        key: key.to_string(),
                        needed,
                        available: quota.saturating_sub(current),
                    });
                }
            }
            entries.insert(key.to_string(), value.clone())
        };

        self.subscribers.notify(
            &StorageChange {
                key: key.to_string(),
                new_value: Some(value),
                old_value,
            },
            None,
        );
        Ok(())
    }

    pub fn remove(&self, key: &str) {
        let old_value = lock(&self.entries).remove(key);
        if old_value.is_some() {
            self.subscribers.notify(
                &StorageChange {
                    key: key.to_string(),
                    new_value: None,
                    old_value,
                },
                None,
            );
        }
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *lock(&self.entries));
        for (key, old_value) in removed {
            self.subscribers.notify(
                &StorageChange {
                    key,
                    new_value: None,
                    old_value: Some(old_value),
                },
                None,
            );
        }
    }

    pub fn bytes_in_use(&self) -> u64 {
        bytes_in_use(&lock(&self.entries))
    }
}

fn value_size(key: &str, value: &Value) -> u64 {
    entry_size(key, &value.to_string())
}

fn bytes_in_use(entries: &BTreeMap<String, Value>) -> u64 {
    entries.iter().map(|(k, v)| value_size(k, v)).sum()
}

// ==================== Local area ====================

/// A change on the local area, as raw text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    pub key: String,
    pub new_value: Option<String>,
    pub old_value: Option<String>,
}

/// Origin-scoped blocking key-value store with a small quota
///
/// Writes are broadcast to every attached context except the writer, like
/// the platform's cross-tab storage event.
pub struct LocalArea {
    entries: Mutex<BTreeMap<String, String>>,
    quota: u64,
    path: Option<PathBuf>,
    subscribers: Subscribers<TextChange>,
}

impl LocalArea {
    /// Create a volatile area
    pub fn in_memory(quota: u64) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota,
            path: None,
            subscribers: Subscribers::default(),
        }
    }

    /// Open a file-backed area, loading existing entries
    pub fn open(path: impl Into<PathBuf>, quota: u64) -> StorageResult<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)
                .map_err(|e| StorageError::serialization(&path.display().to_string(), e))?
        } else {
            BTreeMap::new()
        };

        debug!("Opened local area at {:?}", path);
        Ok(Self {
            entries: Mutex::new(entries),
            quota,
            path: Some(path),
            subscribers: Subscribers::default(),
        })
    }

    pub fn quota(&self) -> u64 {
        self.quota
    }

    pub fn subscribe(
        &self,
        context: ContextId,
        callback: Arc<dyn Fn(&TextChange) + Send + Sync>,
    ) -> SubscriberId {
        self.subscribers.subscribe(context, callback)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.unsubscribe(id);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }

    /// Store a value on behalf of `writer`, returning the previous value
    ///
    /// Fails without modifying the area when the quota would be exceeded or
    /// the backing file cannot be written.
    pub fn set(&self, key: &str, value: String, writer: ContextId) -> StorageResult<Option<String>> {
        let old_value = {
            let mut entries = lock(&self.entries);
            let current = text_bytes_in_use(&entries);
            let old_size = entries.get(key).map(|v| entry_size(key, v)).unwrap_or(0);
            let needed = current - old_size + entry_size(key, &value);
            if needed > self.quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available: self.quota.saturating_sub(current),
                });
            }

            let old_value = entries.insert(key.to_string(), value.clone());
            if let Err(e) = self.flush(&entries) {
                match &old_value {
                    Some(old) => entries.insert(key.to_string(), old.clone()),
                    None => entries.remove(key),
                };
                return Err(e);
            }
            old_value
        };

        self.subscribers.notify(
            &TextChange {
                key: key.to_string(),
                new_value: Some(value),
                old_value: old_value.clone(),
            },
            Some(writer),
        );
        Ok(old_value)
    }

    /// Remove a key on behalf of `writer`, returning the previous value
    pub fn remove(&self, key: &str, writer: ContextId) -> StorageResult<Option<String>> {
        self.remove_matching(key, None, writer)
    }

    /// Remove a key only if it still holds `expected`
    pub fn remove_if(&self, key: &str, expected: &str, writer: ContextId) -> StorageResult<bool> {
        Ok(self.remove_matching(key, Some(expected), writer)?.is_some())
    }

    fn remove_matching(
        &self,
        key: &str,
        expected: Option<&str>,
        writer: ContextId,
    ) -> StorageResult<Option<String>> {
        let old_value = {
            let mut entries = lock(&self.entries);
            match (entries.get(key), expected) {
                (None, _) => return Ok(None),
                (Some(current), Some(expected)) if current != expected => return Ok(None),
                _ => {}
            }
            let old_value = entries.remove(key);
            if let Err(e) = self.flush(&entries) {
                if let Some(old) = &old_value {
                    entries.insert(key.to_string(), old.clone());
                }
                return Err(e);
            }
            old_value
        };

        self.subscribers.notify(
            &TextChange {
                key: key.to_string(),
                new_value: None,
                old_value: old_value.clone(),
            },
            Some(writer),
        );
        Ok(old_value)
    }

    /// Remove every entry on behalf of `writer`, returning what was removed
    pub fn clear(&self, writer: ContextId) -> StorageResult<Vec<(String, String)>> {
        let removed = {
            let mut entries = lock(&self.entries);
            let removed = std::mem::take(&mut *entries);
            if let Err(e) = self.flush(&entries) {
                *entries = removed;
                return Err(e);
            }
            removed
        };

        for (key, old_value) in &removed {
            self.subscribers.notify(
                &TextChange {
                    key: key.clone(),
                    new_value: None,
                    old_value: Some(old_value.clone()),
                },
                Some(writer),
            );
        }
        Ok(removed.into_iter().collect())
    }

    /// Sum of key length plus value length over all entries
    pub fn bytes_in_use(&self) -> u64 {
        text_bytes_in_use(&lock(&self.entries))
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec(entries)
            .map_err(|e| StorageError::serialization(&path.display().to_string(), e))?;
        atomic_write(path, &json).map_err(|source| StorageError::WriteError {
            path: path.clone(),
            source,
        })
    }
}

fn text_bytes_in_use(entries: &BTreeMap<String, String>) -> u64 {
    entries.iter().map(|(k, v)| entry_size(k, v)).sum()
}

/// Write data to a file atomically
///
/// Writes a sibling temp file, syncs it, then renames it over the target.
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)
}

// ==================== Memory area ====================

/// Process-wide volatile map
#[derive(Default)]
pub struct MemoryArea {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.entries).get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) -> Option<Value> {
        lock(&self.entries).insert(key.to_string(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        lock(&self.entries).remove(key)
    }

    pub fn clear(&self) -> Vec<(String, Value)> {
        std::mem::take(&mut *lock(&self.entries)).into_iter().collect()
    }

    pub fn bytes_in_use(&self) -> u64 {
        lock(&self.entries)
            .iter()
            .map(|(k, v)| value_size(k, v))
            .sum()
    }
}
