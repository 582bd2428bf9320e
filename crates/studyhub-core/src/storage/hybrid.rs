//! Hybrid storage facade
//!
//! Chooses one adapter at construction time, in priority order, and forwards
//! every operation to it. Callers never learn which backend is active unless
//! they ask for [`HybridStorage::adapter_name`] or [`HybridStorage::storage_info`].

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use super::adapter::{Capacity, ChangeListener, ListenerId, StorageAdapter};
use super::environment::Environment;
use super::error::{StorageError, StorageResult};
use super::extension::ExtensionAdapter;
use super::local::LocalAdapter;
use super::memory::MemoryAdapter;
use super::object_store::ObjectStoreAdapter;
use crate::config::Config;

/// Kinds of storage adapter, as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Extension,
    ObjectStore,
    Local,
    Memory,
}

impl AdapterKind {
    /// Default selection order
    pub const PRIORITY: [AdapterKind; 4] = [
        AdapterKind::Extension,
        AdapterKind::ObjectStore,
        AdapterKind::Local,
        AdapterKind::Memory,
    ];

    /// Config name, identical to the name the built adapter reports
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Extension => ExtensionAdapter::NAME,
            AdapterKind::ObjectStore => ObjectStoreAdapter::NAME,
            AdapterKind::Local => LocalAdapter::NAME,
            AdapterKind::Memory => MemoryAdapter::NAME,
        }
    }

    /// Construct this kind of adapter for one context
    pub fn build(self, env: &Environment) -> Box<dyn StorageAdapter> {
        match self {
            AdapterKind::Extension => Box::new(ExtensionAdapter::from_env(env)),
            AdapterKind::ObjectStore => Box::new(ObjectStoreAdapter::from_env(env)),
            AdapterKind::Local => Box::new(LocalAdapter::from_env(env)),
            AdapterKind::Memory => Box::new(MemoryAdapter::from_env(env)),
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown storage adapter '{0}'. Valid adapters: extension, object_store, local, memory")]
pub struct UnknownAdapter(String);

impl FromStr for AdapterKind {
    type Err = UnknownAdapter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "extension" => Ok(AdapterKind::Extension),
            "object_store" | "objectstore" | "sqlite" => Ok(AdapterKind::ObjectStore),
            "local" => Ok(AdapterKind::Local),
            "memory" => Ok(AdapterKind::Memory),
            _ => Err(UnknownAdapter(s.to_string())),
        }
    }
}

/// Deferred adapter construction
pub type AdapterFactory = Box<dyn FnOnce() -> Box<dyn StorageAdapter>>;

/// Usage of the active adapter, as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageInfo {
    pub used: u64,
    pub available: Capacity,
    pub quota: Capacity,
    pub adapter: &'static str,
}

/// Facade over the adapter chosen for this context
pub struct HybridStorage {
    adapter: Box<dyn StorageAdapter>,
    writes: AtomicU64,
}

impl HybridStorage {
    /// Keep the first available candidate
    ///
    /// Candidates are constructed lazily, one at a time, so a later candidate
    /// is never built once an earlier one is usable.
    pub fn select(candidates: impl IntoIterator<Item = AdapterFactory>) -> StorageResult<Self> {
        let mut tried = Vec::new();

        for factory in candidates {
            let adapter = factory();
            if adapter.is_available() {
                info!("Using '{}' storage adapter", adapter.name());
                return Ok(Self::with_adapter(adapter));
            }
            debug!("Storage adapter '{}' is not available", adapter.name());
            tried.push(adapter.name().to_string());
        }

        Err(StorageError::NoAdapterAvailable { tried })
    }

    /// Select among the adapters named in `config`, in their configured order
    pub fn open(env: &Environment, config: &Config) -> StorageResult<Self> {
        let candidates = config.adapters.iter().map(|&kind| {
            let env = env.clone();
            Box::new(move || kind.build(&env)) as AdapterFactory
        });
        Self::select(candidates.collect::<Vec<_>>())
    }

    /// Wrap a single adapter without a priority search
    pub fn with_adapter(adapter: Box<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            writes: AtomicU64::new(0),
        }
    }

    pub fn adapter_name(&self) -> &'static str {
        self.adapter.name()
    }

    pub async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        self.adapter.get_item(key).await
    }

    pub async fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        self.adapter.set_item(key, value).await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.adapter.remove_item(key).await
    }

    pub async fn clear(&self) -> StorageResult<()> {
        self.adapter.clear().await
    }

    pub async fn storage_info(&self) -> StorageResult<StorageInfo> {
        let usage = self.adapter.usage().await?;
        Ok(StorageInfo {
            used: usage.used,
            available: usage.available,
            quota: usage.quota,
            adapter: self.adapter.name(),
        })
    }

    pub fn add_change_listener(&self, listener: ChangeListener) -> ListenerId {
        self.adapter.add_change_listener(listener)
    }

    pub fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.adapter.remove_change_listener(id)
    }

    /// Number of successful writes through this facade
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}
