//! In-memory adapter
//!
//! Last-resort fallback over the process-wide [`MemoryArea`]. Nothing
//! survives a restart and the quota is unbounded. Like the object store, it
//! announces writes to other contexts through sync signals.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::adapter::{
    Capacity, ChangeListener, ListenerId, ListenerSet, StorageAdapter, StorageChange,
    StorageUsage,
};
use super::environment::Environment;
use super::error::StorageResult;
use super::medium::MemoryArea;
use super::signal::SignalChannel;

pub struct MemoryAdapter {
    area: Arc<MemoryArea>,
    listeners: Arc<ListenerSet>,
    signals: Arc<SignalChannel>,
}

impl MemoryAdapter {
    pub const NAME: &'static str = "memory";

    pub fn new(area: Arc<MemoryArea>, signals: Arc<SignalChannel>) -> Self {
        let listeners = ListenerSet::new();

        let reader = Arc::clone(&area);
        let relay = Arc::clone(&listeners);
        signals.attach(move |signal| {
            relay.dispatch(&StorageChange {
                new_value: reader.get(&signal.key),
                key: signal.key,
                old_value: signal.old_value,
            });
        });

        Self {
            area,
            listeners,
            signals,
        }
    }

    pub fn from_env(env: &Environment) -> Self {
        Self::new(env.memory_area(), env.signal_channel())
    }

    fn announce(&self, key: &str, new_value: Option<Value>, old_value: Option<Value>) {
        self.signals.post(key, old_value.as_ref());
        self.listeners.dispatch(&StorageChange {
            key: key.to_string(),
            new_value,
            old_value,
        });
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.area.get(key))
    }

    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        let old = self.area.set(key, value.clone());
        self.announce(key, Some(value), old);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        if let Some(old) = self.area.remove(key) {
            self.announce(key, None, Some(old));
        }
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        for (key, old) in self.area.clear() {
            self.announce(&key, None, Some(old));
        }
        Ok(())
    }

    async fn usage(&self) -> StorageResult<StorageUsage> {
        Ok(StorageUsage::new(self.area.bytes_in_use(), Capacity::Unbounded))
    }

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}
