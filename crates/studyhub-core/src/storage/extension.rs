//! Extension-scoped storage adapter
//!
//! Backed by the extension's own storage area. Values are stored as
//! structured JSON and every change is broadcast by the area itself to all
//! contexts of the extension, including the one that wrote it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::adapter::{
    ChangeListener, ListenerId, ListenerSet, StorageAdapter, StorageChange, StorageUsage,
};
use super::environment::Environment;
use super::error::{StorageError, StorageResult};
use super::medium::{ExtensionArea, SubscriberId};

pub struct ExtensionAdapter {
    area: Option<Arc<ExtensionArea>>,
    listeners: Arc<ListenerSet>,
    subscription: Option<SubscriberId>,
}

impl ExtensionAdapter {
    pub const NAME: &'static str = "extension";

    pub fn from_env(env: &Environment) -> Self {
        let area = env.extension_area();
        let listeners = ListenerSet::new();

        let subscription = area.as_ref().map(|area| {
            let relay = Arc::clone(&listeners);
            area.subscribe(
                env.context(),
                Arc::new(move |change: &StorageChange| relay.dispatch(change)),
            )
        });

        Self {
            area,
            listeners,
            subscription,
        }
    }

    fn area(&self) -> StorageResult<&ExtensionArea> {
        self.area.as_deref().ok_or_else(|| {
            StorageError::ConnectionClosed("extension storage is not available".to_string())
        })
    }
}

impl Drop for ExtensionAdapter {
    fn drop(&mut self) {
        if let (Some(area), Some(id)) = (&self.area, self.subscription) {
            area.unsubscribe(id);
        }
    }
}

#[async_trait]
impl StorageAdapter for ExtensionAdapter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_available(&self) -> bool {
        self.area.is_some()
    }

    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.area()?.get(key))
    }

    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        self.area()?
            .set(key, value)
            .inspect_err(|e| warn!("Extension storage write of '{}' failed: {}", key, e))
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.area()?.remove(key);
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.area()?.clear();
        Ok(())
    }

    async fn usage(&self) -> StorageResult<StorageUsage> {
        let area = self.area()?;
        Ok(StorageUsage::new(area.bytes_in_use(), area.quota()))
    }

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}
