//! Synchronous key-value adapter
//!
//! Backed by the origin-scoped [`LocalArea`]. Values are stored as JSON text.
//! The area broadcasts writes to other contexts on its own, but never to the
//! writing context, so this adapter informs its own listeners by hand.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::adapter::{
    Capacity, ChangeListener, ListenerId, ListenerSet, StorageAdapter, StorageChange,
    StorageUsage,
};
use super::environment::Environment;
use super::error::{StorageError, StorageResult};
use super::medium::{ContextId, LocalArea, SubscriberId, TextChange};

pub struct LocalAdapter {
    area: Option<Arc<LocalArea>>,
    context: ContextId,
    listeners: Arc<ListenerSet>,
    subscription: Option<SubscriberId>,
}

impl LocalAdapter {
    pub const NAME: &'static str = "local";

    pub fn from_env(env: &Environment) -> Self {
        let area = env.local_area();
        let listeners = ListenerSet::new();

        let subscription = area.as_ref().map(|area| {
            let relay = Arc::clone(&listeners);
            area.subscribe(
                env.context(),
                Arc::new(move |change: &TextChange| relay.dispatch(&parse_change(change))),
            )
        });

        Self {
            area,
            context: env.context(),
            listeners,
            subscription,
        }
    }

    fn area(&self) -> StorageResult<&LocalArea> {
        self.area.as_deref().ok_or_else(|| {
            StorageError::ConnectionClosed("local storage is not available".to_string())
        })
    }
}

impl Drop for LocalAdapter {
    fn drop(&mut self) {
        if let (Some(area), Some(id)) = (&self.area, self.subscription) {
            area.unsubscribe(id);
        }
    }
}

/// Parse stored text; text that is not JSON is surfaced as a plain string
fn parse_text(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn parse_change(change: &TextChange) -> StorageChange {
    StorageChange {
        key: change.key.clone(),
        new_value: change.new_value.as_deref().map(parse_text),
        old_value: change.old_value.as_deref().map(parse_text),
    }
}

#[async_trait]
impl StorageAdapter for LocalAdapter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_available(&self) -> bool {
        self.area.is_some()
    }

    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        let Some(text) = self.area()?.get(key) else {
            return Ok(None);
        };
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Discarding unparseable local value for '{}': {}", key, e);
                Ok(None)
            }
        }
    }

    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        let text = serde_json::to_string(&value).map_err(|e| StorageError::serialization(key, e))?;
        let old = self
            .area()?
            .set(key, text, self.context)
            .inspect_err(|e| warn!("Local storage write of '{}' failed: {}", key, e))?;

        self.listeners.dispatch(&StorageChange {
            key: key.to_string(),
            new_value: Some(value),
            old_value: old.as_deref().map(parse_text),
        });
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        let old = self
            .area()?
            .remove(key, self.context)
            .inspect_err(|e| warn!("Local storage delete of '{}' failed: {}", key, e))?;

        if let Some(old) = old {
            self.listeners.dispatch(&StorageChange {
                key: key.to_string(),
                new_value: None,
                old_value: Some(parse_text(&old)),
            });
        }
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        let removed = self
            .area()?
            .clear(self.context)
            .inspect_err(|e| warn!("Local storage clear failed: {}", e))?;

        for (key, old) in removed {
            self.listeners.dispatch(&StorageChange {
                key,
                new_value: None,
                old_value: Some(parse_text(&old)),
            });
        }
        Ok(())
    }

    async fn usage(&self) -> StorageResult<StorageUsage> {
        let area = self.area()?;
        Ok(StorageUsage::new(
            area.bytes_in_use(),
            Capacity::Bytes(area.quota()),
        ))
    }

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}
