//! Cross-context sync signals
//!
//! Media without native change broadcast (the SQLite object store and the
//! in-process memory map) announce their writes by posting a small
//! [`SyncSignal`] on the local area, which does broadcast to other contexts.
//! The signal removes itself after a short delay.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::medium::{ContextId, LocalArea, SubscriberId, TextChange};

/// Key under which signals are written to the local area
pub const SYNC_SIGNAL_KEY: &str = "studyhub-sync-signal";

/// Default lifetime of a posted signal
pub const DEFAULT_SIGNAL_TTL: Duration = Duration::from_millis(100);

/// Old values larger than this are left out of the signal
const MAX_SIGNAL_OLD_VALUE_BYTES: usize = 64 * 1024;

/// How many of our own timestamps we remember
const OWN_TIMESTAMP_HISTORY: usize = 64;

/// Signal action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Updated,
}

/// Marker record announcing a write to `key`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSignal {
    /// Microseconds since the epoch, unique per posting channel
    pub timestamp: i64,
    pub action: SignalAction,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
}

/// Posts and receives sync signals for one adapter
pub struct SignalChannel {
    context: ContextId,
    local: Option<Arc<LocalArea>>,
    ttl: Duration,
    last_timestamp: AtomicI64,
    own: Mutex<VecDeque<i64>>,
    subscription: Mutex<Option<SubscriberId>>,
}

impl SignalChannel {
    pub fn new(context: ContextId, local: Option<Arc<LocalArea>>, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            context,
            local,
            ttl,
            last_timestamp: AtomicI64::new(0),
            own: Mutex::new(VecDeque::with_capacity(OWN_TIMESTAMP_HISTORY)),
            subscription: Mutex::new(None),
        })
    }

    /// Whether a local area is reachable to carry signals
    pub fn is_connected(&self) -> bool {
        self.local.is_some()
    }

    /// Announce a write to `key`
    ///
    /// Failures are logged; the write that triggered the signal has already
    /// succeeded and stays valid.
    pub fn post(&self, key: &str, old_value: Option<&Value>) {
        let Some(local) = &self.local else {
            debug!("No local area, skipping sync signal for '{}'", key);
            return;
        };

        let old_value = old_value
            .filter(|v| v.to_string().len() <= MAX_SIGNAL_OLD_VALUE_BYTES)
            .cloned();
        let signal = SyncSignal {
            timestamp: self.next_timestamp(),
            action: SignalAction::Updated,
            key: key.to_string(),
            old_value,
        };

        let text = match serde_json::to_string(&signal) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode sync signal for '{}': {}", key, e);
                return;
            }
        };

        self.remember(signal.timestamp);
        if let Err(e) = local.set(SYNC_SIGNAL_KEY, text.clone(), self.context) {
            warn!("Failed to post sync signal for '{}': {}", key, e);
            return;
        }

        self.schedule_expiry(Arc::clone(local), text);
    }

    /// Receive signals posted by other contexts
    pub fn attach<F>(self: &Arc<Self>, on_remote: F)
    where
        F: Fn(SyncSignal) + Send + Sync + 'static,
    {
        let Some(local) = &self.local else {
            return;
        };

        let channel = Arc::downgrade(self);
        let id = local.subscribe(
            self.context,
            Arc::new(move |change: &TextChange| {
                if change.key != SYNC_SIGNAL_KEY {
                    return;
                }
                let Some(text) = &change.new_value else {
                    return;
                };
                let Some(channel) = channel.upgrade() else {
                    return;
                };

                match serde_json::from_str::<SyncSignal>(text) {
                    Ok(signal) if channel.is_own(signal.timestamp) => {}
                    Ok(signal) => on_remote(signal),
                    Err(e) => debug!("Ignoring malformed sync signal: {}", e),
                }
            }),
        );

        let previous = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(id);
        if let Some(previous) = previous {
            local.unsubscribe(previous);
        }
    }

    fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let previous = self
            .last_timestamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    fn remember(&self, timestamp: i64) {
        let mut own = self.own.lock().unwrap_or_else(PoisonError::into_inner);
        if own.len() == OWN_TIMESTAMP_HISTORY {
            own.pop_front();
        }
        own.push_back(timestamp);
    }

    fn is_own(&self, timestamp: i64) -> bool {
        self.own
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&timestamp)
    }

    fn schedule_expiry(&self, local: Arc<LocalArea>, text: String) {
        let context = self.context;
        let ttl = self.ttl;
        let expire = move |local: Arc<LocalArea>| {
            if let Err(e) = local.remove_if(SYNC_SIGNAL_KEY, &text, context) {
                warn!("Failed to remove expired sync signal: {}", e);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(ttl).await;
                    expire(local);
                });
            }
            Err(_) => expire(local),
        }
    }
}

impl Drop for SignalChannel {
    fn drop(&mut self) {
        let subscription = self
            .subscription
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let (Some(local), Some(id)) = (&self.local, subscription) {
            local.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_pair(local: &Arc<LocalArea>) -> (Arc<SignalChannel>, Arc<SignalChannel>) {
        let ttl = Duration::from_millis(20);
        (
            SignalChannel::new(ContextId::new(), Some(Arc::clone(local)), ttl),
            SignalChannel::new(ContextId::new(), Some(Arc::clone(local)), ttl),
        )
    }

    #[test]
    fn test_signal_wire_format() {
        let signal = SyncSignal {
            timestamp: 42,
            action: SignalAction::Updated,
            key: "studyhub-state".to_string(),
            old_value: None,
        };
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["action"], "updated");
        assert_eq!(json["timestamp"], 42);
        assert!(json.get("oldValue").is_none());
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let channel = SignalChannel::new(ContextId::new(), None, DEFAULT_SIGNAL_TTL);
        let a = channel.next_timestamp();
        let b = channel.next_timestamp();
        let c = channel.next_timestamp();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_remote_signal_delivered_and_expires() {
        let local = Arc::new(LocalArea::in_memory(1024 * 1024));
        let (sender, receiver) = channel_pair(&local);

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        receiver.attach(move |signal| sink.lock().unwrap().push(signal));

        sender.post("studyhub-state", Some(&Value::from("old")));

        {
            let received = received.lock().unwrap();
            assert_eq!(received.len(), 1);
            assert_eq!(received[0].key, "studyhub-state");
            assert_eq!(received[0].old_value, Some(Value::from("old")));
        }
        assert!(local.get(SYNC_SIGNAL_KEY).is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(local.get(SYNC_SIGNAL_KEY).is_none());
    }

    #[tokio::test]
    async fn test_own_signal_ignored_when_sharing_context() {
        let local = Arc::new(LocalArea::in_memory(1024 * 1024));
        let context = ContextId::new();
        let channel = SignalChannel::new(context, Some(Arc::clone(&local)), DEFAULT_SIGNAL_TTL);

        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        channel.attach(move |_| *counter.lock().unwrap() += 1);

        channel.post("key", None);
        // Re-deliver our own signal as if another context had echoed it
        let echoed = local.get(SYNC_SIGNAL_KEY).unwrap();
        local.set(SYNC_SIGNAL_KEY, echoed, ContextId::new()).unwrap();

        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[test]
    fn test_post_without_local_area_is_noop() {
        let channel = SignalChannel::new(ContextId::new(), None, DEFAULT_SIGNAL_TTL);
        assert!(!channel.is_connected());
        channel.post("key", None);
    }
}
