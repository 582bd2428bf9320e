//! Embedded object-store adapter (SQLite)
//!
//! Values are serialized to JSON text before they reach the database and
//! parsed back on read. The schema is applied lazily on the first operation.
//! SQLite does not tell other contexts about writes, so every write is
//! followed by a sync signal on the local area.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::adapter::{
    Capacity, ChangeListener, ListenerId, ListenerSet, StorageAdapter, StorageChange,
    StorageUsage,
};
use super::environment::Environment;
use super::error::{StorageError, StorageResult};
use super::schema::migrate;
use super::signal::{SignalChannel, SyncSignal};

/// Where the object database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    InMemory,
}

/// A lazily opened SQLite database shared by every context of the process
pub struct ObjectDatabase {
    location: DatabaseLocation,
    conn: Mutex<Option<Connection>>,
    closed: AtomicBool,
}

impl ObjectDatabase {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self::new(DatabaseLocation::File(path.into()))
    }

    pub fn in_memory() -> Self {
        Self::new(DatabaseLocation::InMemory)
    }

    fn new(location: DatabaseLocation) -> Self {
        Self {
            location,
            conn: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    /// Close the connection; later operations fail with `ConnectionClosed`
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.conn.lock() {
            guard.take();
        }
    }

    fn open(&self) -> StorageResult<Connection> {
        let mut conn = match &self.location {
            DatabaseLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
            DatabaseLocation::InMemory => Connection::open_in_memory()?,
        };

        let applied = migrate(&mut conn)?;
        if applied > 0 {
            debug!("Applied {} object store migration(s)", applied);
        }

        debug!("Opened object store at {:?}", self.location);
        Ok(conn)
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> StorageResult<T> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionClosed(
                "object store has been closed".to_string(),
            ));
        }

        let mut guard = self
            .conn
            .lock()
            .map_err(|_| StorageError::ConnectionClosed("object store lock poisoned".to_string()))?;
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(StorageError::ConnectionClosed(
                "object store connection unavailable".to_string(),
            ));
        };

        Ok(f(conn)?)
    }

    pub fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM objects WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Insert or replace a value, returning the previous one
    pub fn put(&self, key: &str, value: &str) -> StorageResult<Option<String>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let old: Option<String> = tx
                .query_row(
                    "SELECT value FROM objects WHERE key = ?",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            tx.execute(
                "INSERT OR REPLACE INTO objects (key, value, updated_at) VALUES (?, ?, ?)",
                params![key, value, Utc::now().timestamp_millis()],
            )?;
            tx.commit()?;
            Ok(old)
        })
    }

    /// Delete a value, returning the previous one
    pub fn delete(&self, key: &str) -> StorageResult<Option<String>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let old: Option<String> = tx
                .query_row(
                    "SELECT value FROM objects WHERE key = ?",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            tx.execute("DELETE FROM objects WHERE key = ?", params![key])?;
            tx.commit()?;
            Ok(old)
        })
    }

    /// Delete everything, returning the removed entries
    pub fn clear(&self) -> StorageResult<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let removed = {
                let mut stmt = tx.prepare("SELECT key, value FROM objects ORDER BY key")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<rusqlite::Result<Vec<(String, String)>>>()?
            };
            tx.execute("DELETE FROM objects", [])?;
            tx.commit()?;
            Ok(removed)
        })
    }

    /// Sum of key and value byte lengths
    pub fn bytes_in_use(&self) -> StorageResult<u64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0) FROM objects",
                [],
                |row| row.get::<_, i64>(0),
            )
        })
        .map(|n| n.max(0) as u64)
    }
}

/// Adapter over the SQLite object store
pub struct ObjectStoreAdapter {
    db: Option<Arc<ObjectDatabase>>,
    listeners: Arc<ListenerSet>,
    signals: Arc<SignalChannel>,
}

impl ObjectStoreAdapter {
    pub const NAME: &'static str = "object_store";

    pub fn new(db: Option<Arc<ObjectDatabase>>, signals: Arc<SignalChannel>) -> Self {
        let listeners = ListenerSet::new();

        if let Some(db) = &db {
            let relay = RemoteRelay::start(Arc::clone(db), Arc::clone(&listeners));
            signals.attach(move |signal| relay.relay(signal));
        }

        Self {
            db,
            listeners,
            signals,
        }
    }

    pub fn from_env(env: &Environment) -> Self {
        Self::new(env.object_database(), env.signal_channel())
    }

    fn database(&self) -> StorageResult<Arc<ObjectDatabase>> {
        self.db.clone().ok_or_else(|| {
            StorageError::ConnectionClosed("object store is not available".to_string())
        })
    }
}

/// Run a database call on the blocking pool
async fn blocking<T, F>(db: Arc<ObjectDatabase>, f: F) -> StorageResult<T>
where
    F: FnOnce(&ObjectDatabase) -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| StorageError::ConnectionClosed(format!("object store task failed: {}", e)))?
}

fn decode(key: &str, text: &str) -> Option<Value> {
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Discarding unparseable value for '{}': {}", key, e);
            None
        }
    }
}

/// Reads keys announced by other contexts, one signal at a time
///
/// Each read sees the database as it is when the read runs and reads never
/// overlap, so the last change dispatched carries the latest value.
enum RemoteRelay {
    Queued(mpsc::UnboundedSender<SyncSignal>),
    /// No runtime to run on: read on the signalling thread
    Inline(Arc<ObjectDatabase>, Arc<ListenerSet>),
}

impl RemoteRelay {
    fn start(db: Arc<ObjectDatabase>, listeners: Arc<ListenerSet>) -> Self {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return Self::Inline(db, listeners);
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<SyncSignal>();
        handle.spawn(async move {
            while let Some(signal) = rx.recv().await {
                let db = Arc::clone(&db);
                let listeners = Arc::clone(&listeners);
                let read = tokio::task::spawn_blocking(move || relay_remote(&db, &listeners, signal));
                if let Err(e) = read.await {
                    warn!("Object store relay read failed: {}", e);
                }
            }
            debug!("Object store relay stopped");
        });
        Self::Queued(tx)
    }

    fn relay(&self, signal: SyncSignal) {
        match self {
            Self::Queued(tx) => {
                if tx.send(signal).is_err() {
                    debug!("Dropping sync signal, relay has stopped");
                }
            }
            Self::Inline(db, listeners) => relay_remote(db, listeners, signal),
        }
    }
}

/// Re-read a key announced by another context and tell our listeners
fn relay_remote(db: &ObjectDatabase, listeners: &ListenerSet, signal: SyncSignal) {
    let new_value = match db.get(&signal.key) {
        Ok(text) => text.and_then(|t| decode(&signal.key, &t)),
        Err(e) => {
            warn!("Failed to read '{}' after sync signal: {}", signal.key, e);
            return;
        }
    };
    listeners.dispatch(&StorageChange {
        key: signal.key,
        new_value,
        old_value: signal.old_value,
    });
}

#[async_trait]
impl StorageAdapter for ObjectStoreAdapter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_available(&self) -> bool {
        self.db.is_some()
    }

    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        let owned = key.to_string();
        let text = blocking(self.database()?, move |db| db.get(&owned))
            .await
            .inspect_err(|e| warn!("Object store read of '{}' failed: {}", key, e))?;
        Ok(text.and_then(|t| decode(key, &t)))
    }

    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        let text = serde_json::to_string(&value).map_err(|e| StorageError::serialization(key, e))?;
        let owned = key.to_string();
        let old = blocking(self.database()?, move |db| db.put(&owned, &text))
            .await
            .inspect_err(|e| warn!("Object store write of '{}' failed: {}", key, e))?;

        let old_value = old.and_then(|t| decode(key, &t));
        self.listeners.dispatch(&StorageChange {
            key: key.to_string(),
            new_value: Some(value),
            old_value: old_value.clone(),
        });
        self.signals.post(key, old_value.as_ref());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        let owned = key.to_string();
        let old = blocking(self.database()?, move |db| db.delete(&owned))
            .await
            .inspect_err(|e| warn!("Object store delete of '{}' failed: {}", key, e))?;

        if let Some(old) = old {
            let old_value = decode(key, &old);
            self.listeners.dispatch(&StorageChange {
                key: key.to_string(),
                new_value: None,
                old_value: old_value.clone(),
            });
            self.signals.post(key, old_value.as_ref());
        }
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        let removed = blocking(self.database()?, |db| db.clear())
            .await
            .inspect_err(|e| warn!("Object store clear failed: {}", e))?;

        for (key, old) in removed {
            let old_value = decode(&key, &old);
            self.listeners.dispatch(&StorageChange {
                key: key.clone(),
                new_value: None,
                old_value: old_value.clone(),
            });
            self.signals.post(&key, old_value.as_ref());
        }
        Ok(())
    }

    async fn usage(&self) -> StorageResult<StorageUsage> {
        let used = blocking(self.database()?, |db| db.bytes_in_use()).await?;
        Ok(StorageUsage::new(used, Capacity::Unbounded))
    }

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}
