//! Persistence and sync coordinator
//!
//! Keeps one context's store and the persisted snapshot in step:
//!
//! 1. Load the snapshot (or defaults) and apply it to the store
//! 2. Persist once, normalizing older payload shapes
//! 3. Persist the exported payload after every local mutation
//! 4. Import snapshots written by other contexts
//!
//! Step 4 runs under a [`SuppressionGuard`], so an imported snapshot is
//! never written back, and a change carrying our own last write is dropped.
//! All storage access happens on one background task, serially.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::flags::{SuppressionGuard, SyncFlags};
use crate::models::AppState;
use crate::storage::{HybridStorage, ListenerId, StorageChange, StorageError, StorageResult};
use crate::store::{Store, SubscriptionId};
use crate::transfer::{
    export_payload, import_json, import_payload, read_import_file, write_export_file,
    ExchangePayload, ImportMode, TransferError,
};

/// Storage key of the persisted exchange payload
pub const PERSISTENCE_KEY: &str = "studyhub-state";

/// Progress of the initial load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Initializing,
    Ready,
}

/// Events from the sync task
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Initial state applied
    Loaded { from_storage: bool },
    /// A snapshot was written
    Persisted,
    /// A write failed; the next mutation will try again
    PersistFailed(String),
    /// A snapshot from another context was imported
    RemoteApplied,
    /// A snapshot from another context could not be imported
    RemoteRejected(String),
}

/// Commands sent to the sync task
#[derive(Debug)]
enum SyncCommand {
    /// Persist the current state now
    PersistNow(oneshot::Sender<StorageResult<()>>),
    /// Reply once everything queued so far is handled
    Flush(oneshot::Sender<()>),
    /// Finish queued writes and stop
    Shutdown,
}

/// Starts the coordinator for one context
pub struct SyncCoordinator;

impl SyncCoordinator {
    /// Spawn the sync task; must be called within a tokio runtime
    ///
    /// The returned handle reports [`LoadState::Initializing`] until the
    /// initial load and first persist are done.
    pub fn start(storage: Arc<HybridStorage>, store: Arc<Mutex<Store>>) -> CoordinatorHandle {
        let flags = Arc::new(SyncFlags::new());
        let (load_tx, load_rx) = watch::channel(LoadState::Initializing);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();

        // Registered before the load so no change from another context is missed
        let listener = storage.add_change_listener(Arc::new(move |change: &StorageChange| {
            if change.key == PERSISTENCE_KEY {
                let _ = remote_tx.send(change.clone());
            }
        }));

        let task = SyncTask {
            storage: Arc::clone(&storage),
            store: Arc::clone(&store),
            flags: Arc::clone(&flags),
            load_tx,
            event_tx,
            last_written: None,
        };
        let task = tokio::spawn(task.run(listener, remote_rx, command_rx));

        CoordinatorHandle {
            storage,
            store,
            flags,
            load_rx,
            command_tx,
            event_rx,
            task: Some(task),
        }
    }
}

/// Handle for controlling the sync task of one context
pub struct CoordinatorHandle {
    storage: Arc<HybridStorage>,
    store: Arc<Mutex<Store>>,
    flags: Arc<SyncFlags>,
    load_rx: watch::Receiver<LoadState>,
    command_tx: mpsc::Sender<SyncCommand>,
    event_rx: mpsc::UnboundedReceiver<SyncEvent>,
    task: Option<JoinHandle<()>>,
}

impl CoordinatorHandle {
    pub fn store(&self) -> Arc<Mutex<Store>> {
        Arc::clone(&self.store)
    }

    pub fn storage(&self) -> Arc<HybridStorage> {
        Arc::clone(&self.storage)
    }

    pub fn flags(&self) -> Arc<SyncFlags> {
        Arc::clone(&self.flags)
    }

    pub fn load_state(&self) -> LoadState {
        *self.load_rx.borrow()
    }

    /// Wait until the initial load is done
    pub async fn ready(&mut self) {
        // An error means the task is gone, so there is nothing left to wait for
        let _ = self
            .load_rx
            .wait_for(|state| *state == LoadState::Ready)
            .await;
    }

    /// Events emitted by the sync task
    pub fn events(&mut self) -> &mut mpsc::UnboundedReceiver<SyncEvent> {
        &mut self.event_rx
    }

    /// Persist the current state immediately
    pub async fn persist_now(&self) -> StorageResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SyncCommand::PersistNow(reply_tx))
            .await
            .map_err(|_| closed())?;
        reply_rx.await.map_err(|_| closed())?
    }

    /// Wait until every write and remote change queued so far is handled
    pub async fn flush(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(SyncCommand::Flush(reply_tx)).await.is_ok() {
            let _ = reply_rx.await;
        }
    }

    /// Write the current state to an export file
    pub async fn export_file(&self, path: &Path) -> Result<(), TransferError> {
        let store = self.store.lock().await;
        write_export_file(path, store.state())
    }

    /// Import an export file into the store
    ///
    /// Returns false, leaving the state untouched, if the file cannot be
    /// read or is not a valid payload. A successful import is persisted
    /// like any other mutation.
    pub async fn import_file(&self, path: &Path) -> bool {
        let text = match read_import_file(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Import failed: {}", e);
                return false;
            }
        };

        let mut store = self.store.lock().await;
        match import_json(&mut store, &text, ImportMode::File) {
            Ok(summary) => {
                info!(
                    "Imported {} records ({} merged) from {}",
                    summary.records,
                    summary.matched,
                    path.display()
                );
                true
            }
            Err(e) => {
                warn!("Import of {} failed: {}", path.display(), e);
                false
            }
        }
    }

    /// Finish queued writes, then stop the sync task
    pub async fn shutdown(mut self) {
        let _ = self.command_tx.send(SyncCommand::Shutdown).await;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Sync task ended abnormally: {}", e);
            }
        }
    }
}

fn closed() -> StorageError {
    StorageError::ConnectionClosed("sync task has stopped".to_string())
}

/// State owned by the background task
struct SyncTask {
    storage: Arc<HybridStorage>,
    store: Arc<Mutex<Store>>,
    flags: Arc<SyncFlags>,
    load_tx: watch::Sender<LoadState>,
    event_tx: mpsc::UnboundedSender<SyncEvent>,
    /// Payload of our latest write, to recognise its echo
    last_written: Option<Value>,
}

impl SyncTask {
    async fn run(
        mut self,
        listener: ListenerId,
        mut remote_rx: mpsc::UnboundedReceiver<StorageChange>,
        mut command_rx: mpsc::Receiver<SyncCommand>,
    ) {
        let (persist_tx, mut persist_rx) = mpsc::unbounded_channel();
        let subscription = self.load(persist_tx).await;

        // Remote changes first: the echo of a write is queued before the
        // next write can start, so it is always compared against it
        loop {
            tokio::select! {
                biased;

                Some(change) = remote_rx.recv() => self.apply_remote(change).await,
                Some(payload) = persist_rx.recv() => {
                    // Failures are logged and reported as events inside persist
                    let _ = self.persist(payload).await;
                }
                command = command_rx.recv() => match command {
                    Some(SyncCommand::PersistNow(reply)) => {
                        let payload = self.export_current().await;
                        let _ = reply.send(self.persist(payload).await);
                    }
                    Some(SyncCommand::Flush(reply)) => {
                        let _ = reply.send(());
                    }
                    Some(SyncCommand::Shutdown) | None => break,
                },
            }
        }

        while let Ok(payload) = persist_rx.try_recv() {
            let _ = self.persist(payload).await;
        }

        self.storage.remove_change_listener(listener);
        self.store.lock().await.unsubscribe(subscription);
        debug!("Sync task stopped");
    }

    /// Apply the persisted snapshot, or defaults, then persist once
    async fn load(&mut self, persist_tx: mpsc::UnboundedSender<Value>) -> SubscriptionId {
        let (snapshot, from_storage) = self.read_snapshot().await;

        let mut store = self.store.lock().await;
        let flags = Arc::clone(&self.flags);
        let subscription = store.subscribe(move |_, state| {
            if flags.should_persist() {
                let _ = persist_tx.send(export_payload(state).to_value());
            }
        });

        {
            let _guard = SuppressionGuard::engage(&self.flags);
            store.patch_state(snapshot);
        }
        self.flags.set_store_ready();
        let initial = export_payload(store.state()).to_value();
        drop(store);

        info!(
            "Loaded state from {}",
            if from_storage { "storage" } else { "defaults" }
        );
        let _ = self.event_tx.send(SyncEvent::Loaded { from_storage });

        let _ = self.persist(initial).await;
        let _ = self.load_tx.send(LoadState::Ready);
        subscription
    }

    async fn read_snapshot(&self) -> (AppState, bool) {
        let value = match self.storage.get_item(PERSISTENCE_KEY).await {
            Ok(Some(value)) => value,
            Ok(None) => return (AppState::default(), false),
            Err(e) => {
                warn!("Failed to read persisted state, using defaults: {}", e);
                return (AppState::default(), false);
            }
        };

        let mut snapshot = AppState::default();
        let imported = ExchangePayload::from_value(value)
            .and_then(|payload| import_payload(&mut snapshot, payload, ImportMode::Sync));
        match imported {
            Ok(_) => (snapshot, true),
            Err(e) => {
                warn!("Persisted state is unusable, using defaults: {}", e);
                (AppState::default(), false)
            }
        }
    }

    async fn export_current(&self) -> Value {
        let store = self.store.lock().await;
        export_payload(store.state()).to_value()
    }

    async fn persist(&mut self, payload: Value) -> StorageResult<()> {
        self.last_written = Some(payload.clone());
        match self.storage.set_item(PERSISTENCE_KEY, payload).await {
            Ok(()) => {
                debug!("Persisted state via {}", self.storage.adapter_name());
                let _ = self.event_tx.send(SyncEvent::Persisted);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to persist state: {}", e);
                if let Some(hint) = e.recovery_suggestion() {
                    debug!("{}", hint);
                }
                let _ = self.event_tx.send(SyncEvent::PersistFailed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn apply_remote(&mut self, change: StorageChange) {
        let Some(value) = change.new_value else {
            debug!("Persisted state was removed by another context");
            return;
        };
        if self.last_written.as_ref() == Some(&value) {
            debug!("Ignoring echo of our own write");
            return;
        }

        let mut store = self.store.lock().await;
        let mut next = store.state().clone();
        let imported = ExchangePayload::from_value(value)
            .and_then(|payload| import_payload(&mut next, payload, ImportMode::Sync));

        match imported {
            Ok(_) => {
                let _guard = SuppressionGuard::engage(&self.flags);
                store.patch_state(next);
                debug!("Applied state from another context");
                let _ = self.event_tx.send(SyncEvent::RemoteApplied);
            }
            Err(e) => {
                warn!("Rejected state from another context: {}", e);
                let _ = self.event_tx.send(SyncEvent::RemoteRejected(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Course, Task};
    use crate::storage::{Environment, ExtensionAdapter, ExtensionArea, MemoryAdapter};

    fn extension_storage(env: &Environment) -> Arc<HybridStorage> {
        Arc::new(HybridStorage::with_adapter(Box::new(ExtensionAdapter::from_env(env))))
    }

    async fn started(storage: Arc<HybridStorage>) -> CoordinatorHandle {
        let mut handle = SyncCoordinator::start(storage, Arc::new(Mutex::new(Store::new())));
        handle.ready().await;
        handle
    }

    #[tokio::test]
    async fn test_first_run_uses_defaults_and_persists_once() {
        let env = Environment::builder().build();
        let storage = Arc::new(HybridStorage::with_adapter(Box::new(MemoryAdapter::from_env(&env))));
        let mut handle = started(Arc::clone(&storage)).await;

        assert_eq!(handle.load_state(), LoadState::Ready);
        assert_eq!(storage.write_count(), 1);
        assert_eq!(
            handle.events().recv().await,
            Some(SyncEvent::Loaded { from_storage: false })
        );
        assert_eq!(handle.events().recv().await, Some(SyncEvent::Persisted));

        let stored = storage.get_item(PERSISTENCE_KEY).await.unwrap().unwrap();
        assert_eq!(stored["settings"]["courses"][0]["title"], "General");
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_each_local_mutation_is_persisted() {
        let env = Environment::builder()
            .extension_area(Arc::new(ExtensionArea::unlimited()))
            .build();
        let storage = extension_storage(&env);
        let handle = started(Arc::clone(&storage)).await;

        {
            let store = handle.store();
            let mut store = store.lock().await;
            let course = store.add(Course::new("Chemistry"));
            store.add(Task::new(course, "Lab report"));
        }
        handle.flush().await;

        assert_eq!(storage.write_count(), 3);
        let stored = storage.get_item(PERSISTENCE_KEY).await.unwrap().unwrap();
        assert_eq!(stored["tasks"][0]["course"], "Chemistry");
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_reload_restores_state() {
        let env = Environment::builder()
            .extension_area(Arc::new(ExtensionArea::unlimited()))
            .build();

        let first = started(extension_storage(&env)).await;
        {
            let store = first.store();
            let mut store = store.lock().await;
            let course = store.state().courses[0].id;
            store.add(Task::new(course, "Essay"));
        }
        first.shutdown().await;

        let mut second = started(extension_storage(&env.spawn_context())).await;
        assert_eq!(
            second.events().recv().await,
            Some(SyncEvent::Loaded { from_storage: true })
        );
        let store = second.store();
        assert_eq!(store.lock().await.state().tasks[0].title, "Essay");
        second.shutdown().await;
    }

    #[tokio::test]
    async fn test_unusable_snapshot_falls_back_to_defaults() {
        let env = Environment::builder()
            .extension_area(Arc::new(ExtensionArea::unlimited()))
            .build();
        let storage = extension_storage(&env);
        storage
            .set_item(PERSISTENCE_KEY, Value::String("garbage".to_string()))
            .await
            .unwrap();

        let mut handle = started(Arc::clone(&storage)).await;
        assert_eq!(
            handle.events().recv().await,
            Some(SyncEvent::Loaded { from_storage: false })
        );
        let store = handle.store();
        assert_eq!(store.lock().await.state().courses[0].title, "General");
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_persist_failure_is_reported_not_fatal() {
        let env = Environment::builder()
            .extension_area(Arc::new(ExtensionArea::new(64)))
            .build();
        let storage = extension_storage(&env);
        let mut handle = started(Arc::clone(&storage)).await;

        assert_eq!(
            handle.events().recv().await,
            Some(SyncEvent::Loaded { from_storage: false })
        );
        assert!(matches!(
            handle.events().recv().await,
            Some(SyncEvent::PersistFailed(_))
        ));
        assert!(handle.persist_now().await.is_err());
        assert_eq!(storage.write_count(), 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_writes() {
        let env = Environment::builder()
            .extension_area(Arc::new(ExtensionArea::unlimited()))
            .build();
        let storage = extension_storage(&env);
        let handle = started(Arc::clone(&storage)).await;

        {
            let store = handle.store();
            let mut store = store.lock().await;
            store.add_water(1);
            store.add_water(1);
        }
        handle.shutdown().await;

        assert_eq!(storage.write_count(), 3);
        let stored = storage.get_item(PERSISTENCE_KEY).await.unwrap().unwrap();
        assert_eq!(stored["wellness"]["water"], 2);
    }
}
