//! One coordinated context for the duration of a command

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::Mutex;
use tracing::debug;

use studyhub_core::{
    Config, CoordinatorHandle, Environment, HybridStorage, Store, SyncCoordinator, SyncEvent,
};

/// A loaded store backed by the configured storage
pub struct Session {
    config: Config,
    handle: CoordinatorHandle,
}

impl Session {
    /// Select an adapter, start the coordinator and wait for the initial load
    pub async fn open(config: Config) -> Result<Self> {
        let env = Environment::from_config(&config).context("Failed to open storage")?;
        let storage = HybridStorage::open(&env, &config).context("Failed to open storage")?;
        debug!("Opened '{}' storage", storage.adapter_name());

        let mut handle =
            SyncCoordinator::start(Arc::new(storage), Arc::new(Mutex::new(Store::new())));
        handle.ready().await;

        Ok(Self { config, handle })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> Arc<Mutex<Store>> {
        self.handle.store()
    }

    pub fn storage(&self) -> Arc<HybridStorage> {
        self.handle.storage()
    }

    pub fn handle(&self) -> &CoordinatorHandle {
        &self.handle
    }

    /// Wait for pending writes, then stop the coordinator
    ///
    /// Fails if any write made during the session was rejected by storage.
    pub async fn close(mut self) -> Result<()> {
        self.handle.flush().await;

        let mut failure = None;
        while let Ok(event) = self.handle.events().try_recv() {
            if let SyncEvent::PersistFailed(reason) = event {
                failure = Some(reason);
            }
        }

        self.handle.shutdown().await;

        if let Some(reason) = failure {
            bail!("Failed to save changes: {}", reason);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyhub_core::models::Course;
    use studyhub_core::storage::{AdapterKind, ObjectStoreAdapter};
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            adapters: vec![AdapterKind::ObjectStore],
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_changes_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();

        let session = Session::open(test_config(&temp_dir)).await.unwrap();
        assert_eq!(session.storage().adapter_name(), ObjectStoreAdapter::NAME);
        session.store().lock().await.add(Course::new("Chemistry"));
        session.close().await.unwrap();

        let session = Session::open(test_config(&temp_dir)).await.unwrap();
        let titles: Vec<String> = session
            .store()
            .lock()
            .await
            .state()
            .courses
            .iter()
            .map(|c| c.title.clone())
            .collect();
        session.close().await.unwrap();

        assert_eq!(titles, vec!["General", "Chemistry"]);
    }

    #[tokio::test]
    async fn test_rejected_write_fails_close() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            adapters: vec![AdapterKind::Local],
            local_quota_bytes: 64 * 1024,
            ..Config::default()
        };

        let session = Session::open(config).await.unwrap();
        {
            let store = session.store();
            let mut store = store.lock().await;
            let course = store.add(Course::new("Long notes"));
            let mut task = studyhub_core::Task::new(course, "Essay");
            task.notes = "x".repeat(128 * 1024);
            store.add(task);
        }

        assert!(session.close().await.is_err());
    }
}
