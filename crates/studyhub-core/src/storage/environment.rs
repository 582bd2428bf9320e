//! Execution environment
//!
//! An [`Environment`] is what one execution context can reach: its own
//! [`ContextId`] plus shared handles to every medium. Opening another tab is
//! [`Environment::spawn_context`]: same media, new context id.

use std::sync::Arc;
use std::time::Duration;

use super::error::StorageResult;
use super::medium::{ContextId, ExtensionArea, LocalArea, MemoryArea};
use super::object_store::ObjectDatabase;
use super::signal::{SignalChannel, DEFAULT_SIGNAL_TTL};
use crate::config::Config;

/// Media reachable from one execution context
#[derive(Clone)]
pub struct Environment {
    context: ContextId,
    extension: Option<Arc<ExtensionArea>>,
    local: Option<Arc<LocalArea>>,
    memory: Arc<MemoryArea>,
    object_db: Option<Arc<ObjectDatabase>>,
    signal_ttl: Duration,
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Environment of a standalone process: file-backed local area and an
    /// SQLite object store under the data directory, no extension host
    pub fn from_config(config: &Config) -> StorageResult<Self> {
        let local = LocalArea::open(config.local_area_path(), config.local_quota_bytes)?;
        Ok(Self::builder()
            .local_area(Arc::new(local))
            .object_database(Arc::new(ObjectDatabase::at(config.object_store_path())))
            .signal_ttl(config.signal_ttl())
            .build())
    }

    /// A sibling context sharing every medium
    pub fn spawn_context(&self) -> Self {
        Self {
            context: ContextId::new(),
            ..self.clone()
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn extension_area(&self) -> Option<Arc<ExtensionArea>> {
        self.extension.clone()
    }

    pub fn local_area(&self) -> Option<Arc<LocalArea>> {
        self.local.clone()
    }

    pub fn memory_area(&self) -> Arc<MemoryArea> {
        Arc::clone(&self.memory)
    }

    pub fn object_database(&self) -> Option<Arc<ObjectDatabase>> {
        self.object_db.clone()
    }

    pub fn signal_ttl(&self) -> Duration {
        self.signal_ttl
    }

    /// A fresh signal channel for one adapter of this context
    pub fn signal_channel(&self) -> Arc<SignalChannel> {
        SignalChannel::new(self.context, self.local.clone(), self.signal_ttl)
    }
}

/// Builder for [`Environment`]
#[derive(Default)]
pub struct EnvironmentBuilder {
    extension: Option<Arc<ExtensionArea>>,
    local: Option<Arc<LocalArea>>,
    memory: Option<Arc<MemoryArea>>,
    object_db: Option<Arc<ObjectDatabase>>,
    signal_ttl: Option<Duration>,
}

impl EnvironmentBuilder {
    pub fn extension_area(mut self, area: Arc<ExtensionArea>) -> Self {
        self.extension = Some(area);
        self
    }

    /// Run inside an extension host whose storage area follows the config
    pub fn extension_host(self, config: &Config) -> Self {
        let area = if config.unlimited_storage {
            ExtensionArea::unlimited()
        } else {
            ExtensionArea::new(config.extension_quota_bytes)
        };
        self.extension_area(Arc::new(area))
    }

    pub fn local_area(mut self, area: Arc<LocalArea>) -> Self {
        self.local = Some(area);
        self
    }

    pub fn memory_area(mut self, area: Arc<MemoryArea>) -> Self {
        self.memory = Some(area);
        self
    }

    pub fn object_database(mut self, db: Arc<ObjectDatabase>) -> Self {
        self.object_db = Some(db);
        self
    }

    pub fn signal_ttl(mut self, ttl: Duration) -> Self {
        self.signal_ttl = Some(ttl);
        self
    }

    pub fn build(self) -> Environment {
        Environment {
            context: ContextId::new(),
            extension: self.extension,
            local: self.local,
            memory: self.memory.unwrap_or_default(),
            object_db: self.object_db,
            signal_ttl: self.signal_ttl.unwrap_or(DEFAULT_SIGNAL_TTL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::adapter::Capacity;
    use tempfile::TempDir;

    #[test]
    fn test_spawn_context_shares_media() {
        let env = Environment::builder()
            .local_area(Arc::new(LocalArea::in_memory(1024)))
            .build();
        let sibling = env.spawn_context();

        assert_ne!(env.context(), sibling.context());
        assert!(Arc::ptr_eq(&env.memory_area(), &sibling.memory_area()));
        assert!(Arc::ptr_eq(
            &env.local_area().unwrap(),
            &sibling.local_area().unwrap()
        ));
        assert!(sibling.extension_area().is_none());
    }

    #[test]
    fn test_from_config_has_no_extension_host() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };

        let env = Environment::from_config(&config).unwrap();
        assert!(env.extension_area().is_none());
        assert!(env.local_area().is_some());
        assert!(env.object_database().is_some());
        assert_eq!(env.signal_ttl(), config.signal_ttl());
    }

    #[test]
    fn test_extension_host_honours_unlimited_storage() {
        let config = Config {
            unlimited_storage: true,
            ..Config::default()
        };
        let env = Environment::builder().extension_host(&config).build();
        assert_eq!(env.extension_area().unwrap().quota(), Capacity::Unbounded);
    }
}
