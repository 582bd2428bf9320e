//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/studyhub/config.toml)
//! 3. Environment variables (STUDYHUB_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::AdapterKind;

/// Environment variable prefix
const ENV_PREFIX: &str = "STUDYHUB";

/// Quota of the extension storage area (10 MiB)
pub const DEFAULT_EXTENSION_QUOTA: u64 = 10 * 1024 * 1024;

/// Quota of the local key-value area (5 MiB)
pub const DEFAULT_LOCAL_QUOTA: u64 = 5 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (object store, local area file)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Adapters to try, highest priority first
    #[serde(default = "default_adapters")]
    pub adapters: Vec<AdapterKind>,

    /// Quota of the extension storage area in bytes
    #[serde(default = "default_extension_quota")]
    pub extension_quota_bytes: u64,

    /// Whether the extension was granted unlimited storage
    #[serde(default)]
    pub unlimited_storage: bool,

    /// Quota of the local key-value area in bytes
    #[serde(default = "default_local_quota")]
    pub local_quota_bytes: u64,

    /// How long a sync signal stays on the local area
    #[serde(default = "default_signal_ttl_ms")]
    pub signal_ttl_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            adapters: default_adapters(),
            extension_quota_bytes: DEFAULT_EXTENSION_QUOTA,
            unlimited_storage: false,
            local_quota_bytes: DEFAULT_LOCAL_QUOTA,
            signal_ttl_ms: default_signal_ttl_ms(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Malformed values are logged and ignored.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_ADAPTERS", ENV_PREFIX)) {
            match parse_adapter_list(&val) {
                Ok(adapters) => self.adapters = adapters,
                Err(e) => warn!("Ignoring {}_ADAPTERS: {}", ENV_PREFIX, e),
            }
        }

        if let Some(quota) = env_u64("LOCAL_QUOTA") {
            self.local_quota_bytes = quota;
        }

        if let Some(quota) = env_u64("EXTENSION_QUOTA") {
            self.extension_quota_bytes = quota;
        }

        if let Some(ttl) = env_u64("SIGNAL_TTL_MS") {
            self.signal_ttl_ms = ttl;
        }

        if let Ok(val) = std::env::var(format!("{}_UNLIMITED_STORAGE", ENV_PREFIX)) {
            self.unlimited_storage = val.eq_ignore_ascii_case("true") || val == "1";
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Set a single value by its key name
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "adapters" => self.adapters = parse_adapter_list(value)?,
            "extension_quota_bytes" => {
                self.extension_quota_bytes = value
                    .parse()
                    .context("Invalid value for extension_quota_bytes. Use a byte count.")?
            }
            "unlimited_storage" => {
                self.unlimited_storage = value
                    .parse()
                    .context("Invalid value for unlimited_storage. Use 'true' or 'false'.")?
            }
            "local_quota_bytes" => {
                self.local_quota_bytes = value
                    .parse()
                    .context("Invalid value for local_quota_bytes. Use a byte count.")?
            }
            "signal_ttl_ms" => {
                self.signal_ttl_ms = value
                    .parse()
                    .context("Invalid value for signal_ttl_ms. Use milliseconds.")?
            }
            _ => bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, adapters, extension_quota_bytes, unlimited_storage, \
                 local_quota_bytes, signal_ttl_ms",
                key
            ),
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with STUDYHUB_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("studyhub")
            .join("config.toml")
    }

    /// Get the path to the SQLite object store
    pub fn object_store_path(&self) -> PathBuf {
        self.data_dir.join("studyhub.db")
    }

    /// Get the path to the local key-value area file
    pub fn local_area_path(&self) -> PathBuf {
        self.data_dir.join("local-storage.json")
    }

    /// Lifetime of a posted sync signal
    pub fn signal_ttl(&self) -> Duration {
        Duration::from_millis(self.signal_ttl_ms)
    }
}

fn env_u64(suffix: &str) -> Option<u64> {
    let name = format!("{}_{}", ENV_PREFIX, suffix);
    let val = std::env::var(&name).ok()?;
    match val.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!("Ignoring {}: '{}' is not a number", name, val);
            None
        }
    }
}

fn parse_adapter_list(value: &str) -> Result<Vec<AdapterKind>> {
    let adapters = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<AdapterKind>().map_err(anyhow::Error::from))
        .collect::<Result<Vec<AdapterKind>>>()?;

    if adapters.is_empty() {
        bail!("adapter list is empty");
    }
    Ok(adapters)
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("studyhub")
}

fn default_adapters() -> Vec<AdapterKind> {
    AdapterKind::PRIORITY.to_vec()
}

fn default_extension_quota() -> u64 {
    DEFAULT_EXTENSION_QUOTA
}

fn default_local_quota() -> u64 {
    DEFAULT_LOCAL_QUOTA
}

fn default_signal_ttl_ms() -> u64 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "STUDYHUB_DATA_DIR",
        "STUDYHUB_ADAPTERS",
        "STUDYHUB_LOCAL_QUOTA",
        "STUDYHUB_EXTENSION_QUOTA",
        "STUDYHUB_SIGNAL_TTL_MS",
        "STUDYHUB_UNLIMITED_STORAGE",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.adapters, AdapterKind::PRIORITY.to_vec());
        assert_eq!(config.local_quota_bytes, 5 * 1024 * 1024);
        assert!(!config.unlimited_storage);
        assert!(config.data_dir.ends_with("studyhub"));
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.object_store_path().ends_with("studyhub.db"));
        assert!(config.local_area_path().ends_with("local-storage.json"));
        assert_eq!(config.signal_ttl(), Duration::from_millis(100));
    }

    #[test]
    fn test_env_override_adapters() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("STUDYHUB_ADAPTERS", "local, memory");
        config.apply_env_overrides();
        assert_eq!(config.adapters, vec![AdapterKind::Local, AdapterKind::Memory]);

        // Unknown names leave the list untouched
        env::set_var("STUDYHUB_ADAPTERS", "floppy");
        config.apply_env_overrides();
        assert_eq!(config.adapters, vec![AdapterKind::Local, AdapterKind::Memory]);
    }

    #[test]
    fn test_env_override_numbers() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("STUDYHUB_LOCAL_QUOTA", "2048");
        env::set_var("STUDYHUB_SIGNAL_TTL_MS", "not-a-number");
        config.apply_env_overrides();

        assert_eq!(config.local_quota_bytes, 2048);
        assert_eq!(config.signal_ttl_ms, 100);
    }

    #[test]
    fn test_env_override_unlimited_storage() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("STUDYHUB_UNLIMITED_STORAGE", "1");
        config.apply_env_overrides();
        assert!(config.unlimited_storage);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            adapters = ["object_store", "memory"]
            local_quota_bytes = 1000
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(
            config.adapters,
            vec![AdapterKind::ObjectStore, AdapterKind::Memory]
        );
        assert_eq!(config.local_quota_bytes, 1000);
        assert_eq!(config.extension_quota_bytes, DEFAULT_EXTENSION_QUOTA);
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();
        config.set_value("adapters", "memory").unwrap();
        config.set_value("unlimited_storage", "true").unwrap();
        assert_eq!(config.adapters, vec![AdapterKind::Memory]);
        assert!(config.unlimited_storage);

        assert!(config.set_value("signal_ttl_ms", "soon").is_err());
        assert!(config.set_value("sync_url", "ws://x").is_err());
        assert!(config.set_value("adapters", " , ").is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.data_dir = temp_dir.path().join("data");
        config.adapters = vec![AdapterKind::Local];
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.adapters, vec![AdapterKind::Local]);
        assert!(loaded.data_dir.exists());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("STUDYHUB_DATA_DIR", temp_dir.path().join("data"));

        let config = Config::load_from_path(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.adapters, AdapterKind::PRIORITY.to_vec());
    }
}
