//! Storage error handling
//!
//! Provides typed errors for adapter and facade operations with descriptive
//! messages and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// No adapter in the priority list reported itself usable
    #[error("No storage adapter is available (tried: {})", tried.join(", "))]
    NoAdapterAvailable { tried: Vec<String> },

    /// The write does not fit in the medium's quota
    #[error("Quota exceeded while writing '{key}': {needed} bytes needed, {available} bytes available")]
    QuotaExceeded {
        key: String,
        needed: u64,
        available: u64,
    },

    /// Value could not be serialized or a stored value could not be parsed
    #[error("Serialization failed for '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// SQLite error from the object store
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The backing connection was closed or poisoned
    #[error("Storage connection closed: {0}")]
    ConnectionClosed(String),

    /// Failed to persist a file-backed medium
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Build a serialization error for a key
    pub fn serialization(key: &str, source: serde_json::Error) -> Self {
        StorageError::Serialization {
            key: key.to_string(),
            source,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the medium intact, so a later write with the
    /// same data may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::QuotaExceeded { .. }
                | StorageError::WriteError { .. }
                | StorageError::Database(_)
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::NoAdapterAvailable { .. } => {
                Some("Enable at least one adapter in the configuration, e.g. `adapters = [\"memory\"]`.")
            }
            StorageError::QuotaExceeded { .. } => {
                Some("Remove old data or switch to an adapter with a larger quota.")
            }
            StorageError::WriteError { .. } => {
                Some("Check that the data directory exists and is writable.")
            }
            _ => None,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_adapter_display_lists_candidates() {
        let err = StorageError::NoAdapterAvailable {
            tried: vec!["extension".to_string(), "local".to_string()],
        };

        let msg = err.to_string();
        assert!(msg.contains("extension, local"));
        assert!(!err.is_recoverable());
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_quota_exceeded_is_recoverable() {
        let err = StorageError::QuotaExceeded {
            key: "studyhub-state".to_string(),
            needed: 10,
            available: 4,
        };

        assert!(err.is_recoverable());
        assert!(err.to_string().contains("studyhub-state"));
    }

    #[test]
    fn test_connection_closed_not_recoverable() {
        let err = StorageError::ConnectionClosed("poisoned".to_string());
        assert!(!err.is_recoverable());
        assert!(err.recovery_suggestion().is_none());
    }
}
