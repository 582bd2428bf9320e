//! Persistence suppression flags

use std::sync::atomic::{AtomicBool, Ordering};

/// Flags shared between the store subscriber and the sync task
#[derive(Debug, Default)]
pub struct SyncFlags {
    store_ready: AtomicBool,
    applying_from_storage: AtomicBool,
}

impl SyncFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the initial load has been applied
    pub fn is_store_ready(&self) -> bool {
        self.store_ready.load(Ordering::SeqCst)
    }

    pub fn set_store_ready(&self) {
        self.store_ready.store(true, Ordering::SeqCst);
    }

    /// True while a storage-originated snapshot is being written into the store
    pub fn is_applying_from_storage(&self) -> bool {
        self.applying_from_storage.load(Ordering::SeqCst)
    }

    /// Whether a store mutation should be persisted
    pub fn should_persist(&self) -> bool {
        self.is_store_ready() && !self.is_applying_from_storage()
    }
}

/// Marks the flags as applying from storage until dropped
#[must_use = "suppression ends as soon as the guard is dropped"]
pub struct SuppressionGuard<'a> {
    flags: &'a SyncFlags,
}

impl<'a> SuppressionGuard<'a> {
    pub fn engage(flags: &'a SyncFlags) -> Self {
        flags.applying_from_storage.store(true, Ordering::SeqCst);
        Self { flags }
    }
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        self.flags.applying_from_storage.store(false, Ordering::SeqCst);
    }
}
