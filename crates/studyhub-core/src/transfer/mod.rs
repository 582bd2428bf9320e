//! Export and import of the application state
//!
//! The same payload format serves two purposes:
//!
//! - **File**: a user exports to a JSON file and imports it later, possibly
//!   into a different installation. Local cosmetics (colors) win, and every
//!   record gets a fresh id.
//! - **Sync**: the persisted snapshot other contexts write. Remote values
//!   win, and record ids are kept so that contexts converge.

mod export;
mod import;
pub mod merge;
pub mod payload;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::models::AppState;
use crate::store::Store;

pub use export::{export_document, export_payload};
pub use import::import_payload;
pub use merge::{MergeOutcome, MergeRule};
pub use payload::{parse_payload, ExchangePayload, ExchangeSettings, ExportDocument};

/// Errors from reading or applying a payload
#[derive(Error, Debug)]
pub enum TransferError {
    /// The text is not JSON
    #[error("Failed to parse payload: {0}")]
    Parse(#[from] serde_json::Error),

    /// JSON, but not a usable payload
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where a payload comes from, which decides how it is merged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    File,
    Sync,
}

/// Counts reported by an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Courses in the payload
    pub courses: usize,
    /// Records in the payload's collections, courses excluded
    pub records: usize,
    /// Records merged into an existing one by key
    pub matched: usize,
    /// Course references that fell back to the first course
    pub fallback_courses: usize,
}

/// Replace each line break (`\r\n`, `\r` or `\n`) with one space
pub fn collapse_line_breaks(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

/// Parse `text` and merge it into the store
///
/// Subscribers see one patch event on success; on failure the store is not
/// touched.
pub fn import_json(
    store: &mut Store,
    text: &str,
    mode: ImportMode,
) -> Result<ImportSummary, TransferError> {
    let payload = parse_payload(text)?;
    let mut next = store.state().clone();
    let summary = import_payload(&mut next, payload, mode)?;
    store.patch_state(next);
    Ok(summary)
}

/// Write an export document for `state` to `path`
pub fn write_export_file(path: &Path, state: &AppState) -> Result<(), TransferError> {
    let document = export_document(state);
    let json = serde_json::to_string_pretty(&document)?;
    fs::write(path, json).map_err(|source| TransferError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read an exported file
pub fn read_import_file(path: &Path) -> Result<String, TransferError> {
    fs::read_to_string(path).map_err(|source| TransferError::Io {
        path: path.to_path_buf(),
        source,
    })
}
