//! Export and import command handlers

use std::path::Path;

use anyhow::{Context, Result};

use studyhub_core::transfer::{import_json, read_import_file};
use studyhub_core::ImportMode;

use crate::output::{print_json, Output, OutputFormat};
use crate::session::Session;

/// Write every record to an export file
pub async fn export(session: &Session, path: &Path, output: &Output) -> Result<()> {
    session
        .handle()
        .export_file(path)
        .await
        .with_context(|| format!("Failed to export to {}", path.display()))?;

    output.success(&format!("Exported to {}", path.display()));
    Ok(())
}

/// Merge an export file into the current data
pub async fn import(session: &Session, path: &Path, output: &Output) -> Result<()> {
    let text = read_import_file(path)?;

    let store = session.store();
    let mut store = store.lock().await;
    let summary = import_json(&mut store, &text, ImportMode::File)
        .with_context(|| format!("Failed to import {}", path.display()))?;

    match output.format {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Quiet => {}
        OutputFormat::Human => {
            println!("✓ Imported {}", path.display());
            println!("  Courses:   {}", summary.courses);
            println!("  Records:   {}", summary.records);
            println!("  Merged:    {}", summary.matched);
            if summary.fallback_courses > 0 {
                println!(
                    "  {} record(s) referenced an unknown course and were assigned to '{}'",
                    summary.fallback_courses,
                    store
                        .state()
                        .fallback_course()
                        .map(|c| c.title.as_str())
                        .unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}
