//! Status command handler

use anyhow::{Context, Result};

use studyhub_core::storage::Capacity;

use crate::output::{human_bytes, Output, OutputFormat};
use crate::session::Session;

/// Show the active adapter, its usage and record counts
pub async fn show(session: &Session, output: &Output) -> Result<()> {
    let info = session
        .storage()
        .storage_info()
        .await
        .context("Failed to read storage usage")?;

    let store = session.store();
    let store = store.lock().await;
    let state = store.state();
    let config = session.config();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "storage": info,
                    "counts": {
                        "courses": state.courses.len(),
                        "tasks": state.tasks.len(),
                        "exams": state.exams.len(),
                        "grades": state.exam_grades.len(),
                        "schedule": state.schedule.len(),
                        "sessions": state.sessions.len(),
                        "weekly_goals": state.weekly_goals.len()
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", info.adapter);
        }
        OutputFormat::Human => {
            println!("StudyHub Status");
            println!("===============");
            println!();
            println!("Storage:");
            println!("  Adapter:   {}", info.adapter);
            println!("  Location:  {}", config.data_dir.display());
            println!("  Used:      {}", human_bytes(info.used));
            println!("  Available: {}", capacity(info.available));
            println!("  Quota:     {}", capacity(info.quota));
            println!();
            println!("Contents:");
            println!("  Courses:  {}", state.courses.len());
            println!(
                "  Tasks:    {} ({} open)",
                state.tasks.len(),
                state.tasks.iter().filter(|t| !t.done).count()
            );
            println!("  Exams:    {}", state.exams.len());
            println!("  Grades:   {}", state.exam_grades.len());
            println!("  Schedule: {}", state.schedule.len());
            println!("  Sessions: {}", state.sessions.len());
        }
    }

    Ok(())
}

fn capacity(capacity: Capacity) -> String {
    match capacity {
        Capacity::Bytes(n) => human_bytes(n),
        Capacity::Unbounded => "unlimited".to_string(),
    }
}
