//! Course command handlers

use anyhow::{bail, Result};

use studyhub_core::models::Course;

use crate::output::Output;
use crate::session::Session;

/// Add a course
pub async fn add(
    session: &Session,
    title: String,
    color: Option<String>,
    output: &Output,
) -> Result<()> {
    let title = title.trim().to_string();
    if title.is_empty() {
        bail!("Course title cannot be empty");
    }

    let store = session.store();
    let mut store = store.lock().await;
    if store.state().course_by_title(&title).is_some() {
        bail!("Course already exists: {}", title);
    }

    let mut course = Course::new(title.as_str());
    if let Some(color) = color {
        course = course.with_color(color);
    }
    let id = store.add(course);

    output.success(&format!("Added course: {} ({})", title, id));
    Ok(())
}

/// List all courses, marking the selected one
pub async fn list(session: &Session, output: &Output) -> Result<()> {
    let store = session.store();
    let store = store.lock().await;
    let state = store.state();

    let selected = state
        .settings
        .selected_course
        .and_then(|id| state.course(id));
    output.print_courses(&state.courses, selected);
    Ok(())
}
