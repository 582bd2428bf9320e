//! Task command handlers

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use uuid::Uuid;

use studyhub_core::{Priority, Task};

use crate::output::Output;
use crate::session::Session;

/// Add a task to the course with the given title
pub async fn add(
    session: &Session,
    title: String,
    course: &str,
    due: Option<String>,
    priority: Option<String>,
    output: &Output,
) -> Result<()> {
    let priority = match priority {
        Some(p) => p.parse::<Priority>().map_err(|e| anyhow!(e))?,
        None => Priority::default(),
    };
    let due = due.map(|d| parse_due(&d)).transpose()?;

    let store = session.store();
    let mut store = store.lock().await;
    let course_id = match store.state().course_by_title(course) {
        Some(c) => c.id,
        None => {
            let known: Vec<&str> = store
                .state()
                .courses
                .iter()
                .map(|c| c.title.as_str())
                .collect();
            bail!("No course named '{}'. Known courses: {}", course, known.join(", "));
        }
    };

    let mut task = Task::new(course_id, title);
    task.priority = priority;
    task.due = due;
    store.add(task.clone());

    output.success(&format!("Added task: {}", task.id));
    output.print_task(&task, store.state());
    Ok(())
}

/// List all tasks
pub async fn list(session: &Session, output: &Output) -> Result<()> {
    let store = session.store();
    let store = store.lock().await;
    output.print_tasks(store.list::<Task>(), store.state());
    Ok(())
}

/// Mark a task as done
pub async fn done(session: &Session, id: &str, output: &Output) -> Result<()> {
    let store = session.store();
    let mut store = store.lock().await;
    let id = resolve_task_id(store.list::<Task>(), id)?;

    let mut task = store
        .get::<Task>(id)
        .cloned()
        .ok_or_else(|| anyhow!("Task not found: {}", id))?;
    if task.done {
        output.success(&format!("Already done: {}", task.title));
        return Ok(());
    }
    task.done = true;
    store.update(task.clone());

    output.success(&format!("Completed: {}", task.title));
    Ok(())
}

/// Delete a task
pub async fn delete(session: &Session, id: &str, output: &Output) -> Result<()> {
    let store = session.store();
    let mut store = store.lock().await;
    let id = resolve_task_id(store.list::<Task>(), id)?;

    let task = store
        .remove::<Task>(id)
        .ok_or_else(|| anyhow!("Task not found: {}", id))?;

    output.success(&format!("Deleted task: {}", task.title));
    Ok(())
}

/// Validate a `YYYY-MM-DD` due date
fn parse_due(due: &str) -> Result<String> {
    let date = NaiveDate::parse_from_str(due.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid due date '{}'. Use YYYY-MM-DD.", due))?;
    Ok(date.format("%Y-%m-%d").to_string())
}

/// Match a full UUID or a unique id prefix
fn resolve_task_id(tasks: &[Task], id: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return Ok(uuid);
    }

    let matches: Vec<_> = tasks
        .iter()
        .filter(|t| t.id.to_string().starts_with(id))
        .collect();

    match matches.as_slice() {
        [] => bail!("No task found matching: {}", id),
        [task] => Ok(task.id),
        _ => {
            eprintln!("Multiple tasks match '{}':", id);
            for task in &matches {
                eprintln!("  {} - {}", task.id, task.title);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyhub_core::CourseId;

    fn task_with_id(id: &str, title: &str) -> Task {
        let mut task = Task::new(CourseId::new(), title);
        task.id = Uuid::parse_str(id).unwrap();
        task
    }

    #[test]
    fn test_resolve_task_id() {
        let tasks = vec![
            task_with_id("1a2b3c4d-0000-4000-8000-000000000001", "Essay"),
            task_with_id("1a2b9999-0000-4000-8000-000000000002", "Lab report"),
        ];

        assert_eq!(resolve_task_id(&tasks, "1a2b3").unwrap(), tasks[0].id);
        assert_eq!(
            resolve_task_id(&tasks, "1a2b9999-0000-4000-8000-000000000002").unwrap(),
            tasks[1].id
        );
        assert!(resolve_task_id(&tasks, "1a2b").is_err());
        assert!(resolve_task_id(&tasks, "ffff").is_err());
    }

    #[test]
    fn test_parse_due() {
        assert_eq!(parse_due("2025-03-01").unwrap(), "2025-03-01");
        assert_eq!(parse_due(" 2025-03-01 ").unwrap(), "2025-03-01");
        assert!(parse_due("next friday").is_err());
        assert!(parse_due("2025-02-30").is_err());
    }
}
