//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use studyhub_core::models::Course;
use studyhub_core::{AppState, Task};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a list of courses
    pub fn print_courses(&self, courses: &[Course], selected: Option<&Course>) {
        match self.format {
            OutputFormat::Human => {
                for course in courses {
                    let marker = if selected.map(|s| s.id) == Some(course.id) {
                        "*"
                    } else {
                        " "
                    };
                    println!(
                        "{} {} | {} | {}",
                        marker,
                        short_id(&course.id.to_string()),
                        course.color,
                        course.title
                    );
                }
                println!("\n{} course(s)", courses.len());
            }
            OutputFormat::Json => print_json(&courses),
            OutputFormat::Quiet => {
                for course in courses {
                    println!("{}", course.id);
                }
            }
        }
    }

    /// Print a single task
    pub fn print_task(&self, task: &Task, state: &AppState) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", task.id);
                println!("Title:    {}", task.title);
                println!("Course:   {}", course_title(state, task));
                println!("Priority: {}", task.priority);
                if let Some(ref due) = task.due {
                    println!("Due:      {}", due);
                }
                println!("Done:     {}", if task.done { "yes" } else { "no" });
            }
            OutputFormat::Json => print_json(task),
            OutputFormat::Quiet => println!("{}", task.id),
        }
    }

    /// Print a list of tasks with their course titles
    pub fn print_tasks(&self, tasks: &[Task], state: &AppState) {
        match self.format {
            OutputFormat::Human => {
                if tasks.is_empty() {
                    println!("No tasks found.");
                    return;
                }
                for task in tasks {
                    println!(
                        "{} [{}] {} | {} | {} | {}",
                        short_id(&task.id.to_string()),
                        if task.done { "x" } else { " " },
                        truncate(&task.title, 35),
                        truncate(course_title(state, task), 20),
                        task.priority,
                        task.due.as_deref().unwrap_or("-")
                    );
                }
                println!("\n{} task(s)", tasks.len());
            }
            OutputFormat::Json => print_json(&tasks),
            OutputFormat::Quiet => {
                for task in tasks {
                    println!("{}", task.id);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to format output: {}", e),
    }
}

fn course_title<'a>(state: &'a AppState, task: &Task) -> &'a str {
    state
        .course(task.course)
        .map(|c| c.title.as_str())
        .unwrap_or("-")
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format a byte count for humans
pub fn human_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;

    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("Übungsblatt Analysis", 8), "Übung...");
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.0 KiB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_course_title_of_dangling_task() {
        let state = AppState::default();
        let known = Task::new(state.courses[0].id, "Essay");
        let dangling = Task::new(studyhub_core::CourseId::new(), "Orphan");

        assert_eq!(course_title(&state, &known), "General");
        assert_eq!(course_title(&state, &dangling), "-");
    }
}
