//! StudyHub CLI
//!
//! Command-line interface for StudyHub - courses, tasks and backups on top
//! of the persisted study state.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use studyhub_core::Config;

mod commands;
mod output;
mod session;

use output::{Output, OutputFormat};
use session::Session;

#[derive(Parser)]
#[command(name = "studyhub")]
#[command(about = "StudyHub - courses, tasks and study planning")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active storage adapter, usage and record counts
    Status,
    /// Write all data to a JSON export file
    Export {
        /// Destination file
        file: PathBuf,
    },
    /// Merge a JSON export file into the current data
    Import {
        /// Export file to read
        file: PathBuf,
    },
    /// Manage courses
    Course {
        #[command(subcommand)]
        command: CourseCommands,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum CourseCommands {
    /// Add a course
    Add {
        /// Course title
        title: String,
        /// Display color, e.g. "#e11d48"
        #[arg(short, long)]
        color: Option<String>,
    },
    /// List courses
    #[command(alias = "ls")]
    List,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Add a task to a course
    Add {
        /// Task title
        title: String,
        /// Title of the course the task belongs to
        #[arg(short, long)]
        course: String,
        /// Due date (YYYY-MM-DD)
        #[arg(short, long)]
        due: Option<String>,
        /// Priority: low, medium or high
        #[arg(short, long)]
        priority: Option<String>,
    },
    /// List tasks
    #[command(alias = "ls")]
    List,
    /// Mark a task as done
    Done {
        /// Task ID (full UUID or prefix)
        id: String,
    },
    /// Delete a task
    #[command(alias = "rm")]
    Delete {
        /// Task ID (full UUID or prefix)
        id: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, adapters, local_quota_bytes, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't open storage
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => {
                commands::config::show(cli.config.as_deref(), &output)
            }
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(&key, &value, cli.config.as_deref(), &output)
            }
        };
    }

    let config = load_config(cli.config.as_deref())?;
    let session = Session::open(config).await?;

    let result = match cli.command {
        Commands::Status => commands::status::show(&session, &output).await,
        Commands::Export { file } => commands::transfer::export(&session, &file, &output).await,
        Commands::Import { file } => commands::transfer::import(&session, &file, &output).await,
        Commands::Course { command } => handle_course_command(command, &session, &output).await,
        Commands::Task { command } => handle_task_command(command, &session, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    };

    // Close even when the command failed so queued writes still land
    let closed = session.close().await;
    result.and(closed)
}

async fn handle_course_command(
    command: CourseCommands,
    session: &Session,
    output: &Output,
) -> Result<()> {
    match command {
        CourseCommands::Add { title, color } => {
            commands::course::add(session, title, color, output).await
        }
        CourseCommands::List => commands::course::list(session, output).await,
    }
}

async fn handle_task_command(command: TaskCommands, session: &Session, output: &Output) -> Result<()> {
    match command {
        TaskCommands::Add {
            title,
            course,
            due,
            priority,
        } => commands::task::add(session, title, &course, due, priority, output).await,
        TaskCommands::List => commands::task::list(session, output).await,
        TaskCommands::Done { id } => commands::task::done(session, &id, output).await,
        TaskCommands::Delete { id } => commands::task::delete(session, &id, output).await,
    }
}

pub(crate) fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")
}

/// Log to stderr, filtered by `STUDYHUB_LOG` (off when unset)
fn init_logging() {
    let env_filter = EnvFilter::try_from_env("STUDYHUB_LOG").unwrap_or_else(|_| EnvFilter::new("off"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
