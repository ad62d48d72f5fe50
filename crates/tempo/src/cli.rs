//! Command-line definitions for tempo

use clap::{Parser, Subcommand};

/// tempo - Local-first time tracking with a Pomodoro cycle alongside
#[derive(Parser)]
#[command(name = "tempo")]
#[command(version)]
#[command(about = "Local-first time tracking with a Pomodoro cycle alongside")]
#[command(after_help = r#"WORKFLOW:
    Projects hold tasks. Start a task to open a time session; only one
    session runs at a time, and it keeps running between commands until
    you stop it.

EXAMPLES:
    tempo project add "Website" --rate 1500
    tempo task add 1 "Landing page"
    tempo start 1               # Start timing task 1
    tempo start 1 --focus       # Start timing with a linked Pomodoro
    tempo status                # What is running?
    tempo stop                  # Stop and save the session
    tempo log add 1 45          # Log 45 minutes by hand
    tempo report --days 30      # Totals and cost per project

ENVIRONMENT:
    TEMPO_HOME    keep data and config under one directory
    RUST_LOG      log filter for diagnostics on stderr (default: warn)
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),

    /// Start timing a task
    #[command(alias = "s")]
    Start {
        /// Task to time
        #[arg(value_name = "TASK_ID")]
        task_id: i64,

        /// Run a linked Pomodoro in the foreground
        #[arg(long)]
        focus: bool,

        /// Start the next focus phase automatically
        #[arg(long, requires = "focus")]
        auto: bool,
    },

    /// Stop the running timer
    #[command(alias = "end")]
    Stop,

    /// Show the running timer
    #[command(alias = "st")]
    Status,

    /// Live display of the running timer until Ctrl-C
    Watch,

    /// Run a standalone Pomodoro in the foreground
    Focus {
        /// Phase to start with (work, short-break, long-break)
        #[arg(long, default_value = "work")]
        mode: String,

        /// Start the next phase automatically
        #[arg(long)]
        auto: bool,
    },

    /// Show or change Pomodoro settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Manual time entries
    #[command(subcommand)]
    Log(LogCommand),

    /// Time and cost per task and project
    Report {
        /// Number of days to include (default: everything)
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommand {
    /// Create a project
    Add {
        name: String,

        /// Hourly rate used for cost reports
        #[arg(long, default_value = "0")]
        rate: f64,
    },

    /// List projects
    #[command(alias = "ls")]
    List,
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Create a task in a project
    Add {
        #[arg(value_name = "PROJECT_ID")]
        project_id: i64,
        name: String,
    },

    /// List tasks
    #[command(alias = "ls")]
    List {
        /// Only tasks of this project
        #[arg(long)]
        project: Option<i64>,
    },

    /// Mark a task as done
    Done {
        id: i64,

        /// Mark as not done instead
        #[arg(long)]
        undo: bool,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommand {
    /// Print current settings
    Show,

    /// Change one or more settings
    Set {
        /// Work phase length (minutes)
        #[arg(long)]
        work: Option<u32>,

        /// Short break length (minutes)
        #[arg(long)]
        short: Option<u32>,

        /// Long break length (minutes)
        #[arg(long)]
        long: Option<u32>,

        /// Work phases before a long break (0 = never)
        #[arg(long)]
        every: Option<u32>,
    },
}

#[derive(Subcommand)]
pub enum LogCommand {
    /// Record time spent without running the timer
    Add {
        #[arg(value_name = "TASK_ID")]
        task_id: i64,
        minutes: u64,
    },

    /// List sessions
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        task: Option<i64>,

        /// Number of days to include (default: everything)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Delete a session
    Rm { id: i64 },
}
