//! tempo - Local-first time tracking with a Pomodoro cycle alongside
//!
//! Every command opens the database, recovers a timer left running by an
//! earlier invocation, and then acts. `start --focus`, `focus` and `watch`
//! stay in the foreground until Ctrl-C.

mod cli;

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration as ChronoDuration, Local, Utc};
use clap::Parser;
use colored::Colorize;
use focus::{CycleMode, FocusCycleEngine, JsonSettingsStore, SettingsUpdate};
use tempo::Coordinator;
use tempo_core::{format, Config, Paths, SystemClock};
use timer::{
    project_reports, ProjectId, SessionFilter, SessionId, SessionStore, SqliteStore, Summary,
    TaskId, TimerEngine,
};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, LogCommand, ProjectCommand, SettingsCommand, TaskCommand};

/// Everything a command needs
struct App {
    config: Config,
    store: Arc<SqliteStore>,
    coordinator: Coordinator,
}

impl App {
    fn open() -> Result<Self> {
        let mut paths = Paths::new();
        let config = Config::load(&paths.config_file())?;
        if let Some(dir) = &config.data_dir {
            paths.data = dir.clone();
        }

        let store = Arc::new(SqliteStore::open(&paths.database())?);
        let settings = Arc::new(JsonSettingsStore::new(&paths.focus_settings()));
        let coordinator =
            Coordinator::from_config(&config, store.clone(), settings, Arc::new(SystemClock));

        Ok(Self {
            config,
            store,
            coordinator,
        })
    }

    fn timer(&self) -> &TimerEngine {
        self.coordinator.timer()
    }

    fn focus(&self) -> &FocusCycleEngine {
        self.coordinator.focus()
    }
}

fn main() -> Result<()> {
    // Diagnostics go to stderr so command output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { run_command(cli.command).await })
}

async fn run_command(command: Option<Commands>) -> Result<()> {
    let app = App::open()?;

    match command {
        Some(Commands::Project(cmd)) => cmd_project(&app, cmd),
        Some(Commands::Task(cmd)) => cmd_task(&app, cmd),
        Some(Commands::Start {
            task_id,
            focus,
            auto,
        }) => cmd_start(&app, TaskId(task_id), focus, auto).await,
        Some(Commands::Stop) => cmd_stop(&app).await,
        Some(Commands::Watch) => cmd_watch(&app).await,
        Some(Commands::Focus { mode, auto }) => cmd_focus(&app, &mode, auto).await,
        Some(Commands::Settings(cmd)) => cmd_settings(&app, cmd),
        Some(Commands::Log(cmd)) => cmd_log(&app, cmd).await,
        Some(Commands::Report { days }) => cmd_report(&app, days).await,
        Some(Commands::Status) | None => cmd_status(&app).await,
    }
}

fn ok(msg: &str) {
    println!("{} {}", "[ok]".green(), msg);
}

fn info(msg: &str) {
    println!("{} {}", "[info]".cyan(), msg);
}

fn since_days(days: Option<u32>) -> SessionFilter {
    let mut filter = SessionFilter::default();
    if let Some(days) = days {
        filter = filter.since(Utc::now() - ChronoDuration::days(i64::from(days)));
    }
    filter
}

fn cmd_project(app: &App, cmd: ProjectCommand) -> Result<()> {
    match cmd {
        ProjectCommand::Add { name, rate } => {
            if rate < 0.0 {
                bail!("Hourly rate cannot be negative");
            }
            let id = app.store.create_project(&name, rate)?;
            ok(&format!("Project {} created: {}", id, name));
        }
        ProjectCommand::List => {
            let projects = app.store.list_projects()?;
            if projects.is_empty() {
                println!("No projects yet. Create one with: tempo project add NAME");
                return Ok(());
            }
            println!("{}", "Projects".bold());
            for project in projects {
                let rate = format::money(project.hourly_rate.round() as i64, &app.config.currency);
                println!(
                    "  {:>4}  {}  {}",
                    project.id.to_string().cyan(),
                    project.name,
                    format!("{}/h", rate).dimmed()
                );
            }
        }
    }
    Ok(())
}

fn cmd_task(app: &App, cmd: TaskCommand) -> Result<()> {
    match cmd {
        TaskCommand::Add { project_id, name } => {
            let id = app.store.create_task(ProjectId(project_id), &name)?;
            ok(&format!("Task {} created: {}", id, name));
        }
        TaskCommand::List { project } => {
            let tasks = app.store.list_tasks(project.map(ProjectId))?;
            if tasks.is_empty() {
                println!("No tasks. Create one with: tempo task add PROJECT_ID NAME");
                return Ok(());
            }
            println!("{}", "Tasks".bold());
            for task in tasks {
                let mark = if task.completed {
                    "[x]".green()
                } else {
                    "[ ]".normal()
                };
                println!(
                    "  {:>4}  {} {}  {}",
                    task.id.to_string().cyan(),
                    mark,
                    task.name,
                    format!("project {}", task.project_id).dimmed()
                );
            }
        }
        TaskCommand::Done { id, undo } => {
            if !app.store.set_task_completed(TaskId(id), !undo)? {
                bail!("Task not found: {}", id);
            }
            if undo {
                ok(&format!("Task {} reopened", id));
            } else {
                ok(&format!("Task {} done", id));
            }
        }
    }
    Ok(())
}

async fn cmd_start(app: &App, task_id: TaskId, linked: bool, auto: bool) -> Result<()> {
    app.timer().recover().await;

    if app.store.get_task(task_id)?.is_none() {
        bail!("Task not found: {}", task_id);
    }

    let outcome = app.coordinator.start_task(task_id, linked).await;
    if !outcome.timer_started {
        if let Some(running) = app.timer().active_task_id() {
            bail!("Timer already running for task {}. Use 'tempo stop' first.", running);
        }
        bail!("Failed to start timer for task {}", task_id);
    }

    let snapshot = app.timer().snapshot();
    let name = snapshot
        .active_task
        .as_ref()
        .map_or_else(|| task_id.to_string(), |t| t.name.clone());
    ok(&format!("Timer started: {}", name));

    if !outcome.focus_started {
        if linked {
            info("Focus cycle did not start; the timer keeps running");
        }
        return Ok(());
    }

    focus_loop(app, auto || app.config.auto_advance).await
}

async fn cmd_stop(app: &App) -> Result<()> {
    app.timer().recover().await;

    let snapshot = app.timer().snapshot();
    let (Some(session_id), Some(task_id)) = (snapshot.active_session_id, snapshot.active_task_id)
    else {
        info("No timer running");
        return Ok(());
    };

    if !app.coordinator.stop_task().await {
        bail!("Failed to stop timer");
    }

    let seconds = frozen_duration(app, task_id, session_id)
        .await?
        .unwrap_or(snapshot.elapsed_seconds);
    ok(&format!("Timer stopped after {}", format::duration_clock(seconds as i64)));
    Ok(())
}

async fn frozen_duration(app: &App, task_id: TaskId, session_id: SessionId) -> Result<Option<u64>> {
    let sessions = app.store.sessions(&SessionFilter::task(task_id)).await?;
    Ok(sessions
        .iter()
        .find(|s| s.id == session_id)
        .map(|s| s.duration_seconds))
}

async fn cmd_status(app: &App) -> Result<()> {
    app.timer().recover().await;

    let snapshot = app.timer().snapshot();
    if !snapshot.is_running() {
        println!("No timer running");
        println!();
        println!("Start one with: tempo start TASK_ID");
        return Ok(());
    }

    println!("{}", "TIMER RUNNING".bold().magenta());
    println!();
    match (&snapshot.active_task, snapshot.active_task_id) {
        (Some(task), _) => println!("  {}     {}", "Task:".cyan(), task.name),
        (None, Some(id)) => println!("  {}     {} (details unavailable)", "Task:".cyan(), id),
        (None, None) => {}
    }
    if let Some(start) = snapshot.start_time {
        println!(
            "  {}  {}",
            "Started:".cyan(),
            format::clock_time(start.with_timezone(&Local))
        );
    }
    println!(
        "  {}  {}",
        "Elapsed:".cyan(),
        format::duration_clock(snapshot.elapsed_seconds as i64)
    );
    Ok(())
}

async fn cmd_watch(app: &App) -> Result<()> {
    if !app.timer().recover().await {
        info("No timer running");
        return Ok(());
    }

    let interval = app.config.tick_interval();
    loop {
        let snapshot = app.timer().snapshot();
        let name = snapshot.active_task.as_ref().map_or("", |t| t.name.as_str());
        print!(
            "\r{} {}  ",
            format::duration_clock(snapshot.elapsed_seconds as i64).bold(),
            name
        );
        std::io::stdout().flush()?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    println!();
    Ok(())
}

async fn cmd_focus(app: &App, mode: &str, auto: bool) -> Result<()> {
    let mode = match CycleMode::from_str(mode) {
        Some(CycleMode::Idle) | None => {
            bail!("Unknown focus mode '{}' (work, short-break, long-break)", mode)
        }
        Some(mode) => mode,
    };

    // A timer left running stays running; the cycle is simply not linked
    app.timer().recover().await;
    if !app.focus().start(mode, false) {
        bail!("Failed to start focus cycle");
    }
    focus_loop(app, auto || app.config.auto_advance).await
}

/// Foreground loop for a running cycle. Ctrl-C stops the cycle only.
async fn focus_loop(app: &App, auto_advance: bool) -> Result<()> {
    let mut completions = app
        .focus()
        .completions()
        .context("Focus completions already taken")?;
    let interval = app.config.tick_interval();

    println!();
    loop {
        render_focus_line(app)?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(completion) = completions.recv() => {
                let followup = app.coordinator.handle_completion(&completion, auto_advance);
                println!();
                println!("{} {}", followup.title.bold().green(), followup.body);
                if followup.advanced.is_none() {
                    println!(
                        "Next up: {}. Run 'tempo focus --mode {}' to begin.",
                        followup.next_mode.label(),
                        followup.next_mode.as_str()
                    );
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    app.coordinator.stop_focus();
    println!();
    if app.timer().is_running() {
        info("Task timer still running. Use 'tempo stop' to stop it.");
    }
    Ok(())
}

fn render_focus_line(app: &App) -> Result<()> {
    let state = app.focus().state();
    let progress = app.focus().progress();

    let bar_width: usize = 30;
    let filled = ((bar_width as f64) * progress / 100.0) as usize;
    let bar = format!(
        "{}{}",
        "\u{2588}".repeat(filled.min(bar_width)),
        "\u{2591}".repeat(bar_width - filled.min(bar_width))
    );

    let label = if state.mode.is_break() {
        state.mode.label().green()
    } else {
        state.mode.label().magenta()
    };
    let mut line = format!("\r{:<12} [{}] {}", label, bar, app.focus().formatted_remaining());
    let timer = app.timer().snapshot();
    if state.is_linked_to_session && timer.is_running() {
        line.push_str(&format!(
            "  task {}",
            format::duration_clock(timer.elapsed_seconds as i64)
        ));
    }
    print!("{}  ", line);
    std::io::stdout().flush()?;
    Ok(())
}

fn cmd_settings(app: &App, cmd: SettingsCommand) -> Result<()> {
    let settings = match cmd {
        SettingsCommand::Show => app.focus().settings(),
        SettingsCommand::Set {
            work,
            short,
            long,
            every,
        } => {
            let update = SettingsUpdate {
                work_minutes: work,
                short_break_minutes: short,
                long_break_minutes: long,
                sessions_until_long_break: every,
            };
            if update.is_empty() {
                bail!("Nothing to change. See 'tempo settings set --help'.");
            }
            let settings = app.focus().update_settings(update);
            ok("Settings saved");
            settings
        }
    };

    println!("{}", "Focus settings".bold());
    println!("  {}        {} min", "Work:".cyan(), settings.work_minutes);
    println!("  {} {} min", "Short break:".cyan(), settings.short_break_minutes);
    println!("  {}  {} min", "Long break:".cyan(), settings.long_break_minutes);
    if settings.sessions_until_long_break == 0 {
        println!("  {}  never", "Long every:".cyan());
    } else {
        println!(
            "  {}  {} sessions",
            "Long every:".cyan(),
            settings.sessions_until_long_break
        );
    }
    Ok(())
}

async fn cmd_log(app: &App, cmd: LogCommand) -> Result<()> {
    match cmd {
        LogCommand::Add { task_id, minutes } => {
            let task_id = TaskId(task_id);
            if app.store.get_task(task_id)?.is_none() {
                bail!("Task not found: {}", task_id);
            }
            let seconds = minutes
                .checked_mul(60)
                .with_context(|| format!("{} minutes is too long to log", minutes))?;
            match app
                .store
                .insert_closed_session(task_id, seconds, Utc::now())
                .await?
            {
                Some(id) => ok(&format!(
                    "Logged {} to task {} (session {})",
                    format::duration(seconds),
                    task_id,
                    id
                )),
                None => info("Nothing to log for zero minutes"),
            }
        }
        LogCommand::List { task, days } => {
            let mut filter = since_days(days);
            filter.task_id = task.map(TaskId);
            let sessions = app.store.sessions(&filter).await?;
            if sessions.is_empty() {
                println!("No sessions");
                return Ok(());
            }
            println!("{}", "Sessions".bold());
            let now = Utc::now();
            for session in sessions {
                let start = session.start_time.with_timezone(&Local);
                let length = format::duration_clock(session.seconds_at(now) as i64);
                let length = if session.is_open() {
                    format!("{} (running)", length).yellow().to_string()
                } else {
                    length
                };
                println!(
                    "  {:>5}  {} {}  task {:<4} {}",
                    session.id.to_string().cyan(),
                    start.format("%Y-%m-%d"),
                    format::clock_time(start),
                    session.task_id,
                    length
                );
            }
        }
        LogCommand::Rm { id } => {
            let id = SessionId(id);
            if app.timer().recover().await && app.timer().snapshot().active_session_id == Some(id) {
                bail!("Session {} is running. Use 'tempo stop' first.", id);
            }
            if !app.store.delete_session(id).await? {
                bail!("Session not found: {}", id);
            }
            ok(&format!("Session {} deleted", id));
        }
    }
    Ok(())
}

async fn cmd_report(app: &App, days: Option<u32>) -> Result<()> {
    let sessions = app.store.sessions(&since_days(days)).await?;
    let summary = Summary::from_sessions(&sessions);
    let projects = app.store.list_projects()?;
    let tasks = app.store.list_tasks(None)?;
    let reports = project_reports(&projects, &tasks, &summary);

    match days {
        Some(days) => println!("{}", format!("Report (last {} days)", days).bold()),
        None => println!("{}", "Report (all time)".bold()),
    }
    println!();

    for report in reports.iter().filter(|r| r.seconds > 0) {
        println!(
            "  {}  {}  {}",
            report.project.name.bold(),
            format::duration(report.seconds),
            format::money(report.cost, &app.config.currency).green()
        );
        for total in &report.tasks {
            let name = tasks
                .iter()
                .find(|t| t.id == total.task_id)
                .map_or("?", |t| t.name.as_str());
            println!(
                "      {:<30} {:>10}  ({} sessions)",
                name,
                format::duration(total.seconds),
                total.sessions
            );
        }
    }

    let (hours, mins) = summary.total_time();
    let cost: i64 = reports.iter().map(|r| r.cost).sum();
    println!();
    println!("  {}  {}h {}m", "Total time:".cyan(), hours, mins);
    println!("  {}  {}", "Total cost:".cyan(), format::money(cost, &app.config.currency));
    println!("  {}    {}", "Sessions:".cyan(), summary.total_sessions);
    if summary.open_sessions > 0 {
        println!("  {}     {} (not counted yet)", "Running:".cyan(), summary.open_sessions);
    }
    Ok(())
}
