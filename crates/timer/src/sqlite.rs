//! SQLite-backed store for projects, tasks and time sessions
//!
//! Timestamps are stored as Unix milliseconds. A partial unique index over
//! rows with no end time keeps the single-open-session rule true inside the
//! database itself, not only in the engine that writes to it.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::model::{backdated_start, Project, ProjectId, SessionId, Task, TaskId, TimeSession};
use crate::store::{SessionFilter, SessionStore, StoreError, StoreResult, TaskLookup};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        hourly_rate REAL NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id),
        name TEXT NOT NULL,
        completed INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS time_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL,
        start_ms INTEGER NOT NULL,
        end_ms INTEGER,
        duration_seconds INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_task ON time_sessions(task_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_start ON time_sessions(start_ms);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_single_open
        ON time_sessions((end_ms IS NULL)) WHERE end_ms IS NULL;
"#;

const SESSION_COLUMNS: &str = "id, task_id, start_ms, end_ms, duration_seconds";

type SessionRow = (i64, i64, i64, Option<i64>, i64);
type TaskRow = (i64, i64, String, bool, i64);
type ProjectRow = (i64, String, f64, i64);

/// Store for all tempo records
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create data directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// A private, non-persistent database
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create tables")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    pub fn create_project(&self, name: &str, hourly_rate: f64) -> StoreResult<ProjectId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO projects (name, hourly_rate, created_at) VALUES (?1, ?2, ?3)",
            params![name, hourly_rate, Utc::now().timestamp_millis()],
        )?;
        Ok(ProjectId(conn.last_insert_rowid()))
    }

    pub fn get_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, name, hourly_rate, created_at FROM projects WHERE id = ?1",
                [id.0],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        row.map(project_from_row).transpose()
    }

    pub fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, name, hourly_rate, created_at FROM projects ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;

        let mut projects = Vec::new();
        for row in rows {
            projects.push(project_from_row(row?)?);
        }
        Ok(projects)
    }

    pub fn create_task(&self, project_id: ProjectId, name: &str) -> StoreResult<TaskId> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1)",
            [project_id.0],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::UnknownProject(project_id));
        }

        conn.execute(
            "INSERT INTO tasks (project_id, name, completed, created_at) VALUES (?1, ?2, 0, ?3)",
            params![project_id.0, name, Utc::now().timestamp_millis()],
        )?;
        Ok(TaskId(conn.last_insert_rowid()))
    }

    pub fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, project_id, name, completed, created_at FROM tasks WHERE id = ?1",
                [id.0],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        row.map(task_from_row).transpose()
    }

    /// All tasks, or those of one project
    pub fn list_tasks(&self, project: Option<ProjectId>) -> StoreResult<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, completed, created_at FROM tasks
             WHERE (?1 IS NULL OR project_id = ?1) ORDER BY id",
        )?;
        let rows = stmt.query_map([project.map(|p| p.0)], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(task_from_row(row?)?);
        }
        Ok(tasks)
    }

    pub fn set_task_completed(&self, id: TaskId, completed: bool) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE tasks SET completed = ?1 WHERE id = ?2",
            params![completed, id.0],
        )?;
        Ok(changed == 1)
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn find_open_session(&self) -> StoreResult<Option<TimeSession>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM time_sessions WHERE end_ms IS NULL ORDER BY id LIMIT 1",
            SESSION_COLUMNS
        );
        let row = conn.query_row(&sql, [], read_session_row).optional()?;
        row.map(session_from_row).transpose()
    }

    async fn insert_open_session(
        &self,
        task_id: TaskId,
        start_time: DateTime<Utc>,
    ) -> StoreResult<SessionId> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO time_sessions (task_id, start_ms, end_ms, duration_seconds)
             VALUES (?1, ?2, NULL, 0)",
            params![task_id.0, start_time.timestamp_millis()],
        );

        match inserted {
            Ok(_) => {
                let id = SessionId(conn.last_insert_rowid());
                debug!(session = %id, task = %task_id, "Inserted open session");
                Ok(id)
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::OpenSessionExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn close_session(
        &self,
        id: SessionId,
        end_time: DateTime<Utc>,
        duration_seconds: u64,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE time_sessions SET end_ms = ?1, duration_seconds = ?2
             WHERE id = ?3 AND end_ms IS NULL",
            params![end_time.timestamp_millis(), to_sql_seconds(duration_seconds)?, id.0],
        )?;
        Ok(changed == 1)
    }

    async fn insert_closed_session(
        &self,
        task_id: TaskId,
        seconds: u64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<SessionId>> {
        if seconds == 0 {
            return Ok(None);
        }

        let start =
            backdated_start(now, seconds).ok_or(StoreError::DurationOutOfRange(seconds))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO time_sessions (task_id, start_ms, end_ms, duration_seconds)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                task_id.0,
                start.timestamp_millis(),
                now.timestamp_millis(),
                to_sql_seconds(seconds)?,
            ],
        )?;
        Ok(Some(SessionId(conn.last_insert_rowid())))
    }

    async fn delete_session(&self, id: SessionId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM time_sessions WHERE id = ?1", [id.0])?;
        Ok(changed == 1)
    }

    async fn sessions(&self, filter: &SessionFilter) -> StoreResult<Vec<TimeSession>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM time_sessions
             WHERE (?1 IS NULL OR task_id = ?1) AND (?2 IS NULL OR start_ms >= ?2)
             ORDER BY start_ms, id",
            SESSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                filter.task_id.map(|t| t.0),
                filter.since.map(|s| s.timestamp_millis())
            ],
            read_session_row,
        )?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(session_from_row(row?)?);
        }
        Ok(sessions)
    }

    async fn total_seconds(&self, task_ids: &[TaskId]) -> StoreResult<u64> {
        if task_ids.is_empty() {
            return Ok(0);
        }

        let conn = self.conn()?;
        let placeholders = vec!["?"; task_ids.len()].join(", ");
        let sql = format!(
            "SELECT COALESCE(SUM(duration_seconds), 0) FROM time_sessions WHERE task_id IN ({})",
            placeholders
        );
        let total: i64 = conn.query_row(
            &sql,
            params_from_iter(task_ids.iter().map(|t| t.0)),
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }
}

#[async_trait]
impl TaskLookup for SqliteStore {
    async fn get_task_by_id(&self, id: TaskId) -> StoreResult<Option<Task>> {
        self.get_task(id)
    }
}

fn read_session_row(row: &rusqlite::Row) -> rusqlite::Result<SessionRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn session_from_row(
    (id, task_id, start_ms, end_ms, duration): SessionRow,
) -> StoreResult<TimeSession> {
    Ok(TimeSession {
        id: SessionId(id),
        task_id: TaskId(task_id),
        start_time: instant(start_ms)?,
        end_time: end_ms.map(instant).transpose()?,
        duration_seconds: duration.max(0) as u64,
    })
}

fn task_from_row((id, project_id, name, completed, created_ms): TaskRow) -> StoreResult<Task> {
    Ok(Task {
        id: TaskId(id),
        project_id: ProjectId(project_id),
        name,
        completed,
        created_at: instant(created_ms)?,
    })
}

fn project_from_row((id, name, hourly_rate, created_ms): ProjectRow) -> StoreResult<Project> {
    Ok(Project {
        id: ProjectId(id),
        name,
        hourly_rate,
        created_at: instant(created_ms)?,
    })
}

fn instant(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", ms)))
}

fn to_sql_seconds(seconds: u64) -> StoreResult<i64> {
    i64::try_from(seconds)
        .map_err(|_| StoreError::DurationOutOfRange(seconds))
}
