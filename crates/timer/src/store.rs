//! Storage contracts consumed by the timer engine
//!
//! The engine only needs to find, open and close sessions and to look up a
//! task for display. Everything else here (manual entries, listing, totals)
//! serves the reporting side of the application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{ProjectId, SessionId, Task, TaskId, TimeSession};

/// Store-specific errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("An open session already exists")]
    OpenSessionExists,

    #[error("Project not found: {0}")]
    UnknownProject(ProjectId),

    #[error("Duration out of range: {0} seconds")]
    DurationOutOfRange(u64),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Narrowing for [`SessionStore::sessions`]
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub task_id: Option<TaskId>,
    /// Only sessions starting at or after this instant
    pub since: Option<DateTime<Utc>>,
}

impl SessionFilter {
    pub fn task(task_id: TaskId) -> Self {
        Self {
            task_id: Some(task_id),
            since: None,
        }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }
}

/// Durable collection of time sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The unique session without an end time, if any
    async fn find_open_session(&self) -> StoreResult<Option<TimeSession>>;

    /// Create an open session. Fails with [`StoreError::OpenSessionExists`]
    /// when one is already open.
    async fn insert_open_session(
        &self,
        task_id: TaskId,
        start_time: DateTime<Utc>,
    ) -> StoreResult<SessionId>;

    /// Close an open session, freezing its duration. `Ok(false)` when no
    /// open session has this id.
    async fn close_session(
        &self,
        id: SessionId,
        end_time: DateTime<Utc>,
        duration_seconds: u64,
    ) -> StoreResult<bool>;

    /// Record an already-closed session of `seconds` ending at `now`.
    /// `Ok(None)` when `seconds` is zero.
    async fn insert_closed_session(
        &self,
        task_id: TaskId,
        seconds: u64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<SessionId>>;

    async fn delete_session(&self, id: SessionId) -> StoreResult<bool>;

    /// Sessions matching `filter`, oldest first
    async fn sessions(&self, filter: &SessionFilter) -> StoreResult<Vec<TimeSession>>;

    /// Sum of frozen durations over the given tasks
    async fn total_seconds(&self, task_ids: &[TaskId]) -> StoreResult<u64>;
}

/// Task lookup used to hydrate the active-task display
#[async_trait]
pub trait TaskLookup: Send + Sync {
    async fn get_task_by_id(&self, id: TaskId) -> StoreResult<Option<Task>>;
}
