//! In-memory store with failure injection
//!
//! Behaves like [`SqliteStore`](crate::SqliteStore) for everything the
//! engine relies on, but lets a caller make the next call of a given kind
//! fail or slow every call down. Used to exercise the engine's degraded
//! paths without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::model::{backdated_start, SessionId, Task, TaskId, TimeSession};
use crate::store::{SessionFilter, SessionStore, StoreError, StoreResult, TaskLookup};

/// Operation whose next call should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOn {
    Find,
    Insert,
    Close,
    Lookup,
}

#[derive(Debug, Default)]
struct Records {
    next_id: i64,
    sessions: BTreeMap<SessionId, TimeSession>,
    tasks: HashMap<TaskId, Task>,
}

/// Store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
    failures: Mutex<HashSet<FailOn>>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next call of `op` return an error
    pub fn fail_next(&self, op: FailOn) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(op);
    }

    /// Delay every store call by `latency` (lets callers interleave)
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = Some(latency);
    }

    pub fn add_task(&self, task: Task) {
        self.records().tasks.insert(task.id, task);
    }

    /// Insert a session as-is, open or closed
    pub fn seed_session(&self, mut session: TimeSession) -> SessionId {
        let mut records = self.records();
        records.next_id += 1;
        session.id = SessionId(records.next_id);
        let id = session.id;
        records.sessions.insert(id, session);
        id
    }

    pub fn session(&self, id: SessionId) -> Option<TimeSession> {
        self.records().sessions.get(&id).cloned()
    }

    pub fn open_session_count(&self) -> usize {
        self.records().sessions.values().filter(|s| s.is_open()).count()
    }

    pub fn all_sessions(&self) -> Vec<TimeSession> {
        self.records().sessions.values().cloned().collect()
    }

    async fn enter(&self, op: Option<FailOn>) -> StoreResult<()> {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(op) = op {
            let injected = self
                .failures
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&op);
            if injected {
                return Err(StoreError::Unavailable(format!("injected {:?} failure", op)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find_open_session(&self) -> StoreResult<Option<TimeSession>> {
        self.enter(Some(FailOn::Find)).await?;
        Ok(self.records().sessions.values().find(|s| s.is_open()).cloned())
    }

    async fn insert_open_session(
        &self,
        task_id: TaskId,
        start_time: DateTime<Utc>,
    ) -> StoreResult<SessionId> {
        self.enter(Some(FailOn::Insert)).await?;
        let mut records = self.records();
        if records.sessions.values().any(|s| s.is_open()) {
            return Err(StoreError::OpenSessionExists);
        }

        records.next_id += 1;
        let id = SessionId(records.next_id);
        records.sessions.insert(
            id,
            TimeSession {
                id,
                task_id,
                start_time,
                end_time: None,
                duration_seconds: 0,
            },
        );
        Ok(id)
    }

    async fn close_session(
        &self,
        id: SessionId,
        end_time: DateTime<Utc>,
        duration_seconds: u64,
    ) -> StoreResult<bool> {
        self.enter(Some(FailOn::Close)).await?;
        let mut records = self.records();
        match records.sessions.get_mut(&id) {
            Some(session) if session.is_open() => {
                session.end_time = Some(end_time);
                session.duration_seconds = duration_seconds;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_closed_session(
        &self,
        task_id: TaskId,
        seconds: u64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<SessionId>> {
        self.enter(None).await?;
        if seconds == 0 {
            return Ok(None);
        }
        let start_time =
            backdated_start(now, seconds).ok_or(StoreError::DurationOutOfRange(seconds))?;
        Ok(Some(self.seed_session(TimeSession {
            id: SessionId(0),
            task_id,
            start_time,
            end_time: Some(now),
            duration_seconds: seconds,
        })))
    }

    async fn delete_session(&self, id: SessionId) -> StoreResult<bool> {
        self.enter(None).await?;
        Ok(self.records().sessions.remove(&id).is_some())
    }

    async fn sessions(&self, filter: &SessionFilter) -> StoreResult<Vec<TimeSession>> {
        self.enter(None).await?;
        let mut sessions: Vec<TimeSession> = self
            .records()
            .sessions
            .values()
            .filter(|s| filter.task_id.map_or(true, |t| s.task_id == t))
            .filter(|s| filter.since.map_or(true, |since| s.start_time >= since))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.start_time, s.id));
        Ok(sessions)
    }

    async fn total_seconds(&self, task_ids: &[TaskId]) -> StoreResult<u64> {
        self.enter(None).await?;
        Ok(self
            .records()
            .sessions
            .values()
            .filter(|s| task_ids.contains(&s.task_id))
            .map(|s| s.duration_seconds)
            .sum())
    }
}

#[async_trait]
impl TaskLookup for MemoryStore {
    async fn get_task_by_id(&self, id: TaskId) -> StoreResult<Option<Task>> {
        self.enter(Some(FailOn::Lookup)).await?;
        Ok(self.records().tasks.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let store = MemoryStore::new();
        store.fail_next(FailOn::Find);

        assert!(store.find_open_session().await.is_err());
        assert!(store.find_open_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_single_open_session_enforced() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let id = store.insert_open_session(TaskId(1), now).await.unwrap();

        let second = store.insert_open_session(TaskId(2), now).await;
        assert!(matches!(second, Err(StoreError::OpenSessionExists)));

        assert!(store.close_session(id, now, 0).await.unwrap());
        assert!(!store.close_session(id, now, 5).await.unwrap());
        assert_eq!(store.session(id).unwrap().duration_seconds, 0);
        assert_eq!(store.open_session_count(), 0);
    }

    #[tokio::test]
    async fn test_manual_entry_out_of_range_is_rejected() {
        let store = MemoryStore::new();
        let result = store.insert_closed_session(TaskId(1), u64::MAX, Utc::now()).await;
        assert!(matches!(result, Err(StoreError::DurationOutOfRange(_))));
        assert!(store.all_sessions().is_empty());
    }
}
