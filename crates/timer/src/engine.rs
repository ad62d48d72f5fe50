//! Timer engine
//!
//! Enforces the single-active-timer rule and keeps the elapsed display
//! current. The store is authoritative for "is a timer running": the engine
//! validates synchronously, calls the store, and only then mutates its own
//! state, so a failed call leaves the previous state untouched.
//!
//! Transitions (`recover`, `start`, `stop`) are serialised. While one is
//! waiting on the store, another is rejected as a soft failure.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempo_core::{spawn_ticker, Clock, Tick, TickHandle};
use tracing::{debug, error, info, warn};

use crate::model::{rounded_seconds, whole_seconds, SessionId, Task, TaskId};
use crate::store::{SessionStore, TaskLookup};

/// Read-only view of the timer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimerSnapshot {
    pub active_session_id: Option<SessionId>,
    pub active_task_id: Option<TaskId>,
    /// Display copy of the task; `None` if it could not be looked up
    pub active_task: Option<Task>,
    pub start_time: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
}

impl TimerSnapshot {
    pub fn is_running(&self) -> bool {
        self.active_session_id.is_some()
    }
}

#[derive(Debug, Default)]
struct TimerState {
    view: TimerSnapshot,
    in_transition: bool,
}

fn lock(state: &Mutex<TimerState>) -> MutexGuard<'_, TimerState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears the in-transition flag however the transition ends, including
/// when the caller drops the future mid-await.
struct TransitionGuard<'a> {
    state: &'a Mutex<TimerState>,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).in_transition = false;
    }
}

/// The single-active-session state machine
pub struct TimerEngine {
    store: Arc<dyn SessionStore>,
    tasks: Arc<dyn TaskLookup>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    state: Arc<Mutex<TimerState>>,
    ticker: Mutex<Option<TickHandle>>,
}

impl TimerEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        tasks: Arc<dyn TaskLookup>,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            tasks,
            clock,
            tick_interval,
            state: Arc::new(Mutex::new(TimerState::default())),
            ticker: Mutex::new(None),
        }
    }

    /// Restore an open session left in the store by an earlier process.
    ///
    /// Returns `true` when a session was restored and the tick started.
    pub async fn recover(&self) -> bool {
        let Some((_guard, _)) = self.begin_transition("recover", false) else {
            return false;
        };

        let open = match self.store.find_open_session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!("No open session to recover");
                return false;
            }
            Err(e) => {
                error!("Failed to look up open session: {}", e);
                return false;
            }
        };

        self.activate(open.id, open.task_id, open.start_time);
        self.hydrate(open.id, open.task_id).await;
        info!(
            session = %open.id,
            task = %open.task_id,
            elapsed = self.elapsed_seconds(),
            "Recovered running timer"
        );
        true
    }

    /// Open a session for `task_id`. `false` if a timer is already running
    /// or the store refused.
    pub async fn start(&self, task_id: TaskId) -> bool {
        let Some((_guard, _)) = self.begin_transition("start", false) else {
            return false;
        };

        let now = self.clock.now();
        let session_id = match self.store.insert_open_session(task_id, now).await {
            Ok(id) => id,
            Err(e) => {
                error!(task = %task_id, "Failed to start timer: {}", e);
                return false;
            }
        };

        // The session exists from here on, even if this future is dropped
        // before the task lookup finishes.
        self.activate(session_id, task_id, now);
        self.hydrate(session_id, task_id).await;
        info!(session = %session_id, task = %task_id, "Timer started");
        true
    }

    /// Close the running session, freezing its duration. `false` if no
    /// timer is running or the store refused.
    pub async fn stop(&self) -> bool {
        let Some((_guard, view)) = self.begin_transition("stop", true) else {
            return false;
        };
        let (Some(session_id), Some(start_time)) = (view.active_session_id, view.start_time) else {
            return false;
        };

        let end_time = self.clock.now();
        let duration = rounded_seconds(start_time, end_time);

        match self.store.close_session(session_id, end_time, duration).await {
            Ok(true) => {
                self.deactivate();
                info!(session = %session_id, duration, "Timer stopped");
                true
            }
            Ok(false) => {
                warn!(
                    session = %session_id,
                    "Running session no longer open in store, clearing timer"
                );
                self.deactivate();
                false
            }
            Err(e) => {
                error!(session = %session_id, "Failed to stop timer: {}", e);
                false
            }
        }
    }

    /// Recompute the elapsed seconds from the start instant and return them.
    ///
    /// The repeating tick calls this; it is never an accumulator, so a
    /// missed or late tick corrects itself on the next one.
    pub fn tick(&self) -> u64 {
        refresh(&self.state, self.clock.as_ref(), None)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).view.is_running()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        lock(&self.state).view.clone()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        lock(&self.state).view.elapsed_seconds
    }

    pub fn active_task_id(&self) -> Option<TaskId> {
        lock(&self.state).view.active_task_id
    }

    /// Whether the repeating tick is currently scheduled
    pub fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(TickHandle::is_active)
    }

    fn begin_transition(
        &self,
        op: &str,
        must_be_running: bool,
    ) -> Option<(TransitionGuard<'_>, TimerSnapshot)> {
        let mut state = lock(&self.state);
        if state.in_transition {
            warn!("Timer {} rejected: another transition is in progress", op);
            return None;
        }
        if state.view.is_running() != must_be_running {
            if must_be_running {
                warn!("Timer {} rejected: no timer is running", op);
            } else {
                warn!("Timer {} rejected: a timer is already running, stop it first", op);
            }
            return None;
        }

        state.in_transition = true;
        Some((TransitionGuard { state: &self.state }, state.view.clone()))
    }

    /// Attach the task record to the snapshot, unless the session it was
    /// looked up for is no longer the active one.
    async fn hydrate(&self, session_id: SessionId, task_id: TaskId) {
        let task = match self.tasks.get_task_by_id(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!(task = %task_id, "Active task not found, timer runs without it");
                return;
            }
            Err(e) => {
                warn!(task = %task_id, "Failed to load active task: {}", e);
                return;
            }
        };

        let mut state = lock(&self.state);
        if state.view.active_session_id == Some(session_id) {
            state.view.active_task = Some(task);
        }
    }

    fn activate(&self, session_id: SessionId, task_id: TaskId, start_time: DateTime<Utc>) {
        {
            let mut state = lock(&self.state);
            state.view = TimerSnapshot {
                active_session_id: Some(session_id),
                active_task_id: Some(task_id),
                active_task: None,
                start_time: Some(start_time),
                elapsed_seconds: whole_seconds(start_time, self.clock.now()),
            };
        }
        self.start_ticking(session_id);
    }

    fn deactivate(&self) {
        self.stop_ticking();
        lock(&self.state).view = TimerSnapshot::default();
    }

    fn start_ticking(&self, session_id: SessionId) {
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);

        let handle = spawn_ticker(self.tick_interval, move || {
            if lock(&state).view.active_session_id != Some(session_id) {
                return Tick::Stop;
            }
            refresh(&state, clock.as_ref(), Some(session_id));
            Tick::Continue
        });

        let mut ticker = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = ticker.replace(handle) {
            previous.cancel();
        }
    }

    fn stop_ticking(&self) {
        if let Some(handle) = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.cancel();
        }
    }
}

/// Recompute elapsed seconds, optionally only if `expected` is still the
/// active session. Returns the (possibly unchanged) elapsed value.
fn refresh(state: &Mutex<TimerState>, clock: &dyn Clock, expected: Option<SessionId>) -> u64 {
    let mut state = lock(state);
    if expected.is_some() && state.view.active_session_id != expected {
        return state.view.elapsed_seconds;
    }
    if let Some(start) = state.view.start_time {
        state.view.elapsed_seconds = whole_seconds(start, clock.now());
    }
    state.view.elapsed_seconds
}
