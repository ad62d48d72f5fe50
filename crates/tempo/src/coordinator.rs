//! Linkage policy between the task timer and the focus cycle
//!
//! Linking governs starting together, never stopping together: a break
//! does not stop the task timer, and stopping the task leaves the cycle
//! alone. A user may keep logging task time through a break.

use focus::{CycleCompletion, CycleMode, FocusCycleEngine, SettingsStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tempo_core::{Clock, Config};
use timer::{SessionStore, TaskId, TaskLookup, TimerEngine};
use tracing::{info, warn};

/// The Pomodoro countdown moves one second per tick, whatever the display
/// refresh rate is.
pub const FOCUS_TICK: Duration = Duration::from_secs(1);

/// Result of [`Coordinator::start_task`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    pub timer_started: bool,
    pub focus_started: bool,
}

/// What to tell the user after a focus phase completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Followup {
    pub title: String,
    pub body: String,
    pub next_mode: CycleMode,
    /// Set when the next phase was started automatically
    pub advanced: Option<CycleMode>,
}

pub struct Coordinator {
    timer: Arc<TimerEngine>,
    focus: Arc<FocusCycleEngine>,
}

impl Coordinator {
    pub fn new(timer: Arc<TimerEngine>, focus: Arc<FocusCycleEngine>) -> Self {
        Self { timer, focus }
    }

    /// Wire both engines from `config`. The configured tick only paces the
    /// task timer, which recomputes from the clock; the focus cycle always
    /// counts down on [`FOCUS_TICK`].
    pub fn from_config<S>(
        config: &Config,
        store: Arc<S>,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: SessionStore + TaskLookup + 'static,
    {
        let timer = TimerEngine::new(store.clone(), store, clock, config.tick_interval());
        let focus = FocusCycleEngine::new(settings, FOCUS_TICK);
        Self::new(Arc::new(timer), Arc::new(focus))
    }

    pub fn timer(&self) -> &TimerEngine {
        &self.timer
    }

    pub fn focus(&self) -> &FocusCycleEngine {
        &self.focus
    }

    /// Start the task timer, and when asked to link, a work phase with it.
    /// The work phase only starts if the timer did.
    pub async fn start_task(&self, task_id: TaskId, linked: bool) -> StartOutcome {
        let timer_started = self.timer.start(task_id).await;
        if !timer_started {
            return StartOutcome {
                timer_started,
                focus_started: false,
            };
        }

        let focus_started = linked && self.focus.start(CycleMode::Work, true);
        if linked && !focus_started {
            warn!(task = %task_id, "Timer started but the linked focus phase did not");
        }

        StartOutcome {
            timer_started,
            focus_started,
        }
    }

    /// Stop the task timer only
    pub async fn stop_task(&self) -> bool {
        self.timer.stop().await
    }

    /// Stop the focus cycle only
    pub fn stop_focus(&self) {
        self.focus.stop();
    }

    /// Turn a completion into a user-facing message. With `auto_advance`
    /// the next phase starts right away, keeping the current link flag.
    /// The task timer is never touched here.
    pub fn handle_completion(&self, completion: &CycleCompletion, auto_advance: bool) -> Followup {
        let (title, body) = match completion.next_mode {
            CycleMode::LongBreak => (
                "Long break!".to_string(),
                format!(
                    "Great work, {} sessions done. Time for a proper rest.",
                    completion.completed_work_sessions
                ),
            ),
            CycleMode::ShortBreak => (
                "Short break!".to_string(),
                format!(
                    "Session {} done. Take a short pause.",
                    completion.completed_work_sessions
                ),
            ),
            CycleMode::Work | CycleMode::Idle => (
                "Time to work!".to_string(),
                "Break is over. Back to focus.".to_string(),
            ),
        };

        let advanced = if auto_advance {
            let linked = self.focus.state().is_linked_to_session;
            self.focus
                .start(completion.next_mode, linked)
                .then_some(completion.next_mode)
        } else {
            None
        };

        info!(
            completed = completion.completed_mode.as_str(),
            next = completion.next_mode.as_str(),
            auto = advanced.is_some(),
            "Focus phase handed off"
        );

        Followup {
            title,
            body,
            next_mode: completion.next_mode,
            advanced,
        }
    }
}
