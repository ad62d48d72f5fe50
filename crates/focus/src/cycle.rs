//! Focus-cycle state machine
//!
//! Alternates work and break phases on a one-second countdown. When a phase
//! runs out (or is skipped) the engine pauses and reports a
//! [`CycleCompletion`]; it never enters the next phase by itself. The caller
//! decides whether to notify, prompt or call [`FocusCycleEngine::start`]
//! again.
//!
//! A cycle may be flagged as linked to a task timer session. The flag is
//! informational: the engine holds no reference to the session.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempo_core::{format, spawn_ticker, Tick, TickHandle};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::settings::{FocusSettings, SettingsStore, SettingsUpdate};

/// Phase of the focus cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CycleMode {
    #[default]
    Idle,
    Work,
    ShortBreak,
    LongBreak,
}

impl CycleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleMode::Idle => "idle",
            CycleMode::Work => "work",
            CycleMode::ShortBreak => "short-break",
            CycleMode::LongBreak => "long-break",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Some(CycleMode::Idle),
            "work" => Some(CycleMode::Work),
            "short-break" | "shortbreak" | "short" => Some(CycleMode::ShortBreak),
            "long-break" | "longbreak" | "long" => Some(CycleMode::LongBreak),
            _ => None,
        }
    }

    /// Human-readable name for display
    pub fn label(&self) -> &'static str {
        match self {
            CycleMode::Idle => "Ready",
            CycleMode::Work => "Work",
            CycleMode::ShortBreak => "Short break",
            CycleMode::LongBreak => "Long break",
        }
    }

    pub fn is_break(&self) -> bool {
        matches!(self, CycleMode::ShortBreak | CycleMode::LongBreak)
    }
}

/// Observable state of the cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleState {
    pub mode: CycleMode,
    pub is_running: bool,
    pub remaining_seconds: u64,
    /// Work phases completed since the last stop
    pub completed_work_sessions: u32,
    pub is_linked_to_session: bool,
}

/// What just finished and what should come next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleCompletion {
    pub completed_mode: CycleMode,
    pub next_mode: CycleMode,
    pub completed_work_sessions: u32,
}

#[derive(Debug, Default)]
struct Shared {
    state: CycleState,
    settings: FocusSettings,
    /// Bumped by every transition; a tick from an older generation is stale
    generation: u64,
}

impl Shared {
    fn duration_for(&self, mode: CycleMode) -> u64 {
        let minutes = match mode {
            CycleMode::ShortBreak => self.settings.short_break_minutes,
            CycleMode::LongBreak => self.settings.long_break_minutes,
            CycleMode::Work | CycleMode::Idle => self.settings.work_minutes,
        };
        u64::from(minutes) * 60
    }

    fn halt(&mut self) {
        self.state.is_running = false;
        self.generation += 1;
    }

    fn complete(&mut self) -> CycleCompletion {
        self.halt();
        let completed_mode = self.state.mode;

        let next_mode = if completed_mode == CycleMode::Work {
            self.state.completed_work_sessions += 1;
            let every = self.settings.sessions_until_long_break;
            if every > 0 && self.state.completed_work_sessions % every == 0 {
                CycleMode::LongBreak
            } else {
                CycleMode::ShortBreak
            }
        } else {
            CycleMode::Work
        };

        CycleCompletion {
            completed_mode,
            next_mode,
            completed_work_sessions: self.state.completed_work_sessions,
        }
    }

    /// One countdown step
    fn step(&mut self) -> Option<CycleCompletion> {
        if !self.state.is_running || self.state.mode == CycleMode::Idle {
            return None;
        }
        self.state.remaining_seconds = self.state.remaining_seconds.saturating_sub(1);
        if self.state.remaining_seconds == 0 {
            Some(self.complete())
        } else {
            None
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// Pomodoro engine, one per application
pub struct FocusCycleEngine {
    shared: Arc<Mutex<Shared>>,
    settings_store: Arc<dyn SettingsStore>,
    tick_interval: Duration,
    ticker: Mutex<Option<TickHandle>>,
    completions_tx: mpsc::UnboundedSender<CycleCompletion>,
    completions_rx: Mutex<Option<mpsc::UnboundedReceiver<CycleCompletion>>>,
}

impl FocusCycleEngine {
    /// Create an idle engine, loading settings from `settings_store`
    pub fn new(settings_store: Arc<dyn SettingsStore>, tick_interval: Duration) -> Self {
        let settings = match settings_store.load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load focus settings, using defaults: {:#}", e);
                FocusSettings::default()
            }
        };
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(Mutex::new(Shared {
                settings,
                ..Default::default()
            })),
            settings_store,
            tick_interval,
            ticker: Mutex::new(None),
            completions_tx,
            completions_rx: Mutex::new(Some(completions_rx)),
        }
    }

    /// Receiver for completions reached by the background tick. Can be
    /// taken once; later calls return `None`.
    pub fn completions(&self) -> Option<mpsc::UnboundedReceiver<CycleCompletion>> {
        self.completions_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Enter `mode` with a full countdown, replacing whatever was running.
    /// `Idle` cannot be started; use [`stop`](Self::stop).
    pub fn start(&self, mode: CycleMode, linked: bool) -> bool {
        if mode == CycleMode::Idle {
            warn!("Focus cycle cannot be started in idle mode");
            return false;
        }

        self.stop_ticking();
        let generation = {
            let mut shared = lock(&self.shared);
            shared.state.mode = mode;
            shared.state.remaining_seconds = shared.duration_for(mode);
            shared.state.is_running = true;
            shared.state.is_linked_to_session = linked;
            shared.generation += 1;
            shared.generation
        };

        info!(mode = mode.as_str(), linked, "Focus phase started");
        self.start_ticking(generation);
        true
    }

    /// Freeze the countdown; mode and remaining time are kept
    pub fn pause(&self) {
        {
            let mut shared = lock(&self.shared);
            if shared.state.is_running {
                shared.halt();
                debug!(remaining = shared.state.remaining_seconds, "Focus phase paused");
            }
        }
        self.stop_ticking();
    }

    /// Continue a paused phase. `false` when idle, already running, or the
    /// phase has already run out.
    pub fn resume(&self) -> bool {
        let generation = {
            let mut shared = lock(&self.shared);
            if shared.state.mode == CycleMode::Idle {
                debug!("Nothing to resume, focus cycle is idle");
                return false;
            }
            if shared.state.is_running {
                return false;
            }
            if shared.state.remaining_seconds == 0 {
                warn!("Focus phase already finished, start the next one instead");
                return false;
            }
            shared.state.is_running = true;
            shared.generation += 1;
            shared.generation
        };

        self.start_ticking(generation);
        true
    }

    /// Full reset to idle, clearing the work-phase counter and the link
    pub fn stop(&self) {
        {
            let mut shared = lock(&self.shared);
            shared.state = CycleState::default();
            shared.generation += 1;
        }
        self.stop_ticking();
        info!("Focus cycle stopped");
    }

    /// Finish the current phase now. `None` when idle.
    pub fn skip(&self) -> Option<CycleCompletion> {
        let completion = {
            let mut shared = lock(&self.shared);
            if shared.state.mode == CycleMode::Idle {
                return None;
            }
            shared.complete()
        };
        self.stop_ticking();
        info!(
            completed = completion.completed_mode.as_str(),
            next = completion.next_mode.as_str(),
            "Focus phase skipped"
        );
        Some(completion)
    }

    /// Advance the countdown by one second, returning the completion if the
    /// phase ran out. The background tick does the same and publishes on
    /// [`completions`](Self::completions) instead.
    pub fn tick(&self) -> Option<CycleCompletion> {
        let completion = lock(&self.shared).step();
        if completion.is_some() {
            self.stop_ticking();
        }
        completion
    }

    /// Merge `update` into the settings and persist them. A phase already
    /// in progress keeps its remaining time.
    pub fn update_settings(&self, update: SettingsUpdate) -> FocusSettings {
        let settings = {
            let mut shared = lock(&self.shared);
            shared.settings = shared.settings.merged(&update);
            shared.settings
        };

        if let Err(e) = self.settings_store.save(&settings) {
            warn!("Failed to save focus settings: {:#}", e);
        }
        settings
    }

    pub fn settings(&self) -> FocusSettings {
        lock(&self.shared).settings
    }

    pub fn state(&self) -> CycleState {
        lock(&self.shared).state
    }

    /// Full length of the current phase in seconds (work length when idle)
    pub fn current_mode_duration(&self) -> u64 {
        let shared = lock(&self.shared);
        shared.duration_for(shared.state.mode)
    }

    /// Percentage of the current phase already elapsed, 0 when idle
    pub fn progress(&self) -> f64 {
        let shared = lock(&self.shared);
        let duration = shared.duration_for(shared.state.mode);
        if shared.state.mode == CycleMode::Idle || duration == 0 {
            return 0.0;
        }
        let remaining = shared.state.remaining_seconds.min(duration);
        (duration - remaining) as f64 / duration as f64 * 100.0
    }

    /// Remaining time as MM:SS
    pub fn formatted_remaining(&self) -> String {
        format::countdown(lock(&self.shared).state.remaining_seconds)
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(TickHandle::is_active)
    }

    fn start_ticking(&self, generation: u64) {
        let shared = Arc::clone(&self.shared);
        let tx = self.completions_tx.clone();

        let handle = spawn_ticker(self.tick_interval, move || {
            let mut shared = lock(&shared);
            if shared.generation != generation {
                return Tick::Stop;
            }
            match shared.step() {
                Some(completion) => {
                    info!(
                        completed = completion.completed_mode.as_str(),
                        next = completion.next_mode.as_str(),
                        "Focus phase complete"
                    );
                    // Nobody listening is fine; the state already reflects it
                    let _ = tx.send(completion);
                    Tick::Stop
                }
                None => Tick::Continue,
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;

    fn engine_with(settings: FocusSettings) -> (FocusCycleEngine, Arc<MemorySettingsStore>) {
        let store = Arc::new(MemorySettingsStore::with(settings));
        let engine = FocusCycleEngine::new(store.clone(), Duration::from_secs(1));
        (engine, store)
    }

    fn engine() -> FocusCycleEngine {
        engine_with(FocusSettings::default()).0
    }

    fn instant_work() -> FocusSettings {
        FocusSettings {
            work_minutes: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_mode_roundtrip() {
        for mode in [
            CycleMode::Idle,
            CycleMode::Work,
            CycleMode::ShortBreak,
            CycleMode::LongBreak,
        ] {
            assert_eq!(CycleMode::from_str(mode.as_str()), Some(mode));
        }
        assert_eq!(CycleMode::from_str("nap"), None);
        assert_eq!(CycleMode::Idle.label(), "Ready");
    }

    #[test]
    fn test_new_engine_is_idle() {
        let engine = engine();
        assert_eq!(engine.state(), CycleState::default());
        assert_eq!(engine.progress(), 0.0);
        assert_eq!(engine.current_mode_duration(), 25 * 60);
        assert!(!engine.is_ticking());
    }

    #[tokio::test]
    async fn test_start_sets_full_countdown() {
        let engine = engine();
        assert!(engine.start(CycleMode::Work, true));

        let state = engine.state();
        assert_eq!(state.mode, CycleMode::Work);
        assert!(state.is_running);
        assert!(state.is_linked_to_session);
        assert_eq!(state.remaining_seconds, 1500);
        assert_eq!(engine.formatted_remaining(), "25:00");
        assert!(engine.is_ticking());

        assert!(engine.start(CycleMode::LongBreak, false));
        assert_eq!(engine.state().remaining_seconds, 900);
        assert!(!engine.state().is_linked_to_session);
    }

    #[tokio::test]
    async fn test_start_idle_is_rejected() {
        let engine = engine();
        assert!(!engine.start(CycleMode::Idle, false));
        assert_eq!(engine.state(), CycleState::default());
    }

    #[tokio::test]
    async fn test_zero_length_work_completes_on_first_tick() {
        let (engine, _) = engine_with(instant_work());
        engine.start(CycleMode::Work, false);

        let completion = engine.tick().unwrap();
        assert_eq!(completion.completed_mode, CycleMode::Work);
        assert_eq!(completion.next_mode, CycleMode::ShortBreak);
        assert_eq!(completion.completed_work_sessions, 1);

        // Completion pauses; it never advances by itself
        let state = engine.state();
        assert!(!state.is_running);
        assert_eq!(state.mode, CycleMode::Work);
        assert!(!engine.is_ticking());
    }

    #[tokio::test]
    async fn test_every_fourth_work_phase_earns_long_break() {
        let (engine, _) = engine_with(instant_work());
        let mut next = Vec::new();
        for _ in 0..8 {
            engine.start(CycleMode::Work, false);
            next.push(engine.tick().unwrap().next_mode);
        }

        use CycleMode::{LongBreak, ShortBreak};
        assert_eq!(
            next,
            vec![
                ShortBreak, ShortBreak, ShortBreak, LongBreak, ShortBreak, ShortBreak, ShortBreak,
                LongBreak
            ]
        );
    }

    #[tokio::test]
    async fn test_skip_forces_completion() {
        let engine = engine();
        for expected in 1..=4u32 {
            engine.start(CycleMode::Work, false);
            let completion = engine.skip().unwrap();
            assert_eq!(completion.completed_work_sessions, expected);
            let want = if expected == 4 {
                CycleMode::LongBreak
            } else {
                CycleMode::ShortBreak
            };
            assert_eq!(completion.next_mode, want);
            assert!(!engine.is_ticking());
        }
    }

    #[tokio::test]
    async fn test_break_completion_leads_to_work() {
        let engine = engine();
        engine.start(CycleMode::Work, false);
        engine.skip();
        engine.start(CycleMode::ShortBreak, false);

        let completion = engine.skip().unwrap();
        assert_eq!(completion.completed_mode, CycleMode::ShortBreak);
        assert_eq!(completion.next_mode, CycleMode::Work);
        assert_eq!(completion.completed_work_sessions, 1);
    }

    #[test]
    fn test_skip_when_idle_does_nothing() {
        let engine = engine();
        assert!(engine.skip().is_none());
        assert_eq!(engine.state(), CycleState::default());
    }

    #[tokio::test]
    async fn test_no_long_break_when_cadence_is_zero() {
        let (engine, _) = engine_with(FocusSettings {
            work_minutes: 0,
            sessions_until_long_break: 0,
            ..Default::default()
        });
        for _ in 0..5 {
            engine.start(CycleMode::Work, false);
            assert_eq!(engine.tick().unwrap().next_mode, CycleMode::ShortBreak);
        }
    }

    #[tokio::test]
    async fn test_pause_resume_preserves_remaining() {
        let engine = engine();
        engine.start(CycleMode::Work, false);
        for _ in 0..3 {
            assert!(engine.tick().is_none());
        }
        assert_eq!(engine.state().remaining_seconds, 1497);

        engine.pause();
        assert!(!engine.state().is_running);
        assert!(!engine.is_ticking());
        assert!(engine.tick().is_none());
        assert_eq!(engine.state().remaining_seconds, 1497);

        assert!(engine.resume());
        assert!(engine.state().is_running);
        assert_eq!(engine.state().remaining_seconds, 1497);
        assert!(engine.is_ticking());

        engine.tick();
        assert_eq!(engine.state().remaining_seconds, 1496);
        assert!(!engine.resume());
    }

    #[test]
    fn test_resume_from_idle_is_noop() {
        let engine = engine();
        assert!(!engine.resume());
        assert!(!engine.state().is_running);
    }

    #[tokio::test]
    async fn test_resume_after_completion_is_noop() {
        let (engine, _) = engine_with(instant_work());
        engine.start(CycleMode::Work, false);
        engine.tick().unwrap();

        assert!(!engine.resume());
        assert_eq!(engine.state().completed_work_sessions, 1);
    }

    #[tokio::test]
    async fn test_stop_is_a_full_reset() {
        let engine = engine();
        engine.start(CycleMode::Work, true);
        engine.skip();
        engine.start(CycleMode::ShortBreak, true);

        engine.stop();
        assert_eq!(engine.state(), CycleState::default());
        assert!(!engine.is_ticking());
    }

    #[tokio::test]
    async fn test_progress() {
        let engine = engine();
        engine.start(CycleMode::Work, false);
        assert_eq!(engine.progress(), 0.0);
        for _ in 0..300 {
            engine.tick();
        }
        assert!((engine.progress() - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_update_settings_persists_without_rescaling() {
        let (engine, store) = engine_with(FocusSettings::default());
        engine.start(CycleMode::Work, false);
        engine.tick();

        let updated = engine.update_settings(SettingsUpdate {
            work_minutes: Some(50),
            ..Default::default()
        });
        assert_eq!(updated.work_minutes, 50);
        assert_eq!(store.saved().unwrap().work_minutes, 50);
        assert_eq!(engine.state().remaining_seconds, 1499);

        engine.start(CycleMode::Work, false);
        assert_eq!(engine.state().remaining_seconds, 3000);
    }

    #[test]
    fn test_settings_failures_fall_back_to_defaults() {
        let engine = FocusCycleEngine::new(
            Arc::new(MemorySettingsStore::failing()),
            Duration::from_secs(1),
        );
        assert_eq!(engine.settings(), FocusSettings::default());

        let updated = engine.update_settings(SettingsUpdate {
            long_break_minutes: Some(30),
            ..Default::default()
        });
        assert_eq!(updated.long_break_minutes, 30);
        assert_eq!(engine.settings().long_break_minutes, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_tick_publishes_completion() {
        let (engine, _) = engine_with(FocusSettings {
            short_break_minutes: 0,
            ..Default::default()
        });
        let mut completions = engine.completions().unwrap();
        assert!(engine.completions().is_none());

        engine.start(CycleMode::ShortBreak, false);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let completion = completions.try_recv().unwrap();
        assert_eq!(completion.completed_mode, CycleMode::ShortBreak);
        assert_eq!(completion.next_mode, CycleMode::Work);
        assert!(!engine.state().is_running);
        assert!(!engine.is_ticking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_tick_counts_down() {
        let engine = engine();
        engine.start(CycleMode::Work, false);
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(engine.state().remaining_seconds, 1497);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_cycle_does_not_tick() {
        let engine = engine();
        engine.start(CycleMode::Work, false);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        engine.pause();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(engine.state().remaining_seconds, 1498);
        assert!(!engine.state().is_running);
    }
}
