//! Linkage between the task timer and the focus cycle

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use focus::{CycleMode, FocusCycleEngine, FocusSettings, MemorySettingsStore};
use tempo::{Coordinator, FOCUS_TICK};
use tempo_core::{Config, ManualClock};
use timer::{FailOn, MemoryStore, ProjectId, Task, TaskId, TimerEngine};

fn task(id: i64) -> Task {
    Task {
        id: TaskId(id),
        project_id: ProjectId(1),
        name: format!("Task {}", id),
        completed: false,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
    }
}

struct Harness {
    coordinator: Coordinator,
    store: Arc<MemoryStore>,
    clock: ManualClock,
}

fn harness_with(settings: FocusSettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.add_task(task(1));
    store.add_task(task(2));
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());

    let timer = TimerEngine::new(
        store.clone(),
        store.clone(),
        Arc::new(clock.clone()),
        Duration::from_secs(1),
    );
    let focus = FocusCycleEngine::new(
        Arc::new(MemorySettingsStore::with(settings)),
        Duration::from_secs(1),
    );

    Harness {
        coordinator: Coordinator::new(Arc::new(timer), Arc::new(focus)),
        store,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(FocusSettings::default())
}

#[tokio::test]
async fn test_linked_start_runs_both() {
    let h = harness();
    let outcome = h.coordinator.start_task(TaskId(1), true).await;

    assert!(outcome.timer_started);
    assert!(outcome.focus_started);
    assert_eq!(h.coordinator.timer().active_task_id(), Some(TaskId(1)));

    let state = h.coordinator.focus().state();
    assert_eq!(state.mode, CycleMode::Work);
    assert!(state.is_running);
    assert!(state.is_linked_to_session);
}

#[tokio::test]
async fn test_unlinked_start_leaves_focus_idle() {
    let h = harness();
    let outcome = h.coordinator.start_task(TaskId(1), false).await;

    assert!(outcome.timer_started);
    assert!(!outcome.focus_started);
    assert_eq!(h.coordinator.focus().state().mode, CycleMode::Idle);
}

#[tokio::test]
async fn test_focus_does_not_start_when_timer_is_busy() {
    let h = harness();
    assert!(h.coordinator.start_task(TaskId(1), false).await.timer_started);

    let outcome = h.coordinator.start_task(TaskId(2), true).await;
    assert!(!outcome.timer_started);
    assert!(!outcome.focus_started);
    assert_eq!(h.coordinator.focus().state().mode, CycleMode::Idle);
    assert_eq!(h.coordinator.timer().active_task_id(), Some(TaskId(1)));
}

#[tokio::test]
async fn test_focus_does_not_start_when_store_fails() {
    let h = harness();
    h.store.fail_next(FailOn::Insert);

    let outcome = h.coordinator.start_task(TaskId(1), true).await;
    assert!(!outcome.timer_started);
    assert!(!outcome.focus_started);
    assert!(!h.coordinator.timer().is_running());
    assert_eq!(h.coordinator.focus().state().mode, CycleMode::Idle);
}

#[tokio::test]
async fn test_stopping_the_task_leaves_focus_running() {
    let h = harness();
    h.coordinator.start_task(TaskId(1), true).await;
    h.clock.advance_secs(600);

    assert!(h.coordinator.stop_task().await);
    assert!(!h.coordinator.timer().is_running());

    let state = h.coordinator.focus().state();
    assert_eq!(state.mode, CycleMode::Work);
    assert!(state.is_running);
    assert_eq!(h.store.open_session_count(), 0);
}

#[tokio::test]
async fn test_stopping_focus_leaves_the_task_running() {
    let h = harness();
    h.coordinator.start_task(TaskId(1), true).await;

    h.coordinator.stop_focus();
    assert_eq!(h.coordinator.focus().state().mode, CycleMode::Idle);
    assert!(h.coordinator.timer().is_running());
    assert_eq!(h.store.open_session_count(), 1);
}

#[tokio::test]
async fn test_work_completion_keeps_timer_running() {
    let h = harness();
    h.coordinator.start_task(TaskId(1), true).await;
    h.clock.advance_secs(1500);

    let completion = h.coordinator.focus().skip().unwrap();
    let followup = h.coordinator.handle_completion(&completion, false);

    assert_eq!(followup.next_mode, CycleMode::ShortBreak);
    assert_eq!(followup.title, "Short break!");
    assert!(followup.advanced.is_none());
    assert!(!h.coordinator.focus().state().is_running);

    assert!(h.coordinator.timer().is_running());
    assert_eq!(h.coordinator.timer().tick(), 1500);
}

#[tokio::test]
async fn test_auto_advance_keeps_link() {
    let h = harness();
    h.coordinator.start_task(TaskId(1), true).await;

    let completion = h.coordinator.focus().skip().unwrap();
    let followup = h.coordinator.handle_completion(&completion, true);

    assert_eq!(followup.advanced, Some(CycleMode::ShortBreak));
    let state = h.coordinator.focus().state();
    assert_eq!(state.mode, CycleMode::ShortBreak);
    assert!(state.is_running);
    assert!(state.is_linked_to_session);
    assert_eq!(state.completed_work_sessions, 1);
    assert!(h.coordinator.timer().is_running());

    // Break over, back to work, still linked
    let completion = h.coordinator.focus().skip().unwrap();
    let followup = h.coordinator.handle_completion(&completion, true);
    assert_eq!(followup.title, "Time to work!");
    assert_eq!(followup.advanced, Some(CycleMode::Work));
    assert!(h.coordinator.focus().state().is_linked_to_session);
}

#[tokio::test]
async fn test_long_break_message_after_fourth_work_phase() {
    let h = harness();
    h.coordinator.start_task(TaskId(1), true).await;

    let mut last = None;
    for _ in 0..4 {
        let completion = h.coordinator.focus().skip().unwrap();
        last = Some(h.coordinator.handle_completion(&completion, false));
        h.coordinator.focus().start(CycleMode::Work, true);
    }

    let followup = last.unwrap();
    assert_eq!(followup.next_mode, CycleMode::LongBreak);
    assert_eq!(followup.title, "Long break!");
    assert!(followup.body.contains('4'));
}

#[tokio::test(start_paused = true)]
async fn test_background_completion_leaves_timer_running() {
    let h = harness_with(FocusSettings {
        work_minutes: 0,
        ..Default::default()
    });
    let mut completions = h.coordinator.focus().completions().unwrap();

    h.coordinator.start_task(TaskId(1), true).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let completion = completions.try_recv().unwrap();
    assert_eq!(completion.completed_mode, CycleMode::Work);
    let followup = h.coordinator.handle_completion(&completion, false);
    assert_eq!(followup.next_mode, CycleMode::ShortBreak);

    assert!(h.coordinator.timer().is_running());
    assert_eq!(h.store.open_session_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_focus_countdown_ignores_configured_tick() {
    for tick_interval_ms in [500, 2000] {
        let config = Config {
            tick_interval_ms,
            ..Default::default()
        };
        let store = Arc::new(MemoryStore::new());
        store.add_task(task(1));
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        let coordinator = Coordinator::from_config(
            &config,
            store,
            Arc::new(MemorySettingsStore::new()),
            Arc::new(clock),
        );

        assert!(coordinator.start_task(TaskId(1), true).await.focus_started);
        tokio::time::sleep(FOCUS_TICK * 3 + Duration::from_millis(200)).await;
        assert_eq!(coordinator.focus().state().remaining_seconds, 25 * 60 - 3);
        coordinator.stop_focus();
    }
}
