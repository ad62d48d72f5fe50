//! Cancellable repeating tick
//!
//! Both engines drive their display through a once-per-period callback.
//! [`spawn_ticker`] schedules it on the ambient tokio runtime and hands back
//! a [`TickHandle`]; cancelling (or dropping) the handle guarantees the
//! callback is not invoked again.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// What the callback wants after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

/// Owner of a scheduled repeating tick
#[derive(Debug)]
pub struct TickHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TickHandle {
    /// Stop the tick. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Whether the callback can still fire
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Schedule `on_tick` every `period`, first firing one period from now.
///
/// Missed ticks are skipped rather than replayed in a burst. Without a
/// running tokio runtime nothing is scheduled and an inert handle is
/// returned.
pub fn spawn_ticker<F>(period: Duration, mut on_tick: F) -> TickHandle
where
    F: FnMut() -> Tick + Send + 'static,
{
    let token = CancellationToken::new();

    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            warn!("No async runtime available, tick not scheduled");
            token.cancel();
            return TickHandle { token, task: None };
        }
    };

    let cancelled = token.clone();
    let task = runtime.spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => break,
                _ = interval.tick() => {
                    if cancelled.is_cancelled() || on_tick() == Tick::Stop {
                        break;
                    }
                }
            }
        }
    });

    TickHandle {
        token,
        task: Some(task),
    }
}
