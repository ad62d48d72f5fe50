//! Records the timer works with

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

record_id!(
    /// Identity of a time session, assigned by the store
    SessionId
);
record_id!(
    /// Identity of a task
    TaskId
);
record_id!(
    /// Identity of a project
    ProjectId
);

/// One contiguous interval of recorded work on a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSession {
    pub id: SessionId,
    pub task_id: TaskId,
    pub start_time: DateTime<Utc>,
    /// `None` while the session is open
    pub end_time: Option<DateTime<Utc>>,
    /// Frozen at stop; 0 while open
    pub duration_seconds: u64,
}

impl TimeSession {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Seconds recorded so far: the frozen duration once closed, the live
    /// whole-second count while open.
    pub fn seconds_at(&self, now: DateTime<Utc>) -> u64 {
        match self.end_time {
            Some(_) => self.duration_seconds,
            None => whole_seconds(self.start_time, now),
        }
    }
}

/// A unit of work that sessions are logged against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub name: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// A group of tasks billed at one hourly rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub hourly_rate: f64,
    pub created_at: DateTime<Utc>,
}

/// `floor((to - from) / 1s)`, never negative
pub fn whole_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from).num_seconds().max(0) as u64
}

/// `round((to - from) / 1s)`, never negative. Used to freeze a duration.
pub fn rounded_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    let millis = (to - from).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        ((millis + 500) / 1000) as u64
    }
}

/// Start instant of a backdated manual entry ending at `end`. `None` when
/// `seconds` reaches outside the representable time range.
pub fn backdated_start(end: DateTime<Utc>, seconds: u64) -> Option<DateTime<Utc>> {
    let seconds = i64::try_from(seconds).ok()?;
    end.checked_sub_signed(Duration::try_seconds(seconds)?)
}
