//! tempo core - shared functionality for the tempo crates
//!
//! Local-first time tracking: projects hold tasks, tasks collect time
//! through start/stop sessions, and a Pomodoro cycle can run alongside.

pub mod clock;
pub mod config;
pub mod format;
pub mod paths;
pub mod ticker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use paths::Paths;
pub use ticker::{spawn_ticker, Tick, TickHandle};
