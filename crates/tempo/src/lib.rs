//! tempo - local-first time tracking with a Pomodoro cycle alongside
//!
//! The binary is a thin front end; the library holds the policy that ties
//! the task timer and the focus cycle together.

pub mod coordinator;

pub use coordinator::{Coordinator, Followup, StartOutcome, FOCUS_TICK};
