//! focus - Pomodoro cycle for deep work
//!
//! Work phases alternate with short breaks, and every few work phases earn
//! a long break. The engine counts down, reports each completion and waits
//! for the caller to decide what happens next.
//!
//! Settings (phase lengths and long-break cadence) persist as JSON through
//! a [`SettingsStore`].

pub mod cycle;
pub mod settings;

pub use cycle::{CycleCompletion, CycleMode, CycleState, FocusCycleEngine};
pub use settings::{
    FocusSettings, JsonSettingsStore, MemorySettingsStore, SettingsStore, SettingsUpdate,
};
