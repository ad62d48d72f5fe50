//! timer - task time sessions with a single active timer
//!
//! A task collects time through sessions: `start` opens one, `stop` closes
//! it and freezes its duration. At most one session is open anywhere in the
//! store, and because the store (not memory) is authoritative, a running
//! timer survives a process restart via [`TimerEngine::recover`].
//!
//! - [`model`]: sessions, tasks, projects and their ids
//! - [`store`]: the contracts the engine needs from durable storage
//! - [`sqlite`] / [`memory`]: implementations of those contracts
//! - [`engine`]: the single-active-timer state machine
//! - [`report`]: totals and cost over closed sessions

pub mod engine;
pub mod memory;
pub mod model;
pub mod report;
pub mod sqlite;
pub mod store;

pub use engine::{TimerEngine, TimerSnapshot};
pub use memory::{FailOn, MemoryStore};
pub use model::{Project, ProjectId, SessionId, Task, TaskId, TimeSession};
pub use report::{calculate_cost, project_reports, ProjectReport, Summary, TaskTotal};
pub use sqlite::SqliteStore;
pub use store::{SessionFilter, SessionStore, StoreError, StoreResult, TaskLookup};
