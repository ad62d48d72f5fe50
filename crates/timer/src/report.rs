//! Time totals and cost
//!
//! Aggregates closed sessions into per-task and per-project totals. Open
//! sessions are counted but contribute no time until they are stopped and
//! their duration is frozen.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::{Project, ProjectId, Task, TaskId, TimeSession};

/// Time logged against one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskTotal {
    pub task_id: TaskId,
    pub seconds: u64,
    pub sessions: u32,
}

/// Aggregated session statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    /// Number of sessions, open ones included
    pub total_sessions: u32,
    /// Sessions still running
    pub open_sessions: u32,
    /// Sum of frozen durations
    pub total_seconds: u64,
    /// Per task, ordered by task id
    pub per_task: Vec<TaskTotal>,
}

impl Summary {
    /// Calculate statistics from a list of sessions
    pub fn from_sessions(sessions: &[TimeSession]) -> Self {
        if sessions.is_empty() {
            return Self::default();
        }

        let mut per_task: BTreeMap<TaskId, TaskTotal> = BTreeMap::new();
        for session in sessions {
            let entry = per_task.entry(session.task_id).or_insert(TaskTotal {
                task_id: session.task_id,
                seconds: 0,
                sessions: 0,
            });
            entry.seconds += session.duration_seconds;
            entry.sessions += 1;
        }

        Self {
            total_sessions: sessions.len() as u32,
            open_sessions: sessions.iter().filter(|s| s.is_open()).count() as u32,
            total_seconds: sessions.iter().map(|s| s.duration_seconds).sum(),
            per_task: per_task.into_values().collect(),
        }
    }

    /// Get total hours and minutes as a tuple
    pub fn total_time(&self) -> (u64, u64) {
        (self.total_seconds / 3600, (self.total_seconds % 3600) / 60)
    }
}

/// Totals and cost for one project
#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    pub project: Project,
    pub seconds: u64,
    pub cost: i64,
    pub tasks: Vec<TaskTotal>,
}

/// Cost of `seconds` of work at `hourly_rate`, rounded to a whole amount
pub fn calculate_cost(seconds: u64, hourly_rate: f64) -> i64 {
    if seconds == 0 || hourly_rate == 0.0 {
        return 0;
    }
    let hours = seconds as f64 / 3600.0;
    (hours * hourly_rate).round() as i64
}

/// Break a summary down by project. Projects without logged time are kept
/// with zero totals; tasks of unknown projects are left out.
pub fn project_reports(
    projects: &[Project],
    tasks: &[Task],
    summary: &Summary,
) -> Vec<ProjectReport> {
    let owner: BTreeMap<TaskId, ProjectId> = tasks.iter().map(|t| (t.id, t.project_id)).collect();

    projects
        .iter()
        .map(|project| {
            let task_totals: Vec<TaskTotal> = summary
                .per_task
                .iter()
                .filter(|t| owner.get(&t.task_id) == Some(&project.id))
                .cloned()
                .collect();
            let seconds = task_totals.iter().map(|t| t.seconds).sum();

            ProjectReport {
                project: project.clone(),
                seconds,
                cost: calculate_cost(seconds, project.hourly_rate),
                tasks: task_totals,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionId;
    use chrono::{Duration, TimeZone, Utc};

    fn closed(task: i64, seconds: u64) -> TimeSession {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        TimeSession {
            id: SessionId(0),
            task_id: TaskId(task),
            start_time: start,
            end_time: Some(start + Duration::seconds(seconds as i64)),
            duration_seconds: seconds,
        }
    }

    #[test]
    fn test_empty_summary() {
        let summary = Summary::from_sessions(&[]);
        assert_eq!(summary.total_sessions, 0);
        assert_eq!(summary.total_seconds, 0);
        assert!(summary.per_task.is_empty());
    }

    #[test]
    fn test_summary_groups_by_task() {
        let mut open = closed(2, 0);
        open.end_time = None;

        let summary =
            Summary::from_sessions(&[closed(1, 1800), closed(2, 600), closed(1, 900), open]);
        assert_eq!(summary.total_sessions, 4);
        assert_eq!(summary.open_sessions, 1);
        assert_eq!(summary.total_seconds, 3300);
        assert_eq!(summary.per_task.len(), 2);
        assert_eq!(summary.per_task[0].task_id, TaskId(1));
        assert_eq!(summary.per_task[0].seconds, 2700);
        assert_eq!(summary.per_task[1].seconds, 600);
        assert_eq!(summary.per_task[1].sessions, 2);
    }

    #[test]
    fn test_total_time() {
        let summary = Summary::from_sessions(&[closed(1, 5400), closed(1, 2700)]);
        assert_eq!(summary.total_time(), (2, 15));
    }

    #[test]
    fn test_calculate_cost() {
        assert_eq!(calculate_cost(5400, 2000.0), 3000);
        assert_eq!(calculate_cost(0, 2000.0), 0);
        assert_eq!(calculate_cost(5400, 0.0), 0);
        assert_eq!(calculate_cost(1, 1000.0), 0);
    }

    #[test]
    fn test_project_reports() {
        let created = Utc::now();
        let project = |id: i64, hourly_rate: f64| Project {
            id: ProjectId(id),
            name: format!("Project {}", id),
            hourly_rate,
            created_at: created,
        };
        let task = |id: i64, project: i64| Task {
            id: TaskId(id),
            project_id: ProjectId(project),
            name: format!("Task {}", id),
            completed: false,
            created_at: created,
        };

        let projects = vec![project(1, 1000.0), project(2, 0.0)];
        let tasks = vec![task(1, 1), task(2, 1), task(3, 2)];
        let summary = Summary::from_sessions(&[
            closed(1, 3600),
            closed(2, 1800),
            closed(3, 600),
            closed(9, 60),
        ]);

        let reports = project_reports(&projects, &tasks, &summary);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].seconds, 5400);
        assert_eq!(reports[0].cost, 1500);
        assert_eq!(reports[0].tasks.len(), 2);
        assert_eq!(reports[1].seconds, 600);
        assert_eq!(reports[1].cost, 0);
    }
}
