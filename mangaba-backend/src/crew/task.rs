//! Task arena types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Index into the crew's task arena. Tasks are addressed by index, not by
/// object identity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TaskId(pub usize);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task {}", self.0)
    }
}

/// A unit of work bound to one agent, with optional prerequisites.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub agent_name: String,
    /// Higher runs first among tasks whose dependencies are satisfied.
    pub priority: i32,
    pub deps: Vec<TaskId>,
    pub created_at: DateTime<Utc>,
}

/// Final state of a task after a run. Written exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TaskOutcome {
    Completed { result: String },
    Failed { error: String },
    /// Never executed because a prerequisite failed or was itself skipped.
    Skipped { failed_dependency: TaskId },
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }

    pub fn result(&self) -> Option<&str> {
        match self {
            TaskOutcome::Completed { result } => Some(result),
            _ => None,
        }
    }

    /// One-line description for reporting back to callers.
    pub fn describe(&self) -> String {
        match self {
            TaskOutcome::Completed { result } => result.clone(),
            TaskOutcome::Failed { error } => format!("Error: {}", error),
            TaskOutcome::Skipped { failed_dependency } => {
                format!("Error: skipped, {} did not complete", failed_dependency)
            }
        }
    }
}

/// Aggregate counts over a finished run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl std::fmt::Display for TaskStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} complete ({} failed, {} skipped)",
            self.completed, self.total, self.failed, self.skipped
        )
    }
}
