//! Shared types used across flowgrid crates.

use serde::{Deserialize, Serialize};

/// Cost of routing one unit of flow over an arc. Lower is preferred.
pub type Cost = i64;

/// Unique identifier for a task.
pub type TaskId = u64;

/// Unique identifier for a job (the owner of a group of tasks).
pub type JobId = String;

/// Unique identifier for a resource. Resource names are unique, so the
/// name doubles as the identifier.
pub type ResourceId = String;

/// Task equivalence class: groups tasks expected to behave alike.
pub type TaskEquivClass = u64;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    /// Waiting for a placement (the "unscheduled" state).
    Runnable,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    /// Whether the task takes part in a scheduling round.
    pub fn is_schedulable(&self) -> bool {
        matches!(self, TaskState::Runnable | TaskState::Running)
    }

    /// Whether the task has left the cluster for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// Everything the scheduler knows about a single task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: TaskId,
    pub job_id: JobId,
    pub name: String,
    /// Executable identity; tasks running the same binary share statistics.
    pub binary: String,
    /// Submission time, microseconds since the Unix epoch.
    pub submit_time: u64,
    pub state: TaskState,
    /// Resource the task currently runs on, if any.
    #[serde(default)]
    pub scheduled_to: Option<ResourceId>,
}

impl TaskDescriptor {
    /// A freshly submitted, runnable task.
    pub fn new(id: TaskId, job_id: &str, binary: &str, submit_time: u64) -> Self {
        Self {
            id,
            job_id: job_id.to_string(),
            name: format!("{job_id}/{id}"),
            binary: binary.to_string(),
            submit_time,
            state: TaskState::Runnable,
            scheduled_to: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }
}

/// Clamp an unsigned cost computation into the signed cost domain.
pub fn saturating_cost(value: u64) -> Cost {
    Cost::try_from(value).unwrap_or(Cost::MAX)
}
