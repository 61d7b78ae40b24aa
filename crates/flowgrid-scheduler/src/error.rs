//! Scheduler error types.

use thiserror::Error;

use flow_core::TaskId;
use flowgrid_cost::CostModelError;
use flowgrid_topology::TopologyError;

/// Errors that can occur while running a scheduling round.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("task already submitted: {0}")]
    TaskAlreadyExists(TaskId),

    #[error("task {task} cannot be submitted: {reason}")]
    InvalidSubmission { task: TaskId, reason: String },

    #[error("cost model error: {0}")]
    CostModel(#[from] CostModelError),

    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("flow assignment is inconsistent: {0}")]
    InvalidFlow(String),

    #[error("solver error: {0}")]
    Solver(#[from] anyhow::Error),

    #[error("round worker failed: {0}")]
    RoundTask(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
