//! Topology error types.

use thiserror::Error;

use flow_core::{ResourceId, TaskId};

/// Result type alias for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors from building or mutating the resource topology.
///
/// A busy resource refusing a task, or an ensemble refusing a member, is
/// not an error; those operations report `false` instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("resource already exists: {0}")]
    DuplicateResource(ResourceId),

    #[error("unknown resource: {0}")]
    UnknownResource(ResourceId),

    #[error("ensemble already exists: {0}")]
    DuplicateEnsemble(String),

    #[error("unknown ensemble: {0}")]
    UnknownEnsemble(String),

    #[error("resource {resource} is a machine and cannot have children")]
    LeafParent { resource: ResourceId },

    #[error("next_available for busy resource {resource} would move back from {current} to {requested}")]
    NextAvailableRegressed {
        resource: ResourceId,
        current: u64,
        requested: u64,
    },

    #[error("task {task} is not running on resource {resource}")]
    TaskNotOnResource { task: TaskId, resource: ResourceId },
}
