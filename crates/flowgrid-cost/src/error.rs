//! Cost model error types.

use thiserror::Error;

use flow_core::{CostModelKind, TaskId};

/// Result type alias for cost model operations.
pub type CostModelResult<T> = Result<T, CostModelError>;

/// Errors raised while pricing the flow network.
///
/// Two families. Precondition violations mean the
/// round's snapshot is broken and the round must be aborted; `Unsupported`
/// means the policy lacks an optional capability and the caller may skip
/// those arcs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CostModelError {
    #[error("task {0} has no descriptor in the round snapshot")]
    TaskNotFound(TaskId),

    #[error("task {0} resolved to no equivalence classes")]
    NoEquivClasses(TaskId),

    #[error("preference arcs requested against an empty leaf-resource set")]
    EmptyLeafResources,

    #[error("{requested} preference arcs requested but only {available} leaf resources exist")]
    InsufficientLeafResources { requested: usize, available: usize },

    #[error("cost model {policy} does not support {operation}")]
    Unsupported {
        policy: CostModelKind,
        operation: &'static str,
    },
}

impl CostModelError {
    /// The policy lacks an optional capability.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CostModelError::Unsupported { .. })
    }

    /// The round's input is corrupt and the round cannot proceed.
    pub fn is_fatal(&self) -> bool {
        !self.is_unsupported()
    }
}
