//! A single schedulable resource.

use serde::{Deserialize, Serialize};
use tracing::debug;

use flow_core::{ResourceId, TaskId};

use crate::ensemble::Ensemble;
use crate::error::{TopologyError, TopologyResult};

/// Where a resource sits in the topology tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A leaf: tasks run here.
    Machine,
    /// An interior node grouping child resources (rack switch, cell).
    Aggregate,
}

/// A schedulable unit of the cluster.
///
/// Holds at most one task at a time. `task_capacity` is recorded for
/// multi-tenant resources but only a single occupant is ever bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    name: ResourceId,
    kind: ResourceKind,
    task_capacity: u32,
    parent: Option<ResourceId>,
    /// Back-reference to the ensemble this resource belongs to.
    current_ensemble: Option<String>,
    current_task: Option<TaskId>,
    /// Soonest time (µs) the resource can take new work.
    next_available: u64,
    busy: bool,
}

impl Resource {
    pub fn new(name: &str, kind: ResourceKind, task_capacity: u32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            task_capacity,
            parent: None,
            current_ensemble: None,
            current_task: None,
            next_available: 0,
            busy: false,
        }
    }

    /// A leaf machine with room for one task.
    pub fn machine(name: &str) -> Self {
        Self::new(name, ResourceKind::Machine, 1)
    }

    /// An interior aggregation point.
    pub fn aggregate(name: &str) -> Self {
        Self::new(name, ResourceKind::Aggregate, 0)
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == ResourceKind::Machine
    }

    pub fn task_capacity(&self) -> u32 {
        self.task_capacity
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn current_ensemble(&self) -> Option<&str> {
        self.current_ensemble.as_deref()
    }

    pub fn current_task(&self) -> Option<TaskId> {
        self.current_task
    }

    pub fn busy(&self) -> bool {
        self.busy
    }

    pub fn next_available(&self) -> u64 {
        self.next_available
    }

    /// Move `next_available`. While a task runs the value may only grow.
    pub fn set_next_available(&mut self, next_available: u64) -> TopologyResult<()> {
        if self.busy && next_available < self.next_available {
            return Err(TopologyError::NextAvailableRegressed {
                resource: self.name.clone(),
                current: self.next_available,
                requested: next_available,
            });
        }
        self.next_available = next_available;
        Ok(())
    }

    /// Bind `task` to this resource.
    ///
    /// Returns `false` and leaves the current occupant alone when the
    /// resource is already busy.
    pub fn run_task(&mut self, task: TaskId) -> bool {
        if self.busy {
            debug!(resource = %self.name, task, occupant = ?self.current_task, "resource busy, task rejected");
            return false;
        }
        self.current_task = Some(task);
        self.busy = true;
        true
    }

    /// Release the occupant and make the resource schedulable again.
    ///
    /// `next_available` moves to `now` unless it already lies later
    /// (a cooldown set by the scheduler loop).
    pub fn task_exited(&mut self, now: u64) -> Option<TaskId> {
        let task = self.current_task.take();
        self.busy = false;
        self.next_available = self.next_available.max(now);
        task
    }

    /// Point this resource at `ensemble` if the ensemble admits it.
    ///
    /// Only the resource side changes. Callers outside this crate go
    /// through [`crate::Topology::join_ensemble`], which also drops the
    /// resource from its previous ensemble.
    pub(crate) fn join_ensemble(&mut self, ensemble: &mut Ensemble) -> bool {
        if !ensemble.admit(&self.name) {
            return false;
        }
        self.current_ensemble = Some(ensemble.name().to_string());
        true
    }

    pub(crate) fn clear_ensemble(&mut self) -> Option<String> {
        self.current_ensemble.take()
    }
}
