//! Immutable view of the cluster taken at the start of a scheduling round.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{ResourceId, TaskDescriptor, TaskId};

/// Read-only task map and leaf-resource set for one round.
///
/// Cost models hold an `Arc<ClusterSnapshot>` and never mutate it, so
/// pricing may fan out across threads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Cluster-state generation the snapshot was taken at.
    pub generation: u64,
    pub tasks: BTreeMap<TaskId, TaskDescriptor>,
    /// Resources tasks actually run on.
    pub leaf_resources: BTreeSet<ResourceId>,
}

impl ClusterSnapshot {
    pub fn new(
        generation: u64,
        tasks: BTreeMap<TaskId, TaskDescriptor>,
        leaf_resources: BTreeSet<ResourceId>,
    ) -> Self {
        Self {
            generation,
            tasks,
            leaf_resources,
        }
    }

    pub fn task(&self, task_id: TaskId) -> Option<&TaskDescriptor> {
        self.tasks.get(&task_id)
    }

    /// Tasks that take part in the round, in id order.
    pub fn schedulable_tasks(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.tasks.values().filter(|t| t.state.is_schedulable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskState;

    #[test]
    fn schedulable_tasks_skip_terminal() {
        let mut tasks = BTreeMap::new();
        tasks.insert(1, TaskDescriptor::new(1, "j", "a", 0));
        let mut done = TaskDescriptor::new(2, "j", "a", 0);
        done.state = TaskState::Completed;
        tasks.insert(2, done);

        let snap = ClusterSnapshot::new(3, tasks, BTreeSet::new());
        let ids: Vec<TaskId> = snap.schedulable_tasks().map(|t| t.id).collect();
        assert_eq!(ids, vec![1]);
        assert!(snap.task(2).is_some());
        assert!(snap.task(9).is_none());
    }
}
