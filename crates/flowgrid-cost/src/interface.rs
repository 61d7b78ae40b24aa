//! The cost model contract.
//!
//! The flow network a graph builder assembles has these arc families:
//!
//! ```text
//! task ──► unscheduled aggregator (per job) ──► sink
//! task ──► cluster aggregator ──► resource ──► … ──► leaf resource ──► sink
//! task ──► resource                       (task preference arcs)
//! task ──► equivalence class ──► resource (class preference arcs)
//!                            └─► equivalence class
//! ```
//!
//! Each method below prices one family. Implementations must be pure with
//! respect to the round snapshot they were built over: no method mutates
//! shared state, so the builder may call them from several threads.

use flow_core::{Cost, CostModelKind, JobId, ResourceId, TaskEquivClass, TaskId};

use crate::error::{CostModelError, CostModelResult};

/// A scheduling policy expressed as arc costs.
pub trait CostModel: Send + Sync {
    /// Which policy this is.
    fn policy(&self) -> CostModelKind;

    /// Cost of leaving `task_id` unscheduled this round.
    ///
    /// Should grow with the time the task has waited, so tasks cannot be
    /// left idle forever.
    fn task_to_unscheduled_agg_cost(&self, task_id: TaskId) -> CostModelResult<Cost>;

    /// Cost of the job-wide unscheduled aggregator to sink arc.
    ///
    /// Anything but 0 biases every unscheduled task of the job equally, so
    /// policies keep this neutral and price the task-level arc instead.
    fn unscheduled_agg_to_sink_cost(&self, job_id: &JobId) -> CostModelResult<Cost>;

    /// Baseline cost of running `task_id` anywhere in the cluster.
    fn task_to_cluster_agg_cost(&self, task_id: TaskId) -> CostModelResult<Cost>;

    /// Cost of running `task_id` on `resource_id` specifically.
    fn task_to_resource_node_cost(
        &self,
        task_id: TaskId,
        resource_id: &ResourceId,
    ) -> CostModelResult<Cost>;

    fn cluster_agg_to_resource_node_cost(&self, resource_id: &ResourceId) -> CostModelResult<Cost>;

    fn resource_node_to_resource_node_cost(
        &self,
        source: &ResourceId,
        destination: &ResourceId,
    ) -> CostModelResult<Cost>;

    /// Cost of draining idle capacity at a leaf to the sink.
    fn leaf_resource_node_to_sink_cost(&self, resource_id: &ResourceId) -> CostModelResult<Cost>;

    /// Cost of keeping a running task where it is.
    fn task_continuation_cost(&self, task_id: TaskId) -> CostModelResult<Cost>;

    /// Cost of evicting a running task.
    fn task_preemption_cost(&self, task_id: TaskId) -> CostModelResult<Cost>;

    fn task_to_equiv_class_aggregator(
        &self,
        task_id: TaskId,
        tec: TaskEquivClass,
    ) -> CostModelResult<Cost>;

    fn equiv_class_to_resource_node(
        &self,
        tec: TaskEquivClass,
        resource_id: &ResourceId,
    ) -> CostModelResult<Cost>;

    fn equiv_class_to_equiv_class(
        &self,
        tec1: TaskEquivClass,
        tec2: TaskEquivClass,
    ) -> CostModelResult<Cost>;

    /// Equivalence classes of `task_id`, most specific first. Never empty.
    ///
    /// Graph builders call this before any class-relative cost function.
    fn task_equiv_classes(&self, task_id: TaskId) -> CostModelResult<Vec<TaskEquivClass>>;

    /// Resources that get an explicit preference arc from `tec`.
    fn equiv_class_preference_arcs(&self, tec: TaskEquivClass) -> CostModelResult<Vec<ResourceId>>;

    /// Resources that get an explicit preference arc from `task_id`.
    ///
    /// Optional capability.
    fn task_preference_arcs(&self, task_id: TaskId) -> CostModelResult<Vec<ResourceId>> {
        let _ = task_id;
        Err(CostModelError::Unsupported {
            policy: self.policy(),
            operation: "task_preference_arcs",
        })
    }

    /// Classes `tec` receives flow from and sends flow to.
    ///
    /// Optional capability.
    fn equiv_class_to_equiv_classes_arcs(
        &self,
        tec: TaskEquivClass,
    ) -> CostModelResult<(Vec<TaskEquivClass>, Vec<TaskEquivClass>)> {
        let _ = tec;
        Err(CostModelError::Unsupported {
            policy: self.policy(),
            operation: "equiv_class_to_equiv_classes_arcs",
        })
    }
}
