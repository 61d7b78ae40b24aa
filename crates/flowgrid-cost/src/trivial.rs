//! Trivial cost model: fixed costs, no preferences.
//!
//! Every task costs the same to run and the same to leave waiting, so the
//! solver places as many tasks as there are free slots and is indifferent
//! to where. Tasks are grouped by job.

use std::sync::Arc;

use flow_core::{
    ClusterSnapshot, Cost, CostModelKind, JobId, ResourceId, TaskEquivClass, TaskId, TrivialConfig,
};

use crate::equiv_class::job_equiv_class;
use crate::error::{CostModelError, CostModelResult};
use crate::interface::CostModel;

/// Fixed-cost policy over one round's snapshot.
pub struct TrivialCostModel {
    snapshot: Arc<ClusterSnapshot>,
    unscheduled_cost: Cost,
    cluster_agg_cost: Cost,
}

impl TrivialCostModel {
    /// Create a model charging the configured flat costs.
    pub fn new(snapshot: Arc<ClusterSnapshot>, config: &TrivialConfig) -> Self {
        Self {
            snapshot,
            unscheduled_cost: config.unscheduled_cost,
            cluster_agg_cost: config.cluster_agg_cost,
        }
    }

    fn ensure_task(&self, task_id: TaskId) -> CostModelResult<()> {
        if self.snapshot.task(task_id).is_none() {
            return Err(CostModelError::TaskNotFound(task_id));
        }
        Ok(())
    }
}

impl CostModel for TrivialCostModel {
    fn policy(&self) -> CostModelKind {
        CostModelKind::Trivial
    }

    fn task_to_unscheduled_agg_cost(&self, task_id: TaskId) -> CostModelResult<Cost> {
        self.ensure_task(task_id)?;
        Ok(self.unscheduled_cost)
    }

    fn unscheduled_agg_to_sink_cost(&self, _job_id: &JobId) -> CostModelResult<Cost> {
        Ok(0)
    }

    fn task_to_cluster_agg_cost(&self, task_id: TaskId) -> CostModelResult<Cost> {
        self.ensure_task(task_id)?;
        Ok(self.cluster_agg_cost)
    }

    fn task_to_resource_node_cost(
        &self,
        task_id: TaskId,
        _resource_id: &ResourceId,
    ) -> CostModelResult<Cost> {
        self.task_to_cluster_agg_cost(task_id)
    }

    fn cluster_agg_to_resource_node_cost(&self, _resource_id: &ResourceId) -> CostModelResult<Cost> {
        Ok(0)
    }

    fn resource_node_to_resource_node_cost(
        &self,
        _source: &ResourceId,
        _destination: &ResourceId,
    ) -> CostModelResult<Cost> {
        Ok(0)
    }

    fn leaf_resource_node_to_sink_cost(&self, _resource_id: &ResourceId) -> CostModelResult<Cost> {
        Ok(0)
    }

    fn task_continuation_cost(&self, _task_id: TaskId) -> CostModelResult<Cost> {
        Ok(0)
    }

    fn task_preemption_cost(&self, _task_id: TaskId) -> CostModelResult<Cost> {
        Ok(0)
    }

    fn task_to_equiv_class_aggregator(
        &self,
        _task_id: TaskId,
        _tec: TaskEquivClass,
    ) -> CostModelResult<Cost> {
        Ok(0)
    }

    fn equiv_class_to_resource_node(
        &self,
        _tec: TaskEquivClass,
        _resource_id: &ResourceId,
    ) -> CostModelResult<Cost> {
        Ok(0)
    }

    fn equiv_class_to_equiv_class(
        &self,
        _tec1: TaskEquivClass,
        _tec2: TaskEquivClass,
    ) -> CostModelResult<Cost> {
        Ok(0)
    }

    fn task_equiv_classes(&self, task_id: TaskId) -> CostModelResult<Vec<TaskEquivClass>> {
        let td = self
            .snapshot
            .task(task_id)
            .ok_or(CostModelError::TaskNotFound(task_id))?;
        Ok(vec![job_equiv_class(&td.job_id)])
    }

    fn equiv_class_preference_arcs(&self, _tec: TaskEquivClass) -> CostModelResult<Vec<ResourceId>> {
        if self.snapshot.leaf_resources.is_empty() {
            return Err(CostModelError::EmptyLeafResources);
        }
        Ok(Vec::new())
    }

    fn task_preference_arcs(&self, task_id: TaskId) -> CostModelResult<Vec<ResourceId>> {
        self.ensure_task(task_id)?;
        Ok(Vec::new())
    }
}
