//! Shortest-job-first cost model.
//!
//! Prefers tasks that are expected to finish quickly and tasks that have
//! waited long. All policy signal sits on two arcs:
//!
//! - **task → cluster aggregator**: the task's average runtime, so short
//!   jobs are cheap to run.
//! - **task → unscheduled aggregator**: the larger of the scaled wait time
//!   and the average runtime, so leaving a task idle is never cheaper than
//!   running it and grows more expensive the longer it waits.
//!
//! Every other arc costs 0, which leaves the solver's choice driven purely
//! by job-length estimates.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use tracing::debug;

use flow_core::{
    Clock, ClusterSnapshot, Cost, CostModelKind, JobId, ResourceId, SjfConfig, TaskDescriptor,
    TaskEquivClass, TaskId, saturating_cost,
};

use crate::equiv_class::{binary_equiv_class, primary_equiv_class};
use crate::error::{CostModelError, CostModelResult};
use crate::interface::CostModel;
use crate::knowledge_base::KnowledgeBase;

/// Microseconds per coarse wait-time unit (300 ms of waiting is 3 units).
const WAIT_TIME_UNIT_MICROS: u64 = 100_000;

/// Factor applied to average runtimes in milliseconds.
const RUNTIME_SCALE: u64 = 100;

/// Shortest-job-first policy over one round's snapshot.
///
/// Runtime estimates come from the knowledge base; wait times are read
/// from the clock on every call.
pub struct SjfCostModel {
    snapshot: Arc<ClusterSnapshot>,
    knowledge_base: Arc<dyn KnowledgeBase>,
    clock: Arc<dyn Clock>,
    wait_time_multiplier: u64,
    num_preference_arcs: usize,
    preference_arc_seed: u64,
}

impl SjfCostModel {
    /// Create a model with default weights and preference seed 0.
    pub fn new(
        snapshot: Arc<ClusterSnapshot>,
        knowledge_base: Arc<dyn KnowledgeBase>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_config(snapshot, knowledge_base, clock, &SjfConfig::default(), 0)
    }

    /// Create a model from explicit SJF settings.
    ///
    /// `preference_arc_seed` fixes which leaves each class samples.
    pub fn with_config(
        snapshot: Arc<ClusterSnapshot>,
        knowledge_base: Arc<dyn KnowledgeBase>,
        clock: Arc<dyn Clock>,
        config: &SjfConfig,
        preference_arc_seed: u64,
    ) -> Self {
        Self {
            snapshot,
            knowledge_base,
            clock,
            wait_time_multiplier: config.wait_time_multiplier,
            num_preference_arcs: config.num_preference_arcs,
            preference_arc_seed,
        }
    }

    fn task(&self, task_id: TaskId) -> CostModelResult<&TaskDescriptor> {
        self.snapshot
            .task(task_id)
            .ok_or(CostModelError::TaskNotFound(task_id))
    }

    /// Time since submission in coarse units.
    fn wait_time_scaled(&self, td: &TaskDescriptor) -> u64 {
        let now = self.clock.now_micros();
        now.saturating_sub(td.submit_time) / WAIT_TIME_UNIT_MICROS
    }

    /// Average runtime of the task's primary class, in cost units.
    ///
    /// Scaled from microseconds so sub-millisecond runtimes still price
    /// above zero.
    fn avg_runtime_scaled(&self, task_id: TaskId) -> CostModelResult<u64> {
        let classes = self.task_equiv_classes(task_id)?;
        let tec = primary_equiv_class(task_id, &classes)?;
        let avg = self.knowledge_base.avg_runtime_for_tec(tec);
        let avg_us = u64::try_from(avg.as_micros()).unwrap_or(u64::MAX);
        Ok(avg_us.saturating_mul(RUNTIME_SCALE) / 1_000)
    }
}

impl CostModel for SjfCostModel {
    fn policy(&self) -> CostModelKind {
        CostModelKind::Sjf
    }

    fn task_to_unscheduled_agg_cost(&self, task_id: TaskId) -> CostModelResult<Cost> {
        let td = self.task(task_id)?;
        let wait = self.wait_time_scaled(td);
        let avg_runtime = self.avg_runtime_scaled(task_id)?;
        let cost = self.wait_time_multiplier.saturating_mul(wait).max(avg_runtime);
        Ok(saturating_cost(cost))
    }

    fn unscheduled_agg_to_sink_cost(&self, _job_id: &JobId) -> CostModelResult<Cost> {
        Ok(0)
    }

    fn task_to_cluster_agg_cost(&self, task_id: TaskId) -> CostModelResult<Cost> {
        self.avg_runtime_scaled(task_id).map(saturating_cost)
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

    /// A single class: the hash of the task's binary.
    fn task_equiv_classes(&self, task_id: TaskId) -> CostModelResult<Vec<TaskEquivClass>> {
        let td = self.task(task_id)?;
        Ok(vec![binary_equiv_class(&td.binary)])
    }

    /// Sample distinct leaves uniformly at random.
    ///
    /// The generator is seeded from the round seed and `tec`, so a class
    /// gets the same arcs for the same snapshot no matter which thread asks.
    fn equiv_class_preference_arcs(&self, tec: TaskEquivClass) -> CostModelResult<Vec<ResourceId>> {
        let leaves = &self.snapshot.leaf_resources;
        if leaves.is_empty() {
            return Err(CostModelError::EmptyLeafResources);
        }
        if leaves.len() < self.num_preference_arcs {
            return Err(CostModelError::InsufficientLeafResources {
                requested: self.num_preference_arcs,
                available: leaves.len(),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.preference_arc_seed ^ tec);
        let preferred: Vec<ResourceId> = leaves
            .iter()
            .choose_multiple(&mut rng, self.num_preference_arcs)
            .into_iter()
            .cloned()
            .collect();
        debug!(tec, arcs = ?preferred, "equivalence class preference arcs");
        Ok(preferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet, HashSet};
    use std::time::Duration;

    use flow_core::ManualClock;

    use crate::knowledge_base::InMemoryKnowledgeBase;

    const T0: u64 = 1_700_000_000_000_000;

    struct Fixture {
        kb: Arc<InMemoryKnowledgeBase>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                kb: Arc::new(InMemoryKnowledgeBase::new()),
                clock: Arc::new(ManualClock::new(T0)),
            }
        }

        fn model(&self, tasks: Vec<TaskDescriptor>, leaves: &[&str]) -> SjfCostModel {
            self.model_with(tasks, leaves, &SjfConfig::default(), 0)
        }

        fn model_with(
            &self,
            tasks: Vec<TaskDescriptor>,
            leaves: &[&str],
            config: &SjfConfig,
            seed: u64,
        ) -> SjfCostModel {
            let tasks: BTreeMap<TaskId, TaskDescriptor> =
                tasks.into_iter().map(|t| (t.id, t)).collect();
            let leaves: BTreeSet<ResourceId> = leaves.iter().map(|s| s.to_string()).collect();
            let snapshot = Arc::new(ClusterSnapshot::new(1, tasks, leaves));
            SjfCostModel::with_config(snapshot, self.kb.clone(), self.clock.clone(), config, seed)
        }
    }

    #[test]
    fn sleep_task_at_300ms_costs_its_runtime() {
        let fx = Fixture::new();
        fx.kb.record_runtime(binary_equiv_class("sleep"), Duration::from_millis(50));
        let model = fx.model(vec![TaskDescriptor::new(1, "job", "sleep", T0)], &["m0"]);

        fx.clock.advance_millis(300);
        let td = model.task(1).unwrap();
        assert_eq!(model.wait_time_scaled(td), 3);
        assert_eq!(model.avg_runtime_scaled(1), Ok(5000));
        assert_eq!(model.task_to_unscheduled_agg_cost(1), Ok(5000));
    }

    #[test]
    fn sub_millisecond_runtime_still_costs() {
        let fx = Fixture::new();
        fx.kb.record_runtime(binary_equiv_class("tiny"), Duration::from_micros(400));
        fx.kb.record_runtime(binary_equiv_class("tiny"), Duration::from_micros(600));
        let model = fx.model(vec![TaskDescriptor::new(1, "job", "tiny", T0)], &["m0"]);

        assert_eq!(model.avg_runtime_scaled(1), Ok(50));
        assert_eq!(model.task_to_cluster_agg_cost(1), Ok(50));
        assert_eq!(model.task_to_unscheduled_agg_cost(1), Ok(50));
    }

    #[test]
    fn runtime_is_lower_bound_on_unscheduled_cost() {
        let fx = Fixture::new();
        fx.kb.record_runtime(binary_equiv_class("long"), Duration::from_millis(900));
        let model = fx.model(vec![TaskDescriptor::new(1, "job", "long", T0)], &["m0"]);

        for elapsed_ms in [0, 1, 100, 1_000, 60_000] {
            fx.clock.set(T0 + elapsed_ms * 1_000);
            let cost = model.task_to_unscheduled_agg_cost(1).unwrap();
            assert!(cost >= 90_000, "cost {cost} fell below runtime bound at {elapsed_ms}ms");
        }
    }

    #[test]
    fn waiting_increases_cost_past_the_runtime_bound() {
        let fx = Fixture::new();
        fx.kb.record_runtime(binary_equiv_class("sleep"), Duration::from_millis(50));
        let config = SjfConfig {
            wait_time_multiplier: 1_000,
            ..SjfConfig::default()
        };
        let model = fx.model_with(vec![TaskDescriptor::new(1, "job", "sleep", T0)], &["m0"], &config, 0);

        fx.clock.set(T0 + 300_000);
        assert_eq!(model.task_to_unscheduled_agg_cost(1), Ok(5000));

        let mut previous = 5000;
        for step in 6..12u64 {
            fx.clock.set(T0 + step * WAIT_TIME_UNIT_MICROS);
            let cost = model.task_to_unscheduled_agg_cost(1).unwrap();
            assert_eq!(cost, (step * 1_000) as Cost);
            assert!(cost > previous);
            previous = cost;
        }
    }

    #[test]
    fn clock_before_submission_counts_as_no_wait() {
        let fx = Fixture::new();
        let model = fx.model(vec![TaskDescriptor::new(1, "job", "fresh", T0 + 5_000_000)], &["m0"]);
        assert_eq!(model.task_to_unscheduled_agg_cost(1), Ok(0));
    }

    #[test]
    fn cluster_and_resource_costs_follow_runtime() {
        let fx = Fixture::new();
        fx.kb.record_runtime(binary_equiv_class("short"), Duration::from_millis(10));
        fx.kb.record_runtime(binary_equiv_class("long"), Duration::from_millis(500));
        let model = fx.model(
            vec![
                TaskDescriptor::new(1, "job", "short", T0),
                TaskDescriptor::new(2, "job", "long", T0),
            ],
            &["m0", "m1"],
        );

        assert_eq!(model.task_to_cluster_agg_cost(1), Ok(1_000));
        assert_eq!(model.task_to_cluster_agg_cost(2), Ok(50_000));
        assert_eq!(model.task_to_resource_node_cost(1, &"m0".to_string()), Ok(1_000));
        assert_eq!(model.task_to_resource_node_cost(2, &"m1".to_string()), Ok(50_000));
    }

    #[test]
    fn neutral_arcs_cost_nothing() {
        let fx = Fixture::new();
        let model = fx.model(vec![TaskDescriptor::new(1, "job", "sleep", T0)], &["m0"]);
        let m0 = "m0".to_string();

        assert_eq!(model.unscheduled_agg_to_sink_cost(&"job".to_string()), Ok(0));
        assert_eq!(model.cluster_agg_to_resource_node_cost(&m0), Ok(0));
        assert_eq!(model.resource_node_to_resource_node_cost(&"rack".to_string(), &m0), Ok(0));
        assert_eq!(model.leaf_resource_node_to_sink_cost(&m0), Ok(0));
        assert_eq!(model.task_continuation_cost(1), Ok(0));
        assert_eq!(model.task_preemption_cost(1), Ok(0));
        assert_eq!(model.task_to_equiv_class_aggregator(1, 5), Ok(0));
        assert_eq!(model.equiv_class_to_resource_node(5, &m0), Ok(0));
        assert_eq!(model.equiv_class_to_equiv_class(5, 6), Ok(0));
    }

    #[test]
    fn equiv_classes_follow_binary() {
        let fx = Fixture::new();
        let model = fx.model(
            vec![
                TaskDescriptor::new(1, "a", "worker", T0),
                TaskDescriptor::new(2, "b", "worker", T0 + 9),
                TaskDescriptor::new(3, "a", "other", T0),
            ],
            &["m0"],
        );

        let c1 = model.task_equiv_classes(1).unwrap();
        let c2 = model.task_equiv_classes(2).unwrap();
        let c3 = model.task_equiv_classes(3).unwrap();
        assert_eq!(c1.len(), 1);
        assert_eq!(c1, c2);
        assert_ne!(c1[0], c3[0]);
        assert_eq!(c1[0], binary_equiv_class("worker"));
    }

    #[test]
    fn missing_task_is_a_precondition_violation() {
        let fx = Fixture::new();
        let model = fx.model(vec![], &["m0"]);

        assert_eq!(model.task_equiv_classes(42), Err(CostModelError::TaskNotFound(42)));
        assert_eq!(model.task_to_unscheduled_agg_cost(42), Err(CostModelError::TaskNotFound(42)));
        assert_eq!(model.task_to_cluster_agg_cost(42), Err(CostModelError::TaskNotFound(42)));
        assert!(model.task_to_cluster_agg_cost(42).unwrap_err().is_fatal());
    }

    #[test]
    fn single_leaf_always_preferred() {
        let fx = Fixture::new();
        let model = fx.model(vec![], &["only"]);

        for tec in 0..50 {
            let arcs = model.equiv_class_preference_arcs(tec).unwrap();
            assert_eq!(arcs, vec!["only".to_string()]);
        }
    }

    #[test]
    fn preference_arcs_come_from_leaf_set() {
        let fx = Fixture::new();
        let leaves = ["m0", "m1", "m2", "m3"];
        let model = fx.model(vec![], &leaves);

        let mut seen = HashSet::new();
        for tec in 0..200 {
            let arcs = model.equiv_class_preference_arcs(tec).unwrap();
            assert_eq!(arcs.len(), 1);
            assert!(leaves.contains(&arcs[0].as_str()));
            seen.insert(arcs[0].clone());
        }
        assert_eq!(seen.len(), leaves.len(), "sampling should reach every leaf");
    }

    #[test]
    fn preference_arcs_are_reproducible() {
        let fx = Fixture::new();
        let leaves = ["m0", "m1", "m2", "m3", "m4"];
        let a = fx.model_with(vec![], &leaves, &SjfConfig::default(), 17);
        let b = fx.model_with(vec![], &leaves, &SjfConfig::default(), 17);

        for tec in 0..20 {
            assert_eq!(a.equiv_class_preference_arcs(tec), b.equiv_class_preference_arcs(tec));
        }
    }

    #[test]
    fn multiple_preference_arcs_are_distinct() {
        let fx = Fixture::new();
        let config = SjfConfig {
            num_preference_arcs: 3,
            ..SjfConfig::default()
        };
        let model = fx.model_with(vec![], &["m0", "m1", "m2", "m3"], &config, 3);

        let arcs = model.equiv_class_preference_arcs(11).unwrap();
        let distinct: HashSet<_> = arcs.iter().collect();
        assert_eq!(arcs.len(), 3);
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn empty_leaf_set_is_a_precondition_violation() {
        let fx = Fixture::new();
        let model = fx.model(vec![], &[]);

        let err = model.equiv_class_preference_arcs(1).unwrap_err();
        assert_eq!(err, CostModelError::EmptyLeafResources);
        assert!(err.is_fatal());
    }

    #[test]
    fn too_few_leaves_for_requested_arcs() {
        let fx = Fixture::new();
        let config = SjfConfig {
            num_preference_arcs: 2,
            ..SjfConfig::default()
        };
        let model = fx.model_with(vec![], &["m0"], &config, 0);

        assert_eq!(
            model.equiv_class_preference_arcs(1),
            Err(CostModelError::InsufficientLeafResources { requested: 2, available: 1 })
        );
    }

    #[test]
    fn optional_extensions_are_unsupported() {
        let fx = Fixture::new();
        let model = fx.model(vec![TaskDescriptor::new(1, "job", "sleep", T0)], &["m0"]);

        let err = model.task_preference_arcs(1).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(
            err,
            CostModelError::Unsupported {
                policy: CostModelKind::Sjf,
                operation: "task_preference_arcs",
            }
        );
        assert!(model.equiv_class_to_equiv_classes_arcs(1).unwrap_err().is_unsupported());
    }
}
