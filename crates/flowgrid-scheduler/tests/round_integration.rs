//! Full scheduling rounds against a small greedy solver.

use std::sync::{Arc, OnceLock};

use tokio::sync::RwLock;

use flow_core::{
    Cost, CostModelConfig, CostModelKind, ManualClock, SjfConfig, TaskDescriptor, TaskId,
    TaskState,
};
use flowgrid_cost::{InMemoryKnowledgeBase, binary_equiv_class};
use flowgrid_scheduler::{
    ArcId, ArcKind, ClusterState, FlowAssignment, FlowGraph, FlowSolver, NodeId, Placement,
    RoundOutcome, RoundReport, RoundScheduler,
};
use flowgrid_topology::{Ensemble, Resource};

/// Repeatedly places the task that saves the most against leaving it
/// waiting, along its cheapest path with spare capacity.
struct GreedySolver;

fn cheapest_path(
    graph: &FlowGraph,
    node: NodeId,
    residual: &[u64],
    on_path: &mut Vec<NodeId>,
) -> Option<(Cost, Vec<ArcId>)> {
    if node == graph.sink() {
        return Some((0, Vec::new()));
    }
    on_path.push(node);
    let mut best: Option<(Cost, Vec<ArcId>)> = None;
    for arc in graph.outgoing(node) {
        if residual[arc.id] == 0 || arc.kind == ArcKind::TaskToUnscheduled || on_path.contains(&arc.dst) {
            continue;
        }
        if let Some((cost, mut rest)) = cheapest_path(graph, arc.dst, residual, on_path) {
            let total = cost + arc.cost;
            if best.as_ref().is_none_or(|(b, _)| total < *b) {
                rest.insert(0, arc.id);
                best = Some((total, rest));
            }
        }
    }
    on_path.pop();
    best
}

impl FlowSolver for GreedySolver {
    fn solve(&self, graph: &FlowGraph) -> anyhow::Result<FlowAssignment> {
        let mut residual: Vec<u64> = graph.arcs().iter().map(|a| a.capacity).collect();
        let mut flow = FlowAssignment::new();
        let mut pending: Vec<TaskId> = graph.task_ids().collect();

        loop {
            let mut best: Option<(Cost, TaskId, Vec<ArcId>)> = None;
            for task_id in &pending {
                let node = graph.task_node(*task_id).expect("task node");
                let waiting = graph
                    .outgoing(node)
                    .find(|a| a.kind == ArcKind::TaskToUnscheduled)
                    .expect("unscheduled arc")
                    .cost;
                let Some((cost, path)) = cheapest_path(graph, node, &residual, &mut Vec::new()) else {
                    continue;
                };
                let saving = waiting - cost;
                if saving > 0 && best.as_ref().is_none_or(|(s, _, _)| saving > *s) {
                    best = Some((saving, *task_id, path));
                }
            }
            let Some((_, task_id, path)) = best else {
                break;
            };
            for arc in &path {
                residual[*arc] -= 1;
            }
            flow.push_path(&path);
            pending.retain(|t| *t != task_id);
        }

        for task_id in pending {
            flow.route_task(graph, task_id, &Placement::Unscheduled)?;
        }
        Ok(flow)
    }
}

/// Changes the cluster while the round is solving.
struct InterferingSolver {
    state: OnceLock<Arc<RwLock<ClusterState>>>,
}

impl FlowSolver for InterferingSolver {
    fn solve(&self, graph: &FlowGraph) -> anyhow::Result<FlowAssignment> {
        if let Some(state) = self.state.get() {
            let mut state = state.blocking_write();
            state.tasks.insert(99, TaskDescriptor::new(99, "late", "bin", 0));
            state.generation += 1;
        }
        GreedySolver.solve(graph)
    }
}

const SECOND: u64 = 1_000_000;

fn sjf_config(wait_time_multiplier: u64) -> CostModelConfig {
    CostModelConfig {
        kind: CostModelKind::Sjf,
        sjf: SjfConfig {
            wait_time_multiplier,
            ..SjfConfig::default()
        },
        ..CostModelConfig::default()
    }
}

fn applied(outcome: RoundOutcome) -> RoundReport {
    match outcome {
        RoundOutcome::Applied(report) => report,
        other => panic!("round was not applied: {other:?}"),
    }
}

#[tokio::test]
async fn longest_waiting_task_runs_first() {
    let clock = Arc::new(ManualClock::new(SECOND));
    let kb = Arc::new(InMemoryKnowledgeBase::new());

    let sched = RoundScheduler::new(sjf_config(1000), kb.clone(), clock.clone(), Arc::new(GreedySolver));
    sched.add_resource(Resource::machine("m0")).await.unwrap();
    sched
        .submit_task(TaskDescriptor::new(1, "batch", "bin", 0))
        .await
        .unwrap();
    sched
        .submit_task(TaskDescriptor::new(2, "batch", "bin", SECOND / 2))
        .await
        .unwrap();

    // Waiting costs 10 units × 1000 for task 1 and 5 × 1000 for task 2.
    let report = applied(sched.run_round().await.unwrap());
    assert_eq!(report.placed, vec![(1, "m0".to_string())]);
    assert_eq!(report.unscheduled, vec![2]);

    clock.advance_millis(10);
    sched.task_completed(1).await.unwrap();
    assert_eq!(kb.sample_count(binary_equiv_class("bin")), 1);

    let report = applied(sched.run_round().await.unwrap());
    assert_eq!(report.placed, vec![(2, "m0".to_string())]);
    assert_eq!(sched.task(2).await.unwrap().state, TaskState::Running);
    assert_eq!(sched.task(1).await.unwrap().state, TaskState::Completed);
}

#[tokio::test]
async fn fills_a_rack_tree() {
    let clock = Arc::new(ManualClock::new(10 * SECOND));
    let sched = RoundScheduler::new(
        sjf_config(1),
        Arc::new(InMemoryKnowledgeBase::new()),
        clock,
        Arc::new(GreedySolver),
    );
    for rack in ["rack-a", "rack-b"] {
        sched.add_resource(Resource::aggregate(rack)).await.unwrap();
        for i in 0..2 {
            sched
                .add_resource(Resource::machine(&format!("{rack}-m{i}")).with_parent(rack))
                .await
                .unwrap();
        }
    }
    for id in 1..=5 {
        sched
            .submit_task(TaskDescriptor::new(id, "job", "bin", 0))
            .await
            .unwrap();
    }

    let report = applied(sched.run_round().await.unwrap());
    assert_eq!(report.placed.len(), 4);
    assert_eq!(report.unscheduled.len(), 1);
    let mut machines: Vec<_> = report.placed.iter().map(|(_, m)| m.clone()).collect();
    machines.sort();
    machines.dedup();
    assert_eq!(machines.len(), 4);

    // A full cluster keeps its tasks and leaves the fifth waiting.
    let report = applied(sched.run_round().await.unwrap());
    assert!(report.placed.is_empty());
    assert!(report.preempted.is_empty());
    assert_eq!(report.unscheduled.len(), 1);

    let state = sched.state();
    let state = state.read().await;
    assert_eq!(state.topology.idle_leaf_count(), 0);
    let running = state
        .tasks
        .values()
        .filter(|t| t.state == TaskState::Running)
        .count();
    assert_eq!(running, 4);
}

#[tokio::test]
async fn trivial_policy_places_up_to_capacity() {
    let config = CostModelConfig {
        kind: CostModelKind::Trivial,
        ..CostModelConfig::default()
    };
    let sched = RoundScheduler::new(
        config,
        Arc::new(InMemoryKnowledgeBase::new()),
        Arc::new(ManualClock::new(0)),
        Arc::new(GreedySolver),
    );
    sched.add_resource(Resource::machine("m0")).await.unwrap();
    sched.add_resource(Resource::machine("m1")).await.unwrap();
    for id in 1..=3 {
        sched
            .submit_task(TaskDescriptor::new(id, "job", "bin", 0))
            .await
            .unwrap();
    }

    let report = applied(sched.run_round().await.unwrap());
    assert_eq!(report.placed, vec![(1, "m0".to_string()), (2, "m1".to_string())]);
    assert_eq!(report.unscheduled, vec![3]);
}

#[tokio::test]
async fn stale_round_is_discarded() {
    let solver = Arc::new(InterferingSolver {
        state: OnceLock::new(),
    });
    let sched = RoundScheduler::new(
        sjf_config(1),
        Arc::new(InMemoryKnowledgeBase::new()),
        Arc::new(ManualClock::new(10 * SECOND)),
        solver.clone(),
    );
    let _ = solver.state.set(sched.state());

    sched.add_resource(Resource::machine("m0")).await.unwrap();
    sched
        .submit_task(TaskDescriptor::new(1, "job", "bin", 0))
        .await
        .unwrap();
    let generation = sched.generation().await;

    let outcome = sched.run_round().await.unwrap();
    assert_eq!(
        outcome,
        RoundOutcome::Superseded {
            snapshot_generation: generation,
            current_generation: generation + 1,
        }
    );
    assert_eq!(sched.task(1).await.unwrap().state, TaskState::Runnable);
    assert!(sched.task(99).await.is_some());

    let state = sched.state();
    assert!(!state.read().await.topology.resource("m0").unwrap().busy());
}

#[tokio::test]
async fn ensembles_bound_membership() {
    let sched = RoundScheduler::new(
        CostModelConfig::default(),
        Arc::new(InMemoryKnowledgeBase::new()),
        Arc::new(ManualClock::new(0)),
        Arc::new(GreedySolver),
    );
    sched.add_resource(Resource::machine("m0")).await.unwrap();
    sched.add_resource(Resource::machine("m1")).await.unwrap();
    sched
        .add_ensemble(Ensemble::new("pool").with_max_members(1))
        .await
        .unwrap();

    assert!(sched.join_ensemble("m0", "pool").await.unwrap());
    let generation = sched.generation().await;
    assert!(!sched.join_ensemble("m1", "pool").await.unwrap());
    assert_eq!(sched.generation().await, generation);
    assert!(sched.join_ensemble("m1", "nowhere").await.is_err());

    let state = sched.state();
    let state = state.read().await;
    assert_eq!(
        state.topology.resource("m0").unwrap().current_ensemble(),
        Some("pool")
    );
    assert_eq!(state.topology.resource("m1").unwrap().current_ensemble(), None);
}
