//! Solver contract and placement extraction.
//!
//! The min-cost flow algorithm itself lives outside this crate. A
//! [`FlowSolver`] receives the priced [`FlowGraph`] and returns a
//! [`FlowAssignment`]: units of flow per arc. [`extract_placements`]
//! checks that assignment and decomposes it into one path per task.

use std::collections::BTreeMap;

use serde::Serialize;

use flow_core::{Cost, ResourceId, TaskId};

use crate::error::{SchedulerError, SchedulerResult};
use crate::graph::{ArcId, ArcKind, FlowGraph, NodeKind};

/// Computes a min-cost flow over a priced graph.
pub trait FlowSolver: Send + Sync {
    fn solve(&self, graph: &FlowGraph) -> anyhow::Result<FlowAssignment>;
}

/// Units of flow on each arc. Arcs not present carry zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowAssignment {
    flows: BTreeMap<ArcId, u64>,
}

impl FlowAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flow(&mut self, arc: ArcId, flow: u64) {
        if flow == 0 {
            self.flows.remove(&arc);
        } else {
            self.flows.insert(arc, flow);
        }
    }

    pub fn add_flow(&mut self, arc: ArcId, flow: u64) {
        let current = self.flow(arc);
        self.set_flow(arc, current.saturating_add(flow));
    }

    pub fn flow(&self, arc: ArcId) -> u64 {
        self.flows.get(&arc).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArcId, u64)> + '_ {
        self.flows.iter().map(|(a, f)| (*a, *f))
    }

    /// Push one unit along each arc of `path`.
    pub fn push_path(&mut self, path: &[ArcId]) {
        for arc in path {
            self.add_flow(*arc, 1);
        }
    }

    /// Route one task's unit of flow to the given placement, through the
    /// cluster aggregator or its job's unscheduled aggregator.
    pub fn route_task(&mut self, graph: &FlowGraph, task_id: TaskId, placement: &Placement) -> SchedulerResult<()> {
        let task_node = graph
            .task_node(task_id)
            .ok_or(SchedulerError::TaskNotFound(task_id))?;

        let mut path = Vec::new();
        match placement {
            Placement::Scheduled(resource) => {
                let first = graph
                    .find_arc(task_node, graph.cluster_aggregator(), ArcKind::TaskToClusterAggregator)
                    .ok_or_else(|| SchedulerError::InvalidFlow(format!("task {task_id} has no cluster arc")))?;
                path.push(first.id);
                let rest = graph
                    .resource_path(resource)
                    .ok_or_else(|| SchedulerError::InvalidFlow(format!("no path to resource {resource}")))?;
                path.extend(rest);
            }
            Placement::Unscheduled => {
                let first = graph
                    .outgoing(task_node)
                    .find(|a| a.kind == ArcKind::TaskToUnscheduled)
                    .ok_or_else(|| SchedulerError::InvalidFlow(format!("task {task_id} has no unscheduled arc")))?;
                let drain = graph
                    .find_arc(first.dst, graph.sink(), ArcKind::UnscheduledToSink)
                    .ok_or_else(|| SchedulerError::InvalidFlow(format!("task {task_id} has no drain arc")))?;
                path.push(first.id);
                path.push(drain.id);
            }
        }
        self.push_path(&path);
        Ok(())
    }

    /// Sum of flow times cost over every arc.
    pub fn total_cost(&self, graph: &FlowGraph) -> Cost {
        self.iter()
            .filter_map(|(arc, flow)| graph.arc(arc).map(|a| a.cost.saturating_mul(flow as Cost)))
            .fold(0, Cost::saturating_add)
    }

    /// Check capacities and flow conservation against `graph`.
    pub fn validate(&self, graph: &FlowGraph) -> SchedulerResult<()> {
        let mut balance = vec![0i64; graph.nodes().len()];
        for (arc_id, flow) in self.iter() {
            let arc = graph
                .arc(arc_id)
                .ok_or_else(|| SchedulerError::InvalidFlow(format!("flow on unknown arc {arc_id}")))?;
            if flow > arc.capacity {
                return Err(SchedulerError::InvalidFlow(format!(
                    "arc {arc_id} carries {flow} over capacity {}",
                    arc.capacity
                )));
            }
            balance[arc.src] += flow as i64;
            balance[arc.dst] -= flow as i64;
        }
        for node in graph.nodes() {
            if balance[node.id] != node.supply {
                return Err(SchedulerError::InvalidFlow(format!(
                    "node {} has net outflow {} but supply {}",
                    node.id, balance[node.id], node.supply
                )));
            }
        }
        Ok(())
    }
}

/// Where a task's flow ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Scheduled(ResourceId),
    Unscheduled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacementDecision {
    pub task_id: TaskId,
    pub placement: Placement,
}

/// Decompose a solved flow into one placement per task node, in task
/// id order.
///
/// Each task's unit is followed along arcs with remaining flow until it
/// reaches a leaf resource or an unscheduled aggregator. Flows that do
/// not conserve or exceed a capacity are rejected up front.
pub fn extract_placements(graph: &FlowGraph, assignment: &FlowAssignment) -> SchedulerResult<Vec<PlacementDecision>> {
    assignment.validate(graph)?;

    let mut residual: Vec<u64> = graph.arcs().iter().map(|a| assignment.flow(a.id)).collect();
    let mut decisions = Vec::new();

    for task_id in graph.task_ids() {
        let Some(mut node) = graph.task_node(task_id) else {
            continue;
        };
        let placement = loop {
            let arc = graph
                .outgoing(node)
                .find(|a| residual[a.id] > 0)
                .ok_or_else(|| SchedulerError::InvalidFlow(format!("flow for task {task_id} stops at node {node}")))?;
            residual[arc.id] -= 1;

            match &graph.nodes()[arc.dst].kind {
                NodeKind::Resource {
                    resource_id,
                    leaf: true,
                } => break Placement::Scheduled(resource_id.clone()),
                NodeKind::UnscheduledAggregator { .. } => break Placement::Unscheduled,
                NodeKind::Sink | NodeKind::Task { .. } => {
                    return Err(SchedulerError::InvalidFlow(format!(
                        "flow for task {task_id} reaches node {} directly",
                        arc.dst
                    )));
                }
                _ => node = arc.dst,
            }
        };
        decisions.push(PlacementDecision { task_id, placement });
    }
    Ok(decisions)
}
