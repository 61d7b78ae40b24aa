//! Flow network construction.
//!
//! The builder walks the round snapshot and the topology, asks the cost
//! model for every arc's cost, and assembles a [`FlowGraph`]:
//!
//! - one **task** node per runnable or running task, supply 1
//! - one **unscheduled aggregator** per job, draining to the sink
//! - the **cluster aggregator**, feeding the root resources
//! - one node per **resource**, following the topology tree down to leaves
//! - one **equivalence class** node per class, with preference arcs
//! - the **sink**, absorbing one unit per task
//!
//! Per-task pricing is independent across tasks, so it runs on the rayon
//! pool; node and arc insertion stays sequential and ordered by task id.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use flow_core::{ClusterSnapshot, Cost, JobId, ResourceId, TaskDescriptor, TaskEquivClass, TaskId};
use flowgrid_cost::{CostModel, CostModelError, CostModelResult, EquivClassIndex};
use flowgrid_topology::Topology;

use crate::error::SchedulerResult;

pub type NodeId = usize;
pub type ArcId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Sink,
    ClusterAggregator,
    UnscheduledAggregator { job_id: JobId },
    Task { task_id: TaskId },
    EquivClass { tec: TaskEquivClass },
    Resource { resource_id: ResourceId, leaf: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcKind {
    TaskToUnscheduled,
    UnscheduledToSink,
    TaskToClusterAggregator,
    TaskToResource,
    Continuation,
    TaskToEquivClass,
    EquivClassToResource,
    EquivClassToEquivClass,
    ClusterAggregatorToResource,
    ResourceToResource,
    LeafToSink,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Positive for sources (tasks), negative for the sink.
    pub supply: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowArc {
    pub id: ArcId,
    pub src: NodeId,
    pub dst: NodeId,
    pub capacity: u64,
    pub cost: Cost,
    pub kind: ArcKind,
}

/// A priced flow network ready for the solver.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowGraph {
    nodes: Vec<FlowNode>,
    arcs: Vec<FlowArc>,
    #[serde(skip)]
    out_arcs: Vec<Vec<ArcId>>,
    #[serde(skip)]
    in_arcs: Vec<Vec<ArcId>>,
    #[serde(skip)]
    task_nodes: BTreeMap<TaskId, NodeId>,
    #[serde(skip)]
    resource_nodes: BTreeMap<ResourceId, NodeId>,
    #[serde(skip)]
    unscheduled_nodes: BTreeMap<JobId, NodeId>,
    #[serde(skip)]
    equiv_class_nodes: BTreeMap<TaskEquivClass, NodeId>,
}

impl FlowGraph {
    fn add_node(&mut self, kind: NodeKind, supply: i64) -> NodeId {
        let id = self.nodes.len();
        match &kind {
            NodeKind::Task { task_id } => {
                self.task_nodes.insert(*task_id, id);
            }
            NodeKind::Resource { resource_id, .. } => {
                self.resource_nodes.insert(resource_id.clone(), id);
            }
            NodeKind::UnscheduledAggregator { job_id } => {
                self.unscheduled_nodes.insert(job_id.clone(), id);
            }
            NodeKind::EquivClass { tec } => {
                self.equiv_class_nodes.insert(*tec, id);
            }
            NodeKind::Sink | NodeKind::ClusterAggregator => {}
        }
        self.nodes.push(FlowNode { id, kind, supply });
        self.out_arcs.push(Vec::new());
        self.in_arcs.push(Vec::new());
        id
    }

    fn add_arc(&mut self, src: NodeId, dst: NodeId, capacity: u64, cost: Cost, kind: ArcKind) -> ArcId {
        let id = self.arcs.len();
        self.arcs.push(FlowArc {
            id,
            src,
            dst,
            capacity,
            cost,
            kind,
        });
        self.out_arcs[src].push(id);
        self.in_arcs[dst].push(id);
        id
    }

    pub fn nodes(&self) -> &[FlowNode] {
        &self.nodes
    }

    pub fn arcs(&self) -> &[FlowArc] {
        &self.arcs
    }

    pub fn node(&self, id: NodeId) -> Option<&FlowNode> {
        self.nodes.get(id)
    }

    pub fn arc(&self, id: ArcId) -> Option<&FlowArc> {
        self.arcs.get(id)
    }

    pub fn outgoing(&self, node: NodeId) -> impl Iterator<Item = &FlowArc> {
        self.out_arcs
            .get(node)
            .into_iter()
            .flatten()
            .map(|a| &self.arcs[*a])
    }

    pub fn incoming(&self, node: NodeId) -> impl Iterator<Item = &FlowArc> {
        self.in_arcs
            .get(node)
            .into_iter()
            .flatten()
            .map(|a| &self.arcs[*a])
    }

    /// The sink is always node 0.
    pub fn sink(&self) -> NodeId {
        0
    }

    /// The cluster aggregator is always node 1.
    pub fn cluster_aggregator(&self) -> NodeId {
        1
    }

    pub fn task_node(&self, task_id: TaskId) -> Option<NodeId> {
        self.task_nodes.get(&task_id).copied()
    }

    pub fn resource_node(&self, resource_id: &str) -> Option<NodeId> {
        self.resource_nodes.get(resource_id).copied()
    }

    pub fn unscheduled_node(&self, job_id: &str) -> Option<NodeId> {
        self.unscheduled_nodes.get(job_id).copied()
    }

    pub fn equiv_class_node(&self, tec: TaskEquivClass) -> Option<NodeId> {
        self.equiv_class_nodes.get(&tec).copied()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.task_nodes.keys().copied()
    }

    /// The first arc from `src` to `dst` of the given kind.
    pub fn find_arc(&self, src: NodeId, dst: NodeId, kind: ArcKind) -> Option<&FlowArc> {
        self.outgoing(src).find(|a| a.dst == dst && a.kind == kind)
    }

    pub fn arcs_of_kind(&self, kind: ArcKind) -> impl Iterator<Item = &FlowArc> {
        self.arcs.iter().filter(move |a| a.kind == kind)
    }

    /// Arcs from the cluster aggregator down the resource tree to
    /// `resource_id` and on to the sink. `None` for non-leaf resources.
    pub fn resource_path(&self, resource_id: &str) -> Option<Vec<ArcId>> {
        let target = self.resource_node(resource_id)?;
        let mut path = vec![self.find_arc(target, self.sink(), ArcKind::LeafToSink)?.id];
        let mut node = target;
        while node != self.cluster_aggregator() {
            let arc = self.incoming(node).find(|a| {
                matches!(
                    a.kind,
                    ArcKind::ResourceToResource | ArcKind::ClusterAggregatorToResource
                )
            })?;
            path.push(arc.id);
            node = arc.src;
        }
        path.reverse();
        Some(path)
    }

    /// Sum of all supplies. Zero for every graph the builder emits.
    pub fn total_supply(&self) -> i64 {
        self.nodes.iter().map(|n| n.supply).sum()
    }
}

/// Arc costs for one task, computed off the main thread.
struct PricedTask {
    task_id: TaskId,
    job_id: JobId,
    tecs: Vec<TaskEquivClass>,
    unscheduled: Cost,
    cluster: Cost,
    classes: Vec<(TaskEquivClass, Cost)>,
    preferences: Vec<(ResourceId, Cost)>,
    continuation: Option<(ResourceId, Cost)>,
}

fn price_task(model: &dyn CostModel, td: &TaskDescriptor) -> CostModelResult<PricedTask> {
    let task_id = td.id;
    let tecs = model.task_equiv_classes(task_id)?;
    if tecs.is_empty() {
        return Err(CostModelError::NoEquivClasses(task_id));
    }

    let mut unscheduled = model.task_to_unscheduled_agg_cost(task_id)?;
    let continuation = match (&td.scheduled_to, td.is_running()) {
        (Some(resource), true) => {
            unscheduled = unscheduled.saturating_add(model.task_preemption_cost(task_id)?);
            Some((resource.clone(), model.task_continuation_cost(task_id)?))
        }
        _ => None,
    };

    let cluster = model.task_to_cluster_agg_cost(task_id)?;

    let mut classes = Vec::with_capacity(tecs.len());
    for tec in &tecs {
        classes.push((*tec, model.task_to_equiv_class_aggregator(task_id, *tec)?));
    }

    let preferences = match model.task_preference_arcs(task_id) {
        Ok(resources) => resources
            .into_iter()
            .map(|r| -> CostModelResult<(ResourceId, Cost)> {
                let cost = model.task_to_resource_node_cost(task_id, &r)?;
                Ok((r, cost))
            })
            .collect::<CostModelResult<Vec<_>>>()?,
        Err(e) if e.is_unsupported() => {
            debug!(task = task_id, error = %e, "task preference arcs skipped");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    Ok(PricedTask {
        task_id,
        job_id: td.job_id.clone(),
        tecs,
        unscheduled,
        cluster,
        classes,
        preferences,
        continuation,
    })
}

/// Builds a [`FlowGraph`] for one round.
pub struct FlowGraphBuilder<'a> {
    model: &'a dyn CostModel,
    topology: &'a Topology,
    snapshot: &'a ClusterSnapshot,
}

impl<'a> FlowGraphBuilder<'a> {
    pub fn new(model: &'a dyn CostModel, topology: &'a Topology, snapshot: &'a ClusterSnapshot) -> Self {
        Self {
            model,
            topology,
            snapshot,
        }
    }

    pub fn build(&self) -> SchedulerResult<FlowGraph> {
        let mut graph = FlowGraph::default();
        let sink = graph.add_node(NodeKind::Sink, 0);
        let cluster_agg = graph.add_node(NodeKind::ClusterAggregator, 0);

        self.add_resources(&mut graph, cluster_agg, sink)?;

        let tasks: Vec<&TaskDescriptor> = self.snapshot.schedulable_tasks().collect();
        let model = self.model;
        let priced = tasks
            .par_iter()
            .map(|td| price_task(model, td))
            .collect::<CostModelResult<Vec<_>>>()?;

        let mut job_sizes: BTreeMap<JobId, u64> = BTreeMap::new();
        let mut classes = EquivClassIndex::default();

        for task in &priced {
            let unscheduled_agg = match graph.unscheduled_node(&task.job_id) {
                Some(id) => id,
                None => graph.add_node(
                    NodeKind::UnscheduledAggregator {
                        job_id: task.job_id.clone(),
                    },
                    0,
                ),
            };
            *job_sizes.entry(task.job_id.clone()).or_default() += 1;
            classes.insert(task.task_id, task.tecs.clone());

            let node = graph.add_node(NodeKind::Task { task_id: task.task_id }, 1);
            graph.add_arc(node, unscheduled_agg, 1, task.unscheduled, ArcKind::TaskToUnscheduled);
            graph.add_arc(node, cluster_agg, 1, task.cluster, ArcKind::TaskToClusterAggregator);

            for (tec, cost) in &task.classes {
                let ec_node = match graph.equiv_class_node(*tec) {
                    Some(id) => id,
                    None => graph.add_node(NodeKind::EquivClass { tec: *tec }, 0),
                };
                graph.add_arc(node, ec_node, 1, *cost, ArcKind::TaskToEquivClass);
            }

            for (resource, cost) in &task.preferences {
                match graph.resource_node(resource) {
                    Some(res_node) => {
                        graph.add_arc(node, res_node, 1, *cost, ArcKind::TaskToResource);
                    }
                    None => warn!(task = task.task_id, %resource, "preference arc to unknown resource dropped"),
                }
            }

            if let Some((resource, cost)) = &task.continuation {
                match graph.resource_node(resource) {
                    Some(res_node) => {
                        graph.add_arc(node, res_node, 1, *cost, ArcKind::Continuation);
                    }
                    None => warn!(task = task.task_id, %resource, "running task's resource is gone"),
                }
            }
        }

        for (job_id, size) in &job_sizes {
            let cost = self.model.unscheduled_agg_to_sink_cost(job_id)?;
            if let Some(node) = graph.unscheduled_node(job_id) {
                graph.add_arc(node, sink, *size, cost, ArcKind::UnscheduledToSink);
            }
        }

        self.add_equiv_class_arcs(&mut graph, &classes)?;

        graph.nodes[sink].supply = -(priced.len() as i64);

        debug!(
            policy = %self.model.policy(),
            generation = self.snapshot.generation,
            tasks = classes.task_count(),
            classes = classes.class_count(),
            nodes = graph.nodes.len(),
            arcs = graph.arcs.len(),
            "flow graph built"
        );
        Ok(graph)
    }

    fn add_resources(&self, graph: &mut FlowGraph, cluster_agg: NodeId, sink: NodeId) -> SchedulerResult<()> {
        for resource in self.topology.resources() {
            graph.add_node(
                NodeKind::Resource {
                    resource_id: resource.name().to_string(),
                    leaf: resource.is_leaf(),
                },
                0,
            );
        }

        for root in self.topology.root_resources() {
            let id = root.name().to_string();
            let cost = self.model.cluster_agg_to_resource_node_cost(&id)?;
            let capacity = self.topology.slots_below(&id);
            if let Some(node) = graph.resource_node(&id) {
                graph.add_arc(cluster_agg, node, capacity, cost, ArcKind::ClusterAggregatorToResource);
            }
        }

        for resource in self.topology.resources() {
            let src_id = resource.name().to_string();
            let Some(src) = graph.resource_node(&src_id) else {
                continue;
            };
            if resource.is_leaf() {
                let cost = self.model.leaf_resource_node_to_sink_cost(&src_id)?;
                let capacity = self.topology.slots_below(&src_id);
                graph.add_arc(src, sink, capacity, cost, ArcKind::LeafToSink);
                continue;
            }
            for child in self.topology.children(&src_id) {
                let dst_id = child.name().to_string();
                let cost = self.model.resource_node_to_resource_node_cost(&src_id, &dst_id)?;
                let capacity = self.topology.slots_below(&dst_id);
                if let Some(dst) = graph.resource_node(&dst_id) {
                    graph.add_arc(src, dst, capacity, cost, ArcKind::ResourceToResource);
                }
            }
        }
        Ok(())
    }

    fn add_equiv_class_arcs(
        &self,
        graph: &mut FlowGraph,
        classes: &EquivClassIndex,
    ) -> SchedulerResult<()> {
        let mut class_links: BTreeSet<(TaskEquivClass, TaskEquivClass)> = BTreeSet::new();

        for tec in classes.classes() {
            let Some(ec_node) = graph.equiv_class_node(tec) else {
                continue;
            };
            let size = classes.members(tec).len() as u64;

            for resource in self.model.equiv_class_preference_arcs(tec)? {
                let cost = self.model.equiv_class_to_resource_node(tec, &resource)?;
                match graph.resource_node(&resource) {
                    Some(res_node) => {
                        graph.add_arc(ec_node, res_node, size, cost, ArcKind::EquivClassToResource);
                    }
                    None => warn!(tec, %resource, "class preference arc to unknown resource dropped"),
                }
            }

            match self.model.equiv_class_to_equiv_classes_arcs(tec) {
                Ok((incoming, outgoing)) => {
                    class_links.extend(incoming.into_iter().map(|src| (src, tec)));
                    class_links.extend(outgoing.into_iter().map(|dst| (tec, dst)));
                }
                Err(e) if e.is_unsupported() => {
                    debug!(tec, error = %e, "class-to-class arcs skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }

        for (src, dst) in class_links {
            if src == dst {
                continue;
            }
            let (Some(src_node), Some(dst_node)) = (graph.equiv_class_node(src), graph.equiv_class_node(dst)) else {
                continue;
            };
            let capacity = classes.members(src).len() as u64;
            let cost = self.model.equiv_class_to_equiv_class(src, dst)?;
            graph.add_arc(src_node, dst_node, capacity, cost, ArcKind::EquivClassToEquivClass);
        }
        Ok(())
    }
}
