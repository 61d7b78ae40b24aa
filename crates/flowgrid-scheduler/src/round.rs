//! Round driver: the scheduling control loop.
//!
//! The `RoundScheduler`:
//! - Owns the cluster state (topology, task table, generation counter)
//! - Accepts task submissions, resource changes, and task exits
//! - Runs rounds: snapshot, price, solve, extract, apply
//! - Abandons a round whose snapshot went stale while it was solving

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use flow_core::{
    Clock, ClusterSnapshot, CostModelConfig, ResourceId, TaskDescriptor, TaskId, TaskState,
};
use flowgrid_cost::{KnowledgeBase, binary_equiv_class, build_cost_model};
use flowgrid_topology::{Ensemble, Resource, Topology};

use crate::error::{SchedulerError, SchedulerResult};
use crate::graph::FlowGraphBuilder;
use crate::solver::{FlowSolver, Placement, PlacementDecision, extract_placements};

/// Everything a round reads and applies to.
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    pub topology: Topology,
    pub tasks: BTreeMap<TaskId, TaskDescriptor>,
    /// Bumped on every mutation.
    pub generation: u64,
    /// Start time of each running task, microseconds since the epoch.
    started_at: BTreeMap<TaskId, u64>,
}

impl ClusterState {
    pub fn snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot::new(
            self.generation,
            self.tasks.clone(),
            self.topology.leaf_resource_ids(),
        )
    }

    fn bump(&mut self) {
        self.generation += 1;
    }

    /// Apply one round's decisions.
    ///
    /// Tasks leaving a resource are unbound before anyone is bound, so a
    /// swap between two machines lands in a single round.
    fn apply(&mut self, decisions: &[PlacementDecision], now: u64) -> SchedulerResult<RoundReport> {
        let mut report = RoundReport {
            generation: self.generation,
            ..RoundReport::default()
        };

        // Vacate resources of tasks that move or stop.
        for decision in decisions {
            let Some(task) = self.tasks.get(&decision.task_id) else {
                continue;
            };
            let Some(current) = task.scheduled_to.clone() else {
                continue;
            };
            let stays = matches!(&decision.placement, Placement::Scheduled(r) if *r == current);
            if stays {
                continue;
            }
            let bound = self.topology.find_task(decision.task_id).map(|r| r.name() == current);
            if bound == Some(true) {
                self.topology.task_exited(&current, decision.task_id, now)?;
            } else {
                warn!(task = decision.task_id, resource = %current, "task is not bound where recorded");
            }
        }

        // Bind placements.
        for decision in decisions {
            let task_id = decision.task_id;
            let Some(task) = self.tasks.get_mut(&task_id) else {
                continue;
            };
            let previous = task.scheduled_to.take();

            match (&decision.placement, previous) {
                (Placement::Scheduled(target), Some(current)) if *target == current => {
                    task.scheduled_to = Some(current);
                    report.continued.push(task_id);
                }
                (Placement::Scheduled(target), previous) => {
                    if self.topology.run_task(target, task_id)? {
                        task.state = TaskState::Running;
                        task.scheduled_to = Some(target.clone());
                        match previous {
                            Some(from) => report.migrated.push((task_id, from, target.clone())),
                            None => {
                                self.started_at.insert(task_id, now);
                                report.placed.push((task_id, target.clone()));
                            }
                        }
                    } else {
                        warn!(task = task_id, resource = %target, "placement rejected, resource busy");
                        task.state = TaskState::Runnable;
                        self.started_at.remove(&task_id);
                        report.rejected.push((task_id, target.clone()));
                    }
                }
                (Placement::Unscheduled, Some(from)) => {
                    task.state = TaskState::Runnable;
                    self.started_at.remove(&task_id);
                    report.preempted.push((task_id, from));
                }
                (Placement::Unscheduled, None) => {
                    report.unscheduled.push(task_id);
                }
            }
        }

        if report.changed() {
            self.bump();
        }
        Ok(report)
    }

    /// Unbind a finished task and mark it terminal. Returns how long it ran.
    fn finish_task(&mut self, task_id: TaskId, state: TaskState, now: u64) -> SchedulerResult<Option<Duration>> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SchedulerError::TaskNotFound(task_id))?;
        if let Some(resource) = task.scheduled_to.take() {
            self.topology.task_exited(&resource, task_id, now)?;
        }
        task.state = state;
        let runtime = self
            .started_at
            .remove(&task_id)
            .map(|start| Duration::from_micros(now.saturating_sub(start)));
        self.bump();
        Ok(runtime)
    }
}

/// What one applied round did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    /// Generation the round was computed against.
    pub generation: u64,
    pub placed: Vec<(TaskId, ResourceId)>,
    /// (task, from, to)
    pub migrated: Vec<(TaskId, ResourceId, ResourceId)>,
    pub preempted: Vec<(TaskId, ResourceId)>,
    pub continued: Vec<TaskId>,
    pub unscheduled: Vec<TaskId>,
    /// Placements onto a resource that was already busy.
    pub rejected: Vec<(TaskId, ResourceId)>,
}

impl RoundReport {
    /// Whether the round changed any binding.
    pub fn changed(&self) -> bool {
        !(self.placed.is_empty()
            && self.migrated.is_empty()
            && self.preempted.is_empty()
            && self.rejected.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoundOutcome {
    Applied(RoundReport),
    /// The cluster changed while the round was solving.
    Superseded {
        snapshot_generation: u64,
        current_generation: u64,
    },
}

/// Runs scheduling rounds against shared cluster state.
pub struct RoundScheduler {
    state: Arc<RwLock<ClusterState>>,
    config: CostModelConfig,
    knowledge_base: Arc<dyn KnowledgeBase>,
    clock: Arc<dyn Clock>,
    solver: Arc<dyn FlowSolver>,
    /// Held for the duration of a round; rounds never overlap.
    round_lock: Mutex<()>,
}

impl RoundScheduler {
    pub fn new(
        config: CostModelConfig,
        knowledge_base: Arc<dyn KnowledgeBase>,
        clock: Arc<dyn Clock>,
        solver: Arc<dyn FlowSolver>,
    ) -> Self {
        Self::with_topology(Topology::new(), config, knowledge_base, clock, solver)
    }

    /// Start from an already-assembled topology.
    pub fn with_topology(
        topology: Topology,
        config: CostModelConfig,
        knowledge_base: Arc<dyn KnowledgeBase>,
        clock: Arc<dyn Clock>,
        solver: Arc<dyn FlowSolver>,
    ) -> Self {
        let state = ClusterState {
            topology,
            ..ClusterState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            config,
            knowledge_base,
            clock,
            solver,
            round_lock: Mutex::new(()),
        }
    }

    /// Shared handle to the cluster state.
    pub fn state(&self) -> Arc<RwLock<ClusterState>> {
        Arc::clone(&self.state)
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    pub async fn task(&self, task_id: TaskId) -> Option<TaskDescriptor> {
        self.state.read().await.tasks.get(&task_id).cloned()
    }

    pub async fn snapshot(&self) -> ClusterSnapshot {
        self.state.read().await.snapshot()
    }

    /// Register a new task. It becomes runnable immediately.
    ///
    /// Only fresh tasks are accepted: `Created` or `Runnable`, with no
    /// placement. Bindings are made by rounds, never by the submitter.
    pub async fn submit_task(&self, mut task: TaskDescriptor) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        if state.tasks.contains_key(&task.id) {
            return Err(SchedulerError::TaskAlreadyExists(task.id));
        }
        if !matches!(task.state, TaskState::Created | TaskState::Runnable) {
            return Err(SchedulerError::InvalidSubmission {
                task: task.id,
                reason: format!("state is {:?}", task.state),
            });
        }
        if let Some(resource) = &task.scheduled_to {
            return Err(SchedulerError::InvalidSubmission {
                task: task.id,
                reason: format!("already placed on {resource}"),
            });
        }
        if let Some(resource) = state.topology.find_task(task.id) {
            return Err(SchedulerError::InvalidSubmission {
                task: task.id,
                reason: format!("id is still bound to {}", resource.name()),
            });
        }
        task.state = TaskState::Runnable;
        debug!(task = task.id, job = %task.job_id, binary = %task.binary, "task submitted");
        state.tasks.insert(task.id, task);
        state.bump();
        Ok(())
    }

    pub async fn add_resource(&self, resource: Resource) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        let name = resource.name().to_string();
        state.topology.add_resource(resource)?;
        state.bump();
        info!(resource = %name, "resource added");
        Ok(())
    }

    pub async fn add_ensemble(&self, ensemble: Ensemble) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        state.topology.add_ensemble(ensemble)?;
        state.bump();
        Ok(())
    }

    /// Returns `false` when the ensemble refused the resource.
    pub async fn join_ensemble(&self, resource: &str, ensemble: &str) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;
        let joined = state.topology.join_ensemble(resource, ensemble)?;
        if joined {
            state.bump();
        }
        Ok(joined)
    }

    /// Mark a task finished and feed its runtime to the knowledge base.
    pub async fn task_completed(&self, task_id: TaskId) -> SchedulerResult<()> {
        let now = self.clock.now_micros();
        let mut state = self.state.write().await;
        let runtime = state.finish_task(task_id, TaskState::Completed, now)?;
        if let (Some(runtime), Some(task)) = (runtime, state.tasks.get(&task_id)) {
            self.knowledge_base
                .record_runtime(binary_equiv_class(&task.binary), runtime);
            debug!(task = task_id, runtime_ms = runtime.as_millis() as u64, "task completed");
        }
        Ok(())
    }

    /// Mark a task failed. Failed runs do not count toward runtime averages.
    pub async fn task_failed(&self, task_id: TaskId) -> SchedulerResult<()> {
        let now = self.clock.now_micros();
        let mut state = self.state.write().await;
        state.finish_task(task_id, TaskState::Failed, now)?;
        warn!(task = task_id, "task failed");
        Ok(())
    }

    /// Run one scheduling round.
    ///
    /// Pricing and solving run on the blocking pool against a snapshot.
    /// Fatal cost-model errors and solver errors abort the round without
    /// touching state.
    pub async fn run_round(&self) -> SchedulerResult<RoundOutcome> {
        let _round = self.round_lock.lock().await;

        let (snapshot, topology) = {
            let state = self.state.read().await;
            (Arc::new(state.snapshot()), state.topology.clone())
        };
        let snapshot_generation = snapshot.generation;
        info!(
            generation = snapshot_generation,
            tasks = snapshot.schedulable_tasks().count(),
            leaves = snapshot.leaf_resources.len(),
            "round started"
        );

        let model = build_cost_model(
            &self.config,
            Arc::clone(&snapshot),
            Arc::clone(&self.knowledge_base),
            Arc::clone(&self.clock),
        );
        let solver = Arc::clone(&self.solver);

        let decisions = tokio::task::spawn_blocking(move || -> SchedulerResult<Vec<PlacementDecision>> {
            let graph = FlowGraphBuilder::new(model.as_ref(), &topology, &snapshot).build()?;
            let assignment = solver.solve(&graph)?;
            debug!(cost = assignment.total_cost(&graph), "flow solved");
            extract_placements(&graph, &assignment)
        })
        .await
        .map_err(|e| SchedulerError::RoundTask(e.to_string()))??;

        let now = self.clock.now_micros();
        let mut state = self.state.write().await;
        if state.generation != snapshot_generation {
            warn!(
                snapshot_generation,
                current_generation = state.generation,
                "cluster changed during round, discarding decisions"
            );
            return Ok(RoundOutcome::Superseded {
                snapshot_generation,
                current_generation: state.generation,
            });
        }

        let report = state.apply(&decisions, now)?;
        info!(
            generation = snapshot_generation,
            placed = report.placed.len(),
            migrated = report.migrated.len(),
            preempted = report.preempted.len(),
            unscheduled = report.unscheduled.len(),
            rejected = report.rejected.len(),
            "round finished"
        );
        Ok(RoundOutcome::Applied(report))
    }
}
