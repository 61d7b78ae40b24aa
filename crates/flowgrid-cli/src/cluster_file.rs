//! TOML cluster descriptions.
//!
//! ```toml
//! [[resources]]
//! name = "rack-a"
//! kind = "aggregate"
//!
//! [[resources]]
//! name = "m0"
//! parent = "rack-a"
//! ensemble = "batch"
//!
//! [[ensembles]]
//! name = "batch"
//! max_members = 8
//!
//! [[tasks]]
//! id = 1
//! job = "sort"
//! binary = "sort-worker"
//! submit_time_us = 0
//! running_on = "m0"
//!
//! [[runtimes]]
//! binary = "sort-worker"
//! runtime_ms = 1200
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;
use tracing::debug;

use flow_core::{ClusterSnapshot, TaskDescriptor, TaskId, TaskState};
use flowgrid_cost::{InMemoryKnowledgeBase, binary_equiv_class};
use flowgrid_topology::{Ensemble, Resource, ResourceKind, Topology};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterFile {
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
    #[serde(default)]
    pub ensembles: Vec<EnsembleEntry>,
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
    /// Observed runtimes fed to the knowledge base before pricing.
    #[serde(default)]
    pub runtimes: Vec<RuntimeSample>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: ResourceKind,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub ensemble: Option<String>,
}

fn default_kind() -> ResourceKind {
    ResourceKind::Machine
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleEntry {
    pub name: String,
    #[serde(default)]
    pub max_members: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskEntry {
    pub id: TaskId,
    pub job: String,
    pub binary: String,
    #[serde(default)]
    pub submit_time_us: u64,
    #[serde(default)]
    pub running_on: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSample {
    pub binary: String,
    pub runtime_ms: u64,
}

/// A cluster description resolved into scheduler types.
pub struct LoadedCluster {
    pub topology: Topology,
    pub snapshot: ClusterSnapshot,
}

impl ClusterFile {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading cluster file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build the topology and task table, and record runtime samples in `kb`.
    pub fn load(&self, kb: &InMemoryKnowledgeBase) -> anyhow::Result<LoadedCluster> {
        let mut topology = Topology::new();
        self.add_resources(&mut topology)?;

        for entry in &self.ensembles {
            let mut ensemble = Ensemble::new(&entry.name);
            if let Some(max) = entry.max_members {
                ensemble = ensemble.with_max_members(max);
            }
            topology.add_ensemble(ensemble)?;
        }
        for entry in &self.resources {
            if let Some(ensemble) = &entry.ensemble {
                if !topology.join_ensemble(&entry.name, ensemble)? {
                    bail!("ensemble {ensemble} refused resource {}", entry.name);
                }
            }
        }

        let mut tasks = BTreeMap::new();
        for entry in &self.tasks {
            let mut task = TaskDescriptor::new(entry.id, &entry.job, &entry.binary, entry.submit_time_us);
            if let Some(resource) = &entry.running_on {
                if !topology.run_task(resource, entry.id)? {
                    bail!("task {} cannot run on {resource}: resource is busy or not a machine", entry.id);
                }
                task.state = TaskState::Running;
                task.scheduled_to = Some(resource.clone());
            }
            if tasks.insert(entry.id, task).is_some() {
                bail!("duplicate task id {}", entry.id);
            }
        }

        for sample in &self.runtimes {
            kb.record_runtime(
                binary_equiv_class(&sample.binary),
                Duration::from_millis(sample.runtime_ms),
            );
        }

        debug!(
            resources = topology.len(),
            tasks = tasks.len(),
            samples = self.runtimes.len(),
            "cluster file loaded"
        );
        let snapshot = ClusterSnapshot::new(0, tasks, topology.leaf_resource_ids());
        Ok(LoadedCluster { topology, snapshot })
    }

    /// Insert resources parents-first, whatever order the file lists them in.
    fn add_resources(&self, topology: &mut Topology) -> anyhow::Result<()> {
        let mut pending: Vec<&ResourceEntry> = self.resources.iter().collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for entry in pending {
                let parent_ready = entry
                    .parent
                    .as_deref()
                    .is_none_or(|p| topology.resource(p).is_some());
                if !parent_ready {
                    deferred.push(entry);
                    continue;
                }
                let mut resource = match entry.kind {
                    ResourceKind::Machine => Resource::machine(&entry.name),
                    ResourceKind::Aggregate => Resource::aggregate(&entry.name),
                };
                if let Some(parent) = &entry.parent {
                    resource = resource.with_parent(parent);
                }
                topology.add_resource(resource)?;
            }
            if deferred.len() == before {
                let names: Vec<&str> = deferred.iter().map(|e| e.name.as_str()).collect();
                bail!("resources with missing or cyclic parents: {}", names.join(", "));
            }
            pending = deferred;
        }
        Ok(())
    }
}
