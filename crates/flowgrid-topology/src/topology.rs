//! Topology registry: owns every resource and ensemble.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use flow_core::{ResourceId, TaskId};

use crate::ensemble::Ensemble;
use crate::error::{TopologyError, TopologyResult};
use crate::resource::{Resource, ResourceKind};

/// The cluster's resource tree plus its ensembles.
///
/// Resources form a forest through their `parent` links; roots hang off
/// the cluster aggregator in the flow network. Ensembles are an
/// orthogonal grouping used for admission and reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    resources: BTreeMap<ResourceId, Resource>,
    children: BTreeMap<ResourceId, BTreeSet<ResourceId>>,
    ensembles: BTreeMap<String, Ensemble>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource. Its parent, if any, must already exist and be
    /// an aggregate.
    pub fn add_resource(&mut self, resource: Resource) -> TopologyResult<()> {
        let name = resource.name().to_string();
        if self.resources.contains_key(&name) {
            return Err(TopologyError::DuplicateResource(name));
        }
        if let Some(parent) = resource.parent() {
            let parent_res = self
                .resources
                .get(parent)
                .ok_or_else(|| TopologyError::UnknownResource(parent.to_string()))?;
            if parent_res.is_leaf() {
                return Err(TopologyError::LeafParent {
                    resource: parent.to_string(),
                });
            }
            self.children
                .entry(parent.to_string())
                .or_default()
                .insert(name.clone());
        }
        debug!(resource = %name, kind = ?resource.kind(), "resource added");
        self.resources.insert(name, resource);
        Ok(())
    }

    pub fn add_ensemble(&mut self, ensemble: Ensemble) -> TopologyResult<()> {
        let name = ensemble.name().to_string();
        if self.ensembles.contains_key(&name) {
            return Err(TopologyError::DuplicateEnsemble(name));
        }
        self.ensembles.insert(name, ensemble);
        Ok(())
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn resource_mut(&mut self, id: &str) -> Option<&mut Resource> {
        self.resources.get_mut(id)
    }

    pub fn ensemble(&self, name: &str) -> Option<&Ensemble> {
        self.ensembles.get(name)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn ensembles(&self) -> impl Iterator<Item = &Ensemble> {
        self.ensembles.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Move `resource` into `ensemble`, leaving its previous ensemble.
    ///
    /// `Ok(false)` means the ensemble refused the resource; the old
    /// membership is then kept.
    pub fn join_ensemble(&mut self, resource: &str, ensemble: &str) -> TopologyResult<bool> {
        let res = self
            .resources
            .get_mut(resource)
            .ok_or_else(|| TopologyError::UnknownResource(resource.to_string()))?;
        let target = self
            .ensembles
            .get_mut(ensemble)
            .ok_or_else(|| TopologyError::UnknownEnsemble(ensemble.to_string()))?;

        let previous = res.current_ensemble().map(str::to_string);
        if !res.join_ensemble(target) {
            return Ok(false);
        }

        if let Some(prev) = previous.filter(|p| p != ensemble) {
            if let Some(old) = self.ensembles.get_mut(&prev) {
                old.remove(resource);
            }
            info!(%resource, from = %prev, to = %ensemble, "resource moved between ensembles");
        } else {
            debug!(%resource, %ensemble, "resource joined ensemble");
        }
        Ok(true)
    }

    /// Detach `resource` from its ensemble. Returns the ensemble it left.
    pub fn leave_ensemble(&mut self, resource: &str) -> TopologyResult<Option<String>> {
        let res = self
            .resources
            .get_mut(resource)
            .ok_or_else(|| TopologyError::UnknownResource(resource.to_string()))?;
        let left = res.clear_ensemble();
        if let Some(name) = &left {
            if let Some(ensemble) = self.ensembles.get_mut(name) {
                ensemble.remove(resource);
            }
        }
        Ok(left)
    }

    /// Bind `task` to the leaf `resource`. Aggregates never run tasks.
    pub fn run_task(&mut self, resource: &str, task: TaskId) -> TopologyResult<bool> {
        let res = self
            .resources
            .get_mut(resource)
            .ok_or_else(|| TopologyError::UnknownResource(resource.to_string()))?;
        if !res.is_leaf() {
            debug!(%resource, task, "aggregate resources cannot run tasks");
            return Ok(false);
        }
        Ok(res.run_task(task))
    }

    /// Clear `task` from `resource`.
    pub fn task_exited(&mut self, resource: &str, task: TaskId, now: u64) -> TopologyResult<()> {
        let res = self
            .resources
            .get_mut(resource)
            .ok_or_else(|| TopologyError::UnknownResource(resource.to_string()))?;
        if res.current_task() != Some(task) {
            return Err(TopologyError::TaskNotOnResource {
                task,
                resource: resource.to_string(),
            });
        }
        res.task_exited(now);
        Ok(())
    }

    /// Names of every machine, in sorted order.
    pub fn leaf_resource_ids(&self) -> BTreeSet<ResourceId> {
        self.resources
            .values()
            .filter(|r| r.is_leaf())
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Resources without a parent; these hang off the cluster aggregator.
    pub fn root_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values().filter(|r| r.parent().is_none())
    }

    pub fn children(&self, id: &str) -> impl Iterator<Item = &Resource> {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|c| self.resources.get(c))
    }

    /// Total task slots on the leaves at or below `id`.
    pub fn slots_below(&self, id: &str) -> u64 {
        let Some(res) = self.resources.get(id) else {
            return 0;
        };
        match res.kind() {
            ResourceKind::Machine => u64::from(res.task_capacity().min(1)),
            ResourceKind::Aggregate => self.children(id).map(|c| self.slots_below(c.name())).sum(),
        }
    }

    pub fn idle_leaf_count(&self) -> usize {
        self.resources
            .values()
            .filter(|r| r.is_leaf() && !r.busy())
            .count()
    }

    pub fn busy_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values().filter(|r| r.busy())
    }

    /// The resource currently running `task`, if any.
    pub fn find_task(&self, task: TaskId) -> Option<&Resource> {
        self.resources
            .values()
            .find(|r| r.current_task() == Some(task))
    }
}
