//! Ensembles: named groups of resources.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use flow_core::ResourceId;

/// A named group of resources such as a rack or a cell.
///
/// Owns its members by name. Admission rules live here, not on the
/// resource: an ensemble may be capped or closed to new members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ensemble {
    name: String,
    members: BTreeSet<ResourceId>,
    max_members: Option<usize>,
    accepting: bool,
}

impl Ensemble {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: BTreeSet::new(),
            max_members: None,
            accepting: true,
        }
    }

    pub fn with_max_members(mut self, max_members: usize) -> Self {
        self.max_members = Some(max_members);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &BTreeSet<ResourceId> {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.members.contains(resource)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Open or close the ensemble to new members. Existing members stay.
    pub fn set_accepting(&mut self, accepting: bool) {
        self.accepting = accepting;
    }

    /// Decide whether `resource` may join, and record it if so.
    ///
    /// Re-admitting an existing member always succeeds.
    pub fn admit(&mut self, resource: &str) -> bool {
        if self.members.contains(resource) {
            return true;
        }
        if !self.accepting {
            debug!(ensemble = %self.name, resource, "ensemble closed to new members");
            return false;
        }
        if self.max_members.is_some_and(|max| self.members.len() >= max) {
            debug!(ensemble = %self.name, resource, "ensemble full");
            return false;
        }
        self.members.insert(resource.to_string());
        true
    }

    /// Drop `resource` from the member set. Returns whether it was a member.
    pub fn remove(&mut self, resource: &str) -> bool {
        self.members.remove(resource)
    }
}
