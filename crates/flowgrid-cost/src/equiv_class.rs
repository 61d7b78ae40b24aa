//! Task equivalence classes.
//!
//! Class keys are the first eight bytes of a SHA-256 digest, so the same
//! binary maps to the same class in every process and on every toolchain.
//! The knowledge base keys its statistics by these values.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use flow_core::{TaskEquivClass, TaskId};

use crate::error::{CostModelError, CostModelResult};

fn digest_to_class(hasher: Sha256) -> TaskEquivClass {
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    TaskEquivClass::from_be_bytes(prefix)
}

/// Class of every task running `binary`.
pub fn binary_equiv_class(binary: &str) -> TaskEquivClass {
    let mut hasher = Sha256::new();
    hasher.update(binary.as_bytes());
    digest_to_class(hasher)
}

/// Class of every task in job `job_id`.
pub fn job_equiv_class(job_id: &str) -> TaskEquivClass {
    let mut hasher = Sha256::new();
    hasher.update(b"job/");
    hasher.update(job_id.as_bytes());
    digest_to_class(hasher)
}

/// The most specific class of a task.
pub fn primary_equiv_class(task_id: TaskId, classes: &[TaskEquivClass]) -> CostModelResult<TaskEquivClass> {
    classes
        .first()
        .copied()
        .ok_or(CostModelError::NoEquivClasses(task_id))
}

/// Tasks grouped by equivalence class for one round.
///
/// The graph builder creates one aggregator node per class, so arcs to
/// resources scale with classes × resources instead of tasks × resources.
#[derive(Debug, Clone, Default)]
pub struct EquivClassIndex {
    by_task: BTreeMap<TaskId, Vec<TaskEquivClass>>,
    by_class: BTreeMap<TaskEquivClass, Vec<TaskId>>,
}

impl EquivClassIndex {
    pub fn insert(&mut self, task_id: TaskId, classes: Vec<TaskEquivClass>) {
        for tec in &classes {
            let members = self.by_class.entry(*tec).or_default();
            if !members.contains(&task_id) {
                members.push(task_id);
            }
        }
        self.by_task.insert(task_id, classes);
    }

    pub fn members(&self, tec: TaskEquivClass) -> &[TaskId] {
        self.by_class.get(&tec).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn classes(&self) -> impl Iterator<Item = TaskEquivClass> + '_ {
        self.by_class.keys().copied()
    }

    pub fn class_count(&self) -> usize {
        self.by_class.len()
    }

    pub fn task_count(&self) -> usize {
        self.by_task.len()
    }
}
