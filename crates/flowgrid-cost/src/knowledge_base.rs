//! Historical runtime statistics keyed by task equivalence class.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tracing::debug;

use flow_core::TaskEquivClass;

/// Source of runtime estimates for cost models.
///
/// Must answer for every class a cost model asks about.
pub trait KnowledgeBase: Send + Sync {
    fn avg_runtime_for_tec(&self, tec: TaskEquivClass) -> Duration;

    /// Report a finished task's runtime. Read-only sources ignore it.
    fn record_runtime(&self, _tec: TaskEquivClass, _runtime: Duration) {}
}

#[derive(Debug, Clone, Copy, Default)]
struct RuntimeStats {
    samples: u64,
    total_micros: u64,
}

impl RuntimeStats {
    fn average(&self) -> Duration {
        if self.samples == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.total_micros / self.samples)
    }
}

/// Running averages kept in memory.
///
/// Classes without samples fall back to `default_runtime`.
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeBase {
    stats: RwLock<HashMap<TaskEquivClass, RuntimeStats>>,
    default_runtime: Duration,
}

impl InMemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_runtime(mut self, default_runtime: Duration) -> Self {
        self.default_runtime = default_runtime;
        self
    }

    /// Fold one observed runtime into the class average.
    pub fn record_runtime(&self, tec: TaskEquivClass, runtime: Duration) {
        let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
        let entry = stats.entry(tec).or_default();
        entry.samples += 1;
        let micros = u64::try_from(runtime.as_micros()).unwrap_or(u64::MAX);
        entry.total_micros = entry.total_micros.saturating_add(micros);
        debug!(tec, samples = entry.samples, avg_us = entry.average().as_micros() as u64, "runtime recorded");
    }

    pub fn sample_count(&self, tec: TaskEquivClass) -> u64 {
        let stats = self.stats.read().unwrap_or_else(|e| e.into_inner());
        stats.get(&tec).map_or(0, |s| s.samples)
    }

}

impl KnowledgeBase for InMemoryKnowledgeBase {
    fn avg_runtime_for_tec(&self, tec: TaskEquivClass) -> Duration {
        let stats = self.stats.read().unwrap_or_else(|e| e.into_inner());
        match stats.get(&tec) {
            Some(s) if s.samples > 0 => s.average(),
            _ => self.default_runtime,
        }
    }

    fn record_runtime(&self, tec: TaskEquivClass, runtime: Duration) {
        InMemoryKnowledgeBase::record_runtime(self, tec, runtime);
    }
}
