//! flowgrid.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which scheduling policy prices the flow network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostModelKind {
    /// Shortest-job-first: cheap to run short jobs, expensive to leave long waiters idle.
    #[default]
    Sjf,
    /// Fixed costs, no resource preferences.
    Trivial,
}

impl CostModelKind {
    pub fn label(&self) -> &'static str {
        match self {
            CostModelKind::Sjf => "sjf",
            CostModelKind::Trivial => "trivial",
        }
    }
}

impl std::fmt::Display for CostModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sjf: SjfConfig,
    #[serde(default)]
    pub trivial: TrivialConfig,
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub cost_model: CostModelKind,
    /// Seed for preference-arc sampling. Combined with the equivalence
    /// class, so every class draws from its own reproducible stream.
    #[serde(default)]
    pub preference_arc_seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SjfConfig {
    #[serde(default = "default_wait_time_multiplier")]
    pub wait_time_multiplier: u64,
    #[serde(default = "default_num_preference_arcs")]
    pub num_preference_arcs: usize,
}

impl Default for SjfConfig {
    fn default() -> Self {
        Self {
            wait_time_multiplier: default_wait_time_multiplier(),
            num_preference_arcs: default_num_preference_arcs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrivialConfig {
    #[serde(default = "default_trivial_unscheduled_cost")]
    pub unscheduled_cost: i64,
    #[serde(default = "default_trivial_cluster_agg_cost")]
    pub cluster_agg_cost: i64,
}

impl Default for TrivialConfig {
    fn default() -> Self {
        Self {
            unscheduled_cost: default_trivial_unscheduled_cost(),
            cluster_agg_cost: default_trivial_cluster_agg_cost(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    /// Runtime estimate returned for classes with no samples yet.
    #[serde(default)]
    pub default_runtime_ms: u64,
}

fn default_wait_time_multiplier() -> u64 {
    1
}

fn default_num_preference_arcs() -> usize {
    1
}

fn default_trivial_unscheduled_cost() -> i64 {
    5
}

fn default_trivial_cluster_agg_cost() -> i64 {
    2
}

/// The slice of configuration a cost model needs to be built.
#[derive(Debug, Clone, Default)]
pub struct CostModelConfig {
    pub kind: CostModelKind,
    pub preference_arc_seed: u64,
    pub sjf: SjfConfig,
    pub trivial: TrivialConfig,
}

impl FlowConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: FlowConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings no policy can honour.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sjf.num_preference_arcs == 0 {
            anyhow::bail!("sjf.num_preference_arcs must be at least 1");
        }
        if self.trivial.unscheduled_cost < self.trivial.cluster_agg_cost {
            anyhow::bail!(
                "trivial.unscheduled_cost ({}) must not be below trivial.cluster_agg_cost ({})",
                self.trivial.unscheduled_cost,
                self.trivial.cluster_agg_cost
            );
        }
        Ok(())
    }

    pub fn cost_model_config(&self) -> CostModelConfig {
        CostModelConfig {
            kind: self.scheduler.cost_model,
            preference_arc_seed: self.scheduler.preference_arc_seed,
            sjf: self.sjf.clone(),
            trivial: self.trivial.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = FlowConfig::from_toml_str("").unwrap();
        assert_eq!(config.scheduler.cost_model, CostModelKind::Sjf);
        assert_eq!(config.sjf.wait_time_multiplier, 1);
        assert_eq!(config.sjf.num_preference_arcs, 1);
        assert_eq!(config.trivial.unscheduled_cost, 5);
        assert_eq!(config.knowledge_base.default_runtime_ms, 0);
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
[scheduler]
cost_model = "trivial"
preference_arc_seed = 99

[sjf]
wait_time_multiplier = 4
num_preference_arcs = 2

[trivial]
unscheduled_cost = 10
cluster_agg_cost = 3

[knowledge_base]
default_runtime_ms = 250
"#;
        let config = FlowConfig::from_toml_str(toml_str).unwrap();
        let cm = config.cost_model_config();
        assert_eq!(cm.kind, CostModelKind::Trivial);
        assert_eq!(cm.preference_arc_seed, 99);
        assert_eq!(cm.sjf.wait_time_multiplier, 4);
        assert_eq!(cm.sjf.num_preference_arcs, 2);
        assert_eq!(cm.trivial.unscheduled_cost, 10);
        assert_eq!(config.knowledge_base.default_runtime_ms, 250);
    }

    #[test]
    fn test_rejects_zero_preference_arcs() {
        let err = FlowConfig::from_toml_str("[sjf]\nnum_preference_arcs = 0\n").unwrap_err();
        assert!(err.to_string().contains("num_preference_arcs"));
    }

    #[test]
    fn test_rejects_unknown_cost_model() {
        assert!(FlowConfig::from_toml_str("[scheduler]\ncost_model = \"quincy\"\n").is_err());
    }

    #[test]
    fn test_rejects_cheap_trivial_unscheduled() {
        let toml_str = "[trivial]\nunscheduled_cost = 1\ncluster_agg_cost = 2\n";
        assert!(FlowConfig::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn test_from_file_and_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\ncost_model = \"sjf\"\npreference_arc_seed = 7").unwrap();

        let config = FlowConfig::from_file(file.path()).unwrap();
        assert_eq!(config.scheduler.preference_arc_seed, 7);

        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("cost_model = \"sjf\""));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(CostModelKind::Sjf.to_string(), "sjf");
        assert_eq!(CostModelKind::Trivial.label(), "trivial");
    }
}
