//! flow-core: types shared by every flowgrid crate.
//!
//! Holds the task descriptors the cost models price, the immutable
//! per-round [`ClusterSnapshot`], the [`Clock`] used for wait-time
//! arithmetic, and the `flowgrid.toml` configuration.

pub mod clock;
pub mod config;
pub mod snapshot;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CostModelConfig, CostModelKind, FlowConfig, KnowledgeBaseConfig, SchedulerConfig, SjfConfig,
    TrivialConfig,
};
pub use snapshot::ClusterSnapshot;
pub use types::*;
