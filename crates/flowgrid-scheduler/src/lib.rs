//! flowgrid-scheduler: turns a priced cluster into placements.
//!
//! One scheduling round:
//!
//! ```text
//! RoundScheduler
//!   ├── snapshot ClusterState (topology + tasks, generation N)
//!   ├── build_cost_model(config, snapshot)
//!   ├── FlowGraphBuilder::build   (prices every arc, in parallel per task)
//!   ├── FlowSolver::solve         (external min-cost flow)
//!   ├── extract_placements        (flow decomposition per task)
//!   └── apply, unless the state moved past generation N
//! ```

pub mod error;
pub mod graph;
pub mod round;
pub mod solver;

pub use error::{SchedulerError, SchedulerResult};
pub use graph::{ArcId, ArcKind, FlowArc, FlowGraph, FlowGraphBuilder, FlowNode, NodeId, NodeKind};
pub use round::{ClusterState, RoundOutcome, RoundReport, RoundScheduler};
pub use solver::{FlowAssignment, FlowSolver, Placement, PlacementDecision, extract_placements};
