//! flowgrid-cost: cost models for flow-based scheduling.
//!
//! A cost model assigns a cost to every arc the flow graph builder may
//! emit: task to unscheduled aggregator, task to cluster aggregator, task
//! to resource, topology-internal arcs, and equivalence-class arcs. The
//! min-cost flow over the priced network is the scheduling decision.
//!
//! # Components
//!
//! - **`interface`**: The [`CostModel`] contract every policy implements
//! - **`sjf`**: Shortest-job-first policy driven by runtime estimates
//! - **`trivial`**: Fixed-cost policy with no resource preferences
//! - **`equiv_class`**: Task equivalence class hashing and indexing
//! - **`knowledge_base`**: Runtime statistics per equivalence class
//! - **`select`**: Builds the configured policy for a round

pub mod equiv_class;
pub mod error;
pub mod interface;
pub mod knowledge_base;
pub mod select;
pub mod sjf;
pub mod trivial;

pub use equiv_class::{EquivClassIndex, binary_equiv_class, job_equiv_class, primary_equiv_class};
pub use error::{CostModelError, CostModelResult};
pub use interface::CostModel;
pub use knowledge_base::{InMemoryKnowledgeBase, KnowledgeBase};
pub use select::build_cost_model;
pub use sjf::SjfCostModel;
pub use trivial::TrivialCostModel;
