//! flowgrid-topology: the resource tree the cost models reason about.
//!
//! # Components
//!
//! - **`resource`**: A schedulable unit: leaf machine or aggregation point
//! - **`ensemble`**: A named group of resources (rack, cell) with admission rules
//! - **`topology`**: Registry owning both, keyed by name
//!
//! Resources and ensembles refer to each other by name only. The
//! [`Topology`] owns every value, so neither side controls the other's
//! lifetime.

pub mod ensemble;
pub mod error;
pub mod resource;
pub mod topology;

pub use ensemble::Ensemble;
pub use error::{TopologyError, TopologyResult};
pub use resource::{Resource, ResourceKind};
pub use topology::Topology;
