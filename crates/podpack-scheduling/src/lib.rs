//! podpack scheduling core — candidate nodes and first-fit packing.
//!
//! Pending pods are admitted one at a time onto candidate nodes. A node
//! only accepts a pod when its taints are tolerated, its requirements
//! stay satisfiable, topology spread stays within skew, and at least one
//! instance type can still host everything admitted. A rejected pod
//! leaves the node and the shared topology untouched.
//!
//! # Components
//!
//! - **`node`** — One candidate node and its admission rules
//! - **`topology`** — Spread domains and per-domain pod counts
//! - **`scheduler`** — First-fit packing and provisioner selection
//! - **`hostname`** — Placeholder hostnames for nodes not yet launched

pub mod error;
pub mod hostname;
pub mod node;
pub mod scheduler;
pub mod topology;

pub use error::{SchedulingError, SchedulingResult, TopologyError};
pub use hostname::HostnameGenerator;
pub use node::{Node, NodeSummary};
pub use scheduler::{Schedule, Scheduler, select_provisioner};
pub use topology::Topology;
