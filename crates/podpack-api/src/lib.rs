//! podpack-api — the value types the scheduling core reasons about.
//!
//! Everything here is plain data plus pure operations on it. No type in
//! this crate holds shared state.
//!
//! # Components
//!
//! - **`resources`** — quantities, resource lists, per-pod request totals
//! - **`requirements`** — node-selector requirement algebra (add / compatible)
//! - **`taints`** — taints, tolerations, and the toleration check
//! - **`labels`** — well-known label keys and label selectors
//! - **`pod`** — the workload unit awaiting placement
//! - **`provisioner`** — the template candidate nodes are built from

pub mod error;
pub mod labels;
pub mod pod;
pub mod provisioner;
pub mod requirements;
pub mod resources;
pub mod taints;

pub use error::{QuantityError, RequirementsError, TolerationError};
pub use labels::{LabelSelector, LabelSelectorOperator, LabelSelectorRequirement};
pub use pod::{Container, NodeAffinity, NodeSelectorTerm, Pod, TopologySpreadConstraint, WhenUnsatisfiable};
pub use provisioner::{Provisioner, ProvisionerSpec};
pub use requirements::{NodeSelectorOperator, NodeSelectorRequirement, Requirement, Requirements};
pub use resources::{Quantity, ResourceList};
pub use taints::{Taint, TaintEffect, Taints, Toleration, TolerationOperator};
