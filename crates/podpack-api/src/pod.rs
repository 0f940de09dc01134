//! The workload unit awaiting placement.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::labels::LabelSelector;
use crate::requirements::NodeSelectorRequirement;
use crate::resources::ResourceList;
use crate::taints::Toleration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pod {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub node_selector: BTreeMap<String, String>,
    pub affinity: Option<NodeAffinity>,
    pub tolerations: Vec<Toleration>,
    pub topology_spread_constraints: Vec<TopologySpreadConstraint>,
    pub containers: Vec<Container>,
    pub init_containers: Vec<Container>,
    /// Fixed per-pod cost on top of container requests (e.g. sandbox overhead).
    pub overhead: ResourceList,
}

impl Default for Pod {
    fn default() -> Self {
        Self {
            name: String::new(),
            namespace: "default".to_string(),
            labels: BTreeMap::new(),
            node_selector: BTreeMap::new(),
            affinity: None,
            tolerations: Vec::new(),
            topology_spread_constraints: Vec::new(),
            containers: Vec::new(),
            init_containers: Vec::new(),
            overhead: ResourceList::new(),
        }
    }
}

impl Pod {
    /// A pod in the `default` namespace with no containers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a single container requesting `requests`.
    pub fn with_requests(mut self, requests: ResourceList) -> Self {
        self.containers.push(Container::with_requests(requests));
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_node_selector(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.node_selector.insert(key.into(), value.into());
        self
    }

    pub fn with_toleration(mut self, toleration: Toleration) -> Self {
        self.tolerations.push(toleration);
        self
    }

    pub fn with_spread(mut self, constraint: TopologySpreadConstraint) -> Self {
        self.topology_spread_constraints.push(constraint);
        self
    }

    /// `namespace/name`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    pub name: String,
    pub requests: ResourceList,
}

impl Container {
    pub fn with_requests(requests: ResourceList) -> Self {
        Self {
            name: String::new(),
            requests,
        }
    }
}

/// Required node affinity: the node must match at least one term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAffinity {
    pub required: Vec<NodeSelectorTerm>,
}

/// A conjunction of node-selector requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSelectorTerm {
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WhenUnsatisfiable {
    #[default]
    DoNotSchedule,
    ScheduleAnyway,
}

/// Limits how unevenly the pods matched by `label_selector` may spread
/// across the values of `topology_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySpreadConstraint {
    pub max_skew: u32,
    pub topology_key: String,
    #[serde(default)]
    pub when_unsatisfiable: WhenUnsatisfiable,
    #[serde(default)]
    pub label_selector: LabelSelector,
}

impl TopologySpreadConstraint {
    /// A hard constraint over `topology_key` selecting pods by `selector`.
    pub fn new(topology_key: impl Into<String>, max_skew: u32, selector: LabelSelector) -> Self {
        Self {
            max_skew,
            topology_key: topology_key.into(),
            when_unsatisfiable: WhenUnsatisfiable::DoNotSchedule,
            label_selector: selector,
        }
    }

    pub fn is_hard(&self) -> bool {
        self.when_unsatisfiable == WhenUnsatisfiable::DoNotSchedule
    }
}
