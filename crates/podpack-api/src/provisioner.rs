//! Provisioner — the template candidate nodes are built from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::labels::LABEL_PROVISIONER_NAME;
use crate::requirements::{NodeSelectorRequirement, Requirements};
use crate::taints::{Taint, Taints};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provisioner {
    pub name: String,
    #[serde(default)]
    pub spec: ProvisionerSpec,
}

/// Constraints every node launched from a provisioner carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerSpec {
    pub taints: Taints,
    /// Labels applied verbatim to launched nodes.
    pub labels: BTreeMap<String, String>,
    pub requirements: Requirements,
}

impl Provisioner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: ProvisionerSpec::default(),
        }
    }

    pub fn with_taint(mut self, taint: Taint) -> Self {
        self.spec.taints.push(taint);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_requirement(mut self, requirement: NodeSelectorRequirement) -> Self {
        self.spec.requirements = self.spec.requirements.add([requirement]);
        self
    }

    /// Spec requirements tightened with the provisioner's labels and name.
    pub fn node_requirements(&self) -> Requirements {
        let labels = self
            .spec
            .labels
            .iter()
            .map(|(k, v)| NodeSelectorRequirement::in_values(k.clone(), [v.clone()]));
        let name = NodeSelectorRequirement::in_values(LABEL_PROVISIONER_NAME, [self.name.clone()]);
        self.spec.requirements.add(labels.chain([name]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LABEL_ZONE;
    use crate::requirements::NodeSelectorOperator;
    use crate::taints::TaintEffect;

    #[test]
    fn node_requirements_pin_labels_and_name() {
        let provisioner = Provisioner::new("default")
            .with_label("team", "search")
            .with_requirement(NodeSelectorRequirement::in_values(LABEL_ZONE, ["a", "b"]));

        let reqs = provisioner.node_requirements();

        assert_eq!(reqs.get("team").single_value(), Some("search"));
        assert_eq!(reqs.get(LABEL_PROVISIONER_NAME).single_value(), Some("default"));
        assert_eq!(reqs.get(LABEL_ZONE).len(), Some(2));
        // The spec itself is not modified.
        assert!(provisioner.spec.requirements.get("team").is_unconstrained());
    }

    #[test]
    fn parses_from_toml() {
        let provisioner: Provisioner = toml::from_str(
            r#"
name = "gpu"

[spec]
labels = { team = "ml" }

[[spec.taints]]
key = "nvidia.com/gpu"
effect = "NoSchedule"

[[spec.requirements]]
key = "kubernetes.io/arch"
operator = "In"
values = ["amd64"]

[[spec.requirements]]
key = "topology.kubernetes.io/zone"
operator = "NotIn"
values = ["us-east-1c"]
"#,
        )
        .unwrap();

        assert_eq!(provisioner.name, "gpu");
        assert_eq!(
            provisioner.spec.taints.iter().next(),
            Some(&Taint::new("nvidia.com/gpu", None, TaintEffect::NoSchedule))
        );
        let zone = provisioner.spec.requirements.get(LABEL_ZONE);
        assert!(!zone.has("us-east-1c"));
        assert!(zone.has("us-east-1a"));
        assert_eq!(
            provisioner.spec.requirements.to_node_selector_requirements()[0].operator,
            NodeSelectorOperator::In
        );
    }
}
