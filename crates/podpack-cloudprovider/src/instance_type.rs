//! Machine shapes and filtering them against node constraints.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use podpack_api::labels::{LABEL_ARCH, LABEL_CAPACITY_TYPE, LABEL_INSTANCE_TYPE, LABEL_OS, LABEL_ZONE};
use podpack_api::resources::{self, ResourceList};
use podpack_api::Requirements;

pub const CAPACITY_TYPE_ON_DEMAND: &str = "on-demand";
pub const CAPACITY_TYPE_SPOT: &str = "spot";

/// A machine shape a node could be launched as.
pub trait InstanceType: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// CPU architecture, e.g. `amd64`.
    fn architecture(&self) -> &str;

    fn operating_systems(&self) -> &[String];

    /// Where, and how, this shape can be bought.
    fn offerings(&self) -> &[Offering];

    /// Total capacity of the machine.
    fn resources(&self) -> &ResourceList;

    /// Capacity reserved for the system and unavailable to pods.
    fn overhead(&self) -> &ResourceList;
}

/// One purchasable (zone, capacity type) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    pub zone: String,
    #[serde(default = "default_capacity_type")]
    pub capacity_type: String,
}

impl Offering {
    pub fn on_demand(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            capacity_type: CAPACITY_TYPE_ON_DEMAND.to_string(),
        }
    }
}

fn default_capacity_type() -> String {
    CAPACITY_TYPE_ON_DEMAND.to_string()
}

fn default_architecture() -> String {
    "amd64".to_string()
}

fn default_operating_systems() -> Vec<String> {
    vec!["linux".to_string()]
}

/// An instance type described entirely by data, as loaded from config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTypeSpec {
    pub name: String,
    #[serde(default = "default_architecture")]
    pub architecture: String,
    #[serde(default = "default_operating_systems")]
    pub operating_systems: Vec<String>,
    pub offerings: Vec<Offering>,
    pub resources: ResourceList,
    #[serde(default)]
    pub overhead: ResourceList,
}

impl InstanceTypeSpec {
    /// An on-demand linux/amd64 shape offered in `zones`.
    pub fn new(name: impl Into<String>, resources: ResourceList, zones: &[&str]) -> Self {
        Self {
            name: name.into(),
            architecture: default_architecture(),
            operating_systems: default_operating_systems(),
            offerings: zones.iter().map(|z| Offering::on_demand(*z)).collect(),
            resources,
            overhead: ResourceList::new(),
        }
    }
}

impl InstanceType for InstanceTypeSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn architecture(&self) -> &str {
        &self.architecture
    }

    fn operating_systems(&self) -> &[String] {
        &self.operating_systems
    }

    fn offerings(&self) -> &[Offering] {
        &self.offerings
    }

    fn resources(&self) -> &ResourceList {
        &self.resources
    }

    fn overhead(&self) -> &ResourceList {
        &self.overhead
    }
}

/// The subset of `options` that satisfies both `requirements` and
/// `requests`, in the original order.
pub fn filter_instance_types(
    options: &[Arc<dyn InstanceType>],
    requirements: &Requirements,
    requests: &ResourceList,
) -> Vec<Arc<dyn InstanceType>> {
    options
        .iter()
        .filter(|it| {
            let ok = is_compatible(it.as_ref(), requirements) && fits(it.as_ref(), requests);
            if !ok {
                trace!(instance_type = it.name(), "instance type filtered out");
            }
            ok
        })
        .cloned()
        .collect()
}

/// Labels of the instance type satisfy the requirements.
pub fn is_compatible(it: &dyn InstanceType, requirements: &Requirements) -> bool {
    let zone = requirements.get(LABEL_ZONE);
    let capacity_type = requirements.get(LABEL_CAPACITY_TYPE);
    let os = requirements.get(LABEL_OS);

    requirements.get(LABEL_INSTANCE_TYPE).has(it.name())
        && requirements.get(LABEL_ARCH).has(it.architecture())
        && it.operating_systems().iter().any(|o| os.has(o))
        && it
            .offerings()
            .iter()
            .any(|o| zone.has(&o.zone) && capacity_type.has(&o.capacity_type))
}

/// `requests` plus the instance type's overhead fits in its capacity.
pub fn fits(it: &dyn InstanceType, requests: &ResourceList) -> bool {
    let needed = resources::merge([requests, it.overhead()]);
    resources::fits(&needed, it.resources())
}

/// Every zone any of the instance types is offered in.
pub fn zones(instance_types: &[Arc<dyn InstanceType>]) -> BTreeSet<String> {
    instance_types
        .iter()
        .flat_map(|it| it.offerings().iter().map(|o| o.zone.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use podpack_api::requirements::{NodeSelectorOperator, NodeSelectorRequirement};

    fn cpu(n: &str) -> ResourceList {
        ResourceList::parse(&[("cpu", n)]).unwrap()
    }

    fn catalog() -> Vec<Arc<dyn InstanceType>> {
        vec![
            Arc::new(InstanceTypeSpec::new("small", cpu("2"), &["z1", "z2"])),
            Arc::new(InstanceTypeSpec::new("medium", cpu("4"), &["z2"])),
            Arc::new(InstanceTypeSpec {
                architecture: "arm64".to_string(),
                ..InstanceTypeSpec::new("large", cpu("8"), &["z1", "z2", "z3"])
            }),
        ]
    }

    fn names(its: &[Arc<dyn InstanceType>]) -> Vec<&str> {
        its.iter().map(|it| it.name()).collect()
    }

    #[test]
    fn unconstrained_keeps_everything_that_fits() {
        let out = filter_instance_types(&catalog(), &Requirements::new(), &cpu("1"));
        assert_eq!(names(&out), vec!["small", "medium", "large"]);
    }

    #[test]
    fn resources_filter_by_capacity() {
        let out = filter_instance_types(&catalog(), &Requirements::new(), &cpu("3"));
        assert_eq!(names(&out), vec!["medium", "large"]);

        let out = filter_instance_types(&catalog(), &Requirements::new(), &cpu("9"));
        assert!(out.is_empty());
    }

    #[test]
    fn overhead_reduces_usable_capacity() {
        let it = InstanceTypeSpec {
            overhead: cpu("500m"),
            ..InstanceTypeSpec::new("small", cpu("2"), &["z1"])
        };
        assert!(fits(&it, &cpu("1500m")));
        assert!(!fits(&it, &cpu("1600m")));
    }

    #[test]
    fn zone_requirement_filters_offerings() {
        let reqs = Requirements::new().add([NodeSelectorRequirement::in_values(LABEL_ZONE, ["z3"])]);
        let out = filter_instance_types(&catalog(), &reqs, &cpu("1"));
        assert_eq!(names(&out), vec!["large"]);
    }

    #[test]
    fn arch_and_name_requirements_apply() {
        let reqs = Requirements::new().add([NodeSelectorRequirement::new(
            LABEL_ARCH,
            NodeSelectorOperator::NotIn,
            ["arm64"],
        )]);
        assert_eq!(names(&filter_instance_types(&catalog(), &reqs, &cpu("1"))), vec!["small", "medium"]);

        let reqs = Requirements::new().add([NodeSelectorRequirement::in_values(LABEL_INSTANCE_TYPE, ["medium"])]);
        assert_eq!(names(&filter_instance_types(&catalog(), &reqs, &cpu("1"))), vec!["medium"]);
    }

    #[test]
    fn capacity_type_must_be_offered() {
        let reqs = Requirements::new().add([NodeSelectorRequirement::in_values(
            LABEL_CAPACITY_TYPE,
            [CAPACITY_TYPE_SPOT],
        )]);
        assert!(filter_instance_types(&catalog(), &reqs, &cpu("1")).is_empty());
    }

    #[test]
    fn unrelated_keys_do_not_filter() {
        let reqs = Requirements::new().add([NodeSelectorRequirement::in_values("team", ["search"])]);
        assert_eq!(filter_instance_types(&catalog(), &reqs, &cpu("1")).len(), 3);
    }

    #[test]
    fn zones_are_collected_once() {
        let zones = zones(&catalog());
        assert_eq!(zones.into_iter().collect::<Vec<_>>(), vec!["z1", "z2", "z3"]);
    }

    #[test]
    fn spec_parses_with_defaults() {
        let spec: InstanceTypeSpec = toml::from_str(
            r#"
name = "m5.large"
offerings = [{ zone = "us-east-1a" }, { zone = "us-east-1b", capacity_type = "spot" }]
resources = { cpu = 2, memory = "8Gi", pods = 29 }
"#,
        )
        .unwrap();
        assert_eq!(spec.architecture, "amd64");
        assert_eq!(spec.operating_systems, vec!["linux"]);
        assert_eq!(spec.offerings[0].capacity_type, CAPACITY_TYPE_ON_DEMAND);
        assert_eq!(spec.offerings[1].capacity_type, CAPACITY_TYPE_SPOT);
        assert_eq!(spec.resources.get("pods").millis(), 29_000);
    }
}
