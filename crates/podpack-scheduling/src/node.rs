//! Node — one candidate machine under construction.
//!
//! A node starts from a provisioner and the full list of instance types.
//! Every pod it accepts tightens its requirements and shrinks the set of
//! instance types that could still host everything admitted so far. The
//! node is later launched as one of those types, or dropped.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use serde::Serialize;

use podpack_api::labels::LABEL_HOSTNAME;
use podpack_api::resources;
use podpack_api::{NodeSelectorRequirement, Pod, Provisioner, Requirements, ResourceList};
use podpack_cloudprovider::{InstanceType, filter_instance_types};

use crate::error::{SchedulingError, SchedulingResult};
use crate::hostname::HostnameGenerator;
use crate::topology::Topology;

/// Instance type names listed by `Display` before summarising the rest.
const DISPLAYED_INSTANCE_TYPES: usize = 5;

/// A set of constraints, compatible pods, and the instance types that
/// could still satisfy them.
#[derive(Debug)]
pub struct Node {
    hostname: String,
    /// Own copy; tightening it never affects the template or sibling nodes.
    provisioner: Provisioner,
    instance_type_options: Vec<Arc<dyn InstanceType>>,
    pods: Vec<Pod>,
    topology: Arc<Topology>,
    requests: ResourceList,
}

impl Node {
    /// A node named by the process-wide [`HostnameGenerator`].
    pub fn new(
        provisioner: &Provisioner,
        topology: Arc<Topology>,
        daemon_resources: ResourceList,
        instance_types: Vec<Arc<dyn InstanceType>>,
    ) -> Self {
        Self::with_generator(
            HostnameGenerator::global(),
            provisioner,
            topology,
            daemon_resources,
            instance_types,
        )
    }

    /// Like [`Node::new`], naming the node from `generator`.
    ///
    /// The node's hostname is registered with `topology` right away, so
    /// hostname spread treats it as an existing, empty domain.
    pub fn with_generator(
        generator: &HostnameGenerator,
        provisioner: &Provisioner,
        topology: Arc<Topology>,
        daemon_resources: ResourceList,
        instance_types: Vec<Arc<dyn InstanceType>>,
    ) -> Self {
        let hostname = generator.next_hostname();
        let mut provisioner = provisioner.clone();
        provisioner.spec.requirements = provisioner
            .node_requirements()
            .add([NodeSelectorRequirement::in_values(LABEL_HOSTNAME, [hostname.clone()])]);
        topology.register(LABEL_HOSTNAME, &hostname);

        Self {
            hostname,
            provisioner,
            instance_type_options: instance_types,
            pods: Vec::new(),
            topology,
            requests: daemon_resources,
        }
    }

    /// Try to admit `pod`.
    ///
    /// On error nothing about the node or the shared topology has changed.
    pub fn add(&mut self, pod: &Pod) -> SchedulingResult<()> {
        self.provisioner.spec.taints.tolerates(pod)?;

        let current = &self.provisioner.spec.requirements;
        let pod_requirements = Requirements::from_pod(pod);
        current.compatible(&pod_requirements)?;
        let node_requirements = current.add_requirements(&pod_requirements);

        let requirements = self
            .topology
            .tighten(&pod_requirements, &node_requirements, pod)?;

        // The topology may pin keys the node already narrowed.
        current.compatible(&requirements)?;
        let requirements = current.add_requirements(&requirements);

        let pod_requests = resources::requests_for_pods([pod]);
        let requests = resources::merge([&self.requests, &pod_requests]);

        let instance_types = filter_instance_types(&self.instance_type_options, &requirements, &requests);
        if instance_types.is_empty() {
            return Err(SchedulingError::NoInstanceType {
                resources: pod_requests,
                requirements,
            });
        }

        self.pods.push(pod.clone());
        self.instance_type_options = instance_types;
        self.requests = requests;
        self.provisioner.spec.requirements = requirements;
        self.topology.record(pod, &self.provisioner.spec.requirements);
        Ok(())
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    pub fn requirements(&self) -> &Requirements {
        &self.provisioner.spec.requirements
    }

    pub fn instance_type_options(&self) -> &[Arc<dyn InstanceType>] {
        &self.instance_type_options
    }

    pub fn pods(&self) -> &[Pod] {
        &self.pods
    }

    /// Admitted pod requests plus the daemon baseline.
    pub fn requests(&self) -> &ResourceList {
        &self.requests
    }

    /// Labels the launched node will carry.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.requirements().labels()
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            hostname: self.hostname.clone(),
            provisioner: self.provisioner.name.clone(),
            pods: self.pods.iter().map(Pod::key).collect(),
            instance_types: self
                .instance_type_options
                .iter()
                .map(|it| it.name().to_string())
                .collect(),
            requests: self.requests.clone(),
            labels: self.labels(),
            requirements: self.requirements().clone(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types = String::new();
        for (i, it) in self.instance_type_options.iter().enumerate() {
            if i >= DISPLAYED_INSTANCE_TYPES {
                write!(types, " and {} other(s)", self.instance_type_options.len() - i)?;
                break;
            } else if i > 0 {
                types.push_str(", ");
            }
            types.push_str(it.name());
        }
        write!(
            f,
            "node with {} pods requesting {} from types {}",
            self.pods.len(),
            self.requests,
            types
        )
    }
}

/// Serializable view of a node, for reports.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub hostname: String,
    pub provisioner: String,
    pub pods: Vec<String>,
    pub instance_types: Vec<String>,
    pub requests: ResourceList,
    pub labels: BTreeMap<String, String>,
    pub requirements: Requirements,
}

#[cfg(test)]
mod tests {
    use super::*;
    use podpack_api::labels::{LABEL_PROVISIONER_NAME, LABEL_ZONE};
    use podpack_api::{Taint, TaintEffect, Toleration};
    use podpack_cloudprovider::InstanceTypeSpec;

    fn cpu(n: &str) -> ResourceList {
        ResourceList::parse(&[("cpu", n)]).unwrap()
    }

    fn instance_types(sizes: &[&str]) -> Vec<Arc<dyn InstanceType>> {
        sizes
            .iter()
            .map(|s| Arc::new(InstanceTypeSpec::new(format!("cpu-{s}"), cpu(s), &["z1"])) as Arc<dyn InstanceType>)
            .collect()
    }

    fn node(provisioner: &Provisioner, sizes: &[&str]) -> Node {
        Node::with_generator(
            &HostnameGenerator::new(),
            provisioner,
            Arc::new(Topology::default()),
            ResourceList::new(),
            instance_types(sizes),
        )
    }

    #[test]
    fn new_node_pins_its_hostname() {
        let topology = Arc::new(Topology::default());
        let n = Node::with_generator(
            &HostnameGenerator::new(),
            &Provisioner::new("default"),
            topology.clone(),
            cpu("100m"),
            instance_types(&["2"]),
        );

        assert_eq!(n.hostname(), "hostname-placeholder-0001");
        assert_eq!(
            n.requirements().get(LABEL_HOSTNAME).single_value(),
            Some("hostname-placeholder-0001")
        );
        assert_eq!(n.labels().get(LABEL_PROVISIONER_NAME), Some(&"default".to_string()));
        assert_eq!(topology.domains(LABEL_HOSTNAME), vec!["hostname-placeholder-0001"]);
        assert_eq!(n.requests(), &cpu("100m"));
        assert!(n.pods().is_empty());
    }

    #[test]
    fn template_is_copied() {
        let template = Provisioner::new("default");
        let mut n = node(&template, &["4"]);
        n.add(&Pod::new("p").with_node_selector(LABEL_ZONE, "z1")).unwrap();

        assert!(template.spec.requirements.is_empty());
        assert_eq!(n.requirements().get(LABEL_ZONE).single_value(), Some("z1"));
    }

    #[test]
    fn untolerated_taint_is_rejected() {
        let provisioner = Provisioner::new("default").with_taint(Taint::new("key", Some("A"), TaintEffect::NoSchedule));
        let mut n = node(&provisioner, &["4"]);

        let err = n.add(&Pod::new("p")).unwrap_err();
        assert!(matches!(err, SchedulingError::Toleration(_)));
        assert!(n.pods().is_empty());

        let tolerant = Pod::new("q").with_toleration(Toleration::equal("key", "A", TaintEffect::NoSchedule));
        assert!(n.add(&tolerant).is_ok());
    }

    #[test]
    fn admission_accumulates_requests() {
        let mut n = node(&Provisioner::new("default"), &["2", "4", "8"]);

        n.add(&Pod::new("a").with_requests(cpu("3"))).unwrap();
        assert_eq!(n.instance_type_options().len(), 2);

        n.add(&Pod::new("b").with_requests(cpu("1"))).unwrap();
        assert_eq!(n.requests(), &cpu("4"));
        assert_eq!(n.pods().len(), 2);
    }

    #[test]
    fn no_instance_type_reports_pod_request() {
        let mut n = node(&Provisioner::new("default"), &["2"]);
        let err = n.add(&Pod::new("a").with_requests(cpu("3"))).unwrap_err();

        match err {
            SchedulingError::NoInstanceType { resources, requirements } => {
                assert_eq!(resources, cpu("3"));
                assert!(requirements.get(LABEL_HOSTNAME).single_value().is_some());
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn display_lists_first_five_types() {
        let n = node(&Provisioner::new("default"), &["1", "2", "3", "4", "5", "6", "7"]);
        assert_eq!(
            n.to_string(),
            "node with 0 pods requesting {} from types cpu-1, cpu-2, cpu-3, cpu-4, cpu-5 and 2 other(s)"
        );
    }

    #[test]
    fn display_with_few_types_has_no_suffix() {
        let mut n = node(&Provisioner::new("default"), &["2", "4"]);
        n.add(&Pod::new("a").with_requests(cpu("1"))).unwrap();
        assert_eq!(
            n.to_string(),
            r#"node with 1 pods requesting {"cpu":"1"} from types cpu-2, cpu-4"#
        );
    }

    #[test]
    fn summary_serializes_for_reports() {
        let mut n = node(&Provisioner::new("default"), &["4"]);
        n.add(&Pod::new("a").with_requests(cpu("1"))).unwrap();

        let json = serde_json::to_value(n.summary()).unwrap();
        assert_eq!(json["hostname"], n.hostname());
        assert_eq!(json["pods"], serde_json::json!(["default/a"]));
        assert_eq!(json["requests"]["cpu"], "1");
        assert_eq!(json["labels"][LABEL_HOSTNAME], n.hostname());
    }

    #[test]
    fn summary_carries_names() {
        let mut n = node(&Provisioner::new("default"), &["2", "4"]);
        n.add(&Pod::new("a").with_requests(cpu("3"))).unwrap();

        let summary = n.summary();
        assert_eq!(summary.pods, vec!["default/a"]);
        assert_eq!(summary.instance_types, vec!["cpu-4"]);
        assert_eq!(summary.provisioner, "default");
        assert_eq!(summary.hostname, n.hostname());
    }
}
