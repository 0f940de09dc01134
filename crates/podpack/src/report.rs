//! Simulation report — what would be launched, and what could not be placed.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use podpack_api::Pod;
use podpack_cloudprovider::InstanceType;
use podpack_scheduling::{NodeSummary, Schedule, SchedulingError};

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub provisioners: Vec<ProvisionerReport>,
    /// Pods no provisioner admits.
    pub unroutable: Vec<UnschedulablePod>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionerReport {
    pub name: String,
    pub nodes: Vec<NodeSummary>,
    /// `Display` of each node, in creation order.
    #[serde(skip)]
    pub descriptions: Vec<String>,
    pub unschedulable: Vec<UnschedulablePod>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnschedulablePod {
    pub pod: String,
    pub reason: String,
}

impl UnschedulablePod {
    pub fn new(pod: &Pod, err: &SchedulingError) -> Self {
        Self {
            pod: pod.key(),
            reason: err.to_string(),
        }
    }
}

impl ProvisionerReport {
    pub fn from_schedule(name: &str, schedule: &Schedule) -> Self {
        Self {
            name: name.to_string(),
            nodes: schedule.nodes.iter().map(|n| n.summary()).collect(),
            descriptions: schedule.nodes.iter().map(|n| n.to_string()).collect(),
            unschedulable: schedule
                .unschedulable
                .iter()
                .map(|(pod, err)| UnschedulablePod::new(pod, err))
                .collect(),
        }
    }
}

impl SimulationReport {
    pub fn node_count(&self) -> usize {
        self.provisioners.iter().map(|p| p.nodes.len()).sum()
    }

    pub fn unschedulable_count(&self) -> usize {
        self.unroutable.len() + self.provisioners.iter().map(|p| p.unschedulable.len()).sum::<usize>()
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for provisioner in &self.provisioners {
            writeln!(f, "provisioner {}: {} node(s)", provisioner.name, provisioner.nodes.len())?;
            for (node, description) in provisioner.nodes.iter().zip(&provisioner.descriptions) {
                writeln!(f, "  {}: {description}", node.hostname)?;
                for pod in &node.pods {
                    writeln!(f, "    - {pod}")?;
                }
            }
            for pod in &provisioner.unschedulable {
                writeln!(f, "  unschedulable {}: {}", pod.pod, pod.reason)?;
            }
        }
        for pod in &self.unroutable {
            writeln!(f, "unroutable {}: {}", pod.pod, pod.reason)?;
        }
        write!(
            f,
            "{} node(s), {} unschedulable pod(s)",
            self.node_count(),
            self.unschedulable_count()
        )
    }
}

/// One line per instance type: name, platform, resources and offerings.
pub struct Catalog<'a>(pub &'a [Arc<dyn InstanceType>]);

impl fmt::Display for Catalog<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for it in self.0 {
            let zones: Vec<String> = it
                .offerings()
                .iter()
                .map(|o| format!("{}/{}", o.zone, o.capacity_type))
                .collect();
            writeln!(
                f,
                "{} ({}, {}) {} [{}]",
                it.name(),
                it.architecture(),
                it.operating_systems().join(","),
                it.resources(),
                zones.join(" ")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use podpack_api::{Provisioner, ResourceList};
    use podpack_cloudprovider::InstanceTypeSpec;
    use podpack_scheduling::Scheduler;

    fn cpu(n: &str) -> ResourceList {
        ResourceList::parse(&[("cpu", n)]).unwrap()
    }

    fn report() -> SimulationReport {
        let types: Vec<Arc<dyn InstanceType>> = vec![Arc::new(InstanceTypeSpec::new("small", cpu("2"), &["z1"])) as Arc<dyn InstanceType>];
        let scheduler = Scheduler::new(Provisioner::new("default"), types, ResourceList::new());
        let pods = vec![
            Pod::new("a").with_requests(cpu("1")),
            Pod::new("huge").with_requests(cpu("8")),
        ];
        let schedule = scheduler.solve(&pods);

        SimulationReport {
            provisioners: vec![ProvisionerReport::from_schedule("default", &schedule)],
            unroutable: vec![UnschedulablePod {
                pod: "default/lost".to_string(),
                reason: "no provisioner admits pod default/lost".to_string(),
            }],
        }
    }

    #[test]
    fn test_counts() {
        let report = report();
        assert_eq!(report.node_count(), 1);
        assert_eq!(report.unschedulable_count(), 2);
    }

    #[test]
    fn test_text_report() {
        let text = report().to_string();
        assert!(text.starts_with("provisioner default: 1 node(s)\n"));
        assert!(text.contains("    - default/a\n"));
        assert!(text.contains("  unschedulable default/huge: no instance type satisfied resources"));
        assert!(text.ends_with("1 node(s), 2 unschedulable pod(s)"));
    }

    #[test]
    fn test_json_report_skips_descriptions() {
        let json = serde_json::to_value(report()).unwrap();
        let provisioner = &json["provisioners"][0];
        assert!(provisioner.get("descriptions").is_none());
        assert_eq!(provisioner["nodes"][0]["instance_types"][0], "small");
    }

    #[test]
    fn test_catalog_listing() {
        let types: Vec<Arc<dyn InstanceType>> = vec![Arc::new(InstanceTypeSpec::new("small", cpu("2"), &["z1"])) as Arc<dyn InstanceType>];
        assert_eq!(Catalog(&types).to_string(), "small (amd64, linux) {\"cpu\":\"2\"} [z1/on-demand]\n");
    }

    struct Full;

    impl fmt::Write for Full {
        fn write_str(&mut self, _: &str) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    #[test]
    fn test_write_errors_propagate() {
        use std::fmt::Write as _;

        assert!(write!(Full, "{}", report()).is_err());
        let types: Vec<Arc<dyn InstanceType>> = vec![Arc::new(InstanceTypeSpec::new("small", cpu("2"), &["z1"])) as Arc<dyn InstanceType>];
        assert!(write!(Full, "{}", Catalog(&types)).is_err());
    }
}
