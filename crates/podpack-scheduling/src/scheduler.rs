//! First-fit packing of pending pods onto candidate nodes.
//!
//! One [`Scheduler`] covers one provisioner. A pass builds a fresh
//! [`Topology`], walks the pods largest first, and offers each pod to the
//! open nodes in creation order. A pod no open node accepts gets a new
//! node of its own; if even a new node rejects it, the pod is reported
//! unschedulable together with the rejection.

use std::cmp::Reverse;
use std::sync::Arc;

use tracing::{debug, info, warn};

use podpack_api::labels::LABEL_ZONE;
use podpack_api::resources::{self, CPU, MEMORY};
use podpack_api::{Pod, Provisioner, Requirements, ResourceList};
use podpack_cloudprovider::{InstanceType, zones};

use crate::error::{SchedulingError, SchedulingResult};
use crate::node::Node;
use crate::topology::Topology;

/// Outcome of one scheduling pass.
#[derive(Debug)]
pub struct Schedule {
    pub nodes: Vec<Node>,
    pub unschedulable: Vec<(Pod, SchedulingError)>,
}

impl Schedule {
    pub fn scheduled_pods(&self) -> usize {
        self.nodes.iter().map(|n| n.pods().len()).sum()
    }
}

pub struct Scheduler {
    provisioner: Provisioner,
    instance_types: Vec<Arc<dyn InstanceType>>,
    daemon_resources: ResourceList,
}

impl Scheduler {
    pub fn new(
        provisioner: Provisioner,
        instance_types: Vec<Arc<dyn InstanceType>>,
        daemon_resources: ResourceList,
    ) -> Self {
        Self {
            provisioner,
            instance_types,
            daemon_resources,
        }
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    /// A topology seeded with the zones this provisioner may launch into.
    fn topology(&self, pods: &[Pod]) -> Arc<Topology> {
        let topology = Topology::new(pods);
        let allowed = self.provisioner.node_requirements().get(LABEL_ZONE);
        for zone in zones(&self.instance_types) {
            if allowed.has(&zone) {
                topology.register(LABEL_ZONE, &zone);
            }
        }
        Arc::new(topology)
    }

    /// Pack `pods` onto as few candidate nodes as first-fit allows.
    pub fn solve(&self, pods: &[Pod]) -> Schedule {
        let topology = self.topology(pods);

        let mut ordered: Vec<&Pod> = pods.iter().collect();
        ordered.sort_by_key(|pod| {
            let requests = resources::requests_for_pods([*pod]);
            Reverse((requests.get(CPU), requests.get(MEMORY)))
        });

        let mut nodes: Vec<Node> = Vec::new();
        let mut unschedulable = Vec::new();

        'pods: for pod in ordered {
            for node in nodes.iter_mut() {
                match node.add(pod) {
                    Ok(()) => {
                        debug!(pod = %pod.key(), node = node.hostname(), "added pod to open node");
                        continue 'pods;
                    }
                    Err(e) => {
                        debug!(pod = %pod.key(), node = node.hostname(), error = %e, "open node rejected pod");
                    }
                }
            }

            let mut node = Node::new(
                &self.provisioner,
                topology.clone(),
                self.daemon_resources.clone(),
                self.instance_types.clone(),
            );
            match node.add(pod) {
                Ok(()) => {
                    debug!(pod = %pod.key(), node = node.hostname(), "opened node");
                    nodes.push(node);
                }
                Err(e) => {
                    warn!(pod = %pod.key(), provisioner = %self.provisioner.name, error = %e, "pod is unschedulable");
                    unschedulable.push((pod.clone(), e));
                }
            }
        }

        info!(
            provisioner = %self.provisioner.name,
            pods = pods.len(),
            nodes = nodes.len(),
            unschedulable = unschedulable.len(),
            "scheduling pass complete"
        );

        Schedule { nodes, unschedulable }
    }
}

/// The first provisioner whose taints and requirements admit `pod`.
pub fn select_provisioner<'a>(provisioners: &'a [Provisioner], pod: &Pod) -> SchedulingResult<&'a Provisioner> {
    let pod_requirements = Requirements::from_pod(pod);
    provisioners
        .iter()
        .find(|p| {
            p.spec.taints.tolerates(pod).is_ok() && p.node_requirements().compatible(&pod_requirements).is_ok()
        })
        .ok_or_else(|| SchedulingError::NoProvisioner(pod.key()))
}
