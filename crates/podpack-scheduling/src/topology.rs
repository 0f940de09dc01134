//! Topology spread accounting for one scheduling pass.
//!
//! The tracker is shared by every candidate node built in the pass. It
//! knows which domains exist for each topology key (zones, placeholder
//! hostnames) and how many matching pods each domain holds per spread
//! group. Admission is two-phase: [`Topology::tighten`] computes a
//! spread-aware tightening settled on one domain per relevant key without
//! touching any counts, and [`Topology::record`] commits a placement once
//! the node has accepted it.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use tracing::debug;

use podpack_api::labels::LABEL_HOSTNAME;
use podpack_api::{LabelSelector, NodeSelectorRequirement, Pod, Requirements, TopologySpreadConstraint};

use crate::error::TopologyError;

/// Pods sharing a namespace and spread constraint, counted per domain.
#[derive(Debug, Clone)]
struct TopologyGroup {
    namespace: String,
    key: String,
    max_skew: u32,
    selector: LabelSelector,
    counts: BTreeMap<String, u32>,
}

impl TopologyGroup {
    fn new(namespace: &str, constraint: &TopologySpreadConstraint) -> Self {
        Self {
            namespace: namespace.to_string(),
            key: constraint.topology_key.clone(),
            max_skew: constraint.max_skew,
            selector: constraint.label_selector.clone(),
            counts: BTreeMap::new(),
        }
    }

    fn is_for(&self, namespace: &str, constraint: &TopologySpreadConstraint) -> bool {
        self.namespace == namespace
            && self.key == constraint.topology_key
            && self.max_skew == constraint.max_skew
            && self.selector == constraint.label_selector
    }

    fn selects(&self, pod: &Pod) -> bool {
        self.namespace == pod.namespace && self.selector.matches(&pod.labels)
    }

    fn count(&self, domain: &str) -> u32 {
        self.counts.get(domain).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct TopologyState {
    /// Topology key → known domain values.
    domains: BTreeMap<String, BTreeSet<String>>,
    groups: Vec<TopologyGroup>,
}

impl TopologyState {
    fn group(&self, namespace: &str, constraint: &TopologySpreadConstraint) -> Option<&TopologyGroup> {
        self.groups.iter().find(|g| g.is_for(namespace, constraint))
    }

    fn ensure_group(&mut self, namespace: &str, constraint: &TopologySpreadConstraint) {
        if self.group(namespace, constraint).is_none() {
            self.groups.push(TopologyGroup::new(namespace, constraint));
        }
    }

    fn spread(
        &self,
        pod_requirements: &Requirements,
        node_requirements: &Requirements,
        pod: &Pod,
    ) -> Result<Requirements, TopologyError> {
        let mut requirements = node_requirements.clone();

        for constraint in pod.topology_spread_constraints.iter().filter(|c| c.is_hard()) {
            let key = &constraint.topology_key;
            let registered = match self.domains.get(key) {
                Some(domains) if !domains.is_empty() => domains,
                _ => return Err(TopologyError::NoDomains { key: key.clone() }),
            };
            let group = self.group(&pod.namespace, constraint);
            let count = |domain: &str| group.map_or(0, |g| g.count(domain));

            let pod_allowed = pod_requirements.get(key);
            let eligible: Vec<&str> = registered
                .iter()
                .map(String::as_str)
                .filter(|d| pod_allowed.has(d))
                .collect();
            // A fresh node is always an empty hostname domain.
            let min = if key == LABEL_HOSTNAME {
                0
            } else {
                eligible.iter().map(|d| count(d)).min().unwrap_or(0)
            };

            let node_allowed = requirements.get(key);
            let candidates: Vec<&str> = eligible
                .iter()
                .copied()
                .filter(|d| node_allowed.has(d) && count(d) + 1 <= min + constraint.max_skew)
                .collect();

            if candidates.is_empty() {
                let counts = eligible
                    .iter()
                    .map(|d| format!("{d}={}", count(d)))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(TopologyError::Unsatisfiable {
                    key: key.clone(),
                    max_skew: constraint.max_skew,
                    counts,
                });
            }

            requirements = requirements.add([NodeSelectorRequirement::in_values(key.clone(), candidates)]);
        }

        Ok(requirements)
    }

    fn pin(&self, requirements: &Requirements, pod: &Pod) -> Requirements {
        let own = pod
            .topology_spread_constraints
            .iter()
            .filter(|c| c.is_hard())
            .map(|c| (c.topology_key.as_str(), self.group(&pod.namespace, c)));
        let selecting = self
            .groups
            .iter()
            .filter(|g| g.selects(pod))
            .map(|g| (g.key.as_str(), Some(g)));

        let mut pinned = requirements.clone();
        for (key, group) in own.chain(selecting) {
            let Some(registered) = self.domains.get(key) else {
                continue;
            };
            let allowed = pinned.get(key);
            if allowed.single_value().is_some() {
                continue;
            }
            let domain = registered
                .iter()
                .filter(|d| allowed.has(d))
                .min_by_key(|d| group.map_or(0, |g| g.count(d)));
            if let Some(domain) = domain {
                pinned = pinned.add([NodeSelectorRequirement::in_values(key, [domain.clone()])]);
            }
        }

        pinned
    }
}

/// Shared spread tracker. All methods take `&self` and lock internally.
#[derive(Debug, Default)]
pub struct Topology {
    inner: Mutex<TopologyState>,
}

impl Topology {
    /// A tracker with one spread group per distinct hard constraint in `pods`.
    ///
    /// Pods recorded later are counted in every group whose selector
    /// matches them, so groups must exist before the first placement.
    pub fn new<'a>(pods: impl IntoIterator<Item = &'a Pod>) -> Self {
        let mut state = TopologyState::default();
        for pod in pods {
            for constraint in pod.topology_spread_constraints.iter().filter(|c| c.is_hard()) {
                state.ensure_group(&pod.namespace, constraint);
            }
        }
        Self {
            inner: Mutex::new(state),
        }
    }

    /// Make `value` a known domain of `key`. Repeat registration is a no-op.
    pub fn register(&self, key: &str, value: &str) {
        let mut state = self.inner.lock();
        state
            .domains
            .entry(key.to_string())
            .or_default()
            .insert(value.to_string());
    }

    /// Tighten `node_requirements` so that placing `pod` keeps every hard
    /// spread constraint within its max skew.
    ///
    /// Domains are eligible when registered and allowed by the pod's own
    /// requirements; the skew baseline is the lowest count among them, or
    /// zero for hostname spread.
    /// Does not change any counts.
    pub fn add_requirements(
        &self,
        pod_requirements: &Requirements,
        node_requirements: &Requirements,
        pod: &Pod,
    ) -> Result<Requirements, TopologyError> {
        self.inner.lock().spread(pod_requirements, node_requirements, pod)
    }

    /// Narrow every topology key that matters to `pod` to a single domain.
    ///
    /// That covers the keys of its own hard constraints and of every group
    /// whose selector matches it. A key still allowing several registered
    /// domains is settled on the least-populated one (ties go to the first
    /// by name). A node lives in exactly one domain, so its pods must too.
    pub fn pin(&self, requirements: &Requirements, pod: &Pod) -> Requirements {
        self.inner.lock().pin(requirements, pod)
    }

    /// [`Topology::add_requirements`] followed by [`Topology::pin`], under
    /// one lock so no placement can slip in between.
    pub fn tighten(
        &self,
        pod_requirements: &Requirements,
        node_requirements: &Requirements,
        pod: &Pod,
    ) -> Result<Requirements, TopologyError> {
        let state = self.inner.lock();
        let requirements = state.spread(pod_requirements, node_requirements, pod)?;
        Ok(state.pin(&requirements, pod))
    }

    /// Count `pod` in every group that selects it, in the domain its final
    /// `requirements` resolve to.
    ///
    /// A group is only counted when exactly one registered domain is
    /// allowed. Requirements left open on a key are not a placement there.
    pub fn record(&self, pod: &Pod, requirements: &Requirements) {
        let mut state = self.inner.lock();
        for constraint in pod.topology_spread_constraints.iter().filter(|c| c.is_hard()) {
            state.ensure_group(&pod.namespace, constraint);
        }

        let TopologyState { domains, groups } = &mut *state;
        for group in groups.iter_mut().filter(|g| g.selects(pod)) {
            let Some(registered) = domains.get(&group.key) else {
                continue;
            };
            let allowed = requirements.get(&group.key);
            let mut matching = registered.iter().filter(|d| allowed.has(d));

            match (matching.next(), matching.next()) {
                (Some(domain), None) => {
                    debug!(pod = %pod.key(), key = %group.key, %domain, "recorded placement");
                    *group.counts.entry(domain.clone()).or_default() += 1;
                }
                (Some(_), Some(_)) => debug!(pod = %pod.key(), key = %group.key, "domain unresolved, not counted"),
                (None, _) => debug!(pod = %pod.key(), key = %group.key, "placement outside known domains"),
            }
        }
    }

    /// Registered domains of `key`, sorted.
    pub fn domains(&self, key: &str) -> Vec<String> {
        let state = self.inner.lock();
        state
            .domains
            .get(key)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Per-domain pod counts of the group for `constraint` in `namespace`.
    ///
    /// Every registered domain of the key is listed, including empty ones.
    pub fn spread_counts(&self, namespace: &str, constraint: &TopologySpreadConstraint) -> BTreeMap<String, u32> {
        let state = self.inner.lock();
        let group = state.group(namespace, constraint);
        state
            .domains
            .get(&constraint.topology_key)
            .into_iter()
            .flatten()
            .map(|d| (d.clone(), group.map_or(0, |g| g.count(d))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podpack_api::labels::LABEL_ZONE;

    fn zone_spread() -> TopologySpreadConstraint {
        TopologySpreadConstraint::new(LABEL_ZONE, 1, LabelSelector::default().with_label("app", "web"))
    }

    fn web(name: &str) -> Pod {
        Pod::new(name).with_label("app", "web").with_spread(zone_spread())
    }

    fn zoned(zones: &[&str]) -> Requirements {
        Requirements::new().add([NodeSelectorRequirement::in_values(LABEL_ZONE, zones.iter().copied())])
    }

    fn topology_with_zones(pods: &[Pod]) -> Topology {
        let topology = Topology::new(pods);
        for zone in ["z1", "z2", "z3"] {
            topology.register(LABEL_ZONE, zone);
        }
        topology
    }

    #[test]
    fn register_is_idempotent() {
        let topology = Topology::default();
        topology.register(LABEL_HOSTNAME, "a");
        topology.register(LABEL_HOSTNAME, "a");
        topology.register(LABEL_HOSTNAME, "b");
        assert_eq!(topology.domains(LABEL_HOSTNAME), vec!["a", "b"]);
    }

    #[test]
    fn pods_without_spread_are_untouched() {
        let topology = Topology::default();
        let node = zoned(&["z1", "z2"]);
        let out = topology.add_requirements(&Requirements::new(), &node, &Pod::new("p")).unwrap();
        assert_eq!(out, node);
    }

    #[test]
    fn empty_tracker_allows_every_domain() {
        let pods = vec![web("a")];
        let topology = topology_with_zones(&pods);

        let out = topology
            .add_requirements(&Requirements::new(), &Requirements::new(), &pods[0])
            .unwrap();
        assert_eq!(out.get(LABEL_ZONE).len(), Some(3));
    }

    #[test]
    fn full_domain_is_excluded() {
        let pods = vec![web("a"), web("b")];
        let topology = topology_with_zones(&pods);
        topology.record(&pods[0], &zoned(&["z1"]));

        let out = topology
            .add_requirements(&Requirements::new(), &Requirements::new(), &pods[1])
            .unwrap();
        let zone = out.get(LABEL_ZONE);
        assert!(!zone.has("z1"));
        assert!(zone.has("z2"));
        assert!(zone.has("z3"));
    }

    #[test]
    fn add_requirements_does_not_count() {
        let pods = vec![web("a")];
        let topology = topology_with_zones(&pods);
        topology
            .add_requirements(&Requirements::new(), &zoned(&["z1"]), &pods[0])
            .unwrap();
        assert!(topology.spread_counts("default", &zone_spread()).values().all(|c| *c == 0));
    }

    #[test]
    fn node_pinned_to_full_domain_is_unsatisfiable() {
        let pods = vec![web("a"), web("b")];
        let topology = topology_with_zones(&pods);
        topology.record(&pods[0], &zoned(&["z1"]));

        let err = topology
            .add_requirements(&Requirements::new(), &zoned(&["z1"]), &pods[1])
            .unwrap_err();
        assert_eq!(
            err,
            TopologyError::Unsatisfiable {
                key: LABEL_ZONE.to_string(),
                max_skew: 1,
                counts: "z1=1, z2=0, z3=0".to_string(),
            }
        );
    }

    #[test]
    fn pod_requirements_limit_the_skew_baseline() {
        // Only z1 and z2 are eligible for the pod, so the empty z3 does not
        // hold the baseline at zero.
        let pods = vec![web("a"), web("b"), web("c")];
        let topology = topology_with_zones(&pods);
        topology.record(&pods[0], &zoned(&["z1"]));
        topology.record(&pods[1], &zoned(&["z2"]));

        let pod_reqs = zoned(&["z1", "z2"]);
        let out = topology
            .add_requirements(&pod_reqs, &pod_reqs, &pods[2])
            .unwrap();
        assert_eq!(out.get(LABEL_ZONE).len(), Some(2));
    }

    #[test]
    fn missing_domains_is_an_error() {
        let pods = vec![web("a")];
        let topology = Topology::new(&pods);
        let err = topology
            .add_requirements(&Requirements::new(), &Requirements::new(), &pods[0])
            .unwrap_err();
        assert_eq!(err, TopologyError::NoDomains { key: LABEL_ZONE.to_string() });
    }

    #[test]
    fn soft_constraints_are_ignored() {
        let mut spread = zone_spread();
        spread.when_unsatisfiable = podpack_api::WhenUnsatisfiable::ScheduleAnyway;
        let pod = Pod::new("a").with_label("app", "web").with_spread(spread);
        let topology = Topology::new([&pod]);

        // No zones registered, yet no error.
        assert!(topology
            .add_requirements(&Requirements::new(), &Requirements::new(), &pod)
            .is_ok());
    }

    #[test]
    fn record_counts_matching_pods_only() {
        let pods = vec![web("a")];
        let topology = topology_with_zones(&pods);

        topology.record(&Pod::new("other").with_label("app", "db"), &zoned(&["z1"]));
        topology.record(&Pod::new("plain").with_label("app", "web"), &zoned(&["z2"]));

        let counts = topology.spread_counts("default", &zone_spread());
        assert_eq!(counts.get("z1"), Some(&0));
        // Selected by label even without declaring the constraint.
        assert_eq!(counts.get("z2"), Some(&1));
    }

    #[test]
    fn record_is_namespace_scoped() {
        let pods = vec![web("a")];
        let topology = topology_with_zones(&pods);
        let mut foreign = web("b");
        foreign.namespace = "other".to_string();

        topology.record(&foreign, &zoned(&["z1"]));

        assert_eq!(topology.spread_counts("default", &zone_spread()).get("z1"), Some(&0));
        assert_eq!(topology.spread_counts("other", &zone_spread()).get("z1"), Some(&1));
    }

    #[test]
    fn record_with_open_domain_counts_nothing() {
        let pods = vec![web("a"), web("b")];
        let topology = topology_with_zones(&pods);
        topology.record(&pods[0], &zoned(&["z1"]));

        topology.record(&pods[1], &zoned(&["z1", "z2", "z3"]));

        let counts = topology.spread_counts("default", &zone_spread());
        assert_eq!(counts.values().sum::<u32>(), 1);
        assert_eq!(counts.get("z1"), Some(&1));
    }

    #[test]
    fn hostname_spread_excludes_busy_hosts() {
        let spread = TopologySpreadConstraint::new(LABEL_HOSTNAME, 1, LabelSelector::default().with_label("app", "web"));
        let a = Pod::new("a").with_label("app", "web").with_spread(spread.clone());
        let b = Pod::new("b").with_label("app", "web").with_spread(spread);
        let topology = Topology::new([&a, &b]);
        topology.register(LABEL_HOSTNAME, "host-1");
        topology.register(LABEL_HOSTNAME, "host-2");

        let host1 = Requirements::new().add([NodeSelectorRequirement::in_values(LABEL_HOSTNAME, ["host-1"])]);
        topology.record(&a, &host1);

        assert!(topology.add_requirements(&Requirements::new(), &host1, &b).is_err());
        let host2 = Requirements::new().add([NodeSelectorRequirement::in_values(LABEL_HOSTNAME, ["host-2"])]);
        assert!(topology.add_requirements(&Requirements::new(), &host2, &b).is_ok());
    }

    #[test]
    fn pin_picks_least_populated_domain() {
        let pods = vec![web("a"), web("b")];
        let topology = topology_with_zones(&pods);
        topology.record(&pods[0], &zoned(&["z1"]));

        let pinned = topology.pin(&zoned(&["z1", "z2", "z3"]), &pods[1]);
        assert_eq!(pinned.get(LABEL_ZONE).single_value(), Some("z2"));
    }

    #[test]
    fn pin_settles_pods_selected_without_a_constraint() {
        // "plain" declares no spread but is counted by the web group, so the
        // node taking it must commit to a zone.
        let pods = vec![web("a")];
        let topology = topology_with_zones(&pods);
        topology.record(&pods[0], &zoned(&["z1"]));
        let plain = Pod::new("plain").with_label("app", "web");

        let pinned = topology.pin(&zoned(&["z1", "z2", "z3"]), &plain);
        assert_eq!(pinned.get(LABEL_ZONE).single_value(), Some("z2"));

        topology.record(&plain, &pinned);
        let counts = topology.spread_counts("default", &zone_spread());
        assert_eq!(counts.get("z2"), Some(&1));
    }

    #[test]
    fn tighten_spreads_then_pins() {
        let pods = vec![web("a"), web("b")];
        let topology = topology_with_zones(&pods);
        topology.record(&pods[0], &zoned(&["z1"]));

        let out = topology
            .tighten(&Requirements::new(), &Requirements::new(), &pods[1])
            .unwrap();
        assert_eq!(out.get(LABEL_ZONE).single_value(), Some("z2"));
        assert!(topology
            .tighten(&Requirements::new(), &zoned(&["z1"]), &pods[1])
            .is_err());
    }

    #[test]
    fn pin_leaves_unconstrained_pods_alone() {
        let topology = topology_with_zones(&[]);
        let open = zoned(&["z1", "z2"]);
        assert_eq!(topology.pin(&open, &Pod::new("plain")), open);
    }
}
