//! Node-selector requirement algebra.
//!
//! A [`Requirements`] maps each label key to a canonical [`Requirement`]:
//! the values the label may take plus whether the label may be missing.
//! Adding requirements only ever intersects, so a set can become more
//! specific but never looser.
//!
//! | operator       | allowed values        | label may be absent |
//! |----------------|-----------------------|---------------------|
//! | `In [a b]`     | `{a, b}`              | no                  |
//! | `NotIn [a b]`  | everything but `a, b` | yes                 |
//! | `Exists`       | everything            | no                  |
//! | `DoesNotExist` | nothing               | yes                 |

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RequirementsError;
use crate::pod::Pod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// One `key <operator> values` term, as written in pod specs and config.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: NodeSelectorOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl NodeSelectorRequirement {
    pub fn new<I, S>(key: impl Into<String>, operator: NodeSelectorOperator, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `key In values`.
    pub fn in_values<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(key, NodeSelectorOperator::In, values)
    }
}

/// The allowed values of a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    values: BTreeSet<String>,
    /// When set, `values` lists the excluded values instead of the allowed ones.
    complement: bool,
    allow_absent: bool,
}

impl Requirement {
    /// No constraint on the key.
    pub fn any() -> Self {
        Self {
            values: BTreeSet::new(),
            complement: true,
            allow_absent: true,
        }
    }

    fn from_selector(req: &NodeSelectorRequirement) -> Self {
        let values: BTreeSet<String> = req.values.iter().cloned().collect();
        match req.operator {
            NodeSelectorOperator::In => Self {
                values,
                complement: false,
                allow_absent: false,
            },
            NodeSelectorOperator::NotIn => Self {
                values,
                complement: true,
                allow_absent: true,
            },
            NodeSelectorOperator::Exists => Self {
                values: BTreeSet::new(),
                complement: true,
                allow_absent: false,
            },
            NodeSelectorOperator::DoesNotExist => Self {
                values: BTreeSet::new(),
                complement: false,
                allow_absent: true,
            },
        }
    }

    /// Values allowed by both `self` and `other`.
    pub fn intersect(&self, other: &Requirement) -> Requirement {
        let (values, complement) = match (self.complement, other.complement) {
            (false, false) => (self.values.intersection(&other.values).cloned().collect(), false),
            (false, true) => (self.values.difference(&other.values).cloned().collect(), false),
            (true, false) => (other.values.difference(&self.values).cloned().collect(), false),
            (true, true) => (self.values.union(&other.values).cloned().collect(), true),
        };
        Requirement {
            values,
            complement,
            allow_absent: self.allow_absent && other.allow_absent,
        }
    }

    /// Whether a node labelled `key=value` satisfies this requirement.
    pub fn has(&self, value: &str) -> bool {
        self.values.contains(value) != self.complement
    }

    /// At least one labelling of a node satisfies this requirement.
    pub fn is_satisfiable(&self) -> bool {
        self.allow_absent || self.complement || !self.values.is_empty()
    }

    pub fn is_unconstrained(&self) -> bool {
        self.complement && self.allow_absent && self.values.is_empty()
    }

    pub fn allows_absent(&self) -> bool {
        self.allow_absent
    }

    /// Number of allowed values, or `None` when the allowed set is open-ended.
    pub fn len(&self) -> Option<usize> {
        (!self.complement).then_some(self.values.len())
    }

    /// The allowed values, when the allowed set is finite.
    pub fn allowed(&self) -> Option<impl Iterator<Item = &str>> {
        (!self.complement).then(|| self.values.iter().map(String::as_str))
    }

    /// The value this key is pinned to, if exactly one is allowed.
    pub fn single_value(&self) -> Option<&str> {
        match self.allowed() {
            Some(mut values) => match (values.next(), values.next()) {
                (Some(value), None) => Some(value),
                _ => None,
            },
            None => None,
        }
    }

    fn to_node_selector(&self, key: &str) -> Vec<NodeSelectorRequirement> {
        let values: Vec<String> = self.values.iter().cloned().collect();
        match (self.complement, self.values.is_empty(), self.allow_absent) {
            (true, true, true) => Vec::new(),
            (true, true, false) => vec![NodeSelectorRequirement::new(
                key,
                NodeSelectorOperator::Exists,
                Vec::<String>::new(),
            )],
            (true, false, true) => vec![NodeSelectorRequirement::new(key, NodeSelectorOperator::NotIn, values)],
            (true, false, false) => vec![
                NodeSelectorRequirement::new(key, NodeSelectorOperator::Exists, Vec::<String>::new()),
                NodeSelectorRequirement::new(key, NodeSelectorOperator::NotIn, values),
            ],
            (false, true, true) => vec![NodeSelectorRequirement::new(
                key,
                NodeSelectorOperator::DoesNotExist,
                Vec::<String>::new(),
            )],
            (false, _, _) => vec![NodeSelectorRequirement::new(key, NodeSelectorOperator::In, values)],
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
        match (self.complement, self.values.is_empty(), self.allow_absent) {
            (true, true, true) => f.write_str("Any"),
            (true, true, false) => f.write_str("Exists"),
            (true, false, true) => write!(f, "NotIn [{values}]"),
            (true, false, false) => write!(f, "Exists NotIn [{values}]"),
            (false, true, true) => f.write_str("DoesNotExist"),
            (false, _, _) => write!(f, "In [{values}]"),
        }
    }
}

/// A set of per-key requirements that must all hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<NodeSelectorRequirement>", into = "Vec<NodeSelectorRequirement>")]
pub struct Requirements {
    requirements: BTreeMap<String, Requirement>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new set with `reqs` intersected in.
    pub fn add(&self, reqs: impl IntoIterator<Item = NodeSelectorRequirement>) -> Requirements {
        let mut out = self.clone();
        for req in reqs {
            out.tighten(&req.key, &Requirement::from_selector(&req));
        }
        out
    }

    /// A new set with every key of `other` intersected in.
    pub fn add_requirements(&self, other: &Requirements) -> Requirements {
        let mut out = self.clone();
        for (key, requirement) in &other.requirements {
            out.tighten(key, requirement);
        }
        out
    }

    fn tighten(&mut self, key: &str, requirement: &Requirement) {
        let merged = match self.requirements.get(key) {
            Some(existing) => existing.intersect(requirement),
            None => requirement.clone(),
        };
        if merged.is_unconstrained() {
            self.requirements.remove(key);
        } else {
            self.requirements.insert(key.to_string(), merged);
        }
    }

    /// Fails if some key admits no value under both sets.
    pub fn compatible(&self, other: &Requirements) -> Result<(), RequirementsError> {
        let keys: BTreeSet<&str> = self.keys().chain(other.keys()).collect();
        for key in keys {
            let existing = self.get(key);
            let incoming = other.get(key);
            if !existing.intersect(&incoming).is_satisfiable() {
                return Err(RequirementsError::Incompatible {
                    key: key.to_string(),
                    existing: existing.to_string(),
                    incoming: incoming.to_string(),
                });
            }
        }
        Ok(())
    }

    /// The requirements a pod places on its node.
    ///
    /// Node selector entries become `In` terms. Of the required node
    /// affinity terms (which are OR'ed), only the first is used.
    pub fn from_pod(pod: &Pod) -> Requirements {
        let selector = pod
            .node_selector
            .iter()
            .map(|(k, v)| NodeSelectorRequirement::in_values(k.clone(), [v.clone()]));
        let affinity = pod
            .affinity
            .as_ref()
            .and_then(|a| a.required.first())
            .map(|term| term.match_expressions.clone())
            .unwrap_or_default();
        Requirements::new().add(selector.chain(affinity))
    }

    /// The requirement on `key`; unconstrained if none was added.
    pub fn get(&self, key: &str) -> Requirement {
        self.requirements
            .get(key)
            .cloned()
            .unwrap_or_else(Requirement::any)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.requirements.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Requirement)> {
        self.requirements.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Keys pinned to exactly one value; these become node labels.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.requirements
            .iter()
            .filter_map(|(k, r)| r.single_value().map(|v| (k.clone(), v.to_string())))
            .collect()
    }

    pub fn to_node_selector_requirements(&self) -> Vec<NodeSelectorRequirement> {
        self.requirements
            .iter()
            .flat_map(|(k, r)| r.to_node_selector(k))
            .collect()
    }
}

impl From<Vec<NodeSelectorRequirement>> for Requirements {
    fn from(reqs: Vec<NodeSelectorRequirement>) -> Self {
        Requirements::new().add(reqs)
    }
}

impl From<Requirements> for Vec<NodeSelectorRequirement> {
    fn from(reqs: Requirements) -> Self {
        reqs.to_node_selector_requirements()
    }
}

impl FromIterator<NodeSelectorRequirement> for Requirements {
    fn from_iter<I: IntoIterator<Item = NodeSelectorRequirement>>(iter: I) -> Self {
        Requirements::new().add(iter)
    }
}

/// Renders as `key In [a b], other Exists`; an empty set renders `{}`.
impl fmt::Display for Requirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.requirements.is_empty() {
            return f.write_str("{}");
        }
        for (i, (key, requirement)) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key} {requirement}")?;
        }
        Ok(())
    }
}
