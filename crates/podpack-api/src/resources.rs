//! Resource quantities and resource lists.
//!
//! A [`Quantity`] is a fixed-point value stored in milli-units, so `"500m"`
//! of CPU and `"2Gi"` of memory live in the same representation. A
//! [`ResourceList`] maps resource names to quantities; [`merge`] and
//! [`requests_for_pods`] build the running totals a candidate node carries.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QuantityError;
use crate::pod::Pod;

pub const CPU: &str = "cpu";
pub const MEMORY: &str = "memory";
pub const PODS: &str = "pods";
pub const EPHEMERAL_STORAGE: &str = "ephemeral-storage";
pub const NVIDIA_GPU: &str = "nvidia.com/gpu";

/// Suffix multipliers, expressed in milli-units.
const SUFFIXES: &[(&str, i128)] = &[
    ("", 1_000),
    ("m", 1),
    ("k", 1_000 * 1_000),
    ("M", 1_000 * 1_000_000),
    ("G", 1_000 * 1_000_000_000),
    ("T", 1_000 * 1_000_000_000_000),
    ("P", 1_000 * 1_000_000_000_000_000),
    ("E", 1_000 * 1_000_000_000_000_000_000),
    ("Ki", 1_000 * (1 << 10)),
    ("Mi", 1_000 * (1 << 20)),
    ("Gi", 1_000 * (1 << 30)),
    ("Ti", 1_000 * (1 << 40)),
    ("Pi", 1_000 * (1 << 50)),
    ("Ei", 1_000 * (1 << 60)),
];

/// Binary units used when rendering, largest first.
const DISPLAY_UNITS: &[(&str, i64)] = &[
    ("Pi", 1 << 50),
    ("Ti", 1 << 40),
    ("Gi", 1 << 30),
    ("Mi", 1 << 20),
];

/// A resource amount in milli-units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "QuantityRepr", into = "String")]
pub struct Quantity {
    millis: i64,
}

impl Quantity {
    pub const ZERO: Quantity = Quantity { millis: 0 };

    pub const fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    /// Whole units, e.g. `from_units(4)` is four CPUs.
    pub const fn from_units(units: i64) -> Self {
        Self {
            millis: units.saturating_mul(1000),
        }
    }

    pub const fn millis(&self) -> i64 {
        self.millis
    }

    pub const fn is_zero(&self) -> bool {
        self.millis == 0
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(trimmed.len());
        let (number, suffix) = trimmed.split_at(split);

        let multiplier = SUFFIXES
            .iter()
            .find(|(s, _)| *s == suffix)
            .map(|(_, m)| *m)
            .ok_or_else(|| QuantityError::UnknownSuffix {
                input: input.to_string(),
                suffix: suffix.to_string(),
            })?;

        let (negative, digits) = match number.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, number.strip_prefix('+').unwrap_or(number)),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
            return Err(QuantityError::Invalid(input.to_string()));
        }

        let overflow = || QuantityError::Overflow(input.to_string());
        let scale = u32::try_from(fraction.len())
            .ok()
            .and_then(|len| 10i128.checked_pow(len))
            .ok_or_else(overflow)?;
        let mantissa = format!("{whole}{fraction}")
            .parse::<i128>()
            .map_err(|_| overflow())?;
        let scaled = mantissa.checked_mul(multiplier).ok_or_else(overflow)?;
        // Sub-milli precision rounds up, matching how requests are treated.
        let magnitude = scaled.checked_add(scale - 1).ok_or_else(overflow)? / scale;
        let signed = if negative { -magnitude } else { magnitude };
        let millis = i64::try_from(signed).map_err(|_| overflow())?;
        Ok(Self { millis })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis % 1000 != 0 {
            return write!(f, "{}m", self.millis);
        }
        let units = self.millis / 1000;
        if units != 0 {
            for (suffix, unit) in DISPLAY_UNITS {
                if units % unit == 0 {
                    return write!(f, "{}{suffix}", units / unit);
                }
            }
        }
        write!(f, "{units}")
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity {
            millis: self.millis.saturating_add(rhs.millis),
        }
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        *self = *self + rhs;
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Quantity {
        iter.fold(Quantity::ZERO, Add::add)
    }
}

impl From<Quantity> for String {
    fn from(q: Quantity) -> String {
        q.to_string()
    }
}

/// Accepted serialized forms: `"2Gi"`, `4`, `0.5`.
#[derive(Deserialize)]
#[serde(untagged)]
enum QuantityRepr {
    Int(i64),
    Float(f64),
    Text(String),
}

impl TryFrom<QuantityRepr> for Quantity {
    type Error = QuantityError;

    fn try_from(repr: QuantityRepr) -> Result<Self, Self::Error> {
        match repr {
            QuantityRepr::Int(units) => units
                .checked_mul(1000)
                .map(Quantity::from_millis)
                .ok_or_else(|| QuantityError::Overflow(units.to_string())),
            QuantityRepr::Float(value) => value.to_string().parse(),
            QuantityRepr::Text(text) => text.parse(),
        }
    }
}

// ── ResourceList ───────────────────────────────────────────────────

/// Resource name → quantity, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceList(BTreeMap<String, Quantity>);

impl ResourceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from `(name, quantity-string)` pairs.
    pub fn parse(pairs: &[(&str, &str)]) -> Result<Self, QuantityError> {
        pairs
            .iter()
            .map(|(name, value)| value.parse::<Quantity>().map(|q| (name.to_string(), q)))
            .collect()
    }

    /// Quantity for `name`; an absent resource counts as zero.
    pub fn get(&self, name: &str) -> Quantity {
        self.0.get(name).copied().unwrap_or_default()
    }

    pub fn insert(&mut self, name: impl Into<String>, quantity: Quantity) {
        self.0.insert(name.into(), quantity);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Quantity)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(String, Quantity)> for ResourceList {
    fn from_iter<I: IntoIterator<Item = (String, Quantity)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Concise JSON-style rendering, e.g. `{"cpu":"9","memory":"1Gi"}`.
impl fmt::Display for ResourceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: BTreeMap<&str, String> =
            self.0.iter().map(|(k, v)| (k.as_str(), v.to_string())).collect();
        let text = serde_json::to_string(&rendered).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// Sum every list, name by name.
pub fn merge<'a>(lists: impl IntoIterator<Item = &'a ResourceList>) -> ResourceList {
    let mut total = ResourceList::new();
    for list in lists {
        for (name, quantity) in list.iter() {
            *total.0.entry(name.to_string()).or_default() += quantity;
        }
    }
    total
}

/// Total requests of a batch of pods.
pub fn requests_for_pods<'a>(pods: impl IntoIterator<Item = &'a Pod>) -> ResourceList {
    let per_pod: Vec<ResourceList> = pods.into_iter().map(pod_requests).collect();
    merge(&per_pod)
}

/// Effective request of one pod.
///
/// Init containers run one at a time before the app containers, so each
/// resource takes the larger of the app-container sum and the largest
/// single init container. Pod overhead is added on top.
fn pod_requests(pod: &Pod) -> ResourceList {
    let mut requests = merge(pod.containers.iter().map(|c| &c.requests));
    for init in &pod.init_containers {
        for (name, quantity) in init.requests.iter() {
            let entry = requests.0.entry(name.to_string()).or_default();
            if quantity > *entry {
                *entry = quantity;
            }
        }
    }
    merge([&requests, &pod.overhead])
}

/// True if every quantity in `candidate` is covered by `total`.
pub fn fits(candidate: &ResourceList, total: &ResourceList) -> bool {
    candidate
        .iter()
        .all(|(name, quantity)| quantity <= total.get(name))
}
