//! Cloud provider seam and a static, config-backed implementation.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::{CloudProviderError, CloudProviderResult};
use crate::instance_type::{InstanceType, InstanceTypeSpec};

/// Source of the instance types a scheduling pass may choose from.
pub trait CloudProvider: Send + Sync {
    fn name(&self) -> &str;

    fn instance_types(&self) -> CloudProviderResult<Vec<Arc<dyn InstanceType>>>;
}

/// Serves a fixed list of instance types.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    instance_types: Vec<Arc<dyn InstanceType>>,
}

impl StaticCatalog {
    /// Validates that names are unique and every type has an offering.
    pub fn new(specs: Vec<InstanceTypeSpec>) -> CloudProviderResult<Self> {
        if specs.is_empty() {
            return Err(CloudProviderError::EmptyCatalog);
        }
        let mut seen = BTreeSet::new();
        for spec in &specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(CloudProviderError::DuplicateInstanceType(spec.name.clone()));
            }
            if spec.offerings.is_empty() {
                return Err(CloudProviderError::NoOfferings(spec.name.clone()));
            }
        }
        debug!(count = specs.len(), "static catalog loaded");
        Ok(Self {
            instance_types: specs
                .into_iter()
                .map(|s| Arc::new(s) as Arc<dyn InstanceType>)
                .collect(),
        })
    }
}

impl CloudProvider for StaticCatalog {
    fn name(&self) -> &str {
        "static"
    }

    fn instance_types(&self) -> CloudProviderResult<Vec<Arc<dyn InstanceType>>> {
        Ok(self.instance_types.clone())
    }
}
