//! Scenario file parser.
//!
//! A scenario lists the provisioners, the instance-type catalog and the
//! pending pods of one simulation:
//!
//! ```toml
//! [[provisioners]]
//! name = "default"
//! daemon_overhead = { cpu = "200m", memory = "256Mi" }
//!
//! [[instance_types]]
//! name = "m5.large"
//! offerings = [{ zone = "us-east-1a" }]
//! resources = { cpu = "2", memory = "8Gi", pods = "29" }
//!
//! [[pods]]
//! name = "web"
//! replicas = 3
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use podpack_api::{Pod, Provisioner, ResourceList};
use podpack_cloudprovider::{CloudProviderError, InstanceTypeSpec, StaticCatalog};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Catalog(#[from] CloudProviderError),

    #[error("scenario defines no provisioners")]
    NoProvisioners,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub provisioners: Vec<ProvisionerConfig>,
    pub instance_types: Vec<InstanceTypeSpec>,
    #[serde(default)]
    pub pods: Vec<PodTemplate>,
}

/// A provisioner plus the resources its daemons reserve on every node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    #[serde(flatten)]
    pub provisioner: Provisioner,
    #[serde(default)]
    pub daemon_overhead: ResourceList,
}

/// A pod stamped out `replicas` times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodTemplate {
    #[serde(flatten)]
    pub pod: Pod,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
}

fn default_replicas() -> u32 {
    1
}

impl PodTemplate {
    /// One pod per replica; names get a `-N` suffix when there is more
    /// than one.
    pub fn expand(&self) -> Vec<Pod> {
        if self.replicas == 1 {
            return vec![self.pod.clone()];
        }
        (0..self.replicas)
            .map(|i| {
                let mut pod = self.pod.clone();
                pod.name = format!("{}-{i}", self.pod.name);
                pod
            })
            .collect()
    }
}

impl ScenarioConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Every pending pod, replicas expanded, in file order.
    pub fn pods(&self) -> Vec<Pod> {
        self.pods.iter().flat_map(PodTemplate::expand).collect()
    }

    pub fn catalog(&self) -> Result<StaticCatalog, ConfigError> {
        Ok(StaticCatalog::new(self.instance_types.clone())?)
    }

    pub fn provisioners(&self) -> Vec<Provisioner> {
        self.provisioners.iter().map(|p| p.provisioner.clone()).collect()
    }
}

impl std::str::FromStr for ScenarioConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: ScenarioConfig = toml::from_str(s)?;
        if config.provisioners.is_empty() {
            return Err(ConfigError::NoProvisioners);
        }
        Ok(config)
    }
}
