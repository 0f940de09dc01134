//! Scheduling error types.
//!
//! Every variant is an ordinary admission rejection. Callers decide
//! whether to retry the pod elsewhere.

use thiserror::Error;

use podpack_api::{Requirements, RequirementsError, ResourceList, TolerationError};

/// No domain assignment satisfies a pod's topology spread.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("no domains registered for topology key {key}")]
    NoDomains { key: String },

    #[error("no domain of {key} satisfies max skew {max_skew} (counts {counts})")]
    Unsatisfiable {
        key: String,
        max_skew: u32,
        counts: String,
    },
}

/// Why a pod could not be admitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulingError {
    #[error(transparent)]
    Toleration(#[from] TolerationError),

    #[error(transparent)]
    Requirements(#[from] RequirementsError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("no instance type satisfied resources {resources} and requirements {requirements}")]
    NoInstanceType {
        resources: ResourceList,
        requirements: Requirements,
    },

    #[error("no provisioner admits pod {0}")]
    NoProvisioner(String),
}

pub type SchedulingResult<T> = Result<T, SchedulingError>;
