//! Cloud provider error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudProviderError {
    #[error("instance catalog is empty")]
    EmptyCatalog,

    #[error("duplicate instance type: {0}")]
    DuplicateInstanceType(String),

    #[error("instance type {0} has no offerings")]
    NoOfferings(String),
}

pub type CloudProviderResult<T> = Result<T, CloudProviderError>;
