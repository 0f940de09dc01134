//! Error types for the podpack API crate.

use thiserror::Error;

use crate::taints::Taint;

/// A quantity string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("invalid quantity {0:?}")]
    Invalid(String),

    #[error("unknown quantity suffix {suffix:?} in {input:?}")]
    UnknownSuffix { input: String, suffix: String },

    #[error("quantity {0:?} out of range")]
    Overflow(String),
}

/// A pod does not tolerate one of the node's taints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TolerationError {
    #[error("did not tolerate taint {taint}")]
    Untolerated { taint: Taint },
}

/// Two requirement sets cannot hold at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementsError {
    #[error("key {key}, {incoming} not compatible with {existing}")]
    Incompatible {
        key: String,
        existing: String,
        incoming: String,
    },
}
