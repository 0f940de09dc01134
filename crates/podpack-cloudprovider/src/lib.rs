//! podpack-cloudprovider — the instance-type catalog.
//!
//! Describes the machine shapes a candidate node may become and narrows
//! them against a requirement set and a resource total. Launching
//! machines is not part of this crate.

pub mod error;
pub mod instance_type;
pub mod provider;

pub use error::{CloudProviderError, CloudProviderResult};
pub use instance_type::{
    CAPACITY_TYPE_ON_DEMAND, CAPACITY_TYPE_SPOT, InstanceType, InstanceTypeSpec, Offering,
    filter_instance_types, zones,
};
pub use provider::{CloudProvider, StaticCatalog};
