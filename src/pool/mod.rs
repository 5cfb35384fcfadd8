//! Resource pool configuration.
//!
//! - [`unit`]: ResourceUnit and MemoryUnit (entry count vs bytes)
//! - [`resource`]: ResourceType tier identities and the single-tier ResourcePool
//! - [`builder`]: immutable ResourcePoolsBuilder and the validated ResourcePools

pub mod builder;
pub mod resource;
pub mod unit;

pub use builder::{ConfigError, ResourcePools, ResourcePoolsBuilder};
pub use resource::{ResourcePool, ResourceType, StorageMode};
pub use unit::{MemoryUnit, ResourceUnit};
