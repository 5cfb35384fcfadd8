//! Immutable resource pool configuration.
//!
//! [`ResourcePoolsBuilder`] is copy-on-write: every `with*` call returns a new
//! builder holding the receiver's pools plus one added or replaced pool. The
//! receiver is never altered, so a base builder can be shared and derived from
//! concurrently. Validation is deferred to [`ResourcePoolsBuilder::build`].

use std::collections::BTreeMap;

use thiserror::Error;

use crate::pool::resource::{ResourcePool, ResourceType};
use crate::pool::unit::{MemoryUnit, ResourceUnit};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No resource pools configured: a cache needs at least one tier")]
    NoTiers,

    #[error("Pool size for tier {0} must be positive")]
    ZeroSize(ResourceType),

    #[error("Tier {tier} cannot be sized in {unit}")]
    IncompatibleUnit { tier: ResourceType, unit: ResourceUnit },

    #[error("Tier {0} cannot be persistent")]
    NotPersistable(ResourceType),

    #[error("Pool size for tier {0} overflows a byte count")]
    CapacityOverflow(ResourceType),

    #[error("Tier {faster} ({faster_bytes} bytes) must be smaller than slower tier {slower} ({slower_bytes} bytes)")]
    TierSizing {
        faster: ResourceType,
        faster_bytes: u64,
        slower: ResourceType,
        slower_bytes: u64,
    },

    #[error("Tier {0} needs a storage directory but none was configured")]
    MissingStoragePath(ResourceType),
}

/// Validated set of pools, at most one per tier. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePools {
    pools: BTreeMap<ResourceType, ResourcePool>,
}

impl ResourcePools {
    /// Pool configured for the given tier, if any.
    pub fn pool_for(&self, resource_type: &ResourceType) -> Option<&ResourcePool> {
        self.pools.get(resource_type)
    }

    /// Configured tier identities, fastest first.
    pub fn resource_types(&self) -> impl Iterator<Item = &ResourceType> {
        self.pools.keys()
    }

    /// Configured pools, fastest first.
    pub fn tiers(&self) -> impl Iterator<Item = &ResourcePool> {
        self.pools.values()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Whether any configured pool demands durable storage.
    pub fn has_persistent_tier(&self) -> bool {
        self.pools.values().any(|p| p.is_persistent())
    }

    fn validate(pools: &BTreeMap<ResourceType, ResourcePool>) -> Result<(), ConfigError> {
        if pools.is_empty() {
            return Err(ConfigError::NoTiers);
        }

        for pool in pools.values() {
            let tier = pool.resource_type();
            if pool.size() == 0 {
                return Err(ConfigError::ZeroSize(tier.clone()));
            }
            if !tier.accepts_unit(&pool.unit()) {
                return Err(ConfigError::IncompatibleUnit {
                    tier: tier.clone(),
                    unit: pool.unit(),
                });
            }
            if pool.is_persistent() && !tier.is_persistable() {
                return Err(ConfigError::NotPersistable(tier.clone()));
            }
            if pool.capacity().is_none() {
                return Err(ConfigError::CapacityOverflow(tier.clone()));
            }
        }

        // Byte-sized tiers must grow strictly toward the slow end.
        let byte_tiers: Vec<(&ResourceType, u64)> = pools
            .values()
            .filter(|p| p.unit().is_memory())
            .filter_map(|p| p.capacity().map(|c| (p.resource_type(), c)))
            .collect();
        for pair in byte_tiers.windows(2) {
            let (faster, faster_bytes) = pair[0];
            let (slower, slower_bytes) = pair[1];
            if faster_bytes >= slower_bytes {
                return Err(ConfigError::TierSizing {
                    faster: faster.clone(),
                    faster_bytes,
                    slower: slower.clone(),
                    slower_bytes,
                });
            }
        }

        Ok(())
    }
}

/// Copy-on-write builder for [`ResourcePools`].
#[derive(Debug, Clone, Default)]
pub struct ResourcePoolsBuilder {
    pools: BTreeMap<ResourceType, ResourcePool>,
}

impl ResourcePoolsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a builder from an existing configuration.
    pub fn from_pools(pools: &ResourcePools) -> Self {
        Self {
            pools: pools.pools.clone(),
        }
    }

    /// Derive a builder with `resource_type` set to the given pool.
    /// A pool already present for that tier is replaced in the derived builder.
    pub fn with(
        &self,
        resource_type: ResourceType,
        size: u64,
        unit: impl Into<ResourceUnit>,
        persistent: bool,
    ) -> Self {
        let mut derived = self.clone();
        derived.pools.insert(
            resource_type.clone(),
            ResourcePool::new(resource_type, size, unit.into(), persistent),
        );
        derived
    }

    pub fn heap(&self, size: u64, unit: impl Into<ResourceUnit>) -> Self {
        self.with(ResourceType::Heap, size, unit, false)
    }

    pub fn offheap(&self, size: u64, unit: MemoryUnit) -> Self {
        self.with(ResourceType::OffHeap, size, unit, false)
    }

    pub fn disk(&self, size: u64, unit: impl Into<ResourceUnit>) -> Self {
        self.disk_persistent(size, unit, false)
    }

    pub fn disk_persistent(&self, size: u64, unit: impl Into<ResourceUnit>, persistent: bool) -> Self {
        self.with(ResourceType::Disk, size, unit, persistent)
    }

    /// Pools accumulated so far, fastest first.
    pub fn pools(&self) -> impl Iterator<Item = &ResourcePool> {
        self.pools.values()
    }

    pub fn build(&self) -> Result<ResourcePools, ConfigError> {
        ResourcePools::validate(&self.pools)?;
        Ok(ResourcePools {
            pools: self.pools.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_single_heap() {
        let pools = ResourcePoolsBuilder::new()
            .heap(1, ResourceUnit::Entries)
            .build()
            .unwrap();
        let heap = pools.pool_for(&ResourceType::Heap).unwrap();
        assert_eq!(heap.size(), 1);
        assert_eq!(heap.unit(), ResourceUnit::Entries);
        assert!(!heap.is_persistent());
        assert!(pools.pool_for(&ResourceType::Disk).is_none());
    }

    #[test]
    fn test_empty_builder_rejected() {
        assert_eq!(ResourcePoolsBuilder::new().build(), Err(ConfigError::NoTiers));
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = ResourcePoolsBuilder::new()
            .heap(0, ResourceUnit::Entries)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroSize(ResourceType::Heap));
    }

    #[test]
    fn test_incompatible_unit_rejected() {
        let err = ResourcePoolsBuilder::new()
            .with(ResourceType::OffHeap, 10, ResourceUnit::Entries, false)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::IncompatibleUnit { .. }));
    }

    #[test]
    fn test_persistent_heap_rejected() {
        let err = ResourcePoolsBuilder::new()
            .with(ResourceType::Heap, 10, ResourceUnit::Entries, true)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::NotPersistable(ResourceType::Heap));
    }

    #[test]
    fn test_tier_sizing_enforced() {
        let err = ResourcePoolsBuilder::new()
            .offheap(10, MemoryUnit::MB)
            .disk(5, MemoryUnit::MB)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::TierSizing { .. }));

        // Count-unit heap is not compared against byte tiers.
        ResourcePoolsBuilder::new()
            .heap(1_000_000, ResourceUnit::Entries)
            .offheap(1, MemoryUnit::MB)
            .build()
            .unwrap();
    }

    #[test]
    fn test_last_write_wins_per_tier() {
        let pools = ResourcePoolsBuilder::new()
            .heap(10, ResourceUnit::Entries)
            .heap(20, ResourceUnit::Entries)
            .build()
            .unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools.pool_for(&ResourceType::Heap).unwrap().size(), 20);
    }

    #[test]
    fn test_derive_from_built_pools() {
        let base = ResourcePoolsBuilder::new()
            .heap(10, ResourceUnit::Entries)
            .offheap(1, MemoryUnit::MB)
            .build()
            .unwrap();

        let derived = ResourcePoolsBuilder::from_pools(&base)
            .heap(50, ResourceUnit::Entries)
            .disk_persistent(10, MemoryUnit::MB, true)
            .build()
            .unwrap();

        assert_eq!(derived.pool_for(&ResourceType::Heap).unwrap().size(), 50);
        assert_eq!(
            derived.pool_for(&ResourceType::OffHeap),
            base.pool_for(&ResourceType::OffHeap)
        );
        assert!(derived.has_persistent_tier());

        // The source configuration is untouched.
        assert_eq!(base.len(), 2);
        assert_eq!(base.pool_for(&ResourceType::Heap).unwrap().size(), 10);
        assert!(base.pool_for(&ResourceType::Disk).is_none());
        assert!(!base.has_persistent_tier());
    }

    #[test]
    fn test_tiers_fastest_first() {
        let pools = ResourcePoolsBuilder::new()
            .disk(100, MemoryUnit::MB)
            .heap(10, ResourceUnit::Entries)
            .offheap(10, MemoryUnit::MB)
            .build()
            .unwrap();
        let order: Vec<_> = pools.resource_types().cloned().collect();
        assert_eq!(order, vec![ResourceType::Heap, ResourceType::OffHeap, ResourceType::Disk]);
    }
}
