//! Tier identities and single-tier pool specifications.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pool::unit::ResourceUnit;

/// Identifies a storage tier. Unique key into a `ResourcePools` mapping.
///
/// Tiers are ordered fastest first by [`ResourceType::rank`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// In-process object storage (fastest).
    Heap,
    /// Byte-addressed in-memory storage, values held serialized.
    #[serde(alias = "off_heap")]
    OffHeap,
    /// File-backed storage (slowest, may be persistent).
    Disk,
    /// User-defined tier, held serialized in memory.
    Custom { name: String, rank: u8 },
}

/// How a tier holds its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Values kept as live objects.
    Objects,
    /// Values kept as encoded bytes in memory.
    Serialized,
    /// Values kept as encoded bytes in files.
    Files,
}

impl ResourceType {
    /// Position in the tier hierarchy (lower = faster).
    pub fn rank(&self) -> u8 {
        match self {
            ResourceType::Heap => 0,
            ResourceType::OffHeap => 50,
            ResourceType::Disk => 200,
            ResourceType::Custom { rank, .. } => *rank,
        }
    }

    fn kind_index(&self) -> u8 {
        match self {
            ResourceType::Heap => 0,
            ResourceType::OffHeap => 1,
            ResourceType::Disk => 2,
            ResourceType::Custom { .. } => 3,
        }
    }

    /// Whether the tier can account capacity in the given unit.
    pub fn accepts_unit(&self, unit: &ResourceUnit) -> bool {
        match self {
            ResourceType::Heap | ResourceType::Custom { .. } => true,
            ResourceType::OffHeap | ResourceType::Disk => unit.is_memory(),
        }
    }

    /// Whether the tier can survive a process restart.
    pub fn is_persistable(&self) -> bool {
        matches!(self, ResourceType::Disk)
    }

    pub fn storage_mode(&self) -> StorageMode {
        match self {
            ResourceType::Heap => StorageMode::Objects,
            ResourceType::OffHeap | ResourceType::Custom { .. } => StorageMode::Serialized,
            ResourceType::Disk => StorageMode::Files,
        }
    }

    /// Label used in logs and metrics.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl Ord for ResourceType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.kind_index().cmp(&other.kind_index()))
            .then_with(|| match (self, other) {
                (ResourceType::Custom { name: a, .. }, ResourceType::Custom { name: b, .. }) => {
                    a.cmp(b)
                }
                _ => Ordering::Equal,
            })
    }
}

impl PartialOrd for ResourceType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Heap => write!(f, "heap"),
            ResourceType::OffHeap => write!(f, "offheap"),
            ResourceType::Disk => write!(f, "disk"),
            ResourceType::Custom { name, .. } => write!(f, "custom:{name}"),
        }
    }
}

/// Capacity specification for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourcePool {
    #[serde(rename = "tier")]
    resource_type: ResourceType,
    size: u64,
    unit: ResourceUnit,
    #[serde(default)]
    persistent: bool,
}

impl ResourcePool {
    /// Create an unvalidated pool. Validation happens when pools are built.
    pub fn new(resource_type: ResourceType, size: u64, unit: ResourceUnit, persistent: bool) -> Self {
        Self {
            resource_type,
            size,
            unit,
            persistent,
        }
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    /// Magnitude in the pool's unit.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn unit(&self) -> ResourceUnit {
        self.unit
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Capacity in entries or bytes. `None` if the byte count overflows.
    pub fn capacity(&self) -> Option<u64> {
        self.unit.capacity(self.size)
    }
}

impl fmt::Display for ResourcePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} {}", self.resource_type, self.size, self.unit)?;
        if self.persistent {
            write!(f, " (persistent)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::unit::MemoryUnit;

    #[test]
    fn test_tier_ordering() {
        let custom = ResourceType::Custom {
            name: "ssd".into(),
            rank: 120,
        };
        let mut types = vec![ResourceType::Disk, custom.clone(), ResourceType::Heap, ResourceType::OffHeap];
        types.sort();
        assert_eq!(
            types,
            vec![ResourceType::Heap, ResourceType::OffHeap, custom, ResourceType::Disk]
        );
    }

    #[test]
    fn test_unit_compatibility() {
        let bytes = ResourceUnit::Memory(MemoryUnit::MB);
        assert!(ResourceType::Heap.accepts_unit(&ResourceUnit::Entries));
        assert!(ResourceType::Heap.accepts_unit(&bytes));
        assert!(!ResourceType::OffHeap.accepts_unit(&ResourceUnit::Entries));
        assert!(!ResourceType::Disk.accepts_unit(&ResourceUnit::Entries));
        assert!(ResourceType::Disk.accepts_unit(&bytes));
    }

    #[test]
    fn test_pool_capacity() {
        let pool = ResourcePool::new(ResourceType::OffHeap, 4, MemoryUnit::KB.into(), false);
        assert_eq!(pool.capacity(), Some(4096));
        assert_eq!(pool.to_string(), "offheap=4 KB");
    }
}
