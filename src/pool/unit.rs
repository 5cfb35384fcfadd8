//! Units of capacity measurement for resource pools.
//!
//! A pool is sized either by entry count or by bytes. The two families are
//! never converted into one another.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Byte-size scale for memory-bounded pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryUnit {
    B,
    KB,
    MB,
    GB,
    TB,
}

impl MemoryUnit {
    /// Number of bytes in one of this unit.
    pub fn multiplier(&self) -> u64 {
        match self {
            MemoryUnit::B => 1,
            MemoryUnit::KB => 1 << 10,
            MemoryUnit::MB => 1 << 20,
            MemoryUnit::GB => 1 << 30,
            MemoryUnit::TB => 1 << 40,
        }
    }

    /// Convert `size` of this unit to bytes, or `None` on overflow.
    pub fn to_bytes(&self, size: u64) -> Option<u64> {
        size.checked_mul(self.multiplier())
    }
}

impl fmt::Display for MemoryUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryUnit::B => "B",
            MemoryUnit::KB => "KB",
            MemoryUnit::MB => "MB",
            MemoryUnit::GB => "GB",
            MemoryUnit::TB => "TB",
        };
        f.write_str(s)
    }
}

/// How a pool's size is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceUnit {
    /// Capacity is a number of resident entries.
    Entries,
    /// Capacity is a number of bytes, scaled by the memory unit.
    Memory(MemoryUnit),
}

impl ResourceUnit {
    pub fn is_memory(&self) -> bool {
        matches!(self, ResourceUnit::Memory(_))
    }

    /// Capacity in the unit's base measure (entries or bytes).
    pub fn capacity(&self, size: u64) -> Option<u64> {
        match self {
            ResourceUnit::Entries => Some(size),
            ResourceUnit::Memory(unit) => unit.to_bytes(size),
        }
    }
}

impl From<MemoryUnit> for ResourceUnit {
    fn from(unit: MemoryUnit) -> Self {
        ResourceUnit::Memory(unit)
    }
}

impl fmt::Display for ResourceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceUnit::Entries => f.write_str("entries"),
            ResourceUnit::Memory(unit) => write!(f, "{unit}"),
        }
    }
}

/// Error returned when a unit string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource unit: {0:?}")]
pub struct UnknownUnit(pub String);

impl FromStr for ResourceUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.trim().to_ascii_lowercase().as_str() {
            "entries" | "entry" => ResourceUnit::Entries,
            "b" => MemoryUnit::B.into(),
            "kb" => MemoryUnit::KB.into(),
            "mb" => MemoryUnit::MB.into(),
            "gb" => MemoryUnit::GB.into(),
            "tb" => MemoryUnit::TB.into(),
            _ => return Err(UnknownUnit(s.to_string())),
        };
        Ok(unit)
    }
}

impl TryFrom<String> for ResourceUnit {
    type Error = UnknownUnit;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ResourceUnit> for String {
    fn from(unit: ResourceUnit) -> Self {
        unit.to_string()
    }
}
