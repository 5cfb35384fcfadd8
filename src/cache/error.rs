//! Errors surfaced by the tiered store.

use thiserror::Error;

use crate::pool::{ConfigError, ResourceType};
use crate::storage::codec::CodecError;
use crate::storage::disk_io::DiskIoError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Entry of {size} bytes exceeds the {capacity}-byte capacity of tier {tier}")]
    EntryTooLarge {
        tier: ResourceType,
        size: u64,
        capacity: u64,
    },

    #[error("Storage failure on tier {tier}: {source}")]
    Storage {
        tier: ResourceType,
        #[source]
        source: DiskIoError,
    },

    #[error("Stored value does not match the storage of tier {0}")]
    MediumMismatch(ResourceType),

    #[error("Serialization failure: {0}")]
    Codec(#[from] CodecError),

    #[error("Metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl StoreError {
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, StoreError::Storage { .. })
    }
}
