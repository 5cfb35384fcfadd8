//! Cache entries and their bookkeeping metadata.
//!
//! An entry is owned by exactly one tier at a time. Its metadata travels with
//! it when it is promoted or demoted, so recency and frequency survive tier
//! moves.

use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::storage::codec::{encoded_len, CodecError};

/// Bounds required of cache keys.
pub trait CacheKey: Hash + Eq + Clone + Debug + Serialize + DeserializeOwned + Send + 'static {}

impl<T> CacheKey for T where T: Hash + Eq + Clone + Debug + Serialize + DeserializeOwned + Send + 'static {}

/// Bounds required of cache values.
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + 'static {}

/// Per-entry bookkeeping used for sizing, eviction and expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Estimated footprint in bytes (encoded key + encoded value).
    pub size: u64,

    /// Logical time at which the entry was written.
    pub inserted: u64,

    /// Logical time of the most recent access.
    pub last_access: u64,

    /// Number of reads that hit this entry.
    pub hits: u64,

    /// Wall-clock creation time, milliseconds since the epoch.
    pub created_ms: u64,

    /// Wall-clock time of the most recent access, milliseconds since the epoch.
    pub accessed_ms: u64,
}

impl EntryMeta {
    pub fn new(size: u64, ordinal: u64) -> Self {
        let now = now_millis();
        Self {
            size,
            inserted: ordinal,
            last_access: ordinal,
            hits: 0,
            created_ms: now,
            accessed_ms: now,
        }
    }

    /// Record a read at the given logical time.
    pub fn touch(&mut self, ordinal: u64) {
        self.last_access = ordinal;
        self.hits += 1;
        self.accessed_ms = now_millis();
    }
}

/// A key, its value and its metadata.
#[derive(Debug, Clone)]
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
    pub meta: EntryMeta,
}

impl<K: CacheKey, V: CacheValue> Entry<K, V> {
    /// Create an entry, estimating its size from its encoded form.
    pub fn new(key: K, value: V, ordinal: u64) -> Result<Self, CodecError> {
        let size = estimate_size(&key, &value)?;
        Ok(Self {
            key,
            value,
            meta: EntryMeta::new(size, ordinal),
        })
    }
}

/// Estimated footprint of a key/value pair in bytes.
pub fn estimate_size<K: Serialize, V: Serialize>(key: &K, value: &V) -> Result<u64, CodecError> {
    Ok((encoded_len(key)? + encoded_len(value)?) as u64)
}

/// When entries stop being visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// Entries live until removed or evicted.
    #[default]
    Never,
    /// Entries expire a fixed time after they were written.
    TimeToLive(Duration),
    /// Entries expire a fixed time after they were last read or written.
    TimeToIdle(Duration),
}

impl Expiry {
    pub fn is_expired(&self, meta: &EntryMeta, now_ms: u64) -> bool {
        match self {
            Expiry::Never => false,
            Expiry::TimeToLive(ttl) => now_ms.saturating_sub(meta.created_ms) >= ttl.as_millis() as u64,
            Expiry::TimeToIdle(tti) => now_ms.saturating_sub(meta.accessed_ms) >= tti.as_millis() as u64,
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
