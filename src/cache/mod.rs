//! Tiered cache store.
//!
//! This module contains the core cache data structures and algorithms:
//! - [`entry`]: Entry and EntryMeta, size estimation, expiry
//! - [`tier_store`]: one bounded tier with occupancy accounting
//! - [`evictor`]: eviction policy (LRU default, LFU, FIFO, custom order)
//! - [`tiered`]: orchestration of promotion and demotion across tiers
//! - [`error`]: StoreError

pub mod entry;
pub mod error;
pub mod evictor;
pub mod tier_store;
pub mod tiered;

pub use entry::{CacheKey, CacheValue, Entry, EntryMeta, Expiry};
pub use error::StoreError;
pub use evictor::{EvictionCandidate, EvictionPolicy};
pub use tier_store::{InsertOutcome, TierStats, TierStore};
pub use tiered::{StoreOptions, TieredStore};
