//! tiered-pool-cache: capacity-bounded multi-tier caching.
//!
//! A cache's working set is split across ordered storage tiers, each bounded
//! by a resource pool:
//!   heap (objects, hot) → off-heap (serialized bytes, warm) → disk (files, cold)
//!
//! Pools are configured with the immutable [`pool::ResourcePoolsBuilder`] and
//! enforced by [`cache::TieredStore`], which evicts through a pluggable
//! [`cache::EvictionPolicy`] and moves entries between tiers on access and
//! eviction.

pub mod cache;
pub mod config;
pub mod metrics;
pub mod pool;
pub mod storage;
pub mod workload;
