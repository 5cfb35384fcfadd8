//! Runtime configuration for tiered-pool-cache.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! All tier-related knobs (pools, eviction policy, expiry, disk layout) live here.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::cache::entry::Expiry;
use crate::cache::evictor::EvictionPolicy;
use crate::cache::tiered::StoreOptions;
use crate::pool::{ConfigError, MemoryUnit, ResourcePool, ResourcePools, ResourcePoolsBuilder, ResourceType, ResourceUnit};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiered-pool-cache", about = "Drive a tiered resource-pool cache with a synthetic workload")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Override the number of workload threads.
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Print Prometheus metrics after the run.
    #[arg(long)]
    pub metrics: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tier pools, in any order.
    pub pools: Vec<ResourcePool>,

    /// Eviction policy selection.
    pub eviction: EvictionConfig,

    /// Entry expiry.
    pub expiry: ExpiryConfig,

    /// Disk tier layout.
    pub disk: DiskConfig,

    /// Compression settings for the disk tier.
    pub compression: CompressionConfig,

    /// Synthetic workload run by the binary.
    pub workload: WorkloadConfig,
}

/// Built-in eviction policies selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Lru,
    Lfu,
    Fifo,
}

/// Eviction policy settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictionConfig {
    pub policy: PolicyKind,
}

/// Expiry settings. Time-to-live wins if both are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    /// Expire entries this many milliseconds after they were written.
    pub time_to_live_ms: Option<u64>,

    /// Expire entries this many milliseconds after their last access.
    pub time_to_idle_ms: Option<u64>,
}

/// Disk tier layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Directory holding the disk tier's files.
    pub path: PathBuf,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/tiered-pool-cache"),
        }
    }
}

/// Compression settings for values written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Apply zstd compression when writing to disk.
    pub disk_zstd_compression: bool,

    /// zstd compression level (1-22).
    pub zstd_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            disk_zstd_compression: true,
            zstd_level: 3,
        }
    }
}

/// Synthetic workload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Number of worker threads.
    pub threads: usize,

    /// Operations per worker.
    pub operations: usize,

    /// Number of distinct keys.
    pub key_space: u64,

    /// Fraction of operations that are reads.
    pub read_ratio: f64,

    /// Fraction of operations that are removals.
    pub remove_ratio: f64,

    /// Size of generated values in bytes.
    pub value_bytes: usize,

    /// Base RNG seed; each worker adds its index.
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            operations: 50_000,
            key_space: 20_000,
            read_ratio: 0.75,
            remove_ratio: 0.05,
            value_bytes: 256,
            seed: 42,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Pools used when the configuration lists none.
    pub fn default_pools() -> Vec<ResourcePool> {
        vec![
            ResourcePool::new(ResourceType::Heap, 1_000, ResourceUnit::Entries, false),
            ResourcePool::new(ResourceType::OffHeap, 2, MemoryUnit::MB.into(), false),
            ResourcePool::new(ResourceType::Disk, 64, MemoryUnit::MB.into(), false),
        ]
    }

    /// Build and validate the configured pools.
    pub fn resource_pools(&self) -> Result<ResourcePools, ConfigError> {
        let pools = if self.pools.is_empty() {
            Self::default_pools()
        } else {
            self.pools.clone()
        };
        pools
            .into_iter()
            .fold(ResourcePoolsBuilder::new(), |builder, pool| {
                builder.with(
                    pool.resource_type().clone(),
                    pool.size(),
                    pool.unit(),
                    pool.is_persistent(),
                )
            })
            .build()
    }

    pub fn expiry(&self) -> Expiry {
        match (self.expiry.time_to_live_ms, self.expiry.time_to_idle_ms) {
            (Some(ttl), _) => Expiry::TimeToLive(Duration::from_millis(ttl)),
            (None, Some(tti)) => Expiry::TimeToIdle(Duration::from_millis(tti)),
            (None, None) => Expiry::Never,
        }
    }

    pub fn eviction_policy<K>(&self) -> EvictionPolicy<K> {
        match self.eviction.policy {
            PolicyKind::Lru => EvictionPolicy::Lru,
            PolicyKind::Lfu => EvictionPolicy::Lfu,
            PolicyKind::Fifo => EvictionPolicy::Fifo,
        }
    }

    /// Store options derived from this configuration.
    pub fn store_options<K>(&self) -> StoreOptions<K> {
        StoreOptions::default()
            .with_policy(self.eviction_policy())
            .with_expiry(self.expiry())
            .with_disk_root(self.disk.path.clone())
            .with_compression(self.compression.clone())
    }
}
