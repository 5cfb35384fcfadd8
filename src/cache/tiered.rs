//! Tiered store: the single entry point for reads, writes and removals.
//!
//! The store owns one [`TierStore`] per configured pool, ordered fastest to
//! slowest. Writes land in the fastest tier. When a tier is full the
//! eviction policy picks a victim, which is demoted to the next tier (and may
//! displace a victim there in turn) or, from the slowest tier, evicted from
//! the cache. Reads that hit a slower tier promote the entry to the fastest
//! tier through the same placement path.
//!
//! Placement runs off an explicit worklist rather than recursion. The entry
//! being placed sits at the bottom of the stack; each eviction pushes it back
//! together with the victim it displaced, so the stack never grows deeper
//! than the number of tiers and every round strictly frees room in the tier
//! being filled.
//!
//! All tiers sit behind one mutex. Every operation takes it exactly once, so
//! the capacity check and the insert it guards are atomic, an entry is never
//! observed in two tiers (or in none) mid-move, and there is no cross-tier
//! lock ordering to get wrong.

use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::entry::{now_millis, CacheKey, CacheValue, Entry, Expiry};
use crate::cache::error::StoreError;
use crate::cache::evictor::EvictionPolicy;
use crate::cache::tier_store::{InsertOutcome, TierStats, TierStore};
use crate::config::CompressionConfig;
use crate::metrics::{MetricsSnapshot, StoreMetrics};
use crate::pool::{ResourcePools, ResourceType};

/// Construction-time options besides the pools themselves.
#[derive(Debug, Clone)]
pub struct StoreOptions<K> {
    policy: EvictionPolicy<K>,
    expiry: Expiry,
    disk_root: Option<PathBuf>,
    compression: CompressionConfig,
}

impl<K> Default for StoreOptions<K> {
    fn default() -> Self {
        Self {
            policy: EvictionPolicy::Lru,
            expiry: Expiry::Never,
            disk_root: None,
            compression: CompressionConfig::default(),
        }
    }
}

impl<K> StoreOptions<K> {
    pub fn with_policy(mut self, policy: EvictionPolicy<K>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = expiry;
        self
    }

    /// Directory for the disk tier. Required when a disk pool is configured.
    pub fn with_disk_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.disk_root = Some(root.into());
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }
}

struct Inner<K, V> {
    tiers: Vec<TierStore<K, V>>,
    /// Logical clock for insertion and access ordinals.
    clock: u64,
}

impl<K: CacheKey, V: CacheValue> Inner<K, V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn tier_of(&self, key: &K) -> Option<usize> {
        self.tiers.iter().position(|t| t.contains(key))
    }
}

/// One pending placement on the worklist.
struct Placement<K, V> {
    entry: Entry<K, V>,
    tier: usize,
    /// Whether this entry was pushed out of a faster tier.
    demoted: bool,
}

/// Capacity-bounded multi-tier cache store.
pub struct TieredStore<K, V> {
    inner: Mutex<Inner<K, V>>,
    pools: ResourcePools,
    labels: Vec<String>,
    policy: EvictionPolicy<K>,
    expiry: Expiry,
    metrics: StoreMetrics,
}

impl<K: CacheKey, V: CacheValue> TieredStore<K, V> {
    /// Open one tier per pool, fastest first. A persistent disk tier recovers
    /// its last checkpoint and is trimmed back under its bound if the pool
    /// shrank since.
    pub fn open(pools: ResourcePools, options: StoreOptions<K>) -> Result<Self, StoreError> {
        let StoreOptions {
            policy,
            expiry,
            disk_root,
            compression,
        } = options;

        let mut tiers = Vec::with_capacity(pools.len());
        for pool in pools.tiers() {
            tiers.push(TierStore::open(pool.clone(), disk_root.as_deref(), &compression)?);
        }
        let labels: Vec<String> = pools.resource_types().map(|t| t.label()).collect();
        let metrics = StoreMetrics::new(labels.clone())?;

        let clock = tiers.iter().map(|t| t.max_ordinal()).max().unwrap_or(0);
        let store = Self {
            inner: Mutex::new(Inner { tiers, clock }),
            pools,
            labels,
            policy,
            expiry,
            metrics,
        };

        {
            let mut inner = store.inner.lock();
            for idx in 0..inner.tiers.len() {
                store.trim_to_capacity(&mut inner, idx);
            }
            store.observe(&inner);
        }

        info!(
            tiers = ?store.labels,
            policy = store.policy.name(),
            persistent = store.pools.has_persistent_tier(),
            "Opened tiered store"
        );
        Ok(store)
    }

    /// The configuration this store was built from.
    pub fn pools(&self) -> &ResourcePools {
        &self.pools
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Write `value` under `key` in the fastest tier, replacing any resident
    /// value wherever it lives.
    ///
    /// An entry too large for the fastest tier is rejected with
    /// [`StoreError::EntryTooLarge`] and nothing changes. A victim that cannot
    /// be written to a slower tier is discarded and counted as a storage
    /// failure; the write itself still succeeds.
    pub fn put(&self, key: K, value: V) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let result = self.put_locked(&mut inner, key, value);
        self.observe(&inner);
        result
    }

    /// Write only if `key` is absent. Returns the resident value otherwise;
    /// that read counts as an access and promotes the entry.
    pub fn put_if_absent(&self, key: K, value: V) -> Result<Option<V>, StoreError> {
        let mut inner = self.inner.lock();
        let result = match self.get_locked(&mut inner, &key)? {
            Some(existing) => Ok(Some(existing)),
            None => self.put_locked(&mut inner, key, value).map(|()| None),
        };
        self.observe(&inner);
        result
    }

    /// Look `key` up fastest tier first. A hit below the fastest tier is
    /// promoted. A miss is `Ok(None)`.
    ///
    /// Only a failure to read the requested entry itself is an error; victims
    /// lost while making room for the promoted entry are logged and counted.
    pub fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        let mut inner = self.inner.lock();
        let result = self.get_locked(&mut inner, key);
        self.observe(&inner);
        result
    }

    /// Remove `key` from whichever tier holds it. Returns whether it was
    /// resident; removing an absent key is a no-op.
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let removed = match inner.tier_of(key) {
            Some(idx) => inner.tiers[idx].remove(key),
            None => false,
        };
        if removed {
            self.metrics.record_removal();
        }
        self.observe(&inner);
        removed
    }

    /// Whether `key` is resident and unexpired. Does not count as an access.
    pub fn contains_key(&self, key: &K) -> bool {
        let inner = self.inner.lock();
        let now = now_millis();
        inner
            .tiers
            .iter()
            .find_map(|t| t.peek(key))
            .is_some_and(|meta| !self.expiry.is_expired(meta, now))
    }

    /// Tier currently holding `key`, if any. Does not count as an access.
    pub fn tier_of(&self, key: &K) -> Option<ResourceType> {
        let inner = self.inner.lock();
        inner
            .tier_of(key)
            .map(|idx| inner.tiers[idx].resource_type().clone())
    }

    /// Number of unexpired entries across all tiers.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        if self.expiry == Expiry::Never {
            return inner.tiers.iter().map(|t| t.len()).sum();
        }
        let now = now_millis();
        inner
            .tiers
            .iter()
            .flat_map(|t| t.candidates())
            .filter(|c| !self.expiry.is_expired(c.meta, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry from every tier.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for tier in inner.tiers.iter_mut() {
            tier.clear();
        }
        self.observe(&inner);
        debug!("Cleared tiered store");
    }

    /// Usage of each tier, fastest first.
    pub fn tier_stats(&self) -> Vec<TierStats> {
        self.inner.lock().tiers.iter().map(|t| t.stats()).collect()
    }

    /// Checkpoint the persistent tier so every entry survives a restart.
    ///
    /// Entries in faster tiers are first moved down into the persistent tier,
    /// which evicts by policy if they do not all fit. An entry that could not
    /// be written is reported after the checkpoint completes.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let spilled = self.spill_to_persistent(&mut inner);
        for tier in inner.tiers.iter_mut() {
            tier.checkpoint()?;
        }
        self.observe(&inner);
        spilled
    }

    /// Flush the persistent tier, as [`TieredStore::flush`], and discard the
    /// rest.
    pub fn close(self) -> Result<(), StoreError> {
        let spilled = {
            let mut inner = self.inner.lock();
            self.spill_to_persistent(&mut inner)
        };
        let inner = self.inner.into_inner();
        let entries: usize = inner.tiers.iter().map(|t| t.len()).sum();
        for tier in inner.tiers {
            tier.close()?;
        }
        info!(entries, "Closed tiered store");
        spilled
    }

    /// Move every entry above the persistent tier into it, slowest source tier
    /// first and, within a tier, in eviction order so the entries the policy
    /// values most arrive last and survive any overflow.
    fn spill_to_persistent(&self, inner: &mut Inner<K, V>) -> Result<(), StoreError> {
        let Some(target) = inner.tiers.iter().position(|t| t.pool().is_persistent()) else {
            return Ok(());
        };
        let mut failure: Option<StoreError> = None;
        let mut spilled = 0usize;

        for idx in (0..target).rev() {
            let keys: Vec<K> = {
                let mut candidates: Vec<_> = inner.tiers[idx].candidates().collect();
                candidates.sort_by(|a, b| self.policy.compare(a, b));
                candidates.into_iter().map(|c| c.key.clone()).collect()
            };

            for key in keys {
                let fits = inner.tiers[idx]
                    .peek(&key)
                    .is_some_and(|meta| inner.tiers[target].fits(meta));
                if !fits {
                    debug!(key = ?key, tier = %self.labels[idx], "Entry too large for persistent tier");
                    continue;
                }
                let result = match inner.tiers[idx].take(&key) {
                    Ok(Some(entry)) => self.place(inner, entry, target),
                    Ok(None) => continue,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => spilled += 1,
                    Err(e) => {
                        self.note_failure(&e);
                        warn!(key = ?key, tier = %self.labels[target], error = %e, "Failed to persist entry");
                        failure.get_or_insert(e);
                    }
                }
            }
        }

        if spilled > 0 {
            debug!(spilled, tier = %self.labels[target], "Moved entries into persistent tier");
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn note_failure(&self, e: &StoreError) {
        if e.is_storage_failure() {
            self.metrics.record_storage_failure();
        }
    }

    fn put_locked(&self, inner: &mut Inner<K, V>, key: K, value: V) -> Result<(), StoreError> {
        let ordinal = inner.tick();
        let entry = Entry::new(key, value, ordinal)?;

        if let Err(e) = self.check_fits(&inner.tiers[0], &entry) {
            self.metrics.record_rejection();
            return Err(e);
        }

        // A key is owned by exactly one tier.
        if let Some(idx) = inner.tier_of(&entry.key) {
            inner.tiers[idx].remove(&entry.key);
        }

        self.metrics.record_put();
        self.place(inner, entry, 0)
    }

    fn get_locked(&self, inner: &mut Inner<K, V>, key: &K) -> Result<Option<V>, StoreError> {
        let Some(idx) = inner.tier_of(key) else {
            self.metrics.record_miss();
            return Ok(None);
        };

        let expired = inner.tiers[idx]
            .peek(key)
            .is_some_and(|meta| self.expiry.is_expired(meta, now_millis()));
        if expired {
            inner.tiers[idx].remove(key);
            self.metrics.record_expiration();
            self.metrics.record_miss();
            debug!(key = ?key, tier = %self.labels[idx], "Entry expired");
            return Ok(None);
        }

        let ordinal = inner.tick();
        let promotable = idx > 0
            && inner.tiers[idx]
                .peek(key)
                .is_some_and(|meta| inner.tiers[0].fits(meta));

        if !promotable {
            // Fastest tier, or too large to ever live there: read in place.
            let value = inner.tiers[idx].lookup(key, ordinal).inspect_err(|e| self.note_failure(e))?;
            if value.is_some() {
                self.metrics.record_hit(&self.labels[idx]);
            }
            return Ok(value);
        }

        let taken = inner.tiers[idx].take(key).inspect_err(|e| {
            self.note_failure(e);
            warn!(key = ?key, tier = %self.labels[idx], error = %e, "Dropping unreadable entry");
        })?;
        let Some(mut entry) = taken else {
            self.metrics.record_miss();
            return Ok(None);
        };
        entry.meta.touch(ordinal);
        let value = entry.value.clone();

        self.metrics.record_hit(&self.labels[idx]);
        self.metrics.record_promotion();
        debug!(key = ?key, from = %self.labels[idx], to = %self.labels[0], "Promoted entry");

        // The value was read; losing the entry on the way back up does not
        // change what the caller gets.
        if let Err(e) = self.place(inner, entry, 0) {
            self.note_failure(&e);
            warn!(key = ?key, error = %e, "Failed to promote entry, discarding it");
        }
        Ok(Some(value))
    }

    fn check_fits(&self, tier: &TierStore<K, V>, entry: &Entry<K, V>) -> Result<(), StoreError> {
        if tier.fits(&entry.meta) {
            return Ok(());
        }
        Err(StoreError::EntryTooLarge {
            tier: tier.resource_type().clone(),
            size: entry.meta.size,
            capacity: tier.capacity(),
        })
    }

    /// Place `entry` in tier `start`, demoting victims down the hierarchy
    /// until everything displaced has found a tier or left the cache.
    ///
    /// Only a failure to store `entry` itself is returned. A victim that
    /// cannot be moved is discarded, logged and counted.
    fn place(&self, inner: &mut Inner<K, V>, entry: Entry<K, V>, start: usize) -> Result<(), StoreError> {
        let mut worklist = vec![Placement {
            entry,
            tier: start,
            demoted: false,
        }];

        while let Some(Placement { entry, tier: idx, demoted }) = worklist.pop() {
            let outcome = inner.tiers[idx].try_insert(entry);
            match outcome {
                Ok(InsertOutcome::Accepted) => {}
                Ok(InsertOutcome::OverCapacity(entry)) => {
                    let tier = &inner.tiers[idx];
                    let Some(victim) = self.policy.select_victim(tier.candidates()).cloned() else {
                        // Unreachable: an entry that fits an empty tier only
                        // overflows a tier with residents.
                        warn!(key = ?entry.key, tier = %self.labels[idx], "No eviction candidate, dropping entry");
                        continue;
                    };
                    worklist.push(Placement { entry, tier: idx, demoted });
                    self.displace(inner, &victim, idx, &mut worklist);
                }
                Err(e) if demoted => {
                    self.note_failure(&e);
                    warn!(tier = %self.labels[idx], error = %e, "Failed to demote entry, discarding it");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Move `victim` out of tier `idx`: onto the worklist for the first slower
    /// tier it fits, or out of the cache if none remains.
    fn displace(&self, inner: &mut Inner<K, V>, victim: &K, idx: usize, worklist: &mut Vec<Placement<K, V>>) {
        let target = inner.tiers[idx].peek(victim).and_then(|meta| {
            (idx + 1..inner.tiers.len()).find(|&next| inner.tiers[next].fits(meta))
        });

        let Some(next) = target else {
            inner.tiers[idx].remove(victim);
            self.metrics.record_eviction();
            debug!(key = ?victim, tier = %self.labels[idx], "Evicted entry");
            return;
        };

        match inner.tiers[idx].take(victim) {
            Ok(Some(entry)) => {
                self.metrics.record_demotion(&self.labels[idx]);
                debug!(key = ?victim, from = %self.labels[idx], to = %self.labels[next], "Demoted entry");
                worklist.push(Placement {
                    entry,
                    tier: next,
                    demoted: true,
                });
            }
            Ok(None) => {}
            Err(e) => {
                self.note_failure(&e);
                warn!(key = ?victim, tier = %self.labels[idx], error = %e, "Failed to read victim, discarding it");
            }
        }
    }

    /// Evict by policy until tier `idx` is back within its bound.
    fn trim_to_capacity(&self, inner: &mut Inner<K, V>, idx: usize) {
        let mut trimmed = 0usize;
        while inner.tiers[idx].is_over_capacity() {
            let Some(victim) = self.policy.select_victim(inner.tiers[idx].candidates()).cloned() else {
                break;
            };
            inner.tiers[idx].remove(&victim);
            self.metrics.record_eviction();
            trimmed += 1;
        }
        if trimmed > 0 {
            warn!(tier = %self.labels[idx], trimmed, "Trimmed recovered tier to its configured size");
        }
    }

    fn observe(&self, inner: &Inner<K, V>) {
        for tier in &inner.tiers {
            let stats = tier.stats();
            debug_assert!(stats.occupancy <= stats.capacity);
            self.metrics.observe_tier(&stats);
        }
    }
}
