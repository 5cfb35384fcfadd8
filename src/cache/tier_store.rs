//! Storage for a single tier.
//!
//! A `TierStore` holds the entries resident in one tier and tracks occupancy
//! in the tier's unit: one per entry for count-sized pools, the entry's size
//! estimate for byte-sized pools. It never evicts on its own. When an insert
//! would overshoot the bound it hands the entry back and lets the caller pick
//! a victim, which keeps the eviction policy out of raw storage.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::cache::entry::{CacheKey, CacheValue, Entry, EntryMeta};
use crate::cache::error::StoreError;
use crate::cache::evictor::EvictionCandidate;
use crate::config::CompressionConfig;
use crate::pool::{ConfigError, ResourcePool, ResourceType, ResourceUnit, StorageMode};
use crate::storage::codec::Codec;
use crate::storage::disk_io::{DiskIndex, DiskIoEngine, DiskIoError, IndexRecord};

/// Result of offering an entry to a tier.
#[derive(Debug)]
pub enum InsertOutcome<K, V> {
    /// The entry is now resident.
    Accepted,
    /// The tier is full; the entry is returned untouched and nothing changed.
    OverCapacity(Entry<K, V>),
}

/// Point-in-time usage of one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierStats {
    pub tier: ResourceType,
    pub unit: ResourceUnit,
    /// Number of resident entries.
    pub entries: usize,
    /// Occupancy in the tier's unit (entries or bytes).
    pub occupancy: u64,
    /// Capacity in the tier's unit (entries or bytes).
    pub capacity: u64,
}

impl TierStats {
    /// Usage as a fraction of capacity (0.0 - 1.0).
    pub fn usage_fraction(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.occupancy as f64 / self.capacity as f64
    }
}

enum Stored<V> {
    Object(V),
    Bytes(Vec<u8>),
    File(u64),
}

struct Resident<V> {
    meta: EntryMeta,
    data: Stored<V>,
}

struct DiskMedium {
    codec: Codec,
    io: DiskIoEngine,
    next_file_id: u64,
    persistent: bool,
}

enum Medium {
    Objects,
    Serialized(Codec),
    Files(DiskMedium),
}

fn storage_err(tier: &ResourceType) -> impl FnOnce(DiskIoError) -> StoreError + '_ {
    move |source| StoreError::Storage {
        tier: tier.clone(),
        source,
    }
}

impl Medium {
    fn store<V: CacheValue>(&mut self, value: V, tier: &ResourceType) -> Result<Stored<V>, StoreError> {
        match self {
            Medium::Objects => Ok(Stored::Object(value)),
            Medium::Serialized(codec) => Ok(Stored::Bytes(codec.encode(&value)?)),
            Medium::Files(disk) => {
                let bytes = disk.codec.encode(&value)?;
                let file_id = disk.next_file_id;
                disk.io.write_entry(file_id, &bytes).map_err(storage_err(tier))?;
                disk.next_file_id += 1;
                Ok(Stored::File(file_id))
            }
        }
    }

    fn load<V: CacheValue>(&mut self, data: &Stored<V>, tier: &ResourceType) -> Result<V, StoreError> {
        match (self, data) {
            (_, Stored::Object(value)) => Ok(value.clone()),
            (Medium::Serialized(codec), Stored::Bytes(bytes)) => Ok(codec.decode(bytes)?),
            (Medium::Files(disk), Stored::File(file_id)) => {
                let bytes = disk.io.read_entry(*file_id).map_err(storage_err(tier))?;
                Ok(disk.codec.decode(&bytes)?)
            }
            _ => Err(StoreError::MediumMismatch(tier.clone())),
        }
    }

    /// Move the value out, releasing whatever backs it.
    fn take<V: CacheValue>(&mut self, data: Stored<V>, tier: &ResourceType) -> Result<V, StoreError> {
        match data {
            Stored::Object(value) => Ok(value),
            other => {
                let value = self.load(&other, tier);
                self.release(other, tier);
                value
            }
        }
    }

    /// Drop a stored value. File deletion failures leave an orphan that the
    /// next open removes, so they are only logged.
    fn release<V>(&mut self, data: Stored<V>, tier: &ResourceType) {
        if let (Medium::Files(disk), Stored::File(file_id)) = (self, data) {
            if let Err(e) = disk.io.delete_entry(file_id) {
                warn!(tier = %tier, file_id, error = %e, "Failed to delete entry file");
            }
        }
    }
}

fn weight_in(unit: ResourceUnit, meta: &EntryMeta) -> u64 {
    match unit {
        ResourceUnit::Entries => 1,
        ResourceUnit::Memory(_) => meta.size,
    }
}

/// Entries resident in one tier, bounded by the tier's pool.
pub struct TierStore<K, V> {
    pool: ResourcePool,
    capacity: u64,
    occupancy: u64,
    entries: HashMap<K, Resident<V>>,
    medium: Medium,
}

impl<K: CacheKey, V: CacheValue> TierStore<K, V> {
    /// Open storage for `pool`. File-backed tiers need `disk_root`; a
    /// persistent one recovers the entries of its last checkpoint, a
    /// non-persistent one starts empty.
    pub fn open(
        pool: ResourcePool,
        disk_root: Option<&Path>,
        compression: &CompressionConfig,
    ) -> Result<Self, StoreError> {
        let tier = pool.resource_type().clone();
        let capacity = pool
            .capacity()
            .ok_or_else(|| ConfigError::CapacityOverflow(tier.clone()))?;

        let medium = match tier.storage_mode() {
            StorageMode::Objects => Medium::Objects,
            StorageMode::Serialized => Medium::Serialized(Codec::plain()),
            StorageMode::Files => {
                let root = disk_root.ok_or_else(|| ConfigError::MissingStoragePath(tier.clone()))?;
                let io = DiskIoEngine::open(root.to_path_buf()).map_err(storage_err(&tier))?;
                Medium::Files(DiskMedium {
                    codec: Codec::for_disk(compression),
                    io,
                    next_file_id: 0,
                    persistent: pool.is_persistent(),
                })
            }
        };

        let mut store = Self {
            pool,
            capacity,
            occupancy: 0,
            entries: HashMap::new(),
            medium,
        };
        store.recover()?;
        Ok(store)
    }

    fn recover(&mut self) -> Result<(), StoreError> {
        let tier = self.pool.resource_type().clone();
        let unit = self.pool.unit();
        let Medium::Files(disk) = &mut self.medium else {
            return Ok(());
        };

        if !disk.persistent {
            disk.io.wipe().map_err(storage_err(&tier))?;
            return Ok(());
        }

        let Some(index) = disk.io.read_index::<K>().map_err(storage_err(&tier))? else {
            disk.io.remove_orphans(&HashSet::new()).map_err(storage_err(&tier))?;
            return Ok(());
        };

        if index.compressed != disk.codec.is_compressed() {
            info!(
                tier = %tier,
                compressed = index.compressed,
                "Keeping compression setting of existing disk tier"
            );
            disk.codec = disk.codec.with_compression(index.compressed);
        }

        let mut live = HashSet::new();
        let mut next_file_id = index.next_file_id;
        for record in index.records {
            if !disk.io.entry_exists(record.file_id) {
                warn!(tier = %tier, file_id = record.file_id, key = ?record.key, "Indexed entry file missing, skipping");
                continue;
            }
            next_file_id = next_file_id.max(record.file_id + 1);
            live.insert(record.file_id);
            self.occupancy += weight_in(unit, &record.meta);
            let resident = Resident {
                meta: record.meta,
                data: Stored::File(record.file_id),
            };
            if let Some(old) = self.entries.insert(record.key, resident) {
                self.occupancy -= weight_in(unit, &old.meta);
            }
        }
        disk.next_file_id = next_file_id;
        disk.io.remove_orphans(&live).map_err(storage_err(&tier))?;

        info!(
            tier = %tier,
            recovered = self.entries.len(),
            occupancy = self.occupancy,
            capacity = self.capacity,
            "Recovered persistent tier"
        );
        Ok(())
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn resource_type(&self) -> &ResourceType {
        self.pool.resource_type()
    }

    /// Capacity in the tier's unit.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Occupancy in the tier's unit.
    pub fn occupancy(&self) -> u64 {
        self.occupancy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether occupancy exceeds capacity (only possible right after recovery
    /// into a smaller pool).
    pub fn is_over_capacity(&self) -> bool {
        self.occupancy > self.capacity
    }

    /// What an entry with this metadata costs in this tier.
    pub fn weight(&self, meta: &EntryMeta) -> u64 {
        weight_in(self.pool.unit(), meta)
    }

    /// Whether the entry could be resident here at all, even in an empty tier.
    pub fn fits(&self, meta: &EntryMeta) -> bool {
        self.weight(meta) <= self.capacity
    }

    pub fn peek(&self, key: &K) -> Option<&EntryMeta> {
        self.entries.get(key).map(|r| &r.meta)
    }

    /// Resident entries as eviction candidates.
    pub fn candidates(&self) -> impl Iterator<Item = EvictionCandidate<'_, K>> {
        self.entries
            .iter()
            .map(|(key, resident)| EvictionCandidate::new(key, &resident.meta))
    }

    /// Insert if the tier has room. A resident entry with the same key is
    /// replaced, and its weight counts as freed.
    pub fn try_insert(&mut self, entry: Entry<K, V>) -> Result<InsertOutcome<K, V>, StoreError> {
        let weight = self.weight(&entry.meta);
        if weight > self.capacity {
            return Err(StoreError::EntryTooLarge {
                tier: self.resource_type().clone(),
                size: entry.meta.size,
                capacity: self.capacity,
            });
        }

        let replaced = self
            .entries
            .get(&entry.key)
            .map(|r| weight_in(self.pool.unit(), &r.meta))
            .unwrap_or(0);
        if self.occupancy - replaced + weight > self.capacity {
            return Ok(InsertOutcome::OverCapacity(entry));
        }

        let tier = self.pool.resource_type();
        let Entry { key, value, meta } = entry;
        let data = self.medium.store(value, tier)?;
        if let Some(old) = self.entries.insert(key, Resident { meta, data }) {
            self.occupancy -= weight_in(self.pool.unit(), &old.meta);
            self.medium.release(old.data, tier);
        }
        self.occupancy += weight;
        debug_assert!(self.occupancy <= self.capacity);
        Ok(InsertOutcome::Accepted)
    }

    /// Read a value, recording the access at logical time `ordinal`.
    /// An entry whose stored form cannot be read is dropped from the tier.
    pub fn lookup(&mut self, key: &K, ordinal: u64) -> Result<Option<V>, StoreError> {
        let tier = self.pool.resource_type();
        let Some(resident) = self.entries.get_mut(key) else {
            return Ok(None);
        };
        match self.medium.load(&resident.data, tier) {
            Ok(value) => {
                resident.meta.touch(ordinal);
                Ok(Some(value))
            }
            Err(e) => {
                warn!(tier = %tier, key = ?key, error = %e, "Dropping unreadable entry");
                self.remove(key);
                Err(e)
            }
        }
    }

    /// Remove an entry and hand it over whole (for promotion or demotion).
    pub fn take(&mut self, key: &K) -> Result<Option<Entry<K, V>>, StoreError> {
        let Some((key, resident)) = self.entries.remove_entry(key) else {
            return Ok(None);
        };
        self.occupancy -= weight_in(self.pool.unit(), &resident.meta);
        let value = self.medium.take(resident.data, self.pool.resource_type())?;
        Ok(Some(Entry {
            key,
            value,
            meta: resident.meta,
        }))
    }

    /// Remove an entry without reading it. Returns whether it was resident.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(resident) = self.entries.remove(key) else {
            return false;
        };
        self.occupancy -= weight_in(self.pool.unit(), &resident.meta);
        self.medium.release(resident.data, self.pool.resource_type());
        true
    }

    pub fn clear(&mut self) {
        let tier = self.pool.resource_type();
        for (_, resident) in self.entries.drain() {
            self.medium.release(resident.data, tier);
        }
        self.occupancy = 0;
    }

    /// Highest logical time recorded by any resident entry.
    pub fn max_ordinal(&self) -> u64 {
        self.entries
            .values()
            .map(|r| r.meta.inserted.max(r.meta.last_access))
            .max()
            .unwrap_or(0)
    }

    /// Write the index of a persistent file-backed tier. No-op otherwise.
    pub fn checkpoint(&mut self) -> Result<(), StoreError> {
        let tier = self.pool.resource_type();
        let Medium::Files(disk) = &self.medium else {
            return Ok(());
        };
        if !disk.persistent {
            return Ok(());
        }

        let records: Vec<IndexRecord<K>> = self
            .entries
            .iter()
            .filter_map(|(key, resident)| match resident.data {
                Stored::File(file_id) => Some(IndexRecord {
                    key: key.clone(),
                    file_id,
                    meta: resident.meta.clone(),
                }),
                _ => None,
            })
            .collect();
        let index = DiskIndex::new(disk.codec.is_compressed(), disk.next_file_id, records);
        disk.io.write_index(&index).map_err(storage_err(tier))?;
        debug!(tier = %tier, entries = index.records.len(), "Checkpointed tier");
        Ok(())
    }

    /// Flush a persistent tier, or discard the contents of a non-persistent
    /// file-backed one.
    pub fn close(mut self) -> Result<(), StoreError> {
        self.checkpoint()?;
        let tier = self.pool.resource_type().clone();
        if let Medium::Files(disk) = &self.medium {
            let stats = disk.io.stats();
            info!(
                tier = %tier,
                root = %disk.io.root().display(),
                writes = stats.total_writes,
                reads = stats.total_reads,
                bytes_written = stats.total_bytes_written,
                bytes_read = stats.total_bytes_read,
                bytes_on_disk = disk.io.disk_usage().unwrap_or_default(),
                "Closing disk tier"
            );
            if !disk.persistent {
                disk.io.wipe().map_err(storage_err(&tier))?;
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> TierStats {
        TierStats {
            tier: self.resource_type().clone(),
            unit: self.pool.unit(),
            entries: self.entries.len(),
            occupancy: self.occupancy,
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::MemoryUnit;
    use tempfile::TempDir;

    fn entry(key: u32, value: &str, ordinal: u64) -> Entry<u32, String> {
        Entry::new(key, value.to_string(), ordinal).unwrap()
    }

    fn heap(size: u64) -> TierStore<u32, String> {
        let pool = ResourcePool::new(ResourceType::Heap, size, ResourceUnit::Entries, false);
        TierStore::open(pool, None, &CompressionConfig::default()).unwrap()
    }

    #[test]
    fn test_count_bound() {
        let mut tier = heap(2);
        assert!(matches!(tier.try_insert(entry(1, "a", 0)).unwrap(), InsertOutcome::Accepted));
        assert!(matches!(tier.try_insert(entry(2, "b", 1)).unwrap(), InsertOutcome::Accepted));

        match tier.try_insert(entry(3, "c", 2)).unwrap() {
            InsertOutcome::OverCapacity(rejected) => assert_eq!(rejected.key, 3),
            InsertOutcome::Accepted => panic!("tier should be full"),
        }
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.occupancy(), 2);
        assert!(!tier.contains(&3));
    }

    #[test]
    fn test_replace_same_key_frees_old_weight() {
        let mut tier = heap(1);
        tier.try_insert(entry(1, "a", 0)).unwrap();
        assert!(matches!(tier.try_insert(entry(1, "b", 1)).unwrap(), InsertOutcome::Accepted));
        assert_eq!(tier.occupancy(), 1);
        assert_eq!(tier.lookup(&1, 2).unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_byte_accounting_and_oversize() {
        let pool = ResourcePool::new(ResourceType::OffHeap, 32, MemoryUnit::B.into(), false);
        let mut tier: TierStore<u32, String> =
            TierStore::open(pool, None, &CompressionConfig::default()).unwrap();

        let small = entry(1, "abcd", 0); // 1 + 6 bytes
        assert_eq!(small.meta.size, 7);
        tier.try_insert(small).unwrap();
        assert_eq!(tier.occupancy(), 7);

        let huge = entry(2, &"x".repeat(64), 1);
        let err = tier.try_insert(huge).unwrap_err();
        assert!(matches!(err, StoreError::EntryTooLarge { capacity: 32, .. }));
        assert_eq!(tier.occupancy(), 7);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_lookup_touches_and_take_moves() {
        let mut tier = heap(4);
        tier.try_insert(entry(1, "a", 0)).unwrap();

        assert_eq!(tier.lookup(&1, 7).unwrap().as_deref(), Some("a"));
        assert_eq!(tier.peek(&1).unwrap().last_access, 7);
        assert_eq!(tier.lookup(&2, 8).unwrap(), None);

        let taken = tier.take(&1).unwrap().unwrap();
        assert_eq!(taken.value, "a");
        assert_eq!(taken.meta.hits, 1);
        assert_eq!(tier.occupancy(), 0);
        assert!(tier.take(&1).unwrap().is_none());
    }

    #[test]
    fn test_serialized_tier_roundtrip() {
        let pool = ResourcePool::new(ResourceType::OffHeap, 1, MemoryUnit::KB.into(), false);
        let mut tier: TierStore<u32, String> =
            TierStore::open(pool, None, &CompressionConfig::default()).unwrap();
        tier.try_insert(entry(9, "nine", 0)).unwrap();
        assert_eq!(tier.take(&9).unwrap().unwrap().value, "nine");
    }

    #[test]
    fn test_disk_tier_requires_path() {
        let pool = ResourcePool::new(ResourceType::Disk, 1, MemoryUnit::MB.into(), false);
        let result: Result<TierStore<u32, String>, _> =
            TierStore::open(pool, None, &CompressionConfig::default());
        assert!(matches!(
            result,
            Err(StoreError::Config(ConfigError::MissingStoragePath(ResourceType::Disk)))
        ));
    }

    #[test]
    fn test_persistent_disk_recovers_after_close() {
        let tmp = TempDir::new().unwrap();
        let pool = ResourcePool::new(ResourceType::Disk, 1, MemoryUnit::MB.into(), true);
        let compression = CompressionConfig::default();

        let mut tier: TierStore<u32, String> =
            TierStore::open(pool.clone(), Some(tmp.path()), &compression).unwrap();
        tier.try_insert(entry(1, "one", 0)).unwrap();
        tier.try_insert(entry(2, "two", 1)).unwrap();
        let occupancy = tier.occupancy();
        tier.close().unwrap();

        let mut reopened: TierStore<u32, String> =
            TierStore::open(pool, Some(tmp.path()), &compression).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.occupancy(), occupancy);
        assert_eq!(reopened.lookup(&2, 5).unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn test_unreadable_entry_dropped_on_lookup() {
        let tmp = TempDir::new().unwrap();
        let pool = ResourcePool::new(ResourceType::Disk, 1, MemoryUnit::MB.into(), false);
        let mut tier: TierStore<u32, String> =
            TierStore::open(pool, Some(tmp.path()), &CompressionConfig::default()).unwrap();
        tier.try_insert(entry(1, "one", 0)).unwrap();
        tier.try_insert(entry(2, "two", 1)).unwrap();
        let remaining = tier.peek(&2).unwrap().size;

        // First entry on disk gets file id 0.
        std::fs::remove_file(tmp.path().join("data/0/0.entry")).unwrap();

        let err = tier.lookup(&1, 5).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Storage {
                source: DiskIoError::FileNotFound(_),
                ..
            }
        ));
        assert!(!tier.contains(&1));
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.occupancy(), remaining);
        assert_eq!(tier.lookup(&2, 6).unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn test_failed_write_leaves_tier_unchanged() {
        let tmp = TempDir::new().unwrap();
        let pool = ResourcePool::new(ResourceType::Disk, 1, MemoryUnit::MB.into(), false);
        let mut tier: TierStore<u32, String> =
            TierStore::open(pool, Some(tmp.path()), &CompressionConfig::default()).unwrap();

        // A directory where the entry file should go makes the write fail.
        std::fs::create_dir_all(tmp.path().join("data/0/0.entry")).unwrap();

        let err = tier.try_insert(entry(1, "one", 0)).unwrap_err();
        assert!(err.is_storage_failure());
        assert!(tier.is_empty());
        assert_eq!(tier.occupancy(), 0);
    }

    #[test]
    fn test_non_persistent_disk_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let pool = ResourcePool::new(ResourceType::Disk, 1, MemoryUnit::MB.into(), false);
        let compression = CompressionConfig::default();

        let mut tier: TierStore<u32, String> =
            TierStore::open(pool.clone(), Some(tmp.path()), &compression).unwrap();
        tier.try_insert(entry(1, "one", 0)).unwrap();
        tier.checkpoint().unwrap();
        drop(tier);

        let reopened: TierStore<u32, String> =
            TierStore::open(pool, Some(tmp.path()), &compression).unwrap();
        assert!(reopened.is_empty());
    }
}
