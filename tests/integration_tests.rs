//! End-to-end tests: concurrent access and randomized operation sequences.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use tiered_pool_cache::cache::{StoreOptions, TieredStore};
use tiered_pool_cache::config::WorkloadConfig;
use tiered_pool_cache::pool::{MemoryUnit, ResourcePoolsBuilder, ResourceUnit};
use tiered_pool_cache::workload::run_worker;

fn two_tier_store() -> TieredStore<u64, String> {
    let pools = ResourcePoolsBuilder::new()
        .heap(50, ResourceUnit::Entries)
        .offheap(8, MemoryUnit::KB)
        .build()
        .unwrap();
    TieredStore::open(pools, StoreOptions::default()).unwrap()
}

fn assert_bounded<K: tiered_pool_cache::cache::CacheKey, V: tiered_pool_cache::cache::CacheValue>(
    store: &TieredStore<K, V>,
) {
    for stats in store.tier_stats() {
        assert!(
            stats.occupancy <= stats.capacity,
            "tier {} over capacity: {} > {}",
            stats.tier,
            stats.occupancy,
            stats.capacity
        );
    }
}

#[test]
fn test_concurrent_workload_respects_bounds() {
    let store = Arc::new(two_tier_store());
    let config = WorkloadConfig {
        operations: 2_000,
        key_space: 500,
        value_bytes: 64,
        ..Default::default()
    };

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            let config = config.clone();
            thread::spawn(move || run_worker(&store, &config, worker))
        })
        .collect();

    for handle in handles {
        let report = handle.join().unwrap();
        assert_eq!(report.errors, 0);
        assert_eq!(report.gets + report.puts + report.removes, 2_000);
    }

    assert_bounded(&store);

    // Each resident key lives in exactly one tier.
    let resident = (0..config.key_space).filter(|k| store.contains_key(k)).count();
    assert_eq!(store.len(), resident);
}

#[test]
fn test_concurrent_writers_same_key() {
    let store = Arc::new(two_tier_store());
    let handles: Vec<_> = (0..8u64)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..200u64 {
                    store.put(7, format!("{worker}-{i}")).unwrap();
                    assert!(store.get(&7).unwrap().is_some());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 1);
    let last = store.get(&7).unwrap().unwrap();
    assert!(last.ends_with("-199"));
}

#[derive(Debug, Clone)]
enum Op {
    Put(u8, String),
    Get(u8),
    Remove(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..16, "[a-z]{0,10}").prop_map(|(k, v)| Op::Put(k, v)),
        3 => (0u8..16).prop_map(Op::Get),
        1 => (0u8..16).prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn prop_store_matches_model(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let pools = ResourcePoolsBuilder::new()
            .heap(3, ResourceUnit::Entries)
            .offheap(64, MemoryUnit::B)
            .build()
            .unwrap();
        let store: TieredStore<u8, String> = TieredStore::open(pools, StoreOptions::default()).unwrap();
        // Last value written per key; the store may have evicted it since.
        let mut model: HashMap<u8, String> = HashMap::new();

        for op in ops {
            match op {
                Op::Put(k, v) => {
                    store.put(k, v.clone()).unwrap();
                    prop_assert_eq!(store.get(&k).unwrap(), Some(v.clone()));
                    model.insert(k, v);
                }
                Op::Get(k) => {
                    if let Some(found) = store.get(&k).unwrap() {
                        prop_assert_eq!(Some(&found), model.get(&k));
                    }
                }
                Op::Remove(k) => {
                    store.remove(&k);
                    model.remove(&k);
                    prop_assert!(!store.contains_key(&k));
                }
            }

            for stats in store.tier_stats() {
                prop_assert!(stats.occupancy <= stats.capacity);
            }
            let resident = (0u8..16).filter(|k| store.contains_key(k)).count();
            prop_assert_eq!(store.len(), resident);
        }
    }

    #[test]
    fn prop_single_tier_never_exceeds_count(keys in prop::collection::vec(0u32..1000, 1..300), size in 1u64..20) {
        let pools = ResourcePoolsBuilder::new()
            .heap(size, ResourceUnit::Entries)
            .build()
            .unwrap();
        let store: TieredStore<u32, u32> = TieredStore::open(pools, StoreOptions::default()).unwrap();
        for key in keys {
            store.put(key, key).unwrap();
            prop_assert!(store.len() as u64 <= size);
            prop_assert_eq!(store.get(&key).unwrap(), Some(key));
        }
    }
}
