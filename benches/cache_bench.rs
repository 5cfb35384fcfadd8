//! Benchmarks for the tiered store.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tiered_pool_cache::cache::{EntryMeta, EvictionCandidate, EvictionPolicy, StoreOptions, TieredStore};
use tiered_pool_cache::config::CompressionConfig;
use tiered_pool_cache::pool::{MemoryUnit, ResourcePoolsBuilder, ResourceUnit};
use tiered_pool_cache::storage::codec::Codec;
use tiered_pool_cache::workload::make_value;

fn bench_eviction_select(c: &mut Criterion) {
    // 10,000 resident entries with scattered access ordinals.
    let metas: Vec<(u64, EntryMeta)> = (0..10_000u64)
        .map(|i| {
            let mut meta = EntryMeta::new(128, i);
            meta.touch((i * 7919) % 10_000 + 10_000);
            (i, meta)
        })
        .collect();

    for policy in [EvictionPolicy::Lru, EvictionPolicy::Lfu, EvictionPolicy::Fifo] {
        let name = format!("select_victim_{}_10k", policy.name());
        c.bench_function(&name, |b| {
            b.iter(|| {
                let candidates = metas.iter().map(|(k, m)| EvictionCandidate::new(k, m));
                black_box(policy.select_victim(candidates));
            })
        });
    }
}

fn bench_heap_put_get(c: &mut Criterion) {
    let pools = ResourcePoolsBuilder::new()
        .heap(10_000, ResourceUnit::Entries)
        .build()
        .unwrap();
    let store: TieredStore<u64, String> = TieredStore::open(pools, StoreOptions::default()).unwrap();
    for key in 0..10_000 {
        store.put(key, make_value(key, 128)).unwrap();
    }

    let mut key = 0u64;
    c.bench_function("heap_get_hit", |b| {
        b.iter(|| {
            key = (key + 1) % 10_000;
            black_box(store.get(&key).unwrap());
        })
    });

    c.bench_function("heap_put_replace", |b| {
        b.iter(|| {
            key = (key + 1) % 10_000;
            store.put(key, make_value(key, 128)).unwrap();
        })
    });
}

fn bench_two_tier_churn(c: &mut Criterion) {
    let pools = ResourcePoolsBuilder::new()
        .heap(1_000, ResourceUnit::Entries)
        .offheap(1, MemoryUnit::MB)
        .build()
        .unwrap();
    let store: TieredStore<u64, String> = TieredStore::open(pools, StoreOptions::default()).unwrap();

    // Key space larger than heap: every put demotes, most gets promote.
    let mut key = 0u64;
    c.bench_function("heap_offheap_put_get_churn", |b| {
        b.iter(|| {
            key = (key + 1) % 5_000;
            store.put(key, make_value(key, 128)).unwrap();
            black_box(store.get(&((key * 31) % 5_000)).unwrap());
        })
    });
}

fn bench_disk_codec(c: &mut Criterion) {
    let codec = Codec::for_disk(&CompressionConfig::default());
    let value = make_value(1, 4 * 1024);

    c.bench_function("zstd_encode_4kb_value", |b| {
        b.iter(|| black_box(codec.encode(&value).unwrap()))
    });

    let encoded = codec.encode(&value).unwrap();
    c.bench_function("zstd_decode_4kb_value", |b| {
        b.iter(|| black_box(codec.decode::<String>(&encoded).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_eviction_select,
    bench_heap_put_get,
    bench_two_tier_churn,
    bench_disk_codec,
);
criterion_main!(benches);
