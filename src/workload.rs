//! Synthetic read/write/remove workload for exercising a tiered store.
//!
//! Keys are drawn with a quadratic skew toward low key ids, so a hot subset
//! stays in the fast tier while the long tail churns through the slower ones.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::cache::TieredStore;
use crate::config::WorkloadConfig;

/// Operation counts from one or more workers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadReport {
    pub gets: u64,
    pub hits: u64,
    pub puts: u64,
    pub removes: u64,
    pub errors: u64,
}

impl WorkloadReport {
    pub fn merge(&mut self, other: &WorkloadReport) {
        self.gets += other.gets;
        self.hits += other.hits;
        self.puts += other.puts;
        self.removes += other.removes;
        self.errors += other.errors;
    }

    pub fn hit_ratio(&self) -> f64 {
        if self.gets == 0 {
            return 0.0;
        }
        self.hits as f64 / self.gets as f64
    }
}

/// Value payload of roughly `len` bytes for `key`.
pub fn make_value(key: u64, len: usize) -> String {
    let mut value = format!("v{key}-");
    while value.len() < len {
        value.push('x');
    }
    value
}

/// Run `config.operations` operations against `store` from one worker.
pub fn run_worker(store: &TieredStore<u64, String>, config: &WorkloadConfig, worker: usize) -> WorkloadReport {
    let mut rng = SmallRng::seed_from_u64(config.seed.wrapping_add(worker as u64));
    let mut report = WorkloadReport::default();
    let key_space = config.key_space.max(1);

    for _ in 0..config.operations {
        let u: f64 = rng.random();
        let key = ((u * u) * key_space as f64) as u64 % key_space;
        let op: f64 = rng.random();

        if op < config.read_ratio {
            report.gets += 1;
            match store.get(&key) {
                Ok(Some(_)) => report.hits += 1,
                Ok(None) => {}
                Err(e) => {
                    report.errors += 1;
                    debug!(worker, key, error = %e, "Get failed");
                }
            }
        } else if op < config.read_ratio + config.remove_ratio {
            report.removes += 1;
            store.remove(&key);
        } else {
            report.puts += 1;
            if let Err(e) = store.put(key, make_value(key, config.value_bytes)) {
                report.errors += 1;
                debug!(worker, key, error = %e, "Put failed");
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StoreOptions;
    use crate::pool::{ResourcePoolsBuilder, ResourceUnit};

    #[test]
    fn test_make_value_length() {
        assert_eq!(make_value(7, 16).len(), 16);
        assert_eq!(make_value(123456, 2), "v123456-");
    }

    #[test]
    fn test_worker_counts_add_up() {
        let pools = ResourcePoolsBuilder::new()
            .heap(50, ResourceUnit::Entries)
            .build()
            .unwrap();
        let store = TieredStore::open(pools, StoreOptions::default()).unwrap();
        let config = WorkloadConfig {
            operations: 1_000,
            key_space: 200,
            ..Default::default()
        };

        let report = run_worker(&store, &config, 0);
        assert_eq!(report.gets + report.puts + report.removes, 1_000);
        assert_eq!(report.errors, 0);
        assert!(store.len() <= 50);
    }
}
