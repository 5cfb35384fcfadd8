//! Prometheus instrumentation for a tiered store.
//!
//! Each store owns its own [`Registry`]; nothing is registered globally, so
//! several stores can live in one process without name clashes.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::cache::tier_store::TierStats;

const NAMESPACE: &str = "tiered_cache";

/// Counter values at a point in time, for reports and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub removals: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub rejections: u64,
    pub storage_failures: u64,
}

#[derive(Clone)]
pub struct StoreMetrics {
    registry: Registry,
    tiers: Vec<String>,
    hits: IntCounterVec,
    misses: IntCounter,
    puts: IntCounter,
    removals: IntCounter,
    promotions: IntCounter,
    demotions: IntCounterVec,
    evictions: IntCounter,
    expirations: IntCounter,
    rejections: IntCounter,
    storage_failures: IntCounter,
    entries: IntGaugeVec,
    occupancy: IntGaugeVec,
    capacity: IntGaugeVec,
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE)
}

impl StoreMetrics {
    /// Create metrics for a store with the given tier labels, fastest first.
    pub fn new(tiers: Vec<String>) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let hits = IntCounterVec::new(opts("hits_total", "Lookups served, by tier"), &["tier"])?;
        let misses = IntCounter::with_opts(opts("misses_total", "Lookups that found nothing"))?;
        let puts = IntCounter::with_opts(opts("puts_total", "Entries written"))?;
        let removals = IntCounter::with_opts(opts("removals_total", "Entries explicitly removed"))?;
        let promotions =
            IntCounter::with_opts(opts("promotions_total", "Entries moved to the fastest tier on access"))?;
        let demotions = IntCounterVec::new(
            opts("demotions_total", "Entries moved to a slower tier, by source tier"),
            &["tier"],
        )?;
        let evictions =
            IntCounter::with_opts(opts("evictions_total", "Entries evicted from the cache entirely"))?;
        let expirations = IntCounter::with_opts(opts("expirations_total", "Entries removed on expiry"))?;
        let rejections =
            IntCounter::with_opts(opts("rejections_total", "Writes rejected as too large"))?;
        let storage_failures =
            IntCounter::with_opts(opts("storage_failures_total", "Durable tier I/O failures"))?;
        let entries = IntGaugeVec::new(opts("entries", "Resident entries, by tier"), &["tier"])?;
        let occupancy =
            IntGaugeVec::new(opts("occupancy", "Occupancy in the tier's unit, by tier"), &["tier"])?;
        let capacity =
            IntGaugeVec::new(opts("capacity", "Capacity in the tier's unit, by tier"), &["tier"])?;

        registry.register(Box::new(hits.clone()))?;
        registry.register(Box::new(misses.clone()))?;
        registry.register(Box::new(puts.clone()))?;
        registry.register(Box::new(removals.clone()))?;
        registry.register(Box::new(promotions.clone()))?;
        registry.register(Box::new(demotions.clone()))?;
        registry.register(Box::new(evictions.clone()))?;
        registry.register(Box::new(expirations.clone()))?;
        registry.register(Box::new(rejections.clone()))?;
        registry.register(Box::new(storage_failures.clone()))?;
        registry.register(Box::new(entries.clone()))?;
        registry.register(Box::new(occupancy.clone()))?;
        registry.register(Box::new(capacity.clone()))?;

        for tier in &tiers {
            hits.with_label_values(&[tier.as_str()]);
            demotions.with_label_values(&[tier.as_str()]);
        }

        Ok(Self {
            registry,
            tiers,
            hits,
            misses,
            puts,
            removals,
            promotions,
            demotions,
            evictions,
            expirations,
            rejections,
            storage_failures,
            entries,
            occupancy,
            capacity,
        })
    }

    pub fn record_hit(&self, tier: &str) {
        self.hits.with_label_values(&[tier]).inc();
    }

    pub fn record_miss(&self) {
        self.misses.inc();
    }

    pub fn record_put(&self) {
        self.puts.inc();
    }

    pub fn record_removal(&self) {
        self.removals.inc();
    }

    pub fn record_promotion(&self) {
        self.promotions.inc();
    }

    pub fn record_demotion(&self, from: &str) {
        self.demotions.with_label_values(&[from]).inc();
    }

    pub fn record_eviction(&self) {
        self.evictions.inc();
    }

    pub fn record_expiration(&self) {
        self.expirations.inc();
    }

    pub fn record_rejection(&self) {
        self.rejections.inc();
    }

    pub fn record_storage_failure(&self) {
        self.storage_failures.inc();
    }

    /// Refresh per-tier gauges.
    pub fn observe_tier(&self, stats: &TierStats) {
        let label = stats.tier.label();
        self.entries
            .with_label_values(&[label.as_str()])
            .set(stats.entries as i64);
        self.occupancy
            .with_label_values(&[label.as_str()])
            .set(stats.occupancy as i64);
        self.capacity
            .with_label_values(&[label.as_str()])
            .set(stats.capacity as i64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self
            .tiers
            .iter()
            .map(|t| self.hits.with_label_values(&[t.as_str()]).get())
            .sum();
        let demotions = self
            .tiers
            .iter()
            .map(|t| self.demotions.with_label_values(&[t.as_str()]).get())
            .sum();

        MetricsSnapshot {
            hits,
            misses: self.misses.get(),
            puts: self.puts.get(),
            removals: self.removals.get(),
            promotions: self.promotions.get(),
            demotions,
            evictions: self.evictions.get(),
            expirations: self.expirations.get(),
            rejections: self.rejections.get(),
            storage_failures: self.storage_failures.get(),
        }
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
