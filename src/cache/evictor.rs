//! Eviction policy: decides which resident entry leaves a full tier.
//!
//! Every policy is a total order over resident entries; the victim is the
//! minimum. Ties are broken by insertion ordinal (oldest first), which is
//! unique per entry, so selection is deterministic for a fixed set of
//! entries and metadata.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::cache::entry::EntryMeta;

/// A resident entry offered to the policy.
#[derive(Debug, Clone, Copy)]
pub struct EvictionCandidate<'a, K> {
    pub key: &'a K,
    pub meta: &'a EntryMeta,
}

impl<'a, K> EvictionCandidate<'a, K> {
    pub fn new(key: &'a K, meta: &'a EntryMeta) -> Self {
        Self { key, meta }
    }

    pub fn size(&self) -> u64 {
        self.meta.size
    }

    pub fn last_access(&self) -> u64 {
        self.meta.last_access
    }

    pub fn inserted(&self) -> u64 {
        self.meta.inserted
    }

    pub fn hits(&self) -> u64 {
        self.meta.hits
    }
}

type Comparator<K> =
    dyn Fn(&EvictionCandidate<'_, K>, &EvictionCandidate<'_, K>) -> Ordering + Send + Sync;

/// Victim selection strategy.
pub enum EvictionPolicy<K> {
    /// Least recently used: oldest access ordinal.
    Lru,
    /// Least frequently used: fewest hits, then oldest access.
    Lfu,
    /// First in, first out: oldest insertion.
    Fifo,
    /// Caller-supplied order; the minimum is evicted.
    Custom(Arc<Comparator<K>>),
}

impl<K> EvictionPolicy<K> {
    /// Policy ordering entries by `cmp`; the entry comparing lowest is evicted.
    pub fn custom<F>(cmp: F) -> Self
    where
        F: Fn(&EvictionCandidate<'_, K>, &EvictionCandidate<'_, K>) -> Ordering + Send + Sync + 'static,
    {
        EvictionPolicy::Custom(Arc::new(cmp))
    }

    pub fn name(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Fifo => "fifo",
            EvictionPolicy::Custom(_) => "custom",
        }
    }

    /// Order two candidates; `Less` means `a` is evicted before `b`.
    pub fn compare(&self, a: &EvictionCandidate<'_, K>, b: &EvictionCandidate<'_, K>) -> Ordering {
        let primary = match self {
            EvictionPolicy::Lru => a.last_access().cmp(&b.last_access()),
            EvictionPolicy::Lfu => a
                .hits()
                .cmp(&b.hits())
                .then_with(|| a.last_access().cmp(&b.last_access())),
            EvictionPolicy::Fifo => Ordering::Equal,
            EvictionPolicy::Custom(cmp) => cmp(a, b),
        };
        primary.then_with(|| a.inserted().cmp(&b.inserted()))
    }

    /// Select the victim among `candidates`. `None` only when there are none.
    pub fn select_victim<'a, I>(&self, candidates: I) -> Option<&'a K>
    where
        I: IntoIterator<Item = EvictionCandidate<'a, K>>,
        K: 'a,
    {
        candidates
            .into_iter()
            .min_by(|a, b| self.compare(a, b))
            .map(|c| c.key)
    }
}

impl<K> Default for EvictionPolicy<K> {
    fn default() -> Self {
        EvictionPolicy::Lru
    }
}

impl<K> Clone for EvictionPolicy<K> {
    fn clone(&self) -> Self {
        match self {
            EvictionPolicy::Lru => EvictionPolicy::Lru,
            EvictionPolicy::Lfu => EvictionPolicy::Lfu,
            EvictionPolicy::Fifo => EvictionPolicy::Fifo,
            EvictionPolicy::Custom(cmp) => EvictionPolicy::Custom(Arc::clone(cmp)),
        }
    }
}

impl<K> fmt::Debug for EvictionPolicy<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
