//! Best-effort hit/miss accounting.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use serde::Serialize;

pub const METRIC_CACHE_HIT: &str = "magicbox_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "magicbox_cache_miss_total";

/// Process-lifetime counters.
///
/// Increments use relaxed ordering: the two counters are not read as one
/// consistent pair, and a snapshot taken mid-request may lag by one.
#[derive(Debug, Default)]
pub struct HitMissCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
}

impl HitMissCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_HIT).increment(1);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_MISS).increment(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
