//! Cache outcomes and statistics.
//!
//! Both cache tiers report lookups as a [`CacheResult`] and count them with a
//! [`HitCounter`]. Counters only grow until `reset` is called, which is
//! independent from clearing cached data.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult<T> {
    /// Entry found; `stale` is set when it is past its time-to-live
    Hit { value: T, stale: bool },

    /// No entry
    Miss,

    /// Lookup failed
    Error(String),
}

impl<T> CacheResult<T> {
    pub fn fresh(value: T) -> Self {
        CacheResult::Hit {
            value,
            stale: false,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, CacheResult::Hit { .. })
    }

    /// Hit that is still within its time-to-live.
    pub fn is_fresh_hit(&self) -> bool {
        matches!(self, CacheResult::Hit { stale: false, .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CacheResult::Error(_))
    }

    /// The value of any hit, stale or not.
    pub fn into_value(self) -> Option<T> {
        match self {
            CacheResult::Hit { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
        match self {
            CacheResult::Hit { value, stale } => CacheResult::Hit {
                value: f(value),
                stale,
            },
            CacheResult::Miss => CacheResult::Miss,
            CacheResult::Error(message) => CacheResult::Error(message),
        }
    }
}

/// `hits / (hits + misses)`, or `0.0` before any lookup.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Monotonic hit/miss counter shared across tasks.
#[derive(Debug, Default)]
pub struct HitCounter {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HitCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits(), self.misses())
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Snapshot reported by the durable geometry tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierStatistics {
    pub geometry_count: usize,
    pub database_size_bytes: u64,
    pub total_compressed_size: u64,
    /// Uncompressed over compressed bytes, `0.0` when empty
    pub avg_compression_ratio: f64,
}

/// Snapshot of the geometry store, recomputed on every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeometryCacheStatistics {
    pub memory_entries: usize,
    pub memory_capacity: usize,
    pub memory_hits: u64,
    pub memory_misses: u64,
    pub memory_hit_rate: f64,
    pub durable_hits: u64,
    pub durable_misses: u64,
    pub durable_hit_rate: f64,
    /// Total times an unchanged geometry was re-delivered
    pub duplicate_references: u64,
    /// Distinct ids that were re-delivered at least once
    pub duplicated_ids: usize,
    /// `None` when the durable tier could not be queried
    pub durable: Option<TierStatistics>,
}

/// Derived performance figures of the geometry store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub memory_hit_rate: f64,
    pub durable_hit_rate: f64,
    /// Lookups answered by either tier over all lookups
    pub overall_hit_rate: f64,
    pub geometries_written: u64,
    pub unchanged_skips: u64,
    pub malformed_features: u64,
    /// Average re-deliveries per duplicated id
    pub avg_duplicates_per_id: f64,
    /// Most re-delivered ids, highest first
    pub top_duplicates: Vec<(String, u64)>,
}

/// Snapshot of the spatial tile cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileCacheStatistics {
    pub zoom: u8,
    pub entries: usize,
    pub max_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
    pub total_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
}
