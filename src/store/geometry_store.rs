//! Deduplicated geometry store.
//!
//! Overlapping tile fetches deliver the same airspace many times. The store
//! gives each airspace one identity, persists it once, and skips rewrites
//! while its geometry is unchanged.
//!
//! # Tiers
//!
//! ```text
//!            get_geometry / get_geometries
//!                        │
//!                        ▼
//!          ┌───────────────────────────┐
//!          │  LRU (Arc<CachedGeometry>) │  bounded working set
//!          └─────────────┬─────────────┘
//!                        │ miss
//!                        ▼
//!          ┌───────────────────────────┐
//!          │       GeometryTier        │  durable, batched I/O
//!          └───────────────────────────┘
//! ```
//!
//! # Failure Handling
//!
//! Malformed features are logged and skipped. Durable-tier errors are logged
//! where they happen; lookups degrade to less data and writes return the
//! error to the caller. Nothing here panics on bad input.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use lru::LruCache;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::entry::CachedGeometry;
use super::tier::GeometryTier;
use crate::error::CacheError;
use crate::geometry::{self, codec, AirspaceFeature};
use crate::stats::{
    hit_rate, CacheResult, GeometryCacheStatistics, HitCounter, PerformanceMetrics,
};

/// Default number of geometries kept in memory.
pub const DEFAULT_MEMORY_CAPACITY: usize = 50_000;

/// Default age after which a geometry is considered expired (7 days).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Number of ids reported in [`PerformanceMetrics::top_duplicates`].
const TOP_DUPLICATES: usize = 10;

// =============================================================================
// Configuration and Outcomes
// =============================================================================

/// Geometry store settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryStoreConfig {
    /// Maximum number of entries in the in-memory LRU
    pub memory_capacity: usize,

    /// Age after which entries count as expired
    pub max_age: Duration,
}

impl Default for GeometryStoreConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

/// Result of ingesting one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PutOutcome {
    /// New id, written
    Inserted,
    /// Known id with a different geometry, overwritten
    Replaced,
    /// Known id with the same geometry, nothing written
    Unchanged,
    /// Geometry empty or of an unsupported type
    Ignored,
}

/// Counts from one batch ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub received: usize,
    pub malformed: usize,
    pub ignored: usize,
    /// Repeated ids within the batch itself
    pub duplicates_in_batch: usize,
    /// Ids already in the durable tier, skipped
    pub already_present: usize,
    pub written: usize,
}

// =============================================================================
// GeometryStore
// =============================================================================

/// Two-tier store of unique airspace geometries.
///
/// # Thread Safety
///
/// The store is `Send + Sync` when its tier is and can be shared via `Arc`.
/// It adds no locking around writes: concurrent writes to the same id are
/// last-write-wins, as in the tier.
pub struct GeometryStore<T: GeometryTier> {
    tier: T,

    /// Hot entries, most recently used first
    memory: RwLock<LruCache<String, Arc<CachedGeometry>>>,

    /// Re-deliveries of unchanged geometries, by id
    duplicates: Mutex<HashMap<String, u64>>,

    memory_counter: HitCounter,
    durable_counter: HitCounter,
    writes: AtomicU64,
    unchanged: AtomicU64,
    malformed: AtomicU64,

    config: GeometryStoreConfig,
}

impl<T: GeometryTier> GeometryStore<T> {
    /// Create a store with default capacity and max age.
    pub fn new(tier: T) -> Self {
        Self::with_config(tier, GeometryStoreConfig::default())
    }

    /// Create a store with custom settings.
    ///
    /// A `memory_capacity` of zero is treated as one.
    pub fn with_config(tier: T, config: GeometryStoreConfig) -> Self {
        let capacity = NonZeroUsize::new(config.memory_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            tier,
            memory: RwLock::new(LruCache::new(capacity)),
            duplicates: Mutex::new(HashMap::new()),
            memory_counter: HitCounter::new(),
            durable_counter: HitCounter::new(),
            writes: AtomicU64::new(0),
            unchanged: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            config,
        }
    }

    pub fn tier(&self) -> &T {
        &self.tier
    }

    pub fn config(&self) -> GeometryStoreConfig {
        self.config
    }

    /// Identity for a normalized feature. Pure, no I/O.
    pub fn generate_id(feature: &AirspaceFeature) -> String {
        geometry::generate_id(feature)
    }

    // -------------------------------------------------------------------------
    // Ingestion
    // -------------------------------------------------------------------------

    /// Ingest one provider feature in either accepted shape.
    pub async fn put_geometry(&self, feature: &Value) -> Result<PutOutcome, CacheError> {
        let feature = match AirspaceFeature::from_value(feature) {
            Ok(Some(feature)) => feature,
            Ok(None) => {
                debug!("Ignoring feature without polygon geometry");
                return Ok(PutOutcome::Ignored);
            }
            Err(e) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Skipping malformed airspace feature");
                return Err(e.into());
            }
        };
        self.put_feature(&feature).await
    }

    /// Ingest an already normalized feature.
    pub async fn put_feature(&self, feature: &AirspaceFeature) -> Result<PutOutcome, CacheError> {
        let id = geometry::generate_id(feature);
        let hash = codec::hash_of(&feature.rings);

        let existing = self.find_existing(&id).await?;
        if let Some(existing) = &existing {
            if existing.geometry_hash == hash {
                self.record_duplicate(&id).await;
                self.unchanged.fetch_add(1, Ordering::Relaxed);
                return Ok(PutOutcome::Unchanged);
            }
        }

        let entry = Arc::new(CachedGeometry::build(
            id.clone(),
            hash,
            feature,
            SystemTime::now(),
        ));
        if let Err(e) = self.tier.put_geometry(&entry).await {
            warn!(id = %id, error = %e, "Failed to persist geometry");
            return Err(e.into());
        }

        self.memory.write().await.put(id.clone(), entry);
        self.writes.fetch_add(1, Ordering::Relaxed);

        if existing.is_some() {
            debug!(id = %id, "Replaced changed geometry");
            Ok(PutOutcome::Replaced)
        } else {
            Ok(PutOutcome::Inserted)
        }
    }

    /// Ingest many features with one existence check and one write.
    ///
    /// Ids already present in the durable tier are skipped even if their
    /// geometry changed; use [`put_geometry`](Self::put_geometry) to force
    /// change detection for a single feature.
    pub async fn put_geometry_batch(&self, features: &[Value]) -> Result<BatchOutcome, CacheError> {
        let mut outcome = BatchOutcome {
            received: features.len(),
            ..Default::default()
        };

        let mut seen = HashSet::with_capacity(features.len());
        let mut pending: Vec<(String, AirspaceFeature)> = Vec::with_capacity(features.len());

        for value in features {
            match AirspaceFeature::from_value(value) {
                Ok(Some(feature)) => {
                    let id = geometry::generate_id(&feature);
                    if seen.insert(id.clone()) {
                        pending.push((id, feature));
                    } else {
                        outcome.duplicates_in_batch += 1;
                        self.record_duplicate(&id).await;
                    }
                }
                Ok(None) => outcome.ignored += 1,
                Err(e) => {
                    outcome.malformed += 1;
                    warn!(error = %e, "Skipping malformed airspace feature in batch");
                }
            }
        }
        self.malformed
            .fetch_add(outcome.malformed as u64, Ordering::Relaxed);

        if pending.is_empty() {
            return Ok(outcome);
        }

        let ids: Vec<String> = pending.iter().map(|(id, _)| id.clone()).collect();
        let existing = match self.tier.get_existing_ids(&ids).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(count = ids.len(), error = %e, "Existence check failed for batch");
                return Err(e.into());
            }
        };

        let now = SystemTime::now();
        let mut entries = Vec::with_capacity(pending.len() - existing.len().min(pending.len()));
        for (id, feature) in pending {
            if existing.contains(&id) {
                outcome.already_present += 1;
                self.record_duplicate(&id).await;
                continue;
            }
            let hash = codec::hash_of(&feature.rings);
            entries.push(CachedGeometry::build(id, hash, &feature, now));
        }

        if !entries.is_empty() {
            if let Err(e) = self.tier.put_geometry_batch(&entries).await {
                warn!(count = entries.len(), error = %e, "Batch write failed");
                return Err(e.into());
            }

            outcome.written = entries.len();
            let mut memory = self.memory.write().await;
            for entry in entries {
                memory.put(entry.id.clone(), Arc::new(entry));
            }
        }
        self.writes
            .fetch_add(outcome.written as u64, Ordering::Relaxed);

        debug!(
            received = outcome.received,
            written = outcome.written,
            already_present = outcome.already_present,
            duplicates_in_batch = outcome.duplicates_in_batch,
            malformed = outcome.malformed,
            "Ingested geometry batch"
        );
        Ok(outcome)
    }

    /// Current entry for `id` without touching LRU order or statistics.
    async fn find_existing(&self, id: &str) -> Result<Option<Arc<CachedGeometry>>, CacheError> {
        if let Some(entry) = self.memory.read().await.peek(id) {
            return Ok(Some(entry.clone()));
        }
        match self.tier.get_geometry(id).await {
            Ok(entry) => Ok(entry.map(Arc::new)),
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to read geometry for change detection");
                Err(e.into())
            }
        }
    }

    async fn record_duplicate(&self, id: &str) {
        let mut duplicates = self.duplicates.lock().await;
        *duplicates.entry(id.to_string()).or_insert(0) += 1;
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// Look up `id`, memory first, then the durable tier.
    ///
    /// Memory hits are promoted; durable hits are inserted into memory. A hit
    /// is flagged stale when the entry is past the configured max age.
    pub async fn lookup(&self, id: &str) -> CacheResult<Arc<CachedGeometry>> {
        {
            let mut memory = self.memory.write().await;
            if let Some(entry) = memory.get(id) {
                self.memory_counter.record_hit();
                return self.hit(entry.clone());
            }
        }
        self.memory_counter.record_miss();

        match self.tier.get_geometry(id).await {
            Ok(Some(entry)) => {
                self.durable_counter.record_hit();
                let entry = Arc::new(entry);
                self.memory
                    .write()
                    .await
                    .put(id.to_string(), entry.clone());
                self.hit(entry)
            }
            Ok(None) => {
                self.durable_counter.record_miss();
                CacheResult::Miss
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Durable lookup failed");
                CacheResult::Error(e.to_string())
            }
        }
    }

    fn hit(&self, entry: Arc<CachedGeometry>) -> CacheResult<Arc<CachedGeometry>> {
        let stale = entry.is_expired(self.config.max_age);
        CacheResult::Hit {
            value: entry,
            stale,
        }
    }

    /// Entry for `id`, or `None` when absent or unreadable.
    pub async fn get_geometry(&self, id: &str) -> Option<Arc<CachedGeometry>> {
        self.lookup(id).await.into_value()
    }

    /// Entries for the ids that exist.
    ///
    /// Memory-resident ids are served directly; the rest come from one
    /// batched durable read. The result never contains an id outside `ids`
    /// and never contains the same id twice.
    pub async fn get_geometries(&self, ids: &HashSet<String>) -> Vec<Arc<CachedGeometry>> {
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();

        {
            let mut memory = self.memory.write().await;
            for id in ids {
                match memory.get(id) {
                    Some(entry) => {
                        self.memory_counter.record_hit();
                        found.push(entry.clone());
                    }
                    None => {
                        self.memory_counter.record_miss();
                        missing.push(id.clone());
                    }
                }
            }
        }

        if missing.is_empty() {
            return found;
        }

        let loaded = match self.tier.get_geometries(&missing).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(count = missing.len(), error = %e, "Durable batch lookup failed");
                return found;
            }
        };

        let mut wanted: HashSet<&str> = missing.iter().map(String::as_str).collect();
        let mut memory = self.memory.write().await;
        for entry in loaded {
            if !wanted.remove(entry.id.as_str()) {
                continue;
            }
            self.durable_counter.record_hit();
            let entry = Arc::new(entry);
            memory.put(entry.id.clone(), entry.clone());
            found.push(entry);
        }
        for _ in 0..wanted.len() {
            self.durable_counter.record_miss();
        }

        found
    }

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------

    /// Drop the in-memory tier only. Durable data and statistics are kept.
    pub async fn clear_memory_cache(&self) {
        let mut memory = self.memory.write().await;
        let dropped = memory.len();
        memory.clear();
        info!(dropped, "Cleared in-memory geometry cache");
    }

    /// Drop both tiers and reset statistics.
    pub async fn clear_all_cache(&self) -> Result<(), CacheError> {
        self.memory.write().await.clear();
        if let Err(e) = self.tier.clear_cache().await {
            warn!(error = %e, "Failed to clear durable geometry tier");
            return Err(e.into());
        }
        self.clear_statistics().await;
        info!("Cleared all geometry caches");
        Ok(())
    }

    /// Reset counters without touching cached data.
    pub async fn clear_statistics(&self) {
        self.memory_counter.reset();
        self.durable_counter.reset();
        self.writes.store(0, Ordering::Relaxed);
        self.unchanged.store(0, Ordering::Relaxed);
        self.malformed.store(0, Ordering::Relaxed);
        self.duplicates.lock().await.clear();
    }

    /// Remove expired entries from the durable tier, and from memory.
    pub async fn clean_expired_data(&self) -> Result<usize, CacheError> {
        let removed = match self.tier.clean_expired_data(self.config.max_age).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Expiry sweep failed");
                return Err(e.into());
            }
        };

        let now = SystemTime::now();
        let mut memory = self.memory.write().await;
        let expired: Vec<String> = memory
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(self.config.max_age, now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            memory.pop(id);
        }

        info!(removed, evicted_from_memory = expired.len(), "Expired geometries cleaned");
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Number of entries currently in memory.
    pub async fn memory_len(&self) -> usize {
        self.memory.read().await.len()
    }

    /// Whether `id` is in memory, without changing LRU order.
    pub async fn is_in_memory(&self, id: &str) -> bool {
        self.memory.read().await.contains(id)
    }

    /// Times an unchanged geometry for `id` was re-delivered.
    pub async fn duplicate_count(&self, id: &str) -> u64 {
        self.duplicates.lock().await.get(id).copied().unwrap_or(0)
    }

    pub async fn get_statistics(&self) -> GeometryCacheStatistics {
        let (duplicate_references, duplicated_ids) = {
            let duplicates = self.duplicates.lock().await;
            let total: u64 = duplicates.values().sum();
            (total, duplicates.len())
        };

        let durable = match self.tier.statistics().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "Failed to read durable tier statistics");
                None
            }
        };

        GeometryCacheStatistics {
            memory_entries: self.memory_len().await,
            memory_capacity: self.memory.read().await.cap().get(),
            memory_hits: self.memory_counter.hits(),
            memory_misses: self.memory_counter.misses(),
            memory_hit_rate: self.memory_counter.hit_rate(),
            durable_hits: self.durable_counter.hits(),
            durable_misses: self.durable_counter.misses(),
            durable_hit_rate: self.durable_counter.hit_rate(),
            duplicate_references,
            duplicated_ids,
            durable,
        }
    }

    pub async fn get_performance_metrics(&self) -> PerformanceMetrics {
        let memory_hits = self.memory_counter.hits();
        let lookups = memory_hits + self.memory_counter.misses();
        let answered = memory_hits + self.durable_counter.hits();

        let (top_duplicates, avg_duplicates_per_id) = {
            let duplicates = self.duplicates.lock().await;
            let mut ranked: Vec<(String, u64)> = duplicates
                .iter()
                .map(|(id, count)| (id.clone(), *count))
                .collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            ranked.truncate(TOP_DUPLICATES);

            let total: u64 = duplicates.values().sum();
            let avg = if duplicates.is_empty() {
                0.0
            } else {
                total as f64 / duplicates.len() as f64
            };
            (ranked, avg)
        };

        PerformanceMetrics {
            memory_hit_rate: self.memory_counter.hit_rate(),
            durable_hit_rate: self.durable_counter.hit_rate(),
            overall_hit_rate: hit_rate(answered, lookups.saturating_sub(answered)),
            geometries_written: self.writes.load(Ordering::Relaxed),
            unchanged_skips: self.unchanged.load(Ordering::Relaxed),
            malformed_features: self.malformed.load(Ordering::Relaxed),
            avg_duplicates_per_id,
            top_duplicates,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
