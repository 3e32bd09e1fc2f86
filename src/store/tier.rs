//! Durable geometry tier.
//!
//! The geometry store sits in front of a [`GeometryTier`], a transactional
//! key/blob store keyed by geometry id. Two implementations are provided:
//!
//! - [`MemoryGeometryTier`]: process-local map, used in tests and when no
//!   cache file is configured
//! - [`FileGeometryTier`]: the same map persisted as a JSON snapshot that is
//!   replaced atomically on every write

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::entry::CachedGeometry;
use crate::error::TierError;
use crate::stats::TierStatistics;

/// Snapshot format version written by [`FileGeometryTier`].
const SNAPSHOT_VERSION: u32 = 1;

/// Persistence boundary for cached geometries.
///
/// Batch writes must land as a unit: on error, none of the batch is visible.
/// Concurrent writes to the same id are last-write-wins.
#[async_trait]
pub trait GeometryTier: Send + Sync {
    /// Insert or replace one entry.
    async fn put_geometry(&self, entry: &CachedGeometry) -> Result<(), TierError>;

    async fn get_geometry(&self, id: &str) -> Result<Option<CachedGeometry>, TierError>;

    /// Entries for the ids that exist; unknown ids are left out.
    async fn get_geometries(&self, ids: &[String]) -> Result<Vec<CachedGeometry>, TierError>;

    /// The subset of `ids` already stored.
    async fn get_existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, TierError>;

    /// Insert or replace many entries in one transaction.
    async fn put_geometry_batch(&self, entries: &[CachedGeometry]) -> Result<(), TierError>;

    async fn statistics(&self) -> Result<TierStatistics, TierError>;

    /// Remove entries older than `max_age`; returns how many were removed.
    async fn clean_expired_data(&self, max_age: Duration) -> Result<usize, TierError>;

    async fn clear_cache(&self) -> Result<(), TierError>;
}

// =============================================================================
// Shared map helpers
// =============================================================================

fn lookup_many(map: &HashMap<String, CachedGeometry>, ids: &[String]) -> Vec<CachedGeometry> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .filter_map(|id| map.get(id).cloned())
        .collect()
}

fn existing_ids(map: &HashMap<String, CachedGeometry>, ids: &[String]) -> HashSet<String> {
    ids.iter().filter(|id| map.contains_key(*id)).cloned().collect()
}

fn expired_ids(map: &HashMap<String, CachedGeometry>, max_age: Duration) -> Vec<String> {
    let now = SystemTime::now();
    map.values()
        .filter(|entry| entry.is_expired_at(max_age, now))
        .map(|entry| entry.id.clone())
        .collect()
}

fn map_statistics(map: &HashMap<String, CachedGeometry>, database_size_bytes: u64) -> TierStatistics {
    let total_compressed: u64 = map.values().map(|e| e.compressed_size as u64).sum();
    let total_uncompressed: u64 = map.values().map(|e| e.uncompressed_size as u64).sum();

    TierStatistics {
        geometry_count: map.len(),
        database_size_bytes,
        total_compressed_size: total_compressed,
        avg_compression_ratio: if total_compressed == 0 {
            0.0
        } else {
            total_uncompressed as f64 / total_compressed as f64
        },
    }
}

// =============================================================================
// MemoryGeometryTier
// =============================================================================

/// In-process durable tier.
///
/// Every operation runs under one lock acquisition, so batches are atomic.
#[derive(Debug, Default)]
pub struct MemoryGeometryTier {
    entries: RwLock<HashMap<String, CachedGeometry>>,
}

impl MemoryGeometryTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl GeometryTier for MemoryGeometryTier {
    async fn put_geometry(&self, entry: &CachedGeometry) -> Result<(), TierError> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn get_geometry(&self, id: &str) -> Result<Option<CachedGeometry>, TierError> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn get_geometries(&self, ids: &[String]) -> Result<Vec<CachedGeometry>, TierError> {
        Ok(lookup_many(&*self.entries.read().await, ids))
    }

    async fn get_existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, TierError> {
        Ok(existing_ids(&*self.entries.read().await, ids))
    }

    async fn put_geometry_batch(&self, batch: &[CachedGeometry]) -> Result<(), TierError> {
        let mut entries = self.entries.write().await;
        for entry in batch {
            entries.insert(entry.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn statistics(&self) -> Result<TierStatistics, TierError> {
        let entries = self.entries.read().await;
        let size = entries.values().map(CachedGeometry::approximate_size).sum();
        Ok(map_statistics(&entries, size))
    }

    async fn clean_expired_data(&self, max_age: Duration) -> Result<usize, TierError> {
        let mut entries = self.entries.write().await;
        let expired = expired_ids(&entries, max_age);
        for id in &expired {
            entries.remove(id);
        }
        Ok(expired.len())
    }

    async fn clear_cache(&self) -> Result<(), TierError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

// =============================================================================
// FileGeometryTier
// =============================================================================

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    geometries: Vec<CachedGeometry>,
}

/// Durable tier persisted to a JSON snapshot file.
///
/// Mutations are applied to the in-memory map, then the whole snapshot is
/// written to a sibling temporary file and renamed over the old one. If the
/// write fails the mutation is rolled back, so the map and the file stay in
/// step and a failed batch leaves the previous state untouched.
pub struct FileGeometryTier {
    path: PathBuf,
    entries: RwLock<HashMap<String, CachedGeometry>>,
}

impl FileGeometryTier {
    /// Open the snapshot at `path`, starting empty if it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, TierError> {
        let path = path.into();

        let entries = match tokio::fs::read(&path).await {
            Ok(data) => {
                let snapshot: Snapshot = serde_json::from_slice(&data)?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(TierError::Serialization(format!(
                        "unsupported snapshot version {} in {}",
                        snapshot.version,
                        path.display()
                    )));
                }
                snapshot
                    .geometries
                    .into_iter()
                    .map(|entry| (entry.id.clone(), entry))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            path = %path.display(),
            geometries = entries.len(),
            "Opened geometry snapshot"
        );

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot atomically (temp file + rename).
    async fn persist(&self, entries: &HashMap<String, CachedGeometry>) -> Result<(), TierError> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            geometries: entries.values().cloned().collect(),
        };
        let data = serde_json::to_vec(&snapshot)?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            geometries = entries.len(),
            bytes = data.len(),
            "Persisted geometry snapshot"
        );
        Ok(())
    }

    /// Insert `batch`, persist, and undo the inserts if persisting fails.
    async fn insert_all(&self, batch: &[CachedGeometry]) -> Result<(), TierError> {
        let mut entries = self.entries.write().await;

        let mut previous = Vec::with_capacity(batch.len());
        for entry in batch {
            let old = entries.insert(entry.id.clone(), entry.clone());
            previous.push((entry.id.clone(), old));
        }

        if let Err(e) = self.persist(&entries).await {
            for (id, old) in previous.into_iter().rev() {
                match old {
                    Some(old) => entries.insert(id, old),
                    None => entries.remove(&id),
                };
            }
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl GeometryTier for FileGeometryTier {
    async fn put_geometry(&self, entry: &CachedGeometry) -> Result<(), TierError> {
        self.insert_all(std::slice::from_ref(entry)).await
    }

    async fn get_geometry(&self, id: &str) -> Result<Option<CachedGeometry>, TierError> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn get_geometries(&self, ids: &[String]) -> Result<Vec<CachedGeometry>, TierError> {
        Ok(lookup_many(&*self.entries.read().await, ids))
    }

    async fn get_existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, TierError> {
        Ok(existing_ids(&*self.entries.read().await, ids))
    }

    async fn put_geometry_batch(&self, batch: &[CachedGeometry]) -> Result<(), TierError> {
        self.insert_all(batch).await
    }

    async fn statistics(&self) -> Result<TierStatistics, TierError> {
        let entries = self.entries.read().await;
        let size = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(map_statistics(&entries, size))
    }

    async fn clean_expired_data(&self, max_age: Duration) -> Result<usize, TierError> {
        let mut entries = self.entries.write().await;
        let expired = expired_ids(&entries, max_age);
        if expired.is_empty() {
            return Ok(0);
        }

        let removed: Vec<CachedGeometry> = expired
            .iter()
            .filter_map(|id| entries.remove(id))
            .collect();

        if let Err(e) = self.persist(&entries).await {
            for entry in removed {
                entries.insert(entry.id.clone(), entry);
            }
            return Err(e);
        }
        Ok(removed.len())
    }

    async fn clear_cache(&self) -> Result<(), TierError> {
        let mut entries = self.entries.write().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        entries.clear();
        Ok(())
    }
}
