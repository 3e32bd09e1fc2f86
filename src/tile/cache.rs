//! Spatial cache for raw provider tile responses.
//!
//! This module memoizes one provider response per slippy-map tile at a fixed
//! zoom, so panning back over an area already seen does not hit the network.
//!
//! # Tile Lifecycle
//!
//! ```text
//! Unfetched ──cache_tile──► Fresh ──TTL elapses──► Stale ──evict──► Evicted
//!                             ▲                      │
//!                             └──────cache_tile──────┘
//! ```
//!
//! Stale entries count as misses for viewport lookups but stay cached until
//! they are overwritten or evicted.
//!
//! # Eviction
//!
//! The cache holds at most `max_entries` tiles. Inserting a new tile into a
//! full cache first removes the single oldest entry by timestamp. Lookups do
//! not refresh an entry's age.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::debug;

use super::coords::{self, TileCoord, MAX_ZOOM};
use crate::error::TileError;
use crate::geometry::BoundingBox;
use crate::stats::{CacheResult, HitCounter, TileCacheStatistics};

/// Default tiling zoom level.
pub const DEFAULT_TILE_ZOOM: u8 = 8;

/// Default time-to-live of a cached response (24 hours).
pub const DEFAULT_TILE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default maximum number of cached tiles.
pub const DEFAULT_MAX_TILES: usize = 500;

// =============================================================================
// Configuration
// =============================================================================

/// Spatial tile cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCacheConfig {
    /// Fixed zoom level of the tiling
    pub zoom: u8,

    /// Age after which a cached response is stale
    pub ttl: Duration,

    /// Maximum number of cached tiles
    pub max_entries: usize,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_TILE_ZOOM,
            ttl: DEFAULT_TILE_TTL,
            max_entries: DEFAULT_MAX_TILES,
        }
    }
}

// =============================================================================
// Entries and Viewport Results
// =============================================================================

#[derive(Debug, Clone)]
struct TileCacheEntry {
    timestamp: SystemTime,
    body: Bytes,

    /// Insertion order, breaks ties between equal timestamps
    seq: u64,
}

impl TileCacheEntry {
    fn is_fresh(&self, ttl: Duration, now: SystemTime) -> bool {
        now.duration_since(self.timestamp).unwrap_or_default() < ttl
    }
}

/// Tiles covering a viewport, split into cached and missing.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportTiles {
    pub zoom: u8,

    /// Fresh cached responses, in tile order
    pub cached_responses: Vec<(TileCoord, Bytes)>,

    /// Tiles with no fresh entry; the caller fetches these
    pub tiles_to_fetch: Vec<TileCoord>,
}

impl ViewportTiles {
    /// Geographic bounds of `tile`, for building provider requests.
    pub fn bounds_of(&self, tile: &TileCoord) -> BoundingBox {
        tile.bounds()
    }

    /// Cached response bodies without their coordinates.
    pub fn responses(&self) -> Vec<Bytes> {
        self.cached_responses
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Whether every covering tile was served from cache.
    pub fn is_complete(&self) -> bool {
        self.tiles_to_fetch.is_empty()
    }

    pub fn tile_count(&self) -> usize {
        self.cached_responses.len() + self.tiles_to_fetch.len()
    }
}

// =============================================================================
// Spatial Tile Cache
// =============================================================================

/// Fixed-zoom cache of raw provider responses with TTL and a count cap.
///
/// The cache performs no network I/O. Callers fetch the tiles reported by
/// [`get_tiles_for_viewport`](Self::get_tiles_for_viewport) and hand the
/// responses back through [`cache_tile`](Self::cache_tile).
///
/// # Thread Safety
///
/// The cache is thread-safe and can be shared across async tasks via `Arc`.
/// Concurrent writes to the same tile are last-write-wins.
pub struct SpatialTileCache {
    entries: RwLock<HashMap<TileCoord, TileCacheEntry>>,
    next_seq: AtomicU64,
    counter: HitCounter,
    evictions: AtomicU64,
    config: TileCacheConfig,
}

impl SpatialTileCache {
    /// Create a cache. A `max_entries` of zero is treated as one.
    pub fn new(config: TileCacheConfig) -> Result<Self, TileError> {
        if config.zoom > MAX_ZOOM {
            return Err(TileError::InvalidZoom {
                zoom: config.zoom,
                max: MAX_ZOOM,
            });
        }
        Ok(Self {
            entries: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            counter: HitCounter::new(),
            evictions: AtomicU64::new(0),
            config: TileCacheConfig {
                max_entries: config.max_entries.max(1),
                ..config
            },
        })
    }

    pub fn config(&self) -> TileCacheConfig {
        self.config
    }

    pub fn zoom(&self) -> u8 {
        self.config.zoom
    }

    /// Tile containing a point at the cache zoom.
    pub fn to_tile_coords(&self, lat: f64, lon: f64) -> Result<TileCoord, TileError> {
        coords::to_tile_coords(lat, lon, self.config.zoom)
    }

    /// Bounds of tile `(x, y)` at the cache zoom.
    pub fn tile_to_bounds(&self, x: u32, y: u32) -> Result<BoundingBox, TileError> {
        coords::tile_to_bounds(x, y, self.config.zoom)
    }

    /// Split the tiles covering `viewport` into fresh cached responses and
    /// tiles to fetch.
    pub async fn get_tiles_for_viewport(
        &self,
        viewport: &BoundingBox,
    ) -> Result<ViewportTiles, TileError> {
        let tiles = coords::tiles_covering(viewport, self.config.zoom)?;
        let now = SystemTime::now();

        let mut cached_responses = Vec::new();
        let mut tiles_to_fetch = Vec::new();
        {
            let entries = self.entries.read().await;
            for tile in tiles {
                match entries.get(&tile) {
                    Some(entry) if entry.is_fresh(self.config.ttl, now) => {
                        self.counter.record_hit();
                        cached_responses.push((tile, entry.body.clone()));
                    }
                    _ => {
                        self.counter.record_miss();
                        tiles_to_fetch.push(tile);
                    }
                }
            }
        }

        debug!(
            zoom = self.config.zoom,
            cached = cached_responses.len(),
            to_fetch = tiles_to_fetch.len(),
            "Resolved viewport tiles"
        );

        Ok(ViewportTiles {
            zoom: self.config.zoom,
            cached_responses,
            tiles_to_fetch,
        })
    }

    /// Look up a single tile. Stale entries are reported as stale hits but
    /// counted as misses.
    pub async fn lookup_tile(&self, tile: &TileCoord) -> CacheResult<Bytes> {
        let entries = self.entries.read().await;
        match entries.get(tile) {
            Some(entry) => {
                let stale = !entry.is_fresh(self.config.ttl, SystemTime::now());
                if stale {
                    self.counter.record_miss();
                } else {
                    self.counter.record_hit();
                }
                CacheResult::Hit {
                    value: entry.body.clone(),
                    stale,
                }
            }
            None => {
                self.counter.record_miss();
                CacheResult::Miss
            }
        }
    }

    /// Store a freshly fetched response for tile `(x, y)`.
    pub async fn cache_tile(&self, x: u32, y: u32, body: Bytes) -> Result<(), TileError> {
        let tile = TileCoord::new(self.config.zoom, x, y)?;
        self.insert_tile(tile, body, SystemTime::now()).await
    }

    /// Store a response with an explicit fetch timestamp.
    ///
    /// Overwriting an existing tile never evicts. Inserting a new tile into a
    /// full cache first evicts the oldest entry.
    pub async fn insert_tile(
        &self,
        tile: TileCoord,
        body: Bytes,
        timestamp: SystemTime,
    ) -> Result<(), TileError> {
        if tile.zoom != self.config.zoom {
            return Err(TileError::ZoomMismatch {
                expected: self.config.zoom,
                actual: tile.zoom,
            });
        }
        let tile = TileCoord::new(tile.zoom, tile.x, tile.y)?;

        let mut entries = self.entries.write().await;
        if !entries.contains_key(&tile) && entries.len() >= self.config.max_entries {
            Self::evict_oldest(&mut entries);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            tile,
            TileCacheEntry {
                timestamp,
                body,
                seq,
            },
        );
        Ok(())
    }

    fn evict_oldest(entries: &mut HashMap<TileCoord, TileCacheEntry>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| (entry.timestamp, entry.seq))
            .map(|(tile, _)| *tile);
        if let Some(tile) = oldest {
            entries.remove(&tile);
            debug!(x = tile.x, y = tile.y, zoom = tile.zoom, "Evicted oldest tile");
        }
    }

    /// Whether `tile` has an entry, fresh or stale.
    pub async fn contains(&self, tile: &TileCoord) -> bool {
        self.entries.read().await.contains_key(tile)
    }

    pub async fn remove_tile(&self, tile: &TileCoord) -> Option<Bytes> {
        self.entries.write().await.remove(tile).map(|e| e.body)
    }

    /// Drop all cached tiles. Statistics are kept.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Reset hit, miss and eviction counters. Cached tiles are kept.
    pub fn clear_statistics(&self) {
        self.counter.reset();
        self.evictions.store(0, Ordering::Relaxed);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn statistics(&self) -> TileCacheStatistics {
        let now = SystemTime::now();
        let entries = self.entries.read().await;
        let fresh_entries = entries
            .values()
            .filter(|e| e.is_fresh(self.config.ttl, now))
            .count();

        TileCacheStatistics {
            zoom: self.config.zoom,
            entries: entries.len(),
            max_entries: self.config.max_entries,
            fresh_entries,
            stale_entries: entries.len() - fresh_entries,
            total_bytes: entries.values().map(|e| e.body.len()).sum(),
            hits: self.counter.hits(),
            misses: self.counter.misses(),
            hit_rate: self.counter.hit_rate(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
