//! Test utilities for integration tests.
//!
//! This module provides a durable tier that counts round trips and helpers
//! for building provider GeoJSON fixtures.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};

use airspace_cache::error::TierError;
use airspace_cache::stats::TierStatistics;
use airspace_cache::store::{CachedGeometry, GeometryTier, MemoryGeometryTier};
use airspace_cache::tile::TileCoord;

// =============================================================================
// Counting Durable Tier
// =============================================================================

/// A durable tier that tracks every round trip and can be made to fail.
///
/// Clones share the same state, so a test can keep a handle after moving
/// the tier into a store.
#[derive(Clone, Default)]
pub struct CountingTier {
    inner: Arc<MemoryGeometryTier>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    existence_checks: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl CountingTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn existence_checks(&self) -> usize {
        self.existence_checks.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn reset_tracking(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
        self.existence_checks.store(0, Ordering::SeqCst);
    }

    pub async fn stored(&self) -> usize {
        self.inner.len().await
    }

    fn check(&self) -> Result<(), TierError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(TierError::Unavailable("tier switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GeometryTier for CountingTier {
    async fn put_geometry(&self, entry: &CachedGeometry) -> Result<(), TierError> {
        self.check()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put_geometry(entry).await
    }

    async fn get_geometry(&self, id: &str) -> Result<Option<CachedGeometry>, TierError> {
        self.check()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_geometry(id).await
    }

    async fn get_geometries(&self, ids: &[String]) -> Result<Vec<CachedGeometry>, TierError> {
        self.check()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_geometries(ids).await
    }

    async fn get_existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, TierError> {
        self.check()?;
        self.existence_checks.fetch_add(1, Ordering::SeqCst);
        self.inner.get_existing_ids(ids).await
    }

    async fn put_geometry_batch(&self, entries: &[CachedGeometry]) -> Result<(), TierError> {
        self.check()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put_geometry_batch(entries).await
    }

    async fn statistics(&self) -> Result<TierStatistics, TierError> {
        self.check()?;
        self.inner.statistics().await
    }

    async fn clean_expired_data(&self, max_age: Duration) -> Result<usize, TierError> {
        self.check()?;
        self.inner.clean_expired_data(max_age).await
    }

    async fn clear_cache(&self) -> Result<(), TierError> {
        self.check()?;
        self.inner.clear_cache().await
    }
}

// =============================================================================
// GeoJSON Fixtures
// =============================================================================

/// Closed square ring with its south-west corner at `(lon, lat)`.
pub fn square(lon: f64, lat: f64, size: f64) -> Value {
    json!([[
        [lon, lat],
        [lon + size, lat],
        [lon + size, lat + size],
        [lon, lat + size],
        [lon, lat]
    ]])
}

/// Standard GeoJSON feature with a provider id.
pub fn airspace_feature(id: &str, name: &str, lon: f64, lat: f64, size: f64) -> Value {
    json!({
        "type": "Feature",
        "properties": {
            "_id": id,
            "name": name,
            "type": 4,
            "country": "CH",
            "lowerLimit": {"value": 0, "unit": 1, "referenceDatum": 0},
            "upperLimit": {"value": 95, "unit": 6, "referenceDatum": 2}
        },
        "geometry": {"type": "Polygon", "coordinates": square(lon, lat, size)}
    })
}

/// Flattened provider feature with a provider id.
pub fn flattened_feature(id: &str, name: &str, lon: f64, lat: f64, size: f64) -> Value {
    json!({
        "_id": id,
        "name": name,
        "type": 4,
        "country": "CH",
        "geometry": {"type": "Polygon", "coordinates": square(lon, lat, size)}
    })
}

/// Standard feature without any provider id.
pub fn anonymous_feature(name: &str, type_code: i64, lon: f64, lat: f64) -> Value {
    json!({
        "type": "Feature",
        "properties": {"name": name, "type": type_code, "country": "FR"},
        "geometry": {"type": "Polygon", "coordinates": square(lon, lat, 0.1)}
    })
}

/// Raw provider response body holding `features`.
pub fn feature_collection(features: Vec<Value>) -> Bytes {
    Bytes::from(json!({"type": "FeatureCollection", "features": features}).to_string())
}

/// Simulated provider response for a tile.
///
/// Every tile returns the shared airspace `AS-100` plus one airspace local to
/// the tile, placed at the tile's centre.
pub fn provider_response(tile: &TileCoord) -> Bytes {
    let center = tile.bounds().center();
    feature_collection(vec![
        airspace_feature("AS-100", "TMA LARGE", 5.0, 45.0, 6.0),
        airspace_feature(
            &local_id(tile),
            "LOCAL",
            center.lon,
            center.lat,
            0.05,
        ),
    ])
}

pub fn local_id(tile: &TileCoord) -> String {
    format!("T-{}-{}-{}", tile.zoom, tile.x, tile.y)
}

/// Features of a merged or raw response body.
pub fn features_of(body: &Bytes) -> Vec<Value> {
    let value: Value = serde_json::from_slice(body).expect("response should be JSON");
    value["features"]
        .as_array()
        .expect("response should have features")
        .clone()
}
