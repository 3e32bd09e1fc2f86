//! Canonical stored airspace record.

use std::time::{Duration, SystemTime};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CodecError;
use crate::geometry::{codec, AirspaceFeature, BoundingBox, Ring};

/// One unique airspace, as persisted.
///
/// Values are never mutated in place. A changed airspace produces a new
/// `CachedGeometry` that replaces the old one under the same `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedGeometry {
    pub id: String,
    pub name: String,

    /// Opaque provider classification code
    pub type_code: i64,

    /// Precomputed altitude floor in feet
    pub lower_altitude_ft: Option<i32>,

    /// Provider properties after normalization
    pub properties: Map<String, Value>,

    /// Fixed-point ring buffer, see [`codec`]
    pub encoded_rings: Bytes,

    /// Digest of the vertex stream, for change detection only
    pub geometry_hash: String,

    /// When this value was computed
    pub fetch_time: SystemTime,

    pub compressed_size: usize,
    pub uncompressed_size: usize,
}

impl CachedGeometry {
    /// Build an entry from a normalized feature.
    ///
    /// `geometry_hash` must be `codec::hash_of(&feature.rings)`; callers compute
    /// it first to compare against the stored entry.
    pub fn build(
        id: String,
        geometry_hash: String,
        feature: &AirspaceFeature,
        fetch_time: SystemTime,
    ) -> Self {
        let encoded_rings = codec::encode(&feature.rings);
        Self {
            id,
            name: feature.name().to_string(),
            type_code: feature.type_code(),
            lower_altitude_ft: feature.lower_altitude_ft(),
            properties: feature.properties.clone(),
            compressed_size: encoded_rings.len(),
            uncompressed_size: codec::uncompressed_size(&feature.rings),
            encoded_rings,
            geometry_hash,
            fetch_time,
        }
    }

    pub fn rings(&self) -> Result<Vec<Ring>, CodecError> {
        codec::decode(&self.encoded_rings)
    }

    /// Bounds computed straight from the buffer (not memoized).
    pub fn bounds(&self) -> Result<Option<BoundingBox>, CodecError> {
        codec::bounds_of(&self.encoded_rings)
    }

    /// Age relative to `now`; zero when `fetch_time` lies in the future.
    pub fn age_at(&self, now: SystemTime) -> Duration {
        now.duration_since(self.fetch_time).unwrap_or_default()
    }

    /// Whether the entry is older than `max_age` at `now`.
    pub fn is_expired_at(&self, max_age: Duration, now: SystemTime) -> bool {
        self.age_at(now) > max_age
    }

    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.is_expired_at(max_age, SystemTime::now())
    }

    /// Uncompressed over compressed size, `0.0` for an empty buffer.
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed_size == 0 {
            0.0
        } else {
            self.uncompressed_size as f64 / self.compressed_size as f64
        }
    }

    /// Rough in-storage footprint in bytes.
    pub fn approximate_size(&self) -> u64 {
        let properties = serde_json::to_vec(&self.properties)
            .map(|v| v.len())
            .unwrap_or(0);
        (self.id.len()
            + self.name.len()
            + self.geometry_hash.len()
            + self.encoded_rings.len()
            + properties) as u64
    }
}
