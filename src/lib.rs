//! # Airspace Cache
//!
//! Two-tier caching for aviation airspace overlays.
//!
//! Airspace boundaries are fetched from a remote provider per map viewport.
//! They are large polygons that span many adjacent tiles and are requested
//! again on every pan or zoom. This library avoids both redundant network
//! calls for regions already seen and redundant storage of polygons returned
//! by overlapping requests.
//!
//! ## Features
//!
//! - **Spatial tile cache**: raw provider responses memoized per fixed-zoom
//!   slippy-map tile, with a time-to-live and an oldest-first count cap
//! - **Response merging**: overlapping tile responses merged into one
//!   feature collection without duplicates
//! - **Deduplicated geometry store**: one canonical compact record per
//!   airspace, written once and skipped while unchanged, behind an
//!   in-memory LRU
//! - **Pluggable durable tier**: in-memory or JSON snapshot file, or any
//!   [`GeometryTier`] implementation
//!
//! ## Architecture
//!
//! - [`geometry`] - feature normalization, identity and the fixed-point codec
//! - [`store`] - geometry store, durable tiers and derived-value cache
//! - [`tile`] - tile addressing, tile cache and response merging
//! - [`stats`] - cache outcomes and statistics
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use airspace_cache::{GeometryStore, MemoryGeometryTier, PutOutcome};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = GeometryStore::new(MemoryGeometryTier::new());
//!     let feature = json!({
//!         "type": "Feature",
//!         "properties": {"_id": "AS-100", "name": "CTR GENEVA", "type": 4},
//!         "geometry": {
//!             "type": "Polygon",
//!             "coordinates": [[[6.0, 46.0], [6.2, 46.0], [6.2, 46.3], [6.0, 46.0]]]
//!         }
//!     });
//!
//!     assert_eq!(store.put_geometry(&feature).await.unwrap(), PutOutcome::Inserted);
//!     assert_eq!(store.put_geometry(&feature).await.unwrap(), PutOutcome::Unchanged);
//!     assert!(store.get_geometry("AS-100").await.is_some());
//! }
//! ```

pub mod config;
pub mod error;
pub mod geometry;
pub mod stats;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use config::{CacheConfig, Cli, Command};
pub use error::{CacheError, CodecError, FeatureError, MergeError, TierError, TileError};
pub use geometry::{generate_id, AirspaceFeature, BoundingBox, LatLon, Ring};
pub use stats::{
    CacheResult, GeometryCacheStatistics, PerformanceMetrics, TierStatistics,
    TileCacheStatistics,
};
pub use store::{
    Airspace, BatchOutcome, CachedGeometry, DerivedCache, FileGeometryTier, GeometryStore,
    GeometryStoreConfig, GeometryTier, MemoryGeometryTier, PutOutcome,
};
pub use tile::{
    merge_geojson_responses, SpatialTileCache, TileCacheConfig, TileCoord, ViewportTiles,
};
