//! Spatial tile layer.
//!
//! This module caches raw provider responses per map tile and merges them
//! back into one feature collection for ingestion.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Rendering layer (caller)         │
//! └──────┬──────────────────────▲───────────┘
//!        │ viewport             │ cache_tile(x, y, body)
//!        ▼                      │
//! ┌─────────────────────────────┴───────────┐
//! │            SpatialTileCache             │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  coords      │  │  entries by     │  │
//! │  │  (slippy     │  │  (zoom, x, y),  │  │
//! │  │   tiling)    │  │  TTL + cap      │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ cached + fetched bodies
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        merge_geojson_responses          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The cache never talks to the network. Callers fetch
//! [`ViewportTiles::tiles_to_fetch`] themselves, using
//! [`ViewportTiles::bounds_of`] to build requests.
//!
//! # Example
//!
//! ```
//! use airspace_cache::geometry::BoundingBox;
//! use airspace_cache::tile::{merge_geojson_responses, SpatialTileCache, TileCacheConfig};
//! use bytes::Bytes;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = SpatialTileCache::new(TileCacheConfig::default()).unwrap();
//!     let viewport = BoundingBox::new(45.8, 5.9, 47.8, 10.5);
//!
//!     let tiles = cache.get_tiles_for_viewport(&viewport).await.unwrap();
//!     let mut bodies = tiles.responses();
//!     for tile in &tiles.tiles_to_fetch {
//!         // Fetch from the provider using tiles.bounds_of(tile)
//!         let body = Bytes::from_static(br#"{"type":"FeatureCollection","features":[]}"#);
//!         cache.cache_tile(tile.x, tile.y, body.clone()).await.unwrap();
//!         bodies.push(body);
//!     }
//!
//!     let merged = merge_geojson_responses(&bodies);
//!     assert!(!merged.is_empty());
//! }
//! ```

mod cache;
pub mod coords;
mod merge;

pub use cache::{
    SpatialTileCache, TileCacheConfig, ViewportTiles, DEFAULT_MAX_TILES, DEFAULT_TILE_TTL,
    DEFAULT_TILE_ZOOM,
};
pub use coords::{tile_to_bounds, tiles_covering, to_tile_coords, TileCoord, MAX_LAT, MAX_ZOOM};
pub use merge::{feature_signature, merge_geojson_responses, try_merge};
