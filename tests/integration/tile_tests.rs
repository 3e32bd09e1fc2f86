//! Spatial tile cache integration tests.
//!
//! Tests verify:
//! - Every tile returned for a viewport intersects it
//! - Panning reuses tiles cached by earlier viewports
//! - Stale tiles are refetched and overwritten
//! - The entry cap holds across many viewports

use std::time::{Duration, SystemTime};

use airspace_cache::geometry::BoundingBox;
use airspace_cache::tile::{tiles_covering, SpatialTileCache, TileCacheConfig};

use super::test_utils::{features_of, provider_response};

fn make_cache(zoom: u8, max_entries: usize) -> SpatialTileCache {
    SpatialTileCache::new(TileCacheConfig {
        zoom,
        ttl: Duration::from_secs(24 * 60 * 60),
        max_entries,
    })
    .unwrap()
}

/// Fetch every missing tile of `viewport` from the simulated provider.
async fn fill(cache: &SpatialTileCache, viewport: &BoundingBox) -> usize {
    let tiles = cache.get_tiles_for_viewport(viewport).await.unwrap();
    for tile in &tiles.tiles_to_fetch {
        cache
            .cache_tile(tile.x, tile.y, provider_response(tile))
            .await
            .unwrap();
    }
    tiles.tiles_to_fetch.len()
}

// =============================================================================
// Viewport Coverage
// =============================================================================

#[tokio::test]
async fn test_viewport_tiles_intersect_viewport() {
    let viewports = [
        BoundingBox::new(45.8, 5.9, 47.8, 10.5),
        BoundingBox::new(-34.9, -58.7, -34.4, -58.2),
        BoundingBox::new(64.0, -24.0, 66.5, -13.0),
        BoundingBox::new(-1.0, -1.0, 1.0, 1.0),
        BoundingBox::new(80.0, 170.0, 89.9, 180.0),
    ];

    for zoom in [0u8, 4, 8, 12] {
        let cache = make_cache(zoom, 10_000);
        for viewport in &viewports {
            let tiles = cache.get_tiles_for_viewport(viewport).await.unwrap();
            assert!(tiles.tile_count() > 0, "zoom {zoom} {viewport:?}");
            for tile in &tiles.tiles_to_fetch {
                assert_eq!(tile.zoom, zoom);
                assert!(
                    tiles.bounds_of(tile).intersects(viewport),
                    "tile {tile:?} outside {viewport:?}"
                );
            }
        }
    }
}

#[tokio::test]
async fn test_viewport_beyond_projection_has_no_tiles() {
    let cache = make_cache(8, 100);
    let polar = BoundingBox::new(86.0, -180.0, 90.0, 180.0);

    let tiles = cache.get_tiles_for_viewport(&polar).await.unwrap();
    assert_eq!(tiles.tile_count(), 0);
    assert!(tiles.is_complete());
}

// =============================================================================
// Cache Reuse
// =============================================================================

#[tokio::test]
async fn test_revisited_viewport_is_fully_cached() {
    let cache = make_cache(8, 500);
    let viewport = BoundingBox::new(45.8, 5.9, 47.8, 10.5);

    let fetched = fill(&cache, &viewport).await;
    assert!(fetched > 0);

    let again = cache.get_tiles_for_viewport(&viewport).await.unwrap();
    assert!(again.is_complete());
    assert_eq!(again.cached_responses.len(), fetched);
    for (tile, body) in &again.cached_responses {
        assert_eq!(body, &provider_response(tile));
    }

    let stats = cache.statistics().await;
    assert_eq!(stats.entries, fetched);
    assert_eq!(stats.hits, fetched as u64);
    assert_eq!(stats.misses, fetched as u64);
}

#[tokio::test]
async fn test_pan_only_fetches_new_tiles() {
    let cache = make_cache(8, 500);
    let start = BoundingBox::new(46.0, 6.0, 47.0, 8.0);
    let panned = BoundingBox::new(46.0, 7.0, 47.0, 9.0);

    fill(&cache, &start).await;
    let tiles = cache.get_tiles_for_viewport(&panned).await.unwrap();

    let overlap: Vec<_> = tiles_covering(&panned, 8)
        .unwrap()
        .into_iter()
        .filter(|tile| tiles_covering(&start, 8).unwrap().contains(tile))
        .collect();
    assert!(!overlap.is_empty());
    assert_eq!(tiles.cached_responses.len(), overlap.len());
    for tile in &tiles.tiles_to_fetch {
        assert!(!overlap.contains(tile));
    }
}

#[tokio::test]
async fn test_stale_tile_is_refetched_and_overwritten() {
    let cache = make_cache(8, 500);
    let tile = cache.to_tile_coords(46.5, 7.5).unwrap();
    let yesterday = SystemTime::now() - Duration::from_secs(25 * 60 * 60);
    cache
        .insert_tile(tile, provider_response(&tile), yesterday)
        .await
        .unwrap();

    let viewport = tile.bounds();
    let tiles = cache.get_tiles_for_viewport(&viewport).await.unwrap();
    assert!(tiles.tiles_to_fetch.contains(&tile));

    cache
        .cache_tile(tile.x, tile.y, provider_response(&tile))
        .await
        .unwrap();
    assert!(cache.lookup_tile(&tile).await.is_fresh_hit());
    assert_eq!(cache.statistics().await.stale_entries, 0);
}

#[tokio::test]
async fn test_cap_holds_across_viewports() {
    let cache = make_cache(10, 20);

    for step in 0..10 {
        let lon = 5.0 + step as f64;
        fill(&cache, &BoundingBox::new(45.0, lon, 46.0, lon + 1.0)).await;
        assert!(cache.len().await <= 20);
    }

    let stats = cache.statistics().await;
    assert_eq!(stats.entries, 20);
    assert!(stats.evictions > 0);
}

#[tokio::test]
async fn test_cached_bodies_are_provider_responses() {
    let cache = make_cache(8, 100);
    let viewport = BoundingBox::new(46.0, 7.0, 46.5, 7.5);
    fill(&cache, &viewport).await;

    let tiles = cache.get_tiles_for_viewport(&viewport).await.unwrap();
    for body in tiles.responses() {
        assert_eq!(features_of(&body).len(), 2);
    }
}
