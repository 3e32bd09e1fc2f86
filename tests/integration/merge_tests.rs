//! Response merge integration tests.
//!
//! Tests verify:
//! - A feature straddling a tile boundary is counted once
//! - Merging is idempotent
//! - Malformed responses fall back to the first body
//! - Viewport responses merge into an ingestible collection

use bytes::Bytes;

use airspace_cache::geometry::BoundingBox;
use airspace_cache::tile::{merge_geojson_responses, SpatialTileCache, TileCacheConfig};

use super::test_utils::{
    airspace_feature, anonymous_feature, feature_collection, features_of, flattened_feature,
    local_id, provider_response,
};

#[test]
fn test_boundary_feature_counted_once() {
    let left = feature_collection(vec![
        airspace_feature("AS-100", "CTR SHARED", 7.9, 46.9, 0.2),
        airspace_feature("AS-1", "LEFT", 7.0, 46.0, 0.1),
    ]);
    let right = feature_collection(vec![
        airspace_feature("AS-100", "CTR SHARED", 7.9, 46.9, 0.2),
        airspace_feature("AS-2", "RIGHT", 9.0, 46.0, 0.1),
    ]);

    let merged = merge_geojson_responses(&[left, right]);

    let ids: Vec<String> = features_of(&merged)
        .iter()
        .map(|f| f["properties"]["_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["AS-100", "AS-1", "AS-2"]);
}

#[test]
fn test_mixed_shapes_share_identity() {
    let standard = feature_collection(vec![airspace_feature("AS-7", "R-7", 8.0, 47.0, 0.1)]);
    let flattened = feature_collection(vec![flattened_feature("AS-7", "R-7", 8.0, 47.0, 0.1)]);

    let merged = merge_geojson_responses(&[standard, flattened]);
    assert_eq!(features_of(&merged).len(), 1);
}

#[test]
fn test_anonymous_features_use_fallback_signature() {
    let a = feature_collection(vec![
        anonymous_feature("GLIDER SECTOR", 21, 2.0, 48.0),
        anonymous_feature("GLIDER SECTOR", 21, 3.0, 48.0),
    ]);
    let b = feature_collection(vec![anonymous_feature("GLIDER SECTOR", 21, 2.0, 48.0)]);

    let merged = merge_geojson_responses(&[a, b]);
    assert_eq!(features_of(&merged).len(), 2);
}

#[test]
fn test_merge_is_idempotent() {
    let responses = vec![
        feature_collection(vec![
            airspace_feature("AS-100", "A", 8.0, 47.0, 0.2),
            anonymous_feature("B", 1, 8.0, 47.0),
        ]),
        feature_collection(vec![airspace_feature("AS-100", "A", 8.0, 47.0, 0.2)]),
    ];

    let once = merge_geojson_responses(&responses);
    let twice = merge_geojson_responses(&[once.clone()]);
    assert_eq!(features_of(&twice).len(), features_of(&once).len());
}

#[test]
fn test_malformed_response_falls_back_to_first() {
    let first = feature_collection(vec![airspace_feature("AS-1", "A", 8.0, 47.0, 0.1)]);
    let broken = Bytes::from_static(b"<html>502 Bad Gateway</html>");

    assert_eq!(
        merge_geojson_responses(&[first.clone(), broken.clone()]),
        first
    );
    // The fallback is the first body, even when it is the broken one
    assert_eq!(merge_geojson_responses(&[broken.clone(), first]), broken);
}

#[tokio::test]
async fn test_viewport_responses_merge_without_duplicates() {
    let cache = SpatialTileCache::new(TileCacheConfig::default()).unwrap();
    let viewport = BoundingBox::new(46.0, 6.0, 47.5, 9.0);

    let tiles = cache.get_tiles_for_viewport(&viewport).await.unwrap();
    let mut bodies = Vec::new();
    for tile in &tiles.tiles_to_fetch {
        let body = provider_response(tile);
        cache.cache_tile(tile.x, tile.y, body.clone()).await.unwrap();
        bodies.push(body);
    }
    assert!(bodies.len() > 1);

    let merged = features_of(&merge_geojson_responses(&bodies));
    // One shared airspace plus one local airspace per tile
    assert_eq!(merged.len(), tiles.tiles_to_fetch.len() + 1);
    for tile in &tiles.tiles_to_fetch {
        let id = local_id(tile);
        assert!(merged.iter().any(|f| f["properties"]["_id"] == id.as_str()));
    }
}
