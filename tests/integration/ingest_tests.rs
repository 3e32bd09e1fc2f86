//! Geometry ingestion integration tests.
//!
//! Tests verify:
//! - The full viewport → tile cache → merge → store pipeline
//! - Batch ingestion costs one existence check and one write
//! - Overlapping deliveries are stored once and counted as duplicates
//! - The file tier survives a restart
//! - Durable tier failures degrade to less data

use std::collections::HashSet;

use airspace_cache::geometry::BoundingBox;
use airspace_cache::store::{
    DerivedCache, FileGeometryTier, GeometryStore, GeometryStoreConfig, PutOutcome,
};
use airspace_cache::tile::{merge_geojson_responses, SpatialTileCache, TileCacheConfig};
use airspace_cache::CacheResult;

use super::test_utils::{
    airspace_feature, anonymous_feature, features_of, flattened_feature, local_id,
    provider_response, CountingTier,
};

fn make_store(tier: CountingTier, capacity: usize) -> GeometryStore<CountingTier> {
    GeometryStore::with_config(
        tier,
        GeometryStoreConfig {
            memory_capacity: capacity,
            ..Default::default()
        },
    )
}

fn ids(values: &[&str]) -> HashSet<String> {
    values.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// End-to-End Pipeline
// =============================================================================

#[tokio::test]
async fn test_viewport_pipeline_stores_each_airspace_once() {
    let cache = SpatialTileCache::new(TileCacheConfig::default()).unwrap();
    let tier = CountingTier::new();
    let store = make_store(tier.clone(), 1000);
    let viewport = BoundingBox::new(46.0, 6.0, 47.5, 9.0);

    // First visit: everything comes from the provider
    let tiles = cache.get_tiles_for_viewport(&viewport).await.unwrap();
    let mut bodies = tiles.responses();
    for tile in &tiles.tiles_to_fetch {
        let body = provider_response(tile);
        cache.cache_tile(tile.x, tile.y, body.clone()).await.unwrap();
        bodies.push(body);
    }
    let tile_count = tiles.tiles_to_fetch.len();

    let features = features_of(&merge_geojson_responses(&bodies));
    let outcome = store.put_geometry_batch(&features).await.unwrap();

    assert_eq!(outcome.written, tile_count + 1);
    assert_eq!(tier.stored().await, tile_count + 1);
    assert_eq!(tier.existence_checks(), 1);
    assert_eq!(tier.writes(), 1);

    // Second visit: all tiles cached, nothing new written
    tier.reset_tracking();
    let tiles = cache.get_tiles_for_viewport(&viewport).await.unwrap();
    assert!(tiles.is_complete());

    let features = features_of(&merge_geojson_responses(&tiles.responses()));
    let outcome = store.put_geometry_batch(&features).await.unwrap();

    assert_eq!(outcome.written, 0);
    assert_eq!(outcome.already_present, tile_count + 1);
    assert_eq!(tier.writes(), 0);
    assert_eq!(store.duplicate_count("AS-100").await, 1);

    // Rendering reads geometries back by id
    let wanted: HashSet<String> = tiles
        .cached_responses
        .iter()
        .map(|(tile, _)| local_id(tile))
        .chain(["AS-100".to_string()])
        .collect();
    let found = store.get_geometries(&wanted).await;
    assert_eq!(found.len(), wanted.len());
}

#[tokio::test]
async fn test_unmerged_overlap_counts_duplicates() {
    let tier = CountingTier::new();
    let store = make_store(tier.clone(), 100);

    // Three overlapping tile fetches deliver the same airspace
    for _ in 0..3 {
        store
            .put_geometry(&airspace_feature("AS-100", "TMA", 5.0, 45.0, 6.0))
            .await
            .unwrap();
    }

    assert_eq!(tier.stored().await, 1);
    assert_eq!(tier.writes(), 1);
    assert_eq!(store.duplicate_count("AS-100").await, 2);

    let metrics = store.get_performance_metrics().await;
    assert_eq!(metrics.unchanged_skips, 2);
    assert_eq!(metrics.top_duplicates, vec![("AS-100".to_string(), 2)]);
}

#[tokio::test]
async fn test_changed_geometry_is_replaced() {
    let store = make_store(CountingTier::new(), 100);

    store
        .put_geometry(&airspace_feature("AS-5", "R-5", 8.0, 47.0, 0.1))
        .await
        .unwrap();
    let outcome = store
        .put_geometry(&flattened_feature("AS-5", "R-5", 8.0, 47.0, 0.3))
        .await
        .unwrap();
    assert_eq!(outcome, PutOutcome::Replaced);

    let stored = store.get_geometry("AS-5").await.unwrap();
    let bounds = stored.bounds().unwrap().unwrap();
    assert!((bounds.max_lat - 47.3).abs() < 1e-6);
}

#[tokio::test]
async fn test_fallback_identity_deduplicates_anonymous_features() {
    let tier = CountingTier::new();
    let store = make_store(tier.clone(), 100);

    let first = store
        .put_geometry(&anonymous_feature("GLIDER SECTOR", 21, 2.0, 48.0))
        .await
        .unwrap();
    let second = store
        .put_geometry(&anonymous_feature("GLIDER SECTOR", 21, 2.0, 48.0))
        .await
        .unwrap();

    assert_eq!(first, PutOutcome::Inserted);
    assert_eq!(second, PutOutcome::Unchanged);
    assert_eq!(tier.stored().await, 1);
}

// =============================================================================
// Memory Tier Behaviour
// =============================================================================

#[tokio::test]
async fn test_lru_reaccess_keeps_entry_resident() {
    let store = make_store(CountingTier::new(), 2);
    for id in ["A", "B", "C"] {
        store
            .put_geometry(&airspace_feature(id, id, 8.0, 47.0, 0.1))
            .await
            .unwrap();
    }

    assert!(store.get_geometry("A").await.is_some());
    store
        .put_geometry(&airspace_feature("D", "D", 8.0, 47.0, 0.1))
        .await
        .unwrap();

    assert!(store.is_in_memory("A").await);
    assert!(store.is_in_memory("D").await);
    assert_eq!(store.memory_len().await, 2);
}

#[tokio::test]
async fn test_get_geometries_batches_memory_misses() {
    let tier = CountingTier::new();
    let store = make_store(tier.clone(), 2);
    let features: Vec<_> = (0..6)
        .map(|i| airspace_feature(&format!("AS-{i}"), "X", 8.0, 47.0 + i as f64, 0.1))
        .collect();
    store.put_geometry_batch(&features).await.unwrap();
    tier.reset_tracking();

    let wanted = ids(&["AS-0", "AS-1", "AS-2", "AS-5", "AS-404"]);
    let found = store.get_geometries(&wanted).await;

    let found_ids: HashSet<String> = found.iter().map(|g| g.id.clone()).collect();
    assert_eq!(found_ids, ids(&["AS-0", "AS-1", "AS-2", "AS-5"]));
    assert_eq!(found.len(), found_ids.len());
    assert_eq!(tier.reads(), 1);
}

// =============================================================================
// Durability
// =============================================================================

#[tokio::test]
async fn test_file_tier_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("geometries.json");

    {
        let store = GeometryStore::new(FileGeometryTier::open(&path).await.unwrap());
        let features = vec![
            airspace_feature("AS-1", "A", 8.0, 47.0, 0.1),
            flattened_feature("AS-2", "B", 9.0, 47.0, 0.1),
        ];
        let outcome = store.put_geometry_batch(&features).await.unwrap();
        assert_eq!(outcome.written, 2);
    }

    let store = GeometryStore::new(FileGeometryTier::open(&path).await.unwrap());
    assert_eq!(store.memory_len().await, 0);

    let found = store.get_geometries(&ids(&["AS-1", "AS-2"])).await;
    assert_eq!(found.len(), 2);

    let stats = store.get_statistics().await;
    assert_eq!(stats.durable_hits, 2);
    let durable = stats.durable.unwrap();
    assert_eq!(durable.geometry_count, 2);
    assert!(durable.database_size_bytes > 0);
    assert!(durable.avg_compression_ratio > 1.0);

    // Re-ingesting after restart is a no-op
    let outcome = store
        .put_geometry(&airspace_feature("AS-1", "A", 8.0, 47.0, 0.1))
        .await
        .unwrap();
    assert_eq!(outcome, PutOutcome::Unchanged);
}

#[tokio::test]
async fn test_durable_failure_returns_less_data() {
    let tier = CountingTier::new();
    let store = make_store(tier.clone(), 1);
    store
        .put_geometry(&airspace_feature("AS-1", "A", 8.0, 47.0, 0.1))
        .await
        .unwrap();
    store
        .put_geometry(&airspace_feature("AS-2", "B", 9.0, 47.0, 0.1))
        .await
        .unwrap();

    tier.set_failing(true);

    assert!(matches!(store.lookup("AS-1").await, CacheResult::Error(_)));
    assert!(store.get_geometry("AS-1").await.is_none());

    let found = store.get_geometries(&ids(&["AS-1", "AS-2"])).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "AS-2");

    let batch = vec![airspace_feature("AS-3", "C", 8.0, 46.0, 0.1)];
    assert!(store.put_geometry_batch(&batch).await.is_err());
    assert!(store.get_statistics().await.durable.is_none());

    // Recovers once the tier is back
    tier.set_failing(false);
    assert!(store.get_geometry("AS-1").await.is_some());
    assert_eq!(store.put_geometry_batch(&batch).await.unwrap().written, 1);
}

#[tokio::test]
async fn test_derived_values_follow_replacement() {
    let store = make_store(CountingTier::new(), 10);
    let mut derived: DerivedCache<String> = DerivedCache::new();

    store
        .put_geometry(&airspace_feature("AS-9", "CTR", 8.0, 47.0, 0.1))
        .await
        .unwrap();
    let entry = store.get_geometry("AS-9").await.unwrap();
    let small = derived.bounds(&entry).unwrap();
    let airspace = derived.airspace(&entry);
    assert_eq!(airspace.lower_altitude_ft, Some(0));
    assert_eq!(airspace.upper_altitude_ft, Some(9500));

    store
        .put_geometry(&airspace_feature("AS-9", "CTR", 8.0, 47.0, 0.5))
        .await
        .unwrap();
    let entry = store.get_geometry("AS-9").await.unwrap();
    let large = derived.bounds(&entry).unwrap();
    assert!(large.max_lat > small.max_lat);
    assert_eq!(derived.len(), 1);
}
