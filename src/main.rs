//! Airspace cache - tile and geometry caching for airspace overlays.
//!
//! This binary wires the spatial tile cache and the geometry store together
//! for offline use: planning tile fetches for a viewport, ingesting saved
//! provider responses, and maintaining the durable geometry snapshot.

use std::process::ExitCode;

use bytes::Bytes;
use clap::Parser;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use airspace_cache::{
    config::{CacheConfig, Cli, Command, IngestArgs, TilesArgs},
    merge_geojson_responses,
    store::{FileGeometryTier, GeometryStore, GeometryTier, MemoryGeometryTier},
    tile::SpatialTileCache,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config, command) = cli.into_command();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match command {
        Command::Tiles(args) => run_tiles(&config, args).await,
        command => match config.cache_file.clone() {
            Some(path) => match FileGeometryTier::open(&path).await {
                Ok(tier) => {
                    info!("Using geometry snapshot {}", path.display());
                    run_store_command(&config, command, tier).await
                }
                Err(e) => {
                    error!("Failed to open {}: {}", path.display(), e);
                    ExitCode::FAILURE
                }
            },
            None => {
                warn!("No --cache-file given, geometries are kept in memory only");
                run_store_command(&config, command, MemoryGeometryTier::new()).await
            }
        },
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "airspace_cache=debug"
    } else {
        "airspace_cache=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Print a value as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize output: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Tiles Command
// =============================================================================

async fn run_tiles(config: &CacheConfig, args: TilesArgs) -> ExitCode {
    let cache = match SpatialTileCache::new(config.tile_cache_config()) {
        Ok(cache) => cache,
        Err(e) => {
            error!("Failed to create tile cache: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let viewport = match cache.get_tiles_for_viewport(&args.bbox).await {
        Ok(viewport) => viewport,
        Err(e) => {
            error!("Invalid viewport: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        zoom = viewport.zoom,
        tiles = viewport.tile_count(),
        "Resolved viewport"
    );

    let cached = viewport
        .cached_responses
        .iter()
        .map(|(tile, _)| (tile, true));
    let to_fetch = viewport.tiles_to_fetch.iter().map(|tile| (tile, false));
    let tiles: Vec<Value> = cached
        .chain(to_fetch)
        .map(|(tile, cached)| {
            json!({
                "zoom": tile.zoom,
                "x": tile.x,
                "y": tile.y,
                "bounds": viewport.bounds_of(tile),
                "cached": cached,
            })
        })
        .collect();

    print_json(&tiles)
}

// =============================================================================
// Geometry Store Commands
// =============================================================================

async fn run_store_command<T: GeometryTier>(
    config: &CacheConfig,
    command: Command,
    tier: T,
) -> ExitCode {
    let store = GeometryStore::with_config(tier, config.geometry_store_config());

    match command {
        Command::Ingest(args) => run_ingest(&store, args).await,
        Command::Stats => print_json(&store.get_statistics().await),
        Command::Clean => match store.clean_expired_data().await {
            Ok(removed) => {
                info!("Removed {} expired geometries", removed);
                print_json(&json!({ "removed": removed }))
            }
            Err(e) => {
                error!("Expiry sweep failed: {}", e);
                ExitCode::FAILURE
            }
        },
        Command::Tiles(args) => run_tiles(config, args).await,
    }
}

async fn run_ingest<T: GeometryTier>(store: &GeometryStore<T>, args: IngestArgs) -> ExitCode {
    let mut responses = Vec::with_capacity(args.files.len());
    for path in &args.files {
        match tokio::fs::read(path).await {
            Ok(body) => responses.push(Bytes::from(body)),
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        }
    }

    let merged = merge_geojson_responses(&responses);
    let features = match serde_json::from_slice::<Value>(&merged) {
        Ok(Value::Object(mut collection)) => match collection.remove("features") {
            Some(Value::Array(features)) => features,
            _ => {
                error!("Merged response has no features array");
                return ExitCode::FAILURE;
            }
        },
        Ok(_) => {
            error!("Merged response is not a feature collection");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Merged response is not valid JSON: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        files = args.files.len(),
        features = features.len(),
        "Ingesting merged responses"
    );

    let outcome = match store.put_geometry_batch(&features).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Ingestion failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    print_json(&json!({
        "batch": outcome,
        "statistics": store.get_statistics().await,
        "performance": store.get_performance_metrics().await,
    }))
}
