//! Configuration management for the airspace cache.
//!
//! This module provides the command-line interface and the cache settings
//! shared by every subcommand:
//! - Command-line arguments via clap
//! - Environment variables with `AIRSPACE_` prefix
//! - Sensible defaults for all optional settings
//!
//! The library itself never depends on clap types; [`CacheConfig`] converts
//! into the plain [`TileCacheConfig`] and [`GeometryStoreConfig`] values the
//! caches are built from.
//!
//! # Environment Variables
//!
//! - `AIRSPACE_TILE_ZOOM` - Tiling zoom level (default: 8)
//! - `AIRSPACE_TILE_TTL_SECS` - Tile response time-to-live (default: 86400)
//! - `AIRSPACE_MAX_TILES` - Max cached tile responses (default: 500)
//! - `AIRSPACE_GEOMETRY_CAPACITY` - Max geometries kept in memory (default: 50000)
//! - `AIRSPACE_GEOMETRY_MAX_AGE_DAYS` - Geometry expiry age (default: 7)
//! - `AIRSPACE_CACHE_FILE` - Durable geometry snapshot file (default: in-memory only)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::geometry::BoundingBox;
use crate::store::{GeometryStoreConfig, DEFAULT_MEMORY_CAPACITY};
use crate::tile::{TileCacheConfig, DEFAULT_MAX_TILES, DEFAULT_TILE_ZOOM, MAX_ZOOM};

// =============================================================================
// Default Values
// =============================================================================

/// Default tile time-to-live in seconds (24 hours).
pub const DEFAULT_TILE_TTL_SECS: u64 = 24 * 60 * 60;

/// Default geometry expiry age in days.
pub const DEFAULT_GEOMETRY_MAX_AGE_DAYS: u64 = 7;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Airspace cache - tile and geometry caching for airspace overlays.
///
/// Partitions viewports into cached map tiles and ingests provider
/// responses into a deduplicated geometry store.
#[derive(Parser, Debug, Clone)]
#[command(name = "airspace-cache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub cache: CacheConfig,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Split into the shared settings and the selected subcommand.
    pub fn into_command(self) -> (CacheConfig, Command) {
        (self.cache, self.command)
    }
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the tiles covering a viewport, with their bounds and cache state
    Tiles(TilesArgs),

    /// Merge raw provider responses and ingest them into the geometry store
    Ingest(IngestArgs),

    /// Print geometry store statistics as JSON
    Stats,

    /// Remove expired geometries from the durable tier
    Clean,
}

#[derive(Args, Debug, Clone)]
pub struct TilesArgs {
    /// Viewport as minLat,minLon,maxLat,maxLon
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub bbox: BoundingBox,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// Files holding one raw provider feature collection each
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Settings shared by all subcommands.
#[derive(Args, Debug, Clone)]
pub struct CacheConfig {
    // =========================================================================
    // Tile Cache Configuration
    // =========================================================================
    /// Zoom level of the tile grid (0-16).
    #[arg(long, global = true, default_value_t = DEFAULT_TILE_ZOOM, env = "AIRSPACE_TILE_ZOOM")]
    pub tile_zoom: u8,

    /// Seconds a cached tile response stays fresh.
    #[arg(long, global = true, default_value_t = DEFAULT_TILE_TTL_SECS, env = "AIRSPACE_TILE_TTL_SECS")]
    pub tile_ttl_secs: u64,

    /// Maximum number of cached tile responses.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_TILES, env = "AIRSPACE_MAX_TILES")]
    pub max_tiles: usize,

    // =========================================================================
    // Geometry Store Configuration
    // =========================================================================
    /// Maximum number of geometries kept in memory.
    #[arg(long, global = true, default_value_t = DEFAULT_MEMORY_CAPACITY, env = "AIRSPACE_GEOMETRY_CAPACITY")]
    pub geometry_capacity: usize,

    /// Days after which a stored geometry is expired.
    #[arg(long, global = true, default_value_t = DEFAULT_GEOMETRY_MAX_AGE_DAYS, env = "AIRSPACE_GEOMETRY_MAX_AGE_DAYS")]
    pub geometry_max_age_days: u64,

    /// JSON snapshot file for the durable geometry tier.
    ///
    /// If not specified, geometries only live for the duration of the command.
    #[arg(long, global = true, env = "AIRSPACE_CACHE_FILE")]
    pub cache_file: Option<PathBuf>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

impl CacheConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_zoom > MAX_ZOOM {
            return Err(format!("tile_zoom must be between 0 and {}", MAX_ZOOM));
        }
        if self.tile_ttl_secs == 0 {
            return Err("tile_ttl_secs must be greater than 0".to_string());
        }
        if self.max_tiles == 0 {
            return Err("max_tiles must be greater than 0".to_string());
        }
        if self.geometry_capacity == 0 {
            return Err("geometry_capacity must be greater than 0".to_string());
        }
        if self.geometry_max_age_days == 0 {
            return Err("geometry_max_age_days must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn tile_cache_config(&self) -> TileCacheConfig {
        TileCacheConfig {
            zoom: self.tile_zoom,
            ttl: Duration::from_secs(self.tile_ttl_secs),
            max_entries: self.max_tiles,
        }
    }

    pub fn geometry_store_config(&self) -> GeometryStoreConfig {
        GeometryStoreConfig {
            memory_capacity: self.geometry_capacity,
            max_age: Duration::from_secs(self.geometry_max_age_days * SECONDS_PER_DAY),
        }
    }
}

/// Parse `minLat,minLon,maxLat,maxLon` into a bounding box.
pub fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    let values = s
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in bbox '{}': {}", s, e))?;

    let [min_lat, min_lon, max_lat, max_lon] = values[..] else {
        return Err(format!(
            "bbox must have 4 values (minLat,minLon,maxLat,maxLon), got {}",
            values.len()
        ));
    };

    if ![min_lat, max_lat].iter().all(|lat| (-90.0..=90.0).contains(lat)) {
        return Err("bbox latitudes must be between -90 and 90".to_string());
    }
    if ![min_lon, max_lon].iter().all(|lon| (-180.0..=180.0).contains(lon)) {
        return Err("bbox longitudes must be between -180 and 180".to_string());
    }

    let bbox = BoundingBox::new(min_lat, min_lon, max_lat, max_lon);
    if !bbox.is_valid() {
        return Err("bbox minimum corner must not exceed the maximum corner".to_string());
    }
    Ok(bbox)
}

// =============================================================================
// Tests
// =============================================================================
