//! Slippy-map tile addressing.
//!
//! Standard Web Mercator tiling: `2^zoom` tiles per side, `x` growing east
//! from the antimeridian and `y` growing south from the northern projection
//! limit.

use std::f64::consts::PI;

use serde::Serialize;

use crate::error::TileError;
use crate::geometry::BoundingBox;

/// Highest supported zoom level.
pub const MAX_ZOOM: u8 = 16;

/// Northern limit of the Web Mercator projection in degrees.
pub const MAX_LAT: f64 = 85.05112878;

/// Southern limit of the Web Mercator projection in degrees.
pub const MIN_LAT: f64 = -MAX_LAT;

/// A tile in the slippy-map grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Create a tile, checking that it lies inside the grid for `zoom`.
    pub fn new(zoom: u8, x: u32, y: u32) -> Result<Self, TileError> {
        check_zoom(zoom)?;
        let n = tiles_per_side(zoom);
        if x >= n || y >= n {
            return Err(TileError::OutOfRange { x, y, zoom });
        }
        Ok(Self { zoom, x, y })
    }

    /// Geographic rectangle covered by this tile.
    pub fn bounds(&self) -> BoundingBox {
        let n = tiles_per_side(self.zoom) as f64;
        let west = self.x as f64 / n * 360.0 - 180.0;
        let east = (self.x + 1) as f64 / n * 360.0 - 180.0;
        BoundingBox::new(
            row_to_lat(self.y + 1, n),
            west,
            row_to_lat(self.y, n),
            east,
        )
    }
}

/// Number of tiles along each axis at `zoom`.
pub fn tiles_per_side(zoom: u8) -> u32 {
    1u32 << zoom
}

fn check_zoom(zoom: u8) -> Result<(), TileError> {
    if zoom > MAX_ZOOM {
        return Err(TileError::InvalidZoom {
            zoom,
            max: MAX_ZOOM,
        });
    }
    Ok(())
}

/// Latitude of the northern edge of row `y`.
fn row_to_lat(y: u32, n: f64) -> f64 {
    let lat_rad = (PI * (1.0 - 2.0 * y as f64 / n)).sinh().atan();
    lat_rad.to_degrees()
}

/// Tile containing a point.
///
/// Latitudes beyond the projection limit are clamped to the first or last
/// row. Points on the eastern antimeridian map to the last column.
pub fn to_tile_coords(lat: f64, lon: f64, zoom: u8) -> Result<TileCoord, TileError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(TileError::InvalidLatitude(lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(TileError::InvalidLongitude(lon));
    }
    check_zoom(zoom)?;

    let side = tiles_per_side(zoom);
    let n = side as f64;
    let last = side - 1;

    let x = ((lon + 180.0) / 360.0 * n).floor() as u32;

    let lat_rad = lat.clamp(MIN_LAT, MAX_LAT).to_radians();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor().max(0.0) as u32;

    Ok(TileCoord {
        zoom,
        x: x.min(last),
        y: y.min(last),
    })
}

/// Inverse projection of tile `(x, y)` at `zoom`.
pub fn tile_to_bounds(x: u32, y: u32, zoom: u8) -> Result<BoundingBox, TileError> {
    Ok(TileCoord::new(zoom, x, y)?.bounds())
}

/// Every tile at `zoom` whose rectangle intersects `viewport`.
///
/// Tiles are enumerated corner to corner from the north-west to the
/// south-east tile and then filtered on their actual bounds, so a viewport
/// lying entirely beyond the projection limit yields no tiles. Tiles are
/// returned row by row, west to east.
pub fn tiles_covering(viewport: &BoundingBox, zoom: u8) -> Result<Vec<TileCoord>, TileError> {
    if !viewport.is_valid() {
        return Err(TileError::InvalidViewport(format!(
            "min corner ({}, {}) above max corner ({}, {})",
            viewport.min_lat, viewport.min_lon, viewport.max_lat, viewport.max_lon
        )));
    }

    let north_west = to_tile_coords(viewport.max_lat, viewport.min_lon, zoom)?;
    let south_east = to_tile_coords(viewport.min_lat, viewport.max_lon, zoom)?;

    let mut tiles = Vec::new();
    for y in north_west.y..=south_east.y {
        for x in north_west.x..=south_east.x {
            let tile = TileCoord { zoom, x, y };
            if tile.bounds().intersects(viewport) {
                tiles.push(tile);
            }
        }
    }
    Ok(tiles)
}
