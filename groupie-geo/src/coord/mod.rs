//! Coordinate conversion module
//!
//! Provides geographic coordinates, slippy-map tile addressing, and the
//! Web Mercator projection from one to the other. [`TileGrid`] plans which tiles a
//! map view needs to cover a set of concert locations.

mod grid;
mod types;

pub use grid::{GridSettings, TileGrid, DEFAULT_MAX_TILES, TILE_SIZE};
pub use types::{
    CoordError, Coordinates, TileCoord, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON,
};

use std::f64::consts::PI;

/// Converts geographic coordinates to fractional slippy-map tile coordinates.
///
/// The integer part of each component is the tile index, the fractional
/// part is the position inside that tile. Latitude is clamped to the Web
/// Mercator range so the poles do not produce infinities.
#[inline]
pub fn lat_lon_to_tile_xy(lat: f64, lon: f64, zoom: u8) -> (f64, f64) {
    let lat = lat.clamp(MIN_LAT, MAX_LAT);
    let n = 2.0_f64.powi(zoom as i32);

    let x = (lon + 180.0) / 360.0 * n;

    let lat_rad = lat * PI / 180.0;
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n;

    (x, y)
}
