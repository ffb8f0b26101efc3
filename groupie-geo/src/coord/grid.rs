//! Tile grid planning for a map view.
//!
//! Given the resolved concert locations, [`TileGrid::covering`] picks a zoom
//! level and the rectangular range of tiles that shows all of them with a
//! little padding, capped at a small number of tiles so a world-wide view
//! stays cheap to download.

use super::types::{Coordinates, TileCoord};
use super::lat_lon_to_tile_xy;

/// Edge length of a slippy-map tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Default upper bound on the number of tiles in a grid.
pub const DEFAULT_MAX_TILES: u64 = 16;

/// Smallest bounding-box span (degrees) before padding is applied.
const MIN_SPAN_DEGREES: f64 = 0.1;

/// Fraction of the span added on each side of the bounding box.
const PADDING_RATIO: f64 = 0.1;

/// Highest zoom considered when fitting the viewport.
const MAX_FIT_ZOOM: u8 = 3;

/// Zoom used when no candidate fills the viewport.
const DEFAULT_FIT_ZOOM: u8 = 2;

/// Viewport and budget used when planning a grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSettings {
    /// Target viewport width in pixels.
    pub viewport_width: f64,
    /// Target viewport height in pixels.
    pub viewport_height: f64,
    /// Maximum number of tiles the grid may contain.
    pub max_tiles: u64,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            viewport_width: 1600.0,
            viewport_height: 900.0,
            max_tiles: DEFAULT_MAX_TILES,
        }
    }
}

/// A rectangular, inclusive range of tiles at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub zoom: u8,
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

#[derive(Debug, Clone, Copy)]
struct BoundingBox {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

impl BoundingBox {
    fn padded(points: &[Coordinates]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self {
            min_lat: first.latitude,
            max_lat: first.latitude,
            min_lon: first.longitude,
            max_lon: first.longitude,
        };
        for p in points {
            bbox.min_lat = bbox.min_lat.min(p.latitude);
            bbox.max_lat = bbox.max_lat.max(p.latitude);
            bbox.min_lon = bbox.min_lon.min(p.longitude);
            bbox.max_lon = bbox.max_lon.max(p.longitude);
        }

        let pad_lat = (bbox.max_lat - bbox.min_lat).max(MIN_SPAN_DEGREES) * PADDING_RATIO;
        let pad_lon = (bbox.max_lon - bbox.min_lon).max(MIN_SPAN_DEGREES) * PADDING_RATIO;
        bbox.min_lat -= pad_lat;
        bbox.max_lat += pad_lat;
        bbox.min_lon -= pad_lon;
        bbox.max_lon += pad_lon;
        Some(bbox)
    }

    /// Fractional tile corners (northwest, southeast) at `zoom`.
    fn corners(&self, zoom: u8) -> ((f64, f64), (f64, f64)) {
        (
            lat_lon_to_tile_xy(self.max_lat, self.min_lon, zoom),
            lat_lon_to_tile_xy(self.min_lat, self.max_lon, zoom),
        )
    }

    fn fit_zoom(&self, settings: &GridSettings) -> u8 {
        for zoom in (1..=MAX_FIT_ZOOM).rev() {
            let ((x1, y1), (x2, y2)) = self.corners(zoom);
            let dx = (x2 - x1).abs() * TILE_SIZE as f64;
            let dy = (y2 - y1).abs() * TILE_SIZE as f64;
            if dx >= settings.viewport_width || dy >= settings.viewport_height {
                return zoom;
            }
        }
        DEFAULT_FIT_ZOOM
    }
}

impl TileGrid {
    /// Plans the grid covering `points`.
    ///
    /// Returns `None` when there are no points.
    pub fn covering(points: &[Coordinates], settings: &GridSettings) -> Option<Self> {
        let bbox = BoundingBox::padded(points)?;
        let fitted = bbox.fit_zoom(settings);

        let mut grid = Self::at_zoom(&bbox, fitted);
        if grid.len() > settings.max_tiles {
            for zoom in (1..fitted).rev() {
                grid = Self::at_zoom(&bbox, zoom);
                if grid.len() <= settings.max_tiles {
                    tracing::debug!(
                        from = fitted,
                        to = zoom,
                        tiles = grid.len(),
                        "Tile grid too large, lowered zoom"
                    );
                    break;
                }
            }
        }
        Some(grid)
    }

    fn at_zoom(bbox: &BoundingBox, zoom: u8) -> Self {
        let ((x1, y1), (x2, y2)) = bbox.corners(zoom);
        let max_index = TileCoord::tiles_per_axis(zoom) as f64 - 1.0;
        let clamp = |v: f64| v.clamp(0.0, max_index) as u32;

        Self {
            zoom,
            x_min: clamp(x1.min(x2).floor()),
            x_max: clamp(x1.max(x2).ceil()),
            y_min: clamp(y1.min(y2).floor()),
            y_max: clamp(y1.max(y2).ceil()),
        }
    }

    /// Number of tile columns.
    pub fn width(&self) -> u32 {
        self.x_max - self.x_min + 1
    }

    /// Number of tile rows.
    pub fn height(&self) -> u32 {
        self.y_max - self.y_min + 1
    }

    /// Total number of tiles in the grid.
    pub fn len(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// A grid always holds at least one tile.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterates over every tile, column by column.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (self.x_min..=self.x_max)
            .flat_map(move |x| (self.y_min..=self.y_max).map(move |y| TileCoord::new(self.zoom, x, y)))
    }

    /// Grid size in pixels (width, height).
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.width() * TILE_SIZE, self.height() * TILE_SIZE)
    }

    /// Pixel position of `coords` relative to the grid's top-left corner.
    pub fn pixel_offset(&self, coords: &Coordinates) -> (f64, f64) {
        let (x, y) = lat_lon_to_tile_xy(coords.latitude, coords.longitude, self.zoom);
        (
            (x - self.x_min as f64) * TILE_SIZE as f64,
            (y - self.y_min as f64) * TILE_SIZE as f64,
        )
    }
}
