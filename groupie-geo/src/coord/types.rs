//! Geographic and tile coordinate types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum latitude representable in Web Mercator.
pub const MIN_LAT: f64 = -85.05112878;

/// Maximum latitude representable in Web Mercator.
pub const MAX_LAT: f64 = 85.05112878;

/// Minimum longitude.
pub const MIN_LON: f64 = -180.0;

/// Maximum longitude.
pub const MAX_LON: f64 = 180.0;

/// Highest zoom level served by the standard OSM tile servers.
pub const MAX_ZOOM: u8 = 19;

/// Errors produced when validating coordinates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Zoom level above [`MAX_ZOOM`].
    #[error("invalid zoom level {0} (max {MAX_ZOOM})")]
    InvalidZoom(u8),

    /// Tile column or row outside `0..2^zoom`.
    #[error("tile {x}/{y} out of range for zoom {zoom}")]
    OutOfRange { zoom: u8, x: u32, y: u32 },
}

/// A point on the globe in decimal degrees.
///
/// The serialized field names match the geocode cache document. The
/// capitalised aliases accept documents written by the Go application.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(alias = "Latitude")]
    pub latitude: f64,
    #[serde(alias = "Longitude")]
    pub longitude: f64,
}

impl Coordinates {
    /// Creates a new coordinate pair.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether these coordinates are a trustworthy geocoding result.
    ///
    /// A zero component is how the geocoding service (and the legacy cache)
    /// signal "nothing found", so it is rejected along with non-finite and
    /// out-of-range values. Only usable coordinates are ever cached.
    pub fn is_usable(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude != 0.0
            && self.longitude != 0.0
            && (-90.0..=90.0).contains(&self.latitude)
            && (MIN_LON..=MAX_LON).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Slippy-map tile address.
///
/// `x` grows eastward and `y` southward, both in `0..2^zoom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Creates a tile address without validating it.
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Number of tiles along one axis at this zoom level.
    pub fn tiles_per_axis(zoom: u8) -> u64 {
        1u64 << zoom
    }

    /// Checks that the zoom is supported and both indices are in range.
    pub fn validate(&self) -> Result<(), CoordError> {
        if self.zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(self.zoom));
        }
        let n = Self::tiles_per_axis(self.zoom);
        if u64::from(self.x) >= n || u64::from(self.y) >= n {
            return Err(CoordError::OutOfRange {
                zoom: self.zoom,
                x: self.x,
                y: self.y,
            });
        }
        Ok(())
    }

    /// File name used by the on-disk tile cache: `{zoom}_{x}_{y}.png`.
    pub fn file_name(&self) -> String {
        format!("{}_{}_{}.png", self.zoom, self.x, self.y)
    }

    /// Expands a URL template containing `{z}`, `{x}` and `{y}`.
    pub fn expand_template(&self, template: &str) -> String {
        template
            .replace("{z}", &self.zoom.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_coordinates() {
        assert!(Coordinates::new(48.8566, 2.3522).is_usable());
        assert!(Coordinates::new(-33.8688, 151.2093).is_usable());
    }

    #[test]
    fn test_zero_component_is_not_usable() {
        assert!(!Coordinates::new(0.0, 0.0).is_usable());
        assert!(!Coordinates::new(0.0, 2.35).is_usable());
        assert!(!Coordinates::new(48.85, 0.0).is_usable());
    }

    #[test]
    fn test_out_of_range_is_not_usable() {
        assert!(!Coordinates::new(91.0, 10.0).is_usable());
        assert!(!Coordinates::new(10.0, -181.0).is_usable());
        assert!(!Coordinates::new(f64::NAN, 10.0).is_usable());
    }

    #[test]
    fn test_legacy_field_names_deserialize() {
        let json = r#"{"Lieux":"paris-france","Latitude":48.8566,"Longitude":2.3522}"#;
        let coords: Coordinates = serde_json::from_str(json).unwrap();
        assert_eq!(coords, Coordinates::new(48.8566, 2.3522));
    }

    #[test]
    fn test_tile_validate() {
        assert!(TileCoord::new(0, 0, 0).validate().is_ok());
        assert!(TileCoord::new(3, 7, 7).validate().is_ok());
        assert_eq!(
            TileCoord::new(3, 8, 0).validate(),
            Err(CoordError::OutOfRange { zoom: 3, x: 8, y: 0 })
        );
        assert_eq!(
            TileCoord::new(20, 0, 0).validate(),
            Err(CoordError::InvalidZoom(20))
        );
    }

    #[test]
    fn test_tile_file_name_and_template() {
        let tile = TileCoord::new(5, 16, 10);
        assert_eq!(tile.file_name(), "5_16_10.png");
        assert_eq!(
            tile.expand_template("https://a.tile.openstreetmap.org/{z}/{x}/{y}.png"),
            "https://a.tile.openstreetmap.org/5/16/10.png"
        );
        assert_eq!(tile.to_string(), "5/16/10");
    }
}
