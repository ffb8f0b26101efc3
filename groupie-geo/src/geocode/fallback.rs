//! Approximate coordinates from a country-centroid table.
//!
//! When precise geocoding is unavailable or disabled, a location can be
//! placed at the rough centre of its country. Such results are never
//! written to the geocode cache.

use std::fmt;
use std::str::FromStr;

use crate::coord::Coordinates;

/// When the country-centroid fallback is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackMode {
    /// Never use approximate coordinates.
    #[default]
    Disabled,
    /// Use the centroid instead of calling the service ("fast mode").
    BeforeService,
    /// Use the centroid when the service fails or finds nothing.
    AfterService,
}

impl FromStr for FallbackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "disabled" | "off" | "none" => Ok(Self::Disabled),
            "before_service" | "fast" => Ok(Self::BeforeService),
            "after_service" => Ok(Self::AfterService),
            other => Err(format!(
                "unknown fallback mode '{}' (expected disabled, before_service or after_service)",
                other
            )),
        }
    }
}

impl fmt::Display for FallbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled",
            Self::BeforeService => "before_service",
            Self::AfterService => "after_service",
        })
    }
}

const COUNTRY_CENTROIDS: &[(&str, f64, f64)] = &[
    ("usa", 39.8283, -98.5795),
    ("united states", 39.8283, -98.5795),
    ("uk", 55.3781, -3.4360),
    ("united kingdom", 55.3781, -3.4360),
    ("france", 46.2276, 2.2137),
    ("germany", 51.1657, 10.4515),
    ("spain", 40.4637, -3.7492),
    ("italy", 41.8719, 12.5674),
    ("japan", 36.2048, 138.2529),
    ("canada", 56.1304, -106.3468),
    ("australia", -25.2744, 133.7751),
    ("brazil", -14.2350, -51.9253),
    ("mexico", 23.6345, -102.5528),
    ("netherlands", 52.1326, 5.2913),
    ("belgium", 50.5039, 4.4699),
    ("switzerland", 46.8182, 8.2275),
    ("sweden", 60.1282, 18.6435),
    ("norway", 60.4720, 8.4689),
    ("denmark", 56.2639, 9.5018),
    ("finland", 61.9241, 25.7482),
    ("portugal", 39.3999, -8.2245),
    ("ireland", 53.4129, -8.2439),
    ("poland", 51.9194, 19.1451),
    ("austria", 47.5162, 14.5501),
    ("czech", 49.8175, 15.4730),
    ("greece", 39.0742, 21.8243),
    ("russia", 61.5240, 105.3188),
    ("china", 35.8617, 104.1954),
    ("korea", 35.9078, 127.7669),
    ("india", 20.5937, 78.9629),
    ("argentina", -38.4161, -63.6167),
    ("chile", -35.6751, -71.5430),
    ("colombia", 4.5709, -74.2973),
    ("peru", -9.1900, -75.0152),
    ("new zealand", -40.9006, 174.8860),
    ("south africa", -30.5595, 22.9375),
    ("israel", 31.0461, 34.8516),
    ("turkey", 38.9637, 35.2433),
];

/// Extracts the country part of a location key: the segment after the
/// last `-` (or `,`), lowercased, with underscores as spaces.
fn country_of(key: &str) -> String {
    let last = key
        .rsplit(|c| c == '-' || c == ',')
        .next()
        .unwrap_or(key);
    last.trim().replace('_', " ").to_ascii_lowercase()
}

/// Returns the centroid of the key's country, if it is in the table.
pub fn approximate(key: &str) -> Option<Coordinates> {
    let country = country_of(key);
    COUNTRY_CENTROIDS
        .iter()
        .find(|(name, _, _)| *name == country)
        .map(|&(_, lat, lon)| Coordinates::new(lat, lon))
}
