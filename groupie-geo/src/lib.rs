//! groupie-geo - Geocoding cache and map tile pipeline for Groupie Tracker
//!
//! This library turns concert location keys such as `"paris-france"` into
//! coordinates and downloads the OpenStreetMap tiles needed to show them.
//!
//! # Modules
//!
//! - [`geocode`] - persistent geocode cache and Nominatim resolver
//! - [`tile`] - tile download with mirror failover and a disk cache
//! - [`coordinator`] - bounded-parallel batch execution with cancellation
//! - [`coord`] - coordinates, tile addressing and grid planning
//! - [`service`] - everything wired together from a [`config::ConfigFile`]

pub mod coalesce;
pub mod config;
pub mod coord;
pub mod coordinator;
pub mod geocode;
pub mod http;
pub mod limiter;
pub mod logging;
pub mod retry;
pub mod service;
pub mod tile;

pub use config::{ConfigError, ConfigFile};
pub use coord::{Coordinates, TileCoord};
pub use coordinator::{BatchOutcome, Coordinator, ProgressCallback};
pub use geocode::{GeocodeCache, GeocodeError, GeocodeResolver, ResolveSource, Resolved};
pub use http::{AsyncHttpClient, HttpError, ReqwestClient};
pub use service::{GeoService, MapArea, ServiceError};
pub use tile::{TileError, TileFetcher};

/// Crate version, shown by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
