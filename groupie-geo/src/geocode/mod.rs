//! Geocoding: location keys to coordinates.
//!
//! - [`GeocodeCache`]: persistent key to coordinates map with debounced
//!   flushes to a JSON file
//! - [`GeocodeResolver`]: cache-first lookup against a Nominatim-compatible
//!   search service, with retry, rate limiting and in-flight deduplication
//! - [`normalize_key`]: rewrites outdated place names
//! - [`FallbackMode`]: optional country-centroid approximation

pub mod cache;
mod error;
mod fallback;
mod normalize;
mod resolver;

pub use cache::{default_cache_path, load_entries, CacheSettings, GeocodeCache};
pub use error::GeocodeError;
pub use fallback::{approximate, FallbackMode};
pub use normalize::{normalize_key, to_query};
pub use resolver::{
    GeocodeResolver, ResolveSource, Resolved, ResolverSettings, DEFAULT_GEOCODE_ENDPOINT,
    DEFAULT_POST_SUCCESS_DELAY, DEFAULT_REQUEST_TIMEOUT,
};
