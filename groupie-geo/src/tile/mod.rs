//! Slippy-map tile fetching.
//!
//! [`TileFetcher`] serves PNG tiles from a [`TileCache`] directory and
//! downloads missing ones from a list of mirrors. Anything that does not
//! look like a PNG (empty bodies, HTML error pages from rate limiting) is
//! rejected both on download and when read back from disk.

mod cache;
mod error;
mod fetcher;

pub use cache::{default_tile_dir, TileCache, TileCacheStats};
pub use error::TileError;
pub use fetcher::{
    TileFetcher, TileSettings, DEFAULT_MIRROR_DELAY, DEFAULT_TILE_MIRRORS, DEFAULT_TILE_TIMEOUT,
};

use image::ImageFormat;

/// Whether `data` is non-empty and starts with the PNG signature.
pub fn is_png(data: &[u8]) -> bool {
    !data.is_empty() && matches!(image::guess_format(data), Ok(ImageFormat::Png))
}
