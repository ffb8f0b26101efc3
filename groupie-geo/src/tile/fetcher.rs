//! Tile download with mirror failover.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::cache::{default_tile_dir, TileCache};
use super::error::TileError;
use super::is_png;
use crate::coalesce::RequestCoalescer;
use crate::coord::TileCoord;
use crate::http::AsyncHttpClient;

/// The three lettered OpenStreetMap tile servers.
pub const DEFAULT_TILE_MIRRORS: [&str; 3] = [
    "https://a.tile.openstreetmap.org/{z}/{x}/{y}.png",
    "https://b.tile.openstreetmap.org/{z}/{x}/{y}.png",
    "https://c.tile.openstreetmap.org/{z}/{x}/{y}.png",
];

/// Default per-request timeout for tile downloads.
pub const DEFAULT_TILE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause before trying the next mirror.
pub const DEFAULT_MIRROR_DELAY: Duration = Duration::from_millis(100);

/// Tile fetcher configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSettings {
    /// URL templates with `{z}`, `{x}` and `{y}` placeholders, tried in order.
    pub mirrors: Vec<String>,
    pub cache_dir: PathBuf,
    pub request_timeout: Duration,
    pub mirror_delay: Duration,
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            mirrors: DEFAULT_TILE_MIRRORS.iter().map(|s| s.to_string()).collect(),
            cache_dir: default_tile_dir(),
            request_timeout: DEFAULT_TILE_TIMEOUT,
            mirror_delay: DEFAULT_MIRROR_DELAY,
        }
    }
}

/// Fetches PNG tiles through the disk cache, falling back to the mirrors.
pub struct TileFetcher<C: AsyncHttpClient> {
    client: C,
    cache: TileCache,
    settings: TileSettings,
    in_flight: RequestCoalescer<TileCoord, Result<Bytes, TileError>>,
}

impl<C: AsyncHttpClient> TileFetcher<C> {
    pub fn new(client: C, settings: TileSettings) -> Self {
        Self {
            client,
            cache: TileCache::new(settings.cache_dir.clone()),
            settings,
            in_flight: RequestCoalescer::new("tile"),
        }
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn settings(&self) -> &TileSettings {
        &self.settings
    }

    /// Returns the PNG bytes for `tile`.
    pub async fn fetch_tile(&self, tile: TileCoord) -> Result<Bytes, TileError> {
        tile.validate().map_err(|_| TileError::InvalidTile(tile))?;

        if let Some(data) = self.cache.get(&tile).await {
            tracing::trace!(tile = %tile, "Tile cache hit");
            return Ok(data);
        }

        self.in_flight.execute(tile, || self.fetch_uncached(tile)).await
    }

    /// Like [`fetch_tile`](Self::fetch_tile), giving up with
    /// [`TileError::Cancelled`] when `cancel` fires first.
    pub async fn fetch_tile_cancellable(
        &self,
        tile: TileCoord,
        cancel: &CancellationToken,
    ) -> Result<Bytes, TileError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TileError::Cancelled),
            result = self.fetch_tile(tile) => result,
        }
    }

    async fn fetch_uncached(&self, tile: TileCoord) -> Result<Bytes, TileError> {
        // Another leader may have stored the tile between our cache check
        // and registering.
        if let Some(data) = self.cache.get(&tile).await {
            return Ok(data);
        }
        self.download(tile).await
    }

    async fn download(&self, tile: TileCoord) -> Result<Bytes, TileError> {
        let timeout = self.settings.request_timeout;

        for (i, template) in self.settings.mirrors.iter().enumerate() {
            if i > 0 && !self.settings.mirror_delay.is_zero() {
                tokio::time::sleep(self.settings.mirror_delay).await;
            }

            let url = tile.expand_template(template);
            match tokio::time::timeout(timeout, self.client.get(&url, timeout)).await {
                Ok(Ok(body)) if is_png(&body) => {
                    if let Err(e) = self.cache.put(&tile, body.clone()).await {
                        tracing::warn!(tile = %tile, error = %e, "Failed to cache tile");
                    }
                    tracing::debug!(tile = %tile, bytes = body.len(), mirror = i, "Downloaded tile");
                    return Ok(body);
                }
                Ok(Ok(body)) => {
                    tracing::warn!(
                        tile = %tile,
                        url = %url,
                        bytes = body.len(),
                        "Tile response is not a PNG (maybe rate limited)"
                    );
                }
                Ok(Err(e)) => {
                    tracing::debug!(tile = %tile, url = %url, error = %e, "Tile mirror failed");
                }
                Err(_) => {
                    tracing::debug!(tile = %tile, url = %url, "Tile mirror timed out");
                }
            }
        }

        tracing::warn!(tile = %tile, "All tile mirrors failed");
        Err(TileError::AllMirrorsFailed {
            tile,
            attempts: self.settings.mirrors.len(),
        })
    }
}
