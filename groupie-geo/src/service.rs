//! Service bootstrap.
//!
//! [`GeoService`] wires the library together from a [`ConfigFile`]:
//!
//! 1. HTTP client with the configured user agent
//! 2. Geocode cache loaded from disk (starts its flush task)
//! 3. Resolver and tile fetcher sharing the client
//! 4. Coordinator for batch work
//!
//! All operations started through the service observe one shutdown token.
//! [`GeoService::shutdown`] cancels it and flushes the geocode cache.
//!
//! ```ignore
//! let config = ConfigFile::load()?;
//! let service = GeoService::start(&config).await?;
//!
//! let outcome = service.resolve_all(["paris-france", "london-uk"], None).await;
//! service.shutdown().await;
//! ```

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{ConfigError, ConfigFile};
use crate::coord::{Coordinates, GridSettings, TileCoord, TileGrid};
use crate::coordinator::{BatchOutcome, Coordinator, ProgressCallback};
use crate::geocode::{GeocodeCache, GeocodeError, GeocodeResolver, Resolved};
use crate::http::{AsyncHttpClient, HttpError, ReqwestClient};
use crate::tile::{TileCache, TileError, TileFetcher};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] HttpError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Tiles covering a set of points, and the fetch results for them.
#[derive(Debug)]
pub struct MapArea {
    pub grid: TileGrid,
    pub tiles: BatchOutcome<TileCoord, Bytes>,
}

/// The configured geocoding and tile pipeline.
pub struct GeoService<C: AsyncHttpClient + 'static = ReqwestClient> {
    coordinator: Coordinator<C>,
    geocode_parallel: usize,
    tile_parallel: usize,
    cancellation: CancellationToken,
}

impl GeoService<ReqwestClient> {
    /// Builds the service on a real HTTP client.
    pub async fn start(config: &ConfigFile) -> Result<Self, ServiceError> {
        let client = ReqwestClient::with_user_agent(&config.geocode.user_agent)?;
        Ok(Self::with_client(config, client).await)
    }
}

impl<C: AsyncHttpClient + Clone + 'static> GeoService<C> {
    /// Builds the service on `client`.
    pub async fn with_client(config: &ConfigFile, client: C) -> Self {
        let cache = Arc::new(
            GeocodeCache::load(config.geocode.cache_path.clone(), config.cache_settings()).await,
        );
        info!(
            path = %config.geocode.cache_path.display(),
            entries = cache.size(),
            "Geocode cache ready"
        );

        let resolver = Arc::new(GeocodeResolver::new(
            client.clone(),
            cache,
            config.resolver_settings(),
        ));
        let tiles = Arc::new(TileFetcher::new(client, config.tile_settings()));

        info!(
            endpoint = %config.geocode.endpoint,
            mirrors = config.tiles.mirrors.len(),
            fallback = %config.geocode.fallback,
            "GeoService started"
        );

        Self {
            coordinator: Coordinator::new(resolver, tiles),
            geocode_parallel: config.geocode.max_parallel,
            tile_parallel: config.tiles.max_parallel,
            cancellation: CancellationToken::new(),
        }
    }
}

impl<C: AsyncHttpClient + 'static> GeoService<C> {
    pub fn coordinator(&self) -> &Coordinator<C> {
        &self.coordinator
    }

    pub fn cache(&self) -> &Arc<GeocodeCache> {
        self.coordinator.resolver().cache()
    }

    pub fn tile_cache(&self) -> &TileCache {
        self.coordinator.tile_fetcher().cache()
    }

    /// Shutdown token. Cancelling it stops every running operation.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn geocode_parallel(&self) -> usize {
        self.geocode_parallel
    }

    pub fn tile_parallel(&self) -> usize {
        self.tile_parallel
    }

    /// Resolves one location key.
    pub async fn resolve(&self, key: &str) -> Result<Option<Resolved>, GeocodeError> {
        self.coordinator
            .resolver()
            .lookup_cancellable(key, &self.cancellation)
            .await
    }

    /// Fetches one tile.
    pub async fn fetch_tile(&self, tile: TileCoord) -> Result<Bytes, TileError> {
        self.coordinator
            .tile_fetcher()
            .fetch_tile_cancellable(tile, &self.cancellation)
            .await
    }

    /// Resolves a batch of keys with the configured parallelism.
    pub async fn resolve_all<I>(
        &self,
        keys: I,
        progress: Option<ProgressCallback>,
    ) -> BatchOutcome<String, Coordinates>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.coordinator
            .resolve_all(keys, self.geocode_parallel, &self.cancellation, progress)
            .await
    }

    /// Fetches a batch of tiles with the configured parallelism.
    pub async fn fetch_tiles(
        &self,
        tiles: impl IntoIterator<Item = TileCoord>,
        progress: Option<ProgressCallback>,
    ) -> BatchOutcome<TileCoord, Bytes> {
        self.coordinator
            .fetch_tiles(tiles, self.tile_parallel, &self.cancellation, progress)
            .await
    }

    /// Plans the tile grid around `points` and fetches every tile in it.
    ///
    /// Returns `None` when there are no usable points.
    pub async fn fetch_area(
        &self,
        points: &[Coordinates],
        settings: &GridSettings,
        progress: Option<ProgressCallback>,
    ) -> Option<MapArea> {
        let grid = TileGrid::covering(points, settings)?;
        tracing::debug!(
            zoom = grid.zoom,
            width = grid.width(),
            height = grid.height(),
            "Fetching map area"
        );
        let tiles = self.fetch_tiles(grid.tiles(), progress).await;
        Some(MapArea { grid, tiles })
    }

    /// Cancels outstanding work and writes pending cache entries to disk.
    pub async fn shutdown(self) {
        info!("Shutting down GeoService");
        self.cancellation.cancel();
        self.cache().flush().await;
        info!(entries = self.cache().size(), "GeoService shutdown complete");
    }
}
