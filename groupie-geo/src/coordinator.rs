//! Bounded-parallel batch execution.
//!
//! [`fan_out`] runs one task per unique key, at most `max_parallel` at a
//! time, and waits for all of them. Failures, panics and cancellation of a
//! single key never abort the batch; they are reported in
//! [`BatchOutcome::failed`].
//!
//! [`Coordinator`] binds `fan_out` to the geocode resolver and the tile
//! fetcher.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::coord::{Coordinates, TileCoord};
use crate::geocode::GeocodeResolver;
use crate::http::AsyncHttpClient;
use crate::limiter::ConcurrencyLimiter;
use crate::tile::TileFetcher;

/// Default parallelism for geocoding batches.
pub const DEFAULT_GEOCODE_PARALLEL: usize = 2;

/// Default parallelism for tile batches.
pub const DEFAULT_TILE_PARALLEL: usize = 4;

/// Progress callback: `(completed, total)`, called after each key.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Result of a batch. Every unique input key appears exactly once, either
/// in `resolved` or in `failed`.
#[derive(Debug)]
pub struct BatchOutcome<K, V> {
    pub resolved: HashMap<K, V>,
    pub failed: Vec<K>,
    /// At least one key was abandoned because of cancellation.
    pub cancelled: bool,
}

impl<K, V> BatchOutcome<K, V> {
    /// Number of unique keys in the batch.
    pub fn total(&self) -> usize {
        self.resolved.len() + self.failed.len()
    }

    /// True when every key resolved.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

enum KeyOutcome<V> {
    Done(V),
    Failed,
    Cancelled,
}

/// Runs `work` for every unique key with at most `max_parallel` running at
/// once, and returns when all have finished.
///
/// `work` returning `None`, panicking, or being cancelled puts the key in
/// `failed`. Keys still waiting for a permit when `cancel` fires never
/// start.
pub async fn fan_out<K, V, F, Fut>(
    keys: impl IntoIterator<Item = K>,
    max_parallel: usize,
    label: &str,
    cancel: &CancellationToken,
    progress: Option<ProgressCallback>,
    work: F,
) -> BatchOutcome<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Send + 'static,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<V>> + Send + 'static,
{
    let mut seen = HashSet::new();
    let unique: Vec<K> = keys.into_iter().filter(|k| seen.insert(k.clone())).collect();
    let total = unique.len();

    let limiter = Arc::new(ConcurrencyLimiter::new(max_parallel, label));
    let work = Arc::new(work);
    let mut tasks = JoinSet::new();

    for key in unique {
        let limiter = Arc::clone(&limiter);
        let work = Arc::clone(&work);
        let cancel = cancel.clone();

        tasks.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = limiter.acquire() => permit,
            };
            let Some(_permit) = permit else {
                return (key, KeyOutcome::Cancelled);
            };

            let task_key = key.clone();
            let guarded = AssertUnwindSafe(async move { (*work)(task_key).await }).catch_unwind();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => KeyOutcome::Cancelled,
                result = guarded => match result {
                    Ok(Some(value)) => KeyOutcome::Done(value),
                    Ok(None) => KeyOutcome::Failed,
                    Err(_) => {
                        tracing::error!(key = ?key, "Batch task panicked");
                        KeyOutcome::Failed
                    }
                },
            };
            (key, outcome)
        });
    }

    let mut outcome = BatchOutcome {
        resolved: HashMap::with_capacity(total),
        failed: Vec::new(),
        cancelled: false,
    };
    let mut pending = seen;
    let mut completed = 0;

    while let Some(joined) = tasks.join_next().await {
        completed += 1;
        match joined {
            Ok((key, result)) => {
                pending.remove(&key);
                match result {
                    KeyOutcome::Done(value) => {
                        outcome.resolved.insert(key, value);
                    }
                    KeyOutcome::Failed => outcome.failed.push(key),
                    KeyOutcome::Cancelled => {
                        outcome.failed.push(key);
                        outcome.cancelled = true;
                    }
                }
            }
            Err(e) => {
                tracing::error!(label, error = %e, "Batch task did not complete");
            }
        }

        if let Some(callback) = &progress {
            callback(completed, total);
        }
    }

    // Tasks lost to a JoinError still count as failed.
    outcome.failed.extend(pending);

    tracing::info!(
        label,
        total,
        resolved = outcome.resolved.len(),
        failed = outcome.failed.len(),
        cancelled = outcome.cancelled,
        peak_in_flight = limiter.peak_in_flight(),
        "Batch complete"
    );
    outcome
}

/// Batch front-end for geocoding and tile fetching.
pub struct Coordinator<C: AsyncHttpClient + 'static> {
    resolver: Arc<GeocodeResolver<C>>,
    tiles: Arc<TileFetcher<C>>,
}

impl<C: AsyncHttpClient + 'static> Coordinator<C> {
    pub fn new(resolver: Arc<GeocodeResolver<C>>, tiles: Arc<TileFetcher<C>>) -> Self {
        Self { resolver, tiles }
    }

    pub fn resolver(&self) -> &Arc<GeocodeResolver<C>> {
        &self.resolver
    }

    pub fn tile_fetcher(&self) -> &Arc<TileFetcher<C>> {
        &self.tiles
    }

    /// Resolves every key. The result map is keyed by the keys as given,
    /// before normalization.
    pub async fn resolve_all<I>(
        &self,
        keys: I,
        max_parallel: usize,
        cancel: &CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> BatchOutcome<String, Coordinates>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let resolver = Arc::clone(&self.resolver);
        fan_out(
            keys.into_iter().map(Into::into),
            max_parallel,
            "geocode",
            cancel,
            progress,
            move |key: String| {
                let resolver = Arc::clone(&resolver);
                async move {
                    match resolver.lookup(&key).await {
                        Ok(found) => found.map(|r| r.coords),
                        Err(e) => {
                            tracing::debug!(key = %key, error = %e, "Location unresolved");
                            None
                        }
                    }
                }
            },
        )
        .await
    }

    /// Fetches every tile.
    pub async fn fetch_tiles(
        &self,
        tiles: impl IntoIterator<Item = TileCoord>,
        max_parallel: usize,
        cancel: &CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> BatchOutcome<TileCoord, Bytes> {
        let fetcher = Arc::clone(&self.tiles);
        fan_out(
            tiles,
            max_parallel,
            "tiles",
            cancel,
            progress,
            move |tile: TileCoord| {
                let fetcher = Arc::clone(&fetcher);
                async move { fetcher.fetch_tile(tile).await.ok() }
            },
        )
        .await
    }
}
