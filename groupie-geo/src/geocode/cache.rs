//! Persistent geocode cache.
//!
//! An in-memory map from normalized location key to [`Coordinates`],
//! mirrored to a single JSON document on disk. Writes are debounced: every
//! successful [`put`](GeocodeCache::put) sends a dirty signal to a
//! background flush task, which writes the file once the signals have been
//! quiet for the debounce interval. The last flush happens when the cache
//! is dropped.
//!
//! # File format
//!
//! ```json
//! {
//!   "locations": {
//!     "paris-france": { "latitude": 48.8566, "longitude": 2.3522 }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::coord::Coordinates;

/// Default file name, placed in the user's home directory.
pub const DEFAULT_CACHE_FILE: &str = ".groupie-tracker-geocache.json";

/// Default quiet period before a flush.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Default upper bound on a single flush.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns `~/.groupie-tracker-geocache.json`, or the file in the current
/// directory when there is no home directory.
pub fn default_cache_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_CACHE_FILE)
}

/// Flush timing for [`GeocodeCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub debounce: Duration,
    pub flush_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(default)]
    locations: BTreeMap<String, Coordinates>,
}

/// Reads the cache document at `path`.
///
/// A missing or malformed file yields an empty map. Entries with unusable
/// coordinates are dropped.
pub fn load_entries(path: &Path) -> HashMap<String, Coordinates> {
    match std::fs::read(path) {
        Ok(data) => parse_document(path, &data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "Starting fresh geocode cache");
            HashMap::new()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read geocode cache");
            HashMap::new()
        }
    }
}

fn parse_document(path: &Path, data: &[u8]) -> HashMap<String, Coordinates> {
    let document: CacheDocument = match serde_json::from_slice(data) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Geocode cache is malformed, starting empty"
            );
            return HashMap::new();
        }
    };

    let total = document.locations.len();
    let entries: HashMap<_, _> = document
        .locations
        .into_iter()
        .filter(|(_, coords)| coords.is_usable())
        .collect();

    if entries.len() < total {
        tracing::debug!(
            dropped = total - entries.len(),
            "Ignored unusable geocode cache entries"
        );
    }
    tracing::info!(
        path = %path.display(),
        entries = entries.len(),
        "Loaded geocode cache"
    );
    entries
}

struct CacheInner {
    entries: RwLock<HashMap<String, Coordinates>>,
    path: Option<PathBuf>,
    dirty: AtomicBool,
    flush_lock: Arc<tokio::sync::Mutex<()>>,
    flush_timeout: Duration,
    flushes: AtomicU64,
}

impl CacheInner {
    /// Writes a snapshot if dirty. The whole flush, including waiting for a
    /// previous writer, is bounded by `flush_timeout`.
    async fn flush(&self) {
        let Some(path) = self.path.clone() else {
            self.dirty.store(false, Ordering::SeqCst);
            return;
        };

        match tokio::time::timeout(self.flush_timeout, self.write_snapshot(path)).await {
            Ok(Ok(Some(count))) => {
                self.flushes.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(entries = count, "Flushed geocode cache");
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                self.dirty.store(true, Ordering::SeqCst);
                tracing::warn!(error = %e, "Failed to save geocode cache");
            }
            Err(_) => {
                self.dirty.store(true, Ordering::SeqCst);
                tracing::warn!(
                    timeout_ms = self.flush_timeout.as_millis() as u64,
                    "Timeout saving geocode cache"
                );
            }
        }
    }

    /// Returns the number of entries written, or `None` when clean.
    ///
    /// The flush lock travels into the blocking writer, so a writer that
    /// outlives its caller's timeout still keeps the next one waiting.
    async fn write_snapshot(&self, path: PathBuf) -> io::Result<Option<usize>> {
        let serialized = Arc::clone(&self.flush_lock).lock_owned().await;
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }

        let document = CacheDocument {
            locations: self
                .entries
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        };
        let count = document.locations.len();

        tokio::task::spawn_blocking(move || {
            let _serialized = serialized;
            write_document(&path, &document)
        })
        .await
        .map_err(io::Error::other)??;

        Ok(Some(count))
    }
}

fn write_document(path: &Path, document: &CacheDocument) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let data = serde_json::to_vec_pretty(document).map_err(io::Error::other)?;

    // Write to temp file first, then rename for atomicity
    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, data)?;
    std::fs::rename(&temp_path, path)
}

/// Debounce loop: each dirty signal restarts the timer; a quiet period
/// triggers one flush. Exits after a final flush once every sender is gone.
async fn run_flusher(inner: Arc<CacheInner>, mut rx: mpsc::UnboundedReceiver<()>, debounce: Duration) {
    while rx.recv().await.is_some() {
        loop {
            tokio::select! {
                signal = rx.recv() => {
                    if signal.is_none() {
                        inner.flush().await;
                        return;
                    }
                }
                _ = tokio::time::sleep(debounce) => {
                    inner.flush().await;
                    break;
                }
            }
        }
    }
    inner.flush().await;
}

/// Location key to coordinates cache shared by all resolvers.
pub struct GeocodeCache {
    inner: Arc<CacheInner>,
    dirty_tx: Option<mpsc::UnboundedSender<()>>,
}

impl GeocodeCache {
    /// Loads the cache from `path` and starts its flush task.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn load(path: impl Into<PathBuf>, settings: CacheSettings) -> Self {
        let path = path.into();
        let read_path = path.clone();
        let entries = tokio::task::spawn_blocking(move || load_entries(&read_path))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Geocode cache reader task failed");
                HashMap::new()
            });

        let inner = Arc::new(CacheInner {
            entries: RwLock::new(entries),
            path: Some(path),
            dirty: AtomicBool::new(false),
            flush_lock: Arc::new(tokio::sync::Mutex::new(())),
            flush_timeout: settings.flush_timeout,
            flushes: AtomicU64::new(0),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_flusher(Arc::clone(&inner), rx, settings.debounce));

        Self {
            inner,
            dirty_tx: Some(tx),
        }
    }

    /// Creates a cache with no backing file. Flushes are no-ops.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: RwLock::new(HashMap::new()),
                path: None,
                dirty: AtomicBool::new(false),
                flush_lock: Arc::new(tokio::sync::Mutex::new(())),
                flush_timeout: DEFAULT_FLUSH_TIMEOUT,
                flushes: AtomicU64::new(0),
            }),
            dirty_tx: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<Coordinates> {
        self.inner.entries.read().get(key).copied()
    }

    /// Stores `coords` under `key` and schedules a flush.
    ///
    /// Returns `false` and stores nothing when `coords` is not usable.
    pub fn put(&self, key: &str, coords: Coordinates) -> bool {
        if !coords.is_usable() {
            tracing::debug!(key, %coords, "Refusing to cache unusable coordinates");
            return false;
        }

        self.inner.entries.write().insert(key.to_string(), coords);
        self.inner.dirty.store(true, Ordering::SeqCst);
        if let Some(tx) = &self.dirty_tx {
            // The flusher only stops after every sender is gone.
            let _ = tx.send(());
        }
        true
    }

    /// Writes the current contents to disk now, if anything changed.
    ///
    /// Failures and timeouts are logged, never returned.
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    /// Number of cached locations.
    pub fn size(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Empties the cache and removes the backing file.
    pub async fn clear(&self) -> io::Result<()> {
        let _serialized = self.inner.flush_lock.lock().await;
        self.inner.entries.write().clear();
        self.inner.dirty.store(false, Ordering::SeqCst);

        if let Some(path) = &self.inner.path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "Removed geocode cache file");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Number of successful writes to disk.
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.load(Ordering::SeqCst)
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }
}

impl std::fmt::Debug for GeocodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodeCache")
            .field("path", &self.inner.path)
            .field("entries", &self.size())
            .finish()
    }
}
