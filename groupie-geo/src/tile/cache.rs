//! On-disk tile cache.
//!
//! Tiles live as flat files named `{zoom}_{x}_{y}.png` in one directory,
//! created on first use. All file I/O runs on the blocking pool.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::sync::OnceCell;

use super::is_png;
use crate::coord::TileCoord;

/// Returns `$TMPDIR/groupie-tiles`.
pub fn default_tile_dir() -> PathBuf {
    std::env::temp_dir().join("groupie-tiles")
}

/// File count and total size of a tile cache directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileCacheStats {
    pub files: usize,
    pub bytes: u64,
}

/// Directory-backed PNG tile store.
#[derive(Debug)]
pub struct TileCache {
    dir: PathBuf,
    created: OnceCell<()>,
}

impl TileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            created: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `tile`.
    pub fn path_for(&self, tile: &TileCoord) -> PathBuf {
        self.dir.join(tile.file_name())
    }

    async fn ensure_dir(&self) -> io::Result<()> {
        self.created
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.dir).await?;
                tracing::debug!(dir = %self.dir.display(), "Created tile cache directory");
                Ok::<(), io::Error>(())
            })
            .await
            .map(|_| ())
    }

    /// Returns the cached tile if present and a valid PNG.
    ///
    /// An empty or non-PNG file is deleted so the tile gets downloaded
    /// again.
    pub async fn get(&self, tile: &TileCoord) -> Option<Bytes> {
        let path = self.path_for(tile);
        let read_path = path.clone();
        let data = match tokio::task::spawn_blocking(move || std::fs::read(read_path)).await {
            Ok(Ok(data)) => Bytes::from(data),
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => return None,
            Ok(Err(e)) => {
                tracing::warn!(tile = %tile, error = %e, "Failed to read cached tile");
                return None;
            }
            Err(e) => {
                tracing::warn!(tile = %tile, error = %e, "Tile read task failed");
                return None;
            }
        };

        if is_png(&data) {
            return Some(data);
        }

        tracing::warn!(tile = %tile, bytes = data.len(), "Evicting invalid cached tile");
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(tile = %tile, error = %e, "Failed to remove invalid tile");
            }
        }
        None
    }

    /// Stores `data` for `tile` (temp file, then rename).
    pub async fn put(&self, tile: &TileCoord, data: Bytes) -> io::Result<()> {
        self.ensure_dir().await?;
        let path = self.path_for(tile);

        tokio::task::spawn_blocking(move || {
            let temp_path = path.with_extension("png.tmp");
            std::fs::write(&temp_path, &data)?;
            std::fs::rename(&temp_path, &path)
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Counts cached tile files and their total size.
    pub async fn stats(&self) -> io::Result<TileCacheStats> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            let mut stats = TileCacheStats::default();
            for path in tile_files(&dir)? {
                stats.files += 1;
                stats.bytes += std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            }
            Ok::<TileCacheStats, io::Error>(stats)
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Deletes every cached tile file. Returns the number removed.
    pub async fn clear(&self) -> io::Result<usize> {
        let dir = self.dir.clone();
        let removed = tokio::task::spawn_blocking(move || {
            let mut removed = 0;
            for path in tile_files(&dir)? {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
            Ok::<usize, io::Error>(removed)
        })
        .await
        .map_err(io::Error::other)??;

        tracing::info!(dir = %self.dir.display(), removed, "Cleared tile cache");
        Ok(removed)
    }
}

/// `.png` files directly under `dir`. A missing directory has none.
fn tile_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "png") {
            files.push(path);
        }
    }
    Ok(files)
}
