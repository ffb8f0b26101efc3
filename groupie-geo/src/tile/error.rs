use thiserror::Error;

use crate::coord::TileCoord;

/// Errors returned by [`TileFetcher`](super::TileFetcher).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    /// Zoom above 19 or column/row outside `0..2^zoom`.
    #[error("Invalid tile coordinate {0}")]
    InvalidTile(TileCoord),

    /// No mirror returned a valid PNG.
    #[error("All {attempts} mirrors failed for tile {tile}")]
    AllMirrorsFailed { tile: TileCoord, attempts: usize },

    /// The fetch was cancelled before completing.
    #[error("Tile fetch cancelled")]
    Cancelled,
}
