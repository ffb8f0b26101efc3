//! Tile command - fetch a single map tile.

use std::path::PathBuf;

use groupie_geo::{GeoService, TileCoord};

use super::common::format_size;
use crate::error::CliError;
use crate::runner::{cancel_on_ctrlc, CliRunner};

/// Arguments for the tile command.
pub struct TileArgs {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
    pub output: Option<PathBuf>,
}

/// Run the tile command.
pub fn run(runner: CliRunner, args: TileArgs) -> Result<(), CliError> {
    runner.log_startup("tile");
    let config = runner.config().clone();
    let tile = TileCoord::new(args.zoom, args.x, args.y);

    runner.block_on(async {
        let service = GeoService::start(&config).await?;
        cancel_on_ctrlc(service.cancellation())?;

        let result = service.fetch_tile(tile).await;
        let cached_at = service.tile_cache().path_for(&tile);
        service.shutdown().await;
        let data = result?;

        match args.output {
            Some(path) => {
                std::fs::write(&path, &data).map_err(|e| {
                    CliError::Io(format!("Failed to write {}: {}", path.display(), e))
                })?;
                println!("Wrote tile {} ({}) to {}", tile, format_size(data.len() as u64), path.display());
            }
            None => {
                println!("Tile {} ({})", tile, format_size(data.len() as u64));
                println!("  Cached at: {}", cached_at.display());
            }
        }
        Ok(())
    })
}
