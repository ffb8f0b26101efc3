//! Cache management CLI commands.

use clap::Subcommand;
use groupie_geo::geocode::{load_entries, GeocodeCache};
use groupie_geo::tile::TileCache;

use super::common::format_size;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show geocode and tile cache statistics
    Stats,
    /// Clear the geocode cache
    Clear {
        /// Also delete all cached map tiles
        #[arg(long)]
        tiles: bool,
    },
}

/// Run a cache subcommand.
pub fn run(runner: CliRunner, action: CacheAction) -> Result<(), CliError> {
    let config = runner.config().clone();
    let geocode_path = config.geocode.cache_path.clone();
    let tiles = TileCache::new(config.tiles.cache_dir.clone());

    match action {
        CacheAction::Stats => {
            let entries = load_entries(&geocode_path);
            println!("Geocode cache: {}", geocode_path.display());
            println!("  Locations: {}", entries.len());

            let stats = runner
                .block_on(tiles.stats())
                .map_err(|e| CliError::CacheStats(e.to_string()))?;
            println!("Tile cache: {}", tiles.dir().display());
            println!("  Files: {}", stats.files);
            println!("  Size:  {}", format_size(stats.bytes));
            Ok(())
        }
        CacheAction::Clear { tiles: clear_tiles } => {
            println!("Clearing geocode cache at: {}", geocode_path.display());
            runner.block_on(async {
                let cache = GeocodeCache::load(geocode_path.clone(), config.cache_settings()).await;
                let removed = cache.size();
                cache
                    .clear()
                    .await
                    .map_err(|e| CliError::CacheClear(e.to_string()))?;
                println!("Removed {} locations", removed);

                if clear_tiles {
                    println!("Clearing tile cache at: {}", tiles.dir().display());
                    let files = tiles
                        .clear()
                        .await
                        .map_err(|e| CliError::CacheClear(e.to_string()))?;
                    println!("Deleted {} tiles", files);
                }
                Ok(())
            })
        }
    }
}
