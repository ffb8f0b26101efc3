//! groupie-geo CLI - Command-line interface
//!
//! Resolves concert location keys to coordinates, downloads map tiles and
//! manages the local caches used by Groupie Tracker.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use groupie_geo::geocode::FallbackMode;

use commands::cache::CacheAction;
use commands::common::parse_fallback;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "groupie-geo")]
#[command(version = groupie_geo::VERSION)]
#[command(about = "Geocoding and map tile caches for Groupie Tracker", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.groupie-geo/config.ini
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve location keys (e.g. paris-france) to coordinates
    Resolve {
        /// Location keys in "city-country" form
        #[arg(required = true)]
        keys: Vec<String>,

        /// Maximum concurrent lookups
        #[arg(long)]
        parallel: Option<usize>,

        /// Country-centroid fallback: disabled, before-service or after-service
        #[arg(long, value_parser = parse_fallback)]
        fallback: Option<FallbackMode>,
    },

    /// Fetch a single map tile
    Tile {
        /// Zoom level (0-19)
        zoom: u8,
        /// Tile column
        x: u32,
        /// Tile row
        y: u32,

        /// Write the PNG to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve locations and download the tiles covering them
    Map {
        /// Location keys in "city-country" form
        #[arg(required = true)]
        keys: Vec<String>,

        /// Upper bound on the number of tiles
        #[arg(long)]
        max_tiles: Option<u64>,
    },

    /// Inspect or clear the geocode and tile caches
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let runner = CliRunner::new(cli.config.as_deref())?;

    match cli.command {
        Commands::Resolve {
            keys,
            parallel,
            fallback,
        } => commands::resolve::run(
            runner,
            commands::resolve::ResolveArgs {
                keys,
                parallel,
                fallback,
            },
        ),
        Commands::Tile { zoom, x, y, output } => commands::tile::run(
            runner,
            commands::tile::TileArgs { zoom, x, y, output },
        ),
        Commands::Map { keys, max_tiles } => {
            commands::map::run(runner, commands::map::MapArgs { keys, max_tiles })
        }
        Commands::Cache { action } => commands::cache::run(runner, action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resolve_with_overrides() {
        let cli = Cli::try_parse_from([
            "groupie-geo",
            "--config",
            "/tmp/geo.ini",
            "resolve",
            "paris-france",
            "london-uk",
            "--parallel",
            "4",
            "--fallback",
            "after-service",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/geo.ini")));
        match cli.command {
            Commands::Resolve {
                keys,
                parallel,
                fallback,
            } => {
                assert_eq!(keys, vec!["paris-france", "london-uk"]);
                assert_eq!(parallel, Some(4));
                assert_eq!(fallback, Some(FallbackMode::AfterService));
            }
            _ => panic!("expected resolve"),
        }
    }

    #[test]
    fn test_parse_tile_and_cache() {
        let cli = Cli::try_parse_from(["groupie-geo", "tile", "3", "4", "2", "-o", "t.png"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Tile { zoom: 3, x: 4, y: 2, output: Some(_) }
        ));

        let cli = Cli::try_parse_from(["groupie-geo", "cache", "clear", "--tiles"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Clear { tiles: true }
            }
        ));
    }

    #[test]
    fn test_resolve_requires_keys() {
        assert!(Cli::try_parse_from(["groupie-geo", "resolve"]).is_err());
        assert!(Cli::try_parse_from(["groupie-geo", "resolve", "x", "--fallback", "maybe"]).is_err());
    }
}
