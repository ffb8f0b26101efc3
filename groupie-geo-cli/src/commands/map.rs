//! Map command - resolve locations and download the tiles that show them.

use groupie_geo::coord::GridSettings;
use groupie_geo::{Coordinates, GeoService};

use super::common::{progress_bar, progress_callback, unique_keys};
use crate::error::CliError;
use crate::runner::{cancel_on_ctrlc, CliRunner};

/// Arguments for the map command.
pub struct MapArgs {
    pub keys: Vec<String>,
    pub max_tiles: Option<u64>,
}

/// Run the map command.
pub fn run(runner: CliRunner, args: MapArgs) -> Result<(), CliError> {
    runner.log_startup("map");
    let config = runner.config().clone();
    let keys = unique_keys(&args.keys);

    let mut grid_settings = GridSettings::default();
    if let Some(max_tiles) = args.max_tiles {
        grid_settings.max_tiles = max_tiles.max(1);
    }

    runner.block_on(async {
        let service = GeoService::start(&config).await?;
        cancel_on_ctrlc(service.cancellation())?;

        let bar = progress_bar(keys.len() as u64, "Resolving")?;
        let outcome = service
            .resolve_all(keys.iter().cloned(), Some(progress_callback(&bar)))
            .await;
        bar.finish_and_clear();

        if outcome.cancelled {
            service.shutdown().await;
            return Err(CliError::Interrupted);
        }

        let markers: Vec<(&String, Coordinates)> = keys
            .iter()
            .filter_map(|k| outcome.resolved.get(k).map(|c| (k, *c)))
            .collect();
        let points: Vec<Coordinates> = markers.iter().map(|(_, c)| *c).collect();

        let bar = progress_bar(0, "Tiles")?;
        let area = service
            .fetch_area(&points, &grid_settings, Some(progress_callback(&bar)))
            .await;
        bar.finish_and_clear();

        let Some(area) = area else {
            service.shutdown().await;
            eprintln!("No locations resolved; nothing to draw");
            return Ok(());
        };

        let grid = area.grid;
        let (width, height) = grid.pixel_size();
        println!(
            "Zoom {}: x {}..={}, y {}..={} ({} tiles, {}x{} px)",
            grid.zoom,
            grid.x_min,
            grid.x_max,
            grid.y_min,
            grid.y_max,
            grid.len(),
            width,
            height
        );
        for (key, coords) in &markers {
            let (px, py) = grid.pixel_offset(coords);
            println!("  {}\t{}\t({:.0}, {:.0})", key, coords, px, py);
        }
        for key in &outcome.failed {
            eprintln!("Unresolved: {}", key);
        }
        if !area.tiles.failed.is_empty() {
            eprintln!("{} tiles could not be fetched", area.tiles.failed.len());
        }

        let cancelled = area.tiles.cancelled;
        service.shutdown().await;
        if cancelled {
            Err(CliError::Interrupted)
        } else {
            Ok(())
        }
    })
}
