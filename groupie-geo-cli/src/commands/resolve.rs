//! Resolve command - look up coordinates for location keys.

use groupie_geo::geocode::FallbackMode;
use groupie_geo::GeoService;

use super::common::{progress_bar, progress_callback, unique_keys};
use crate::error::CliError;
use crate::runner::{cancel_on_ctrlc, CliRunner};

/// Arguments for the resolve command.
pub struct ResolveArgs {
    pub keys: Vec<String>,
    pub parallel: Option<usize>,
    pub fallback: Option<FallbackMode>,
}

/// Run the resolve command.
///
/// Prints one tab-separated `key lat lon` line per resolved key, in the
/// order given. Unresolved keys are listed on stderr.
pub fn run(mut runner: CliRunner, args: ResolveArgs) -> Result<(), CliError> {
    runner.log_startup("resolve");

    // CLI takes precedence over config
    if let Some(parallel) = args.parallel {
        runner.config_mut().geocode.max_parallel = parallel;
    }
    if let Some(fallback) = args.fallback {
        runner.config_mut().geocode.fallback = fallback;
    }
    let config = runner.config().clone();
    let keys = unique_keys(&args.keys);

    runner.block_on(async {
        let service = GeoService::start(&config).await?;
        cancel_on_ctrlc(service.cancellation())?;

        let bar = progress_bar(keys.len() as u64, "Resolving")?;
        let outcome = service
            .resolve_all(keys.iter().cloned(), Some(progress_callback(&bar)))
            .await;
        bar.finish_and_clear();

        for key in &keys {
            if let Some(coords) = outcome.resolved.get(key) {
                println!("{}\t{:.6}\t{:.6}", key, coords.latitude, coords.longitude);
            }
        }
        for key in keys.iter().filter(|k| outcome.failed.contains(k)) {
            eprintln!("Unresolved: {}", key);
        }
        eprintln!(
            "Resolved {}/{} locations ({} cached)",
            outcome.resolved.len(),
            outcome.total(),
            service.cache().size()
        );

        let cancelled = outcome.cancelled;
        service.shutdown().await;

        if cancelled {
            Err(CliError::Interrupted)
        } else {
            Ok(())
        }
    })
}
