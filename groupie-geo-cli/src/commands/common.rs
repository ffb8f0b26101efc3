//! Helpers shared across CLI commands.

use std::sync::Arc;

use groupie_geo::geocode::FallbackMode;
use groupie_geo::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::CliError;

/// Parses `--fallback` values (`disabled`, `before-service`, `after-service`).
pub fn parse_fallback(value: &str) -> Result<FallbackMode, String> {
    value.parse()
}

/// Progress bar on stderr for a batch of `len` items.
pub fn progress_bar(len: u64, action: &str) -> Result<ProgressBar, CliError> {
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} {prefix} {bar:30.cyan/dim} {pos}/{len} {elapsed:.dim}",
    )
    .map_err(|e| CliError::Startup(format!("Invalid progress template: {}", e)))?
    .progress_chars("━╸─");

    let bar = ProgressBar::new(len);
    bar.set_style(style);
    bar.set_prefix(action.to_string());
    Ok(bar)
}

/// Drives `bar` from a batch's `(completed, total)` callback.
pub fn progress_callback(bar: &ProgressBar) -> ProgressCallback {
    let bar = bar.clone();
    Arc::new(move |completed, total| {
        bar.set_length(total as u64);
        bar.set_position(completed as u64);
    })
}

/// Keys in first-seen order without duplicates.
pub fn unique_keys(keys: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    keys.iter()
        .filter(|k| seen.insert(k.as_str()))
        .cloned()
        .collect()
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
