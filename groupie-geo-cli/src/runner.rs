//! Shared setup for commands: config, logging and the async runtime.

use std::future::Future;
use std::path::Path;

use groupie_geo::logging::{self, LoggingGuard};
use groupie_geo::ConfigFile;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// Loaded configuration plus the runtime commands execute on.
pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// Loads `config_path` (or the default config file) and initializes
    /// logging, then starts the runtime.
    pub fn new(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };

        // Logging first, while the process is still single-threaded.
        let guard =
            logging::init(&config.logging).map_err(|e| CliError::Startup(e.to_string()))?;

        let runtime = Runtime::new()
            .map_err(|e| CliError::Startup(format!("Failed to start async runtime: {}", e)))?;

        Ok(Self {
            config,
            runtime,
            _logging: guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Mutable config, for command-line overrides.
    pub fn config_mut(&mut self) -> &mut ConfigFile {
        &mut self.config
    }

    pub fn log_startup(&self, command: &str) {
        tracing::info!(
            version = groupie_geo::VERSION,
            command,
            "groupie-geo starting"
        );
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Cancels `token` on Ctrl-C.
pub fn cancel_on_ctrlc(token: CancellationToken) -> Result<(), CliError> {
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, cancelling...");
        token.cancel();
    })
    .map_err(|e| CliError::Startup(format!("Failed to set signal handler: {}", e)))
}
