//! CLI error type.

use std::fmt;

use groupie_geo::{ConfigError, ServiceError, TileError};

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or is invalid.
    Config(String),
    /// Logging or runtime setup failed.
    Startup(String),
    /// Service construction failed.
    Service(ServiceError),
    /// A single tile fetch failed.
    Tile(TileError),
    /// Reading or writing a local file failed.
    Io(String),
    CacheClear(String),
    CacheStats(String),
    /// Ctrl-C interrupted the command.
    Interrupted,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Startup(msg) => write!(f, "Startup failed: {}", msg),
            CliError::Service(e) => write!(f, "{}", e),
            CliError::Tile(e) => write!(f, "Tile fetch failed: {}", e),
            CliError::Io(msg) => write!(f, "I/O error: {}", msg),
            CliError::CacheClear(msg) => write!(f, "Failed to clear cache: {}", msg),
            CliError::CacheStats(msg) => write!(f, "Failed to read cache statistics: {}", msg),
            CliError::Interrupted => write!(f, "Interrupted"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}

impl From<TileError> for CliError {
    fn from(e: TileError) -> Self {
        match e {
            TileError::Cancelled => CliError::Interrupted,
            other => CliError::Tile(other),
        }
    }
}

impl CliError {
    /// Process exit code for this error. 130 follows the shell convention
    /// for SIGINT.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Interrupted => 130,
            CliError::Config(_) => 2,
            _ => 1,
        }
    }
}
