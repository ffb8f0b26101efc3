//! INI configuration file.
//!
//! Settings live in `~/.groupie-geo/config.ini`. Every key is optional; a
//! missing file or key falls back to the built-in default. Unknown keys are
//! ignored so older binaries can read newer files.
//!
//! ```ini
//! [geocode]
//! endpoint = https://nominatim.openstreetmap.org/search
//! user_agent = groupie-tracker/1.0
//! cache_path = ~/.groupie-tracker-geocache.json
//! request_timeout_secs = 10
//! max_attempts = 3
//! initial_backoff_ms = 500
//! post_success_delay_ms = 800
//! max_parallel = 2
//! fallback = disabled
//!
//! [cache]
//! debounce_ms = 2000
//! flush_timeout_secs = 5
//!
//! [tiles]
//! mirrors = https://a.tile.openstreetmap.org/{z}/{x}/{y}.png, https://b.tile.openstreetmap.org/{z}/{x}/{y}.png
//! cache_dir = /tmp/groupie-tiles
//! request_timeout_secs = 5
//! mirror_delay_ms = 100
//! max_parallel = 4
//!
//! [logging]
//! level = info
//! directory = ~/.groupie-geo/logs
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, ParseOption};
use reqwest::Url;
use thiserror::Error;

use crate::coordinator::{DEFAULT_GEOCODE_PARALLEL, DEFAULT_TILE_PARALLEL};
use crate::geocode::{default_cache_path, CacheSettings, FallbackMode, ResolverSettings};
use crate::http::DEFAULT_USER_AGENT;
use crate::logging::LoggingConfig;
use crate::retry::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_SECS,
};
use crate::tile::{
    default_tile_dir, TileSettings, DEFAULT_MIRROR_DELAY, DEFAULT_TILE_MIRRORS, DEFAULT_TILE_TIMEOUT,
};

/// Directory under the home directory holding config and logs.
pub const CONFIG_DIR_NAME: &str = ".groupie-geo";

/// Config file name inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Errors from reading or validating the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Invalid config file syntax: {0}")]
    Parse(String),

    #[error("Invalid value '{value}' for [{section}] {key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Returns `~/.groupie-geo`.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Returns `~/.groupie-geo/config.ini`.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// `[geocode]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeConfig {
    pub endpoint: Url,
    pub user_agent: String,
    pub cache_path: PathBuf,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub post_success_delay_ms: u64,
    pub max_parallel: usize,
    pub fallback: FallbackMode,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        let defaults = ResolverSettings::default();
        Self {
            endpoint: defaults.endpoint,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache_path: default_cache_path(),
            request_timeout_secs: defaults.request_timeout.as_secs(),
            max_attempts: defaults.retry.max_attempts(),
            initial_backoff_ms: DEFAULT_INITIAL_DELAY_MS,
            post_success_delay_ms: defaults.post_success_delay.as_millis() as u64,
            max_parallel: DEFAULT_GEOCODE_PARALLEL,
            fallback: FallbackMode::Disabled,
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub debounce_ms: u64,
    pub flush_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let defaults = CacheSettings::default();
        Self {
            debounce_ms: defaults.debounce.as_millis() as u64,
            flush_timeout_secs: defaults.flush_timeout.as_secs(),
        }
    }
}

/// `[tiles]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilesConfig {
    pub mirrors: Vec<String>,
    pub cache_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub mirror_delay_ms: u64,
    pub max_parallel: usize,
}

impl Default for TilesConfig {
    fn default() -> Self {
        Self {
            mirrors: DEFAULT_TILE_MIRRORS.iter().map(|s| s.to_string()).collect(),
            cache_dir: default_tile_dir(),
            request_timeout_secs: DEFAULT_TILE_TIMEOUT.as_secs(),
            mirror_delay_ms: DEFAULT_MIRROR_DELAY.as_millis() as u64,
            max_parallel: DEFAULT_TILE_PARALLEL,
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub geocode: GeocodeConfig,
    pub cache: CacheConfig,
    pub tiles: TilesConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Loads `~/.groupie-geo/config.ini`. A missing file gives defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Loads the file at `path`, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&text)
    }

    /// Parses INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let options = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(text, options)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut config = Self::default();
        let reader = Reader { ini: &ini };

        let section = "geocode";
        let g = &mut config.geocode;
        if let Some(raw) = reader.get(section, "endpoint") {
            g.endpoint = Url::parse(raw).map_err(|_| invalid(section, "endpoint", raw))?;
        }
        if let Some(raw) = reader.get(section, "user_agent") {
            g.user_agent = raw.to_string();
        }
        if let Some(raw) = reader.get(section, "cache_path") {
            g.cache_path = expand_tilde(raw);
        }
        reader.positive(section, "request_timeout_secs", &mut g.request_timeout_secs)?;
        reader.number(section, "max_attempts", &mut g.max_attempts)?;
        reader.number(section, "initial_backoff_ms", &mut g.initial_backoff_ms)?;
        reader.number(section, "post_success_delay_ms", &mut g.post_success_delay_ms)?;
        reader.number(section, "max_parallel", &mut g.max_parallel)?;
        if let Some(raw) = reader.get(section, "fallback") {
            g.fallback = raw.parse().map_err(|_| invalid(section, "fallback", raw))?;
        }

        let section = "cache";
        reader.number(section, "debounce_ms", &mut config.cache.debounce_ms)?;
        reader.positive(section, "flush_timeout_secs", &mut config.cache.flush_timeout_secs)?;

        let section = "tiles";
        let t = &mut config.tiles;
        if let Some(raw) = reader.get(section, "mirrors") {
            let mirrors: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
            if mirrors.is_empty() || mirrors.iter().any(|m| Url::parse(m).is_err()) {
                return Err(invalid(section, "mirrors", raw));
            }
            t.mirrors = mirrors;
        }
        if let Some(raw) = reader.get(section, "cache_dir") {
            t.cache_dir = expand_tilde(raw);
        }
        reader.positive(section, "request_timeout_secs", &mut t.request_timeout_secs)?;
        reader.number(section, "mirror_delay_ms", &mut t.mirror_delay_ms)?;
        reader.number(section, "max_parallel", &mut t.max_parallel)?;

        let section = "logging";
        if let Some(raw) = reader.get(section, "level") {
            config.logging.level = raw.to_string();
        }
        if let Some(raw) = reader.get(section, "directory") {
            config.logging.directory = Some(expand_tilde(raw));
        }

        Ok(config)
    }

    /// Resolver settings from `[geocode]`.
    pub fn resolver_settings(&self) -> ResolverSettings {
        let g = &self.geocode;
        ResolverSettings {
            endpoint: g.endpoint.clone(),
            request_timeout: Duration::from_secs(g.request_timeout_secs),
            retry: RetryPolicy::ExponentialBackoff {
                max_attempts: g.max_attempts,
                initial_delay: Duration::from_millis(g.initial_backoff_ms),
                max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
                multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            },
            post_success_delay: Duration::from_millis(g.post_success_delay_ms),
            fallback: g.fallback,
        }
    }

    /// Flush timing from `[cache]`.
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            debounce: Duration::from_millis(self.cache.debounce_ms),
            flush_timeout: Duration::from_secs(self.cache.flush_timeout_secs),
        }
    }

    /// Tile fetcher settings from `[tiles]`.
    pub fn tile_settings(&self) -> TileSettings {
        TileSettings {
            mirrors: self.tiles.mirrors.clone(),
            cache_dir: self.tiles.cache_dir.clone(),
            request_timeout: Duration::from_secs(self.tiles.request_timeout_secs),
            mirror_delay: Duration::from_millis(self.tiles.mirror_delay_ms),
        }
    }
}

fn invalid(section: &str, key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

struct Reader<'a> {
    ini: &'a Ini,
}

impl<'a> Reader<'a> {
    /// Value with any trailing `;` or `#` comment removed. Empty values
    /// count as unset.
    fn get(&self, section: &str, key: &str) -> Option<&'a str> {
        let raw = self.ini.section(Some(section))?.get(key)?;
        let value = match raw.find(" ;").or_else(|| raw.find(" #")) {
            Some(idx) => &raw[..idx],
            None => raw,
        };
        let value = value.trim();
        (!value.is_empty()).then_some(value)
    }

    fn number<T: FromStr>(&self, section: &str, key: &str, target: &mut T) -> Result<(), ConfigError> {
        if let Some(raw) = self.get(section, key) {
            *target = raw.parse().map_err(|_| invalid(section, key, raw))?;
        }
        Ok(())
    }

    /// Like [`number`](Self::number), rejecting zero.
    fn positive(&self, section: &str, key: &str, target: &mut u64) -> Result<(), ConfigError> {
        self.number(section, key, target)?;
        if *target == 0 {
            return Err(invalid(section, key, "0"));
        }
        Ok(())
    }
}
