//! Configuration module for tapstream
//!
//! A pipe configuration file tunes buffer sizes and the read discipline of
//! the pipes the command line builds. Every field has a default, so an empty
//! file (or no file at all) is a valid configuration.
//!
//! # Formats
//!
//! - `*.toml` files are parsed as TOML
//! - anything else is parsed as JSON
//!
//! # Example
//!
//! ```toml
//! [source]
//! chunk_size = 16384
//!
//! [sink]
//! high_water_mark = 4096
//! discard_partial_on_failure = true
//!
//! [pipe]
//! read_mode = "pull"
//!
//! [logging]
//! filter = "tapstream=debug"
//! ```

use crate::error::{Result, TapError};
use crate::pipeline::sink::DEFAULT_FLUSH_BATCH;
use crate::types::{ReadMode, DEFAULT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current configuration file version
pub const CONFIG_VERSION: u32 = 1;

/// Configuration picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "tapstream.toml";

/// Default pause between drain polls in milliseconds
pub const DEFAULT_DRAIN_RETRY_MS: u64 = 2;

/// Default log filter when neither the config nor `RUST_LOG` set one
pub const DEFAULT_LOG_FILTER: &str = "tapstream=info";

// ==================== Source ====================

/// Settings for resource-backed sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Bytes requested from the underlying reader per chunk
    pub chunk_size: usize,

    /// Read-ahead limit; the stream mode default applies when unset
    pub high_water_mark: Option<usize>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            high_water_mark: None,
        }
    }
}

// ==================== Sink ====================

/// Settings for resource-backed sinks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Write buffer limit; the stream mode default applies when unset
    pub high_water_mark: Option<usize>,

    /// Chunks handed to the destination per service turn
    pub flush_batch: usize,

    /// Remove the output file when the pipe fails
    pub discard_partial_on_failure: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            high_water_mark: None,
            flush_batch: DEFAULT_FLUSH_BATCH,
            discard_partial_on_failure: false,
        }
    }
}

// ==================== Pipe ====================

/// Settings of the pipe coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeSettings {
    /// Delivery discipline used to read the source
    pub read_mode: ReadMode,

    /// Pause between drain polls when no sink made progress
    pub drain_retry_ms: u64,
}

impl Default for PipeSettings {
    fn default() -> Self {
        Self {
            read_mode: ReadMode::Push,
            drain_retry_ms: DEFAULT_DRAIN_RETRY_MS,
        }
    }
}

// ==================== Logging ====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence
    pub filter: String,

    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            file: None,
        }
    }
}

// ==================== Pipe Config File ====================

/// Complete configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeConfig {
    /// Version for future migration support
    #[serde(default = "default_config_version")]
    pub version: u32,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub pipe: PipeSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            source: SourceConfig::default(),
            sink: SinkConfig::default(),
            pipe: PipeSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

impl PipeConfig {
    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TapError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Self = if is_toml(path) {
            toml::from_str(&content).map_err(|e| {
                TapError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                TapError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        if config.version > CONFIG_VERSION {
            tracing::warn!(
                "Config file {:?} has version {}, newer than supported {}",
                path,
                config.version,
                CONFIG_VERSION
            );
        }
        Ok(config)
    }

    /// Load a configuration file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration, as TOML for `*.toml` paths and JSON otherwise
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TapError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| TapError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| TapError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            TapError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}
