//! Minimal configuration loading for Patchline.
//!
//! This crate provides configuration loading with minimal dependencies,
//! designed to be imported by the daemon and tooling crates without
//! dragging the protocol stack along.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/patchline/config.toml` (system)
//! 2. `~/.config/patchline/config.toml` (user)
//! 3. `./patchline.toml` (local override, or the CLI `--config` path)
//! 4. Environment variables (`PATCHLINE_*`)
//!
//! # Example Config
//!
//! ```toml
//! [bind]
//! listen = "0.0.0.0"
//! port = 16187
//!
//! [sync]
//! batch_size = 50
//! pause_ms = 20
//! queue_depth = 256
//!
//! [paths]
//! spool_dir = "/tmp"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;

pub use loader::{discover_config_files, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Network bind settings for the daemon's UDP endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Address to bind the UDP socket on.
    /// Default: 0.0.0.0
    #[serde(default = "BindConfig::default_listen")]
    pub listen: String,

    /// UDP port for observer traffic.
    /// Default: 16187
    #[serde(default = "BindConfig::default_port")]
    pub port: u16,
}

impl BindConfig {
    fn default_listen() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        16187
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            listen: Self::default_listen(),
            port: Self::default_port(),
        }
    }
}

/// Pacing and queueing knobs for observer synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Messages sent between pacing pauses during a burst.
    /// Default: 50
    #[serde(default = "SyncConfig::default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches, in milliseconds.
    /// Default: 20
    #[serde(default = "SyncConfig::default_pause_ms")]
    pub pause_ms: u64,

    /// Depth of each observer's outbound queue.
    /// Default: 256
    #[serde(default = "SyncConfig::default_queue_depth")]
    pub queue_depth: usize,
}

impl SyncConfig {
    fn default_batch_size() -> usize {
        50
    }

    fn default_pause_ms() -> u64 {
        20
    }

    fn default_queue_depth() -> usize {
        256
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: Self::default_batch_size(),
            pause_ms: Self::default_pause_ms(),
            queue_depth: Self::default_queue_depth(),
        }
    }
}

/// Filesystem paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for same-host snapshot handoff files.
    /// Default: /tmp
    #[serde(default = "PathsConfig::default_spool_dir")]
    pub spool_dir: PathBuf,
}

impl PathsConfig {
    fn default_spool_dir() -> PathBuf {
        PathBuf::from("/tmp")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            spool_dir: Self::default_spool_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level (trace, debug, info, warn, error).
    /// `RUST_LOG` takes precedence when set.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Complete Patchline configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatchConfig {
    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl PatchConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/patchline/config.toml`
    /// 3. `~/.config/patchline/config.toml`
    /// 4. `./patchline.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./patchline.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = PatchConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }
}
