//! Config file discovery, loading, and environment variable overlay.

use crate::{BindConfig, ConfigError, PatchConfig, PathsConfig, SyncConfig, TelemetryConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    // System config
    let system = PathBuf::from("/etc/patchline/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("patchline/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    // Local override (current directory)
    let local = PathBuf::from("patchline.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<PatchConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Merge two configs, with `overlay` taking precedence.
///
/// A field wins when it differs from the compiled default; untouched
/// overlay fields keep the base value.
pub fn merge_configs(base: PatchConfig, overlay: PatchConfig) -> PatchConfig {
    fn pick<T: PartialEq>(base: T, overlay: T, default: T) -> T {
        if overlay != default {
            overlay
        } else {
            base
        }
    }

    PatchConfig {
        bind: BindConfig {
            listen: pick(
                base.bind.listen,
                overlay.bind.listen,
                BindConfig::default().listen,
            ),
            port: pick(base.bind.port, overlay.bind.port, BindConfig::default().port),
        },
        sync: SyncConfig {
            batch_size: pick(
                base.sync.batch_size,
                overlay.sync.batch_size,
                SyncConfig::default().batch_size,
            ),
            pause_ms: pick(
                base.sync.pause_ms,
                overlay.sync.pause_ms,
                SyncConfig::default().pause_ms,
            ),
            queue_depth: pick(
                base.sync.queue_depth,
                overlay.sync.queue_depth,
                SyncConfig::default().queue_depth,
            ),
        },
        paths: PathsConfig {
            spool_dir: pick(
                base.paths.spool_dir,
                overlay.paths.spool_dir,
                PathsConfig::default().spool_dir,
            ),
        },
        telemetry: TelemetryConfig {
            log_level: pick(
                base.telemetry.log_level,
                overlay.telemetry.log_level,
                TelemetryConfig::default().log_level,
            ),
        },
    }
}

/// Apply `PATCHLINE_*` environment variable overrides.
pub fn apply_env_overrides(config: &mut PatchConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("PATCHLINE_LISTEN") {
        config.bind.listen = v;
        sources.env_overrides.push("PATCHLINE_LISTEN".to_string());
    }

    if let Ok(v) = env::var("PATCHLINE_PORT") {
        if let Ok(port) = v.parse() {
            config.bind.port = port;
            sources.env_overrides.push("PATCHLINE_PORT".to_string());
        }
    }

    if let Ok(v) = env::var("PATCHLINE_BATCH_SIZE") {
        if let Ok(n) = v.parse() {
            config.sync.batch_size = n;
            sources.env_overrides.push("PATCHLINE_BATCH_SIZE".to_string());
        }
    }

    if let Ok(v) = env::var("PATCHLINE_PAUSE_MS") {
        if let Ok(ms) = v.parse() {
            config.sync.pause_ms = ms;
            sources.env_overrides.push("PATCHLINE_PAUSE_MS".to_string());
        }
    }

    if let Ok(v) = env::var("PATCHLINE_SPOOL_DIR") {
        config.paths.spool_dir = PathBuf::from(v);
        sources.env_overrides.push("PATCHLINE_SPOOL_DIR".to_string());
    }

    if let Ok(v) = env::var("PATCHLINE_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("PATCHLINE_LOG_LEVEL".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[bind]\nport = 9000\n\n[telemetry]\nlog_level = \"debug\"").unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.bind.port, 9000);
        assert_eq!(config.telemetry.log_level, "debug");
        // untouched sections keep defaults
        assert_eq!(config.sync.batch_size, 50);
    }

    #[test]
    fn test_parse_error_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [[[").unwrap();

        let err = load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_merge_overlay_wins() {
        let base: PatchConfig = toml::from_str("[bind]\nport = 9000").unwrap();
        let overlay: PatchConfig = toml::from_str("[bind]\nport = 9001").unwrap();

        let merged = merge_configs(base, overlay);
        assert_eq!(merged.bind.port, 9001);
    }

    #[test]
    fn test_merge_keeps_base_when_overlay_is_default() {
        let base: PatchConfig = toml::from_str("[sync]\nbatch_size = 10").unwrap();
        let overlay = PatchConfig::default();

        let merged = merge_configs(base, overlay);
        assert_eq!(merged.sync.batch_size, 10);
    }
}
