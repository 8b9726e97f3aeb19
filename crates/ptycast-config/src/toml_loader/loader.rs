//! Reading, locating and seeding the TOML config file.

use std::io::Write;
use std::path::{Path, PathBuf};

use ptycast_common::ConfigError;
use tracing::info;

use super::template::default_config_toml;
use crate::schema::PtycastConfig;

/// Load config from a specific TOML file path.
///
/// Deserializes the file using serde defaults for any missing fields.
/// Validation is left to the caller so CLI overrides can be applied first.
pub fn load_from_path(path: &Path) -> Result<PtycastConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: PtycastConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Load `ptycast/config.toml` under the platform config directory
/// (`~/.config` on Linux).
///
/// A missing file is seeded with the commented template and defaults are
/// returned. Failing to seed it is not fatal.
pub fn load_default() -> Result<PtycastConfig, ConfigError> {
    let path = default_config_path()?;

    match load_from_path(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            if let Err(e) = create_default_config(&path) {
                tracing::warn!(error = %e, "Could not write default config");
            }
            Ok(PtycastConfig::default())
        }
        Err(e) => Err(e),
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base = dirs::config_dir()
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))?;
    Ok(base.join("ptycast").join("config.toml"))
}

/// Write the commented template to `path`, creating parent directories.
///
/// Never overwrites: an existing file is an error.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    let io_error = |what: &str, e: std::io::Error| {
        ConfigError::ParseError(format!("failed to {what} {}: {e}", path.display()))
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_error("create directory for", e))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| io_error("create", e))?;
    file.write_all(default_config_toml().as_bytes())
        .map_err(|e| io_error("write", e))?;

    info!(path = %path.display(), "Created default config");
    Ok(())
}
