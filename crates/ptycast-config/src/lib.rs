//! ptycast configuration system.
//!
//! Provides TOML-based configuration with full validation. All config
//! sections use defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ptycast_config::{load_config, config_to_json};
//!
//! let config = load_config(None).expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    LaunchConfig, PtycastConfig, RelayConfig, ServerConfig, SessionLogConfig,
    CONFIG_SCHEMA_VERSION,
};

use ptycast_common::ConfigError;
use std::path::Path;

/// Load config from an explicit path, or from the platform default path.
///
/// An explicit path must exist. The default path is created with a
/// commented template when missing. Validation is not run here.
pub fn load_config(path: Option<&Path>) -> Result<PtycastConfig, ConfigError> {
    match path {
        Some(path) => toml_loader::load_from_path(path),
        None => toml_loader::load_default(),
    }
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &PtycastConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
