//! Configuration loading from files and environment variables

use crate::error::{Error, Result};
use config::{Config as ConfigLib, ConfigBuilder as LibConfigBuilder, Environment, File};
use std::path::Path;
use tracing::debug;

use super::{global_config_path, Config, PROJECT_CONFIG_FILE};

type Builder = LibConfigBuilder<config::builder::DefaultState>;

/// Adds a TOML file source when the file exists
fn add_optional_file(builder: Builder, path: &Path) -> Builder {
    if path.exists() {
        debug!("Loading configuration from {}", path.display());
        builder.add_source(File::from(path))
    } else {
        builder
    }
}

/// Environment variables are prefixed with `PODSYNC_` and use double
/// underscores for nested values, e.g. `PODSYNC_SYNC__QUIET_PERIOD_MS=2000`.
fn add_environment(builder: Builder) -> Builder {
    builder.add_source(
        Environment::with_prefix("PODSYNC")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    )
}

fn finish(builder: Builder) -> Result<Config> {
    let config = builder
        .build()
        .map_err(|e| Error::config(format!("Failed to build config: {e}")))?;

    config
        .try_deserialize()
        .map_err(|e| Error::config(format!("Failed to deserialize config: {e}")))
}

impl Config {
    /// Loads configuration from a single TOML file with environment variable overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let builder = add_optional_file(ConfigLib::builder(), path);
        finish(add_environment(builder))
    }

    /// Creates a config from a TOML string (useful for testing)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("Failed to parse TOML: {e}")))
    }

    /// Load the layered configuration for a project
    ///
    /// Precedence (lowest to highest):
    /// 1. Hardcoded defaults
    /// 2. Global config (~/.podsync/config.toml)
    /// 3. Project config (<root>/.podsync.toml)
    /// 4. Explicit --config path
    /// 5. Environment variables (PODSYNC_*)
    pub fn load(project_root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigLib::builder();

        if let Ok(global) = global_config_path() {
            builder = add_optional_file(builder, &global);
        }
        builder = add_optional_file(builder, &project_root.join(PROJECT_CONFIG_FILE));

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(Error::config(format!(
                    "Config file {} does not exist",
                    path.display()
                )));
            }
            builder = add_optional_file(builder, path);
        }

        finish(add_environment(builder))
    }
}
