//! Configuration module for podsync
//!
//! Configuration is layered from built-in defaults, a global TOML file, a
//! project TOML file, an optional explicit file and `PODSYNC_` environment
//! variables.

mod defaults;
mod loading;


use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub use defaults::{MIN_QUIET_PERIOD_MS, PROJECT_CONFIG_FILE};

use defaults::*;

/// Returns the path to the global configuration file
///
/// The global config is stored at `~/.podsync/config.toml` and contains
/// user preferences that apply across all projects.
pub fn global_config_path() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| Error::config("Unable to determine home directory".to_string()))?;
    Ok(home_dir.join(".podsync").join("config.toml"))
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote environment selection
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Change detection and plan settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Transport settings
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Which remote environment and service to synchronize with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Cluster context key (kube context); `None` uses the current context
    #[serde(default)]
    pub context: Option<String>,

    /// Environment (namespace) holding the instances
    #[serde(default)]
    pub environment: Option<String>,

    /// Service name; instances are matched by name prefix
    #[serde(default)]
    pub service: Option<String>,

    /// Path to the kubectl binary
    #[serde(default = "default_kubectl_path")]
    pub kubectl_path: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            context: None,
            environment: None,
            service: None,
            kubectl_path: default_kubectl_path(),
        }
    }
}

/// Debounce and plan settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiet period in milliseconds before accumulated changes are flushed
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,

    /// Interval in milliseconds at which quiescence is evaluated
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Largest change set transferred as an explicit path list
    #[serde(default = "default_individual_file_threshold")]
    pub individual_file_threshold: usize,

    /// Delete remote files that no longer exist locally
    #[serde(default)]
    pub delete: bool,

    /// Pass `--dry-run` to the transfer utility
    #[serde(default)]
    pub dry_run: bool,

    /// Pass `--verbose` to the transfer utility
    #[serde(default)]
    pub verbose: bool,

    /// Ignore file path, relative to the sync root
    #[serde(default = "default_ignore_file")]
    pub ignore_file: String,

    /// Destination directory inside the remote instance
    #[serde(default = "default_remote_root")]
    pub remote_root: String,

    /// Run a full-tree transfer before the watch loop starts
    #[serde(default = "default_initial_sync")]
    pub initial_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            individual_file_threshold: default_individual_file_threshold(),
            delete: false,
            dry_run: false,
            verbose: false,
            ignore_file: default_ignore_file(),
            remote_root: default_remote_root(),
            initial_sync: default_initial_sync(),
        }
    }
}

impl SyncConfig {
    /// Quiet period, clamped to [`MIN_QUIET_PERIOD_MS`]
    pub fn quiet_period(&self) -> Duration {
        if self.quiet_period_ms < MIN_QUIET_PERIOD_MS {
            warn!(
                "quiet_period_ms={} is below the minimum, using {}ms",
                self.quiet_period_ms, MIN_QUIET_PERIOD_MS
            );
            Duration::from_millis(MIN_QUIET_PERIOD_MS)
        } else {
            Duration::from_millis(self.quiet_period_ms)
        }
    }

    /// Tick interval, never coarser than the quiet period
    pub fn tick_interval(&self) -> Duration {
        let tick = Duration::from_millis(self.tick_interval_ms.max(1));
        tick.min(self.quiet_period())
    }
}

/// Transport selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Pick the transport from the host platform
    #[default]
    Auto,
    /// Always tunnel the transfer protocol through remote exec
    DirectShell,
    /// Always run a transient daemon reached through a port-forward
    DaemonTunnel,
}

/// Transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Transport selection
    #[serde(default)]
    pub kind: TransportMode,

    /// Path to the rsync binary
    #[serde(default = "default_rsync_path")]
    pub rsync_path: String,

    /// Port the remote daemon binds on its loopback interface
    #[serde(default = "default_daemon_port")]
    pub daemon_port: u16,

    /// Local end of the port-forward
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    /// Seconds to wait for the remote daemon to write its pid file
    #[serde(default = "default_daemon_ready_timeout_secs")]
    pub daemon_ready_timeout_secs: u64,

    /// Milliseconds between readiness probes
    #[serde(default = "default_daemon_poll_interval_ms")]
    pub daemon_poll_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportMode::default(),
            rsync_path: default_rsync_path(),
            daemon_port: default_daemon_port(),
            local_port: default_local_port(),
            daemon_ready_timeout_secs: default_daemon_ready_timeout_secs(),
            daemon_poll_interval_ms: default_daemon_poll_interval_ms(),
        }
    }
}

impl TransportConfig {
    /// Get the daemon readiness timeout
    pub fn daemon_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon_ready_timeout_secs)
    }

    /// Get the daemon readiness poll interval
    pub fn daemon_poll_interval(&self) -> Duration {
        Duration::from_millis(self.daemon_poll_interval_ms.max(10))
    }
}

/// Environment and service names required to resolve a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSelection {
    pub context: Option<String>,
    pub environment: String,
    pub service: String,
}

impl Config {
    /// Validates settings that do not depend on the remote selection
    pub fn validate(&self) -> Result<()> {
        if self.remote.kubectl_path.trim().is_empty() {
            return Err(Error::config("remote.kubectl_path must not be empty"));
        }
        if self.transport.rsync_path.trim().is_empty() {
            return Err(Error::config("transport.rsync_path must not be empty"));
        }
        if !self.sync.remote_root.starts_with('/') {
            return Err(Error::config(format!(
                "sync.remote_root must be an absolute path, got '{}'",
                self.sync.remote_root
            )));
        }
        if self.sync.ignore_file.trim().is_empty() {
            return Err(Error::config("sync.ignore_file must not be empty"));
        }
        if self.transport.daemon_port == 0 || self.transport.local_port == 0 {
            return Err(Error::config(
                "transport.daemon_port and transport.local_port must be non-zero",
            ));
        }
        Ok(())
    }

    /// Returns the environment and service, or a validation error with a remedy
    pub fn validate_remote(&self) -> Result<RemoteSelection> {
        let environment = self
            .remote
            .environment
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::validation(
                    "no environment given. Pass --environment or set remote.environment in .podsync.toml",
                )
            })?;
        let service = self
            .remote
            .service
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::validation(
                    "no service given. Pass --service or set remote.service in .podsync.toml",
                )
            })?;

        Ok(RemoteSelection {
            context: self.remote.context.clone().filter(|c| !c.is_empty()),
            environment: environment.to_string(),
            service: service.to_string(),
        })
    }
}
