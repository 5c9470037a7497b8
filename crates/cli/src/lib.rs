//! Library interface for the podsync CLI
//!
//! This module exposes the session driver and the command helpers for
//! integration testing while keeping argument parsing in main.rs.

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod session;

pub use session::{SessionOptions, WatchSession};

use anyhow::{Context, Result};
use podsync_core::config::Config;
use podsync_core::error::Error;
use podsync_remote::Instance;
use std::path::{Path, PathBuf};

/// Command-line values layered over the loaded configuration
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub context: Option<String>,
    pub environment: Option<String>,
    pub service: Option<String>,
    pub delete: bool,
    pub dry_run: bool,
}

impl Overrides {
    /// Flags only ever switch behavior on; unset values keep the file's.
    pub fn apply(&self, config: &mut Config) {
        if let Some(context) = &self.context {
            config.remote.context = Some(context.clone());
        }
        if let Some(environment) = &self.environment {
            config.remote.environment = Some(environment.clone());
        }
        if let Some(service) = &self.service {
            config.remote.service = Some(service.clone());
        }
        config.sync.delete |= self.delete;
        config.sync.dry_run |= self.dry_run;
    }
}

/// The working directory, canonicalized; the synchronized root
pub fn project_root() -> Result<PathBuf> {
    let current = std::env::current_dir().context("Failed to get current directory")?;
    current
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", current.display()))
}

/// Load, override and validate the configuration for `root`
pub fn load_config(root: &Path, file: Option<&Path>, overrides: &Overrides) -> Result<Config> {
    let mut config = Config::load(root, file)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Fail early when the cluster CLI or the transfer utility is missing
pub fn check_tools(config: &Config) -> podsync_core::Result<()> {
    for program in [&config.remote.kubectl_path, &config.transport.rsync_path] {
        which::which(program).map_err(|e| {
            Error::validation(format!("'{program}' not found on PATH: {e}"))
        })?;
    }
    Ok(())
}

/// Table of instances for `podsync pods`
pub fn format_instances(instances: &[Instance]) -> String {
    let width = instances
        .iter()
        .map(|i| i.name().len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = format!(
        "{:<width$}  {:<7}  {:<10}  {}\n",
        "NAME", "READY", "PHASE", "STATUS"
    );
    for instance in instances {
        let (ready, total) = instance.ready_count();
        out.push_str(&format!(
            "{:<width$}  {:<7}  {:<10}  {}\n",
            instance.name(),
            format!("{ready}/{total}"),
            instance.phase(),
            instance.status_reason()
        ));
    }
    out
}
