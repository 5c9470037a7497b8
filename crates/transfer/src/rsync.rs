//! Transfer utility invocation
//!
//! Both transports drive the same utility with the same flag grammar:
//! archive semantics, checksum comparison, optional delete/dry-run/verbose,
//! the exclusion file, an explicit `--` separator, then either the explicit
//! relative paths (`--relative`) or the whole root, then the destination.

use crate::plan::TransferPlan;
use async_trait::async_trait;
use podsync_core::error::{Error, Result};
use podsync_core::Config;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Settings shared by both transports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Local sync root; the utility runs with this as its working directory
    pub root: PathBuf,
    /// Absolute path of the ignore file
    pub ignore_file: PathBuf,
    /// Destination directory inside the instance
    pub remote_root: String,
    /// Local transfer utility binary
    pub rsync_path: String,
    pub threshold: usize,
    pub delete: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub daemon: DaemonSettings,
}

/// Daemon transport settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub daemon_port: u16,
    pub local_port: u16,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl TransferSettings {
    pub fn from_config(config: &Config, root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ignore_file: root.join(&config.sync.ignore_file),
            remote_root: config.sync.remote_root.clone(),
            rsync_path: config.transport.rsync_path.clone(),
            threshold: config.sync.individual_file_threshold,
            delete: config.sync.delete,
            dry_run: config.sync.dry_run,
            verbose: config.sync.verbose,
            daemon: DaemonSettings {
                daemon_port: config.transport.daemon_port,
                local_port: config.transport.local_port,
                ready_timeout: config.transport.daemon_ready_timeout(),
                poll_interval: config.transport.daemon_poll_interval(),
            },
        }
    }
}

/// One fully described utility run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Variables set for the child only
    pub envs: Vec<(String, String)>,
    pub cwd: PathBuf,
}

impl Invocation {
    /// Build the utility run for `plan` towards `destination`
    pub fn rsync(settings: &TransferSettings, plan: &TransferPlan, destination: String) -> Self {
        let mut args = vec!["--archive".to_string(), "--checksum".to_string()];
        if plan.verbose {
            args.push("--verbose".to_string());
        }
        if plan.dry_run {
            args.push("--dry-run".to_string());
        }
        if plan.delete {
            args.push("--delete".to_string());
        }
        if settings.ignore_file.is_file() {
            args.push(format!("--exclude-from={}", settings.ignore_file.display()));
        }
        if !plan.is_full_tree() {
            args.push("--relative".to_string());
        }

        args.push("--".to_string());
        if plan.is_full_tree() {
            args.push("./".to_string());
        } else {
            args.extend(plan.paths.iter().map(|p| p.display().to_string()));
        }
        args.push(destination);

        Self {
            program: settings.rsync_path.clone(),
            args,
            envs: Vec::new(),
            cwd: settings.root.clone(),
        }
    }

    /// Set a variable for the child process
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

/// Runs the transfer utility
#[async_trait]
pub trait SyncTool: Send + Sync {
    /// Run to completion; a non-zero exit is an error
    async fn run(&self, invocation: &Invocation) -> Result<()>;
}

/// Runs the real utility as a child process with live output
#[derive(Debug, Clone, Copy, Default)]
pub struct RsyncCommand;

#[async_trait]
impl SyncTool for RsyncCommand {
    async fn run(&self, invocation: &Invocation) -> Result<()> {
        debug!("{} {}", invocation.program, invocation.args.join(" "));

        // Variables go to the child's environment only; the process
        // environment is never touched.
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.envs.iter().map(|(k, v)| (k, v)))
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| {
                Error::transfer(format!(
                    "Failed to run {}: {e}. Is it installed and on PATH?",
                    invocation.program
                ))
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::transfer(format!(
                "{} exited with {status}",
                invocation.program
            )))
        }
    }
}

/// Quote a value for a POSIX shell
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
