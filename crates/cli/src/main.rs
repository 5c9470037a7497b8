//! podsync CLI - continuous file synchronization into a running pod
//!
//! This binary provides the command-line interface for podsync.

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use podsync::{check_tools, format_instances, load_config, project_root, Overrides};
use podsync::{SessionOptions, WatchSession};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use podsync_core::config::Config;
use podsync_remote::{Kubectl, RemoteTarget, TargetResolver};
use podsync_transfer::{Collaborators, TransferDispatcher, TransferSettings};
use podsync_watcher::IgnoreFile;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "podsync")]
#[command(about = "Continuously synchronize a local directory into a running pod")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Kubernetes context to use
    #[arg(long, value_name = "CTX", global = true)]
    context: Option<String>,

    /// Environment (namespace) holding the service
    #[arg(short, long, value_name = "ENV", global = true)]
    environment: Option<String>,

    /// Service whose instance receives the files
    #[arg(short, long, value_name = "SERVICE", global = true)]
    service: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the current directory and synchronize every change
    Watch {
        #[command(flatten)]
        transfer: TransferFlags,
        /// Skip the full transfer before watching
        #[arg(long)]
        no_initial_sync: bool,
    },
    /// Synchronize once, the whole tree or the given paths
    Sync {
        #[command(flatten)]
        transfer: TransferFlags,
        /// Paths to send, relative to the current directory
        paths: Vec<PathBuf>,
    },
    /// List the instances in the environment
    Pods,
    /// Manage the ignore file
    #[command(subcommand)]
    Ignore(IgnoreCommands),
}

#[derive(clap::Args, Debug, Clone, Copy)]
struct TransferFlags {
    /// Remove remote files that are missing locally (requires confirmation)
    #[arg(long)]
    delete: bool,
    /// Skip the delete confirmation
    #[arg(short, long)]
    yes: bool,
    /// Report what would be transferred without changing the remote
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum IgnoreCommands {
    /// Create the ignore file or add missing default patterns
    Init,
    /// Append a pattern
    Add {
        /// Component name or root-anchored path (leading '/')
        pattern: String,
    },
}

impl Cli {
    fn overrides(&self, flags: Option<TransferFlags>) -> Overrides {
        Overrides {
            context: self.context.clone(),
            environment: self.environment.clone(),
            service: self.service.clone(),
            delete: flags.is_some_and(|f| f.delete),
            dry_run: flags.is_some_and(|f| f.dry_run),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let root = project_root()?;
    match &cli.command {
        Commands::Watch {
            transfer,
            no_initial_sync,
        } => {
            let config = load_config(&root, cli.config.as_deref(), &cli.overrides(Some(*transfer)))?;
            watch(&root, config, transfer.yes, *no_initial_sync).await
        }
        Commands::Sync { transfer, paths } => {
            let config = load_config(&root, cli.config.as_deref(), &cli.overrides(Some(*transfer)))?;
            sync_once(&root, config, transfer.yes, paths).await
        }
        Commands::Pods => {
            let config = load_config(&root, cli.config.as_deref(), &cli.overrides(None))?;
            list_pods(config).await
        }
        Commands::Ignore(command) => {
            let config = load_config(&root, cli.config.as_deref(), &cli.overrides(None))?;
            handle_ignore_command(&root, &config, command)
        }
    }
}

/// Initialize logging system
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "podsync={level},podsync_core={level},podsync_watcher={level},\
             podsync_remote={level},podsync_transfer={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))
}

/// Resolve the target and build a dispatcher for it
async fn connect(root: &Path, config: &Config) -> Result<(RemoteTarget, TransferDispatcher)> {
    let selection = config.validate_remote()?;
    check_tools(config)?;

    let kubectl = Kubectl::new(config.remote.kubectl_path.as_str());
    let target = TargetResolver::new(Arc::new(kubectl.clone()))
        .resolve(&selection)
        .await?;

    let dispatcher = TransferDispatcher::for_host(
        TransferSettings::from_config(config, root),
        config.transport.kind,
        Collaborators::kubectl(kubectl),
    );
    Ok((target, dispatcher))
}

/// Ask before a transfer that may remove remote files
fn confirm_delete(config: &Config, target: &RemoteTarget, yes: bool) -> Result<()> {
    if !config.sync.delete || yes || config.sync.dry_run {
        return Ok(());
    }

    warn!(
        "--delete removes files under {} in {target} that do not exist locally",
        config.sync.remote_root
    );
    let confirmed = Confirm::new()
        .with_prompt("Continue with deletion enabled?")
        .default(false)
        .interact()
        .map_err(|e| anyhow!("Failed to read confirmation: {e}"))?;

    if !confirmed {
        bail!("Aborted; run without --delete or pass --yes to skip this prompt");
    }
    Ok(())
}

async fn watch(root: &Path, config: Config, yes: bool, no_initial_sync: bool) -> Result<()> {
    let (target, dispatcher) = connect(root, &config).await?;
    confirm_delete(&config, &target, yes)?;

    let mut options = SessionOptions::from_config(&config.sync);
    options.initial_sync &= !no_initial_sync;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    WatchSession::new(root, target, dispatcher, options)
        .run(shutdown)
        .await?;
    Ok(())
}

async fn sync_once(root: &Path, config: Config, yes: bool, paths: &[PathBuf]) -> Result<()> {
    let (target, dispatcher) = connect(root, &config).await?;
    confirm_delete(&config, &target, yes)?;

    let plan = if paths.is_empty() {
        dispatcher.sync_all(&target).await?
    } else {
        let absolute: Vec<PathBuf> = paths.iter().map(|p| root.join(p)).collect();
        dispatcher.dispatch(&target, &absolute).await?
    };
    info!("Synchronized {plan} to {target}");
    Ok(())
}

async fn list_pods(config: Config) -> Result<()> {
    let selection = config.validate_remote()?;
    let kubectl = Kubectl::new(config.remote.kubectl_path.as_str());
    let instances = TargetResolver::new(Arc::new(kubectl))
        .list(&selection)
        .await?;

    if instances.is_empty() {
        println!("No instances in environment '{}'", selection.environment);
    } else {
        print!("{}", format_instances(&instances));
    }
    Ok(())
}

fn handle_ignore_command(root: &Path, config: &Config, command: &IgnoreCommands) -> Result<()> {
    let ignore = IgnoreFile::in_root(root, &config.sync.ignore_file);
    match command {
        IgnoreCommands::Init => {
            let added = ignore.ensure_defaults()?;
            if added.is_empty() {
                println!("{} already has every default pattern", ignore.path().display());
            } else {
                println!("Added {} patterns to {}", added.len(), ignore.path().display());
            }
        }
        IgnoreCommands::Add { pattern } => {
            if ignore.add(pattern)? {
                println!("Added '{pattern}' to {}", ignore.path().display());
            } else {
                println!("'{pattern}' is already in {}", ignore.path().display());
            }
        }
    }
    Ok(())
}
