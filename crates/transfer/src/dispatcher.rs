//! Plan selection and transport dispatch

use crate::daemon_tunnel::DaemonTunnelTransport;
use crate::direct_shell::DirectShellTransport;
use crate::plan::{TransferPlan, TransportKind};
use crate::rsync::{RsyncCommand, SyncTool, TransferSettings};
use podsync_core::config::TransportMode;
use podsync_core::error::Result;
use podsync_remote::{Kubectl, PortForwarder, RemoteExecutor, RemoteTarget};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// External collaborators the transports drive
#[derive(Clone)]
pub struct Collaborators {
    pub executor: Arc<dyn RemoteExecutor>,
    pub forwarder: Arc<dyn PortForwarder>,
    pub tool: Arc<dyn SyncTool>,
}

impl Collaborators {
    /// `kubectl` for remote operations, the real utility for transfers
    pub fn kubectl(kubectl: Kubectl) -> Self {
        let kubectl = Arc::new(kubectl);
        Self {
            executor: kubectl.clone(),
            forwarder: kubectl,
            tool: Arc::new(RsyncCommand),
        }
    }
}

/// The transport strategy, chosen once per session
pub enum Transport {
    DirectShell(DirectShellTransport),
    DaemonTunnel(DaemonTunnelTransport),
}

impl Transport {
    pub fn new(kind: TransportKind, settings: TransferSettings, collaborators: Collaborators) -> Self {
        match kind {
            TransportKind::DirectShell => Self::DirectShell(DirectShellTransport::new(
                settings,
                collaborators.executor,
                collaborators.tool,
            )),
            TransportKind::DaemonTunnel => Self::DaemonTunnel(DaemonTunnelTransport::new(
                settings,
                collaborators.executor,
                collaborators.forwarder,
                collaborators.tool,
            )),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::DirectShell(_) => TransportKind::DirectShell,
            Self::DaemonTunnel(_) => TransportKind::DaemonTunnel,
        }
    }

    pub async fn sync(&self, target: &RemoteTarget, plan: &TransferPlan) -> Result<()> {
        match self {
            Self::DirectShell(transport) => transport.sync(target, plan).await,
            Self::DaemonTunnel(transport) => transport.sync(target, plan).await,
        }
    }
}

/// Turns pending paths into a plan and runs it
pub struct TransferDispatcher {
    settings: TransferSettings,
    transport: Transport,
}

impl TransferDispatcher {
    pub fn new(settings: TransferSettings, transport: Transport) -> Self {
        Self {
            settings,
            transport,
        }
    }

    /// Select the transport for `mode` on the running host
    pub fn for_host(
        settings: TransferSettings,
        mode: TransportMode,
        collaborators: Collaborators,
    ) -> Self {
        let kind = TransportKind::select(mode, std::env::consts::OS);
        let transport = Transport::new(kind, settings.clone(), collaborators);
        Self::new(settings, transport)
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Plan for a pending set
    pub fn plan(&self, pending: &[PathBuf]) -> TransferPlan {
        let settings = &self.settings;
        TransferPlan::from_pending(pending, &settings.root, settings.threshold, self.transport.kind())
            .with_flags(settings.delete, settings.dry_run, settings.verbose)
            .promote_removed(&settings.root)
    }

    /// Plan and run one pass; returns the plan that ran
    pub async fn dispatch(&self, target: &RemoteTarget, pending: &[PathBuf]) -> Result<TransferPlan> {
        let plan = self.plan(pending);
        info!("Transferring {plan} to {target}");
        let started = Instant::now();
        self.transport.sync(target, &plan).await?;
        info!("Transfer finished in {:.2?}", started.elapsed());
        Ok(plan)
    }

    /// Run a full-tree pass
    pub async fn sync_all(&self, target: &RemoteTarget) -> Result<TransferPlan> {
        self.dispatch(target, &[]).await
    }
}
