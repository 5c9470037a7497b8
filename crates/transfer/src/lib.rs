//! Transfer planning and transports for podsync
//!
//! A pending change set becomes a [`TransferPlan`] (explicit paths or the
//! whole tree), which one of two transports hands to the external transfer
//! utility:
//! - [`DirectShellTransport`]: the utility's protocol runs over `kubectl exec`
//! - [`DaemonTunnelTransport`]: a transient daemon in the instance, reached
//!   through a scoped port-forward

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

mod daemon_tunnel;
mod direct_shell;
mod dispatcher;
mod plan;
mod rsync;
mod tunnel;

pub use daemon_tunnel::{
    DaemonTunnelTransport, DAEMON_CONFIG_PATH, DAEMON_MODULE, DAEMON_PID_PATH,
};
pub use direct_shell::{DirectShellTransport, REMOTE_SHELL_VAR};
pub use dispatcher::{Collaborators, Transport, TransferDispatcher};
pub use plan::{TransferPlan, TransportKind};
pub use rsync::{DaemonSettings, Invocation, RsyncCommand, SyncTool, TransferSettings};
pub use tunnel::Tunnel;
