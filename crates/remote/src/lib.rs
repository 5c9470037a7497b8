//! Remote environment access for podsync
//!
//! This crate finds the instance to synchronize with and wraps the remote
//! operations the transports need. The operations are trait seams so the
//! transports can be exercised without a cluster:
//! - [`PodLister`]: list instances in an environment
//! - [`RemoteExecutor`]: run or spawn commands inside an instance
//! - [`PortForwarder`]: forward a local port into an instance
//!
//! [`Kubectl`] implements all three by shelling out to `kubectl`.

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use async_trait::async_trait;
use podsync_core::error::Result;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

mod filter;
mod instance;
mod kubectl;
mod resolver;
mod target;

pub use filter::InstanceFilter;
pub use instance::{
    parse_instance_list, ContainerState, ContainerStatus, Instance, InstanceCondition,
    InstanceMeta, InstanceStatus, StateRunning, StateTerminated, StateWaiting,
};
pub use kubectl::Kubectl;
pub use resolver::TargetResolver;
pub use target::RemoteTarget;

/// Lists the instances of an environment
#[async_trait]
pub trait PodLister: Send + Sync {
    /// List every instance in `namespace`, in a stable order
    async fn list(&self, context: Option<&str>, namespace: &str) -> Result<Vec<Instance>>;
}

/// Outcome of a finished remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code; `None` when the command was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A long-running command inside an instance
#[async_trait]
pub trait RemoteProcess: Send {
    /// Whether the process has already exited
    fn has_exited(&mut self) -> bool;

    /// Stop the local end of the process and wait for it
    async fn terminate(&mut self) -> Result<()>;
}

/// Runs commands inside an instance
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command to completion and capture its output
    async fn exec(&self, target: &RemoteTarget, command: &[String]) -> Result<ExecOutput>;

    /// Start a command whose lifetime is tied to the returned handle
    async fn spawn(&self, target: &RemoteTarget, command: &[String])
        -> Result<Box<dyn RemoteProcess>>;

    /// Remote-shell command line that pipes stdin/stdout into the instance,
    /// suitable for `RSYNC_RSH`
    fn remote_shell(&self, target: &RemoteTarget) -> String;
}

/// Forwards a local port into an instance
#[async_trait]
pub trait PortForwarder: Send + Sync {
    /// Forward `ports` (`"<local>:<remote>"`) until `stop` is cancelled.
    ///
    /// `ready` is signalled once the local port accepts connections. Returns
    /// an error when the forward dies before `stop` is cancelled.
    async fn forward(
        &self,
        target: &RemoteTarget,
        ports: &str,
        ready: oneshot::Sender<()>,
        stop: CancellationToken,
    ) -> Result<()>;
}
