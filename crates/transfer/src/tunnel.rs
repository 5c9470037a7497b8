//! Scoped port-forward
//!
//! A [`Tunnel`] owns a background port-forward task for the duration of one
//! transfer. [`Tunnel::close`] stops it; dropping an unclosed tunnel cancels
//! and aborts the task so it never outlives its scope.

use podsync_core::error::{Error, Result};
use podsync_remote::{PortForwarder, RemoteTarget};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct Tunnel {
    ports: String,
    stop: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
}

fn task_error(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Error {
    match result {
        Ok(Ok(())) => Error::tunnel("port-forward ended unexpectedly"),
        Ok(Err(e)) => e,
        Err(e) => Error::tunnel(format!("port-forward task failed: {e}")),
    }
}

impl Tunnel {
    /// Start forwarding `local_port` to `remote_port` and wait until the
    /// local end accepts connections
    pub async fn open(
        forwarder: Arc<dyn PortForwarder>,
        target: &RemoteTarget,
        local_port: u16,
        remote_port: u16,
        ready_timeout: Duration,
    ) -> Result<Self> {
        let ports = format!("{local_port}:{remote_port}");
        let stop = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        let task = {
            let target = target.clone();
            let ports = ports.clone();
            let stop = stop.clone();
            tokio::spawn(async move { forwarder.forward(&target, &ports, ready_tx, stop).await })
        };

        let mut tunnel = Self {
            ports,
            stop,
            task: Some(task),
        };

        match tokio::time::timeout(ready_timeout, ready_rx).await {
            Ok(Ok(())) => {
                debug!("Tunnel {} ready", tunnel.ports);
                Ok(tunnel)
            }
            // The forwarder dropped its readiness signal: it has ended or is ending
            Ok(Err(_)) => Err(tunnel.died().await),
            Err(_) => {
                tunnel.close().await;
                Err(Error::tunnel(format!(
                    "port-forward did not become ready within {}s",
                    ready_timeout.as_secs()
                )))
            }
        }
    }

    /// Local and remote ports, `"<local>:<remote>"`
    pub fn ports(&self) -> &str {
        &self.ports
    }

    /// Resolves with the failure once the forward ends on its own.
    ///
    /// Pending forever after the tunnel has already been observed dead.
    pub async fn died(&mut self) -> Error {
        match self.task.as_mut() {
            Some(task) => {
                let result = task.await;
                self.task = None;
                task_error(result)
            }
            None => std::future::pending().await,
        }
    }

    /// Stop the forward and wait for its task to finish
    pub async fn close(mut self) {
        debug!("Closing tunnel {}", self.ports);
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Port-forward {} ended with an error: {e}", self.ports),
                Err(e) => warn!("Port-forward {} task failed: {e}", self.ports),
            }
        }
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.stop.cancel();
            task.abort();
        }
    }
}
