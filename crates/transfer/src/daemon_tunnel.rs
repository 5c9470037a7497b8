//! Transfer through a transient daemon inside the instance
//!
//! Stages: start the daemon, wait for its pid file, open a port-forward, run
//! the transfer against the forwarded port, tear down. Teardown always runs
//! and in a fixed order: close the port-forward, kill the daemon by its pid
//! file, release the exec that hosts it. Teardown failures are logged and
//! never replace the transfer result.

use crate::plan::TransferPlan;
use crate::rsync::{shell_quote, Invocation, SyncTool, TransferSettings};
use crate::tunnel::Tunnel;
use podsync_core::error::{Error, Result};
use podsync_remote::{PortForwarder, RemoteExecutor, RemoteProcess, RemoteTarget};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Daemon config written inside the instance
pub const DAEMON_CONFIG_PATH: &str = "/tmp/podsyncd.conf";
/// Pid file the daemon writes once it is listening
pub const DAEMON_PID_PATH: &str = "/tmp/podsyncd.pid";
/// Module name exported by the daemon
pub const DAEMON_MODULE: &str = "podsync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Starting,
    Waiting,
    Forwarding,
    Syncing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Starting => "starting the daemon",
            Self::Waiting => "waiting for the daemon",
            Self::Forwarding => "opening the port-forward",
            Self::Syncing => "transferring",
        })
    }
}

pub struct DaemonTunnelTransport {
    settings: TransferSettings,
    executor: Arc<dyn RemoteExecutor>,
    forwarder: Arc<dyn PortForwarder>,
    tool: Arc<dyn SyncTool>,
}

impl DaemonTunnelTransport {
    pub fn new(
        settings: TransferSettings,
        executor: Arc<dyn RemoteExecutor>,
        forwarder: Arc<dyn PortForwarder>,
        tool: Arc<dyn SyncTool>,
    ) -> Self {
        Self {
            settings,
            executor,
            forwarder,
            tool,
        }
    }

    /// Shell script that writes the config, clears a stale pid file and runs
    /// the daemon in the foreground so it dies with its exec channel
    pub fn start_command(&self) -> Vec<String> {
        let config = [
            format!("pid file = {DAEMON_PID_PATH}"),
            format!("[{DAEMON_MODULE}]"),
            format!("    path = {}", self.settings.remote_root),
            "    read only = false".to_string(),
            "    use chroot = false".to_string(),
            // A root daemon otherwise drops module transfers to `nobody`
            "    uid = root".to_string(),
            "    gid = root".to_string(),
        ]
        .iter()
        .map(|line| shell_quote(line))
        .collect::<Vec<_>>()
        .join(" ");

        let script = format!(
            "printf '%s\\n' {config} > {DAEMON_CONFIG_PATH} && rm -f {DAEMON_PID_PATH} && \
             exec rsync --daemon --no-detach --address=127.0.0.1 --port={} --config={DAEMON_CONFIG_PATH}",
            self.settings.daemon.daemon_port
        );
        vec!["sh".to_string(), "-c".to_string(), script]
    }

    fn probe_command() -> Vec<String> {
        ["test", "-f", DAEMON_PID_PATH].map(String::from).to_vec()
    }

    fn kill_command() -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("kill $(cat {DAEMON_PID_PATH}) && rm -f {DAEMON_PID_PATH}"),
        ]
    }

    /// `rsync://` destination at the local end of the tunnel
    pub fn destination(&self) -> String {
        format!(
            "rsync://127.0.0.1:{}/{DAEMON_MODULE}/",
            self.settings.daemon.local_port
        )
    }

    pub async fn sync(&self, target: &RemoteTarget, plan: &TransferPlan) -> Result<()> {
        debug!("Daemon transfer: {}", Stage::Starting);
        let mut daemon = self
            .executor
            .spawn(target, &self.start_command())
            .await
            .map_err(|e| Error::tunnel(format!("Failed while {}: {e}", Stage::Starting)))?;

        let mut stage = Stage::Waiting;
        let result = self.run(target, plan, daemon.as_mut(), &mut stage).await;
        if let Err(e) = &result {
            warn!("Daemon transfer failed while {stage}: {e}");
        }

        self.stop_daemon(target, daemon.as_mut()).await;
        result
    }

    async fn run(
        &self,
        target: &RemoteTarget,
        plan: &TransferPlan,
        daemon: &mut dyn RemoteProcess,
        stage: &mut Stage,
    ) -> Result<()> {
        debug!("Daemon transfer: {stage}");
        self.wait_ready(target, daemon).await?;

        *stage = Stage::Forwarding;
        debug!("Daemon transfer: {stage}");
        let daemon_settings = &self.settings.daemon;
        let mut tunnel = Tunnel::open(
            Arc::clone(&self.forwarder),
            target,
            daemon_settings.local_port,
            daemon_settings.daemon_port,
            daemon_settings.ready_timeout,
        )
        .await?;

        *stage = Stage::Syncing;
        debug!("Daemon transfer: {stage}");
        let invocation = Invocation::rsync(&self.settings, plan, self.destination());
        let result = tokio::select! {
            result = self.tool.run(&invocation) => result,
            failure = tunnel.died() => Err(failure),
        };

        tunnel.close().await;
        result
    }

    async fn wait_ready(&self, target: &RemoteTarget, daemon: &mut dyn RemoteProcess) -> Result<()> {
        let timeout = self.settings.daemon.ready_timeout;
        let deadline = Instant::now() + timeout;
        let probe = Self::probe_command();

        loop {
            if daemon.has_exited() {
                return Err(Error::tunnel("transfer daemon exited before becoming ready"));
            }
            match self.executor.exec(target, &probe).await {
                Ok(output) if output.success() => {
                    info!("Transfer daemon ready in {target}");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => debug!("Daemon readiness probe failed: {e}"),
            }
            if Instant::now() >= deadline {
                return Err(Error::DaemonTimeout { timeout });
            }
            tokio::time::sleep(self.settings.daemon.poll_interval).await;
        }
    }

    async fn stop_daemon(&self, target: &RemoteTarget, daemon: &mut dyn RemoteProcess) {
        match self.executor.exec(target, &Self::kill_command()).await {
            Ok(output) if output.success() => debug!("Stopped transfer daemon in {target}"),
            Ok(output) => warn!(
                "Stopping the transfer daemon failed ({:?}): {}",
                output.code,
                output.stderr.trim()
            ),
            Err(e) => warn!("Stopping the transfer daemon failed: {e}"),
        }
        if let Err(e) = daemon.terminate().await {
            warn!("Releasing the daemon exec failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podsync_core::Config;
    use std::path::Path;

    fn transport() -> DaemonTunnelTransport {
        struct Unused;

        #[async_trait::async_trait]
        impl RemoteExecutor for Unused {
            async fn exec(&self, _: &RemoteTarget, _: &[String]) -> Result<podsync_remote::ExecOutput> {
                Err(Error::tunnel("unused"))
            }
            async fn spawn(&self, _: &RemoteTarget, _: &[String]) -> Result<Box<dyn RemoteProcess>> {
                Err(Error::tunnel("unused"))
            }
            fn remote_shell(&self, _: &RemoteTarget) -> String {
                String::new()
            }
        }

        #[async_trait::async_trait]
        impl PortForwarder for Unused {
            async fn forward(
                &self,
                _: &RemoteTarget,
                _: &str,
                _: tokio::sync::oneshot::Sender<()>,
                _: tokio_util::sync::CancellationToken,
            ) -> Result<()> {
                Err(Error::tunnel("unused"))
            }
        }

        #[async_trait::async_trait]
        impl SyncTool for Unused {
            async fn run(&self, _: &Invocation) -> Result<()> {
                Err(Error::transfer("unused"))
            }
        }

        let mut config = Config::default();
        config.transport.daemon_port = 9000;
        config.transport.local_port = 9100;
        let settings = TransferSettings::from_config(&config, Path::new("/work/app"));
        DaemonTunnelTransport::new(settings, Arc::new(Unused), Arc::new(Unused), Arc::new(Unused))
    }

    #[test]
    fn test_start_command() {
        let command = transport().start_command();
        assert_eq!(command[..2], ["sh".to_string(), "-c".to_string()]);
        let script = &command[2];
        assert!(script.contains("'pid file = /tmp/podsyncd.pid'"));
        assert!(script.contains("'    path = /app/'"));
        assert!(script.contains("'    uid = root'"));
        assert!(script.contains("'    gid = root'"));
        assert!(script.contains("> /tmp/podsyncd.conf"));
        assert!(script.contains("rm -f /tmp/podsyncd.pid"));
        assert!(script.contains("--no-detach --address=127.0.0.1 --port=9000"));
    }

    #[test]
    fn test_destination_uses_local_port() {
        assert_eq!(transport().destination(), "rsync://127.0.0.1:9100/podsync/");
    }

    #[test]
    fn test_kill_command_uses_pid_file() {
        let command = DaemonTunnelTransport::kill_command();
        assert!(command[2].contains("kill $(cat /tmp/podsyncd.pid)"));
    }
}
