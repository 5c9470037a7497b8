//! `kubectl`-backed remote operations

use crate::instance::parse_instance_list;
use crate::{ExecOutput, Instance, PodLister, PortForwarder, RemoteExecutor, RemoteProcess, RemoteTarget};
use async_trait::async_trait;
use podsync_core::error::{Error, Result};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Line printed by `kubectl port-forward` once the listener is up
const FORWARDING_PREFIX: &str = "Forwarding from";

/// Remote operations implemented with the `kubectl` CLI
#[derive(Debug, Clone)]
pub struct Kubectl {
    program: String,
}

impl Default for Kubectl {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl Kubectl {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Global flags selecting context and namespace
    fn scope_args(context: Option<&str>, namespace: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(context) = context {
            args.push("--context".to_string());
            args.push(context.to_string());
        }
        args.push("--namespace".to_string());
        args.push(namespace.to_string());
        args
    }

    /// Arguments for `exec` into the target, without the command
    fn exec_args(target: &RemoteTarget, interactive: bool) -> Vec<String> {
        let mut args = Self::scope_args(target.context.as_deref(), &target.namespace);
        args.push("exec".to_string());
        if interactive {
            args.push("-i".to_string());
        }
        args.push(target.instance.clone());
        args.push("--".to_string());
        args
    }

    fn command(&self, args: &[String]) -> Command {
        trace!("{} {}", self.program, args.join(" "));
        let mut cmd = Command::new(&self.program);
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl PodLister for Kubectl {
    async fn list(&self, context: Option<&str>, namespace: &str) -> Result<Vec<Instance>> {
        let mut args = Self::scope_args(context, namespace);
        args.extend(["get", "pods", "-o", "json"].map(String::from));

        let output = self
            .command(&args)
            .output()
            .await
            .map_err(|e| Error::resolution(format!("Failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(Error::resolution(format!(
                "listing instances in '{namespace}' failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        let instances = parse_instance_list(&json)
            .map_err(|e| Error::resolution(format!("failed to parse kubectl json: {e}")))?;
        debug!("Found {} instances in '{namespace}'", instances.len());
        Ok(instances)
    }
}

/// A `kubectl exec` child process
struct KubectlProcess {
    child: Child,
}

#[async_trait]
impl RemoteProcess for KubectlProcess {
    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    async fn terminate(&mut self) -> Result<()> {
        if self.has_exited() {
            return Ok(());
        }
        self.child
            .kill()
            .await
            .map_err(|e| Error::tunnel(format!("Failed to stop remote process: {e}")))
    }
}

#[async_trait]
impl RemoteExecutor for Kubectl {
    async fn exec(&self, target: &RemoteTarget, command: &[String]) -> Result<ExecOutput> {
        let mut args = Self::exec_args(target, false);
        args.extend(command.iter().cloned());

        let output = self
            .command(&args)
            .output()
            .await
            .map_err(|e| Error::tunnel(format!("Failed to run {}: {e}", self.program)))?;

        Ok(ExecOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn spawn(
        &self,
        target: &RemoteTarget,
        command: &[String],
    ) -> Result<Box<dyn RemoteProcess>> {
        let mut args = Self::exec_args(target, true);
        args.extend(command.iter().cloned());

        let child = self
            .command(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::tunnel(format!("Failed to run {}: {e}", self.program)))?;

        Ok(Box::new(KubectlProcess { child }))
    }

    fn remote_shell(&self, target: &RemoteTarget) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(Self::exec_args(target, true));
        parts.join(" ")
    }
}

#[async_trait]
impl PortForwarder for Kubectl {
    async fn forward(
        &self,
        target: &RemoteTarget,
        ports: &str,
        ready: oneshot::Sender<()>,
        stop: CancellationToken,
    ) -> Result<()> {
        let mut args = Self::scope_args(target.context.as_deref(), &target.namespace);
        args.push("port-forward".to_string());
        args.push(format!("pod/{}", target.instance));
        args.push(ports.to_string());

        let mut child = self
            .command(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::tunnel(format!("Failed to run {}: {e}", self.program)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::tunnel("port-forward stdout was not captured"))?;
        let mut lines = BufReader::new(stdout).lines();
        let mut ready = Some(ready);

        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    debug!("Stopping port-forward {ports} to {target}");
                    let _ = child.kill().await;
                    return Ok(());
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        trace!("port-forward: {line}");
                        if line.starts_with(FORWARDING_PREFIX) {
                            if let Some(tx) = ready.take() {
                                info!("Forwarding {ports} to {target}");
                                let _ = tx.send(());
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = child.kill().await;
                        return Err(Error::tunnel(format!("port-forward output unreadable: {e}")));
                    }
                },
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::tunnel(format!("port-forward did not exit cleanly: {e}")))?;
        if stop.is_cancelled() {
            return Ok(());
        }
        Err(Error::tunnel(format!(
            "port-forward to {target} exited unexpectedly ({status})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scope_args() {
        assert_eq!(
            Kubectl::scope_args(Some("dev"), "alice"),
            vec!["--context", "dev", "--namespace", "alice"]
        );
        assert_eq!(
            Kubectl::scope_args(None, "alice"),
            vec!["--namespace", "alice"]
        );
    }

    #[test]
    fn test_remote_shell_bakes_in_identity() {
        let kubectl = Kubectl::new("/usr/local/bin/kubectl");
        let target = RemoteTarget::new(Some("dev".to_string()), "alice", "web-1");
        assert_eq!(
            kubectl.remote_shell(&target),
            "/usr/local/bin/kubectl --context dev --namespace alice exec -i web-1 --"
        );

        let target = RemoteTarget::new(None, "alice", "web-1");
        assert_eq!(
            Kubectl::default().remote_shell(&target),
            "kubectl --namespace alice exec -i web-1 --"
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_resolution_error() {
        let kubectl = Kubectl::new("/nonexistent/kubectl-for-podsync-tests");
        let err = kubectl.list(None, "alice").await.expect_err("should fail");
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_exec_is_a_tunnel_error() {
        let kubectl = Kubectl::new("/nonexistent/kubectl-for-podsync-tests");
        let target = RemoteTarget::new(None, "alice", "web-1");
        let err = kubectl
            .exec(&target, &["true".to_string()])
            .await
            .expect_err("should fail");
        assert!(!err.is_session_fatal());
    }
}
