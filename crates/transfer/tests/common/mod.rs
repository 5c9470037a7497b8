//! Recording fakes for the remote collaborators and the transfer utility
#![allow(dead_code)]

use async_trait::async_trait;
use podsync_core::config::Config;
use podsync_core::{Error, Result};
use podsync_remote::{ExecOutput, PortForwarder, RemoteExecutor, RemoteProcess, RemoteTarget};
use podsync_transfer::{Collaborators, Invocation, SyncTool, TransferSettings};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn events(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn count(log: &Log, event: &str) -> usize {
    log.lock().unwrap().iter().filter(|e| *e == event).count()
}

pub fn target() -> RemoteTarget {
    RemoteTarget::new(Some("dev".to_string()), "alice", "web-1")
}

pub fn settings(root: &Path) -> TransferSettings {
    TransferSettings::from_config(&Config::default(), root)
}

#[derive(Debug, Clone, Copy)]
pub enum ForwardMode {
    Healthy,
    NeverReady,
    DiesAfterReady(Duration),
    FailsImmediately,
}

pub struct FakeRemote {
    pub log: Log,
    pub ready_after_probes: usize,
    pub daemon_exits_early: bool,
    pub forward_mode: ForwardMode,
    probes: AtomicUsize,
    pub stop_tokens: Mutex<Vec<CancellationToken>>,
}

impl FakeRemote {
    pub fn new(log: Log) -> Self {
        Self {
            log,
            ready_after_probes: 1,
            daemon_exits_early: false,
            forward_mode: ForwardMode::Healthy,
            probes: AtomicUsize::new(0),
            stop_tokens: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, event: &str) {
        self.log.lock().unwrap().push(event.to_string());
    }

    pub fn all_stops_cancelled(&self) -> bool {
        self.stop_tokens
            .lock()
            .unwrap()
            .iter()
            .all(CancellationToken::is_cancelled)
    }
}

struct FakeProcess {
    log: Log,
    exited: bool,
}

#[async_trait]
impl RemoteProcess for FakeProcess {
    fn has_exited(&mut self) -> bool {
        self.exited
    }

    async fn terminate(&mut self) -> Result<()> {
        self.log.lock().unwrap().push("release-daemon".to_string());
        Ok(())
    }
}

#[async_trait]
impl RemoteExecutor for FakeRemote {
    async fn exec(&self, _target: &RemoteTarget, command: &[String]) -> Result<ExecOutput> {
        let ok = if command.first().map(String::as_str) == Some("test") {
            self.record("probe");
            self.probes.fetch_add(1, Ordering::SeqCst) + 1 >= self.ready_after_probes
        } else if command.iter().any(|part| part.contains("kill")) {
            self.record("kill-daemon");
            true
        } else {
            self.record("exec");
            true
        };
        Ok(ExecOutput {
            code: Some(if ok { 0 } else { 1 }),
            ..Default::default()
        })
    }

    async fn spawn(
        &self,
        _target: &RemoteTarget,
        _command: &[String],
    ) -> Result<Box<dyn RemoteProcess>> {
        self.record("start-daemon");
        Ok(Box::new(FakeProcess {
            log: Arc::clone(&self.log),
            exited: self.daemon_exits_early,
        }))
    }

    fn remote_shell(&self, target: &RemoteTarget) -> String {
        format!("fake-exec {}", target.instance)
    }
}

#[async_trait]
impl PortForwarder for FakeRemote {
    async fn forward(
        &self,
        _target: &RemoteTarget,
        _ports: &str,
        ready: oneshot::Sender<()>,
        stop: CancellationToken,
    ) -> Result<()> {
        self.record("forward");
        self.stop_tokens.lock().unwrap().push(stop.clone());
        match self.forward_mode {
            ForwardMode::Healthy => {
                let _ = ready.send(());
                stop.cancelled().await;
                self.record("forward-stop");
                Ok(())
            }
            ForwardMode::NeverReady => {
                stop.cancelled().await;
                self.record("forward-stop");
                drop(ready);
                Ok(())
            }
            ForwardMode::DiesAfterReady(after) => {
                let _ = ready.send(());
                tokio::time::sleep(after).await;
                Err(Error::tunnel("connection to pod lost"))
            }
            ForwardMode::FailsImmediately => {
                drop(ready);
                Err(Error::tunnel("pod web-1 not found"))
            }
        }
    }
}

pub struct FakeTool {
    pub log: Log,
    pub invocations: Mutex<Vec<Invocation>>,
    pub delay: Duration,
    pub fail: bool,
}

impl FakeTool {
    pub fn new(log: Log) -> Self {
        Self {
            log,
            invocations: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncTool for FakeTool {
    async fn run(&self, invocation: &Invocation) -> Result<()> {
        self.log.lock().unwrap().push("rsync".to_string());
        self.invocations.lock().unwrap().push(invocation.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            Err(Error::transfer("rsync exited with exit status: 12"))
        } else {
            Ok(())
        }
    }
}

pub fn collaborators(remote: Arc<FakeRemote>, tool: Arc<FakeTool>) -> Collaborators {
    Collaborators {
        executor: remote.clone(),
        forwarder: remote,
        tool,
    }
}
