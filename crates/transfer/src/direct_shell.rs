//! Transfer piped through a remote exec
//!
//! The utility is told to use `kubectl exec` as its remote shell, so its
//! protocol runs over the exec channel instead of a network socket. The
//! destination host is `env`, which the remote shell receives as the first
//! word of the command it runs in the instance.

use crate::plan::TransferPlan;
use crate::rsync::{Invocation, SyncTool, TransferSettings};
use podsync_core::error::Result;
use podsync_remote::{RemoteExecutor, RemoteTarget};
use std::sync::Arc;

/// Variable the utility reads its remote-shell command from
pub const REMOTE_SHELL_VAR: &str = "RSYNC_RSH";

/// Placeholder host; the instance runs `env rsync --server ...`
const REMOTE_SHELL_HOST: &str = "env";

pub struct DirectShellTransport {
    settings: TransferSettings,
    executor: Arc<dyn RemoteExecutor>,
    tool: Arc<dyn SyncTool>,
}

impl DirectShellTransport {
    pub fn new(
        settings: TransferSettings,
        executor: Arc<dyn RemoteExecutor>,
        tool: Arc<dyn SyncTool>,
    ) -> Self {
        Self {
            settings,
            executor,
            tool,
        }
    }

    pub fn invocation(&self, target: &RemoteTarget, plan: &TransferPlan) -> Invocation {
        let destination = format!("{REMOTE_SHELL_HOST}:{}", self.settings.remote_root);
        Invocation::rsync(&self.settings, plan, destination)
            .env(REMOTE_SHELL_VAR, self.executor.remote_shell(target))
    }

    pub async fn sync(&self, target: &RemoteTarget, plan: &TransferPlan) -> Result<()> {
        self.tool.run(&self.invocation(target, plan)).await
    }
}
