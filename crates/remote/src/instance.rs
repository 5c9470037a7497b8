//! Instance model as reported by `kubectl get pods -o json`
//!
//! Only the fields needed to derive the displayed status are modelled;
//! everything else in the pod document is ignored.

use serde::{Deserialize, Serialize};

/// One addressable instance ("pod") in an environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub metadata: InstanceMeta,
    #[serde(default)]
    pub status: InstanceStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub deletion_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub init_container_statuses: Vec<ContainerStatus>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
    #[serde(default)]
    pub conditions: Vec<InstanceCondition>,
}

/// One entry of `status.conditions`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCondition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: ContainerState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    #[serde(default)]
    pub waiting: Option<StateWaiting>,
    #[serde(default)]
    pub running: Option<StateRunning>,
    #[serde(default)]
    pub terminated: Option<StateTerminated>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateWaiting {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRunning {
    #[serde(default)]
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTerminated {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub signal: i32,
}

/// The `items` wrapper of a list response
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct InstanceList {
    #[serde(default)]
    pub items: Vec<Instance>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl Instance {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Lifecycle phase, empty when the API did not report one
    pub fn phase(&self) -> &str {
        self.status.phase.as_deref().unwrap_or_default()
    }

    /// Human-facing status, derived the way `kubectl get pods` prints it.
    ///
    /// Init containers take precedence over main containers; a pending
    /// deletion overrides everything with `Terminating` (or `Unknown` when the
    /// node is unreachable).
    pub fn status_reason(&self) -> String {
        let status = &self.status;
        let mut reason = non_empty(&status.reason)
            .unwrap_or(self.phase())
            .to_string();

        let total_init = status.init_container_statuses.len();
        let mut initializing = false;
        for (i, container) in status.init_container_statuses.iter().enumerate() {
            let state = &container.state;
            if let Some(terminated) = &state.terminated {
                if terminated.exit_code == 0 {
                    continue;
                }
                reason = match non_empty(&terminated.reason) {
                    Some(r) => format!("Init:{r}"),
                    None if terminated.signal != 0 => format!("Init:Signal:{}", terminated.signal),
                    None => format!("Init:ExitCode:{}", terminated.exit_code),
                };
            } else {
                match state.waiting.as_ref().and_then(|w| non_empty(&w.reason)) {
                    Some(r) if r != "PodInitializing" => reason = format!("Init:{r}"),
                    _ => reason = format!("Init:{i}/{total_init}"),
                }
            }
            initializing = true;
            break;
        }

        if !initializing {
            let mut has_running = false;
            for container in status.container_statuses.iter().rev() {
                let state = &container.state;
                if let Some(r) = state.waiting.as_ref().and_then(|w| non_empty(&w.reason)) {
                    reason = r.to_string();
                } else if let Some(terminated) = &state.terminated {
                    reason = match non_empty(&terminated.reason) {
                        Some(r) => r.to_string(),
                        None if terminated.signal != 0 => format!("Signal:{}", terminated.signal),
                        None => format!("ExitCode:{}", terminated.exit_code),
                    };
                } else if container.ready && state.running.is_some() {
                    has_running = true;
                }
            }
            // A completed sidecar next to a live container
            if reason == "Completed" && has_running {
                reason = if self.is_ready() { "Running" } else { "NotReady" }.to_string();
            }
        }

        if self.metadata.deletion_timestamp.is_some() {
            reason = if non_empty(&status.reason) == Some("NodeLost") {
                "Unknown".to_string()
            } else {
                "Terminating".to_string()
            };
        }

        reason
    }

    /// Whether the `Ready` condition is `True`
    pub fn is_ready(&self) -> bool {
        self.status
            .conditions
            .iter()
            .any(|c| c.kind == "Ready" && c.status == "True")
    }

    /// Containers reporting ready, out of all containers
    pub fn ready_count(&self) -> (usize, usize) {
        let containers = &self.status.container_statuses;
        (
            containers.iter().filter(|c| c.ready).count(),
            containers.len(),
        )
    }
}

/// Parse a `kubectl get pods -o json` document, sorted by instance name
pub fn parse_instance_list(json: &str) -> serde_json::Result<Vec<Instance>> {
    let list: InstanceList = serde_json::from_str(json)?;
    let mut items = list.items;
    items.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    Ok(items)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn running(name: &str) -> Instance {
        Instance {
            metadata: InstanceMeta {
                name: name.to_string(),
                ..Default::default()
            },
            status: InstanceStatus {
                phase: Some("Running".to_string()),
                container_statuses: vec![ContainerStatus {
                    name: "app".to_string(),
                    ready: true,
                    state: ContainerState {
                        running: Some(StateRunning::default()),
                        ..Default::default()
                    },
                }],
                conditions: vec![InstanceCondition {
                    kind: "Ready".to_string(),
                    status: "True".to_string(),
                }],
                ..Default::default()
            },
        }
    }

    pub fn waiting(name: &str, reason: &str) -> Instance {
        let mut instance = running(name);
        instance.status.conditions.clear();
        instance.status.container_statuses[0] = ContainerStatus {
            name: "app".to_string(),
            ready: false,
            state: ContainerState {
                waiting: Some(StateWaiting {
                    reason: Some(reason.to_string()),
                }),
                ..Default::default()
            },
        };
        instance
    }
}
