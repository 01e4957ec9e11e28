//! Built-in recovery action: a shell command run on the fleetd host.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use fleetguard_recovery::RecoveryAction;
use fleetguard_types::{epoch_secs, NodeConfig, NodeRole, RecoveryResult};

use crate::config::ActionSettings;

/// Runs `sh -c <command>` for a node.
///
/// `{node_id}`, `{host}` and `{port}` in the command are substituted, and
/// the same values are exported as `FLEETGUARD_*` environment variables.
#[derive(Debug, Clone)]
pub struct CommandAction {
    name: String,
    command: String,
    roles: Vec<NodeRole>,
    timeout: Duration,
}

impl CommandAction {
    /// Create an action that runs `command` for every role.
    pub fn new(name: impl Into<String>, command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            roles: Vec::new(),
            timeout,
        }
    }

    /// Restrict the action to `roles`. No roles means every role.
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = NodeRole>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    /// Build an action from its `[[actions]]` entry.
    pub fn from_settings(settings: &ActionSettings) -> Self {
        Self::new(&settings.name, &settings.command, Duration::from_secs(settings.timeout_secs))
            .with_roles(settings.roles.iter().copied())
    }

    /// Registry name of the action.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, node: &NodeConfig) -> String {
        self.command
            .replace("{node_id}", &node.node_id)
            .replace("{host}", &node.host)
            .replace("{port}", &node.port.to_string())
    }
}

#[async_trait]
impl RecoveryAction for CommandAction {
    async fn execute(&self, node: &NodeConfig) -> anyhow::Result<RecoveryResult> {
        let command = self.render(node);
        debug!(node_id = %node.node_id, action = %self.name, %command, "running recovery command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .env("FLEETGUARD_NODE_ID", &node.node_id)
            .env("FLEETGUARD_HOST", &node.host)
            .env("FLEETGUARD_PORT", node.port.to_string())
            .env("FLEETGUARD_ROLE", node.role.as_str())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(output) => output.with_context(|| format!("failed to spawn `{command}`"))?,
            Err(_) => {
                warn!(
                    node_id = %node.node_id,
                    action = %self.name,
                    timeout_secs = self.timeout.as_secs(),
                    "recovery command timed out"
                );
                return Ok(RecoveryResult::failed(&node.node_id, &self.name, command, "timed out"));
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        Ok(RecoveryResult {
            node_id: node.node_id.clone(),
            action_type: self.name.clone(),
            command_executed: command,
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            executed_at: epoch_secs(),
            success: output.status.success(),
        })
    }

    fn validate_config(&self) -> bool {
        !self.command.trim().is_empty() && !self.timeout.is_zero()
    }

    fn supports_role(&self, role: NodeRole) -> bool {
        self.roles.is_empty() || self.roles.contains(&role)
    }

    fn estimated_duration(&self) -> Duration {
        self.timeout
    }
}
