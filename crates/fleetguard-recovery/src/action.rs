//! Remediation seams implemented outside the core.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use fleetguard_types::{FailureCategory, NodeConfig, NodeRole, RecoveryResult};

/// A named remediation (service restart, script, playbook run, ...).
///
/// The action enforces its own execution timeout. Returning `Err`
/// means the action could not be run at all; the engine records that
/// as a failed [`RecoveryResult`].
#[async_trait]
pub trait RecoveryAction: Send + Sync {
    async fn execute(&self, node: &NodeConfig) -> anyhow::Result<RecoveryResult>;

    /// Checked once at registration; invalid actions are rejected.
    fn validate_config(&self) -> bool {
        true
    }

    fn supports_role(&self, role: NodeRole) -> bool;

    fn estimated_duration(&self) -> Duration;
}

/// An alternate action source selected by failure category rather than
/// by name.
#[async_trait]
pub trait RecoveryPlugin: Send + Sync {
    fn name(&self) -> &str;

    async fn execute_recovery(
        &self,
        node: &NodeConfig,
        category: FailureCategory,
    ) -> anyhow::Result<RecoveryResult>;

    fn supports_category(&self, category: FailureCategory) -> bool;

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(60)
    }
}

/// Notified when a node's recovery retries are exhausted.
#[async_trait]
pub trait EscalationListener: Send + Sync {
    async fn on_escalation(&self, node_id: &str, history: &[RecoveryResult]) -> anyhow::Result<()>;
}

/// A plugin bound to one failure category, usable wherever a
/// [`RecoveryAction`] is expected.
pub struct PluginAction {
    plugin: Arc<dyn RecoveryPlugin>,
    category: FailureCategory,
}

impl PluginAction {
    /// Bind `plugin` to the failure category it will be asked to handle.
    pub fn new(plugin: Arc<dyn RecoveryPlugin>, category: FailureCategory) -> Self {
        Self { plugin, category }
    }
}

#[async_trait]
impl RecoveryAction for PluginAction {
    async fn execute(&self, node: &NodeConfig) -> anyhow::Result<RecoveryResult> {
        self.plugin.execute_recovery(node, self.category).await
    }

    fn supports_role(&self, _role: NodeRole) -> bool {
        true
    }

    fn estimated_duration(&self) -> Duration {
        self.plugin.estimated_duration()
    }
}
