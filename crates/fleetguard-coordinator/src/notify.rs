//! Outbound notification seam. Delivery, retry, and templating belong
//! to the implementation.

use std::time::Duration;

use async_trait::async_trait;

use fleetguard_types::{FailureEvent, NodeConfig, RecoveryResult};

/// Receives coordinator outcomes. Every method defaults to a no-op; an
/// `Err` is logged and never stops the remaining notifiers.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// A node entered `FailureDetected`.
    async fn on_failure(&self, _node: &NodeConfig, _event: &FailureEvent) -> anyhow::Result<()> {
        Ok(())
    }

    /// A node under recovery was confirmed healthy again.
    async fn on_recovery(
        &self,
        _node: &NodeConfig,
        _result: &RecoveryResult,
        _downtime: Duration,
        _failed_attempts: u32,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// A node's recovery retries were exhausted.
    async fn on_escalation(
        &self,
        _node: &NodeConfig,
        _history: &[RecoveryResult],
        _last_error: Option<&str>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
