//! The seam between the coordinator and whatever runs recovery attempts.

use async_trait::async_trait;

use fleetguard_recovery::{RecoveryEngine, RecoveryOutcome};
use fleetguard_types::{FailureCategory, NodeConfig, RecoveryResult};

/// Runs recovery attempts on the coordinator's behalf.
///
/// [`RecoveryEngine`] implements this by executing inline, so a call
/// returns only after the attempt (and its backoff) completes.
#[async_trait]
pub trait RecoveryExecutor: Send + Sync {
    async fn execute(&self, node: &NodeConfig, category: FailureCategory) -> RecoveryOutcome;

    async fn last_result(&self, node_id: &str) -> Option<RecoveryResult>;

    async fn cancel(&self, node_id: &str) -> bool;
}

#[async_trait]
impl RecoveryExecutor for RecoveryEngine {
    async fn execute(&self, node: &NodeConfig, category: FailureCategory) -> RecoveryOutcome {
        self.execute_recovery(node, category).await
    }

    async fn last_result(&self, node_id: &str) -> Option<RecoveryResult> {
        RecoveryEngine::last_result(self, node_id).await
    }

    async fn cancel(&self, node_id: &str) -> bool {
        self.cancel_recovery(node_id).await
    }
}
