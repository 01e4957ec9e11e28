//! The probe seam: a named check method implemented outside the core.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use fleetguard_types::{NodeConfig, NodeRole};

/// A probe could not complete. Distinct from a probe that completed and
/// found the node unhealthy (`Ok(false)`).
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("health check timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("{0}")]
    Other(String),
}

/// A health-probe strategy registered under a check-method name.
#[async_trait]
pub trait CheckStrategy: Send + Sync {
    /// Probe `node`. `Ok(true)` is healthy, `Ok(false)` is "probed but
    /// unhealthy", `Err` means the probe itself could not complete.
    async fn check_health(&self, node: &NodeConfig, timeout: Duration) -> Result<bool, ProbeError>;

    /// Roles this strategy knows how to probe.
    fn supported_roles(&self) -> &[NodeRole] {
        &[NodeRole::Broker, NodeRole::Coordinator]
    }

    fn supports_role(&self, role: NodeRole) -> bool {
        self.supported_roles().contains(&role)
    }
}
