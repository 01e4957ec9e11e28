//! Built-in check strategies.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use fleetguard_health::{CheckStrategy, ProbeError};
use fleetguard_types::NodeConfig;

/// Registry name of [`TcpProbe`].
pub const TCP_METHOD: &str = "tcp";

/// Healthy when a TCP connection to the node's service port opens
/// within the timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl CheckStrategy for TcpProbe {
    async fn check_health(&self, node: &NodeConfig, timeout: Duration) -> Result<bool, ProbeError> {
        let address = node.address();
        match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) => {
                debug!(node_id = %node.node_id, %address, error = %e, "tcp probe connection failed");
                Err(ProbeError::Connect(e))
            }
            Err(_) => {
                debug!(node_id = %node.node_id, %address, "tcp probe timed out");
                Err(ProbeError::Timeout(timeout))
            }
        }
    }
}
