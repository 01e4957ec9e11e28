//! Notifier that reports coordinator outcomes as tracing events.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use fleetguard_coordinator::Notifier;
use fleetguard_types::{FailureEvent, NodeConfig, RecoveryResult};

/// Logs failures at `warn`, recoveries at `info` and escalations at
/// `error`, all under the `fleetd::events` target. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn on_failure(&self, node: &NodeConfig, event: &FailureEvent) -> anyhow::Result<()> {
        warn!(
            target: "fleetd::events",
            node_id = %node.node_id,
            role = %node.role,
            address = %node.address(),
            category = %event.category,
            error = event.status.error_message.as_deref().unwrap_or(""),
            recommended = ?event.recommended_actions,
            "NODE FAILURE"
        );
        Ok(())
    }

    async fn on_recovery(
        &self,
        node: &NodeConfig,
        result: &RecoveryResult,
        downtime: Duration,
        failed_attempts: u32,
    ) -> anyhow::Result<()> {
        info!(
            target: "fleetd::events",
            node_id = %node.node_id,
            action = %result.action_type,
            command = %result.command_executed,
            downtime_secs = downtime.as_secs(),
            failed_attempts,
            "NODE RECOVERED"
        );
        Ok(())
    }

    async fn on_escalation(
        &self,
        node: &NodeConfig,
        history: &[RecoveryResult],
        last_error: Option<&str>,
    ) -> anyhow::Result<()> {
        let actions: Vec<&str> = history.iter().map(|r| r.action_type.as_str()).collect();
        error!(
            target: "fleetd::events",
            node_id = %node.node_id,
            role = %node.role,
            attempts = history.len(),
            actions = ?actions,
            last_error = last_error.unwrap_or(""),
            "MANUAL INTERVENTION REQUIRED"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    use fleetguard_types::{epoch_secs, FailureCategory, NodeRole, NodeStatus};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn result(success: bool) -> RecoveryResult {
        RecoveryResult {
            node_id: "kafka-1".to_string(),
            action_type: "restart_broker".to_string(),
            command_executed: "systemctl restart kafka".to_string(),
            exit_code: if success { 0 } else { 1 },
            stdout: String::new(),
            stderr: String::new(),
            executed_at: epoch_secs(),
            success,
        }
    }

    #[tokio::test]
    async fn reports_every_outcome() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let node = NodeConfig::new("kafka-1", NodeRole::Broker, "10.0.0.1", 9092);
        let event = FailureEvent {
            node_id: "kafka-1".to_string(),
            category: FailureCategory::ServiceUnavailable,
            status: NodeStatus::unhealthy("kafka-1", "failed", Duration::from_millis(3), "Connection refused"),
            recommended_actions: vec!["restart_broker".to_string()],
            detected_at: epoch_secs(),
        };

        let notifier = LogNotifier;
        assert_eq!(notifier.name(), "log");
        notifier.on_failure(&node, &event).await.unwrap();
        notifier
            .on_recovery(&node, &result(true), Duration::from_secs(42), 1)
            .await
            .unwrap();
        notifier
            .on_escalation(&node, &[result(false), result(false)], Some("Connection refused"))
            .await
            .unwrap();

        let text = captured.text();
        assert!(text.contains("NODE FAILURE"), "{text}");
        assert!(text.contains("category=service_unavailable"), "{text}");
        assert!(text.contains("NODE RECOVERED"), "{text}");
        assert!(text.contains("downtime_secs=42"), "{text}");
        assert!(text.contains("MANUAL INTERVENTION REQUIRED"), "{text}");
        assert!(text.contains("attempts=2"), "{text}");
    }
}
