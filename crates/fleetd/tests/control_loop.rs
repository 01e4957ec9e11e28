//! End-to-end control-loop tests.
//!
//! Drives MonitoringLoop → Coordinator → RecoveryEngine with in-test
//! probes, actions, and notifiers, under paused tokio time.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use fleetd::config::FleetConfig;
use fleetd::Daemon;
use fleetguard_coordinator::{Coordinator, CoordinatorConfig, NodePhase, Notifier};
use fleetguard_health::{
    CheckStrategy, DispatcherConfig, HealthCheckDispatcher, MonitorConfig, MonitoringLoop, ProbeError,
};
use fleetguard_recovery::{RecoveryAction, RecoveryEngine};
use fleetguard_types::{
    epoch_secs, FailureCategory, FailureEvent, NodeConfig, NodeRole, NodeStatus, RecoveryResult, RetryPolicy,
    METHOD_ERROR,
};

// ── Test doubles ───────────────────────────────────────────────────

/// Per-node up/down switches shared by the probe and the action.
#[derive(Default)]
struct Cluster {
    down: Mutex<Vec<String>>,
}

impl Cluster {
    fn fail(&self, node_id: &str) {
        self.down.lock().unwrap().push(node_id.to_string());
    }

    fn heal(&self, node_id: &str) {
        self.down.lock().unwrap().retain(|id| id != node_id);
    }

    fn is_down(&self, node_id: &str) -> bool {
        self.down.lock().unwrap().iter().any(|id| id == node_id)
    }
}

struct ClusterProbe(Arc<Cluster>);

#[async_trait]
impl CheckStrategy for ClusterProbe {
    async fn check_health(&self, node: &NodeConfig, _timeout: Duration) -> Result<bool, ProbeError> {
        if self.0.is_down(&node.node_id) {
            Err(ProbeError::Other("Connection refused".to_string()))
        } else {
            Ok(true)
        }
    }
}

struct PanickingProbe;

#[async_trait]
impl CheckStrategy for PanickingProbe {
    async fn check_health(&self, _node: &NodeConfig, _timeout: Duration) -> Result<bool, ProbeError> {
        panic!("probe bug");
    }
}

/// Restart that heals the node once `works` is set.
struct Restart {
    cluster: Arc<Cluster>,
    works: AtomicBool,
    calls: AtomicU32,
}

impl Restart {
    fn new(cluster: Arc<Cluster>, works: bool) -> Arc<Self> {
        Arc::new(Self {
            cluster,
            works: AtomicBool::new(works),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl RecoveryAction for Restart {
    async fn execute(&self, node: &NodeConfig) -> anyhow::Result<RecoveryResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let success = self.works.load(Ordering::SeqCst);
        if success {
            self.cluster.heal(&node.node_id);
        }
        Ok(RecoveryResult {
            node_id: node.node_id.clone(),
            action_type: "restart_broker".to_string(),
            command_executed: "systemctl restart kafka".to_string(),
            exit_code: if success { 0 } else { 1 },
            stdout: String::new(),
            stderr: if success { String::new() } else { "unit failed".to_string() },
            executed_at: epoch_secs(),
            success,
        })
    }

    fn supports_role(&self, _role: NodeRole) -> bool {
        true
    }

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(30)
    }
}

#[derive(Default)]
struct Outbox {
    failures: Mutex<Vec<(String, FailureCategory)>>,
    recoveries: Mutex<Vec<(String, u32)>>,
    escalations: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl Notifier for Outbox {
    fn name(&self) -> &str {
        "outbox"
    }

    async fn on_failure(&self, node: &NodeConfig, event: &FailureEvent) -> anyhow::Result<()> {
        self.failures.lock().unwrap().push((node.node_id.clone(), event.category));
        Ok(())
    }

    async fn on_recovery(
        &self,
        node: &NodeConfig,
        _result: &RecoveryResult,
        _downtime: Duration,
        failed_attempts: u32,
    ) -> anyhow::Result<()> {
        self.recoveries.lock().unwrap().push((node.node_id.clone(), failed_attempts));
        Ok(())
    }

    async fn on_escalation(
        &self,
        node: &NodeConfig,
        history: &[RecoveryResult],
        _last_error: Option<&str>,
    ) -> anyhow::Result<()> {
        self.escalations.lock().unwrap().push((node.node_id.clone(), history.len()));
        Ok(())
    }
}

// ── Harness ────────────────────────────────────────────────────────

struct Harness {
    cluster: Arc<Cluster>,
    restart: Arc<Restart>,
    outbox: Arc<Outbox>,
    coordinator: Arc<Coordinator>,
    monitor: Arc<MonitoringLoop>,
}

fn broker(id: &str) -> NodeConfig {
    NodeConfig::new(id, NodeRole::Broker, "10.0.0.1", 9092)
        .with_check_methods(["cluster"])
        .with_recovery_actions(["restart_broker"])
        .with_retry_policy(RetryPolicy::new(3, Duration::from_secs(10), 2.0, Duration::from_secs(60)).unwrap())
}

fn harness(node_ids: &[&str], restart_works: bool, coordinator: CoordinatorConfig) -> Harness {
    let cluster = Arc::new(Cluster::default());
    let restart = Restart::new(cluster.clone(), restart_works);
    let outbox = Arc::new(Outbox::default());

    let engine = RecoveryEngine::new()
        .with_action("restart_broker", restart.clone())
        .unwrap();
    let coordinator = Arc::new(
        Coordinator::new(Arc::new(engine), coordinator).with_notifier(outbox.clone()),
    );

    let dispatcher = HealthCheckDispatcher::new(DispatcherConfig {
        max_retries: 0,
        ..Default::default()
    })
    .with_strategy("cluster", Arc::new(ClusterProbe(cluster.clone())));
    let monitor = MonitoringLoop::new(
        node_ids.iter().map(|id| broker(id)).collect(),
        dispatcher,
        MonitorConfig::default(),
    )
    .unwrap()
    .with_handler(coordinator.clone());

    Harness {
        cluster,
        restart,
        outbox,
        coordinator,
        monitor: Arc::new(monitor),
    }
}

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failed_broker_is_restarted_and_confirmed() {
    let h = harness(&["kafka-1", "kafka-2"], true, CoordinatorConfig::default());
    h.cluster.fail("kafka-1");

    // Tick 1: failure detected, restart runs inline and heals the node.
    let statuses = h.monitor.check_all_nodes_once().await;
    assert_eq!(statuses.len(), 2);
    assert_eq!(h.restart.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *h.outbox.failures.lock().unwrap(),
        vec![("kafka-1".to_string(), FailureCategory::ServiceUnavailable)]
    );

    // Tick 2: the healthy flip confirms the recovery.
    h.monitor.check_all_nodes_once().await;
    assert_eq!(*h.outbox.recoveries.lock().unwrap(), vec![("kafka-1".to_string(), 0)]);

    let events = h.coordinator.recovery_events("kafka-1").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].total_attempts, 1);
    assert!(matches!(
        h.coordinator.phase("kafka-1").await,
        NodePhase::Cooldown { extended: false, .. }
    ));
    assert_eq!(h.coordinator.phase("kafka-2").await, NodePhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn persistent_failure_escalates_then_cools_down() {
    let h = harness(&["kafka-1"], false, CoordinatorConfig::default());
    h.cluster.fail("kafka-1");

    for _ in 0..4 {
        h.monitor.check_all_nodes_once().await;
    }
    assert_eq!(h.restart.calls.load(Ordering::SeqCst), 3);
    assert_eq!(*h.outbox.escalations.lock().unwrap(), vec![("kafka-1".to_string(), 3)]);
    assert_eq!(h.outbox.failures.lock().unwrap().len(), 1);

    // Extended cooldown: further failures are suppressed.
    h.monitor.check_all_nodes_once().await;
    assert_eq!(h.restart.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.coordinator.stats().await.suppressed_cooldown, 1);

    // After 900s the node is eligible again and a new cycle starts.
    tokio::time::advance(Duration::from_secs(901)).await;
    h.monitor.check_all_nodes_once().await;
    assert_eq!(h.restart.calls.load(Ordering::SeqCst), 4);
    assert_eq!(h.outbox.failures.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn success_on_third_attempt_reports_two_failures() {
    let h = harness(&["kafka-1"], false, CoordinatorConfig::default());
    h.cluster.fail("kafka-1");

    h.monitor.check_all_nodes_once().await;
    h.monitor.check_all_nodes_once().await;
    h.restart.works.store(true, Ordering::SeqCst);
    h.monitor.check_all_nodes_once().await;
    h.monitor.check_all_nodes_once().await;

    assert_eq!(h.restart.calls.load(Ordering::SeqCst), 3);
    assert_eq!(*h.outbox.recoveries.lock().unwrap(), vec![("kafka-1".to_string(), 2)]);
    assert!(h.outbox.escalations.lock().unwrap().is_empty());
    assert_eq!(h.coordinator.stats().await.total_recoveries, 1);
}

#[tokio::test(start_paused = true)]
async fn ceiling_limits_simultaneous_recoveries() {
    let config = CoordinatorConfig {
        max_concurrent_recoveries: 1,
        ..Default::default()
    };
    let h = harness(&["kafka-1", "kafka-2", "kafka-3"], false, config);
    for id in ["kafka-1", "kafka-2", "kafka-3"] {
        h.cluster.fail(id);
    }

    h.monitor.check_all_nodes_once().await;
    assert_eq!(h.coordinator.recovering_nodes().await.len(), 1);
    assert_eq!(h.coordinator.stats().await.suppressed_concurrency, 2);

    // Releasing the slot lets a suppressed node in on the next tick.
    let first = h.coordinator.recovering_nodes().await.remove(0);
    h.coordinator.cancel_recovery(&first).await;
    h.cluster.heal(&first);
    h.monitor.check_all_nodes_once().await;

    let recovering = h.coordinator.recovering_nodes().await;
    assert_eq!(recovering.len(), 1);
    assert_ne!(recovering[0], first);
}

#[tokio::test(start_paused = true)]
async fn panicking_probe_does_not_abort_the_tick() {
    let cluster = Arc::new(Cluster::default());
    let restart = Restart::new(cluster.clone(), false);
    let engine = RecoveryEngine::new().with_action("restart_broker", restart).unwrap();
    let coordinator = Arc::new(Coordinator::new(Arc::new(engine), CoordinatorConfig::default()));

    let dispatcher = HealthCheckDispatcher::new(DispatcherConfig::default())
        .with_strategy("cluster", Arc::new(ClusterProbe(cluster)))
        .with_strategy("buggy", Arc::new(PanickingProbe));
    let nodes = vec![broker("kafka-1"), broker("kafka-2").with_check_methods(["buggy"])];
    let monitor = MonitoringLoop::new(nodes, dispatcher, MonitorConfig::default())
        .unwrap()
        .with_handler(coordinator.clone());

    let statuses = monitor.check_all_nodes_once().await;
    assert_eq!(statuses.len(), 2);

    let buggy: &NodeStatus = statuses.iter().find(|s| s.node_id == "kafka-2").unwrap();
    assert!(!buggy.is_healthy);
    assert_eq!(buggy.method_used, METHOD_ERROR);
    assert!(monitor.latest("kafka-1").await.unwrap().is_healthy);

    let events = coordinator.failure_events("kafka-2").await;
    assert_eq!(events.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn background_loop_runs_until_stopped() {
    let h = harness(&["kafka-1"], true, CoordinatorConfig::default());
    h.cluster.fail("kafka-1");

    let handle = h.monitor.clone().spawn();
    tokio::time::sleep(Duration::from_secs(65)).await;
    assert!(handle.stop(Duration::from_secs(5)).await);

    // Ticks at 0s, 30s, 60s.
    assert_eq!(h.monitor.history("kafka-1", 10).await.len(), 3);
    assert_eq!(h.outbox.recoveries.lock().unwrap().len(), 1);
}

// ── Daemon wiring ──────────────────────────────────────────────────

#[tokio::test]
async fn daemon_builds_from_config_file() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = format!(
        r#"
[monitor]
interval_secs = 5
check_timeout_secs = 2

[[actions]]
name = "restart_broker"
command = "true"
roles = ["broker"]

[[nodes]]
node_id = "kafka-1"
role = "broker"
host = "127.0.0.1"
port = {port}
check_methods = ["tcp"]
recovery_actions = ["restart_broker"]
"#
    );
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(config.as_bytes()).unwrap();

    let config = FleetConfig::from_file(file.path()).unwrap();
    let daemon = Daemon::build(&config).unwrap();

    let statuses = daemon.monitor.check_all_nodes_once().await;
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].is_healthy, "{:?}", statuses[0]);
    assert_eq!(statuses[0].method_used, "tcp");
    assert_eq!(daemon.coordinator.phase("kafka-1").await, NodePhase::Idle);
}

#[tokio::test]
async fn daemon_runs_command_action_for_down_node() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config: FleetConfig = toml::from_str(&format!(
        r#"
[monitor]
check_timeout_secs = 2
max_retries = 0

[[actions]]
name = "restart_broker"
command = "echo restarting {{node_id}}"

[[nodes]]
node_id = "kafka-1"
role = "broker"
host = "127.0.0.1"
port = {port}
check_methods = ["tcp"]
recovery_actions = ["restart_broker"]
"#
    ))
    .unwrap();
    config.validate().unwrap();
    let daemon = Daemon::build(&config).unwrap();

    daemon.monitor.check_all_nodes_once().await;

    let failures = daemon.coordinator.failure_events("kafka-1").await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].category, FailureCategory::ServiceUnavailable);
    assert_eq!(
        daemon.coordinator.phase("kafka-1").await,
        NodePhase::Recovering {
            category: FailureCategory::ServiceUnavailable,
            attempts: 1
        }
    );
    assert_eq!(daemon.coordinator.stats().await.total_attempts, 1);

    // `echo` exits 0 but the port stays closed: the budget of three
    // attempts runs out and the node escalates instead of restarting
    // on every tick.
    for _ in 0..3 {
        daemon.monitor.check_all_nodes_once().await;
    }
    let stats = daemon.coordinator.stats().await;
    assert_eq!(stats.total_attempts, 3);
    assert_eq!(stats.total_escalations, 1);
    assert!(matches!(
        daemon.coordinator.phase("kafka-1").await,
        NodePhase::Cooldown { extended: true, .. }
    ));
    assert!(daemon.coordinator.recovering_nodes().await.is_empty());
}
