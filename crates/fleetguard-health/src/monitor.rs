//! Monitoring loop — the background task that owns the polling cadence.
//!
//! Each tick checks every node through the dispatcher, records the
//! results in the status tracker, and hands failures and recoveries to
//! the registered transition handlers. Ticks never overlap: the
//! background loop and [`MonitoringLoop::check_all_nodes_once`] share a
//! tick lock, and handlers run inline so a tick ends only after every
//! handler (including any recovery it performs) has returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fleetguard_types::{validate_nodes, ConfigResult, NodeConfig, NodeStatus};

use crate::dispatcher::{HealthCheckDispatcher, MAX_WORKERS};
use crate::tracker::{StatusDiff, StatusTracker, DEFAULT_HISTORY_SIZE};

/// Receives failure and recovery signals from the monitoring loop.
///
/// `on_unhealthy` fires for every unhealthy observation, not only the
/// healthy → unhealthy flip; implementations deduplicate. `on_healthy`
/// fires only on an unhealthy → healthy flip.
#[async_trait]
pub trait TransitionHandler: Send + Sync {
    async fn on_unhealthy(&self, node: &NodeConfig, status: &NodeStatus, diff: &StatusDiff);

    async fn on_healthy(&self, node: &NodeConfig, status: &NodeStatus, diff: &StatusDiff);
}

/// Loop tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    /// Sleep between ticks.
    pub interval: Duration,
    /// Requested worker-pool size (capped at [`MAX_WORKERS`]).
    pub max_workers: usize,
    /// Statuses retained per node.
    pub history_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_workers: MAX_WORKERS,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

/// Drives periodic health checks for a fixed node set.
pub struct MonitoringLoop {
    nodes: Vec<NodeConfig>,
    index: HashMap<String, usize>,
    dispatcher: HealthCheckDispatcher,
    tracker: Mutex<StatusTracker>,
    handlers: Vec<Arc<dyn TransitionHandler>>,
    /// Serializes ticks between the background loop and manual triggers.
    tick_lock: Mutex<()>,
    config: MonitorConfig,
}

impl MonitoringLoop {
    /// Create a loop over `nodes`. Fails if the node set is invalid.
    pub fn new(
        nodes: Vec<NodeConfig>,
        dispatcher: HealthCheckDispatcher,
        config: MonitorConfig,
    ) -> ConfigResult<Self> {
        validate_nodes(&nodes)?;
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.node_id.clone(), i))
            .collect();

        Ok(Self {
            nodes,
            index,
            dispatcher,
            tracker: Mutex::new(StatusTracker::new(config.history_size)),
            handlers: Vec::new(),
            tick_lock: Mutex::new(()),
            config,
        })
    }

    /// Register a transition handler. Handlers run in registration order.
    pub fn with_handler(mut self, handler: Arc<dyn TransitionHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Monitored nodes, in configuration order.
    pub fn nodes(&self) -> &[NodeConfig] {
        &self.nodes
    }

    /// Look up a monitored node by id.
    pub fn node(&self, node_id: &str) -> Option<&NodeConfig> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    /// Most recent status recorded for a node.
    pub async fn latest(&self, node_id: &str) -> Option<NodeStatus> {
        self.tracker.lock().await.latest(node_id).cloned()
    }

    /// Up to `limit` recent statuses for a node, oldest first.
    pub async fn history(&self, node_id: &str, limit: usize) -> Vec<NodeStatus> {
        self.tracker.lock().await.history(node_id, limit)
    }

    /// Run one tick: check all nodes, diff, and dispatch transitions.
    ///
    /// Safe to call from another task while the background loop runs;
    /// the two are serialized.
    pub async fn check_all_nodes_once(&self) -> Vec<NodeStatus> {
        let _tick = self.tick_lock.lock().await;

        let statuses = self
            .dispatcher
            .check_all(&self.nodes, self.config.max_workers)
            .await;

        for status in &statuses {
            let diff = self.tracker.lock().await.update(status.clone());
            let Some(node) = self.node(&status.node_id) else {
                warn!(node_id = %status.node_id, "status for unknown node");
                continue;
            };

            if diff.became_unhealthy {
                warn!(
                    node_id = %node.node_id,
                    error = status.error_message.as_deref().unwrap_or(""),
                    "node became unhealthy"
                );
            } else if diff.became_healthy {
                info!(node_id = %node.node_id, method = %status.method_used, "node became healthy");
            }

            if !status.is_healthy {
                for handler in &self.handlers {
                    handler.on_unhealthy(node, status, &diff).await;
                }
            } else if diff.became_healthy {
                for handler in &self.handlers {
                    handler.on_healthy(node, status, &diff).await;
                }
            }
        }

        let healthy = statuses.iter().filter(|s| s.is_healthy).count();
        debug!(healthy, total = statuses.len(), "health tick complete");
        statuses
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            nodes = self.nodes.len(),
            interval_secs = self.config.interval.as_secs_f64(),
            "monitoring loop starting"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.check_all_nodes_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("monitoring loop stopped");
    }

    /// Spawn the loop as a background task.
    pub fn spawn(self: Arc<Self>) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });
        MonitorHandle { shutdown_tx, handle }
    }
}

/// Handle to a spawned [`MonitoringLoop`].
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal shutdown and wait up to `join_timeout` for the current tick
    /// to finish. Returns `false` if the task had to be aborted.
    pub async fn stop(mut self, join_timeout: Duration) -> bool {
        let _ = self.shutdown_tx.send(true);
        match tokio::time::timeout(join_timeout, &mut self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, "monitoring loop task failed");
                false
            }
            Err(_) => {
                warn!(?join_timeout, "monitoring loop did not stop in time, aborting");
                self.handle.abort();
                false
            }
        }
    }

    /// Whether the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
