//! Health check dispatch — runs a node's check methods with timeout and
//! retry, and fans whole-cluster checks out over a bounded worker pool.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use fleetguard_types::{METHOD_ERROR, METHOD_FAILED, NodeConfig, NodeStatus};

use crate::strategy::{CheckStrategy, ProbeError};

/// Hard ceiling on nodes checked concurrently.
pub const MAX_WORKERS: usize = 10;

/// Dispatcher tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatcherConfig {
    /// Per-probe timeout.
    pub timeout: Duration,
    /// Extra attempts per check method after the first.
    pub max_retries: u32,
    /// Linear backoff unit: attempt `n` waits `retry_backoff × n`.
    pub retry_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// A node's check methods, looked up once before dispatch.
type ResolvedMethods = Vec<(String, Option<Arc<dyn CheckStrategy>>)>;

/// Runs registered check strategies against nodes.
///
/// The registry is owned by the dispatcher instance, so independent
/// clusters in one process never share strategies.
#[derive(Clone, Default)]
pub struct HealthCheckDispatcher {
    strategies: HashMap<String, Arc<dyn CheckStrategy>>,
    config: DispatcherConfig,
}

impl HealthCheckDispatcher {
    /// Create a dispatcher with an empty strategy registry.
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            strategies: HashMap::new(),
            config,
        }
    }

    /// Register a strategy under a check-method name (builder form).
    pub fn with_strategy(mut self, name: impl Into<String>, strategy: Arc<dyn CheckStrategy>) -> Self {
        self.register(name, strategy);
        self
    }

    /// Register a strategy, replacing any previous one with the same name.
    pub fn register(&mut self, name: impl Into<String>, strategy: Arc<dyn CheckStrategy>) {
        let name = name.into();
        if self.strategies.insert(name.clone(), strategy).is_some() {
            debug!(method = %name, "replaced check strategy");
        }
    }

    /// Whether a strategy is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Timeout and retry settings applied to every probe.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Check a single node, trying its methods in order.
    ///
    /// Always returns a status; probe failures become an unhealthy
    /// status with `method_used = "failed"`.
    pub async fn check_one(&self, node: &NodeConfig, timeout: Duration) -> NodeStatus {
        let config = DispatcherConfig {
            timeout,
            ..self.config
        };
        check_node(node, &self.resolve(node), config).await
    }

    /// Check every node concurrently with at most
    /// `min(nodes.len(), max_workers, MAX_WORKERS)` checks in flight.
    ///
    /// Returns exactly one status per input node, in completion order.
    pub async fn check_all(&self, nodes: &[NodeConfig], max_workers: usize) -> Vec<NodeStatus> {
        if nodes.is_empty() {
            return Vec::new();
        }

        let workers = max_workers.clamp(1, MAX_WORKERS).min(nodes.len());
        let permits = Arc::new(Semaphore::new(workers));
        let mut pending: HashSet<String> = HashSet::with_capacity(nodes.len());
        let mut set = JoinSet::new();

        for node in nodes {
            pending.insert(node.node_id.clone());
            let node = node.clone();
            let methods = self.resolve(&node);
            let config = self.config;
            let permits = permits.clone();

            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let started = Instant::now();
                let node_id = node.node_id.clone();

                // The check runs in its own task so a panicking strategy
                // surfaces here as a JoinError instead of unwinding the pool.
                let check = tokio::spawn(async move { check_node(&node, &methods, config).await });
                match check.await {
                    Ok(status) => status,
                    Err(e) => {
                        error!(%node_id, error = %e, "health check task failed");
                        NodeStatus::unhealthy(
                            node_id,
                            METHOD_ERROR,
                            started.elapsed(),
                            format!("health check failed to execute: {e}"),
                        )
                    }
                }
            });
        }

        let mut statuses = Vec::with_capacity(nodes.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(status) => {
                    pending.remove(&status.node_id);
                    statuses.push(status);
                }
                Err(e) => error!(error = %e, "health check worker failed"),
            }
        }

        for node_id in pending {
            statuses.push(NodeStatus::unhealthy(
                node_id,
                METHOD_ERROR,
                Duration::ZERO,
                "health check worker failed",
            ));
        }

        statuses
    }

    fn resolve(&self, node: &NodeConfig) -> ResolvedMethods {
        node.check_methods
            .iter()
            .map(|name| (name.clone(), self.strategies.get(name).cloned()))
            .collect()
    }
}

/// Try each method in order; the first verdict wins. Falls through to
/// the next method only when the current one is unregistered, does not
/// support the node's role, or exhausts its retries.
async fn check_node(node: &NodeConfig, methods: &ResolvedMethods, config: DispatcherConfig) -> NodeStatus {
    let started = Instant::now();
    let mut last_error: Option<String> = None;

    for (method, strategy) in methods {
        let Some(strategy) = strategy else {
            debug!(node_id = %node.node_id, %method, "check method not registered, skipping");
            continue;
        };
        if !strategy.supports_role(node.role) {
            debug!(node_id = %node.node_id, %method, role = %node.role, "check method does not support role, skipping");
            continue;
        }

        for attempt in 0..=config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(config.retry_backoff * attempt).await;
            }

            let probe = tokio::time::timeout(config.timeout, strategy.check_health(node, config.timeout)).await;
            match probe {
                Ok(Ok(true)) => {
                    return NodeStatus::healthy(&node.node_id, method, started.elapsed());
                }
                Ok(Ok(false)) => {
                    return NodeStatus::unhealthy(
                        &node.node_id,
                        method,
                        started.elapsed(),
                        format!("{method} check reported node unhealthy"),
                    );
                }
                Ok(Err(e)) => {
                    debug!(node_id = %node.node_id, %method, attempt, error = %e, "health probe failed");
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    debug!(node_id = %node.node_id, %method, attempt, "health probe timed out");
                    last_error = Some(ProbeError::Timeout(config.timeout).to_string());
                }
            }
        }

        warn!(
            node_id = %node.node_id,
            %method,
            attempts = config.max_retries + 1,
            "check method exhausted retries"
        );
    }

    NodeStatus::unhealthy(
        &node.node_id,
        METHOD_FAILED,
        started.elapsed(),
        last_error.unwrap_or_else(|| "no health check methods available".to_string()),
    )
}
