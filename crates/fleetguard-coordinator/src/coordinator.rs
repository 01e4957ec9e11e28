//! Failure/recovery coordinator.
//!
//! Receives health transitions from the monitoring loop, decides
//! whether a failing node should be remediated, runs the attempt through
//! the recovery executor, and records and announces the outcome.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use fleetguard_health::{StatusDiff, TransitionHandler};
use fleetguard_recovery::RecoveryError;
use fleetguard_types::{
    epoch_secs, FailureCategory, FailureEvent, NodeConfig, NodeStatus, RecoveryEvent, RecoveryResult,
};

use crate::classifier::FailureClassifier;
use crate::executor::RecoveryExecutor;
use crate::notify::Notifier;

/// Coordinator tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorConfig {
    /// Cooldown after a confirmed recovery.
    pub cooldown: Duration,
    /// Escalation cooldown is `cooldown × escalation_multiplier`.
    pub escalation_multiplier: u32,
    /// Nodes allowed in `Recovering` at once.
    pub max_concurrent_recoveries: usize,
    /// Failure and recovery events retained per node.
    pub event_log_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(300),
            escalation_multiplier: 3,
            max_concurrent_recoveries: 3,
            event_log_size: 50,
        }
    }
}

impl CoordinatorConfig {
    /// Cooldown applied after an escalation.
    pub fn escalation_cooldown(&self) -> Duration {
        self.cooldown * self.escalation_multiplier
    }
}

/// Where a node currently sits in the coordinator's state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum NodePhase {
    Idle,
    Recovering {
        category: FailureCategory,
        attempts: u32,
    },
    Cooldown {
        remaining: Duration,
        extended: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    Cooldown,
    ConcurrencyLimit,
}

/// What the coordinator did with one unhealthy observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    Suppressed(SuppressReason),
    /// A recovery attempt ran.
    Attempted { success: bool },
    /// Retries were exhausted; the node is in extended cooldown.
    Escalated,
    /// No action could handle the node; it stays in `Recovering` so the
    /// retry budget still runs out and escalates.
    NoAction,
}

/// Aggregate counters for observability.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoordinatorStats {
    pub total_failures: u64,
    pub total_attempts: u64,
    pub total_recoveries: u64,
    pub total_escalations: u64,
    pub suppressed_cooldown: u64,
    pub suppressed_concurrency: u64,
    /// Recoveries over (recoveries + escalations); 0 before any outcome.
    pub success_rate: f64,
    pub failures_by_category: BTreeMap<FailureCategory, u64>,
}

struct ActiveRecovery {
    category: FailureCategory,
    detected: Instant,
    detected_at: u64,
    /// Attempts that produced a result in this cycle.
    attempts: u32,
    results: Vec<RecoveryResult>,
    last_error: Option<String>,
}

impl ActiveRecovery {
    /// The cycle used its whole budget and the last attempt reported
    /// success, so the executor holds no retry state that could still
    /// escalate the node.
    fn exhausted_after_success(&self, max_attempts: u32) -> bool {
        self.attempts >= max_attempts && self.results.last().is_some_and(|r| r.success)
    }
}

struct Cooldown {
    until: Instant,
    extended: bool,
}

#[derive(Default)]
struct CoordinatorState {
    recovering: HashMap<String, ActiveRecovery>,
    cooldowns: HashMap<String, Cooldown>,
    failure_log: HashMap<String, VecDeque<FailureEvent>>,
    recovery_log: HashMap<String, VecDeque<RecoveryEvent>>,
    stats: CoordinatorStats,
}

impl CoordinatorState {
    fn cooldown_remaining(&mut self, node_id: &str, now: Instant) -> Option<(Duration, bool)> {
        let cooldown = self.cooldowns.get(node_id)?;
        if now >= cooldown.until {
            self.cooldowns.remove(node_id);
            return None;
        }
        Some((cooldown.until - now, cooldown.extended))
    }
}

fn push_bounded<T>(log: &mut HashMap<String, VecDeque<T>>, node_id: &str, event: T, cap: usize) {
    let entries = log.entry(node_id.to_string()).or_default();
    if entries.len() >= cap {
        entries.pop_front();
    }
    entries.push_back(event);
}

/// Wires health transitions to recovery, cooldowns, and notifications.
///
/// All state sits behind one mutex so administrative calls from other
/// tasks are safe alongside the monitoring loop. The mutex is never held
/// across a recovery attempt or a notifier call.
pub struct Coordinator {
    executor: Arc<dyn RecoveryExecutor>,
    classifier: FailureClassifier,
    notifiers: Vec<Arc<dyn Notifier>>,
    state: Mutex<CoordinatorState>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Create a coordinator with no notifiers.
    pub fn new(executor: Arc<dyn RecoveryExecutor>, config: CoordinatorConfig) -> Self {
        Self {
            executor,
            classifier: FailureClassifier::new(),
            notifiers: Vec::new(),
            state: Mutex::new(CoordinatorState::default()),
            config,
        }
    }

    /// Register a notifier. Notifiers are called in registration order.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Active tunables.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Handle an unhealthy observation of `node`.
    pub async fn on_node_failed(&self, node: &NodeConfig, status: &NodeStatus) -> FailureDisposition {
        let node_id = node.node_id.as_str();
        let now = Instant::now();

        let (category, new_failure) = {
            let mut state = self.state.lock().await;

            if let Some((remaining, extended)) = state.cooldown_remaining(node_id, now) {
                state.stats.suppressed_cooldown += 1;
                debug!(%node_id, remaining_secs = remaining.as_secs(), extended, "failure suppressed: node in cooldown");
                return FailureDisposition::Suppressed(SuppressReason::Cooldown);
            }

            if let Some(active) = state.recovering.get_mut(node_id) {
                if status.error_message.is_some() {
                    active.last_error = status.error_message.clone();
                }
                if active.exhausted_after_success(node.retry_policy.max_attempts()) {
                    let history = active.results.clone();
                    drop(state);
                    warn!(%node_id, attempts = history.len(), "node still unhealthy after successful recovery actions");
                    self.escalate(node, history).await;
                    return FailureDisposition::Escalated;
                }
                (active.category, None)
            } else {
                let recovering = state.recovering.len();
                if recovering >= self.config.max_concurrent_recoveries {
                    state.stats.suppressed_concurrency += 1;
                    info!(
                        %node_id,
                        recovering,
                        limit = self.config.max_concurrent_recoveries,
                        "failure suppressed: concurrent recovery limit reached"
                    );
                    return FailureDisposition::Suppressed(SuppressReason::ConcurrencyLimit);
                }

                let category = self.classifier.classify(status);
                let event = FailureEvent {
                    node_id: node_id.to_string(),
                    category,
                    status: status.clone(),
                    recommended_actions: self.classifier.recommended_actions(category, node.role),
                    detected_at: epoch_secs(),
                };

                push_bounded(&mut state.failure_log, node_id, event.clone(), self.config.event_log_size);
                state.stats.total_failures += 1;
                *state.stats.failures_by_category.entry(category).or_default() += 1;
                state.recovering.insert(
                    node_id.to_string(),
                    ActiveRecovery {
                        category,
                        detected: now,
                        detected_at: event.detected_at,
                        attempts: 0,
                        results: Vec::new(),
                        last_error: status.error_message.clone(),
                    },
                );
                (category, Some(event))
            }
        };

        if let Some(event) = new_failure {
            warn!(
                %node_id,
                %category,
                priority = self.classifier.priority(category),
                recommended = ?event.recommended_actions,
                "node failure detected, starting recovery"
            );
            for notifier in &self.notifiers {
                if let Err(e) = notifier.on_failure(node, &event).await {
                    error!(%node_id, notifier = notifier.name(), error = %e, "failure notification failed");
                }
            }
        }

        match self.executor.execute(node, category).await {
            Ok(result) => {
                let mut state = self.state.lock().await;
                state.stats.total_attempts += 1;
                if let Some(active) = state.recovering.get_mut(node_id) {
                    active.attempts += 1;
                    active.results.push(result.clone());
                }
                FailureDisposition::Attempted {
                    success: result.success,
                }
            }
            Err(RecoveryError::MaxRetriesReached { history, .. }) => {
                self.escalate(node, history).await;
                FailureDisposition::Escalated
            }
            Err(e @ RecoveryError::NoSuitableAction { .. }) => {
                error!(%node_id, error = %e, "cannot remediate node");
                FailureDisposition::NoAction
            }
        }
    }

    /// Handle an unhealthy → healthy flip. Returns the recovery event if
    /// the node was under recovery and its latest attempt succeeded.
    pub async fn on_node_recovered(&self, node: &NodeConfig, _status: &NodeStatus) -> Option<RecoveryEvent> {
        let node_id = node.node_id.as_str();
        let active = self.state.lock().await.recovering.remove(node_id)?;

        let result = self
            .executor
            .last_result(node_id)
            .await
            .filter(|r| r.success && r.executed_at >= active.detected_at);

        let Some(result) = result else {
            self.executor.cancel(node_id).await;
            info!(%node_id, attempts = active.attempts, "node healthy again without a successful remediation");
            return None;
        };

        let downtime = active.detected.elapsed();
        let event = RecoveryEvent {
            node_id: node_id.to_string(),
            category: active.category,
            result: result.clone(),
            downtime,
            total_attempts: active.attempts,
            recovered_at: epoch_secs(),
        };

        {
            let mut state = self.state.lock().await;
            push_bounded(&mut state.recovery_log, node_id, event.clone(), self.config.event_log_size);
            state.stats.total_recoveries += 1;
            state.cooldowns.insert(
                node_id.to_string(),
                Cooldown {
                    until: Instant::now() + self.config.cooldown,
                    extended: false,
                },
            );
        }

        info!(
            %node_id,
            action = %result.action_type,
            attempts = active.attempts,
            downtime_secs = downtime.as_secs(),
            cooldown_secs = self.config.cooldown.as_secs(),
            "node recovered"
        );

        let failed_attempts = active.attempts.saturating_sub(1);
        for notifier in &self.notifiers {
            if let Err(e) = notifier.on_recovery(node, &result, downtime, failed_attempts).await {
                error!(%node_id, notifier = notifier.name(), error = %e, "recovery notification failed");
            }
        }

        Some(event)
    }

    async fn escalate(&self, node: &NodeConfig, history: Vec<RecoveryResult>) {
        let node_id = node.node_id.as_str();
        let cooldown = self.config.escalation_cooldown();

        let last_error = {
            let mut state = self.state.lock().await;
            let active = state.recovering.remove(node_id);
            state.stats.total_escalations += 1;
            state.cooldowns.insert(
                node_id.to_string(),
                Cooldown {
                    until: Instant::now() + cooldown,
                    extended: true,
                },
            );
            active
                .and_then(|a| a.last_error)
                .or_else(|| history.last().map(|r| r.stderr.clone()).filter(|s| !s.is_empty()))
        };

        error!(
            %node_id,
            attempts = history.len(),
            cooldown_secs = cooldown.as_secs(),
            last_error = last_error.as_deref().unwrap_or(""),
            "recovery escalated to operator"
        );

        for notifier in &self.notifiers {
            if let Err(e) = notifier.on_escalation(node, &history, last_error.as_deref()).await {
                error!(%node_id, notifier = notifier.name(), error = %e, "escalation notification failed");
            }
        }
    }

    /// Current phase of a node. Expired cooldowns read as `Idle`.
    pub async fn phase(&self, node_id: &str) -> NodePhase {
        let mut state = self.state.lock().await;
        if let Some(active) = state.recovering.get(node_id) {
            return NodePhase::Recovering {
                category: active.category,
                attempts: active.attempts,
            };
        }
        match state.cooldown_remaining(node_id, Instant::now()) {
            Some((remaining, extended)) => NodePhase::Cooldown { remaining, extended },
            None => NodePhase::Idle,
        }
    }

    /// Time left on a node's cooldown, if one is active.
    pub async fn cooldown_remaining(&self, node_id: &str) -> Option<Duration> {
        self.state
            .lock()
            .await
            .cooldown_remaining(node_id, Instant::now())
            .map(|(remaining, _)| remaining)
    }

    /// Operator override: end a node's cooldown now.
    pub async fn clear_cooldown(&self, node_id: &str) -> bool {
        let cleared = self.state.lock().await.cooldowns.remove(node_id).is_some();
        if cleared {
            info!(%node_id, "cooldown cleared");
        }
        cleared
    }

    /// Operator override: stop tracking a node's recovery and discard its
    /// retry state.
    pub async fn cancel_recovery(&self, node_id: &str) -> bool {
        let was_recovering = self.state.lock().await.recovering.remove(node_id).is_some();
        let had_retry_state = self.executor.cancel(node_id).await;
        if was_recovering {
            info!(%node_id, "recovery tracking cancelled");
        }
        was_recovering || had_retry_state
    }

    /// Ids of nodes in `Recovering`, sorted.
    pub async fn recovering_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<_> = self.state.lock().await.recovering.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    /// Retained failure events for a node, oldest first.
    pub async fn failure_events(&self, node_id: &str) -> Vec<FailureEvent> {
        self.state
            .lock()
            .await
            .failure_log
            .get(node_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Retained recovery events for a node, oldest first.
    pub async fn recovery_events(&self, node_id: &str) -> Vec<RecoveryEvent> {
        self.state
            .lock()
            .await
            .recovery_log
            .get(node_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the aggregate counters.
    pub async fn stats(&self) -> CoordinatorStats {
        let mut stats = self.state.lock().await.stats.clone();
        let outcomes = stats.total_recoveries + stats.total_escalations;
        stats.success_rate = if outcomes == 0 {
            0.0
        } else {
            stats.total_recoveries as f64 / outcomes as f64
        };
        stats
    }
}

#[async_trait]
impl TransitionHandler for Coordinator {
    async fn on_unhealthy(&self, node: &NodeConfig, status: &NodeStatus, _diff: &StatusDiff) {
        self.on_node_failed(node, status).await;
    }

    async fn on_healthy(&self, node: &NodeConfig, status: &NodeStatus, _diff: &StatusDiff) {
        self.on_node_recovered(node, status).await;
    }
}
