//! Recovery engine — retry/backoff state machine and action dispatch.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use fleetguard_types::{ConfigError, ConfigResult, FailureCategory, NodeConfig, RecoveryResult};

use crate::action::{EscalationListener, PluginAction, RecoveryAction, RecoveryPlugin};
use crate::error::{RecoveryError, RecoveryOutcome};
use crate::retry::RetryManager;

/// Recovery results retained per node.
pub const DEFAULT_RECOVERY_HISTORY: usize = 100;

/// A node's active recovery cycle: its retry counter and the results
/// of the attempts made in it.
struct Cycle {
    retry: RetryManager,
    results: Vec<RecoveryResult>,
}

impl Cycle {
    fn new(node: &NodeConfig) -> Self {
        Self {
            retry: RetryManager::new(node.retry_policy),
            results: Vec::new(),
        }
    }
}

/// Runs remediation for failed nodes with per-node exponential backoff.
pub struct RecoveryEngine {
    actions: HashMap<String, Arc<dyn RecoveryAction>>,
    /// Registration order, for the "any action for this role" fallback.
    action_order: Vec<String>,
    plugins: Vec<Arc<dyn RecoveryPlugin>>,
    escalation_listeners: Vec<Arc<dyn EscalationListener>>,
    /// One cycle per node under active recovery.
    cycles: Mutex<HashMap<String, Cycle>>,
    history: Mutex<HashMap<String, VecDeque<RecoveryResult>>>,
    history_size: usize,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryEngine {
    /// Create an engine with no actions, plugins, or listeners.
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
            action_order: Vec::new(),
            plugins: Vec::new(),
            escalation_listeners: Vec::new(),
            cycles: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            history_size: DEFAULT_RECOVERY_HISTORY,
        }
    }

    /// Set how many results are retained per node (at least one).
    pub fn with_history_size(mut self, size: usize) -> Self {
        self.history_size = size.max(1);
        self
    }

    /// Register an action under a name. Rejects actions whose
    /// `validate_config()` fails.
    pub fn register_action(
        &mut self,
        name: impl Into<String>,
        action: Arc<dyn RecoveryAction>,
    ) -> ConfigResult<()> {
        let name = name.into();
        if !action.validate_config() {
            return Err(ConfigError::InvalidAction {
                name,
                reason: "configuration failed validation".to_string(),
            });
        }
        if self.actions.insert(name.clone(), action).is_none() {
            self.action_order.push(name.clone());
        }
        debug!(action = %name, "registered recovery action");
        Ok(())
    }

    /// Builder form of [`register_action`](Self::register_action).
    pub fn with_action(
        mut self,
        name: impl Into<String>,
        action: Arc<dyn RecoveryAction>,
    ) -> ConfigResult<Self> {
        self.register_action(name, action)?;
        Ok(self)
    }

    /// Register a plugin. Plugins are consulted in registration order.
    pub fn register_plugin(&mut self, plugin: Arc<dyn RecoveryPlugin>) {
        debug!(plugin = %plugin.name(), "registered recovery plugin");
        self.plugins.push(plugin);
    }

    /// Builder form of [`register_plugin`](Self::register_plugin).
    pub fn with_plugin(mut self, plugin: Arc<dyn RecoveryPlugin>) -> Self {
        self.register_plugin(plugin);
        self
    }

    /// Register a listener fired when a node exhausts its retries.
    pub fn add_escalation_listener(&mut self, listener: Arc<dyn EscalationListener>) {
        self.escalation_listeners.push(listener);
    }

    /// Builder form of [`add_escalation_listener`](Self::add_escalation_listener).
    pub fn with_escalation_listener(mut self, listener: Arc<dyn EscalationListener>) -> Self {
        self.add_escalation_listener(listener);
        self
    }

    /// Whether an action is registered under `name`.
    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Run one recovery attempt for `node`.
    ///
    /// Waits out the node's backoff delay inline before executing, so the
    /// caller is blocked for up to the policy's `max_delay` plus the
    /// action's own timeout.
    pub async fn execute_recovery(&self, node: &NodeConfig, category: FailureCategory) -> RecoveryOutcome {
        let node_id = node.node_id.as_str();

        let delay = {
            let mut cycles = self.cycles.lock().await;
            let cycle = cycles
                .entry(node_id.to_string())
                .or_insert_with(|| Cycle::new(node));

            if !cycle.retry.should_retry() {
                let attempts = cycle.retry.attempt_count();
                let history = cycles.remove(node_id).map(|c| c.results).unwrap_or_default();
                drop(cycles);
                return Err(self.escalate(node_id, attempts, history).await);
            }
            cycle.retry.next_delay()
        };

        if !delay.is_zero() {
            info!(%node_id, ?delay, "backing off before recovery attempt");
            tokio::time::sleep(delay).await;
        }

        let attempt = {
            let mut cycles = self.cycles.lock().await;
            let cycle = cycles
                .entry(node_id.to_string())
                .or_insert_with(|| Cycle::new(node));
            cycle.retry.record_attempt();
            cycle.retry.attempt_count()
        };

        let Some((action_name, action)) = self.select_action(node, category) else {
            warn!(%node_id, role = %node.role, %category, "no suitable recovery action");
            return Err(RecoveryError::NoSuitableAction {
                node_id: node_id.to_string(),
                category,
            });
        };

        info!(
            %node_id,
            action = %action_name,
            attempt,
            max_attempts = node.retry_policy.max_attempts(),
            estimated_secs = action.estimated_duration().as_secs(),
            "executing recovery action"
        );

        let result = match action.execute(node).await {
            Ok(result) => result,
            Err(e) => {
                warn!(%node_id, action = %action_name, error = %e, "recovery action failed to execute");
                RecoveryResult::failed(node_id, &action_name, format!("{action_name} (not executed)"), format!("{e:#}"))
            }
        };

        self.record(node_id, result.clone()).await;

        if result.success {
            self.cycles.lock().await.remove(node_id);
            info!(%node_id, action = %action_name, attempt, "recovery action succeeded");
        } else {
            if let Some(cycle) = self.cycles.lock().await.get_mut(node_id) {
                cycle.results.push(result.clone());
            }
            warn!(
                %node_id,
                action = %action_name,
                attempt,
                exit_code = result.exit_code,
                stderr = %result.stderr,
                "recovery action failed"
            );
        }

        Ok(result)
    }

    /// Abandon a node's recovery cycle. Returns whether one was active.
    pub async fn cancel_recovery(&self, node_id: &str) -> bool {
        let removed = self.cycles.lock().await.remove(node_id);
        if let Some(mut cycle) = removed {
            cycle.retry.reset();
            info!(%node_id, "recovery cancelled");
            true
        } else {
            false
        }
    }

    /// The most recent `limit` results for a node, oldest first.
    pub async fn history(&self, node_id: &str, limit: usize) -> Vec<RecoveryResult> {
        let history = self.history.lock().await;
        history
            .get(node_id)
            .map(|h| h.iter().skip(h.len().saturating_sub(limit)).cloned().collect())
            .unwrap_or_default()
    }

    /// The node's most recent result, from any cycle.
    pub async fn last_result(&self, node_id: &str) -> Option<RecoveryResult> {
        self.history
            .lock()
            .await
            .get(node_id)
            .and_then(|h| h.back().cloned())
    }

    /// Attempts recorded in the node's active cycle, if one exists.
    pub async fn attempt_count(&self, node_id: &str) -> Option<u32> {
        self.cycles
            .lock()
            .await
            .get(node_id)
            .map(|c| c.retry.attempt_count())
    }

    /// Node ids with an active recovery cycle.
    pub async fn in_flight(&self) -> Vec<String> {
        self.cycles.lock().await.keys().cloned().collect()
    }

    fn select_action(
        &self,
        node: &NodeConfig,
        category: FailureCategory,
    ) -> Option<(String, Arc<dyn RecoveryAction>)> {
        for name in &node.recovery_actions {
            match self.actions.get(name) {
                Some(action) if action.supports_role(node.role) => {
                    return Some((name.clone(), action.clone()));
                }
                Some(_) => {
                    debug!(node_id = %node.node_id, action = %name, role = %node.role, "preferred action does not support role");
                }
                None => {
                    debug!(node_id = %node.node_id, action = %name, "preferred action not registered");
                }
            }
        }

        if let Some(plugin) = self.plugins.iter().find(|p| p.supports_category(category)) {
            let action: Arc<dyn RecoveryAction> = Arc::new(PluginAction::new(plugin.clone(), category));
            return Some((plugin.name().to_string(), action));
        }

        self.action_order.iter().find_map(|name| {
            let action = self.actions.get(name)?;
            action
                .supports_role(node.role)
                .then(|| (name.clone(), action.clone()))
        })
    }

    /// File a result under the node that was acted on.
    async fn record(&self, node_id: &str, result: RecoveryResult) {
        let mut history = self.history.lock().await;
        let entries = history.entry(node_id.to_string()).or_default();
        if entries.len() >= self.history_size {
            entries.pop_front();
        }
        entries.push_back(result);
    }

    /// Fire escalation listeners and build the terminal error. `history`
    /// holds only the results of the cycle being escalated.
    async fn escalate(&self, node_id: &str, attempts: u32, history: Vec<RecoveryResult>) -> RecoveryError {
        error!(%node_id, attempts, results = history.len(), "recovery retries exhausted, escalating");

        for listener in &self.escalation_listeners {
            if let Err(e) = listener.on_escalation(node_id, &history).await {
                error!(%node_id, error = %e, "escalation listener failed");
            }
        }

        RecoveryError::MaxRetriesReached {
            node_id: node_id.to_string(),
            attempts,
            history,
        }
    }
}
