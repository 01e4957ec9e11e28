//! fleetd.toml configuration.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use fleetguard_coordinator::CoordinatorConfig;
use fleetguard_health::{DispatcherConfig, MonitorConfig, MAX_WORKERS};
use fleetguard_types::{validate_nodes, ConfigError, ConfigResult, NodeConfig, NodeRole};

use crate::probes::TCP_METHOD;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub monitor: MonitorSettings,
    pub recovery: RecoverySettings,
    pub actions: Vec<ActionSettings>,
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub interval_secs: u64,
    pub check_timeout_secs: u64,
    pub max_workers: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub history_size: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            check_timeout_secs: 10,
            max_workers: MAX_WORKERS,
            max_retries: 2,
            retry_backoff_ms: 500,
            history_size: 100,
        }
    }
}

impl MonitorSettings {
    /// Loop settings, with the worker count capped at [`MAX_WORKERS`].
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(self.interval_secs),
            max_workers: self.max_workers.min(MAX_WORKERS),
            history_size: self.history_size,
        }
    }

    /// Per-probe timeout and retry settings.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            timeout: Duration::from_secs(self.check_timeout_secs),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub cooldown_secs: u64,
    pub max_concurrent_recoveries: usize,
    pub escalation_cooldown_multiplier: u32,
    /// Recovery results retained per node.
    pub history_size: usize,
    /// Failure and recovery events retained per node.
    pub event_log_size: usize,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        let coordinator = CoordinatorConfig::default();
        Self {
            cooldown_secs: coordinator.cooldown.as_secs(),
            max_concurrent_recoveries: coordinator.max_concurrent_recoveries,
            escalation_cooldown_multiplier: coordinator.escalation_multiplier,
            history_size: fleetguard_recovery::DEFAULT_RECOVERY_HISTORY,
            event_log_size: coordinator.event_log_size,
        }
    }
}

impl RecoverySettings {
    /// Cooldown and concurrency settings for the coordinator.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            cooldown: Duration::from_secs(self.cooldown_secs),
            escalation_multiplier: self.escalation_cooldown_multiplier,
            max_concurrent_recoveries: self.max_concurrent_recoveries,
            event_log_size: self.event_log_size,
        }
    }
}

/// A shell-command recovery action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSettings {
    pub name: String,
    pub command: String,
    /// Roles the action may run against; empty means every role.
    #[serde(default)]
    pub roles: Vec<NodeRole>,
    #[serde(default = "default_action_timeout")]
    pub timeout_secs: u64,
}

fn default_action_timeout() -> u64 {
    120
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidSetting {
        name: name.to_string(),
        reason: reason.into(),
    }
}

impl FleetConfig {
    /// Read, parse, and validate a config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: FleetConfig =
            toml::from_str(&content).with_context(|| format!("failed to parse config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Render the config back to TOML.
    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check tunables and actions, then every node along with the check
    /// methods and actions it refers to.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.monitor.interval_secs == 0 {
            return Err(invalid("monitor.interval_secs", "must be positive"));
        }
        if self.monitor.check_timeout_secs == 0 {
            return Err(invalid("monitor.check_timeout_secs", "must be positive"));
        }
        if self.monitor.max_workers == 0 {
            return Err(invalid("monitor.max_workers", "must be positive"));
        }
        if self.monitor.history_size == 0 {
            return Err(invalid("monitor.history_size", "must be positive"));
        }
        if self.recovery.max_concurrent_recoveries == 0 {
            return Err(invalid("recovery.max_concurrent_recoveries", "must be positive"));
        }
        if self.recovery.escalation_cooldown_multiplier == 0 {
            return Err(invalid("recovery.escalation_cooldown_multiplier", "must be positive"));
        }

        let mut action_names = HashSet::new();
        for action in &self.actions {
            if action.name.trim().is_empty() {
                return Err(invalid("actions.name", "must not be empty"));
            }
            if !action_names.insert(action.name.as_str()) {
                return Err(ConfigError::InvalidAction {
                    name: action.name.clone(),
                    reason: "defined more than once".to_string(),
                });
            }
            if action.command.trim().is_empty() {
                return Err(ConfigError::InvalidAction {
                    name: action.name.clone(),
                    reason: "command must not be empty".to_string(),
                });
            }
            if action.timeout_secs == 0 {
                return Err(ConfigError::InvalidAction {
                    name: action.name.clone(),
                    reason: "timeout_secs must be positive".to_string(),
                });
            }
        }

        validate_nodes(&self.nodes)?;
        for node in &self.nodes {
            if node.check_methods.is_empty() {
                return Err(invalid(&node.node_id, "check_methods must not be empty"));
            }
            if let Some(method) = node.check_methods.iter().find(|m| m.as_str() != TCP_METHOD) {
                return Err(invalid(&node.node_id, format!("unknown check method {method}")));
            }
            if let Some(action) = node
                .recovery_actions
                .iter()
                .find(|a| !action_names.contains(a.as_str()))
            {
                return Err(invalid(&node.node_id, format!("unknown recovery action {action}")));
            }
        }
        Ok(())
    }
}
