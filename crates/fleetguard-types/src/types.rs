//! Domain types for fleetguard.
//!
//! Nodes and policies are static configuration; statuses, recovery
//! results, and events are immutable records that are appended to
//! bounded histories and never mutated.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Unique identifier for a monitored node.
pub type NodeId = String;

/// `method_used` of a status produced after every check method was exhausted.
pub const METHOD_FAILED: &str = "failed";

/// `method_used` of a status produced when a node's check could not run at all.
pub const METHOD_ERROR: &str = "error";

// ── Node ──────────────────────────────────────────────────────────

/// Role a node plays in the messaging cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// A message broker.
    Broker,
    /// A coordination-service member.
    Coordinator,
}

impl NodeRole {
    /// Config and log name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broker => "broker",
            Self::Coordinator => "coordinator",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque connection parameters (TLS material paths, auth tokens, ...)
/// handed through to check strategies and recovery actions.
///
/// The core never inspects the values. `Debug` prints keys only.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityProfile(BTreeMap<String, String>);

impl SecurityProfile {
    /// Create an empty profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether the profile has no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecurityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

/// Identity and static policy for one monitored node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: NodeId,
    pub role: NodeRole,
    pub host: String,
    /// Primary service port.
    pub port: u16,
    /// Management-protocol port, if the node exposes one.
    #[serde(default)]
    pub management_port: Option<u16>,
    /// Check-method names, tried in order.
    #[serde(default)]
    pub check_methods: Vec<String>,
    /// Preferred recovery-action names, tried in order.
    #[serde(default)]
    pub recovery_actions: Vec<String>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    #[serde(default)]
    pub security: SecurityProfile,
}

impl NodeConfig {
    /// Create a node with no check methods, no preferred actions, and
    /// the default retry policy.
    pub fn new(node_id: impl Into<String>, role: NodeRole, host: impl Into<String>, port: u16) -> Self {
        Self {
            node_id: node_id.into(),
            role,
            host: host.into(),
            port,
            management_port: None,
            check_methods: Vec::new(),
            recovery_actions: Vec::new(),
            retry_policy: RetryPolicy::default(),
            security: SecurityProfile::default(),
        }
    }

    /// Set the check methods, tried in order.
    pub fn with_check_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Set the preferred recovery actions, tried in order.
    pub fn with_recovery_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recovery_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Set the recovery retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the management-protocol port.
    pub fn with_management_port(mut self, port: u16) -> Self {
        self.management_port = Some(port);
        self
    }

    /// Set the connection parameters.
    pub fn with_security(mut self, security: SecurityProfile) -> Self {
        self.security = security;
        self
    }

    /// `host:port` of the primary service.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the node in isolation.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::EmptyNodeId);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort {
                node_id: self.node_id.clone(),
                port: self.port,
            });
        }
        if self.management_port == Some(0) {
            return Err(ConfigError::InvalidPort {
                node_id: self.node_id.clone(),
                port: 0,
            });
        }
        Ok(())
    }
}

/// Validate a cluster's node set: each node individually, plus
/// `node_id` uniqueness.
pub fn validate_nodes(nodes: &[NodeConfig]) -> ConfigResult<()> {
    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        node.validate()?;
        if !seen.insert(node.node_id.as_str()) {
            return Err(ConfigError::DuplicateNode(node.node_id.clone()));
        }
    }
    Ok(())
}

// ── Retry policy ──────────────────────────────────────────────────

/// Exponential backoff policy for a node's recovery attempts.
///
/// Immutable once constructed; every constructor validates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRetryPolicy", into = "RawRetryPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. Fails unless `max_attempts >= 1`,
    /// `backoff_multiplier >= 1.0` and `max_delay >= initial_delay`.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
        max_delay: Duration,
    ) -> ConfigResult<Self> {
        if max_attempts < 1 {
            return Err(ConfigError::InvalidRetryPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidRetryPolicy(format!(
                "backoff_multiplier must be >= 1.0, got {backoff_multiplier}"
            )));
        }
        if max_delay < initial_delay {
            return Err(ConfigError::InvalidRetryPolicy(format!(
                "max_delay ({max_delay:?}) must be >= initial_delay ({initial_delay:?})"
            )));
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
            max_delay,
        })
    }

    /// Attempts allowed per recovery cycle.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before the second attempt.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Growth factor applied to the delay after each attempt.
    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Upper bound on any single delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

/// On-disk shape of a [`RetryPolicy`]; delays in (fractional) seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RawRetryPolicy {
    max_attempts: u32,
    initial_delay_secs: f64,
    backoff_multiplier: f64,
    max_delay_secs: f64,
}

impl Default for RawRetryPolicy {
    fn default() -> Self {
        RetryPolicy::default().into()
    }
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(raw: RawRetryPolicy) -> ConfigResult<Self> {
        let initial_delay = secs_to_duration("initial_delay_secs", raw.initial_delay_secs)?;
        let max_delay = secs_to_duration("max_delay_secs", raw.max_delay_secs)?;
        RetryPolicy::new(raw.max_attempts, initial_delay, raw.backoff_multiplier, max_delay)
    }
}

impl From<RetryPolicy> for RawRetryPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_secs: policy.initial_delay.as_secs_f64(),
            backoff_multiplier: policy.backoff_multiplier,
            max_delay_secs: policy.max_delay.as_secs_f64(),
        }
    }
}

fn secs_to_duration(field: &str, secs: f64) -> ConfigResult<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        ConfigError::InvalidRetryPolicy(format!("{field} must be a non-negative number, got {secs}"))
    })
}

// ── Health status ─────────────────────────────────────────────────

/// A point-in-time health observation of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub is_healthy: bool,
    /// Unix timestamp (seconds) of the observation.
    pub checked_at: u64,
    /// End-to-end check latency, including retries.
    pub latency: Duration,
    pub error_message: Option<String>,
    /// Check method that produced the verdict, or [`METHOD_FAILED`] /
    /// [`METHOD_ERROR`].
    pub method_used: String,
}

impl NodeStatus {
    /// A healthy observation made by `method`.
    pub fn healthy(node_id: impl Into<String>, method: impl Into<String>, latency: Duration) -> Self {
        Self {
            node_id: node_id.into(),
            is_healthy: true,
            checked_at: epoch_secs(),
            latency,
            error_message: None,
            method_used: method.into(),
        }
    }

    /// An unhealthy observation carrying the error that explains it.
    pub fn unhealthy(
        node_id: impl Into<String>,
        method: impl Into<String>,
        latency: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            is_healthy: false,
            checked_at: epoch_secs(),
            latency,
            error_message: Some(error.into()),
            method_used: method.into(),
        }
    }
}

// ── Recovery ──────────────────────────────────────────────────────

/// Outcome of one remediation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub node_id: NodeId,
    pub action_type: String,
    /// Human-readable description of what ran.
    pub command_executed: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Unix timestamp (seconds) when the attempt finished.
    pub executed_at: u64,
    pub success: bool,
}

impl RecoveryResult {
    /// A failed result for an attempt that errored before producing output.
    pub fn failed(
        node_id: impl Into<String>,
        action_type: impl Into<String>,
        command_executed: impl Into<String>,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            action_type: action_type.into(),
            command_executed: command_executed.into(),
            exit_code: -1,
            stdout: String::new(),
            stderr: error.to_string(),
            executed_at: epoch_secs(),
            success: false,
        }
    }
}

/// Coarse classification of an unhealthy observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Timeout,
    Authentication,
    ServiceUnavailable,
    ResourceExhaustion,
    NetworkUnreachable,
    ManagementConnection,
    CoordinationService,
    HealthCheckFailure,
}

impl FailureCategory {
    /// Every category, in declaration order.
    pub const ALL: [FailureCategory; 8] = [
        Self::Timeout,
        Self::Authentication,
        Self::ServiceUnavailable,
        Self::ResourceExhaustion,
        Self::NetworkUnreachable,
        Self::ManagementConnection,
        Self::CoordinationService,
        Self::HealthCheckFailure,
    ];

    /// Serialized and log name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Authentication => "authentication",
            Self::ServiceUnavailable => "service_unavailable",
            Self::ResourceExhaustion => "resource_exhaustion",
            Self::NetworkUnreachable => "network_unreachable",
            Self::ManagementConnection => "management_connection",
            Self::CoordinationService => "coordination_service",
            Self::HealthCheckFailure => "health_check_failure",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Events ────────────────────────────────────────────────────────

/// A classified failure observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub node_id: NodeId,
    pub category: FailureCategory,
    pub status: NodeStatus,
    /// Ranked remediation names for this category and the node's role.
    pub recommended_actions: Vec<String>,
    /// Unix timestamp (seconds) when the failure was detected.
    pub detected_at: u64,
}

/// A confirmed recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryEvent {
    pub node_id: NodeId,
    pub category: FailureCategory,
    /// The attempt that brought the node back.
    pub result: RecoveryResult,
    /// Time from failure detection to confirmed recovery.
    pub downtime: Duration,
    /// Recovery attempts in this cycle, including the successful one.
    pub total_attempts: u32,
    /// Unix timestamp (seconds) when recovery was confirmed.
    pub recovered_at: u64,
}

/// Current Unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
