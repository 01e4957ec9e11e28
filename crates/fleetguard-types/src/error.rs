//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Invalid static configuration. Raised at construction or load time,
/// never from inside the control loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    #[error("node id must not be empty")]
    EmptyNodeId,

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("invalid port {port} for node {node_id}")]
    InvalidPort { node_id: String, port: u16 },

    #[error("invalid action {name}: {reason}")]
    InvalidAction { name: String, reason: String },

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: String, reason: String },
}
