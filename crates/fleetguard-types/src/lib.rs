//! fleetguard-types — the shared data model for fleetguard.
//!
//! Every other fleetguard crate speaks in these types:
//!
//! - [`NodeConfig`] / [`RetryPolicy`] / [`SecurityProfile`] — static,
//!   validated-at-construction policy for one monitored node
//! - [`NodeStatus`] — one immutable health observation
//! - [`RecoveryResult`] — one immutable remediation outcome
//! - [`FailureEvent`] / [`RecoveryEvent`] — classified audit records
//!
//! All types are serializable so they can be loaded from TOML and
//! emitted as JSON notification payloads.

pub mod error;
pub mod types;

pub use error::{ConfigError, ConfigResult};
pub use types::*;
