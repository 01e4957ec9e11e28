//! fleetguard-recovery — automated remediation for failed nodes.
//!
//! The [`RecoveryEngine`] keeps one [`RetryManager`] per node that is
//! currently being recovered. Each call waits out the node's backoff,
//! picks an action, runs it, and records the result. When a node's
//! retry budget is spent the engine fires its escalation listeners and
//! returns [`RecoveryError::MaxRetriesReached`].
//!
//! # Action selection
//!
//! 1. the node's preferred actions, in order, that support its role
//! 2. the first plugin that handles the failure category
//! 3. any registered action that supports the node's role
//!
//! Actions and plugins live in registries owned by the engine instance.

pub mod action;
pub mod engine;
pub mod error;
pub mod retry;

pub use action::{EscalationListener, PluginAction, RecoveryAction, RecoveryPlugin};
pub use engine::{RecoveryEngine, DEFAULT_RECOVERY_HISTORY};
pub use error::{RecoveryError, RecoveryOutcome};
pub use retry::RetryManager;
