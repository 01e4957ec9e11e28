//! fleetguard-coordinator — turns health transitions into remediation.
//!
//! The [`Coordinator`] sits between the monitoring loop and the recovery
//! engine. Per node it walks
//!
//! ```text
//! Idle → FailureDetected → Recovering → Cooldown (short | extended) → Idle
//! ```
//!
//! classifying failures, suppressing nodes in cooldown or beyond the
//! concurrent-recovery ceiling, keeping bounded failure/recovery event
//! logs, and fanning outcomes out to registered [`Notifier`]s.
//!
//! Recovery runs inline in the failure path of the tick that observed
//! it, behind the [`RecoveryExecutor`] seam.

pub mod classifier;
pub mod coordinator;
pub mod executor;
pub mod notify;

pub use classifier::{FailureClassifier, SLOW_RESPONSE_THRESHOLD};
pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorStats, FailureDisposition, NodePhase, SuppressReason,
};
pub use executor::RecoveryExecutor;
pub use notify::Notifier;
