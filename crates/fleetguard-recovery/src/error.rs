//! Recovery error types.

use thiserror::Error;

use fleetguard_types::{FailureCategory, RecoveryResult};

/// Terminal recovery conditions that need an operator, as opposed to a
/// failed attempt (which is an `Ok` result with `success == false`).
#[derive(Debug, Clone, Error)]
pub enum RecoveryError {
    #[error("max retries reached for {node_id} after {attempts} attempts")]
    MaxRetriesReached {
        node_id: String,
        attempts: u32,
        /// Results of the attempts in the exhausted cycle, oldest first.
        history: Vec<RecoveryResult>,
    },

    #[error("no suitable action for {node_id} (category {category})")]
    NoSuitableAction {
        node_id: String,
        category: FailureCategory,
    },
}

pub type RecoveryOutcome = Result<RecoveryResult, RecoveryError>;
