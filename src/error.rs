//! Error taxonomy for the keeper core
//!
//! Three fallible classes plus one non-error: `Input` (programmer-caused,
//! never retried), `DataUnavailable` (this cycle's reads failed; the schedule
//! retries naturally), and `Action` (a dispatched corrective action failed).
//! Cross-validation failure is *not* an error here - it is an ordinary
//! `ValidationResult` with `is_valid = false` that callers must treat as a
//! safety rejection.

use std::fmt;
use thiserror::Error;

/// Best-effort classification of an execution failure, derived from the
/// collaborator's error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionFailureKind {
    /// Wallet is not the vault's authorized keeper
    NotAuthorized,
    /// Not enough balance to cover gas
    InsufficientFunds,
    Other,
}

impl ActionFailureKind {
    /// Inspect an executor error message for known failure substrings.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("keeper") || lower.contains("unauthorized") {
            ActionFailureKind::NotAuthorized
        } else if lower.contains("insufficient funds") || lower.contains("insufficient balance") {
            ActionFailureKind::InsufficientFunds
        } else {
            ActionFailureKind::Other
        }
    }
}

impl fmt::Display for ActionFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionFailureKind::NotAuthorized => write!(f, "NOT_AUTHORIZED"),
            ActionFailureKind::InsufficientFunds => write!(f, "INSUFFICIENT_FUNDS"),
            ActionFailureKind::Other => write!(f, "OTHER"),
        }
    }
}

/// Errors surfaced by the decision engine
#[derive(Debug, Error)]
pub enum KeeperError {
    /// Malformed or insufficient arguments to a validator function
    #[error("invalid input: {0}")]
    Input(String),

    /// A price or chain read could not be obtained this cycle
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// The corrective action was dispatched but failed
    #[error("action failed ({kind}): {message}")]
    Action {
        kind: ActionFailureKind,
        message: String,
    },
}

impl KeeperError {
    pub fn action(message: impl Into<String>) -> Self {
        let message = message.into();
        KeeperError::Action {
            kind: ActionFailureKind::classify(&message),
            message,
        }
    }
}
