//! Error types for the Safe cosigner

use thiserror::Error;

/// Main error type surfaced by the coordinator to its callers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No active transaction, build one first")]
    NoActiveTransaction,

    #[error("Signature was produced for {submitted}, current commitment is {current}")]
    StaleCommitment { submitted: String, current: String },

    #[error("Threshold not met: {collected} of {required} approvals")]
    ThresholdNotMet { required: usize, collected: usize },

    #[error("Execution already in progress")]
    AlreadyExecuting,

    #[error("Transaction already submitted{}", submitted_suffix(.external_tx_id))]
    AlreadySubmitted { external_tx_id: Option<String> },

    #[error("Broadcast failed{}: {reason}", unknown_marker(.outcome_unknown))]
    BroadcastFailed {
        reason: String,
        outcome_unknown: bool,
    },

    #[error("Previous broadcast outcome is unknown, verify on chain and retry with force")]
    OutcomeUnknown,

    #[error("Account resolution error: {0}")]
    Resolution(String),

    #[error("Commitment hash unavailable: {0}")]
    HashUnavailable(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Check if the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Resolution(_)
                | CoordinatorError::HashUnavailable(_)
                | CoordinatorError::Timeout { .. }
                | CoordinatorError::AlreadyExecuting
                | CoordinatorError::BroadcastFailed {
                    outcome_unknown: false,
                    ..
                }
        )
    }

    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorError::Validation(_) => "validation_error",
            CoordinatorError::NoActiveTransaction => "no_active_transaction",
            CoordinatorError::StaleCommitment { .. } => "stale_commitment",
            CoordinatorError::ThresholdNotMet { .. } => "threshold_not_met",
            CoordinatorError::AlreadyExecuting => "already_executing",
            CoordinatorError::AlreadySubmitted { .. } => "already_submitted",
            CoordinatorError::BroadcastFailed { .. } => "broadcast_failed",
            CoordinatorError::OutcomeUnknown => "outcome_unknown",
            CoordinatorError::Resolution(_) => "resolution_error",
            CoordinatorError::HashUnavailable(_) => "hash_unavailable",
            CoordinatorError::Timeout { .. } => "timeout",
            CoordinatorError::Storage(_) => "storage_error",
            CoordinatorError::Config(_) => "config_error",
            CoordinatorError::Internal(_) => "internal_error",
        }
    }
}

impl From<sqlx::Error> for CoordinatorError {
    fn from(e: sqlx::Error) -> Self {
        CoordinatorError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for CoordinatorError {
    fn from(e: std::io::Error) -> Self {
        CoordinatorError::Storage(e.to_string())
    }
}

fn submitted_suffix(external_tx_id: &Option<String>) -> String {
    external_tx_id
        .as_ref()
        .map(|id| format!(" as {}", id))
        .unwrap_or_default()
}

fn unknown_marker(outcome_unknown: &bool) -> &'static str {
    if *outcome_unknown {
        " (outcome unknown)"
    } else {
        ""
    }
}

/// Errors reported by external collaborators (hasher, verifier, resolver, broadcaster)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    /// The signature blob does not verify against the commitment
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Transport or availability failure
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// The remote side answered but refused the request (e.g. on-chain revert)
    #[error("rejected: {0}")]
    Rejected(String),

    /// Input or response could not be decoded
    #[error("malformed data: {0}")]
    Malformed(String),
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
