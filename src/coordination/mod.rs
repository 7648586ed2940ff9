//! Execution coordination for multi-party approved transactions
//!
//! The coordinator:
//! 1. Builds a transaction record and requests its commitment hash
//! 2. Collects approvals into the signature ledger
//! 3. Re-evaluates the threshold gate after every change
//! 4. Broadcasts at most once per record when the gate passes

pub mod cycle;
pub mod engine;

pub use cycle::{Cycle, ExecutionState};
pub use engine::{
    ApprovalSubmission, BuildOutcome, Coordinator, CoordinatorOptions, ExecutionReport,
    RetryReport, StatusReport,
};

use crate::error::CollaboratorError;
use crate::ledger::CountedApproval;
use crate::record::TransactionRecord;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of handing an approved record to the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReceipt {
    pub external_tx_id: Option<String>,
    pub confirmed: bool,
}

/// Submits an approved record together with its counted approvals
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(
        &self,
        record: &TransactionRecord,
        approvals: &[CountedApproval],
    ) -> Result<BroadcastReceipt, CollaboratorError>;
}

/// Broadcaster used when no sender wallet is configured
pub struct DisabledBroadcaster;

#[async_trait]
impl Broadcaster for DisabledBroadcaster {
    async fn broadcast(
        &self,
        _record: &TransactionRecord,
        _approvals: &[CountedApproval],
    ) -> Result<BroadcastReceipt, CollaboratorError> {
        Err(CollaboratorError::Unavailable(
            "no sender wallet configured".to_string(),
        ))
    }
}
