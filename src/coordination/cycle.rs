//! Execution state machine and the coordination cycle it belongs to

use crate::account::AccountConfig;
use crate::ledger::{can_execute, SignatureLedger};
use crate::record::{CommitmentHash, TransactionRecord};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Execution progress of the active record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExecutionState {
    Unbuilt,
    Built,
    Collecting,
    ThresholdMet,
    Submitting,
    Submitted {
        external_tx_id: Option<String>,
        confirmed: bool,
    },
    Failed {
        reason: String,
        outcome_unknown: bool,
    },
}

impl ExecutionState {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionState::Unbuilt => "unbuilt",
            ExecutionState::Built => "built",
            ExecutionState::Collecting => "collecting",
            ExecutionState::ThresholdMet => "threshold_met",
            ExecutionState::Submitting => "submitting",
            ExecutionState::Submitted { .. } => "submitted",
            ExecutionState::Failed { .. } => "failed",
        }
    }

    /// States in which collected approvals still drive transitions
    pub fn is_collecting(&self) -> bool {
        matches!(
            self,
            ExecutionState::Built | ExecutionState::Collecting | ExecutionState::ThresholdMet
        )
    }
}

/// One build-to-execution cycle: a record, its commitment and its approvals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub id: Uuid,
    /// Monotonic across cycles; persistence never goes backwards
    pub revision: u64,
    pub record: TransactionRecord,
    pub commitment: CommitmentHash,
    pub ledger: SignatureLedger,
    pub state: ExecutionState,
    pub built_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cycle {
    pub fn new(record: TransactionRecord, commitment: CommitmentHash, revision: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            revision,
            record,
            commitment,
            ledger: SignatureLedger::new(commitment),
            state: ExecutionState::Built,
            built_at: now,
            updated_at: now,
        }
    }

    /// Re-run the threshold gate and move between Built, Collecting and
    /// ThresholdMet. Returns whether the state changed.
    pub fn reevaluate(&mut self, config: &AccountConfig) -> bool {
        if !self.state.is_collecting() {
            return false;
        }

        let status = self.ledger.status(config);
        let next = if can_execute(&status, config) {
            ExecutionState::ThresholdMet
        } else if status.total_distinct > 0 || self.state == ExecutionState::ThresholdMet {
            ExecutionState::Collecting
        } else {
            self.state.clone()
        };

        if next != self.state {
            self.state = next;
            true
        } else {
            false
        }
    }

    /// Bring a cycle loaded from storage back into a safe state.
    ///
    /// A cycle interrupted mid-broadcast cannot know whether the broadcast
    /// landed, so it is marked failed with an unknown outcome.
    pub fn recover_after_restart(&mut self) -> bool {
        if self.state == ExecutionState::Submitting {
            self.state = ExecutionState::Failed {
                reason: "coordinator restarted during broadcast".to_string(),
                outcome_unknown: true,
            };
            return true;
        }
        false
    }

    pub fn touch(&mut self, revision: u64) {
        self.revision = revision;
        self.updated_at = Utc::now();
    }
}
