//! Signature ledger and threshold gate
//!
//! The ledger is an append-only audit log of approvals for one commitment
//! hash. Every submission is kept; only distinct, resolved and authorized
//! identities count toward the threshold. Mutation is serialized by the
//! coordinator, the ledger itself does no locking.

pub mod gate;

pub use gate::can_execute;

use crate::account::{AccountConfig, Identity};
use crate::error::CollaboratorError;
use crate::record::CommitmentHash;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Recovers the signer of a signature blob over a commitment hash
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn recover_identity(
        &self,
        commitment: CommitmentHash,
        blob: &[u8],
    ) -> Result<Identity, CollaboratorError>;
}

/// Outcome of resolving an approval's signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Resolved { identity: Identity },
    /// Verifier was unreachable; may be retried
    Unresolved { cause: String },
    /// Verifier rejected the blob; never counted
    Invalid { cause: String },
}

impl Resolution {
    pub fn from_verifier(result: Result<Identity, CollaboratorError>) -> Self {
        match result {
            Ok(identity) => Resolution::Resolved { identity },
            Err(CollaboratorError::InvalidSignature(cause))
            | Err(CollaboratorError::Malformed(cause))
            | Err(CollaboratorError::Rejected(cause)) => Resolution::Invalid { cause },
            Err(CollaboratorError::Unavailable(cause)) => Resolution::Unresolved { cause },
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        match self {
            Resolution::Resolved { identity } => Some(*identity),
            _ => None,
        }
    }
}

/// One submitted signature blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub sequence: u64,
    pub blob: Bytes,
    pub resolution: Resolution,
    pub received_at: DateTime<Utc>,
}

/// What happened to a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionOutcome {
    /// First approval from this identity
    Counted,
    /// Identity already approved; kept for audit only
    Duplicate,
    /// Identity is not an authorized approver
    Unauthorized,
    IdentityUnresolved,
    InvalidSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub accepted: bool,
    pub resolved_identity: Option<Identity>,
    pub total_distinct: usize,
    pub outcome: SubmissionOutcome,
}

/// Snapshot of ledger progress for one account config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatus {
    pub total_distinct: usize,
    /// Counted identities, in first-approval order
    pub resolved_identities: Vec<Identity>,
    /// Resolved identities outside the approver set
    pub unauthorized_identities: Vec<Identity>,
    pub threshold: usize,
    pub audit_len: usize,
    pub unresolved: usize,
    pub invalid: usize,
}

/// A counted approval handed to the broadcaster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountedApproval {
    pub identity: Identity,
    pub signature: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureLedger {
    commitment: CommitmentHash,
    approvals: Vec<Approval>,
}

impl SignatureLedger {
    pub fn new(commitment: CommitmentHash) -> Self {
        Self {
            commitment,
            approvals: Vec::new(),
        }
    }

    pub fn commitment(&self) -> CommitmentHash {
        self.commitment
    }

    pub fn approvals(&self) -> &[Approval] {
        &self.approvals
    }

    pub fn len(&self) -> usize {
        self.approvals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.approvals.is_empty()
    }

    /// Append a resolved submission and report how it affected the count
    pub fn append(
        &mut self,
        blob: Bytes,
        resolution: Resolution,
        config: &AccountConfig,
    ) -> SubmissionResult {
        let already_seen = resolution
            .identity()
            .map(|identity| self.has_resolved(&identity))
            .unwrap_or(false);

        let outcome = match &resolution {
            Resolution::Unresolved { .. } => SubmissionOutcome::IdentityUnresolved,
            Resolution::Invalid { .. } => SubmissionOutcome::InvalidSignature,
            Resolution::Resolved { identity } if !config.is_authorized(identity) => {
                SubmissionOutcome::Unauthorized
            }
            Resolution::Resolved { .. } if already_seen => SubmissionOutcome::Duplicate,
            Resolution::Resolved { .. } => SubmissionOutcome::Counted,
        };

        let resolved_identity = resolution.identity();
        self.approvals.push(Approval {
            sequence: self.approvals.len() as u64,
            blob,
            resolution,
            received_at: Utc::now(),
        });

        SubmissionResult {
            accepted: matches!(
                outcome,
                SubmissionOutcome::Counted | SubmissionOutcome::Duplicate
            ),
            resolved_identity,
            total_distinct: self.status(config).total_distinct,
            outcome,
        }
    }

    fn has_resolved(&self, identity: &Identity) -> bool {
        self.approvals
            .iter()
            .any(|a| a.resolution.identity().as_ref() == Some(identity))
    }

    /// Approvals whose signer could not be resolved yet
    pub fn unresolved(&self) -> Vec<(u64, Bytes)> {
        self.approvals
            .iter()
            .filter(|a| matches!(a.resolution, Resolution::Unresolved { .. }))
            .map(|a| (a.sequence, a.blob.clone()))
            .collect()
    }

    /// Replace the resolution of a still-unresolved approval
    pub fn apply_resolution(&mut self, sequence: u64, resolution: Resolution) -> bool {
        match self.approvals.get_mut(sequence as usize) {
            Some(approval) if matches!(approval.resolution, Resolution::Unresolved { .. }) => {
                approval.resolution = resolution;
                true
            }
            _ => false,
        }
    }

    /// First approval of every distinct authorized identity
    pub fn counted_approvals(&self, config: &AccountConfig) -> Vec<CountedApproval> {
        let mut seen = HashSet::new();
        self.approvals
            .iter()
            .filter_map(|a| a.resolution.identity().map(|identity| (identity, a)))
            .filter(|(identity, _)| config.is_authorized(identity) && seen.insert(*identity))
            .map(|(identity, a)| CountedApproval {
                identity,
                signature: a.blob.clone(),
            })
            .collect()
    }

    pub fn status(&self, config: &AccountConfig) -> LedgerStatus {
        let resolved_identities: Vec<Identity> = self
            .counted_approvals(config)
            .into_iter()
            .map(|c| c.identity)
            .collect();

        let mut unauthorized_identities = Vec::new();
        let mut unresolved = 0;
        let mut invalid = 0;
        for approval in &self.approvals {
            match &approval.resolution {
                Resolution::Resolved { identity } => {
                    if !config.is_authorized(identity) && !unauthorized_identities.contains(identity) {
                        unauthorized_identities.push(*identity);
                    }
                }
                Resolution::Unresolved { .. } => unresolved += 1,
                Resolution::Invalid { .. } => invalid += 1,
            }
        }

        LedgerStatus {
            total_distinct: resolved_identities.len(),
            resolved_identities,
            unauthorized_identities,
            threshold: config.threshold,
            audit_len: self.approvals.len(),
            unresolved,
            invalid,
        }
    }
}
