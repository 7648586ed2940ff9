//! Coordinator: the single writer of cycle state
//!
//! Every operation follows the same shape: snapshot what it needs under the
//! session lock, call external collaborators with the lock released, then
//! re-acquire the lock and apply the result atomically, checking that the
//! cycle it started from is still the active one.

use super::cycle::{Cycle, ExecutionState};
use super::{BroadcastReceipt, Broadcaster};
use crate::account::{AccountConfig, AccountDirectory, Identity};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::ledger::{
    can_execute, Approval, IdentityResolver, Resolution, SubmissionOutcome, SubmissionResult,
};
use crate::record::{CommitmentHash, CommitmentHasher, RawTransactionFields, TransactionRecord};
use crate::signing::decode_blob;
use crate::state::StateStore;

use chrono::{DateTime, Utc};
use ethers::types::{Bytes, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Tunables injected at startup
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Account nonce used when a build request does not carry one
    pub safe_nonce: Option<u64>,
    pub collaborator_timeout: Duration,
    pub broadcast_timeout: Duration,
}

impl From<&CoordinatorConfig> for CoordinatorOptions {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            safe_nonce: config.safe_nonce,
            collaborator_timeout: Duration::from_millis(config.collaborator_timeout_ms),
            broadcast_timeout: Duration::from_millis(config.broadcast_timeout_ms),
        }
    }
}

/// A signature submitted by an approver
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApprovalSubmission {
    /// Hex encoded signature blob
    pub signature: String,
    /// Commitment the approver believes they signed
    #[serde(default)]
    pub commitment_hash: Option<CommitmentHash>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub cycle_id: Uuid,
    pub record: TransactionRecord,
    pub commitment_hash: CommitmentHash,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub cycle_id: Option<Uuid>,
    pub commitment_hash: Option<CommitmentHash>,
    pub total_distinct: usize,
    pub threshold: usize,
    pub resolved_identities: Vec<Identity>,
    pub unauthorized_identities: Vec<Identity>,
    pub pending_approvers: Vec<Identity>,
    pub audit_len: usize,
    pub unresolved: usize,
    pub invalid: usize,
    pub can_execute: bool,
    pub execution_state: ExecutionState,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub commitment_hash: CommitmentHash,
    pub external_tx_id: Option<String>,
    pub confirmed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryReport {
    pub attempted: usize,
    pub resolved: usize,
    pub still_unresolved: usize,
    pub total_distinct: usize,
}

struct Session {
    cycle: Option<Cycle>,
    /// Last revision handed out; increases on every mutation
    revision: u64,
}

impl Session {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn active(&self) -> CoordinatorResult<&Cycle> {
        self.cycle.as_ref().ok_or(CoordinatorError::NoActiveTransaction)
    }

    /// The active cycle, provided it is still the one an operation started from
    fn active_mut(&mut self, cycle_id: Uuid, started_on: CommitmentHash) -> CoordinatorResult<&mut Cycle> {
        match self.cycle.as_mut() {
            Some(cycle) if cycle.id == cycle_id => Ok(cycle),
            Some(cycle) => Err(CoordinatorError::StaleCommitment {
                submitted: format!("{:?}", started_on),
                current: format!("{:?}", cycle.commitment),
            }),
            None => Err(CoordinatorError::NoActiveTransaction),
        }
    }
}

/// Multi-party signing coordinator
pub struct Coordinator {
    directory: Arc<AccountDirectory>,
    hasher: Arc<dyn CommitmentHasher>,
    verifier: Arc<dyn IdentityResolver>,
    broadcaster: Arc<dyn Broadcaster>,
    store: Arc<dyn StateStore>,
    options: CoordinatorOptions,
    session: Mutex<Session>,
    /// Highest revision written to the store
    persisted: Mutex<u64>,
}

impl Coordinator {
    pub fn new(
        directory: Arc<AccountDirectory>,
        hasher: Arc<dyn CommitmentHasher>,
        verifier: Arc<dyn IdentityResolver>,
        broadcaster: Arc<dyn Broadcaster>,
        store: Arc<dyn StateStore>,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            directory,
            hasher,
            verifier,
            broadcaster,
            store,
            options,
            session: Mutex::new(Session {
                cycle: None,
                revision: 0,
            }),
            persisted: Mutex::new(0),
        }
    }

    pub fn directory(&self) -> &Arc<AccountDirectory> {
        &self.directory
    }

    /// Reload the active cycle from the store
    pub async fn restore(&self) -> CoordinatorResult<()> {
        let Some(mut cycle) = self.store.load().await? else {
            info!("No persisted cycle, starting unbuilt");
            return Ok(());
        };
        if cycle.ledger.commitment() != cycle.commitment {
            return Err(CoordinatorError::Storage(format!(
                "cycle {} ledger belongs to {:?}, not {:?}",
                cycle.id,
                cycle.ledger.commitment(),
                cycle.commitment
            )));
        }

        let snapshot = {
            let mut session = self.session.lock().await;
            session.revision = session.revision.max(cycle.revision);
            *self.persisted.lock().await = cycle.revision;

            let changed = cycle.recover_after_restart();
            if changed {
                warn!(
                    "Cycle {} was interrupted while broadcasting, outcome unknown",
                    cycle.id
                );
                let revision = session.next_revision();
                cycle.touch(revision);
            }

            info!(
                "Restored cycle {} for {:?} in state {} with {} approvals",
                cycle.id,
                cycle.commitment,
                cycle.state.name(),
                cycle.ledger.len()
            );
            session.cycle = Some(cycle.clone());
            changed.then_some(cycle)
        };

        if let Some(cycle) = snapshot {
            self.persist(cycle).await;
        }
        Ok(())
    }

    /// Build a new record, replacing any previous cycle.
    ///
    /// All-or-nothing: validation, nonce resolution and hashing complete before
    /// the session is touched.
    pub async fn build(&self, fields: RawTransactionFields) -> CoordinatorResult<BuildOutcome> {
        // Reject malformed input before touching the account cache
        TransactionRecord::from_fields(&fields, U256::zero())?;

        self.directory.invalidate().await;
        let nonce = match fields.explicit_nonce() {
            Some(nonce) => nonce,
            None => match self.options.safe_nonce {
                Some(nonce) => U256::from(nonce),
                None => {
                    let resolved = self.directory.lookup().await?;
                    if resolved.stale {
                        return Err(CoordinatorError::Resolution(
                            "account nonce could not be refreshed".to_string(),
                        ));
                    }
                    U256::from(resolved.config.nonce.unwrap_or(0))
                }
            },
        };

        let record = TransactionRecord::from_fields(&fields, nonce)?;
        let commitment = self.request_hash(&record).await?;

        let snapshot = {
            let mut session = self.session.lock().await;
            if let Some(previous) = &session.cycle {
                if previous.state == ExecutionState::Submitting {
                    warn!(
                        "Replacing cycle {} while its broadcast is in flight",
                        previous.id
                    );
                }
                debug!(
                    "Discarding cycle {} ({} approvals, state {})",
                    previous.id,
                    previous.ledger.len(),
                    previous.state.name()
                );
            }

            let revision = session.next_revision();
            let cycle = Cycle::new(record.clone(), commitment, revision);
            session.cycle = Some(cycle.clone());
            cycle
        };

        info!(
            "Built transaction to {:?} with commitment {:?} (cycle {})",
            record.to, commitment, snapshot.id
        );
        crate::metrics::record_build();
        crate::metrics::set_distinct_approvals(0);

        let outcome = BuildOutcome {
            cycle_id: snapshot.id,
            record,
            commitment_hash: commitment,
        };
        self.persist(snapshot).await;
        Ok(outcome)
    }

    async fn request_hash(&self, record: &TransactionRecord) -> CoordinatorResult<CommitmentHash> {
        let encoding = record.canonical_encoding();
        match timeout(self.options.collaborator_timeout, self.hasher.hash(&encoding)).await {
            Ok(Ok(hash)) => Ok(hash),
            Ok(Err(e)) => {
                error!("Commitment hash request failed: {}", e);
                Err(CoordinatorError::HashUnavailable(e.to_string()))
            }
            Err(_) => Err(CoordinatorError::Timeout {
                operation: "commitment hash".to_string(),
            }),
        }
    }

    /// Commitment hash of the active record
    pub async fn current_hash(&self) -> CoordinatorResult<CommitmentHash> {
        self.session
            .lock()
            .await
            .cycle
            .as_ref()
            .map(|c| c.commitment)
            .ok_or_else(|| CoordinatorError::HashUnavailable("no transaction built".to_string()))
    }

    /// The active cycle
    pub async fn current(&self) -> CoordinatorResult<Cycle> {
        self.session.lock().await.active().cloned()
    }

    /// Audit log of the active cycle
    pub async fn approvals(&self) -> CoordinatorResult<Vec<Approval>> {
        Ok(self.session.lock().await.active()?.ledger.approvals().to_vec())
    }

    /// Submit one approval.
    ///
    /// Identity resolution happens outside the lock. Its result is appended
    /// together with the blob only if the cycle is unchanged by then; a
    /// timed-out resolution leaves no entry at all.
    pub async fn submit(&self, submission: ApprovalSubmission) -> CoordinatorResult<SubmissionResult> {
        let (cycle_id, commitment) = {
            let session = self.session.lock().await;
            let cycle = session.active()?;
            (cycle.id, cycle.commitment)
        };

        if let Some(claimed) = submission.commitment_hash {
            if claimed != commitment {
                return Err(CoordinatorError::StaleCommitment {
                    submitted: format!("{:?}", claimed),
                    current: format!("{:?}", commitment),
                });
            }
        }

        if submission.signature.trim().is_empty() {
            return Err(CoordinatorError::Validation("signature is empty".to_string()));
        }

        let (blob, resolution) = match decode_blob(&submission.signature) {
            Ok(bytes) => {
                let resolution = self.resolve_identity(commitment, &bytes).await?;
                (Bytes::from(bytes), resolution)
            }
            Err(e) => (
                Bytes::from(submission.signature.trim().as_bytes().to_vec()),
                Resolution::from_verifier(Err(e)),
            ),
        };

        let config = self.account_for_progress().await;

        let (result, snapshot) = {
            let mut session = self.session.lock().await;
            let revision = session.revision + 1;
            let cycle = session.active_mut(cycle_id, commitment)?;

            let result = cycle.ledger.append(blob, resolution, &config);
            let previous = cycle.state.clone();
            cycle.reevaluate(&config);
            if cycle.state != previous {
                info!(
                    "Cycle {} moved {} -> {}",
                    cycle.id,
                    previous.name(),
                    cycle.state.name()
                );
            }
            cycle.touch(revision);
            let snapshot = cycle.clone();
            session.revision = revision;
            (result, snapshot)
        };

        match result.outcome {
            SubmissionOutcome::Counted => info!(
                "Approval from {:?} counted ({} of {})",
                result.resolved_identity.unwrap_or_default(),
                result.total_distinct,
                config.threshold
            ),
            SubmissionOutcome::Duplicate => debug!(
                "Duplicate approval from {:?} kept for audit",
                result.resolved_identity.unwrap_or_default()
            ),
            outcome => warn!("Approval not counted: {:?}", outcome),
        }
        crate::metrics::record_submission(result.outcome);
        crate::metrics::set_distinct_approvals(result.total_distinct);

        self.persist(snapshot).await;
        Ok(result)
    }

    /// Submit newline separated signatures one at a time
    pub async fn submit_bulk(
        &self,
        signatures: &str,
        commitment_hash: Option<CommitmentHash>,
    ) -> Vec<CoordinatorResult<SubmissionResult>> {
        let mut results = Vec::new();
        for line in signatures.lines().map(str::trim).filter(|l| !l.is_empty()) {
            results.push(
                self.submit(ApprovalSubmission {
                    signature: line.to_string(),
                    commitment_hash,
                })
                .await,
            );
        }
        results
    }

    /// Verify a blob, mapping a timeout to an error rather than an outcome
    async fn resolve_identity(
        &self,
        commitment: CommitmentHash,
        blob: &[u8],
    ) -> CoordinatorResult<Resolution> {
        match timeout(
            self.options.collaborator_timeout,
            self.verifier.recover_identity(commitment, blob),
        )
        .await
        {
            Ok(result) => Ok(Resolution::from_verifier(result)),
            Err(_) => Err(CoordinatorError::Timeout {
                operation: "identity resolution".to_string(),
            }),
        }
    }

    /// Account config for counting progress; never fails
    async fn account_for_progress(&self) -> AccountConfig {
        match self.directory.resolve().await {
            Ok(config) => config,
            Err(e) => {
                warn!("Using fallback account config: {}", e);
                self.directory.current_or_default().await
            }
        }
    }

    /// Retry resolution of approvals whose verifier was unavailable
    pub async fn retry_unresolved(&self) -> CoordinatorResult<RetryReport> {
        let (cycle_id, commitment, pending) = {
            let session = self.session.lock().await;
            let cycle = session.active()?;
            (cycle.id, cycle.commitment, cycle.ledger.unresolved())
        };

        let mut outcomes = Vec::with_capacity(pending.len());
        for (sequence, blob) in &pending {
            match self.resolve_identity(commitment, blob).await {
                Ok(Resolution::Unresolved { .. }) => {}
                Ok(resolution) => outcomes.push((*sequence, resolution)),
                Err(e) => warn!("Approval {} still unresolved: {}", sequence, e),
            }
        }

        let config = self.account_for_progress().await;

        let (report, snapshot) = {
            let mut session = self.session.lock().await;
            let revision = session.revision + 1;
            let cycle = session.active_mut(cycle_id, commitment)?;

            let mut resolved = 0;
            for (sequence, resolution) in outcomes {
                if cycle.ledger.apply_resolution(sequence, resolution) {
                    resolved += 1;
                }
            }
            cycle.reevaluate(&config);
            let status = cycle.ledger.status(&config);

            let snapshot = if resolved > 0 {
                cycle.touch(revision);
                let snapshot = cycle.clone();
                session.revision = revision;
                Some(snapshot)
            } else {
                None
            };

            (
                RetryReport {
                    attempted: pending.len(),
                    resolved,
                    still_unresolved: status.unresolved,
                    total_distinct: status.total_distinct,
                },
                snapshot,
            )
        };

        info!(
            "Retried {} unresolved approvals, {} resolved",
            report.attempted, report.resolved
        );
        if let Some(snapshot) = snapshot {
            self.persist(snapshot).await;
        }
        Ok(report)
    }

    /// Progress snapshot; also re-runs the threshold gate
    pub async fn status(&self) -> StatusReport {
        let config = self.account_for_progress().await;

        let (report, snapshot) = {
            let mut session = self.session.lock().await;
            let revision = session.revision + 1;

            let Some(cycle) = session.cycle.as_mut() else {
                return StatusReport {
                    cycle_id: None,
                    commitment_hash: None,
                    total_distinct: 0,
                    threshold: config.threshold,
                    resolved_identities: Vec::new(),
                    unauthorized_identities: Vec::new(),
                    pending_approvers: config.approvers.clone(),
                    audit_len: 0,
                    unresolved: 0,
                    invalid: 0,
                    can_execute: false,
                    execution_state: ExecutionState::Unbuilt,
                    updated_at: None,
                };
            };

            let snapshot = if cycle.reevaluate(&config) {
                cycle.touch(revision);
                Some(cycle.clone())
            } else {
                None
            };

            let status = cycle.ledger.status(&config);
            let pending_approvers = config
                .approvers
                .iter()
                .filter(|a| !status.resolved_identities.contains(a))
                .copied()
                .collect();

            let report = StatusReport {
                cycle_id: Some(cycle.id),
                commitment_hash: Some(cycle.commitment),
                total_distinct: status.total_distinct,
                threshold: config.threshold,
                can_execute: can_execute(&status, &config),
                resolved_identities: status.resolved_identities,
                unauthorized_identities: status.unauthorized_identities,
                pending_approvers,
                audit_len: status.audit_len,
                unresolved: status.unresolved,
                invalid: status.invalid,
                execution_state: cycle.state.clone(),
                updated_at: Some(cycle.updated_at),
            };

            if snapshot.is_some() {
                session.revision = revision;
            }
            (report, snapshot)
        };

        if let Some(snapshot) = snapshot {
            self.persist(snapshot).await;
        }
        report
    }

    /// Broadcast the active record once the threshold is met.
    ///
    /// Only one caller can move the cycle into `Submitting`; everyone else is
    /// told it is executing or already submitted. A failed broadcast may be
    /// retried, except when its outcome is unknown and `force` is not set.
    pub async fn execute(&self, force: bool) -> CoordinatorResult<ExecutionReport> {
        let config = self.directory.resolve().await?;

        let prepared = {
            let mut session = self.session.lock().await;
            let revision = session.revision + 1;
            let cycle = session
                .cycle
                .as_mut()
                .ok_or(CoordinatorError::NoActiveTransaction)?;

            match &cycle.state {
                ExecutionState::Submitting => return Err(CoordinatorError::AlreadyExecuting),
                ExecutionState::Submitted { external_tx_id, .. } => {
                    return Err(CoordinatorError::AlreadySubmitted {
                        external_tx_id: external_tx_id.clone(),
                    })
                }
                ExecutionState::Failed {
                    outcome_unknown: true,
                    ..
                } if !force => return Err(CoordinatorError::OutcomeUnknown),
                _ => {}
            }

            let status = cycle.ledger.status(&config);
            if can_execute(&status, &config) {
                if force {
                    warn!("Forced execution of cycle {}", cycle.id);
                }
                cycle.state = ExecutionState::Submitting;
                cycle.touch(revision);
                let prepared = (
                    cycle.id,
                    cycle.commitment,
                    cycle.record.clone(),
                    cycle.ledger.counted_approvals(&config),
                    cycle.clone(),
                );
                session.revision = revision;
                Ok(prepared)
            } else {
                // Demotion from ThresholdMet is a mutation and gets persisted
                let demoted = if cycle.reevaluate(&config) {
                    cycle.touch(revision);
                    Some(cycle.clone())
                } else {
                    None
                };
                if demoted.is_some() {
                    session.revision = revision;
                }
                Err((
                    CoordinatorError::ThresholdNotMet {
                        required: config.threshold,
                        collected: status.total_distinct,
                    },
                    demoted,
                ))
            }
        };

        let (cycle_id, commitment, record, approvals, snapshot) = match prepared {
            Ok(prepared) => prepared,
            Err((e, demoted)) => {
                if let Some(snapshot) = demoted {
                    self.persist(snapshot).await;
                }
                return Err(e);
            }
        };

        info!(
            "Broadcasting {:?} with {} approvals",
            commitment,
            approvals.len()
        );
        self.persist(snapshot).await;

        let started = Instant::now();
        let outcome = match timeout(
            self.options.broadcast_timeout,
            self.broadcaster.broadcast(&record, &approvals),
        )
        .await
        {
            Ok(result) => result.map_err(|e| (e.to_string(), false)),
            Err(_) => Err((
                format!("no response within {:?}", self.options.broadcast_timeout),
                true,
            )),
        };
        crate::metrics::observe_broadcast_latency(started.elapsed().as_secs_f64());

        self.apply_broadcast(cycle_id, commitment, outcome).await
    }

    async fn apply_broadcast(
        &self,
        cycle_id: Uuid,
        commitment: CommitmentHash,
        outcome: Result<BroadcastReceipt, (String, bool)>,
    ) -> CoordinatorResult<ExecutionReport> {
        let snapshot = {
            let mut session = self.session.lock().await;
            let revision = session.revision + 1;
            let applied = match session.active_mut(cycle_id, commitment) {
                Ok(cycle) => {
                    cycle.state = match &outcome {
                        Ok(receipt) => ExecutionState::Submitted {
                            external_tx_id: receipt.external_tx_id.clone(),
                            confirmed: receipt.confirmed,
                        },
                        Err((reason, outcome_unknown)) => ExecutionState::Failed {
                            reason: reason.clone(),
                            outcome_unknown: *outcome_unknown,
                        },
                    };
                    cycle.touch(revision);
                    Some(cycle.clone())
                }
                Err(_) => {
                    warn!(
                        "Cycle {} was replaced during its broadcast, result not recorded",
                        cycle_id
                    );
                    None
                }
            };
            if applied.is_some() {
                session.revision = revision;
            }
            applied
        };

        if let Some(snapshot) = snapshot {
            self.persist(snapshot).await;
        }

        match outcome {
            Ok(receipt) => {
                info!(
                    "Submitted {:?} as {:?} (confirmed: {})",
                    commitment, receipt.external_tx_id, receipt.confirmed
                );
                crate::metrics::record_execution("submitted");
                Ok(ExecutionReport {
                    commitment_hash: commitment,
                    external_tx_id: receipt.external_tx_id,
                    confirmed: receipt.confirmed,
                })
            }
            Err((reason, outcome_unknown)) => {
                if outcome_unknown {
                    error!(
                        "Broadcast of {:?} has unknown outcome, verify manually: {}",
                        commitment, reason
                    );
                    crate::metrics::record_execution("unknown");
                } else {
                    error!("Broadcast of {:?} failed: {}", commitment, reason);
                    crate::metrics::record_execution("failed");
                }
                Err(CoordinatorError::BroadcastFailed {
                    reason,
                    outcome_unknown,
                })
            }
        }
    }

    /// Store and account resolver reachability
    pub async fn readiness(&self) -> (bool, bool) {
        let store_ok = match self.store.health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!("State store health check failed: {}", e);
                false
            }
        };
        let account_ok = self.directory.resolve().await.is_ok();
        (store_ok, account_ok)
    }

    /// Write a snapshot unless a newer revision already reached the store.
    ///
    /// The in-memory state stays authoritative when a write fails; the next
    /// mutation writes the full cycle again.
    async fn persist(&self, cycle: Cycle) {
        let mut persisted = self.persisted.lock().await;
        if cycle.revision <= *persisted {
            debug!(
                "Skipping revision {} (store at {})",
                cycle.revision, *persisted
            );
            return;
        }

        match self.store.save(&cycle).await {
            Ok(()) => *persisted = cycle.revision,
            Err(e) => {
                error!("Failed to persist cycle {}: {}", cycle.id, e);
                crate::metrics::record_persistence_failure();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{MockAccountResolver, RawAccountConfig};
    use crate::coordination::MockBroadcaster;
    use crate::error::CollaboratorError;
    use crate::ledger::CountedApproval;
    use crate::record::MockCommitmentHasher;
    use crate::signing::{EcdsaIdentityResolver, Eip712SafeHasher};
    use crate::state::{MemoryStateStore, StateStore};

    use async_trait::async_trait;
    use ethers::signers::{LocalWallet, Signer};
    use ethers::types::{Address, H256};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_ok};

    const SAFE: u8 = 0x5a;

    fn id(byte: u8) -> Identity {
        Address::repeat_byte(byte)
    }

    /// Verifier mapping blob text like "sig-a" to a fixed identity
    struct TableVerifier {
        table: HashMap<Vec<u8>, Result<Identity, CollaboratorError>>,
        delay: Option<Duration>,
    }

    impl TableVerifier {
        fn new() -> Self {
            Self {
                table: HashMap::new(),
                delay: None,
            }
        }

        fn with(mut self, blob: &str, result: Result<Identity, CollaboratorError>) -> Self {
            self.table
                .insert(decode_blob(blob).unwrap(), result);
            self
        }
    }

    #[async_trait]
    impl IdentityResolver for TableVerifier {
        async fn recover_identity(
            &self,
            _commitment: CommitmentHash,
            blob: &[u8],
        ) -> Result<Identity, CollaboratorError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.table
                .get(blob)
                .cloned()
                .unwrap_or_else(|| Err(CollaboratorError::InvalidSignature("unknown".into())))
        }
    }

    /// Broadcaster that counts calls and can be held until released
    struct GatedBroadcaster {
        calls: AtomicUsize,
        release: Notify,
        gated: bool,
        fail: bool,
    }

    impl GatedBroadcaster {
        fn new(gated: bool, fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                release: Notify::new(),
                gated,
                fail,
            }
        }
    }

    #[async_trait]
    impl Broadcaster for GatedBroadcaster {
        async fn broadcast(
            &self,
            _record: &TransactionRecord,
            _approvals: &[CountedApproval],
        ) -> Result<BroadcastReceipt, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.gated {
                self.release.notified().await;
            }
            if self.fail {
                return Err(CollaboratorError::Rejected("GS013".into()));
            }
            Ok(BroadcastReceipt {
                external_tx_id: Some("0xfeed".into()),
                confirmed: true,
            })
        }
    }

    // Blobs are hex so they survive decode_blob
    const SIG_A: &str = "0xaa01";
    const SIG_A2: &str = "0xaa02";
    const SIG_B: &str = "0xbb01";
    const SIG_C: &str = "0xcc01";
    const SIG_OUTSIDER: &str = "0xee01";
    const SIG_DOWN: &str = "0xdd01";

    fn verifier() -> TableVerifier {
        TableVerifier::new()
            .with(SIG_A, Ok(id(0xa)))
            .with(SIG_A2, Ok(id(0xa)))
            .with(SIG_B, Ok(id(0xb)))
            .with(SIG_C, Ok(id(0xc)))
            .with(SIG_OUTSIDER, Ok(id(0xe)))
            .with(SIG_DOWN, Err(CollaboratorError::Unavailable("verifier down".into())))
    }

    fn directory(threshold: u64) -> Arc<AccountDirectory> {
        let mut resolver = MockAccountResolver::new();
        resolver.expect_fetch_account_config().returning(move |_| {
            Ok(RawAccountConfig {
                threshold: Some(threshold),
                approvers: Some(vec![id(0xa), id(0xb), id(0xc)]),
                nonce: Some(4),
            })
        });
        Arc::new(AccountDirectory::new(
            id(SAFE),
            Arc::new(resolver),
            Duration::from_millis(500),
        ))
    }

    fn options() -> CoordinatorOptions {
        CoordinatorOptions {
            safe_nonce: None,
            collaborator_timeout: Duration::from_millis(200),
            broadcast_timeout: Duration::from_millis(300),
        }
    }

    fn coordinator_with(
        verifier: impl IdentityResolver + 'static,
        broadcaster: Arc<dyn Broadcaster>,
        store: Arc<dyn StateStore>,
    ) -> Coordinator {
        Coordinator::new(
            directory(2),
            Arc::new(Eip712SafeHasher::new(1, id(SAFE))),
            Arc::new(verifier),
            broadcaster,
            store,
            options(),
        )
    }

    fn coordinator(broadcaster: Arc<dyn Broadcaster>) -> Coordinator {
        coordinator_with(verifier(), broadcaster, Arc::new(MemoryStateStore::new()))
    }

    fn fields(value: &str) -> RawTransactionFields {
        RawTransactionFields {
            to: Some("0x1111111111111111111111111111111111111111".to_string()),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    fn sig(signature: &str) -> ApprovalSubmission {
        ApprovalSubmission {
            signature: signature.to_string(),
            commitment_hash: None,
        }
    }

    #[tokio::test]
    async fn test_two_of_three_scenario() {
        let broadcaster = Arc::new(GatedBroadcaster::new(false, false));
        let coordinator = coordinator(broadcaster.clone());
        let built = coordinator.build(fields("1")).await.unwrap();
        assert_eq!(built.record.nonce, U256::from(4));

        let first = coordinator.submit(sig(SIG_A)).await.unwrap();
        assert_eq!(first.total_distinct, 1);
        assert_eq!(
            coordinator.execute(false).await.unwrap_err(),
            CoordinatorError::ThresholdNotMet {
                required: 2,
                collected: 1
            }
        );

        let again = coordinator.submit(sig(SIG_A2)).await.unwrap();
        assert_eq!(again.total_distinct, 1);
        assert_eq!(again.outcome, SubmissionOutcome::Duplicate);

        let second = coordinator.submit(sig(SIG_B)).await.unwrap();
        assert_eq!(second.total_distinct, 2);
        assert_eq!(
            coordinator.status().await.execution_state,
            ExecutionState::ThresholdMet
        );

        let report = coordinator.execute(false).await.unwrap();
        assert_eq!(report.external_tx_id.as_deref(), Some("0xfeed"));
        assert!(matches!(
            coordinator.status().await.execution_state,
            ExecutionState::Submitted { .. }
        ));
        assert!(matches!(
            coordinator.execute(false).await.unwrap_err(),
            CoordinatorError::AlreadySubmitted { .. }
        ));
        assert_eq!(broadcaster.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_execute_broadcasts_once() {
        let broadcaster = Arc::new(GatedBroadcaster::new(true, false));
        let coordinator = Arc::new(coordinator(broadcaster.clone()));
        coordinator.build(fields("1")).await.unwrap();
        coordinator.submit(sig(SIG_A)).await.unwrap();
        coordinator.submit(sig(SIG_B)).await.unwrap();

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.execute(false).await }
        });
        while broadcaster.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let contenders = futures::future::join_all(
            (0..8).map(|_| coordinator.execute(false)),
        )
        .await;
        for result in contenders {
            assert_eq!(result.unwrap_err(), CoordinatorError::AlreadyExecuting);
        }

        broadcaster.release.notify_one();
        assert_ok!(first.await.unwrap());
        assert_eq!(broadcaster.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_count_distinct() {
        let coordinator = Arc::new(coordinator(Arc::new(GatedBroadcaster::new(false, false))));
        coordinator.build(fields("1")).await.unwrap();

        let blobs = [SIG_A, SIG_A2, SIG_B, SIG_A, SIG_B, SIG_C, SIG_OUTSIDER];
        let results = futures::future::join_all(blobs.iter().map(|blob| {
            let coordinator = coordinator.clone();
            async move { coordinator.submit(sig(blob)).await }
        }))
        .await;

        let counted = results
            .iter()
            .filter(|r| r.as_ref().unwrap().outcome == SubmissionOutcome::Counted)
            .count();
        assert_eq!(counted, 3);

        let status = coordinator.status().await;
        assert_eq!(status.total_distinct, 3);
        assert_eq!(status.audit_len, blobs.len());
        assert_eq!(status.unauthorized_identities, vec![id(0xe)]);
    }

    #[tokio::test]
    async fn test_unresolved_submission_is_audited_not_counted() {
        let coordinator = coordinator(Arc::new(GatedBroadcaster::new(false, false)));
        coordinator.build(fields("1")).await.unwrap();

        let result = coordinator.submit(sig(SIG_DOWN)).await.unwrap();

        assert!(!result.accepted);
        assert_eq!(result.outcome, SubmissionOutcome::IdentityUnresolved);
        assert_eq!(result.total_distinct, 0);
        let status = coordinator.status().await;
        assert_eq!((status.audit_len, status.unresolved), (1, 1));
        assert_eq!(status.execution_state, ExecutionState::Built);
    }

    #[tokio::test]
    async fn test_invalid_signature_is_distinct_from_unresolved() {
        let coordinator = coordinator(Arc::new(GatedBroadcaster::new(false, false)));
        coordinator.build(fields("1")).await.unwrap();

        let unknown = coordinator.submit(sig("0x0101")).await.unwrap();
        let garbage = coordinator.submit(sig("not hex")).await.unwrap();

        assert_eq!(unknown.outcome, SubmissionOutcome::InvalidSignature);
        assert_eq!(garbage.outcome, SubmissionOutcome::InvalidSignature);
        assert_eq!(coordinator.status().await.invalid, 2);
    }

    #[tokio::test]
    async fn test_submit_without_build() {
        let coordinator = coordinator(Arc::new(GatedBroadcaster::new(false, false)));

        assert_eq!(
            coordinator.submit(sig(SIG_A)).await.unwrap_err(),
            CoordinatorError::NoActiveTransaction
        );
        assert_eq!(
            coordinator.execute(false).await.unwrap_err(),
            CoordinatorError::NoActiveTransaction
        );
        assert!(matches!(
            coordinator.current_hash().await,
            Err(CoordinatorError::HashUnavailable(_))
        ));
        assert_eq!(coordinator.status().await.execution_state, ExecutionState::Unbuilt);
    }

    #[tokio::test]
    async fn test_rebuild_resets_and_changes_hash() {
        let store = Arc::new(MemoryStateStore::new());
        let coordinator = coordinator_with(
            verifier(),
            Arc::new(GatedBroadcaster::new(false, false)),
            store.clone(),
        );
        let first = coordinator.build(fields("1")).await.unwrap();
        coordinator.submit(sig(SIG_A)).await.unwrap();
        coordinator.submit(sig(SIG_B)).await.unwrap();
        coordinator.execute(false).await.unwrap();

        let second = coordinator.build(fields("2")).await.unwrap();
        assert_ne!(first.commitment_hash, second.commitment_hash);
        assert_eq!(store.cycle_count().await, 2);
        assert_eq!(
            store.load().await.unwrap().unwrap().commitment,
            second.commitment_hash
        );

        let status = coordinator.status().await;
        assert_eq!(status.total_distinct, 0);
        assert_eq!(status.audit_len, 0);
        assert_eq!(status.execution_state, ExecutionState::Built);

        let stale = coordinator
            .submit(ApprovalSubmission {
                signature: SIG_C.to_string(),
                commitment_hash: Some(first.commitment_hash),
            })
            .await;
        assert!(matches!(stale, Err(CoordinatorError::StaleCommitment { .. })));
        assert_eq!(coordinator.status().await.audit_len, 0);
    }

    #[tokio::test]
    async fn test_verification_finishing_after_rebuild_is_discarded() {
        let mut slow = verifier();
        slow.delay = Some(Duration::from_millis(100));
        let coordinator = Arc::new(coordinator_with(
            slow,
            Arc::new(GatedBroadcaster::new(false, false)),
            Arc::new(MemoryStateStore::new()),
        ));
        coordinator.build(fields("1")).await.unwrap();

        let pending = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.submit(sig(SIG_A)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.build(fields("2")).await.unwrap();

        assert!(matches!(
            pending.await.unwrap(),
            Err(CoordinatorError::StaleCommitment { .. })
        ));
        assert_eq!(coordinator.status().await.audit_len, 0);
    }

    #[tokio::test]
    async fn test_verifier_timeout_leaves_no_entry() {
        let mut slow = verifier();
        slow.delay = Some(Duration::from_secs(5));
        let coordinator = coordinator_with(
            slow,
            Arc::new(GatedBroadcaster::new(false, false)),
            Arc::new(MemoryStateStore::new()),
        );
        coordinator.build(fields("1")).await.unwrap();

        assert!(matches!(
            coordinator.submit(sig(SIG_A)).await,
            Err(CoordinatorError::Timeout { .. })
        ));
        assert_eq!(coordinator.status().await.audit_len, 0);
    }

    #[tokio::test]
    async fn test_broadcast_failure_allows_retry() {
        let failing = Arc::new(GatedBroadcaster::new(false, true));
        let coordinator = coordinator(failing.clone());
        coordinator.build(fields("1")).await.unwrap();
        coordinator.submit(sig(SIG_A)).await.unwrap();
        coordinator.submit(sig(SIG_B)).await.unwrap();

        let err = coordinator.execute(false).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::BroadcastFailed {
                outcome_unknown: false,
                ..
            }
        ));
        assert!(matches!(
            coordinator.status().await.execution_state,
            ExecutionState::Failed { .. }
        ));

        assert_err!(coordinator.execute(false).await);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_broadcast_timeout_marks_outcome_unknown() {
        let hanging = Arc::new(GatedBroadcaster::new(true, false));
        let coordinator = coordinator(hanging.clone());
        coordinator.build(fields("1")).await.unwrap();
        coordinator.submit(sig(SIG_A)).await.unwrap();
        coordinator.submit(sig(SIG_B)).await.unwrap();

        let err = coordinator.execute(false).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::BroadcastFailed {
                outcome_unknown: true,
                ..
            }
        ));
        assert_eq!(
            coordinator.execute(false).await.unwrap_err(),
            CoordinatorError::OutcomeUnknown
        );
        assert_eq!(hanging.calls.load(Ordering::SeqCst), 1);

        hanging.release.notify_one();
        assert_ok!(coordinator.execute(true).await);
        assert_eq!(hanging.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_unresolved_counts_late_identity() {
        let store = Arc::new(MemoryStateStore::new());
        let first = coordinator_with(
            verifier(),
            Arc::new(GatedBroadcaster::new(false, false)),
            store.clone(),
        );
        first.build(fields("1")).await.unwrap();
        first.submit(sig(SIG_A)).await.unwrap();
        first.submit(sig(SIG_DOWN)).await.unwrap();

        // Same persisted ledger, verifier now reachable
        let recovered = coordinator_with(
            verifier().with(SIG_DOWN, Ok(id(0xb))),
            Arc::new(GatedBroadcaster::new(false, false)),
            store,
        );
        recovered.restore().await.unwrap();

        let report = recovered.retry_unresolved().await.unwrap();
        assert_eq!((report.attempted, report.resolved), (1, 1));
        assert_eq!(report.total_distinct, 2);
        assert_eq!(
            recovered.status().await.execution_state,
            ExecutionState::ThresholdMet
        );
    }

    #[tokio::test]
    async fn test_restore_after_restart() {
        let store = Arc::new(MemoryStateStore::new());
        let before = coordinator_with(
            verifier(),
            Arc::new(GatedBroadcaster::new(false, false)),
            store.clone(),
        );
        let built = before.build(fields("1")).await.unwrap();
        before.submit(sig(SIG_A)).await.unwrap();

        let after = coordinator_with(
            verifier(),
            Arc::new(GatedBroadcaster::new(false, false)),
            store,
        );
        after.restore().await.unwrap();

        assert_eq!(after.current_hash().await.unwrap(), built.commitment_hash);
        let status = after.status().await;
        assert_eq!(status.total_distinct, 1);
        assert_eq!(status.execution_state, ExecutionState::Collecting);

        // Revisions keep increasing after a restore
        after.submit(sig(SIG_B)).await.unwrap();
        let cycle = after.current().await.unwrap();
        assert!(cycle.revision > 2);
    }

    #[tokio::test]
    async fn test_restore_interrupted_broadcast() {
        let store = Arc::new(MemoryStateStore::new());
        let before = coordinator(Arc::new(GatedBroadcaster::new(false, false)));
        before.build(fields("1")).await.unwrap();
        let mut cycle = before.current().await.unwrap();
        cycle.state = ExecutionState::Submitting;
        store.save(&cycle).await.unwrap();

        let after = coordinator_with(
            verifier(),
            Arc::new(GatedBroadcaster::new(false, false)),
            store.clone(),
        );
        after.restore().await.unwrap();

        assert_eq!(
            after.execute(false).await.unwrap_err(),
            CoordinatorError::OutcomeUnknown
        );
        let persisted = store.load().await.unwrap().unwrap();
        assert!(matches!(
            persisted.state,
            ExecutionState::Failed {
                outcome_unknown: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_validation_error_leaves_state_unchanged() {
        let coordinator = coordinator(Arc::new(GatedBroadcaster::new(false, false)));
        let built = coordinator.build(fields("1")).await.unwrap();

        let mut bad = fields("1");
        bad.to = Some("0xnothex".to_string());
        assert!(matches!(
            coordinator.build(bad).await,
            Err(CoordinatorError::Validation(_))
        ));
        assert_eq!(coordinator.current_hash().await.unwrap(), built.commitment_hash);
    }

    #[tokio::test]
    async fn test_hash_failure_is_all_or_nothing() {
        let mut hasher = MockCommitmentHasher::new();
        hasher
            .expect_hash()
            .returning(|_| Err(CollaboratorError::Unavailable("hasher offline".into())));
        let mut broadcaster = MockBroadcaster::new();
        broadcaster.expect_broadcast().never();

        let coordinator = Coordinator::new(
            directory(2),
            Arc::new(hasher),
            Arc::new(verifier()),
            Arc::new(broadcaster),
            Arc::new(MemoryStateStore::new()),
            options(),
        );

        assert!(matches!(
            coordinator.build(fields("1")).await,
            Err(CoordinatorError::HashUnavailable(_))
        ));
        assert_eq!(coordinator.status().await.execution_state, ExecutionState::Unbuilt);
    }

    /// Resolver that answers once with 2-of-[a, b, c] and then goes down
    fn failing_after_first_directory() -> Arc<AccountDirectory> {
        let calls = AtomicUsize::new(0);
        let mut resolver = MockAccountResolver::new();
        resolver.expect_fetch_account_config().returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(CollaboratorError::Unavailable("rpc down".into()));
            }
            Ok(RawAccountConfig {
                threshold: Some(2),
                approvers: Some(vec![id(0xa), id(0xb), id(0xc)]),
                nonce: Some(4),
            })
        });
        Arc::new(AccountDirectory::new(
            id(SAFE),
            Arc::new(resolver),
            Duration::from_millis(500),
        ))
    }

    fn coordinator_on(directory: Arc<AccountDirectory>, store: Arc<dyn StateStore>) -> Coordinator {
        Coordinator::new(
            directory,
            Arc::new(Eip712SafeHasher::new(1, id(SAFE))),
            Arc::new(verifier()),
            Arc::new(GatedBroadcaster::new(false, false)),
            store,
            options(),
        )
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_last_account_config() {
        let coordinator = coordinator_on(
            failing_after_first_directory(),
            Arc::new(MemoryStateStore::new()),
        );
        let built = coordinator.build(fields("1")).await.unwrap();
        assert_eq!(
            coordinator.submit(sig(SIG_OUTSIDER)).await.unwrap().outcome,
            SubmissionOutcome::Unauthorized
        );

        assert!(matches!(
            coordinator.build(fields("2")).await,
            Err(CoordinatorError::Resolution(_))
        ));
        assert_eq!(coordinator.current_hash().await.unwrap(), built.commitment_hash);

        let approved = coordinator.submit(sig(SIG_A)).await.unwrap();
        assert_eq!(approved.outcome, SubmissionOutcome::Counted);
        assert_eq!(approved.total_distinct, 1);

        let outsider = coordinator.submit(sig(SIG_OUTSIDER)).await.unwrap();
        assert!(!outsider.accepted);
        assert_eq!(outsider.outcome, SubmissionOutcome::Unauthorized);
        assert_eq!(outsider.total_distinct, 1);

        let status = coordinator.status().await;
        assert_eq!(status.threshold, 2);
        assert_eq!(status.execution_state, ExecutionState::Collecting);
        assert_eq!(status.unauthorized_identities, vec![id(0xe)]);
        assert_eq!(
            coordinator.execute(false).await.unwrap_err(),
            CoordinatorError::ThresholdNotMet {
                required: 2,
                collected: 1
            }
        );
    }

    #[tokio::test]
    async fn test_build_with_nonce_while_resolver_down_uses_last_config() {
        let coordinator = coordinator_on(
            failing_after_first_directory(),
            Arc::new(MemoryStateStore::new()),
        );
        coordinator.build(fields("1")).await.unwrap();

        let mut pinned = fields("2");
        pinned.nonce = Some("7".into());
        let built = coordinator.build(pinned).await.unwrap();
        assert_eq!(built.record.nonce, U256::from(7));

        assert_eq!(
            coordinator.submit(sig(SIG_OUTSIDER)).await.unwrap().outcome,
            SubmissionOutcome::Unauthorized
        );
        coordinator.submit(sig(SIG_A)).await.unwrap();

        let status = coordinator.status().await;
        assert_eq!(status.threshold, 2);
        assert_eq!(status.total_distinct, 1);
        assert!(!status.can_execute);
        assert!(coordinator.directory().cached().await.unwrap().stale);
    }

    #[tokio::test]
    async fn test_threshold_raise_demotes_and_persists() {
        let mut resolver = MockAccountResolver::new();
        let mut seq = mockall::Sequence::new();
        for threshold in [1, 2] {
            resolver
                .expect_fetch_account_config()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| {
                    Ok(RawAccountConfig {
                        threshold: Some(threshold),
                        approvers: Some(vec![id(0xa), id(0xb), id(0xc)]),
                        nonce: Some(4),
                    })
                });
        }
        let directory = Arc::new(AccountDirectory::new(
            id(SAFE),
            Arc::new(resolver),
            Duration::from_millis(500),
        ));
        let store = Arc::new(MemoryStateStore::new());
        let coordinator = coordinator_on(directory.clone(), store.clone());

        coordinator.build(fields("1")).await.unwrap();
        coordinator.submit(sig(SIG_A)).await.unwrap();
        assert_eq!(
            coordinator.status().await.execution_state,
            ExecutionState::ThresholdMet
        );

        assert_eq!(directory.refresh().await.unwrap().config.threshold, 2);
        assert!(matches!(
            coordinator.execute(false).await,
            Err(CoordinatorError::ThresholdNotMet { required: 2, .. })
        ));

        let current = coordinator.current().await.unwrap();
        let saved = store.load().await.unwrap().unwrap();
        assert_eq!(saved.state, ExecutionState::Collecting);
        assert_eq!(saved.revision, current.revision);
    }

    #[tokio::test]
    async fn test_bulk_upload_appends() {
        let coordinator = coordinator(Arc::new(GatedBroadcaster::new(false, false)));
        coordinator.build(fields("1")).await.unwrap();
        coordinator.submit(sig(SIG_A)).await.unwrap();

        let results = coordinator
            .submit_bulk(&format!("{}\n\n{}\n{}\n", SIG_A2, SIG_B, SIG_DOWN), None)
            .await;

        assert_eq!(results.len(), 3);
        let status = coordinator.status().await;
        assert_eq!(status.total_distinct, 2);
        assert_eq!(status.audit_len, 4);
    }

    #[tokio::test]
    async fn test_end_to_end_with_real_signatures() {
        let owners: Vec<LocalWallet> = (0..3).map(|_| LocalWallet::new(&mut rand_core())).collect();
        let approvers: Vec<Address> = owners.iter().map(|w| w.address()).collect();

        let mut resolver = MockAccountResolver::new();
        let listed = approvers.clone();
        resolver.expect_fetch_account_config().returning(move |_| {
            Ok(RawAccountConfig {
                threshold: Some(2),
                approvers: Some(listed.clone()),
                nonce: Some(0),
            })
        });

        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_broadcast()
            .times(1)
            .withf(|_, approvals| approvals.len() == 2)
            .returning(|_, _| {
                Ok(BroadcastReceipt {
                    external_tx_id: Some(format!("{:?}", H256::repeat_byte(1))),
                    confirmed: false,
                })
            });

        let coordinator = Coordinator::new(
            Arc::new(AccountDirectory::new(
                id(SAFE),
                Arc::new(resolver),
                Duration::from_millis(500),
            )),
            Arc::new(Eip712SafeHasher::new(1, id(SAFE))),
            Arc::new(EcdsaIdentityResolver::new()),
            Arc::new(broadcaster),
            Arc::new(MemoryStateStore::new()),
            options(),
        );

        let built = coordinator.build(fields("1")).await.unwrap();
        for owner in owners.iter().take(2) {
            let signature = owner.sign_hash(built.commitment_hash).unwrap();
            let result = coordinator
                .submit(ApprovalSubmission {
                    signature: format!("0x{}", hex::encode(signature.to_vec())),
                    commitment_hash: Some(built.commitment_hash),
                })
                .await
                .unwrap();
            assert_eq!(result.resolved_identity, Some(owner.address()));
        }

        let report = coordinator.execute(false).await.unwrap();
        assert!(!report.confirmed);
    }

    fn rand_core() -> ethers::core::rand::rngs::ThreadRng {
        ethers::core::rand::thread_rng()
    }
}
