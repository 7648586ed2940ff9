//! Signer recovery for Safe owner signatures

use crate::account::Identity;
use crate::error::CollaboratorError;
use crate::ledger::IdentityResolver;
use crate::record::CommitmentHash;

use async_trait::async_trait;
use ethers::types::{RecoveryMessage, Signature};

/// Length of an `r || s || v` signature
pub const SIGNATURE_LEN: usize = 65;

/// Recovers owners from ECDSA signatures over the commitment hash.
///
/// `v` of 27/28 signs the hash directly; 31/32 marks an `eth_sign` signature
/// over the EIP-191 prefixed hash. Contract and pre-approved hash signatures
/// (`v` of 0/1) cannot be recovered offline and are rejected.
#[derive(Debug, Default, Clone)]
pub struct EcdsaIdentityResolver;

impl EcdsaIdentityResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn recover(
        &self,
        commitment: CommitmentHash,
        blob: &[u8],
    ) -> Result<Identity, CollaboratorError> {
        if blob.len() != SIGNATURE_LEN {
            return Err(CollaboratorError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LEN,
                blob.len()
            )));
        }

        let mut signature = Signature::try_from(blob)
            .map_err(|e| CollaboratorError::InvalidSignature(e.to_string()))?;

        let message = match signature.v {
            27 | 28 => RecoveryMessage::Hash(commitment),
            31 | 32 => {
                signature.v -= 4;
                RecoveryMessage::Data(commitment.as_bytes().to_vec())
            }
            v => {
                return Err(CollaboratorError::InvalidSignature(format!(
                    "unsupported signature type v={}",
                    v
                )))
            }
        };

        signature
            .recover(message)
            .map_err(|e| CollaboratorError::InvalidSignature(e.to_string()))
    }
}

#[async_trait]
impl IdentityResolver for EcdsaIdentityResolver {
    async fn recover_identity(
        &self,
        commitment: CommitmentHash,
        blob: &[u8],
    ) -> Result<Identity, CollaboratorError> {
        self.recover(commitment, blob)
    }
}

/// Decode a hex signature blob as sent by clients
pub fn decode_blob(blob: &str) -> Result<Vec<u8>, CollaboratorError> {
    let trimmed = blob.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(digits).map_err(|e| CollaboratorError::InvalidSignature(format!("invalid hex: {}", e)))
}
