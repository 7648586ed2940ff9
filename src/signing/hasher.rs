//! EIP-712 `SafeTx` digest computation

use crate::error::CollaboratorError;
use crate::record::{CommitmentHash, CommitmentHasher, CANONICAL_WORDS};

use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;

const DOMAIN_SEPARATOR_TYPE: &str = "EIP712Domain(uint256 chainId,address verifyingContract)";

const SAFE_TX_TYPE: &str = "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)";

/// Computes the digest a Safe account expects its owners to sign
pub struct Eip712SafeHasher {
    domain_separator: [u8; 32],
}

impl Eip712SafeHasher {
    pub fn new(chain_id: u64, account: Address) -> Self {
        let domain_separator = keccak256(encode(&[
            Token::FixedBytes(keccak256(DOMAIN_SEPARATOR_TYPE).to_vec()),
            Token::Uint(U256::from(chain_id)),
            Token::Address(account),
        ]));

        Self { domain_separator }
    }

    pub fn domain_separator(&self) -> H256 {
        H256::from(self.domain_separator)
    }

    /// Digest of a canonical record encoding
    pub fn digest(&self, canonical_encoding: &[u8]) -> Result<CommitmentHash, CollaboratorError> {
        if canonical_encoding.len() != CANONICAL_WORDS * 32 {
            return Err(CollaboratorError::Malformed(format!(
                "canonical encoding must be {} bytes, got {}",
                CANONICAL_WORDS * 32,
                canonical_encoding.len()
            )));
        }

        let mut struct_input = Vec::with_capacity(32 + canonical_encoding.len());
        struct_input.extend_from_slice(&keccak256(SAFE_TX_TYPE));
        struct_input.extend_from_slice(canonical_encoding);
        let struct_hash = keccak256(&struct_input);

        let mut message = Vec::with_capacity(66);
        message.extend_from_slice(&[0x19, 0x01]);
        message.extend_from_slice(&self.domain_separator);
        message.extend_from_slice(&struct_hash);

        Ok(H256::from(keccak256(&message)))
    }
}

#[async_trait]
impl CommitmentHasher for Eip712SafeHasher {
    async fn hash(&self, canonical_encoding: &[u8]) -> Result<CommitmentHash, CollaboratorError> {
        self.digest(canonical_encoding)
    }
}
