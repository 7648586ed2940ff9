//! Transaction records and their commitment hash
//!
//! A record is built from loosely typed request fields, normalized to its
//! canonical form, and committed to by a hash that approvers sign.

use crate::error::{CollaboratorError, CoordinatorError, CoordinatorResult};

use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Digest approvers sign, binding a signature to one exact record
pub type CommitmentHash = H256;

/// Number of ABI words in the canonical encoding
pub const CANONICAL_WORDS: usize = 10;

/// Source of commitment hashes for canonical record encodings
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommitmentHasher: Send + Sync {
    async fn hash(&self, canonical_encoding: &[u8]) -> Result<CommitmentHash, CollaboratorError>;
}

/// How the account executes the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Call,
    DelegateCall,
}

impl Operation {
    pub fn as_u8(self) -> u8 {
        match self {
            Operation::Call => 0,
            Operation::DelegateCall => 1,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Call => write!(f, "call"),
            Operation::DelegateCall => write!(f, "delegatecall"),
        }
    }
}

/// A numeric request field, sent either as a JSON number or a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(u64),
    Text(String),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::Number(n)
    }
}

/// Build request fields as received from a caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransactionFields {
    pub to: Option<String>,
    pub value: Option<FieldValue>,
    pub data: Option<String>,
    pub operation: Option<FieldValue>,
    pub safe_tx_gas: Option<FieldValue>,
    pub base_gas: Option<FieldValue>,
    pub gas_price: Option<FieldValue>,
    pub gas_token: Option<String>,
    pub refund_receiver: Option<String>,
    pub nonce: Option<FieldValue>,
}

impl RawTransactionFields {
    /// Nonce given by the caller, if any
    pub fn explicit_nonce(&self) -> Option<U256> {
        self.nonce.as_ref().map(|n| parse_uint("nonce", Some(n)))
    }
}

/// Normalized transaction under coordination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    pub nonce: U256,
}

impl TransactionRecord {
    /// Normalize and validate request fields.
    ///
    /// Missing or unparsable numbers become zero, missing optional addresses
    /// become the zero address. A missing or malformed `to`, malformed
    /// addresses, malformed `data` hex and operations other than call or
    /// delegatecall are rejected.
    pub fn from_fields(fields: &RawTransactionFields, nonce: U256) -> CoordinatorResult<Self> {
        let to = match fields.to.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(to) => parse_address("to", to)?,
            None => {
                return Err(CoordinatorError::Validation(
                    "to address is required".to_string(),
                ))
            }
        };

        let operation = match parse_uint("operation", fields.operation.as_ref()) {
            op if op.is_zero() => Operation::Call,
            op if op == U256::one() => Operation::DelegateCall,
            op => {
                return Err(CoordinatorError::Validation(format!(
                    "unsupported operation {}",
                    op
                )))
            }
        };

        Ok(Self {
            to,
            value: parse_uint("value", fields.value.as_ref()),
            data: parse_data(fields.data.as_deref())?,
            operation,
            safe_tx_gas: parse_uint("safeTxGas", fields.safe_tx_gas.as_ref()),
            base_gas: parse_uint("baseGas", fields.base_gas.as_ref()),
            gas_price: parse_uint("gasPrice", fields.gas_price.as_ref()),
            gas_token: parse_optional_address("gasToken", fields.gas_token.as_deref())?,
            refund_receiver: parse_optional_address(
                "refundReceiver",
                fields.refund_receiver.as_deref(),
            )?,
            nonce,
        })
    }

    /// Canonical ABI encoding committed to by the hash.
    ///
    /// Identical records always produce byte-identical encodings.
    pub fn canonical_encoding(&self) -> Vec<u8> {
        encode(&[
            Token::Address(self.to),
            Token::Uint(self.value),
            Token::FixedBytes(keccak256(&self.data).to_vec()),
            Token::Uint(U256::from(self.operation.as_u8())),
            Token::Uint(self.safe_tx_gas),
            Token::Uint(self.base_gas),
            Token::Uint(self.gas_price),
            Token::Address(self.gas_token),
            Token::Address(self.refund_receiver),
            Token::Uint(self.nonce),
        ])
    }
}

fn parse_address(field: &str, value: &str) -> CoordinatorResult<Address> {
    Address::from_str(value.trim())
        .map_err(|e| CoordinatorError::Validation(format!("invalid {} address {}: {}", field, value, e)))
}

fn parse_optional_address(field: &str, value: Option<&str>) -> CoordinatorResult<Address> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => parse_address(field, value),
        None => Ok(Address::zero()),
    }
}

fn parse_data(value: Option<&str>) -> CoordinatorResult<Bytes> {
    let value = value.map(str::trim).unwrap_or("0x");
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped)
        .map(Bytes::from)
        .map_err(|e| CoordinatorError::Validation(format!("invalid data hex: {}", e)))
}

/// Parse a non-negative integer, defaulting to zero
pub(crate) fn parse_uint(field: &str, value: Option<&FieldValue>) -> U256 {
    let text = match value {
        None => return U256::zero(),
        Some(FieldValue::Number(n)) => return U256::from(*n),
        Some(FieldValue::Text(text)) => text.trim(),
    };

    if text.is_empty() {
        return U256::zero();
    }

    let parsed = match text.strip_prefix("0x") {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16).ok(),
        None => U256::from_dec_str(text).ok(),
    };

    parsed.unwrap_or_else(|| {
        warn!("Field {} has invalid numeric value {:?}, using 0", field, text);
        U256::zero()
    })
}
