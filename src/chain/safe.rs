//! Reads the owner set, threshold and nonce of a Safe account over RPC

use super::ChainProvider;
use crate::account::{AccountResolver, RawAccountConfig};
use crate::error::CollaboratorError;

use async_trait::async_trait;
use ethers::abi::{decode, ParamType, Token};
use ethers::types::{Address, Bytes};
use ethers::utils::id;
use std::sync::Arc;
use tracing::debug;

/// Account resolver backed by the Safe contract's view functions
pub struct SafeAccountResolver {
    provider: Arc<ChainProvider>,
}

impl SafeAccountResolver {
    pub fn new(provider: Arc<ChainProvider>) -> Self {
        Self { provider }
    }

    async fn view(
        &self,
        account: Address,
        signature: &str,
        output: ParamType,
    ) -> Result<Token, CollaboratorError> {
        let data = Bytes::from(id(signature).to_vec());
        let raw = self.provider.call(account, data).await?;
        decode_single(signature, output, &raw)
    }
}

fn decode_single(signature: &str, output: ParamType, raw: &[u8]) -> Result<Token, CollaboratorError> {
    if raw.is_empty() {
        return Err(CollaboratorError::Malformed(format!(
            "{} returned no data, is the address a Safe?",
            signature
        )));
    }
    decode(&[output], raw)
        .map_err(|e| CollaboratorError::Malformed(format!("{}: {}", signature, e)))?
        .into_iter()
        .next()
        .ok_or_else(|| CollaboratorError::Malformed(format!("{} returned nothing", signature)))
}

fn as_u64(signature: &str, token: Token) -> Result<u64, CollaboratorError> {
    match token {
        Token::Uint(value) if value <= u64::MAX.into() => Ok(value.as_u64()),
        other => Err(CollaboratorError::Malformed(format!(
            "{} returned {:?}",
            signature, other
        ))),
    }
}

fn as_addresses(signature: &str, token: Token) -> Result<Vec<Address>, CollaboratorError> {
    match token {
        Token::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Token::Address(address) => Ok(address),
                other => Err(CollaboratorError::Malformed(format!(
                    "{} returned {:?}",
                    signature, other
                ))),
            })
            .collect(),
        other => Err(CollaboratorError::Malformed(format!(
            "{} returned {:?}",
            signature, other
        ))),
    }
}

#[async_trait]
impl AccountResolver for SafeAccountResolver {
    async fn fetch_account_config(
        &self,
        address: Address,
    ) -> Result<RawAccountConfig, CollaboratorError> {
        let threshold = self
            .view(address, "getThreshold()", ParamType::Uint(256))
            .await
            .and_then(|t| as_u64("getThreshold()", t))?;
        let owners = self
            .view(
                address,
                "getOwners()",
                ParamType::Array(Box::new(ParamType::Address)),
            )
            .await
            .and_then(|t| as_addresses("getOwners()", t))?;
        let nonce = self
            .view(address, "nonce()", ParamType::Uint(256))
            .await
            .and_then(|t| as_u64("nonce()", t))?;

        debug!(
            "Safe {:?}: threshold {}, {} owners, nonce {}",
            address,
            threshold,
            owners.len(),
            nonce
        );

        Ok(RawAccountConfig {
            threshold: Some(threshold),
            approvers: Some(owners),
            nonce: Some(nonce),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::encode;
    use ethers::types::U256;

    #[test]
    fn test_decodes_owner_list() {
        let owners = vec![Address::repeat_byte(1), Address::repeat_byte(2)];
        let raw = encode(&[Token::Array(
            owners.iter().copied().map(Token::Address).collect(),
        )]);

        let token = decode_single(
            "getOwners()",
            ParamType::Array(Box::new(ParamType::Address)),
            &raw,
        )
        .unwrap();
        assert_eq!(as_addresses("getOwners()", token).unwrap(), owners);
    }

    #[test]
    fn test_decodes_threshold() {
        let raw = encode(&[Token::Uint(U256::from(2))]);
        let token = decode_single("getThreshold()", ParamType::Uint(256), &raw).unwrap();
        assert_eq!(as_u64("getThreshold()", token).unwrap(), 2);
    }

    #[test]
    fn test_empty_return_data_is_malformed() {
        assert!(matches!(
            decode_single("nonce()", ParamType::Uint(256), &[]),
            Err(CollaboratorError::Malformed(_))
        ));
    }

    #[test]
    fn test_selectors() {
        assert_eq!(hex::encode(id("getThreshold()")), "e75235b8");
        assert_eq!(hex::encode(id("getOwners()")), "a0e67e2b");
        assert_eq!(hex::encode(id("nonce()")), "affed0e0");
    }
}
