//! Account metadata: required threshold and authorized approvers
//!
//! The coordinator only ever reads account metadata. It is fetched through an
//! [`AccountResolver`] and cached by the [`AccountDirectory`].

mod directory;

pub use directory::AccountDirectory;

use crate::config::StaticAccountConfig;
use crate::error::CollaboratorError;

use async_trait::async_trait;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A signer identity. Parsed addresses compare byte-wise, so two spellings
/// that differ only in letter case are the same identity.
pub type Identity = Address;

/// Account configuration as reported by a resolver, before normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAccountConfig {
    pub threshold: Option<u64>,
    pub approvers: Option<Vec<Identity>>,
    pub nonce: Option<u64>,
}

/// Normalized account configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub address: Address,
    pub threshold: usize,
    pub approvers: Vec<Identity>,
    pub nonce: Option<u64>,
}

impl AccountConfig {
    /// Single-party fallback used when nothing has been resolved yet
    pub fn fallback(address: Address) -> Self {
        Self {
            address,
            threshold: 1,
            approvers: Vec::new(),
            nonce: None,
        }
    }

    /// Normalize resolver output.
    ///
    /// A missing or zero threshold becomes 1, missing approvers become empty and
    /// duplicate approvers are collapsed keeping first-seen order. A threshold
    /// larger than a non-empty approver set is malformed.
    pub fn normalize(address: Address, raw: RawAccountConfig) -> Result<Self, CollaboratorError> {
        let threshold = raw.threshold.unwrap_or(1).max(1);
        let threshold = usize::try_from(threshold)
            .map_err(|_| CollaboratorError::Malformed(format!("threshold {} overflows", threshold)))?;

        let mut approvers: Vec<Identity> = Vec::new();
        for approver in raw.approvers.unwrap_or_default() {
            if !approvers.contains(&approver) {
                approvers.push(approver);
            }
        }

        if !approvers.is_empty() && threshold > approvers.len() {
            return Err(CollaboratorError::Malformed(format!(
                "threshold {} exceeds {} approvers",
                threshold,
                approvers.len()
            )));
        }

        Ok(Self {
            address,
            threshold,
            approvers,
            nonce: raw.nonce,
        })
    }

    /// Whether an identity is allowed to count toward the threshold
    pub fn is_authorized(&self, identity: &Identity) -> bool {
        self.approvers.is_empty() || self.approvers.contains(identity)
    }
}

/// Source of account metadata (threshold, approvers, nonce)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn fetch_account_config(
        &self,
        address: Address,
    ) -> Result<RawAccountConfig, CollaboratorError>;
}

/// Resolver returning an account config pinned in the configuration file
pub struct StaticAccountResolver {
    config: RawAccountConfig,
}

impl StaticAccountResolver {
    pub fn new(config: RawAccountConfig) -> Self {
        Self { config }
    }

    pub fn from_settings(settings: &StaticAccountConfig) -> Result<Self, CollaboratorError> {
        let approvers = settings
            .approvers
            .iter()
            .map(|a| {
                Address::from_str(a)
                    .map_err(|e| CollaboratorError::Malformed(format!("approver {}: {}", a, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(RawAccountConfig {
            threshold: Some(settings.threshold),
            approvers: Some(approvers),
            nonce: settings.nonce,
        }))
    }
}

#[async_trait]
impl AccountResolver for StaticAccountResolver {
    async fn fetch_account_config(
        &self,
        _address: Address,
    ) -> Result<RawAccountConfig, CollaboratorError> {
        Ok(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_zero_threshold_normalized_to_one() {
        let config = AccountConfig::normalize(
            addr(0xaa),
            RawAccountConfig {
                threshold: Some(0),
                approvers: None,
                nonce: None,
            },
        )
        .unwrap();

        assert_eq!(config.threshold, 1);
        assert!(config.approvers.is_empty());
    }

    #[test]
    fn test_duplicate_approvers_collapsed() {
        let config = AccountConfig::normalize(
            addr(0xaa),
            RawAccountConfig {
                threshold: Some(2),
                approvers: Some(vec![addr(1), addr(2), addr(1)]),
                nonce: Some(7),
            },
        )
        .unwrap();

        assert_eq!(config.approvers, vec![addr(1), addr(2)]);
        assert_eq!(config.nonce, Some(7));
    }

    #[test]
    fn test_threshold_above_approvers_is_malformed() {
        let result = AccountConfig::normalize(
            addr(0xaa),
            RawAccountConfig {
                threshold: Some(3),
                approvers: Some(vec![addr(1), addr(2)]),
                nonce: None,
            },
        );

        assert!(matches!(result, Err(CollaboratorError::Malformed(_))));
    }

    #[test]
    fn test_mixed_case_approvers_are_one_identity() {
        let settings = StaticAccountConfig {
            threshold: 1,
            approvers: vec![
                "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd".to_string(),
                "0xABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD".to_string(),
            ],
            nonce: None,
        };
        let resolver = StaticAccountResolver::from_settings(&settings).unwrap();
        let config = AccountConfig::normalize(addr(0xaa), resolver.config.clone()).unwrap();

        assert_eq!(config.approvers.len(), 1);
    }

    #[test]
    fn test_empty_approvers_authorize_everyone() {
        let config = AccountConfig::fallback(addr(0xaa));
        assert!(config.is_authorized(&addr(9)));
    }
}
