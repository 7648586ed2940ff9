//! JSON-RPC provider with multi-endpoint support and automatic failover

use crate::error::CollaboratorError;

use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    chain_id: u64,
    /// HTTP providers, primary first
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    pub fn new(chain_id: u64, rpc_urls: &[String]) -> Result<Self, CollaboratorError> {
        let mut http_providers = Vec::new();

        for url in rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(500));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(CollaboratorError::Unavailable(format!(
                "no valid RPC providers for chain {}",
                chain_id
            )));
        }

        Ok(Self {
            chain_id,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain_id, next);
    }

    /// Read-only contract call with failover.
    ///
    /// A revert is reported as `Rejected` and not retried on other endpoints.
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, CollaboratorError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();

        for _ in 0..self.http_providers.len() {
            match self.http().call(&tx, None).await {
                Ok(result) => return Ok(result),
                Err(e) if RpcError::as_error_response(&e).is_some() => {
                    return Err(CollaboratorError::Rejected(e.to_string()))
                }
                Err(e) => {
                    warn!("eth_call on chain {} failed: {}", self.chain_id, e);
                    self.failover();
                }
            }
        }

        Err(CollaboratorError::Unavailable(
            "all providers failed eth_call".to_string(),
        ))
    }

    /// Get current block number with failover
    pub async fn get_block_number(&self) -> Result<u64, CollaboratorError> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!(
                        "Failed to get block number from chain {}: {}",
                        self.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(CollaboratorError::Unavailable(
            "all providers failed".to_string(),
        ))
    }

    /// Pending nonce of the sending account
    pub async fn get_transaction_count(&self, from: Address) -> Result<U256, CollaboratorError> {
        self.http()
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))
    }

    /// Estimate gas for a transaction; a revert during estimation is a rejection
    pub async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, CollaboratorError> {
        self.http().estimate_gas(tx, None).await.map_err(|e| {
            if RpcError::as_error_response(&e).is_some() {
                CollaboratorError::Rejected(e.to_string())
            } else {
                CollaboratorError::Unavailable(e.to_string())
            }
        })
    }

    pub async fn get_gas_price(&self) -> Result<U256, CollaboratorError> {
        self.http()
            .get_gas_price()
            .await
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))
    }

    /// Submit a signed transaction, returning its hash
    pub async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, CollaboratorError> {
        self.http()
            .send_raw_transaction(raw)
            .await
            .map(|pending| pending.tx_hash())
            .map_err(|e| {
                if RpcError::as_error_response(&e).is_some() {
                    CollaboratorError::Rejected(e.to_string())
                } else {
                    CollaboratorError::Unavailable(e.to_string())
                }
            })
    }

    /// Get transaction receipt
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, CollaboratorError> {
        self.http()
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.chain_id, e);
                false
            }
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}
