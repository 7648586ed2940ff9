//! Sends `execTransaction` for an approved Safe transaction

use super::gas::GasEstimator;
use crate::chain::ChainProvider;
use crate::config::{CoordinatorConfig, WalletConfig};
use crate::coordination::{BroadcastReceipt, Broadcaster};
use crate::error::{CollaboratorError, CoordinatorError, CoordinatorResult};
use crate::ledger::CountedApproval;
use crate::record::TransactionRecord;

use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::utils::id;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const EXEC_TRANSACTION: &str = "execTransaction(address,uint256,bytes,uint8,uint256,uint256,uint256,address,address,bytes)";

/// Broadcaster that submits the Safe transaction from a local wallet
pub struct SafeExecutor {
    provider: Arc<ChainProvider>,
    account: Address,
    wallet: LocalWallet,
    gas_estimator: GasEstimator,
    confirmation_blocks: usize,
    poll_interval: Duration,
    /// One execution transaction in flight per sender
    send_lock: Mutex<()>,
}

impl SafeExecutor {
    pub fn new(
        provider: Arc<ChainProvider>,
        config: &CoordinatorConfig,
        wallet: LocalWallet,
    ) -> CoordinatorResult<Self> {
        let account = Address::from_str(&config.account_address)
            .map_err(|e| CoordinatorError::Config(format!("Invalid account address: {}", e)))?;

        if let Some(sender) = config.sender_identity.as_deref().filter(|s| !s.is_empty()) {
            let expected = Address::from_str(sender)
                .map_err(|e| CoordinatorError::Config(format!("Invalid sender identity: {}", e)))?;
            if expected != wallet.address() {
                return Err(CoordinatorError::Config(format!(
                    "wallet key is for {:?}, sender identity is {:?}",
                    wallet.address(),
                    expected
                )));
            }
        }

        let wallet = wallet.with_chain_id(config.chain_id);
        info!("Safe executor initialized with wallet: {:?}", wallet.address());

        Ok(Self {
            provider,
            account,
            wallet,
            gas_estimator: GasEstimator::new(),
            confirmation_blocks: config.confirmation_blocks,
            poll_interval: Duration::from_secs(2),
            send_lock: Mutex::new(()),
        })
    }

    /// Load the sender wallet from the configured environment variable
    pub fn load_wallet(config: &WalletConfig) -> CoordinatorResult<Option<LocalWallet>> {
        let Some(var) = config.private_key_env.as_deref().filter(|v| !v.is_empty()) else {
            return Ok(None);
        };

        match std::env::var(var) {
            Ok(key) => key
                .trim()
                .trim_start_matches("0x")
                .parse::<LocalWallet>()
                .map(Some)
                .map_err(|e| CoordinatorError::Config(format!("Invalid private key in {}: {}", var, e))),
            Err(_) => {
                warn!("{} is not set, execution will be unavailable", var);
                Ok(None)
            }
        }
    }

    pub fn wallet_address(&self) -> Address {
        self.wallet.address()
    }

    async fn send(&self, calldata: Bytes) -> Result<H256, CollaboratorError> {
        let _guard = self.send_lock.lock().await;
        let from = self.wallet.address();

        let nonce = self.provider.get_transaction_count(from).await?;
        let request: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(self.account)
            .data(calldata)
            .nonce(nonce)
            .chain_id(self.provider.chain_id())
            .into();

        let gas_limit = self.gas_estimator.estimate_gas_limit(&self.provider, &request).await?;
        let gas_price = self.gas_estimator.get_gas_price(&self.provider).await?;
        debug!(
            "Execution cost up to {} wei",
            GasEstimator::calculate_cost(gas_limit, gas_price)
        );

        let mut tx = request;
        tx.set_gas(gas_limit);
        tx.set_gas_price(gas_price);

        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("signing failed: {}", e)))?;

        let tx_hash = self.provider.send_raw_transaction(tx.rlp_signed(&signature)).await?;
        info!("Execution transaction sent: {:?} (nonce {})", tx_hash, nonce);
        Ok(tx_hash)
    }

    /// Poll until the transaction has the configured number of confirmations
    async fn wait_for_confirmations(&self, tx_hash: H256) -> Result<bool, CollaboratorError> {
        if self.confirmation_blocks == 0 {
            return Ok(false);
        }

        loop {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? {
                if receipt.status != Some(U64::one()) {
                    return Err(CollaboratorError::Rejected(format!(
                        "execution transaction {:?} reverted",
                        tx_hash
                    )));
                }

                if let Some(mined) = receipt.block_number {
                    let head = self.provider.get_block_number().await?;
                    let confirmations = head.saturating_sub(mined.as_u64()) + 1;
                    if confirmations >= self.confirmation_blocks as u64 {
                        info!("{:?} confirmed after {} blocks", tx_hash, confirmations);
                        return Ok(true);
                    }
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// ABI encoded `execTransaction` call carrying the counted approvals
pub fn exec_transaction_calldata(record: &TransactionRecord, approvals: &[CountedApproval]) -> Bytes {
    let mut sorted: Vec<&CountedApproval> = approvals.iter().collect();
    // The Safe contract requires owners in ascending address order
    sorted.sort_by_key(|a| a.identity);
    let signatures: Vec<u8> = sorted
        .iter()
        .flat_map(|a| a.signature.iter().copied())
        .collect();

    let mut calldata = id(EXEC_TRANSACTION).to_vec();
    calldata.extend(encode(&[
        Token::Address(record.to),
        Token::Uint(record.value),
        Token::Bytes(record.data.to_vec()),
        Token::Uint(U256::from(record.operation.as_u8())),
        Token::Uint(record.safe_tx_gas),
        Token::Uint(record.base_gas),
        Token::Uint(record.gas_price),
        Token::Address(record.gas_token),
        Token::Address(record.refund_receiver),
        Token::Bytes(signatures),
    ]));
    Bytes::from(calldata)
}

#[async_trait]
impl Broadcaster for SafeExecutor {
    async fn broadcast(
        &self,
        record: &TransactionRecord,
        approvals: &[CountedApproval],
    ) -> Result<BroadcastReceipt, CollaboratorError> {
        let calldata = exec_transaction_calldata(record, approvals);
        let tx_hash = self.send(calldata).await?;
        let confirmed = self.wait_for_confirmations(tx_hash).await?;

        Ok(BroadcastReceipt {
            external_tx_id: Some(format!("{:?}", tx_hash)),
            confirmed,
        })
    }
}
