//! Gas estimation for Safe execution transactions

use crate::chain::ChainProvider;
use crate::error::CollaboratorError;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::U256;
use tracing::debug;

/// Gas estimator for transactions
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    /// Buffer percentage for gas price
    gas_price_buffer_percent: u64,
}

impl GasEstimator {
    pub fn new() -> Self {
        Self {
            gas_limit_buffer_percent: 20,
            gas_price_buffer_percent: 10,
        }
    }

    /// Estimate the gas limit for a call, with buffer.
    ///
    /// A Safe that would revert (bad signatures, wrong nonce) fails here with
    /// `Rejected` before anything is sent.
    pub async fn estimate_gas_limit(
        &self,
        provider: &ChainProvider,
        tx: &TypedTransaction,
    ) -> Result<U256, CollaboratorError> {
        let estimate = provider.estimate_gas(tx).await?;
        let limit = self.with_buffer(estimate, self.gas_limit_buffer_percent);
        debug!("Gas estimate {} buffered to {}", estimate, limit);
        Ok(limit)
    }

    /// Current legacy gas price, with buffer
    pub async fn get_gas_price(&self, provider: &ChainProvider) -> Result<U256, CollaboratorError> {
        let price = provider.get_gas_price().await?;
        let buffered = self.with_buffer(price, self.gas_price_buffer_percent);
        debug!("Gas price for chain {}: {}", provider.chain_id(), buffered);
        Ok(buffered)
    }

    fn with_buffer(&self, value: U256, percent: u64) -> U256 {
        value + value * percent / 100
    }

    /// Calculate total cost in wei
    pub fn calculate_cost(gas_limit: U256, gas_price: U256) -> U256 {
        gas_limit * gas_price
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new()
    }
}
