//! Flash-loan settlement contract: gas estimation and submission.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    contract::abigen,
    providers::Middleware,
    types::{Address, U64, U256},
};
use tracing::{error, info};

use crate::errors::{AppError, CycleError};
use crate::execution::{CostEstimator, Executor};
use crate::models::{CostEstimate, Direction, TradeSize};
use crate::utils::{to_token_units, wei_to_native};

abigen!(
    Flashloan,
    r"[
        function initiateFlashloan(address _solo, address _token, uint256 _amount, uint8 _direction)
    ]",
);

/// Static arguments of every `initiateFlashloan` call.
#[derive(Debug, Clone, Copy)]
pub struct FlashloanParams {
    pub contract: Address,
    /// Lending pool the loan is taken from.
    pub solo: Address,
    /// Borrowed asset (the quote asset).
    pub loan_token: Address,
    pub loan_decimals: u8,
}

/// Gas estimate as `u64`; zero or oversized estimates are rejected.
fn gas_units_from(direction: Direction, estimate: U256) -> Result<u64, CycleError> {
    if estimate.is_zero() || estimate > U256::from(u64::MAX) {
        return Err(CycleError::estimation_failed(
            direction,
            format!("implausible gas estimate {estimate}"),
        ));
    }
    Ok(estimate.low_u64())
}

/// Estimates the cost of `initiateFlashloan` for each direction.
pub struct GasCostEstimator<M> {
    client: Arc<M>,
    flashloan: Flashloan<M>,
    params: FlashloanParams,
    loan_amount: U256,
}

impl<M: Middleware + 'static> GasCostEstimator<M> {
    pub fn new(
        client: Arc<M>,
        params: FlashloanParams,
        trade_size: &TradeSize,
    ) -> Result<Self, AppError> {
        let loan_amount = to_token_units(trade_size.quote_amount, params.loan_decimals)?;
        Ok(Self {
            flashloan: Flashloan::new(params.contract, client.clone()),
            client,
            params,
            loan_amount,
        })
    }
}

#[async_trait]
impl<M: Middleware + 'static> CostEstimator for GasCostEstimator<M> {
    async fn estimate(&self, direction: Direction) -> Result<CostEstimate, CycleError> {
        let mut call = self.flashloan.initiate_flashloan(
            self.params.solo,
            self.params.loan_token,
            self.loan_amount,
            direction.contract_code(),
        );
        if let Some(from) = self.client.default_sender() {
            call = call.from(from);
        }

        let (gas_price_wei, gas_estimate) = futures::try_join!(
            async { self.client.get_gas_price().await.map_err(|e| e.to_string()) },
            async { call.estimate_gas().await.map_err(|e| e.to_string()) },
        )
        .map_err(|e| CycleError::estimation_failed(direction, e))?;

        let gas_units = gas_units_from(direction, gas_estimate)?;
        let gas_price =
            wei_to_native(gas_price_wei).map_err(|e| CycleError::estimation_failed(direction, e))?;

        Ok(CostEstimate {
            direction,
            gas_units,
            gas_price,
            gas_price_wei,
        })
    }
}

/// Submits `initiateFlashloan` through a signing middleware and waits for the receipt.
pub struct FlashloanExecutor<M> {
    flashloan: Flashloan<M>,
    params: FlashloanParams,
}

impl<M: Middleware + 'static> FlashloanExecutor<M> {
    pub fn new(client: Arc<M>, params: FlashloanParams) -> Self {
        Self {
            flashloan: Flashloan::new(params.contract, client),
            params,
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> Executor for FlashloanExecutor<M> {
    async fn execute(
        &self,
        direction: Direction,
        trade_size: &TradeSize,
        cost: &CostEstimate,
    ) -> Result<String, CycleError> {
        let rejected = |reason: String| CycleError::submission_rejected(direction, reason);

        let loan_amount = to_token_units(trade_size.quote_amount, self.params.loan_decimals)
            .map_err(|e| rejected(e.to_string()))?;
        let call = self
            .flashloan
            .initiate_flashloan(
                self.params.solo,
                self.params.loan_token,
                loan_amount,
                direction.contract_code(),
            )
            .legacy()
            .gas(cost.gas_units)
            .gas_price(cost.gas_price_wei);

        let pending = call.send().await.map_err(|e| rejected(e.to_string()))?;
        let tx_hash = pending.tx_hash();
        info!(%direction, ?tx_hash, "[EXECUTING] transaction sent");

        let receipt = pending
            .await
            .map_err(|e| rejected(e.to_string()))?
            .ok_or_else(|| rejected(format!("transaction {tx_hash:?} dropped from mempool")))?;

        if receipt.status == Some(U64::zero()) {
            error!(
                %direction,
                ?tx_hash,
                block = ?receipt.block_number,
                "[EXECUTING] settlement reverted"
            );
            return Err(rejected(format!("transaction {tx_hash:?} reverted")));
        }

        Ok(format!("{:?}", receipt.transaction_hash))
    }
}
