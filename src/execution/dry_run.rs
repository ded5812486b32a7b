//! Executor for dry runs: trades are logged, never sent.

use async_trait::async_trait;
use tracing::info;

use crate::errors::CycleError;
use crate::execution::Executor;
use crate::models::{CostEstimate, Direction, TradeSize};

/// Executor that only logs the trade it would have submitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunExecutor;

#[async_trait]
impl Executor for DryRunExecutor {
    async fn execute(
        &self,
        direction: Direction,
        trade_size: &TradeSize,
        cost: &CostEstimate,
    ) -> Result<String, CycleError> {
        info!(
            %direction,
            base_amount = trade_size.base_amount,
            quote_amount = trade_size.quote_amount,
            gas_units = cost.gas_units,
            gas_price_wei = %cost.gas_price_wei,
            "[DRY-RUN] skipping submission"
        );
        Ok(format!("dry-run-{direction}"))
    }
}
