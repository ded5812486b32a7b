//! Cost estimation and trade submission against the settlement contract.

use async_trait::async_trait;

use crate::errors::CycleError;
use crate::models::{CostEstimate, Direction, TradeSize};

pub mod dry_run;
pub mod flashloan;

pub use dry_run::DryRunExecutor;
pub use flashloan::{FlashloanExecutor, FlashloanParams, GasCostEstimator};

#[async_trait]
pub trait CostEstimator: Send + Sync {
    /// Current gas price and gas units for executing `direction`.
    ///
    /// Fails with `EstimationFailed` if either network read fails.
    async fn estimate(&self, direction: Direction) -> Result<CostEstimate, CycleError>;
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Submit one trade and return its receipt id.
    ///
    /// `cost` is the estimate the decision was priced with; its gas limit and price
    /// are used for the submission. Fails with `SubmissionRejected`, never retried.
    async fn execute(
        &self,
        direction: Direction,
        trade_size: &TradeSize,
        cost: &CostEstimate,
    ) -> Result<String, CycleError>;
}
