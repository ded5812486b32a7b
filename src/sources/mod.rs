//! Liquidity venues quoted every block.
//!
//! A venue only performs network reads and returns its [`RawQuote`]; unit
//! conversion is left to [`crate::arbitrage::normalize`].

use async_trait::async_trait;

use crate::arbitrage::{RawQuote, normalize};
use crate::errors::CycleError;
use crate::models::{Quote, SourceId, TradeSize};

pub mod orderbook;
pub mod pool;

pub use orderbook::OrderBookSource;
pub use pool::PoolSource;

#[async_trait]
pub trait PriceSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Human readable venue name for logs.
    fn name(&self) -> &str;

    /// Read the venue's raw answer for `trade_size`. Never mutates shared state.
    async fn fetch_raw(&self, trade_size: &TradeSize) -> Result<RawQuote, CycleError>;

    /// Fetch and normalize a fresh quote. Invalid rates surface as `QuoteUnavailable`.
    async fn quote(&self, trade_size: &TradeSize, block: u64) -> Result<Quote, CycleError> {
        let raw = self.fetch_raw(trade_size).await?;
        normalize(self.id(), &raw, block).map_err(|e| match e {
            CycleError::InvalidQuote { source_id, reason } => {
                CycleError::quote_unavailable(source_id, format!("invalid rate: {reason}"))
            }
            other => other,
        })
    }
}
