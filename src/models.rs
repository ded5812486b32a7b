//! Shared data structures used throughout the application.

use std::fmt;

use ethers::types::{H256, U256};
use serde::Serialize;

use crate::errors::CycleError;

/// Identifies one of the two liquidity venues of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    SourceA,
    SourceB,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::SourceA => write!(f, "source-a"),
            SourceId::SourceB => write!(f, "source-b"),
        }
    }
}

/// Direction of the arbitrage: buy the base asset on one venue, sell it on the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    SourceAToSourceB,
    SourceBToSourceA,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::SourceAToSourceB, Direction::SourceBToSourceA];

    /// Venue the base asset is bought on.
    pub fn buy_source(self) -> SourceId {
        match self {
            Direction::SourceAToSourceB => SourceId::SourceA,
            Direction::SourceBToSourceA => SourceId::SourceB,
        }
    }

    /// Venue the base asset is sold on.
    pub fn sell_source(self) -> SourceId {
        match self {
            Direction::SourceAToSourceB => SourceId::SourceB,
            Direction::SourceBToSourceA => SourceId::SourceA,
        }
    }

    /// Direction argument understood by the settlement contract.
    pub fn contract_code(self) -> u8 {
        match self {
            Direction::SourceAToSourceB => 0,
            Direction::SourceBToSourceA => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::SourceAToSourceB => write!(f, "A->B"),
            Direction::SourceBToSourceA => write!(f, "B->A"),
        }
    }
}

/// Buy and sell rate of one venue, in quote-asset per unit of base-asset.
///
/// Both rates are finite and strictly positive; construction fails otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quote {
    source_id: SourceId,
    buy_rate: f64,
    sell_rate: f64,
    sampled_at_block: u64,
}

impl Quote {
    pub fn new(
        source_id: SourceId,
        buy_rate: f64,
        sell_rate: f64,
        sampled_at_block: u64,
    ) -> Result<Self, CycleError> {
        for (side, rate) in [("buy", buy_rate), ("sell", sell_rate)] {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(CycleError::invalid_quote(
                    source_id,
                    format!("{side} rate {rate} is not a positive finite number"),
                ));
            }
        }
        Ok(Self {
            source_id,
            buy_rate,
            sell_rate,
            sampled_at_block,
        })
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn buy_rate(&self) -> f64 {
        self.buy_rate
    }

    pub fn sell_rate(&self) -> f64 {
        self.sell_rate
    }

    pub fn sampled_at_block(&self) -> u64 {
        self.sampled_at_block
    }

    pub fn mid_rate(&self) -> f64 {
        (self.buy_rate + self.sell_rate) / 2.0
    }
}

/// Fixed trade size for the run, in decimal units of each asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TradeSize {
    pub base_amount: f64,
    pub quote_amount: f64,
}

/// Gas cost of executing one direction, sampled fresh every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostEstimate {
    pub direction: Direction,
    pub gas_units: u64,
    /// Gas price in native-asset units (wei / 10^18).
    pub gas_price: f64,
    /// Same gas price in wei, used verbatim on submission.
    pub gas_price_wei: U256,
}

impl CostEstimate {
    /// Total execution cost in native-asset units.
    pub fn native_cost(&self) -> f64 {
        self.gas_units as f64 * self.gas_price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfitInputs {
    pub quote_a: Quote,
    pub quote_b: Quote,
    pub cost: CostEstimate,
}

/// Expected net profit of one direction, in quote-asset units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfitResult {
    pub direction: Direction,
    pub expected_profit: f64,
    pub inputs: ProfitInputs,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub direction: Direction,
    pub submitted: bool,
    pub receipt_id: Option<String>,
    pub error: Option<CycleError>,
}

/// One new-block notification from the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockEvent {
    pub number: u64,
    pub hash: Option<H256>,
}

impl BlockEvent {
    pub fn new(number: u64) -> Self {
        Self { number, hash: None }
    }
}
