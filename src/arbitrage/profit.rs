//! Profit of each direction and the choice between them.

use serde::Serialize;

use crate::models::{CostEstimate, Direction, ProfitInputs, ProfitResult, Quote, TradeSize};

/// Rate used to convert native-asset gas cost into quote-asset units: the mean of
/// both venues' mid rates. Identical for both directions of a cycle.
pub fn conversion_rate(quote_a: &Quote, quote_b: &Quote) -> f64 {
    (quote_a.mid_rate() + quote_b.mid_rate()) / 2.0
}

/// Gas cost of `cost` expressed in quote-asset units.
pub fn cost_in_quote(quote_a: &Quote, quote_b: &Quote, cost: &CostEstimate) -> f64 {
    cost.native_cost() * conversion_rate(quote_a, quote_b)
}

/// Expected net profit, in quote-asset units, of trading `trade_size` in the
/// direction `cost` was estimated for.
///
/// A->B buys base on A at A's buy rate and sells it on B at B's sell rate;
/// B->A mirrors the roles.
pub fn compute_profit(
    quote_a: &Quote,
    quote_b: &Quote,
    trade_size: &TradeSize,
    cost: &CostEstimate,
) -> ProfitResult {
    let (buy_rate, sell_rate) = match cost.direction {
        Direction::SourceAToSourceB => (quote_a.buy_rate(), quote_b.sell_rate()),
        Direction::SourceBToSourceA => (quote_b.buy_rate(), quote_a.sell_rate()),
    };
    let gross = trade_size.base_amount * (sell_rate - buy_rate);
    let expected_profit = gross - cost_in_quote(quote_a, quote_b, cost);

    ProfitResult {
        direction: cost.direction,
        expected_profit,
        inputs: ProfitInputs {
            quote_a: *quote_a,
            quote_b: *quote_b,
            cost: *cost,
        },
    }
}

/// Outcome of comparing the profit of both directions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// No direction had complete data.
    Incomplete,
    /// No direction shows a strictly positive profit.
    Unprofitable,
    /// Both directions show the same positive profit; neither is executed.
    Ambiguous { profit: f64 },
    Execute(ProfitResult),
}

/// Pick the direction to execute.
///
/// Only strictly positive profits qualify. When both qualify the strictly larger
/// one wins and an exact tie executes neither, independent of input order.
pub fn select_best(results: &[ProfitResult]) -> Decision {
    if results.is_empty() {
        return Decision::Incomplete;
    }

    let mut best: Option<ProfitResult> = None;
    let mut tied = false;
    for result in results.iter().filter(|r| r.expected_profit > 0.0) {
        match best {
            None => best = Some(*result),
            Some(current) if result.expected_profit > current.expected_profit => {
                best = Some(*result);
                tied = false;
            }
            Some(current) if result.expected_profit == current.expected_profit => tied = true,
            Some(_) => {}
        }
    }

    match best {
        None => Decision::Unprofitable,
        Some(best) if tied => Decision::Ambiguous {
            profit: best.expected_profit,
        },
        Some(best) => Decision::Execute(best),
    }
}
