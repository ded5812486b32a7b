//! Conversion of venue-specific raw quotes into decimal buy/sell rates.

use bigdecimal::BigDecimal;
use ethers::types::U256;
use num_bigint::{BigInt, BigUint};
use num_traits::{ToPrimitive, Zero};

use crate::errors::CycleError;
use crate::models::{Quote, SourceId};

/// Fixed-point scale of order-book expected rates (10^18).
pub const ORDER_BOOK_RATE_DECIMALS: u32 = 18;

/// Fractional digits kept after de-scaling, before conversion to `f64`.
const RATE_ROUND_DIGITS: i64 = 18;

/// Raw answer of a venue, before any unit conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawQuote {
    /// Expected rates scaled by 10^18. `quote_to_base_rate` is base received per quote
    /// paid, `base_to_quote_rate` is quote received per base paid.
    OrderBook {
        quote_to_base_rate: U256,
        base_to_quote_rate: U256,
    },
    /// Output amounts of a constant-product pool, in smallest token units.
    Pool {
        quote_in: U256,
        base_out: U256,
        base_in: U256,
        quote_out: U256,
        base_decimals: u8,
        quote_decimals: u8,
    },
}

/// Normalize a raw venue answer into a [`Quote`] in quote-asset per base-asset.
///
/// Pure and deterministic. Any rate that comes out zero, negative, NaN or
/// infinite is an `InvalidQuote`.
pub fn normalize(source_id: SourceId, raw: &RawQuote, block: u64) -> Result<Quote, CycleError> {
    let (buy, sell) = match raw {
        RawQuote::OrderBook {
            quote_to_base_rate,
            base_to_quote_rate,
        } => {
            let buy_side = descale(*quote_to_base_rate, ORDER_BOOK_RATE_DECIMALS);
            let sell_side = descale(*base_to_quote_rate, ORDER_BOOK_RATE_DECIMALS);
            (reciprocal(source_id, &buy_side)?, sell_side)
        }
        RawQuote::Pool {
            quote_in,
            base_out,
            base_in,
            quote_out,
            base_decimals,
            quote_decimals,
        } => {
            let base_dec = u32::from(*base_decimals);
            let quote_dec = u32::from(*quote_decimals);
            let buy = ratio(
                source_id,
                &descale(*quote_in, quote_dec),
                &descale(*base_out, base_dec),
            )?;
            let sell = ratio(
                source_id,
                &descale(*quote_out, quote_dec),
                &descale(*base_in, base_dec),
            )?;
            (buy, sell)
        }
    };

    Quote::new(
        source_id,
        to_rate(source_id, &buy)?,
        to_rate(source_id, &sell)?,
        block,
    )
}

fn descale(value: U256, decimals: u32) -> BigDecimal {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    let digits = BigInt::from(BigUint::from_bytes_be(&buf));
    BigDecimal::new(digits, i64::from(decimals))
}

fn reciprocal(source_id: SourceId, value: &BigDecimal) -> Result<BigDecimal, CycleError> {
    ratio(source_id, &BigDecimal::from(1), value)
}

fn ratio(
    source_id: SourceId,
    numerator: &BigDecimal,
    denominator: &BigDecimal,
) -> Result<BigDecimal, CycleError> {
    if denominator.is_zero() {
        return Err(CycleError::invalid_quote(source_id, "zero denominator"));
    }
    Ok(numerator / denominator)
}

fn to_rate(source_id: SourceId, value: &BigDecimal) -> Result<f64, CycleError> {
    value
        .round(RATE_ROUND_DIGITS)
        .to_f64()
        .ok_or_else(|| {
            CycleError::invalid_quote(source_id, format!("rate {value} not representable"))
        })
}
