//! Constant-product pool venue (Uniswap V2 style pair).

use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    contract::abigen,
    providers::Middleware,
    types::{Address, U256},
};
use tracing::{debug, info};

use crate::arbitrage::RawQuote;
use crate::errors::{AppError, CycleError};
use crate::models::{SourceId, TradeSize};
use crate::sources::PriceSource;
use crate::utils::to_token_units;

abigen!(
    UniswapV2Factory,
    r"[
        function getPair(address tokenA, address tokenB) view returns (address pair)
    ]",
);

abigen!(
    UniswapV2Pair,
    r"[
        function token0() view returns (address)
        function getReserves() view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)
    ]",
);

/// Pool fee as numerator over 1000 (0.3%).
const FEE_NUMERATOR: u64 = 997;
const FEE_DENOMINATOR: u64 = 1000;

/// Output amount of a constant-product swap, fee included.
///
/// Returns zero when the pool has no liquidity or the arithmetic overflows.
pub fn get_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return U256::zero();
    }
    let out = || {
        let amount_in_with_fee = amount_in.checked_mul(U256::from(FEE_NUMERATOR))?;
        let numerator = amount_in_with_fee.checked_mul(reserve_out)?;
        let denominator = reserve_in
            .checked_mul(U256::from(FEE_DENOMINATOR))?
            .checked_add(amount_in_with_fee)?;
        numerator.checked_div(denominator)
    };
    out().unwrap_or_default()
}

/// Reserves ordered as (base, quote).
fn orient(reserve0: u128, reserve1: u128, base_is_token0: bool) -> (U256, U256) {
    if base_is_token0 {
        (U256::from(reserve0), U256::from(reserve1))
    } else {
        (U256::from(reserve1), U256::from(reserve0))
    }
}

/// Handle for quoting the pair on a constant-product pool.
///
/// The pair contract and its token orientation are resolved once; reserves are
/// re-read on every quote.
#[derive(Clone)]
pub struct PoolSource<M> {
    id: SourceId,
    pair: UniswapV2Pair<M>,
    base_is_token0: bool,
    base_decimals: u8,
    quote_decimals: u8,
}

impl<M: Middleware + 'static> PoolSource<M> {
    pub async fn new(
        id: SourceId,
        client: Arc<M>,
        factory_address: Address,
        base_token: Address,
        quote_token: Address,
        base_decimals: u8,
        quote_decimals: u8,
    ) -> Result<Self, AppError> {
        let factory = UniswapV2Factory::new(factory_address, client.clone());
        let pair_address = factory
            .get_pair(base_token, quote_token)
            .call()
            .await
            .map_err(|e| AppError::Contract(e.to_string()))?;
        if pair_address.is_zero() {
            return Err(AppError::Config(format!(
                "no pool for {base_token:?}/{quote_token:?} on factory {factory_address:?}"
            )));
        }

        let pair = UniswapV2Pair::new(pair_address, client);
        let token0 = pair
            .token_0()
            .call()
            .await
            .map_err(|e| AppError::Contract(e.to_string()))?;
        let base_is_token0 = token0 == base_token;
        info!(%id, ?pair_address, base_is_token0, "[INIT] constant-product pool resolved");

        Ok(Self {
            id,
            pair,
            base_is_token0,
            base_decimals,
            quote_decimals,
        })
    }
}

#[async_trait]
impl<M: Middleware + 'static> PriceSource for PoolSource<M> {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        "uniswap"
    }

    async fn fetch_raw(&self, trade_size: &TradeSize) -> Result<RawQuote, CycleError> {
        let quote_in = to_token_units(trade_size.quote_amount, self.quote_decimals)
            .map_err(|e| CycleError::quote_unavailable(self.id, e))?;
        let base_in = to_token_units(trade_size.base_amount, self.base_decimals)
            .map_err(|e| CycleError::quote_unavailable(self.id, e))?;

        let (reserve0, reserve1, _ts) = self
            .pair
            .get_reserves()
            .call()
            .await
            .map_err(|e| CycleError::quote_unavailable(self.id, e))?;
        let (reserve_base, reserve_quote) = orient(reserve0, reserve1, self.base_is_token0);
        debug!(source = %self.id, %reserve_base, %reserve_quote, "[UNISWAP] reserves");

        Ok(RawQuote::Pool {
            quote_in,
            base_out: get_amount_out(quote_in, reserve_quote, reserve_base),
            base_in,
            quote_out: get_amount_out(base_in, reserve_base, reserve_quote),
            base_decimals: self.base_decimals,
            quote_decimals: self.quote_decimals,
        })
    }
}
