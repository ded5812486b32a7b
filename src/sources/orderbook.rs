//! Order-book style venue queried through a rate proxy (Kyber network proxy).

use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    contract::abigen,
    providers::Middleware,
    types::{Address, U256},
};
use tracing::debug;

use crate::arbitrage::RawQuote;
use crate::errors::CycleError;
use crate::models::{SourceId, TradeSize};
use crate::sources::PriceSource;
use crate::utils::to_token_units;

abigen!(
    KyberNetworkProxy,
    r"[
        function getExpectedRate(address src, address dest, uint256 srcQty) view returns (uint256 expectedRate, uint256 slippageRate)
    ]",
);

/// Asset addresses as the proxy understands them.
#[derive(Debug, Clone, Copy)]
pub struct OrderBookPair {
    /// Base asset; the native-coin sentinel when the base is the chain's coin.
    pub base_token: Address,
    pub quote_token: Address,
    pub base_decimals: u8,
    pub quote_decimals: u8,
}

/// Handle for quoting the pair on an order-book rate proxy.
#[derive(Clone)]
pub struct OrderBookSource<M> {
    id: SourceId,
    proxy: KyberNetworkProxy<M>,
    pair: OrderBookPair,
}

impl<M: Middleware> OrderBookSource<M> {
    pub fn new(id: SourceId, client: Arc<M>, proxy_address: Address, pair: OrderBookPair) -> Self {
        Self {
            id,
            proxy: KyberNetworkProxy::new(proxy_address, client),
            pair,
        }
    }
}

/// The proxy answers 0 when it has no route for the requested size.
fn check_expected_rates(
    id: SourceId,
    quote_to_base_rate: U256,
    base_to_quote_rate: U256,
) -> Result<RawQuote, CycleError> {
    if quote_to_base_rate.is_zero() || base_to_quote_rate.is_zero() {
        return Err(CycleError::quote_unavailable(id, "proxy returned no route"));
    }
    Ok(RawQuote::OrderBook {
        quote_to_base_rate,
        base_to_quote_rate,
    })
}

#[async_trait]
impl<M: Middleware + 'static> PriceSource for OrderBookSource<M> {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        "kyber"
    }

    async fn fetch_raw(&self, trade_size: &TradeSize) -> Result<RawQuote, CycleError> {
        let OrderBookPair {
            base_token,
            quote_token,
            base_decimals,
            quote_decimals,
        } = self.pair;
        let quote_qty = to_token_units(trade_size.quote_amount, quote_decimals)
            .map_err(|e| CycleError::quote_unavailable(self.id, e))?;
        let base_qty = to_token_units(trade_size.base_amount, base_decimals)
            .map_err(|e| CycleError::quote_unavailable(self.id, e))?;

        // buy side: pay quote, receive base; sell side: pay base, receive quote
        let buy_call = self
            .proxy
            .get_expected_rate(quote_token, base_token, quote_qty);
        let sell_call = self
            .proxy
            .get_expected_rate(base_token, quote_token, base_qty);
        let ((quote_to_base_rate, _), (base_to_quote_rate, _)) =
            futures::try_join!(buy_call.call(), sell_call.call())
                .map_err(|e| CycleError::quote_unavailable(self.id, e))?;

        debug!(
            source = %self.id,
            %quote_to_base_rate,
            %base_to_quote_rate,
            "[KYBER] expected rates"
        );
        check_expected_rates(self.id, quote_to_base_rate, base_to_quote_rate)
    }
}
