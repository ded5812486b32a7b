//! Configuration loader and application settings.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use url::Url;

use crate::errors::{AppError, Result};
use crate::models::TradeSize;

const DEFAULT_KYBER_PROXY: &str = "0x818E6FECD516Ecc3849DAf6845e3EC868087B755";
const DEFAULT_UNISWAP_FACTORY: &str = "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f";
const DEFAULT_DYDX_SOLO: &str = "0x1E0447b19BB6EcFdAe1e4AE1694b0C3659614e4e";
const DEFAULT_BASE_TOKEN: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"; // WETH
const DEFAULT_QUOTE_TOKEN: &str = "0x6B175474E89094C44Da98b954EedeAC495271d0F"; // DAI
/// Address the order-book proxy uses for the chain's native coin.
const DEFAULT_NATIVE_SENTINEL: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

/// Signing key, kept out of `Debug` output.
#[derive(Clone)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Local signer for `chain_id`.
    pub fn wallet(&self, chain_id: u64) -> Result<LocalWallet> {
        let wallet: LocalWallet = self.0.parse()?;
        Ok(wallet.with_chain_id(chain_id))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(***)")
    }
}

/// Consolidated application configuration, loaded once at start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Websocket RPC endpoint used for block headers, quotes and submission.
    pub ws_url: Url,
    /// Key of the account that submits trades. Optional in dry-run mode.
    pub private_key: Option<SecretKey>,
    /// Deployed flash-loan settlement contract.
    pub flashloan_address: Address,
    /// Lending pool the settlement contract borrows from.
    pub dydx_solo_address: Address,
    /// Order-book style rate proxy (source A).
    pub kyber_proxy_address: Address,
    /// Constant-product factory used to resolve the pair (source B).
    pub uniswap_factory_address: Address,
    pub base_token: Address,
    pub quote_token: Address,
    /// How the order-book proxy addresses the base asset.
    pub order_book_base_token: Address,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    /// Fixed trade size for every cycle.
    pub trade_size: TradeSize,
    /// Upper bound for each quote and estimation call.
    pub call_timeout: Duration,
    /// Upper bound for one submission, receipt included.
    pub submit_timeout: Duration,
    /// Consecutive failed resubscriptions tolerated before the block trigger gives up.
    pub max_resubscribes: u32,
    /// Log trades instead of submitting them.
    pub dry_run: bool,
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| {
            lookup(key).ok_or_else(|| AppError::Config(format!("Set {key} env var")))
        };

        let ws_url = Url::parse(&required("WS_URL")?)?;
        if !matches!(ws_url.scheme(), "ws" | "wss") {
            return Err(AppError::Config(format!(
                "WS_URL must be a websocket endpoint, got scheme {}",
                ws_url.scheme()
            )));
        }

        let dry_run = var("DRY_RUN", "0") == "1";
        let private_key = lookup("PRIVATE_KEY").map(SecretKey);
        if private_key.is_none() && !dry_run {
            return Err(AppError::Config(
                "Set PRIVATE_KEY env var (or DRY_RUN=1)".into(),
            ));
        }

        let base_amount: f64 = var("TRADE_BASE_AMOUNT", "100").parse()?;
        let recent_price: f64 = var("RECENT_BASE_PRICE", "1850").parse()?;
        if !(base_amount > 0.0 && recent_price > 0.0) {
            return Err(AppError::Config(
                "TRADE_BASE_AMOUNT and RECENT_BASE_PRICE must be positive".into(),
            ));
        }

        Ok(Self {
            ws_url,
            private_key,
            flashloan_address: parse_address("FLASHLOAN_ADDRESS", &required("FLASHLOAN_ADDRESS")?)?,
            dydx_solo_address: parse_address(
                "DYDX_SOLO_ADDRESS",
                &var("DYDX_SOLO_ADDRESS", DEFAULT_DYDX_SOLO),
            )?,
            kyber_proxy_address: parse_address(
                "KYBER_PROXY_ADDRESS",
                &var("KYBER_PROXY_ADDRESS", DEFAULT_KYBER_PROXY),
            )?,
            uniswap_factory_address: parse_address(
                "UNISWAP_FACTORY_ADDRESS",
                &var("UNISWAP_FACTORY_ADDRESS", DEFAULT_UNISWAP_FACTORY),
            )?,
            base_token: parse_address(
                "BASE_TOKEN_ADDRESS",
                &var("BASE_TOKEN_ADDRESS", DEFAULT_BASE_TOKEN),
            )?,
            quote_token: parse_address(
                "QUOTE_TOKEN_ADDRESS",
                &var("QUOTE_TOKEN_ADDRESS", DEFAULT_QUOTE_TOKEN),
            )?,
            order_book_base_token: parse_address(
                "NATIVE_TOKEN_SENTINEL",
                &var("NATIVE_TOKEN_SENTINEL", DEFAULT_NATIVE_SENTINEL),
            )?,
            base_decimals: var("BASE_DECIMALS", "18").parse()?,
            quote_decimals: var("QUOTE_DECIMALS", "18").parse()?,
            trade_size: TradeSize {
                base_amount,
                quote_amount: base_amount * recent_price,
            },
            call_timeout: Duration::from_millis(var("CALL_TIMEOUT_MS", "5000").parse()?),
            submit_timeout: Duration::from_millis(var("SUBMIT_TIMEOUT_MS", "120000").parse()?),
            max_resubscribes: var("MAX_RESUBSCRIBES", "5").parse()?,
            dry_run,
        })
    }
}

fn parse_address(key: &str, raw: &str) -> Result<Address> {
    Address::from_str(raw).map_err(|e| AppError::Config(format!("{key} is not an address: {e}")))
}
