//! Miscellaneous helper utilities.

use std::future::Future;
use std::time::Duration;

use ethers::types::U256;
use ethers::utils::{ConversionError, format_units, parse_units};
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize `tracing` subscriber with env-based filter.
///
/// If `RUST_LOG` is not set, defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Await `fut` for at most `limit`; a timeout becomes the error built by `on_timeout`.
pub async fn with_timeout<T, E, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce() -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_elapsed) => Err(on_timeout()),
    }
}

/// Convert a decimal token amount into its smallest on-chain unit.
pub fn to_token_units(amount: f64, decimals: u8) -> Result<U256, ConversionError> {
    // Fixed notation with exactly `decimals` digits so parse_units never sees excess precision
    let text = format!("{:.*}", usize::from(decimals), amount);
    Ok(parse_units(text, u32::from(decimals))?.into())
}

/// Convert an amount in wei into decimal native-asset units.
pub fn wei_to_native(wei: U256) -> Result<f64, ConversionError> {
    let text = format_units(wei, 18u32)?;
    Ok(text.parse::<f64>()?)
}
