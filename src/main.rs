use std::sync::Arc;

use anyhow::Result;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Middleware, Provider, Ws},
    signers::Signer,
};
use flash_arbitrage::{
    config::AppConfig,
    engine::{DecisionEngine, EngineSettings},
    execution::{DryRunExecutor, Executor, FlashloanExecutor, FlashloanParams, GasCostEstimator},
    models::SourceId,
    sources::{OrderBookSource, PoolSource, orderbook::OrderBookPair},
    trigger::{finish_trigger, spawn_block_trigger},
    utils,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let cfg = AppConfig::load()?;
    tracing::info!(
        dry_run = cfg.dry_run,
        base_amount = cfg.trade_size.base_amount,
        quote_amount = cfg.trade_size.quote_amount,
        flashloan = ?cfg.flashloan_address,
        "[INIT] flash-arbitrage starting"
    );

    let provider = Provider::<Ws>::connect(cfg.ws_url.as_str()).await?;
    let chain_id = provider.get_chainid().await?.as_u64();
    tracing::info!(chain_id, "[INIT] connected to node");

    match &cfg.private_key {
        Some(key) => {
            let wallet = key.wallet(chain_id)?;
            tracing::info!(sender = ?wallet.address(), "[INIT] signer loaded");
            let client = Arc::new(SignerMiddleware::new(provider, wallet));
            run(&cfg, client).await
        }
        None => run(&cfg, Arc::new(provider)).await,
    }
}

async fn run<M: Middleware + 'static>(cfg: &AppConfig, client: Arc<M>) -> Result<()> {
    let source_a = OrderBookSource::new(
        SourceId::SourceA,
        client.clone(),
        cfg.kyber_proxy_address,
        OrderBookPair {
            base_token: cfg.order_book_base_token,
            quote_token: cfg.quote_token,
            base_decimals: cfg.base_decimals,
            quote_decimals: cfg.quote_decimals,
        },
    );
    let source_b = PoolSource::new(
        SourceId::SourceB,
        client.clone(),
        cfg.uniswap_factory_address,
        cfg.base_token,
        cfg.quote_token,
        cfg.base_decimals,
        cfg.quote_decimals,
    )
    .await?;

    let params = FlashloanParams {
        contract: cfg.flashloan_address,
        solo: cfg.dydx_solo_address,
        loan_token: cfg.quote_token,
        loan_decimals: cfg.quote_decimals,
    };
    let cost_estimator = GasCostEstimator::new(client.clone(), params, &cfg.trade_size)?;
    let executor: Arc<dyn Executor> = if cfg.dry_run {
        tracing::info!("[INIT] dry run: trades are logged, not submitted");
        Arc::new(DryRunExecutor)
    } else {
        Arc::new(FlashloanExecutor::new(client, params))
    };

    let engine = DecisionEngine::new(
        Arc::new(source_a),
        Arc::new(source_b),
        Arc::new(cost_estimator),
        executor,
        EngineSettings {
            trade_size: cfg.trade_size,
            call_timeout: cfg.call_timeout,
            submit_timeout: cfg.submit_timeout,
        },
    );

    let (blocks, trigger) = spawn_block_trigger(cfg.ws_url.clone(), cfg.max_resubscribes);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c listener failed");
            std::future::pending::<()>().await;
        }
    };
    let summary = engine.run(blocks, shutdown).await;
    tracing::info!(
        summary = %serde_json::to_string(&summary)?,
        "[IDLE] engine summary"
    );

    finish_trigger(trigger, summary.stopped_by).await?;
    Ok(())
}
