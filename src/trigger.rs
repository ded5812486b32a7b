//! New-block subscription feeding the decision engine.

use std::time::Duration;

use ethers::providers::{Middleware, Provider, Ws};
use futures::{SinkExt, StreamExt, channel::mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

use crate::engine::StopReason;
use crate::errors::{AppError, Result};
use crate::models::BlockEvent;

/// Blocks buffered between the subscription and the engine's single-slot queue.
const TRIGGER_BUFFER: usize = 16;
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Spawn the block subscription worker.
///
/// Returns the stream of new blocks and the worker handle. The worker resubscribes
/// whenever the subscription ends and gives up after `max_resubscribes`
/// consecutive attempts that delivered no block; the stream then ends.
pub fn spawn_block_trigger(
    ws_url: Url,
    max_resubscribes: u32,
) -> (mpsc::Receiver<BlockEvent>, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(TRIGGER_BUFFER);
    let handle = tokio::spawn(run_trigger(ws_url, max_resubscribes, tx));
    (rx, handle)
}

/// Collect the trigger worker's result once the engine has stopped.
///
/// When the engine stopped because the block stream closed, the worker is awaited
/// so a lost subscription surfaces as an error. On shutdown it is aborted.
pub async fn finish_trigger(handle: JoinHandle<Result<()>>, stop: StopReason) -> Result<()> {
    match stop {
        StopReason::StreamEnded => handle
            .await
            .map_err(|e| AppError::Other(format!("block trigger task failed: {e}")))?,
        StopReason::Shutdown => {
            handle.abort();
            Ok(())
        }
    }
}

enum SubscriptionEnd {
    /// The engine dropped its receiver.
    ReceiverGone,
    /// The node closed the subscription after `delivered` blocks.
    Closed { delivered: usize },
}

async fn run_trigger(
    ws_url: Url,
    max_resubscribes: u32,
    mut tx: mpsc::Sender<BlockEvent>,
) -> Result<()> {
    let mut failures = 0u32;
    loop {
        match forward_blocks(&ws_url, &mut tx).await {
            Ok(SubscriptionEnd::ReceiverGone) => {
                info!("[TRIGGER] engine stopped listening, closing subscription");
                return Ok(());
            }
            Ok(SubscriptionEnd::Closed { delivered }) => {
                if delivered > 0 {
                    failures = 0;
                }
                warn!(delivered, "[TRIGGER] block subscription closed");
            }
            Err(e) => {
                warn!(error = %e, "[TRIGGER] block subscription failed");
            }
        }

        failures += 1;
        if failures > max_resubscribes {
            return Err(AppError::Other(format!(
                "block subscription lost after {max_resubscribes} resubscribe attempts"
            )));
        }
        info!(attempt = failures, "[TRIGGER] resubscribing to new blocks");
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}

async fn forward_blocks(
    ws_url: &Url,
    tx: &mut mpsc::Sender<BlockEvent>,
) -> Result<SubscriptionEnd> {
    let provider = Provider::<Ws>::connect(ws_url.as_str()).await?;
    let mut blocks = provider.subscribe_blocks().await?;
    info!("[TRIGGER] subscribed to new block headers");

    let mut delivered = 0usize;
    while let Some(block) = blocks.next().await {
        // pending headers carry no number
        let Some(number) = block.number else {
            continue;
        };
        let event = BlockEvent {
            number: number.as_u64(),
            hash: block.hash,
        };
        if tx.send(event).await.is_err() {
            return Ok(SubscriptionEnd::ReceiverGone);
        }
        delivered += 1;
    }
    Ok(SubscriptionEnd::Closed { delivered })
}
