//! Block-driven decision loop.
//!
//! Every block runs one cycle: sample both venues and both cost estimates
//! concurrently, evaluate each direction with complete data, and execute at most
//! one. Cycles never overlap. Blocks that arrive while a cycle is in flight wait
//! in a single slot, and a newer block replaces a waiting one.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{
    Stream, StreamExt,
    future::{BoxFuture, Fuse, FusedFuture, FutureExt},
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::arbitrage::{Decision, compute_profit, select_best};
use crate::errors::CycleError;
use crate::execution::{CostEstimator, Executor};
use crate::models::{
    BlockEvent, CostEstimate, Direction, ExecutionOutcome, ProfitResult, Quote, TradeSize,
};
use crate::sources::PriceSource;
use crate::utils::with_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Idle,
    Sampling,
    Evaluating,
    Executing,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "IDLE",
            EngineState::Sampling => "SAMPLING",
            EngineState::Evaluating => "EVALUATING",
            EngineState::Executing => "EXECUTING",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub trade_size: TradeSize,
    /// Bound on every quote and cost-estimation call.
    pub call_timeout: Duration,
    /// Bound on one submission, settlement included.
    pub submit_timeout: Duration,
}

/// Everything one cycle saw and decided.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub block: u64,
    pub quote_a: Option<Quote>,
    pub quote_b: Option<Quote>,
    pub costs: Vec<CostEstimate>,
    pub profits: Vec<ProfitResult>,
    pub decision: Decision,
    pub outcome: Option<ExecutionOutcome>,
    /// Contained failures: unavailable quotes, failed estimates, rejected submission.
    pub errors: Vec<CycleError>,
}

/// Why `DecisionEngine::run` returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The block stream closed; the trigger's own result says why.
    #[default]
    StreamEnded,
    /// The shutdown future resolved.
    Shutdown,
}

/// Counters returned when the engine stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineSummary {
    pub stopped_by: StopReason,
    pub blocks_received: u64,
    pub cycles: u64,
    pub triggers_coalesced: u64,
    pub submitted: u64,
    pub rejected: u64,
}

impl EngineSummary {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        match &report.outcome {
            Some(outcome) if outcome.submitted => self.submitted += 1,
            Some(_) => self.rejected += 1,
            None => {}
        }
    }
}

pub struct DecisionEngine {
    source_a: Arc<dyn PriceSource>,
    source_b: Arc<dyn PriceSource>,
    cost_estimator: Arc<dyn CostEstimator>,
    executor: Arc<dyn Executor>,
    settings: EngineSettings,
    state_tx: watch::Sender<EngineState>,
}

impl DecisionEngine {
    /// `source_a` and `source_b` are the venues behind `SourceId::SourceA` and
    /// `SourceId::SourceB`; directions are named after them.
    pub fn new(
        source_a: Arc<dyn PriceSource>,
        source_b: Arc<dyn PriceSource>,
        cost_estimator: Arc<dyn CostEstimator>,
        executor: Arc<dyn Executor>,
        settings: EngineSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(EngineState::Idle);
        Self {
            source_a,
            source_b,
            cost_estimator,
            executor,
            settings,
            state_tx,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    fn transition(&self, next: EngineState) {
        let prev = self.state_tx.send_replace(next);
        debug!(%prev, %next, "[STATE] transition");
    }

    /// Consume block triggers until the stream ends or `shutdown` resolves.
    ///
    /// At most one cycle runs at a time. When the stream ends the in-flight and
    /// queued cycles still run; on shutdown only the in-flight one is awaited.
    pub async fn run<S>(
        &self,
        mut triggers: S,
        shutdown: impl Future<Output = ()>,
    ) -> EngineSummary
    where
        S: Stream<Item = BlockEvent> + Unpin,
    {
        let mut summary = EngineSummary::default();
        let mut in_flight: Fuse<BoxFuture<'_, CycleReport>> = Fuse::terminated();
        let mut pending: Option<BlockEvent> = None;
        let mut triggers_done = false;
        tokio::pin!(shutdown);

        info!("[INIT] decision engine waiting for blocks");
        loop {
            if in_flight.is_terminated() {
                match pending.take() {
                    Some(block) => in_flight = self.run_cycle(block).boxed().fuse(),
                    None if triggers_done => break,
                    None => {}
                }
            }

            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(queued = ?pending.map(|b| b.number), "[IDLE] shutdown requested");
                    if !in_flight.is_terminated() {
                        let report = (&mut in_flight).await;
                        summary.record(&report);
                    }
                    summary.stopped_by = StopReason::Shutdown;
                    break;
                }

                report = &mut in_flight, if !in_flight.is_terminated() => {
                    summary.record(&report);
                }

                next = triggers.next(), if !triggers_done => match next {
                    Some(block) => {
                        summary.blocks_received += 1;
                        info!(block = block.number, "[BLOCK] new block");
                        if in_flight.is_terminated() {
                            in_flight = self.run_cycle(block).boxed().fuse();
                        } else if let Some(dropped) = pending.replace(block) {
                            summary.triggers_coalesced += 1;
                            info!(
                                dropped = dropped.number,
                                queued = block.number,
                                "[COALESCE] replaced queued block"
                            );
                        } else {
                            debug!(
                                queued = block.number,
                                "[COALESCE] cycle in flight, block queued"
                            );
                        }
                    }
                    None => {
                        triggers_done = true;
                        info!("[TRIGGER] block stream ended");
                    }
                },
            }
        }

        info!(
            stopped_by = ?summary.stopped_by,
            blocks = summary.blocks_received,
            cycles = summary.cycles,
            coalesced = summary.triggers_coalesced,
            submitted = summary.submitted,
            rejected = summary.rejected,
            "[IDLE] decision engine stopped"
        );
        summary
    }

    /// One full cycle for `block`, from sampling back to idle.
    #[instrument(name = "cycle", skip_all, fields(block = block.number))]
    pub async fn run_cycle(&self, block: BlockEvent) -> CycleReport {
        let number = block.number;
        self.transition(EngineState::Sampling);
        info!(block = number, "[SAMPLING] requesting quotes and cost estimates");

        let (quote_a, quote_b, cost_ab, cost_ba) = tokio::join!(
            self.sample_quote(self.source_a.as_ref(), number),
            self.sample_quote(self.source_b.as_ref(), number),
            self.sample_cost(Direction::SourceAToSourceB),
            self.sample_cost(Direction::SourceBToSourceA),
        );

        let mut errors = Vec::new();
        let quote_a = quote_a.map_err(|e| errors.push(e)).ok();
        let quote_b = quote_b.map_err(|e| errors.push(e)).ok();
        let costs: Vec<CostEstimate> = [cost_ab, cost_ba]
            .into_iter()
            .filter_map(|res| res.map_err(|e| errors.push(e)).ok())
            .collect();

        self.transition(EngineState::Evaluating);
        // a missing quote disqualifies both directions, a missing cost only its own
        let profits: Vec<ProfitResult> = match (&quote_a, &quote_b) {
            (Some(a), Some(b)) => costs
                .iter()
                .map(|cost| compute_profit(a, b, &self.settings.trade_size, cost))
                .collect(),
            _ => Vec::new(),
        };
        for p in &profits {
            info!(
                block = number,
                direction = %p.direction,
                buy_a = p.inputs.quote_a.buy_rate(),
                sell_a = p.inputs.quote_a.sell_rate(),
                buy_b = p.inputs.quote_b.buy_rate(),
                sell_b = p.inputs.quote_b.sell_rate(),
                gas_units = p.inputs.cost.gas_units,
                profit = p.expected_profit,
                "[EVALUATING] direction evaluated"
            );
        }

        let decision = select_best(&profits);
        let outcome = match decision {
            Decision::Execute(best) => {
                info!(
                    block = number,
                    direction = %best.direction,
                    profit = best.expected_profit,
                    "[OPP] executing profitable direction"
                );
                self.transition(EngineState::Executing);
                Some(self.execute(best.direction, &best.inputs.cost).await)
            }
            Decision::Ambiguous { profit } => {
                warn!(
                    block = number,
                    profit,
                    "[EVALUATING] directions tie exactly, executing neither"
                );
                None
            }
            Decision::Unprofitable => {
                info!(block = number, "[EVALUATING] no profitable direction");
                None
            }
            Decision::Incomplete => {
                info!(block = number, "[EVALUATING] no direction with complete data");
                None
            }
        };
        if let Some(ExecutionOutcome {
            error: Some(e), ..
        }) = &outcome
        {
            errors.push(e.clone());
        }

        self.transition(EngineState::Idle);
        let report = CycleReport {
            block: number,
            quote_a,
            quote_b,
            costs,
            profits,
            decision,
            outcome,
            errors,
        };
        info!(block = number, failures = report.errors.len(), "[IDLE] cycle complete");
        debug!(
            report = %serde_json::to_string(&report).unwrap_or_default(),
            "[IDLE] cycle report"
        );
        report
    }

    async fn sample_quote(
        &self,
        source: &dyn PriceSource,
        block: u64,
    ) -> Result<Quote, CycleError> {
        let limit = self.settings.call_timeout;
        let res = with_timeout(
            limit,
            source.quote(&self.settings.trade_size, block),
            || CycleError::quote_unavailable(source.id(), format!("no answer within {limit:?}")),
        )
        .await;
        match &res {
            Ok(q) => debug!(
                source = %q.source_id(),
                venue = source.name(),
                buy = q.buy_rate(),
                sell = q.sell_rate(),
                "[SAMPLING] quote received"
            ),
            Err(e) => warn!(venue = source.name(), error = %e, "[SAMPLING] quote unavailable"),
        }
        res
    }

    async fn sample_cost(&self, direction: Direction) -> Result<CostEstimate, CycleError> {
        let limit = self.settings.call_timeout;
        let res = with_timeout(limit, self.cost_estimator.estimate(direction), || {
            CycleError::estimation_failed(direction, format!("no answer within {limit:?}"))
        })
        .await;
        match &res {
            Ok(c) => debug!(
                %direction,
                gas_units = c.gas_units,
                gas_price = c.gas_price,
                "[SAMPLING] cost estimated"
            ),
            Err(e) => warn!(%direction, error = %e, "[SAMPLING] cost estimation failed"),
        }
        res
    }

    async fn execute(&self, direction: Direction, cost: &CostEstimate) -> ExecutionOutcome {
        let limit = self.settings.submit_timeout;
        let res = with_timeout(
            limit,
            self.executor.execute(direction, &self.settings.trade_size, cost),
            || CycleError::submission_rejected(direction, format!("not settled within {limit:?}")),
        )
        .await;
        match res {
            Ok(receipt_id) => {
                info!(%direction, %receipt_id, "[EXECUTING] trade settled");
                ExecutionOutcome {
                    direction,
                    submitted: true,
                    receipt_id: Some(receipt_id),
                    error: None,
                }
            }
            Err(e) => {
                error!(%direction, error = %e, "[EXECUTING] submission rejected");
                ExecutionOutcome {
                    direction,
                    submitted: false,
                    receipt_id: None,
                    error: Some(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::{RawQuote, normalize};
    use crate::models::SourceId;
    use async_trait::async_trait;
    use ethers::types::U256;
    use futures::{SinkExt, future, stream};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Flags shared between mocks to observe cross-component timing.
    #[derive(Default)]
    struct Probe {
        executing: AtomicBool,
        sampled_while_executing: AtomicUsize,
    }

    struct MockSource {
        id: SourceId,
        buy: u64,
        sell: u64,
        delay: Duration,
        fail: bool,
        probe: Arc<Probe>,
        blocks: Mutex<Vec<u64>>,
    }

    impl MockSource {
        fn new(id: SourceId, buy: u64, sell: u64, probe: &Arc<Probe>) -> Self {
            Self {
                id,
                buy,
                sell,
                delay: Duration::ZERO,
                fail: false,
                probe: probe.clone(),
                blocks: Mutex::new(Vec::new()),
            }
        }

        fn sampled_blocks(&self) -> Vec<u64> {
            self.blocks.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PriceSource for MockSource {
        fn id(&self) -> SourceId {
            self.id
        }

        fn name(&self) -> &str {
            "mock"
        }

        async fn fetch_raw(&self, _trade_size: &TradeSize) -> Result<RawQuote, CycleError> {
            if self.fail {
                return Err(CycleError::quote_unavailable(self.id, "node unreachable"));
            }
            // one base unit against whole quote units
            Ok(RawQuote::Pool {
                quote_in: U256::from(self.buy),
                base_out: U256::one(),
                base_in: U256::one(),
                quote_out: U256::from(self.sell),
                base_decimals: 0,
                quote_decimals: 0,
            })
        }

        async fn quote(&self, trade_size: &TradeSize, block: u64) -> Result<Quote, CycleError> {
            self.blocks.lock().unwrap().push(block);
            if self.probe.executing.load(Ordering::SeqCst) {
                self.probe.sampled_while_executing.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(self.delay).await;
            let raw = self.fetch_raw(trade_size).await?;
            normalize(self.id, &raw, block)
        }
    }

    struct MockCost {
        gas_price: f64,
        fail: Option<Direction>,
        /// Direction whose estimate hangs for half a second.
        slow: Option<Direction>,
    }

    #[async_trait]
    impl CostEstimator for MockCost {
        async fn estimate(&self, direction: Direction) -> Result<CostEstimate, CycleError> {
            if self.slow == Some(direction) {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            if self.fail == Some(direction) {
                return Err(CycleError::estimation_failed(direction, "execution reverted"));
            }
            Ok(CostEstimate {
                direction,
                gas_units: 500_000,
                gas_price: self.gas_price,
                gas_price_wei: U256::zero(),
            })
        }
    }

    struct MockExecutor {
        delay: Duration,
        reject: bool,
        probe: Arc<Probe>,
        calls: Mutex<Vec<Direction>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl MockExecutor {
        fn new(delay: Duration, reject: bool, probe: &Arc<Probe>) -> Self {
            Self {
                delay,
                reject,
                probe: probe.clone(),
                calls: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> Vec<Direction> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Executor for MockExecutor {
        async fn execute(
            &self,
            direction: Direction,
            _trade_size: &TradeSize,
            _cost: &CostEstimate,
        ) -> Result<String, CycleError> {
            self.calls.lock().unwrap().push(direction);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.probe.executing.store(true, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            self.probe.executing.store(false, Ordering::SeqCst);
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.reject {
                return Err(CycleError::submission_rejected(direction, "price moved"));
            }
            Ok(format!("mock-{direction}"))
        }
    }

    /// About 50 quote units of gas at a 1841.25 conversion rate.
    const FIFTY_QUOTE_GAS_PRICE: f64 = 50.0 / 1841.25 / 500_000.0;

    fn settings() -> EngineSettings {
        EngineSettings {
            trade_size: TradeSize {
                base_amount: 100.0,
                quote_amount: 185_000.0,
            },
            call_timeout: Duration::from_millis(100),
            submit_timeout: Duration::from_secs(2),
        }
    }

    struct Fixture {
        probe: Arc<Probe>,
        source_a: Arc<MockSource>,
        source_b: Arc<MockSource>,
        executor: Arc<MockExecutor>,
        engine: DecisionEngine,
    }

    /// A: buy 1850 / sell 1840, B: buy 1830 / sell 1845. Only B->A pays.
    fn fixture(
        tweak_b: impl FnOnce(&mut MockSource),
        cost: MockCost,
        exec_delay: Duration,
        reject: bool,
        settings: EngineSettings,
    ) -> Fixture {
        let probe = Arc::new(Probe::default());
        let source_a = Arc::new(MockSource::new(SourceId::SourceA, 1850, 1840, &probe));
        let mut b = MockSource::new(SourceId::SourceB, 1830, 1845, &probe);
        tweak_b(&mut b);
        let source_b = Arc::new(b);
        let executor = Arc::new(MockExecutor::new(exec_delay, reject, &probe));
        let engine = DecisionEngine::new(
            source_a.clone(),
            source_b.clone(),
            Arc::new(cost),
            executor.clone(),
            settings,
        );
        Fixture {
            probe,
            source_a,
            source_b,
            executor,
            engine,
        }
    }

    fn default_cost() -> MockCost {
        MockCost {
            gas_price: FIFTY_QUOTE_GAS_PRICE,
            fail: None,
            slow: None,
        }
    }

    #[tokio::test]
    async fn worked_example_executes_b_to_a() {
        let fx = fixture(|_| {}, default_cost(), Duration::ZERO, false, settings());
        let report = fx.engine.run_cycle(BlockEvent::new(42)).await;

        assert_eq!(report.block, 42);
        assert_eq!(report.profits.len(), 2);
        assert!(report.errors.is_empty());
        let ab = &report.profits[0];
        let ba = &report.profits[1];
        assert_eq!(ab.direction, Direction::SourceAToSourceB);
        assert!((ab.expected_profit - -550.0).abs() < 1e-9);
        assert!((ba.expected_profit - 950.0).abs() < 1e-9);
        assert_eq!(report.decision, Decision::Execute(*ba));

        let outcome = report.outcome.expect("executed");
        assert!(outcome.submitted);
        assert_eq!(outcome.receipt_id.as_deref(), Some("mock-B->A"));
        assert_eq!(fx.executor.calls(), vec![Direction::SourceBToSourceA]);
        assert_eq!(report.quote_a.map(|q| q.sampled_at_block()), Some(42));
        assert_eq!(*fx.engine.subscribe_state().borrow(), EngineState::Idle);
    }

    #[tokio::test]
    async fn failed_estimate_excludes_only_its_direction() {
        let cost = MockCost {
            gas_price: FIFTY_QUOTE_GAS_PRICE,
            fail: Some(Direction::SourceAToSourceB),
            slow: None,
        };
        let fx = fixture(|_| {}, cost, Duration::ZERO, false, settings());
        let report = fx.engine.run_cycle(BlockEvent::new(1)).await;

        assert_eq!(report.profits.len(), 1);
        assert_eq!(report.profits[0].direction, Direction::SourceBToSourceA);
        assert!(matches!(
            report.errors.as_slice(),
            [CycleError::EstimationFailed {
                direction: Direction::SourceAToSourceB,
                ..
            }]
        ));
        assert_eq!(fx.executor.calls(), vec![Direction::SourceBToSourceA]);
    }

    #[tokio::test]
    async fn unavailable_source_makes_cycle_a_no_op() {
        let fx = fixture(|b| b.fail = true, default_cost(), Duration::ZERO, false, settings());
        let report = fx.engine.run_cycle(BlockEvent::new(1)).await;

        assert!(report.quote_a.is_some());
        assert!(report.quote_b.is_none());
        assert!(report.profits.is_empty());
        assert_eq!(report.decision, Decision::Incomplete);
        assert!(report.outcome.is_none());
        assert!(matches!(
            report.errors.as_slice(),
            [CycleError::QuoteUnavailable {
                source_id: SourceId::SourceB,
                ..
            }]
        ));
        assert!(fx.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn slow_source_times_out() {
        let mut s = settings();
        s.call_timeout = Duration::from_millis(20);
        let fx = fixture(
            |b| b.delay = Duration::from_millis(500),
            default_cost(),
            Duration::ZERO,
            false,
            s,
        );
        let report = fx.engine.run_cycle(BlockEvent::new(3)).await;

        assert_eq!(report.decision, Decision::Incomplete);
        assert!(matches!(
            report.errors.as_slice(),
            [CycleError::QuoteUnavailable {
                source_id: SourceId::SourceB,
                ..
            }]
        ));
        assert!(fx.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn slow_estimate_times_out_for_its_direction_only() {
        let mut s = settings();
        s.call_timeout = Duration::from_millis(20);
        let cost = MockCost {
            gas_price: FIFTY_QUOTE_GAS_PRICE,
            fail: None,
            slow: Some(Direction::SourceAToSourceB),
        };
        let fx = fixture(|_| {}, cost, Duration::ZERO, false, s);
        let report = fx.engine.run_cycle(BlockEvent::new(4)).await;

        assert_eq!(report.costs.len(), 1);
        assert_eq!(report.costs[0].direction, Direction::SourceBToSourceA);
        assert_eq!(report.profits.len(), 1);
        assert!(matches!(
            report.errors.as_slice(),
            [CycleError::EstimationFailed {
                direction: Direction::SourceAToSourceB,
                ..
            }]
        ));
        assert_eq!(fx.executor.calls(), vec![Direction::SourceBToSourceA]);
    }

    #[tokio::test]
    async fn slow_submission_is_rejected() {
        let mut s = settings();
        s.submit_timeout = Duration::from_millis(20);
        let fx = fixture(|_| {}, default_cost(), Duration::from_millis(500), false, s);
        let report = fx.engine.run_cycle(BlockEvent::new(5)).await;

        let outcome = report.outcome.expect("attempted");
        assert_eq!(outcome.direction, Direction::SourceBToSourceA);
        assert!(!outcome.submitted);
        assert!(outcome.receipt_id.is_none());
        assert!(matches!(
            outcome.error,
            Some(CycleError::SubmissionRejected {
                direction: Direction::SourceBToSourceA,
                ..
            })
        ));
        assert!(matches!(
            report.errors.as_slice(),
            [CycleError::SubmissionRejected { .. }]
        ));
        assert_eq!(*fx.engine.subscribe_state().borrow(), EngineState::Idle);
    }

    #[tokio::test]
    async fn exact_tie_executes_neither() {
        let probe = Arc::new(Probe::default());
        let executor = Arc::new(MockExecutor::new(Duration::ZERO, false, &probe));
        let engine = DecisionEngine::new(
            Arc::new(MockSource::new(SourceId::SourceA, 1830, 1845, &probe)),
            Arc::new(MockSource::new(SourceId::SourceB, 1830, 1845, &probe)),
            Arc::new(default_cost()),
            executor.clone(),
            settings(),
        );
        let report = engine.run_cycle(BlockEvent::new(9)).await;

        assert_eq!(report.profits.len(), 2);
        assert!(report.profits[0].expected_profit > 0.0);
        assert!(matches!(report.decision, Decision::Ambiguous { .. }));
        assert!(report.outcome.is_none());
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_submission_is_reported_and_engine_continues() {
        let fx = fixture(|_| {}, default_cost(), Duration::ZERO, true, settings());
        let blocks = stream::iter([BlockEvent::new(1), BlockEvent::new(2)]);
        let summary = fx.engine.run(blocks, future::pending()).await;

        assert_eq!(summary.blocks_received, 2);
        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.submitted, 0);
        assert_eq!(fx.executor.calls().len(), 2);

        let report = fx.engine.run_cycle(BlockEvent::new(3)).await;
        let outcome = report.outcome.expect("attempted");
        assert!(!outcome.submitted);
        assert!(matches!(
            outcome.error,
            Some(CycleError::SubmissionRejected { .. })
        ));
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn burst_of_blocks_coalesces_to_latest() {
        let fx = fixture(|_| {}, default_cost(), Duration::from_millis(50), false, settings());
        let blocks = stream::iter((1..=5).map(BlockEvent::new));
        let summary = fx.engine.run(blocks, future::pending()).await;

        assert_eq!(
            summary,
            EngineSummary {
                stopped_by: StopReason::StreamEnded,
                blocks_received: 5,
                cycles: 2,
                triggers_coalesced: 3,
                submitted: 2,
                rejected: 0,
            }
        );
        assert_eq!(fx.source_a.sampled_blocks(), vec![1, 5]);
        assert_eq!(fx.source_b.sampled_blocks(), vec![1, 5]);
        assert_eq!(fx.probe.sampled_while_executing.load(Ordering::SeqCst), 0);
        assert_eq!(fx.executor.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blocks_during_execution_wait_for_idle() {
        let fx = fixture(|_| {}, default_cost(), Duration::from_millis(100), false, settings());
        let (mut tx, rx) = futures::channel::mpsc::channel(8);
        let mut state = fx.engine.subscribe_state();

        let driver = async move {
            tx.send(BlockEvent::new(1)).await.unwrap();
            state
                .wait_for(|s| *s == EngineState::Executing)
                .await
                .unwrap();
            tx.send(BlockEvent::new(2)).await.unwrap();
            tx.send(BlockEvent::new(3)).await.unwrap();
        };
        let (summary, ()) = tokio::join!(fx.engine.run(rx, future::pending()), driver);

        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.triggers_coalesced, 1);
        assert_eq!(fx.source_a.sampled_blocks(), vec![1, 3]);
        assert_eq!(fx.probe.sampled_while_executing.load(Ordering::SeqCst), 0);
        assert_eq!(fx.executor.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(*fx.engine.subscribe_state().borrow(), EngineState::Idle);
    }

    #[tokio::test]
    async fn shutdown_stops_without_waiting_for_blocks() {
        let fx = fixture(|_| {}, default_cost(), Duration::ZERO, false, settings());
        let summary = fx
            .engine
            .run(stream::pending::<BlockEvent>(), future::ready(()))
            .await;
        assert_eq!(
            summary,
            EngineSummary {
                stopped_by: StopReason::Shutdown,
                ..EngineSummary::default()
            }
        );
    }

    #[test]
    fn report_serializes_decision_and_errors() {
        let report = CycleReport {
            block: 7,
            quote_a: None,
            quote_b: None,
            costs: Vec::new(),
            profits: Vec::new(),
            decision: Decision::Incomplete,
            outcome: None,
            errors: vec![CycleError::quote_unavailable(SourceId::SourceA, "timeout")],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["decision"]["decision"], "incomplete");
        assert_eq!(json["errors"][0]["kind"], "quote_unavailable");
        assert_eq!(json["errors"][0]["source_id"], "source_a");
    }
}
