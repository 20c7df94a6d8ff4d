use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::BotConfig;
use crate::error::{StartupError, VenueError};
use crate::execution::{position_quantity, Executor, PositionReconciler, ReconcileAction, ReconcilePlan};
use crate::models::{Candle, Instrument, PositionState, TradeSignal};
use crate::pnl::{PnlReporter, PnlSummary};
use crate::risk::ProtectionRule;
use crate::strategy::Strategy;
use crate::venue::{MarketDataProvider, PnlSource, VenueGateway};

/// Source of time for the trading loop
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `tokio::time`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Step of the per-instrument pipeline that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    OpenOrders,
    Position,
    Candles,
    Execute,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleStage::OpenOrders => "open orders",
            CycleStage::Position => "position",
            CycleStage::Candles => "candles",
            CycleStage::Execute => "execute",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
pub struct InstrumentFailure {
    pub stage: CycleStage,
    pub error: VenueError,
}

/// What happened to one instrument in one cycle
#[derive(Debug)]
pub struct InstrumentOutcome {
    pub symbol: String,
    /// None when the instrument failed before a plan was made
    pub action: Option<ReconcileAction>,
    /// Mutations the venue accepted
    pub applied: usize,
    pub failure: Option<InstrumentFailure>,
}

impl InstrumentOutcome {
    fn failed(symbol: &str, stage: CycleStage, error: VenueError) -> Self {
        tracing::error!("❌ {}: {} failed: {}", symbol, stage, error);
        Self {
            symbol: symbol.to_string(),
            action: None,
            applied: 0,
            failure: Some(InstrumentFailure { stage, error }),
        }
    }
}

#[derive(Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub outcomes: Vec<InstrumentOutcome>,
    /// None when the PnL pass failed
    pub pnl: Option<PnlSummary>,
}

impl CycleReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.failure.is_some()).count()
    }

    /// Instruments whose venue state broke an invariant this cycle
    pub fn repairs(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.action.as_ref().is_some_and(|a| a.is_stale_state()))
            .count()
    }
}

/// Loop parameters taken from the bot configuration
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: String,
    pub candle_limit: usize,
    pub order_notional: Decimal,
    pub protection: ProtectionRule,
    pub instrument_delay: Duration,
    pub cycle_pause: Duration,
}

impl From<&BotConfig> for SchedulerSettings {
    fn from(config: &BotConfig) -> Self {
        Self {
            interval: config.interval.clone(),
            candle_limit: config.candle_limit,
            order_notional: config.order_notional,
            protection: config.protection.clone(),
            instrument_delay: config.instrument_delay(),
            cycle_pause: config.cycle_pause(),
        }
    }
}

/// Sequential trade loop: every instrument in order, then PnL, then pause
///
/// Each instrument is observed fresh, planned, and executed on its own, so a
/// failure on one never touches the others. Nothing is remembered between
/// cycles beyond the PnL dedupe set.
pub struct TradeCycleScheduler<G, M, S, St, C> {
    settings: SchedulerSettings,
    instruments: Vec<Instrument>,
    executor: Executor<G>,
    market: M,
    strategy: St,
    reconciler: PositionReconciler,
    pnl: PnlReporter<S>,
    clock: C,
    cycles_run: u64,
}

impl<G, M, S, St, C> TradeCycleScheduler<G, M, S, St, C>
where
    G: VenueGateway,
    M: MarketDataProvider,
    S: PnlSource,
    St: Strategy,
    C: Clock,
{
    pub fn new(
        settings: SchedulerSettings,
        instruments: Vec<Instrument>,
        gateway: G,
        market: M,
        strategy: St,
        pnl: PnlReporter<S>,
        clock: C,
    ) -> Self {
        let reconciler = PositionReconciler::new(settings.protection.clone());
        Self {
            settings,
            instruments,
            executor: Executor::new(gateway),
            market,
            strategy,
            reconciler,
            pnl,
            clock,
            cycles_run: 0,
        }
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn gateway(&self) -> &G {
        self.executor.gateway()
    }

    /// Run until `max_cycles` complete or `shutdown` turns true
    ///
    /// Shutdown is honored between instruments and during pauses, never in
    /// the middle of a venue call. Returns the number of completed cycles.
    pub async fn run(&mut self, max_cycles: Option<u64>, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut completed = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.run_cycle_until(&shutdown).await;
            if report.outcomes.len() < self.instruments.len() {
                tracing::info!("🛑 Shutdown requested mid-sweep, stopping");
                break;
            }
            completed += 1;

            if max_cycles.is_some_and(|max| completed >= max) {
                break;
            }

            tracing::info!("💤 Sleeping {}s until next cycle", self.settings.cycle_pause.as_secs());
            tokio::select! {
                _ = self.clock.sleep(self.settings.cycle_pause) => {}
                _ = shutdown_signalled(&mut shutdown) => {}
            }
        }

        completed
    }

    /// One sweep over every instrument followed by the PnL pass
    pub async fn run_cycle(&mut self) -> CycleReport {
        let (_tx, rx) = watch::channel(false);
        self.run_cycle_until(&rx).await
    }

    async fn run_cycle_until(&mut self, shutdown: &watch::Receiver<bool>) -> CycleReport {
        self.cycles_run += 1;
        let cycle = self.cycles_run;
        tracing::info!(
            "🕒 Cycle {} at {}: analyzing {} instruments",
            cycle,
            self.clock.now().format("%H:%M:%S"),
            self.instruments.len()
        );

        let mut outcomes = Vec::with_capacity(self.instruments.len());
        for instrument in &self.instruments {
            if *shutdown.borrow() {
                break;
            }

            outcomes.push(self.run_instrument(instrument).await);
            self.clock.sleep(self.settings.instrument_delay).await;
        }

        if outcomes.len() < self.instruments.len() {
            return CycleReport {
                cycle,
                outcomes,
                pnl: None,
            };
        }

        let pnl = match self.pnl.report(self.clock.now()).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::error!("❌ PnL logging failed: {}", e);
                None
            }
        };

        let report = CycleReport {
            cycle,
            outcomes,
            pnl,
        };
        if report.failures() > 0 {
            tracing::warn!("Cycle {} finished with {} failed instrument(s)", cycle, report.failures());
        }
        if report.repairs() > 0 {
            tracing::info!("Cycle {} repaired venue state for {} instrument(s)", cycle, report.repairs());
        }
        report
    }

    async fn run_instrument(&self, instrument: &Instrument) -> InstrumentOutcome {
        let symbol = instrument.symbol.as_str();
        let gateway = self.executor.gateway();
        tracing::info!("▶️  Analyzing {}", symbol);

        let orders = match gateway.open_orders(symbol).await {
            Ok(orders) => orders,
            Err(e) => return InstrumentOutcome::failed(symbol, CycleStage::OpenOrders, e),
        };

        let position = match gateway.position(symbol).await {
            Ok(position) => position,
            Err(e) => return InstrumentOutcome::failed(symbol, CycleStage::Position, e),
        };

        // Candles only matter when an entry is possible
        let mut signal = None;
        let mut quantity = Decimal::ZERO;
        if position.is_none() && orders.is_empty() {
            let candles = match self
                .market
                .candles(symbol, &self.settings.interval, self.settings.candle_limit)
                .await
            {
                Ok(candles) => candles,
                Err(e) => return InstrumentOutcome::failed(symbol, CycleStage::Candles, e),
            };

            let closed = closed_candles(candles, self.clock.now());
            let evaluated = self.strategy.evaluate(instrument, &closed);
            if evaluated.is_actionable() {
                quantity = position_quantity(
                    self.settings.order_notional,
                    evaluated.entry_price,
                    instrument.quantity_precision,
                );
            }
            signal = Some(evaluated);
        }

        let plan = self.reconciler.plan(
            instrument,
            position.as_ref(),
            &orders,
            signal.as_ref(),
            quantity,
        );
        log_plan(instrument, position.as_ref(), orders.len(), signal.as_ref(), quantity, &plan);

        let report = self.executor.apply(&plan).await;
        InstrumentOutcome {
            symbol: symbol.to_string(),
            action: Some(plan.action),
            applied: report.applied,
            failure: report.failure.map(|f| InstrumentFailure {
                stage: CycleStage::Execute,
                error: f.error,
            }),
        }
    }
}

/// Drop the still-forming candle(s) at the end of the series
pub fn closed_candles(mut candles: Vec<Candle>, now: DateTime<Utc>) -> Vec<Candle> {
    while candles.last().is_some_and(|c| !c.is_closed(now)) {
        candles.pop();
    }
    candles
}

fn log_plan(
    instrument: &Instrument,
    position: Option<&PositionState>,
    order_count: usize,
    signal: Option<&TradeSignal>,
    quantity: Decimal,
    plan: &ReconcilePlan,
) {
    let symbol = &instrument.symbol;
    match plan.action {
        ReconcileAction::CleanupStale => {
            tracing::warn!("🧹 {}: no position but {} TP/SL order(s) left, cancelling", symbol, order_count)
        }
        ReconcileAction::Idle => tracing::info!("{}: conditions not met", symbol),
        ReconcileAction::Enter => {
            if let Some(signal) = signal {
                tracing::info!(
                    "✅ {} | {:?} | price {} | qty {} | TP {} | SL {}",
                    symbol,
                    signal.direction,
                    signal.entry_price,
                    quantity,
                    signal.take_profit,
                    signal.stop_loss
                );
            }
        }
        ReconcileAction::SkipZeroQuantity => tracing::warn!(
            "{}: signal fired but quantity rounds to zero at {} decimals, skipping",
            symbol,
            instrument.quantity_precision
        ),
        ReconcileAction::ClearDuplicates => {
            tracing::warn!("❌ {}: {} TP/SL orders found, clearing duplicates", symbol, order_count)
        }
        ReconcileAction::RepairProtection => {
            if let Some(position) = position {
                tracing::warn!(
                    "🔁 {}: TP/SL incomplete for {:?} @ {}, rebuilding",
                    symbol,
                    position.side(),
                    position.entry_price
                );
            }
        }
        ReconcileAction::MissingEntryPrice => {
            tracing::error!("{}: open position reports no entry price, cannot rebuild TP/SL", symbol)
        }
        ReconcileAction::Steady => tracing::info!("⏸  {}: position open, TP/SL in place", symbol),
    }
}

/// Resolves once shutdown is requested; never if the sender is gone
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Resolve quantity and price precision for every configured symbol
///
/// A symbol without a LOT_SIZE filter falls back to `default_precision`, and
/// one without a tick size to `default_price_precision`. A symbol the venue
/// does not list is dropped. Any other failure is fatal.
pub async fn load_instruments<G: VenueGateway>(
    gateway: &G,
    symbols: &[String],
    default_precision: u32,
    default_price_precision: u32,
) -> Result<Vec<Instrument>, StartupError> {
    let mut instruments = Vec::with_capacity(symbols.len());

    for symbol in symbols {
        let quantity_precision = match gateway.instrument_precision(symbol).await {
            Ok(precision) => precision,
            Err(VenueError::MissingFilter(_)) => {
                tracing::warn!(
                    "⚠️  {}: no LOT_SIZE filter, using {} quantity decimals",
                    symbol,
                    default_precision
                );
                default_precision
            }
            Err(VenueError::UnknownSymbol(_)) => {
                tracing::error!("❌ {}: not listed on the venue, dropping", symbol);
                continue;
            }
            Err(e) => return Err(StartupError::Metadata(e)),
        };

        let price_precision = match gateway.price_precision(symbol).await {
            Ok(Some(precision)) => precision,
            Ok(None) => {
                tracing::debug!(
                    "{}: no tick size reported, using {} price decimals",
                    symbol,
                    default_price_precision
                );
                default_price_precision
            }
            Err(e) => return Err(StartupError::Metadata(e)),
        };

        instruments.push(Instrument {
            symbol: symbol.clone(),
            quantity_precision,
            price_precision,
        });
    }

    if instruments.is_empty() {
        return Err(StartupError::EmptyUniverse);
    }

    tracing::info!("✓ Loaded {} instruments", instruments.len());
    Ok(instruments)
}
