#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use futuresbot::error::{VenueError, VenueResult};
use futuresbot::models::{
    Candle, Instrument, OrderSide, PnlRecord, PositionSide, PositionState, ProtectiveKind,
    ProtectiveOrder,
};
use futuresbot::persistence::PnlLog;
use futuresbot::pnl::PnlReporter;
use futuresbot::scheduler::{Clock, SchedulerSettings, TradeCycleScheduler};
use futuresbot::strategy::MeanReversionStrategy;
use futuresbot::venue::{MarketDataProvider, PnlSource, VenueGateway};
use futuresbot::BotConfig;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

// ============================================================================
// In-memory venue
// ============================================================================

/// Venue call that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    OpenOrders,
    Position,
    Cancel,
    MarketOrder,
    TakeProfit,
    StopLoss,
    Precision,
}

#[derive(Default)]
struct VenueState {
    positions: HashMap<String, PositionState>,
    orders: Vec<ProtectiveOrder>,
    mark_prices: HashMap<String, Decimal>,
    precisions: HashMap<String, Option<u32>>,
    tick_precisions: HashMap<String, u32>,
    unlisted: Vec<String>,
    failures: Vec<(Op, String)>,
    writes: Vec<String>,
    next_order_id: u64,
}

/// Single-account venue: market orders fill at the mark price, trigger
/// orders rest until cancelled
#[derive(Clone, Default)]
pub struct InMemoryVenue {
    state: Arc<Mutex<VenueState>>,
}

impl InMemoryVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&self, symbol: &str, quantity: &str, entry_price: &str) {
        self.state.lock().unwrap().positions.insert(
            symbol.to_string(),
            PositionState {
                symbol: symbol.to_string(),
                quantity: dec(quantity),
                entry_price: dec(entry_price),
            },
        );
    }

    pub fn add_order(&self, symbol: &str, kind: ProtectiveKind, side: OrderSide, trigger: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_order_id += 1;
        let order_id = state.next_order_id;
        state.orders.push(ProtectiveOrder {
            symbol: symbol.to_string(),
            order_id,
            kind,
            side,
            trigger_price: dec(trigger),
        });
        order_id
    }

    pub fn set_mark_price(&self, symbol: &str, price: &str) {
        self.state
            .lock()
            .unwrap()
            .mark_prices
            .insert(symbol.to_string(), dec(price));
    }

    pub fn set_precision(&self, symbol: &str, precision: Option<u32>) {
        self.state
            .lock()
            .unwrap()
            .precisions
            .insert(symbol.to_string(), precision);
    }

    pub fn set_tick_precision(&self, symbol: &str, precision: u32) {
        self.state
            .lock()
            .unwrap()
            .tick_precisions
            .insert(symbol.to_string(), precision);
    }

    pub fn delist(&self, symbol: &str) {
        self.state.lock().unwrap().unlisted.push(symbol.to_string());
    }

    /// Fail the next `op` for `symbol` once
    pub fn fail_once(&self, op: Op, symbol: &str) {
        self.state.lock().unwrap().failures.push((op, symbol.to_string()));
    }

    pub fn orders(&self, symbol: &str) -> Vec<ProtectiveOrder> {
        self.state
            .lock()
            .unwrap()
            .orders
            .iter()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect()
    }

    pub fn position_of(&self, symbol: &str) -> Option<PositionState> {
        self.state.lock().unwrap().positions.get(symbol).cloned()
    }

    /// Every accepted write, in order
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    fn check(&self, op: Op, symbol: &str) -> VenueResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(index) = state.failures.iter().position(|(o, s)| *o == op && s == symbol) {
            state.failures.remove(index);
            return Err(match op {
                Op::OpenOrders | Op::Position | Op::Precision => VenueError::RateLimited(429),
                _ => VenueError::Api {
                    status: 400,
                    code: -2021,
                    message: "Order would immediately trigger.".to_string(),
                },
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VenueGateway for InMemoryVenue {
    async fn open_orders(&self, symbol: &str) -> VenueResult<Vec<ProtectiveOrder>> {
        self.check(Op::OpenOrders, symbol)?;
        Ok(self.orders(symbol))
    }

    async fn position(&self, symbol: &str) -> VenueResult<Option<PositionState>> {
        self.check(Op::Position, symbol)?;
        Ok(self.position_of(symbol))
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> VenueResult<()> {
        self.check(Op::Cancel, symbol)?;
        let mut state = self.state.lock().unwrap();
        let before = state.orders.len();
        state.orders.retain(|o| o.order_id != order_id);
        if state.orders.len() == before {
            return Err(VenueError::Api {
                status: 400,
                code: -2011,
                message: "Unknown order sent.".to_string(),
            });
        }
        state.writes.push(format!("cancel {} {}", symbol, order_id));
        Ok(())
    }

    async fn place_market_order(&self, symbol: &str, side: OrderSide, quantity: Decimal) -> VenueResult<()> {
        self.check(Op::MarketOrder, symbol)?;
        let mut state = self.state.lock().unwrap();
        let price = state.mark_prices.get(symbol).copied().unwrap_or(Decimal::ONE_HUNDRED);
        let signed = match side {
            OrderSide::Buy => quantity,
            OrderSide::Sell => -quantity,
        };

        let existing = state.positions.get(symbol).map(|p| p.quantity).unwrap_or_default();
        let net = existing + signed;
        if net.is_zero() {
            state.positions.remove(symbol);
        } else {
            state.positions.insert(
                symbol.to_string(),
                PositionState {
                    symbol: symbol.to_string(),
                    quantity: net,
                    entry_price: price,
                },
            );
        }

        state.writes.push(format!("market {} {} {}", symbol, side, quantity));
        Ok(())
    }

    async fn place_protective_order(
        &self,
        symbol: &str,
        kind: ProtectiveKind,
        side: OrderSide,
        trigger_price: Decimal,
    ) -> VenueResult<()> {
        let op = match kind {
            ProtectiveKind::TakeProfit => Op::TakeProfit,
            ProtectiveKind::StopLoss => Op::StopLoss,
        };
        self.check(op, symbol)?;

        let mut state = self.state.lock().unwrap();
        state.next_order_id += 1;
        let order_id = state.next_order_id;
        state.orders.push(ProtectiveOrder {
            symbol: symbol.to_string(),
            order_id,
            kind,
            side,
            trigger_price,
        });
        state
            .writes
            .push(format!("{} {} {} {}", kind, symbol, side, trigger_price));
        Ok(())
    }

    async fn instrument_precision(&self, symbol: &str) -> VenueResult<u32> {
        self.check(Op::Precision, symbol)?;
        let state = self.state.lock().unwrap();
        if state.unlisted.iter().any(|s| s == symbol) {
            return Err(VenueError::UnknownSymbol(symbol.to_string()));
        }
        match state.precisions.get(symbol) {
            None => Ok(3),
            Some(None) => Err(VenueError::MissingFilter(symbol.to_string())),
            Some(Some(p)) => Ok(*p),
        }
    }

    async fn price_precision(&self, symbol: &str) -> VenueResult<Option<u32>> {
        Ok(self.state.lock().unwrap().tick_precisions.get(symbol).copied())
    }
}

/// Exactly one TP and one SL, both on the closing side of the position
pub fn is_fully_protected(venue: &InMemoryVenue, symbol: &str) -> bool {
    let Some(position) = venue.position_of(symbol) else {
        return false;
    };
    let exit = match position.side() {
        PositionSide::Long => OrderSide::Sell,
        PositionSide::Short => OrderSide::Buy,
    };
    let orders = venue.orders(symbol);
    let count = |kind| orders.iter().filter(|o| o.kind == kind).count();

    orders.len() == 2
        && count(ProtectiveKind::TakeProfit) == 1
        && count(ProtectiveKind::StopLoss) == 1
        && orders.iter().all(|o| o.side == exit)
}

// ============================================================================
// Market data, PnL source, clock
// ============================================================================

#[derive(Clone, Default)]
pub struct FakeMarket {
    candles: Arc<Mutex<HashMap<String, Vec<Candle>>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeMarket {
    pub fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.candles.lock().unwrap().insert(symbol.to_string(), candles);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataProvider for FakeMarket {
    async fn candles(&self, symbol: &str, _interval: &str, limit: usize) -> VenueResult<Vec<Candle>> {
        self.requests.lock().unwrap().push(symbol.to_string());
        let candles = self
            .candles
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .unwrap_or_default();
        let skip = candles.len().saturating_sub(limit);
        Ok(candles.into_iter().skip(skip).collect())
    }
}

#[derive(Clone, Default)]
pub struct FakePnl {
    records: Arc<Mutex<Vec<PnlRecord>>>,
    fail_next: Arc<Mutex<bool>>,
}

impl FakePnl {
    /// Fail the next income query once
    pub fn fail_once(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    pub fn push(&self, at: DateTime<Utc>, symbol: &str, amount: &str) {
        self.records.lock().unwrap().push(PnlRecord {
            timestamp: at,
            symbol: symbol.to_string(),
            realized: dec(amount),
        });
    }
}

#[async_trait]
impl PnlSource for FakePnl {
    async fn realized_pnl(&self, since: DateTime<Utc>) -> VenueResult<Vec<PnlRecord>> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(VenueError::RateLimited(429));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.timestamp >= since)
            .cloned()
            .collect())
    }
}

/// Clock that advances only when slept on
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
    slept: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
            slept: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn total_slept(&self) -> Duration {
        *self.slept.lock().unwrap()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.slept.lock().unwrap() += duration;
        let step = ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::zero());
        *self.now.lock().unwrap() += step;
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Closed 15-minute candles ending before `now`, plus one still-forming bar
/// whose close would break any signal if it were not dropped
pub fn candles_ending_at(symbol: &str, closes: &[f64], now: DateTime<Utc>) -> Vec<Candle> {
    let bar = ChronoDuration::minutes(15);
    let first_open = now - ChronoDuration::minutes(5) - bar * closes.len() as i32;

    let mut candles: Vec<Candle> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open_time = first_open + bar * i as i32;
            Candle {
                symbol: symbol.to_string(),
                open_time,
                close_time: open_time + bar - ChronoDuration::milliseconds(1),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect();

    let forming_open = first_open + bar * closes.len() as i32;
    candles.push(Candle {
        symbol: symbol.to_string(),
        open_time: forming_open,
        close_time: forming_open + bar - ChronoDuration::milliseconds(1),
        open: 1.0,
        high: 1.0,
        low: 1.0,
        close: 1.0,
        volume: 1.0,
    });

    candles
}

/// Alternating moves: odd steps add `first`, even steps add `second`
pub fn zigzag(start: f64, first: f64, second: f64, len: usize) -> Vec<f64> {
    let mut closes = vec![start];
    for i in 1..len {
        let last = closes[i - 1];
        closes.push(if i % 2 == 1 { last + first } else { last + second });
    }
    closes
}

pub fn instruments(symbols: &[&str]) -> Vec<Instrument> {
    symbols
        .iter()
        .map(|s| Instrument {
            symbol: s.to_string(),
            quantity_precision: 3,
            price_precision: 2,
        })
        .collect()
}

pub type TestScheduler<G> = TradeCycleScheduler<G, FakeMarket, FakePnl, MeanReversionStrategy, ManualClock>;

pub fn build_scheduler<G: VenueGateway>(
    gateway: G,
    market: FakeMarket,
    pnl: FakePnl,
    clock: ManualClock,
    symbols: &[&str],
    log_path: &Path,
) -> TestScheduler<G> {
    build_scheduler_for(gateway, market, pnl, clock, instruments(symbols), log_path)
}

pub fn build_scheduler_for<G: VenueGateway>(
    gateway: G,
    market: FakeMarket,
    pnl: FakePnl,
    clock: ManualClock,
    instruments: Vec<Instrument>,
    log_path: &Path,
) -> TestScheduler<G> {
    let config = BotConfig::default();
    let log = PnlLog::open(log_path).unwrap();
    let reporter = PnlReporter::new(pnl, log, config.pnl_window(), true).unwrap();

    TradeCycleScheduler::new(
        SchedulerSettings::from(&config),
        instruments,
        gateway,
        market,
        MeanReversionStrategy::default(),
        reporter,
        clock,
    )
}
