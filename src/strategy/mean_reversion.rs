use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::indicators::{calculate_adx, calculate_ema, calculate_rsi, close_range};
use crate::models::{Candle, Direction, Instrument, TradeSignal};
use crate::risk::ProtectionRule;
use crate::strategy::Strategy;

/// Mean reversion with a trend filter
///
/// Fades stretched moves inside a range, only when the market is not trending.
///
/// LONG when ALL hold:
/// - ADX below `adx_max` (no strong trend)
/// - Close within `range_band` of the lowest close of the last `range_lookback` candles
/// - RSI below `rsi_long_max`
/// - close < EMA(fast) < EMA(slow)
///
/// SHORT is the mirror image against the highest close, `rsi_short_min`, and
/// close > EMA(fast) > EMA(slow). LONG is checked first.
///
/// Exits are fixed at entry through the `ProtectionRule` (1% stop, 5% target).
#[derive(Debug, Clone)]
pub struct MeanReversionStrategy {
    config: MeanReversionConfig,
    protection: ProtectionRule,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeanReversionConfig {
    pub rsi_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub adx_period: usize,

    /// Candles in the rolling close range
    pub range_lookback: usize,

    /// ADX must be below this for any entry
    pub adx_max: f64,

    /// RSI must be below this to go long
    pub rsi_long_max: f64,

    /// RSI must be above this to go short
    pub rsi_short_min: f64,

    /// How close to the range edge the close must be (0.01 = within 1%)
    pub range_band: f64,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ema_fast: 20,
            ema_slow: 50,
            adx_period: 14,
            range_lookback: 20,
            adx_max: 25.0,
            rsi_long_max: 40.0,
            rsi_short_min: 60.0,
            range_band: 0.01,
        }
    }
}

impl MeanReversionConfig {
    pub fn min_candles_required(&self) -> usize {
        self.ema_slow
            .max(self.ema_fast)
            .max(2 * self.adx_period)
            .max(self.rsi_period + 1)
            .max(self.range_lookback)
    }
}

/// Latest indicator values the entry rule looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub rsi: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub adx: f64,
    pub range_low: f64,
    pub range_high: f64,
}

impl IndicatorSnapshot {
    /// Compute every indicator over the candles; None if any lacks history
    pub fn from_candles(candles: &[Candle], config: &MeanReversionConfig) -> Option<Self> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let range = close_range(&closes, config.range_lookback)?;

        Some(Self {
            close: *closes.last()?,
            rsi: calculate_rsi(&closes, config.rsi_period)?,
            ema_fast: calculate_ema(&closes, config.ema_fast)?,
            ema_slow: calculate_ema(&closes, config.ema_slow)?,
            adx: calculate_adx(candles, config.adx_period)?.adx,
            range_low: range.low,
            range_high: range.high,
        })
    }
}

impl MeanReversionStrategy {
    pub fn new(config: MeanReversionConfig, protection: ProtectionRule) -> Self {
        Self { config, protection }
    }

    pub fn config(&self) -> &MeanReversionConfig {
        &self.config
    }

    /// Apply the entry rule to precomputed indicators
    pub fn direction(&self, snapshot: &IndicatorSnapshot) -> Direction {
        let cfg = &self.config;
        let ranging = snapshot.adx < cfg.adx_max;

        let long = ranging
            && snapshot.close <= snapshot.range_low * (1.0 + cfg.range_band)
            && snapshot.rsi < cfg.rsi_long_max
            && snapshot.close < snapshot.ema_fast
            && snapshot.ema_fast < snapshot.ema_slow;

        if long {
            return Direction::Long;
        }

        let short = ranging
            && snapshot.close >= snapshot.range_high * (1.0 - cfg.range_band)
            && snapshot.rsi > cfg.rsi_short_min
            && snapshot.close > snapshot.ema_fast
            && snapshot.ema_fast > snapshot.ema_slow;

        if short {
            Direction::Short
        } else {
            Direction::None
        }
    }

    /// Turn a snapshot into a signal with rounded exit levels
    pub fn evaluate_snapshot(&self, instrument: &Instrument, snapshot: &IndicatorSnapshot) -> TradeSignal {
        let direction = self.direction(snapshot);
        let Some(side) = direction.position_side() else {
            return TradeSignal::none(&instrument.symbol);
        };

        let Some(entry_price) = Decimal::from_f64(snapshot.close) else {
            tracing::warn!("{}: close {} is not representable, skipping", instrument.symbol, snapshot.close);
            return TradeSignal::none(&instrument.symbol);
        };

        let levels = self
            .protection
            .levels(side, entry_price, instrument.price_precision);

        tracing::info!(
            "🎯 {} {:?} signal @ {} | ADX {:.1} RSI {:.1} EMA{} {:.4} EMA{} {:.4} | SL {} TP {}",
            instrument.symbol,
            direction,
            entry_price,
            snapshot.adx,
            snapshot.rsi,
            self.config.ema_fast,
            snapshot.ema_fast,
            self.config.ema_slow,
            snapshot.ema_slow,
            levels.stop_loss,
            levels.take_profit
        );

        TradeSignal {
            symbol: instrument.symbol.clone(),
            direction,
            entry_price,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
        }
    }
}

impl Default for MeanReversionStrategy {
    fn default() -> Self {
        Self::new(MeanReversionConfig::default(), ProtectionRule::default())
    }
}

impl Strategy for MeanReversionStrategy {
    fn evaluate(&self, instrument: &Instrument, candles: &[Candle]) -> TradeSignal {
        if candles.len() < self.min_candles_required() {
            tracing::debug!(
                "{}: {} candles, need {} - no signal",
                instrument.symbol,
                candles.len(),
                self.min_candles_required()
            );
            return TradeSignal::none(&instrument.symbol);
        }

        let Some(snapshot) = IndicatorSnapshot::from_candles(candles, &self.config) else {
            return TradeSignal::none(&instrument.symbol);
        };

        tracing::debug!(
            "{}: close {:.4} low {:.4} high {:.4} RSI {:.1} EMA fast {:.4} slow {:.4} ADX {:.1}",
            instrument.symbol,
            snapshot.close,
            snapshot.range_low,
            snapshot.range_high,
            snapshot.rsi,
            snapshot.ema_fast,
            snapshot.ema_slow,
            snapshot.adx
        );

        self.evaluate_snapshot(instrument, &snapshot)
    }

    fn name(&self) -> &str {
        "Mean Reversion (trend filtered)"
    }

    fn min_candles_required(&self) -> usize {
        self.config.min_candles_required()
    }
}
