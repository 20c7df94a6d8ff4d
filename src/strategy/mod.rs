// Entry signal evaluation
pub mod mean_reversion;

pub use mean_reversion::{IndicatorSnapshot, MeanReversionConfig, MeanReversionStrategy};

use crate::models::{Candle, Instrument, TradeSignal};

/// Base trait for entry signal evaluators
///
/// Implementations are pure: the same candles always give the same signal, and
/// too little history is a `Direction::None` signal rather than an error.
pub trait Strategy: Send + Sync {
    /// Evaluate closed candles (oldest first) for one instrument
    fn evaluate(&self, instrument: &Instrument, candles: &[Candle]) -> TradeSignal;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required before any signal can fire
    fn min_candles_required(&self) -> usize;
}
