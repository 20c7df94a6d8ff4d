// Technical indicators used by the entry signal
// RSI, EMA, ADX and the rolling close range

pub mod adx;
pub mod moving_average;
pub mod range;
pub mod rsi;

pub use adx::{calculate_adx, AdxReading};
pub use moving_average::{calculate_ema, calculate_sma};
pub use range::{close_range, CloseRange};
pub use rsi::calculate_rsi;
