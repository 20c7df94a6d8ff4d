use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A tradable futures contract and the precisions used to format its orders
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub symbol: String,
    pub quantity_precision: u32, // Decimal places allowed by the LOT_SIZE step
    pub price_precision: u32,    // Decimal places used for trigger prices
}

/// OHLCV candlestick data, oldest first when in a series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// A candle is closed once its close time is not after `now`
    pub fn is_closed(&self, now: DateTime<Utc>) -> bool {
        self.close_time <= now
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Side of the order that opens a position in this direction
    pub fn entry_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Side of the orders that close a position in this direction
    pub fn exit_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

/// Open position as reported by the venue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionState {
    pub symbol: String,
    pub quantity: Decimal, // Signed: positive = long, negative = short
    pub entry_price: Decimal,
}

impl PositionState {
    pub fn side(&self) -> PositionSide {
        if self.quantity.is_sign_negative() {
            PositionSide::Short
        } else {
            PositionSide::Long
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProtectiveKind {
    TakeProfit,
    StopLoss,
}

impl fmt::Display for ProtectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtectiveKind::TakeProfit => f.write_str("TAKE_PROFIT"),
            ProtectiveKind::StopLoss => f.write_str("STOP_LOSS"),
        }
    }
}

/// Take-profit or stop-loss order resting on the venue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtectiveOrder {
    pub symbol: String,
    pub order_id: u64,
    pub kind: ProtectiveKind,
    pub side: OrderSide,
    pub trigger_price: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
    None,
}

impl Direction {
    pub fn position_side(&self) -> Option<PositionSide> {
        match self {
            Direction::Long => Some(PositionSide::Long),
            Direction::Short => Some(PositionSide::Short),
            Direction::None => None,
        }
    }
}

/// Entry decision with its exit levels
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeSignal {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

impl TradeSignal {
    pub fn none(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            direction: Direction::None,
            entry_price: Decimal::ZERO,
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.direction != Direction::None
    }
}

/// Realized profit or loss booked by the venue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PnlRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub realized: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_position_side_from_signed_quantity() {
        let long = PositionState {
            symbol: "BTCUSDT".to_string(),
            quantity: dec("0.002"),
            entry_price: dec("100"),
        };
        let short = PositionState {
            quantity: dec("-0.002"),
            ..long.clone()
        };

        assert_eq!(long.side(), PositionSide::Long);
        assert_eq!(short.side(), PositionSide::Short);
    }

    #[test]
    fn test_exit_side_is_opposite_of_entry() {
        for side in [PositionSide::Long, PositionSide::Short] {
            assert_ne!(side.entry_side(), side.exit_side());
        }
        assert_eq!(PositionSide::Long.exit_side(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.exit_side(), OrderSide::Buy);
    }

    #[test]
    fn test_candle_closed_relative_to_now() {
        let now = Utc::now();
        let candle = Candle {
            symbol: "ETHUSDT".to_string(),
            open_time: now - chrono::Duration::minutes(15),
            close_time: now + chrono::Duration::seconds(1),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 10.0,
        };

        assert!(!candle.is_closed(now));
        assert!(candle.is_closed(now + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_none_signal_is_not_actionable() {
        let signal = TradeSignal::none("SOLUSDT");
        assert_eq!(signal.direction, Direction::None);
        assert!(!signal.is_actionable());
    }
}
