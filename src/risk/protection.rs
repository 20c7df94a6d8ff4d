use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::PositionSide;

/// Stop-loss / take-profit distances applied to an entry price
///
/// Used both when a new position is opened and when missing protection is
/// rebuilt from the venue's reported entry price, so both paths agree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtectionRule {
    /// Fraction of the entry price risked (0.01 = 1%)
    pub stop_loss_pct: Decimal,
    /// Fraction of the entry price targeted (0.05 = 5%)
    pub take_profit_pct: Decimal,
}

impl Default for ProtectionRule {
    fn default() -> Self {
        Self {
            stop_loss_pct: Decimal::new(1, 2),   // 1% capped loss
            take_profit_pct: Decimal::new(5, 2), // 5% target, ~1:5 risk/reward
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitLevels {
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

impl ProtectionRule {
    /// Exit trigger prices for a position, rounded to `price_precision` places
    pub fn levels(&self, side: PositionSide, entry_price: Decimal, price_precision: u32) -> ExitLevels {
        let (stop_factor, target_factor) = match side {
            PositionSide::Long => (
                Decimal::ONE - self.stop_loss_pct,
                Decimal::ONE + self.take_profit_pct,
            ),
            PositionSide::Short => (
                Decimal::ONE + self.stop_loss_pct,
                Decimal::ONE - self.take_profit_pct,
            ),
        };

        ExitLevels {
            stop_loss: (entry_price * stop_factor).round_dp(price_precision),
            take_profit: (entry_price * target_factor).round_dp(price_precision),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.stop_loss_pct > Decimal::ZERO
            && self.stop_loss_pct < Decimal::ONE
            && self.take_profit_pct > Decimal::ZERO
            && self.take_profit_pct < Decimal::ONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_long_levels() {
        let levels = ProtectionRule::default().levels(PositionSide::Long, dec("100"), 2);
        assert_eq!(levels.stop_loss, dec("99.00"));
        assert_eq!(levels.take_profit, dec("105.00"));
    }

    #[test]
    fn test_short_levels() {
        let levels = ProtectionRule::default().levels(PositionSide::Short, dec("50"), 2);
        assert_eq!(levels.stop_loss, dec("50.50"));
        assert_eq!(levels.take_profit, dec("47.50"));
    }

    #[test]
    fn test_levels_are_rounded_to_price_precision() {
        let levels = ProtectionRule::default().levels(PositionSide::Long, dec("27123.456"), 2);
        assert_eq!(levels.stop_loss, dec("26852.22"));
        assert_eq!(levels.take_profit, dec("28479.63"));
        assert!(levels.stop_loss.scale() <= 2);
    }

    #[test]
    fn test_invalid_rule() {
        let rule = ProtectionRule {
            stop_loss_pct: Decimal::ZERO,
            ..Default::default()
        };
        assert!(!rule.is_valid());
        assert!(ProtectionRule::default().is_valid());
    }
}
