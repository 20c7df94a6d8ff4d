use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::StartupError;
use crate::risk::ProtectionRule;
use crate::strategy::mean_reversion::MeanReversionConfig;

pub const DEFAULT_CONFIG_PATH: &str = "futuresbot.toml";
pub const TESTNET_BASE_URL: &str = "https://testnet.binancefuture.com";

const ENV_PREFIX: &str = "FUTURESBOT";
const MAX_CANDLE_LIMIT: usize = 1500;
const KLINE_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

/// Everything the bot reads at startup
///
/// Layered as: built-in defaults, then the optional TOML file, then
/// `FUTURESBOT__*` environment variables (`__` separates nested keys).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    /// Instruments swept every cycle, in this order
    pub symbols: Vec<String>,
    pub base_url: String,
    /// Kline interval, e.g. "15m"
    pub interval: String,
    pub candle_limit: usize,

    pub cycle_pause_secs: u64,
    pub instrument_delay_ms: u64,

    /// Quote-currency value of each new position
    pub order_notional: Decimal,
    /// Trigger price decimals when the venue reports no tick size
    pub price_precision: u32,
    /// Quantity decimals when the venue lists no LOT_SIZE filter
    pub default_quantity_precision: u32,

    pub pnl_log_path: String,
    pub pnl_window_minutes: i64,
    pub pnl_dedupe: bool,

    pub requests_per_minute: u32,
    pub recv_window_ms: u64,
    pub http_timeout_secs: u64,

    pub strategy: MeanReversionConfig,
    pub protection: ProtectionRule,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbols: [
                "BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "AVAXUSDT", "LINKUSDT", "INJUSDT",
                "APTUSDT", "SUIUSDT", "XRPUSDT", "NEARUSDT", "OPUSDT", "LDOUSDT", "FTMUSDT",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            base_url: TESTNET_BASE_URL.to_string(),
            interval: "15m".to_string(),
            candle_limit: 100,
            cycle_pause_secs: 60,
            instrument_delay_ms: 1000,
            order_notional: Decimal::new(100, 0),
            price_precision: 2,
            default_quantity_precision: 2,
            pnl_log_path: "pnl_log.csv".to_string(),
            pnl_window_minutes: 15,
            pnl_dedupe: true,
            requests_per_minute: 1200,
            recv_window_ms: 5000,
            http_timeout_secs: 10,
            strategy: MeanReversionConfig::default(),
            protection: ProtectionRule::default(),
        }
    }
}

impl BotConfig {
    /// Load defaults, the file at `path` if it exists, then the environment
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        Self::load_with(path, environment())
    }

    fn load_with(path: &Path, env: Environment) -> Result<Self, StartupError> {
        let config: BotConfig = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StartupError> {
        let invalid = |msg: String| Err(StartupError::Invalid(msg));

        if self.symbols.is_empty() {
            return invalid("symbols must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if symbol.is_empty() || *symbol != symbol.to_uppercase() {
                return invalid(format!("symbol '{}' must be non-empty upper case", symbol));
            }
            if !seen.insert(symbol) {
                return invalid(format!("symbol '{}' listed twice", symbol));
            }
        }

        if !KLINE_INTERVALS.contains(&self.interval.as_str()) {
            return invalid(format!("unknown kline interval '{}'", self.interval));
        }

        let min_candles = self.strategy.min_candles_required();
        if self.candle_limit < min_candles || self.candle_limit > MAX_CANDLE_LIMIT {
            return invalid(format!(
                "candle_limit {} must be between {} and {}",
                self.candle_limit, min_candles, MAX_CANDLE_LIMIT
            ));
        }

        if self.order_notional <= Decimal::ZERO {
            return invalid("order_notional must be positive".to_string());
        }
        if self.pnl_window_minutes <= 0 {
            return invalid("pnl_window_minutes must be positive".to_string());
        }
        if !self.protection.is_valid() {
            return invalid("protection percentages must be between 0 and 1".to_string());
        }
        if self.requests_per_minute == 0 {
            return invalid("requests_per_minute must be positive".to_string());
        }

        Ok(())
    }

    pub fn cycle_pause(&self) -> Duration {
        Duration::from_secs(self.cycle_pause_secs)
    }

    pub fn instrument_delay(&self) -> Duration {
        Duration::from_millis(self.instrument_delay_ms)
    }

    pub fn pnl_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.pnl_window_minutes)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("symbols")
        .try_parsing(true)
}
