// Collaborator seams: the venue, its market data, and its PnL history
pub mod dry_run;

pub use dry_run::DryRunGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::VenueResult;
use crate::models::{Candle, OrderSide, PnlRecord, PositionState, ProtectiveKind, ProtectiveOrder};

/// Account state and order entry for one venue account
///
/// Every call may fail with a `VenueError`; callers never retry within a cycle.
#[async_trait]
pub trait VenueGateway: Send + Sync {
    /// Outstanding take-profit / stop-loss orders (other order types are omitted)
    async fn open_orders(&self, symbol: &str) -> VenueResult<Vec<ProtectiveOrder>>;

    /// Current position, None when flat
    async fn position(&self, symbol: &str) -> VenueResult<Option<PositionState>>;

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> VenueResult<()>;

    async fn place_market_order(&self, symbol: &str, side: OrderSide, quantity: Decimal) -> VenueResult<()>;

    /// Close-position trigger order on mark price
    async fn place_protective_order(
        &self,
        symbol: &str,
        kind: ProtectiveKind,
        side: OrderSide,
        trigger_price: Decimal,
    ) -> VenueResult<()>;

    /// Decimal places allowed in order quantities
    async fn instrument_precision(&self, symbol: &str) -> VenueResult<u32>;

    /// Decimal places allowed in trigger prices, None when the venue does not say
    async fn price_precision(&self, _symbol: &str) -> VenueResult<Option<u32>> {
        Ok(None)
    }
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Most recent `limit` candles, oldest first; the last one may still be forming
    async fn candles(&self, symbol: &str, interval: &str, limit: usize) -> VenueResult<Vec<Candle>>;
}

#[async_trait]
pub trait PnlSource: Send + Sync {
    /// Realized PnL events booked at or after `since`
    async fn realized_pnl(&self, since: DateTime<Utc>) -> VenueResult<Vec<PnlRecord>>;
}
