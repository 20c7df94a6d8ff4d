use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::VenueResult;
use crate::models::{OrderSide, PositionState, ProtectiveKind, ProtectiveOrder};
use crate::venue::VenueGateway;

/// Reads from the wrapped venue, logs every write instead of sending it
///
/// Because nothing is ever placed, the next cycle sees the same state and
/// logs the same plan again.
#[derive(Clone)]
pub struct DryRunGateway<G> {
    inner: G,
}

impl<G: VenueGateway> DryRunGateway<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<G: VenueGateway> VenueGateway for DryRunGateway<G> {
    async fn open_orders(&self, symbol: &str) -> VenueResult<Vec<ProtectiveOrder>> {
        self.inner.open_orders(symbol).await
    }

    async fn position(&self, symbol: &str) -> VenueResult<Option<PositionState>> {
        self.inner.position(symbol).await
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> VenueResult<()> {
        tracing::info!("  [dry-run] {} cancel order {}", symbol, order_id);
        Ok(())
    }

    async fn place_market_order(&self, symbol: &str, side: OrderSide, quantity: Decimal) -> VenueResult<()> {
        tracing::info!("  [dry-run] {} MARKET {} qty {}", symbol, side, quantity);
        Ok(())
    }

    async fn place_protective_order(
        &self,
        symbol: &str,
        kind: ProtectiveKind,
        side: OrderSide,
        trigger_price: Decimal,
    ) -> VenueResult<()> {
        tracing::info!(
            "  [dry-run] {} {} {} trigger {} (close position, mark price)",
            symbol,
            kind,
            side,
            trigger_price
        );
        Ok(())
    }

    async fn instrument_precision(&self, symbol: &str) -> VenueResult<u32> {
        self.inner.instrument_precision(symbol).await
    }

    async fn price_precision(&self, symbol: &str) -> VenueResult<Option<u32>> {
        self.inner.price_precision(symbol).await
    }
}
