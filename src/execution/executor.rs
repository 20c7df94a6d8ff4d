use crate::error::VenueError;
use crate::execution::reconciler::{ReconcilePlan, VenueMutation};
use crate::venue::VenueGateway;

/// The mutation that stopped a plan
#[derive(Debug)]
pub struct MutationFailure {
    /// Position of the failed mutation in the plan
    pub index: usize,
    pub mutation: VenueMutation,
    pub error: VenueError,
}

/// Outcome of applying one plan
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Mutations the venue accepted, in order
    pub applied: usize,
    pub failure: Option<MutationFailure>,
}

impl ApplyReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Pushes reconcile plans to the venue
///
/// Mutations go out strictly in plan order and the first failure stops the
/// rest, so a failed market entry never leaves orphan exits behind. Anything
/// left half-done is picked up by the next cycle's reconciliation.
pub struct Executor<G> {
    gateway: G,
}

impl<G: VenueGateway> Executor<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub async fn apply(&self, plan: &ReconcilePlan) -> ApplyReport {
        let mut report = ApplyReport::default();

        for (index, mutation) in plan.mutations.iter().enumerate() {
            match self.send(mutation).await {
                Ok(()) => {
                    tracing::info!("  ✅ {}", mutation);
                    report.applied += 1;
                }
                Err(error) => {
                    tracing::error!("  ❌ {} failed: {}", mutation, error);
                    let skipped = plan.mutations.len() - index - 1;
                    if skipped > 0 {
                        tracing::warn!("  ⏭️  Skipping {} remaining mutation(s)", skipped);
                    }
                    report.failure = Some(MutationFailure {
                        index,
                        mutation: mutation.clone(),
                        error,
                    });
                    break;
                }
            }
        }

        report
    }

    async fn send(&self, mutation: &VenueMutation) -> Result<(), VenueError> {
        match mutation {
            VenueMutation::Cancel { symbol, order_id } => {
                self.gateway.cancel_order(symbol, *order_id).await
            }
            VenueMutation::MarketEntry {
                symbol,
                side,
                quantity,
            } => self.gateway.place_market_order(symbol, *side, *quantity).await,
            VenueMutation::PlaceProtective {
                symbol,
                kind,
                side,
                trigger_price,
            } => {
                self.gateway
                    .place_protective_order(symbol, *kind, *side, *trigger_price)
                    .await
            }
        }
    }
}
