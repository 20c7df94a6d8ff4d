use rust_decimal::Decimal;
use std::fmt;

use crate::models::{
    Instrument, OrderSide, PositionState, ProtectiveKind, ProtectiveOrder, TradeSignal,
};
use crate::risk::ProtectionRule;

/// One change to push to the venue
#[derive(Debug, Clone, PartialEq)]
pub enum VenueMutation {
    Cancel {
        symbol: String,
        order_id: u64,
    },
    MarketEntry {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
    },
    PlaceProtective {
        symbol: String,
        kind: ProtectiveKind,
        side: OrderSide,
        trigger_price: Decimal,
    },
}

impl VenueMutation {
    pub fn is_cancel(&self) -> bool {
        matches!(self, VenueMutation::Cancel { .. })
    }
}

impl fmt::Display for VenueMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VenueMutation::Cancel { symbol, order_id } => write!(f, "cancel {} #{}", symbol, order_id),
            VenueMutation::MarketEntry {
                symbol,
                side,
                quantity,
            } => write!(f, "market {} {} qty {}", side, symbol, quantity),
            VenueMutation::PlaceProtective {
                symbol,
                kind,
                side,
                trigger_price,
            } => write!(f, "{} {} {} @ {}", kind, side, symbol, trigger_price),
        }
    }
}

/// Which branch of the state machine produced a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Flat with protective orders left behind
    CleanupStale,
    /// Flat, nothing to do
    Idle,
    /// Flat with a directional signal
    Enter,
    /// Signal fired but the sized quantity rounds to zero
    SkipZeroQuantity,
    /// More than two protective orders on an open position
    ClearDuplicates,
    /// Open position missing a take-profit or a stop-loss
    RepairProtection,
    /// Open position without a usable entry price to derive exits from
    MissingEntryPrice,
    /// Exactly one take-profit and one stop-loss
    Steady,
}

impl ReconcileAction {
    /// Branches that exist because venue state broke an invariant
    pub fn is_stale_state(&self) -> bool {
        matches!(
            self,
            ReconcileAction::CleanupStale
                | ReconcileAction::ClearDuplicates
                | ReconcileAction::RepairProtection
                | ReconcileAction::MissingEntryPrice
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    pub action: ReconcileAction,
    pub mutations: Vec<VenueMutation>,
}

impl ReconcilePlan {
    fn empty(action: ReconcileAction) -> Self {
        Self {
            action,
            mutations: Vec::new(),
        }
    }

    pub fn cancel_count(&self) -> usize {
        self.mutations.iter().filter(|m| m.is_cancel()).count()
    }

    pub fn create_count(&self) -> usize {
        self.mutations.len() - self.cancel_count()
    }
}

/// Decides the venue mutations for one instrument from freshly observed state
///
/// Stateless: the plan depends only on the arguments, so planning twice on the
/// same observation gives the same plan and a restart needs no recovery.
#[derive(Debug, Clone, Default)]
pub struct PositionReconciler {
    protection: ProtectionRule,
}

impl PositionReconciler {
    pub fn new(protection: ProtectionRule) -> Self {
        Self { protection }
    }

    pub fn plan(
        &self,
        instrument: &Instrument,
        position: Option<&PositionState>,
        orders: &[ProtectiveOrder],
        signal: Option<&TradeSignal>,
        quantity: Decimal,
    ) -> ReconcilePlan {
        match position {
            None => self.plan_flat(instrument, orders, signal, quantity),
            Some(position) => self.plan_open(instrument, position, orders),
        }
    }

    fn plan_flat(
        &self,
        instrument: &Instrument,
        orders: &[ProtectiveOrder],
        signal: Option<&TradeSignal>,
        quantity: Decimal,
    ) -> ReconcilePlan {
        if !orders.is_empty() {
            return ReconcilePlan {
                action: ReconcileAction::CleanupStale,
                mutations: cancel_all(orders),
            };
        }

        let Some((signal, side)) =
            signal.and_then(|s| s.direction.position_side().map(|side| (s, side)))
        else {
            return ReconcilePlan::empty(ReconcileAction::Idle);
        };

        if quantity <= Decimal::ZERO {
            return ReconcilePlan::empty(ReconcileAction::SkipZeroQuantity);
        }

        let symbol = &instrument.symbol;
        let exit_side = side.exit_side();

        // Entry first: if it fails the executor stops before any exit is placed
        ReconcilePlan {
            action: ReconcileAction::Enter,
            mutations: vec![
                VenueMutation::MarketEntry {
                    symbol: symbol.clone(),
                    side: side.entry_side(),
                    quantity,
                },
                VenueMutation::PlaceProtective {
                    symbol: symbol.clone(),
                    kind: ProtectiveKind::TakeProfit,
                    side: exit_side,
                    trigger_price: signal.take_profit,
                },
                VenueMutation::PlaceProtective {
                    symbol: symbol.clone(),
                    kind: ProtectiveKind::StopLoss,
                    side: exit_side,
                    trigger_price: signal.stop_loss,
                },
            ],
        }
    }

    fn plan_open(
        &self,
        instrument: &Instrument,
        position: &PositionState,
        orders: &[ProtectiveOrder],
    ) -> ReconcilePlan {
        let take_profits = count_kind(orders, ProtectiveKind::TakeProfit);
        let stop_losses = count_kind(orders, ProtectiveKind::StopLoss);

        // Duplicates are cleared before any repair so they cannot compound;
        // the missing-protection branch rebuilds on the next cycle
        if take_profits + stop_losses > 2 {
            return ReconcilePlan {
                action: ReconcileAction::ClearDuplicates,
                mutations: cancel_all(orders),
            };
        }

        if take_profits == 1 && stop_losses == 1 {
            return ReconcilePlan::empty(ReconcileAction::Steady);
        }

        if position.entry_price <= Decimal::ZERO {
            return ReconcilePlan::empty(ReconcileAction::MissingEntryPrice);
        }

        let side = position.side();
        let levels = self
            .protection
            .levels(side, position.entry_price, instrument.price_precision);
        let exit_side = side.exit_side();

        let mut mutations = cancel_all(orders);
        mutations.push(VenueMutation::PlaceProtective {
            symbol: instrument.symbol.clone(),
            kind: ProtectiveKind::TakeProfit,
            side: exit_side,
            trigger_price: levels.take_profit,
        });
        mutations.push(VenueMutation::PlaceProtective {
            symbol: instrument.symbol.clone(),
            kind: ProtectiveKind::StopLoss,
            side: exit_side,
            trigger_price: levels.stop_loss,
        });

        ReconcilePlan {
            action: ReconcileAction::RepairProtection,
            mutations,
        }
    }
}

fn count_kind(orders: &[ProtectiveOrder], kind: ProtectiveKind) -> usize {
    orders.iter().filter(|o| o.kind == kind).count()
}

fn cancel_all(orders: &[ProtectiveOrder]) -> Vec<VenueMutation> {
    orders
        .iter()
        .map(|o| VenueMutation::Cancel {
            symbol: o.symbol.clone(),
            order_id: o.order_id,
        })
        .collect()
}
