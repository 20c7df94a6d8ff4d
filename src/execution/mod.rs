// Reconciliation planning and order execution
pub mod executor;
pub mod reconciler;
pub mod sizing;

pub use executor::{ApplyReport, Executor, MutationFailure};
pub use reconciler::{PositionReconciler, ReconcileAction, ReconcilePlan, VenueMutation};
pub use sizing::position_quantity;
