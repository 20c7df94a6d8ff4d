// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod pnl;
pub mod risk;
pub mod scheduler;
pub mod strategy;
pub mod venue;

// Re-export commonly used types
pub use config::BotConfig;
pub use error::{PnlError, StartupError, VenueError, VenueResult};
pub use models::*;
pub use strategy::Strategy;
pub use venue::{MarketDataProvider, PnlSource, VenueGateway};
