use thiserror::Error;

/// Failure of a single venue call
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("venue rejected request ({status}): code {code}, {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    #[error("rate limited by venue (HTTP {0})")]
    RateLimited(u16),

    #[error("failed to decode venue response: {0}")]
    Decode(String),

    #[error("signed endpoint called without API credentials")]
    MissingCredentials,

    #[error("symbol {0} is not listed on the venue")]
    UnknownSymbol(String),

    #[error("symbol {0} has no LOT_SIZE filter")]
    MissingFilter(String),
}

impl VenueError {
    /// Network, timeout, rate limit and 5xx failures; the next cycle is the retry
    pub fn is_transient(&self) -> bool {
        match self {
            VenueError::Transport(_) | VenueError::RateLimited(_) => true,
            VenueError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for VenueError {
    fn from(e: serde_json::Error) -> Self {
        VenueError::Decode(e.to_string())
    }
}

impl From<rust_decimal::Error> for VenueError {
    fn from(e: rust_decimal::Error) -> Self {
        VenueError::Decode(e.to_string())
    }
}

pub type VenueResult<T> = std::result::Result<T, VenueError>;

/// Problems that stop the process before the first cycle
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("venue metadata unavailable: {0}")]
    Metadata(#[source] VenueError),

    #[error("no tradable instruments left after loading venue metadata")]
    EmptyUniverse,

    #[error("failed to open PnL log: {0}")]
    PnlLog(#[from] PnlError),
}

/// Failure of the PnL reporting pass
#[derive(Debug, Error)]
pub enum PnlError {
    #[error("PnL source failed: {0}")]
    Source(#[from] VenueError),

    #[error("PnL log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("PnL log CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(VenueError::RateLimited(429).is_transient());
        assert!(VenueError::Api {
            status: 503,
            code: -1001,
            message: "Internal error".to_string()
        }
        .is_transient());

        assert!(!VenueError::Api {
            status: 400,
            code: -2021,
            message: "Order would immediately trigger.".to_string()
        }
        .is_transient());
        assert!(!VenueError::MissingCredentials.is_transient());
    }

    #[test]
    fn test_api_error_message_carries_code() {
        let err = VenueError::Api {
            status: 400,
            code: -4164,
            message: "Order's notional must be no smaller than 100".to_string(),
        };
        assert!(err.to_string().contains("-4164"));
    }
}
