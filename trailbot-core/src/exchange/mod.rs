//! Exchange collaborators and structured error types.
//!
//! The controller reaches the outside world only through [`MarketData`] and
//! [`Broker`], so live REST clients, paper trading and test doubles are
//! interchangeable.

pub mod paper;
pub mod replay;

use thiserror::Error;

use crate::domain::{Candle, Confirmation, OrderRequest};

pub use paper::PaperBroker;
pub use replay::ReplayFeed;

/// Structured error types for exchange operations.
///
/// Every variant is non-fatal to the process; the controller turns them into
/// per-pair skips or order failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("rate limited by exchange (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("exchange rejected request (code {code}): {message}")]
    Api { code: i64, message: String },

    #[error("unexpected response format: {0}")]
    Decode(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("hard stop: exchange requests blocked (circuit breaker tripped)")]
    CircuitOpen,

    #[error("unknown pair: {pair}")]
    UnknownPair { pair: String },

    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("order rejected: {0}")]
    Rejected(String),
}

impl ExchangeError {
    /// Transient failures worth retrying inside a collaborator.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::Network(_) | ExchangeError::RateLimited { .. } => true,
            ExchangeError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Read-only market data source.
pub trait MarketData: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// The most recent `limit` candles for `pair`, oldest first.
    fn fetch_series(
        &self,
        pair: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;
}

/// Balance lookup and market order execution.
pub trait Broker: Send + Sync {
    fn name(&self) -> &str;

    /// Free quote-currency balance.
    fn fetch_balance(&self) -> Result<f64, ExchangeError>;

    /// Submit an immediate market order.
    fn submit_order(&self, order: &OrderRequest) -> Result<Confirmation, ExchangeError>;
}

impl<T: MarketData + ?Sized> MarketData for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch_series(
        &self,
        pair: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        (**self).fetch_series(pair, timeframe, limit)
    }
}

impl<T: Broker + ?Sized> Broker for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch_balance(&self) -> Result<f64, ExchangeError> {
        (**self).fetch_balance()
    }

    fn submit_order(&self, order: &OrderRequest) -> Result<Confirmation, ExchangeError> {
        (**self).submit_order(order)
    }
}
