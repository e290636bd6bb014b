//! Position sizers — turn a free balance and a price into an order quantity.
//!
//! Sizers are balance-aware but signal-agnostic. They never decide whether to
//! enter; they only answer "how much", or report that no order should be sent.

pub mod notional;

pub use notional::{size, NotionalSizer};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Precondition violations. Fatal to the pair's pass, never to the process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingError {
    #[error("price must be positive and finite, got {0}")]
    NonPositivePrice(f64),
}

/// Why a sizer declined to produce an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoTrade {
    /// The computed quantity was zero (nothing to spend).
    ZeroSize,
    /// The quantity after the minimum-notional floor costs more than the balance.
    Unaffordable { required: f64, balance: f64 },
}

/// Outcome of sizing a prospective entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SizeDecision {
    Order {
        quantity: f64,
        /// `quantity * price` in quote currency.
        notional: f64,
        /// True when the minimum-notional floor replaced the target size.
        floored: bool,
    },
    DoNotTrade(NoTrade),
}

/// Position sizing logic.
///
/// # Responsibilities
/// - Convert free balance + price → quantity
/// - Respect the exchange minimum order value
/// - Refuse orders the balance cannot finance
///
/// # Non-Responsibilities
/// - Deciding entry (the signal's job)
/// - Checking the balance against the minimum before sizing (the controller's job)
pub trait Sizer: Send + Sync {
    fn plan(&self, balance: f64, price: f64) -> Result<SizeDecision, SizingError>;

    /// Sizer name for logging.
    fn name(&self) -> &str;
}
