//! Portfolio snapshot — informational balance tracking for a run.

use serde::{Deserialize, Serialize};

/// Quote-currency balances observed during a run.
///
/// Only sizing consumes the live balance; the snapshot itself never feeds a
/// trading decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Balance recorded at startup (`None` until the first successful fetch).
    pub initial_balance: Option<f64>,
    /// Most recently fetched free balance.
    pub current_balance: Option<f64>,
    /// Sum of `(exit - entry) * amount` over confirmed closes.
    pub realized_pnl: f64,
    pub closed_trades: u32,
}

impl PortfolioSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fetched balance. The first observation becomes the initial balance.
    pub fn observe_balance(&mut self, balance: f64) {
        if self.initial_balance.is_none() {
            self.initial_balance = Some(balance);
        }
        self.current_balance = Some(balance);
    }

    pub fn record_close(&mut self, pnl: f64) {
        self.realized_pnl += pnl;
        self.closed_trades += 1;
    }

    /// Change in free balance since startup.
    pub fn balance_change(&self) -> Option<f64> {
        Some(self.current_balance? - self.initial_balance?)
    }
}
