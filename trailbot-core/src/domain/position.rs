//! Position — one open spot holding managed by a trailing stop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::position_management::TrailingStop;

/// Lifecycle state of a tracked position.
///
/// `Closed` is not represented: a closed position is removed from the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    /// Held. The stop may be unset or armed.
    Open,
    /// The stop was breached and a sell was issued but not yet confirmed.
    PendingClose,
}

/// An open long spot position.
///
/// Invariants, enforced by the position tracker which is the only mutator:
/// `amount > 0`, `atr_at_entry` is fixed for the life of the position, and
/// the trailing stop never moves down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub pair: String,
    pub entry_price: f64,
    pub amount: f64,
    pub atr_at_entry: f64,
    pub(crate) trailing_stop: TrailingStop,
    pub(crate) state: PositionState,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub(crate) fn new(pair: String, entry_price: f64, amount: f64, atr_at_entry: f64) -> Self {
        Self {
            pair,
            entry_price,
            amount,
            atr_at_entry,
            trailing_stop: TrailingStop::unset(),
            state: PositionState::Open,
            opened_at: Utc::now(),
        }
    }

    /// Current stop level, `None` until the first evaluation arms it.
    pub fn trailing_stop(&self) -> Option<f64> {
        self.trailing_stop.level()
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn is_pending_close(&self) -> bool {
        self.state == PositionState::PendingClose
    }

    /// Quote value at entry.
    pub fn entry_value(&self) -> f64 {
        self.entry_price * self.amount
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) * self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_position_is_open_without_stop() {
        let pos = Position::new("DOGE/USDT".into(), 0.1, 100.0, 0.002);
        assert_eq!(pos.state(), PositionState::Open);
        assert_eq!(pos.trailing_stop(), None);
        assert!(!pos.is_pending_close());
    }

    #[test]
    fn pnl_and_value() {
        let pos = Position::new("SOL/USDT".into(), 100.0, 2.0, 3.0);
        assert_eq!(pos.entry_value(), 200.0);
        assert_eq!(pos.unrealized_pnl(110.0), 20.0);
        assert_eq!(pos.unrealized_pnl(95.0), -10.0);
    }

    #[test]
    fn serialization_roundtrip_keeps_stop_and_state() {
        let mut pos = Position::new("ADA/USDT".into(), 1.0, 10.0, 0.05);
        pos.trailing_stop.apply(0.9);
        pos.state = PositionState::PendingClose;
        let json = serde_json::to_string(&pos).unwrap();
        assert!(json.contains("\"trailing_stop\":0.9"));
        assert!(json.contains("pending_close"));
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pos);
    }
}
