/// Tracker actions handed back to the controller.
///
/// The tracker never talks to the exchange. It returns an action and the
/// controller turns `ClosePosition` into a market sell.
use serde::{Deserialize, Serialize};

/// Result of evaluating an open position against the latest price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Keep holding (or nothing is tracked for the pair).
    None,
    /// Stop breached: sell `amount`.
    ClosePosition { amount: f64 },
}

impl Action {
    pub fn is_none(&self) -> bool {
        matches!(self, Action::None)
    }
}
