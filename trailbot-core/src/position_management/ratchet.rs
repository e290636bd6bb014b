/// Ratchet invariant enforcement for trailing stops.
///
/// **Core Rule:** a long spot position's stop may rise, never fall.
///
/// The level survives serialization unchanged so that a restarted process
/// resumes from the same floor rather than re-deriving a looser one.
use serde::{Deserialize, Serialize};

/// How a proposed level changed the stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopChange {
    /// First level set on a previously unset stop.
    Armed { level: f64 },
    /// Level moved up.
    Raised { from: f64, to: f64 },
    /// Proposal was at or below the current level.
    Unchanged { level: f64 },
}

impl StopChange {
    /// Stop level after the change.
    pub fn level(&self) -> f64 {
        match *self {
            StopChange::Armed { level } => level,
            StopChange::Raised { to, .. } => to,
            StopChange::Unchanged { level } => level,
        }
    }
}

/// Monotonically non-decreasing stop level.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrailingStop {
    level: Option<f64>,
}

impl TrailingStop {
    /// A stop that has not been armed yet.
    pub fn unset() -> Self {
        Self { level: None }
    }

    /// A stop armed at `level`.
    pub fn armed(level: f64) -> Self {
        Self { level: Some(level) }
    }

    /// Current level (if armed).
    pub fn level(&self) -> Option<f64> {
        self.level
    }

    pub fn is_armed(&self) -> bool {
        self.level.is_some()
    }

    /// Apply a proposed level. Returns how the stop changed.
    ///
    /// # Example
    /// ```
    /// use trailbot_core::position_management::{StopChange, TrailingStop};
    ///
    /// let mut stop = TrailingStop::armed(95.0);
    ///
    /// // Tightening: 95 → 100 (allowed)
    /// assert_eq!(stop.apply(100.0), StopChange::Raised { from: 95.0, to: 100.0 });
    ///
    /// // Loosening: 100 → 90 (blocked)
    /// assert_eq!(stop.apply(90.0), StopChange::Unchanged { level: 100.0 });
    /// ```
    pub fn apply(&mut self, proposed: f64) -> StopChange {
        match self.level {
            None => {
                self.level = Some(proposed);
                StopChange::Armed { level: proposed }
            }
            Some(current) if proposed > current => {
                self.level = Some(proposed);
                StopChange::Raised {
                    from: current,
                    to: proposed,
                }
            }
            Some(current) => StopChange::Unchanged { level: current },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratchet_tightening_allowed() {
        let mut stop = TrailingStop::armed(95.0);
        assert_eq!(stop.apply(100.0), StopChange::Raised { from: 95.0, to: 100.0 });
        assert_eq!(stop.level(), Some(100.0));
    }

    #[test]
    fn test_ratchet_loosening_blocked() {
        let mut stop = TrailingStop::armed(100.0);
        assert_eq!(stop.apply(90.0), StopChange::Unchanged { level: 100.0 });
        assert_eq!(stop.level(), Some(100.0));
    }

    #[test]
    fn test_ratchet_equal_is_unchanged() {
        let mut stop = TrailingStop::armed(100.0);
        assert_eq!(stop.apply(100.0), StopChange::Unchanged { level: 100.0 });
    }

    #[test]
    fn test_ratchet_initialization() {
        let mut stop = TrailingStop::unset();
        assert!(!stop.is_armed());
        assert_eq!(stop.apply(95.0), StopChange::Armed { level: 95.0 });
        assert_eq!(stop.level(), Some(95.0));
    }

    #[test]
    fn test_ratchet_volatility_trap_scenario() {
        // Price at 110, a wider proposal (ATR expansion) must not loosen the stop.
        let mut stop = TrailingStop::armed(95.0);
        assert_eq!(stop.apply(90.0).level(), 95.0);
    }

    #[test]
    fn serializes_as_plain_option() {
        assert_eq!(serde_json::to_string(&TrailingStop::unset()).unwrap(), "null");
        assert_eq!(serde_json::to_string(&TrailingStop::armed(1.5)).unwrap(), "1.5");
        let back: TrailingStop = serde_json::from_str("2.5").unwrap();
        assert_eq!(back.level(), Some(2.5));
    }
}
