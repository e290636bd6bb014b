//! Entry signals — portfolio-agnostic market timing.
//!
//! Evaluators see only the indicator snapshot, never balances or positions.
//! There is deliberately no sell signal: exits come from the position
//! tracker's trailing stop, entries from momentum.

pub mod momentum;

pub use momentum::MomentumSignal;

use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorSnapshot;

/// Discrete entry decision for one pair on one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Hold,
}

impl Signal {
    pub fn is_buy(&self) -> bool {
        matches!(self, Signal::Buy)
    }
}

/// Reduces the latest indicator values to a `Signal`.
///
/// # Invariants
/// - `evaluate()` must not depend on portfolio state
/// - `evaluate()` must be deterministic for the same snapshot
pub trait SignalEvaluator: Send + Sync {
    /// Evaluator name for logging.
    fn name(&self) -> &str;

    fn evaluate(&self, snapshot: &IndicatorSnapshot) -> Signal;
}
