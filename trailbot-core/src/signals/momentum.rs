//! MACD momentum entry: buy whenever momentum is bullish.

use super::{Signal, SignalEvaluator};
use crate::indicators::{IndicatorSnapshot, Momentum};

/// Emits `Buy` iff the snapshot's momentum is `Bullish`.
///
/// This is a level condition, not a crossover: a pair that stays bullish keeps
/// producing `Buy`, and the controller's one-position-per-pair rule is what
/// prevents repeated entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct MomentumSignal;

impl SignalEvaluator for MomentumSignal {
    fn name(&self) -> &str {
        "macd_momentum"
    }

    fn evaluate(&self, snapshot: &IndicatorSnapshot) -> Signal {
        match snapshot.momentum {
            Momentum::Bullish => Signal::Buy,
            Momentum::Bearish => Signal::Hold,
        }
    }
}
