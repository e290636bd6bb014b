//! Moving Average Convergence Divergence (MACD).
//!
//! MACD line = EMA(close, fast) - EMA(close, slow).
//! Signal line = EMA(MACD line, signal), same recurrence as the price EMAs.

use super::ema::ema_of_series;
use super::Indicator;
use crate::domain::Candle;

/// MACD line and signal line, index-aligned with the input candles.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdLines {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
}

impl MacdLines {
    /// MACD minus signal at each index.
    pub fn histogram(&self) -> Vec<f64> {
        self.macd
            .iter()
            .zip(&self.signal)
            .map(|(m, s)| m - s)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Macd {
    pub fast_span: usize,
    pub slow_span: usize,
    pub signal_span: usize,
    name: String,
}

impl Macd {
    pub fn new(fast_span: usize, slow_span: usize, signal_span: usize) -> Self {
        assert!(fast_span >= 1, "fast_span must be >= 1");
        assert!(slow_span > fast_span, "slow_span must be > fast_span");
        assert!(signal_span >= 1, "signal_span must be >= 1");
        Self {
            fast_span,
            slow_span,
            signal_span,
            name: format!("macd_{fast_span}_{slow_span}_{signal_span}"),
        }
    }

    /// Compute both lines over the closes of `candles`.
    pub fn lines(&self, candles: &[Candle]) -> MacdLines {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let fast = ema_of_series(&closes, self.fast_span);
        let slow = ema_of_series(&closes, self.slow_span);
        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema_of_series(&macd, self.signal_span);
        MacdLines { macd, signal }
    }
}

impl Default for Macd {
    fn default() -> Self {
        Self::new(12, 26, 9)
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        self.lines(candles).macd
    }
}
