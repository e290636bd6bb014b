//! Exponential Moving Average (EMA), span form without bias adjustment.
//!
//! Recursive: EMA[0] = x[0], EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1],
//! alpha = 2 / (span + 1).
//! Every index carries a value, but values before roughly `span` samples have
//! not converged; callers decide how much history is enough.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Ema {
    span: usize,
    name: String,
}

impl Ema {
    pub fn new(span: usize) -> Self {
        assert!(span >= 1, "EMA span must be >= 1");
        Self {
            span,
            name: format!("ema_{span}"),
        }
    }

    pub fn span(&self) -> usize {
        self.span
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        ema_of_series(&closes, self.span)
    }
}

/// EMA of an arbitrary series. Used for both price EMAs and the MACD signal line.
///
/// A NaN input poisons its own and every later output.
pub fn ema_of_series(values: &[f64], span: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if n == 0 || span == 0 {
        return result;
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut prev = values[0];
    result[0] = prev;

    for i in 1..n {
        if prev.is_nan() || values[i].is_nan() {
            return result;
        }
        // Same recurrence, written so a constant input stays exactly constant.
        let ema = prev + alpha * (values[i] - prev);
        result[i] = ema;
        prev = ema;
    }

    result
}
