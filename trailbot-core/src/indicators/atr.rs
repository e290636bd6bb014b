//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|); the first
//! candle has no previous close and uses high-low alone.
//! ATR is the simple moving average of True Range over `period` candles, so the
//! first value sits at index `period - 1`.

use super::sma::sma_of_series;
use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

/// Compute the True Range series.
/// TR[0] = high[0] - low[0].
/// TR[t] = max(high[t]-low[t], |high[t]-close[t-1]|, |low[t]-close[t-1]|).
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    let n = candles.len();
    let mut tr = vec![f64::NAN; n];

    if n == 0 {
        return tr;
    }

    tr[0] = candles[0].high - candles[0].low;

    for i in 1..n {
        let h = candles[i].high;
        let l = candles[i].low;
        let pc = candles[i - 1].close;
        if h.is_nan() || l.is_nan() || pc.is_nan() {
            tr[i] = f64::NAN;
        } else {
            tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
        }
    }

    tr
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        sma_of_series(&true_range(candles), self.period)
    }
}
