//! Indicator implementations and the per-pass indicator engine.
//!
//! Indicators are pure functions: candle history in, numeric series out. The
//! engine recomputes every series from the full window on each pass and only
//! the latest bar's values leave this module, as an `IndicatorSnapshot`.
//! Nothing is carried between passes.

pub mod atr;
pub mod ema;
pub mod macd;
pub mod sma;
pub mod snapshot;

pub use atr::{true_range, Atr};
pub use ema::{ema_of_series, Ema};
pub use macd::{Macd, MacdLines};
pub use sma::sma_of_series;
pub use snapshot::{IndicatorEngine, IndicatorError, IndicatorParams, IndicatorSnapshot, Momentum};

use crate::domain::Candle;

/// Trait for single-series indicators.
///
/// Output has the same length as the input. Positions before `lookback()` are
/// `f64::NAN` (warmup).
///
/// # Look-ahead guard
/// No value at index t may depend on candles after t.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ema_12", "atr_14").
    fn name(&self) -> &str;

    /// Index of the first valid output value.
    fn lookback(&self) -> usize;

    fn compute(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Build synthetic candles from close prices for testing.
///
/// open = previous close (or close for the first candle),
/// high = max(open, close) + 1.0, low = min(open, close) - 1.0, one minute apart.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                timestamp: base + chrono::Duration::minutes(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
