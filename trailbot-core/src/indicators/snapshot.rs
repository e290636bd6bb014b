//! Indicator engine — reduces a candle series to the latest-bar snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Atr, Indicator, Macd};
use crate::domain::Candle;

/// Direction of MACD momentum at the latest bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Momentum {
    Bullish,
    Bearish,
}

impl Momentum {
    /// Bullish only if `macd` is strictly above `signal`. A tie is Bearish.
    pub fn classify(macd: f64, signal: f64) -> Self {
        if macd > signal {
            Momentum::Bullish
        } else {
            Momentum::Bearish
        }
    }
}

/// Latest-bar indicator values. Recomputed every pass, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub macd: f64,
    pub signal: f64,
    pub atr: f64,
    pub momentum: Momentum,
    /// Close of the latest candle.
    pub close: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("insufficient data: need {required} candles, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("latest {field} value is not finite")]
    NonFinite { field: &'static str },

    #[error("invalid indicator parameters: {0}")]
    InvalidParams(String),
}

/// Spans and periods for the indicator engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub fast_span: usize,
    pub slow_span: usize,
    pub signal_span: usize,
    pub atr_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            fast_span: 12,
            slow_span: 26,
            signal_span: 9,
            atr_period: 14,
        }
    }
}

impl IndicatorParams {
    pub fn validate(&self) -> Result<(), IndicatorError> {
        if self.fast_span == 0 || self.signal_span == 0 || self.atr_period == 0 {
            return Err(IndicatorError::InvalidParams(
                "spans and ATR period must be >= 1".into(),
            ));
        }
        if self.slow_span <= self.fast_span {
            return Err(IndicatorError::InvalidParams(format!(
                "slow span ({}) must exceed fast span ({})",
                self.slow_span, self.fast_span
            )));
        }
        Ok(())
    }

    /// Minimum series length before a snapshot is produced.
    pub fn required_candles(&self) -> usize {
        (self.slow_span + self.signal_span).max(self.atr_period)
    }
}

/// Computes MACD, signal and ATR from a full series on every call.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    params: IndicatorParams,
    macd: Macd,
    atr: Atr,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Result<Self, IndicatorError> {
        params.validate()?;
        Ok(Self {
            params,
            macd: Macd::new(params.fast_span, params.slow_span, params.signal_span),
            atr: Atr::new(params.atr_period),
        })
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    pub fn required_candles(&self) -> usize {
        self.params.required_candles()
    }

    /// Snapshot of the latest candle, or a distinct error if the series cannot
    /// support one. Never returns a snapshot containing NaN.
    pub fn compute(&self, series: &[Candle]) -> Result<IndicatorSnapshot, IndicatorError> {
        let required = self.required_candles();
        if series.len() < required {
            return Err(IndicatorError::InsufficientData {
                required,
                available: series.len(),
            });
        }

        let lines = self.macd.lines(series);
        let atr = self.atr.compute(series);
        let last = series.len() - 1;

        let macd = finite(lines.macd[last], "macd")?;
        let signal = finite(lines.signal[last], "signal")?;
        let atr = finite(atr[last], "atr")?;
        let close = finite(series[last].close, "close")?;

        Ok(IndicatorSnapshot {
            macd,
            signal,
            atr,
            momentum: Momentum::classify(macd, signal),
            close,
            timestamp: series[last].timestamp,
        })
    }
}

fn finite(value: f64, field: &'static str) -> Result<f64, IndicatorError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(IndicatorError::NonFinite { field })
    }
}
