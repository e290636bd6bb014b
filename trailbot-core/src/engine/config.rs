//! Engine configuration — every tunable of the trading loop in one struct.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::split_pair;
use crate::indicators::{IndicatorError, IndicatorParams};

/// What happens to a position whose closing sell fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosePolicy {
    /// Remove only after a confirmed sell; failures stay pending and retry.
    #[default]
    Confirmed,
    /// Remove as soon as the sell is issued, whatever the outcome.
    Optimistic,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no trading pairs configured")]
    NoPairs,

    #[error("invalid pair '{0}': expected BASE/QUOTE")]
    InvalidPair(String),

    #[error("pair '{0}' listed more than once")]
    DuplicatePair(String),

    #[error("timeframe must not be empty")]
    EmptyTimeframe,

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error("{field} must be finite and positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("trade_fraction must be in (0, 1], got {0}")]
    TradeFraction(f64),

    #[error("max_open_positions must be at least 1")]
    NoPositionCapacity,

    #[error("history_limit {limit} is below the {required} candles the indicators need")]
    HistoryTooShort { limit: usize, required: usize },
}

/// Configuration for the trading controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Pairs as `BASE/QUOTE`, e.g. `"SOL/USDT"`.
    pub pairs: Vec<String>,
    /// Candle interval, e.g. `"1m"`.
    pub timeframe: String,
    pub fast_span: usize,
    pub slow_span: usize,
    pub signal_span: usize,
    pub atr_period: usize,
    /// Stop distance in multiples of the entry ATR.
    pub atr_multiplier: f64,
    /// Fraction of free balance per entry.
    pub trade_fraction: f64,
    /// Minimum order value in quote currency.
    pub min_notional: f64,
    /// Pause between passes.
    pub cooldown_secs: u64,
    pub max_open_positions: usize,
    /// Candles requested per fetch.
    pub history_limit: usize,
    pub close_policy: ClosePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let params = IndicatorParams::default();
        Self {
            pairs: [
                "PEPE", "DOGE", "BNB", "ADA", "XRP", "PYTH", "SOL", "JUP", "MODE", "BABYDOGE",
                "BONK",
            ]
            .iter()
            .map(|base| format!("{base}/USDT"))
            .collect(),
            timeframe: "1m".into(),
            fast_span: params.fast_span,
            slow_span: params.slow_span,
            signal_span: params.signal_span,
            atr_period: params.atr_period,
            atr_multiplier: 2.0,
            trade_fraction: 0.1,
            min_notional: 3.0,
            cooldown_secs: 10,
            max_open_positions: 100,
            history_limit: 100,
            close_policy: ClosePolicy::Confirmed,
        }
    }
}

impl EngineConfig {
    pub fn indicator_params(&self) -> IndicatorParams {
        IndicatorParams {
            fast_span: self.fast_span,
            slow_span: self.slow_span,
            signal_span: self.signal_span,
            atr_period: self.atr_period,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pairs.is_empty() {
            return Err(ConfigError::NoPairs);
        }
        let mut seen = std::collections::HashSet::new();
        for pair in &self.pairs {
            if split_pair(pair).is_none() {
                return Err(ConfigError::InvalidPair(pair.clone()));
            }
            if !seen.insert(pair.as_str()) {
                return Err(ConfigError::DuplicatePair(pair.clone()));
            }
        }
        if self.timeframe.trim().is_empty() {
            return Err(ConfigError::EmptyTimeframe);
        }

        let params = self.indicator_params();
        params.validate()?;

        if !(self.atr_multiplier.is_finite() && self.atr_multiplier > 0.0) {
            return Err(ConfigError::NotPositive {
                field: "atr_multiplier",
                value: self.atr_multiplier,
            });
        }
        if !(self.trade_fraction > 0.0 && self.trade_fraction <= 1.0) {
            return Err(ConfigError::TradeFraction(self.trade_fraction));
        }
        if !(self.min_notional.is_finite() && self.min_notional >= 0.0) {
            return Err(ConfigError::NotPositive {
                field: "min_notional",
                value: self.min_notional,
            });
        }
        if self.max_open_positions == 0 {
            return Err(ConfigError::NoPositionCapacity);
        }
        let required = params.required_candles();
        if self.history_limit < required {
            return Err(ConfigError::HistoryTooShort {
                limit: self.history_limit,
                required,
            });
        }
        Ok(())
    }
}
