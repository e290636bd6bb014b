//! Trade events — every position transition and every skipped entry is
//! observable through an [`EventSink`].
//!
//! Sinks are shared across threads (`Arc<dyn EventSink>`), so implementations
//! use interior mutability where they keep state.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::domain::OrderSide;

/// Why an entry attempt was skipped for one pair in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Market data could not be fetched.
    DataUnavailable { detail: String },
    /// Too few candles for the indicator engine.
    InsufficientData { required: usize, available: usize },
    /// Indicators produced a non-finite value.
    InvalidIndicators { detail: String },
    /// Momentum is not bullish.
    NoSignal,
    /// The book already holds the configured maximum of positions.
    MaxOpenPositions { limit: usize },
    /// Balance could not be fetched.
    BalanceUnavailable { detail: String },
    /// Balance is below the minimum order value.
    InsufficientBalance { balance: f64, min_notional: f64 },
    /// The sizer produced no tradable quantity.
    ZeroSize,
    /// The floored order value exceeds the balance.
    Unaffordable { required: f64, balance: f64 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DataUnavailable { detail } => write!(f, "data unavailable: {detail}"),
            SkipReason::InsufficientData {
                required,
                available,
            } => write!(f, "insufficient data: need {required} candles, have {available}"),
            SkipReason::InvalidIndicators { detail } => write!(f, "invalid indicators: {detail}"),
            SkipReason::NoSignal => write!(f, "no buy signal"),
            SkipReason::MaxOpenPositions { limit } => {
                write!(f, "max open positions reached ({limit})")
            }
            SkipReason::BalanceUnavailable { detail } => {
                write!(f, "balance unavailable: {detail}")
            }
            SkipReason::InsufficientBalance {
                balance,
                min_notional,
            } => write!(f, "balance {balance} below minimum order value {min_notional}"),
            SkipReason::ZeroSize => write!(f, "computed size is zero"),
            SkipReason::Unaffordable { required, balance } => {
                write!(f, "order value {required} exceeds balance {balance}")
            }
        }
    }
}

impl SkipReason {
    /// Skips that recur every pass while nothing is wrong.
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            SkipReason::NoSignal | SkipReason::InsufficientData { .. }
        )
    }
}

/// A single observable transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TradeEvent {
    PositionOpened {
        pair: String,
        entry_price: f64,
        amount: f64,
        atr_at_entry: f64,
    },
    /// First stop level set for a position.
    StopArmed { pair: String, level: f64 },
    StopRatcheted { pair: String, from: f64, to: f64 },
    /// Price fell to or below the stop; a sell is being issued.
    StopBreached {
        pair: String,
        price: f64,
        stop: f64,
        amount: f64,
    },
    PositionClosed {
        pair: String,
        exit_price: f64,
        amount: f64,
        pnl: f64,
    },
    /// The sell for a breached position was not confirmed.
    CloseFailed { pair: String, reason: String },
    /// A position was dropped from the book without a confirmed sell.
    PositionAbandoned { pair: String, amount: f64 },
    /// A persisted position was loaded back into the book.
    PositionRestored {
        pair: String,
        entry_price: f64,
        amount: f64,
        trailing_stop: Option<f64>,
    },
    TradeSkipped { pair: String, reason: SkipReason },
    OrderFailed {
        pair: String,
        side: OrderSide,
        quantity: f64,
        reason: String,
    },
}

impl TradeEvent {
    pub fn pair(&self) -> &str {
        match self {
            TradeEvent::PositionOpened { pair, .. }
            | TradeEvent::StopArmed { pair, .. }
            | TradeEvent::StopRatcheted { pair, .. }
            | TradeEvent::StopBreached { pair, .. }
            | TradeEvent::PositionClosed { pair, .. }
            | TradeEvent::CloseFailed { pair, .. }
            | TradeEvent::PositionAbandoned { pair, .. }
            | TradeEvent::PositionRestored { pair, .. }
            | TradeEvent::TradeSkipped { pair, .. }
            | TradeEvent::OrderFailed { pair, .. } => pair,
        }
    }

    /// Short machine-readable name, matching the serde tag.
    pub fn kind(&self) -> &'static str {
        match self {
            TradeEvent::PositionOpened { .. } => "position_opened",
            TradeEvent::StopArmed { .. } => "stop_armed",
            TradeEvent::StopRatcheted { .. } => "stop_ratcheted",
            TradeEvent::StopBreached { .. } => "stop_breached",
            TradeEvent::PositionClosed { .. } => "position_closed",
            TradeEvent::CloseFailed { .. } => "close_failed",
            TradeEvent::PositionAbandoned { .. } => "position_abandoned",
            TradeEvent::PositionRestored { .. } => "position_restored",
            TradeEvent::TradeSkipped { .. } => "trade_skipped",
            TradeEvent::OrderFailed { .. } => "order_failed",
        }
    }
}

/// Destination for trade events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &TradeEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &TradeEvent) {}
}

/// Collects events in memory. Used by replay reports and tests.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<TradeEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<TradeEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Take everything recorded so far, leaving the log empty.
    pub fn drain(&self) -> Vec<TradeEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|ev| ev.kind() == kind).count())
            .unwrap_or(0)
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: &TradeEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Maps each event to a `tracing` event with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &TradeEvent) {
        match event {
            TradeEvent::PositionOpened {
                pair,
                entry_price,
                amount,
                atr_at_entry,
            } => tracing::info!(%pair, entry_price, amount, atr_at_entry, "position opened"),
            TradeEvent::StopArmed { pair, level } => {
                tracing::info!(%pair, level, "trailing stop armed")
            }
            TradeEvent::StopRatcheted { pair, from, to } => {
                tracing::info!(%pair, from, to, "trailing stop raised")
            }
            TradeEvent::StopBreached {
                pair,
                price,
                stop,
                amount,
            } => tracing::warn!(%pair, price, stop, amount, "trailing stop hit"),
            TradeEvent::PositionClosed {
                pair,
                exit_price,
                amount,
                pnl,
            } => tracing::info!(%pair, exit_price, amount, pnl, "position closed"),
            TradeEvent::CloseFailed { pair, reason } => {
                tracing::error!(%pair, %reason, "close order failed, position pending")
            }
            TradeEvent::PositionAbandoned { pair, amount } => {
                tracing::warn!(%pair, amount, "position dropped without confirmed sell")
            }
            TradeEvent::PositionRestored {
                pair,
                entry_price,
                amount,
                trailing_stop,
            } => tracing::info!(
                %pair,
                entry_price,
                amount,
                trailing_stop = ?trailing_stop,
                "position restored"
            ),
            TradeEvent::TradeSkipped { pair, reason } => {
                tracing::debug!(%pair, %reason, "entry skipped")
            }
            TradeEvent::OrderFailed {
                pair,
                side,
                quantity,
                reason,
            } => tracing::error!(%pair, %side, quantity, %reason, "order failed"),
        }
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &TradeEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened(pair: &str) -> TradeEvent {
        TradeEvent::PositionOpened {
            pair: pair.into(),
            entry_price: 1.0,
            amount: 2.0,
            atr_at_entry: 0.1,
        }
    }

    #[test]
    fn routine_skips() {
        assert!(SkipReason::NoSignal.is_routine());
        assert!(SkipReason::InsufficientData {
            required: 35,
            available: 3
        }
        .is_routine());
        assert!(!SkipReason::ZeroSize.is_routine());
    }

    #[test]
    fn event_log_collects_and_drains() {
        let log = EventLog::new();
        log.emit(&opened("DOGE/USDT"));
        log.emit(&TradeEvent::StopArmed {
            pair: "DOGE/USDT".into(),
            level: 0.8,
        });
        assert_eq!(log.events().len(), 2);
        assert_eq!(log.count("stop_armed"), 1);
        assert_eq!(log.drain().len(), 2);
        assert!(log.events().is_empty());
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(EventLog::new());
        let b = Arc::new(EventLog::new());
        let fan = FanoutSink::new()
            .with(a.clone())
            .with(b.clone())
            .with(Arc::new(NullSink));
        assert_eq!(fan.len(), 3);
        fan.emit(&opened("SOL/USDT"));
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }

    #[test]
    fn serde_tag_matches_kind() {
        let ev = TradeEvent::TradeSkipped {
            pair: "BNB/USDT".into(),
            reason: SkipReason::MaxOpenPositions { limit: 4 },
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], ev.kind());
        assert_eq!(json["reason"]["kind"], "max_open_positions");
        assert_eq!(ev.pair(), "BNB/USDT");
    }

    #[test]
    fn skip_reason_display_is_readable() {
        let r = SkipReason::InsufficientData {
            required: 35,
            available: 20,
        };
        assert_eq!(r.to_string(), "insufficient data: need 35 candles, have 20");
    }
}
