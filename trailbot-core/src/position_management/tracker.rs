//! Position tracker — owns the book and runs the trailing-stop state machine.
//!
//! Per pair: `NoPosition → Open(unarmed) → Open(armed) → PendingClose → removed`.
//!
//! The tracker never talks to the exchange. `evaluate` returns an
//! [`Action`]; the caller submits the sell and reports back through
//! [`PositionTracker::confirm_close`] or [`PositionTracker::close_failed`].

use std::sync::Arc;

use thiserror::Error;

use crate::domain::{Position, PositionState};
use crate::engine::events::{EventSink, NullSink, TradeEvent};

use super::book::PositionBook;
use super::intent::Action;
use super::ratchet::StopChange;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    #[error("position already open for {pair}")]
    AlreadyOpen { pair: String },
    #[error("no position tracked for {pair}")]
    NotTracked { pair: String },
    #[error("position for {pair} is not awaiting a close")]
    NotPendingClose { pair: String },
    #[error("invalid amount {amount} for {pair}")]
    InvalidAmount { pair: String, amount: f64 },
    #[error("invalid price {price} for {pair}")]
    InvalidPrice { pair: String, price: f64 },
    #[error("invalid ATR {atr} for {pair}")]
    InvalidAtr { pair: String, atr: f64 },
}

fn positive(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

pub struct PositionTracker {
    book: PositionBook,
    atr_multiplier: f64,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PositionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionTracker")
            .field("book", &self.book)
            .field("atr_multiplier", &self.atr_multiplier)
            .finish_non_exhaustive()
    }
}

impl PositionTracker {
    /// # Panics
    /// Panics if `atr_multiplier` is not finite and positive.
    pub fn new(atr_multiplier: f64) -> Self {
        assert!(
            positive(atr_multiplier),
            "ATR multiplier must be finite and positive"
        );
        Self {
            book: PositionBook::new(),
            atr_multiplier,
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn set_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = sink;
    }

    pub fn atr_multiplier(&self) -> f64 {
        self.atr_multiplier
    }

    pub fn book(&self) -> &PositionBook {
        &self.book
    }

    pub fn get(&self, pair: &str) -> Option<&Position> {
        self.book.get(pair)
    }

    pub fn has_position(&self, pair: &str) -> bool {
        self.book.contains(pair)
    }

    /// Number of tracked positions, pending closes included.
    pub fn len(&self) -> usize {
        self.book.len()
    }

    pub fn is_empty(&self) -> bool {
        self.book.is_empty()
    }

    /// Start tracking a freshly bought position. The stop stays unset until
    /// the first `evaluate`.
    pub fn open(
        &mut self,
        pair: &str,
        entry_price: f64,
        amount: f64,
        atr_at_entry: f64,
    ) -> Result<&Position, TrackerError> {
        if self.book.contains(pair) {
            return Err(TrackerError::AlreadyOpen { pair: pair.into() });
        }
        validate(pair, entry_price, amount, atr_at_entry)?;

        let position = Position::new(pair.to_string(), entry_price, amount, atr_at_entry);
        self.book
            .insert(position)
            .map_err(|_| TrackerError::AlreadyOpen { pair: pair.into() })?;
        self.sink.emit(&TradeEvent::PositionOpened {
            pair: pair.into(),
            entry_price,
            amount,
            atr_at_entry,
        });
        self.book
            .get(pair)
            .ok_or_else(|| TrackerError::NotTracked { pair: pair.into() })
    }

    /// Update the stop for `pair` against the latest price.
    ///
    /// 1. Arm the stop at `entry - k * atr` if unset.
    /// 2. If price is above entry, raise it to `price - k * atr` when higher.
    /// 3. If price is at or below the stop, mark the position pending close
    ///    and return `ClosePosition`.
    ///
    /// Untracked pairs, pending closes and non-finite prices return `None`.
    pub fn evaluate(&mut self, pair: &str, current_price: f64) -> Action {
        let multiplier = self.atr_multiplier;
        let Some(position) = self.book.get_mut(pair) else {
            return Action::None;
        };
        if position.state == PositionState::PendingClose || !current_price.is_finite() {
            return Action::None;
        }

        let mut events = Vec::new();
        if positive(position.atr_at_entry) {
            let distance = multiplier * position.atr_at_entry;
            if !position.trailing_stop.is_armed() {
                let change = position.trailing_stop.apply(position.entry_price - distance);
                events.push(stop_event(pair, change));
            }
            if current_price > position.entry_price {
                if let change @ StopChange::Raised { .. } =
                    position.trailing_stop.apply(current_price - distance)
                {
                    events.push(stop_event(pair, change));
                }
            }
        } else {
            tracing::warn!(pair, atr = position.atr_at_entry, "ATR invalid, stop not updated");
        }

        let action = match position.trailing_stop.level() {
            Some(stop) if current_price <= stop => {
                position.state = PositionState::PendingClose;
                events.push(TradeEvent::StopBreached {
                    pair: pair.into(),
                    price: current_price,
                    stop,
                    amount: position.amount,
                });
                Action::ClosePosition {
                    amount: position.amount,
                }
            }
            _ => Action::None,
        };

        for event in &events {
            self.sink.emit(event);
        }
        action
    }

    /// The sell for a breached position went through. Removes the position
    /// and returns the realized P&L.
    pub fn confirm_close(&mut self, pair: &str, exit_price: f64) -> Result<f64, TrackerError> {
        let position = self
            .book
            .get(pair)
            .ok_or_else(|| TrackerError::NotTracked { pair: pair.into() })?;
        if position.state != PositionState::PendingClose {
            return Err(TrackerError::NotPendingClose { pair: pair.into() });
        }
        if !positive(exit_price) {
            return Err(TrackerError::InvalidPrice {
                pair: pair.into(),
                price: exit_price,
            });
        }
        let position = self
            .book
            .remove(pair)
            .ok_or_else(|| TrackerError::NotTracked { pair: pair.into() })?;
        let pnl = position.unrealized_pnl(exit_price);
        self.sink.emit(&TradeEvent::PositionClosed {
            pair: pair.into(),
            exit_price,
            amount: position.amount,
            pnl,
        });
        Ok(pnl)
    }

    /// The sell for a breached position failed. The position stays pending
    /// and is retried through [`pending_closes`](Self::pending_closes).
    pub fn close_failed(&mut self, pair: &str, reason: &str) -> Result<(), TrackerError> {
        match self.book.get(pair) {
            None => Err(TrackerError::NotTracked { pair: pair.into() }),
            Some(p) if p.state != PositionState::PendingClose => {
                Err(TrackerError::NotPendingClose { pair: pair.into() })
            }
            Some(_) => {
                self.sink.emit(&TradeEvent::CloseFailed {
                    pair: pair.into(),
                    reason: reason.into(),
                });
                Ok(())
            }
        }
    }

    /// Drop a position without a confirmed sell.
    pub fn abandon(&mut self, pair: &str) -> Result<Position, TrackerError> {
        let position = self
            .book
            .remove(pair)
            .ok_or_else(|| TrackerError::NotTracked { pair: pair.into() })?;
        self.sink.emit(&TradeEvent::PositionAbandoned {
            pair: pair.into(),
            amount: position.amount,
        });
        Ok(position)
    }

    /// `(pair, amount)` for every position awaiting a confirmed sell.
    pub fn pending_closes(&self) -> Vec<(String, f64)> {
        self.book
            .iter()
            .filter(|p| p.is_pending_close())
            .map(|p| (p.pair.clone(), p.amount))
            .collect()
    }

    /// Load a persisted position, keeping its stop and state.
    ///
    /// An invalid ATR is accepted so the caller can repair it with
    /// [`rebase_atr`](Self::rebase_atr).
    pub fn restore(&mut self, position: Position) -> Result<(), TrackerError> {
        let pair = position.pair.clone();
        if !positive(position.amount) {
            return Err(TrackerError::InvalidAmount {
                pair,
                amount: position.amount,
            });
        }
        if !positive(position.entry_price) {
            return Err(TrackerError::InvalidPrice {
                pair,
                price: position.entry_price,
            });
        }
        let event = TradeEvent::PositionRestored {
            pair: pair.clone(),
            entry_price: position.entry_price,
            amount: position.amount,
            trailing_stop: position.trailing_stop(),
        };
        self.book
            .insert(position)
            .map_err(|_| TrackerError::AlreadyOpen { pair })?;
        self.sink.emit(&event);
        Ok(())
    }

    /// Replace the entry ATR of a restored position. The stop level itself
    /// is untouched and can still only rise.
    pub fn rebase_atr(&mut self, pair: &str, atr: f64) -> Result<(), TrackerError> {
        if !positive(atr) {
            return Err(TrackerError::InvalidAtr {
                pair: pair.into(),
                atr,
            });
        }
        let position = self
            .book
            .get_mut(pair)
            .ok_or_else(|| TrackerError::NotTracked { pair: pair.into() })?;
        tracing::info!(pair, old = position.atr_at_entry, new = atr, "entry ATR recomputed");
        position.atr_at_entry = atr;
        Ok(())
    }
}

fn validate(pair: &str, entry_price: f64, amount: f64, atr: f64) -> Result<(), TrackerError> {
    if !positive(amount) {
        return Err(TrackerError::InvalidAmount {
            pair: pair.into(),
            amount,
        });
    }
    if !positive(entry_price) {
        return Err(TrackerError::InvalidPrice {
            pair: pair.into(),
            price: entry_price,
        });
    }
    if !positive(atr) {
        return Err(TrackerError::InvalidAtr {
            pair: pair.into(),
            atr,
        });
    }
    Ok(())
}

fn stop_event(pair: &str, change: StopChange) -> TradeEvent {
    match change {
        StopChange::Armed { level } | StopChange::Unchanged { level } => TradeEvent::StopArmed {
            pair: pair.into(),
            level,
        },
        StopChange::Raised { from, to } => TradeEvent::StopRatcheted {
            pair: pair.into(),
            from,
            to,
        },
    }
}
