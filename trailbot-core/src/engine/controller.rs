//! Trading controller — one evaluation pass over every configured pair.
//!
//! A pass runs in three phases:
//!
//! 1. Fetch the candle series for every pair (sequential, collaborator I/O)
//! 2. Compute indicator snapshots for pairs without a position (parallel, read-only)
//! 3. Apply decisions pair by pair against the position tracker
//!
//! Every failure is captured as a [`PairOutcome`] for its own pair. Nothing
//! that happens to one pair aborts the pass for the others.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::{ClosePolicy, ConfigError, EngineConfig};
use super::events::{EventSink, NullSink, SkipReason, TradeEvent};
use crate::domain::{Candle, OrderRequest, OrderSide, PortfolioSnapshot};
use crate::exchange::{Broker, ExchangeError, MarketData};
use crate::indicators::{IndicatorEngine, IndicatorError, IndicatorSnapshot};
use crate::position_management::{Action, PositionTracker, TrackerError};
use crate::signals::{MomentumSignal, SignalEvaluator};
use crate::sizers::{NoTrade, NotionalSizer, SizeDecision, Sizer, SizingError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error(transparent)]
    Sizing(#[from] SizingError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// What happened to one pair during one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PairOutcome {
    /// A buy was confirmed and the position is now tracked.
    Opened { entry_price: f64, amount: f64 },
    /// Position held; stop at `stop`.
    Held { stop: Option<f64> },
    /// A sell was confirmed and the position removed.
    Closed { exit_price: f64, pnl: f64 },
    /// The sell failed; the position stays pending and is retried next pass.
    CloseFailed { reason: String },
    /// The sell failed and the position was dropped anyway.
    Abandoned { reason: String },
    /// No entry this pass.
    Skipped { reason: SkipReason },
    /// An order or a precondition failed for this pair.
    Failed { error: String },
}

impl PairOutcome {
    fn failed(err: impl Into<ControllerError>) -> Self {
        PairOutcome::Failed {
            error: err.into().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairReport {
    pub pair: String,
    pub outcome: PairOutcome,
}

/// Summary of one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub pairs: Vec<PairReport>,
    /// True when any position was added, removed, or had its stop or state
    /// changed during the pass.
    pub book_changed: bool,
}

impl PassReport {
    pub fn outcome(&self, pair: &str) -> Option<&PairOutcome> {
        self.pairs
            .iter()
            .find(|r| r.pair == pair)
            .map(|r| &r.outcome)
    }

    fn count(&self, pred: impl Fn(&PairOutcome) -> bool) -> usize {
        self.pairs.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn opened(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Opened { .. }))
    }

    pub fn closed(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Closed { .. } | PairOutcome::Abandoned { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Failed { .. } | PairOutcome::CloseFailed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Skipped { .. }))
    }
}

/// Orchestrates indicators, signal, sizer and tracker against the exchange
/// collaborators.
pub struct TradingController {
    config: EngineConfig,
    engine: IndicatorEngine,
    signal: Box<dyn SignalEvaluator>,
    sizer: Box<dyn Sizer>,
    tracker: PositionTracker,
    market: Arc<dyn MarketData>,
    broker: Arc<dyn Broker>,
    sink: Arc<dyn EventSink>,
    portfolio: PortfolioSnapshot,
}

impl TradingController {
    pub fn new(
        config: EngineConfig,
        market: Arc<dyn MarketData>,
        broker: Arc<dyn Broker>,
    ) -> Result<Self, ControllerError> {
        config.validate()?;
        let engine = IndicatorEngine::new(config.indicator_params())?;
        let sizer = NotionalSizer::new(config.trade_fraction, config.min_notional);
        let tracker = PositionTracker::new(config.atr_multiplier);
        Ok(Self {
            config,
            engine,
            signal: Box::new(MomentumSignal),
            sizer: Box::new(sizer),
            tracker,
            market,
            broker,
            sink: Arc::new(NullSink),
            portfolio: PortfolioSnapshot::new(),
        })
    }

    /// Route controller and tracker events to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.tracker.set_sink(sink.clone());
        self.sink = sink;
        self
    }

    pub fn with_signal(mut self, signal: Box<dyn SignalEvaluator>) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_sizer(mut self, sizer: Box<dyn Sizer>) -> Self {
        self.sizer = sizer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    /// Mutable tracker access for startup restore.
    pub fn tracker_mut(&mut self) -> &mut PositionTracker {
        &mut self.tracker
    }

    pub fn portfolio(&self) -> &PortfolioSnapshot {
        &self.portfolio
    }

    pub fn indicator_engine(&self) -> &IndicatorEngine {
        &self.engine
    }

    pub fn market(&self) -> &Arc<dyn MarketData> {
        &self.market
    }

    /// Carry realized results over from a previous run. Balances are not
    /// restored; they are always fetched fresh.
    pub fn restore_portfolio(&mut self, previous: &PortfolioSnapshot) {
        self.portfolio.realized_pnl = previous.realized_pnl;
        self.portfolio.closed_trades = previous.closed_trades;
    }

    /// Fetch and record the starting balance.
    pub fn initialize_portfolio(&mut self) -> Result<f64, ExchangeError> {
        let balance = self.broker.fetch_balance()?;
        self.portfolio.observe_balance(balance);
        tracing::info!(balance, broker = self.broker.name(), "initial balance");
        Ok(balance)
    }

    /// Refresh the current balance without affecting decisions.
    pub fn refresh_balance(&mut self) -> Result<f64, ExchangeError> {
        let balance = self.broker.fetch_balance()?;
        self.portfolio.observe_balance(balance);
        Ok(balance)
    }

    /// Run one pass over every configured pair.
    pub fn run_pass(&mut self) -> PassReport {
        let started_at = Utc::now();
        let before = self.tracker.book().clone();
        let pairs = self.config.pairs.clone();

        // Phase 1: fetch
        let fetched: Vec<(String, Result<Vec<Candle>, ExchangeError>)> = pairs
            .iter()
            .map(|pair| (pair.clone(), self.fetch(pair)))
            .collect();

        // Phase 2: snapshots for pairs without a position
        let engine = &self.engine;
        let tracker = &self.tracker;
        let snapshots: HashMap<String, Result<IndicatorSnapshot, IndicatorError>> = fetched
            .par_iter()
            .filter(|(pair, _)| !tracker.has_position(pair))
            .filter_map(|(pair, series)| {
                series
                    .as_ref()
                    .ok()
                    .map(|candles| (pair.clone(), engine.compute(candles)))
            })
            .collect();

        // Phase 3: decide
        let mut reports = Vec::with_capacity(fetched.len());
        let mut snapshots = snapshots;
        for (pair, series) in fetched {
            let outcome = self.decide(&pair, series, snapshots.remove(&pair));
            reports.push(PairReport { pair, outcome });
        }

        let book_changed = before != *self.tracker.book();
        tracing::debug!(
            pairs = reports.len(),
            positions = self.tracker.len(),
            book_changed,
            "pass complete"
        );
        PassReport {
            started_at,
            pairs: reports,
            book_changed,
        }
    }

    /// Fetch, compute and decide for a single pair.
    pub fn process_pair(&mut self, pair: &str) -> PairOutcome {
        let series = self.fetch(pair);
        let snapshot = if self.tracker.has_position(pair) {
            None
        } else {
            series.as_ref().ok().map(|c| self.engine.compute(c))
        };
        self.decide(pair, series, snapshot)
    }

    fn fetch(&self, pair: &str) -> Result<Vec<Candle>, ExchangeError> {
        self.market
            .fetch_series(pair, &self.config.timeframe, self.config.history_limit)
    }

    fn decide(
        &mut self,
        pair: &str,
        series: Result<Vec<Candle>, ExchangeError>,
        snapshot: Option<Result<IndicatorSnapshot, IndicatorError>>,
    ) -> PairOutcome {
        let latest_close = series
            .as_ref()
            .ok()
            .and_then(|c| c.last())
            .map(|c| c.close);

        if let Some(position) = self.tracker.get(pair) {
            if position.is_pending_close() {
                let amount = position.amount;
                let reference = latest_close
                    .or(position.trailing_stop())
                    .unwrap_or(position.entry_price);
                return self.close(pair, amount, reference);
            }
            return match latest_close {
                Some(price) => self.manage(pair, price),
                None => self.skip(pair, data_unavailable(&series)),
            };
        }

        let snapshot = match (series, snapshot) {
            (Err(e), _) => {
                return self.skip(
                    pair,
                    SkipReason::DataUnavailable {
                        detail: e.to_string(),
                    },
                )
            }
            (Ok(_), Some(snapshot)) => snapshot,
            (Ok(candles), None) => self.engine.compute(&candles),
        };
        match snapshot {
            Ok(snapshot) => self.enter(pair, &snapshot),
            Err(IndicatorError::InsufficientData {
                required,
                available,
            }) => self.skip(
                pair,
                SkipReason::InsufficientData {
                    required,
                    available,
                },
            ),
            Err(IndicatorError::NonFinite { field }) => self.skip(
                pair,
                SkipReason::InvalidIndicators {
                    detail: format!("{field} is not finite"),
                },
            ),
            Err(e) => PairOutcome::failed(e),
        }
    }

    fn manage(&mut self, pair: &str, price: f64) -> PairOutcome {
        match self.tracker.evaluate(pair, price) {
            Action::None => PairOutcome::Held {
                stop: self.tracker.get(pair).and_then(|p| p.trailing_stop()),
            },
            Action::ClosePosition { amount } => self.close(pair, amount, price),
        }
    }

    fn close(&mut self, pair: &str, amount: f64, reference_price: f64) -> PairOutcome {
        let order = OrderRequest::sell(pair, amount);
        match self.broker.submit_order(&order) {
            Ok(confirmation) => {
                let exit_price = confirmation.price_or(reference_price);
                match self.tracker.confirm_close(pair, exit_price) {
                    Ok(pnl) => {
                        self.portfolio.record_close(pnl);
                        PairOutcome::Closed { exit_price, pnl }
                    }
                    Err(e) => PairOutcome::failed(e),
                }
            }
            Err(e) => {
                let reason = e.to_string();
                self.order_failed(&order, &reason);
                let result = match self.config.close_policy {
                    ClosePolicy::Confirmed => self
                        .tracker
                        .close_failed(pair, &reason)
                        .map(|_| PairOutcome::CloseFailed { reason }),
                    ClosePolicy::Optimistic => self
                        .tracker
                        .abandon(pair)
                        .map(|_| PairOutcome::Abandoned { reason }),
                };
                result.unwrap_or_else(PairOutcome::failed)
            }
        }
    }

    fn enter(&mut self, pair: &str, snapshot: &IndicatorSnapshot) -> PairOutcome {
        if !self.signal.evaluate(snapshot).is_buy() {
            return self.skip(pair, SkipReason::NoSignal);
        }
        let limit = self.config.max_open_positions;
        if self.tracker.len() >= limit {
            return self.skip(pair, SkipReason::MaxOpenPositions { limit });
        }

        let balance = match self.broker.fetch_balance() {
            Ok(b) => b,
            Err(e) => {
                return self.skip(
                    pair,
                    SkipReason::BalanceUnavailable {
                        detail: e.to_string(),
                    },
                )
            }
        };
        if !balance.is_finite() {
            return self.skip(
                pair,
                SkipReason::BalanceUnavailable {
                    detail: format!("non-finite balance {balance}"),
                },
            );
        }
        self.portfolio.observe_balance(balance);
        let min_notional = self.config.min_notional;
        if balance < min_notional {
            return self.skip(
                pair,
                SkipReason::InsufficientBalance {
                    balance,
                    min_notional,
                },
            );
        }

        let quantity = match self.sizer.plan(balance, snapshot.close) {
            Ok(SizeDecision::Order {
                quantity,
                notional,
                floored,
            }) => {
                if floored {
                    tracing::info!(pair, notional, "order raised to minimum notional");
                }
                quantity
            }
            Ok(SizeDecision::DoNotTrade(NoTrade::ZeroSize)) => {
                return self.skip(pair, SkipReason::ZeroSize)
            }
            Ok(SizeDecision::DoNotTrade(NoTrade::Unaffordable { required, balance })) => {
                return self.skip(pair, SkipReason::Unaffordable { required, balance })
            }
            Err(e) => return PairOutcome::failed(e),
        };

        let order = OrderRequest::buy(pair, quantity);
        let confirmation = match self.broker.submit_order(&order) {
            Ok(c) => c,
            Err(e) => {
                let reason = e.to_string();
                self.order_failed(&order, &reason);
                return PairOutcome::Failed { error: reason };
            }
        };

        let entry_price = confirmation.price_or(snapshot.close);
        let amount = confirmation.quantity_or(quantity);
        match self.tracker.open(pair, entry_price, amount, snapshot.atr) {
            Ok(_) => PairOutcome::Opened {
                entry_price,
                amount,
            },
            Err(e) => {
                tracing::error!(pair, error = %e, order_id = %confirmation.order_id,
                    "buy confirmed but position not tracked");
                PairOutcome::failed(e)
            }
        }
    }

    fn skip(&self, pair: &str, reason: SkipReason) -> PairOutcome {
        self.sink.emit(&TradeEvent::TradeSkipped {
            pair: pair.into(),
            reason: reason.clone(),
        });
        PairOutcome::Skipped { reason }
    }

    fn order_failed(&self, order: &OrderRequest, reason: &str) {
        self.sink.emit(&TradeEvent::OrderFailed {
            pair: order.pair.clone(),
            side: order.side,
            quantity: order.quantity,
            reason: reason.into(),
        });
        if order.side == OrderSide::Buy {
            tracing::warn!(pair = %order.pair, "buy not confirmed, position not opened");
        }
    }
}

fn data_unavailable(series: &Result<Vec<Candle>, ExchangeError>) -> SkipReason {
    let detail = match series {
        Err(e) => e.to_string(),
        Ok(_) => "empty series".into(),
    };
    SkipReason::DataUnavailable { detail }
}
