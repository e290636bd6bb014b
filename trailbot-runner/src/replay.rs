//! Offline replay: historical or synthetic candles fed bar by bar through
//! the real controller with simulated fills.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use trailbot_core::domain::Candle;
use trailbot_core::engine::{
    ControllerError, EngineConfig, EventLog, EventSink, FanoutSink, TradeEvent, TradingController,
};
use trailbot_core::exchange::{Broker, ExchangeError, PaperBroker, ReplayFeed};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("no candle series to replay")]
    NoSeries,

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

#[derive(Clone)]
pub struct ReplayOptions {
    pub balance: f64,
    pub fee_rate: f64,
    /// Extra sink receiving every event (e.g. a journal).
    pub sink: Option<Arc<dyn EventSink>>,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            balance: 1_000.0,
            fee_rate: 0.0,
            sink: None,
        }
    }
}

/// One completed round trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub pair: String,
    pub exit_price: f64,
    pub amount: f64,
    pub pnl: f64,
}

/// A position still held when the data ran out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenTrade {
    pub pair: String,
    pub entry_price: f64,
    pub amount: f64,
    pub trailing_stop: Option<f64>,
    pub last_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    pub passes: usize,
    pub opened: usize,
    pub closed: Vec<ClosedTrade>,
    pub open: Vec<OpenTrade>,
    pub realized_pnl: f64,
    pub starting_balance: f64,
    pub final_balance: f64,
    /// Final balance plus open positions marked at their last close.
    pub final_equity: f64,
    pub event_counts: BTreeMap<String, usize>,
}

/// Replay `series` (pair → candles) through a controller built from `config`.
///
/// The configured pair list is replaced by the replayed pairs.
pub fn run_replay(
    mut config: EngineConfig,
    series: BTreeMap<String, Vec<Candle>>,
    options: ReplayOptions,
) -> Result<ReplayReport, ReplayError> {
    if series.is_empty() || series.values().all(Vec::is_empty) {
        return Err(ReplayError::NoSeries);
    }
    config.pairs = series.keys().cloned().collect();

    let feed = Arc::new(
        series
            .into_iter()
            .fold(ReplayFeed::new(), |feed, (pair, candles)| {
                feed.with_series(pair, candles)
            }),
    );
    let broker = Arc::new(
        PaperBroker::new(feed.clone(), config.timeframe.clone(), options.balance)
            .with_fee_rate(options.fee_rate),
    );

    let log = Arc::new(EventLog::new());
    let mut sink = FanoutSink::new().with(log.clone());
    if let Some(extra) = options.sink {
        sink = sink.with(extra);
    }

    let mut controller = TradingController::new(config, feed.clone(), broker.clone())?
        .with_sink(Arc::new(sink));
    let starting_balance = controller.initialize_portfolio()?;

    let mut passes = 0;
    while feed.advance() {
        controller.run_pass();
        passes += 1;
    }

    let events = log.events();
    let mut event_counts = BTreeMap::new();
    let mut closed = Vec::new();
    let mut opened = 0;
    for event in &events {
        *event_counts.entry(event.kind().to_string()).or_insert(0) += 1;
        match event {
            TradeEvent::PositionOpened { .. } => opened += 1,
            TradeEvent::PositionClosed {
                pair,
                exit_price,
                amount,
                pnl,
            } => closed.push(ClosedTrade {
                pair: pair.clone(),
                exit_price: *exit_price,
                amount: *amount,
                pnl: *pnl,
            }),
            _ => {}
        }
    }

    let final_balance = broker.fetch_balance()?;
    let open: Vec<OpenTrade> = controller
        .tracker()
        .book()
        .iter()
        .map(|p| OpenTrade {
            pair: p.pair.clone(),
            entry_price: p.entry_price,
            amount: p.amount,
            trailing_stop: p.trailing_stop(),
            last_price: feed.latest(&p.pair).map(|c| c.close),
        })
        .collect();
    let open_value: f64 = open
        .iter()
        .map(|t| t.amount * t.last_price.unwrap_or(t.entry_price))
        .sum();

    let report = ReplayReport {
        passes,
        opened,
        realized_pnl: closed.iter().map(|t| t.pnl).sum(),
        closed,
        open,
        starting_balance,
        final_balance,
        final_equity: final_balance + open_value,
        event_counts,
    };
    tracing::info!(
        passes = report.passes,
        opened = report.opened,
        closed = report.closed.len(),
        realized_pnl = report.realized_pnl,
        final_equity = report.final_equity,
        "replay complete"
    );
    Ok(report)
}
