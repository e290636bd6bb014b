//! Startup sync: bring persisted positions back under management.
//!
//! Each persisted position is restored into the tracker with its stop and
//! state intact. The entry ATR is recomputed once from a fresh series when
//! requested, and always when the stored value is unusable. A failed
//! recomputation keeps the stored value; a position is never dropped because
//! market data was unavailable at startup.

use serde::Serialize;
use trailbot_core::engine::TradingController;
use trailbot_core::exchange::PaperBroker;
use trailbot_core::indicators::{Atr, Indicator};

use crate::state::PersistedState;

/// What happened to each persisted position.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub restored: Vec<String>,
    /// Pairs whose entry ATR was recomputed.
    pub rebased: Vec<String>,
    /// Pairs restored but not in the configured pair list; they are kept in
    /// the book and never evaluated.
    pub unmanaged: Vec<String>,
    /// Positions that could not be restored, with the reason.
    pub rejected: Vec<(String, String)>,
}

fn usable(atr: f64) -> bool {
    atr.is_finite() && atr > 0.0
}

/// Latest finite ATR over a fresh series for `pair`.
pub fn fresh_atr(controller: &TradingController, pair: &str) -> Result<f64, String> {
    let config = controller.config();
    let series = controller
        .market()
        .fetch_series(pair, &config.timeframe, config.history_limit)
        .map_err(|e| e.to_string())?;
    let atr = Atr::new(config.atr_period).compute(&series);
    atr.last()
        .copied()
        .filter(|v| usable(*v))
        .ok_or_else(|| {
            format!(
                "no valid ATR from {} candles (period {})",
                series.len(),
                config.atr_period
            )
        })
}

/// Free quote balance of a paper account that started with
/// `starting_balance` and went through the trades behind `state`: the start
/// plus realized P&L, less the cost of every position still held. Fees are
/// not tracked across restarts.
pub fn paper_balance(state: &PersistedState, starting_balance: f64) -> f64 {
    let committed: f64 = state
        .positions
        .iter()
        .map(|p| p.entry_value())
        .filter(|v| v.is_finite())
        .sum();
    (starting_balance + state.portfolio.realized_pnl - committed).max(0.0)
}

/// Hand a fresh paper broker the base asset behind every persisted position,
/// so restored positions can be sold.
pub fn seed_paper_holdings(broker: PaperBroker, state: &PersistedState) -> PaperBroker {
    state
        .positions
        .iter()
        .fold(broker, |broker, p| broker.with_holding(p.pair.clone(), p.amount))
}

/// Restore `state` into the controller.
pub fn restore_positions(
    controller: &mut TradingController,
    state: &PersistedState,
    resync_atr: bool,
) -> SyncReport {
    let mut report = SyncReport::default();
    controller.restore_portfolio(&state.portfolio);

    for position in state.positions.iter() {
        let pair = &position.pair;
        if let Err(e) = controller.tracker_mut().restore(position.clone()) {
            tracing::error!(pair = %pair, error = %e, "persisted position rejected");
            report.rejected.push((pair.clone(), e.to_string()));
            continue;
        }
        report.restored.push(pair.clone());

        if !controller.config().pairs.iter().any(|p| p == pair) {
            tracing::warn!(pair = %pair, "restored position is not in the configured pairs");
            report.unmanaged.push(pair.clone());
        }

        let needs_atr = resync_atr || !usable(position.atr_at_entry);
        if !needs_atr {
            continue;
        }
        match fresh_atr(controller, pair) {
            Ok(atr) => match controller.tracker_mut().rebase_atr(pair, atr) {
                Ok(()) => report.rebased.push(pair.clone()),
                Err(e) => tracing::warn!(pair = %pair, error = %e, "ATR rebase rejected"),
            },
            Err(reason) => {
                tracing::warn!(
                    pair = %pair,
                    stored = position.atr_at_entry,
                    reason = %reason,
                    "ATR recomputation failed, keeping stored value"
                );
            }
        }
    }

    tracing::info!(
        restored = report.restored.len(),
        rebased = report.rebased.len(),
        rejected = report.rejected.len(),
        "startup sync complete"
    );
    report
}
