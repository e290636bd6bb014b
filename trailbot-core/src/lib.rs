//! Trailbot Core — indicators, entry signal, sizing, trailing-stop position
//! tracking and the trading controller.
//!
//! This crate contains the decision engine of the bot:
//! - Domain types (candles, positions, orders, portfolio snapshot)
//! - MACD and ATR indicators with NaN warmup
//! - Momentum entry signal and notional position sizer
//! - Position tracker with the trailing-stop ratchet invariant
//! - Exchange collaborator traits with replay and paper implementations
//! - Trading controller running one isolated pass per pair

pub mod domain;
pub mod engine;
pub mod exchange;
pub mod indicators;
pub mod position_management;
pub mod signals;
pub mod sizers;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the driver shares across threads is
    /// Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::PortfolioSnapshot>();
        require_sync::<domain::PortfolioSnapshot>();
        require_send::<domain::OrderRequest>();
        require_sync::<domain::OrderRequest>();
        require_send::<domain::Confirmation>();
        require_sync::<domain::Confirmation>();

        // Indicators
        require_send::<indicators::IndicatorEngine>();
        require_sync::<indicators::IndicatorEngine>();
        require_send::<indicators::IndicatorSnapshot>();
        require_sync::<indicators::IndicatorSnapshot>();

        // Position management
        require_send::<position_management::PositionBook>();
        require_sync::<position_management::PositionBook>();
        require_send::<position_management::PositionTracker>();
        require_sync::<position_management::PositionTracker>();

        // Collaborators
        require_send::<exchange::ReplayFeed>();
        require_sync::<exchange::ReplayFeed>();
        require_send::<exchange::PaperBroker>();
        require_sync::<exchange::PaperBroker>();

        // Engine
        require_send::<engine::EngineConfig>();
        require_sync::<engine::EngineConfig>();
        require_send::<engine::EventLog>();
        require_sync::<engine::EventLog>();
        require_send::<engine::TradingController>();
        require_send::<engine::PassReport>();
        require_sync::<engine::PassReport>();
    }

    /// Architecture contract: SignalEvaluator does NOT see the position book.
    ///
    /// `evaluate()` takes only the indicator snapshot. If a portfolio or book
    /// parameter is ever added, this stops compiling.
    #[test]
    fn signal_evaluator_has_no_portfolio_parameter() {
        fn _check_trait_object_builds(
            sig: &dyn signals::SignalEvaluator,
            snapshot: &indicators::IndicatorSnapshot,
        ) -> signals::Signal {
            sig.evaluate(snapshot)
        }
    }

    /// Architecture contract: the tracker never reaches the exchange.
    ///
    /// `evaluate()` returns an Action; submitting the sell is the caller's job.
    #[test]
    fn tracker_returns_actions_not_orders() {
        fn _check(
            t: &mut position_management::PositionTracker,
        ) -> position_management::Action {
            t.evaluate("SOL/USDT", 1.0)
        }
    }
}
