//! Trading engine — configuration, event model and the per-pass controller.
//!
//! The controller consumes candle series from a [`MarketData`](crate::exchange::MarketData)
//! source and runs the three-phase pass:
//!
//! 1. Fetch: one series per configured pair
//! 2. Snapshot: indicators for pairs without a position, in parallel
//! 3. Decide: manage open positions, or size and submit entries

pub mod config;
pub mod controller;
pub mod events;

pub use config::{ClosePolicy, ConfigError, EngineConfig};
pub use controller::{ControllerError, PairOutcome, PairReport, PassReport, TradingController};
pub use events::{EventLog, EventSink, FanoutSink, NullSink, SkipReason, TracingSink, TradeEvent};
