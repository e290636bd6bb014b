//! Trailbot Runner — everything around the engine that touches the outside
//! world.
//!
//! This crate builds on `trailbot-core` to provide:
//! - TOML configuration and environment credentials
//! - The MEXC spot REST adapter (market data and signed orders)
//! - The pass loop with cooldown, cancellation and state persistence
//! - Startup sync of persisted positions
//! - JSONL trade journal
//! - CSV and synthetic candle sources with offline replay

pub mod circuit_breaker;
pub mod config;
pub mod csv_feed;
pub mod driver;
pub mod journal;
pub mod mexc;
pub mod replay;
pub mod state;
pub mod sync;
pub mod synthetic;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use config::{BotConfig, ConfigError, Credentials, ExchangeConfig, RuntimeConfig, TradingMode};
pub use csv_feed::{load_candles, LoadError};
pub use driver::{Driver, DriverError, RunSummary};
pub use journal::{JournalEntry, JsonlJournal};
pub use mexc::MexcClient;
pub use replay::{run_replay, ClosedTrade, OpenTrade, ReplayError, ReplayOptions, ReplayReport};
pub use state::{PersistedState, StateError, StateStore};
pub use sync::{paper_balance, restore_positions, seed_paper_holdings, SyncReport};
pub use synthetic::{synthetic_candles, timeframe_duration, SyntheticOptions};
