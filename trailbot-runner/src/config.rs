//! Bot configuration loaded from TOML.
//!
//! ```toml
//! [engine]
//! pairs = ["SOL/USDT", "DOGE/USDT"]
//! timeframe = "1m"
//! atr_multiplier = 2.0
//!
//! [exchange]
//! base_url = "https://api.mexc.com"
//!
//! [runtime]
//! mode = "paper"
//! state_path = "trailbot_state.json"
//! ```
//!
//! Every section and field is optional; omitted values take the defaults of
//! the stock bot settings. Credentials are never read from the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trailbot_core::domain::split_pair;
use trailbot_core::engine::{ConfigError as EngineConfigError, EngineConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("engine config: {0}")]
    Engine(#[from] EngineConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(&'static str),
}

/// Upper bound on `exchange.max_retries`.
pub const MAX_RETRIES: u32 = 10;

/// Live orders against the exchange, or simulated fills against live prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    #[default]
    Paper,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExchangeConfig {
    pub base_url: String,
    /// Signed request validity window.
    pub recv_window_ms: u64,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// First retry delay; doubles on every attempt.
    pub backoff_ms: u64,
    /// Consecutive failures before the circuit breaker trips.
    pub breaker_threshold: u32,
    pub breaker_cooldown_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mexc.com".into(),
            recv_window_ms: 5_000,
            timeout_secs: 10,
            max_retries: 3,
            backoff_ms: 500,
            breaker_threshold: 5,
            breaker_cooldown_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub mode: TradingMode,
    /// Starting quote balance for paper trading.
    pub paper_balance: f64,
    /// Proportional fee charged by the paper broker.
    pub paper_fee_rate: f64,
    /// Open positions are persisted here between runs.
    pub state_path: PathBuf,
    /// Append-only JSONL trade journal.
    pub journal_path: PathBuf,
    /// Recompute each restored position's entry ATR once at startup.
    pub resync_atr_on_start: bool,
    /// Stop after this many passes (unbounded when absent).
    pub max_passes: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::Paper,
            paper_balance: 1_000.0,
            paper_fee_rate: 0.0,
            state_path: PathBuf::from("trailbot_state.json"),
            journal_path: PathBuf::from("trade_log.jsonl"),
            resync_atr_on_start: true,
            max_passes: None,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BotConfig {
    pub engine: EngineConfig,
    pub exchange: ExchangeConfig,
    pub runtime: RuntimeConfig,
}

impl BotConfig {
    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BotConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;

        let url = self.exchange.base_url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "exchange.base_url must be an http(s) URL, got '{url}'"
            )));
        }
        if self.exchange.timeout_secs == 0 {
            return Err(ConfigError::Invalid("exchange.timeout_secs must be >= 1".into()));
        }
        if self.exchange.max_retries > MAX_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "exchange.max_retries must be <= {MAX_RETRIES}, got {}",
                self.exchange.max_retries
            )));
        }
        if self.exchange.breaker_threshold == 0 {
            return Err(ConfigError::Invalid(
                "exchange.breaker_threshold must be >= 1".into(),
            ));
        }
        if self.runtime.mode == TradingMode::Paper
            && !(self.runtime.paper_balance.is_finite() && self.runtime.paper_balance >= 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "runtime.paper_balance must be >= 0, got {}",
                self.runtime.paper_balance
            )));
        }
        if !(0.0..1.0).contains(&self.runtime.paper_fee_rate) {
            return Err(ConfigError::Invalid(format!(
                "runtime.paper_fee_rate must be in [0, 1), got {}",
                self.runtime.paper_fee_rate
            )));
        }
        if self.runtime.max_passes == Some(0) {
            return Err(ConfigError::Invalid("runtime.max_passes must be >= 1".into()));
        }
        let quotes: std::collections::BTreeSet<&str> = self
            .engine
            .pairs
            .iter()
            .filter_map(|p| split_pair(p).map(|(_, quote)| quote))
            .collect();
        if quotes.len() > 1 {
            return Err(ConfigError::Invalid(format!(
                "all pairs must share one quote currency, found {quotes:?}"
            )));
        }
        Ok(())
    }

    /// Quote currency shared by every configured pair (the balance asset).
    pub fn quote_asset(&self) -> Option<&str> {
        self.engine
            .pairs
            .first()
            .and_then(|p| split_pair(p))
            .map(|(_, quote)| quote)
    }
}

/// Exchange API credentials.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub const API_KEY_VAR: &'static str = "API_KEY";
    pub const SECRET_KEY_VAR: &'static str = "SECRET_KEY";

    /// Read `API_KEY` and `SECRET_KEY` from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve both keys through `lookup`. Empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingCredential(name))
        };
        Ok(Self {
            api_key: get(Self::API_KEY_VAR)?,
            secret_key: get(Self::SECRET_KEY_VAR)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trailbot_core::engine::ClosePolicy;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = BotConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, BotConfig::default());
        assert_eq!(cfg.engine.pairs.len(), 11);
        assert_eq!(cfg.runtime.mode, TradingMode::Paper);
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = BotConfig::from_toml_str(
            r#"
            [engine]
            pairs = ["SOL/USDT"]
            atr_multiplier = 3.0
            close_policy = "optimistic"

            [runtime]
            mode = "live"
            max_passes = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.engine.pairs, vec!["SOL/USDT"]);
        assert_eq!(cfg.engine.atr_multiplier, 3.0);
        assert_eq!(cfg.engine.close_policy, ClosePolicy::Optimistic);
        assert_eq!(cfg.engine.timeframe, "1m");
        assert_eq!(cfg.runtime.mode, TradingMode::Live);
        assert_eq!(cfg.runtime.max_passes, Some(5));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = BotConfig::from_toml_str("[engine]\npairz = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn engine_validation_surfaces() {
        let err = BotConfig::from_toml_str("[engine]\ntrade_fraction = 2.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Engine(_)));
    }

    #[test]
    fn bad_url_is_rejected() {
        let err = BotConfig::from_toml_str("[exchange]\nbase_url = \"ftp://x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn retry_count_is_bounded() {
        let err = BotConfig::from_toml_str("[exchange]\nmax_retries = 40\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let cfg = BotConfig::from_toml_str(&format!("[exchange]\nmax_retries = {MAX_RETRIES}\n"))
            .unwrap();
        assert_eq!(cfg.exchange.max_retries, MAX_RETRIES);
    }

    #[test]
    fn mixed_quote_currencies_are_rejected() {
        let err = BotConfig::from_toml_str("[engine]\npairs = [\"SOL/USDT\", \"ETH/BTC\"]\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert_eq!(BotConfig::default().quote_asset(), Some("USDT"));
    }

    #[test]
    fn toml_round_trip() {
        let cfg = BotConfig::default();
        let text = cfg.to_toml_string().unwrap();
        assert_eq!(BotConfig::from_toml_str(&text).unwrap(), cfg);
    }

    #[test]
    fn credentials_require_both_keys() {
        let creds = Credentials::from_lookup(|name| match name {
            "API_KEY" => Some("key".into()),
            "SECRET_KEY" => Some("secret".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(creds.api_key, "key");
        assert!(!format!("{creds:?}").contains("secret"));

        let err = Credentials::from_lookup(|name| {
            (name == "API_KEY").then(|| "key".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("SECRET_KEY")));

        let err = Credentials::from_lookup(|_| Some("  ".into())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("API_KEY")));
    }
}
