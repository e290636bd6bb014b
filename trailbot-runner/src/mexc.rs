//! MEXC spot v3 REST client.
//!
//! Implements both collaborator traits:
//! - [`MarketData`] through the public klines endpoint
//! - [`Broker`] through the signed account and order endpoints
//!
//! Handles retries with exponential backoff, HMAC-SHA256 request signing and
//! the circuit breaker. Order submissions are retried only when the request
//! provably never reached the exchange, so a timeout cannot double-buy.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use trailbot_core::domain::{split_pair, Candle, Confirmation, OrderRequest};
use trailbot_core::exchange::{Broker, ExchangeError, MarketData};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{Credentials, ExchangeConfig};

const API_KEY_HEADER: &str = "X-MEXC-APIKEY";

/// Longest sleep between retries.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponential backoff before retry `attempt` (1-based), capped at `MAX_BACKOFF`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.checked_mul(factor)
        .map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: serde_json::Value,
    #[serde(default)]
    orig_qty: Option<String>,
    #[serde(default)]
    executed_qty: Option<String>,
    #[serde(default)]
    cummulative_quote_qty: Option<String>,
    #[serde(default)]
    price: Option<String>,
}

/// Exchange symbol for a `BASE/QUOTE` pair: `"SOL/USDT"` → `"SOLUSDT"`.
pub fn exchange_symbol(pair: &str) -> Result<String, ExchangeError> {
    let (base, quote) = split_pair(pair).ok_or_else(|| ExchangeError::UnknownPair {
        pair: pair.to_string(),
    })?;
    Ok(format!("{}{}", base.to_uppercase(), quote.to_uppercase()))
}

/// Map a ccxt-style timeframe onto a MEXC kline interval.
pub fn kline_interval(timeframe: &str) -> Result<&'static str, ExchangeError> {
    Ok(match timeframe {
        "1m" => "1m",
        "5m" => "5m",
        "15m" => "15m",
        "30m" => "30m",
        "1h" | "60m" => "60m",
        "4h" => "4h",
        "1d" => "1d",
        "1w" | "1W" => "1W",
        "1M" => "1M",
        other => {
            return Err(ExchangeError::Rejected(format!(
                "unsupported timeframe '{other}'"
            )))
        }
    })
}

/// Hex HMAC-SHA256 of `query` keyed by `secret`.
pub fn sign(secret: &str, query: &str) -> Result<String, ExchangeError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::MissingCredentials(e.to_string()))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Quantity with at most 8 decimals and no trailing zeros.
pub fn format_quantity(quantity: f64) -> String {
    let s = format!("{quantity:.8}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() {
        "0".into()
    } else {
        s.to_string()
    }
}

fn number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn decimal(value: Option<&String>) -> Option<f64> {
    value.and_then(|s| s.parse::<f64>().ok())
}

/// Parse the klines array: `[openTime, open, high, low, close, volume, ...]`.
pub fn parse_klines(body: &str) -> Result<Vec<Candle>, ExchangeError> {
    let rows: Vec<Vec<serde_json::Value>> =
        serde_json::from_str(body).map_err(|e| ExchangeError::Decode(format!("klines: {e}")))?;

    let mut candles = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if row.len() < 6 {
            return Err(ExchangeError::Decode(format!(
                "kline {i} has {} fields, expected at least 6",
                row.len()
            )));
        }
        let open_time = row[0]
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| ExchangeError::Decode(format!("kline {i}: invalid open time")))?;
        let field = |idx: usize, name: &str| {
            number(&row[idx])
                .ok_or_else(|| ExchangeError::Decode(format!("kline {i}: invalid {name}")))
        };
        candles.push(Candle::new(
            open_time,
            field(1, "open")?,
            field(2, "high")?,
            field(3, "low")?,
            field(4, "close")?,
            field(5, "volume")?,
        ));
    }
    Ok(candles)
}

/// Free balance of `asset` from an account response.
pub fn parse_free_balance(body: &str, asset: &str) -> Result<f64, ExchangeError> {
    let account: AccountResponse =
        serde_json::from_str(body).map_err(|e| ExchangeError::Decode(format!("account: {e}")))?;
    match account
        .balances
        .iter()
        .find(|b| b.asset.eq_ignore_ascii_case(asset))
    {
        Some(b) => b
            .free
            .parse()
            .map_err(|_| ExchangeError::Decode(format!("invalid free balance '{}'", b.free))),
        // An asset never held is simply absent.
        None => Ok(0.0),
    }
}

/// Confirmation from an order response. MEXC reports the average price only
/// through `cummulativeQuoteQty / executedQty`, and often not at all for
/// market orders on acceptance.
pub fn parse_order(body: &str) -> Result<Confirmation, ExchangeError> {
    let order: OrderResponse =
        serde_json::from_str(body).map_err(|e| ExchangeError::Decode(format!("order: {e}")))?;
    let order_id = match &order.order_id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let executed = decimal(order.executed_qty.as_ref()).filter(|q| *q > 0.0);
    let quote = decimal(order.cummulative_quote_qty.as_ref()).filter(|q| *q > 0.0);
    let average_price = match (executed, quote) {
        (Some(q), Some(v)) => Some(v / q),
        _ => decimal(order.price.as_ref()).filter(|p| *p > 0.0),
    };
    let filled_quantity = executed.or_else(|| decimal(order.orig_qty.as_ref()));

    Ok(Confirmation {
        order_id,
        filled_quantity,
        average_price,
    })
}

/// Turn a non-2xx body into the most specific error available.
fn api_error(status: u16, body: String) -> ExchangeError {
    match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(err) => ExchangeError::Api {
            code: err.code,
            message: err.msg,
        },
        Err(_) => ExchangeError::Http { status, body },
    }
}

/// Blocking MEXC spot client.
pub struct MexcClient {
    http: reqwest::blocking::Client,
    base_url: String,
    credentials: Option<Credentials>,
    quote_asset: String,
    recv_window_ms: u64,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl MexcClient {
    /// `credentials` may be `None` for market data only (paper trading).
    pub fn new(
        config: &ExchangeConfig,
        credentials: Option<Credentials>,
        quote_asset: impl Into<String>,
    ) -> Result<Self, ExchangeError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("trailbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExchangeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            quote_asset: quote_asset.into(),
            recv_window_ms: config.recv_window_ms,
            circuit_breaker: Arc::new(CircuitBreaker::new(
                Duration::from_secs(config.breaker_cooldown_secs),
                config.breaker_threshold,
            )),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.backoff_ms),
        })
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    fn credentials(&self) -> Result<&Credentials, ExchangeError> {
        self.credentials.as_ref().ok_or_else(|| {
            ExchangeError::MissingCredentials("API_KEY and SECRET_KEY are required".into())
        })
    }

    /// Append `timestamp`, `recvWindow` and `signature` to a query string.
    fn signed_query(&self, params: &[(&str, String)]) -> Result<String, ExchangeError> {
        let creds = self.credentials()?;
        let mut query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        query.push(format!("recvWindow={}", self.recv_window_ms));
        query.push(format!("timestamp={}", Utc::now().timestamp_millis()));
        let query = query.join("&");
        let signature = sign(&creds.secret_key, &query)?;
        Ok(format!("{query}&signature={signature}"))
    }

    /// Execute a request with retry and circuit breaker logic.
    ///
    /// `idempotent` requests are retried on any transient failure; others only
    /// when the connection was never established or the exchange rate-limited.
    fn execute(
        &self,
        build: impl Fn() -> reqwest::blocking::RequestBuilder,
        idempotent: bool,
    ) -> Result<String, ExchangeError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(ExchangeError::CircuitOpen);
        }

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(backoff_delay(self.base_delay, attempt));
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(ExchangeError::CircuitOpen);
            }

            let resp = match build().send() {
                Ok(resp) => resp,
                Err(e) => {
                    self.circuit_breaker.record_failure();
                    let err = ExchangeError::Network(e.to_string());
                    if e.is_connect() || (idempotent && e.is_timeout()) {
                        tracing::debug!(attempt, error = %err, "request failed, retrying");
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = resp.status();
            if status == reqwest::StatusCode::FORBIDDEN {
                // IP ban: trip immediately
                self.circuit_breaker.trip();
                return Err(ExchangeError::CircuitOpen);
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1);
                last_error = Some(ExchangeError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }

            let body = resp
                .text()
                .map_err(|e| ExchangeError::Decode(format!("unreadable body: {e}")))?;
            if status.is_server_error() {
                self.circuit_breaker.record_failure();
                let err = api_error(status.as_u16(), body);
                if idempotent {
                    last_error = Some(err);
                    continue;
                }
                return Err(err);
            }
            if !status.is_success() {
                return Err(api_error(status.as_u16(), body));
            }

            self.circuit_breaker.record_success();
            return Ok(body);
        }

        Err(last_error.unwrap_or_else(|| ExchangeError::Network("max retries exceeded".into())))
    }
}

impl MarketData for MexcClient {
    fn name(&self) -> &str {
        "mexc"
    }

    fn fetch_series(
        &self,
        pair: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let symbol = exchange_symbol(pair)?;
        let interval = kline_interval(timeframe)?;
        let url = format!(
            "{}/api/v3/klines?symbol={symbol}&interval={interval}&limit={limit}",
            self.base_url
        );
        let body = self.execute(|| self.http.get(&url), true)?;
        let mut candles = parse_klines(&body)?;
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }
}

impl Broker for MexcClient {
    fn name(&self) -> &str {
        "mexc"
    }

    fn fetch_balance(&self) -> Result<f64, ExchangeError> {
        let query = self.signed_query(&[])?;
        let api_key = self.credentials()?.api_key.clone();
        let url = format!("{}/api/v3/account?{query}", self.base_url);
        let body = self.execute(|| self.http.get(&url).header(API_KEY_HEADER, &api_key), true)?;
        parse_free_balance(&body, &self.quote_asset)
    }

    fn submit_order(&self, order: &OrderRequest) -> Result<Confirmation, ExchangeError> {
        let quantity = format_quantity(order.quantity);
        if quantity == "0" {
            return Err(ExchangeError::Rejected(format!(
                "quantity {} rounds to zero",
                order.quantity
            )));
        }
        let query = self.signed_query(&[
            ("symbol", exchange_symbol(&order.pair)?),
            ("side", order.side.as_wire().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity),
        ])?;
        let api_key = self.credentials()?.api_key.clone();
        let url = format!("{}/api/v3/order?{query}", self.base_url);

        let body = self.execute(
            || {
                self.http
                    .post(&url)
                    .header(API_KEY_HEADER, &api_key)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
            },
            false,
        )?;
        let confirmation = parse_order(&body)?;
        tracing::info!(
            pair = %order.pair,
            side = %order.side,
            quantity = order.quantity,
            order_id = %confirmation.order_id,
            "order accepted"
        );
        Ok(confirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), base);
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 33), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, u32::MAX), MAX_BACKOFF);
    }

    #[test]
    fn symbol_drops_separator() {
        assert_eq!(exchange_symbol("SOL/USDT").unwrap(), "SOLUSDT");
        assert_eq!(exchange_symbol("babydoge/usdt").unwrap(), "BABYDOGEUSDT");
        assert!(matches!(
            exchange_symbol("SOLUSDT"),
            Err(ExchangeError::UnknownPair { .. })
        ));
    }

    #[test]
    fn interval_mapping() {
        assert_eq!(kline_interval("1m").unwrap(), "1m");
        assert_eq!(kline_interval("1h").unwrap(), "60m");
        assert_eq!(kline_interval("1w").unwrap(), "1W");
        assert!(kline_interval("3m").is_err());
    }

    #[test]
    fn hmac_sha256_known_vector() {
        let sig = sign("key", "The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(
            sig,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn quantity_formatting() {
        assert_eq!(format_quantity(0.6), "0.6");
        assert_eq!(format_quantity(10_000.0), "10000");
        assert_eq!(format_quantity(0.123456789), "0.12345679");
        assert_eq!(format_quantity(0.000000001), "0");
    }

    #[test]
    fn parses_klines_with_string_prices() {
        let body = r#"[
            [1704153600000, "100.5", "101.0", "99.5", "100.8", "1234.5", 1704153659999, "124000.1"],
            [1704153660000, "100.8", "102.0", "100.1", "101.9", "99.0", 1704153719999, "10000.0"]
        ]"#;
        let candles = parse_klines(body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, 100.5);
        assert_eq!(candles[1].close, 101.9);
        assert_eq!(candles[1].timestamp.timestamp_millis(), 1_704_153_660_000);
    }

    #[test]
    fn rejects_malformed_klines() {
        assert!(matches!(
            parse_klines(r#"[[1704153600000, "1"]]"#),
            Err(ExchangeError::Decode(_))
        ));
        assert!(matches!(
            parse_klines(r#"[[1704153600000, "x", "1", "1", "1", "1"]]"#),
            Err(ExchangeError::Decode(_))
        ));
        assert!(parse_klines("{}").is_err());
    }

    #[test]
    fn free_balance_lookup() {
        let body = r#"{"canTrade":true,"balances":[
            {"asset":"USDT","free":"42.5","locked":"1"},
            {"asset":"SOL","free":"0.3","locked":"0"}
        ]}"#;
        assert_eq!(parse_free_balance(body, "USDT").unwrap(), 42.5);
        assert_eq!(parse_free_balance(body, "DOGE").unwrap(), 0.0);
    }

    #[test]
    fn order_confirmation_derives_average_price() {
        let body = r#"{"symbol":"SOLUSDT","orderId":"C02__123","price":"0",
            "origQty":"0.5","executedQty":"0.5","cummulativeQuoteQty":"50.5",
            "type":"MARKET","side":"BUY"}"#;
        let conf = parse_order(body).unwrap();
        assert_eq!(conf.order_id, "C02__123");
        assert_eq!(conf.filled_quantity, Some(0.5));
        assert_eq!(conf.average_price, Some(101.0));
    }

    #[test]
    fn order_confirmation_without_fill_detail() {
        let body = r#"{"symbol":"SOLUSDT","orderId":987,"price":"0","origQty":"0.5",
            "type":"MARKET","side":"SELL"}"#;
        let conf = parse_order(body).unwrap();
        assert_eq!(conf.order_id, "987");
        assert_eq!(conf.filled_quantity, Some(0.5));
        assert_eq!(conf.average_price, None);
    }

    #[test]
    fn error_body_becomes_api_error() {
        let err = api_error(400, r#"{"code":30004,"msg":"Insufficient position"}"#.into());
        assert_eq!(
            err,
            ExchangeError::Api {
                code: 30004,
                message: "Insufficient position".into()
            }
        );
        assert!(matches!(api_error(502, "bad gateway".into()), ExchangeError::Http { status: 502, .. }));
    }

    #[test]
    fn signed_calls_need_credentials() {
        let client = MexcClient::new(&ExchangeConfig::default(), None, "USDT").unwrap();
        assert!(matches!(
            client.fetch_balance(),
            Err(ExchangeError::MissingCredentials(_))
        ));
    }
}
