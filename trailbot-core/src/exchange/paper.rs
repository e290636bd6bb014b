//! Paper broker — simulated market fills at the latest close.
//!
//! Nothing leaves the process. Orders fill immediately and in full at the
//! most recent close reported by the market data source, with an optional
//! proportional fee charged in the quote currency.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{Broker, ExchangeError, MarketData};
use crate::domain::{Confirmation, OrderRequest, OrderSide};

#[derive(Debug, Default)]
struct PaperAccount {
    quote: f64,
    holdings: HashMap<String, f64>,
    next_id: u64,
}

pub struct PaperBroker {
    market: Arc<dyn MarketData>,
    timeframe: String,
    fee_rate: f64,
    account: Mutex<PaperAccount>,
}

impl PaperBroker {
    pub fn new(market: Arc<dyn MarketData>, timeframe: impl Into<String>, balance: f64) -> Self {
        Self {
            market,
            timeframe: timeframe.into(),
            fee_rate: 0.0,
            account: Mutex::new(PaperAccount {
                quote: balance,
                ..PaperAccount::default()
            }),
        }
    }

    /// Charge `fee_rate` of each fill's quote value.
    pub fn with_fee_rate(mut self, fee_rate: f64) -> Self {
        self.fee_rate = fee_rate.max(0.0);
        self
    }

    /// Start with `quantity` of the base asset of `pair` already held.
    pub fn with_holding(self, pair: impl Into<String>, quantity: f64) -> Self {
        if quantity.is_finite() && quantity > 0.0 {
            if let Ok(mut account) = self.account.lock() {
                *account.holdings.entry(pair.into()).or_insert(0.0) += quantity;
            }
        }
        self
    }

    /// Base-asset quantity held for `pair`.
    pub fn holding(&self, pair: &str) -> f64 {
        self.account
            .lock()
            .map(|a| a.holdings.get(pair).copied().unwrap_or(0.0))
            .unwrap_or(0.0)
    }

    fn last_price(&self, pair: &str) -> Result<f64, ExchangeError> {
        let series = self.market.fetch_series(pair, &self.timeframe, 1)?;
        let close = series
            .last()
            .map(|c| c.close)
            .ok_or_else(|| ExchangeError::Rejected(format!("no price available for {pair}")))?;
        if close.is_finite() && close > 0.0 {
            Ok(close)
        } else {
            Err(ExchangeError::Rejected(format!("unusable price {close} for {pair}")))
        }
    }
}

impl Broker for PaperBroker {
    fn name(&self) -> &str {
        "paper"
    }

    fn fetch_balance(&self) -> Result<f64, ExchangeError> {
        self.account
            .lock()
            .map(|a| a.quote)
            .map_err(|_| ExchangeError::Rejected("paper account poisoned".into()))
    }

    fn submit_order(&self, order: &OrderRequest) -> Result<Confirmation, ExchangeError> {
        if !(order.quantity.is_finite() && order.quantity > 0.0) {
            return Err(ExchangeError::Rejected(format!(
                "invalid quantity {}",
                order.quantity
            )));
        }
        let price = self.last_price(&order.pair)?;
        let value = order.quantity * price;
        let fee = value * self.fee_rate;

        let mut account = self
            .account
            .lock()
            .map_err(|_| ExchangeError::Rejected("paper account poisoned".into()))?;
        match order.side {
            OrderSide::Buy => {
                let required = value + fee;
                if required > account.quote * (1.0 + 1e-9) {
                    return Err(ExchangeError::InsufficientFunds {
                        required,
                        available: account.quote,
                    });
                }
                account.quote = (account.quote - required).max(0.0);
                *account.holdings.entry(order.pair.clone()).or_insert(0.0) += order.quantity;
            }
            OrderSide::Sell => {
                let held = account.holdings.get(&order.pair).copied().unwrap_or(0.0);
                if order.quantity > held * (1.0 + 1e-9) {
                    return Err(ExchangeError::InsufficientFunds {
                        required: order.quantity,
                        available: held,
                    });
                }
                let remaining = held - order.quantity;
                if remaining <= held * 1e-9 {
                    account.holdings.remove(&order.pair);
                } else {
                    account.holdings.insert(order.pair.clone(), remaining);
                }
                account.quote += value - fee;
            }
        }
        account.next_id += 1;
        let order_id = format!("paper-{}", account.next_id);
        tracing::debug!(
            pair = %order.pair,
            side = %order.side,
            quantity = order.quantity,
            price,
            %order_id,
            "paper fill"
        );
        Ok(Confirmation::filled(order_id, order.quantity, price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Candle;
    use crate::exchange::ReplayFeed;
    use chrono::{TimeZone, Utc};

    fn feed(close: f64) -> Arc<ReplayFeed> {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let feed = ReplayFeed::new().with_series(
            "SOL/USDT",
            vec![Candle::new(t, close, close, close, close, 1.0)],
        );
        feed.set_cursor(1);
        Arc::new(feed)
    }

    #[test]
    fn buy_then_sell_round_trip() {
        let broker = PaperBroker::new(feed(100.0), "1m", 1000.0);
        let conf = broker.submit_order(&OrderRequest::buy("SOL/USDT", 2.0)).unwrap();
        assert_eq!(conf.average_price, Some(100.0));
        assert_eq!(conf.order_id, "paper-1");
        assert_eq!(broker.fetch_balance().unwrap(), 800.0);
        assert_eq!(broker.holding("SOL/USDT"), 2.0);

        broker.submit_order(&OrderRequest::sell("SOL/USDT", 2.0)).unwrap();
        assert_eq!(broker.fetch_balance().unwrap(), 1000.0);
        assert_eq!(broker.holding("SOL/USDT"), 0.0);
    }

    #[test]
    fn buy_beyond_balance_is_rejected() {
        let broker = PaperBroker::new(feed(100.0), "1m", 50.0);
        let err = broker
            .submit_order(&OrderRequest::buy("SOL/USDT", 1.0))
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientFunds { .. }));
        assert_eq!(broker.fetch_balance().unwrap(), 50.0);
    }

    #[test]
    fn sell_without_holding_is_rejected() {
        let broker = PaperBroker::new(feed(100.0), "1m", 50.0);
        assert!(broker
            .submit_order(&OrderRequest::sell("SOL/USDT", 1.0))
            .is_err());
    }

    #[test]
    fn seeded_holding_can_be_sold() {
        let broker = PaperBroker::new(feed(100.0), "1m", 0.0)
            .with_holding("SOL/USDT", 1.5)
            .with_holding("ADA/USDT", f64::NAN);
        assert_eq!(broker.holding("SOL/USDT"), 1.5);
        assert_eq!(broker.holding("ADA/USDT"), 0.0);

        broker.submit_order(&OrderRequest::sell("SOL/USDT", 1.5)).unwrap();
        assert_eq!(broker.fetch_balance().unwrap(), 150.0);
        assert_eq!(broker.holding("SOL/USDT"), 0.0);
    }

    #[test]
    fn fee_is_charged_on_both_legs() {
        let broker = PaperBroker::new(feed(100.0), "1m", 1000.0).with_fee_rate(0.001);
        broker.submit_order(&OrderRequest::buy("SOL/USDT", 1.0)).unwrap();
        broker.submit_order(&OrderRequest::sell("SOL/USDT", 1.0)).unwrap();
        let balance = broker.fetch_balance().unwrap();
        assert!((balance - 999.8).abs() < 1e-9);
    }
}
