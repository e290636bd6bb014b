//! Order intents handed to the execution collaborator, and its confirmations.
//!
//! Only immediate market-style fills exist. There are no limit or stop order
//! types: exits are decided by the position tracker and sent as market sells.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Upper-case wire name used by exchange REST APIs.
    pub fn as_wire(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// A market order intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub pair: String,
    pub side: OrderSide,
    pub quantity: f64,
}

impl OrderRequest {
    pub fn buy(pair: impl Into<String>, quantity: f64) -> Self {
        Self {
            pair: pair.into(),
            side: OrderSide::Buy,
            quantity,
        }
    }

    pub fn sell(pair: impl Into<String>, quantity: f64) -> Self {
        Self {
            pair: pair.into(),
            side: OrderSide::Sell,
            quantity,
        }
    }
}

/// Confirmation returned by the execution collaborator for an accepted order.
///
/// Exchanges differ in how much fill detail they report on acceptance, so
/// quantity and price are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub order_id: String,
    pub filled_quantity: Option<f64>,
    pub average_price: Option<f64>,
}

impl Confirmation {
    pub fn accepted(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            filled_quantity: None,
            average_price: None,
        }
    }

    pub fn filled(order_id: impl Into<String>, quantity: f64, price: f64) -> Self {
        Self {
            order_id: order_id.into(),
            filled_quantity: Some(quantity),
            average_price: Some(price),
        }
    }

    /// Reported fill price if it is usable, else `fallback`.
    pub fn price_or(&self, fallback: f64) -> f64 {
        match self.average_price {
            Some(p) if p.is_finite() && p > 0.0 => p,
            _ => fallback,
        }
    }

    /// Reported filled quantity if it is usable, else `fallback`.
    pub fn quantity_or(&self, fallback: f64) -> f64 {
        match self.filled_quantity {
            Some(q) if q.is_finite() && q > 0.0 => q,
            _ => fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_falls_back_when_fill_detail_missing() {
        let c = Confirmation::accepted("42");
        assert_eq!(c.price_or(1.5), 1.5);
        assert_eq!(c.quantity_or(10.0), 10.0);
    }

    #[test]
    fn confirmation_ignores_zero_fill_detail() {
        let c = Confirmation {
            order_id: "1".into(),
            filled_quantity: Some(0.0),
            average_price: Some(0.0),
        };
        assert_eq!(c.price_or(2.0), 2.0);
        assert_eq!(c.quantity_or(3.0), 3.0);
    }

    #[test]
    fn confirmation_prefers_reported_fill() {
        let c = Confirmation::filled("7", 9.5, 1.25);
        assert_eq!(c.price_or(2.0), 1.25);
        assert_eq!(c.quantity_or(10.0), 9.5);
    }

    #[test]
    fn side_wire_names() {
        assert_eq!(OrderSide::Buy.as_wire(), "BUY");
        assert_eq!(OrderSide::Sell.as_wire(), "SELL");
        assert_eq!(OrderSide::Sell.to_string(), "sell");
    }
}
