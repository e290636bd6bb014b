//! Domain types for the trading engine.

pub mod candle;
pub mod order;
pub mod portfolio;
pub mod position;

pub use candle::Candle;
pub use order::{Confirmation, OrderRequest, OrderSide};
pub use portfolio::PortfolioSnapshot;
pub use position::{Position, PositionState};

/// Trading pair identifier, e.g. `"DOGE/USDT"`.
pub type Pair = String;

/// Split a `BASE/QUOTE` pair into its two assets.
///
/// Returns `None` when the pair has no separator or either side is empty.
pub fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let (base, quote) = pair.split_once('/')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base, quote))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_pair_basic() {
        assert_eq!(split_pair("DOGE/USDT"), Some(("DOGE", "USDT")));
    }

    #[test]
    fn split_pair_rejects_malformed() {
        assert_eq!(split_pair("DOGEUSDT"), None);
        assert_eq!(split_pair("/USDT"), None);
        assert_eq!(split_pair("DOGE/"), None);
    }
}
