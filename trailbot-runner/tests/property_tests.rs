//! Property-based tests for runner helpers.
//!
//! Properties:
//! 1. Synthetic candles are sane and strictly ordered for any seed
//! 2. Order quantities keep 8-decimal precision without trailing zeros

use proptest::prelude::*;
use trailbot_core::domain::candle::is_strictly_ordered;
use trailbot_core::domain::Candle;
use trailbot_runner::mexc::format_quantity;
use trailbot_runner::{synthetic_candles, SyntheticOptions};

// ── 1. Synthetic candles ──

proptest! {
    #[test]
    fn synthetic_candles_are_sane(
        seed in any::<u64>(),
        count in 1usize..200,
        volatility in 0.0001f64..0.2,
    ) {
        let opts = SyntheticOptions { count, seed, volatility, ..SyntheticOptions::default() };
        let candles = synthetic_candles("SOL/USDT", &opts);
        prop_assert_eq!(candles.len(), count);
        prop_assert!(candles.iter().all(Candle::is_sane));
        prop_assert!(is_strictly_ordered(&candles));
    }
}

// ── 2. Quantity formatting ──

proptest! {
    #[test]
    fn quantity_formatting_is_precise(q in 0.0001f64..1_000_000.0) {
        let text = format_quantity(q);
        let parsed: f64 = text.parse().unwrap();
        prop_assert!((parsed - q).abs() <= 5e-9 + q * 1e-15);
        if text.contains('.') {
            prop_assert!(!text.ends_with('0'));
            prop_assert!(!text.ends_with('.'));
        }
    }
}
