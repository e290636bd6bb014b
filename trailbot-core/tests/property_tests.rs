//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Insufficient data — short series never yield a snapshot
//! 2. Constant series — MACD converges to zero and never signals a buy
//! 3. Ratchet monotonicity — stops only rise across any price path
//! 4. Single close — a breached position is closed exactly once
//! 5. Sizer floor — every order meets the minimum notional

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use trailbot_core::domain::Candle;
use trailbot_core::indicators::{IndicatorEngine, IndicatorError, IndicatorParams, Momentum};
use trailbot_core::position_management::{Action, PositionTracker, TrailingStop};
use trailbot_core::signals::{MomentumSignal, Signal, SignalEvaluator};
use trailbot_core::sizers::{size, NotionalSizer, SizeDecision, Sizer};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (0.5..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_closes(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(arb_price(), len)
}

fn candles(closes: &[f64]) -> Vec<Candle> {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(
                t0 + Duration::minutes(i as i64),
                open,
                open.max(close) * 1.01,
                open.min(close) * 0.99,
                close,
                100.0,
            )
        })
        .collect()
}

// ── 1. Insufficient Data ─────────────────────────────────────────────

proptest! {
    #[test]
    fn short_series_is_insufficient(closes in arb_closes(0..35)) {
        let engine = IndicatorEngine::new(IndicatorParams::default()).unwrap();
        let result = engine.compute(&candles(&closes));
        prop_assert_eq!(
            result,
            Err(IndicatorError::InsufficientData { required: 35, available: closes.len() })
        );
    }

    #[test]
    fn long_series_yields_finite_snapshot(closes in arb_closes(35..120)) {
        let engine = IndicatorEngine::new(IndicatorParams::default()).unwrap();
        let snap = engine.compute(&candles(&closes)).unwrap();
        prop_assert!(snap.macd.is_finite());
        prop_assert!(snap.signal.is_finite());
        prop_assert!(snap.atr.is_finite() && snap.atr > 0.0);
        prop_assert_eq!(snap.close, *closes.last().unwrap());
    }
}

// ── 2. Constant Series ───────────────────────────────────────────────

proptest! {
    #[test]
    fn constant_series_has_zero_macd_and_holds(
        price in arb_price(),
        len in 35usize..200,
    ) {
        let engine = IndicatorEngine::new(IndicatorParams::default()).unwrap();
        let snap = engine.compute(&candles(&vec![price; len])).unwrap();
        prop_assert!(snap.macd.abs() < 1e-9);
        prop_assert!(snap.signal.abs() < 1e-9);
        // macd == signal is a tie, and a tie is Bearish.
        prop_assert_eq!(snap.momentum, Momentum::Bearish);
        prop_assert_eq!(MomentumSignal.evaluate(&snap), Signal::Hold);
    }
}

// ── 3. Ratchet Monotonicity ──────────────────────────────────────────

proptest! {
    /// Stop levels may only increase.
    #[test]
    fn trailing_stop_never_loosens(
        initial in arb_price(),
        proposals in prop::collection::vec(0.0..600.0_f64, 1..40),
    ) {
        let mut stop = TrailingStop::armed(initial);
        let mut last = initial;
        for proposed in proposals {
            let level = stop.apply(proposed).level();
            prop_assert!(level >= last, "ratchet violated: {level} < {last}");
            last = level;
        }
    }

    /// Through the tracker: the stop never decreases for any price path
    /// while the position stays open.
    #[test]
    fn tracker_stop_is_monotone(
        entry in 50.0..150.0_f64,
        atr in 0.1..5.0_f64,
        multiplier in 0.5..4.0_f64,
        path in prop::collection::vec(20.0..300.0_f64, 1..60),
    ) {
        let mut tracker = PositionTracker::new(multiplier);
        tracker.open("SOL/USDT", entry, 1.0, atr).unwrap();
        let mut last: Option<f64> = None;
        for price in path {
            let action = tracker.evaluate("SOL/USDT", price);
            let stop = tracker.get("SOL/USDT").unwrap().trailing_stop();
            if let (Some(prev), Some(now)) = (last, stop) {
                prop_assert!(now >= prev, "stop fell from {prev} to {now}");
            }
            last = stop;
            if !action.is_none() {
                break;
            }
        }
    }
}

// ── 4. Single Close ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn breach_closes_exactly_once(
        entry in 50.0..150.0_f64,
        atr in 0.1..5.0_f64,
        path in prop::collection::vec(20.0..300.0_f64, 1..60),
    ) {
        let mut tracker = PositionTracker::new(2.0);
        tracker.open("SOL/USDT", entry, 3.0, atr).unwrap();
        let closes = path
            .iter()
            .filter(|&&price| {
                matches!(tracker.evaluate("SOL/USDT", price), Action::ClosePosition { .. })
            })
            .count();
        prop_assert!(closes <= 1);
        // A breached position is pending until the caller confirms.
        if closes == 1 {
            prop_assert!(tracker.get("SOL/USDT").unwrap().is_pending_close());
        }
    }
}

// ── 5. Sizer Floor ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn size_meets_minimum_notional(
        balance in 0.0..10_000.0_f64,
        price in 0.0001..1_000.0_f64,
        fraction in 0.01..1.0_f64,
        min_notional in 0.0..50.0_f64,
    ) {
        let qty = size(balance, price, fraction, min_notional).unwrap();
        prop_assert!(qty >= 0.0);
        if qty > 0.0 {
            prop_assert!(qty * price >= min_notional * (1.0 - 1e-9));
        }
        if balance * fraction >= min_notional {
            prop_assert!((qty * price - balance * fraction).abs() <= 1e-6 * balance.max(1.0));
        }
    }

    #[test]
    fn planned_orders_are_affordable(
        balance in 0.0..10_000.0_f64,
        price in 0.0001..1_000.0_f64,
        fraction in 0.01..1.0_f64,
        min_notional in 0.0..50.0_f64,
    ) {
        let sizer = NotionalSizer::new(fraction, min_notional);
        if let SizeDecision::Order { notional, .. } = sizer.plan(balance, price).unwrap() {
            prop_assert!(notional <= balance * (1.0 + 1e-9));
            prop_assert!(notional > 0.0);
        }
    }
}
