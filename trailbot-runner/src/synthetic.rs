//! Synthetic candle generation for replays without market data.
//!
//! A random walk seeded from the pair name and a user seed, so the same
//! inputs always produce the same series. Clearly fake; never use for
//! anything but exercising the engine.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trailbot_core::domain::Candle;

/// Options for [`synthetic_candles`].
#[derive(Debug, Clone)]
pub struct SyntheticOptions {
    pub count: usize,
    pub seed: u64,
    pub start_price: f64,
    /// Maximum absolute per-candle return.
    pub volatility: f64,
    pub interval: Duration,
    pub start: DateTime<Utc>,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            count: 500,
            seed: 0,
            start_price: 100.0,
            volatility: 0.01,
            interval: Duration::minutes(1),
            start: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Parse a ccxt-style timeframe (`1m`, `15m`, `1h`, `1d`, `1w`) into a duration.
pub fn timeframe_duration(timeframe: &str) -> Option<Duration> {
    let split = timeframe.find(|c: char| !c.is_ascii_digit())?;
    let (n, unit) = timeframe.split_at(split);
    let n: i64 = n.parse().ok().filter(|n| *n > 0)?;
    match unit {
        "m" => Some(Duration::minutes(n)),
        "h" => Some(Duration::hours(n)),
        "d" => Some(Duration::days(n)),
        "w" | "W" => Some(Duration::weeks(n)),
        _ => None,
    }
}

/// Generate a deterministic random-walk series for `pair`.
pub fn synthetic_candles(pair: &str, opts: &SyntheticOptions) -> Vec<Candle> {
    // Deterministic seed from pair name and user seed
    let mut hasher = blake3::Hasher::new();
    hasher.update(pair.as_bytes());
    hasher.update(&opts.seed.to_le_bytes());
    let seed: [u8; 32] = *hasher.finalize().as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let vol = opts.volatility.abs().max(f64::EPSILON);
    let mut candles = Vec::with_capacity(opts.count);
    let mut price = opts.start_price;
    let mut ts = opts.start;

    for _ in 0..opts.count {
        let ret: f64 = rng.gen_range(-vol..vol);
        let open = price;
        let close = (price * (1.0 + ret)).max(f64::MIN_POSITIVE);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..vol / 2.0));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..vol / 2.0));
        let volume = rng.gen_range(1_000.0..100_000.0);
        candles.push(Candle::new(ts, open, high, low, close, volume));
        price = close;
        ts += opts.interval;
    }

    candles
}
