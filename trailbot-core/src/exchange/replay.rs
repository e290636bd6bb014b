//! In-memory candle feed with a shared cursor.
//!
//! Each pair holds a full history; only candles before the cursor are
//! visible. Advancing the cursor one step per pass replays the history bar
//! by bar through the live controller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ExchangeError, MarketData};
use crate::domain::Candle;

#[derive(Debug, Default)]
pub struct ReplayFeed {
    series: HashMap<String, Vec<Candle>>,
    cursor: AtomicUsize,
}

impl ReplayFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the history for `pair`.
    pub fn with_series(mut self, pair: impl Into<String>, candles: Vec<Candle>) -> Self {
        self.series.insert(pair.into(), candles);
        self
    }

    /// Number of candles currently visible per pair.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn set_cursor(&self, visible: usize) {
        self.cursor.store(visible, Ordering::SeqCst);
    }

    /// Reveal one more candle. Returns false once every series is exhausted.
    pub fn advance(&self) -> bool {
        let next = self.cursor.fetch_add(1, Ordering::SeqCst) + 1;
        next <= self.longest()
    }

    /// Length of the longest series.
    pub fn longest(&self) -> usize {
        self.series.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Latest visible candle for `pair`.
    pub fn latest(&self, pair: &str) -> Option<&Candle> {
        let candles = self.series.get(pair)?;
        let visible = self.cursor().min(candles.len());
        visible.checked_sub(1).and_then(|i| candles.get(i))
    }
}

impl MarketData for ReplayFeed {
    fn name(&self) -> &str {
        "replay"
    }

    fn fetch_series(
        &self,
        pair: &str,
        _timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let candles = self
            .series
            .get(pair)
            .ok_or_else(|| ExchangeError::UnknownPair { pair: pair.into() })?;
        let end = self.cursor().min(candles.len());
        let start = end.saturating_sub(limit);
        Ok(candles[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(n: usize) -> Vec<Candle> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let c = 100.0 + i as f64;
                Candle::new(t0 + Duration::minutes(i as i64), c, c + 1.0, c - 1.0, c, 10.0)
            })
            .collect()
    }

    #[test]
    fn cursor_limits_visibility() {
        let feed = ReplayFeed::new().with_series("SOL/USDT", candles(10));
        assert!(feed.fetch_series("SOL/USDT", "1m", 100).unwrap().is_empty());
        feed.set_cursor(4);
        let visible = feed.fetch_series("SOL/USDT", "1m", 100).unwrap();
        assert_eq!(visible.len(), 4);
        assert_eq!(visible.last().unwrap().close, 103.0);
        assert_eq!(feed.latest("SOL/USDT").unwrap().close, 103.0);
    }

    #[test]
    fn limit_takes_most_recent() {
        let feed = ReplayFeed::new().with_series("SOL/USDT", candles(10));
        feed.set_cursor(10);
        let tail = feed.fetch_series("SOL/USDT", "1m", 3).unwrap();
        let closes: Vec<f64> = tail.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![107.0, 108.0, 109.0]);
    }

    #[test]
    fn advance_stops_after_longest() {
        let feed = ReplayFeed::new().with_series("A/USDT", candles(2));
        assert!(feed.advance());
        assert!(feed.advance());
        assert!(!feed.advance());
    }

    #[test]
    fn unknown_pair_errors() {
        let feed = ReplayFeed::new();
        assert_eq!(
            feed.fetch_series("X/USDT", "1m", 5),
            Err(ExchangeError::UnknownPair {
                pair: "X/USDT".into()
            })
        );
    }
}
