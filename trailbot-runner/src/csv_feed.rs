//! Candle loading from CSV files for offline replay.
//!
//! Expected header: `timestamp,open,high,low,close,volume`. The timestamp is
//! either epoch milliseconds or an RFC 3339 string. Rows are sorted by time
//! and duplicate timestamps are rejected.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use trailbot_core::domain::Candle;

/// Errors from the candle loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("row {row}: invalid timestamp '{value}'")]
    Timestamp { row: usize, value: String },

    #[error("row {row}: candle fails OHLC sanity check")]
    Insane { row: usize },

    #[error("duplicate timestamp {timestamp}")]
    Duplicate { timestamp: DateTime<Utc> },

    #[error("'{path}' contains no candles")]
    Empty { path: PathBuf },
}

#[derive(Debug, Deserialize)]
struct CandleRecord {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ms) = value.parse::<i64>() {
        return DateTime::<Utc>::from_timestamp_millis(ms);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Read candles from any CSV source.
pub fn read_candles<R: std::io::Read>(reader: R, origin: &Path) -> Result<Vec<Candle>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut candles = Vec::new();

    for (i, record) in rdr.deserialize::<CandleRecord>().enumerate() {
        // Header is line 1.
        let row = i + 2;
        let record = record.map_err(|source| LoadError::Csv {
            path: origin.to_path_buf(),
            source,
        })?;
        let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| LoadError::Timestamp {
            row,
            value: record.timestamp.clone(),
        })?;
        let candle = Candle::new(
            timestamp,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        );
        if !candle.is_sane() {
            return Err(LoadError::Insane { row });
        }
        candles.push(candle);
    }

    if candles.is_empty() {
        return Err(LoadError::Empty {
            path: origin.to_path_buf(),
        });
    }

    candles.sort_by_key(|c| c.timestamp);
    if let Some(w) = candles.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
        return Err(LoadError::Duplicate {
            timestamp: w[0].timestamp,
        });
    }
    Ok(candles)
}

/// Load candles from a CSV file.
pub fn load_candles(path: &Path) -> Result<Vec<Candle>, LoadError> {
    let file = std::fs::File::open(path).map_err(|e| LoadError::Csv {
        path: path.to_path_buf(),
        source: csv::Error::from(e),
    })?;
    read_candles(file, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(text: &str) -> Result<Vec<Candle>, LoadError> {
        read_candles(text.as_bytes(), Path::new("inline.csv"))
    }

    #[test]
    fn reads_millisecond_and_rfc3339_timestamps() {
        let candles = read(
            "timestamp,open,high,low,close,volume\n\
             1704153660000,101,102,100,101.5,10\n\
             2024-01-02T00:00:00Z,100,101,99,100.5,12\n",
        )
        .unwrap();
        assert_eq!(candles.len(), 2);
        // sorted ascending
        assert_eq!(candles[0].close, 100.5);
        assert_eq!(candles[1].timestamp.timestamp_millis(), 1_704_153_660_000);
    }

    #[test]
    fn volume_column_is_optional() {
        let candles = read("timestamp,open,high,low,close\n1000,1,2,0.5,1.5\n").unwrap();
        assert_eq!(candles[0].volume, 0.0);
    }

    #[test]
    fn rejects_bad_timestamp() {
        let err = read("timestamp,open,high,low,close,volume\nyesterday,1,2,0.5,1.5,1\n").unwrap_err();
        assert!(matches!(err, LoadError::Timestamp { row: 2, .. }));
    }

    #[test]
    fn rejects_insane_candle() {
        let err = read("timestamp,open,high,low,close,volume\n1000,1,0.5,2,1.5,1\n").unwrap_err();
        assert!(matches!(err, LoadError::Insane { row: 2 }));
    }

    #[test]
    fn rejects_duplicates_and_empty_files() {
        let dup = read(
            "timestamp,open,high,low,close,volume\n1000,1,2,0.5,1.5,1\n1000,1,2,0.5,1.5,1\n",
        );
        assert!(matches!(dup, Err(LoadError::Duplicate { .. })));
        assert!(matches!(
            read("timestamp,open,high,low,close,volume\n"),
            Err(LoadError::Empty { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_candles(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(err.to_string().contains("here.csv"));
    }
}
