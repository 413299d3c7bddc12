//! Canonical candle records and normalization of raw exchange rows
//!
//! Exchange rows arrive as `[time, low, high, open, close, volume]` tuples in no guaranteed
//! order. [`normalize_rows`] turns them into [`Candle`]s sorted ascending by time, which is the
//! only ordering the classifier accepts.

use std::{fmt, io::Read, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, Result, OHLCV};

/// Positions in a raw exchange row: time, low, high, open, close, volume
pub const RAW_ROW_FIELDS: usize = 6;

/// A raw exchange row. Positions past [`RAW_ROW_FIELDS`] are ignored.
pub type RawCandle = Vec<f64>;

/// Canonical OHLCV candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Unix seconds
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Read an exchange row. Returns None when the row is too short.
    pub fn from_row(row: &[f64]) -> Option<Self> {
        match *row {
            [time, low, high, open, close, volume, ..] => Some(Self {
                time: time as i64,
                open,
                high,
                low,
                close,
                volume,
            }),
            _ => None,
        }
    }

    /// The candle as an exchange row
    pub fn to_row(&self) -> RawCandle {
        vec![
            self.time as f64,
            self.low,
            self.high,
            self.open,
            self.close,
            self.volume,
        ]
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.time, 0)
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.time)
    }
}

/// Convert raw exchange rows into candles sorted ascending by time.
///
/// No deduplication: candles sharing a timestamp keep their input order.
pub fn normalize_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Vec<Candle>> {
    let mut candles = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let row = row.as_ref();
            Candle::from_row(row).ok_or(AnalysisError::MalformedRow {
                index,
                expected: RAW_ROW_FIELDS,
                got: row.len(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // stable sort
    candles.sort_by_key(|c| c.time);
    Ok(candles)
}

// ============================================================
// CANDLE SIZE
// ============================================================

/// Exchange candle granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleSize {
    #[serde(rename = "1-minute")]
    OneMinute,
    #[serde(rename = "5-minute")]
    FiveMinutes,
    #[serde(rename = "15-minute")]
    FifteenMinutes,
    #[serde(rename = "1-hour")]
    OneHour,
    #[serde(rename = "6-hour")]
    SixHours,
    #[serde(rename = "1-day")]
    OneDay,
}

impl CandleSize {
    pub const ALL: [CandleSize; 6] = [
        CandleSize::OneMinute,
        CandleSize::FiveMinutes,
        CandleSize::FifteenMinutes,
        CandleSize::OneHour,
        CandleSize::SixHours,
        CandleSize::OneDay,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CandleSize::OneMinute => "1-minute",
            CandleSize::FiveMinutes => "5-minute",
            CandleSize::FifteenMinutes => "15-minute",
            CandleSize::OneHour => "1-hour",
            CandleSize::SixHours => "6-hour",
            CandleSize::OneDay => "1-day",
        }
    }

    /// Candle duration in seconds
    pub fn granularity(self) -> i64 {
        match self {
            CandleSize::OneMinute => 60,
            CandleSize::FiveMinutes => 300,
            CandleSize::FifteenMinutes => 900,
            CandleSize::OneHour => 3_600,
            CandleSize::SixHours => 21_600,
            CandleSize::OneDay => 86_400,
        }
    }

    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|size| size.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for CandleSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandleSize {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|size| size.as_str() == s)
            .ok_or_else(|| AnalysisError::UnknownCandleSize(s.to_string()))
    }
}

// ============================================================
// PRICE HISTORY DOCUMENT
// ============================================================

/// Price history file as written by the candle fetcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistory {
    pub product: String,
    pub candle_size: CandleSize,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub candles: Vec<RawCandle>,
}

impl PriceHistory {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// The rows as candles sorted ascending by time
    pub fn normalized_candles(&self) -> Result<Vec<Candle>> {
        normalize_rows(&self.candles)
    }
}
