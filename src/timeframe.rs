//! Candle timeframes.
//!
//! A [`Timeframe`] names the duration of one candle ("1m", "4h", "1d", ...).
//! Besides parsing and display it supplies the annualization factor used by
//! Sharpe ratios and the closeness-to-neutral ordering used when ranking
//! timeframes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnalysisError;

const MINUTES_PER_YEAR: f64 = 365.0 * 24.0 * 60.0;

/// Supported candle durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H12,
    D1,
    W1,
}

impl Timeframe {
    /// Every supported timeframe, finest first.
    pub const ALL: [Timeframe; 12] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::H6,
        Timeframe::H12,
        Timeframe::D1,
        Timeframe::W1,
    ];

    /// Timeframes scanned by default when ranking.
    pub const DEFAULT_SCAN: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Neutral default used to break ties between otherwise equal timeframes.
    pub const NEUTRAL: Timeframe = Timeframe::H1;

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }

    /// Candle duration in minutes.
    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M3 => 3,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H2 => 120,
            Timeframe::H4 => 240,
            Timeframe::H6 => 360,
            Timeframe::H12 => 720,
            Timeframe::D1 => 1_440,
            Timeframe::W1 => 10_080,
        }
    }

    /// Candle duration in milliseconds.
    pub fn millis(&self) -> i64 {
        self.minutes() as i64 * 60_000
    }

    /// Number of candles in a year of continuous (24/7) trading.
    pub fn periods_per_year(&self) -> f64 {
        MINUTES_PER_YEAR / self.minutes() as f64
    }

    /// Log-distance from the neutral default; smaller is closer.
    pub fn distance_from_neutral(&self) -> f64 {
        (self.minutes() as f64 / Self::NEUTRAL.minutes() as f64)
            .ln()
            .abs()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim();
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str() == normalized)
            .ok_or_else(|| {
                AnalysisError::InvalidParameter(format!(
                    "unknown timeframe '{}' (expected one of 1m, 3m, 5m, 15m, 30m, 1h, 2h, 4h, 6h, 12h, 1d, 1w)",
                    s
                ))
            })
    }
}

impl TryFrom<String> for Timeframe {
    type Error = AnalysisError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

/// Parse a comma-separated list such as `"15m,1h,4h"`.
pub fn parse_timeframes(list: &str) -> crate::error::Result<Vec<Timeframe>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
