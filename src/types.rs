//! Core value types shared by forecasting and backtesting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AnalysisError, Result};

/// OHLCV candle for one period of market data.
///
/// `open_time` is a millisecond Unix timestamp, the convention used by
/// exchange kline feeds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Validate that candle data is consistent.
    pub fn validate(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low >= 0.0
            && self.volume >= 0.0
    }

    /// Candle range (high - low).
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Absolute body size.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Open time as a UTC datetime, if representable.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.open_time)
    }
}

/// Check that a candle sequence is well formed: every candle consistent and
/// open times strictly increasing.
pub fn validate_candles(candles: &[Candle]) -> Result<()> {
    for (i, candle) in candles.iter().enumerate() {
        if !candle.validate() {
            return Err(AnalysisError::InvalidData(format!(
                "candle {} at {} has inconsistent OHLCV values",
                i, candle.open_time
            )));
        }
        if i > 0 && candle.open_time <= candles[i - 1].open_time {
            return Err(AnalysisError::InvalidData(format!(
                "open_time must be strictly increasing (index {}: {} after {})",
                i,
                candle.open_time,
                candles[i - 1].open_time
            )));
        }
    }
    Ok(())
}

/// Closing prices of a candle slice.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Entry signal emitted by an indicator for the current candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntrySignal {
    pub direction: Direction,
    /// Price at which the position is opened.
    pub entry_price: f64,
}

impl EntrySignal {
    pub fn long(entry_price: f64) -> Self {
        Self {
            direction: Direction::Long,
            entry_price,
        }
    }

    pub fn short(entry_price: f64) -> Self {
        Self {
            direction: Direction::Short,
            entry_price,
        }
    }
}

/// Why a simulated trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Timeout,
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::Timeout => "timeout",
            ExitReason::EndOfData => "end_of_data",
        };
        write!(f, "{}", s)
    }
}

/// Directional trend label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Bullish => write!(f, "bullish"),
            Trend::Bearish => write!(f, "bearish"),
            Trend::Neutral => write!(f, "neutral"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle(open_time: i64) -> Candle {
        Candle::new(open_time, 100.0, 105.0, 98.0, 103.0, 1_000.0)
    }

    #[test]
    fn test_candle_validation() {
        assert!(sample_candle(0).validate());

        let invalid = Candle::new(0, 100.0, 95.0, 98.0, 103.0, 1_000.0);
        assert!(!invalid.validate());

        let nan = Candle::new(0, f64::NAN, 105.0, 98.0, 103.0, 1_000.0);
        assert!(!nan.validate());
    }

    #[test]
    fn test_candle_shape() {
        let candle = sample_candle(0);
        assert_eq!(candle.range(), 7.0);
        assert_eq!(candle.body(), 3.0);
        assert!(candle.is_bullish());
        assert!(!candle.is_bearish());
    }

    #[test]
    fn test_validate_candles_rejects_unordered() {
        let candles = vec![sample_candle(2_000), sample_candle(1_000)];
        let err = validate_candles(&candles).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidData(_)));

        let duplicate = vec![sample_candle(1_000), sample_candle(1_000)];
        assert!(validate_candles(&duplicate).is_err());

        let ordered = vec![sample_candle(1_000), sample_candle(2_000)];
        assert!(validate_candles(&ordered).is_ok());
    }

    #[test]
    fn test_datetime() {
        let candle = sample_candle(1_700_000_000_000);
        let dt = candle.datetime().unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_exit_reason_display() {
        assert_eq!(ExitReason::StopLoss.to_string(), "stop_loss");
        assert_eq!(ExitReason::EndOfData.to_string(), "end_of_data");
        let json = serde_json::to_string(&ExitReason::TakeProfit).unwrap();
        assert_eq!(json, "\"take_profit\"");
    }
}
