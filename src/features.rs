//! Feature engineering over candle history.
//!
//! [`FeatureEngineer`] derives one [`FeatureVector`] per candle index once every
//! rolling window it uses is complete. Indices inside the warm-up are absent
//! from the output rather than zero-filled, and every window only reads data
//! at or before its own index.
//!
//! # Features
//!
//! - **Returns**: natural-log return into the candle
//! - **Volatility**: sample std of the last 20 log returns
//! - **Moving averages**: MA7, MA25, MA99 of closes
//! - **RSI(14)**: simple rolling means of gains and losses
//! - **Momentum**: close minus the close four candles earlier
//! - **Bollinger Bands(20, 2)**: bands and relative width
//! - **Range**: high-low range, absolute and as a percent of close
//!
//! # Example
//!
//! ```no_run
//! use smarttrade::features::{FeatureConfig, FeatureEngineer};
//! # let candles: Vec<smarttrade::types::Candle> = vec![];
//!
//! let engineer = FeatureEngineer::new(FeatureConfig::default());
//! let features = engineer.extract(&candles)?;
//! println!("latest MA7: {:.2}", features.last().unwrap().ma7);
//! # Ok::<(), smarttrade::error::AnalysisError>(())
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{bollinger_bands, log_returns, rsi, sample_std, sma};
use crate::error::{AnalysisError, Result};
use crate::types::Candle;

/// Configuration for feature extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Short moving-average period.
    pub short_ma: usize,
    /// Medium moving-average period.
    pub medium_ma: usize,
    /// Long moving-average period.
    pub long_ma: usize,
    /// Number of log returns in the volatility window.
    pub volatility_window: usize,
    /// RSI period.
    pub rsi_period: usize,
    /// Momentum lag in candles.
    pub momentum_lag: usize,
    /// Bollinger Bands period and std multiplier.
    pub bb_params: (usize, f64),
    /// Minimum history accepted by [`FeatureEngineer::extract`].
    pub min_candles: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            short_ma: 7,
            medium_ma: 25,
            long_ma: 99,
            volatility_window: 20,
            rsi_period: 14,
            momentum_lag: 4,
            bb_params: (20, 2.0),
            min_candles: 100,
        }
    }
}

/// Features for a single candle index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Index in the input candle slice.
    pub index: usize,
    pub open_time: i64,
    pub close: f64,
    pub log_return: f64,
    pub volatility: f64,
    pub ma7: f64,
    pub ma25: f64,
    pub ma99: f64,
    pub rsi: f64,
    pub momentum: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    /// (upper - lower) / middle.
    pub bb_width: f64,
    pub hl_range: f64,
    /// High-low range as a percent of close.
    pub hl_pct: f64,
}

/// Derives [`FeatureVector`]s from candles.
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer {
    config: FeatureConfig,
}

impl FeatureEngineer {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Number of candles needed before the first feature vector exists.
    pub fn warmup_period(&self) -> usize {
        let c = &self.config;
        c.short_ma
            .max(c.medium_ma)
            .max(c.long_ma)
            .max(c.bb_params.0)
            .max(c.volatility_window + 1)
            .max(c.rsi_period + 1)
            .max(c.momentum_lag + 1)
    }

    /// Minimum history length accepted by [`extract`](Self::extract).
    pub fn min_candles(&self) -> usize {
        self.config.min_candles.max(self.warmup_period())
    }

    /// Extract features for every index past the warm-up.
    ///
    /// With the default configuration the first vector is at index 98 (the
    /// first index where the 99-candle window is complete), so the output
    /// holds `candles.len() - 98` vectors.
    pub fn extract(&self, candles: &[Candle]) -> Result<Vec<FeatureVector>> {
        let required = self.min_candles();
        if candles.len() < required {
            return Err(AnalysisError::insufficient(
                "feature extraction",
                required,
                candles.len(),
            ));
        }

        let first = self.warmup_period() - 1;
        let returns = log_returns(candles);
        let mut vectors = Vec::with_capacity(candles.len() - first);

        for i in first..candles.len() {
            vectors.push(self.vector_at(candles, &returns, i)?);
        }

        debug!(
            "Extracted {} feature vectors from {} candles",
            vectors.len(),
            candles.len()
        );
        Ok(vectors)
    }

    /// Features of the final candle only.
    pub fn latest(&self, candles: &[Candle]) -> Result<FeatureVector> {
        let required = self.min_candles();
        if candles.len() < required {
            return Err(AnalysisError::insufficient(
                "feature extraction",
                required,
                candles.len(),
            ));
        }
        let returns = log_returns(candles);
        self.vector_at(candles, &returns, candles.len() - 1)
    }

    fn vector_at(&self, candles: &[Candle], returns: &[f64], i: usize) -> Result<FeatureVector> {
        let c = &self.config;
        let history = &candles[..=i];
        let candle = &candles[i];
        let missing = || {
            AnalysisError::insufficient("feature extraction", self.warmup_period(), i + 1)
        };

        // returns[k] is the return into candle k + 1
        let vol_window = &returns[i - c.volatility_window..i];
        let volatility = sample_std(vol_window).ok_or_else(missing)?;

        let (bb_middle, bb_upper, bb_lower) =
            bollinger_bands(history, c.bb_params.0, c.bb_params.1).ok_or_else(missing)?;
        let bb_width = if bb_middle != 0.0 {
            (bb_upper - bb_lower) / bb_middle
        } else {
            0.0
        };

        let hl_range = candle.range();
        let hl_pct = if candle.close != 0.0 {
            hl_range / candle.close * 100.0
        } else {
            0.0
        };

        Ok(FeatureVector {
            index: i,
            open_time: candle.open_time,
            close: candle.close,
            log_return: returns[i - 1],
            volatility,
            ma7: sma(history, c.short_ma).ok_or_else(missing)?,
            ma25: sma(history, c.medium_ma).ok_or_else(missing)?,
            ma99: sma(history, c.long_ma).ok_or_else(missing)?,
            rsi: rsi(history, c.rsi_period).ok_or_else(missing)?,
            momentum: candle.close - candles[i - c.momentum_lag].close,
            bb_upper,
            bb_middle,
            bb_lower,
            bb_width,
            hl_range,
            hl_pct,
        })
    }
}
