//! Trend classification from moving-average separation.

use serde::{Deserialize, Serialize};

use crate::features::FeatureVector;
use crate::types::Trend;

/// Configuration for [`TrendClassifier`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Relative MA gap below which the trend is neutral (0.001 = 0.1%).
    pub threshold: f64,
    /// Strength points per percent of MA gap.
    pub strength_scale: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            threshold: 0.001,
            strength_scale: 10.0,
        }
    }
}

/// Labels the prevailing trend from the short and medium moving averages.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendClassifier {
    config: TrendConfig,
}

impl TrendClassifier {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    /// Classify from the latest feature vector (MA7 against MA25).
    pub fn classify(&self, features: &FeatureVector) -> (Trend, f64) {
        self.classify_mas(features.ma7, features.ma25)
    }

    /// Classify from a short and a medium moving average.
    ///
    /// Strength is `|gap%| * strength_scale` clamped to `[0, 100]`.
    pub fn classify_mas(&self, short_ma: f64, medium_ma: f64) -> (Trend, f64) {
        if medium_ma == 0.0 || !short_ma.is_finite() || !medium_ma.is_finite() {
            return (Trend::Neutral, 0.0);
        }

        let gap = (short_ma - medium_ma) / medium_ma;
        let trend = if gap > self.config.threshold {
            Trend::Bullish
        } else if gap < -self.config.threshold {
            Trend::Bearish
        } else {
            Trend::Neutral
        };

        let strength = (gap.abs() * 100.0 * self.config.strength_scale).clamp(0.0, 100.0);
        (trend, strength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sma;
    use crate::types::Candle;

    fn compounding(n: usize, rate: f64) -> Vec<Candle> {
        let mut price = 100.0;
        (0..n)
            .map(|i| {
                let open = price;
                price *= 1.0 + rate;
                Candle::new(
                    i as i64 * 60_000,
                    open,
                    open.max(price) * 1.001,
                    open.min(price) * 0.999,
                    price,
                    1.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_strong_uptrend() {
        let candles = compounding(50, 0.01);
        let short = sma(&candles, 7).unwrap();
        let medium = sma(&candles, 25).unwrap();

        let (trend, strength) = TrendClassifier::default().classify_mas(short, medium);
        assert_eq!(trend, Trend::Bullish);
        assert!(strength > 50.0, "strength was {strength}");
    }

    #[test]
    fn test_downtrend() {
        let candles = compounding(50, -0.01);
        let short = sma(&candles, 7).unwrap();
        let medium = sma(&candles, 25).unwrap();

        let (trend, strength) = TrendClassifier::default().classify_mas(short, medium);
        assert_eq!(trend, Trend::Bearish);
        assert!(strength > 0.0);
    }

    #[test]
    fn test_flat_is_neutral() {
        let (trend, strength) = TrendClassifier::default().classify_mas(100.0, 100.0);
        assert_eq!(trend, Trend::Neutral);
        assert_eq!(strength, 0.0);

        // 0.05% gap stays under the 0.1% threshold
        let (trend, _) = TrendClassifier::default().classify_mas(100.05, 100.0);
        assert_eq!(trend, Trend::Neutral);
    }

    #[test]
    fn test_strength_clamped() {
        let (_, strength) = TrendClassifier::default().classify_mas(200.0, 100.0);
        assert_eq!(strength, 100.0);
        let (trend, strength) = TrendClassifier::default().classify_mas(1.0, 0.0);
        assert_eq!(trend, Trend::Neutral);
        assert_eq!(strength, 0.0);
    }
}
