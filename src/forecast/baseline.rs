//! Drift baseline.
//!
//! Extrapolates the separation between the short and medium moving averages
//! as a per-period drift. It needs nothing beyond the feature vector, so it
//! is always available and is the fallback when no adapter can run.

use crate::confidence::ConfidenceEstimator;
use crate::features::{FeatureConfig, FeatureVector};
use crate::forecast::Prediction;

/// Moving-average drift model.
///
/// # Parameters
/// - `lag`: periods between the centres of the short and medium MA windows
///   (9 for MA7/MA25)
/// - `max_drift`: absolute cap on per-period drift (default 5%)
#[derive(Debug, Clone, Copy)]
pub struct DriftModel {
    lag: f64,
    max_drift: f64,
}

impl Default for DriftModel {
    fn default() -> Self {
        Self::from_feature_config(&FeatureConfig::default())
    }
}

impl DriftModel {
    pub fn new(lag: f64, max_drift: f64) -> Self {
        assert!(lag > 0.0, "Lag must be positive");
        assert!(max_drift >= 0.0, "Max drift must be non-negative");
        Self { lag, max_drift }
    }

    /// Lag derived from the configured MA windows.
    pub fn from_feature_config(config: &FeatureConfig) -> Self {
        let lag = (config.medium_ma as f64 - config.short_ma as f64) / 2.0;
        Self::new(lag.max(1.0), 0.05)
    }

    /// Per-period fractional drift implied by the latest features.
    pub fn drift(&self, latest: &FeatureVector) -> f64 {
        if latest.ma25 <= 0.0 || !latest.ma7.is_finite() {
            return 0.0;
        }
        let gap = latest.ma7 / latest.ma25 - 1.0;
        (gap / self.lag).clamp(-self.max_drift, self.max_drift)
    }

    /// Projected closes for steps `1..=periods`.
    pub fn forecast_prices(&self, latest: &FeatureVector, periods: usize) -> Vec<f64> {
        let growth = 1.0 + self.drift(latest);
        (1..=periods)
            .map(|step| latest.close * growth.powi(step as i32))
            .collect()
    }

    /// Predictions with confidence and intervals from `estimator`.
    pub fn forecast(
        &self,
        latest: &FeatureVector,
        timestamps: &[i64],
        estimator: &ConfidenceEstimator,
    ) -> Vec<Prediction> {
        let prices = self.forecast_prices(latest, timestamps.len());
        let mut predictions: Vec<Prediction> = prices
            .iter()
            .zip(timestamps)
            .enumerate()
            .map(|(i, (&price, &ts))| estimator.predict_point(ts, price, latest.volatility, i + 1))
            .collect();
        estimator.enforce(&mut predictions);
        predictions
    }
}
