//! Confidence scores and prediction intervals.
//!
//! All forecasting paths route their output through [`ConfidenceEstimator`],
//! which owns the decay policy and the guarantees every emitted prediction
//! list satisfies: confidence in `[0, 100]`, non-increasing with horizon, and
//! `lower_bound <= predicted_price <= upper_bound`.

use serde::{Deserialize, Serialize};

use crate::forecast::Prediction;

/// Confidence policy parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Confidence at step 0 before penalties.
    pub base_confidence: f64,
    /// Points lost per forecast step.
    pub decay_per_step: f64,
    /// Floor for policy-derived confidence.
    pub min_confidence: f64,
    /// Ceiling for interval-derived confidence.
    pub max_confidence: f64,
    /// Points lost per percent of per-period volatility.
    pub volatility_penalty_scale: f64,
    /// Cap on the volatility penalty.
    pub max_volatility_penalty: f64,
    /// Interval multiplier on `volatility * sqrt(step)`.
    pub interval_width: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            base_confidence: 70.0,
            decay_per_step: 3.0,
            min_confidence: 30.0,
            max_confidence: 90.0,
            volatility_penalty_scale: 2.0,
            max_volatility_penalty: 20.0,
            interval_width: 2.0,
        }
    }
}

/// Maps forecast horizon and volatility to confidence and intervals.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceEstimator {
    config: ConfidenceConfig,
}

impl ConfidenceEstimator {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConfidenceConfig {
        &self.config
    }

    fn volatility_penalty(&self, volatility: f64) -> f64 {
        let vol_pct = sanitize(volatility.abs()) * 100.0;
        (vol_pct * self.config.volatility_penalty_scale).min(self.config.max_volatility_penalty)
    }

    /// Policy confidence for a 1-based forecast step.
    ///
    /// Linear in the step down to `min_confidence`. Past that floor the
    /// shortfall is compressed hyperbolically, so confidence keeps falling
    /// with the horizon but never drops below `min_confidence / 2`.
    pub fn step_confidence(&self, step: usize, volatility: f64) -> f64 {
        let c = &self.config;
        let floor = c.min_confidence.clamp(0.0, 100.0);
        let raw = c.base_confidence
            - c.decay_per_step * step as f64
            - self.volatility_penalty(volatility);
        if raw >= floor {
            return raw.min(100.0);
        }
        let half = floor / 2.0;
        let shortfall = floor - raw;
        sanitize(half + half * floor / (floor + shortfall))
    }

    /// Interval around `price` for a 1-based step given per-period volatility.
    pub fn interval(&self, price: f64, volatility: f64, step: usize) -> (f64, f64) {
        let half = (price.abs() * sanitize(volatility.abs()) * self.config.interval_width
            * (step as f64).sqrt())
        .max(0.0);
        ((price - half).max(0.0).min(price), price + half)
    }

    /// Confidence implied by an interval's relative width, for models that
    /// report intervals but no confidence of their own.
    ///
    /// `100 - 2 * width%`, bounded to `[min_confidence, max_confidence]`.
    pub fn from_interval(&self, price: f64, lower: f64, upper: f64) -> f64 {
        let c = &self.config;
        if price <= 0.0 || !price.is_finite() {
            return c.min_confidence;
        }
        let width_pct = sanitize((upper - lower).abs() / price * 100.0);
        (100.0 - 2.0 * width_pct).clamp(c.min_confidence, c.max_confidence)
    }

    /// Build a prediction with policy confidence and a volatility interval.
    pub fn predict_point(
        &self,
        timestamp: i64,
        price: f64,
        volatility: f64,
        step: usize,
    ) -> Prediction {
        let (lower_bound, upper_bound) = self.interval(price, volatility, step);
        Prediction {
            timestamp,
            predicted_price: price,
            confidence: self.step_confidence(step, volatility),
            lower_bound,
            upper_bound,
        }
    }

    /// Make a prediction list satisfy the confidence and interval guarantees.
    ///
    /// Confidence is clamped to `[0, 100]` and made non-increasing by a running
    /// minimum; bounds are widened to contain the predicted price.
    pub fn enforce(&self, predictions: &mut [Prediction]) {
        let mut ceiling = 100.0_f64;
        for p in predictions.iter_mut() {
            p.predicted_price = sanitize(p.predicted_price);
            let confidence = sanitize(p.confidence).clamp(0.0, 100.0);
            p.confidence = confidence.min(ceiling);
            ceiling = p.confidence;

            let lower = if p.lower_bound.is_finite() {
                p.lower_bound
            } else {
                p.predicted_price
            };
            let upper = if p.upper_bound.is_finite() {
                p.upper_bound
            } else {
                p.predicted_price
            };
            p.lower_bound = lower.min(p.predicted_price);
            p.upper_bound = upper.max(p.predicted_price);
        }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
