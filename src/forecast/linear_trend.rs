//! Log-price linear regression.

use crate::error::{AnalysisError, Result};
use crate::forecast::{tail_closes, AdapterKind, FittedForecast, ForecastAdapter, PointForecast, Z_95};
use crate::types::Candle;

/// Fits `ln(close) = a + b * t` over a trailing window and extrapolates it.
///
/// Prediction intervals use the standard regression forecast error, so they
/// widen as the forecast moves away from the fitted window.
#[derive(Debug, Clone, Copy)]
pub struct LinearTrendAdapter {
    window: usize,
}

impl Default for LinearTrendAdapter {
    fn default() -> Self {
        Self { window: 120 }
    }
}

impl LinearTrendAdapter {
    pub fn new(window: usize) -> Self {
        assert!(window >= 3, "Regression window must cover at least 3 candles");
        Self { window }
    }
}

impl ForecastAdapter for LinearTrendAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::LinearTrend
    }

    fn min_history(&self) -> usize {
        20
    }

    fn fit(&self, history: &[Candle]) -> Result<Box<dyn FittedForecast>> {
        let prices = tail_closes(history, self.window);
        if prices.len() < self.min_history().min(self.window) {
            return Err(AnalysisError::insufficient(
                "linear trend fit",
                self.min_history(),
                prices.len(),
            ));
        }
        if prices.iter().any(|&p| p <= 0.0) {
            return Err(AnalysisError::ModelUnavailable(
                "linear trend needs strictly positive prices".to_string(),
            ));
        }

        let logs: Vec<f64> = prices.iter().map(|p| p.ln()).collect();
        let n = logs.len() as f64;
        let t_mean = (n - 1.0) / 2.0;
        let y_mean = logs.iter().sum::<f64>() / n;

        let (sxy, sxx) = logs
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(sxy, sxx), (t, y)| {
                let dt = t as f64 - t_mean;
                (sxy + dt * (y - y_mean), sxx + dt * dt)
            });
        let slope = sxy / sxx;
        let intercept = y_mean - slope * t_mean;

        let sse: f64 = logs
            .iter()
            .enumerate()
            .map(|(t, y)| (y - (intercept + slope * t as f64)).powi(2))
            .sum();
        let sigma = (sse / (n - 2.0)).sqrt();

        Ok(Box::new(FittedTrend {
            intercept,
            slope,
            sigma,
            n,
            t_mean,
            sxx,
        }))
    }
}

struct FittedTrend {
    intercept: f64,
    slope: f64,
    sigma: f64,
    n: f64,
    t_mean: f64,
    sxx: f64,
}

impl FittedForecast for FittedTrend {
    fn forecast(&self, periods: usize) -> Result<Vec<PointForecast>> {
        (1..=periods)
            .map(|h| {
                let t = self.n - 1.0 + h as f64;
                let log_price = self.intercept + self.slope * t;
                let se = self.sigma
                    * (1.0 + 1.0 / self.n + (t - self.t_mean).powi(2) / self.sxx).sqrt();
                let price = log_price.exp();
                if !price.is_finite() {
                    return Err(AnalysisError::ModelUnavailable(
                        "linear trend forecast overflowed".to_string(),
                    ));
                }
                Ok(PointForecast {
                    price,
                    lower: (log_price - Z_95 * se).exp(),
                    upper: (log_price + Z_95 * se).exp(),
                    confidence: None,
                })
            })
            .collect()
    }
}
