//! Holt linear exponential smoothing.

use crate::error::{AnalysisError, Result};
use crate::forecast::{tail_closes, AdapterKind, FittedForecast, ForecastAdapter, PointForecast, Z_95};
use crate::types::Candle;

const ALPHA_GRID: [f64; 9] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];
const BETA_GRID: [f64; 5] = [0.01, 0.05, 0.1, 0.2, 0.3];

/// Double exponential smoothing with level and trend.
///
/// Smoothing factors are picked from a fixed grid by minimising the
/// one-step-ahead squared error over the fitted window.
#[derive(Debug, Clone, Copy)]
pub struct HoltAdapter {
    max_history: usize,
}

impl Default for HoltAdapter {
    fn default() -> Self {
        Self { max_history: 500 }
    }
}

impl HoltAdapter {
    pub fn new(max_history: usize) -> Self {
        assert!(max_history >= 10, "History window too short");
        Self { max_history }
    }
}

/// Run the recursion, returning (level, trend, sse, steps).
fn smooth(prices: &[f64], alpha: f64, beta: f64) -> (f64, f64, f64, usize) {
    let mut level = prices[0];
    let mut trend = prices[1] - prices[0];
    let mut sse = 0.0;
    for &y in &prices[1..] {
        let forecast = level + trend;
        sse += (y - forecast).powi(2);
        let new_level = alpha * y + (1.0 - alpha) * forecast;
        trend = beta * (new_level - level) + (1.0 - beta) * trend;
        level = new_level;
    }
    (level, trend, sse, prices.len() - 1)
}

impl ForecastAdapter for HoltAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Holt
    }

    fn min_history(&self) -> usize {
        10
    }

    fn fit(&self, history: &[Candle]) -> Result<Box<dyn FittedForecast>> {
        let prices = tail_closes(history, self.max_history);
        if prices.len() < self.min_history() {
            return Err(AnalysisError::insufficient("holt fit", self.min_history(), prices.len()));
        }

        let mut best: Option<(f64, f64, f64, f64, f64)> = None;
        for &alpha in &ALPHA_GRID {
            for &beta in &BETA_GRID {
                let (level, trend, sse, steps) = smooth(&prices, alpha, beta);
                let mse = sse / steps as f64;
                if !mse.is_finite() {
                    continue;
                }
                if best.map_or(true, |(.., best_mse)| mse < best_mse) {
                    best = Some((alpha, beta, level, trend, mse));
                }
            }
        }

        let (alpha, beta, level, trend, mse) = best.ok_or_else(|| {
            AnalysisError::ModelUnavailable("holt smoothing did not converge".to_string())
        })?;

        Ok(Box::new(FittedHolt {
            alpha,
            beta,
            level,
            trend,
            sigma: mse.sqrt(),
        }))
    }
}

struct FittedHolt {
    alpha: f64,
    beta: f64,
    level: f64,
    trend: f64,
    sigma: f64,
}

impl FittedForecast for FittedHolt {
    fn forecast(&self, periods: usize) -> Result<Vec<PointForecast>> {
        let mut variance_factor = 1.0;
        let mut out = Vec::with_capacity(periods);
        for h in 1..=periods {
            if h > 1 {
                let j = (h - 1) as f64;
                variance_factor += (self.alpha * (1.0 + j * self.beta)).powi(2);
            }
            let price = self.level + h as f64 * self.trend;
            let half = Z_95 * self.sigma * variance_factor.sqrt();
            out.push(PointForecast {
                price,
                lower: (price - half).max(0.0),
                upper: price + half,
                confidence: None,
            });
        }
        Ok(out)
    }
}
