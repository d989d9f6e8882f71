//! Autoregressive model on first differences (ARIMA(p, 1, 0)).
//!
//! Coefficients are fitted by ridge-stabilised least squares on the normal
//! equations. Forecast variance is
//! accumulated from the model's impulse response, so intervals widen with
//! the horizon.

use nalgebra::{DMatrix, DVector};

use crate::error::{AnalysisError, Result};
use crate::forecast::{tail_closes, AdapterKind, FittedForecast, ForecastAdapter, PointForecast, Z_95};
use crate::types::Candle;

/// ARIMA(p, 1, 0) adapter.
///
/// # Parameters
/// - `order`: number of lagged differences (default 5)
/// - `max_history`: most recent closes used for fitting (default 500)
#[derive(Debug, Clone, Copy)]
pub struct ArimaAdapter {
    order: usize,
    max_history: usize,
}

impl Default for ArimaAdapter {
    fn default() -> Self {
        Self::new(5, 500)
    }
}

impl ArimaAdapter {
    pub fn new(order: usize, max_history: usize) -> Self {
        assert!(order > 0, "AR order must be positive");
        assert!(max_history > order * 4, "History window too short for AR order");
        Self { order, max_history }
    }
}

impl ForecastAdapter for ArimaAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Arima
    }

    fn min_history(&self) -> usize {
        (self.order + 1) * 5
    }

    fn fit(&self, history: &[Candle]) -> Result<Box<dyn FittedForecast>> {
        let prices = tail_closes(history, self.max_history);
        let diffs: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
        let p = self.order;
        if diffs.len() <= p + 1 {
            return Err(AnalysisError::insufficient("arima fit", self.min_history(), history.len()));
        }

        // Regress d[t] on [1, d[t-1], ..., d[t-p]]
        let k = p + 1;
        let rows = diffs.len() - p;
        let mut x_data = Vec::with_capacity(rows * k);
        for t in p..diffs.len() {
            x_data.push(1.0);
            x_data.extend((1..=p).map(|lag| diffs[t - lag]));
        }
        let x = DMatrix::from_row_slice(rows, k, &x_data);
        let y = DVector::from_column_slice(&diffs[p..]);

        // Small ridge keeps flat or collinear histories solvable
        let xtx = x.transpose() * &x + DMatrix::<f64>::identity(k, k) * 1e-8;
        let xty = x.transpose() * &y;
        let beta = match xtx.clone().cholesky() {
            Some(cholesky) => Some(cholesky.solve(&xty)),
            None => xtx.lu().solve(&xty),
        }
        .filter(|beta| beta.iter().all(|v| v.is_finite()))
        .ok_or_else(|| {
            AnalysisError::ModelUnavailable("arima normal equations are singular".to_string())
        })?;

        let residuals = &y - &x * &beta;
        let dof = rows.saturating_sub(k).max(1);
        let sigma = (residuals.norm_squared() / dof as f64).sqrt();

        Ok(Box::new(FittedArima {
            intercept: beta[0],
            phi: beta.iter().skip(1).copied().collect(),
            sigma,
            last_price: prices[prices.len() - 1],
            recent_diffs: diffs[diffs.len() - p..].to_vec(),
        }))
    }
}

struct FittedArima {
    intercept: f64,
    phi: Vec<f64>,
    sigma: f64,
    last_price: f64,
    /// Oldest first.
    recent_diffs: Vec<f64>,
}

impl FittedArima {
    /// Impulse-response weights psi_0..psi_{n-1}.
    fn psi_weights(&self, n: usize) -> Vec<f64> {
        let mut psi = vec![0.0; n];
        if n > 0 {
            psi[0] = 1.0;
        }
        for j in 1..n {
            psi[j] = (1..=self.phi.len().min(j))
                .map(|k| self.phi[k - 1] * psi[j - k])
                .sum();
        }
        psi
    }
}

impl FittedForecast for FittedArima {
    fn forecast(&self, periods: usize) -> Result<Vec<PointForecast>> {
        let mut diffs = self.recent_diffs.clone();
        let mut price = self.last_price;
        let psi = self.psi_weights(periods);

        let mut cumulative_psi = 0.0;
        let mut variance_factor = 0.0;
        let mut out = Vec::with_capacity(periods);

        for h in 0..periods {
            let next: f64 = self.intercept
                + self
                    .phi
                    .iter()
                    .enumerate()
                    .map(|(k, phi)| phi * diffs[diffs.len() - 1 - k])
                    .sum::<f64>();
            diffs.push(next);
            price += next;

            cumulative_psi += psi[h];
            variance_factor += cumulative_psi * cumulative_psi;
            let half = Z_95 * self.sigma * variance_factor.sqrt();

            if !price.is_finite() || !half.is_finite() {
                return Err(AnalysisError::ModelUnavailable(
                    "arima forecast diverged".to_string(),
                ));
            }
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
