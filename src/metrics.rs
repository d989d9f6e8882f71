//! Trade and forecast metrics.
//!
//! Every value leaving this module is finite: an unbounded profit factor is
//! reported as [`PROFIT_FACTOR_CAP`] and NaN/infinite intermediates collapse
//! to zero, so results always serialize to valid JSON.

use serde::{Deserialize, Serialize};

use crate::backtest::BacktestTrade;
use crate::data::{mean, population_std};
use crate::timeframe::Timeframe;

/// Profit factor reported when there are winning trades and no losing ones.
pub const PROFIT_FACTOR_CAP: f64 = 999.99;

/// Replace NaN or infinite values with `default`.
pub fn finite_or(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        default
    }
}

/// Summary statistics of a trade log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent of trades with positive pnl.
    pub win_rate: f64,
    pub profit_factor: f64,
    /// Sum of per-trade pnl percents.
    pub total_pnl: f64,
    pub avg_win: f64,
    /// Mean pnl of losing trades (negative or zero).
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Largest peak-to-trough fall of cumulative pnl, in pnl points.
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
}

/// Computes trade and forecast metrics for one timeframe.
#[derive(Debug, Clone, Copy)]
pub struct MetricsCalculator {
    annualization_factor: f64,
}

impl MetricsCalculator {
    pub fn new(annualization_factor: f64) -> Self {
        Self {
            annualization_factor: finite_or(annualization_factor, 1.0).max(0.0),
        }
    }

    /// Annualize with the number of `timeframe` candles per year.
    pub fn for_timeframe(timeframe: Timeframe) -> Self {
        Self::new(timeframe.periods_per_year())
    }

    pub fn trades(&self, trades: &[BacktestTrade]) -> TradeMetrics {
        let pnls: Vec<f64> = trades.iter().map(|t| t.pnl_percent).collect();
        self.pnls(&pnls)
    }

    /// Metrics over per-trade pnl percents in chronological order.
    pub fn pnls(&self, pnls: &[f64]) -> TradeMetrics {
        if pnls.is_empty() {
            return TradeMetrics::default();
        }
        let pnls: Vec<f64> = pnls.iter().map(|&p| finite_or(p, 0.0)).collect();

        let wins: Vec<f64> = pnls.iter().copied().filter(|&p| p > 0.0).collect();
        let losses: Vec<f64> = pnls.iter().copied().filter(|&p| p < 0.0).collect();

        let gross_wins: f64 = wins.iter().sum();
        let gross_losses: f64 = losses.iter().map(|p| p.abs()).sum();
        let profit_factor = if gross_losses > 0.0 {
            (gross_wins / gross_losses).min(PROFIT_FACTOR_CAP)
        } else if gross_wins > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        };

        TradeMetrics {
            total_trades: pnls.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: wins.len() as f64 / pnls.len() as f64 * 100.0,
            profit_factor,
            total_pnl: finite_or(pnls.iter().sum(), 0.0),
            avg_win: mean(&wins).unwrap_or(0.0),
            avg_loss: mean(&losses).unwrap_or(0.0),
            largest_win: wins.iter().copied().fold(0.0, f64::max),
            largest_loss: losses.iter().copied().fold(0.0, f64::min),
            max_drawdown: max_drawdown(&pnls),
            sharpe_ratio: sharpe_ratio(&pnls, self.annualization_factor),
        }
    }

    pub fn forecast(&self, actual: &[f64], predicted: &[f64]) -> ForecastAccuracy {
        ForecastAccuracy::compute(actual, predicted)
    }
}

/// Largest fall of the cumulative pnl curve from a running peak, starting
/// from a flat curve at zero.
pub fn max_drawdown(pnls: &[f64]) -> f64 {
    let mut cumulative = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut worst = 0.0_f64;
    for &p in pnls {
        cumulative += p;
        peak = peak.max(cumulative);
        worst = worst.max(peak - cumulative);
    }
    finite_or(worst, 0.0)
}

/// Annualized Sharpe ratio (population std); 0 when returns do not vary.
pub fn sharpe_ratio(returns: &[f64], annualization_factor: f64) -> f64 {
    let (Some(m), Some(std)) = (mean(returns), population_std(returns)) else {
        return 0.0;
    };
    if std == 0.0 || !std.is_finite() {
        return 0.0;
    }
    finite_or(m / std * annualization_factor.sqrt(), 0.0)
}

/// Forecast error statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastAccuracy {
    pub mae: f64,
    pub rmse: f64,
    /// Mean absolute percentage error over non-zero actuals.
    pub mape: f64,
    pub samples: usize,
}

impl ForecastAccuracy {
    /// Compare aligned actual and predicted values; extra elements of the
    /// longer slice are ignored.
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        let pairs: Vec<(f64, f64)> = actual
            .iter()
            .zip(predicted)
            .map(|(&a, &p)| (a, p))
            .filter(|(a, p)| a.is_finite() && p.is_finite())
            .collect();
        if pairs.is_empty() {
            return Self::default();
        }

        let n = pairs.len() as f64;
        let mae = pairs.iter().map(|(a, p)| (a - p).abs()).sum::<f64>() / n;
        let rmse = (pairs.iter().map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n).sqrt();
        let pct: Vec<f64> = pairs
            .iter()
            .filter(|(a, _)| *a != 0.0)
            .map(|(a, p)| ((a - p) / a).abs() * 100.0)
            .collect();

        Self {
            mae: finite_or(mae, 0.0),
            rmse: finite_or(rmse, 0.0),
            mape: finite_or(mean(&pct).unwrap_or(0.0), 0.0),
            samples: pairs.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_log() {
        let m = MetricsCalculator::new(365.0).pnls(&[]);
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_all_winners_uses_sentinel() {
        let m = MetricsCalculator::new(365.0).pnls(&[2.0, 2.0, 2.0]);
        assert_eq!(m.win_rate, 100.0);
        assert_eq!(m.profit_factor, PROFIT_FACTOR_CAP);
        assert!(m.profit_factor.is_finite());
        assert_eq!(m.max_drawdown, 0.0);
        // identical returns have zero variance
        assert_eq!(m.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_mixed_log() {
        let m = MetricsCalculator::new(1.0).pnls(&[2.0, -1.0, -1.0, 2.0, -1.0]);
        assert_eq!(m.total_trades, 5);
        assert_eq!(m.winning_trades, 2);
        assert_eq!(m.losing_trades, 3);
        assert!((m.win_rate - 40.0).abs() < 1e-12);
        assert!((m.profit_factor - 4.0 / 3.0).abs() < 1e-12);
        assert!((m.total_pnl - 1.0).abs() < 1e-12);
        assert!((m.avg_loss + 1.0).abs() < 1e-12);
        assert_eq!(m.largest_win, 2.0);
        assert_eq!(m.largest_loss, -1.0);
        // peak 2.0 after the first trade, trough 0.0 after the third
        assert!((m.max_drawdown - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_drawdown_from_start() {
        assert!((max_drawdown(&[-1.0, -1.0, 3.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sharpe_annualization() {
        let returns = [1.0, -1.0, 1.0, -1.0, 2.0];
        let daily = sharpe_ratio(&returns, 1.0);
        let annual = sharpe_ratio(&returns, 365.0);
        assert!((annual - daily * 365.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_input_sanitized() {
        let m = MetricsCalculator::new(f64::INFINITY).pnls(&[f64::NAN, 1.0, f64::INFINITY]);
        assert!(m.win_rate.is_finite());
        assert!(m.sharpe_ratio.is_finite());
        assert!(m.total_pnl.is_finite());
    }

    #[test]
    fn test_forecast_accuracy() {
        let acc = ForecastAccuracy::compute(&[100.0, 200.0, 0.0], &[110.0, 190.0, 5.0]);
        assert_eq!(acc.samples, 3);
        assert!((acc.mae - 25.0 / 3.0).abs() < 1e-12);
        assert!((acc.rmse - (225.0_f64 / 3.0).sqrt()).abs() < 1e-12);
        // zero actual excluded from MAPE
        assert!((acc.mape - 7.5).abs() < 1e-12);
    }
}
