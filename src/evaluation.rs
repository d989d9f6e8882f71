//! Walk-forward evaluation of forecast models.
//!
//! The predictor is replayed over history: at every step it sees only the
//! candles before the step, and its final-horizon forecast is compared with
//! the close that actually printed `horizon` candles later. Forecasts that
//! call for a large enough move are also traded, with the outcome clipped to
//! a fixed stop and target.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, Result};
use crate::forecast::ModelSelector;
use crate::metrics::{finite_or, ForecastAccuracy, MetricsCalculator, TradeMetrics};
use crate::predictor::Predictor;
use crate::timeframe::Timeframe;
use crate::types::{validate_candles, Candle, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Candles between forecast and verification; also the step size.
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    /// Smallest predicted move, in percent, that opens a trade.
    #[serde(default = "default_min_change_pct")]
    pub min_change_pct: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_min_candles")]
    pub min_candles: usize,
    /// Share of history used only as the first forecast's input.
    #[serde(default = "default_warmup_fraction")]
    pub warmup_fraction: f64,
}

fn default_horizon() -> usize {
    5
}

fn default_min_change_pct() -> f64 {
    0.5
}

fn default_stop_loss_pct() -> f64 {
    2.0
}

fn default_take_profit_pct() -> f64 {
    4.0
}

fn default_min_candles() -> usize {
    500
}

fn default_warmup_fraction() -> f64 {
    0.2
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            min_change_pct: default_min_change_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            min_candles: default_min_candles(),
            warmup_fraction: default_warmup_fraction(),
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(AnalysisError::InvalidParameter(
                "horizon must be at least 1".to_string(),
            ));
        }
        let positive = [self.stop_loss_pct, self.take_profit_pct];
        if positive.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(AnalysisError::InvalidParameter(
                "stop_loss_pct and take_profit_pct must be positive".to_string(),
            ));
        }
        if !(self.min_change_pct.is_finite() && self.min_change_pct >= 0.0) {
            return Err(AnalysisError::InvalidParameter(
                "min_change_pct must be non-negative".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.warmup_fraction) {
            return Err(AnalysisError::InvalidParameter(
                "warmup_fraction must be in [0, 1)".to_string(),
            ));
        }
        Ok(())
    }

    /// Trade return for a move from `entry` to `exit`, clipped to the
    /// stop and target.
    pub fn clipped_pnl(&self, direction: Direction, entry: f64, exit: f64) -> f64 {
        let raw = match direction {
            Direction::Long => (exit - entry) / entry * 100.0,
            Direction::Short => (entry - exit) / entry * 100.0,
        };
        finite_or(raw, 0.0).clamp(-self.stop_loss_pct, self.take_profit_pct)
    }
}

/// Trade taken on one forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastTrade {
    pub entry_time: i64,
    pub entry_price: f64,
    pub exit_time: i64,
    pub exit_price: f64,
    pub predicted_price: f64,
    pub direction: Direction,
    pub pnl_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastEvaluation {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub model: ModelSelector,
    pub horizon: usize,
    pub total_predictions: usize,
    pub correct_predictions: usize,
    /// Percent of forecasts that called the direction of the move.
    pub directional_accuracy: f64,
    pub accuracy: ForecastAccuracy,
    pub trades: Vec<ForecastTrade>,
    pub trade_metrics: TradeMetrics,
    /// Steps where the predictor returned an error.
    pub failed_steps: usize,
    pub summary: String,
}

/// Replays a [`Predictor`] over history.
#[derive(Debug, Clone)]
pub struct ForecastBacktester {
    predictor: Predictor,
    config: EvaluationConfig,
}

impl ForecastBacktester {
    pub fn new(predictor: Predictor, config: EvaluationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { predictor, config })
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
        selector: ModelSelector,
    ) -> Result<ForecastEvaluation> {
        let horizon = self.config.horizon;
        let required = self.config.min_candles.max(self.predictor.min_candles() + horizon + 1);
        if candles.len() < required {
            return Err(AnalysisError::insufficient("forecast evaluation", required, candles.len()));
        }
        validate_candles(candles)?;
        // Unavailable models fail here rather than on every step
        self.predictor.resolve(selector)?;

        info!(
            "Evaluating {} on {} {} ({} candles, horizon {})",
            selector,
            symbol,
            timeframe,
            candles.len(),
            horizon
        );

        let n = candles.len();
        let start = ((n as f64 * self.config.warmup_fraction) as usize).max(self.predictor.min_candles());

        let mut actual = Vec::new();
        let mut predicted = Vec::new();
        let mut correct = 0;
        let mut trades = Vec::new();
        let mut failed_steps = 0;
        let mut first_error = None;

        for i in (start..n - horizon).step_by(horizon) {
            let set = match self.predictor.predict(symbol, timeframe, &candles[..i], horizon, selector) {
                Ok(set) => set,
                Err(e) => {
                    warn!("Forecast at candle {} failed: {}", i, e);
                    failed_steps += 1;
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            let Some(last) = set.predictions.last() else {
                failed_steps += 1;
                continue;
            };

            let entry = &candles[i - 1];
            let outcome = &candles[i - 1 + horizon];
            let current = set.current_price;
            let predicted_change = (last.predicted_price - current) / current * 100.0;
            let actual_change = (outcome.close - current) / current * 100.0;

            actual.push(outcome.close);
            predicted.push(last.predicted_price);
            if predicted_change * actual_change > 0.0 {
                correct += 1;
            }

            if predicted_change.abs() >= self.config.min_change_pct {
                let direction = if predicted_change > 0.0 {
                    Direction::Long
                } else {
                    Direction::Short
                };
                let pnl = self.config.clipped_pnl(direction, current, outcome.close);
                debug!("Step {}: {:?} {:+.2}% predicted, {:+.2}% realised", i, direction, predicted_change, pnl);
                trades.push(ForecastTrade {
                    entry_time: entry.open_time,
                    entry_price: current,
                    exit_time: outcome.open_time,
                    exit_price: outcome.close,
                    predicted_price: last.predicted_price,
                    direction,
                    pnl_percent: pnl,
                });
            }
        }

        if actual.is_empty() {
            return Err(first_error.unwrap_or_else(|| {
                AnalysisError::insufficient("forecast evaluation", required, candles.len())
            }));
        }

        let total = actual.len();
        let directional_accuracy = correct as f64 / total as f64 * 100.0;
        let pnls: Vec<f64> = trades.iter().map(|t| t.pnl_percent).collect();
        let trade_metrics = MetricsCalculator::for_timeframe(timeframe).pnls(&pnls);

        let summary = format!(
            "Direction: {:.1}% | Win rate: {:.1}% | Total PnL: {:+.2}% | Sharpe: {:.2}",
            directional_accuracy, trade_metrics.win_rate, trade_metrics.total_pnl, trade_metrics.sharpe_ratio
        );
        info!(
            "Evaluation complete: {} forecasts, {:.1}% directional accuracy, {} trades",
            total,
            directional_accuracy,
            trades.len()
        );

        Ok(ForecastEvaluation {
            symbol: symbol.to_string(),
            timeframe,
            model: selector,
            horizon,
            total_predictions: total,
            correct_predictions: correct,
            directional_accuracy,
            accuracy: ForecastAccuracy::compute(&actual, &predicted),
            trades,
            trade_metrics,
            failed_steps,
            summary,
        })
    }

    /// Evaluate several models on the same history. Models that cannot be
    /// evaluated are logged and left out.
    pub fn compare_models(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
        selectors: &[ModelSelector],
    ) -> Vec<ForecastEvaluation> {
        selectors
            .iter()
            .filter_map(|&selector| {
                info!("Testing model: {}", selector);
                match self.evaluate(symbol, timeframe, candles, selector) {
                    Ok(evaluation) => Some(evaluation),
                    Err(e) => {
                        warn!("Skipping {}: {}", selector, e);
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{AdapterKind, CapabilityRegistry};

    fn uptrend(n: usize) -> Vec<Candle> {
        let mut price = 100.0;
        (0..n)
            .map(|i| {
                let close = price * 1.002;
                let candle = Candle::new(i as i64 * 3_600_000, price, close * 1.001, price * 0.999, close, 5.0);
                price = close;
                candle
            })
            .collect()
    }

    fn backtester() -> ForecastBacktester {
        let predictor = Predictor::new(CapabilityRegistry::baseline_only());
        ForecastBacktester::new(predictor, EvaluationConfig::default()).unwrap()
    }

    #[test]
    fn test_baseline_follows_steady_trend() {
        let candles = uptrend(520);
        let eval = backtester()
            .evaluate("TEST", Timeframe::H1, &candles, ModelSelector::Baseline)
            .unwrap();

        assert!(eval.total_predictions > 50);
        assert_eq!(eval.failed_steps, 0);
        assert_eq!(eval.directional_accuracy, 100.0);
        assert!(!eval.trades.is_empty());
        assert!(eval.trades.iter().all(|t| t.direction == Direction::Long));
        assert_eq!(eval.trade_metrics.win_rate, 100.0);
        assert!(eval.accuracy.mape < 5.0);
    }

    #[test]
    fn test_requires_long_history() {
        let err = backtester()
            .evaluate("TEST", Timeframe::H1, &uptrend(300), ModelSelector::Baseline)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { .. }));
    }

    #[test]
    fn test_pnl_is_clipped() {
        let config = EvaluationConfig::default();
        assert_eq!(config.clipped_pnl(Direction::Long, 100.0, 90.0), -2.0);
        assert_eq!(config.clipped_pnl(Direction::Short, 100.0, 90.0), 4.0);
        assert!((config.clipped_pnl(Direction::Long, 100.0, 101.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_compare_skips_unavailable_models() {
        let candles = uptrend(520);
        let results = backtester().compare_models(
            "TEST",
            Timeframe::H1,
            &candles,
            &[ModelSelector::Baseline, ModelSelector::Adapter(AdapterKind::Arima)],
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].model, ModelSelector::Baseline);
    }

    #[test]
    fn test_invalid_config() {
        let config = EvaluationConfig {
            horizon: 0,
            ..EvaluationConfig::default()
        };
        let predictor = Predictor::new(CapabilityRegistry::baseline_only());
        assert!(ForecastBacktester::new(predictor, config).is_err());
    }
}
