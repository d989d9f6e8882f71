//! Forecast models.
//!
//! - [`DriftModel`]: always-available baseline extrapolating moving-average drift
//! - [`ArimaAdapter`]: autoregressive model on first differences
//! - [`HoltAdapter`]: Holt linear (double exponential) smoothing
//! - [`LinearTrendAdapter`]: log-price linear regression
//!
//! External models plug in through [`ForecastAdapter`]; which adapters exist
//! at runtime is decided once by a [`CapabilityRegistry`]. Several adapter
//! outputs are merged by the [`EnsembleCombiner`].

mod arima;
mod baseline;
mod ensemble;
mod holt;
mod linear_trend;
mod registry;

pub use arima::ArimaAdapter;
pub use baseline::DriftModel;
pub use ensemble::{DroppedMember, EnsembleCombiner, EnsembleMember, EnsembleReport, MemberWeight};
pub use holt::HoltAdapter;
pub use linear_trend::LinearTrendAdapter;
pub use registry::{CapabilityRegistry, RegistryBuilder};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::confidence::ConfidenceEstimator;
use crate::error::{AnalysisError, Result};
use crate::metrics::ForecastAccuracy;
use crate::timeframe::Timeframe;
use crate::types::{closes, Candle};

/// One forecast step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Open time of the forecast candle (ms).
    pub timestamp: i64,
    pub predicted_price: f64,
    /// Confidence in `[0, 100]`.
    pub confidence: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Raw output of a fitted model for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointForecast {
    pub price: f64,
    pub lower: f64,
    pub upper: f64,
    /// Model-native confidence, if the model reports one.
    pub confidence: Option<f64>,
}

/// Forecast adapters known to the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Arima,
    Holt,
    LinearTrend,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 3] = [AdapterKind::Arima, AdapterKind::Holt, AdapterKind::LinearTrend];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::Arima => "arima",
            AdapterKind::Holt => "holt",
            AdapterKind::LinearTrend => "linear_trend",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AdapterKind::Arima => "AR(5) on first differences, least-squares fit",
            AdapterKind::Holt => "Holt linear exponential smoothing",
            AdapterKind::LinearTrend => "Log-price linear regression trend",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which forecasting path a caller asks for.
///
/// As the `model_used` of a [`PredictionSet`](crate::predictor::PredictionSet)
/// it is never `Auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelSelector {
    #[default]
    Auto,
    Baseline,
    Adapter(AdapterKind),
    Ensemble,
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSelector::Auto => write!(f, "auto"),
            ModelSelector::Baseline => write!(f, "baseline"),
            ModelSelector::Adapter(kind) => write!(f, "{}", kind),
            ModelSelector::Ensemble => write!(f, "ensemble"),
        }
    }
}

impl FromStr for ModelSelector {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(ModelSelector::Auto),
            "baseline" | "simple_ma" | "drift" => Ok(ModelSelector::Baseline),
            "ensemble" => Ok(ModelSelector::Ensemble),
            "arima" => Ok(ModelSelector::Adapter(AdapterKind::Arima)),
            "holt" | "smoothing" => Ok(ModelSelector::Adapter(AdapterKind::Holt)),
            "linear_trend" | "linear" | "trend" => {
                Ok(ModelSelector::Adapter(AdapterKind::LinearTrend))
            }
            other => Err(AnalysisError::InvalidParameter(format!(
                "unknown model '{}' (expected auto, baseline, arima, holt, linear_trend, ensemble)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ModelSelector {
    type Error = AnalysisError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ModelSelector> for String {
    fn from(selector: ModelSelector) -> Self {
        selector.to_string()
    }
}

/// A forecasting engine behind the adapter contract.
pub trait ForecastAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    /// Minimum number of candles `fit` accepts.
    fn min_history(&self) -> usize;

    /// Fit on ordered history and return the fitted model.
    fn fit(&self, history: &[Candle]) -> Result<Box<dyn FittedForecast>>;
}

/// A fitted model able to project forward.
pub trait FittedForecast {
    /// Forecast `periods` steps past the end of the fitted history.
    fn forecast(&self, periods: usize) -> Result<Vec<PointForecast>>;
}

/// Open times of the next `periods` candles after `candles`.
///
/// The step is inferred from the last two candles, falling back to the
/// nominal timeframe duration.
pub fn future_timestamps(candles: &[Candle], timeframe: Timeframe, periods: usize) -> Vec<i64> {
    let Some(last) = candles.last() else {
        return Vec::new();
    };
    let inferred = match candles.len() {
        n if n >= 2 => last.open_time - candles[n - 2].open_time,
        _ => 0,
    };
    let step = if inferred > 0 { inferred } else { timeframe.millis() };
    (1..=periods as i64).map(|k| last.open_time + k * step).collect()
}

/// Fit an adapter on `history` and turn its output into predictions.
pub fn run_adapter(
    adapter: &dyn ForecastAdapter,
    history: &[Candle],
    timestamps: &[i64],
    estimator: &ConfidenceEstimator,
) -> Result<Vec<Prediction>> {
    let required = adapter.min_history();
    if history.len() < required {
        return Err(AnalysisError::insufficient(
            format!("{} forecast", adapter.kind()),
            required,
            history.len(),
        ));
    }

    let fitted = adapter.fit(history)?;
    let points = fitted.forecast(timestamps.len())?;
    if points.len() != timestamps.len() {
        return Err(AnalysisError::ModelUnavailable(format!(
            "{} returned {} steps, expected {}",
            adapter.kind(),
            points.len(),
            timestamps.len()
        )));
    }
    if points.iter().any(|p| !p.price.is_finite() || p.price <= 0.0) {
        return Err(AnalysisError::ModelUnavailable(format!(
            "{} produced a non-positive or non-finite price",
            adapter.kind()
        )));
    }

    let mut predictions: Vec<Prediction> = points
        .iter()
        .zip(timestamps)
        .map(|(p, &timestamp)| Prediction {
            timestamp,
            predicted_price: p.price,
            confidence: p
                .confidence
                .unwrap_or_else(|| estimator.from_interval(p.price, p.lower, p.upper)),
            lower_bound: p.lower,
            upper_bound: p.upper,
        })
        .collect();
    estimator.enforce(&mut predictions);
    Ok(predictions)
}

/// Accuracy of a forecasting routine on a held-out tail of `candles`.
///
/// The tail holds `min(periods, len / 5)` candles (at least one). Returns
/// `None` when the routine cannot run on the shortened history.
pub fn holdout_accuracy<F>(candles: &[Candle], periods: usize, forecast: F) -> Option<ForecastAccuracy>
where
    F: Fn(&[Candle], usize) -> Result<Vec<f64>>,
{
    let holdout = periods.min(candles.len() / 5).max(1);
    if candles.len() <= holdout {
        return None;
    }
    let split = candles.len() - holdout;
    let predicted = forecast(&candles[..split], holdout).ok()?;
    let actual = closes(&candles[split..]);
    if predicted.len() != actual.len() {
        return None;
    }
    Some(ForecastAccuracy::compute(&actual, &predicted))
}

/// Closing prices, newest last, limited to the most recent `max_len`.
pub(crate) fn tail_closes(history: &[Candle], max_len: usize) -> Vec<f64> {
    let start = history.len().saturating_sub(max_len);
    closes(&history[start..])
}

/// Two-sided 95% normal quantile used by the built-in adapters.
pub(crate) const Z_95: f64 = 1.96;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parsing() {
        assert_eq!("auto".parse::<ModelSelector>().unwrap(), ModelSelector::Auto);
        assert_eq!(
            "linear-trend".parse::<ModelSelector>().unwrap(),
            ModelSelector::Adapter(AdapterKind::LinearTrend)
        );
        assert_eq!("ENSEMBLE".parse::<ModelSelector>().unwrap(), ModelSelector::Ensemble);
        assert!("prophet".parse::<ModelSelector>().is_err());

        for kind in AdapterKind::ALL {
            let selector = ModelSelector::Adapter(kind);
            assert_eq!(selector.to_string().parse::<ModelSelector>().unwrap(), selector);
        }
    }

    #[test]
    fn test_future_timestamps() {
        let candles = vec![
            Candle::new(0, 1.0, 1.0, 1.0, 1.0, 1.0),
            Candle::new(300_000, 1.0, 1.0, 1.0, 1.0, 1.0),
        ];
        let ts = future_timestamps(&candles, Timeframe::H1, 3);
        assert_eq!(ts, vec![600_000, 900_000, 1_200_000]);

        let single = vec![Candle::new(0, 1.0, 1.0, 1.0, 1.0, 1.0)];
        let ts = future_timestamps(&single, Timeframe::H1, 2);
        assert_eq!(ts, vec![3_600_000, 7_200_000]);
    }

    #[test]
    fn test_holdout_accuracy_perfect_model() {
        let candles: Vec<Candle> = (0..50)
            .map(|i| {
                let p = 100.0 + i as f64;
                Candle::new(i * 60_000, p, p, p, p, 1.0)
            })
            .collect();
        // A model that extends the +1 per candle line exactly
        let accuracy = holdout_accuracy(&candles, 5, |history, n| {
            let last = history.last().unwrap().close;
            Ok((1..=n).map(|k| last + k as f64).collect())
        })
        .unwrap();
        assert!(accuracy.mae.abs() < 1e-9);
        assert!(accuracy.rmse.abs() < 1e-9);
    }
}
