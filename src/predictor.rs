//! The `predict` operation: features, trend, model dispatch and confidence.
//!
//! # Example
//!
//! ```no_run
//! use smarttrade::forecast::{CapabilityRegistry, ModelSelector};
//! use smarttrade::predictor::Predictor;
//! use smarttrade::timeframe::Timeframe;
//! # let candles: Vec<smarttrade::types::Candle> = vec![];
//!
//! let predictor = Predictor::new(CapabilityRegistry::detect());
//! let set = predictor.predict("BTCUSDT", Timeframe::H1, &candles, 12, ModelSelector::Auto)?;
//! println!("{}", set.summary);
//! # Ok::<(), smarttrade::error::AnalysisError>(())
//! ```

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::confidence::{ConfidenceConfig, ConfidenceEstimator};
use crate::error::{AnalysisError, Result};
use crate::features::{FeatureConfig, FeatureEngineer, FeatureVector};
use crate::forecast::{
    future_timestamps, holdout_accuracy, run_adapter, AdapterKind, CapabilityRegistry,
    DriftModel, DroppedMember, EnsembleCombiner, EnsembleMember, EnsembleReport, ForecastAdapter,
    ModelSelector, Prediction,
};
use crate::metrics::ForecastAccuracy;
use crate::timeframe::Timeframe;
use crate::trend::{TrendClassifier, TrendConfig};
use crate::types::{validate_candles, Candle, Trend};

/// Tunables for [`Predictor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Largest accepted forecast horizon.
    pub max_periods: usize,
    pub features: FeatureConfig,
    pub trend: TrendConfig,
    pub confidence: ConfidenceConfig,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            max_periods: 500,
            features: FeatureConfig::default(),
            trend: TrendConfig::default(),
            confidence: ConfidenceConfig::default(),
        }
    }
}

/// Forecast for one instrument and timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSet {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Model the caller asked for.
    pub requested_model: ModelSelector,
    /// Model that produced `predictions` (never `auto`).
    pub model_used: ModelSelector,
    pub current_price: f64,
    pub predictions: Vec<Prediction>,
    pub trend: Trend,
    pub trend_strength: f64,
    /// Held-out accuracy per model that ran.
    pub metrics: BTreeMap<String, ForecastAccuracy>,
    pub summary: String,
    /// Set when fewer models ran than were requested.
    pub degraded: bool,
    pub ensemble: Option<EnsembleReport>,
}

impl PredictionSet {
    /// Percent change from the current price to the final prediction.
    pub fn expected_change_pct(&self) -> f64 {
        match self.predictions.last() {
            Some(last) if self.current_price > 0.0 => {
                (last.predicted_price - self.current_price) / self.current_price * 100.0
            }
            _ => 0.0,
        }
    }
}

struct ModelOutcome {
    model_used: ModelSelector,
    predictions: Vec<Prediction>,
    metrics: BTreeMap<String, ForecastAccuracy>,
    ensemble: Option<EnsembleReport>,
    degraded: bool,
}

/// Produces [`PredictionSet`]s with the adapters of an injected registry.
#[derive(Debug, Clone)]
pub struct Predictor {
    registry: CapabilityRegistry,
    engineer: FeatureEngineer,
    classifier: TrendClassifier,
    estimator: ConfidenceEstimator,
    baseline: DriftModel,
    combiner: EnsembleCombiner,
    max_periods: usize,
}

impl Predictor {
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self::with_config(registry, PredictorConfig::default())
    }

    pub fn with_config(registry: CapabilityRegistry, config: PredictorConfig) -> Self {
        Self {
            registry,
            baseline: DriftModel::from_feature_config(&config.features),
            engineer: FeatureEngineer::new(config.features),
            classifier: TrendClassifier::new(config.trend),
            estimator: ConfidenceEstimator::new(config.confidence),
            combiner: EnsembleCombiner::new(),
            max_periods: config.max_periods,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Minimum history accepted by [`predict`](Self::predict).
    pub fn min_candles(&self) -> usize {
        self.engineer.min_candles()
    }

    /// Map a requested selector onto what the registry can serve.
    pub fn resolve(&self, selector: ModelSelector) -> Result<ModelSelector> {
        match selector {
            ModelSelector::Auto if self.registry.prefers_ensemble() => Ok(ModelSelector::Ensemble),
            ModelSelector::Auto | ModelSelector::Baseline => Ok(ModelSelector::Baseline),
            ModelSelector::Adapter(kind) if self.registry.is_available(kind) => Ok(selector),
            ModelSelector::Adapter(kind) => Err(AnalysisError::ModelUnavailable(format!(
                "{} is not enabled in this build",
                kind
            ))),
            // Served over whatever adapters exist; `predict` falls back to
            // the baseline when none survive
            ModelSelector::Ensemble => Ok(selector),
        }
    }

    /// Forecast `periods` candles past the end of `candles`.
    pub fn predict(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
        periods: usize,
        selector: ModelSelector,
    ) -> Result<PredictionSet> {
        if periods == 0 || periods > self.max_periods {
            return Err(AnalysisError::InvalidParameter(format!(
                "periods must be between 1 and {}, got {}",
                self.max_periods, periods
            )));
        }
        validate_candles(candles)?;
        let latest = self.engineer.latest(candles)?;
        let resolved = self.resolve(selector)?;

        info!(
            "Predicting {} {} for {} periods with {} ({} candles)",
            symbol,
            timeframe,
            periods,
            resolved,
            candles.len()
        );

        let (trend, trend_strength) = self.classifier.classify(&latest);
        let timestamps = future_timestamps(candles, timeframe, periods);

        let outcome = match resolved {
            ModelSelector::Adapter(kind) => self.run_single(kind, candles, &timestamps)?,
            ModelSelector::Ensemble => match self.run_ensemble(candles, &timestamps) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Ensemble failed ({}), falling back to baseline", e);
                    let mut outcome = self.run_baseline(candles, &latest, &timestamps);
                    outcome.degraded = true;
                    outcome
                }
            },
            _ => self.run_baseline(candles, &latest, &timestamps),
        };

        let mut set = PredictionSet {
            symbol: symbol.to_string(),
            timeframe,
            requested_model: selector,
            model_used: outcome.model_used,
            current_price: latest.close,
            predictions: outcome.predictions,
            trend,
            trend_strength,
            metrics: outcome.metrics,
            summary: String::new(),
            degraded: outcome.degraded,
            ensemble: outcome.ensemble,
        };
        set.summary = summarize(&set);
        Ok(set)
    }

    fn run_baseline(
        &self,
        candles: &[Candle],
        latest: &FeatureVector,
        timestamps: &[i64],
    ) -> ModelOutcome {
        let predictions = self.baseline.forecast(latest, timestamps, &self.estimator);

        let mut metrics = BTreeMap::new();
        let accuracy = holdout_accuracy(candles, timestamps.len(), |history, n| {
            let latest = self.engineer.latest(history)?;
            Ok(self.baseline.forecast_prices(&latest, n))
        });
        if let Some(accuracy) = accuracy {
            metrics.insert(ModelSelector::Baseline.to_string(), accuracy);
        }

        ModelOutcome {
            model_used: ModelSelector::Baseline,
            predictions,
            metrics,
            ensemble: None,
            degraded: false,
        }
    }

    fn adapter_accuracy(
        &self,
        adapter: &dyn ForecastAdapter,
        candles: &[Candle],
        periods: usize,
    ) -> Option<ForecastAccuracy> {
        holdout_accuracy(candles, periods, |history, n| {
            // Timestamps only label the steps here
            let ts: Vec<i64> = (1..=n as i64).collect();
            let predictions = run_adapter(adapter, history, &ts, &self.estimator)?;
            Ok(predictions.iter().map(|p| p.predicted_price).collect())
        })
    }

    fn run_single(
        &self,
        kind: AdapterKind,
        candles: &[Candle],
        timestamps: &[i64],
    ) -> Result<ModelOutcome> {
        let adapter = self.registry.get(kind).ok_or_else(|| {
            AnalysisError::ModelUnavailable(format!("{} is not registered", kind))
        })?;
        let predictions = run_adapter(adapter.as_ref(), candles, timestamps, &self.estimator)?;

        let mut metrics = BTreeMap::new();
        if let Some(accuracy) = self.adapter_accuracy(adapter.as_ref(), candles, timestamps.len()) {
            metrics.insert(kind.to_string(), accuracy);
        }

        Ok(ModelOutcome {
            model_used: ModelSelector::Adapter(kind),
            predictions,
            metrics,
            ensemble: None,
            degraded: false,
        })
    }

    fn run_ensemble(&self, candles: &[Candle], timestamps: &[i64]) -> Result<ModelOutcome> {
        let adapters: Vec<_> = self.registry.adapters().cloned().collect();

        let results: Vec<(AdapterKind, Result<Vec<Prediction>>, Option<ForecastAccuracy>)> =
            adapters
                .par_iter()
                .map(|adapter| {
                    let kind = adapter.kind();
                    let forecast =
                        run_adapter(adapter.as_ref(), candles, timestamps, &self.estimator);
                    let accuracy = forecast.as_ref().ok().and_then(|_| {
                        self.adapter_accuracy(adapter.as_ref(), candles, timestamps.len())
                    });
                    (kind, forecast, accuracy)
                })
                .collect();

        let mut members = Vec::new();
        let mut dropped = Vec::new();
        let mut metrics = BTreeMap::new();
        for (kind, forecast, accuracy) in results {
            match forecast {
                Ok(predictions) => {
                    debug!("{} produced {} steps", kind, predictions.len());
                    members.push(EnsembleMember { kind, predictions });
                    if let Some(accuracy) = accuracy {
                        metrics.insert(kind.to_string(), accuracy);
                    }
                }
                Err(e) => {
                    warn!("Adapter {} failed, excluding it from the ensemble: {}", kind, e);
                    dropped.push(DroppedMember {
                        model: kind,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let (mut predictions, report) = self.combiner.combine(members, dropped)?;
        self.estimator.enforce(&mut predictions);

        Ok(ModelOutcome {
            model_used: ModelSelector::Ensemble,
            predictions,
            metrics,
            degraded: !report.dropped.is_empty(),
            ensemble: Some(report),
        })
    }
}

fn summarize(set: &PredictionSet) -> String {
    let mut summary = format!(
        "{} trend (strength {:.1}%).",
        set.trend.to_string().to_uppercase(),
        set.trend_strength
    );
    if let Some(last) = set.predictions.last() {
        summary.push_str(&format!(
            " {} forecast over {} periods: {:+.2}% to {:.4} (confidence {:.1}%).",
            set.model_used,
            set.predictions.len(),
            set.expected_change_pct(),
            last.predicted_price,
            last.confidence
        ));
    }
    if set.degraded {
        match &set.ensemble {
            Some(report) if !report.dropped.is_empty() => {
                let names: Vec<String> = report.dropped.iter().map(|d| d.model.to_string()).collect();
                summary.push_str(&format!(" Degraded: {} unavailable.", names.join(", ")));
            }
            _ => summary.push_str(&format!(
                " Degraded: {} requested, {} used.",
                set.requested_model, set.model_used
            )),
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{FittedForecast, HoltAdapter, LinearTrendAdapter, PointForecast};

    fn trending_candles(n: usize, start: f64, step: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = start + step * i as f64 + (i as f64 * 0.5).sin() * 0.2;
                let open = close - step;
                Candle::new(
                    1_700_000_000_000 + i as i64 * 3_600_000,
                    open,
                    open.max(close) + 0.3,
                    open.min(close) - 0.3,
                    close,
                    1_000.0,
                )
            })
            .collect()
    }

    fn flat_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(i as i64 * 3_600_000, 100.0, 100.0, 100.0, 100.0, 10.0))
            .collect()
    }

    /// Adapter that fails on every fit.
    struct FailingAdapter(AdapterKind);

    impl ForecastAdapter for FailingAdapter {
        fn kind(&self) -> AdapterKind {
            self.0
        }
        fn min_history(&self) -> usize {
            1
        }
        fn fit(&self, _history: &[Candle]) -> Result<Box<dyn FittedForecast>> {
            Err(AnalysisError::ModelUnavailable("engine offline".into()))
        }
    }

    /// Adapter that repeats the last close with a fixed confidence.
    struct ConstantAdapter(AdapterKind, f64);

    struct ConstantFit(f64, f64);

    impl FittedForecast for ConstantFit {
        fn forecast(&self, periods: usize) -> Result<Vec<PointForecast>> {
            Ok(vec![
                PointForecast {
                    price: self.0,
                    lower: self.0 * 0.99,
                    upper: self.0 * 1.01,
                    confidence: Some(self.1),
                };
                periods
            ])
        }
    }

    impl ForecastAdapter for ConstantAdapter {
        fn kind(&self) -> AdapterKind {
            self.0
        }
        fn min_history(&self) -> usize {
            1
        }
        fn fit(&self, history: &[Candle]) -> Result<Box<dyn FittedForecast>> {
            Ok(Box::new(ConstantFit(history[history.len() - 1].close, self.1)))
        }
    }

    #[test]
    fn test_flat_series_baseline() {
        let predictor = Predictor::new(CapabilityRegistry::baseline_only());
        let set = predictor
            .predict("FLAT", Timeframe::H1, &flat_candles(150), 5, ModelSelector::Auto)
            .unwrap();

        assert_eq!(set.model_used, ModelSelector::Baseline);
        assert_eq!(set.trend, Trend::Neutral);
        assert_eq!(set.predictions.len(), 5);
        for p in &set.predictions {
            assert!((p.predicted_price - 100.0).abs() < 1e-9);
        }
        for pair in set.predictions.windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
            assert!(pair[1].confidence < pair[0].confidence);
        }
        assert!(!set.degraded);
    }

    #[test]
    fn test_insufficient_history() {
        let predictor = Predictor::new(CapabilityRegistry::baseline_only());
        let err = predictor
            .predict("X", Timeframe::H1, &flat_candles(99), 5, ModelSelector::Baseline)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { .. }));
    }

    #[test]
    fn test_invalid_periods() {
        let predictor = Predictor::new(CapabilityRegistry::baseline_only());
        let candles = flat_candles(120);
        for periods in [0, 501] {
            let err = predictor
                .predict("X", Timeframe::H1, &candles, periods, ModelSelector::Baseline)
                .unwrap_err();
            assert!(matches!(err, AnalysisError::InvalidParameter(_)));
        }
    }

    #[test]
    fn test_unavailable_adapter() {
        let predictor = Predictor::new(CapabilityRegistry::baseline_only());
        let err = predictor
            .predict(
                "X",
                Timeframe::H1,
                &flat_candles(120),
                3,
                ModelSelector::Adapter(AdapterKind::Arima),
            )
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ModelUnavailable(_)));
    }

    #[test]
    fn test_ensemble_without_adapters_uses_baseline() {
        let predictor = Predictor::new(CapabilityRegistry::baseline_only());
        let set = predictor
            .predict("X", Timeframe::H1, &flat_candles(120), 3, ModelSelector::Ensemble)
            .unwrap();

        assert_eq!(set.requested_model, ModelSelector::Ensemble);
        assert_eq!(set.model_used, ModelSelector::Baseline);
        assert!(set.degraded);
        assert_eq!(set.predictions.len(), 3);
        assert!(set.summary.contains("Degraded"));
    }

    #[test]
    fn test_ensemble_with_single_adapter() {
        let registry = CapabilityRegistry::builder().with(HoltAdapter::default()).build();
        let predictor = Predictor::new(registry);
        let candles = trending_candles(200, 100.0, 0.5);

        let set = predictor
            .predict("UP", Timeframe::H1, &candles, 6, ModelSelector::Ensemble)
            .unwrap();
        assert_eq!(set.model_used, ModelSelector::Ensemble);
        assert!(!set.degraded);
        let report = set.ensemble.as_ref().unwrap();
        assert_eq!(report.members(), vec![AdapterKind::Holt]);
        assert!((report.weights[0].weight - 1.0).abs() < 1e-9);

        // auto still needs two adapters before it prefers the ensemble
        let auto = predictor
            .predict("UP", Timeframe::H1, &candles, 6, ModelSelector::Auto)
            .unwrap();
        assert_eq!(auto.model_used, ModelSelector::Baseline);
    }

    #[test]
    fn test_auto_uses_ensemble() {
        let registry = CapabilityRegistry::builder()
            .with(HoltAdapter::default())
            .with(LinearTrendAdapter::default())
            .build();
        let predictor = Predictor::new(registry);
        let set = predictor
            .predict("UP", Timeframe::H1, &trending_candles(200, 100.0, 0.5), 6, ModelSelector::Auto)
            .unwrap();

        assert_eq!(set.model_used, ModelSelector::Ensemble);
        assert_eq!(set.trend, Trend::Bullish);
        let report = set.ensemble.as_ref().unwrap();
        let total: f64 = report.weights.iter().map(|w| w.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(set.metrics.contains_key("holt"));
        assert!(set.predictions.last().unwrap().predicted_price > set.current_price);
        for p in &set.predictions {
            assert!(p.lower_bound <= p.predicted_price && p.predicted_price <= p.upper_bound);
            assert!((0.0..=100.0).contains(&p.confidence));
        }
    }

    #[test]
    fn test_failing_member_degrades_ensemble() {
        let registry = CapabilityRegistry::builder()
            .with(FailingAdapter(AdapterKind::Arima))
            .with(ConstantAdapter(AdapterKind::Holt, 60.0))
            .with(ConstantAdapter(AdapterKind::LinearTrend, 40.0))
            .build();
        let predictor = Predictor::new(registry);
        let set = predictor
            .predict("X", Timeframe::H1, &flat_candles(150), 4, ModelSelector::Ensemble)
            .unwrap();

        assert!(set.degraded);
        let report = set.ensemble.as_ref().unwrap();
        assert_eq!(report.members(), vec![AdapterKind::Holt, AdapterKind::LinearTrend]);
        assert_eq!(report.dropped[0].model, AdapterKind::Arima);
        assert!((report.weights[0].weight - 0.6).abs() < 1e-9);
        assert!(set.summary.contains("Degraded"));
    }

    #[test]
    fn test_falls_back_when_all_members_fail() {
        let registry = CapabilityRegistry::builder()
            .with(FailingAdapter(AdapterKind::Arima))
            .with(FailingAdapter(AdapterKind::Holt))
            .build();
        let predictor = Predictor::new(registry);
        let candles = flat_candles(150);

        let set = predictor
            .predict("X", Timeframe::H1, &candles, 3, ModelSelector::Auto)
            .unwrap();
        assert_eq!(set.model_used, ModelSelector::Baseline);
        assert!(set.degraded);

        let set = predictor
            .predict("X", Timeframe::H1, &candles, 3, ModelSelector::Ensemble)
            .unwrap();
        assert_eq!(set.model_used, ModelSelector::Baseline);
        assert!(set.degraded);
    }

    #[test]
    fn test_rejects_unordered_candles() {
        let mut candles = flat_candles(120);
        candles.swap(10, 11);
        let predictor = Predictor::new(CapabilityRegistry::baseline_only());
        let err = predictor
            .predict("X", Timeframe::H1, &candles, 3, ModelSelector::Baseline)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidData(_)));
    }
}
