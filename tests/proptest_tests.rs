//! Property-based tests using proptest for fuzzing and invariant testing.
//!
//! These tests verify that:
//! 1. Candle validation accepts every well-formed random series
//! 2. Features computed at a candle never depend on later candles
//! 3. Forecast confidence stays in range and never rises with the horizon
//! 4. Backtest trades never overlap and their statistics stay finite
//! 5. Ranking scores stay within their documented bounds

use proptest::prelude::*;

use smarttrade::backtest::{BacktestConfig, BacktestSimulator};
use smarttrade::confidence::{ConfidenceConfig, ConfidenceEstimator};
use smarttrade::features::FeatureEngineer;
use smarttrade::forecast::{CapabilityRegistry, ModelSelector};
use smarttrade::indicators::IndicatorKind;
use smarttrade::metrics::{max_drawdown, MetricsCalculator};
use smarttrade::predictor::Predictor;
use smarttrade::ranking::{composite_score, respect_rate, IndicatorRanking};
use smarttrade::timeframe::Timeframe;
use smarttrade::types::{validate_candles, Candle};

// ============================================================================
// Generators
// ============================================================================

/// Random walk of valid candles: each step moves the close by up to +/-3%
/// and wicks extend up to 1% past the body.
fn candle_series(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<Candle>> {
    (
        10.0..1000.0f64,
        prop::collection::vec((-0.03..0.03f64, 0.0..0.01f64, 0.0..0.01f64), min_len..max_len),
    )
        .prop_map(|(start, steps)| {
            let mut open = start;
            steps
                .into_iter()
                .enumerate()
                .map(|(i, (change, up, down))| {
                    let close = open * (1.0 + change);
                    let high = open.max(close) * (1.0 + up);
                    let low = open.min(close) * (1.0 - down);
                    let candle = Candle::new(i as i64 * 3_600_000, open, high, low, close, 100.0);
                    open = close;
                    candle
                })
                .collect()
        })
}

// ============================================================================
// Data Property Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_generated_series_are_valid(candles in candle_series(1, 200)) {
        prop_assert!(validate_candles(&candles).is_ok());
    }

    #[test]
    fn prop_features_use_only_the_past(
        candles in candle_series(110, 180),
        cut in 0usize..10,
    ) {
        let engineer = FeatureEngineer::default();
        let full = engineer.extract(&candles).unwrap();
        let k = candles.len() - cut;
        let prefix = engineer.latest(&candles[..k]).unwrap();

        let same = full.iter().find(|v| v.index == k - 1).unwrap();
        prop_assert_eq!(same.open_time, prefix.open_time);
        prop_assert!((same.ma25 - prefix.ma25).abs() < 1e-9);
        prop_assert!((same.rsi - prefix.rsi).abs() < 1e-9);
        prop_assert!((same.volatility - prefix.volatility).abs() < 1e-9);
        prop_assert!((same.bb_upper - prefix.bb_upper).abs() < 1e-9);
    }
}

// ============================================================================
// Forecast Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_confidence_non_increasing_and_bounded(
        candles in candle_series(120, 200),
        periods in 1usize..30,
    ) {
        let predictor = Predictor::new(CapabilityRegistry::detect());
        let set = predictor
            .predict("PROP", Timeframe::H1, &candles, periods, ModelSelector::Auto)
            .unwrap();

        prop_assert_eq!(set.predictions.len(), periods);
        let mut previous = 100.0;
        for p in &set.predictions {
            prop_assert!((0.0..=100.0).contains(&p.confidence));
            prop_assert!(p.confidence <= previous);
            previous = p.confidence;
            prop_assert!(p.lower_bound <= p.predicted_price);
            prop_assert!(p.predicted_price <= p.upper_bound);
        }
    }

    #[test]
    fn prop_interval_contains_price(
        price in 0.01..100_000.0f64,
        volatility in 0.0..0.5f64,
        step in 1usize..100,
    ) {
        let estimator = ConfidenceEstimator::new(ConfidenceConfig::default());
        let (lower, upper) = estimator.interval(price, volatility, step);
        prop_assert!(lower >= 0.0);
        prop_assert!(lower <= price && price <= upper);

        let confidence = estimator.step_confidence(step, volatility);
        prop_assert!((0.0..=100.0).contains(&confidence));
    }
}

// ============================================================================
// Backtest Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_trades_never_overlap(
        candles in candle_series(60, 250),
        risk_pct in 0.2..5.0f64,
        risk_reward in 0.5..4.0f64,
        kind_idx in 0usize..6,
    ) {
        let kind = IndicatorKind::ALL[kind_idx];
        let indicator = kind.build();
        prop_assume!(candles.len() > indicator.warmup_period());

        let config = BacktestConfig { risk_pct, risk_reward, max_hold_candles: None };
        let simulator = BacktestSimulator::new(config).unwrap();
        let result = simulator
            .run("PROP", Timeframe::H1, &candles, indicator.as_ref())
            .unwrap();

        for pair in result.trades.windows(2) {
            prop_assert!(pair[1].entry_time > pair[0].exit_time);
        }
        for trade in &result.trades {
            prop_assert!(trade.exit_time > trade.entry_time);
            prop_assert!(trade.pnl_percent.is_finite());
            prop_assert!(trade.candles_held >= 1);
        }
        prop_assert!((0.0..=100.0).contains(&result.win_rate));
        prop_assert!(result.profit_factor.is_finite());
        prop_assert!(result.sharpe_ratio.is_finite());
    }

    #[test]
    fn prop_trade_metrics_finite(pnls in prop::collection::vec(-50.0..50.0f64, 0..100)) {
        let metrics = MetricsCalculator::for_timeframe(Timeframe::M15).pnls(&pnls);
        prop_assert_eq!(metrics.total_trades, pnls.len());
        prop_assert!(metrics.win_rate.is_finite());
        prop_assert!(metrics.profit_factor.is_finite() && metrics.profit_factor >= 0.0);
        prop_assert!(metrics.sharpe_ratio.is_finite());
        prop_assert!(metrics.max_drawdown >= 0.0);
        prop_assert_eq!(metrics.max_drawdown, max_drawdown(&pnls));
    }
}

// ============================================================================
// Ranking Property Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_composite_score_bounded(
        win_rate in -10.0..110.0f64,
        profit_factor in 0.0..1000.0f64,
        total_trades in 0usize..500,
        max_dd in 0.0..200.0f64,
    ) {
        let score = composite_score(win_rate, profit_factor, total_trades, max_dd);
        prop_assert!((0.0..=100.0).contains(&score));
        if total_trades == 0 {
            prop_assert_eq!(score, 0.0);
        }
    }

    #[test]
    fn prop_respect_rate_between_extremes(
        rows in prop::collection::vec((0.0..100.0f64, 0.0..100.0f64), 1..8),
    ) {
        let rankings: Vec<IndicatorRanking> = rows
            .iter()
            .enumerate()
            .map(|(i, &(win_rate, score))| IndicatorRanking {
                indicator_name: format!("I{}", i),
                timeframe: Timeframe::H1,
                win_rate,
                total_trades: 10,
                profit_factor: 1.0,
                avg_win: 1.0,
                avg_loss: -1.0,
                max_drawdown: 0.0,
                composite_score: score,
                confidence_level: smarttrade::ranking::ConfidenceLevel::from_score(score),
            })
            .collect();

        let rate = respect_rate(&rankings);
        let min = rows.iter().map(|r| r.0).fold(f64::INFINITY, f64::min);
        let max = rows.iter().map(|r| r.0).fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(rate >= min - 1e-9 && rate <= max + 1e-9);
    }
}
