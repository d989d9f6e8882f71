//! Multi-timeframe ranking.
//!
//! Every (timeframe, indicator) pair is backtested, scored with a composite
//! reliability score, and rolled up into a per-timeframe "respect rate": the
//! score-weighted win rate of all indicators on that timeframe. The timeframe
//! that price respects most is the one to trade.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backtest::{BacktestConfig, BacktestResult, BacktestSimulator};
use crate::error::{AnalysisError, Result};
use crate::indicator::Indicator;
use crate::indicators::IndicatorKind;
use crate::metrics::finite_or;
use crate::provider::CandleProvider;
use crate::timeframe::Timeframe;
use crate::types::Candle;

/// Composite reliability score in [0, 100].
///
/// Weights: 40% win rate, 30% profit factor (capped at 2), 15% trade count
/// (saturating at 10 trades), 15% drawdown (zero at 50 points). An indicator
/// without trades scores 0.
pub fn composite_score(win_rate: f64, profit_factor: f64, total_trades: usize, max_drawdown: f64) -> f64 {
    if total_trades == 0 {
        return 0.0;
    }
    let win = finite_or(win_rate, 0.0).clamp(0.0, 100.0) / 100.0;
    let pf = finite_or(profit_factor, 0.0).clamp(0.0, 2.0) / 2.0;
    let trades = (total_trades as f64 / 10.0).min(1.0);
    let drawdown = (1.0 - finite_or(max_drawdown, 0.0) / 50.0).max(0.0);
    ((0.40 * win + 0.30 * pf + 0.15 * trades + 0.15 * drawdown) * 100.0).clamp(0.0, 100.0)
}

/// Confidence bucket of a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 80.0 => ConfidenceLevel::VeryHigh,
            s if s >= 60.0 => ConfidenceLevel::High,
            s if s >= 40.0 => ConfidenceLevel::Medium,
            s if s >= 20.0 => ConfidenceLevel::Low,
            _ => ConfidenceLevel::VeryLow,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryLow => "very_low",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
            ConfidenceLevel::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quality bucket of a respect rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Quality {
    pub fn from_respect_rate(rate: f64) -> Self {
        match rate {
            r if r >= 70.0 => Quality::Excellent,
            r if r >= 50.0 => Quality::Good,
            r if r >= 30.0 => Quality::Fair,
            _ => Quality::Poor,
        }
    }

    /// One-line trading advice for a timeframe with this respect rate.
    pub fn recommendation(&self, rate: f64) -> String {
        match self {
            Quality::Excellent => format!("Excellent timeframe for trading: high respect rate ({:.1}%)", rate),
            Quality::Good => format!("Good timeframe for trading: moderate respect rate ({:.1}%)", rate),
            Quality::Fair => format!("Fair timeframe: low respect rate ({:.1}%)", rate),
            Quality::Poor => format!("Not recommended: poor respect rate ({:.1}%)", rate),
        }
    }
}

/// Scored backtest of one indicator on one timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRanking {
    pub indicator_name: String,
    pub timeframe: Timeframe,
    pub win_rate: f64,
    pub total_trades: usize,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub max_drawdown: f64,
    pub composite_score: f64,
    pub confidence_level: ConfidenceLevel,
}

impl IndicatorRanking {
    pub fn from_result(result: &BacktestResult) -> Self {
        let composite = composite_score(
            result.win_rate,
            result.profit_factor,
            result.total_trades,
            result.max_drawdown,
        );
        Self {
            indicator_name: result.indicator_name.clone(),
            timeframe: result.timeframe,
            win_rate: finite_or(result.win_rate, 0.0),
            total_trades: result.total_trades,
            profit_factor: finite_or(result.profit_factor, 0.0),
            avg_win: finite_or(result.avg_win, 0.0),
            avg_loss: finite_or(result.avg_loss, 0.0),
            max_drawdown: finite_or(result.max_drawdown, 0.0),
            composite_score: composite,
            confidence_level: ConfidenceLevel::from_score(composite),
        }
    }
}

/// Score-weighted mean win rate; a plain mean when every score is zero.
pub fn respect_rate(rankings: &[IndicatorRanking]) -> f64 {
    if rankings.is_empty() {
        return 0.0;
    }
    let total_weight: f64 = rankings.iter().map(|r| r.composite_score).sum();
    let rate = if total_weight > 0.0 {
        rankings
            .iter()
            .map(|r| r.win_rate * r.composite_score)
            .sum::<f64>()
            / total_weight
    } else {
        rankings.iter().map(|r| r.win_rate).sum::<f64>() / rankings.len() as f64
    };
    finite_or(rate, 0.0)
}

/// All indicators tested on one timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeAnalysis {
    pub timeframe: Timeframe,
    pub best_indicator: IndicatorRanking,
    /// Sorted by composite score, best first.
    pub indicators: Vec<IndicatorRanking>,
    pub respect_rate: f64,
    /// Mean composite score.
    pub total_score: f64,
    pub quality: Quality,
    pub recommendation: String,
}

impl TimeframeAnalysis {
    /// `None` when no indicator could be tested.
    pub fn from_rankings(timeframe: Timeframe, mut rankings: Vec<IndicatorRanking>) -> Option<Self> {
        if rankings.is_empty() {
            return None;
        }
        let respect = respect_rate(&rankings);
        let total_score =
            rankings.iter().map(|r| r.composite_score).sum::<f64>() / rankings.len() as f64;

        // Stable: equal scores keep indicator order
        rankings.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
        let best_indicator = rankings[0].clone();
        let quality = Quality::from_respect_rate(respect);

        Some(Self {
            timeframe,
            best_indicator,
            indicators: rankings,
            respect_rate: respect,
            total_score: finite_or(total_score, 0.0),
            quality,
            recommendation: quality.recommendation(respect),
        })
    }
}

/// Timeframes grouped by respect-rate quality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityBuckets {
    pub excellent: Vec<Timeframe>,
    pub good: Vec<Timeframe>,
    pub fair: Vec<Timeframe>,
    pub poor: Vec<Timeframe>,
}

/// Average performance of one indicator across timeframes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorReliability {
    pub indicator_name: String,
    pub avg_score: f64,
    pub best_timeframe: Timeframe,
}

/// A timeframe left out of the ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTimeframe {
    pub timeframe: Timeframe,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_timeframes_analyzed: usize,
    pub total_indicators_tested: usize,
    pub avg_respect_rate: f64,
    pub timeframes_by_quality: QualityBuckets,
    /// Top three indicators by average score.
    pub most_reliable_indicators: Vec<IndicatorReliability>,
    pub skipped_timeframes: Vec<SkippedTimeframe>,
}

/// Ranked result of a multi-timeframe scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiTimeframeReport {
    pub symbol: String,
    pub best_timeframe: Timeframe,
    pub best_overall_indicator: IndicatorRanking,
    /// Best timeframe first.
    pub timeframes: Vec<TimeframeAnalysis>,
    pub recommendations: Vec<String>,
    pub summary: ReportSummary,
}

impl MultiTimeframeReport {
    pub fn best_analysis(&self) -> Option<&TimeframeAnalysis> {
        self.timeframes.first()
    }

    pub fn analysis(&self, timeframe: Timeframe) -> Option<&TimeframeAnalysis> {
        self.timeframes.iter().find(|a| a.timeframe == timeframe)
    }
}

/// Shared flag for abandoning a running scan.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }
}

/// Settings for a ranking scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Worker threads for the backtests (0 = one per core).
    #[serde(default)]
    pub max_workers: usize,
    #[serde(default)]
    pub show_progress: bool,
    /// Timeframes with fewer candles are skipped.
    #[serde(default = "default_min_candles")]
    pub min_candles: usize,
    /// Candles requested per timeframe from the provider.
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

fn default_min_candles() -> usize {
    100
}

fn default_candle_limit() -> usize {
    500
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            show_progress: false,
            min_candles: default_min_candles(),
            candle_limit: default_candle_limit(),
            backtest: BacktestConfig::default(),
        }
    }
}

/// Ranks timeframes by how well their price action respects a set of
/// indicators.
#[derive(Debug, Clone, Default)]
pub struct TimeframeRanker {
    config: RankingConfig,
    cancel: CancellationToken,
}

impl TimeframeRanker {
    pub fn new(config: RankingConfig) -> Result<Self> {
        config.backtest.validate()?;
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Use `token` to cancel scans from another thread.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Fetch each timeframe from `provider` and rank the built-in
    /// `indicators` on them with the given reward-to-risk ratio.
    pub fn rank_timeframes(
        &self,
        provider: &dyn CandleProvider,
        symbol: &str,
        timeframes: &[Timeframe],
        indicators: &[IndicatorKind],
        risk_reward: f64,
    ) -> Result<MultiTimeframeReport> {
        if timeframes.is_empty() || indicators.is_empty() {
            return Err(AnalysisError::InvalidParameter(
                "at least one timeframe and one indicator are required".to_string(),
            ));
        }
        info!(
            "Ranking {} timeframes x {} indicators for {}",
            timeframes.len(),
            indicators.len(),
            symbol
        );

        let mut series = Vec::with_capacity(timeframes.len());
        let mut skipped = Vec::new();
        for &timeframe in timeframes {
            if self.cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            match provider.fetch_candles(symbol, timeframe, self.config.candle_limit) {
                Ok(candles) => series.push((timeframe, candles)),
                Err(e) => {
                    warn!("Skipping {}: {}", timeframe, e);
                    skipped.push(SkippedTimeframe {
                        timeframe,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let built: Vec<Box<dyn Indicator>> = indicators.iter().map(|k| k.build()).collect();
        let backtest = BacktestConfig {
            risk_reward,
            ..self.config.backtest
        };
        self.rank_series(symbol, &series, &built, backtest, skipped)
    }

    /// Rank already-loaded series with arbitrary indicators, using the
    /// configured risk settings.
    pub fn rank_candles(
        &self,
        symbol: &str,
        series: &[(Timeframe, Vec<Candle>)],
        indicators: &[Box<dyn Indicator>],
    ) -> Result<MultiTimeframeReport> {
        self.rank_series(symbol, series, indicators, self.config.backtest, Vec::new())
    }

    fn rank_series(
        &self,
        symbol: &str,
        series: &[(Timeframe, Vec<Candle>)],
        indicators: &[Box<dyn Indicator>],
        backtest: BacktestConfig,
        mut skipped: Vec<SkippedTimeframe>,
    ) -> Result<MultiTimeframeReport> {
        if indicators.is_empty() {
            return Err(AnalysisError::InvalidParameter(
                "at least one indicator is required".to_string(),
            ));
        }
        let simulator = BacktestSimulator::new(backtest)?;

        let mut usable: Vec<(Timeframe, &[Candle])> = Vec::new();
        for (timeframe, candles) in series {
            if candles.len() < self.config.min_candles {
                warn!(
                    "Insufficient data for {} ({} candles, need {})",
                    timeframe,
                    candles.len(),
                    self.config.min_candles
                );
                skipped.push(SkippedTimeframe {
                    timeframe: *timeframe,
                    reason: format!(
                        "insufficient data: {} candles, need {}",
                        candles.len(),
                        self.config.min_candles
                    ),
                });
            } else {
                usable.push((*timeframe, candles.as_slice()));
            }
        }
        if usable.is_empty() {
            let longest = series.iter().map(|(_, c)| c.len()).max().unwrap_or(0);
            return Err(AnalysisError::insufficient(
                "timeframe ranking",
                self.config.min_candles,
                longest,
            ));
        }

        let results = self.run_pairs(symbol, &usable, indicators, &simulator)?;

        let mut analyses = Vec::with_capacity(usable.len());
        for (tf_pos, (timeframe, _)) in usable.iter().enumerate() {
            let rankings: Vec<IndicatorRanking> = results
                .iter()
                .filter(|(pos, _, _)| *pos == tf_pos)
                .map(|(_, _, result)| IndicatorRanking::from_result(result))
                .collect();
            match TimeframeAnalysis::from_rankings(*timeframe, rankings) {
                Some(analysis) => analyses.push((tf_pos, analysis)),
                None => skipped.push(SkippedTimeframe {
                    timeframe: *timeframe,
                    reason: "no indicator could be backtested".to_string(),
                }),
            }
        }
        if analyses.is_empty() {
            return Err(AnalysisError::insufficient(
                "timeframe ranking",
                self.config.min_candles,
                0,
            ));
        }

        analyses.sort_by(|(pos_a, a), (pos_b, b)| compare_timeframes(a, b).then(pos_a.cmp(pos_b)));
        let timeframes: Vec<TimeframeAnalysis> = analyses.into_iter().map(|(_, a)| a).collect();

        let report = build_report(symbol, timeframes, skipped);
        info!(
            "Ranking complete for {}: best timeframe {} ({:.1}% respect), best indicator {}",
            symbol,
            report.best_timeframe,
            report.timeframes[0].respect_rate,
            report.best_overall_indicator.indicator_name
        );
        Ok(report)
    }

    /// Backtest every pair on the worker pool. Results come back ordered by
    /// (timeframe position, indicator position).
    fn run_pairs(
        &self,
        symbol: &str,
        usable: &[(Timeframe, &[Candle])],
        indicators: &[Box<dyn Indicator>],
        simulator: &BacktestSimulator,
    ) -> Result<Vec<(usize, usize, BacktestResult)>> {
        let jobs: Vec<(usize, usize)> = (0..usable.len())
            .flat_map(|t| (0..indicators.len()).map(move |k| (t, k)))
            .collect();

        let progress = self.config.show_progress.then(|| {
            let pb = ProgressBar::new(jobs.len() as u64);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .map(|s| s.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb
        });

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_workers)
            .build()
            .map_err(|e| AnalysisError::ConfigError(format!("worker pool: {}", e)))?;

        let mut results: Vec<(usize, usize, BacktestResult)> = pool.install(|| {
            jobs.par_iter()
                .filter_map(|&(t, k)| {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    let (timeframe, candles) = usable[t];
                    let indicator = indicators[k].as_ref();
                    let outcome = simulator.run(symbol, timeframe, candles, indicator);
                    if let Some(ref pb) = progress {
                        pb.inc(1);
                    }
                    match outcome {
                        Ok(result) => {
                            debug!(
                                "{} on {}: {} trades, {:.1}% win rate",
                                indicator.name(),
                                timeframe,
                                result.total_trades,
                                result.win_rate
                            );
                            Some((t, k, result))
                        }
                        Err(e) => {
                            warn!("Backtest of {} on {} failed: {}", indicator.name(), timeframe, e);
                            None
                        }
                    }
                })
                .collect()
        });

        if let Some(pb) = progress {
            pb.finish_with_message("Ranking complete");
        }
        if self.cancel.is_cancelled() {
            info!("Ranking of {} cancelled", symbol);
            return Err(AnalysisError::Cancelled);
        }

        results.sort_by_key(|(t, k, _)| (*t, *k));
        Ok(results)
    }
}

/// Better timeframe first: respect rate, then best indicator score, then
/// closeness to the neutral timeframe.
fn compare_timeframes(a: &TimeframeAnalysis, b: &TimeframeAnalysis) -> Ordering {
    b.respect_rate
        .total_cmp(&a.respect_rate)
        .then(
            b.best_indicator
                .composite_score
                .total_cmp(&a.best_indicator.composite_score),
        )
        .then(
            a.timeframe
                .distance_from_neutral()
                .total_cmp(&b.timeframe.distance_from_neutral()),
        )
}

fn build_report(
    symbol: &str,
    timeframes: Vec<TimeframeAnalysis>,
    skipped: Vec<SkippedTimeframe>,
) -> MultiTimeframeReport {
    let all: Vec<&IndicatorRanking> = timeframes.iter().flat_map(|a| a.indicators.iter()).collect();

    // Ties go to the higher-ranked timeframe
    let mut best_overall = &timeframes[0].best_indicator;
    for ranking in &all {
        if ranking.composite_score > best_overall.composite_score {
            best_overall = ranking;
        }
    }
    let best_overall = best_overall.clone();
    let best_timeframe = timeframes[0].timeframe;

    let mut buckets = QualityBuckets::default();
    for analysis in &timeframes {
        let bucket = match analysis.quality {
            Quality::Excellent => &mut buckets.excellent,
            Quality::Good => &mut buckets.good,
            Quality::Fair => &mut buckets.fair,
            Quality::Poor => &mut buckets.poor,
        };
        bucket.push(analysis.timeframe);
    }

    let avg_respect_rate =
        timeframes.iter().map(|a| a.respect_rate).sum::<f64>() / timeframes.len() as f64;

    let summary = ReportSummary {
        total_timeframes_analyzed: timeframes.len(),
        total_indicators_tested: all.len(),
        avg_respect_rate: finite_or(avg_respect_rate, 0.0),
        timeframes_by_quality: buckets,
        most_reliable_indicators: most_reliable(&all, 3),
        skipped_timeframes: skipped,
    };

    let recommendations = recommendations(&timeframes, &best_overall);

    MultiTimeframeReport {
        symbol: symbol.to_string(),
        best_timeframe,
        best_overall_indicator: best_overall,
        timeframes,
        recommendations,
        summary,
    }
}

fn most_reliable(all: &[&IndicatorRanking], top: usize) -> Vec<IndicatorReliability> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&IndicatorRanking>> = HashMap::new();
    for ranking in all {
        let name = ranking.indicator_name.as_str();
        if !groups.contains_key(name) {
            order.push(name);
        }
        groups.entry(name).or_default().push(ranking);
    }

    let mut reliability: Vec<IndicatorReliability> = order
        .iter()
        .filter_map(|name| {
            let group = groups.get(name)?;
            let avg = group.iter().map(|r| r.composite_score).sum::<f64>() / group.len() as f64;
            let best = group.iter().copied().fold(group[0], |best, r| {
                if r.composite_score > best.composite_score {
                    r
                } else {
                    best
                }
            });
            Some(IndicatorReliability {
                indicator_name: name.to_string(),
                avg_score: finite_or(avg, 0.0),
                best_timeframe: best.timeframe,
            })
        })
        .collect();

    reliability.sort_by(|a, b| b.avg_score.total_cmp(&a.avg_score));
    reliability.truncate(top);
    reliability
}

fn recommendations(timeframes: &[TimeframeAnalysis], best_overall: &IndicatorRanking) -> Vec<String> {
    let mut out = Vec::new();
    let best = &timeframes[0];
    out.push(format!(
        "Trade primarily on the {} timeframe (respect rate: {:.1}%)",
        best.timeframe, best.respect_rate
    ));
    out.push(format!(
        "Use {} as the main indicator on {} (win rate: {:.1}%)",
        best_overall.indicator_name, best_overall.timeframe, best_overall.win_rate
    ));

    let reliable: Vec<String> = timeframes
        .iter()
        .filter(|a| a.respect_rate >= 50.0)
        .map(|a| a.timeframe.to_string())
        .collect();
    if reliable.len() >= 2 {
        out.push(format!(
            "Multiple reliable timeframes: {}. Look for confluence between them",
            reliable.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    let poor: Vec<String> = timeframes
        .iter()
        .filter(|a| a.quality == Quality::Poor)
        .map(|a| a.timeframe.to_string())
        .collect();
    if !poor.is_empty() {
        out.push(format!("Avoid trading on {}: low respect rate", poor.join(", ")));
    }
    out
}
