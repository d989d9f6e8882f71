//! Multi-asset market scanner.
//!
//! Every symbol is ranked on each requested timeframe. The best
//! timeframe's mean indicator score is then adjusted by an EMA trend read and
//! an RSI extreme, and symbols are ordered by the adjusted score.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::backtest::BacktestConfig;
use crate::data::{ema, rsi};
use crate::error::{AnalysisError, Result};
use crate::indicator::Indicator;
use crate::indicators::IndicatorKind;
use crate::metrics::finite_or;
use crate::provider::CandleProvider;
use crate::ranking::{CancellationToken, RankingConfig, TimeframeAnalysis, TimeframeRanker};
use crate::timeframe::Timeframe;
use crate::types::Candle;

pub const FAST_EMA: usize = 50;
pub const SLOW_EMA: usize = 200;
pub const RSI_PERIOD: usize = 14;

const DAY_MS: i64 = 86_400_000;

/// Trend read from the last close against the 50 and 200 period EMAs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketTrend {
    /// Above the slow EMA with the fast EMA above it.
    Bullish,
    /// Below the slow EMA with the fast EMA below it.
    Bearish,
    /// Above the slow EMA while the fast EMA still lags below.
    Recovering,
    /// Below the slow EMA while the fast EMA is still above.
    Pullback,
    /// Not enough history for the slow EMA.
    Neutral,
}

impl MarketTrend {
    pub fn classify(price: f64, fast: Option<f64>, slow: Option<f64>) -> Self {
        let (fast, slow) = match (fast, slow) {
            (Some(fast), Some(slow)) => (fast, slow),
            _ => return MarketTrend::Neutral,
        };
        if price > slow {
            if fast > slow {
                MarketTrend::Bullish
            } else {
                MarketTrend::Recovering
            }
        } else if fast < slow {
            MarketTrend::Bearish
        } else {
            MarketTrend::Pullback
        }
    }

    pub fn is_directional(&self) -> bool {
        matches!(self, MarketTrend::Bullish | MarketTrend::Bearish)
    }
}

impl fmt::Display for MarketTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketTrend::Bullish => write!(f, "bullish"),
            MarketTrend::Bearish => write!(f, "bearish"),
            MarketTrend::Recovering => write!(f, "recovering"),
            MarketTrend::Pullback => write!(f, "pullback"),
            MarketTrend::Neutral => write!(f, "neutral"),
        }
    }
}

/// Recommendation band of an adjusted score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opportunity {
    Strong,
    Good,
    Neutral,
    Avoid,
}

impl Opportunity {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 70.0 => Opportunity::Strong,
            s if s >= 50.0 => Opportunity::Good,
            s if s >= 30.0 => Opportunity::Neutral,
            _ => Opportunity::Avoid,
        }
    }
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opportunity::Strong => write!(f, "strong opportunity"),
            Opportunity::Good => write!(f, "good opportunity"),
            Opportunity::Neutral => write!(f, "neutral"),
            Opportunity::Avoid => write!(f, "avoid"),
        }
    }
}

/// Adjust a timeframe's mean indicator score by trend and momentum.
///
/// A directional trend adds 10. An RSI against the trend (below 40 in a
/// bullish market, above 60 in a bearish one) adds 20; otherwise an RSI
/// extreme below 30 or above 70 adds 10. The result is capped at 100.
pub fn adjust_score(base: f64, trend: MarketTrend, rsi: f64) -> f64 {
    let trend_bonus = if trend.is_directional() { 10.0 } else { 0.0 };
    let rsi_bonus = match trend {
        MarketTrend::Bullish if rsi < 40.0 => 20.0,
        MarketTrend::Bearish if rsi > 60.0 => 20.0,
        _ if rsi < 30.0 || rsi > 70.0 => 10.0,
        _ => 0.0,
    };
    finite_or(base + trend_bonus + rsi_bonus, 0.0).clamp(0.0, 100.0)
}

/// Score of one symbol on its best timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetScore {
    pub symbol: String,
    pub price: f64,
    /// Volume of the candles opened in the last 24 hours of data.
    pub volume_24h: f64,
    /// Percent change over the last 24 hours of data.
    pub change_24h: f64,
    /// Adjusted score in [0, 100].
    pub smc_score: f64,
    pub best_strategy: String,
    pub best_timeframe: Timeframe,
    /// Win rate of the best strategy on the best timeframe.
    pub win_rate: f64,
    pub trend: MarketTrend,
    pub rsi: f64,
    pub recommendation: Opportunity,
}

impl AssetScore {
    /// Score `symbol` from its ranked timeframe and the candles behind it.
    pub fn from_analysis(symbol: &str, analysis: &TimeframeAnalysis, candles: &[Candle]) -> Result<Self> {
        let last = candles
            .last()
            .ok_or_else(|| AnalysisError::insufficient("asset score", 1, 0))?;

        let trend = MarketTrend::classify(last.close, ema(candles, FAST_EMA), ema(candles, SLOW_EMA));
        let rsi = rsi(candles, RSI_PERIOD).unwrap_or(50.0);
        let smc_score = adjust_score(analysis.total_score, trend, rsi);

        let day_start = last.open_time + analysis.timeframe.millis() - DAY_MS;
        let day: Vec<&Candle> = candles.iter().filter(|c| c.open_time >= day_start).collect();
        let volume_24h = day.iter().map(|c| c.volume).sum();
        let change_24h = day
            .first()
            .map(|first| finite_or((last.close / first.open - 1.0) * 100.0, 0.0))
            .unwrap_or(0.0);

        let best = &analysis.best_indicator;
        Ok(Self {
            symbol: symbol.to_string(),
            price: last.close,
            volume_24h,
            change_24h,
            smc_score,
            best_strategy: best.indicator_name.clone(),
            best_timeframe: analysis.timeframe,
            win_rate: best.win_rate,
            trend,
            rsi,
            recommendation: Opportunity::from_score(smc_score),
        })
    }
}

/// A symbol that could not be scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub symbol: String,
    pub reason: String,
}

/// Result of a market scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketScan {
    /// Sorted by `smc_score`, best first.
    pub assets: Vec<AssetScore>,
    pub failed: Vec<ScanFailure>,
}

/// Settings for a market scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub timeframes: Vec<Timeframe>,
    pub indicators: Vec<IndicatorKind>,
    /// Candles requested per symbol and timeframe.
    pub candle_limit: usize,
    /// Timeframes with fewer candles are not scored.
    pub min_candles: usize,
    /// Worker threads for each symbol's backtests (0 = one per core).
    pub max_workers: usize,
    pub show_progress: bool,
    pub backtest: BacktestConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            timeframes: vec![Timeframe::M15],
            indicators: IndicatorKind::SMART_MONEY.to_vec(),
            candle_limit: 500,
            min_candles: 50,
            max_workers: 0,
            show_progress: false,
            backtest: BacktestConfig::default(),
        }
    }
}

/// Scores many symbols and orders them by opportunity.
pub struct MarketScanner {
    config: ScannerConfig,
    ranker: TimeframeRanker,
}

impl MarketScanner {
    pub fn new(config: ScannerConfig) -> Result<Self> {
        if config.timeframes.is_empty() || config.indicators.is_empty() {
            return Err(AnalysisError::InvalidParameter(
                "a scan needs at least one timeframe and one indicator".to_string(),
            ));
        }
        if config.min_candles == 0 {
            return Err(AnalysisError::InvalidParameter(
                "min_candles must be positive".to_string(),
            ));
        }
        let ranker = TimeframeRanker::new(RankingConfig {
            max_workers: config.max_workers,
            show_progress: false,
            min_candles: config.min_candles,
            candle_limit: config.candle_limit,
            backtest: config.backtest,
        })?;
        Ok(Self { config, ranker })
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Token that stops the scan between symbols and between backtests.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ranker.cancellation_token()
    }

    /// Score every symbol in `symbols`. Symbols that cannot be scored on any
    /// timeframe are listed in [`MarketScan::failed`] and do not stop the
    /// scan.
    pub fn scan_market(&self, provider: &dyn CandleProvider, symbols: &[String]) -> Result<MarketScan> {
        if symbols.is_empty() {
            return Err(AnalysisError::InvalidParameter("no symbols to scan".to_string()));
        }
        info!(
            "Scanning {} symbols on {:?}",
            symbols.len(),
            self.config.timeframes.iter().map(|t| t.to_string()).collect::<Vec<_>>()
        );

        let progress = self.config.show_progress.then(|| {
            let pb = ProgressBar::new(symbols.len() as u64);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .map(|s| s.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb
        });

        let cancel = self.cancellation_token();
        let mut assets = Vec::new();
        let mut failed = Vec::new();
        for symbol in symbols {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            if let Some(ref pb) = progress {
                pb.set_message(symbol.clone());
            }
            match self.scan_asset(provider, symbol) {
                Ok(score) => {
                    debug!("{} scored {:.1} on {}", symbol, score.smc_score, score.best_timeframe);
                    assets.push(score);
                }
                Err(AnalysisError::Cancelled) => return Err(AnalysisError::Cancelled),
                Err(e) => {
                    warn!("Skipping {}: {}", symbol, e);
                    failed.push(ScanFailure {
                        symbol: symbol.clone(),
                        reason: e.to_string(),
                    });
                }
            }
            if let Some(ref pb) = progress {
                pb.inc(1);
            }
        }
        if let Some(pb) = progress {
            pb.finish_with_message("Scan complete");
        }

        assets.sort_by(|a, b| b.smc_score.total_cmp(&a.smc_score));
        info!("Scan complete: {} scored, {} failed", assets.len(), failed.len());
        Ok(MarketScan { assets, failed })
    }

    /// Best-scoring timeframe of a single symbol.
    pub fn scan_asset(&self, provider: &dyn CandleProvider, symbol: &str) -> Result<AssetScore> {
        let mut series: Vec<(Timeframe, Vec<Candle>)> = Vec::new();
        for &timeframe in &self.config.timeframes {
            match provider.fetch_candles(symbol, timeframe, self.config.candle_limit) {
                Ok(candles) => series.push((timeframe, candles)),
                Err(e) => debug!("No {} data for {}: {}", timeframe, symbol, e),
            }
        }
        if series.is_empty() {
            return Err(AnalysisError::DataUnavailable(format!(
                "no candles for {} on any timeframe",
                symbol
            )));
        }

        let indicators: Vec<Box<dyn Indicator>> =
            self.config.indicators.iter().map(|kind| kind.build()).collect();
        let report = self.ranker.rank_candles(symbol, &series, &indicators)?;

        let mut best: Option<AssetScore> = None;
        for (timeframe, candles) in &series {
            let Some(analysis) = report.timeframes.iter().find(|a| a.timeframe == *timeframe) else {
                continue;
            };
            let score = AssetScore::from_analysis(symbol, analysis, candles)?;
            if best.as_ref().map_or(true, |b| score.smc_score > b.smc_score) {
                best = Some(score);
            }
        }
        best.ok_or_else(|| {
            AnalysisError::insufficient("market scan", self.config.min_candles, 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryProvider;
    use crate::ranking::IndicatorRanking;

    fn closes(values: &[f64]) -> Vec<Candle> {
        values
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(i as i64 * 3_600_000, c, c * 1.002, c * 0.998, c, 10.0))
            .collect()
    }

    /// Oscillating series around a trend so every indicator finds setups.
    fn wavy(n: usize, slope: f64) -> Vec<Candle> {
        let values: Vec<f64> = (0..n)
            .map(|i| {
                let x = i as f64;
                100.0 + slope * x + (x * 0.4).sin() * 3.0 + (x * 1.7).cos()
            })
            .collect();
        let mut candles = Vec::with_capacity(n);
        let mut open = values[0];
        for (i, &close) in values.iter().enumerate() {
            let high = open.max(close) + 0.4;
            let low = open.min(close) - 0.4;
            candles.push(Candle::new(i as i64 * 900_000, open, high, low, close, 50.0));
            open = close;
        }
        candles
    }

    fn analysis(timeframe: Timeframe, score: f64) -> TimeframeAnalysis {
        let ranking = IndicatorRanking {
            indicator_name: "Order Block".to_string(),
            timeframe,
            win_rate: 55.0,
            total_trades: 20,
            profit_factor: 1.4,
            avg_win: 2.0,
            avg_loss: -1.0,
            max_drawdown: 3.0,
            composite_score: score,
            confidence_level: crate::ranking::ConfidenceLevel::from_score(score),
        };
        TimeframeAnalysis::from_rankings(timeframe, vec![ranking]).unwrap()
    }

    #[test]
    fn test_trend_classification() {
        assert_eq!(MarketTrend::classify(110.0, Some(105.0), Some(100.0)), MarketTrend::Bullish);
        assert_eq!(MarketTrend::classify(110.0, Some(95.0), Some(100.0)), MarketTrend::Recovering);
        assert_eq!(MarketTrend::classify(90.0, Some(95.0), Some(100.0)), MarketTrend::Bearish);
        assert_eq!(MarketTrend::classify(90.0, Some(105.0), Some(100.0)), MarketTrend::Pullback);
        assert_eq!(MarketTrend::classify(90.0, Some(95.0), None), MarketTrend::Neutral);
    }

    #[test]
    fn test_adjust_score_bonuses() {
        // directional trend plus RSI against it
        assert_eq!(adjust_score(40.0, MarketTrend::Bullish, 35.0), 70.0);
        assert_eq!(adjust_score(40.0, MarketTrend::Bearish, 65.0), 70.0);
        // directional trend with an unremarkable RSI
        assert_eq!(adjust_score(40.0, MarketTrend::Bullish, 55.0), 50.0);
        // extreme RSI without a directional trend
        assert_eq!(adjust_score(40.0, MarketTrend::Pullback, 25.0), 50.0);
        assert_eq!(adjust_score(40.0, MarketTrend::Neutral, 50.0), 40.0);
        // capped
        assert_eq!(adjust_score(95.0, MarketTrend::Bearish, 80.0), 100.0);
    }

    #[test]
    fn test_opportunity_bands() {
        assert_eq!(Opportunity::from_score(70.0), Opportunity::Strong);
        assert_eq!(Opportunity::from_score(69.9), Opportunity::Good);
        assert_eq!(Opportunity::from_score(50.0), Opportunity::Good);
        assert_eq!(Opportunity::from_score(30.0), Opportunity::Neutral);
        assert_eq!(Opportunity::from_score(29.9), Opportunity::Avoid);
        assert_eq!(Opportunity::Strong.to_string(), "strong opportunity");
    }

    #[test]
    fn test_asset_score_from_rising_series() {
        let values: Vec<f64> = (0..260).map(|i| 100.0 + i as f64 * 0.5).collect();
        let candles = closes(&values);
        let score = AssetScore::from_analysis("BTCUSDT", &analysis(Timeframe::H1, 30.0), &candles).unwrap();

        assert_eq!(score.trend, MarketTrend::Bullish);
        assert_eq!(score.rsi, 100.0);
        // 30 base + 10 trend + 10 overbought
        assert_eq!(score.smc_score, 50.0);
        assert_eq!(score.recommendation, Opportunity::Good);
        assert_eq!(score.best_strategy, "Order Block");
        assert_eq!(score.best_timeframe, Timeframe::H1);
        assert_eq!(score.price, *values.last().unwrap());

        // 24 hourly candles fall in the last day
        assert_eq!(score.volume_24h, 240.0);
        let expected = (values[259] / values[236] - 1.0) * 100.0;
        assert!((score.change_24h - expected).abs() < 1e-9);
    }

    #[test]
    fn test_short_history_is_neutral() {
        let candles = closes(&[100.0; 80]);
        let score = AssetScore::from_analysis("X", &analysis(Timeframe::H1, 20.0), &candles).unwrap();
        assert_eq!(score.trend, MarketTrend::Neutral);
        assert_eq!(score.rsi, 50.0);
        assert_eq!(score.smc_score, 20.0);
        assert_eq!(score.recommendation, Opportunity::Avoid);
        assert!(AssetScore::from_analysis("X", &analysis(Timeframe::H1, 20.0), &[]).is_err());
    }

    #[test]
    fn test_scan_market_sorts_and_reports_failures() {
        let provider = InMemoryProvider::new()
            .with("UP", Timeframe::M15, wavy(400, 0.05))
            .with("DOWN", Timeframe::M15, wavy(400, -0.05))
            .with("SHORT", Timeframe::M15, wavy(20, 0.0));
        let scanner = MarketScanner::new(ScannerConfig {
            max_workers: 2,
            ..Default::default()
        })
        .unwrap();

        let symbols: Vec<String> = ["UP", "DOWN", "SHORT", "MISSING"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let scan = scanner.scan_market(&provider, &symbols).unwrap();

        assert_eq!(scan.assets.len(), 2);
        for pair in scan.assets.windows(2) {
            assert!(pair[0].smc_score >= pair[1].smc_score);
        }
        for asset in &scan.assets {
            assert_eq!(asset.best_timeframe, Timeframe::M15);
            assert!((0.0..=100.0).contains(&asset.smc_score));
            assert_eq!(asset.recommendation, Opportunity::from_score(asset.smc_score));
        }

        let failed: Vec<&str> = scan.failed.iter().map(|f| f.symbol.as_str()).collect();
        assert_eq!(failed, vec!["SHORT", "MISSING"]);
    }

    #[test]
    fn test_scan_picks_best_timeframe() {
        let provider = InMemoryProvider::new()
            .with("ETH", Timeframe::M15, wavy(300, 0.02))
            .with("ETH", Timeframe::H1, wavy(300, -0.08));
        let scanner = MarketScanner::new(ScannerConfig {
            timeframes: vec![Timeframe::M15, Timeframe::H1, Timeframe::H4],
            max_workers: 2,
            ..Default::default()
        })
        .unwrap();

        let best = scanner.scan_asset(&provider, "ETH").unwrap();
        let mut scores = Vec::new();
        for tf in [Timeframe::M15, Timeframe::H1] {
            let single = MarketScanner::new(ScannerConfig {
                timeframes: vec![tf],
                max_workers: 2,
                ..Default::default()
            })
            .unwrap();
            scores.push(single.scan_asset(&provider, "ETH").unwrap().smc_score);
        }
        assert_eq!(best.smc_score, scores.iter().copied().fold(0.0, f64::max));
    }

    #[test]
    fn test_scan_rejects_bad_input_and_cancels() {
        assert!(MarketScanner::new(ScannerConfig {
            timeframes: vec![],
            ..Default::default()
        })
        .is_err());

        let provider = InMemoryProvider::new().with("UP", Timeframe::M15, wavy(300, 0.05));
        let scanner = MarketScanner::new(ScannerConfig::default()).unwrap();
        assert!(matches!(
            scanner.scan_market(&provider, &[]),
            Err(AnalysisError::InvalidParameter(_))
        ));

        scanner.cancellation_token().cancel();
        let cancelled = scanner.scan_market(&provider, &["UP".to_string()]);
        assert!(matches!(cancelled, Err(AnalysisError::Cancelled)));
    }
}
