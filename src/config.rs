//! Configuration file support.
//!
//! Analysis settings can be kept in a TOML file so that scans are
//! reproducible. Every section and field is optional; missing values take the
//! same defaults as the library.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backtest::BacktestConfig;
use crate::error::{AnalysisError, Result};
use crate::evaluation::EvaluationConfig;
use crate::forecast::ModelSelector;
use crate::indicators::IndicatorKind;
use crate::predictor::PredictorConfig;
use crate::ranking::RankingConfig;
use crate::scanner::ScannerConfig;
use crate::timeframe::Timeframe;
use crate::trend::TrendConfig;

/// Complete analysis configuration loaded from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisFileConfig {
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub forecast: ForecastSettings,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub ranking: RankingSettings,
    #[serde(default)]
    pub scanner: ScannerSettings,
}

/// Where candles come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    /// Directory holding `<SYMBOL>_<timeframe>.csv` files.
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,
    /// Most recent candles to load (0 = all).
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_symbol() -> String {
    "BTCUSDT".to_string()
}
fn default_timeframe() -> Timeframe {
    Timeframe::H1
}
fn default_limit() -> usize {
    500
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            symbol: default_symbol(),
            timeframe: default_timeframe(),
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSettings {
    #[serde(default)]
    pub model: ModelSelector,
    /// Periods to forecast.
    #[serde(default = "default_periods")]
    pub periods: usize,
    #[serde(default = "default_max_periods")]
    pub max_periods: usize,
    /// Relative MA gap below which the trend is neutral.
    #[serde(default = "default_trend_threshold")]
    pub trend_threshold: f64,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

fn default_periods() -> usize {
    24
}
fn default_max_periods() -> usize {
    500
}
fn default_trend_threshold() -> f64 {
    0.001
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            model: ModelSelector::Auto,
            periods: default_periods(),
            max_periods: default_max_periods(),
            trend_threshold: default_trend_threshold(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSettings {
    #[serde(default = "default_indicator")]
    pub indicator: IndicatorKind,
    /// Stop distance in percent of entry.
    #[serde(default = "default_risk_pct")]
    pub risk_pct: f64,
    #[serde(default = "default_risk_reward")]
    pub risk_reward: f64,
    #[serde(default)]
    pub max_hold_candles: Option<usize>,
}

fn default_indicator() -> IndicatorKind {
    IndicatorKind::OrderBlock
}
fn default_risk_pct() -> f64 {
    1.0
}
fn default_risk_reward() -> f64 {
    2.0
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            indicator: default_indicator(),
            risk_pct: default_risk_pct(),
            risk_reward: default_risk_reward(),
            max_hold_candles: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingSettings {
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,
    #[serde(default = "default_indicators")]
    pub indicators: Vec<IndicatorKind>,
    /// Worker threads (0 = one per core).
    #[serde(default)]
    pub max_workers: usize,
    #[serde(default = "default_true")]
    pub show_progress: bool,
    #[serde(default = "default_min_candles")]
    pub min_candles: usize,
}

fn default_timeframes() -> Vec<Timeframe> {
    Timeframe::DEFAULT_SCAN.to_vec()
}
fn default_indicators() -> Vec<IndicatorKind> {
    IndicatorKind::SMART_MONEY.to_vec()
}
fn default_true() -> bool {
    true
}
fn default_min_candles() -> usize {
    100
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            timeframes: default_timeframes(),
            indicators: default_indicators(),
            max_workers: 0,
            show_progress: true,
            min_candles: default_min_candles(),
        }
    }
}

/// Symbols and timeframes for `scan`. Indicators, workers and the
/// backtest come from `[ranking]` and `[backtest]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerSettings {
    #[serde(default = "default_scan_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_scan_timeframes")]
    pub timeframes: Vec<Timeframe>,
    #[serde(default = "default_scan_min_candles")]
    pub min_candles: usize,
}

fn default_scan_symbols() -> Vec<String> {
    ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "XRPUSDT", "ADAUSDT", "DOGEUSDT", "LINKUSDT"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_scan_timeframes() -> Vec<Timeframe> {
    vec![Timeframe::M15]
}
fn default_scan_min_candles() -> usize {
    50
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            symbols: default_scan_symbols(),
            timeframes: default_scan_timeframes(),
            min_candles: default_scan_min_candles(),
        }
    }
}

impl AnalysisFileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: AnalysisFileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| AnalysisError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn to_predictor_config(&self) -> PredictorConfig {
        PredictorConfig {
            max_periods: self.forecast.max_periods,
            trend: TrendConfig {
                threshold: self.forecast.trend_threshold,
                ..TrendConfig::default()
            },
            ..PredictorConfig::default()
        }
    }

    pub fn to_evaluation_config(&self) -> Result<EvaluationConfig> {
        self.forecast.evaluation.validate()?;
        Ok(self.forecast.evaluation)
    }

    pub fn to_backtest_config(&self) -> Result<BacktestConfig> {
        let config = BacktestConfig {
            risk_pct: self.backtest.risk_pct,
            risk_reward: self.backtest.risk_reward,
            max_hold_candles: self.backtest.max_hold_candles,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_ranking_config(&self) -> Result<RankingConfig> {
        if self.ranking.timeframes.is_empty() || self.ranking.indicators.is_empty() {
            return Err(AnalysisError::ConfigError(
                "[ranking] needs at least one timeframe and one indicator".to_string(),
            ));
        }
        Ok(RankingConfig {
            max_workers: self.ranking.max_workers,
            show_progress: self.ranking.show_progress,
            min_candles: self.ranking.min_candles,
            candle_limit: self.data.limit,
            backtest: self.to_backtest_config()?,
        })
    }

    pub fn to_scanner_config(&self) -> Result<ScannerConfig> {
        if self.scanner.symbols.is_empty() || self.scanner.timeframes.is_empty() {
            return Err(AnalysisError::ConfigError(
                "[scanner] needs at least one symbol and one timeframe".to_string(),
            ));
        }
        if self.ranking.indicators.is_empty() {
            return Err(AnalysisError::ConfigError(
                "[ranking] needs at least one indicator".to_string(),
            ));
        }
        Ok(ScannerConfig {
            timeframes: self.scanner.timeframes.clone(),
            indicators: self.ranking.indicators.clone(),
            candle_limit: self.data.limit,
            min_candles: self.scanner.min_candles,
            max_workers: self.ranking.max_workers,
            show_progress: self.ranking.show_progress,
            backtest: self.to_backtest_config()?,
        })
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# smarttrade analysis configuration

[data]
dir = "data"            # holds <SYMBOL>_<timeframe>.csv files
symbol = "BTCUSDT"
timeframe = "1h"
limit = 500             # most recent candles to load, 0 = all

[forecast]
model = "auto"          # auto, baseline, arima, holt, linear_trend, ensemble
periods = 24
max_periods = 500
trend_threshold = 0.001 # 0.1% MA gap

[forecast.evaluation]
horizon = 5
min_change_pct = 0.5
stop_loss_pct = 2.0
take_profit_pct = 4.0
min_candles = 500
warmup_fraction = 0.2

[backtest]
indicator = "order_block"
risk_pct = 1.0          # stop distance, % of entry
risk_reward = 2.0
# max_hold_candles = 48

[ranking]
timeframes = ["1m", "5m", "15m", "30m", "1h", "4h", "1d"]
indicators = ["order_block", "fair_value_gap", "fibonacci", "cisd"]
max_workers = 0         # 0 = one per core
show_progress = true
min_candles = 100

[scanner]
symbols = ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "XRPUSDT"]
timeframes = ["15m"]
min_candles = 50
"#
        .to_string()
    }
}
