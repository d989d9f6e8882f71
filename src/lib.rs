//! smarttrade - price forecasting and multi-timeframe indicator reliability
//! analysis over OHLCV candles.
//!
//! # Overview
//!
//! The crate answers two questions about an instrument:
//!
//! - **Where is price heading?** The [`predictor`] turns candle history into
//!   a multi-period forecast with confidence intervals, a trend label and a
//!   confidence score. Forecast models are pluggable adapters discovered at
//!   startup through a [`forecast::CapabilityRegistry`]; a drift baseline is
//!   always available.
//! - **Which timeframe does price respect?** The [`backtest`] simulator
//!   replays indicator signals as fixed-risk trades, and the [`ranking`]
//!   module scores every (timeframe, indicator) pair in parallel and names
//!   the most reliable timeframe.
//!
//! # Quick Start
//!
//! ```no_run
//! use smarttrade::{
//!     forecast::{CapabilityRegistry, ModelSelector},
//!     predictor::Predictor,
//!     provider::{CandleProvider, CsvCandleProvider},
//!     timeframe::Timeframe,
//! };
//!
//! let provider = CsvCandleProvider::new("data");
//! let candles = provider.fetch_candles("BTCUSDT", Timeframe::H1, 500).unwrap();
//!
//! let predictor = Predictor::new(CapabilityRegistry::detect());
//! let forecast = predictor
//!     .predict("BTCUSDT", Timeframe::H1, &candles, 24, ModelSelector::Auto)
//!     .unwrap();
//!
//! println!("{} -> {:?}", forecast.model_used, forecast.trend);
//! ```
//!
//! # Ranking timeframes
//!
//! ```no_run
//! use smarttrade::{
//!     indicators::IndicatorKind,
//!     provider::CsvCandleProvider,
//!     ranking::{RankingConfig, TimeframeRanker},
//!     timeframe::Timeframe,
//! };
//!
//! let provider = CsvCandleProvider::new("data");
//! let ranker = TimeframeRanker::new(RankingConfig::default()).unwrap();
//! let report = ranker
//!     .rank_timeframes(
//!         &provider,
//!         "BTCUSDT",
//!         &Timeframe::DEFAULT_SCAN,
//!         &IndicatorKind::SMART_MONEY,
//!         2.0,
//!     )
//!     .unwrap();
//!
//! println!("Best timeframe: {:?}", report.best_timeframe);
//! ```
//!
//! # Modules
//!
//! - [`types`]: Candles, directions, exit reasons and trend labels
//! - [`timeframe`]: Supported candle intervals
//! - [`data`]: Rolling statistics and technical indicators over candles
//! - [`features`]: Prefix-only feature extraction for forecasting
//! - [`forecast`]: Forecast adapters, capability registry and ensembles
//! - [`trend`], [`confidence`]: Trend classification and forecast confidence
//! - [`predictor`]: Forecast orchestration
//! - [`indicator`], [`indicators`]: Entry-signal trait and built-in indicators
//! - [`backtest`]: Fixed-risk trade simulation
//! - [`metrics`]: Trade and forecast statistics
//! - [`ranking`]: Parallel multi-timeframe reliability ranking
//! - [`evaluation`]: Walk-forward forecast evaluation
//! - [`scanner`]: Multi-asset opportunity scan
//! - [`provider`]: Candle sources
//! - [`config`]: TOML configuration file support
//! - [`report`]: Terminal tables and JSON output

pub mod backtest;
pub mod confidence;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod forecast;
pub mod indicator;
pub mod indicators;
pub mod metrics;
pub mod predictor;
pub mod provider;
pub mod ranking;
pub mod report;
pub mod scanner;
pub mod timeframe;
pub mod trend;
pub mod types;

// Re-exports for convenience
pub use backtest::{run_backtest, BacktestConfig, BacktestResult, BacktestSimulator, BacktestTrade};
pub use error::{AnalysisError, Result};
pub use forecast::{CapabilityRegistry, ModelSelector, Prediction};
pub use indicator::{Indicator, SignalContext};
pub use indicators::IndicatorKind;
pub use predictor::{PredictionSet, Predictor, PredictorConfig};
pub use provider::{CandleProvider, CsvCandleProvider, InMemoryProvider};
pub use ranking::{
    CancellationToken, IndicatorRanking, MultiTimeframeReport, RankingConfig, TimeframeAnalysis,
    TimeframeRanker,
};
pub use scanner::{AssetScore, MarketScan, MarketScanner, ScannerConfig};
pub use timeframe::Timeframe;
pub use types::{Candle, Direction, EntrySignal, ExitReason, Trend};
