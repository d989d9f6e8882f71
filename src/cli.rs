//! Command-line interface for the analysis core.

use smarttrade::backtest::BacktestSimulator;
use smarttrade::config::AnalysisFileConfig;
use smarttrade::error::Result;
use smarttrade::evaluation::ForecastBacktester;
use smarttrade::forecast::{CapabilityRegistry, ModelSelector};
use smarttrade::indicators::parse_indicators;
use smarttrade::predictor::Predictor;
use smarttrade::provider::{CandleProvider, CsvCandleProvider};
use smarttrade::ranking::TimeframeRanker;
use smarttrade::scanner::MarketScanner;
use smarttrade::report::{to_json, ReportFormatter};
use smarttrade::timeframe::{parse_timeframes, Timeframe};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// smarttrade - price forecasts and timeframe reliability ranking from
/// historical candles.
#[derive(Parser)]
#[command(name = "smarttrade")]
#[command(version)]
#[command(about = "Forecast prices and rank which timeframe an instrument respects")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Configuration file; command-line flags override its values
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory with <SYMBOL>_<timeframe>.csv candle files
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Forecast the next candles of a symbol
    Predict {
        /// Symbol, e.g. BTCUSDT
        #[arg(short, long)]
        symbol: Option<String>,

        /// Timeframe, e.g. 1h
        #[arg(short, long)]
        timeframe: Option<Timeframe>,

        /// Number of periods to forecast
        #[arg(short, long)]
        periods: Option<usize>,

        /// auto, baseline, arima, holt, linear_trend or ensemble
        #[arg(short, long)]
        model: Option<ModelSelector>,
    },

    /// Backtest one indicator on one timeframe
    Backtest {
        #[arg(short, long)]
        symbol: Option<String>,

        #[arg(short, long)]
        timeframe: Option<Timeframe>,

        /// order_block, fair_value_gap, fibonacci, cisd, sma_crossover or rsi_reversal
        #[arg(short, long)]
        indicator: Option<String>,

        /// Take-profit distance as a multiple of the stop distance
        #[arg(short, long)]
        risk_reward: Option<f64>,

        /// Close trades after this many candles
        #[arg(long)]
        max_hold: Option<usize>,

        /// Trades to list (0 = all)
        #[arg(long, default_value = "20")]
        show_trades: usize,
    },

    /// Rank timeframes by how reliably price respects the indicators
    Rank {
        #[arg(short, long)]
        symbol: Option<String>,

        /// Comma-separated timeframes, e.g. 5m,15m,1h,4h
        #[arg(short, long)]
        timeframes: Option<String>,

        /// Comma-separated indicators, e.g. ob,fvg,fib,cisd
        #[arg(short, long)]
        indicators: Option<String>,

        #[arg(short, long)]
        risk_reward: Option<f64>,

        /// Worker threads (0 = one per core)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Score many symbols and list the best opportunities first
    Scan {
        /// Comma-separated symbols (default: the [scanner] list)
        #[arg(short, long)]
        symbols: Option<String>,

        /// Comma-separated timeframes, e.g. 15m,1h
        #[arg(short, long)]
        timeframes: Option<String>,

        /// Comma-separated indicators, e.g. ob,fvg,fib,cisd
        #[arg(short, long)]
        indicators: Option<String>,

        /// Assets to list (0 = all)
        #[arg(long, default_value = "0")]
        top: usize,
    },

    /// Walk-forward evaluation of forecast models
    Evaluate {
        #[arg(short, long)]
        symbol: Option<String>,

        #[arg(short, long)]
        timeframe: Option<Timeframe>,

        /// Comma-separated models (default: every available model)
        #[arg(short, long)]
        models: Option<String>,

        /// Candles between forecast and verification
        #[arg(long)]
        horizon: Option<usize>,
    },

    /// List the forecast models available in this build
    Models,

    /// Write an example configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "smarttrade.toml")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Failed to set tracing subscriber: {}", e);
        }
    }

    fn file_config(&self) -> Result<AnalysisFileConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisFileConfig::load(path)?,
            None => AnalysisFileConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data.dir = dir.clone();
        }
        Ok(config)
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    if let Commands::Init { output } = &cli.command {
        return init_config(output);
    }

    let mut config = cli.file_config()?;
    let provider = CsvCandleProvider::new(config.data.dir.clone());

    match &cli.command {
        Commands::Predict {
            symbol,
            timeframe,
            periods,
            model,
        } => {
            override_data(&mut config, symbol, timeframe);
            if let Some(periods) = periods {
                config.forecast.periods = *periods;
            }
            if let Some(model) = model {
                config.forecast.model = *model;
            }
            run_predict(&config, &provider, cli.output)
        }

        Commands::Backtest {
            symbol,
            timeframe,
            indicator,
            risk_reward,
            max_hold,
            show_trades,
        } => {
            override_data(&mut config, symbol, timeframe);
            if let Some(name) = indicator {
                config.backtest.indicator = name.parse()?;
            }
            if let Some(rr) = risk_reward {
                config.backtest.risk_reward = *rr;
            }
            if max_hold.is_some() {
                config.backtest.max_hold_candles = *max_hold;
            }
            run_backtest(&config, &provider, *show_trades, cli.output)
        }

        Commands::Rank {
            symbol,
            timeframes,
            indicators,
            risk_reward,
            workers,
        } => {
            override_data(&mut config, symbol, &None);
            if let Some(list) = timeframes {
                config.ranking.timeframes = parse_timeframes(list)?;
            }
            if let Some(list) = indicators {
                config.ranking.indicators = parse_indicators(list)?;
            }
            if let Some(rr) = risk_reward {
                config.backtest.risk_reward = *rr;
            }
            if let Some(workers) = workers {
                config.ranking.max_workers = *workers;
            }
            if matches!(cli.output, OutputFormat::Json) {
                config.ranking.show_progress = false;
            }
            run_rank(&config, &provider, cli.output)
        }

        Commands::Scan {
            symbols,
            timeframes,
            indicators,
            top,
        } => {
            if let Some(list) = symbols {
                config.scanner.symbols = list
                    .split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            if let Some(list) = timeframes {
                config.scanner.timeframes = parse_timeframes(list)?;
            }
            if let Some(list) = indicators {
                config.ranking.indicators = parse_indicators(list)?;
            }
            if matches!(cli.output, OutputFormat::Json) {
                config.ranking.show_progress = false;
            }
            run_scan(&config, &provider, *top, cli.output)
        }

        Commands::Evaluate {
            symbol,
            timeframe,
            models,
            horizon,
        } => {
            override_data(&mut config, symbol, timeframe);
            if let Some(horizon) = horizon {
                config.forecast.evaluation.horizon = *horizon;
            }
            let models = models
                .as_deref()
                .map(parse_models)
                .transpose()?;
            run_evaluate(&config, &provider, models, cli.output)
        }

        Commands::Models => {
            let registry = CapabilityRegistry::detect();
            match cli.output {
                OutputFormat::Text => ReportFormatter::print_models(&registry),
                OutputFormat::Json => print_json(&registry.available_models())?,
            }
            Ok(())
        }

        Commands::Init { .. } => Ok(()),
    }
}

fn override_data(config: &mut AnalysisFileConfig, symbol: &Option<String>, timeframe: &Option<Timeframe>) {
    if let Some(symbol) = symbol {
        config.data.symbol = symbol.to_uppercase();
    }
    if let Some(timeframe) = timeframe {
        config.data.timeframe = *timeframe;
    }
}

fn parse_models(list: &str) -> Result<Vec<ModelSelector>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", to_json(value)?);
    Ok(())
}

fn run_predict(config: &AnalysisFileConfig, provider: &dyn CandleProvider, output: OutputFormat) -> Result<()> {
    let data = &config.data;
    let candles = provider.fetch_candles(&data.symbol, data.timeframe, data.limit)?;
    let predictor = Predictor::with_config(CapabilityRegistry::detect(), config.to_predictor_config());

    let set = predictor.predict(
        &data.symbol,
        data.timeframe,
        &candles,
        config.forecast.periods,
        config.forecast.model,
    )?;

    match output {
        OutputFormat::Text => ReportFormatter::print_prediction(&set),
        OutputFormat::Json => print_json(&set)?,
    }
    Ok(())
}

fn run_backtest(
    config: &AnalysisFileConfig,
    provider: &dyn CandleProvider,
    show_trades: usize,
    output: OutputFormat,
) -> Result<()> {
    let data = &config.data;
    let candles = provider.fetch_candles(&data.symbol, data.timeframe, data.limit)?;
    let simulator = BacktestSimulator::new(config.to_backtest_config()?)?;
    let indicator = config.backtest.indicator.build();

    let result = simulator.run(&data.symbol, data.timeframe, &candles, indicator.as_ref())?;

    match output {
        OutputFormat::Text => ReportFormatter::print_backtest(&result, show_trades),
        OutputFormat::Json => print_json(&result)?,
    }
    Ok(())
}

fn run_rank(config: &AnalysisFileConfig, provider: &dyn CandleProvider, output: OutputFormat) -> Result<()> {
    let ranker = TimeframeRanker::new(config.to_ranking_config()?)?;
    let report = ranker.rank_timeframes(
        provider,
        &config.data.symbol,
        &config.ranking.timeframes,
        &config.ranking.indicators,
        config.backtest.risk_reward,
    )?;

    match output {
        OutputFormat::Text => ReportFormatter::print_ranking(&report),
        OutputFormat::Json => print_json(&report)?,
    }
    Ok(())
}

fn run_scan(
    config: &AnalysisFileConfig,
    provider: &dyn CandleProvider,
    top: usize,
    output: OutputFormat,
) -> Result<()> {
    let scanner = MarketScanner::new(config.to_scanner_config()?)?;
    let mut scan = scanner.scan_market(provider, &config.scanner.symbols)?;
    if top > 0 {
        scan.assets.truncate(top);
    }

    match output {
        OutputFormat::Text => ReportFormatter::print_scan(&scan),
        OutputFormat::Json => print_json(&scan)?,
    }
    Ok(())
}

fn run_evaluate(
    config: &AnalysisFileConfig,
    provider: &dyn CandleProvider,
    models: Option<Vec<ModelSelector>>,
    output: OutputFormat,
) -> Result<()> {
    let data = &config.data;
    let evaluation = config.to_evaluation_config()?;
    // Walk-forward needs more history than a single forecast
    let limit = if data.limit == 0 {
        0
    } else {
        data.limit.max(evaluation.min_candles)
    };
    let candles = provider.fetch_candles(&data.symbol, data.timeframe, limit)?;

    let predictor = Predictor::with_config(CapabilityRegistry::detect(), config.to_predictor_config());
    let models = models.unwrap_or_else(|| {
        predictor
            .registry()
            .available_models()
            .into_iter()
            .filter(|m| *m != ModelSelector::Auto)
            .collect()
    });
    let backtester = ForecastBacktester::new(predictor, evaluation)?;
    let results = backtester.compare_models(&data.symbol, data.timeframe, &candles, &models);

    match output {
        OutputFormat::Text => ReportFormatter::print_evaluations(&results),
        OutputFormat::Json => print_json(&results)?,
    }
    Ok(())
}

fn init_config(output: &Path) -> Result<()> {
    fs::write(output, AnalysisFileConfig::example())?;
    info!("Wrote example configuration to {}", output.display());
    println!("Created configuration file: {}", output.display());
    Ok(())
}
