//! Single-position backtest simulator.
//!
//! The simulator alternates between two states. While scanning, the
//! indicator is asked for a signal on every candle using only the candles up
//! to that point. Once entered, each following candle is checked against the
//! stop-loss and take-profit levels until the trade closes, after which
//! scanning resumes on the next candle. Only one trade is ever open.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AnalysisError, Result};
use crate::indicator::{Indicator, SignalContext};
use crate::indicators::IndicatorKind;
use crate::metrics::MetricsCalculator;
use crate::timeframe::Timeframe;
use crate::types::{validate_candles, Candle, Direction, EntrySignal, ExitReason};

/// Risk settings for a backtest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Stop distance as a percent of the entry price.
    #[serde(default = "default_risk_pct")]
    pub risk_pct: f64,
    /// Take-profit distance as a multiple of the stop distance.
    #[serde(default = "default_risk_reward")]
    pub risk_reward: f64,
    /// Close the trade at market after this many candles (None = hold).
    #[serde(default)]
    pub max_hold_candles: Option<usize>,
}

fn default_risk_pct() -> f64 {
    1.0
}

fn default_risk_reward() -> f64 {
    2.0
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            risk_pct: default_risk_pct(),
            risk_reward: default_risk_reward(),
            max_hold_candles: None,
        }
    }
}

impl BacktestConfig {
    pub fn with_risk_reward(risk_reward: f64) -> Self {
        Self {
            risk_reward,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.risk_pct.is_finite() && self.risk_pct > 0.0 && self.risk_pct < 100.0) {
            return Err(AnalysisError::InvalidParameter(format!(
                "risk_pct must be in (0, 100), got {}",
                self.risk_pct
            )));
        }
        if !(self.risk_reward.is_finite() && self.risk_reward > 0.0) {
            return Err(AnalysisError::InvalidParameter(format!(
                "risk_reward must be positive, got {}",
                self.risk_reward
            )));
        }
        if self.max_hold_candles == Some(0) {
            return Err(AnalysisError::InvalidParameter(
                "max_hold_candles must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A completed simulated trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub entry_time: i64,
    pub entry_price: f64,
    pub direction: Direction,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub exit_time: i64,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    /// Return of the trade in percent of the entry price.
    pub pnl_percent: f64,
    pub candles_held: usize,
}

impl BacktestTrade {
    pub fn is_winner(&self) -> bool {
        self.pnl_percent > 0.0
    }
}

/// Outcome of one indicator on one timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub indicator_name: String,
    pub trades: Vec<BacktestTrade>,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_pnl: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub start_time: i64,
    pub end_time: i64,
    pub risk_reward: f64,
}

/// Replays an indicator over a candle series.
#[derive(Debug, Clone, Default)]
pub struct BacktestSimulator {
    config: BacktestConfig,
}

impl BacktestSimulator {
    pub fn new(config: BacktestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run `indicator` over `candles` and collect the resulting trades.
    pub fn run(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
        indicator: &dyn Indicator,
    ) -> Result<BacktestResult> {
        let warmup = indicator.warmup_period();
        if candles.len() <= warmup {
            return Err(AnalysisError::insufficient(
                format!("backtest of {}", indicator.name()),
                warmup + 1,
                candles.len(),
            ));
        }
        validate_candles(candles)?;

        info!(
            "Running backtest: {} on {} {} ({} candles)",
            indicator.name(),
            symbol,
            timeframe,
            candles.len()
        );

        let trades = self.simulate(candles, indicator, warmup);
        let metrics = MetricsCalculator::for_timeframe(timeframe).trades(&trades);

        let result = BacktestResult {
            symbol: symbol.to_string(),
            timeframe,
            indicator_name: indicator.name().to_string(),
            trades,
            win_rate: metrics.win_rate,
            profit_factor: metrics.profit_factor,
            total_pnl: metrics.total_pnl,
            max_drawdown: metrics.max_drawdown,
            sharpe_ratio: metrics.sharpe_ratio,
            total_trades: metrics.total_trades,
            winning_trades: metrics.winning_trades,
            losing_trades: metrics.losing_trades,
            avg_win: metrics.avg_win,
            avg_loss: metrics.avg_loss,
            start_time: candles[0].open_time,
            end_time: candles[candles.len() - 1].open_time,
            risk_reward: self.config.risk_reward,
        };

        info!(
            "Backtest complete: {} trades, {:.1}% win rate, PF {:.2}",
            result.total_trades, result.win_rate, result.profit_factor
        );

        Ok(result)
    }

    fn simulate(&self, candles: &[Candle], indicator: &dyn Indicator, start: usize) -> Vec<BacktestTrade> {
        let last = candles.len() - 1;
        let mut trades = Vec::new();
        let mut i = start;

        // The final candle never opens a trade: nothing is left to monitor it on
        while i < last {
            let signal = SignalContext::new(&candles[..=i]).and_then(|ctx| indicator.evaluate(&ctx));
            let Some(signal) = signal else {
                i += 1;
                continue;
            };
            if !(signal.entry_price.is_finite() && signal.entry_price > 0.0) {
                debug!("Ignoring signal with entry price {}", signal.entry_price);
                i += 1;
                continue;
            }

            let (trade, exit_index) = self.manage(candles, i, signal);
            debug!(
                "Trade closed: {:?} {:.4} -> {:.4} ({}, {:+.2}%)",
                trade.direction, trade.entry_price, trade.exit_price, trade.exit_reason, trade.pnl_percent
            );
            trades.push(trade);
            i = exit_index + 1;
        }
        trades
    }

    /// Follow a trade opened on candle `entry` until it closes.
    fn manage(&self, candles: &[Candle], entry: usize, signal: EntrySignal) -> (BacktestTrade, usize) {
        let entry_price = signal.entry_price;
        let stop_distance = entry_price * self.config.risk_pct / 100.0;
        let target_distance = stop_distance * self.config.risk_reward;
        let (stop_loss, take_profit) = match signal.direction {
            Direction::Long => (entry_price - stop_distance, entry_price + target_distance),
            Direction::Short => (entry_price + stop_distance, entry_price - target_distance),
        };

        let last = candles.len() - 1;
        let mut exit = (last, candles[last].close, ExitReason::EndOfData);

        for (j, candle) in candles.iter().enumerate().skip(entry + 1) {
            let (stopped, target_hit) = match signal.direction {
                Direction::Long => (candle.low <= stop_loss, candle.high >= take_profit),
                Direction::Short => (candle.high >= stop_loss, candle.low <= take_profit),
            };
            // Both levels inside one candle count as a loss
            if stopped {
                exit = (j, stop_loss, ExitReason::StopLoss);
                break;
            }
            if target_hit {
                exit = (j, take_profit, ExitReason::TakeProfit);
                break;
            }
            if self.config.max_hold_candles.is_some_and(|max| j - entry >= max) {
                exit = (j, candle.close, ExitReason::Timeout);
                break;
            }
        }

        let (exit_index, exit_price, exit_reason) = exit;
        let pnl_percent = match signal.direction {
            Direction::Long => (exit_price - entry_price) / entry_price * 100.0,
            Direction::Short => (entry_price - exit_price) / entry_price * 100.0,
        };

        let trade = BacktestTrade {
            entry_time: candles[entry].open_time,
            entry_price,
            direction: signal.direction,
            stop_loss,
            take_profit,
            exit_time: candles[exit_index].open_time,
            exit_price,
            exit_reason,
            pnl_percent,
            candles_held: exit_index - entry,
        };
        (trade, exit_index)
    }
}

/// Backtest a built-in indicator with default risk settings and the given
/// reward-to-risk ratio.
pub fn run_backtest(
    symbol: &str,
    timeframe: Timeframe,
    candles: &[Candle],
    indicator: IndicatorKind,
    risk_reward: f64,
) -> Result<BacktestResult> {
    let simulator = BacktestSimulator::new(BacktestConfig::with_risk_reward(risk_reward))?;
    simulator.run(symbol, timeframe, candles, indicator.build().as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Signals in a fixed direction on the listed candle indices.
    struct Scripted {
        at: Vec<usize>,
        direction: Direction,
    }

    impl Indicator for Scripted {
        fn name(&self) -> &str {
            "Scripted"
        }

        fn evaluate(&self, ctx: &SignalContext) -> Option<EntrySignal> {
            self.at.contains(&ctx.bar_index).then(|| EntrySignal {
                direction: self.direction,
                entry_price: ctx.current().close,
            })
        }
    }

    fn long_at(at: Vec<usize>) -> Scripted {
        Scripted {
            at,
            direction: Direction::Long,
        }
    }

    fn flat(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(i as i64 * 60_000, 100.0, 100.2, 99.8, 100.0, 10.0))
            .collect()
    }

    fn set(candles: &mut [Candle], i: usize, high: f64, low: f64, close: f64) {
        let c = &mut candles[i];
        c.high = high;
        c.low = low;
        c.close = close;
    }

    fn run(candles: &[Candle], indicator: &dyn Indicator, config: BacktestConfig) -> BacktestResult {
        BacktestSimulator::new(config)
            .unwrap()
            .run("TEST", Timeframe::H1, candles, indicator)
            .unwrap()
    }

    #[test]
    fn test_take_profit() {
        let mut candles = flat(12);
        set(&mut candles, 6, 102.5, 99.9, 102.2);

        let result = run(&candles, &long_at(vec![5]), BacktestConfig::default());
        assert_eq!(result.total_trades, 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert!((trade.stop_loss - 99.0).abs() < 1e-9);
        assert!((trade.exit_price - 102.0).abs() < 1e-9);
        assert!((trade.pnl_percent - 2.0).abs() < 1e-9);
        assert_eq!(trade.candles_held, 1);
        assert_eq!(result.win_rate, 100.0);
        assert_eq!(result.profit_factor, crate::metrics::PROFIT_FACTOR_CAP);
    }

    #[test]
    fn test_stop_checked_before_target() {
        let mut candles = flat(12);
        // one candle spans both levels
        set(&mut candles, 6, 102.5, 98.5, 100.0);

        let result = run(&candles, &long_at(vec![5]), BacktestConfig::default());
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert!((trade.pnl_percent + 1.0).abs() < 1e-9);
        assert_eq!(result.losing_trades, 1);
    }

    #[test]
    fn test_short_levels_mirror_long() {
        let mut candles = flat(12);
        set(&mut candles, 7, 100.1, 97.5, 97.8);
        let short = Scripted {
            at: vec![5],
            direction: Direction::Short,
        };

        let result = run(&candles, &short, BacktestConfig::default());
        let trade = &result.trades[0];
        assert!((trade.stop_loss - 101.0).abs() < 1e-9);
        assert!((trade.take_profit - 98.0).abs() < 1e-9);
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(trade.candles_held, 2);
        assert!((trade.pnl_percent - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_timeout_exit() {
        let candles = flat(20);
        let config = BacktestConfig {
            max_hold_candles: Some(3),
            ..BacktestConfig::default()
        };

        let result = run(&candles, &long_at(vec![5]), config);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::Timeout);
        assert_eq!(trade.candles_held, 3);
        assert_eq!(trade.exit_time, candles[8].open_time);
        assert_eq!(trade.pnl_percent, 0.0);
    }

    #[test]
    fn test_open_trade_closes_at_end_of_data() {
        let mut candles = flat(10);
        set(&mut candles, 9, 100.6, 99.9, 100.5);

        let result = run(&candles, &long_at(vec![5]), BacktestConfig::default());
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::EndOfData);
        assert_eq!(trade.exit_price, 100.5);
        assert_eq!(trade.candles_held, 4);
    }

    #[test]
    fn test_no_entry_on_final_candle() {
        let candles = flat(10);
        let result = run(&candles, &long_at(vec![9]), BacktestConfig::default());
        assert!(result.trades.is_empty());
    }

    #[test]
    fn test_no_signals_gives_zero_metrics() {
        let candles = flat(30);
        let result = run(&candles, &long_at(vec![]), BacktestConfig::default());
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.win_rate, 0.0);
        assert_eq!(result.profit_factor, 0.0);
        assert_eq!(result.max_drawdown, 0.0);
        assert_eq!(result.sharpe_ratio, 0.0);
        assert_eq!(result.start_time, candles[0].open_time);
        assert_eq!(result.end_time, candles[29].open_time);
    }

    #[test]
    fn test_trades_never_overlap() {
        let candles = flat(40);
        let config = BacktestConfig {
            max_hold_candles: Some(4),
            ..BacktestConfig::default()
        };
        // signals on every candle
        let result = run(&candles, &long_at((0..40).collect()), config);

        assert!(result.total_trades > 1);
        for pair in result.trades.windows(2) {
            assert!(pair[1].entry_time > pair[0].exit_time);
        }
    }

    #[test]
    fn test_insufficient_candles() {
        struct Slow;
        impl Indicator for Slow {
            fn name(&self) -> &str {
                "Slow"
            }
            fn evaluate(&self, _ctx: &SignalContext) -> Option<EntrySignal> {
                None
            }
            fn warmup_period(&self) -> usize {
                50
            }
        }

        let err = BacktestSimulator::default()
            .run("TEST", Timeframe::H1, &flat(20), &Slow)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { .. }));
    }

    #[test]
    fn test_invalid_config() {
        let config = BacktestConfig {
            risk_reward: 0.0,
            ..BacktestConfig::default()
        };
        assert!(BacktestSimulator::new(config).is_err());
        assert!(run_backtest("X", Timeframe::H1, &flat(10), IndicatorKind::Cisd, -1.0).is_err());
    }

    #[test]
    fn test_run_backtest_with_builtin_indicator() {
        let candles = flat(200);
        let result = run_backtest("X", Timeframe::M15, &candles, IndicatorKind::SmaCrossover, 2.0).unwrap();
        assert_eq!(result.indicator_name, "SMA Crossover");
        assert_eq!(result.risk_reward, 2.0);
    }
}
