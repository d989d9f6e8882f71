//! Terminal and JSON output for analysis results.

use chrono::DateTime;
use colored::Colorize;
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};

use crate::backtest::{BacktestResult, BacktestTrade};
use crate::error::Result;
use crate::evaluation::ForecastEvaluation;
use crate::forecast::{CapabilityRegistry, ModelSelector};
use crate::predictor::PredictionSet;
use crate::ranking::{MultiTimeframeReport, Quality};
use crate::scanner::{MarketScan, Opportunity};
use crate::types::Trend;

/// Pretty-printed JSON of any result type.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Millisecond timestamp as `YYYY-MM-DD HH:MM` UTC.
pub fn format_time(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn signed_pct(pct: f64) -> String {
    if pct >= 0.0 {
        format!("+{:.2}%", pct)
    } else {
        format!("{:.2}%", pct)
    }
}

fn format_pct_change(pct: f64) -> String {
    if pct >= 0.0 {
        signed_pct(pct).green().to_string()
    } else {
        signed_pct(pct).red().to_string()
    }
}

fn banner(title: &str) {
    println!();
    println!("{}", "═".repeat(60).blue());
    println!("{}", format!(" {} ", title).bold().blue());
    println!("{}", "═".repeat(60).blue());
    println!();
}

/// Renders results for the terminal.
pub struct ReportFormatter;

impl ReportFormatter {
    pub fn print_prediction(set: &PredictionSet) {
        banner("PRICE FORECAST");

        println!("{}", "Overview".bold().underline());
        println!("  Symbol:          {} ({})", set.symbol, set.timeframe);
        println!("  Model:           {}", set.model_used);
        if set.model_used != set.requested_model {
            println!("  Requested:       {}", set.requested_model);
        }
        println!("  Current Price:   {:>12.4}", set.current_price);
        let trend = match set.trend {
            Trend::Bullish => set.trend.to_string().green(),
            Trend::Bearish => set.trend.to_string().red(),
            Trend::Neutral => set.trend.to_string().yellow(),
        };
        println!("  Trend:           {} (strength {:.0})", trend, set.trend_strength);
        println!(
            "  Expected Change: {:>12}",
            format_pct_change(set.expected_change_pct())
        );
        if set.degraded {
            println!("  {}", "Degraded: some models failed and were left out".yellow());
        }
        println!();

        println!("{}", Self::prediction_table(set));

        if let Some(ensemble) = &set.ensemble {
            println!();
            println!("{}", "Ensemble".bold().underline());
            for weight in &ensemble.weights {
                println!("  {:<14} {:>6.1}%", weight.model.as_str(), weight.weight * 100.0);
            }
            for dropped in &ensemble.dropped {
                println!("  {:<14} {}", dropped.model.as_str(), format!("dropped: {}", dropped.reason).red());
            }
        }

        if !set.metrics.is_empty() {
            println!();
            println!("{}", "Hold-out Accuracy".bold().underline());
            for (model, accuracy) in &set.metrics {
                println!(
                    "  {:<14} MAE {:>10.4}  RMSE {:>10.4}  MAPE {:>6.2}%",
                    model, accuracy.mae, accuracy.rmse, accuracy.mape
                );
            }
        }

        println!();
        println!("  {}", set.summary);
        println!("{}", "═".repeat(60).blue());
    }

    pub fn prediction_table(set: &PredictionSet) -> String {
        let mut builder = Builder::new();
        builder.push_record(["#", "Time", "Price", "Lower", "Upper", "Confidence"]);
        for (i, p) in set.predictions.iter().enumerate() {
            builder.push_record([
                (i + 1).to_string(),
                format_time(p.timestamp),
                format!("{:.4}", p.predicted_price),
                format!("{:.4}", p.lower_bound),
                format!("{:.4}", p.upper_bound),
                format!("{:.1}%", p.confidence),
            ]);
        }
        builder.build().with(Style::rounded()).to_string()
    }

    pub fn print_backtest(result: &BacktestResult, trade_limit: usize) {
        banner("BACKTEST RESULTS");

        println!("{}", "Overview".bold().underline());
        println!("  Indicator:       {}", result.indicator_name);
        println!("  Symbol:          {} ({})", result.symbol, result.timeframe);
        println!(
            "  Period:          {} to {}",
            format_time(result.start_time),
            format_time(result.end_time)
        );
        println!("  Risk/Reward:     {:>12.2}", result.risk_reward);
        println!();

        println!("{}", "Trade Statistics".bold().underline());
        println!("  Total Trades:    {:>12}", result.total_trades);
        println!(
            "  Winning Trades:  {:>12}  ({:.1}%)",
            result.winning_trades, result.win_rate
        );
        println!("  Losing Trades:   {:>12}", result.losing_trades);
        println!("  Profit Factor:   {:>12.2}", result.profit_factor);
        println!("  Total P&L:       {:>12}", format_pct_change(result.total_pnl));
        println!("  Average Win:     {:>11.2}%", result.avg_win);
        println!("  Average Loss:    {:>11.2}%", result.avg_loss);
        println!("  Max Drawdown:    {:>11.2}%", result.max_drawdown);
        println!("  Sharpe Ratio:    {:>12.2}", result.sharpe_ratio);
        println!();

        if result.trades.is_empty() {
            println!("No trades.");
        } else {
            println!("{}", Self::trades_table(&result.trades, trade_limit));
            if trade_limit > 0 && trade_limit < result.trades.len() {
                println!("... and {} more trades", result.trades.len() - trade_limit);
            }
        }
        println!("{}", "═".repeat(60).blue());
    }

    /// First `limit` trades as a table (0 = all).
    pub fn trades_table(trades: &[BacktestTrade], limit: usize) -> String {
        let shown = if limit > 0 && limit < trades.len() {
            &trades[..limit]
        } else {
            trades
        };

        let mut builder = Builder::new();
        builder.push_record(["#", "Entry Time", "Side", "Entry", "Exit", "Reason", "Bars", "Return %"]);
        for (i, trade) in shown.iter().enumerate() {
            builder.push_record([
                (i + 1).to_string(),
                format_time(trade.entry_time),
                trade.direction.to_string(),
                format!("{:.4}", trade.entry_price),
                format!("{:.4}", trade.exit_price),
                trade.exit_reason.to_string(),
                trade.candles_held.to_string(),
                signed_pct(trade.pnl_percent),
            ]);
        }
        builder.build().with(Style::rounded()).to_string()
    }

    pub fn print_ranking(report: &MultiTimeframeReport) {
        banner("MULTI-TIMEFRAME ANALYSIS");

        println!("{}", "Overview".bold().underline());
        println!("  Symbol:          {}", report.symbol);
        println!("  Best Timeframe:  {}", report.best_timeframe.to_string().bold().green());
        println!(
            "  Best Indicator:  {} on {} (score {:.1})",
            report.best_overall_indicator.indicator_name,
            report.best_overall_indicator.timeframe,
            report.best_overall_indicator.composite_score
        );
        println!(
            "  Analyzed:        {} timeframes, {} backtests, {:.1}% avg respect",
            report.summary.total_timeframes_analyzed,
            report.summary.total_indicators_tested,
            report.summary.avg_respect_rate
        );
        for skipped in &report.summary.skipped_timeframes {
            println!(
                "  {}",
                format!("Skipped {}: {}", skipped.timeframe, skipped.reason).yellow()
            );
        }
        println!();

        println!("{}", Self::ranking_table(report));

        if !report.summary.most_reliable_indicators.is_empty() {
            println!();
            println!("{}", "Most Reliable Indicators".bold().underline());
            for item in &report.summary.most_reliable_indicators {
                println!(
                    "  {:<16} avg score {:>5.1}  best on {}",
                    item.indicator_name, item.avg_score, item.best_timeframe
                );
            }
        }

        println!();
        println!("{}", "Recommendations".bold().underline());
        for line in &report.recommendations {
            println!("  - {}", line);
        }
        println!("{}", "═".repeat(60).blue());
    }

    pub fn ranking_table(report: &MultiTimeframeReport) -> String {
        let mut builder = Builder::new();
        builder.push_record(["Timeframe", "Respect %", "Score", "Quality", "Best Indicator", "Win Rate", "Trades", "Confidence"]);
        for analysis in &report.timeframes {
            let best = &analysis.best_indicator;
            let quality = match analysis.quality {
                Quality::Excellent => "excellent",
                Quality::Good => "good",
                Quality::Fair => "fair",
                Quality::Poor => "poor",
            };
            builder.push_record([
                analysis.timeframe.to_string(),
                format!("{:.1}", analysis.respect_rate),
                format!("{:.1}", analysis.total_score),
                quality.to_string(),
                best.indicator_name.clone(),
                format!("{:.1}%", best.win_rate),
                best.total_trades.to_string(),
                best.confidence_level.to_string(),
            ]);
        }
        builder.build().with(Style::rounded()).to_string()
    }

    pub fn print_scan(scan: &MarketScan) {
        banner("MARKET SCAN");
        if scan.assets.is_empty() {
            println!("No symbol could be scored.");
        } else {
            println!("{}", Self::scan_table(scan));
        }
        for failure in &scan.failed {
            println!(
                "  {}",
                format!("Skipped {}: {}", failure.symbol, failure.reason).yellow()
            );
        }
        println!("{}", "═".repeat(60).blue());
    }

    pub fn scan_table(scan: &MarketScan) -> String {
        let mut builder = Builder::new();
        builder.push_record(["#", "Symbol", "Price", "24h %", "Score", "Strategy", "Timeframe", "Win Rate", "Trend", "RSI", "Recommendation"]);
        for (i, asset) in scan.assets.iter().enumerate() {
            let recommendation = match asset.recommendation {
                Opportunity::Strong => asset.recommendation.to_string().green().bold().to_string(),
                Opportunity::Good => asset.recommendation.to_string().green().to_string(),
                Opportunity::Neutral => asset.recommendation.to_string(),
                Opportunity::Avoid => asset.recommendation.to_string().red().to_string(),
            };
            builder.push_record([
                (i + 1).to_string(),
                asset.symbol.clone(),
                format!("{:.4}", asset.price),
                signed_pct(asset.change_24h),
                format!("{:.1}", asset.smc_score),
                asset.best_strategy.clone(),
                asset.best_timeframe.to_string(),
                format!("{:.1}%", asset.win_rate),
                asset.trend.to_string(),
                format!("{:.0}", asset.rsi),
                recommendation,
            ]);
        }
        builder.build().with(Style::rounded()).to_string()
    }

    pub fn print_evaluations(evaluations: &[ForecastEvaluation]) {
        banner("FORECAST EVALUATION");
        if evaluations.is_empty() {
            println!("No model could be evaluated.");
        } else {
            println!("{}", Self::evaluation_table(evaluations));
            println!();
            for evaluation in evaluations {
                println!("  {:<14} {}", evaluation.model.to_string(), evaluation.summary);
            }
        }
        println!("{}", "═".repeat(60).blue());
    }

    pub fn evaluation_table(evaluations: &[ForecastEvaluation]) -> String {
        let mut builder = Builder::new();
        builder.push_record(["Model", "Forecasts", "Direction %", "MAE", "RMSE", "MAPE %", "Trades", "Win Rate", "P&L %"]);
        for e in evaluations {
            builder.push_record([
                e.model.to_string(),
                e.total_predictions.to_string(),
                format!("{:.1}", e.directional_accuracy),
                format!("{:.4}", e.accuracy.mae),
                format!("{:.4}", e.accuracy.rmse),
                format!("{:.2}", e.accuracy.mape),
                e.trade_metrics.total_trades.to_string(),
                format!("{:.1}%", e.trade_metrics.win_rate),
                signed_pct(e.trade_metrics.total_pnl),
            ]);
        }
        builder.build().with(Style::rounded()).to_string()
    }

    pub fn print_models(registry: &CapabilityRegistry) {
        println!("{}", "Available forecast models".bold().underline());
        for model in registry.available_models() {
            let description = match model {
                ModelSelector::Auto => "Ensemble when two or more adapters are available, else baseline",
                ModelSelector::Baseline => "Moving-average drift extrapolation",
                ModelSelector::Adapter(kind) => kind.description(),
                ModelSelector::Ensemble => "Confidence-weighted blend of every adapter",
            };
            println!("  {:<14} {}", model.to_string(), description);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::BacktestTrade;
    use crate::types::{Direction, ExitReason};

    fn trade(pnl: f64) -> BacktestTrade {
        BacktestTrade {
            entry_time: 0,
            entry_price: 100.0,
            direction: Direction::Long,
            stop_loss: 99.0,
            take_profit: 102.0,
            exit_time: 3_600_000,
            exit_price: 100.0 + pnl,
            exit_reason: ExitReason::TakeProfit,
            pnl_percent: pnl,
            candles_held: 1,
        }
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "1970-01-01 00:00");
        assert_eq!(format_time(86_400_000 + 90 * 60_000), "1970-01-02 01:30");
    }

    #[test]
    fn test_signed_pct() {
        assert_eq!(signed_pct(1.234), "+1.23%");
        assert_eq!(signed_pct(-0.5), "-0.50%");
    }

    #[test]
    fn test_trades_table_respects_limit() {
        let trades = vec![trade(2.0), trade(-1.0), trade(2.0)];
        let table = ReportFormatter::trades_table(&trades, 2);
        assert!(table.contains("+2.00%"));
        assert!(table.contains("-1.00%"));
        assert!(table.contains("take_profit"));
        // third trade cut by the limit
        assert_eq!(table.matches("LONG").count(), 2);
    }

    #[test]
    fn test_json_output() {
        let json = to_json(&trade(2.0)).unwrap();
        assert!(json.contains("\"exit_reason\": \"take_profit\""));
        assert!(json.contains("\"direction\": \"long\""));
    }

    #[test]
    fn test_scan_table_lists_assets_in_order() {
        use crate::scanner::{AssetScore, MarketTrend};
        use crate::timeframe::Timeframe;

        let asset = |symbol: &str, score: f64| AssetScore {
            symbol: symbol.to_string(),
            price: 10.0,
            volume_24h: 0.0,
            change_24h: -1.5,
            smc_score: score,
            best_strategy: "CISD".to_string(),
            best_timeframe: Timeframe::M15,
            win_rate: 48.0,
            trend: MarketTrend::Pullback,
            rsi: 41.2,
            recommendation: Opportunity::from_score(score),
        };
        let scan = MarketScan {
            assets: vec![asset("SOLUSDT", 72.0), asset("ADAUSDT", 12.0)],
            failed: Vec::new(),
        };
        let table = ReportFormatter::scan_table(&scan);
        assert!(table.find("SOLUSDT").unwrap() < table.find("ADAUSDT").unwrap());
        assert!(table.contains("strong opportunity"));
        assert!(table.contains("pullback"));
        assert!(table.contains("-1.50%"));
    }
}
