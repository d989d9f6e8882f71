//! Built-in entry-signal indicators.
//!
//! Smart-money-concept detectors:
//!
//! - [`OrderBlock`]: first retest of the last opposing candle before a displacement
//! - [`FairValueGap`]: first retest of a three-candle price imbalance
//! - [`Fibonacci`]: touch of the 0.618 / 0.786 retracement of the recent swing
//! - [`Cisd`]: change in state of delivery after a liquidity sweep
//!
//! Classic technical indicators:
//!
//! - [`SmaCrossover`]: fast/slow moving-average crossover
//! - [`RsiReversal`]: RSI leaving oversold/overbought territory

mod cisd;
mod fair_value_gap;
mod fibonacci;
mod order_block;
mod rsi_reversal;
mod sma_crossover;

pub use cisd::Cisd;
pub use fair_value_gap::FairValueGap;
pub use fibonacci::Fibonacci;
pub use order_block::OrderBlock;
pub use rsi_reversal::RsiReversal;
pub use sma_crossover::SmaCrossover;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnalysisError;
use crate::indicator::Indicator;

/// Price zone left behind by a pattern at `index`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Zone {
    pub index: usize,
    pub top: f64,
    pub bottom: f64,
}

/// Catalogue of built-in indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    OrderBlock,
    FairValueGap,
    Fibonacci,
    Cisd,
    SmaCrossover,
    RsiReversal,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 6] = [
        IndicatorKind::OrderBlock,
        IndicatorKind::FairValueGap,
        IndicatorKind::Fibonacci,
        IndicatorKind::Cisd,
        IndicatorKind::SmaCrossover,
        IndicatorKind::RsiReversal,
    ];

    /// Indicators tested by default when ranking timeframes.
    pub const SMART_MONEY: [IndicatorKind; 4] = [
        IndicatorKind::OrderBlock,
        IndicatorKind::FairValueGap,
        IndicatorKind::Fibonacci,
        IndicatorKind::Cisd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::OrderBlock => "order_block",
            IndicatorKind::FairValueGap => "fair_value_gap",
            IndicatorKind::Fibonacci => "fibonacci",
            IndicatorKind::Cisd => "cisd",
            IndicatorKind::SmaCrossover => "sma_crossover",
            IndicatorKind::RsiReversal => "rsi_reversal",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            IndicatorKind::OrderBlock => "Retest of the last opposing candle before a strong move",
            IndicatorKind::FairValueGap => "Retest of a three-candle imbalance",
            IndicatorKind::Fibonacci => "Touch of the 0.618/0.786 retracement of the last swing",
            IndicatorKind::Cisd => "Break of the sweep candle after a liquidity grab",
            IndicatorKind::SmaCrossover => "Fast SMA crossing the slow SMA",
            IndicatorKind::RsiReversal => "RSI leaving oversold/overbought territory",
        }
    }

    /// Instance with default parameters.
    pub fn build(&self) -> Box<dyn Indicator> {
        match self {
            IndicatorKind::OrderBlock => Box::new(OrderBlock::default_params()),
            IndicatorKind::FairValueGap => Box::new(FairValueGap::default_params()),
            IndicatorKind::Fibonacci => Box::new(Fibonacci::default_params()),
            IndicatorKind::Cisd => Box::new(Cisd::default_params()),
            IndicatorKind::SmaCrossover => Box::new(SmaCrossover::default_params()),
            IndicatorKind::RsiReversal => Box::new(RsiReversal::default_params()),
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IndicatorKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "order_block" | "orderblock" | "ob" => Ok(IndicatorKind::OrderBlock),
            "fair_value_gap" | "fvg" => Ok(IndicatorKind::FairValueGap),
            "fibonacci" | "fib" => Ok(IndicatorKind::Fibonacci),
            "cisd" => Ok(IndicatorKind::Cisd),
            "sma_crossover" | "sma" => Ok(IndicatorKind::SmaCrossover),
            "rsi_reversal" | "rsi" => Ok(IndicatorKind::RsiReversal),
            other => Err(AnalysisError::InvalidParameter(format!(
                "unknown indicator '{}'",
                other
            ))),
        }
    }
}

/// Parse a comma-separated indicator list such as `"ob,fvg"`.
pub fn parse_indicators(list: &str) -> crate::error::Result<Vec<IndicatorKind>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
