//! Simple Moving Average crossover.
//!
//! Classic trend-following entry: go long when the fast MA crosses above
//! the slow MA and short when it crosses below.

use crate::data::sma;
use crate::indicator::{Indicator, SignalContext};
use crate::types::EntrySignal;

/// SMA Crossover indicator.
///
/// # Parameters
/// - `fast_period`: Period for the fast moving average (default: 10)
/// - `slow_period`: Period for the slow moving average (default: 30)
///
/// # Signals
/// - Long: Fast MA crosses above Slow MA
/// - Short: Fast MA crosses below Slow MA
#[derive(Debug, Clone)]
pub struct SmaCrossover {
    fast_period: usize,
    slow_period: usize,
}

impl SmaCrossover {
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        assert!(
            fast_period > 0 && fast_period < slow_period,
            "Fast period must be positive and less than slow period"
        );
        Self {
            fast_period,
            slow_period,
        }
    }

    /// Create with default parameters (10/30).
    pub fn default_params() -> Self {
        Self::new(10, 30)
    }
}

impl Indicator for SmaCrossover {
    fn name(&self) -> &str {
        "SMA Crossover"
    }

    fn evaluate(&self, ctx: &SignalContext) -> Option<EntrySignal> {
        let history = ctx.history();
        let previous = ctx.history_at(1)?;

        let fast = sma(history, self.fast_period)?;
        let slow = sma(history, self.slow_period)?;
        let prev_fast = sma(previous, self.fast_period)?;
        let prev_slow = sma(previous, self.slow_period)?;

        let close = ctx.current().close;
        if prev_fast <= prev_slow && fast > slow {
            Some(EntrySignal::long(close))
        } else if prev_fast >= prev_slow && fast < slow {
            Some(EntrySignal::short(close))
        } else {
            None
        }
    }

    fn warmup_period(&self) -> usize {
        self.slow_period + 1
    }

    fn parameters(&self) -> Vec<(String, String)> {
        vec![
            ("fast_period".to_string(), self.fast_period.to_string()),
            ("slow_period".to_string(), self.slow_period.to_string()),
        ]
    }
}
