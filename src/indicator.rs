//! Indicator trait and the prefix-only context it is evaluated on.

use crate::types::{Candle, EntrySignal};

/// View of the candles available at one simulated step.
///
/// Only candles up to and including the current one are reachable, so an
/// indicator cannot read the future even by accident.
#[derive(Debug, Clone, Copy)]
pub struct SignalContext<'a> {
    /// Index of the current candle.
    pub bar_index: usize,
    candles: &'a [Candle],
}

impl<'a> SignalContext<'a> {
    /// Context positioned on the last candle of `history`.
    ///
    /// Returns `None` for an empty slice.
    pub fn new(history: &'a [Candle]) -> Option<Self> {
        if history.is_empty() {
            return None;
        }
        Some(Self {
            bar_index: history.len() - 1,
            candles: history,
        })
    }

    pub fn current(&self) -> &'a Candle {
        &self.candles[self.bar_index]
    }

    pub fn prev(&self) -> Option<&'a Candle> {
        self.bar_at(1)
    }

    /// Candle at a lookback (0 = current, 1 = previous, etc.).
    pub fn bar_at(&self, lookback: usize) -> Option<&'a Candle> {
        if lookback <= self.bar_index {
            Some(&self.candles[self.bar_index - lookback])
        } else {
            None
        }
    }

    /// All candles up to and including the current one.
    pub fn history(&self) -> &'a [Candle] {
        self.candles
    }

    /// History as it was `lookback` candles ago.
    pub fn history_at(&self, lookback: usize) -> Option<&'a [Candle]> {
        if lookback <= self.bar_index {
            Some(&self.candles[..=self.bar_index - lookback])
        } else {
            None
        }
    }

    /// Closing prices of the last `n` candles.
    pub fn closes(&self, n: usize) -> Vec<f64> {
        let start = (self.bar_index + 1).saturating_sub(n);
        self.candles[start..].iter().map(|c| c.close).collect()
    }
}

/// A pluggable entry-signal generator.
///
/// Indicators are stateless: everything they need is recomputed from the
/// context, which lets one instance serve many concurrent backtests.
pub trait Indicator: Send + Sync {
    /// Human-readable indicator name.
    fn name(&self) -> &str;

    /// Entry signal for the current candle, if any.
    fn evaluate(&self, ctx: &SignalContext) -> Option<EntrySignal>;

    /// Minimum candles needed before the indicator can signal.
    fn warmup_period(&self) -> usize {
        0
    }

    /// Indicator parameters as key-value pairs for logging.
    fn parameters(&self) -> Vec<(String, String)> {
        vec![]
    }
}
