//! Fibonacci retracement indicator.

use crate::indicator::{Indicator, SignalContext};
use crate::types::EntrySignal;

/// Trades a pullback into the golden-pocket retracement of the recent swing.
///
/// The swing is the highest high and lowest low of the `lookback` candles
/// before the current one. If the low came first the swing is up and the
/// retracement levels sit below the high; otherwise they sit above the low.
///
/// # Parameters
/// - `lookback`: candles defining the swing (default: 100)
/// - `levels`: retracement ratios (default: 0.618, 0.786)
/// - `tolerance`: relative distance counted as touching a level (default: 0.5%)
/// - `min_range_pct`: smallest swing, as percent of its low, worth trading (default: 1%)
///
/// # Signals
/// - Long: close arrives at a level of an up-swing
/// - Short: close arrives at a level of a down-swing
#[derive(Debug, Clone)]
pub struct Fibonacci {
    lookback: usize,
    levels: Vec<f64>,
    tolerance: f64,
    min_range_pct: f64,
}

impl Fibonacci {
    pub fn new(lookback: usize, levels: Vec<f64>, tolerance: f64, min_range_pct: f64) -> Self {
        assert!(lookback >= 2, "Lookback must cover a swing");
        assert!(
            levels.iter().all(|l| (0.0..1.0).contains(l)),
            "Retracement levels must be in [0, 1)"
        );
        Self {
            lookback,
            levels,
            tolerance,
            min_range_pct,
        }
    }

    /// Create with default parameters (100, [0.618, 0.786], 0.5%, 1%).
    pub fn default_params() -> Self {
        Self::new(100, vec![0.618, 0.786], 0.005, 1.0)
    }

    fn near_level(&self, price: f64, level: f64) -> bool {
        level > 0.0 && ((price - level) / level).abs() <= self.tolerance
    }
}

impl Indicator for Fibonacci {
    fn name(&self) -> &str {
        "Fibonacci"
    }

    fn evaluate(&self, ctx: &SignalContext) -> Option<EntrySignal> {
        let i = ctx.bar_index;
        if i < self.lookback {
            return None;
        }
        let history = ctx.history();
        let swing = &history[i - self.lookback..i];

        let (high_idx, high) = swing
            .iter()
            .enumerate()
            .map(|(k, c)| (k, c.high))
            .fold((0, f64::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        let (low_idx, low) = swing
            .iter()
            .enumerate()
            .map(|(k, c)| (k, c.low))
            .fold((0, f64::MAX), |best, cur| if cur.1 < best.1 { cur } else { best });

        let range = high - low;
        if low <= 0.0 || range / low * 100.0 < self.min_range_pct {
            return None;
        }

        let close = ctx.current().close;
        let prev_close = ctx.prev()?.close;
        let uptrend = low_idx < high_idx;

        for &ratio in &self.levels {
            let level = if uptrend {
                high - range * ratio
            } else {
                low + range * ratio
            };
            // Fresh touch only: the previous close was away from the level
            if self.near_level(close, level) && !self.near_level(prev_close, level) {
                return Some(if uptrend {
                    EntrySignal::long(close)
                } else {
                    EntrySignal::short(close)
                });
            }
        }
        None
    }

    fn warmup_period(&self) -> usize {
        self.lookback + 1
    }

    fn parameters(&self) -> Vec<(String, String)> {
        let levels: Vec<String> = self.levels.iter().map(|l| format!("{:.3}", l)).collect();
        vec![
            ("lookback".to_string(), self.lookback.to_string()),
            ("levels".to_string(), levels.join("/")),
            ("tolerance".to_string(), format!("{:.4}", self.tolerance)),
        ]
    }
}
