//! Change in State of Delivery (CISD).
//!
//! A liquidity sweep takes out the extreme of the recent range and closes back
//! inside it. The delivery state changes when the next candle closes beyond
//! the opposite end of the sweep candle.

use crate::indicator::{Indicator, SignalContext};
use crate::types::EntrySignal;

/// CISD indicator.
///
/// # Parameters
/// - `lookback`: candles before the sweep that define the liquidity pool (default: 10)
///
/// # Signals
/// - Long: sweep below the recent low, then a close above the sweep candle's high
/// - Short: sweep above the recent high, then a close below the sweep candle's low
#[derive(Debug, Clone)]
pub struct Cisd {
    lookback: usize,
}

impl Cisd {
    pub fn new(lookback: usize) -> Self {
        assert!(lookback > 0, "Lookback must be positive");
        Self { lookback }
    }

    /// Create with default parameters (10).
    pub fn default_params() -> Self {
        Self::new(10)
    }
}

impl Indicator for Cisd {
    fn name(&self) -> &str {
        "CISD"
    }

    fn evaluate(&self, ctx: &SignalContext) -> Option<EntrySignal> {
        let i = ctx.bar_index;
        if i < self.lookback + 1 {
            return None;
        }
        let history = ctx.history();
        let sweep = &history[i - 1];
        let pool = &history[i - 1 - self.lookback..i - 1];
        let current = ctx.current();

        let pool_low = pool.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let pool_high = pool.iter().map(|c| c.high).fold(f64::MIN, f64::max);

        if sweep.low < pool_low && sweep.close > pool_low && current.close > sweep.high {
            return Some(EntrySignal::long(current.close));
        }
        if sweep.high > pool_high && sweep.close < pool_high && current.close < sweep.low {
            return Some(EntrySignal::short(current.close));
        }
        None
    }

    fn warmup_period(&self) -> usize {
        self.lookback + 2
    }

    fn parameters(&self) -> Vec<(String, String)> {
        vec![("lookback".to_string(), self.lookback.to_string())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{candle, quiet};
    use crate::types::Direction;

    #[test]
    fn test_bullish_shift_after_sweep() {
        let mut candles = quiet(20, 100.0);
        // wicks below the 99.5 lows and closes back inside
        candles.push(candle(20, 100.0, 100.2, 99.0, 99.8));
        candles.push(candle(21, 99.8, 100.8, 99.7, 100.6));

        let ctx = SignalContext::new(&candles).unwrap();
        let signal = Cisd::default_params().evaluate(&ctx).unwrap();
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.entry_price, 100.6);
    }

    #[test]
    fn test_bearish_shift_after_sweep() {
        let mut candles = quiet(20, 100.0);
        candles.push(candle(20, 100.0, 101.0, 99.8, 100.2));
        candles.push(candle(21, 100.2, 100.3, 99.4, 99.6));

        let ctx = SignalContext::new(&candles).unwrap();
        let signal = Cisd::default_params().evaluate(&ctx).unwrap();
        assert_eq!(signal.direction, Direction::Short);
    }

    #[test]
    fn test_sweep_without_shift() {
        let mut candles = quiet(20, 100.0);
        candles.push(candle(20, 100.0, 100.2, 99.0, 99.8));
        // stays below the sweep candle's high
        candles.push(candle(21, 99.8, 100.1, 99.6, 100.0));

        let ctx = SignalContext::new(&candles).unwrap();
        assert!(Cisd::default_params().evaluate(&ctx).is_none());
    }

    #[test]
    fn test_needs_full_pool() {
        let candles = quiet(8, 100.0);
        let ctx = SignalContext::new(&candles).unwrap();
        assert!(Cisd::default_params().evaluate(&ctx).is_none());
    }
}
