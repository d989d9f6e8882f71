//! Order Block indicator.
//!
//! An order block is the last opposing candle before a displacement: a bearish
//! candle followed by a strong bullish move (bullish block) or the mirror
//! image. A block is only confirmed once its displacement candles have closed,
//! and the entry fires on the first candle that trades back into it.

use crate::data::atr;
use crate::indicator::{Indicator, SignalContext};
use crate::indicators::Zone;
use crate::types::{Candle, EntrySignal};

/// Order Block indicator.
///
/// # Parameters
/// - `lookback`: candles searched for a confirmed block (default: 50)
/// - `atr_period`: ATR period used to measure displacement (default: 14)
/// - `min_strength`: minimum displacement in ATRs (default: 0.3)
///
/// # Signals
/// - Long: first retest of an untouched bullish block that closes above its low
/// - Short: first retest of an untouched bearish block that closes below its high
#[derive(Debug, Clone)]
pub struct OrderBlock {
    lookback: usize,
    atr_period: usize,
    min_strength: f64,
}

/// Candles after the block that must confirm the displacement.
const CONFIRMATION: usize = 3;

impl OrderBlock {
    pub fn new(lookback: usize, atr_period: usize, min_strength: f64) -> Self {
        assert!(lookback > CONFIRMATION, "Lookback must exceed the confirmation window");
        assert!(atr_period > 0, "ATR period must be positive");
        Self {
            lookback,
            atr_period,
            min_strength,
        }
    }

    /// Create with default parameters (50, 14, 0.3).
    pub fn default_params() -> Self {
        Self::new(50, 14, 0.3)
    }

    fn bullish_block(&self, candles: &[Candle], k: usize, atr: f64) -> Option<Zone> {
        let block = &candles[k];
        let follow = &candles[k + 1..=k + CONFIRMATION];
        if !block.is_bearish() || follow.iter().filter(|c| c.is_bullish()).count() < 2 {
            return None;
        }
        let peak = follow.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let strength = (peak - block.close) / atr;
        (strength >= self.min_strength).then_some(Zone {
            index: k,
            top: block.high,
            bottom: block.low,
        })
    }

    fn bearish_block(&self, candles: &[Candle], k: usize, atr: f64) -> Option<Zone> {
        let block = &candles[k];
        let follow = &candles[k + 1..=k + CONFIRMATION];
        if !block.is_bullish() || follow.iter().filter(|c| c.is_bearish()).count() < 2 {
            return None;
        }
        let trough = follow.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let strength = (block.close - trough) / atr;
        (strength >= self.min_strength).then_some(Zone {
            index: k,
            top: block.high,
            bottom: block.low,
        })
    }
}

impl Indicator for OrderBlock {
    fn name(&self) -> &str {
        "Order Block"
    }

    fn evaluate(&self, ctx: &SignalContext) -> Option<EntrySignal> {
        let candles = ctx.history();
        let i = ctx.bar_index;
        if i < CONFIRMATION + 2 {
            return None;
        }
        let atr = atr(candles, self.atr_period).filter(|a| *a > 0.0)?;
        let current = ctx.current();

        // Blocks whose confirmation closed before the current candle, newest first
        let newest = i - 1 - CONFIRMATION;
        let oldest = i.saturating_sub(self.lookback);

        for k in (oldest..=newest).rev() {
            // Candles between confirmation and now must not have revisited the block
            let since = &candles[k + CONFIRMATION + 1..i];

            if let Some(zone) = self.bullish_block(candles, k, atr) {
                if since.iter().any(|c| c.low <= zone.top) {
                    continue;
                }
                if current.low <= zone.top && current.close > zone.bottom {
                    return Some(EntrySignal::long(current.close));
                }
                return None;
            }

            if let Some(zone) = self.bearish_block(candles, k, atr) {
                if since.iter().any(|c| c.high >= zone.bottom) {
                    continue;
                }
                if current.high >= zone.bottom && current.close < zone.top {
                    return Some(EntrySignal::short(current.close));
                }
                return None;
            }
        }
        None
    }

    fn warmup_period(&self) -> usize {
        (self.atr_period + 1).max(CONFIRMATION + 3)
    }

    fn parameters(&self) -> Vec<(String, String)> {
        vec![
            ("lookback".to_string(), self.lookback.to_string()),
            ("atr_period".to_string(), self.atr_period.to_string()),
            ("min_strength".to_string(), format!("{:.2}", self.min_strength)),
        ]
    }
}
