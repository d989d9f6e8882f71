//! Fair Value Gap indicator.
//!
//! A bullish gap forms when a candle's low stays above the high of the candle
//! two places earlier, leaving a price range the middle candle skipped
//! through. Price returning into that range for the first time is the entry.

use crate::data::atr;
use crate::indicator::{Indicator, SignalContext};
use crate::indicators::Zone;
use crate::types::{Candle, EntrySignal};

/// Fair Value Gap indicator.
///
/// # Parameters
/// - `lookback`: candles searched for an unfilled gap (default: 50)
/// - `atr_period`: ATR period for the size filter (default: 14)
/// - `min_gap_atr`: minimum gap size in ATRs (default: 0.1)
///
/// # Signals
/// - Long: first retest of a bullish gap that closes at or above the gap bottom
/// - Short: first retest of a bearish gap that closes at or below the gap top
#[derive(Debug, Clone)]
pub struct FairValueGap {
    lookback: usize,
    atr_period: usize,
    min_gap_atr: f64,
}

impl FairValueGap {
    pub fn new(lookback: usize, atr_period: usize, min_gap_atr: f64) -> Self {
        assert!(lookback >= 3, "Lookback must cover a three-candle pattern");
        assert!(atr_period > 0, "ATR period must be positive");
        Self {
            lookback,
            atr_period,
            min_gap_atr,
        }
    }

    /// Create with default parameters (50, 14, 0.1).
    pub fn default_params() -> Self {
        Self::new(50, 14, 0.1)
    }

    fn bullish_gap(&self, candles: &[Candle], k: usize, min_size: f64) -> Option<Zone> {
        let (first, last) = (&candles[k - 2], &candles[k]);
        (last.low > first.high && last.low - first.high >= min_size).then_some(Zone {
            index: k,
            top: last.low,
            bottom: first.high,
        })
    }

    fn bearish_gap(&self, candles: &[Candle], k: usize, min_size: f64) -> Option<Zone> {
        let (first, last) = (&candles[k - 2], &candles[k]);
        (last.high < first.low && first.low - last.high >= min_size).then_some(Zone {
            index: k,
            top: first.low,
            bottom: last.high,
        })
    }
}

impl Indicator for FairValueGap {
    fn name(&self) -> &str {
        "Fair Value Gap"
    }

    fn evaluate(&self, ctx: &SignalContext) -> Option<EntrySignal> {
        let candles = ctx.history();
        let i = ctx.bar_index;
        if i < 3 {
            return None;
        }
        let min_size = atr(candles, self.atr_period)? * self.min_gap_atr;
        let current = ctx.current();
        let oldest = i.saturating_sub(self.lookback).max(2);

        // Newest gap that price has not returned to yet
        for k in (oldest..i).rev() {
            let since = &candles[k + 1..i];

            if let Some(zone) = self.bullish_gap(candles, k, min_size) {
                if since.iter().any(|c| c.low <= zone.top) {
                    continue;
                }
                if current.low <= zone.top && current.close >= zone.bottom {
                    return Some(EntrySignal::long(current.close));
                }
                return None;
            }

            if let Some(zone) = self.bearish_gap(candles, k, min_size) {
                if since.iter().any(|c| c.high >= zone.bottom) {
                    continue;
                }
                if current.high >= zone.bottom && current.close <= zone.top {
                    return Some(EntrySignal::short(current.close));
                }
                return None;
            }
        }
        None
    }

    fn warmup_period(&self) -> usize {
        self.atr_period + 1
    }

    fn parameters(&self) -> Vec<(String, String)> {
        vec![
            ("lookback".to_string(), self.lookback.to_string()),
            ("atr_period".to_string(), self.atr_period.to_string()),
            ("min_gap_atr".to_string(), format!("{:.2}", self.min_gap_atr)),
        ]
    }
}
