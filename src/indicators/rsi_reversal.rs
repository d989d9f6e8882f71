//! RSI reversal indicator.

use crate::data::rsi;
use crate::indicator::{Indicator, SignalContext};
use crate::types::EntrySignal;

/// Enters when RSI leaves an extreme zone.
///
/// # Parameters
/// - `period`: RSI period (default: 14)
/// - `oversold`: Oversold threshold (default: 30)
/// - `overbought`: Overbought threshold (default: 70)
///
/// # Signals
/// - Long: RSI crosses back above the oversold threshold
/// - Short: RSI crosses back below the overbought threshold
#[derive(Debug, Clone)]
pub struct RsiReversal {
    period: usize,
    oversold: f64,
    overbought: f64,
}

impl RsiReversal {
    pub fn new(period: usize, oversold: f64, overbought: f64) -> Self {
        assert!(period > 0, "RSI period must be positive");
        assert!(
            oversold < overbought,
            "Oversold threshold must be below overbought"
        );
        Self {
            period,
            oversold,
            overbought,
        }
    }

    /// Create with default parameters (14, 30, 70).
    pub fn default_params() -> Self {
        Self::new(14, 30.0, 70.0)
    }
}

impl Indicator for RsiReversal {
    fn name(&self) -> &str {
        "RSI Reversal"
    }

    fn evaluate(&self, ctx: &SignalContext) -> Option<EntrySignal> {
        let current = rsi(ctx.history(), self.period)?;
        let prev = rsi(ctx.history_at(1)?, self.period)?;
        let close = ctx.current().close;

        if prev <= self.oversold && current > self.oversold {
            Some(EntrySignal::long(close))
        } else if prev >= self.overbought && current < self.overbought {
            Some(EntrySignal::short(close))
        } else {
            None
        }
    }

    fn warmup_period(&self) -> usize {
        self.period + 2
    }

    fn parameters(&self) -> Vec<(String, String)> {
        vec![
            ("period".to_string(), self.period.to_string()),
            ("oversold".to_string(), format!("{:.0}", self.oversold)),
            ("overbought".to_string(), format!("{:.0}", self.overbought)),
        ]
    }
}
