//! Rolling-window primitives over candles and plain series.
//!
//! Every candle function looks at the *tail* of the slice it is given, so
//! callers pass `&candles[..=i]` to evaluate at index `i` without look-ahead.

use crate::types::Candle;

/// Arithmetic mean of a series.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Population standard deviation (n denominator).
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Simple moving average of closes over the last `period` candles.
pub fn sma(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period || period == 0 {
        return None;
    }
    let sum: f64 = candles[candles.len() - period..]
        .iter()
        .map(|c| c.close)
        .sum();
    Some(sum / period as f64)
}

/// Exponential moving average of closes, seeded with the SMA of the first
/// `period` candles and smoothed with `2 / (period + 1)` over the rest.
pub fn ema(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period || period == 0 {
        return None;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed = candles[..period].iter().map(|c| c.close).sum::<f64>() / period as f64;
    Some(
        candles[period..]
            .iter()
            .fold(seed, |ema, c| c.close * k + ema * (1.0 - k)),
    )
}

/// Sample standard deviation of closes over the last `period` candles.
pub fn std_dev(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period || period < 2 {
        return None;
    }
    let window: Vec<f64> = candles[candles.len() - period..]
        .iter()
        .map(|c| c.close)
        .collect();
    sample_std(&window)
}

/// Natural-log returns of consecutive closes; element `k` is the return
/// into candle `k + 1`.
pub fn log_returns(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|w| {
            if w[0].close > 0.0 && w[1].close > 0.0 {
                (w[1].close / w[0].close).ln()
            } else {
                0.0
            }
        })
        .collect()
}

/// Average True Range: simple mean of the last `period` true ranges.
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period + 1 || period == 0 {
        return None;
    }

    let true_ranges: Vec<f64> = candles[candles.len() - period - 1..]
        .windows(2)
        .map(|w| {
            let prev = &w[0];
            let curr = &w[1];
            let hl = curr.high - curr.low;
            let hc = (curr.high - prev.close).abs();
            let lc = (curr.low - prev.close).abs();
            hl.max(hc).max(lc)
        })
        .collect();

    Some(true_ranges.iter().sum::<f64>() / period as f64)
}

/// Relative Strength Index using simple rolling means of gains and losses.
///
/// Returns 100 when there were gains but no losses and the neutral 50 when
/// the window saw no movement at all.
pub fn rsi(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period + 1 || period == 0 {
        return None;
    }

    let (gains, losses) = candles[candles.len() - period - 1..]
        .windows(2)
        .map(|w| w[1].close - w[0].close)
        .fold((0.0, 0.0), |(g, l), change| {
            if change > 0.0 {
                (g + change, l)
            } else {
                (g, l - change)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Bollinger Bands (middle, upper, lower) with a sample-std envelope.
pub fn bollinger_bands(candles: &[Candle], period: usize, num_std: f64) -> Option<(f64, f64, f64)> {
    let middle = sma(candles, period)?;
    let std = std_dev(candles, period)?;
    Some((middle, middle + num_std * std, middle - num_std * std))
}

/// Highest high over the last `period` candles.
pub fn highest_high(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period || period == 0 {
        return None;
    }
    candles[candles.len() - period..]
        .iter()
        .map(|c| c.high)
        .reduce(f64::max)
}

/// Lowest low over the last `period` candles.
pub fn lowest_low(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period || period == 0 {
        return None;
    }
    candles[candles.len() - period..]
        .iter()
        .map(|c| c.low)
        .reduce(f64::min)
}
