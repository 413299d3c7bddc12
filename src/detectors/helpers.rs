//! Window scans shared by the classifier
//!
//! Every scan is bounded by the slice, so windows near either end of the sequence shrink
//! instead of panicking.

use crate::{OHLCVExt, OHLCV};

/// Largest absolute body and largest volume over the `lookback` candles before `index`.
///
/// Both maxima start from negative infinity, so an empty window never blocks a candidate.
#[inline]
pub fn recent_maxima<T: OHLCV>(bars: &[T], index: usize, lookback: usize) -> (f64, f64) {
    let start = index.saturating_sub(lookback);
    let end = index.min(bars.len());
    bars[start.min(end)..end]
        .iter()
        .fold((f64::NEG_INFINITY, f64::NEG_INFINITY), |(height, volume), bar| {
            (height.max(bar.body()), volume.max(bar.volume()))
        })
}

/// Highest high, lowest low and candle count over up to `lookahead` candles after `index`.
/// Returns None when `index` is the last candle.
#[inline]
pub fn lookahead_extremes<T: OHLCV>(
    bars: &[T],
    index: usize,
    lookahead: usize,
) -> Option<(f64, f64, usize)> {
    let start = index.checked_add(1)?;
    let end = index.saturating_add(lookahead).saturating_add(1).min(bars.len());
    if start >= end {
        return None;
    }
    let window = &bars[start..end];
    let (high, low) = window
        .iter()
        .fold((f64::NEG_INFINITY, f64::INFINITY), |(high, low), bar| {
            (high.max(bar.high()), low.min(bar.low()))
        });
    Some((high, low, window.len()))
}

/// Relative change from `base` to `value`
#[inline]
pub fn pct_change(value: f64, base: f64) -> f64 {
    value / base - 1.0
}
