//! Bullish engulfing classifier
//!
//! A candle at index `i` is bullish engulfing when all of the following hold:
//! - it closes above its open,
//! - its body is strictly taller than every body in the lookback window,
//! - its volume is strictly greater than every volume in the lookback window,
//! - its top wick, as a fraction of its body, is at most the allowed ratio.
//!
//! Equality with a window maximum never qualifies. A zero body leaves the wick ratio
//! undefined, which disqualifies the candle.

use serde::{Deserialize, Serialize};

use super::helpers::{lookahead_extremes, pct_change, recent_maxima};
use crate::{params::Parameters, AnalysisError, OHLCVExt, Period, Ratio, Result, OHLCV};

/// Forward price extremes relative to the candle's high
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lookahead {
    /// Candles actually scanned; fewer than requested near the end of the sequence
    pub candles: usize,
    pub max_pct_price_change: f64,
    pub min_pct_price_change: f64,
}

/// Derived metrics of one classified candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleStats {
    pub index: usize,
    /// Signed body, close - open
    pub height: f64,
    pub max_recent_height: f64,
    pub max_recent_volume: f64,
    /// None for a zero body
    pub wick_to_body_ratio: Option<f64>,
    /// volume / max_recent_volume - 1, reported whether or not the candle qualifies
    pub pct_volume_change: f64,
    pub is_bullish_engulfing: bool,
    /// None for the last candle of the sequence
    pub lookahead: Option<Lookahead>,
}

/// Bullish engulfing classifier for one parameter set
#[derive(Debug, Clone, PartialEq)]
pub struct BullishEngulfingDetector {
    pub lookback: Period,
    pub lookahead: Period,
    pub allowed_wick_to_body_ratio: Ratio,
}

impl Default for BullishEngulfingDetector {
    fn default() -> Self {
        Self::new(&Parameters::default())
    }
}

impl BullishEngulfingDetector {
    pub fn new(params: &Parameters) -> Self {
        Self {
            lookback: params.lookback_candles,
            lookahead: params.lookahead_candles,
            allowed_wick_to_body_ratio: params.allowed_wick_to_body_ratio,
        }
    }

    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn id(&self) -> &'static str {
        "BULLISH_ENGULFING"
    }

    /// Candles needed to classify a single index
    pub fn min_bars(&self) -> usize {
        self.lookback.get() + 1
    }

    /// Classify the candle at `index` and derive its metrics.
    pub fn classify<T: OHLCV>(&self, bars: &[T], index: usize) -> Result<CandleStats> {
        let lookback = self.lookback.get();
        if index >= bars.len() {
            return Err(AnalysisError::IndexOutOfBounds {
                index,
                len: bars.len(),
            });
        }
        if index < lookback {
            return Err(AnalysisError::InsufficientData {
                need: self.min_bars(),
                got: index + 1,
            });
        }

        let candle = &bars[index];
        let height = candle.height();
        let (max_recent_height, max_recent_volume) = recent_maxima(bars, index, lookback);
        let wick_to_body_ratio = candle.wick_to_body_ratio();

        let is_bullish_engulfing = height > 0.0
            && height > max_recent_height
            && candle.volume() > max_recent_volume
            && wick_to_body_ratio
                .is_some_and(|ratio| ratio <= self.allowed_wick_to_body_ratio.get());

        let lookahead = lookahead_extremes(bars, index, self.lookahead.get()).map(
            |(max_high, min_low, candles)| Lookahead {
                candles,
                max_pct_price_change: pct_change(max_high, candle.high()),
                min_pct_price_change: pct_change(min_low, candle.high()),
            },
        );

        Ok(CandleStats {
            index,
            height,
            max_recent_height,
            max_recent_volume,
            wick_to_body_ratio,
            pct_volume_change: pct_change(candle.volume(), max_recent_volume),
            is_bullish_engulfing,
            lookahead,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::Candle;

    fn bar(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle { time: 0, open, high, low, close, volume }
    }

    fn detector(lookback: usize, ratio: f64) -> BullishEngulfingDetector {
        BullishEngulfingDetector::new(&Parameters::new(lookback, 3, ratio, 0.0025).unwrap())
    }

    /// Two quiet candles followed by a candidate
    fn with_candidate(candidate: Candle) -> Vec<Candle> {
        vec![
            bar(100.0, 102.0, 99.0, 101.0, 100.0),
            bar(101.0, 102.0, 99.0, 100.0, 120.0),
            candidate,
            bar(105.0, 108.0, 103.0, 107.0, 90.0),
        ]
    }

    #[test]
    fn test_classifies_engulfing_candle() {
        let bars = with_candidate(bar(100.0, 105.2, 99.5, 105.0, 300.0));
        let stats = detector(2, 0.1).classify(&bars, 2).unwrap();

        assert!(stats.is_bullish_engulfing);
        assert_eq!(stats.height, 5.0);
        assert_eq!(stats.max_recent_height, 1.0);
        assert_eq!(stats.max_recent_volume, 120.0);
        assert!((stats.pct_volume_change - 1.5).abs() < 1e-12);

        let lookahead = stats.lookahead.unwrap();
        assert_eq!(lookahead.candles, 1);
        assert!((lookahead.max_pct_price_change - (108.0 / 105.2 - 1.0)).abs() < 1e-12);
        assert!((lookahead.min_pct_price_change - (103.0 / 105.2 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_bearish_candle_never_qualifies() {
        let bars = with_candidate(bar(105.0, 105.0, 99.0, 100.0, 300.0));
        let stats = detector(2, 1.0).classify(&bars, 2).unwrap();
        assert!(stats.height < 0.0);
        assert!(!stats.is_bullish_engulfing);
    }

    #[test]
    fn test_volume_tie_does_not_qualify() {
        let bars = with_candidate(bar(100.0, 105.0, 99.5, 105.0, 120.0));
        assert!(!detector(2, 0.1).classify(&bars, 2).unwrap().is_bullish_engulfing);
    }

    #[test]
    fn test_height_tie_does_not_qualify() {
        let bars = vec![
            bar(100.0, 104.0, 99.0, 104.0, 10.0),
            bar(100.0, 104.0, 99.5, 104.0, 100.0),
        ];
        let stats = detector(1, 1.0).classify(&bars, 1).unwrap();
        assert_eq!(stats.height, stats.max_recent_height);
        assert!(!stats.is_bullish_engulfing);
    }

    #[test]
    fn test_long_top_wick_disqualifies() {
        let bars = with_candidate(bar(100.0, 107.0, 99.5, 105.0, 300.0));
        let stats = detector(2, 0.2).classify(&bars, 2).unwrap();
        assert!((stats.wick_to_body_ratio.unwrap() - 0.4).abs() < 1e-12);
        assert!(!stats.is_bullish_engulfing);
    }

    #[test]
    fn test_zero_body_is_undefined_not_an_error() {
        let bars = with_candidate(bar(100.0, 103.0, 99.0, 100.0, 300.0));
        let stats = detector(2, 1.0).classify(&bars, 2).unwrap();
        assert!(stats.wick_to_body_ratio.is_none());
        assert!(!stats.is_bullish_engulfing);
    }

    #[test]
    fn test_last_candle_has_no_lookahead() {
        let bars = with_candidate(bar(100.0, 105.0, 99.5, 105.0, 300.0));
        let stats = detector(2, 0.1).classify(&bars, 3).unwrap();
        assert!(stats.lookahead.is_none());
    }

    #[test]
    fn test_rejects_indices_without_history() {
        let bars = with_candidate(bar(100.0, 105.0, 99.5, 105.0, 300.0));
        let d = detector(2, 0.1);
        assert!(matches!(
            d.classify(&bars, 1),
            Err(AnalysisError::InsufficientData { need: 3, got: 2 })
        ));
        assert!(matches!(
            d.classify(&bars, 4),
            Err(AnalysisError::IndexOutOfBounds { index: 4, len: 4 })
        ));
    }
}
