//! Events and the aggregate result of one analysis run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    detectors::CandleStats,
    outliers::{FilterOutcome, Metric},
    params::Parameters,
    probability::{build_curves, ProbabilityPoint},
    Increment, Period, Ratio, OHLCV,
};

/// Timestamp layout used for event times
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// A classified candle with a defined lookahead window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Position of the candle in the analyzed sequence
    pub index: usize,
    /// Closing price
    pub price: f64,
    /// Candle open time, empty when the bar has no timestamp
    pub time: String,
    #[serde(deserialize_with = "f64_or_nan")]
    pub pct_volume_change: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub max_pct_price_change: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub min_pct_price_change: f64,
    pub is_bullish_engulfing: bool,
}

impl Event {
    /// Build from a classified candle. Returns None when the candle has no lookahead.
    pub fn from_stats<T: OHLCV>(bar: &T, stats: &CandleStats) -> Option<Self> {
        let lookahead = stats.lookahead?;
        Some(Self {
            index: stats.index,
            price: bar.close(),
            time: format_time(bar.timestamp()),
            pct_volume_change: stats.pct_volume_change,
            max_pct_price_change: lookahead.max_pct_price_change,
            min_pct_price_change: lookahead.min_pct_price_change,
            is_bullish_engulfing: stats.is_bullish_engulfing,
        })
    }

    #[inline]
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::MaxPctPriceChange => self.max_pct_price_change,
            Metric::MinPctPriceChange => self.min_pct_price_change,
            Metric::PctVolumeChange => self.pct_volume_change,
        }
    }
}

/// Format unix seconds as `YYYY-MM-DD HH:MM UTC`
pub fn format_time(timestamp: Option<i64>) -> String {
    timestamp
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.format(EVENT_TIME_FORMAT).to_string())
        .unwrap_or_default()
}

// serde_json writes non-finite floats as null
fn f64_or_nan<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
}

/// Whether the probability curves of a run are defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisStatus {
    /// Both curves are defined
    Complete,
    /// Fewer candles than one lookback window plus one lookahead candle
    InsufficientCandles,
    /// No events survived outlier filtering
    NoEvents,
    /// Events exist but none is bullish engulfing; the pattern curve is empty
    NoPatternMatches,
}

/// Outcome of one analysis run, the unit handed to persistence and reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub lookback_candles: Period,
    pub lookahead_candles: Period,
    pub allowed_wick_to_body_ratio: Ratio,
    #[serde(rename = "groupSizeForPctPriceIncreaseProbability")]
    pub group_size: Increment,
    pub status: AnalysisStatus,
    pub bullish_engulfing_event_count: usize,
    /// Events dropped by the outlier filter
    #[serde(default)]
    pub outlier_count: usize,
    /// Events that survived outlier filtering
    pub events: Vec<Event>,
    pub probabilities: Vec<ProbabilityPoint>,
    pub control_probabilities: Vec<ProbabilityPoint>,
}

impl AggregateResult {
    /// A run that produced no curves
    pub fn empty(params: Parameters, status: AnalysisStatus) -> Self {
        Self {
            lookback_candles: params.lookback_candles,
            lookahead_candles: params.lookahead_candles,
            allowed_wick_to_body_ratio: params.allowed_wick_to_body_ratio,
            group_size: params.group_size,
            status,
            bullish_engulfing_event_count: 0,
            outlier_count: 0,
            events: Vec::new(),
            probabilities: Vec::new(),
            control_probabilities: Vec::new(),
        }
    }

    /// Aggregate the events that survived outlier filtering
    pub fn from_filtered(params: Parameters, outcome: FilterOutcome) -> Self {
        let curves = build_curves(&outcome.kept, params.group_size);
        let status = if outcome.kept.is_empty() {
            AnalysisStatus::NoEvents
        } else if curves.pattern_event_count == 0 {
            AnalysisStatus::NoPatternMatches
        } else {
            AnalysisStatus::Complete
        };

        Self {
            lookback_candles: params.lookback_candles,
            lookahead_candles: params.lookahead_candles,
            allowed_wick_to_body_ratio: params.allowed_wick_to_body_ratio,
            group_size: params.group_size,
            status,
            bullish_engulfing_event_count: curves.pattern_event_count,
            outlier_count: outcome.removed.len(),
            events: outcome.kept,
            probabilities: curves.pattern,
            control_probabilities: curves.control,
        }
    }

    pub fn parameters(&self) -> Parameters {
        Parameters {
            lookback_candles: self.lookback_candles,
            lookahead_candles: self.lookahead_candles,
            allowed_wick_to_body_ratio: self.allowed_wick_to_body_ratio,
            group_size: self.group_size,
        }
    }

    #[inline]
    pub fn has_pattern_probabilities(&self) -> bool {
        self.status == AnalysisStatus::Complete && !self.probabilities.is_empty()
    }

    /// Mean of `probability * pctPriceChange` over the pattern curve.
    /// Used to rank parameter sets; None when the pattern curve is undefined.
    pub fn expected_gain(&self) -> Option<f64> {
        if !self.has_pattern_probabilities() {
            return None;
        }
        let sum: f64 = self
            .probabilities
            .iter()
            .map(|p| p.probability * p.pct_price_change)
            .sum();
        Some(sum / self.probabilities.len() as f64)
    }

    /// Pattern probability minus control probability at each shared threshold
    pub fn lift(&self) -> Vec<ProbabilityPoint> {
        self.probabilities
            .iter()
            .zip(&self.control_probabilities)
            .map(|(pattern, control)| ProbabilityPoint {
                pct_price_change: pattern.pct_price_change,
                probability: pattern.probability - control.probability,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(index: usize, max: f64, min: f64, engulfing: bool) -> Event {
        Event {
            index,
            price: 100.0,
            time: String::new(),
            pct_volume_change: 0.0,
            max_pct_price_change: max,
            min_pct_price_change: min,
            is_bullish_engulfing: engulfing,
        }
    }

    fn outcome(kept: Vec<Event>) -> FilterOutcome {
        FilterOutcome { kept, removed: Vec::new(), fences: Vec::new() }
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(Some(1_514_764_800)), "2018-01-01 00:00 UTC");
        assert_eq!(format_time(Some(1_514_768_460)), "2018-01-01 01:01 UTC");
        assert_eq!(format_time(None), "");
    }

    #[test]
    fn test_status_without_pattern_matches() {
        let result = AggregateResult::from_filtered(
            Parameters::default(),
            outcome(vec![event(0, 0.01, -0.01, false), event(1, 0.02, -0.01, false)]),
        );
        assert_eq!(result.status, AnalysisStatus::NoPatternMatches);
        assert!(result.probabilities.is_empty());
        assert!(!result.control_probabilities.is_empty());
        assert_eq!(result.expected_gain(), None);
    }

    #[test]
    fn test_status_without_events() {
        let result = AggregateResult::from_filtered(Parameters::default(), outcome(Vec::new()));
        assert_eq!(result.status, AnalysisStatus::NoEvents);
        assert!(result.control_probabilities.is_empty());
    }

    #[test]
    fn test_expected_gain_and_lift() {
        let result = AggregateResult::from_filtered(
            Parameters::new(2, 2, 0.1, 0.005).unwrap(),
            outcome(vec![
                event(0, 0.012, -0.01, true),
                event(1, 0.002, -0.01, false),
                event(2, 0.007, -0.01, false),
            ]),
        );
        assert_eq!(result.status, AnalysisStatus::Complete);
        assert_eq!(result.bullish_engulfing_event_count, 1);

        // thresholds 0, 0.005, 0.01; the engulfing event exceeds all of them
        let gain = result.expected_gain().unwrap();
        assert!((gain - (0.0 + 0.005 + 0.01) / 3.0).abs() < 1e-12);

        let lift = result.lift();
        assert_eq!(lift.len(), 3);
        assert!((lift[1].probability - (1.0 - 2.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_result_json_field_names() {
        let result = AggregateResult::from_filtered(
            Parameters::default(),
            outcome(vec![event(3, 0.01, -0.01, true)]),
        );
        let json = serde_json::to_value(&result).unwrap();
        for key in [
            "lookbackCandles",
            "lookaheadCandles",
            "allowedWickToBodyRatio",
            "groupSizeForPctPriceIncreaseProbability",
            "bullishEngulfingEventCount",
            "events",
            "probabilities",
            "controlProbabilities",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["status"], "complete");
        assert_eq!(json["events"][0]["isBullishEngulfing"], true);
        assert!(json["probabilities"][0].get("pctPriceChange").is_some());
    }

    #[test]
    fn test_non_finite_metrics_survive_json() {
        let mut e = event(0, 0.01, -0.01, false);
        e.pct_volume_change = f64::INFINITY;
        let json = serde_json::to_string(&e).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert!(back.pct_volume_change.is_nan());
        assert_eq!(back.max_pct_price_change, 0.01);
    }
}
