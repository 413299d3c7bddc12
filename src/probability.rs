//! Empirical probability of a forward price increase
//!
//! The axis runs from `max(0, round_to_increment(min minPctPriceChange))` to the largest
//! `maxPctPriceChange` in steps of the group size. At each threshold `t` the probability is the
//! share of events whose `maxPctPriceChange` is strictly greater than `t`, computed separately
//! for bullish engulfing events and for all events (control).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{analysis::Event, Increment};

/// One point of a probability curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbabilityPoint {
    pub pct_price_change: f64,
    pub probability: f64,
}

impl fmt::Display for ProbabilityPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2}% chance of price increasing by {:.2}%",
            self.probability * 100.0,
            self.pct_price_change * 100.0
        )
    }
}

/// Round `value` to a multiple of `increment`, rounding up only past the midpoint.
///
/// The remainder is truncated (it keeps the sign of `value`), so negative values move toward
/// zero unless their remainder exceeds half an increment, which it never can.
pub fn round_to_increment(value: f64, increment: f64) -> f64 {
    let remainder = value % increment;
    if remainder > increment / 2.0 {
        value - remainder + increment
    } else {
        value - remainder
    }
}

/// Thresholds of the price-change axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceChangeAxis {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl PriceChangeAxis {
    /// Axis spanning the events. None without events or with a non-finite bound.
    pub fn from_events(events: &[Event], step: Increment) -> Option<Self> {
        if events.is_empty() {
            return None;
        }
        let step = step.get();
        let lowest = events
            .iter()
            .map(|e| e.min_pct_price_change)
            .fold(f64::INFINITY, f64::min);
        let highest = events
            .iter()
            .map(|e| e.max_pct_price_change)
            .fold(f64::NEG_INFINITY, f64::max);

        let min = round_to_increment(lowest, step).max(0.0);
        (min.is_finite() && highest.is_finite()).then_some(Self { min, max: highest, step })
    }

    /// `min + k * step` for every `k` with the result not above `max`
    pub fn thresholds(&self) -> Vec<f64> {
        if self.max < self.min {
            return Vec::new();
        }
        let mut thresholds = Vec::new();
        let mut k = 0usize;
        loop {
            let t = self.min + k as f64 * self.step;
            if t > self.max {
                break;
            }
            thresholds.push(t);
            k += 1;
        }
        thresholds
    }
}

/// Share of `sorted` values strictly above each threshold
pub fn exceedance_curve(sorted: &[f64], thresholds: &[f64]) -> Vec<ProbabilityPoint> {
    if sorted.is_empty() {
        return Vec::new();
    }
    let total = sorted.len() as f64;
    thresholds
        .iter()
        .map(|&t| {
            let above = sorted.len() - sorted.partition_point(|&v| v <= t);
            ProbabilityPoint { pct_price_change: t, probability: above as f64 / total }
        })
        .collect()
}

/// Pattern and control curves over a shared axis
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbabilityCurves {
    /// Empty when there are no bullish engulfing events
    pub pattern: Vec<ProbabilityPoint>,
    pub control: Vec<ProbabilityPoint>,
    pub pattern_event_count: usize,
}

/// Build both curves from filtered events
pub fn build_curves(events: &[Event], group_size: Increment) -> ProbabilityCurves {
    let mut control: Vec<f64> = events.iter().map(|e| e.max_pct_price_change).collect();
    let mut pattern: Vec<f64> = events
        .iter()
        .filter(|e| e.is_bullish_engulfing)
        .map(|e| e.max_pct_price_change)
        .collect();
    control.sort_by(f64::total_cmp);
    pattern.sort_by(f64::total_cmp);

    let thresholds = PriceChangeAxis::from_events(events, group_size)
        .map(|axis| axis.thresholds())
        .unwrap_or_default();

    ProbabilityCurves {
        pattern: exceedance_curve(&pattern, &thresholds),
        control: exceedance_curve(&control, &thresholds),
        pattern_event_count: pattern.len(),
    }
}
