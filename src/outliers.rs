//! Interquartile-range outlier rejection
//!
//! Quartiles use linear interpolation between order statistics: for `n` sorted values the
//! `q` quantile sits at position `q * (n - 1)`, interpolating between the neighbouring values.
//! An event is kept when every tracked metric lies inside the closed fence
//! `[p25 - k * (p75 - p25), p75 + k * (p75 - p25)]`, with `k = 1.5` by default.

use serde::{Deserialize, Serialize};

use crate::{analysis::Event, AnalysisError, Result};

/// Below this many events quartiles are degenerate and nothing is filtered
pub const MIN_EVENTS_FOR_QUARTILES: usize = 4;

pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

/// Event metric the filter can fence on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    MaxPctPriceChange,
    MinPctPriceChange,
    PctVolumeChange,
}

/// Quantile of ascending `sorted` values with linear interpolation
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        Some(sorted[lower])
    } else {
        Some(sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64))
    }
}

/// First and third quartile of a sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quartiles {
    pub p25: f64,
    pub p75: f64,
}

impl Quartiles {
    /// Quartiles of the finite values. None with fewer than four of them.
    pub fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if finite.len() < MIN_EVENTS_FOR_QUARTILES {
            return None;
        }
        finite.sort_by(f64::total_cmp);
        Some(Self {
            p25: quantile_sorted(&finite, 0.25)?,
            p75: quantile_sorted(&finite, 0.75)?,
        })
    }

    #[inline]
    pub fn iqr(&self) -> f64 {
        self.p75 - self.p25
    }
}

/// Accepted interval of one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fence {
    pub metric: Metric,
    pub lower: f64,
    pub upper: f64,
}

impl Fence {
    pub fn new(metric: Metric, quartiles: Quartiles, multiplier: f64) -> Self {
        let margin = quartiles.iqr() * multiplier;
        Self {
            metric,
            lower: quartiles.p25 - margin,
            upper: quartiles.p75 + margin,
        }
    }

    /// Inclusive on both ends; NaN is never inside
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    #[inline]
    pub fn admits(&self, event: &Event) -> bool {
        self.contains(event.metric(self.metric))
    }
}

/// Events split by the filter
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Surviving events, in input order
    pub kept: Vec<Event>,
    /// Rejected events, in input order
    pub removed: Vec<Event>,
    /// Fences applied; empty when the input was too small to filter
    pub fences: Vec<Fence>,
}

/// IQR outlier filter over a set of metrics
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierFilter {
    metrics: Vec<Metric>,
    multiplier: f64,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self {
            metrics: vec![Metric::MaxPctPriceChange, Metric::MinPctPriceChange],
            multiplier: DEFAULT_IQR_MULTIPLIER,
        }
    }
}

impl OutlierFilter {
    pub fn new(metrics: impl IntoIterator<Item = Metric>, multiplier: f64) -> Result<Self> {
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(AnalysisError::OutOfRange {
                field: "iqrMultiplier",
                value: multiplier,
                min: 0.0,
                max: f64::MAX,
            });
        }
        let mut unique = Vec::new();
        for metric in metrics {
            if !unique.contains(&metric) {
                unique.push(metric);
            }
        }
        Ok(Self { metrics: unique, multiplier })
    }

    #[inline]
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    #[inline]
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Fences for each tracked metric computed over all `events`.
    /// Metrics with fewer than four finite values get no fence.
    pub fn fences(&self, events: &[Event]) -> Vec<Fence> {
        if events.len() < MIN_EVENTS_FOR_QUARTILES {
            return Vec::new();
        }
        self.metrics
            .iter()
            .filter_map(|&metric| {
                Quartiles::of(events.iter().map(|e| e.metric(metric)))
                    .map(|q| Fence::new(metric, q, self.multiplier))
            })
            .collect()
    }

    /// Split events into kept and removed. An event must pass every fence to be kept.
    pub fn apply(&self, events: Vec<Event>) -> FilterOutcome {
        let fences = self.fences(&events);
        if fences.is_empty() {
            return FilterOutcome { kept: events, removed: Vec::new(), fences };
        }

        let (kept, removed) = events
            .into_iter()
            .partition(|event| fences.iter().all(|fence| fence.admits(event)));
        FilterOutcome { kept, removed, fences }
    }
}
