//! # engulfing-odds
//!
//! Bullish engulfing candle detection with empirical forward price-increase probabilities.
//!
//! A run takes an ascending candle sequence and a validated [`Parameters`] value, classifies
//! every candle, rejects statistical outliers and builds two exceedance-probability curves:
//! one for bullish engulfing candles and one for the unconditioned (control) population.
//!
//! ## Quick Start
//!
//! ```rust
//! use engulfing_odds::prelude::*;
//!
//! let engine = EngineBuilder::new()
//!     .lookback_candles(4)
//!     .lookahead_candles(6)
//!     .allowed_wick_to_body_ratio(0.2)
//!     .group_size(0.0025)
//!     .build()
//!     .unwrap();
//!
//! // Raw exchange rows: time, low, high, open, close, volume
//! let rows: Vec<Vec<f64>> = vec![];
//! let candles = normalize_rows(&rows).unwrap();
//! let result = engine.analyze(&candles).unwrap();
//! assert_eq!(result.status, AnalysisStatus::InsufficientCandles);
//! ```

pub mod analysis;
pub mod candle;
pub mod detectors;
pub mod inference;
pub mod outliers;
pub mod params;
pub mod probability;
pub mod training;

pub mod prelude {
    pub use crate::{
        // Pipeline
        analysis::{AggregateResult, AnalysisStatus, Event},
        // Candles
        candle::{normalize_rows, Candle, CandleSize, PriceHistory, RawCandle},
        // Detectors
        detectors::*,
        // Live inference
        inference::{Alert, AlertSink, FnSink, Inferrer},
        outliers::{FilterOutcome, Metric, OutlierFilter},
        // Parameters
        params::{ParamMeta, ParamType, Parameters, SweepGrid},
        probability::{round_to_increment, ProbabilityPoint},
        // Parallel
        sweep_parallel,
        best_by_expected_gain,
        training::{JsonFileStore, MemoryStore, Trainer, TrainingIdentity, TrainingRecord, TrainingStore},
        // Errors
        AnalysisError,
        // Engine
        Engine,
        EngineBuilder,
        EngineConfig,
        Increment,
        OHLCVExt,
        Period,
        Ratio,
        Result,
        StatsIterator,
        SweepError,
        SweepOutcome,
        OHLCV,
    };
}

use analysis::{AggregateResult, AnalysisStatus, Event};
use detectors::{BullishEngulfingDetector, CandleStats};
use outliers::{Metric, OutlierFilter};
use params::Parameters;
use tracing::{debug, warn};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur while classifying candles or building probabilities
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} candles, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Index {index} out of bounds for {len} candles")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Malformed candle row at index {index}: expected {expected} numeric fields, got {got}")]
    MalformedRow {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("Unknown candle size {0:?}, valid candle sizes: {valid}", valid = candle::CandleSize::valid_names())]
    UnknownCandleSize(String),

    #[error("No training data for {0}")]
    NotTrained(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        AnalysisError::Json(err.to_string())
    }
}

impl From<std::io::Error> for AnalysisError {
    fn from(err: std::io::Error) -> Self {
        AnalysisError::Store(err.to_string())
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(AnalysisError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(AnalysisError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Candle count (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(AnalysisError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

/// Step width on the price-change axis (finite, > 0)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Increment(f64);

impl Increment {
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(AnalysisError::InvalidValue(
                "Increment cannot be NaN or infinite",
            ));
        }
        if value <= 0.0 {
            return Err(AnalysisError::InvalidValue("Increment must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Increment {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Increment {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Increment::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    /// Unix seconds, when the bar carries one
    fn timestamp(&self) -> Option<i64> {
        None
    }
}

impl<T: OHLCV + ?Sized> OHLCV for &T {
    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }

    fn volume(&self) -> f64 {
        (**self).volume()
    }

    fn timestamp(&self) -> Option<i64> {
        (**self).timestamp()
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    /// Absolute real body
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    /// Signed real body, positive for a candle that closed above its open
    #[inline]
    fn height(&self) -> f64 {
        self.close() - self.open()
    }

    /// Distance between the high and the close
    #[inline]
    fn top_wick(&self) -> f64 {
        (self.high() - self.close()).abs()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    /// Top wick as a ratio of the body. Returns None for a zero body
    #[inline]
    fn wick_to_body_ratio(&self) -> Option<f64> {
        let body = self.body();
        (body > 0.0).then(|| self.top_wick() / body)
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        if self.open().is_nan()
            || self.high().is_nan()
            || self.low().is_nan()
            || self.close().is_nan()
            || self.volume().is_nan()
        {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if self.open().is_infinite()
            || self.high().is_infinite()
            || self.low().is_infinite()
            || self.close().is_infinite()
            || self.volume().is_infinite()
        {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        if self.volume() < 0.0 {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "negative volume",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

// ============================================================
// ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Reject non-finite prices and inverted ranges before analysis
    pub validate_data: bool,
}

/// Classifies candles and aggregates bullish engulfing probabilities for one parameter set.
///
/// The same engine backs batch training and live inference, so both classify identically.
#[derive(Debug, Clone)]
pub struct Engine {
    detector: BullishEngulfingDetector,
    params: Parameters,
    outliers: OutlierFilter,
    config: EngineConfig,
}

impl Engine {
    pub fn new(params: Parameters) -> Self {
        Self {
            detector: BullishEngulfingDetector::new(&params),
            params,
            outliers: OutlierFilter::default(),
            config: EngineConfig::default(),
        }
    }

    #[inline]
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    #[inline]
    pub fn detector(&self) -> &BullishEngulfingDetector {
        &self.detector
    }

    #[inline]
    pub fn outlier_filter(&self) -> &OutlierFilter {
        &self.outliers
    }

    // ===========================================
    // LOW-LEVEL: Single candle
    // ===========================================

    /// Classify the candle at `index`.
    #[inline]
    pub fn classify_at<T: OHLCV>(&self, bars: &[T], index: usize) -> Result<CandleStats> {
        self.detector.classify(bars, index)
    }

    /// Classify the most recent candle. Its lookahead is usually empty.
    pub fn classify_latest<T: OHLCV>(&self, bars: &[T]) -> Result<CandleStats> {
        if bars.is_empty() {
            return Err(AnalysisError::InsufficientData {
                need: self.detector.min_bars(),
                got: 0,
            });
        }
        self.detector.classify(bars, bars.len() - 1)
    }

    // ===========================================
    // MID-LEVEL: Whole sequence
    // ===========================================

    /// Classify every candle with a full lookback window.
    pub fn classify<T: OHLCV>(&self, bars: &[T]) -> Result<Vec<CandleStats>> {
        if self.config.validate_data {
            self.validate_bars(bars)?;
        }
        self.iter(bars).collect()
    }

    /// Events for every candle with a full lookback window and at least one lookahead candle.
    pub fn events<T: OHLCV>(&self, bars: &[T]) -> Result<Vec<Event>> {
        if self.config.validate_data {
            self.validate_bars(bars)?;
        }
        let mut events = Vec::with_capacity(bars.len());
        for stats in self.iter(bars) {
            let stats = stats?;
            if let Some(event) = Event::from_stats(&bars[stats.index], &stats) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Create an iterator over classified candles.
    pub fn iter<'a, T: OHLCV>(&'a self, bars: &'a [T]) -> StatsIterator<'a, T> {
        StatsIterator::new(&self.detector, bars)
    }

    // ===========================================
    // HIGH-LEVEL: Full analysis
    // ===========================================

    /// Classify, filter outliers and build the pattern and control probability curves.
    pub fn analyze<T: OHLCV>(&self, bars: &[T]) -> Result<AggregateResult> {
        let min_bars = self.detector.min_bars() + 1;
        if bars.len() < min_bars {
            warn!(
                candles = bars.len(),
                need = min_bars,
                "not enough candles for a single lookback and lookahead window"
            );
            return Ok(AggregateResult::empty(
                self.params,
                AnalysisStatus::InsufficientCandles,
            ));
        }

        let unfiltered = self.events(bars)?;
        let outcome = self.outliers.apply(unfiltered);
        debug!(
            lookback = self.params.lookback_candles.get(),
            lookahead = self.params.lookahead_candles.get(),
            wick_ratio = self.params.allowed_wick_to_body_ratio.get(),
            kept = outcome.kept.len(),
            removed = outcome.removed.len(),
            "filtered outliers"
        );

        let result = AggregateResult::from_filtered(self.params, outcome);
        match result.status {
            AnalysisStatus::NoPatternMatches => {
                warn!("no bullish engulfing events remain, pattern probabilities undefined")
            },
            AnalysisStatus::NoEvents => warn!("no events remain after outlier filtering"),
            _ => {},
        }
        Ok(result)
    }

    fn validate_bars<T: OHLCV>(&self, bars: &[T]) -> Result<()> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                AnalysisError::InvalidOHLCV { reason, .. } => {
                    AnalysisError::InvalidOHLCV { index: i, reason }
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

// ============================================================
// STATS ITERATOR
// ============================================================

/// Iterator over classified candles, starting at the first index with a full lookback
pub struct StatsIterator<'a, T: OHLCV> {
    detector: &'a BullishEngulfingDetector,
    bars: &'a [T],
    current: usize,
}

impl<'a, T: OHLCV> StatsIterator<'a, T> {
    fn new(detector: &'a BullishEngulfingDetector, bars: &'a [T]) -> Self {
        Self {
            detector,
            bars,
            current: detector.lookback.get(),
        }
    }
}

impl<'a, T: OHLCV> Iterator for StatsIterator<'a, T> {
    type Item = Result<CandleStats>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.bars.len() {
            return None;
        }

        let index = self.current;
        self.current += 1;
        Some(self.detector.classify(self.bars, index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.bars.len().saturating_sub(self.current);
        (remaining, Some(remaining))
    }
}

impl<'a, T: OHLCV> ExactSizeIterator for StatsIterator<'a, T> {}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating Engine instances from raw parameter values
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    lookback_candles: usize,
    lookahead_candles: usize,
    allowed_wick_to_body_ratio: f64,
    group_size: f64,
    outlier_metrics: Vec<Metric>,
    iqr_multiplier: f64,
    config: EngineConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        let defaults = Parameters::default();
        let filter = OutlierFilter::default();
        Self {
            lookback_candles: defaults.lookback_candles.get(),
            lookahead_candles: defaults.lookahead_candles.get(),
            allowed_wick_to_body_ratio: defaults.allowed_wick_to_body_ratio.get(),
            group_size: defaults.group_size.get(),
            outlier_metrics: filter.metrics().to_vec(),
            iqr_multiplier: filter.multiplier(),
            config: EngineConfig::default(),
        }
    }

    /// Start from an already validated parameter set
    pub fn parameters(mut self, params: Parameters) -> Self {
        self.lookback_candles = params.lookback_candles.get();
        self.lookahead_candles = params.lookahead_candles.get();
        self.allowed_wick_to_body_ratio = params.allowed_wick_to_body_ratio.get();
        self.group_size = params.group_size.get();
        self
    }

    pub fn lookback_candles(mut self, candles: usize) -> Self {
        self.lookback_candles = candles;
        self
    }

    pub fn lookahead_candles(mut self, candles: usize) -> Self {
        self.lookahead_candles = candles;
        self
    }

    pub fn allowed_wick_to_body_ratio(mut self, ratio: f64) -> Self {
        self.allowed_wick_to_body_ratio = ratio;
        self
    }

    /// Bucket width of the price-change axis
    pub fn group_size(mut self, size: f64) -> Self {
        self.group_size = size;
        self
    }

    /// Replace the metrics the outlier filter fences on
    pub fn outlier_metrics(mut self, metrics: impl IntoIterator<Item = Metric>) -> Self {
        self.outlier_metrics = metrics.into_iter().collect();
        self
    }

    pub fn iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.iqr_multiplier = multiplier;
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Validate every parameter and build the engine
    pub fn build(self) -> Result<Engine> {
        let params = Parameters::new(
            self.lookback_candles,
            self.lookahead_candles,
            self.allowed_wick_to_body_ratio,
            self.group_size,
        )?;
        let outliers = OutlierFilter::new(self.outlier_metrics, self.iqr_multiplier)?;
        Ok(Engine {
            detector: BullishEngulfingDetector::new(&params),
            params,
            outliers,
            config: self.config,
        })
    }
}

// ============================================================
// PARALLEL SWEEP
// ============================================================

use rayon::prelude::*;

/// Result of analyzing one parameter set
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub parameters: Parameters,
    pub result: AggregateResult,
}

impl SweepOutcome {
    #[inline]
    pub fn expected_gain(&self) -> Option<f64> {
        self.result.expected_gain()
    }
}

/// Error from analyzing one parameter set
#[derive(Debug)]
pub struct SweepError {
    pub parameters: Parameters,
    pub error: AnalysisError,
}

/// Analyze the same candles under many parameter sets in parallel
pub fn sweep_parallel<T, I>(bars: &[T], parameter_sets: I) -> (Vec<SweepOutcome>, Vec<SweepError>)
where
    T: OHLCV + Sync,
    I: IntoParallelIterator<Item = Parameters>,
{
    let results: Vec<_> = parameter_sets
        .into_par_iter()
        .map(|parameters| {
            Engine::new(parameters)
                .analyze(bars)
                .map(|result| SweepOutcome { parameters, result })
                .map_err(|error| SweepError { parameters, error })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    debug!(runs = successes.len(), failed = errors.len(), "parameter sweep finished");
    (successes, errors)
}

/// Outcome with the highest expected gain. Runs without pattern probabilities never win.
pub fn best_by_expected_gain(outcomes: &[SweepOutcome]) -> Option<&SweepOutcome> {
    outcomes
        .iter()
        .filter_map(|o| o.expected_gain().map(|gain| (o, gain)))
        .filter(|(_, gain)| gain.is_finite())
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(o, _)| o)
}

// ============================================================
// TESTS
// ============================================================
