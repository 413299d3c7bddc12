//! Analysis parameters and their metadata
//!
//! [`Parameters`] is the single validated configuration value a run needs. It is built once at
//! the boundary (constructor, builder, JSON document or key/value map) and passed down by value.
//!
//! [`ParamMeta`] describes each parameter's sweep range, enabling:
//! - Grid search optimization
//! - Parameter documentation
//!
//! # Example
//!
//! ```rust
//! use engulfing_odds::params::{SweepGrid, PARAMETER_META};
//!
//! for param in PARAMETER_META.iter() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let grid = SweepGrid::default();
//! assert_eq!(grid.parameters().unwrap().len(), 8 * 8 * 5);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{AnalysisError, Increment, Period, Ratio, Result};

// ============================================================
// PARAMETERS
// ============================================================

pub const LOOKBACK_CANDLES: &str = "lookbackCandles";
pub const LOOKAHEAD_CANDLES: &str = "lookaheadCandles";
pub const ALLOWED_WICK_TO_BODY_RATIO: &str = "allowedWickToBodyRatio";
pub const GROUP_SIZE: &str = "groupSizeForPctPriceIncreaseProbability";

/// Validated parameters of one analysis run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
  /// Preceding candles a candidate must out-size and out-trade
  pub lookback_candles: Period,
  /// Following candles scanned for price extremes
  pub lookahead_candles: Period,
  /// Largest accepted top-wick-to-body ratio
  pub allowed_wick_to_body_ratio: Ratio,
  /// Bucket width of the price-change probability axis
  #[serde(rename = "groupSizeForPctPriceIncreaseProbability")]
  pub group_size: Increment,
}

impl Default for Parameters {
  fn default() -> Self {
    Self {
      lookback_candles: Period::new_const(4),
      lookahead_candles: Period::new_const(4),
      allowed_wick_to_body_ratio: Ratio::new_const(0.1),
      group_size: Increment::new_const(0.0025),
    }
  }
}

impl Parameters {
  /// Validate raw values. Fails fast, naming the offending parameter.
  pub fn new(
    lookback_candles: usize,
    lookahead_candles: usize,
    allowed_wick_to_body_ratio: f64,
    group_size: f64,
  ) -> Result<Self> {
    Ok(Self {
      lookback_candles: Period::new(lookback_candles).map_err(|e| named(LOOKBACK_CANDLES, e))?,
      lookahead_candles: Period::new(lookahead_candles).map_err(|e| named(LOOKAHEAD_CANDLES, e))?,
      allowed_wick_to_body_ratio: Ratio::new(allowed_wick_to_body_ratio)
        .map_err(|e| named(ALLOWED_WICK_TO_BODY_RATIO, e))?,
      group_size: Increment::new(group_size).map_err(|e| named(GROUP_SIZE, e))?,
    })
  }

  /// Build from a key/value map. Missing parameters use their default values.
  pub fn from_map(params: &HashMap<&str, f64>) -> Result<Self> {
    let defaults = Self::default();
    Ok(Self {
      lookback_candles: get_period(params, LOOKBACK_CANDLES, defaults.lookback_candles.get())
        .map_err(|e| named(LOOKBACK_CANDLES, e))?,
      lookahead_candles: get_period(params, LOOKAHEAD_CANDLES, defaults.lookahead_candles.get())
        .map_err(|e| named(LOOKAHEAD_CANDLES, e))?,
      allowed_wick_to_body_ratio: get_ratio(
        params,
        ALLOWED_WICK_TO_BODY_RATIO,
        defaults.allowed_wick_to_body_ratio.get(),
      )
      .map_err(|e| named(ALLOWED_WICK_TO_BODY_RATIO, e))?,
      group_size: get_increment(params, GROUP_SIZE, defaults.group_size.get())
        .map_err(|e| named(GROUP_SIZE, e))?,
    })
  }
}

fn named(field: &str, err: AnalysisError) -> AnalysisError {
  AnalysisError::InvalidConfig(format!("{field}: {err}"))
}

// ============================================================
// PARAMETER METADATA
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value (0.0..=1.0)
  Ratio,
  /// Period value (positive integer)
  Period,
  /// Positive step width
  Increment,
}

/// Metadata for a single analysis parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name as it appears in documents (e.g., "lookbackCandles")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn increment(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Increment, default, range, description }
  }

  /// Generate all values for grid search.
  /// Values are `min + k * step`, so long grids do not accumulate rounding drift.
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    if step <= 0.0 || max < min {
      return vec![min];
    }
    let steps = ((max - min) / step + 1e-9).floor() as usize;
    (0..=steps).map(|k| min + k as f64 * step).collect()
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(AnalysisError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(AnalysisError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Increment => Increment::new(value).map(|_| ()),
    }
  }
}

/// Sweep ranges used when searching for the best parameter set
pub const PARAMETER_META: [ParamMeta; 4] = [
  ParamMeta::period(
    LOOKBACK_CANDLES,
    4.0,
    (1.0, 8.0, 1.0),
    "Number of previous candles the current candle must be larger than to be engulfing",
  ),
  ParamMeta::period(
    LOOKAHEAD_CANDLES,
    4.0,
    (1.0, 8.0, 1.0),
    "Maximum number of candles examined for the highs and lows after a candle",
  ),
  ParamMeta::ratio(
    ALLOWED_WICK_TO_BODY_RATIO,
    0.1,
    (0.0, 0.2, 0.05),
    "Largest top wick, as a fraction of the body, of an engulfing candle",
  ),
  ParamMeta::increment(
    GROUP_SIZE,
    0.0025,
    (0.0025, 0.0025, 0.0025),
    "Bucket width of the percentage price increase axis",
  ),
];

/// Look up the metadata of a parameter by its document name
pub fn param_meta(name: &str) -> Option<&'static ParamMeta> {
  PARAMETER_META.iter().find(|meta| meta.name == name)
}

// ============================================================
// SWEEP GRID
// ============================================================

/// Cartesian grid of candidate parameter values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepGrid {
  pub lookback_candles: Vec<usize>,
  pub lookahead_candles: Vec<usize>,
  pub allowed_wick_to_body_ratios: Vec<f64>,
  pub group_sizes: Vec<f64>,
}

impl Default for SweepGrid {
  fn default() -> Self {
    let [lookback, lookahead, ratio, group] = &PARAMETER_META;
    Self {
      lookback_candles: lookback.generate_grid().into_iter().map(|v| v as usize).collect(),
      lookahead_candles: lookahead.generate_grid().into_iter().map(|v| v as usize).collect(),
      allowed_wick_to_body_ratios: ratio.generate_grid(),
      group_sizes: group.generate_grid(),
    }
  }
}

impl SweepGrid {
  /// Expand into validated parameter sets, lookback varying slowest
  pub fn parameters(&self) -> Result<Vec<Parameters>> {
    let mut sets = Vec::with_capacity(
      self.lookback_candles.len()
        * self.lookahead_candles.len()
        * self.allowed_wick_to_body_ratios.len()
        * self.group_sizes.len(),
    );
    for &lookback in &self.lookback_candles {
      for &lookahead in &self.lookahead_candles {
        for &ratio in &self.allowed_wick_to_body_ratios {
          for &group in &self.group_sizes {
            sets.push(Parameters::new(lookback, lookahead, ratio, group)?);
          }
        }
      }
    }
    Ok(sets)
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 0.0 || value.fract() != 0.0 {
    return Err(AnalysisError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

/// Helper to get an Increment from params with default fallback
pub fn get_increment(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Increment> {
  let value = params.get(key).copied().unwrap_or(default);
  Increment::new(value)
}

// ============================================================
// TESTS
// ============================================================
