//! Tunable parameters of the chart detectors and candlestick recognizers.
//!
//! Each [`ParameterizedDetector`] lists its parameters with defaults and a
//! search range, and can be rebuilt from a name -> value map, which is what a
//! parameter sweep needs.
//!
//! ```rust
//! use std::collections::HashMap;
//! use chartscan::params::ParameterizedDetector;
//! use chartscan::prelude::*;
//!
//! let mut values = HashMap::new();
//! values.insert("tolerance", 0.02);
//! let detector = DoubleTopDetector::with_params(&values).unwrap();
//! assert_eq!(detector.min_separation.get(), 8);
//! ```

use std::collections::HashMap;

use crate::chart::{DoubleBottomDetector, DoubleTopDetector};
use crate::detectors::{
  DarkCloudCoverRecognizer, EveningStarRecognizer, MorningStarRecognizer, PiercingRecognizer,
};
use crate::{PatternError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Fraction in 0.0..=1.0
  Ratio,
  /// Positive bar count
  Period,
}

/// Metadata for a single parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Search range: (min, max, step)
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

  /// Values from `min` to `max` in `step` increments
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    if step <= 0.0 {
      return vec![min];
    }
    let count = ((max - min) / step + 1e-9).floor() as usize + 1;
    (0..count).map(|k| (min + step * k as f64).min(max)).collect()
  }

  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Period if value < 1.0 || value.fract() != 0.0 => {
        Err(PatternError::InvalidValue("Period must be a positive integer"))
      },
      ParamType::Period => Ok(()),
    }
  }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

pub trait ParameterizedDetector: Sized {
  fn param_meta() -> &'static [ParamMeta];

  /// Build from `params` without the search range check; missing keys take their defaults
  fn build(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Build from `params`; missing keys take their defaults, unknown keys and
  /// values outside the search range are rejected
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    check_keys(Self::param_meta(), params)?;
    Self::build(params)
  }

  fn pattern_id() -> &'static str;

  /// Current value of every parameter
  fn params(&self) -> HashMap<&'static str, f64>;

  fn default_params() -> HashMap<&'static str, f64> {
    Self::param_meta().iter().map(|m| (m.name, m.default)).collect()
  }

  /// Copy of `self` with `overrides` applied; other parameters keep their current values
  fn rebuild(&self, overrides: &HashMap<&str, f64>) -> Result<Self> {
    check_keys(Self::param_meta(), overrides)?;
    let mut merged: HashMap<&str, f64> = self.params();
    merged.extend(overrides.iter().map(|(&k, &v)| (k, v)));
    Self::build(&merged)
  }

  /// One instance per grid value of `param`, all else as in `self`
  fn sweep(&self, param: &str) -> Result<Vec<Self>> {
    let Some(meta) = Self::param_meta().iter().find(|m| m.name == param) else {
      return Err(PatternError::InvalidConfig(format!("unknown parameter: {param}")));
    };
    meta
      .generate_grid()
      .into_iter()
      .map(|value| self.rebuild(&HashMap::from([(meta.name, value)])))
      .collect()
  }
}

fn check_keys(meta: &[ParamMeta], params: &HashMap<&str, f64>) -> Result<()> {
  for (key, &value) in params {
    let Some(m) = meta.iter().find(|m| m.name == *key) else {
      return Err(PatternError::InvalidConfig(format!("unknown parameter: {key}")));
    };
    m.validate(value)?;
  }
  Ok(())
}

pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  Ratio::new(params.get(key).copied().unwrap_or(default))
}

pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 1.0 || value.fract() != 0.0 {
    return Err(PatternError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

// ============================================================
// CHART DETECTORS
// ============================================================

const DOUBLE_TOP_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio("tolerance", 0.005, (0.001, 0.05, 0.001), "Max gap between the two tops"),
  ParamMeta::period("min_separation", 8.0, (2.0, 30.0, 1.0), "Min bars between the tops"),
  ParamMeta::period("trend_lookback", 10.0, (3.0, 40.0, 1.0), "Bars back for the uptrend check"),
];

const DOUBLE_BOTTOM_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio("tolerance", 0.005, (0.001, 0.05, 0.001), "Max gap between the two bottoms"),
  ParamMeta::period("min_separation", 8.0, (2.0, 30.0, 1.0), "Min bars between the bottoms"),
  ParamMeta::period("trend_lookback", 10.0, (3.0, 40.0, 1.0), "Bars back for the downtrend check"),
];

impl ParameterizedDetector for DoubleTopDetector {
  fn param_meta() -> &'static [ParamMeta] {
    DOUBLE_TOP_PARAMS
  }

  fn build(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      tolerance: get_ratio(params, "tolerance", 0.005)?,
      min_separation: get_period(params, "min_separation", 8)?,
      trend_lookback: get_period(params, "trend_lookback", 10)?,
    })
  }

  fn pattern_id() -> &'static str {
    "DOUBLE_TOP"
  }

  fn params(&self) -> HashMap<&'static str, f64> {
    HashMap::from([
      ("tolerance", self.tolerance.get()),
      ("min_separation", self.min_separation.get() as f64),
      ("trend_lookback", self.trend_lookback.get() as f64),
    ])
  }
}

impl ParameterizedDetector for DoubleBottomDetector {
  fn param_meta() -> &'static [ParamMeta] {
    DOUBLE_BOTTOM_PARAMS
  }

  fn build(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      tolerance: get_ratio(params, "tolerance", 0.005)?,
      min_separation: get_period(params, "min_separation", 8)?,
      trend_lookback: get_period(params, "trend_lookback", 10)?,
    })
  }

  fn pattern_id() -> &'static str {
    "DOUBLE_BOTTOM"
  }

  fn params(&self) -> HashMap<&'static str, f64> {
    HashMap::from([
      ("tolerance", self.tolerance.get()),
      ("min_separation", self.min_separation.get() as f64),
      ("trend_lookback", self.trend_lookback.get() as f64),
    ])
  }
}

// ============================================================
// PENETRATION RECOGNIZERS
// ============================================================

macro_rules! impl_penetration_params {
  ($($recognizer:ty => $id:literal, $default:literal, $meta:ident);* $(;)?) => {
    $(
      const $meta: &[ParamMeta] = &[ParamMeta::ratio(
        "penetration",
        $default,
        (0.1, 0.9, 0.1),
        "Depth into the prior body",
      )];

      impl ParameterizedDetector for $recognizer {
        fn param_meta() -> &'static [ParamMeta] {
          $meta
        }

        fn build(params: &HashMap<&str, f64>) -> Result<Self> {
          Ok(Self { penetration: get_ratio(params, "penetration", $default)?, ..Self::default() })
        }

        fn pattern_id() -> &'static str {
          $id
        }

        fn params(&self) -> HashMap<&'static str, f64> {
          HashMap::from([("penetration", self.penetration.get())])
        }
      }
    )*
  };
}

impl_penetration_params! {
  PiercingRecognizer => "CDL_PIERCING", 0.5, PIERCING_PARAMS;
  DarkCloudCoverRecognizer => "CDL_DARKCLOUDCOVER", 0.5, DARK_CLOUD_PARAMS;
  MorningStarRecognizer => "CDL_MORNINGSTAR", 0.3, MORNING_STAR_PARAMS;
  EveningStarRecognizer => "CDL_EVENINGSTAR", 0.3, EVENING_STAR_PARAMS;
}
