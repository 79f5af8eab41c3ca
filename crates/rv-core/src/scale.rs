//! # Rating Scale
//!
//! Builds the discrete set of rating values a reviewable type accepts.
//! Float ranges are expanded with a step; integral ranges and explicit lists
//! are taken literally and coerced to `f64`.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{Result, ReviewError};

/// Ratings are compared with a small tolerance so that generated float steps
/// (e.g. `0.1 * 3`) still match the literal a caller submits.
const RATING_TOLERANCE: f64 = 1e-9;

/// Upper bound on the number of values a scale may hold.
pub const MAX_SCALE_SIZE: usize = 10_000;

/// How a scale was described at registration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScaleSpec {
    /// An explicit list, e.g. `[1, 2, 3]`.
    Values(Vec<Value>),
    /// An inclusive range, e.g. `{ first = 1.0, last = 5.0 }`.
    Range { first: Number, last: Number },
}

impl ScaleSpec {
    pub fn values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        Self::Values(values.into_iter().map(Value::from).collect())
    }

    pub fn int_range(first: i64, last: i64) -> Self {
        Self::Range { first: first.into(), last: last.into() }
    }

    /// Returns `None` if a bound is not a finite number.
    pub fn float_range(first: f64, last: f64) -> Option<Self> {
        Some(Self::Range { first: Number::from_f64(first)?, last: Number::from_f64(last)? })
    }
}

impl Default for ScaleSpec {
    fn default() -> Self {
        Self::int_range(1, 5)
    }
}

/// The canonical, ordered set of accepted rating values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    values: Vec<f64>,
}

impl Scale {
    /// Expands a spec into concrete values.
    ///
    /// `step` wins over `steps` when both are given; without either a float
    /// range gets `last - first + 1` steps.
    pub fn build(spec: &ScaleSpec, step: Option<f64>, steps: Option<f64>) -> Result<Self> {
        let values = match spec {
            ScaleSpec::Values(raw) => raw
                .iter()
                .map(|v| match v.as_f64() {
                    Some(n) if n.is_finite() => Ok(n),
                    _ => Err(ReviewError::invalid_config(format!(
                        "scale must consist of numeric values only, got {v}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            ScaleSpec::Range { first, last } if first.is_f64() || last.is_f64() => {
                let (first, last) = (bound(first)?, bound(last)?);
                expand_float_range(first, last, step, steps)?
            }
            ScaleSpec::Range { first, last } => {
                let (first, last) = (int_bound(first)?, int_bound(last)?);
                if i128::from(last) - i128::from(first) >= MAX_SCALE_SIZE as i128 {
                    return Err(too_large(format!("range {first}..{last}")));
                }
                (first..=last).map(|v| v as f64).collect()
            }
        };

        if values.is_empty() {
            return Err(ReviewError::invalid_config("scale must not be empty"));
        }
        if values.len() > MAX_SCALE_SIZE {
            return Err(too_large(format!("a list of {}", values.len())));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn first(&self) -> f64 {
        self.values[0]
    }

    pub fn contains(&self, value: f64) -> bool {
        self.values.iter().any(|v| (v - value).abs() <= RATING_TOLERANCE)
    }

    /// True iff every value under test is a member of the scale.
    pub fn is_valid_rating(&self, values: &[f64]) -> bool {
        values.iter().all(|v| self.contains(*v))
    }

    /// Digits after the decimal point of the first value in its float form,
    /// i.e. `1.0` gives 1 and `0.25` gives 2.
    pub fn default_precision(&self) -> u32 {
        let rendered = format!("{:?}", self.first());
        let mantissa = rendered.split(['e', 'E']).next().unwrap_or(&rendered);
        mantissa.split_once('.').map_or(0, |(_, frac)| frac.len() as u32)
    }
}

fn bound(n: &Number) -> Result<f64> {
    n.as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ReviewError::invalid_config(format!("range bound {n} is not numeric")))
}

fn int_bound(n: &Number) -> Result<i64> {
    n.as_i64()
        .ok_or_else(|| ReviewError::invalid_config(format!("range bound {n} is out of range")))
}

fn expand_float_range(first: f64, last: f64, step: Option<f64>, steps: Option<f64>) -> Result<Vec<f64>> {
    if last < first {
        return Err(ReviewError::invalid_config(format!("range {first}..{last} is empty")));
    }
    if first == last {
        return Ok(vec![first]);
    }

    let step = match step {
        Some(step) => step,
        None => {
            let steps = steps.unwrap_or(last - first + 1.0);
            if steps <= 1.0 {
                return Ok(vec![first]);
            }
            (last - first) / (steps - 1.0)
        }
    };
    if !step.is_finite() || step <= 0.0 {
        return Err(ReviewError::invalid_config(format!("step {step} must be a positive number")));
    }

    let count = ((last - first) / step + RATING_TOLERANCE).floor();
    if !count.is_finite() || count >= MAX_SCALE_SIZE as f64 {
        return Err(too_large(format!("range {first}..{last} with step {step}")));
    }
    Ok((0..=count as u64).map(|i| tidy(first + i as f64 * step)).collect())
}

fn too_large(what: String) -> ReviewError {
    ReviewError::invalid_config(format!("{what} yields more than {MAX_SCALE_SIZE} scale values"))
}

/// Strips accumulated binary noise, e.g. `0.30000000000000004` -> `0.3`.
fn tidy(value: f64) -> f64 {
    (value * 1e10).round() / 1e10
}

/// Rounds half away from zero to `precision` decimal digits.
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}
