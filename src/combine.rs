//! Component Combiner
//!
//! Folds the three integrity components (functional, structural, compositional)
//! into a single EII value. Every method maps [0,1]³ into [0,1], has (1,1,1) as a
//! fixed point, and is symmetric in its arguments.
//!
//! | method            | formula                        |
//! |-------------------|--------------------------------|
//! | `minimum`         | min(f, s, c)                   |
//! | `product`         | f · s · c                      |
//! | `min_fuzzy_logic` | M · (Med + Max − Med · Max)    |
//! | `geometric_mean`  | (f · s · c)^(1/3)              |
//!
//! `min_fuzzy_logic` is the default: the weakest component caps the score and the
//! other two act as a fuzzy OR on top of it.

use crate::error::{EiiError, EiiResult};
use crate::layer::Layer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Rule for combining the three integrity components
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    Minimum,
    Product,
    #[default]
    MinFuzzyLogic,
    GeometricMean,
}

impl AggregationMethod {
    pub const ALL: [AggregationMethod; 4] = [
        AggregationMethod::Minimum,
        AggregationMethod::Product,
        AggregationMethod::MinFuzzyLogic,
        AggregationMethod::GeometricMean,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::Minimum => "minimum",
            AggregationMethod::Product => "product",
            AggregationMethod::MinFuzzyLogic => "min_fuzzy_logic",
            AggregationMethod::GeometricMean => "geometric_mean",
        }
    }

    /// Combine three component scores under this method
    pub fn combine(self, functional: f64, structural: f64, compositional: f64) -> f64 {
        combine(functional, structural, compositional, self)
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMethod {
    type Err = EiiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimum" => Ok(AggregationMethod::Minimum),
            "product" => Ok(AggregationMethod::Product),
            "min_fuzzy_logic" => Ok(AggregationMethod::MinFuzzyLogic),
            "geometric_mean" => Ok(AggregationMethod::GeometricMean),
            other => Err(EiiError::UnknownMethod(other.to_string())),
        }
    }
}

/// Combine three components into an EII value
///
/// Inputs are clamped to [0, 1] first. Any no-data input yields no-data.
pub fn combine(
    functional: f64,
    structural: f64,
    compositional: f64,
    method: AggregationMethod,
) -> f64 {
    if functional.is_nan() || structural.is_nan() || compositional.is_nan() {
        return f64::NAN;
    }
    let f = functional.clamp(0.0, 1.0);
    let s = structural.clamp(0.0, 1.0);
    let c = compositional.clamp(0.0, 1.0);

    match method {
        AggregationMethod::Minimum => f.min(s).min(c),
        AggregationMethod::Product => f * s * c,
        AggregationMethod::MinFuzzyLogic => {
            let mut v = [f, s, c];
            v.sort_by(f64::total_cmp);
            let (min, med, max) = (v[0], v[1], v[2]);
            min * (med + max - med * max)
        }
        AggregationMethod::GeometricMean => (f * s * c).powf(1.0 / 3.0),
    }
}

/// Combine by method name; unknown names are rejected, never defaulted
pub fn combine_named(
    functional: f64,
    structural: f64,
    compositional: f64,
    method: &str,
) -> EiiResult<f64> {
    let method: AggregationMethod = method.parse()?;
    Ok(combine(functional, structural, compositional, method))
}

/// Pixel-wise combination of co-registered component layers
pub fn combine_layers(
    functional: &Layer,
    structural: &Layer,
    compositional: &Layer,
    method: AggregationMethod,
) -> EiiResult<Layer> {
    Layer::zip3_map(functional, structural, compositional, move |f, s, c| {
        combine(f, s, c, method)
    })
}

/// Mean EII of the same components under every aggregation method
///
/// Fully masked results map to `None`.
pub fn compare_methods(
    functional: &Layer,
    structural: &Layer,
    compositional: &Layer,
) -> EiiResult<BTreeMap<AggregationMethod, Option<f64>>> {
    let mut means = BTreeMap::new();
    for method in AggregationMethod::ALL {
        let eii = combine_layers(functional, structural, compositional, method)?;
        means.insert(method, eii.mean());
    }
    Ok(means)
}
