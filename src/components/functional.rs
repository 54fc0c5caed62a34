//! COMPONENT 1: FUNCTIONAL INTEGRITY (NPP)
//!
//! Compares observed NPP with the potential NPP of natural vegetation.
//!
//! **Magnitude** (weight 2/3):
//!   - proportional score: symmetric deviation of actual / potential from 1
//!   - absolute score: |actual − potential| truncated at a percentile break
//!   - magnitude = mean of the two
//!
//! **Seasonality** (weight 1/3): symmetric deviation of observed / natural
//! intra-annual NPP standard deviation from 1.
//!
//! Relative NPP and the absolute difference are smoothed with a 3×3 focal mean
//! before scoring. No-data pixels stay no-data.

use crate::config::FunctionalSettings;
use crate::error::{EiiError, EiiResult};
use crate::layer::Layer;
use crate::utils::normalization::{
    check_break, guard_denominator_with, symmetric_deviation_score, truncated_linear,
    PercentileTable,
};

/// Per-pixel NPP inputs (gC/m²/yr)
#[derive(Debug, Clone)]
pub struct FunctionalInputs {
    pub actual_npp: Layer,
    pub potential_npp: Layer,
    /// Observed intra-annual NPP standard deviation
    pub observed_std: Option<Layer>,
    /// Natural (potential) intra-annual NPP standard deviation
    pub natural_std: Option<Layer>,
}

/// Functional integrity with every intermediate layer
#[derive(Debug, Clone)]
pub struct FunctionalResult {
    pub relative_npp: Layer,
    pub npp_difference: Layer,
    pub proportional_score: Layer,
    pub absolute_score: Layer,
    pub magnitude: Layer,
    pub seasonality: Option<Layer>,
    pub functional: Layer,
}

/// Magnitude integrity for a single pixel: mean of the proportional and
/// absolute-difference scores
pub fn magnitude_integrity(relative_npp: f64, npp_difference: f64, p: f64) -> EiiResult<f64> {
    check_break("p", p)?;
    Ok(magnitude(relative_npp, npp_difference, p))
}

#[inline]
fn magnitude(relative_npp: f64, npp_difference: f64, p: f64) -> f64 {
    0.5 * symmetric_deviation_score(relative_npp) + 0.5 * truncated_linear(npp_difference, p)
}

/// Seasonality integrity: symmetric score of observed_std / natural_std
pub fn seasonality_integrity(observed_std: f64, natural_std: f64, min_denominator: f64) -> f64 {
    symmetric_deviation_score(observed_std / guard_denominator_with(natural_std, min_denominator))
}

/// Weighted blend of magnitude and seasonality; magnitude alone when
/// seasonality is absent
#[inline]
pub fn functional_integrity(
    magnitude: f64,
    seasonality: Option<f64>,
    settings: &FunctionalSettings,
) -> f64 {
    match seasonality {
        Some(s) if settings.include_seasonality => {
            magnitude * settings.magnitude_weight + s * settings.seasonality_weight
        }
        _ => magnitude,
    }
}

/// Smooth with a square focal mean while keeping the input's no-data mask
fn smooth(layer: &Layer, radius: usize) -> EiiResult<Layer> {
    if radius == 0 {
        return Ok(layer.clone());
    }
    layer
        .focal_mean_square(radius)
        .zip_map(layer, |smoothed, raw| if raw.is_nan() { f64::NAN } else { smoothed })
}

/// Full functional integrity pipeline over co-registered NPP layers
pub fn calculate_functional_integrity(
    inputs: &FunctionalInputs,
    percentiles: &PercentileTable,
    settings: &FunctionalSettings,
) -> EiiResult<FunctionalResult> {
    // Precondition checks first; no numeric work on bad config
    let p = percentiles.get(&settings.percentile_key)?;
    check_break(&settings.percentile_key, p)?;
    inputs.actual_npp.ensure_same_shape(&inputs.potential_npp)?;

    let seasonality_inputs = match (&inputs.observed_std, &inputs.natural_std) {
        (Some(obs), Some(nat)) if settings.include_seasonality => {
            inputs.actual_npp.ensure_same_shape(obs)?;
            inputs.actual_npp.ensure_same_shape(nat)?;
            Some((obs, nat))
        }
        (Some(_), None) | (None, Some(_)) if settings.include_seasonality => {
            return Err(EiiError::InvalidLayer(
                "seasonality needs both observed and natural NPP std".to_string(),
            ));
        }
        _ => None,
    };

    let eps = settings.min_denominator;
    let max_relative = settings.max_relative_npp;

    // 1. Relative NPP and absolute difference
    let relative_npp = inputs.actual_npp.zip_map(&inputs.potential_npp, move |a, p| {
        (a / guard_denominator_with(p, eps)).clamp(0.0, max_relative)
    })?;
    let npp_difference = inputs
        .actual_npp
        .zip_map(&inputs.potential_npp, |a, p| (a - p).abs())?;

    // 2. Spatial smoothing
    let relative_npp = smooth(&relative_npp, settings.smoothing_radius)?;
    let npp_difference = smooth(&npp_difference, settings.smoothing_radius)?;

    // 3. Magnitude
    let proportional_score = relative_npp.map(symmetric_deviation_score);
    let absolute_score = npp_difference.map(move |d| truncated_linear(d, p));
    let magnitude = proportional_score.zip_map(&absolute_score, |prop, abs| 0.5 * prop + 0.5 * abs)?;

    // 4. Seasonality
    let seasonality = match seasonality_inputs {
        Some((obs, nat)) => Some(obs.zip_map(nat, move |o, n| seasonality_integrity(o, n, eps))?),
        None => None,
    };

    // 5. Blend
    let functional = match &seasonality {
        Some(seas) => {
            let (wm, ws) = (settings.magnitude_weight, settings.seasonality_weight);
            magnitude.zip_map(seas, move |m, s| m * wm + s * ws)?
        }
        None => magnitude.clone(),
    };

    tracing::debug!(
        mean_functional = ?functional.mean(),
        seasonality = seasonality.is_some(),
        "functional integrity computed"
    );

    Ok(FunctionalResult {
        relative_npp,
        npp_difference,
        proportional_score,
        absolute_score,
        magnitude,
        seasonality,
        functional,
    })
}
