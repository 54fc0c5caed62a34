//! Biodiversity KPI from natural land-cover fraction
//!
//! 10 m ESA WorldCover classes are reduced to a natural / not-natural indicator,
//! block-averaged to ~1 ha, then rescaled so that 0 % natural scores 0 and
//! 50 % natural or more scores 1.

use crate::error::{EiiError, EiiResult};
use crate::layer::Layer;
use crate::utils::normalization::linear_rescale;
use rayon::prelude::*;

/// WorldCover codes counted as natural or semi-natural
/// (tree, shrub, grass, bare, snow, water, wetland, mangrove, moss)
pub const NATURAL_LANDCOVER_CLASSES: [u16; 9] = [10, 20, 30, 60, 70, 80, 90, 95, 100];

/// 10 m pixels per side of one aggregation block (100 m)
pub const BIODIVERSITY_AGGREGATION_FACTOR: usize = 10;

pub const BIODIVERSITY_MIN_THRESHOLD: f64 = 0.0;
pub const BIODIVERSITY_MAX_THRESHOLD: f64 = 0.5;

pub fn is_natural_class(code: f64) -> bool {
    code.fract() == 0.0
        && (0.0..=u16::MAX as f64).contains(&code)
        && NATURAL_LANDCOVER_CLASSES.contains(&(code as u16))
}

/// Fraction of natural pixels in each `block`×`block` window
///
/// Edge blocks may be partial. No-data pixels are left out of the fraction;
/// a block with no valid pixel is no-data.
pub fn natural_habitat_fraction(landcover: &Layer, block: usize) -> EiiResult<Layer> {
    if block == 0 {
        return Err(EiiError::InvalidLayer("aggregation block must be non-zero".to_string()));
    }
    let out_rows = landcover.rows().div_ceil(block);
    let out_cols = landcover.cols().div_ceil(block);

    let data = (0..out_rows * out_cols)
        .into_par_iter()
        .map(|idx| {
            let (br, bc) = (idx / out_cols, idx % out_cols);
            let mut natural = 0usize;
            let mut valid = 0usize;
            for r in br * block..((br + 1) * block).min(landcover.rows()) {
                for c in bc * block..((bc + 1) * block).min(landcover.cols()) {
                    if let Some(code) = landcover.get(r, c).filter(|v| v.is_finite()) {
                        valid += 1;
                        if is_natural_class(code) {
                            natural += 1;
                        }
                    }
                }
            }
            if valid == 0 {
                f64::NAN
            } else {
                natural as f64 / valid as f64
            }
        })
        .collect();

    Layer::from_vec(out_rows, out_cols, data)
}

fn check_thresholds(min: f64, max: f64) -> EiiResult<()> {
    if !(max > min) {
        return Err(EiiError::InvalidThresholds(format!(
            "biodiversity max ({}) must exceed min ({})",
            max, min
        )));
    }
    Ok(())
}

/// `clamp((fraction − min) / (max − min), 0, 1)`
pub fn biodiversity_kpi(natural_fraction: f64, min: f64, max: f64) -> EiiResult<f64> {
    check_thresholds(min, max)?;
    Ok(linear_rescale(natural_fraction, min, max))
}

pub fn biodiversity_kpi_layer(natural_fraction: &Layer, min: f64, max: f64) -> EiiResult<Layer> {
    check_thresholds(min, max)?;
    Ok(natural_fraction.map(move |f| linear_rescale(f, min, max)))
}
