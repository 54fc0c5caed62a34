//! Water KPI: available water capacity normalized by texture
//!
//! AWC comes from the Saxton & Rawls (2006) pedotransfer functions using sand,
//! clay and organic matter (SOM % = SOC % × 1.9). Loams hold the most water, so
//! the achievable AWC range shrinks as texture moves away from ~35 % sand /
//! ~25 % clay; the KPI places the observed AWC within that range.

use crate::error::EiiResult;
use crate::layer::Layer;
use crate::utils::normalization::guard_denominator;

/// SOC → SOM conversion factor
pub const SOM_PER_SOC: f64 = 1.9;

pub const AWC_BASE_MAX: f64 = 25.0;
pub const AWC_MAX_LOWER_BOUND: f64 = 8.0;
pub const AWC_MAX_UPPER_BOUND: f64 = 28.0;

pub const AWC_BASE_MIN: f64 = 5.0;
pub const AWC_MIN_LOWER_BOUND: f64 = 0.0;
pub const AWC_MIN_UPPER_BOUND: f64 = 12.0;

pub const AWC_OPTIMAL_SAND: f64 = 35.0;
pub const AWC_OPTIMAL_CLAY: f64 = 25.0;
pub const AWC_SAND_PENALTY: f64 = 0.005;
pub const AWC_CLAY_PENALTY: f64 = 0.008;

/// Volumetric water content at −33 and −1500 kPa (m³/m³)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterRetention {
    pub field_capacity: f64,
    pub wilting_point: f64,
}

impl WaterRetention {
    /// Available water capacity in vol%
    pub fn awc(&self) -> f64 {
        (self.field_capacity - self.wilting_point) * 100.0
    }
}

/// Saxton & Rawls (2006) moisture at field capacity and wilting point
///
/// `sand_pct`, `clay_pct` in %, `soc_g_per_kg` in g/kg.
pub fn saxton_rawls(sand_pct: f64, clay_pct: f64, soc_g_per_kg: f64) -> WaterRetention {
    let s = sand_pct / 100.0;
    let c = clay_pct / 100.0;
    let om = soc_g_per_kg / 10.0 * SOM_PER_SOC;

    let t33 = -0.251 * s + 0.195 * c + 0.011 * om + 0.006 * s * om - 0.027 * c * om
        + 0.452 * s * c
        + 0.299;
    let theta_33 = t33 + (1.283 * t33 * t33 - 0.374 * t33 - 0.015);

    let t1500 = -0.024 * s + 0.487 * c + 0.006 * om + 0.005 * s * om - 0.013 * c * om
        + 0.068 * s * c
        + 0.031;
    let theta_1500 = t1500 + (0.14 * t1500 - 0.02);

    WaterRetention {
        field_capacity: theta_33,
        wilting_point: theta_1500,
    }
}

/// AWC (vol%) from texture and SOC
pub fn available_water_capacity(sand_pct: f64, clay_pct: f64, soc_g_per_kg: f64) -> f64 {
    saxton_rawls(sand_pct, clay_pct, soc_g_per_kg).awc()
}

/// Parabolic penalty for departing from loam texture
#[inline]
pub fn texture_penalty(sand_pct: f64, clay_pct: f64) -> f64 {
    (sand_pct - AWC_OPTIMAL_SAND).powi(2) * AWC_SAND_PENALTY
        + (clay_pct - AWC_OPTIMAL_CLAY).powi(2) * AWC_CLAY_PENALTY
}

/// Best achievable AWC for this texture (vol%)
pub fn max_awc_for_texture(sand_pct: f64, clay_pct: f64) -> f64 {
    (AWC_BASE_MAX - texture_penalty(sand_pct, clay_pct))
        .clamp(AWC_MAX_LOWER_BOUND, AWC_MAX_UPPER_BOUND)
}

/// Degraded-soil AWC floor for this texture (vol%)
pub fn min_awc_for_texture(sand_pct: f64, clay_pct: f64) -> f64 {
    (AWC_BASE_MIN - texture_penalty(sand_pct, clay_pct))
        .clamp(AWC_MIN_LOWER_BOUND, AWC_MIN_UPPER_BOUND)
}

/// `clamp((awc − min_awc) / (max_awc − min_awc), 0, 1)`
#[inline]
pub fn water_kpi(awc: f64, min_awc: f64, max_awc: f64) -> f64 {
    ((awc - min_awc) / guard_denominator(max_awc - min_awc)).clamp(0.0, 1.0)
}

/// Water KPI straight from texture and SOC
pub fn water_kpi_from_soil(sand_pct: f64, clay_pct: f64, soc_g_per_kg: f64) -> f64 {
    water_kpi(
        available_water_capacity(sand_pct, clay_pct, soc_g_per_kg),
        min_awc_for_texture(sand_pct, clay_pct),
        max_awc_for_texture(sand_pct, clay_pct),
    )
}

pub fn water_kpi_layer(sand_pct: &Layer, clay_pct: &Layer, soc_g_per_kg: &Layer) -> EiiResult<Layer> {
    Layer::zip3_map(sand_pct, clay_pct, soc_g_per_kg, water_kpi_from_soil)
}
