//! Soil KPI: soil organic carbon relative to a climate-zone reference
//!
//! ratio = SOC / reference_SOC(Köppen zone), then
//! kpi = clamp((ratio − t) / (1 − t), 0, 1) with t = 0.1.
//! Reaching the reference SOC of natural soils in the same climate scores 1.
//!
//! SoilGrids stores SOC in dg/kg and sand / clay in g/kg; the helpers below
//! convert to g/kg and % respectively.

use crate::error::{EiiError, EiiResult};
use crate::layer::Layer;
use crate::utils::normalization::{guard_denominator, linear_rescale};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Ratios at or below this floor score 0
pub const SOIL_MIN_THRESHOLD: f64 = 0.1;

/// Reference SOC (g/kg) for unmapped climate zones
pub const DEFAULT_SOC_REFERENCE: f64 = 30.0;

/// Köppen-Geiger zone names indexed by legend code − 1 (codes 1..=30)
pub const KOPPEN_ZONES: [&str; 30] = [
    "Af", "Am", "Aw", "BWh", "BWk", "BSh", "BSk", "Csa", "Csb", "Csc", "Cwa", "Cwb", "Cwc",
    "Cfa", "Cfb", "Cfc", "Dsa", "Dsb", "Dsc", "Dsd", "Dwa", "Dwb", "Dwc", "Dwd", "Dfa", "Dfb",
    "Dfc", "Dfd", "ET", "EF",
];

/// Zone name for a Köppen-Geiger legend code
pub fn koppen_zone_name(code: u8) -> Option<&'static str> {
    (1..=30).contains(&code).then(|| KOPPEN_ZONES[code as usize - 1])
}

/// Typical 0–30 cm SOC (g/kg) of undisturbed soils per climate zone
pub fn reference_soc(zone: &str) -> Option<f64> {
    let soc = match zone {
        // Tropical
        "Af" => 45.0,
        "Am" => 40.0,
        "Aw" => 25.0,
        // Arid
        "BWh" => 8.0,
        "BWk" => 10.0,
        "BSh" => 15.0,
        "BSk" => 20.0,
        // Temperate
        "Csa" => 25.0,
        "Csb" => 35.0,
        "Csc" => 40.0,
        "Cwa" => 30.0,
        "Cwb" => 35.0,
        "Cwc" => 40.0,
        "Cfa" => 35.0,
        "Cfb" => 45.0,
        "Cfc" => 60.0,
        // Continental
        "Dsa" => 35.0,
        "Dsb" => 40.0,
        "Dsc" => 50.0,
        "Dsd" => 60.0,
        "Dwa" => 35.0,
        "Dwb" => 45.0,
        "Dwc" => 60.0,
        "Dwd" => 80.0,
        "Dfa" => 40.0,
        "Dfb" => 50.0,
        "Dfc" => 80.0,
        "Dfd" => 100.0,
        // Polar
        "ET" => 150.0,
        "EF" => 50.0,
        _ => return None,
    };
    Some(soc)
}

/// Reference SOC for a (possibly no-data) Köppen code pixel
pub fn reference_soc_for_code(code: f64, default: f64) -> f64 {
    if !(code.is_finite() && code.fract() == 0.0 && (1.0..=30.0).contains(&code)) {
        return default;
    }
    koppen_zone_name(code as u8)
        .and_then(reference_soc)
        .unwrap_or(default)
}

/// SoilGrids standard depth intervals, plus the derived 0–30 cm aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SoilDepth {
    #[serde(rename = "0-5cm")]
    Top0To5,
    #[serde(rename = "5-15cm")]
    D5To15,
    #[serde(rename = "15-30cm")]
    D15To30,
    #[serde(rename = "30-60cm")]
    D30To60,
    #[serde(rename = "60-100cm")]
    D60To100,
    #[serde(rename = "100-200cm")]
    D100To200,
    #[serde(rename = "0-30cm")]
    Top0To30,
}

impl SoilDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoilDepth::Top0To5 => "0-5cm",
            SoilDepth::D5To15 => "5-15cm",
            SoilDepth::D15To30 => "15-30cm",
            SoilDepth::D30To60 => "30-60cm",
            SoilDepth::D60To100 => "60-100cm",
            SoilDepth::D100To200 => "100-200cm",
            SoilDepth::Top0To30 => "0-30cm",
        }
    }
}

impl fmt::Display for SoilDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoilDepth {
    type Err = EiiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0-5cm" => Ok(SoilDepth::Top0To5),
            "5-15cm" => Ok(SoilDepth::D5To15),
            "15-30cm" => Ok(SoilDepth::D15To30),
            "30-60cm" => Ok(SoilDepth::D30To60),
            "60-100cm" => Ok(SoilDepth::D60To100),
            "100-200cm" => Ok(SoilDepth::D100To200),
            "0-30cm" => Ok(SoilDepth::Top0To30),
            other => Err(EiiError::UnknownDepth(other.to_string())),
        }
    }
}

/// Thickness-weighted 0–30 cm mean of the three top SoilGrids layers
#[inline]
pub fn depth_weighted_top30(d0_5: f64, d5_15: f64, d15_30: f64) -> f64 {
    (5.0 * d0_5 + 10.0 * d5_15 + 15.0 * d15_30) / 30.0
}

/// SoilGrids sand / clay (g/kg) to percent
#[inline]
pub fn soilgrids_texture_percent(g_per_kg: f64) -> f64 {
    g_per_kg / 10.0
}

/// SoilGrids SOC (dg/kg) to g/kg
#[inline]
pub fn soilgrids_soc_g_per_kg(dg_per_kg: f64) -> f64 {
    dg_per_kg / 10.0
}

/// One soil property sampled at SoilGrids depth intervals
#[derive(Debug, Clone, Default)]
pub struct SoilProfile {
    layers: BTreeMap<SoilDepth, Layer>,
}

impl SoilProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth(mut self, depth: SoilDepth, layer: Layer) -> Self {
        self.layers.insert(depth, layer);
        self
    }

    pub fn insert(&mut self, depth: SoilDepth, layer: Layer) {
        self.layers.insert(depth, layer);
    }

    /// Layer at `depth`; 0–30 cm is derived from the top three intervals when
    /// not stored directly
    pub fn at(&self, depth: SoilDepth) -> EiiResult<Layer> {
        if let Some(layer) = self.layers.get(&depth) {
            return Ok(layer.clone());
        }
        if depth == SoilDepth::Top0To30 {
            let a = self.stored(SoilDepth::Top0To5)?;
            let b = self.stored(SoilDepth::D5To15)?;
            let c = self.stored(SoilDepth::D15To30)?;
            return Layer::zip3_map(a, b, c, depth_weighted_top30);
        }
        self.stored(depth).cloned()
    }

    fn stored(&self, depth: SoilDepth) -> EiiResult<&Layer> {
        self.layers.get(&depth).ok_or_else(|| {
            EiiError::InvalidLayer(format!("no soil layer for depth {}", depth))
        })
    }
}

/// `clamp((soc / reference − t) / (1 − t), 0, 1)`
#[inline]
pub fn soil_kpi(soc_g_per_kg: f64, reference_soc: f64, min_threshold: f64) -> f64 {
    let ratio = soc_g_per_kg / guard_denominator(reference_soc);
    linear_rescale(ratio, min_threshold, 1.0)
}

/// Soil KPI per pixel using the Köppen code layer to pick the reference SOC
pub fn soil_kpi_layer(
    soc_g_per_kg: &Layer,
    koppen_codes: &Layer,
    min_threshold: f64,
    default_reference: f64,
) -> EiiResult<Layer> {
    if !(0.0..1.0).contains(&min_threshold) {
        return Err(EiiError::InvalidThresholds(format!(
            "soil threshold must be in [0, 1), got {}",
            min_threshold
        )));
    }
    soc_g_per_kg.zip_map(koppen_codes, move |soc, code| {
        soil_kpi(soc, reference_soc_for_code(code, default_reference), min_threshold)
    })
}
