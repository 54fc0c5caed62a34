//! EII Settings
//!
//! All tunable constants in one serde structure, loaded from JSON. Every field has
//! a default, so a settings file only needs the values it overrides:
//!
//! ```json
//! { "aggregation_method": "geometric_mean", "modulation": { "range": 0.2 } }
//! ```

use crate::combine::AggregationMethod;
use crate::error::{EiiError, EiiResult};
use crate::modulation::nc::{KpiWeights, MODULATION_RANGE};
use crate::modulation::soil::{SoilDepth, DEFAULT_SOC_REFERENCE, SOIL_MIN_THRESHOLD};
use crate::modulation::biodiversity::{BIODIVERSITY_MAX_THRESHOLD, BIODIVERSITY_MIN_THRESHOLD};
use crate::utils::normalization::{DEFAULT_PERCENTILE_KEY, MIN_DENOMINATOR};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Largest focal radius, in cells, accepted for smoothing and structural windows
pub const MAX_RADIUS_CELLS: f64 = 256.0;

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EiiSettings {
    pub aggregation_method: AggregationMethod,
    pub functional: FunctionalSettings,
    pub structural: StructuralSettings,
    pub compositional: CompositionalSettings,
    pub modulation: ModulationSettings,
}

/// Functional integrity (NPP) settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FunctionalSettings {
    pub magnitude_weight: f64,
    pub seasonality_weight: f64,
    pub include_seasonality: bool,
    /// Key into the percentile table used to truncate |actual − potential|
    pub percentile_key: String,
    /// Square smoothing radius in pixels (0 disables)
    pub smoothing_radius: usize,
    /// Upper cap on actual / potential NPP
    pub max_relative_npp: f64,
    /// Floor on |potential NPP| and natural std before dividing
    pub min_denominator: f64,
}

impl Default for FunctionalSettings {
    fn default() -> Self {
        Self {
            magnitude_weight: 2.0 / 3.0,
            seasonality_weight: 1.0 / 3.0,
            include_seasonality: true,
            percentile_key: DEFAULT_PERCENTILE_KEY.to_string(),
            smoothing_radius: 1,
            max_relative_npp: 5.0,
            min_denominator: MIN_DENOMINATOR,
        }
    }
}

/// Structural integrity (core habitat) settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StructuralSettings {
    /// HMI below this is habitat
    pub hmi_threshold: f64,
    /// Ascending HMI cut points for quality classes 4, 3, 2, 1
    pub quality_thresholds: [f64; 4],
    pub pixel_size_m: f64,
    pub edge_depth_m: f64,
    pub neighborhood_m: f64,
}

impl Default for StructuralSettings {
    fn default() -> Self {
        Self {
            hmi_threshold: 0.4,
            quality_thresholds: [0.1, 0.2, 0.3, 0.4],
            pixel_size_m: 300.0,
            edge_depth_m: 300.0,
            neighborhood_m: 5000.0,
        }
    }
}

impl StructuralSettings {
    pub fn edge_depth_cells(&self) -> f64 {
        self.edge_depth_m / self.pixel_size_m
    }

    pub fn neighborhood_cells(&self) -> f64 {
        self.neighborhood_m / self.pixel_size_m
    }
}

/// Compositional integrity (BII) settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompositionalSettings {
    pub year: i32,
}

impl Default for CompositionalSettings {
    fn default() -> Self {
        Self { year: 2020 }
    }
}

/// Natural Capital modulation settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ModulationSettings {
    pub range: f64,
    pub weights: KpiWeights,
    pub biodiversity_min: f64,
    pub biodiversity_max: f64,
    pub soil_min_threshold: f64,
    pub default_soc_reference: f64,
    pub soil_depth: SoilDepth,
}

impl Default for ModulationSettings {
    fn default() -> Self {
        Self {
            range: MODULATION_RANGE,
            weights: KpiWeights::default(),
            biodiversity_min: BIODIVERSITY_MIN_THRESHOLD,
            biodiversity_max: BIODIVERSITY_MAX_THRESHOLD,
            soil_min_threshold: SOIL_MIN_THRESHOLD,
            default_soc_reference: DEFAULT_SOC_REFERENCE,
            soil_depth: SoilDepth::Top0To30,
        }
    }
}

impl EiiSettings {
    /// Load settings from a JSON file and validate them
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;

        let settings: EiiSettings = serde_json::from_str(&contents)
            .with_context(|| "Failed to parse settings JSON")?;

        settings
            .validate()
            .with_context(|| format!("Invalid settings in {:?}", path))?;

        Ok(settings)
    }

    /// Reject inconsistent configuration before any numeric work
    pub fn validate(&self) -> EiiResult<()> {
        let f = &self.functional;
        for (name, w) in [("magnitude", f.magnitude_weight), ("seasonality", f.seasonality_weight)] {
            if !(0.0..=1.0).contains(&w) {
                return Err(EiiError::InvalidThresholds(format!(
                    "{} weight must be in [0, 1], got {}",
                    name, w
                )));
            }
        }
        let sum = f.magnitude_weight + f.seasonality_weight;
        if (sum - 1.0).abs() > 0.001 {
            return Err(EiiError::WeightSum { sum });
        }
        if !(f.min_denominator > 0.0) {
            return Err(EiiError::InvalidThresholds(format!(
                "min_denominator must be positive, got {}",
                f.min_denominator
            )));
        }
        if !(f.max_relative_npp > 0.0) {
            return Err(EiiError::InvalidThresholds(format!(
                "max_relative_npp must be positive, got {}",
                f.max_relative_npp
            )));
        }
        if f.smoothing_radius as f64 > MAX_RADIUS_CELLS {
            return Err(EiiError::InvalidThresholds(format!(
                "smoothing radius {} exceeds {} cells",
                f.smoothing_radius, MAX_RADIUS_CELLS
            )));
        }

        let s = &self.structural;
        if s.quality_thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EiiError::InvalidThresholds(format!(
                "quality thresholds must be strictly ascending, got {:?}",
                s.quality_thresholds
            )));
        }
        if !(s.pixel_size_m > 0.0) || !(s.edge_depth_m >= 0.0) || !(s.neighborhood_m >= 0.0) {
            return Err(EiiError::InvalidThresholds(
                "structural distances must be non-negative with a positive pixel size".to_string(),
            ));
        }
        for (name, cells) in [("edge depth", s.edge_depth_cells()), ("neighbourhood", s.neighborhood_cells())] {
            if !(cells <= MAX_RADIUS_CELLS) {
                return Err(EiiError::InvalidThresholds(format!(
                    "{} of {} cells exceeds {} cells",
                    name, cells, MAX_RADIUS_CELLS
                )));
            }
        }

        let m = &self.modulation;
        m.weights.validate()?;
        if m.biodiversity_max <= m.biodiversity_min {
            return Err(EiiError::InvalidThresholds(format!(
                "biodiversity max ({}) must exceed min ({})",
                m.biodiversity_max, m.biodiversity_min
            )));
        }
        if !(0.0..1.0).contains(&m.soil_min_threshold) {
            return Err(EiiError::InvalidThresholds(format!(
                "soil threshold must be in [0, 1), got {}",
                m.soil_min_threshold
            )));
        }
        if !(m.default_soc_reference > 0.0) {
            return Err(EiiError::InvalidThresholds(format!(
                "default SOC reference must be positive, got {}",
                m.default_soc_reference
            )));
        }
        Ok(())
    }
}
