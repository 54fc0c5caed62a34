//! Natural Capital modulation of EII
//!
//! Three KPIs (biodiversity, soil, water) are folded into a Natural Capital
//! score, which nudges EII by at most ±range/2.
//!
//! KPIs reach the modulator from exactly one [`KpiSource`]: precomputed scalars,
//! precomputed layers, or the physical inputs they are derived from.

pub mod biodiversity;
pub mod nc;
pub mod soil;
pub mod water;

pub use nc::{
    apply_modulation, apply_modulation_layer, calculate_nc_score, calculate_nc_score_layer,
    KpiValues, KpiWeights, MODULATION_RANGE,
};
pub use biodiversity::{biodiversity_kpi, natural_habitat_fraction};
pub use soil::{soil_kpi, SoilDepth, SoilProfile};
pub use water::{available_water_capacity, water_kpi, water_kpi_from_soil};

use crate::config::ModulationSettings;
use crate::error::EiiResult;
use crate::layer::Layer;

/// Precomputed KPI layers, co-registered with the EII grid
#[derive(Debug, Clone)]
pub struct KpiLayers {
    pub biodiversity: Layer,
    pub soil: Layer,
    pub water: Layer,
}

/// Physical inputs the KPI layers are derived from
///
/// Soil properties are in converted units: SOC g/kg, sand and clay %.
#[derive(Debug, Clone)]
pub struct KpiInputs {
    /// Natural land-cover fraction on the EII grid (0–1)
    pub natural_fraction: Layer,
    pub soc_g_per_kg: SoilProfile,
    pub sand_pct: SoilProfile,
    pub clay_pct: SoilProfile,
    /// Köppen-Geiger legend codes (1–30)
    pub koppen_codes: Layer,
}

impl KpiInputs {
    /// Derive all three KPI layers at the configured soil depth
    pub fn compute(&self, settings: &ModulationSettings) -> EiiResult<KpiLayers> {
        let depth = settings.soil_depth;
        tracing::debug!(%depth, "deriving KPI layers");

        let biodiversity = biodiversity::biodiversity_kpi_layer(
            &self.natural_fraction,
            settings.biodiversity_min,
            settings.biodiversity_max,
        )?;

        let soc = self.soc_g_per_kg.at(depth)?;
        let soil = soil::soil_kpi_layer(
            &soc,
            &self.koppen_codes,
            settings.soil_min_threshold,
            settings.default_soc_reference,
        )?;

        let sand = self.sand_pct.at(depth)?;
        let clay = self.clay_pct.at(depth)?;
        let water = water::water_kpi_layer(&sand, &clay, &soc)?;

        Ok(KpiLayers { biodiversity, soil, water })
    }
}

/// Where KPI values come from; exactly one source per modulation call
#[derive(Debug, Clone)]
pub enum KpiSource {
    Values(KpiValues),
    Layers(KpiLayers),
    Derived(Box<KpiInputs>),
}

impl KpiSource {
    pub fn kind(&self) -> &'static str {
        match self {
            KpiSource::Values(_) => "values",
            KpiSource::Layers(_) => "layers",
            KpiSource::Derived(_) => "derived",
        }
    }
}
