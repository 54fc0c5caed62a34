//! EII Scorer - Main coordinator for scoring ecosystem integrity
//!
//! Ties the three integrity components, the component combiner, Natural Capital
//! modulation and region statistics together. The scorer owns its settings,
//! the percentile-table cache and the report writer; it keeps no per-call state.
//!
//! Components are computed in parallel (Rayon); results are identical to a
//! sequential run.

use crate::combine::{combine_layers, compare_methods, AggregationMethod};
use crate::components::{
    calculate_compositional_integrity, calculate_functional_integrity,
    calculate_structural_integrity, BiiSeries, FunctionalInputs,
};
use crate::config::EiiSettings;
use crate::error::EiiError;
use crate::layer::Layer;
use crate::modulation::{
    apply_modulation, apply_modulation_layer, calculate_nc_score, calculate_nc_score_layer,
    KpiLayers, KpiSource,
};
use crate::report::{writer_for, OutputFormat, RegionReport, ReportOutput, ReportWriter};
use crate::stats::{order_metrics, region_stats, zonal_stats, Region, StatRequest};
use crate::utils::normalization::{PercentileCache, PercentileTable};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Everything needed to compute EII over one grid
#[derive(Debug, Clone)]
pub struct EiiInputs {
    pub functional: FunctionalInputs,
    /// Human Modification Index (0–1)
    pub hmi: Layer,
    pub bii: BiiSeries,
}

/// Component layers and their combination
#[derive(Debug, Clone)]
pub struct EiiLayers {
    pub functional: Layer,
    pub structural: Layer,
    pub compositional: Layer,
    pub eii: Layer,
    pub method: AggregationMethod,
}

impl EiiLayers {
    /// `(label, layer)` pairs in report order
    pub fn labelled(&self) -> [(&'static str, &Layer); 4] {
        [
            ("eii", &self.eii),
            ("functional_integrity", &self.functional),
            ("structural_integrity", &self.structural),
            ("compositional_integrity", &self.compositional),
        ]
    }
}

/// EII after Natural Capital modulation
#[derive(Debug, Clone)]
pub struct ModulatedEii {
    pub nc_score: Layer,
    pub eii: Layer,
}

/// Main EII scorer
pub struct EiiScorer {
    settings: EiiSettings,
    percentile_cache: PercentileCache,
    writer: Box<dyn ReportWriter>,
}

impl EiiScorer {
    /// Validate settings and pick the report writer
    pub fn new(settings: EiiSettings, output: OutputFormat) -> Result<Self> {
        settings.validate().context("Invalid EII settings")?;

        tracing::info!(
            method = %settings.aggregation_method,
            output = ?output,
            modulation_range = settings.modulation.range,
            "EII scorer initialized"
        );

        Ok(Self {
            settings,
            percentile_cache: PercentileCache::new(),
            writer: writer_for(output),
        })
    }

    pub fn settings(&self) -> &EiiSettings {
        &self.settings
    }

    pub fn writer(&self) -> &dyn ReportWriter {
        self.writer.as_ref()
    }

    pub fn percentile_cache(&self) -> &PercentileCache {
        &self.percentile_cache
    }

    /// Percentile table for `path`, loaded once per scorer
    pub fn percentiles(&self, path: &Path) -> Result<Arc<PercentileTable>> {
        self.percentile_cache.get_or_load(path)
    }

    /// Compute all three components and combine them with the configured method
    pub fn calculate_eii(&self, inputs: &EiiInputs, percentiles: &PercentileTable) -> Result<EiiLayers> {
        self.calculate_eii_with(inputs, percentiles, self.settings.aggregation_method)
    }

    /// Same as [`calculate_eii`](Self::calculate_eii) with an explicit method
    pub fn calculate_eii_with(
        &self,
        inputs: &EiiInputs,
        percentiles: &PercentileTable,
        method: AggregationMethod,
    ) -> Result<EiiLayers> {
        let s = &self.settings;

        let (functional, (structural, compositional)) = rayon::join(
            || calculate_functional_integrity(&inputs.functional, percentiles, &s.functional),
            || {
                rayon::join(
                    || calculate_structural_integrity(&inputs.hmi, &s.structural),
                    || calculate_compositional_integrity(&inputs.bii, s.compositional.year),
                )
            },
        );

        let functional = functional.context("Functional integrity failed")?.functional;
        let structural = structural.context("Structural integrity failed")?.structural;
        let compositional = compositional.context("Compositional integrity failed")?;

        let eii = combine_layers(&functional, &structural, &compositional, method)
            .context("Component layers are not co-registered")?;

        tracing::info!(
            %method,
            rows = eii.rows(),
            cols = eii.cols(),
            mean_eii = ?eii.mean(),
            "EII computed"
        );

        Ok(EiiLayers {
            functional,
            structural,
            compositional,
            eii,
            method,
        })
    }

    /// Compute EII using the percentile table at `path` (cached)
    pub fn calculate_eii_from_path(&self, inputs: &EiiInputs, percentiles_path: &Path) -> Result<EiiLayers> {
        let percentiles = self.percentiles(percentiles_path)?;
        self.calculate_eii(inputs, &percentiles)
    }

    /// Mean EII of the same components under every aggregation method
    pub fn compare_methods(&self, layers: &EiiLayers) -> Result<BTreeMap<AggregationMethod, Option<f64>>> {
        Ok(compare_methods(&layers.functional, &layers.structural, &layers.compositional)?)
    }

    /// Resolve any KPI source into KPI layers on the EII grid
    fn kpi_layers(&self, source: &KpiSource) -> Result<Option<KpiLayers>> {
        match source {
            KpiSource::Values(_) => Ok(None),
            KpiSource::Layers(layers) => Ok(Some(layers.clone())),
            KpiSource::Derived(inputs) => Ok(Some(
                inputs
                    .compute(&self.settings.modulation)
                    .context("Failed to derive KPI layers")?,
            )),
        }
    }

    /// Apply Natural Capital modulation to an EII layer
    pub fn modulate(&self, eii: &Layer, source: &KpiSource) -> Result<ModulatedEii> {
        let m = &self.settings.modulation;
        tracing::debug!(source = source.kind(), range = m.range, "applying NC modulation");

        match source {
            KpiSource::Values(kpis) => {
                let nc = calculate_nc_score(kpis.biodiversity, kpis.soil, kpis.water, Some(&m.weights))?;
                let range = m.range;
                Ok(ModulatedEii {
                    nc_score: Layer::filled(eii.rows(), eii.cols(), nc),
                    eii: eii.map(move |e| apply_modulation(e, nc, range)),
                })
            }
            KpiSource::Layers(_) | KpiSource::Derived(_) => {
                let kpis = self
                    .kpi_layers(source)?
                    .context("KPI source produced no layers")?;
                let nc_score =
                    calculate_nc_score_layer(&kpis.biodiversity, &kpis.soil, &kpis.water, Some(&m.weights))?;
                let modulated = apply_modulation_layer(eii, &nc_score, m.range)
                    .context("KPI layers are not co-registered with EII")?;
                Ok(ModulatedEii { nc_score, eii: modulated })
            }
        }
    }

    /// Scalar NC score; layer sources are averaged over valid pixels
    pub fn nc_score(&self, source: &KpiSource) -> Result<f64> {
        let weights = &self.settings.modulation.weights;
        match source {
            KpiSource::Values(kpis) => {
                Ok(calculate_nc_score(kpis.biodiversity, kpis.soil, kpis.water, Some(weights))?)
            }
            _ => {
                let kpis = self
                    .kpi_layers(source)?
                    .context("KPI source produced no layers")?;
                let nc = calculate_nc_score_layer(&kpis.biodiversity, &kpis.soil, &kpis.water, Some(weights))?;
                Ok(nc
                    .mean()
                    .ok_or_else(|| EiiError::InvalidLayer("NC score layer has no valid pixels".to_string()))?)
            }
        }
    }

    /// Statistics for EII (and optionally its components) over one region
    pub fn region_report(
        &self,
        layers: &EiiLayers,
        region: &Region,
        request: &StatRequest,
        include_components: bool,
    ) -> Result<ReportOutput> {
        let mut values = Vec::new();
        for (label, layer) in layers.labelled() {
            if !include_components && label != "eii" {
                continue;
            }
            values.push((label.to_string(), region_stats(label, layer, region, request)?));
        }

        let report = RegionReport {
            geometry_type: region.geometry_type().to_string(),
            values: order_metrics(values),
        };
        self.writer.write_region(&report)
    }

    /// Region means of a modulation result, rendered by the configured writer
    pub fn modulation_report(&self, modulated: &ModulatedEii) -> Result<ReportOutput> {
        self.writer
            .write_modulation(modulated.nc_score.mean(), modulated.eii.mean())
    }

    /// Per-zone statistics for EII and its components
    pub fn zonal_report(&self, layers: &EiiLayers, zones: &Layer, request: &StatRequest) -> Result<ReportOutput> {
        let labelled = layers.labelled();
        let zonal = zonal_stats(&labelled, zones, request)?;
        tracing::info!(zones = zonal.len(), "zonal statistics computed");
        self.writer.write_zonal(&zonal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulation::KpiValues;
    use approx::assert_relative_eq;

    fn inputs() -> EiiInputs {
        EiiInputs {
            functional: FunctionalInputs {
                actual_npp: Layer::filled(3, 3, 500.0),
                potential_npp: Layer::filled(3, 3, 500.0),
                observed_std: None,
                natural_std: None,
            },
            hmi: Layer::filled(3, 3, 0.35),
            bii: BiiSeries::new().with_year(2020, Layer::filled(3, 3, 0.8)),
        }
    }

    fn table() -> PercentileTable {
        PercentileTable::from_pairs([("p95", 200.0)])
    }

    #[test]
    fn test_calculate_eii() {
        let scorer = EiiScorer::new(EiiSettings::default(), OutputFormat::Dict).unwrap();
        let layers = scorer.calculate_eii(&inputs(), &table()).unwrap();

        assert_relative_eq!(layers.functional.data()[4], 1.0);
        assert_relative_eq!(layers.structural.data()[4], 0.25);
        assert_relative_eq!(layers.compositional.data()[4], 0.8);
        // min_fuzzy_logic: 0.25 * (0.8 + 1.0 - 0.8)
        assert_relative_eq!(layers.eii.data()[4], 0.25, epsilon = 1e-12);
        assert_eq!(layers.method, AggregationMethod::MinFuzzyLogic);
    }

    #[test]
    fn test_modulation_with_values() {
        let scorer = EiiScorer::new(EiiSettings::default(), OutputFormat::Dict).unwrap();
        let eii = Layer::filled(2, 2, 0.5);
        let source = KpiSource::Values(KpiValues::new(1.0, 1.0, 1.0).unwrap());
        let modulated = scorer.modulate(&eii, &source).unwrap();
        assert_relative_eq!(modulated.eii.data()[0], 0.55, epsilon = 1e-12);
        assert_relative_eq!(scorer.nc_score(&source).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_modulation_with_layers() {
        let scorer = EiiScorer::new(EiiSettings::default(), OutputFormat::Dict).unwrap();
        let eii = Layer::filled(1, 2, 0.5);
        let source = KpiSource::Layers(KpiLayers {
            biodiversity: Layer::from_vec(1, 2, vec![0.0, 1.0]).unwrap(),
            soil: Layer::from_vec(1, 2, vec![0.0, 1.0]).unwrap(),
            water: Layer::from_vec(1, 2, vec![0.0, 1.0]).unwrap(),
        });
        let modulated = scorer.modulate(&eii, &source).unwrap();
        assert_relative_eq!(modulated.eii.data()[0], 0.45, epsilon = 1e-12);
        assert_relative_eq!(modulated.eii.data()[1], 0.55, epsilon = 1e-12);
        assert_relative_eq!(scorer.nc_score(&source).unwrap(), 0.5, epsilon = 1e-12);

        let misaligned = Layer::filled(3, 3, 0.5);
        assert!(scorer.modulate(&misaligned, &source).is_err());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut settings = EiiSettings::default();
        settings.modulation.weights.water = 0.9;
        assert!(EiiScorer::new(settings, OutputFormat::Dict).is_err());
    }

    #[test]
    fn test_region_report_dict() {
        let scorer = EiiScorer::new(EiiSettings::default(), OutputFormat::Dict).unwrap();
        let layers = scorer.calculate_eii(&inputs(), &table()).unwrap();
        let request = StatRequest::new(Some(&["mean", "max"][..]), &[]).unwrap();

        let out = scorer.region_report(&layers, &Region::All, &request, true).unwrap();
        let json = out.as_json().unwrap();
        assert_eq!(json["geometry_type"], "Polygon");
        assert!(json["values"]["structural_integrity"]["mean"].is_number());

        let out = scorer.region_report(&layers, &Region::Point { row: 1, col: 1 }, &request, false).unwrap();
        let json = out.as_json().unwrap();
        assert_eq!(json["geometry_type"], "Point");
        assert!(json["values"]["eii"].is_number());
        assert!(json["values"].get("functional_integrity").is_none());
    }

    #[test]
    fn test_modulation_report_both_formats() {
        let source = KpiSource::Values(KpiValues::new(1.0, 1.0, 1.0).unwrap());
        let eii = Layer::filled(2, 2, 0.5);

        let scorer = EiiScorer::new(EiiSettings::default(), OutputFormat::Dict).unwrap();
        let out = scorer.modulation_report(&scorer.modulate(&eii, &source).unwrap()).unwrap();
        let json = out.as_json().unwrap();
        assert_relative_eq!(json["nc_score"].as_f64().unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(json["modulated_eii"].as_f64().unwrap(), 0.55, epsilon = 1e-12);

        let scorer = EiiScorer::new(EiiSettings::default(), OutputFormat::Table).unwrap();
        let out = scorer.modulation_report(&scorer.modulate(&eii, &source).unwrap()).unwrap();
        let df = out.as_table().unwrap();
        let modulated = df.column("modulated_eii").unwrap().f64().unwrap().get(0).unwrap();
        assert_relative_eq!(modulated, 0.55, epsilon = 1e-12);
    }

    #[test]
    fn test_compare_methods() {
        let scorer = EiiScorer::new(EiiSettings::default(), OutputFormat::Table).unwrap();
        let layers = scorer.calculate_eii(&inputs(), &table()).unwrap();
        let means = scorer.compare_methods(&layers).unwrap();
        assert_eq!(means.len(), 4);
        let minimum = means[&AggregationMethod::Minimum].unwrap();
        assert!(minimum <= means[&AggregationMethod::GeometricMean].unwrap());
    }
}
