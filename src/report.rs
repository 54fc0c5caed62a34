//! Report writers
//!
//! A region report can be rendered two ways, picked once when the scorer is
//! built:
//! - [`TableWriter`]: a polars `DataFrame` with geometry metadata and one
//!   `metric.stat` column per value (extended metadata)
//! - [`DictWriter`]: a nested JSON map (minimal)

use crate::stats::{MetricStats, StatValues};
use anyhow::{Context, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Formatted statistics for one region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionReport {
    pub geometry_type: String,
    #[serde(serialize_with = "serialize_ordered")]
    pub values: Vec<(String, MetricStats)>,
}

impl RegionReport {
    pub fn metric(&self, label: &str) -> Option<&MetricStats> {
        self.values.iter().find(|(l, _)| l == label).map(|(_, s)| s)
    }
}

fn serialize_ordered<S>(values: &[(String, MetricStats)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_map(values.iter().map(|(k, v)| (k, v)))
}

/// Per-zone statistics, keyed by zone id
pub type ZonalReport = BTreeMap<i64, Vec<(String, MetricStats)>>;

/// Output shape selected at construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Dict,
    Table,
}

/// Rendered report
#[derive(Debug, Clone)]
pub enum ReportOutput {
    Dict(Value),
    Table(DataFrame),
}

impl ReportOutput {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ReportOutput::Dict(v) => Some(v),
            ReportOutput::Table(_) => None,
        }
    }

    pub fn as_table(&self) -> Option<&DataFrame> {
        match self {
            ReportOutput::Table(df) => Some(df),
            ReportOutput::Dict(_) => None,
        }
    }
}

/// Renders region and zonal statistics
pub trait ReportWriter: Send + Sync {
    /// Whether output carries geometry metadata alongside the values
    fn has_extended_metadata(&self) -> bool;

    fn write_region(&self, report: &RegionReport) -> Result<ReportOutput>;

    fn write_zonal(&self, zonal: &ZonalReport) -> Result<ReportOutput>;

    /// Region means of the Natural Capital score and the modulated EII
    fn write_modulation(
        &self,
        nc_score: Option<f64>,
        modulated_eii: Option<f64>,
    ) -> Result<ReportOutput>;
}

/// Writer for `format`
pub fn writer_for(format: OutputFormat) -> Box<dyn ReportWriter> {
    match format {
        OutputFormat::Dict => Box::new(DictWriter),
        OutputFormat::Table => Box::new(TableWriter),
    }
}

/// Nested JSON map: `{"geometry_type": ..., "values": {metric: stats}}`
pub struct DictWriter;

impl ReportWriter for DictWriter {
    fn has_extended_metadata(&self) -> bool {
        false
    }

    fn write_region(&self, report: &RegionReport) -> Result<ReportOutput> {
        let value = serde_json::to_value(report).context("Failed to serialize region report")?;
        Ok(ReportOutput::Dict(value))
    }

    fn write_zonal(&self, zonal: &ZonalReport) -> Result<ReportOutput> {
        let mut zones = Map::new();
        for (zone, metrics) in zonal {
            let mut entry = Map::new();
            for (label, stats) in metrics {
                entry.insert(
                    label.clone(),
                    serde_json::to_value(stats).context("Failed to serialize zone stats")?,
                );
            }
            zones.insert(zone.to_string(), Value::Object(entry));
        }
        Ok(ReportOutput::Dict(json!({ "zones": zones })))
    }

    fn write_modulation(
        &self,
        nc_score: Option<f64>,
        modulated_eii: Option<f64>,
    ) -> Result<ReportOutput> {
        Ok(ReportOutput::Dict(json!({
            "nc_score": nc_score,
            "modulated_eii": modulated_eii,
        })))
    }
}

/// Tabular report: one row per region / zone, `metric.stat` value columns
pub struct TableWriter;

impl TableWriter {
    fn flatten(metrics: &[(String, MetricStats)]) -> Vec<(String, Option<f64>)> {
        let mut cells = Vec::new();
        for (label, stats) in metrics {
            match stats {
                MetricStats::Point(v) => cells.push((label.clone(), *v)),
                MetricStats::Area(StatValues(values)) => {
                    for (stat, v) in values {
                        cells.push((format!("{}.{}", label, stat), *v));
                    }
                }
            }
        }
        cells
    }
}

impl ReportWriter for TableWriter {
    fn has_extended_metadata(&self) -> bool {
        true
    }

    fn write_region(&self, report: &RegionReport) -> Result<ReportOutput> {
        let mut columns = vec![Column::new(
            "geometry_type".into(),
            vec![report.geometry_type.clone()],
        )];
        for (name, value) in Self::flatten(&report.values) {
            columns.push(Column::new(name.into(), vec![value]));
        }
        let df = DataFrame::new(columns).context("Failed to build region table")?;
        Ok(ReportOutput::Table(df))
    }

    fn write_zonal(&self, zonal: &ZonalReport) -> Result<ReportOutput> {
        let zone_ids: Vec<i64> = zonal.keys().copied().collect();

        // Column order follows the first zone; every zone shares the metric set
        let mut names: Vec<String> = Vec::new();
        let mut cells: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
        for metrics in zonal.values() {
            for (name, value) in Self::flatten(metrics) {
                if !cells.contains_key(&name) {
                    names.push(name.clone());
                }
                cells.entry(name).or_default().push(value);
            }
        }

        let mut columns = vec![Column::new("zone".into(), zone_ids)];
        for name in names {
            let values = cells.remove(&name).unwrap_or_default();
            columns.push(Column::new(name.into(), values));
        }
        let df = DataFrame::new(columns).context("Failed to build zonal table")?;
        Ok(ReportOutput::Table(df))
    }

    fn write_modulation(
        &self,
        nc_score: Option<f64>,
        modulated_eii: Option<f64>,
    ) -> Result<ReportOutput> {
        let df = DataFrame::new(vec![
            Column::new("nc_score".into(), vec![nc_score]),
            Column::new("modulated_eii".into(), vec![modulated_eii]),
        ])
        .context("Failed to build modulation table")?;
        Ok(ReportOutput::Table(df))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RegionReport {
        RegionReport {
            geometry_type: "Polygon".to_string(),
            values: vec![
                (
                    "eii".to_string(),
                    MetricStats::Area(StatValues(vec![
                        ("mean".to_string(), Some(0.5)),
                        ("p90".to_string(), Some(0.8)),
                    ])),
                ),
                (
                    "functional_integrity".to_string(),
                    MetricStats::Area(StatValues(vec![
                        ("mean".to_string(), Some(0.7)),
                        ("p90".to_string(), None),
                    ])),
                ),
            ],
        }
    }

    #[test]
    fn test_dict_writer() {
        let writer = writer_for(OutputFormat::Dict);
        assert!(!writer.has_extended_metadata());
        let out = writer.write_region(&report()).unwrap();
        let json = out.as_json().unwrap();
        assert_eq!(json["geometry_type"], "Polygon");
        assert_eq!(json["values"]["eii"]["mean"], 0.5);
        assert!(json["values"]["functional_integrity"]["p90"].is_null());
    }

    #[test]
    fn test_table_writer() {
        let writer = writer_for(OutputFormat::Table);
        assert!(writer.has_extended_metadata());
        let out = writer.write_region(&report()).unwrap();
        let df = out.as_table().unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(df.width(), 5);
        let mean = df.column("eii.mean").unwrap().f64().unwrap().get(0);
        assert_eq!(mean, Some(0.5));
        let missing = df.column("functional_integrity.p90").unwrap().f64().unwrap().get(0);
        assert_eq!(missing, None);
    }

    #[test]
    fn test_zonal_table() {
        let mut zonal = ZonalReport::new();
        zonal.insert(1, report().values);
        zonal.insert(7, report().values);
        let out = TableWriter.write_zonal(&zonal).unwrap();
        let df = out.as_table().unwrap();
        assert_eq!(df.height(), 2);
        let zones = df.column("zone").unwrap().i64().unwrap();
        assert_eq!(zones.get(1), Some(7));

        let out = DictWriter.write_zonal(&zonal).unwrap();
        assert_eq!(out.as_json().unwrap()["zones"]["7"]["eii"]["mean"], 0.5);
    }

    #[test]
    fn test_modulation_writers() {
        let out = TableWriter.write_modulation(Some(0.55), None).unwrap();
        let df = out.as_table().unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(df.column("nc_score").unwrap().f64().unwrap().get(0), Some(0.55));
        assert_eq!(df.column("modulated_eii").unwrap().f64().unwrap().get(0), None);

        let out = DictWriter.write_modulation(Some(0.55), Some(0.6)).unwrap();
        let json = out.as_json().unwrap();
        assert_eq!(json["nc_score"], 0.55);
        assert_eq!(json["modulated_eii"], 0.6);
    }
}
