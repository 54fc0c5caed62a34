//! Statistics Formatter
//!
//! Reduces score layers over a region and reshapes the result into labelled
//! stat maps:
//!
//! - point region: `{label: value}`
//! - area region:  `{label: {stat: value, ..., "p10": value}}`
//!
//! Raw reductions are keyed the way a combined region reducer names its
//! outputs: a single stat with no percentiles gives the bare label (`"eii"`),
//! otherwise `"{label}_{suffix}"` with the suffix from [`StatKind::suffix`]
//! (`"eii_stdDev"`, `"eii_p90"`).

use crate::error::{EiiError, EiiResult};
use crate::layer::Layer;
use crate::utils::normalization::percentile_of_sorted;
use rustc_hash::FxHashMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use smallvec::{smallvec, SmallVec};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Metric labels in report order
pub const METRIC_ORDER: [&str; 4] = [
    "eii",
    "functional_integrity",
    "structural_integrity",
    "compositional_integrity",
];

/// Summary statistic over a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    Mean,
    Median,
    Min,
    Max,
    Std,
}

impl StatKind {
    pub const ALL: [StatKind; 5] = [
        StatKind::Mean,
        StatKind::Median,
        StatKind::Min,
        StatKind::Max,
        StatKind::Std,
    ];

    /// Name used in requests and in formatted output
    pub fn name(&self) -> &'static str {
        match self {
            StatKind::Mean => "mean",
            StatKind::Median => "median",
            StatKind::Min => "min",
            StatKind::Max => "max",
            StatKind::Std => "std",
        }
    }

    /// Suffix the region reducer appends to the label
    pub fn suffix(&self) -> &'static str {
        match self {
            StatKind::Mean => "mean",
            StatKind::Median => "median",
            StatKind::Min => "min",
            StatKind::Max => "max",
            StatKind::Std => "stdDev",
        }
    }

    fn compute(&self, sorted: &[f64]) -> Option<f64> {
        if sorted.is_empty() {
            return None;
        }
        let n = sorted.len() as f64;
        match self {
            StatKind::Mean => Some(sorted.iter().sum::<f64>() / n),
            StatKind::Median => percentile_of_sorted(sorted, 50.0),
            StatKind::Min => sorted.first().copied(),
            StatKind::Max => sorted.last().copied(),
            StatKind::Std => {
                let mean = sorted.iter().sum::<f64>() / n;
                let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                Some(var.sqrt())
            }
        }
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StatKind {
    type Err = EiiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(StatKind::Mean),
            "median" => Ok(StatKind::Median),
            "min" => Ok(StatKind::Min),
            "max" => Ok(StatKind::Max),
            "std" => Ok(StatKind::Std),
            other => Err(EiiError::InvalidStat(other.to_string())),
        }
    }
}

/// Validated set of statistics and percentiles to compute
#[derive(Debug, Clone, PartialEq)]
pub struct StatRequest {
    stats: SmallVec<[StatKind; 5]>,
    percentiles: SmallVec<[u8; 8]>,
}

impl Default for StatRequest {
    fn default() -> Self {
        Self {
            stats: smallvec![StatKind::Mean],
            percentiles: SmallVec::new(),
        }
    }
}

impl StatRequest {
    /// Parse stat names and percentiles; `None` stats means `["mean"]`
    pub fn new(stats: Option<&[&str]>, percentiles: &[i64]) -> EiiResult<Self> {
        let mut kinds: SmallVec<[StatKind; 5]> = SmallVec::new();
        match stats {
            None => kinds.push(StatKind::Mean),
            Some(names) => {
                for name in names {
                    let kind: StatKind = name.parse()?;
                    if !kinds.contains(&kind) {
                        kinds.push(kind);
                    }
                }
            }
        }

        let mut pcts: SmallVec<[u8; 8]> = SmallVec::new();
        for &p in percentiles {
            if !(0..=100).contains(&p) {
                return Err(EiiError::InvalidPercentile(p.to_string()));
            }
            if !pcts.contains(&(p as u8)) {
                pcts.push(p as u8);
            }
        }

        if kinds.is_empty() && pcts.is_empty() {
            return Err(EiiError::NoStatistics);
        }
        Ok(Self { stats: kinds, percentiles: pcts })
    }

    pub fn stats(&self) -> &[StatKind] {
        &self.stats
    }

    pub fn percentiles(&self) -> &[u8] {
        &self.percentiles
    }

    /// One stat and no percentiles: the reducer output carries no suffix
    pub fn is_single_reducer(&self) -> bool {
        self.stats.len() == 1 && self.percentiles.is_empty()
    }
}

/// Where to reduce a layer
#[derive(Debug, Clone)]
pub enum Region {
    /// Single pixel
    Point { row: usize, col: usize },
    /// Whole grid
    All,
    /// Pixels where the mask is finite and positive
    Masked(Layer),
}

impl Region {
    pub fn is_point(&self) -> bool {
        matches!(self, Region::Point { .. })
    }

    pub fn geometry_type(&self) -> &'static str {
        match self {
            Region::Point { .. } => "Point",
            Region::All | Region::Masked(_) => "Polygon",
        }
    }
}

/// Reducer output keyed by `label` / `label_suffix`
pub type RawStats = FxHashMap<String, Option<f64>>;

/// Reduce `layer` over `region`
pub fn reduce_region(
    label: &str,
    layer: &Layer,
    region: &Region,
    request: &StatRequest,
) -> EiiResult<RawStats> {
    let mut raw = RawStats::default();

    let values: Vec<f64> = match region {
        Region::Point { row, col } => {
            let v = layer.get(*row, *col).ok_or(EiiError::PointOutOfBounds {
                row: *row,
                col: *col,
                rows: layer.rows(),
                cols: layer.cols(),
            })?;
            raw.insert(label.to_string(), v.is_finite().then_some(v));
            return Ok(raw);
        }
        Region::All => layer.valid_values().collect(),
        Region::Masked(mask) => {
            layer.ensure_same_shape(mask)?;
            layer
                .data()
                .iter()
                .zip(mask.data())
                .filter(|(v, m)| v.is_finite() && m.is_finite() && **m > 0.0)
                .map(|(v, _)| *v)
                .collect()
        }
    };

    Ok(reduce_values(label, values, request))
}

fn reduce_values(label: &str, mut values: Vec<f64>, request: &StatRequest) -> RawStats {
    values.sort_by(f64::total_cmp);
    let mut raw = RawStats::default();

    if request.is_single_reducer() {
        raw.insert(label.to_string(), request.stats[0].compute(&values));
        return raw;
    }
    for stat in request.stats() {
        raw.insert(format!("{}_{}", label, stat.suffix()), stat.compute(&values));
    }
    for &p in request.percentiles() {
        raw.insert(format!("{}_p{}", label, p), percentile_of_sorted(&values, p as f64));
    }
    raw
}

/// Ordered `stat -> value` map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatValues(pub Vec<(String, Option<f64>)>);

impl StatValues {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.iter().find(|(k, _)| k == key).and_then(|(_, v)| *v)
    }
}

impl Serialize for StatValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Formatted statistics for one metric
#[derive(Debug, Clone, PartialEq)]
pub enum MetricStats {
    Point(Option<f64>),
    Area(StatValues),
}

impl Serialize for MetricStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricStats::Point(v) => v.serialize(serializer),
            MetricStats::Area(values) => values.serialize(serializer),
        }
    }
}

/// Reshape raw reducer output for `label` into a [`MetricStats`]
pub fn format_stats(label: &str, raw: &RawStats, is_point: bool, request: &StatRequest) -> MetricStats {
    let lookup = |key: &str| raw.get(key).copied().flatten();

    if is_point {
        return MetricStats::Point(lookup(label));
    }

    let mut values = Vec::with_capacity(request.stats().len() + request.percentiles().len());
    let single = request.is_single_reducer();
    for stat in request.stats() {
        let value = if single {
            lookup(label)
        } else {
            lookup(&format!("{}_{}", label, stat.suffix()))
        };
        values.push((stat.name().to_string(), value));
    }
    for &p in request.percentiles() {
        values.push((format!("p{}", p), lookup(&format!("{}_p{}", label, p))));
    }
    MetricStats::Area(StatValues(values))
}

/// Reduce and format in one step
pub fn region_stats(
    label: &str,
    layer: &Layer,
    region: &Region,
    request: &StatRequest,
) -> EiiResult<MetricStats> {
    let raw = reduce_region(label, layer, region, request)?;
    Ok(format_stats(label, &raw, region.is_point(), request))
}

/// Sort `(label, value)` pairs into report order; unknown labels keep their
/// relative order after the known ones
pub fn order_metrics<T>(mut metrics: Vec<(String, T)>) -> Vec<(String, T)> {
    metrics.sort_by_key(|(label, _)| {
        METRIC_ORDER
            .iter()
            .position(|m| *m == label.as_str())
            .unwrap_or(METRIC_ORDER.len())
    });
    metrics
}

/// Per-zone statistics for several labelled layers
///
/// `zones` holds integer zone ids; no-data pixels belong to no zone.
pub fn zonal_stats(
    metrics: &[(&str, &Layer)],
    zones: &Layer,
    request: &StatRequest,
) -> EiiResult<BTreeMap<i64, Vec<(String, MetricStats)>>> {
    for (_, layer) in metrics {
        layer.ensure_same_shape(zones)?;
    }

    let mut zone_pixels: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, z) in zones.data().iter().enumerate() {
        if z.is_finite() {
            zone_pixels.entry(z.round() as i64).or_default().push(idx);
        }
    }

    let mut out = BTreeMap::new();
    for (zone, pixels) in zone_pixels {
        let entries = metrics
            .iter()
            .map(|(label, layer)| {
                let values: Vec<f64> = pixels
                    .iter()
                    .map(|&i| layer.data()[i])
                    .filter(|v| v.is_finite())
                    .collect();
                let raw = reduce_values(label, values, request);
                (label.to_string(), format_stats(label, &raw, false, request))
            })
            .collect();
        out.insert(zone, order_metrics(entries));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn layer() -> Layer {
        Layer::from_vec(2, 2, vec![0.2, 0.4, 0.6, f64::NAN]).unwrap()
    }

    #[test]
    fn test_suffix_mapping() {
        assert_eq!(StatKind::Std.suffix(), "stdDev");
        for kind in StatKind::ALL.iter().filter(|k| **k != StatKind::Std) {
            assert_eq!(kind.suffix(), kind.name());
        }
    }

    #[test]
    fn test_request_validation() {
        assert_eq!(StatRequest::new(None, &[]).unwrap(), StatRequest::default());
        assert_eq!(
            StatRequest::new(Some(&["mean", "mode"][..]), &[]),
            Err(EiiError::InvalidStat("mode".to_string()))
        );
        assert_eq!(
            StatRequest::new(Some(&["mean"][..]), &[50, 101]),
            Err(EiiError::InvalidPercentile("101".to_string()))
        );
        assert!(StatRequest::new(Some(&["mean"][..]), &[-1]).is_err());
        assert_eq!(StatRequest::new(Some(&[][..]), &[]), Err(EiiError::NoStatistics));
        assert!(StatRequest::new(Some(&[][..]), &[90]).is_ok());
    }

    #[test]
    fn test_single_reducer_has_no_suffix() {
        let request = StatRequest::default();
        let raw = reduce_region("eii", &layer(), &Region::All, &request).unwrap();
        assert!(raw.contains_key("eii"));
        assert_relative_eq!(raw["eii"].unwrap(), 0.4, epsilon = 1e-12);

        match format_stats("eii", &raw, false, &request) {
            MetricStats::Area(values) => {
                assert_eq!(values.0.len(), 1);
                assert_relative_eq!(values.get("mean").unwrap(), 0.4, epsilon = 1e-12);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_multiple_stats_and_percentiles() {
        let request = StatRequest::new(Some(&["mean", "std", "min", "max", "median"][..]), &[50]).unwrap();
        let raw = reduce_region("eii", &layer(), &Region::All, &request).unwrap();
        assert!(raw.contains_key("eii_stdDev"));
        assert!(raw.contains_key("eii_p50"));

        let MetricStats::Area(values) = format_stats("eii", &raw, false, &request) else {
            panic!("expected area stats");
        };
        let keys: Vec<&str> = values.0.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["mean", "std", "min", "max", "median", "p50"]);
        assert_relative_eq!(values.get("min").unwrap(), 0.2);
        assert_relative_eq!(values.get("max").unwrap(), 0.6);
        assert_relative_eq!(values.get("median").unwrap(), 0.4, epsilon = 1e-12);
        assert_relative_eq!(values.get("std").unwrap(), (0.08_f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_point_region() {
        let request = StatRequest::new(Some(&["mean", "max"][..]), &[10]).unwrap();
        let stats = region_stats("eii", &layer(), &Region::Point { row: 1, col: 0 }, &request).unwrap();
        assert_eq!(stats, MetricStats::Point(Some(0.6)));

        let nodata = region_stats("eii", &layer(), &Region::Point { row: 1, col: 1 }, &request).unwrap();
        assert_eq!(nodata, MetricStats::Point(None));

        assert!(region_stats("eii", &layer(), &Region::Point { row: 5, col: 0 }, &request).is_err());
    }

    #[test]
    fn test_masked_region_and_empty() {
        let request = StatRequest::default();
        let mask = Layer::from_vec(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let stats = region_stats("eii", &layer(), &Region::Masked(mask), &request).unwrap();
        let MetricStats::Area(values) = stats else { panic!("expected area stats") };
        assert_relative_eq!(values.get("mean").unwrap(), 0.2);

        let empty = Layer::filled(2, 2, 0.0);
        let stats = region_stats("eii", &layer(), &Region::Masked(empty), &request).unwrap();
        assert_eq!(stats, MetricStats::Area(StatValues(vec![("mean".to_string(), None)])));
    }

    #[test]
    fn test_metric_ordering() {
        let ordered = order_metrics(vec![
            ("extra".to_string(), 0),
            ("compositional_integrity".to_string(), 1),
            ("eii".to_string(), 2),
            ("functional_integrity".to_string(), 3),
        ]);
        let labels: Vec<&str> = ordered.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(
            labels,
            vec!["eii", "functional_integrity", "compositional_integrity", "extra"]
        );
    }

    #[test]
    fn test_zonal_stats() {
        let eii = Layer::from_vec(1, 4, vec![0.2, 0.4, 0.8, 1.0]).unwrap();
        let zones = Layer::from_vec(1, 4, vec![1.0, 1.0, 2.0, f64::NAN]).unwrap();
        let result = zonal_stats(&[("eii", &eii)], &zones, &StatRequest::default()).unwrap();
        assert_eq!(result.len(), 2);
        let MetricStats::Area(z1) = &result[&1][0].1 else { panic!("expected area stats") };
        assert_relative_eq!(z1.get("mean").unwrap(), 0.3, epsilon = 1e-12);
        let MetricStats::Area(z2) = &result[&2][0].1 else { panic!("expected area stats") };
        assert_relative_eq!(z2.get("mean").unwrap(), 0.8);
    }

    #[test]
    fn test_serialization_shapes() {
        let point = serde_json::to_value(MetricStats::Point(Some(0.5))).unwrap();
        assert_eq!(point, serde_json::json!(0.5));
        let area = serde_json::to_value(MetricStats::Area(StatValues(vec![
            ("mean".to_string(), Some(0.5)),
            ("p90".to_string(), None),
        ])))
        .unwrap();
        assert_eq!(area, serde_json::json!({"mean": 0.5, "p90": null}));
    }
}
