//! COMPONENT 3: COMPOSITIONAL INTEGRITY (Biodiversity Intactness Index)
//!
//! Passthrough of a BII layer (already 0–1). Layers are published per year;
//! when the requested year is missing the most recent year is used.

use crate::error::{EiiError, EiiResult};
use crate::layer::Layer;
use std::collections::BTreeMap;

/// BII layers keyed by year
#[derive(Debug, Clone, Default)]
pub struct BiiSeries {
    layers: BTreeMap<i32, Layer>,
}

impl BiiSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_year(mut self, year: i32, layer: Layer) -> Self {
        self.layers.insert(year, layer);
        self
    }

    pub fn insert(&mut self, year: i32, layer: Layer) {
        self.layers.insert(year, layer);
    }

    pub fn years(&self) -> Vec<i32> {
        self.layers.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Year actually served for a request: exact match, else the latest
    pub fn resolve_year(&self, year: i32) -> EiiResult<i32> {
        if self.layers.contains_key(&year) {
            return Ok(year);
        }
        self.layers
            .keys()
            .next_back()
            .copied()
            .ok_or(EiiError::EmptySeries)
    }
}

/// BII for `year`, passed through untransformed
///
/// Out-of-range values are reported as-is; the combiner clamps its inputs.
pub fn calculate_compositional_integrity(series: &BiiSeries, year: i32) -> EiiResult<Layer> {
    let resolved = series.resolve_year(year)?;
    if resolved != year {
        tracing::warn!(requested = year, using = resolved, "BII year not available, using latest");
    }
    let layer = series.layers.get(&resolved).ok_or(EiiError::EmptySeries)?;
    Ok(layer.clone())
}
