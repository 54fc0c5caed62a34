//! Data Loading
//!
//! Loads co-registered per-pixel layers from CSV or Parquet using Polars.
//!
//! Expected table layout: integer `row` and `col` columns plus one numeric column
//! per layer. The grid shape is the largest index + 1 in each direction; cells
//! with no row in the table, and null values, are no-data. A `(row, col)` pair
//! may appear only once.

use crate::layer::Layer;
use crate::modulation::KpiLayers;
use anyhow::{Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashMap;
use std::path::Path;

pub const ROW_COLUMN: &str = "row";
pub const COL_COLUMN: &str = "col";

/// Precomputed KPI columns, used together or not at all
pub const KPI_COLUMNS: [&str; 3] = ["kpi_biodiversity", "kpi_soil", "kpi_water"];

/// Largest grid (rows × cols) a layer table may describe
///
/// Every layer is allocated densely, so a stray index far outside the real
/// extent would otherwise request the whole implied grid.
pub const MAX_GRID_CELLS: usize = 100_000_000;

/// Named layers sharing one grid
#[derive(Debug, Clone)]
pub struct LayerStack {
    rows: usize,
    cols: usize,
    layers: FxHashMap<String, Layer>,
}

impl LayerStack {
    /// Load every non-index column of a CSV file as a layer
    pub fn load_csv(path: &Path) -> Result<Self> {
        tracing::info!(?path, "loading layer table (CSV)");
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.into()))
            .with_context(|| format!("Failed to create CSV reader: {:?}", path))?
            .finish()
            .with_context(|| format!("Failed to load layer CSV: {:?}", path))?;

        Self::from_dataframe(&df)
    }

    /// Load every non-index column of a Parquet file as a layer
    pub fn load_parquet(path: &Path) -> Result<Self> {
        tracing::info!(?path, "loading layer table (Parquet)");
        let path_str = path
            .to_str()
            .with_context(|| format!("Non UTF-8 path: {:?}", path))?;
        let df = LazyFrame::scan_parquet(path_str, Default::default())
            .with_context(|| format!("Failed to scan parquet: {:?}", path))?
            .collect()
            .with_context(|| format!("Failed to load layer parquet: {:?}", path))?;

        Self::from_dataframe(&df)
    }

    /// Load by extension (`.parquet` → Parquet, anything else → CSV)
    pub fn load(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("parquet") => Self::load_parquet(path),
            _ => Self::load_csv(path),
        }
    }

    /// Build the stack from an in-memory table
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let rows_idx = Self::index_column(df, ROW_COLUMN)?;
        let cols_idx = Self::index_column(df, COL_COLUMN)?;

        let rows = rows_idx.iter().max().map_or(0, |m| m.saturating_add(1));
        let cols = cols_idx.iter().max().map_or(0, |m| m.saturating_add(1));
        if rows == 0 || cols == 0 {
            anyhow::bail!("Layer table has no pixels");
        }
        let cells = match rows.checked_mul(cols) {
            Some(n) if n <= MAX_GRID_CELLS => n,
            _ => anyhow::bail!(
                "Layer table grid {}x{} exceeds the {} cell limit",
                rows,
                cols,
                MAX_GRID_CELLS
            ),
        };

        let mut seen = vec![false; cells];
        for (idx, (&r, &c)) in rows_idx.iter().zip(cols_idx.iter()).enumerate() {
            let cell = r * cols + c;
            if seen[cell] {
                anyhow::bail!("Duplicate cell (row {}, col {}) at table row {}", r, c, idx);
            }
            seen[cell] = true;
        }

        let mut layers = FxHashMap::default();
        for name in df.get_column_names() {
            let name = name.as_str();
            if name == ROW_COLUMN || name == COL_COLUMN {
                continue;
            }

            let column = df
                .column(name)?
                .cast(&DataType::Float64)
                .with_context(|| format!("Column '{}' is not numeric", name))?;
            let values = column.f64()?;

            let mut data = vec![f64::NAN; cells];
            for (idx, (&r, &c)) in rows_idx.iter().zip(cols_idx.iter()).enumerate() {
                if let Some(v) = values.get(idx) {
                    data[r * cols + c] = v;
                }
            }
            layers.insert(name.to_string(), Layer::from_vec(rows, cols, data)?);
        }

        tracing::info!(rows, cols, layers = layers.len(), "layer stack loaded");
        Ok(Self { rows, cols, layers })
    }

    fn index_column(df: &DataFrame, name: &str) -> Result<Vec<usize>> {
        let column = df
            .column(name)
            .with_context(|| format!("Column '{}' not found", name))?
            .cast(&DataType::Int64)
            .with_context(|| format!("Column '{}' is not an integer index", name))?;
        let values = column.i64()?;

        let mut out = Vec::with_capacity(values.len());
        for (idx, v) in values.into_iter().enumerate() {
            match v {
                Some(v) if v >= 0 => out.push(v as usize),
                other => anyhow::bail!("Invalid {} index at table row {}: {:?}", name, idx, other),
            }
        }
        Ok(out)
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    /// Layer by name, or an error listing what is available
    pub fn require(&self, name: &str) -> Result<&Layer> {
        self.layers.get(name).with_context(|| {
            format!("Layer '{}' not found. Available: {}", name, self.names().join(", "))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    /// Sorted layer names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.layers.keys().cloned().collect();
        names.sort();
        names
    }

    /// KPI layers when every KPI column is present, `None` when none is
    pub fn kpi_layers(&self) -> Result<Option<KpiLayers>> {
        let present = KPI_COLUMNS.iter().filter(|name| self.contains(name)).count();
        match present {
            0 => Ok(None),
            n if n == KPI_COLUMNS.len() => Ok(Some(KpiLayers {
                biodiversity: self.require(KPI_COLUMNS[0])?.clone(),
                soil: self.require(KPI_COLUMNS[1])?.clone(),
                water: self.require(KPI_COLUMNS[2])?.clone(),
            })),
            _ => anyhow::bail!(
                "KPI columns must be given together: {}",
                KPI_COLUMNS.join(", ")
            ),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, layer: Layer) -> Result<()> {
        if layer.shape() != self.shape() {
            anyhow::bail!(
                "Layer shape {:?} does not match stack shape {:?}",
                layer.shape(),
                self.shape()
            );
        }
        self.layers.insert(name.into(), layer);
        Ok(())
    }
}
