//! EII Scorer Rust Implementation
//!
//! Ecosystem Integrity Index: combines functional, structural and
//! compositional integrity into one 0–1 score per pixel, optionally nudged by
//! a Natural Capital score.
//!
//! Module layout:
//! - `layer`: co-registered raster grid with focal operations
//! - `utils/`: normalization functions and percentile tables
//! - `components/`: the three integrity components
//! - `combine`: aggregation methods for the components
//! - `modulation/`: Natural Capital KPIs and EII modulation
//! - `stats` / `report`: region statistics and their rendering
//! - `data`: layer tables loaded with Polars
//! - `scorer`: the [`EiiScorer`] coordinator

pub mod combine;
pub mod components;
pub mod config;
pub mod data;
pub mod error;
pub mod layer;
pub mod modulation;
pub mod report;
pub mod scorer;
pub mod stats;
pub mod utils;

// Re-export commonly used types
pub use combine::{combine, combine_layers, AggregationMethod};
pub use config::EiiSettings;
pub use data::LayerStack;
pub use error::{EiiError, EiiResult};
pub use layer::Layer;
pub use modulation::{KpiInputs, KpiLayers, KpiSource, KpiValues, KpiWeights};
pub use report::{OutputFormat, ReportOutput, ReportWriter};
pub use scorer::{EiiInputs, EiiLayers, EiiScorer, ModulatedEii};
pub use stats::{Region, StatRequest};
pub use utils::{PercentileCache, PercentileTable};
