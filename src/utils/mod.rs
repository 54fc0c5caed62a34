//! Utility modules for EII scoring
//!
//! Shared functionality used across the integrity components and KPIs:
//! - Normalization: bounded score laws, denominator guards, percentile tables

pub mod normalization;

// Re-export commonly used types
pub use normalization::{
    guard_denominator, linear_rescale, percentile_of_sorted, symmetric_deviation_score,
    truncated_linear_score, PercentileCache, PercentileTable, DEFAULT_PERCENTILE_KEY,
    MIN_DENOMINATOR,
};
