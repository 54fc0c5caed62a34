//! Error types for EII scoring
//!
//! Every variant is a synchronous precondition violation: the caller passed a
//! configuration or input that cannot produce a score. Nothing here is retryable
//! and no partial result is ever returned alongside an error.

use thiserror::Error;

/// Errors raised by the scoring core
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EiiError {
    #[error("Unknown method: '{0}'. Expected one of: minimum, product, min_fuzzy_logic, geometric_mean")]
    UnknownMethod(String),

    #[error("Weights must sum to 1.0, got {sum:.4}")]
    WeightSum { sum: f64 },

    #[error("Percentile '{key}' not found. Available: {}", available.join(", "))]
    MissingPercentile { key: String, available: Vec<String> },

    #[error("Percentile break must be positive, got {value} for '{key}'")]
    InvalidBreak { key: String, value: f64 },

    #[error("Missing required KPI keys: {}", keys.join(", "))]
    MissingKpi { keys: Vec<String> },

    #[error("KPI '{key}' must be in [0, 1], got {value}")]
    KpiOutOfRange { key: String, value: f64 },

    #[error("KPI '{key}' must be numeric, got {value}")]
    NonNumericKpi { key: String, value: String },

    #[error("Layer shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Invalid layer: {0}")]
    InvalidLayer(String),

    #[error("Invalid stat '{0}'. Valid stats: mean, median, min, max, std")]
    InvalidStat(String),

    #[error("Percentiles must be integers between 0 and 100, got {0}")]
    InvalidPercentile(String),

    #[error("No statistics selected. Provide stats and/or percentiles.")]
    NoStatistics,

    #[error("Point ({row}, {col}) lies outside the {rows}x{cols} grid")]
    PointOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Unknown depth: '{0}'")]
    UnknownDepth(String),

    #[error("No layers available in series")]
    EmptySeries,

    #[error("Invalid thresholds: {0}")]
    InvalidThresholds(String),
}

/// Result alias for core operations
pub type EiiResult<T> = std::result::Result<T, EiiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_percentile_lists_available_keys() {
        let err = EiiError::MissingPercentile {
            key: "p99".to_string(),
            available: vec!["p05".to_string(), "p95".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("p99"));
        assert!(msg.contains("p05, p95"));
    }

    #[test]
    fn test_weight_sum_message() {
        let err = EiiError::WeightSum { sum: 0.9 };
        assert_eq!(err.to_string(), "Weights must sum to 1.0, got 0.9000");
    }
}
