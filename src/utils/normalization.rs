//! Normalization Utilities
//!
//! Maps raw physical quantities (ratios, differences, fractions) onto bounded
//! [0, 1] integrity scores, and manages the percentile-break tables used to
//! truncate absolute differences.
//!
//! Percentile tables are plain JSON objects (`{"p05": 12.3, ..., "p95": 410.0}`).
//! They are loaded once per owning context through [`PercentileCache`].

use crate::error::{EiiError, EiiResult};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Percentile key used for absolute-difference truncation unless configured otherwise
pub const DEFAULT_PERCENTILE_KEY: &str = "p95";

/// Floor applied to near-zero denominators (potential NPP, natural std, AWC span)
pub const MIN_DENOMINATOR: f64 = 1e-6;

/// Seed used when sampling pixels to derive percentile breaks
pub const PERCENTILE_SAMPLE_SEED: u64 = 42;

/// Score a ratio by its deviation from 1: `1 / (1 + |x - 1|)`
///
/// Ratio 1 scores 1.0; ratios 0 and 2 both score 0.5. NaN stays NaN.
#[inline]
pub fn symmetric_deviation_score(relative: f64) -> f64 {
    1.0 / (1.0 + (relative - 1.0).abs())
}

/// Score an absolute difference against a percentile break `p`:
/// `1 - min(difference, p) / p`
///
/// `p` must be positive and finite.
pub fn truncated_linear_score(difference: f64, p: f64) -> EiiResult<f64> {
    check_break("p", p)?;
    Ok(truncated_linear(difference, p))
}

/// Unchecked form of [`truncated_linear_score`] for per-pixel use after
/// the break has been validated once.
#[inline]
pub(crate) fn truncated_linear(difference: f64, p: f64) -> f64 {
    if difference.is_nan() {
        return f64::NAN;
    }
    1.0 - difference.clamp(0.0, p) / p
}

pub(crate) fn check_break(key: &str, p: f64) -> EiiResult<()> {
    if !(p.is_finite() && p > 0.0) {
        return Err(EiiError::InvalidBreak { key: key.to_string(), value: p });
    }
    Ok(())
}

/// `clamp((value - min) / (max - min), 0, 1)`
#[inline]
pub fn linear_rescale(value: f64, min: f64, max: f64) -> f64 {
    ((value - min) / guard_denominator(max - min)).clamp(0.0, 1.0)
}

/// Floor the magnitude of a denominator at [`MIN_DENOMINATOR`], keeping its sign
#[inline]
pub fn guard_denominator(d: f64) -> f64 {
    guard_denominator_with(d, MIN_DENOMINATOR)
}

#[inline]
pub fn guard_denominator_with(d: f64, epsilon: f64) -> f64 {
    if d.abs() < epsilon {
        if d.is_sign_negative() {
            -epsilon
        } else {
            epsilon
        }
    } else {
        d
    }
}

/// Linear-interpolated percentile of an ascending slice (`pct` in 0..=100)
pub fn percentile_of_sorted(sorted: &[f64], pct: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Percentile breaks keyed by label (`"p05"` .. `"p95"`)
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct PercentileTable {
    breaks: FxHashMap<String, f64>,
}

impl PercentileTable {
    /// Load a table from a JSON object of `key -> break`
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read percentile table: {:?}", path))?;

        let table: PercentileTable = serde_json::from_str(&contents)
            .with_context(|| "Failed to parse percentile table JSON")?;

        if table.breaks.is_empty() {
            anyhow::bail!("Percentile table {:?} is empty", path);
        }

        Ok(table)
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            breaks: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Derive `p05..p95` breaks from a sample of finite values
    ///
    /// Draws up to `n_samples` values without replacement using a seeded RNG so
    /// the table is reproducible, then takes interpolated percentiles.
    pub fn from_samples(values: &[f64], n_samples: usize, seed: u64) -> EiiResult<Self> {
        let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Err(EiiError::InvalidLayer(
                "no valid pixels to derive percentiles from".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut sample: Vec<f64> = if finite.len() > n_samples {
            finite.partial_shuffle(&mut rng, n_samples).0.to_vec()
        } else {
            std::mem::take(&mut finite)
        };
        sample.sort_by(f64::total_cmp);

        let breaks = (5..100)
            .step_by(5)
            .filter_map(|p| {
                percentile_of_sorted(&sample, p as f64).map(|v| (format!("p{:02}", p), v))
            })
            .collect();

        Ok(Self { breaks })
    }

    /// Break for `key`, or an error listing the available keys
    pub fn get(&self, key: &str) -> EiiResult<f64> {
        self.breaks
            .get(key)
            .copied()
            .ok_or_else(|| EiiError::MissingPercentile {
                key: key.to_string(),
                available: self.keys(),
            })
    }

    /// Sorted keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.breaks.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.breaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breaks.is_empty()
    }
}

/// Percentile tables loaded once per owning context, keyed by source path
#[derive(Debug, Default)]
pub struct PercentileCache {
    tables: RwLock<FxHashMap<PathBuf, Arc<PercentileTable>>>,
}

impl PercentileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached table for `path`, loading it on first use
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<PercentileTable>> {
        {
            let tables = self
                .tables
                .read()
                .map_err(|_| anyhow::anyhow!("Percentile cache lock poisoned"))?;
            if let Some(table) = tables.get(path) {
                tracing::debug!(?path, "percentile table cache hit");
                return Ok(Arc::clone(table));
            }
        }

        tracing::info!(?path, "loading percentile table");
        let table = Arc::new(PercentileTable::load(path)?);

        let mut tables = self
            .tables
            .write()
            .map_err(|_| anyhow::anyhow!("Percentile cache lock poisoned"))?;
        let entry = tables.entry(path.to_path_buf()).or_insert(table);
        Ok(Arc::clone(entry))
    }

    /// Register an in-memory table under `path`
    pub fn insert(&self, path: impl Into<PathBuf>, table: PercentileTable) -> Result<()> {
        self.tables
            .write()
            .map_err(|_| anyhow::anyhow!("Percentile cache lock poisoned"))?
            .insert(path.into(), Arc::new(table));
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.tables
            .write()
            .map_err(|_| anyhow::anyhow!("Percentile cache lock poisoned"))?
            .clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tables.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_percentile_interpolates_between_ranks() {
        let sorted = [10.0, 20.0, 30.0, 40.0];
        // Rank 0.9 * 3 = 2.7 lies between 30 and 40
        assert_relative_eq!(percentile_of_sorted(&sorted, 90.0).unwrap(), 37.0, epsilon = 1e-12);
        assert_relative_eq!(percentile_of_sorted(&sorted, 50.0).unwrap(), 25.0, epsilon = 1e-12);
        assert_relative_eq!(percentile_of_sorted(&sorted, 100.0).unwrap(), 40.0);
        assert_eq!(percentile_of_sorted(&[], 50.0), None);
    }

    #[test]
    fn test_symmetric_deviation_score() {
        assert_relative_eq!(symmetric_deviation_score(1.0), 1.0);
        assert_relative_eq!(symmetric_deviation_score(0.0), 0.5);
        assert_relative_eq!(symmetric_deviation_score(2.0), 0.5);
        assert_relative_eq!(
            symmetric_deviation_score(0.7),
            symmetric_deviation_score(1.3),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_truncated_linear_score() {
        assert_relative_eq!(truncated_linear_score(0.0, 10.0).unwrap(), 1.0);
        assert_relative_eq!(truncated_linear_score(10.0, 10.0).unwrap(), 0.0);
        assert_relative_eq!(truncated_linear_score(5.0, 10.0).unwrap(), 0.5);
        assert_relative_eq!(truncated_linear_score(20.0, 10.0).unwrap(), 0.0);
        assert!(truncated_linear_score(1.0, 0.0).is_err());
    }

    #[test]
    fn test_linear_rescale_clamps() {
        assert_relative_eq!(linear_rescale(0.25, 0.0, 0.5), 0.5);
        assert_relative_eq!(linear_rescale(0.9, 0.0, 0.5), 1.0);
        assert_relative_eq!(linear_rescale(-1.0, 0.0, 0.5), 0.0);
    }

    #[test]
    fn test_guard_denominator() {
        assert_eq!(guard_denominator(0.0), MIN_DENOMINATOR);
        assert_eq!(guard_denominator(-1e-9), -MIN_DENOMINATOR);
        assert_eq!(guard_denominator(2.0), 2.0);
    }

    #[test]
    fn test_missing_key_lists_available() {
        let table = PercentileTable::from_pairs([("p95", 100.0), ("p05", 1.0)]);
        assert_relative_eq!(table.get("p95").unwrap(), 100.0);
        match table.get("p50") {
            Err(EiiError::MissingPercentile { key, available }) => {
                assert_eq!(key, "p50");
                assert_eq!(available, vec!["p05".to_string(), "p95".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_from_samples_is_reproducible() {
        let values: Vec<f64> = (0..5000).map(|i| i as f64).collect();
        let a = PercentileTable::from_samples(&values, 1000, PERCENTILE_SAMPLE_SEED).unwrap();
        let b = PercentileTable::from_samples(&values, 1000, PERCENTILE_SAMPLE_SEED).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 19);
        assert!(a.get("p05").unwrap() < a.get("p95").unwrap());
    }

    #[test]
    fn test_from_samples_small_input_uses_all_values() {
        let values = [0.0, 10.0, f64::NAN];
        let table = PercentileTable::from_samples(&values, 1000, 7).unwrap();
        assert_relative_eq!(table.get("p50").unwrap(), 5.0, epsilon = 1e-12);
        assert!(PercentileTable::from_samples(&[f64::NAN], 10, 7).is_err());
    }

    #[test]
    fn test_cache_insert_and_hit() {
        let cache = PercentileCache::new();
        let path = PathBuf::from("in-memory/p.json");
        cache
            .insert(path.clone(), PercentileTable::from_pairs([("p95", 3.0)]))
            .unwrap();
        let table = cache.get_or_load(&path).unwrap();
        assert_relative_eq!(table.get("p95").unwrap(), 3.0);
        assert_eq!(cache.len(), 1);
        cache.clear().unwrap();
        assert!(cache.is_empty());
    }
}
