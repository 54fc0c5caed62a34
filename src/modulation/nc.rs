//! Natural Capital score and EII modulation
//!
//! NC = w_b·biodiversity + w_s·soil + w_w·water, then
//! modulated = clamp(EII + (NC − 0.5)·range, 0, 1).
//!
//! NC = 0.5 leaves EII unchanged; with the default range of 0.1 the shift is
//! bounded to ±0.05.

use crate::error::{EiiError, EiiResult};
use crate::layer::Layer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Total modulation range: NC shifts EII by ±range/2
pub const MODULATION_RANGE: f64 = 0.1;

/// Allowed deviation of the weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.001;

pub const KPI_KEYS: [&str; 3] = ["biodiversity", "soil", "water"];

/// Per-KPI weights for the NC score
///
/// Weights absent from a JSON object count as zero; they are never renormalized.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct KpiWeights {
    #[serde(default)]
    pub biodiversity: f64,
    #[serde(default)]
    pub soil: f64,
    #[serde(default)]
    pub water: f64,
}

impl Default for KpiWeights {
    fn default() -> Self {
        Self {
            biodiversity: 1.0 / 3.0,
            soil: 1.0 / 3.0,
            water: 1.0 / 3.0,
        }
    }
}

impl KpiWeights {
    pub fn new(biodiversity: f64, soil: f64, water: f64) -> EiiResult<Self> {
        let weights = Self { biodiversity, soil, water };
        weights.validate()?;
        Ok(weights)
    }

    pub fn sum(&self) -> f64 {
        self.biodiversity + self.soil + self.water
    }

    /// Weights must sum to 1.0 within [`WEIGHT_SUM_TOLERANCE`]
    pub fn validate(&self) -> EiiResult<()> {
        let sum = self.sum();
        if !sum.is_finite() || (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EiiError::WeightSum { sum });
        }
        Ok(())
    }

    #[inline]
    fn apply(&self, biodiversity: f64, soil: f64, water: f64) -> f64 {
        self.biodiversity * biodiversity + self.soil * soil + self.water * water
    }
}

/// Scalar KPI values, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct KpiValues {
    pub biodiversity: f64,
    pub soil: f64,
    pub water: f64,
}

impl KpiValues {
    pub fn new(biodiversity: f64, soil: f64, water: f64) -> EiiResult<Self> {
        let values = Self { biodiversity, soil, water };
        values.validate()?;
        Ok(values)
    }

    /// Every KPI must be finite and within [0, 1]
    pub fn validate(&self) -> EiiResult<()> {
        for (key, value) in KPI_KEYS.iter().zip([self.biodiversity, self.soil, self.water]) {
            if !(0.0..=1.0).contains(&value) {
                return Err(EiiError::KpiOutOfRange { key: key.to_string(), value });
            }
        }
        Ok(())
    }

    /// Parse a JSON object of KPI values, naming any missing or invalid key
    pub fn from_json(value: &Value) -> EiiResult<Self> {
        let missing: Vec<String> = KPI_KEYS
            .iter()
            .filter(|k| value.get(**k).is_none())
            .map(|k| k.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(EiiError::MissingKpi { keys: missing });
        }

        let field = |key: &str| -> EiiResult<f64> {
            let raw = &value[key];
            raw.as_f64().ok_or_else(|| EiiError::NonNumericKpi {
                key: key.to_string(),
                value: raw.to_string(),
            })
        };

        Self::new(field("biodiversity")?, field("soil")?, field("water")?)
    }
}

/// Weighted NC score from scalar KPIs
///
/// `weights = None` uses equal thirds.
pub fn calculate_nc_score(
    biodiversity: f64,
    soil: f64,
    water: f64,
    weights: Option<&KpiWeights>,
) -> EiiResult<f64> {
    let weights = weights.copied().unwrap_or_default();
    weights.validate()?;
    let kpis = KpiValues::new(biodiversity, soil, water)?;
    Ok(weights.apply(kpis.biodiversity, kpis.soil, kpis.water))
}

/// Pixel-wise NC score; weights are validated once for the whole layer
pub fn calculate_nc_score_layer(
    biodiversity: &Layer,
    soil: &Layer,
    water: &Layer,
    weights: Option<&KpiWeights>,
) -> EiiResult<Layer> {
    let weights = weights.copied().unwrap_or_default();
    weights.validate()?;
    Layer::zip3_map(biodiversity, soil, water, move |b, s, w| weights.apply(b, s, w))
}

/// Shift EII by (NC − 0.5)·range and clamp to [0, 1]
#[inline]
pub fn apply_modulation(eii: f64, nc_score: f64, modulation_range: f64) -> f64 {
    (eii + (nc_score - 0.5) * modulation_range).clamp(0.0, 1.0)
}

/// Pixel-wise modulation of an EII layer by an NC layer
pub fn apply_modulation_layer(eii: &Layer, nc_score: &Layer, modulation_range: f64) -> EiiResult<Layer> {
    eii.zip_map(nc_score, move |e, nc| apply_modulation(e, nc, modulation_range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    #[test]
    fn test_nc_score_default_weights() {
        let nc = calculate_nc_score(0.45, 0.68, 0.52, None).unwrap();
        assert_relative_eq!(nc, 0.55, epsilon = 1e-12);
    }

    #[test]
    fn test_nc_score_custom_weights() {
        let weights = KpiWeights::new(0.5, 0.25, 0.25).unwrap();
        let nc = calculate_nc_score(1.0, 0.0, 0.0, Some(&weights)).unwrap();
        assert_relative_eq!(nc, 0.5);
    }

    #[test]
    fn test_weight_sum_violation() {
        let weights = KpiWeights { biodiversity: 0.3, soil: 0.3, water: 0.3 };
        let err = calculate_nc_score(0.5, 0.5, 0.5, Some(&weights)).unwrap_err();
        match err {
            EiiError::WeightSum { sum } => assert_relative_eq!(sum, 0.9, epsilon = 1e-12),
            other => panic!("unexpected: {:?}", other),
        }
        // Within tolerance
        assert!(KpiWeights::new(0.3334, 0.3333, 0.3333).is_ok());
    }

    #[test]
    fn test_missing_weight_counts_as_zero() {
        let weights: KpiWeights = serde_json::from_value(json!({"soil": 0.5, "water": 0.5})).unwrap();
        assert_relative_eq!(weights.biodiversity, 0.0);
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn test_apply_modulation() {
        assert_relative_eq!(apply_modulation(0.5, 0.0, 0.1), 0.45, epsilon = 1e-12);
        assert_relative_eq!(apply_modulation(0.5, 1.0, 0.1), 0.55, epsilon = 1e-12);
        assert_relative_eq!(apply_modulation(0.98, 1.0, 0.1), 1.0);
        assert_relative_eq!(apply_modulation(0.02, 0.0, 0.1), 0.0);
        for e in [0.0, 0.25, 0.5, 0.9, 1.0] {
            assert_eq!(apply_modulation(e, 0.5, 0.3), e);
        }
    }

    #[test]
    fn test_modulation_is_monotonic_in_nc() {
        let mut prev = f64::NEG_INFINITY;
        for i in 0..=10 {
            let v = apply_modulation(0.6, i as f64 / 10.0, 0.1);
            assert!(v >= prev);
            prev = v;
        }
    }

    #[test]
    fn test_kpi_values_from_json() {
        let kpis = KpiValues::from_json(&json!({"biodiversity": 0.2, "soil": 0.4, "water": 0.6})).unwrap();
        assert_relative_eq!(kpis.water, 0.6);

        match KpiValues::from_json(&json!({"biodiversity": 0.2})) {
            Err(EiiError::MissingKpi { keys }) => assert_eq!(keys, vec!["soil", "water"]),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            KpiValues::from_json(&json!({"biodiversity": "high", "soil": 0.4, "water": 0.6})),
            Err(EiiError::NonNumericKpi { .. })
        ));
        assert_eq!(
            KpiValues::from_json(&json!({"biodiversity": 1.2, "soil": 0.4, "water": 0.6})),
            Err(EiiError::KpiOutOfRange { key: "biodiversity".to_string(), value: 1.2 })
        );
    }

    #[test]
    fn test_layer_variants() {
        let b = Layer::from_vec(1, 2, vec![0.0, 1.0]).unwrap();
        let nc = calculate_nc_score_layer(&b, &b, &b, None).unwrap();
        assert_relative_eq!(nc.data()[0], 0.0);
        assert_relative_eq!(nc.data()[1], 1.0, epsilon = 1e-12);

        let eii = Layer::filled(1, 2, 0.5);
        let modulated = apply_modulation_layer(&eii, &nc, 0.1).unwrap();
        assert_relative_eq!(modulated.data()[0], 0.45, epsilon = 1e-12);
        assert_relative_eq!(modulated.data()[1], 0.55, epsilon = 1e-12);

        let bad = KpiWeights { biodiversity: 1.0, soil: 1.0, water: 0.0 };
        assert!(calculate_nc_score_layer(&b, &b, &b, Some(&bad)).is_err());
    }
}
