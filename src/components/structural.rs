//! COMPONENT 2: STRUCTURAL INTEGRITY (quality-weighted core habitat)
//!
//! Measures fragmentation and habitat quality together from the Human
//! Modification Index (HMI, 0–1):
//!
//! 1. habitat = HMI < 0.4
//! 2. core = habitat eroded by the edge depth (circular focal minimum)
//! 3. weighted core = core × quality class
//! 4. score = neighbourhood mean of weighted core / 4
//!
//! Quality classes:
//!   HMI < 0.1 → 4 (pristine), < 0.2 → 3, < 0.3 → 2, < 0.4 → 1, else 0
//!
//! Edge and non-habitat pixels contribute 0 to the neighbourhood mean rather
//! than being masked out, so 1.0 means all-pristine core and 0.25 all
//! semi-natural core.

use crate::config::StructuralSettings;
use crate::error::EiiResult;
use crate::layer::Layer;

/// Highest quality class; divides the neighbourhood mean
pub const MAX_QUALITY_WEIGHT: f64 = 4.0;

/// Quality class 0–4 for an HMI value under ascending `thresholds`
pub fn quality_class(hmi: f64, thresholds: &[f64; 4]) -> f64 {
    if hmi.is_nan() {
        return f64::NAN;
    }
    thresholds
        .iter()
        .position(|&t| hmi < t)
        .map(|i| (4 - i) as f64)
        .unwrap_or(0.0)
}

/// Structural integrity intermediates
#[derive(Debug, Clone)]
pub struct StructuralResult {
    pub habitat: Layer,
    pub core: Layer,
    pub quality: Layer,
    pub weighted_core: Layer,
    pub structural: Layer,
}

pub fn calculate_structural_integrity(
    hmi: &Layer,
    settings: &StructuralSettings,
) -> EiiResult<StructuralResult> {
    let threshold = settings.hmi_threshold;
    let thresholds = settings.quality_thresholds;

    let habitat = hmi.map(move |h| {
        if h.is_nan() {
            f64::NAN
        } else if h < threshold {
            1.0
        } else {
            0.0
        }
    });
    let core = habitat.focal_min_circle(settings.edge_depth_cells());
    let quality = hmi.map(move |h| quality_class(h, &thresholds));
    let weighted_core = core.zip_map(&quality, |c, q| c * q)?;

    let structural = weighted_core
        .focal_mean_circle(settings.neighborhood_cells())
        .map(|v| v / MAX_QUALITY_WEIGHT)
        .unmask(0.0);

    tracing::debug!(
        edge_cells = settings.edge_depth_cells(),
        neighborhood_cells = settings.neighborhood_cells(),
        mean_structural = ?structural.mean(),
        "structural integrity computed"
    );

    Ok(StructuralResult {
        habitat,
        core,
        quality,
        weighted_core,
        structural,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const T: [f64; 4] = [0.1, 0.2, 0.3, 0.4];

    #[test]
    fn test_quality_classes() {
        assert_eq!(quality_class(0.05, &T), 4.0);
        assert_eq!(quality_class(0.1, &T), 3.0);
        assert_eq!(quality_class(0.25, &T), 2.0);
        assert_eq!(quality_class(0.35, &T), 1.0);
        assert_eq!(quality_class(0.4, &T), 0.0);
        assert_eq!(quality_class(0.9, &T), 0.0);
        assert!(quality_class(f64::NAN, &T).is_nan());
    }

    fn settings(edge: f64, neighborhood: f64) -> StructuralSettings {
        StructuralSettings {
            pixel_size_m: 1.0,
            edge_depth_m: edge,
            neighborhood_m: neighborhood,
            ..StructuralSettings::default()
        }
    }

    #[test]
    fn test_pristine_landscape_scores_one() {
        let hmi = Layer::filled(5, 5, 0.01);
        let result = calculate_structural_integrity(&hmi, &settings(1.0, 2.0)).unwrap();
        for &v in result.structural.data() {
            assert_relative_eq!(v, 1.0);
        }
    }

    #[test]
    fn test_semi_natural_landscape_scores_quarter() {
        let hmi = Layer::filled(4, 4, 0.35);
        let result = calculate_structural_integrity(&hmi, &settings(1.0, 1.0)).unwrap();
        assert_relative_eq!(result.structural.get(2, 2).unwrap(), 0.25);
    }

    #[test]
    fn test_modified_landscape_scores_zero() {
        let hmi = Layer::filled(3, 3, 0.8);
        let result = calculate_structural_integrity(&hmi, &settings(1.0, 1.0)).unwrap();
        assert!(result.structural.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_edges_are_eroded() {
        // A single modified pixel removes core habitat around it
        let mut data = vec![0.01; 9];
        data[4] = 0.9;
        let hmi = Layer::from_vec(3, 3, data).unwrap();
        let result = calculate_structural_integrity(&hmi, &settings(1.0, 0.0)).unwrap();
        // Orthogonal neighbours of the centre lose core status
        assert_eq!(result.core.get(0, 1), Some(0.0));
        assert_eq!(result.core.get(1, 0), Some(0.0));
        // Corners are outside a radius-1 circle of the centre
        assert_eq!(result.core.get(0, 0), Some(1.0));
        assert_relative_eq!(result.structural.get(0, 0).unwrap(), 1.0);
        assert_relative_eq!(result.structural.get(1, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_nodata_becomes_zero() {
        let hmi = Layer::filled(2, 2, f64::NAN);
        let result = calculate_structural_integrity(&hmi, &settings(1.0, 1.0)).unwrap();
        assert!(result.structural.data().iter().all(|&v| v == 0.0));
    }
}
