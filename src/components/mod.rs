//! Integrity components
//!
//! Each component is implemented in its own module and yields a [0, 1] layer.

pub mod compositional;
pub mod functional;
pub mod structural;

pub use compositional::{calculate_compositional_integrity, BiiSeries};
pub use functional::{
    calculate_functional_integrity, functional_integrity, magnitude_integrity,
    seasonality_integrity, FunctionalInputs, FunctionalResult,
};
pub use structural::{calculate_structural_integrity, quality_class, StructuralResult};
