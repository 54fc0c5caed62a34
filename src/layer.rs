//! Raster Layer
//!
//! A co-registered, row-major grid of `f64` values. NaN marks no-data, so masked
//! pixels flow through element-wise arithmetic the same way they do in the source
//! rasters. A scalar score is a 1×1 layer.
//!
//! Focal operations skip no-data cells and cells outside the grid; a window with
//! no valid cell yields no-data.

use crate::error::{EiiError, EiiResult};
use rayon::prelude::*;

/// Row-major raster of `f64` values (NaN = no-data)
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// Neighbourhood shape for focal operations, as (row, col) offsets
#[derive(Debug, Clone)]
pub struct Kernel {
    offsets: Vec<(isize, isize)>,
}

impl Kernel {
    /// Square kernel of `radius` cells (radius 1 = 3×3)
    pub fn square(radius: usize) -> Self {
        let r = radius as isize;
        let mut offsets = Vec::with_capacity((2 * radius + 1).pow(2));
        for dr in -r..=r {
            for dc in -r..=r {
                offsets.push((dr, dc));
            }
        }
        Self { offsets }
    }

    /// Circular kernel: every offset within `radius` cells of the centre
    pub fn circle(radius: f64) -> Self {
        let radius = radius.max(0.0);
        let reach = radius.floor() as isize;
        let r2 = radius * radius;
        let mut offsets = Vec::new();
        for dr in -reach..=reach {
            for dc in -reach..=reach {
                if ((dr * dr + dc * dc) as f64) <= r2 {
                    offsets.push((dr, dc));
                }
            }
        }
        Self { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

impl Layer {
    /// Build a layer from row-major values
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> EiiResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(EiiError::InvalidLayer(format!(
                "dimensions must be non-zero, got {}x{}",
                rows, cols
            )));
        }
        if data.len() != rows * cols {
            return Err(EiiError::InvalidLayer(format!(
                "expected {} values for {}x{}, got {}",
                rows * cols,
                rows,
                cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Layer with every pixel set to `value`
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows: rows.max(1),
            cols: cols.max(1),
            data: vec![value; rows.max(1) * cols.max(1)],
        }
    }

    /// 1×1 layer holding a single score
    pub fn scalar(value: f64) -> Self {
        Self::filled(1, 1, value)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Pixel value, `None` outside the grid
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn ensure_same_shape(&self, other: &Layer) -> EiiResult<()> {
        if self.shape() != other.shape() {
            return Err(EiiError::ShapeMismatch {
                expected: self.shape(),
                actual: other.shape(),
            });
        }
        Ok(())
    }

    /// Apply `f` to every pixel
    pub fn map<F>(&self, f: F) -> Layer
    where
        F: Fn(f64) -> f64 + Sync + Send,
    {
        let data = self.data.par_iter().map(|&v| f(v)).collect();
        Layer { rows: self.rows, cols: self.cols, data }
    }

    /// Combine two co-registered layers pixel by pixel
    pub fn zip_map<F>(&self, other: &Layer, f: F) -> EiiResult<Layer>
    where
        F: Fn(f64, f64) -> f64 + Sync + Send,
    {
        self.ensure_same_shape(other)?;
        let data = self
            .data
            .par_iter()
            .zip(other.data.par_iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Layer { rows: self.rows, cols: self.cols, data })
    }

    /// Combine three co-registered layers pixel by pixel
    pub fn zip3_map<F>(a: &Layer, b: &Layer, c: &Layer, f: F) -> EiiResult<Layer>
    where
        F: Fn(f64, f64, f64) -> f64 + Sync + Send,
    {
        a.ensure_same_shape(b)?;
        a.ensure_same_shape(c)?;
        let data = a
            .data
            .par_iter()
            .zip(b.data.par_iter())
            .zip(c.data.par_iter())
            .map(|((&x, &y), &z)| f(x, y, z))
            .collect();
        Ok(Layer { rows: a.rows, cols: a.cols, data })
    }

    /// Finite (non no-data) pixel values
    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().copied().filter(|v| v.is_finite())
    }

    /// Mean of valid pixels, `None` when fully masked
    pub fn mean(&self) -> Option<f64> {
        let (sum, count) = self
            .valid_values()
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    /// Replace no-data with `value`
    pub fn unmask(&self, value: f64) -> Layer {
        self.map(|v| if v.is_finite() { v } else { value })
    }

    /// Mean over a square window of `radius` cells
    pub fn focal_mean_square(&self, radius: usize) -> Layer {
        self.focal_mean(&Kernel::square(radius))
    }

    /// Mean over a circular window of `radius` cells
    pub fn focal_mean_circle(&self, radius: f64) -> Layer {
        self.focal_mean(&Kernel::circle(radius))
    }

    /// Minimum over a circular window of `radius` cells (morphological erosion)
    pub fn focal_min_circle(&self, radius: f64) -> Layer {
        self.focal_min(&Kernel::circle(radius))
    }

    pub fn focal_mean(&self, kernel: &Kernel) -> Layer {
        self.focal(kernel, |values| {
            let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        })
    }

    pub fn focal_min(&self, kernel: &Kernel) -> Layer {
        self.focal(kernel, |values| {
            values.fold(f64::NAN, |acc, v| if acc.is_nan() || v < acc { v } else { acc })
        })
    }

    fn focal<R>(&self, kernel: &Kernel, reduce: R) -> Layer
    where
        R: Fn(&mut dyn Iterator<Item = f64>) -> f64 + Sync + Send,
    {
        let rows = self.rows as isize;
        let cols = self.cols as isize;
        let data = (0..self.data.len())
            .into_par_iter()
            .map(|idx| {
                let r = (idx / self.cols) as isize;
                let c = (idx % self.cols) as isize;
                let mut window = kernel.offsets.iter().filter_map(|&(dr, dc)| {
                    let (rr, cc) = (r + dr, c + dc);
                    if rr < 0 || cc < 0 || rr >= rows || cc >= cols {
                        return None;
                    }
                    let v = self.data[(rr * cols + cc) as usize];
                    v.is_finite().then_some(v)
                });
                reduce(&mut window)
            })
            .collect();
        Layer { rows: self.rows, cols: self.cols, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        assert!(Layer::from_vec(2, 2, vec![1.0, 2.0, 3.0]).is_err());
        assert!(Layer::from_vec(0, 2, vec![]).is_err());
        assert!(Layer::from_vec(2, 2, vec![1.0; 4]).is_ok());
    }

    #[test]
    fn test_kernel_sizes() {
        assert_eq!(Kernel::square(1).len(), 9);
        assert_eq!(Kernel::circle(1.0).len(), 5);
        assert_eq!(Kernel::circle(0.0).len(), 1);
        // r = 1.5 picks up the diagonals (distance √2)
        assert_eq!(Kernel::circle(1.5).len(), 9);
    }

    #[test]
    fn test_zip_map_shape_mismatch() {
        let a = Layer::filled(2, 2, 1.0);
        let b = Layer::filled(2, 3, 1.0);
        let err = a.zip_map(&b, |x, y| x + y).unwrap_err();
        assert_eq!(
            err,
            EiiError::ShapeMismatch { expected: (2, 2), actual: (2, 3) }
        );
    }

    #[test]
    fn test_focal_mean_square_ignores_nodata_and_edges() {
        let layer = Layer::from_vec(
            3,
            3,
            vec![1.0, 2.0, 3.0, 4.0, f64::NAN, 6.0, 7.0, 8.0, 9.0],
        )
        .unwrap();
        let smoothed = layer.focal_mean_square(1);
        // Corner: 1, 2, 4 (NaN skipped)
        assert_relative_eq!(smoothed.get(0, 0).unwrap(), 7.0 / 3.0, epsilon = 1e-12);
        // Centre: all but itself
        assert_relative_eq!(smoothed.get(1, 1).unwrap(), 40.0 / 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_focal_min_circle_erodes() {
        let mut data = vec![1.0; 25];
        data[0] = 0.0;
        let layer = Layer::from_vec(5, 5, data).unwrap();
        let eroded = layer.focal_min_circle(1.0);
        assert_eq!(eroded.get(0, 0), Some(0.0));
        assert_eq!(eroded.get(0, 1), Some(0.0));
        assert_eq!(eroded.get(1, 0), Some(0.0));
        // Diagonal is outside a radius-1 circle
        assert_eq!(eroded.get(1, 1), Some(1.0));
    }

    #[test]
    fn test_fully_masked_window_is_nodata() {
        let layer = Layer::filled(2, 2, f64::NAN);
        assert!(layer.focal_mean_square(1).get(0, 0).unwrap().is_nan());
        assert!(layer.focal_min_circle(1.0).get(1, 1).unwrap().is_nan());
        assert_eq!(layer.mean(), None);
        assert_eq!(layer.unmask(0.0).data(), &[0.0; 4]);
    }
}
