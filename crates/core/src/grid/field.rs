//! Flattened 3D scalar fields
//!
//! Every wavefield and property array uses the same layout,
//! `index = y * (nx * nz) + z * nx + x`, so x is the fastest axis and a
//! single `nx`-long row is contiguous. A 2D grid is simply `ny == 1`.

use rayon::prelude::*;

/// A scalar field stored as a flat `Vec<f32>`
#[derive(Debug, Clone, PartialEq)]
pub struct WaveField {
    /// Values in `y * nx * nz + z * nx + x` order
    pub data: Vec<f32>,
    /// Cells along x
    pub nx: usize,
    /// Cells along y (1 for 2D)
    pub ny: usize,
    /// Cells along z
    pub nz: usize,
}

impl WaveField {
    /// Create a field initialized to zero
    ///
    /// # Arguments
    ///
    /// * `nx` - Cells along x
    /// * `ny` - Cells along y, 1 for a 2D grid
    /// * `nz` - Cells along z
    #[must_use]
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self::with_value(nx, ny, nz, 0.0)
    }

    /// Create a field initialized to a constant
    #[must_use]
    pub fn with_value(nx: usize, ny: usize, nz: usize, value: f32) -> Self {
        Self {
            data: vec![value; nx * ny * nz],
            nx,
            ny,
            nz,
        }
    }

    /// Wrap existing data.
    ///
    /// Returns `None` when the length does not match `nx * ny * nz`.
    pub fn from_vec(nx: usize, ny: usize, nz: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == nx * ny * nz).then_some(Self { data, nx, ny, nz })
    }

    /// Total number of cells
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the field holds no cells
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat index of `(x, y, z)`
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        y * self.nx * self.nz + z * self.nx + x
    }

    /// Value at `(x, y, z)`
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    #[must_use]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        assert!(
            x < self.nx && y < self.ny && z < self.nz,
            "Coordinates out of bounds"
        );
        self.data[self.index(x, y, z)]
    }

    /// Set value at `(x, y, z)`
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f32) {
        assert!(
            x < self.nx && y < self.ny && z < self.nz,
            "Coordinates out of bounds"
        );
        let idx = self.index(x, y, z);
        self.data[idx] = value;
    }

    /// Get reference to field data
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Get mutable reference to field data
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Fill the entire field with a value
    pub fn fill(&mut self, value: f32) {
        self.data.par_iter_mut().for_each(|v| *v = value);
    }

    /// Largest value, or `f32::MIN` for an empty field
    pub fn max_value(&self) -> f32 {
        self.data
            .par_iter()
            .copied()
            .reduce(|| f32::MIN, f32::max)
    }

    /// Euclidean norm of all cells, accumulated in f64
    pub fn l2_norm(&self) -> f64 {
        self.data
            .par_iter()
            .map(|&v| f64::from(v) * f64::from(v))
            .sum::<f64>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_creation() {
        let field = WaveField::new(10, 1, 20);
        assert_eq!(field.len(), 200);
        assert!(field.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_field_get_set_layout() {
        let mut field = WaveField::new(4, 3, 5);
        field.set(1, 2, 3, 7.5);
        assert_eq!(field.get(1, 2, 3), 7.5);
        // y * nx * nz + z * nx + x
        assert_eq!(field.data[2 * 4 * 5 + 3 * 4 + 1], 7.5);
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(WaveField::from_vec(2, 1, 2, vec![0.0; 4]).is_some());
        assert!(WaveField::from_vec(2, 1, 2, vec![0.0; 5]).is_none());
    }

    #[test]
    fn test_norm_and_max() {
        let mut field = WaveField::new(2, 1, 2);
        field.data.copy_from_slice(&[3.0, 0.0, -4.0, 1.0]);
        assert!((field.l2_norm() - 26.0_f64.sqrt()).abs() < 1e-9);
        assert_eq!(field.max_value(), 3.0);
    }

    #[test]
    #[should_panic(expected = "Coordinates out of bounds")]
    fn test_field_bounds_check() {
        let field = WaveField::new(3, 1, 3);
        let _ = field.get(0, 1, 0);
    }
}
