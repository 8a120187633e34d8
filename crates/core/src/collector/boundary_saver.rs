//! Half-length shell around the model interior
//!
//! The shell is the ring of `half_length` cells just outside the region the
//! stencil can reconstruct from its own past. Storing it every step is enough
//! to re-run the interior backwards without drift.

use rayon::prelude::*;

use crate::error::ConfigurationError;
use crate::grid::GridSize;

/// Flat indices of the shell cells, in a fixed order.
///
/// Order: x faces (near then far cell, per row), z faces (near then far row),
/// then y faces in 3D. Each face spans the model interior of the other axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryShell {
    indices: Vec<usize>,
}

impl BoundaryShell {
    /// Shell of a window of `size` cells with `hl + bl` padding per side
    pub fn new(size: GridSize, hl: usize, bl: usize) -> Self {
        let off = hl + bl;
        let (nx, ny, nz) = (size.nx, size.ny, size.nz);
        let ys = if size.is_3d() { off..ny - off } else { 0..1 };
        let mut indices = Vec::with_capacity(Self::expected_len(size, hl, bl));

        for y in ys.clone() {
            for z in off..nz - off {
                for ix in 0..hl {
                    indices.push(size.index(bl + ix, y, z));
                    indices.push(size.index(nx - 1 - bl - ix, y, z));
                }
            }
        }
        for y in ys {
            for iz in 0..hl {
                for x in off..nx - off {
                    indices.push(size.index(x, y, bl + iz));
                }
                for x in off..nx - off {
                    indices.push(size.index(x, y, nz - bl - 1 - iz));
                }
            }
        }
        if size.is_3d() {
            for iy in 0..hl {
                for z in off..nz - off {
                    for x in off..nx - off {
                        indices.push(size.index(x, bl + iy, z));
                    }
                }
                for z in off..nz - off {
                    for x in off..nx - off {
                        indices.push(size.index(x, ny - bl - 1 - iy, z));
                    }
                }
            }
        }
        Self { indices }
    }

    /// `2 hl (nxi nyi + nzi nyi) [+ 2 hl nxi nzi]` over the interior extents
    pub fn expected_len(size: GridSize, hl: usize, bl: usize) -> usize {
        let off = 2 * (hl + bl);
        let nxi = size.nx - off;
        let nzi = size.nz - off;
        let nyi = if size.is_3d() { size.ny - off } else { 1 };
        let mut len = 2 * hl * (nxi * nyi + nzi * nyi);
        if size.is_3d() {
            len += 2 * hl * nxi * nzi;
        }
        len
    }

    /// Number of shell cells
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// True for a zero-thickness shell
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Shell cell indices in storage order
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Copy the shell of `field` into `out`
    pub fn gather(&self, field: &[f32], out: &mut [f32]) {
        out.par_iter_mut()
            .zip(self.indices.par_iter())
            .for_each(|(o, &i)| *o = field[i]);
    }

    /// Write `stored` back onto the shell of `field`
    pub fn scatter(&self, stored: &[f32], field: &mut [f32]) {
        for (&i, &value) in self.indices.iter().zip(stored) {
            field[i] = value;
        }
    }
}

/// One shell per time step for a single wavefield component
#[derive(Debug, Clone)]
pub(crate) struct ShellHistory {
    stride: usize,
    data: Vec<f32>,
}

impl ShellHistory {
    /// Zeroed storage for `frames` shells
    pub(crate) fn new(shell: &BoundaryShell, frames: usize) -> Self {
        Self {
            stride: shell.len(),
            data: vec![0.0; shell.len() * frames],
        }
    }

    fn slot(&self, step: usize) -> Result<std::ops::Range<usize>, ConfigurationError> {
        let start = step * self.stride;
        let end = start + self.stride;
        if end > self.data.len() {
            return Err(ConfigurationError::MissingGrid("boundary shell slot"));
        }
        Ok(start..end)
    }

    /// Record the shell of `field` for `step`
    pub(crate) fn save(
        &mut self,
        shell: &BoundaryShell,
        step: usize,
        field: &[f32],
    ) -> Result<(), ConfigurationError> {
        let range = self.slot(step)?;
        shell.gather(field, &mut self.data[range]);
        Ok(())
    }

    /// Overwrite the shell of `field` with the values recorded for `step`
    pub(crate) fn restore(
        &self,
        shell: &BoundaryShell,
        step: usize,
        field: &mut [f32],
    ) -> Result<(), ConfigurationError> {
        let range = self.slot(step)?;
        shell.scatter(&self.data[range], field);
        Ok(())
    }

    /// Bytes held
    pub(crate) fn bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_shell_size_matches_formula() {
        for (size, hl, bl) in [
            (GridSize::new(30, 1, 24), 2, 3),
            (GridSize::new(20, 18, 22), 4, 1),
            (GridSize::new(12, 1, 12), 1, 0),
        ] {
            let shell = BoundaryShell::new(size, hl, bl);
            assert_eq!(shell.len(), BoundaryShell::expected_len(size, hl, bl));
        }
        // 2D: 2 * 2 * (24 * 1 + 18 * 1)
        assert_eq!(
            BoundaryShell::expected_len(GridSize::new(30, 1, 28), 2, 1),
            2 * 2 * (24 + 22)
        );
    }

    #[test]
    fn test_shell_cells_are_distinct_and_outside_interior() {
        let (hl, bl) = (2, 3);
        let size = GridSize::new(20, 16, 18);
        let shell = BoundaryShell::new(size, hl, bl);
        let unique: HashSet<_> = shell.indices().iter().copied().collect();
        assert_eq!(unique.len(), shell.len());

        let off = hl + bl;
        for &i in shell.indices() {
            let y = i / (size.nx * size.nz);
            let z = (i / size.nx) % size.nz;
            let x = i % size.nx;
            let inside = |v: usize, n: usize| v >= off && v < n - off;
            let ring = |v: usize, n: usize| (bl..off).contains(&v) || (n - off..n - bl).contains(&v);
            // exactly one axis sits in the ring, the others in the interior
            let axes = [(x, size.nx), (y, size.ny), (z, size.nz)];
            assert_eq!(axes.iter().filter(|(v, n)| ring(*v, *n)).count(), 1);
            assert_eq!(axes.iter().filter(|(v, n)| inside(*v, *n)).count(), 2);
        }
    }

    #[test]
    fn test_history_save_restore_is_lossless() {
        let size = GridSize::new(14, 1, 12);
        let shell = BoundaryShell::new(size, 2, 2);
        let mut history = ShellHistory::new(&shell, 3);
        let field: Vec<f32> = (0..size.cells()).map(|i| i as f32 * 0.37 - 5.0).collect();

        history.save(&shell, 1, &field).unwrap();
        let mut target = vec![0.0; size.cells()];
        history.restore(&shell, 1, &mut target).unwrap();
        for &i in shell.indices() {
            assert_eq!(target[i].to_bits(), field[i].to_bits());
        }
        let touched: HashSet<_> = shell.indices().iter().copied().collect();
        for (i, v) in target.iter().enumerate() {
            if !touched.contains(&i) {
                assert_eq!(*v, 0.0);
            }
        }
        assert_eq!(history.bytes(), shell.len() * 3 * 4);
        assert!(history.save(&shell, 3, &field).is_err());
    }
}
