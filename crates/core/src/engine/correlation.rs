//! Zero-lag cross-correlation imaging condition

use tracing::debug;

use crate::error::ConfigurationError;
use crate::grid::{CellDimensions, GridBox, WaveField};
use crate::kernel::for_each_interior_row;
use crate::parameters::ComputationParameters;

/// Stacked image over the model, padding removed
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationData {
    /// Model cells along x
    pub nx: usize,
    /// Model cells along y (1 for 2D)
    pub ny: usize,
    /// Model cells along z
    pub nz: usize,
    /// Cell spacing
    pub cells: CellDimensions,
    /// Image in the grid layout
    pub image: Vec<f32>,
}

impl MigrationData {
    /// Image value at model cell `(x, y, z)`
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.image[y * self.nx * self.nz + z * self.nx + x]
    }

    /// Largest absolute image value
    pub fn max_abs(&self) -> f32 {
        self.image.iter().fold(0.0_f32, |m, v| m.max(v.abs()))
    }
}

/// Per-shot correlation buffer and the stacked image of all shots
#[derive(Debug, Clone)]
pub struct CrossCorrelation {
    params: ComputationParameters,
    shot: WaveField,
    total: WaveField,
}

impl CrossCorrelation {
    /// Buffers sized for the window and the full grid of `grid`
    pub fn new(grid: &GridBox, params: ComputationParameters) -> Self {
        let w = grid.window_size();
        let g = grid.grid_size;
        Self {
            params,
            shot: WaveField::new(w.nx, w.ny, w.nz),
            total: WaveField::new(g.nx, g.ny, g.nz),
        }
    }

    /// Clear the shot image
    pub fn reset_shot(&mut self) {
        self.shot.fill(0.0);
    }

    /// Shot image accumulated so far
    pub fn shot_correlation(&self) -> &WaveField {
        &self.shot
    }

    /// Image stacked over all shots so far
    pub fn stacked(&self) -> &WaveField {
        &self.total
    }

    /// Accumulate `source * receiver` over the stencil interior of the window.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidGeometry`] when either grid does
    /// not match the window the buffers were sized for.
    pub fn correlate(
        &mut self,
        source: &GridBox,
        receiver: &GridBox,
    ) -> Result<(), ConfigurationError> {
        let size = receiver.window_size();
        let s = source.pressure_current().as_slice();
        let r = receiver.pressure_current().as_slice();
        if s.len() != self.shot.len() || r.len() != self.shot.len() {
            return Err(ConfigurationError::InvalidGeometry(format!(
                "correlating frames of {} and {} cells into a {} cell image",
                s.len(),
                r.len(),
                self.shot.len()
            )));
        }
        let hl = self.params.half();
        for_each_interior_row(&mut self.shot.data, size, hl, &self.params, |y, z, xs, row| {
            let base = size.index(0, y, z);
            for x in xs {
                row[x] += s[base + x] * r[base + x];
            }
        });
        Ok(())
    }

    /// Add the shot image into the stack at the window offset, skipping the
    /// halo and the boundary layer
    pub fn stack(&mut self, grid: &GridBox) {
        let pad = self.params.half() + self.params.boundary_length;
        let window = grid.window;
        let w = window.size;
        let ys = if w.is_3d() { pad..w.ny - pad } else { 0..1 };
        let width = w.nx - 2 * pad;
        for y in ys {
            for z in pad..w.nz - pad {
                let src = w.index(pad, y, z);
                let dst = self.total.index(
                    window.start_x + pad,
                    window.start_y + y,
                    window.start_z + z,
                );
                for (out, value) in self.total.data[dst..dst + width]
                    .iter_mut()
                    .zip(&self.shot.data[src..src + width])
                {
                    *out += value;
                }
            }
        }
        debug!(
            start_x = window.start_x,
            start_y = window.start_y,
            start_z = window.start_z,
            "Shot image stacked"
        );
    }

    /// Stacked image with the padding stripped
    pub fn migration_data(&self, grid: &GridBox) -> MigrationData {
        let pad = self.params.half() + self.params.boundary_length;
        let g = grid.grid_size;
        let (y_pad, ny) = if g.is_3d() {
            (pad, g.ny - 2 * pad)
        } else {
            (0, 1)
        };
        let (nx, nz) = (g.nx - 2 * pad, g.nz - 2 * pad);
        let mut image = Vec::with_capacity(nx * ny * nz);
        for y in 0..ny {
            for z in 0..nz {
                let start = self.total.index(pad, y + y_pad, z + pad);
                image.extend_from_slice(&self.total.data[start..start + nx]);
            }
        }
        MigrationData {
            nx,
            ny,
            nz,
            cells: grid.cells,
            image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;
    use crate::parameters::HalfLength;

    fn windowed() -> (GridBox, ComputationParameters) {
        let params = ComputationParameters::new(HalfLength::O2, 2);
        let grid = ModelBuilder::homogeneous(12, 1, 12, 10.0, 1500.0)
            .window(4, 1, 4)
            .build(&params)
            .unwrap();
        (grid, params)
    }

    #[test]
    fn test_correlate_covers_stencil_interior_only() {
        let (mut grid, params) = windowed();
        grid.pressure_current_mut().fill(2.0);
        let mut correlation = CrossCorrelation::new(&grid, params);
        correlation.correlate(&grid, &grid).unwrap();
        let shot = correlation.shot_correlation();
        // window is 10x10 with a one-cell halo
        assert_eq!(shot.get(0, 0, 5), 0.0);
        assert_eq!(shot.get(1, 0, 1), 4.0);
        assert_eq!(shot.get(8, 0, 8), 4.0);
        assert_eq!(shot.get(9, 0, 8), 0.0);
        correlation.reset_shot();
        assert_eq!(correlation.shot_correlation().l2_norm(), 0.0);
    }

    #[test]
    fn test_stack_lands_at_window_offset() {
        let (mut grid, params) = windowed();
        grid.setup_window(5, 0, 2).unwrap();
        grid.pressure_current_mut().fill(1.0);
        let mut correlation = CrossCorrelation::new(&grid, params);
        correlation.correlate(&grid, &grid).unwrap();
        correlation.stack(&grid);
        let total = correlation.stacked();
        // window model cells 3..7 map to full cells 8..12 along x
        assert_eq!(total.get(8, 0, 5), 1.0);
        assert_eq!(total.get(11, 0, 8), 1.0);
        assert_eq!(total.get(7, 0, 5), 0.0);
        assert_eq!(total.get(12, 0, 5), 0.0);
        assert_eq!(total.l2_norm(), 4.0);

        let data = correlation.migration_data(&grid);
        assert_eq!((data.nx, data.ny, data.nz), (12, 1, 12));
        assert_eq!(data.get(5, 0, 2), 1.0);
        assert_eq!(data.get(4, 0, 2), 0.0);
        assert_eq!(data.max_abs(), 1.0);
    }

    #[test]
    fn test_mismatched_frames_rejected() {
        let (grid, params) = windowed();
        let full = ModelBuilder::homogeneous(12, 1, 12, 10.0, 1500.0)
            .build(&params)
            .unwrap();
        let mut correlation = CrossCorrelation::new(&grid, params);
        assert!(matches!(
            correlation.correlate(&full, &grid),
            Err(ConfigurationError::InvalidGeometry(_))
        ));
    }
}
