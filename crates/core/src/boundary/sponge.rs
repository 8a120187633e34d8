//! Exponential sponge (Cerjan et al., 1985)
//!
//! After every pressure update the current pressure inside the padding is
//! multiplied by `exp(-(0.1 / bl * (bl - i))^2)`, `i` being the distance from
//! the outer edge of the padding. Where two padding slabs overlap the smaller
//! of the two factors is used.

use rayon::prelude::*;

use super::extension::{Extension, Property};
use super::{BoundaryManager, StepPhase};
use crate::error::ConfigurationError;
use crate::grid::{Formulation, GridBox};
use crate::parameters::ComputationParameters;

/// Sponge damping for either formulation
#[derive(Debug)]
pub struct SpongeBoundaryManager {
    extensions: Vec<Extension>,
    coefficients: Vec<f32>,
    half_length: usize,
}

/// Sponge multiplier per padding layer, index 0 being the outermost layer
pub fn sponge_coefficients(boundary_length: usize) -> Vec<f32> {
    let bl = boundary_length as f32;
    (0..boundary_length)
        .map(|i| {
            let value = 0.1 / bl * (bl - i as f32);
            (-(value * value)).exp()
        })
        .collect()
}

impl SpongeBoundaryManager {
    /// Homogeneous extensions and precomputed layer multipliers
    pub fn new(formulation: Formulation, params: &ComputationParameters, use_top_layer: bool) -> Self {
        let (hl, bl) = (params.half(), params.boundary_length);
        let mut extensions = vec![Extension::homogeneous(Property::Velocity, use_top_layer, hl, bl)];
        if formulation == Formulation::Staggered {
            extensions.push(Extension::homogeneous(Property::Density, use_top_layer, hl, bl));
        }
        Self {
            extensions,
            coefficients: sponge_coefficients(bl),
            half_length: hl,
        }
    }

    /// Layer multipliers
    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    /// Layer index of `v` along an axis of length `n`, `None` outside the padding
    #[inline]
    fn layer(&self, v: usize, n: usize) -> Option<usize> {
        let (hl, bl) = (self.half_length, self.coefficients.len());
        if v >= hl && v < hl + bl {
            Some(v - hl)
        } else if v + hl + bl >= n && v < n - hl {
            Some(n - hl - 1 - v)
        } else {
            None
        }
    }

    /// Combined multiplier of a padding cell.
    ///
    /// Face cells take their own layer factor, edges the smaller of two.
    /// Triple corners are covered by both the y-z and the x-y edge sweeps and
    /// therefore take both minima.
    #[inline]
    fn factor(&self, dx: Option<usize>, dy: Option<usize>, dz: Option<usize>) -> Option<f32> {
        let c = &self.coefficients;
        match (dx, dy, dz) {
            (None, None, None) => None,
            (Some(i), None, None) | (None, Some(i), None) | (None, None, Some(i)) => Some(c[i]),
            (Some(x), None, Some(z)) => Some(c[x].min(c[z])),
            (None, Some(y), Some(z)) => Some(c[y].min(c[z])),
            (Some(x), Some(y), None) => Some(c[x].min(c[y])),
            (Some(x), Some(y), Some(z)) => Some(c[y].min(c[z]) * c[x].min(c[y])),
        }
    }
}

impl BoundaryManager for SpongeBoundaryManager {
    fn name(&self) -> &'static str {
        "SpongeBoundaryManager"
    }

    fn extend_model(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        for extension in &mut self.extensions {
            extension.extend_property(grid)?;
        }
        Ok(())
    }

    fn re_extend_model(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        for extension in &mut self.extensions {
            extension.re_extend_property(grid)?;
        }
        Ok(())
    }

    fn adjust_model_for_backward(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        for extension in &mut self.extensions {
            extension.adjust_property_for_backward(grid)?;
        }
        Ok(())
    }

    fn apply_boundary(
        &mut self,
        grid: &mut GridBox,
        phase: StepPhase,
    ) -> Result<(), ConfigurationError> {
        if phase != StepPhase::Pressure || self.coefficients.is_empty() {
            return Ok(());
        }
        let size = grid.window_size();
        let hl = self.half_length;
        let (nx, ny, nz) = (size.nx, size.ny, size.nz);
        let three_d = size.is_3d();
        let this = &*self;

        grid.pressure_current_mut()
            .data
            .par_chunks_mut(nx)
            .enumerate()
            .for_each(|(r, row)| {
                let (y, z) = (r / nz, r % nz);
                if z < hl || z >= nz - hl || (three_d && (y < hl || y >= ny - hl)) {
                    return;
                }
                let dz = this.layer(z, nz);
                let dy = if three_d { this.layer(y, ny) } else { None };
                if dz.is_none() && dy.is_none() {
                    // only the two x slabs of this row
                    for x in hl..nx - hl {
                        if let Some(dx) = this.layer(x, nx) {
                            row[x] *= this.coefficients[dx];
                        }
                    }
                    return;
                }
                for x in hl..nx - hl {
                    if let Some(f) = this.factor(this.layer(x, nx), dy, dz) {
                        row[x] *= f;
                    }
                }
            });
        Ok(())
    }

    fn is_reversible(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;
    use crate::parameters::HalfLength;
    use approx::assert_relative_eq;

    #[test]
    fn test_coefficients_formula_and_monotone() {
        let c = sponge_coefficients(20);
        assert_eq!(c.len(), 20);
        assert_relative_eq!(c[0], (-0.01_f32).exp(), epsilon = 1e-7);
        assert_relative_eq!(c[19], (-(0.005_f32 * 0.005)).exp(), epsilon = 1e-7);
        assert!(c.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_damps_padding_only() {
        let params = ComputationParameters::new(HalfLength::O2, 4);
        let mut grid = ModelBuilder::homogeneous(10, 1, 10, 10.0, 1500.0)
            .build(&params)
            .unwrap();
        let mut sponge = SpongeBoundaryManager::new(Formulation::AcousticSecond, &params, true);
        grid.pressure_current_mut().fill(1.0);
        sponge.apply_boundary(&mut grid, StepPhase::Pressure).unwrap();

        let p = grid.pressure_current();
        let c = sponge.coefficients().to_vec();
        // nx = nz = 10 + 2 * (1 + 4); halo at 0 and 19, padding [1, 5) and [15, 19)
        assert_eq!(p.get(0, 0, 9), 1.0);
        assert_eq!(p.get(19, 0, 9), 1.0);
        assert_eq!(p.get(8, 0, 8), 1.0);
        // outermost left column of an interior row
        assert_relative_eq!(p.get(1, 0, 8), c[0]);
        // mirrored far column
        assert_relative_eq!(p.get(18, 0, 8), c[0]);
        // bottom slab, second layer from the edge
        assert_relative_eq!(p.get(8, 0, 17), c[1]);
        // corner takes the smaller factor once
        assert_relative_eq!(p.get(1, 0, 2), c[0].min(c[1]));
        // first far padding column is damped once
        assert_relative_eq!(p.get(15, 0, 1), c[3].min(c[0]));

        // velocity phase is a no-op
        grid.pressure_current_mut().fill(1.0);
        sponge.apply_boundary(&mut grid, StepPhase::Velocity).unwrap();
        assert_eq!(grid.pressure_current().get(1, 0, 8), 1.0);
    }
}
