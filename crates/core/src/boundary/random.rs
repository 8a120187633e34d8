//! Random boundaries
//!
//! Nothing is damped at run time. The padding is filled with a randomized
//! velocity that scatters the energy reaching it, so the backward pass sees
//! incoherent reflections that do not stack. The padding is re-randomized
//! for every shot.

use tracing::debug;

use super::extension::{Extension, Property};
use super::{BoundaryManager, StepPhase};
use crate::error::ConfigurationError;
use crate::grid::{Formulation, GridBox};
use crate::parameters::ComputationParameters;

/// Random velocity padding, minimum-density padding on staggered grids
#[derive(Debug)]
pub struct RandomBoundaryManager {
    extensions: Vec<Extension>,
}

impl RandomBoundaryManager {
    /// Create the manager; a `seed` makes the padding reproducible
    pub fn new(formulation: Formulation, params: &ComputationParameters, seed: Option<u64>) -> Self {
        let (hl, bl) = (params.half(), params.boundary_length);
        let mut extensions = vec![Extension::random(Property::Velocity, seed, hl, bl)];
        if formulation == Formulation::Staggered {
            extensions.push(Extension::min(Property::Density, hl, bl));
        }
        Self { extensions }
    }
}

impl BoundaryManager for RandomBoundaryManager {
    fn name(&self) -> &'static str {
        "RandomBoundaryManager"
    }

    fn extend_model(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        for extension in &mut self.extensions {
            extension.extend_property(grid)?;
        }
        Ok(())
    }

    fn re_extend_model(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        debug!("Re-randomizing boundary padding");
        for extension in &mut self.extensions {
            extension.extend_property(grid)?;
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

    fn apply_boundary(&mut self, _: &mut GridBox, _: StepPhase) -> Result<(), ConfigurationError> {
        Ok(())
    }

    fn is_reversible(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::WaveField;
    use crate::model::ModelBuilder;
    use crate::parameters::HalfLength;

    #[test]
    fn test_re_extend_changes_padding_only() {
        let params = ComputationParameters::new(HalfLength::O4, 5);
        let mut grid = ModelBuilder::homogeneous(20, 1, 20, 10.0, 1500.0)
            .build(&params)
            .unwrap();
        let mut manager = RandomBoundaryManager::new(Formulation::AcousticSecond, &params, Some(3));
        manager.extend_model(&mut grid).unwrap();
        let first: WaveField = grid.velocity.clone();
        manager.re_extend_model(&mut grid).unwrap();

        let size = grid.grid_size;
        let centre = size.index(size.nx / 2, 0, size.nz / 2);
        assert_eq!(first.data[centre], grid.velocity.data[centre]);
        // first padding column, just inside the halo
        let left = size.index(4, 0, size.nz / 2);
        assert_ne!(first.data[left], grid.velocity.data[left]);
    }
}
