//! Reflective walls

use super::extension::{Extension, Property};
use super::{BoundaryManager, StepPhase};
use crate::error::ConfigurationError;
use crate::grid::{Formulation, GridBox};
use crate::parameters::ComputationParameters;

/// Boundary manager that never damps.
///
/// The padding is zero-filled so the wavefield sees a hard wall.
#[derive(Debug)]
pub struct NoBoundaryManager {
    extensions: Vec<Extension>,
}

impl NoBoundaryManager {
    /// Zero extensions for velocity, and density on staggered grids
    pub fn new(formulation: Formulation, params: &ComputationParameters) -> Self {
        let (hl, bl) = (params.half(), params.boundary_length);
        let mut extensions = vec![Extension::zero(Property::Velocity, hl, bl)];
        if formulation == Formulation::Staggered {
            extensions.push(Extension::zero(Property::Density, hl, bl));
        }
        Self { extensions }
    }
}

impl BoundaryManager for NoBoundaryManager {
    fn name(&self) -> &'static str {
        "NoBoundaryManager"
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

    fn apply_boundary(&mut self, _: &mut GridBox, _: StepPhase) -> Result<(), ConfigurationError> {
        Ok(())
    }

    fn is_reversible(&self) -> bool {
        true
    }
}
