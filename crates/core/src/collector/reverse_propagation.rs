//! Storage-free collector ("three propagation")

use tracing::{debug, warn};

use super::stepper::Stepper;
use super::ForwardCollector;
use crate::boundary::NoBoundaryManager;
use crate::error::{ConfigurationError, Result};
use crate::grid::{Formulation, GridBox};
use crate::kernel::ComputationKernel;
use crate::parameters::ComputationParameters;

const NAME: &str = "ReversePropagation";

/// Re-simulates the source wavefield backwards from its final state.
///
/// Only exact for boundaries that do not damp: absorbed energy cannot be
/// recovered by running the wave equation in reverse.
#[derive(Debug)]
pub struct ReversePropagation {
    stepper: Stepper,
    boundary: NoBoundaryManager,
    grid: Option<GridBox>,
    fetched: usize,
}

impl ReversePropagation {
    /// Collector for grids of `formulation`
    pub fn new(formulation: Formulation, params: &ComputationParameters) -> Self {
        warn!(
            "{NAME} reconstructs the source wavefield by reversing time; \
             results are only valid for reversible boundaries (none, random)"
        );
        Self {
            stepper: Stepper::new(formulation, params),
            boundary: NoBoundaryManager::new(formulation, params),
            grid: None,
            fetched: 0,
        }
    }
}

impl ForwardCollector for ReversePropagation {
    fn name(&self) -> &'static str {
        NAME
    }

    fn reset_grid(&mut self, main: &mut GridBox, forward_run: bool) -> Result<()> {
        self.fetched = 0;
        self.grid = if forward_run {
            main.expect_formulation(NAME, self.stepper.formulation())?;
            None
        } else {
            Some(self.stepper.capture(main, NAME)?)
        };
        main.reset_wavefields();
        Ok(())
    }

    fn save_forward(&mut self, _main: &GridBox) -> Result<()> {
        Ok(())
    }

    fn fetch_forward(&mut self) -> Result<()> {
        let grid = self
            .grid
            .as_mut()
            .ok_or(ConfigurationError::MissingGrid("reverse propagation grid"))?;
        self.fetched += 1;
        match (&self.stepper, self.fetched) {
            // the captured state is the last forward frame
            (_, 1) => {}
            (Stepper::Second(_), 2) => grid.pressure_buffers_mut(NAME)?.rotate(),
            (Stepper::Second(kernel), _) => kernel.step(grid, &mut self.boundary)?,
            (Stepper::Staggered(kernel), _) => kernel.reverse_step(grid, &mut self.boundary)?,
        }
        debug!(fetch = self.fetched, "Reverse propagation step");
        Ok(())
    }

    fn forward_grid(&self) -> Option<&GridBox> {
        self.grid.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::HalfLength;
    use crate::model::ModelBuilder;

    #[test]
    fn test_fetch_before_backward_reset_fails() {
        let params = ComputationParameters::new(HalfLength::O2, 2);
        let mut collector = ReversePropagation::new(Formulation::AcousticSecond, &params);
        assert!(collector.fetch_forward().is_err());
        assert!(collector.forward_grid().is_none());
    }

    #[test]
    fn test_backward_reset_zeroes_main_and_keeps_final_frame() {
        let params = ComputationParameters::new(HalfLength::O2, 2);
        let mut main = ModelBuilder::homogeneous(8, 1, 8, 10.0, 1500.0)
            .build(&params)
            .unwrap();
        let mut collector = ReversePropagation::new(Formulation::AcousticSecond, &params);
        collector.reset_grid(&mut main, true).unwrap();
        main.pressure_current_mut().set(5, 0, 5, 3.0);
        collector.reset_grid(&mut main, false).unwrap();
        assert_eq!(main.pressure_current().l2_norm(), 0.0);
        collector.fetch_forward().unwrap();
        let grid = collector.forward_grid().unwrap();
        assert_eq!(grid.pressure_current().get(5, 0, 5), 3.0);
    }
}
