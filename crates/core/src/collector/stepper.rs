//! Embedded kernels for the collectors that re-simulate backwards

use crate::error::ConfigurationError;
use crate::grid::{Formulation, GridBox, PressureBuffers, Wavefields};
use crate::kernel::{SecondOrderKernel, StaggeredKernel};
use crate::parameters::ComputationParameters;

/// Kernel matching the formulation of the collected grid
#[derive(Debug, Clone)]
pub(super) enum Stepper {
    Second(SecondOrderKernel),
    Staggered(StaggeredKernel),
}

impl Stepper {
    pub(super) fn new(formulation: Formulation, params: &ComputationParameters) -> Self {
        match formulation {
            Formulation::AcousticSecond => Stepper::Second(SecondOrderKernel::new(params.clone())),
            Formulation::Staggered => Stepper::Staggered(StaggeredKernel::new(params.clone())),
        }
    }

    pub(super) fn formulation(&self) -> Formulation {
        match self {
            Stepper::Second(_) => Formulation::AcousticSecond,
            Stepper::Staggered(_) => Formulation::Staggered,
        }
    }

    /// Copy the final forward state of `main` into a grid the stepper owns.
    ///
    /// Second order keeps `curr` and `prev` in a two-buffer arena so a
    /// forward step with swapped roles runs time backwards. Staggered grids
    /// take the pressure and the particle velocities as they are.
    pub(super) fn capture(
        &self,
        main: &GridBox,
        component: &'static str,
    ) -> Result<GridBox, ConfigurationError> {
        main.expect_formulation(component, self.formulation())?;
        let wavefields = match &main.wavefields {
            Wavefields::Second(source) => {
                let size = main.window_size();
                let mut buffers = PressureBuffers::two(size.nx, size.ny, size.nz);
                buffers.curr_mut().data.copy_from_slice(&source.curr().data);
                buffers.prev_mut().data.copy_from_slice(&source.prev().data);
                Wavefields::Second(buffers)
            }
            Wavefields::Staggered(fields) => Wavefields::Staggered(fields.clone()),
        };
        Ok(main.with_wavefields(wavefields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;
    use crate::parameters::HalfLength;

    #[test]
    fn test_capture_copies_last_two_frames() {
        let params = ComputationParameters::new(HalfLength::O2, 1);
        let mut main = ModelBuilder::homogeneous(6, 1, 6, 10.0, 1500.0)
            .three_buffers(true)
            .build(&params)
            .unwrap();
        {
            let buffers = main.pressure_buffers_mut("test").unwrap();
            buffers.curr_mut().fill(2.0);
            buffers.prev_mut().fill(1.0);
        }
        let stepper = Stepper::new(Formulation::AcousticSecond, &params);
        let mut copy = stepper.capture(&main, "test").unwrap();
        let buffers = copy.pressure_buffers_mut("test").unwrap();
        assert!(buffers.is_two_buffer());
        assert!(buffers.curr().data.iter().all(|&v| v == 2.0));
        assert!(buffers.prev().data.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_capture_rejects_other_formulation() {
        let params = ComputationParameters::new(HalfLength::O2, 1);
        let main = ModelBuilder::homogeneous(6, 1, 6, 10.0, 1500.0)
            .build(&params)
            .unwrap();
        let stepper = Stepper::new(Formulation::Staggered, &params);
        assert!(matches!(
            stepper.capture(&main, "test"),
            Err(ConfigurationError::GridMismatch { .. })
        ));
    }
}
