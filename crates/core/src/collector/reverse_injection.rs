//! Optimal checkpointing: backward re-simulation pinned by the stored shell
//!
//! Every forward frame contributes only its half-length shell to storage.
//! During the backward pass the embedded kernel recomputes the interior and
//! the shell is overwritten with the recorded values, so errors introduced
//! outside the model (absorbing layers, reflections) never leak inwards.

use tracing::{debug, info};

use super::boundary_saver::{BoundaryShell, ShellHistory};
use super::stepper::Stepper;
use super::ForwardCollector;
use crate::boundary::NoBoundaryManager;
use crate::error::{ConfigurationError, Result};
use crate::grid::{Formulation, GridBox, StaggeredFields, WaveField, Wavefields};
use crate::kernel::{ComputationKernel, KernelMode};
use crate::parameters::ComputationParameters;

const NAME: &str = "ReverseInjectionPropagation";

/// Shell histories of every stored component
#[derive(Debug)]
struct Recording {
    shell: BoundaryShell,
    pressure: ShellHistory,
    velocity: Vec<ShellHistory>,
}

fn velocity_components(fields: &StaggeredFields) -> Vec<&WaveField> {
    let mut components = vec![&fields.velocity_x, &fields.velocity_z];
    components.extend(fields.velocity_y.as_ref());
    components
}

fn velocity_components_mut(fields: &mut StaggeredFields) -> Vec<&mut WaveField> {
    let mut components = vec![&mut fields.velocity_x, &mut fields.velocity_z];
    components.extend(fields.velocity_y.as_mut());
    components
}

impl Recording {
    fn restore_pressure(&self, grid: &mut GridBox, step: usize) -> Result<()> {
        self.pressure
            .restore(&self.shell, step, grid.pressure_current_mut().as_mut_slice())?;
        Ok(())
    }

    fn restore_velocity(&self, grid: &mut GridBox, step: usize) -> Result<()> {
        let fields = grid.staggered_fields_mut(NAME)?;
        for (history, field) in self.velocity.iter().zip(velocity_components_mut(fields)) {
            history.restore(&self.shell, step, field.as_mut_slice())?;
        }
        Ok(())
    }
}

/// Stores the shell of every forward frame and re-simulates the rest
#[derive(Debug)]
pub struct ReverseInjection {
    stepper: Stepper,
    boundary: NoBoundaryManager,
    half_length: usize,
    boundary_length: usize,
    recording: Option<Recording>,
    grid: Option<GridBox>,
    saved: usize,
    fetched: usize,
}

impl ReverseInjection {
    /// Collector for grids of `formulation`
    pub fn new(formulation: Formulation, params: &ComputationParameters) -> Self {
        Self {
            stepper: Stepper::new(formulation, params),
            boundary: NoBoundaryManager::new(formulation, params),
            half_length: params.half(),
            boundary_length: params.boundary_length,
            recording: None,
            grid: None,
            saved: 0,
            fetched: 0,
        }
    }

    fn save(&mut self, main: &GridBox) -> Result<()> {
        let recording = self
            .recording
            .as_mut()
            .ok_or(ConfigurationError::MissingGrid("boundary shell recording"))?;
        recording.pressure.save(
            &recording.shell,
            self.saved,
            main.pressure_current().as_slice(),
        )?;
        if let Wavefields::Staggered(fields) = &main.wavefields {
            for (history, field) in recording
                .velocity
                .iter_mut()
                .zip(velocity_components(fields))
            {
                history.save(&recording.shell, self.saved, field.as_slice())?;
            }
        }
        self.saved += 1;
        Ok(())
    }
}

impl ForwardCollector for ReverseInjection {
    fn name(&self) -> &'static str {
        NAME
    }

    fn reset_grid(&mut self, main: &mut GridBox, forward_run: bool) -> Result<()> {
        main.expect_formulation(NAME, self.stepper.formulation())?;
        if forward_run {
            let size = main.window_size();
            let shell = BoundaryShell::new(size, self.half_length, self.boundary_length);
            let frames = main.nt + 1;
            let pressure = ShellHistory::new(&shell, frames);
            let components = match main.formulation {
                Formulation::AcousticSecond => 0,
                Formulation::Staggered if size.is_3d() => 3,
                Formulation::Staggered => 2,
            };
            let velocity = (0..components)
                .map(|_| ShellHistory::new(&shell, frames))
                .collect::<Vec<_>>();
            let bytes = pressure.bytes() * (1 + components);
            info!(
                shell_cells = shell.len(),
                frames,
                megabytes = bytes as f64 / (1024.0 * 1024.0),
                "Boundary shell storage allocated"
            );
            self.recording = Some(Recording {
                shell,
                pressure,
                velocity,
            });
            self.grid = None;
            self.saved = 0;
        } else {
            // the final frame is never passed to save_forward
            self.save(main)?;
            self.grid = Some(self.stepper.capture(main, NAME)?);
        }
        self.fetched = 0;
        main.reset_wavefields();
        Ok(())
    }

    fn save_forward(&mut self, main: &GridBox) -> Result<()> {
        self.save(main)
    }

    fn fetch_forward(&mut self) -> Result<()> {
        let recording = self
            .recording
            .as_ref()
            .ok_or(ConfigurationError::MissingGrid("boundary shell recording"))?;
        let grid = self
            .grid
            .as_mut()
            .ok_or(ConfigurationError::MissingGrid("reverse injection grid"))?;
        let fetched = self.fetched + 1;
        let frame = self
            .saved
            .checked_sub(fetched)
            .ok_or(ConfigurationError::MissingGrid("forward frame"))?;
        match (&self.stepper, fetched) {
            (_, 1) => {}
            (Stepper::Second(_), 2) => {
                grid.pressure_buffers_mut(NAME)?.rotate();
                recording.restore_pressure(grid, frame)?;
            }
            (Stepper::Second(kernel), _) => {
                kernel.step(grid, &mut self.boundary)?;
                recording.restore_pressure(grid, frame)?;
            }
            (Stepper::Staggered(kernel), _) => {
                kernel.update_pressure(grid, KernelMode::Backward)?;
                recording.restore_pressure(grid, frame)?;
                kernel.update_velocity(grid, KernelMode::Backward)?;
                recording.restore_velocity(grid, frame)?;
            }
        }
        self.fetched = fetched;
        debug!(fetch = fetched, frame, "Reverse injection step");
        Ok(())
    }

    fn forward_grid(&self) -> Option<&GridBox> {
        self.grid.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;
    use crate::parameters::HalfLength;

    #[test]
    fn test_saves_one_shell_per_frame() {
        let params = ComputationParameters::new(HalfLength::O2, 2);
        let mut main = ModelBuilder::homogeneous(10, 1, 10, 10.0, 1500.0)
            .formulation(Formulation::Staggered)
            .build(&params)
            .unwrap();
        let mut collector = ReverseInjection::new(Formulation::Staggered, &params);
        collector.reset_grid(&mut main, true).unwrap();
        for _ in 0..3 {
            collector.save_forward(&main).unwrap();
        }
        collector.reset_grid(&mut main, false).unwrap();
        assert_eq!(collector.saved, 4);
        let recording = collector.recording.as_ref().unwrap();
        assert_eq!(recording.velocity.len(), 2);
        assert_eq!(
            recording.shell.len(),
            BoundaryShell::expected_len(main.window_size(), 1, 2)
        );
    }

    #[test]
    fn test_over_fetching_is_an_error() {
        let params = ComputationParameters::new(HalfLength::O2, 2);
        let mut main = ModelBuilder::homogeneous(10, 1, 10, 10.0, 1500.0)
            .build(&params)
            .unwrap();
        let mut collector = ReverseInjection::new(Formulation::AcousticSecond, &params);
        collector.reset_grid(&mut main, true).unwrap();
        collector.save_forward(&main).unwrap();
        collector.reset_grid(&mut main, false).unwrap();
        collector.fetch_forward().unwrap();
        collector.fetch_forward().unwrap();
        assert!(collector.fetch_forward().is_err());
    }
}
