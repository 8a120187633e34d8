//! Source wavelets

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::grid::GridBox;

/// Cell in model coordinates: padding excluded, origin at the first model cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Cell along x
    pub x: usize,
    /// Cell along y (0 for 2D)
    #[serde(default)]
    pub y: usize,
    /// Cell along z (depth)
    pub z: usize,
}

impl Location {
    /// Location in a 2D model
    pub const fn new_2d(x: usize, z: usize) -> Self {
        Self { x, y: 0, z }
    }

    /// Location in a 3D model
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }
}

/// Wavelet injected at a single cell during forward propagation
pub trait SourceInjector {
    /// Model cell the source sits in
    fn location(&self) -> Location;

    /// First time step that no longer injects anything
    fn cut_off_step(&self, dt: f32) -> usize;

    /// Wavelet amplitude at `time_step`
    fn amplitude(&self, time_step: usize, dt: f32) -> f32;

    /// Add the wavelet into the current pressure at window index `cell`.
    ///
    /// The amplitude is scaled by the preprocessed velocity at the cell so
    /// the injection matches the kernel's update form.
    fn apply_source(&self, grid: &mut GridBox, cell: usize, time_step: usize) {
        if time_step >= self.cut_off_step(grid.dt) {
            return;
        }
        let scaled = self.amplitude(time_step, grid.dt) * grid.window_velocity().data[cell];
        grid.pressure_current_mut().data[cell] += scaled;
    }
}

/// Ricker wavelet delayed by one period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RickerSource {
    /// Source cell
    pub location: Location,
    /// Peak frequency (Hz)
    pub frequency: f32,
}

impl RickerSource {
    /// Ricker source at `location` peaking at `frequency`
    pub fn new(location: Location, frequency: f32) -> Self {
        Self {
            location,
            frequency,
        }
    }
}

impl SourceInjector for RickerSource {
    fn location(&self) -> Location {
        self.location
    }

    fn cut_off_step(&self, dt: f32) -> usize {
        (2.0 / (self.frequency * dt)).floor() as usize + 1
    }

    fn amplitude(&self, time_step: usize, dt: f32) -> f32 {
        let shifted = time_step as f32 * dt - 1.0 / self.frequency;
        let arg = PI * PI * self.frequency * self.frequency * shifted * shifted;
        (1.0 - 2.0 * arg) * (-arg).exp()
    }
}
