//! Receiver traces
//!
//! Samples are stored time-major: `samples[t * receivers + i]` is receiver
//! `i` at time step `t`, sampled at the propagation `dt`.

use crate::error::ConfigurationError;
use crate::grid::{GridBox, Wavefields};

use super::source::Location;

/// Injects recorded data as the receiver wavefield's source
pub trait TraceManager {
    /// Receiver cells in model coordinates
    fn receivers(&self) -> &[Location];

    /// Add the samples of `time_step` into the current pressure.
    ///
    /// `cells[i]` is the window index of receiver `i`, `None` when the
    /// receiver falls outside the active window.
    fn apply_traces(&self, grid: &mut GridBox, cells: &[Option<usize>], time_step: usize);
}

/// Traces of one shot
#[derive(Debug, Clone, PartialEq)]
pub struct ShotTraces {
    receivers: Vec<Location>,
    nt: usize,
    samples: Vec<f32>,
}

impl ShotTraces {
    /// Silent traces of `nt` samples per receiver
    pub fn new(receivers: Vec<Location>, nt: usize) -> Self {
        let samples = vec![0.0; receivers.len() * nt];
        Self {
            receivers,
            nt,
            samples,
        }
    }

    /// Traces from recorded samples in time-major order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidGeometry`] when the sample count
    /// is not `receivers * nt`.
    pub fn from_samples(
        receivers: Vec<Location>,
        nt: usize,
        samples: Vec<f32>,
    ) -> Result<Self, ConfigurationError> {
        if samples.len() != receivers.len() * nt {
            return Err(ConfigurationError::InvalidGeometry(format!(
                "{} samples for {} receivers over {nt} steps",
                samples.len(),
                receivers.len()
            )));
        }
        Ok(Self {
            receivers,
            nt,
            samples,
        })
    }

    /// Samples per receiver
    pub fn nt(&self) -> usize {
        self.nt
    }

    /// Number of receivers
    pub fn receiver_count(&self) -> usize {
        self.receivers.len()
    }

    /// All samples, time-major
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample of `receiver` at `time_step`
    pub fn sample(&self, time_step: usize, receiver: usize) -> f32 {
        self.samples[time_step * self.receivers.len() + receiver]
    }

    /// Record the current pressure at every placed receiver into `time_step`
    pub fn record(&mut self, grid: &GridBox, cells: &[Option<usize>], time_step: usize) {
        if time_step >= self.nt {
            return;
        }
        let pressure = grid.pressure_current().as_slice();
        let offset = time_step * self.receivers.len();
        for (i, cell) in cells.iter().enumerate() {
            if let Some(cell) = *cell {
                self.samples[offset + i] = pressure[cell];
            }
        }
    }
}

impl TraceManager for ShotTraces {
    fn receivers(&self) -> &[Location] {
        &self.receivers
    }

    fn apply_traces(&self, grid: &mut GridBox, cells: &[Option<usize>], time_step: usize) {
        if time_step >= self.nt {
            return;
        }
        let offset = time_step * self.receivers.len();
        let parts = grid.parts_mut();
        let pressure = match parts.wavefields {
            Wavefields::Second(buffers) => buffers.curr_mut(),
            Wavefields::Staggered(fields) => fields.curr_mut(),
        };
        for (i, cell) in cells.iter().enumerate() {
            if let Some(cell) = *cell {
                pressure.data[cell] += self.samples[offset + i] * parts.velocity[cell];
            }
        }
    }
}
