//! Observation hooks for a migration run
//!
//! Every hook receives shared references, so a callback can inspect but
//! never alter the propagation.

use tracing::debug;

use crate::grid::{GridBox, WaveField};
use crate::parameters::ComputationParameters;

/// Hooks invoked by the engine; all default to no-ops
#[allow(unused_variables)]
pub trait Callback {
    /// Before the model is extended
    fn before_initialization(&mut self, params: &ComputationParameters) {}

    /// After the model is extended
    fn after_initialization(&mut self, grid: &GridBox) {}

    /// Before the first forward step of a shot
    fn before_forward_propagation(&mut self, grid: &GridBox) {}

    /// After forward step `time_step`
    fn after_forward_step(&mut self, grid: &GridBox, time_step: usize) {}

    /// Before the first backward step of a shot
    fn before_backward_propagation(&mut self, grid: &GridBox) {}

    /// After backward step `time_step`
    fn after_backward_step(&mut self, grid: &GridBox, time_step: usize) {}

    /// After the forward frame matching backward step `time_step` was fetched
    fn after_fetch_step(&mut self, forward: &GridBox, time_step: usize) {}

    /// Before the shot image is added to the stack
    fn before_shot_stacking(&mut self, grid: &GridBox, shot_correlation: &WaveField) {}

    /// After the shot image was added to the stack
    fn after_shot_stacking(&mut self, grid: &GridBox, stacked: &WaveField) {}

    /// After the last shot
    fn after_migration(&mut self, grid: &GridBox, stacked: &WaveField) {}
}

/// Ordered set of callbacks, itself a callback
#[derive(Default)]
pub struct CallbackCollection {
    callbacks: Vec<Box<dyn Callback>>,
}

impl CallbackCollection {
    /// Empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback; callbacks run in registration order
    pub fn register(&mut self, callback: Box<dyn Callback>) {
        self.callbacks.push(callback);
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl Callback for CallbackCollection {
    fn before_initialization(&mut self, params: &ComputationParameters) {
        for callback in &mut self.callbacks {
            callback.before_initialization(params);
        }
    }

    fn after_initialization(&mut self, grid: &GridBox) {
        for callback in &mut self.callbacks {
            callback.after_initialization(grid);
        }
    }

    fn before_forward_propagation(&mut self, grid: &GridBox) {
        for callback in &mut self.callbacks {
            callback.before_forward_propagation(grid);
        }
    }

    fn after_forward_step(&mut self, grid: &GridBox, time_step: usize) {
        for callback in &mut self.callbacks {
            callback.after_forward_step(grid, time_step);
        }
    }

    fn before_backward_propagation(&mut self, grid: &GridBox) {
        for callback in &mut self.callbacks {
            callback.before_backward_propagation(grid);
        }
    }

    fn after_backward_step(&mut self, grid: &GridBox, time_step: usize) {
        for callback in &mut self.callbacks {
            callback.after_backward_step(grid, time_step);
        }
    }

    fn after_fetch_step(&mut self, forward: &GridBox, time_step: usize) {
        for callback in &mut self.callbacks {
            callback.after_fetch_step(forward, time_step);
        }
    }

    fn before_shot_stacking(&mut self, grid: &GridBox, shot_correlation: &WaveField) {
        for callback in &mut self.callbacks {
            callback.before_shot_stacking(grid, shot_correlation);
        }
    }

    fn after_shot_stacking(&mut self, grid: &GridBox, stacked: &WaveField) {
        for callback in &mut self.callbacks {
            callback.after_shot_stacking(grid, stacked);
        }
    }

    fn after_migration(&mut self, grid: &GridBox, stacked: &WaveField) {
        for callback in &mut self.callbacks {
            callback.after_migration(grid, stacked);
        }
    }
}

/// Records the L2 norm of the current pressure every `show_each` steps
#[derive(Debug, Clone, Default)]
pub struct NormCallback {
    show_each: usize,
    /// `(time_step, norm)` of the source wavefield
    pub forward: Vec<(usize, f64)>,
    /// `(time_step, norm)` of the receiver wavefield
    pub backward: Vec<(usize, f64)>,
    /// `(time_step, norm)` of the fetched source wavefield
    pub reverse: Vec<(usize, f64)>,
}

impl NormCallback {
    /// Sample every `show_each` steps (at least every step)
    pub fn new(show_each: usize) -> Self {
        Self {
            show_each: show_each.max(1),
            ..Self::default()
        }
    }

    fn due(&self, time_step: usize) -> bool {
        time_step % self.show_each.max(1) == 0
    }
}

impl Callback for NormCallback {
    fn after_forward_step(&mut self, grid: &GridBox, time_step: usize) {
        if self.due(time_step) {
            let norm = grid.pressure_current().l2_norm();
            debug!(time_step, norm, "Forward norm");
            self.forward.push((time_step, norm));
        }
    }

    fn after_backward_step(&mut self, grid: &GridBox, time_step: usize) {
        if self.due(time_step) {
            let norm = grid.pressure_current().l2_norm();
            debug!(time_step, norm, "Backward norm");
            self.backward.push((time_step, norm));
        }
    }

    fn after_fetch_step(&mut self, forward: &GridBox, time_step: usize) {
        if self.due(time_step) {
            let norm = forward.pressure_current().l2_norm();
            debug!(time_step, norm, "Reverse norm");
            self.reverse.push((time_step, norm));
        }
    }
}
