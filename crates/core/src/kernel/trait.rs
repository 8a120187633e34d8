//! Computation kernel trait definition
//!
//! A kernel advances the wavefields of a [`GridBox`] by one time step and
//! hands the rotated state to the boundary manager. Both formulations
//! implement it.

use crate::boundary::BoundaryManager;
use crate::error::ConfigurationError;
use crate::grid::{Formulation, GridBox, GridSize, Wavefields};
use crate::parameters::ComputationParameters;

/// Direction of time stepping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelMode {
    /// Source propagation
    #[default]
    Forward,
    /// Receiver (adjoint) propagation
    Backward,
}

/// Finite-difference time stepper for one formulation
pub trait ComputationKernel: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &'static str;

    /// Wave equation this kernel integrates
    fn formulation(&self) -> Formulation;

    /// Stencil radius, boundary thickness and cache blocks
    fn parameters(&self) -> &ComputationParameters;

    /// Current stepping direction
    fn mode(&self) -> KernelMode;

    /// Switch stepping direction
    fn set_mode(&mut self, mode: KernelMode);

    /// Allocate zeroed wavefields of the given window size
    ///
    /// # Arguments
    ///
    /// * `size` - Window extents
    /// * `three_buffers` - Keep a separate `prev` buffer (second order only)
    fn allocate_wavefields(&self, size: GridSize, three_buffers: bool) -> Wavefields;

    /// Touch every wavefield in the traversal order of [`Self::step`].
    ///
    /// Writes zeros to the stencil interior only.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::GridMismatch`] for the other formulation.
    fn first_touch(&self, grid: &mut GridBox) -> Result<(), ConfigurationError>;

    /// Advance one time step, then apply the boundary to the rotated state.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::GridMismatch`] for the other formulation
    /// and propagates boundary errors.
    fn step(
        &self,
        grid: &mut GridBox,
        boundary: &mut dyn BoundaryManager,
    ) -> Result<(), ConfigurationError>;
}
