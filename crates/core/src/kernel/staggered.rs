//! Staggered velocity-pressure kernel
//!
//! Particle velocity lives half a cell after the pressure along its own
//! axis. One step is a leapfrog:
//!
//! 1. `v -= den / dh * D+ p`, then the velocity boundary
//! 2. `p_next = p - vel * Σ D- v / dh`, swap, then the pressure boundary
//!
//! with `den = dt / rho` and `vel = v² dt rho`. Backward mode flips both
//! signs, which makes [`StaggeredKernel::reverse_step`] the exact inverse of
//! a forward step.

use tracing::trace;

use super::tiling::for_each_interior_row;
use super::{ComputationKernel, KernelMode};
use crate::boundary::{BoundaryManager, StepPhase};
use crate::error::ConfigurationError;
use crate::grid::{
    CellDimensions, Formulation, GridBox, GridSize, StaggeredFields, StaggeredPressureView,
    StaggeredVelocityView, Wavefields,
};
use crate::parameters::ComputationParameters;

impl KernelMode {
    /// `-1` forward, `+1` backward
    #[inline]
    fn sign(self) -> f32 {
        match self {
            KernelMode::Forward => -1.0,
            KernelMode::Backward => 1.0,
        }
    }
}

/// Time stepper for the staggered formulation
#[derive(Debug, Clone)]
pub struct StaggeredKernel {
    params: ComputationParameters,
    mode: KernelMode,
}

impl StaggeredKernel {
    /// Kernel with the given stencil radius and cache blocks
    pub fn new(params: ComputationParameters) -> Self {
        Self {
            params,
            mode: KernelMode::Forward,
        }
    }

    fn fields<'a>(
        &self,
        wavefields: &'a mut Wavefields,
    ) -> Result<&'a mut StaggeredFields, ConfigurationError> {
        match wavefields {
            Wavefields::Staggered(fields) => Ok(fields),
            Wavefields::Second(_) => Err(ConfigurationError::GridMismatch {
                component: self.name(),
                expected: Formulation::Staggered,
                found: Formulation::AcousticSecond,
            }),
        }
    }

    /// Velocity phase: `v += sign * den / dh * Σ c[k] (p[+k] - p[-(k-1)])`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::GridMismatch`] on a second-order grid or
    /// a grid without density.
    pub fn update_velocity(
        &self,
        grid: &mut GridBox,
        mode: KernelMode,
    ) -> Result<(), ConfigurationError> {
        let parts = grid.parts_mut();
        let density = parts
            .density
            .ok_or(ConfigurationError::MissingGrid("density"))?;
        let (size, cells) = (parts.size, parts.cells);
        let view = self.fields(parts.wavefields)?.velocity_view();
        self.velocity_sweep(view, density, size, cells, mode.sign());
        Ok(())
    }

    /// Pressure phase: `next = curr + sign * vel * Σ_axis Σ c[k] (v[k-1] - v[-k]) / dh`,
    /// then swap `curr` and `next`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::GridMismatch`] on a second-order grid.
    pub fn update_pressure(
        &self,
        grid: &mut GridBox,
        mode: KernelMode,
    ) -> Result<(), ConfigurationError> {
        let parts = grid.parts_mut();
        let (size, cells, velocity) = (parts.size, parts.cells, parts.velocity);
        let fields = self.fields(parts.wavefields)?;
        self.pressure_sweep(fields.pressure_view(), velocity, size, cells, mode.sign());
        fields.swap();
        Ok(())
    }

    /// Undo one forward step: pressure phase then velocity phase with
    /// backward signs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::GridMismatch`] on a second-order grid.
    pub fn reverse_step(
        &self,
        grid: &mut GridBox,
        boundary: &mut dyn BoundaryManager,
    ) -> Result<(), ConfigurationError> {
        self.update_pressure(grid, KernelMode::Backward)?;
        boundary.apply_boundary(grid, StepPhase::Pressure)?;
        self.update_velocity(grid, KernelMode::Backward)?;
        boundary.apply_boundary(grid, StepPhase::Velocity)
    }

    fn velocity_sweep(
        &self,
        view: StaggeredVelocityView<'_>,
        density: &[f32],
        size: GridSize,
        cells: CellDimensions,
        sign: f32,
    ) {
        let hl = self.params.half();
        let coeff = self.params.half_length.staggered();
        let p = view.pressure;
        let mut axes: Vec<(&mut [f32], usize, f32)> = vec![
            (view.velocity_x, 1, cells.dx),
            (view.velocity_z, size.nx, cells.dz),
        ];
        if let Some(vy) = view.velocity_y {
            axes.push((vy, size.nx * size.nz, cells.dy));
        }
        for (target, stride, spacing) in axes {
            let inv_h = 1.0 / spacing;
            for_each_interior_row(target, size, hl, &self.params, |y, z, xs, row| {
                let base = size.index(0, y, z);
                for x in xs {
                    let i = base + x;
                    let mut value = 0.0;
                    for k in 1..=hl {
                        value += coeff[k] * (p[i + k * stride] - p[i - (k - 1) * stride]);
                    }
                    row[x] += sign * density[i] * inv_h * value;
                }
            });
        }
    }

    fn pressure_sweep(
        &self,
        view: StaggeredPressureView<'_>,
        velocity: &[f32],
        size: GridSize,
        cells: CellDimensions,
        sign: f32,
    ) {
        let hl = self.params.half();
        let coeff = self.params.half_length.staggered();
        let StaggeredPressureView {
            curr,
            next,
            velocity_x,
            velocity_z,
            velocity_y,
        } = view;
        let (nx, plane) = (size.nx, size.nx * size.nz);
        let (inv_x, inv_z, inv_y) = (1.0 / cells.dx, 1.0 / cells.dz, 1.0 / cells.dy);

        for_each_interior_row(next, size, hl, &self.params, |y, z, xs, row| {
            let base = size.index(0, y, z);
            for x in xs {
                let i = base + x;
                let (mut dvx, mut dvz, mut dvy) = (0.0, 0.0, 0.0);
                for k in 1..=hl {
                    dvx += coeff[k] * (velocity_x[i + k - 1] - velocity_x[i - k]);
                    dvz += coeff[k] * (velocity_z[i + (k - 1) * nx] - velocity_z[i - k * nx]);
                }
                if let Some(vy) = velocity_y {
                    for k in 1..=hl {
                        dvy += coeff[k] * (vy[i + (k - 1) * plane] - vy[i - k * plane]);
                    }
                }
                let divergence = dvx * inv_x + dvz * inv_z + dvy * inv_y;
                row[x] = curr[i] + sign * velocity[i] * divergence;
            }
        });
    }
}

impl ComputationKernel for StaggeredKernel {
    fn name(&self) -> &'static str {
        "StaggeredComputationKernel"
    }

    fn formulation(&self) -> Formulation {
        Formulation::Staggered
    }

    fn parameters(&self) -> &ComputationParameters {
        &self.params
    }

    fn mode(&self) -> KernelMode {
        self.mode
    }

    fn set_mode(&mut self, mode: KernelMode) {
        self.mode = mode;
    }

    fn allocate_wavefields(&self, size: GridSize, _three_buffers: bool) -> Wavefields {
        Wavefields::Staggered(StaggeredFields::new(size.nx, size.ny, size.nz))
    }

    fn first_touch(&self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        let size = grid.window_size();
        let hl = self.params.half();
        let fields = grid.staggered_fields_mut(self.name())?;
        for buffer in fields.buffers_mut() {
            for_each_interior_row(&mut buffer.data, size, hl, &self.params, |_, _, xs, row| {
                row[xs].fill(0.0);
            });
        }
        Ok(())
    }

    fn step(
        &self,
        grid: &mut GridBox,
        boundary: &mut dyn BoundaryManager,
    ) -> Result<(), ConfigurationError> {
        self.update_velocity(grid, self.mode)?;
        boundary.apply_boundary(grid, StepPhase::Velocity)?;
        self.update_pressure(grid, self.mode)?;
        trace!(boundary = boundary.name(), mode = ?self.mode, "Staggered step done");
        boundary.apply_boundary(grid, StepPhase::Pressure)
    }
}
