//! Second-order acoustic kernel
//!
//! `next = 2 curr - prev + vel * lap(curr)` where `vel` already holds
//! `v² dt²` and `lap` is the `2 * half_length` order Laplacian. In
//! two-buffer mode `prev` is read from `next` just before it is overwritten.

use tracing::trace;

use super::tiling::for_each_interior_row;
use super::{ComputationKernel, KernelMode};
use crate::boundary::{BoundaryManager, StepPhase};
use crate::error::ConfigurationError;
use crate::grid::{
    CellDimensions, Formulation, GridBox, GridSize, PressureBuffers, PressureView, Wavefields,
};
use crate::parameters::ComputationParameters;

/// Per-axis stencil weights with the spacing folded in
#[derive(Debug, Clone)]
struct Weights {
    center: f32,
    x: Vec<f32>,
    z: Vec<f32>,
    y: Vec<f32>,
}

impl Weights {
    fn new(coeff: &[f32], cells: CellDimensions, three_d: bool) -> Self {
        let (inv_x, inv_z, inv_y) = (
            1.0 / (cells.dx * cells.dx),
            1.0 / (cells.dz * cells.dz),
            1.0 / (cells.dy * cells.dy),
        );
        let mut center = coeff[0] * (inv_x + inv_z);
        if three_d {
            center += coeff[0] * inv_y;
        }
        Self {
            center,
            x: coeff.iter().map(|c| c * inv_x).collect(),
            z: coeff.iter().map(|c| c * inv_z).collect(),
            y: coeff.iter().map(|c| c * inv_y).collect(),
        }
    }
}

/// Time stepper for the second-order pressure equation
#[derive(Debug, Clone)]
pub struct SecondOrderKernel {
    params: ComputationParameters,
    mode: KernelMode,
}

impl SecondOrderKernel {
    /// Kernel with the given stencil radius and cache blocks
    pub fn new(params: ComputationParameters) -> Self {
        Self {
            params,
            mode: KernelMode::Forward,
        }
    }

    /// Fill `view.next` over the stencil interior
    fn sweep(&self, view: PressureView<'_>, velocity: &[f32], size: GridSize, cells: CellDimensions) {
        let hl = self.params.half();
        let three_d = size.is_3d();
        let weights = Weights::new(self.params.half_length.second_derivative(), cells, three_d);
        let PressureView { prev, curr, next } = view;
        let (sx, sz, sy) = (1, size.nx, size.nx * size.nz);

        for_each_interior_row(next, size, hl, &self.params, |y, z, xs, row| {
            let base = size.index(0, y, z);
            for x in xs {
                let i = base + x;
                let c = curr[i];
                let mut lap = weights.center * c;
                for k in 1..=hl {
                    lap += weights.x[k] * (curr[i - k * sx] + curr[i + k * sx]);
                    lap += weights.z[k] * (curr[i - k * sz] + curr[i + k * sz]);
                }
                if three_d {
                    for k in 1..=hl {
                        lap += weights.y[k] * (curr[i - k * sy] + curr[i + k * sy]);
                    }
                }
                let previous = prev.map_or(row[x], |p| p[i]);
                row[x] = 2.0 * c - previous + velocity[i] * lap;
            }
        });
    }
}

impl ComputationKernel for SecondOrderKernel {
    fn name(&self) -> &'static str {
        "SecondOrderComputationKernel"
    }

    fn formulation(&self) -> Formulation {
        Formulation::AcousticSecond
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

    fn allocate_wavefields(&self, size: GridSize, three_buffers: bool) -> Wavefields {
        let buffers = if three_buffers {
            PressureBuffers::three(size.nx, size.ny, size.nz)
        } else {
            PressureBuffers::two(size.nx, size.ny, size.nz)
        };
        Wavefields::Second(buffers)
    }

    fn first_touch(&self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        let size = grid.window_size();
        let hl = self.params.half();
        let buffers = grid.pressure_buffers_mut(self.name())?;
        for slot in buffers.slots_mut() {
            for_each_interior_row(&mut slot.data, size, hl, &self.params, |_, _, xs, row| {
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
        {
            let parts = grid.parts_mut();
            let Wavefields::Second(buffers) = parts.wavefields else {
                return Err(ConfigurationError::GridMismatch {
                    component: self.name(),
                    expected: Formulation::AcousticSecond,
                    found: Formulation::Staggered,
                });
            };
            self.sweep(buffers.view(), parts.velocity, parts.size, parts.cells);
            buffers.rotate();
        }
        trace!(boundary = boundary.name(), "Second-order step done");
        boundary.apply_boundary(grid, StepPhase::Pressure)
    }
}
