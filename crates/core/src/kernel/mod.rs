//! Finite-difference computation kernels
//!
//! Two formulations are supported: the second-order pressure equation
//! ([`SecondOrderKernel`]) and the first-order velocity-pressure system on a
//! staggered grid ([`StaggeredKernel`]). Both walk the stencil interior row
//! by row, with rayon tasks sized by the block factors.
//!
//! # Example
//!
//! ```rust,ignore
//! use rtm_core::kernel::create_kernel;
//!
//! let kernel = create_kernel(grid.formulation, &params);
//! kernel.step(&mut grid, boundary.as_mut())?;
//! ```

mod second_order;
mod staggered;
mod tiling;
mod r#trait;

use tracing::info;

use crate::grid::Formulation;
use crate::parameters::ComputationParameters;

pub use r#trait::{ComputationKernel, KernelMode};
pub use second_order::SecondOrderKernel;
pub use staggered::StaggeredKernel;
pub(crate) use tiling::for_each_interior_row;

/// Create the kernel for a formulation
pub fn create_kernel(
    formulation: Formulation,
    params: &ComputationParameters,
) -> Box<dyn ComputationKernel> {
    let kernel: Box<dyn ComputationKernel> = match formulation {
        Formulation::AcousticSecond => Box::new(SecondOrderKernel::new(params.clone())),
        Formulation::Staggered => Box::new(StaggeredKernel::new(params.clone())),
    };
    info!(
        kernel = kernel.name(),
        half_length = params.half(),
        block_x = params.block_x,
        block_y = params.block_y,
        block_z = params.block_z,
        "Computation kernel created"
    );
    kernel
}
