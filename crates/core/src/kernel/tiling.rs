//! Parallel traversal of the stencil interior
//!
//! Rows (fixed `y`, `z`) are the unit rayon hands out, grouped so a task owns
//! at least `block_z` rows (times `block_y` in 3D). Inside a row the x range
//! is walked in `block_x` strips. The block factors only size the work;
//! there are no separate y/z tiles.

use std::ops::Range;

use rayon::prelude::*;

use crate::grid::GridSize;
use crate::parameters::ComputationParameters;

/// Interior bounds `[hl, n - hl)` per axis, with y fixed to `0..1` in 2D
#[derive(Debug, Clone, Copy)]
pub(crate) struct Interior {
    pub x: (usize, usize),
    pub y: (usize, usize),
    pub z: (usize, usize),
}

impl Interior {
    pub(crate) fn new(size: GridSize, hl: usize) -> Self {
        let y = if size.is_3d() {
            (hl, size.ny - hl)
        } else {
            (0, 1)
        };
        Self {
            x: (hl, size.nx - hl),
            y,
            z: (hl, size.nz - hl),
        }
    }

    #[inline]
    fn contains_row(&self, y: usize, z: usize) -> bool {
        y >= self.y.0 && y < self.y.1 && z >= self.z.0 && z < self.z.1
    }
}

/// Visit every interior row of `out` in parallel.
///
/// `kernel(y, z, x_block, row)` receives the whole `nx`-long row and the x
/// strip it must fill. Cells outside the interior are never visited.
pub(crate) fn for_each_interior_row<F>(
    out: &mut [f32],
    size: GridSize,
    hl: usize,
    params: &ComputationParameters,
    kernel: F,
) where
    F: Fn(usize, usize, Range<usize>, &mut [f32]) + Sync + Send,
{
    let interior = Interior::new(size, hl);
    let rows_per_task = if size.is_3d() {
        params.block_z * params.block_y
    } else {
        params.block_z
    };
    let block_x = params.block_x.max(1);
    let nz = size.nz;

    out.par_chunks_mut(size.nx)
        .enumerate()
        .with_min_len(rows_per_task.max(1))
        .for_each(|(row_index, row)| {
            let y = row_index / nz;
            let z = row_index % nz;
            if !interior.contains_row(y, z) {
                return;
            }
            let mut x0 = interior.x.0;
            while x0 < interior.x.1 {
                let x1 = (x0 + block_x).min(interior.x.1);
                kernel(y, z, x0..x1, row);
                x0 = x1;
            }
        });
}
