//! Grid state: flattened fields, time-level arenas and the grid box
//!
//! All arrays share the layout `index = y * (nx * nz) + z * nx + x`. The
//! padding of `half_length + boundary_length` cells per side is part of
//! `nx`/`nz` (and `ny` in 3D).

mod buffers;
mod field;
mod grid_box;

pub use buffers::{
    PressureBuffers, PressureView, StaggeredFields, StaggeredPressureView, StaggeredVelocityView,
};
pub use field::WaveField;
pub use grid_box::{CellDimensions, Formulation, GridBox, GridParts, GridSize, Wavefields, Window};
