//! The central mutable state of a propagation run

use std::fmt;

use serde::{Deserialize, Serialize};

use super::buffers::{PressureBuffers, StaggeredFields};
use super::field::WaveField;
use crate::error::ConfigurationError;

/// Which wave equation the grid carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Formulation {
    /// Second-order acoustic pressure equation
    AcousticSecond,
    /// First-order velocity-pressure system on a staggered grid
    Staggered,
}

impl fmt::Display for Formulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formulation::AcousticSecond => write!(f, "second-order acoustic"),
            Formulation::Staggered => write!(f, "staggered"),
        }
    }
}

/// Padded grid extents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    /// Cells along x
    pub nx: usize,
    /// Cells along y (1 for 2D)
    pub ny: usize,
    /// Cells along z
    pub nz: usize,
}

impl GridSize {
    /// New extents
    pub const fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    /// True for a 3D grid
    #[inline]
    pub const fn is_3d(&self) -> bool {
        self.ny > 1
    }

    /// Number of cells
    #[inline]
    pub const fn cells(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Flat index of `(x, y, z)`
    #[inline]
    pub const fn index(&self, x: usize, y: usize, z: usize) -> usize {
        y * self.nx * self.nz + z * self.nx + x
    }
}

/// Active sub-domain and its placement inside the full grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Window extents (padded)
    pub size: GridSize,
    /// Offset of the window's x origin in the full grid
    pub start_x: usize,
    /// Offset of the window's y origin in the full grid
    pub start_y: usize,
    /// Offset of the window's z origin in the full grid
    pub start_z: usize,
}

/// Cell spacing in meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellDimensions {
    /// Spacing along x
    pub dx: f32,
    /// Spacing along y
    pub dy: f32,
    /// Spacing along z
    pub dz: f32,
}

impl CellDimensions {
    /// New spacing
    pub const fn new(dx: f32, dy: f32, dz: f32) -> Self {
        Self { dx, dy, dz }
    }
}

/// Wavefield storage for either formulation
#[derive(Debug, Clone)]
pub enum Wavefields {
    /// Pressure at two or three time levels
    Second(PressureBuffers),
    /// Pressure plus particle velocity
    Staggered(StaggeredFields),
}

/// Grid state shared by kernels, boundary managers and collectors.
///
/// Property arrays (`velocity`, `density`) cover the full padded grid.
/// Wavefields cover the window. When the window equals the full grid the
/// window properties are the full properties and no copy is kept.
#[derive(Debug, Clone)]
pub struct GridBox {
    /// Wave equation carried by the wavefields
    pub formulation: Formulation,
    /// Full padded grid extents
    pub grid_size: GridSize,
    /// Active window
    pub window: Window,
    /// Cell spacing
    pub cells: CellDimensions,
    /// Time step (s)
    pub dt: f32,
    /// Number of time steps
    pub nt: usize,
    /// Largest physical velocity of the model (m/s)
    pub max_velocity: f32,
    /// Preprocessed velocity over the full grid
    pub velocity: WaveField,
    /// Preprocessed velocity over the window, when the window is smaller
    pub window_velocity: Option<WaveField>,
    /// Preprocessed density over the full grid (staggered only)
    pub density: Option<WaveField>,
    /// Preprocessed density over the window (staggered only)
    pub window_density: Option<WaveField>,
    /// Time levels
    pub wavefields: Wavefields,
}

/// Split borrow of a grid: read-only properties next to mutable wavefields
pub struct GridParts<'a> {
    /// Window extents
    pub size: GridSize,
    /// Cell spacing
    pub cells: CellDimensions,
    /// Time step
    pub dt: f32,
    /// Window velocity
    pub velocity: &'a [f32],
    /// Window density, staggered grids only
    pub density: Option<&'a [f32]>,
    /// Wavefields
    pub wavefields: &'a mut Wavefields,
}

impl GridBox {
    /// True when the active window is smaller than the full grid
    pub fn has_window(&self) -> bool {
        self.window.size != self.grid_size
    }

    /// Window extents
    #[inline]
    pub fn window_size(&self) -> GridSize {
        self.window.size
    }

    /// Velocity over the window
    pub fn window_velocity(&self) -> &WaveField {
        self.window_velocity.as_ref().unwrap_or(&self.velocity)
    }

    /// Mutable velocity over the window
    pub fn window_velocity_mut(&mut self) -> &mut WaveField {
        match self.window_velocity.as_mut() {
            Some(field) => field,
            None => &mut self.velocity,
        }
    }

    /// Density over the window, if the grid carries one
    pub fn window_density(&self) -> Option<&WaveField> {
        self.window_density.as_ref().or(self.density.as_ref())
    }

    /// Mutable density over the window, if the grid carries one
    pub fn window_density_mut(&mut self) -> Option<&mut WaveField> {
        match self.window_density.as_mut() {
            Some(field) => Some(field),
            None => self.density.as_mut(),
        }
    }

    /// Split the grid for a kernel or boundary sweep
    pub fn parts_mut(&mut self) -> GridParts<'_> {
        let velocity = self
            .window_velocity
            .as_ref()
            .unwrap_or(&self.velocity)
            .as_slice();
        let density = self
            .window_density
            .as_ref()
            .or(self.density.as_ref())
            .map(WaveField::as_slice);
        GridParts {
            size: self.window.size,
            cells: self.cells,
            dt: self.dt,
            velocity,
            density,
            wavefields: &mut self.wavefields,
        }
    }

    /// Current pressure frame
    pub fn pressure_current(&self) -> &WaveField {
        match &self.wavefields {
            Wavefields::Second(buffers) => buffers.curr(),
            Wavefields::Staggered(fields) => fields.curr(),
        }
    }

    /// Mutable current pressure frame
    pub fn pressure_current_mut(&mut self) -> &mut WaveField {
        match &mut self.wavefields {
            Wavefields::Second(buffers) => buffers.curr_mut(),
            Wavefields::Staggered(fields) => fields.curr_mut(),
        }
    }

    /// Second-order time levels.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::GridMismatch`] on a staggered grid.
    pub fn pressure_buffers_mut(
        &mut self,
        component: &'static str,
    ) -> Result<&mut PressureBuffers, ConfigurationError> {
        let found = self.formulation;
        match &mut self.wavefields {
            Wavefields::Second(buffers) => Ok(buffers),
            Wavefields::Staggered(_) => Err(ConfigurationError::GridMismatch {
                component,
                expected: Formulation::AcousticSecond,
                found,
            }),
        }
    }

    /// Staggered fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::GridMismatch`] on a second-order grid.
    pub fn staggered_fields_mut(
        &mut self,
        component: &'static str,
    ) -> Result<&mut StaggeredFields, ConfigurationError> {
        let found = self.formulation;
        match &mut self.wavefields {
            Wavefields::Staggered(fields) => Ok(fields),
            Wavefields::Second(_) => Err(ConfigurationError::GridMismatch {
                component,
                expected: Formulation::Staggered,
                found,
            }),
        }
    }

    /// Fail unless the grid carries `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::GridMismatch`].
    pub fn expect_formulation(
        &self,
        component: &'static str,
        expected: Formulation,
    ) -> Result<(), ConfigurationError> {
        if self.formulation == expected {
            Ok(())
        } else {
            Err(ConfigurationError::GridMismatch {
                component,
                expected,
                found: self.formulation,
            })
        }
    }

    /// A grid with the same geometry and properties but its own wavefields
    pub fn with_wavefields(&self, wavefields: Wavefields) -> GridBox {
        GridBox {
            formulation: self.formulation,
            grid_size: self.grid_size,
            window: self.window,
            cells: self.cells,
            dt: self.dt,
            nt: self.nt,
            max_velocity: self.max_velocity,
            velocity: self.velocity.clone(),
            window_velocity: self.window_velocity.clone(),
            density: self.density.clone(),
            window_density: self.window_density.clone(),
            wavefields,
        }
    }

    /// Zero every wavefield buffer
    pub fn reset_wavefields(&mut self) {
        match &mut self.wavefields {
            Wavefields::Second(buffers) => buffers.clear(),
            Wavefields::Staggered(fields) => fields.clear(),
        }
    }

    /// Place the window at `(start_x, start_y, start_z)` and refresh the
    /// window property copies from the full grid.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidGeometry`] when the window would
    /// extend past the full grid.
    pub fn setup_window(
        &mut self,
        start_x: usize,
        start_y: usize,
        start_z: usize,
    ) -> Result<(), ConfigurationError> {
        let w = self.window.size;
        let g = self.grid_size;
        if start_x + w.nx > g.nx || start_y + w.ny > g.ny || start_z + w.nz > g.nz {
            return Err(ConfigurationError::InvalidGeometry(format!(
                "window {}x{}x{} at ({start_x}, {start_y}, {start_z}) exceeds grid {}x{}x{}",
                w.nx, w.ny, w.nz, g.nx, g.ny, g.nz
            )));
        }
        self.window.start_x = start_x;
        self.window.start_y = start_y;
        self.window.start_z = start_z;
        if !self.has_window() {
            return Ok(());
        }
        let window = self.window;
        if let Some(target) = self.window_velocity.as_mut() {
            copy_window(&self.velocity, target, &window);
        }
        if let (Some(full), Some(target)) = (self.density.as_ref(), self.window_density.as_mut()) {
            copy_window(full, target, &window);
        }
        Ok(())
    }
}

fn copy_window(full: &WaveField, target: &mut WaveField, window: &Window) {
    let w = window.size;
    for y in 0..w.ny {
        for z in 0..w.nz {
            let src = full.index(window.start_x, window.start_y + y, window.start_z + z);
            let dst = w.index(0, y, z);
            target.data[dst..dst + w.nx].copy_from_slice(&full.data[src..src + w.nx]);
        }
    }
}
