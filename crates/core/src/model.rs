//! Model building
//!
//! Turns an interior velocity (and density) model into a padded, preprocessed
//! [`GridBox`]: every axis grows by `half_length + boundary_length` cells per
//! side, `dt` comes from the CFL limit and the properties are scaled into the
//! form the kernels consume.
//!
//! # Example
//!
//! ```rust,ignore
//! use rtm_core::model::ModelBuilder;
//!
//! let grid = ModelBuilder::homogeneous(200, 1, 200, 10.0, 2000.0)
//!     .total_time(0.5)
//!     .build(&params)?;
//! ```

use tracing::info;

use crate::error::ConfigurationError;
use crate::grid::{CellDimensions, Formulation, GridBox, GridSize, WaveField, Window};
use crate::kernel::{create_kernel, ComputationKernel};
use crate::parameters::ComputationParameters;

/// Builder for a padded grid
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    size: GridSize,
    cells: CellDimensions,
    velocity: Vec<f32>,
    density: Option<Vec<f32>>,
    formulation: Formulation,
    total_time: f32,
    window: Option<GridSize>,
    three_buffers: bool,
}

impl ModelBuilder {
    /// Constant-velocity model with equal spacing on every axis
    ///
    /// # Arguments
    ///
    /// * `nx`, `ny`, `nz` - Interior cells (`ny = 1` for 2D)
    /// * `spacing` - Cell size in meters
    /// * `velocity` - Wave speed in m/s
    pub fn homogeneous(nx: usize, ny: usize, nz: usize, spacing: f32, velocity: f32) -> Self {
        Self::from_fn(
            GridSize::new(nx, ny, nz),
            CellDimensions::new(spacing, spacing, spacing),
            |_, _, _| velocity,
        )
    }

    /// Model whose velocity at interior cell `(x, y, z)` is `velocity(x, y, z)`
    pub fn from_fn<F>(size: GridSize, cells: CellDimensions, velocity: F) -> Self
    where
        F: Fn(usize, usize, usize) -> f32,
    {
        let mut data = Vec::with_capacity(size.cells());
        for y in 0..size.ny {
            for z in 0..size.nz {
                for x in 0..size.nx {
                    data.push(velocity(x, y, z));
                }
            }
        }
        Self {
            size,
            cells,
            velocity: data,
            density: None,
            formulation: Formulation::AcousticSecond,
            total_time: 1.0,
            window: None,
            three_buffers: false,
        }
    }

    /// Wave equation to prepare for
    pub fn formulation(mut self, formulation: Formulation) -> Self {
        self.formulation = formulation;
        self
    }

    /// Constant density (staggered only, defaults to 1)
    pub fn density(mut self, density: f32) -> Self {
        self.density = Some(vec![density; self.size.cells()]);
        self
    }

    /// Interior density field in the layout of the velocity
    pub fn density_field(mut self, density: Vec<f32>) -> Self {
        self.density = Some(density);
        self
    }

    /// Recording time in seconds
    pub fn total_time(mut self, seconds: f32) -> Self {
        self.total_time = seconds;
        self
    }

    /// Interior extents of the active window
    pub fn window(mut self, nx: usize, ny: usize, nz: usize) -> Self {
        self.window = Some(GridSize::new(nx, ny, nz));
        self
    }

    /// Keep a separate previous-frame buffer (second order only)
    pub fn three_buffers(mut self, enabled: bool) -> Self {
        self.three_buffers = enabled;
        self
    }

    /// Build with the default kernel of the formulation.
    ///
    /// # Errors
    ///
    /// See [`ModelBuilder::build_with`].
    pub fn build(self, params: &ComputationParameters) -> Result<GridBox, ConfigurationError> {
        let kernel = create_kernel(self.formulation, params);
        self.build_with(params, kernel.as_ref())
    }

    /// Pad, preprocess and allocate through `kernel`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidGeometry`] for empty or
    /// inconsistent extents, [`ConfigurationError::InvalidParameter`] for a
    /// non-positive velocity or recording time and
    /// [`ConfigurationError::GridMismatch`] when the kernel integrates another
    /// formulation.
    pub fn build_with(
        self,
        params: &ComputationParameters,
        kernel: &dyn ComputationKernel,
    ) -> Result<GridBox, ConfigurationError> {
        params.validate()?;
        self.validate()?;
        if kernel.formulation() != self.formulation {
            return Err(ConfigurationError::GridMismatch {
                component: kernel.name(),
                expected: self.formulation,
                found: kernel.formulation(),
            });
        }
        let pad = params.half() + params.boundary_length;
        let three_d = self.size.is_3d();
        let padded = |n: usize, axis_used: bool| if axis_used { n + 2 * pad } else { n };
        let grid_size = GridSize::new(
            padded(self.size.nx, true),
            padded(self.size.ny, three_d),
            padded(self.size.nz, true),
        );

        let max_velocity = self.velocity.iter().copied().fold(f32::MIN, f32::max);
        if !(max_velocity > 0.0) {
            return Err(ConfigurationError::InvalidParameter {
                name: "velocity",
                message: format!("maximum velocity {max_velocity} must be positive"),
            });
        }
        let dt = params.stable_dt(&self.cells, max_velocity, three_d);
        let nt = (self.total_time / dt).floor() as usize + 1;

        let y_pad = if three_d { pad } else { 0 };
        let embed = |interior: &[f32]| {
            let mut field = WaveField::new(grid_size.nx, grid_size.ny, grid_size.nz);
            for y in 0..self.size.ny {
                for z in 0..self.size.nz {
                    let src = self.size.index(0, y, z);
                    let dst = grid_size.index(pad, y + y_pad, z + pad);
                    field.data[dst..dst + self.size.nx]
                        .copy_from_slice(&interior[src..src + self.size.nx]);
                }
            }
            field
        };
        let mut velocity = embed(&self.velocity);
        let mut density = match self.formulation {
            Formulation::AcousticSecond => None,
            Formulation::Staggered => {
                let rho = self
                    .density
                    .clone()
                    .unwrap_or_else(|| vec![1.0; self.size.cells()]);
                Some(embed(&rho))
            }
        };
        preprocess(&mut velocity, density.as_mut(), dt);

        let window_size = match self.window {
            Some(w) => GridSize::new(
                padded(w.nx.min(self.size.nx), true),
                padded(w.ny.min(self.size.ny), three_d),
                padded(w.nz.min(self.size.nz), true),
            ),
            None => grid_size,
        };
        let windowed = window_size != grid_size;
        let window_copy =
            || windowed.then(|| WaveField::new(window_size.nx, window_size.ny, window_size.nz));
        let window_velocity = window_copy();
        let window_density = density.as_ref().and_then(|_| window_copy());

        let mut grid = GridBox {
            formulation: self.formulation,
            grid_size,
            window: Window {
                size: window_size,
                start_x: 0,
                start_y: 0,
                start_z: 0,
            },
            cells: self.cells,
            dt,
            nt,
            max_velocity,
            velocity,
            window_velocity,
            density,
            window_density,
            wavefields: kernel.allocate_wavefields(window_size, self.three_buffers),
        };
        grid.setup_window(0, 0, 0)?;
        kernel.first_touch(&mut grid)?;

        info!(
            formulation = %self.formulation,
            nx = grid_size.nx,
            ny = grid_size.ny,
            nz = grid_size.nz,
            window_nx = window_size.nx,
            window_nz = window_size.nz,
            dt,
            nt,
            max_velocity,
            "Model built"
        );
        Ok(grid)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let s = self.size;
        if s.nx == 0 || s.ny == 0 || s.nz == 0 {
            return Err(ConfigurationError::InvalidGeometry(format!(
                "empty model {}x{}x{}",
                s.nx, s.ny, s.nz
            )));
        }
        if let Some(density) = &self.density {
            if density.len() != s.cells() {
                return Err(ConfigurationError::InvalidGeometry(format!(
                    "density has {} cells, model has {}",
                    density.len(),
                    s.cells()
                )));
            }
        }
        if let Some(w) = self.window {
            if w.nx == 0 || w.ny == 0 || w.nz == 0 {
                return Err(ConfigurationError::InvalidGeometry(
                    "window must be non-empty".to_string(),
                ));
            }
        }
        if !(self.total_time > 0.0) {
            return Err(ConfigurationError::InvalidParameter {
                name: "total_time",
                message: format!("{} must be positive", self.total_time),
            });
        }
        Ok(())
    }
}

/// Scale the properties into kernel form.
///
/// Second order: `vel = v² dt²`. Staggered: `vel = v² dt rho` and
/// `den = dt / rho`, both left at zero where `rho == 0`.
fn preprocess(velocity: &mut WaveField, density: Option<&mut WaveField>, dt: f32) {
    match density {
        None => {
            for v in &mut velocity.data {
                *v = *v * *v * dt * dt;
            }
        }
        Some(density) => {
            for (v, rho) in velocity.data.iter_mut().zip(density.data.iter_mut()) {
                if *rho == 0.0 {
                    *v = 0.0;
                } else {
                    *v = *v * *v * dt * *rho;
                    *rho = dt / *rho;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Wavefields;
    use crate::parameters::HalfLength;
    use approx::assert_relative_eq;

    #[test]
    fn test_padding_and_preprocessing() {
        let params = ComputationParameters::new(HalfLength::O8, 5);
        let grid = ModelBuilder::homogeneous(30, 1, 20, 10.0, 2000.0)
            .total_time(0.1)
            .build(&params)
            .unwrap();
        assert_eq!(grid.grid_size, GridSize::new(30 + 18, 1, 20 + 18));
        assert!(!grid.has_window());
        assert_eq!(grid.max_velocity, 2000.0);

        let expected_dt = params.stable_dt(&grid.cells, 2000.0, false);
        assert_relative_eq!(grid.dt, expected_dt);
        assert_eq!(grid.nt, (0.1 / expected_dt).floor() as usize + 1);

        let v2dt2 = 2000.0 * 2000.0 * grid.dt * grid.dt;
        assert_relative_eq!(grid.velocity.get(9, 0, 9), v2dt2);
        // padding waits for the boundary extension
        assert_eq!(grid.velocity.get(4, 0, 9), 0.0);
        assert!(matches!(grid.wavefields, Wavefields::Second(_)));
    }

    #[test]
    fn test_staggered_zero_density_guard() {
        let params = ComputationParameters::new(HalfLength::O2, 2);
        let size = GridSize::new(4, 1, 4);
        let mut rho = vec![2.0; size.cells()];
        rho[0] = 0.0;
        let grid = ModelBuilder::homogeneous(4, 1, 4, 5.0, 1000.0)
            .formulation(Formulation::Staggered)
            .density_field(rho)
            .build(&params)
            .unwrap();
        let density = grid.density.as_ref().unwrap();
        // interior origin sits at pad = 3
        assert_eq!(density.get(3, 0, 3), 0.0);
        assert_eq!(grid.velocity.get(3, 0, 3), 0.0);
        assert_relative_eq!(density.get(4, 0, 3), grid.dt / 2.0);
        assert_relative_eq!(grid.velocity.get(4, 0, 3), 1.0e6 * grid.dt * 2.0);
    }

    #[test]
    fn test_window_copies_properties() {
        let params = ComputationParameters::new(HalfLength::O2, 2);
        let grid = ModelBuilder::homogeneous(40, 1, 40, 10.0, 1500.0)
            .window(10, 1, 10)
            .build(&params)
            .unwrap();
        assert!(grid.has_window());
        assert_eq!(grid.window_size(), GridSize::new(16, 1, 16));
        assert_eq!(grid.window_velocity().len(), 16 * 16);
        assert_eq!(grid.pressure_current().len(), 16 * 16);
        assert_eq!(grid.window_velocity().get(5, 0, 5), grid.velocity.get(5, 0, 5));
    }

    #[test]
    fn test_rejects_bad_models() {
        let params = ComputationParameters::new(HalfLength::O2, 2);
        assert!(matches!(
            ModelBuilder::homogeneous(0, 1, 4, 10.0, 1500.0).build(&params),
            Err(ConfigurationError::InvalidGeometry(_))
        ));
        assert!(matches!(
            ModelBuilder::homogeneous(4, 1, 4, 10.0, 0.0).build(&params),
            Err(ConfigurationError::InvalidParameter {
                name: "velocity",
                ..
            })
        ));
    }
}
