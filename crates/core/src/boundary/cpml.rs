//! Convolutional PML for the second-order pressure equation
//!
//! Each face keeps two memory variables. `aux_1` filters the first
//! derivative of the previous pressure along the face normal, `aux_2`
//! filters the derivative of `aux_1` plus the second derivative. The current
//! pressure then receives `velocity * (d aux_1 + aux_2)`.
//!
//! Memory slabs are `boundary_length + 2 * half_length` cells thick along the
//! normal so the derivative of `aux_1` can read past both ends of the layer;
//! the extra cells stay zero.

use std::ops::Range;

use rayon::prelude::*;
use tracing::{debug, info};

use super::extension::{Extension, Property};
use super::{BoundaryManager, CpmlSettings, StepPhase};
use crate::error::ConfigurationError;
use crate::grid::{Formulation, GridBox, GridSize, Wavefields};
use crate::parameters::ComputationParameters;

/// Damping pair per layer, index `bl - 1` being the outermost layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DampingProfile {
    /// Memory decay `exp(-dt (d + shift))`
    pub a: Vec<f32>,
    /// Memory forcing `d / (d + shift) (a - 1)`
    pub b: Vec<f32>,
}

impl DampingProfile {
    /// Quadratic damping profile for one axis.
    ///
    /// # Arguments
    ///
    /// * `boundary_length` - Layers in the padding
    /// * `spacing` - Cell size along the axis
    /// * `dt` - Time step
    /// * `max_velocity` - Largest physical velocity of the model
    /// * `settings` - Reflection, shift and relaxation knobs
    /// * `formulation` - Picks the relaxation default
    pub fn new(
        boundary_length: usize,
        spacing: f32,
        dt: f32,
        max_velocity: f32,
        settings: &CpmlSettings,
        formulation: Formulation,
    ) -> Self {
        let length = if boundary_length == 0 {
            1.0
        } else {
            boundary_length as f32
        };
        let d0 = -settings.reflect_coeff.ln() * (3.0 * max_velocity / (length * spacing))
            * settings.relax_cp(formulation)
            / length;
        let mut a = vec![0.0; boundary_length];
        let mut b = vec![0.0; boundary_length];
        for i in (1..=boundary_length).rev() {
            let damping = (i * i) as f32 * d0;
            let decay = (-dt * (damping + settings.shift_ratio)).exp();
            a[i - 1] = decay;
            b[i - 1] = damping / (damping + settings.shift_ratio) * (decay - 1.0);
        }
        Self { a, b }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Near,
    Far,
}

impl Side {
    /// Positions along the normal covered by this side's layer
    #[inline]
    fn positions(self, n: usize, hl: usize, bl: usize) -> Range<usize> {
        match self {
            Side::Near => hl..hl + bl,
            Side::Far => n - hl - bl..n - hl,
        }
    }

    /// Damping index of `pos`, growing towards the outer edge on both sides
    #[inline]
    fn coefficient(self, pos: usize, n: usize, hl: usize, bl: usize) -> usize {
        match self {
            Side::Near => bl + hl - 1 - pos,
            Side::Far => pos - (n - hl - bl),
        }
    }

    /// Position inside the memory slab
    #[inline]
    fn slab(self, pos: usize, n: usize, hl: usize, bl: usize) -> usize {
        match self {
            Side::Near => pos,
            Side::Far => pos - (n - hl - bl) + hl,
        }
    }
}

/// Memory variables of both sides of one axis
#[derive(Debug, Clone)]
struct FaceMemory {
    aux_1: [Vec<f32>; 2],
    aux_2: [Vec<f32>; 2],
}

impl FaceMemory {
    fn new(len: usize) -> Self {
        Self {
            aux_1: [vec![0.0; len], vec![0.0; len]],
            aux_2: [vec![0.0; len], vec![0.0; len]],
        }
    }

    fn clear(&mut self) {
        for v in self.aux_1.iter_mut().chain(self.aux_2.iter_mut()) {
            v.fill(0.0);
        }
    }
}

#[derive(Debug, Clone)]
struct CpmlMemory {
    size: GridSize,
    x: FaceMemory,
    z: FaceMemory,
    y: Option<FaceMemory>,
}

impl CpmlMemory {
    fn new(size: GridSize, width: usize) -> Self {
        Self {
            size,
            x: FaceMemory::new(width * size.ny * size.nz),
            z: FaceMemory::new(width * size.nx * size.ny),
            y: size.is_3d().then(|| FaceMemory::new(width * size.nx * size.nz)),
        }
    }

    fn clear(&mut self) {
        self.x.clear();
        self.z.clear();
        if let Some(y) = self.y.as_mut() {
            y.clear();
        }
    }
}

/// Read-only state shared by the face sweeps
struct Sweep<'a> {
    size: GridSize,
    hl: usize,
    bl: usize,
    width: usize,
    prev: &'a [f32],
    velocity: &'a [f32],
    first: &'static [f32],
    second: &'static [f32],
}

impl Sweep<'_> {
    #[inline]
    fn y_range(&self) -> Range<usize> {
        if self.size.is_3d() {
            self.hl..self.size.ny - self.hl
        } else {
            0..1
        }
    }

    #[inline]
    fn interior(&self, v: usize, n: usize) -> bool {
        v >= self.hl && v < n - self.hl
    }

    /// `c1[0] f + Σ c1[i] (f[+i] - f[-i])`, over the spacing
    #[inline]
    fn first_derivative(&self, data: &[f32], idx: usize, stride: usize, inv_h: f32) -> f32 {
        let mut value = self.first[0] * inv_h * data[idx];
        for i in 1..=self.hl {
            value += self.first[i] * inv_h * (data[idx + i * stride] - data[idx - i * stride]);
        }
        value
    }

    /// `c2[0] p + Σ c2[i] (p[-i] + p[+i])` of the previous pressure, over the
    /// squared spacing
    #[inline]
    fn second_derivative(&self, idx: usize, stride: usize, inv_h2: f32) -> f32 {
        let p = self.prev;
        let mut value = self.second[0] * inv_h2 * p[idx];
        for i in 1..=self.hl {
            value += self.second[i] * inv_h2 * (p[idx - i * stride] + p[idx + i * stride]);
        }
        value
    }

    /// Advance both memory variables at one cell and return the correction
    /// to add to the current pressure (before the velocity factor)
    #[inline]
    fn correction(
        &self,
        profile: &DampingProfile,
        c: usize,
        pressure_term: f32,
        d_first: f32,
        aux_2: &mut f32,
    ) -> f32 {
        *aux_2 = profile.a[c] * *aux_2 + profile.b[c] * (d_first + pressure_term);
        d_first + *aux_2
    }
}

/// CPML boundary manager for second-order grids
#[derive(Debug)]
pub struct CpmlBoundaryManager {
    settings: CpmlSettings,
    extension: Extension,
    half_length: usize,
    boundary_length: usize,
    first: &'static [f32],
    second: &'static [f32],
    profile_x: DampingProfile,
    profile_z: DampingProfile,
    profile_y: DampingProfile,
    memory: Option<CpmlMemory>,
}

impl CpmlBoundaryManager {
    /// Create the manager; damping profiles are derived from the grid in
    /// [`BoundaryManager::extend_model`]
    pub fn new(params: &ComputationParameters, settings: CpmlSettings) -> Self {
        let (hl, bl) = (params.half(), params.boundary_length);
        info!(
            reflect_coeff = settings.reflect_coeff,
            shift_ratio = settings.shift_ratio,
            relax_cp = settings.relax_cp(Formulation::AcousticSecond),
            use_top_layer = settings.use_top_layer,
            "CPML configured"
        );
        Self {
            extension: Extension::homogeneous(Property::Velocity, settings.use_top_layer, hl, bl),
            settings,
            half_length: hl,
            boundary_length: bl,
            first: params.half_length.first_derivative(),
            second: params.half_length.second_derivative(),
            profile_x: DampingProfile::default(),
            profile_z: DampingProfile::default(),
            profile_y: DampingProfile::default(),
            memory: None,
        }
    }

    /// Damping profile along x, empty until the model is extended
    pub fn profile_x(&self) -> &DampingProfile {
        &self.profile_x
    }

    /// Damping profile along z, empty until the model is extended
    pub fn profile_z(&self) -> &DampingProfile {
        &self.profile_z
    }

    /// Recompute the damping profiles and reset the memory variables
    fn prepare(&mut self, grid: &GridBox) -> Result<(), ConfigurationError> {
        grid.expect_formulation(self.name(), Formulation::AcousticSecond)?;
        let dt = grid.dt;
        // velocity holds v² dt² after preprocessing
        let max_velocity = (grid.velocity.max_value() / (dt * dt)).sqrt();
        let (bl, cells, settings) = (self.boundary_length, grid.cells, self.settings.clone());
        let profile = |spacing: f32| {
            let formulation = Formulation::AcousticSecond;
            DampingProfile::new(bl, spacing, dt, max_velocity, &settings, formulation)
        };
        self.profile_x = profile(cells.dx);
        self.profile_z = profile(cells.dz);
        self.profile_y = profile(cells.dy);
        self.reset_memory(grid.window_size());
        debug!(max_velocity, "CPML damping profiles computed");
        Ok(())
    }

    fn reset_memory(&mut self, size: GridSize) {
        let width = self.boundary_length + 2 * self.half_length;
        match self.memory.as_mut() {
            Some(memory) if memory.size == size => memory.clear(),
            _ => self.memory = Some(CpmlMemory::new(size, width)),
        }
    }
}

/// `aux_1 = a aux_1 + b dp/dx` over one x slab
fn first_aux_x(sweep: &Sweep<'_>, profile: &DampingProfile, inv_h: f32, aux_1: &mut [f32], side: Side) {
    let Sweep { size, hl, bl, width, .. } = *sweep;
    let positions = side.positions(size.nx, hl, bl);
    let y_range = sweep.y_range();
    aux_1
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(r, aux_row)| {
            let (iy, iz) = (r / size.nz, r % size.nz);
            if !y_range.contains(&iy) || !sweep.interior(iz, size.nz) {
                return;
            }
            let base = size.index(0, iy, iz);
            for ix in positions.clone() {
                let c = side.coefficient(ix, size.nx, hl, bl);
                let a = side.slab(ix, size.nx, hl, bl);
                let value = sweep.first_derivative(sweep.prev, base + ix, 1, inv_h);
                aux_row[a] = profile.a[c] * aux_row[a] + profile.b[c] * value;
            }
        });
}

fn cpml_value_x(
    sweep: &Sweep<'_>,
    profile: &DampingProfile,
    inv_h: f32,
    memory: &mut FaceMemory,
    curr: &mut [f32],
    side: Side,
) {
    let Sweep { size, hl, bl, width, .. } = *sweep;
    let positions = side.positions(size.nx, hl, bl);
    let y_range = sweep.y_range();
    let s = side as usize;
    let aux_1 = memory.aux_1[s].as_slice();
    curr.par_chunks_mut(size.nx)
        .zip(memory.aux_2[s].par_chunks_mut(width))
        .enumerate()
        .for_each(|(r, (row, aux_2_row))| {
            let (iy, iz) = (r / size.nz, r % size.nz);
            if !y_range.contains(&iy) || !sweep.interior(iz, size.nz) {
                return;
            }
            let base = size.index(0, iy, iz);
            for ix in positions.clone() {
                let c = side.coefficient(ix, size.nx, hl, bl);
                let a = side.slab(ix, size.nx, hl, bl);
                let pressure_term = sweep.second_derivative(base + ix, 1, inv_h * inv_h);
                let d_first = sweep.first_derivative(aux_1, r * width + a, 1, inv_h);
                let delta = sweep.correction(profile, c, pressure_term, d_first, &mut aux_2_row[a]);
                row[ix] += sweep.velocity[base + ix] * delta;
            }
        });
}

/// z slabs are stored per y plane as `width` rows of `nx`
fn first_aux_z(sweep: &Sweep<'_>, profile: &DampingProfile, inv_h: f32, aux_1: &mut [f32], side: Side) {
    let Sweep { size, hl, bl, width, .. } = *sweep;
    let positions = side.positions(size.nz, hl, bl);
    let y_range = sweep.y_range();
    let nx = size.nx;
    aux_1
        .par_chunks_mut(nx * width)
        .enumerate()
        .for_each(|(iy, plane)| {
            if !y_range.contains(&iy) {
                return;
            }
            for iz in positions.clone() {
                let c = side.coefficient(iz, size.nz, hl, bl);
                let a = side.slab(iz, size.nz, hl, bl);
                let base = size.index(0, iy, iz);
                for ix in hl..nx - hl {
                    let value = sweep.first_derivative(sweep.prev, base + ix, nx, inv_h);
                    let cell = &mut plane[a * nx + ix];
                    *cell = profile.a[c] * *cell + profile.b[c] * value;
                }
            }
        });
}

fn cpml_value_z(
    sweep: &Sweep<'_>,
    profile: &DampingProfile,
    inv_h: f32,
    memory: &mut FaceMemory,
    curr: &mut [f32],
    side: Side,
) {
    let Sweep { size, hl, bl, width, .. } = *sweep;
    let positions = side.positions(size.nz, hl, bl);
    let y_range = sweep.y_range();
    let (nx, nz) = (size.nx, size.nz);
    let s = side as usize;
    let aux_1 = memory.aux_1[s].as_slice();
    curr.par_chunks_mut(nx * nz)
        .zip(memory.aux_2[s].par_chunks_mut(nx * width))
        .enumerate()
        .for_each(|(iy, (plane, aux_2_plane))| {
            if !y_range.contains(&iy) {
                return;
            }
            let aux_1_plane = &aux_1[iy * nx * width..(iy + 1) * nx * width];
            for iz in positions.clone() {
                let c = side.coefficient(iz, nz, hl, bl);
                let a = side.slab(iz, nz, hl, bl);
                let base = size.index(0, iy, iz);
                for ix in hl..nx - hl {
                    let pressure_term = sweep.second_derivative(base + ix, nx, inv_h * inv_h);
                    let d_first = sweep.first_derivative(aux_1_plane, a * nx + ix, nx, inv_h);
                    let delta = sweep.correction(
                        profile,
                        c,
                        pressure_term,
                        d_first,
                        &mut aux_2_plane[a * nx + ix],
                    );
                    plane[iz * nx + ix] += sweep.velocity[base + ix] * delta;
                }
            }
        });
}

/// y slabs are stored as `width` planes of `nx * nz`
fn first_aux_y(sweep: &Sweep<'_>, profile: &DampingProfile, inv_h: f32, aux_1: &mut [f32], side: Side) {
    let Sweep { size, hl, bl, .. } = *sweep;
    let (nx, nz) = (size.nx, size.nz);
    let plane_len = nx * nz;
    for iy in side.positions(size.ny, hl, bl) {
        let c = side.coefficient(iy, size.ny, hl, bl);
        let a = side.slab(iy, size.ny, hl, bl);
        aux_1[a * plane_len..(a + 1) * plane_len]
            .par_chunks_mut(nx)
            .enumerate()
            .for_each(|(iz, aux_row)| {
                if !sweep.interior(iz, nz) {
                    return;
                }
                let base = size.index(0, iy, iz);
                for ix in hl..nx - hl {
                    let value = sweep.first_derivative(sweep.prev, base + ix, plane_len, inv_h);
                    aux_row[ix] = profile.a[c] * aux_row[ix] + profile.b[c] * value;
                }
            });
    }
}

fn cpml_value_y(
    sweep: &Sweep<'_>,
    profile: &DampingProfile,
    inv_h: f32,
    memory: &mut FaceMemory,
    curr: &mut [f32],
    side: Side,
) {
    let Sweep { size, hl, bl, .. } = *sweep;
    let (nx, nz) = (size.nx, size.nz);
    let plane_len = nx * nz;
    let s = side as usize;
    let aux_1 = memory.aux_1[s].as_slice();
    let aux_2 = &mut memory.aux_2[s];
    for iy in side.positions(size.ny, hl, bl) {
        let c = side.coefficient(iy, size.ny, hl, bl);
        let a = side.slab(iy, size.ny, hl, bl);
        let plane = &mut curr[iy * plane_len..(iy + 1) * plane_len];
        let aux_2_plane = &mut aux_2[a * plane_len..(a + 1) * plane_len];
        plane
            .par_chunks_mut(nx)
            .zip(aux_2_plane.par_chunks_mut(nx))
            .enumerate()
            .for_each(|(iz, (row, aux_2_row))| {
                if !sweep.interior(iz, nz) {
                    return;
                }
                let base = size.index(0, iy, iz);
                let aux_base = a * plane_len + iz * nx;
                for ix in hl..nx - hl {
                    let pressure_term =
                        sweep.second_derivative(base + ix, plane_len, inv_h * inv_h);
                    let d_first = sweep.first_derivative(aux_1, aux_base + ix, plane_len, inv_h);
                    let delta =
                        sweep.correction(profile, c, pressure_term, d_first, &mut aux_2_row[ix]);
                    row[ix] += sweep.velocity[base + ix] * delta;
                }
            });
    }
}

impl BoundaryManager for CpmlBoundaryManager {
    fn name(&self) -> &'static str {
        "CPMLBoundaryManager"
    }

    fn extend_model(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        grid.expect_formulation(self.name(), Formulation::AcousticSecond)?;
        self.extension.extend_property(grid)?;
        self.prepare(grid)
    }

    fn re_extend_model(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        grid.expect_formulation(self.name(), Formulation::AcousticSecond)?;
        self.extension.re_extend_property(grid)?;
        self.prepare(grid)
    }

    fn adjust_model_for_backward(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        grid.expect_formulation(self.name(), Formulation::AcousticSecond)?;
        self.extension.adjust_property_for_backward(grid)?;
        self.reset_memory(grid.window_size());
        Ok(())
    }

    fn apply_boundary(
        &mut self,
        grid: &mut GridBox,
        phase: StepPhase,
    ) -> Result<(), ConfigurationError> {
        if phase != StepPhase::Pressure || self.boundary_length == 0 {
            return Ok(());
        }
        let name = self.name();
        let parts = grid.parts_mut();
        let Wavefields::Second(buffers) = parts.wavefields else {
            return Err(ConfigurationError::GridMismatch {
                component: name,
                expected: Formulation::AcousticSecond,
                found: Formulation::Staggered,
            });
        };
        if self.memory.as_ref().map(|m| m.size) != Some(parts.size) {
            self.reset_memory(parts.size);
        }
        let Some(memory) = self.memory.as_mut() else {
            return Ok(());
        };
        let (prev, curr) = buffers.prev_and_curr_mut();
        let sweep = Sweep {
            size: parts.size,
            hl: self.half_length,
            bl: self.boundary_length,
            width: self.boundary_length + 2 * self.half_length,
            prev,
            velocity: parts.velocity,
            first: self.first,
            second: self.second,
        };
        let (inv_dx, inv_dz, inv_dy) = (
            1.0 / parts.cells.dx,
            1.0 / parts.cells.dz,
            1.0 / parts.cells.dy,
        );
        let (px, pz, py) = (&self.profile_x, &self.profile_z, &self.profile_y);

        for side in [Side::Far, Side::Near] {
            first_aux_x(&sweep, px, inv_dx, &mut memory.x.aux_1[side as usize], side);
            first_aux_z(&sweep, pz, inv_dz, &mut memory.z.aux_1[side as usize], side);
        }
        for side in [Side::Far, Side::Near] {
            cpml_value_x(&sweep, px, inv_dx, &mut memory.x, curr, side);
            cpml_value_z(&sweep, pz, inv_dz, &mut memory.z, curr, side);
        }
        if let Some(y) = memory.y.as_mut() {
            for side in [Side::Far, Side::Near] {
                first_aux_y(&sweep, py, inv_dy, &mut y.aux_1[side as usize], side);
            }
            for side in [Side::Far, Side::Near] {
                cpml_value_y(&sweep, py, inv_dy, y, curr, side);
            }
        }
        Ok(())
    }

    fn is_reversible(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;
    use crate::parameters::HalfLength;
    use approx::assert_relative_eq;

    #[test]
    fn test_profile_grows_outward() {
        let settings = CpmlSettings {
            relax_cp: Some(1.0),
            ..CpmlSettings::default()
        };
        let profile =
            DampingProfile::new(10, 10.0, 1e-3, 2000.0, &settings, Formulation::Staggered);
        assert_eq!(profile.a.len(), 10);
        // outermost layer damps hardest
        assert!(profile.a.windows(2).all(|w| w[0] > w[1]));
        assert!(profile.b.iter().all(|&b| b < 0.0));

        let d0 = -(0.1_f32).ln() * (3.0 * 2000.0 / (10.0 * 10.0)) / 10.0;
        let damping = 100.0 * d0;
        let a = (-1e-3 * (damping + 0.1_f32)).exp();
        assert_relative_eq!(profile.a[9], a, epsilon = 1e-6);
        assert_relative_eq!(profile.b[9], damping / (damping + 0.1) * (a - 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_zero_boundary_length_is_empty() {
        let profile = DampingProfile::new(
            0,
            10.0,
            1e-3,
            2000.0,
            &CpmlSettings::default(),
            Formulation::AcousticSecond,
        );
        assert!(profile.a.is_empty());
    }

    #[test]
    fn test_side_mapping_mirrors() {
        // n = 20, hl = 2, bl = 4: near padding [2, 6), far padding [14, 18)
        assert_eq!(Side::Near.positions(20, 2, 4), 2..6);
        assert_eq!(Side::Far.positions(20, 2, 4), 14..18);
        assert_eq!(Side::Near.coefficient(2, 20, 2, 4), 3);
        assert_eq!(Side::Far.coefficient(17, 20, 2, 4), 3);
        assert_eq!(Side::Near.slab(5, 20, 2, 4), 5);
        assert_eq!(Side::Far.slab(14, 20, 2, 4), 2);
    }

    #[test]
    fn test_second_order_relaxation_defaults_to_a_tenth() {
        let params = ComputationParameters::new(HalfLength::O2, 6);
        let mut grid = ModelBuilder::homogeneous(12, 1, 12, 10.0, 2000.0)
            .build(&params)
            .unwrap();
        let profile_with = |relax_cp: Option<f32>, grid: &mut GridBox| {
            let settings = CpmlSettings {
                relax_cp,
                ..CpmlSettings::default()
            };
            let mut cpml = CpmlBoundaryManager::new(&params, settings);
            cpml.extend_model(grid).unwrap();
            cpml.profile_x().clone()
        };
        let default = profile_with(None, &mut grid);
        assert_eq!(default, profile_with(Some(0.1), &mut grid));
        let stronger = profile_with(Some(1.0), &mut grid);
        // outermost layer decays less with the smaller relaxation
        assert!(default.a[5] > stronger.a[5]);
    }

    #[test]
    fn test_interior_untouched_and_padding_corrected() {
        let params = ComputationParameters::new(HalfLength::O4, 6);
        let mut grid = ModelBuilder::homogeneous(12, 1, 12, 10.0, 2000.0)
            .build(&params)
            .unwrap();
        let mut cpml = CpmlBoundaryManager::new(&params, CpmlSettings::default());
        cpml.extend_model(&mut grid).unwrap();
        assert_eq!(cpml.profile_x().a.len(), 6);

        let size = grid.window_size();
        {
            let buffers = grid.pressure_buffers_mut("test").unwrap();
            for z in 0..size.nz {
                for x in 0..size.nx {
                    // a ramp along x so the first derivative is non-zero
                    buffers.prev_mut().set(x, 0, z, x as f32);
                }
            }
        }
        let before = grid.pressure_current().clone();
        cpml.apply_boundary(&mut grid, StepPhase::Pressure).unwrap();
        let after = grid.pressure_current();

        let interior = size.nx / 2;
        assert_eq!(after.get(interior, 0, interior), before.get(interior, 0, interior));
        // outermost near-x padding column of an interior row
        assert_ne!(after.get(2, 0, interior), before.get(2, 0, interior));
        // halo is never written
        assert_eq!(after.get(0, 0, interior), before.get(0, 0, interior));
    }

    #[test]
    fn test_rejects_staggered_grid() {
        let params = ComputationParameters::new(HalfLength::O2, 4);
        let mut grid = ModelBuilder::homogeneous(8, 1, 8, 10.0, 1500.0)
            .formulation(Formulation::Staggered)
            .build(&params)
            .unwrap();
        let mut cpml = CpmlBoundaryManager::new(&params, CpmlSettings::default());
        assert!(matches!(
            cpml.extend_model(&mut grid),
            Err(ConfigurationError::GridMismatch { .. })
        ));
    }
}
