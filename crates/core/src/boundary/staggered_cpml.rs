//! Convolutional PML for the staggered velocity-pressure system
//!
//! One memory variable per face and per phase. After the pressure update
//! the memory filters the divergence term of the particle velocity; after
//! the velocity update it filters the pressure gradient. The filtered term
//! is subtracted with the same material factor the kernel uses.

use rayon::prelude::*;
use tracing::{debug, info};

use super::cpml::DampingProfile;
use super::extension::{Extension, Property};
use super::{BoundaryManager, CpmlSettings, StepPhase};
use crate::error::ConfigurationError;
use crate::grid::{Formulation, GridBox, GridSize, Wavefields};
use crate::parameters::ComputationParameters;

/// Memory of one phase, near side at index 0
#[derive(Debug, Clone)]
struct PhaseMemory {
    x: [Vec<f32>; 2],
    z: [Vec<f32>; 2],
    y: Option<[Vec<f32>; 2]>,
}

impl PhaseMemory {
    fn new(size: GridSize, bl: usize) -> Self {
        let pair = |len: usize| [vec![0.0; len], vec![0.0; len]];
        Self {
            x: pair(bl * size.ny * size.nz),
            z: pair(bl * size.nx * size.ny),
            y: size.is_3d().then(|| pair(bl * size.nx * size.nz)),
        }
    }

    fn clear(&mut self) {
        let y = self.y.iter_mut().flatten();
        for aux in self.x.iter_mut().chain(self.z.iter_mut()).chain(y) {
            aux.fill(0.0);
        }
    }
}

#[derive(Debug, Clone)]
struct StaggeredMemory {
    size: GridSize,
    pressure: PhaseMemory,
    velocity: PhaseMemory,
}

/// Extents and stencil shared by every face
#[derive(Debug, Clone, Copy)]
struct FaceGeometry {
    size: GridSize,
    hl: usize,
    bl: usize,
    coeff: &'static [f32],
}

impl FaceGeometry {
    fn sweep<'a>(
        self,
        factor: &'a [f32],
        source: &'a [f32],
        lead: usize,
        profile: &'a DampingProfile,
        spacing: f32,
    ) -> FaceSweep<'a> {
        FaceSweep {
            size: self.size,
            hl: self.hl,
            bl: self.bl,
            coeff: self.coeff,
            factor,
            source,
            lead,
            profile,
            inv_h: 1.0 / spacing,
        }
    }
}

/// One face sweep: `source` is differentiated along the face normal and
/// the filtered result is removed from `target`
struct FaceSweep<'a> {
    size: GridSize,
    hl: usize,
    bl: usize,
    coeff: &'static [f32],
    factor: &'a [f32],
    source: &'a [f32],
    /// 0 when differentiating velocity for pressure, 1 for the reverse
    lead: usize,
    profile: &'a DampingProfile,
    inv_h: f32,
}

impl FaceSweep<'_> {
    #[inline]
    fn interior(&self, v: usize, n: usize) -> bool {
        v >= self.hl && v < n - self.hl
    }

    #[inline]
    fn y_range(&self) -> std::ops::Range<usize> {
        if self.size.is_3d() {
            self.hl..self.size.ny - self.hl
        } else {
            0..1
        }
    }

    /// Position along the normal of layer `l` (0 innermost-to-halo) on `side`
    #[inline]
    fn position(&self, side: usize, l: usize, n: usize) -> usize {
        if side == 0 {
            self.hl + l
        } else {
            n - 1 - self.hl - l
        }
    }

    #[inline]
    fn derivative(&self, off: usize, stride: usize) -> f32 {
        let src = self.source;
        let mut value = 0.0;
        for idx in 0..self.hl {
            value += self.coeff[idx + 1]
                * (src[off + (idx + self.lead) * stride] - src[off - (idx + 1 - self.lead) * stride]);
        }
        value
    }

    /// Advance the memory at layer `l` and return the filtered term
    #[inline]
    fn filter(&self, l: usize, value: f32, aux: &mut f32) -> f32 {
        let c = self.bl - 1 - l;
        *aux = self.profile.a[c] * *aux + self.profile.b[c] * self.inv_h * value;
        *aux
    }

    fn sweep_x(&self, target: &mut [f32], aux: &mut [f32], side: usize) {
        let size = self.size;
        let y_range = self.y_range();
        target
            .par_chunks_mut(size.nx)
            .zip(aux.par_chunks_mut(self.bl))
            .enumerate()
            .for_each(|(r, (row, aux_row))| {
                let (iy, iz) = (r / size.nz, r % size.nz);
                if !y_range.contains(&iy) || !self.interior(iz, size.nz) {
                    return;
                }
                let base = size.index(0, iy, iz);
                for (l, aux) in aux_row.iter_mut().enumerate() {
                    let ix = self.position(side, l, size.nx);
                    let value = self.derivative(base + ix, 1);
                    row[ix] -= self.factor[base + ix] * self.filter(l, value, aux);
                }
            });
    }

    fn sweep_z(&self, target: &mut [f32], aux: &mut [f32], side: usize) {
        let size = self.size;
        let (nx, nz) = (size.nx, size.nz);
        let y_range = self.y_range();
        target
            .par_chunks_mut(nx * nz)
            .zip(aux.par_chunks_mut(self.bl * nx))
            .enumerate()
            .for_each(|(iy, (plane, aux_plane))| {
                if !y_range.contains(&iy) {
                    return;
                }
                for l in 0..self.bl {
                    let iz = self.position(side, l, nz);
                    let base = size.index(0, iy, iz);
                    for ix in self.hl..nx - self.hl {
                        let value = self.derivative(base + ix, nx);
                        let delta = self.filter(l, value, &mut aux_plane[l * nx + ix]);
                        plane[iz * nx + ix] -= self.factor[base + ix] * delta;
                    }
                }
            });
    }

    fn sweep_y(&self, target: &mut [f32], aux: &mut [f32], side: usize) {
        let size = self.size;
        let (nx, nz) = (size.nx, size.nz);
        let plane_len = nx * nz;
        for (l, aux_plane) in aux.chunks_mut(plane_len).enumerate() {
            let iy = self.position(side, l, size.ny);
            target[iy * plane_len..(iy + 1) * plane_len]
                .par_chunks_mut(nx)
                .zip(aux_plane.par_chunks_mut(nx))
                .enumerate()
                .for_each(|(iz, (row, aux_row))| {
                    if !self.interior(iz, nz) {
                        return;
                    }
                    let base = size.index(0, iy, iz);
                    for ix in self.hl..nx - self.hl {
                        let value = self.derivative(base + ix, plane_len);
                        row[ix] -= self.factor[base + ix] * self.filter(l, value, &mut aux_row[ix]);
                    }
                });
        }
    }
}

/// CPML boundary manager for staggered grids
#[derive(Debug)]
pub struct StaggeredCpmlBoundaryManager {
    settings: CpmlSettings,
    extensions: [Extension; 2],
    half_length: usize,
    boundary_length: usize,
    coeff: &'static [f32],
    profile_x: DampingProfile,
    profile_z: DampingProfile,
    profile_y: DampingProfile,
    memory: Option<StaggeredMemory>,
}

impl StaggeredCpmlBoundaryManager {
    /// Create the manager with homogeneous velocity and density extensions
    pub fn new(params: &ComputationParameters, settings: CpmlSettings) -> Self {
        let (hl, bl) = (params.half(), params.boundary_length);
        let top = settings.use_top_layer;
        info!(
            reflect_coeff = settings.reflect_coeff,
            shift_ratio = settings.shift_ratio,
            relax_cp = settings.relax_cp(Formulation::Staggered),
            use_top_layer = top,
            "Staggered CPML configured"
        );
        Self {
            extensions: [
                Extension::homogeneous(Property::Velocity, top, hl, bl),
                Extension::homogeneous(Property::Density, top, hl, bl),
            ],
            settings,
            half_length: hl,
            boundary_length: bl,
            coeff: params.half_length.staggered(),
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

    fn prepare(&mut self, grid: &GridBox) {
        let (bl, dt, cells) = (self.boundary_length, grid.dt, grid.cells);
        let vmax = grid.max_velocity;
        let settings = self.settings.clone();
        let profile = |spacing: f32| {
            DampingProfile::new(bl, spacing, dt, vmax, &settings, Formulation::Staggered)
        };
        self.profile_x = profile(cells.dx);
        self.profile_z = profile(cells.dz);
        self.profile_y = profile(cells.dy);
        self.reset_memory(grid.window_size());
        debug!(max_velocity = vmax, "Staggered CPML damping profiles computed");
    }

    fn reset_memory(&mut self, size: GridSize) {
        match self.memory.as_mut() {
            Some(memory) if memory.size == size => {
                memory.pressure.clear();
                memory.velocity.clear();
            }
            _ => {
                let bl = self.boundary_length;
                self.memory = Some(StaggeredMemory {
                    size,
                    pressure: PhaseMemory::new(size, bl),
                    velocity: PhaseMemory::new(size, bl),
                });
            }
        }
    }
}

impl BoundaryManager for StaggeredCpmlBoundaryManager {
    fn name(&self) -> &'static str {
        "StaggeredCPMLBoundaryManager"
    }

    fn extend_model(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        grid.expect_formulation(self.name(), Formulation::Staggered)?;
        for extension in &mut self.extensions {
            extension.extend_property(grid)?;
        }
        self.prepare(grid);
        Ok(())
    }

    fn re_extend_model(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        grid.expect_formulation(self.name(), Formulation::Staggered)?;
        for extension in &mut self.extensions {
            extension.re_extend_property(grid)?;
        }
        self.prepare(grid);
        Ok(())
    }

    fn adjust_model_for_backward(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        grid.expect_formulation(self.name(), Formulation::Staggered)?;
        for extension in &mut self.extensions {
            extension.adjust_property_for_backward(grid)?;
        }
        self.reset_memory(grid.window_size());
        Ok(())
    }

    fn apply_boundary(
        &mut self,
        grid: &mut GridBox,
        phase: StepPhase,
    ) -> Result<(), ConfigurationError> {
        if self.boundary_length == 0 {
            return Ok(());
        }
        let name = self.name();
        let parts = grid.parts_mut();
        let (Wavefields::Staggered(fields), Some(density)) = (parts.wavefields, parts.density)
        else {
            return Err(ConfigurationError::GridMismatch {
                component: name,
                expected: Formulation::Staggered,
                found: Formulation::AcousticSecond,
            });
        };
        if self.memory.as_ref().map(|m| m.size) != Some(parts.size) {
            self.reset_memory(parts.size);
        }
        let Some(memory) = self.memory.as_mut() else {
            return Ok(());
        };
        let (size, cells, velocity) = (parts.size, parts.cells, parts.velocity);
        let geometry = FaceGeometry {
            size,
            hl: self.half_length,
            bl: self.boundary_length,
            coeff: self.coeff,
        };
        match phase {
            StepPhase::Pressure => {
                let (pressure, vx, vz, vy) = fields.current_with_velocities();
                let aux = &mut memory.pressure;
                let face = geometry.sweep(velocity, vx, 0, &self.profile_x, cells.dx);
                for side in 0..2 {
                    face.sweep_x(pressure, &mut aux.x[side], side);
                }
                let face = geometry.sweep(velocity, vz, 0, &self.profile_z, cells.dz);
                for side in 0..2 {
                    face.sweep_z(pressure, &mut aux.z[side], side);
                }
                if let (Some(vy), Some(aux_y)) = (vy, aux.y.as_mut()) {
                    let face = geometry.sweep(velocity, vy, 0, &self.profile_y, cells.dy);
                    for side in 0..2 {
                        face.sweep_y(pressure, &mut aux_y[side], side);
                    }
                }
            }
            StepPhase::Velocity => {
                let view = fields.velocity_view();
                let aux = &mut memory.velocity;
                let face = geometry.sweep(density, view.pressure, 1, &self.profile_x, cells.dx);
                for side in 0..2 {
                    face.sweep_x(view.velocity_x, &mut aux.x[side], side);
                }
                let face = geometry.sweep(density, view.pressure, 1, &self.profile_z, cells.dz);
                for side in 0..2 {
                    face.sweep_z(view.velocity_z, &mut aux.z[side], side);
                }
                if let (Some(vy), Some(aux_y)) = (view.velocity_y, aux.y.as_mut()) {
                    let face = geometry.sweep(density, view.pressure, 1, &self.profile_y, cells.dy);
                    for side in 0..2 {
                        face.sweep_y(vy, &mut aux_y[side], side);
                    }
                }
            }
        }
        Ok(())
    }

    fn is_reversible(&self) -> bool {
        false
    }
}
