//! Property extension into the absorbing padding
//!
//! The padding is the `boundary_length` cells between the stencil halo and
//! the model interior on every face. Extensions never touch the halo
//! (`[0, hl)` and `[n - hl, n)`) nor the model interior.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::ConfigurationError;
use crate::grid::{GridBox, WaveField};

/// Which property an extension fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    /// Velocity (wave-speed derived) array
    Velocity,
    /// Density derived array of the staggered formulation
    Density,
}

/// Fill policy
#[derive(Debug)]
pub enum ExtensionKind {
    /// Replicate the nearest interior layer outward
    Homogeneous {
        /// Also extend the top (z-min) face
        use_top_layer: bool,
    },
    /// Damped random perturbation of the nearest interior layer
    Random(Box<StdRng>),
    /// Zero padding
    Zero,
    /// Interior minimum everywhere except a zero top layer
    Min,
}

/// Padded region bounds of one field
#[derive(Debug, Clone, Copy)]
struct Bounds {
    nx: usize,
    nz: usize,
    three_d: bool,
    start_x: usize,
    end_x: usize,
    start_y: usize,
    end_y: usize,
    start_z: usize,
    end_z: usize,
    bl: usize,
}

impl Bounds {
    fn new(field: &WaveField, hl: usize, bl: usize) -> Self {
        let three_d = field.ny > 1;
        let (start_y, end_y) = if three_d { (hl, field.ny - hl) } else { (0, 1) };
        Self {
            nx: field.nx,
            nz: field.nz,
            three_d,
            start_x: hl,
            end_x: field.nx - hl,
            start_y,
            end_y,
            start_z: hl,
            end_z: field.nz - hl,
            bl,
        }
    }

    #[inline]
    fn at(&self, x: usize, y: usize, z: usize) -> usize {
        y * self.nx * self.nz + z * self.nx + x
    }

    /// True when `(x, y, z)` lies in the padding (outside the model interior
    /// but inside the halo)
    fn in_padding(&self, x: usize, y: usize, z: usize) -> bool {
        let inside = |v: usize, s: usize, e: usize| v >= s + self.bl && v < e - self.bl;
        let y_inside = !self.three_d || inside(y, self.start_y, self.end_y);
        !(inside(x, self.start_x, self.end_x) && y_inside && inside(z, self.start_z, self.end_z))
    }
}

/// An extension policy bound to one property
#[derive(Debug)]
pub struct Extension {
    kind: ExtensionKind,
    property: Property,
    half_length: usize,
    boundary_length: usize,
}

impl Extension {
    /// Homogeneous replication
    pub fn homogeneous(
        property: Property,
        use_top_layer: bool,
        half_length: usize,
        boundary_length: usize,
    ) -> Self {
        Self::with_kind(
            ExtensionKind::Homogeneous { use_top_layer },
            property,
            half_length,
            boundary_length,
        )
    }

    /// Randomized padding, seeded from the clock unless `seed` is given
    pub fn random(
        property: Property,
        seed: Option<u64>,
        half_length: usize,
        boundary_length: usize,
    ) -> Self {
        let seed = seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default()
        });
        debug!(seed, "Seeding random boundary extension");
        Self::with_kind(
            ExtensionKind::Random(Box::new(StdRng::seed_from_u64(seed))),
            property,
            half_length,
            boundary_length,
        )
    }

    /// Zero padding
    pub fn zero(property: Property, half_length: usize, boundary_length: usize) -> Self {
        Self::with_kind(ExtensionKind::Zero, property, half_length, boundary_length)
    }

    /// Interior-minimum padding
    pub fn min(property: Property, half_length: usize, boundary_length: usize) -> Self {
        Self::with_kind(ExtensionKind::Min, property, half_length, boundary_length)
    }

    fn with_kind(
        kind: ExtensionKind,
        property: Property,
        half_length: usize,
        boundary_length: usize,
    ) -> Self {
        Self {
            kind,
            property,
            half_length,
            boundary_length,
        }
    }

    /// Property this extension fills
    pub fn property(&self) -> Property {
        self.property
    }

    /// Extend the full-grid property once after model load.
    ///
    /// # Errors
    ///
    /// Fails when the grid does not carry the property.
    pub fn extend_property(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        let field = match self.property {
            Property::Velocity => &mut grid.velocity,
            Property::Density => grid
                .density
                .as_mut()
                .ok_or(ConfigurationError::MissingGrid("density"))?,
        };
        self.extend(field);
        Ok(())
    }

    /// Refresh the property for a new shot.
    ///
    /// Without a separate window copy only the top layer is re-extended;
    /// otherwise the window copy is extended in full.
    ///
    /// # Errors
    ///
    /// Fails when the grid does not carry the property.
    pub fn re_extend_property(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError> {
        let has_window = grid.has_window();
        let field = window_field(self.property, grid)?;
        if has_window {
            self.extend(field);
        } else {
            self.top_layer_extension(field);
        }
        Ok(())
    }

    /// Remove the top padding before the backward pass.
    ///
    /// # Errors
    ///
    /// Fails when the grid does not carry the property.
    pub fn adjust_property_for_backward(
        &mut self,
        grid: &mut GridBox,
    ) -> Result<(), ConfigurationError> {
        let field = window_field(self.property, grid)?;
        self.top_layer_remover(field);
        Ok(())
    }

    /// Fill the padding of `field` according to the policy
    pub fn extend(&mut self, field: &mut WaveField) {
        let bounds = Bounds::new(field, self.half_length, self.boundary_length);
        if bounds.bl == 0 {
            return;
        }
        match &mut self.kind {
            ExtensionKind::Homogeneous { use_top_layer } => {
                homogeneous(&mut field.data, &bounds, *use_top_layer);
            }
            ExtensionKind::Random(rng) => random(&mut field.data, &bounds, rng),
            ExtensionKind::Zero => constant(&mut field.data, &bounds, |_| 0.0),
            ExtensionKind::Min => {
                let target = interior_fold(&field.data, &bounds, 100000.0, f32::min);
                let top_end = bounds.start_z + bounds.bl;
                constant(&mut field.data, &bounds, |z| if z < top_end { 0.0 } else { target });
            }
        }
    }

    /// Re-apply the top face only (homogeneous with `use_top_layer`)
    pub fn top_layer_extension(&self, field: &mut WaveField) {
        if let ExtensionKind::Homogeneous {
            use_top_layer: true,
        } = self.kind
        {
            let b = Bounds::new(field, self.half_length, self.boundary_length);
            for y in b.start_y..b.end_y {
                let src = b.at(0, y, b.start_z + b.bl);
                for row in 0..b.bl {
                    let dst = b.at(0, y, b.start_z + row);
                    field.data.copy_within(src + b.start_x..src + b.end_x, dst + b.start_x);
                }
            }
        }
    }

    /// Zero the top face only (homogeneous with `use_top_layer`)
    pub fn top_layer_remover(&self, field: &mut WaveField) {
        if let ExtensionKind::Homogeneous {
            use_top_layer: true,
        } = self.kind
        {
            let b = Bounds::new(field, self.half_length, self.boundary_length);
            for y in b.start_y..b.end_y {
                for row in 0..b.bl {
                    let dst = b.at(0, y, b.start_z + row);
                    field.data[dst + b.start_x..dst + b.end_x].fill(0.0);
                }
            }
        }
    }
}

fn window_field(
    property: Property,
    grid: &mut GridBox,
) -> Result<&mut WaveField, ConfigurationError> {
    match property {
        Property::Velocity => Ok(grid.window_velocity_mut()),
        Property::Density => grid
            .window_density_mut()
            .ok_or(ConfigurationError::MissingGrid("density")),
    }
}

/// y faces (3D), then x faces, then z faces
fn homogeneous(data: &mut [f32], b: &Bounds, use_top_layer: bool) {
    let bl = b.bl;
    if b.three_d {
        for depth in 0..bl {
            for z in b.start_z..b.end_z {
                let lo_src = b.at(0, b.start_y + bl, z);
                let lo_dst = b.at(0, b.start_y + depth, z);
                data.copy_within(lo_src + b.start_x..lo_src + b.end_x, lo_dst + b.start_x);
                let hi_src = b.at(0, b.end_y - 1 - bl, z);
                let hi_dst = b.at(0, b.end_y - 1 - depth, z);
                data.copy_within(hi_src + b.start_x..hi_src + b.end_x, hi_dst + b.start_x);
            }
        }
    }
    for y in b.start_y..b.end_y {
        for z in b.start_z..b.end_z {
            let row = b.at(0, y, z);
            let lo = data[row + b.start_x + bl];
            let hi = data[row + b.end_x - 1 - bl];
            data[row + b.start_x..row + b.start_x + bl].fill(lo);
            data[row + b.end_x - bl..row + b.end_x].fill(hi);
        }
    }
    for y in b.start_y..b.end_y {
        for r in 0..bl {
            if use_top_layer {
                let src = b.at(0, y, b.start_z + bl);
                let dst = b.at(0, y, b.start_z + r);
                data.copy_within(src + b.start_x..src + b.end_x, dst + b.start_x);
            }
            let src = b.at(0, y, b.end_z - 1 - bl);
            let dst = b.at(0, y, b.end_z - 1 - r);
            data.copy_within(src + b.start_x..src + b.end_x, dst + b.start_x);
        }
    }
}

/// Fold over the model interior (inside the padding)
fn interior_fold(data: &[f32], b: &Bounds, init: f32, f: fn(f32, f32) -> f32) -> f32 {
    let (ys, ye) = if b.three_d {
        (b.start_y + b.bl, b.end_y - b.bl)
    } else {
        (0, 1)
    };
    let mut acc = init;
    for y in ys..ye {
        for z in b.start_z + b.bl..b.end_z - b.bl {
            let row = b.at(0, y, z);
            for x in b.start_x + b.bl..b.end_x - b.bl {
                acc = f(acc, data[row + x]);
            }
        }
    }
    acc
}

/// Set every padding cell to `value(z)`
fn constant(data: &mut [f32], b: &Bounds, value: impl Fn(usize) -> f32) {
    for y in b.start_y..b.end_y {
        for z in b.start_z..b.end_z {
            let v = value(z);
            for x in b.start_x..b.end_x {
                if b.in_padding(x, y, z) {
                    data[b.at(x, y, z)] = v;
                }
            }
        }
    }
}

/// Faces then corners, each padding cell becoming
/// `|reference - r * (bl - depth) / bl * max|` with a zero top face
fn random(data: &mut [f32], b: &Bounds, rng: &mut StdRng) {
    let bl = b.bl;
    let blf = bl as f32;
    let max = interior_fold(data, b, 0.0, f32::max);
    let mut jitter = |depth: usize| rng.random::<f32>() * ((bl - depth) as f32 / blf) * max;

    if b.three_d {
        for depth in 0..bl {
            for z in b.start_z..b.end_z {
                for x in b.start_x..b.end_x {
                    let r = data[b.at(x, b.start_y + bl, z)];
                    data[b.at(x, b.start_y + depth, z)] = (r - jitter(depth)).abs();
                    let r = data[b.at(x, b.end_y - 1 - bl, z)];
                    data[b.at(x, b.end_y - 1 - depth, z)] = (r - jitter(depth)).abs();
                }
            }
        }
    }
    for y in b.start_y..b.end_y {
        for z in b.start_z..b.end_z {
            for col in 0..bl {
                let r = data[b.at(b.start_x + bl, y, z)];
                data[b.at(b.start_x + col, y, z)] = (r - jitter(col)).abs();
                let r = data[b.at(b.end_x - 1 - bl, y, z)];
                data[b.at(b.end_x - 1 - col, y, z)] = (r - jitter(col)).abs();
            }
        }
    }
    for y in b.start_y..b.end_y {
        for row in 0..bl {
            for x in b.start_x..b.end_x {
                data[b.at(x, y, b.start_z + row)] = 0.0;
                let r = data[b.at(x, y, b.end_z - 1 - bl)];
                data[b.at(x, y, b.end_z - 1 - row)] = (r - jitter(row)).abs();
            }
        }
    }
    // x-z corners
    for y in b.start_y..b.end_y {
        for row in 0..bl {
            for col in 0..bl {
                let depth = row.min(col);
                let bottom = b.end_z - 1 - row;
                let reference = b.end_z - 1 - bl;
                data[b.at(b.start_x + col, y, b.start_z + row)] = 0.0;
                let r = data[b.at(b.start_x + bl, y, reference)];
                data[b.at(b.start_x + col, y, bottom)] = (r - jitter(depth)).abs();
                data[b.at(b.end_x - 1 - col, y, b.start_z + row)] = 0.0;
                let r = data[b.at(b.end_x - 1 - bl, y, reference)];
                data[b.at(b.end_x - 1 - col, y, bottom)] = (r - jitter(depth)).abs();
            }
        }
    }
    if !b.three_d {
        return;
    }
    // y-z corners
    for depth in 0..bl {
        for row in 0..bl {
            for x in b.start_x..b.end_x {
                let d = row.min(depth);
                let bottom = b.end_z - 1 - row;
                let reference = b.end_z - 1 - bl;
                data[b.at(x, b.start_y + depth, b.start_z + row)] = 0.0;
                let r = data[b.at(x, b.start_y + bl, reference)];
                data[b.at(x, b.start_y + depth, bottom)] = (r - jitter(d)).abs();
                data[b.at(x, b.end_y - 1 - depth, b.start_z + row)] = 0.0;
                let r = data[b.at(x, b.end_y - 1 - bl, reference)];
                data[b.at(x, b.end_y - 1 - depth, bottom)] = (r - jitter(d)).abs();
            }
        }
    }
    // x-y corners: zero under the top face, random below it
    for depth in 0..bl {
        for z in b.start_z..b.end_z {
            for col in 0..bl {
                let cells = [
                    (b.start_x + col, b.start_y + depth, b.start_x + bl, b.start_y + bl),
                    (b.start_x + col, b.end_y - 1 - depth, b.start_x + bl, b.end_y - 1 - bl),
                    (b.end_x - 1 - col, b.start_y + depth, b.end_x - 1 - bl, b.start_y + bl),
                    (b.end_x - 1 - col, b.end_y - 1 - depth, b.end_x - 1 - bl, b.end_y - 1 - bl),
                ];
                for (x, y, rx, ry) in cells {
                    data[b.at(x, y, z)] = if z < b.start_z + bl {
                        0.0
                    } else {
                        (data[b.at(rx, ry, z)] - jitter(col.min(depth))).abs()
                    };
                }
            }
        }
    }
}
