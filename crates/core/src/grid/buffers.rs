//! Wavefield buffer arenas with role rotation
//!
//! Time levels are named roles (`prev`, `curr`, `next`) over a small arena of
//! owned fields. Rotation permutes the role-to-slot mapping and never copies.

use super::field::WaveField;

/// Pressure time levels of the second-order formulation
#[derive(Debug, Clone)]
pub enum PressureBuffers {
    /// Two physical buffers. `prev` and `next` share the slot that is not
    /// `curr`, so the stencil reads the previous value and overwrites it in place.
    TwoBuffer {
        /// Physical storage
        slots: [WaveField; 2],
        /// Slot holding the current frame
        curr: usize,
    },
    /// Three physical buffers. `phase` selects the cyclic role assignment
    /// `prev = phase`, `curr = phase + 1`, `next = phase + 2` (mod 3).
    ThreeBuffer {
        /// Physical storage
        slots: [WaveField; 3],
        /// Rotation phase in `0..3`
        phase: usize,
    },
}

/// Borrowed roles for one stencil sweep
pub struct PressureView<'a> {
    /// Previous frame, `None` when it lives in `next` (two-buffer mode)
    pub prev: Option<&'a [f32]>,
    /// Current frame
    pub curr: &'a [f32],
    /// Output frame
    pub next: &'a mut [f32],
}

impl PressureBuffers {
    /// Two zeroed buffers of the given size
    pub fn two(nx: usize, ny: usize, nz: usize) -> Self {
        PressureBuffers::TwoBuffer {
            slots: [WaveField::new(nx, ny, nz), WaveField::new(nx, ny, nz)],
            curr: 0,
        }
    }

    /// Three zeroed buffers of the given size
    pub fn three(nx: usize, ny: usize, nz: usize) -> Self {
        PressureBuffers::ThreeBuffer {
            slots: [
                WaveField::new(nx, ny, nz),
                WaveField::new(nx, ny, nz),
                WaveField::new(nx, ny, nz),
            ],
            phase: 0,
        }
    }

    /// Slot indices of `(prev, curr, next)`
    pub fn slot_indices(&self) -> (usize, usize, usize) {
        match self {
            PressureBuffers::TwoBuffer { curr, .. } => (1 - curr, *curr, 1 - curr),
            PressureBuffers::ThreeBuffer { phase, .. } => (*phase, (phase + 1) % 3, (phase + 2) % 3),
        }
    }

    /// True when `prev` and `next` alias the same slot
    pub fn is_two_buffer(&self) -> bool {
        matches!(self, PressureBuffers::TwoBuffer { .. })
    }

    fn slot(&self, index: usize) -> &WaveField {
        match self {
            PressureBuffers::TwoBuffer { slots, .. } => &slots[index],
            PressureBuffers::ThreeBuffer { slots, .. } => &slots[index],
        }
    }

    fn slot_mut(&mut self, index: usize) -> &mut WaveField {
        match self {
            PressureBuffers::TwoBuffer { slots, .. } => &mut slots[index],
            PressureBuffers::ThreeBuffer { slots, .. } => &mut slots[index],
        }
    }

    /// Previous frame
    pub fn prev(&self) -> &WaveField {
        self.slot(self.slot_indices().0)
    }

    /// Mutable previous frame
    pub fn prev_mut(&mut self) -> &mut WaveField {
        let index = self.slot_indices().0;
        self.slot_mut(index)
    }

    /// Current frame
    pub fn curr(&self) -> &WaveField {
        self.slot(self.slot_indices().1)
    }

    /// Mutable current frame
    pub fn curr_mut(&mut self) -> &mut WaveField {
        let index = self.slot_indices().1;
        self.slot_mut(index)
    }

    /// Output frame
    pub fn next(&self) -> &WaveField {
        self.slot(self.slot_indices().2)
    }

    /// Split the arena into the three roles for a stencil sweep
    pub fn view(&mut self) -> PressureView<'_> {
        match self {
            PressureBuffers::TwoBuffer { slots, curr } => {
                let [a, b] = slots;
                let (curr, next) = if *curr == 0 { (a, b) } else { (b, a) };
                PressureView {
                    prev: None,
                    curr: curr.as_slice(),
                    next: next.as_mut_slice(),
                }
            }
            PressureBuffers::ThreeBuffer { slots, phase } => {
                let [a, b, c] = slots;
                let (prev, curr, next) = match *phase {
                    0 => (a, b, c),
                    1 => (b, c, a),
                    _ => (c, a, b),
                };
                PressureView {
                    prev: Some(prev.as_slice()),
                    curr: curr.as_slice(),
                    next: next.as_mut_slice(),
                }
            }
        }
    }

    /// Previous frame next to a mutable current frame, for corrections
    /// applied after rotation
    pub fn prev_and_curr_mut(&mut self) -> (&[f32], &mut [f32]) {
        match self {
            PressureBuffers::TwoBuffer { slots, curr } => {
                let [a, b] = slots;
                let (curr, prev) = if *curr == 0 { (a, b) } else { (b, a) };
                (prev.as_slice(), curr.as_mut_slice())
            }
            PressureBuffers::ThreeBuffer { slots, phase } => {
                let [a, b, c] = slots;
                let (prev, curr) = match *phase {
                    0 => (a, b),
                    1 => (b, c),
                    _ => (c, a),
                };
                (prev.as_slice(), curr.as_mut_slice())
            }
        }
    }

    /// Every physical slot, in slot order
    pub fn slots_mut(&mut self) -> &mut [WaveField] {
        match self {
            PressureBuffers::TwoBuffer { slots, .. } => slots,
            PressureBuffers::ThreeBuffer { slots, .. } => slots,
        }
    }

    /// Promote `next` to `curr`.
    ///
    /// Two buffers: `prev = curr; curr = next; next = prev`.
    /// Three buffers: `tmp = next; next = prev; prev = curr; curr = tmp`.
    pub fn rotate(&mut self) {
        match self {
            PressureBuffers::TwoBuffer { curr, .. } => *curr = 1 - *curr,
            PressureBuffers::ThreeBuffer { phase, .. } => *phase = (*phase + 1) % 3,
        }
    }

    /// Zero every slot
    pub fn clear(&mut self) {
        match self {
            PressureBuffers::TwoBuffer { slots, .. } => slots.iter_mut().for_each(|s| s.fill(0.0)),
            PressureBuffers::ThreeBuffer { slots, .. } => {
                slots.iter_mut().for_each(|s| s.fill(0.0));
            }
        }
    }
}

/// Pressure and particle velocity of the staggered formulation
#[derive(Debug, Clone)]
pub struct StaggeredFields {
    pressure: [WaveField; 2],
    curr: usize,
    /// Particle velocity along x
    pub velocity_x: WaveField,
    /// Particle velocity along z
    pub velocity_z: WaveField,
    /// Particle velocity along y, present only in 3D
    pub velocity_y: Option<WaveField>,
}

/// Borrowed fields for the pressure phase
pub struct StaggeredPressureView<'a> {
    /// Current pressure
    pub curr: &'a [f32],
    /// Output pressure
    pub next: &'a mut [f32],
    /// Particle velocity along x
    pub velocity_x: &'a [f32],
    /// Particle velocity along z
    pub velocity_z: &'a [f32],
    /// Particle velocity along y (3D)
    pub velocity_y: Option<&'a [f32]>,
}

/// Borrowed fields for the velocity phase
pub struct StaggeredVelocityView<'a> {
    /// Current pressure
    pub pressure: &'a [f32],
    /// Particle velocity along x
    pub velocity_x: &'a mut [f32],
    /// Particle velocity along z
    pub velocity_z: &'a mut [f32],
    /// Particle velocity along y (3D)
    pub velocity_y: Option<&'a mut [f32]>,
}

impl StaggeredFields {
    /// Zeroed fields, with `velocity_y` only when `ny > 1`
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            pressure: [WaveField::new(nx, ny, nz), WaveField::new(nx, ny, nz)],
            curr: 0,
            velocity_x: WaveField::new(nx, ny, nz),
            velocity_z: WaveField::new(nx, ny, nz),
            velocity_y: (ny > 1).then(|| WaveField::new(nx, ny, nz)),
        }
    }

    /// Current pressure
    pub fn curr(&self) -> &WaveField {
        &self.pressure[self.curr]
    }

    /// Mutable current pressure
    pub fn curr_mut(&mut self) -> &mut WaveField {
        &mut self.pressure[self.curr]
    }

    /// Output pressure
    pub fn next(&self) -> &WaveField {
        &self.pressure[1 - self.curr]
    }

    /// Slot index of the current pressure
    pub fn curr_slot(&self) -> usize {
        self.curr
    }

    /// Swap `curr` and `next`
    pub fn swap(&mut self) {
        self.curr = 1 - self.curr;
    }

    /// Split for the pressure phase
    pub fn pressure_view(&mut self) -> StaggeredPressureView<'_> {
        let [a, b] = &mut self.pressure;
        let (curr, next) = if self.curr == 0 { (a, b) } else { (b, a) };
        StaggeredPressureView {
            curr: curr.as_slice(),
            next: next.as_mut_slice(),
            velocity_x: self.velocity_x.as_slice(),
            velocity_z: self.velocity_z.as_slice(),
            velocity_y: self.velocity_y.as_ref().map(WaveField::as_slice),
        }
    }

    /// Split for the velocity phase
    pub fn velocity_view(&mut self) -> StaggeredVelocityView<'_> {
        StaggeredVelocityView {
            pressure: self.pressure[self.curr].as_slice(),
            velocity_x: self.velocity_x.as_mut_slice(),
            velocity_z: self.velocity_z.as_mut_slice(),
            velocity_y: self.velocity_y.as_mut().map(WaveField::as_mut_slice),
        }
    }

    /// Mutable current pressure next to the particle velocities, for
    /// corrections applied after the pressure swap
    pub fn current_with_velocities(&mut self) -> (&mut [f32], &[f32], &[f32], Option<&[f32]>) {
        (
            self.pressure[self.curr].as_mut_slice(),
            self.velocity_x.as_slice(),
            self.velocity_z.as_slice(),
            self.velocity_y.as_ref().map(WaveField::as_slice),
        )
    }

    /// Every owned buffer: both pressure slots, then the velocity components
    pub fn buffers_mut(&mut self) -> impl Iterator<Item = &mut WaveField> + '_ {
        self.pressure
            .iter_mut()
            .chain(std::iter::once(&mut self.velocity_x))
            .chain(std::iter::once(&mut self.velocity_z))
            .chain(self.velocity_y.iter_mut())
    }

    /// Zero every buffer
    pub fn clear(&mut self) {
        self.pressure.iter_mut().for_each(|p| p.fill(0.0));
        self.velocity_x.fill(0.0);
        self.velocity_z.fill(0.0);
        if let Some(vy) = self.velocity_y.as_mut() {
            vy.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_buffer_roles() {
        let mut buffers = PressureBuffers::two(4, 1, 4);
        assert_eq!(buffers.slot_indices(), (1, 0, 1));
        buffers.rotate();
        assert_eq!(buffers.slot_indices(), (0, 1, 0));
        buffers.rotate();
        assert_eq!(buffers.slot_indices(), (1, 0, 1));
    }

    #[test]
    fn test_three_buffer_rotation_order() {
        let mut buffers = PressureBuffers::three(4, 1, 4);
        assert_eq!(buffers.slot_indices(), (0, 1, 2));
        buffers.rotate();
        // tmp = next; next = prev; prev = curr; curr = tmp
        assert_eq!(buffers.slot_indices(), (1, 2, 0));
        buffers.rotate();
        assert_eq!(buffers.slot_indices(), (2, 0, 1));
        buffers.rotate();
        assert_eq!(buffers.slot_indices(), (0, 1, 2));
    }

    #[test]
    fn test_view_matches_roles() {
        let mut buffers = PressureBuffers::three(2, 1, 2);
        buffers.rotate();
        {
            let view = buffers.view();
            view.next.fill(3.0);
        }
        // next was slot 0 in phase 1
        match &buffers {
            PressureBuffers::ThreeBuffer { slots, .. } => {
                assert!(slots[0].data.iter().all(|&v| v == 3.0));
            }
            PressureBuffers::TwoBuffer { .. } => unreachable!(),
        }
        assert!(buffers.next().data.iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_staggered_swap_and_y_component() {
        let mut fields = StaggeredFields::new(3, 1, 3);
        assert!(fields.velocity_y.is_none());
        fields.curr_mut().fill(1.0);
        fields.swap();
        assert!(fields.next().data.iter().all(|&v| v == 1.0));
        assert!(fields.curr().data.iter().all(|&v| v == 0.0));

        let fields3 = StaggeredFields::new(3, 3, 3);
        assert!(fields3.velocity_y.is_some());
    }
}
