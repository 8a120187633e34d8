//! Run-wide computation parameters and finite-difference stencils
//!
//! The stencil radius ("half length") selects one of five coefficient sets.
//! Orders 2, 4, 8, 12 and 16 correspond to half lengths 1, 2, 4, 6 and 8.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::grid::CellDimensions;

/// Second-derivative central coefficients, `[c0, c1, ..., c_hl]`
const SECOND_DERIVATIVE_HL1: [f32; 2] = [-2.0, 1.0];
const SECOND_DERIVATIVE_HL2: [f32; 3] = [-2.5, 1.33333333333, -0.08333333333];
const SECOND_DERIVATIVE_HL4: [f32; 5] = [-2.847222222, 1.6, -0.2, 2.53968e-2, -1.785714e-3];
const SECOND_DERIVATIVE_HL6: [f32; 7] = [
    -2.98277777778,
    1.71428571429,
    -0.26785714285,
    0.05291005291,
    -0.00892857142,
    0.00103896103,
    -0.00006012506,
];
const SECOND_DERIVATIVE_HL8: [f32; 9] = [
    -3.05484410431,
    1.77777777778,
    -0.311111111111,
    0.0754208754209,
    -0.0176767676768,
    0.00348096348096,
    -0.000518000518001,
    5.07429078858e-05,
    -2.42812742813e-06,
];

/// First-derivative central coefficients, `[c0, c1, ..., c_hl]`
const FIRST_DERIVATIVE_HL1: [f32; 2] = [0.0, 0.5];
const FIRST_DERIVATIVE_HL2: [f32; 3] = [0.0, 2.0 / 3.0, -1.0 / 12.0];
const FIRST_DERIVATIVE_HL4: [f32; 5] = [0.0, 0.8, -0.2, 0.03809523809, -0.00357142857];
const FIRST_DERIVATIVE_HL6: [f32; 7] = [
    0.0,
    0.857142857143,
    -0.267857142857,
    0.0793650793651,
    -0.0178571428571,
    0.0025974025974,
    -0.000180375180375,
];
const FIRST_DERIVATIVE_HL8: [f32; 9] = [
    -6.93889390391e-17,
    0.888888888889,
    -0.311111111111,
    0.113131313131,
    -0.0353535353535,
    0.00870240870241,
    -0.001554001554,
    0.0001776001776,
    -9.71250971251e-06,
];

/// Staggered first-derivative coefficients, `[0, c1, ..., c_hl]`
const STAGGERED_HL1: [f32; 2] = [0.0, 1.0];
const STAGGERED_HL2: [f32; 3] = [0.0, 1.125, -0.041666666666666664];
const STAGGERED_HL4: [f32; 5] = [
    0.0,
    1.1962890625,
    -0.07975260416666667,
    0.0095703125,
    -0.0006975446428571429,
];
const STAGGERED_HL6: [f32; 7] = [
    0.0,
    1.2213363647460938,
    -0.09693145751953125,
    0.017447662353515626,
    -0.002967289515904018,
    0.0003590053982204861,
    -2.184781161221591e-05,
];
const STAGGERED_HL8: [f32; 9] = [
    0.0,
    1.2340910732746122,
    -0.10664984583854668,
    0.023036366701126076,
    -0.005342385598591385,
    0.0010772711700863268,
    -0.00016641887751492495,
    1.7021711056048922e-05,
    -8.523464202880773e-07,
];

/// Supported stencil radii
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum HalfLength {
    /// Second order
    O2,
    /// Fourth order
    O4,
    /// Eighth order
    O8,
    /// Twelfth order
    O12,
    /// Sixteenth order
    O16,
}

impl HalfLength {
    /// Stencil radius in cells
    #[inline]
    pub const fn get(self) -> usize {
        match self {
            HalfLength::O2 => 1,
            HalfLength::O4 => 2,
            HalfLength::O8 => 4,
            HalfLength::O12 => 6,
            HalfLength::O16 => 8,
        }
    }

    /// Second-derivative coefficients, `half_length + 1` entries
    pub const fn second_derivative(self) -> &'static [f32] {
        match self {
            HalfLength::O2 => &SECOND_DERIVATIVE_HL1,
            HalfLength::O4 => &SECOND_DERIVATIVE_HL2,
            HalfLength::O8 => &SECOND_DERIVATIVE_HL4,
            HalfLength::O12 => &SECOND_DERIVATIVE_HL6,
            HalfLength::O16 => &SECOND_DERIVATIVE_HL8,
        }
    }

    /// Central first-derivative coefficients, `half_length + 1` entries
    pub const fn first_derivative(self) -> &'static [f32] {
        match self {
            HalfLength::O2 => &FIRST_DERIVATIVE_HL1,
            HalfLength::O4 => &FIRST_DERIVATIVE_HL2,
            HalfLength::O8 => &FIRST_DERIVATIVE_HL4,
            HalfLength::O12 => &FIRST_DERIVATIVE_HL6,
            HalfLength::O16 => &FIRST_DERIVATIVE_HL8,
        }
    }

    /// Staggered first-derivative coefficients, `half_length + 1` entries
    /// with a zero at index 0
    pub const fn staggered(self) -> &'static [f32] {
        match self {
            HalfLength::O2 => &STAGGERED_HL1,
            HalfLength::O4 => &STAGGERED_HL2,
            HalfLength::O8 => &STAGGERED_HL4,
            HalfLength::O12 => &STAGGERED_HL6,
            HalfLength::O16 => &STAGGERED_HL8,
        }
    }
}

impl TryFrom<usize> for HalfLength {
    type Error = ConfigurationError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(HalfLength::O2),
            2 => Ok(HalfLength::O4),
            4 => Ok(HalfLength::O8),
            6 => Ok(HalfLength::O12),
            8 => Ok(HalfLength::O16),
            other => Err(ConfigurationError::UnsupportedHalfLength(other)),
        }
    }
}

impl From<HalfLength> for usize {
    fn from(value: HalfLength) -> Self {
        value.get()
    }
}

/// Immutable per-run configuration shared by every component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputationParameters {
    /// Stencil radius
    pub half_length: HalfLength,
    /// Absorbing layer thickness in cells, excluding the stencil halo
    pub boundary_length: usize,
    /// Peak source frequency (Hz)
    pub source_frequency: f32,
    /// CFL safety factor in (0, 1]
    pub dt_relax: f32,
    /// Cache block along x
    pub block_x: usize,
    /// Cache block along y
    pub block_y: usize,
    /// Cache block along z
    pub block_z: usize,
}

impl Default for ComputationParameters {
    fn default() -> Self {
        Self {
            half_length: HalfLength::O16,
            boundary_length: 20,
            source_frequency: 200.0,
            dt_relax: 0.4,
            block_x: 5120,
            block_y: 10,
            block_z: 15,
        }
    }
}

impl ComputationParameters {
    /// Parameters with the given stencil radius and boundary thickness,
    /// other knobs at their defaults
    pub fn new(half_length: HalfLength, boundary_length: usize) -> Self {
        Self {
            half_length,
            boundary_length,
            ..Self::default()
        }
    }

    /// Stencil radius in cells
    #[inline]
    pub fn half(&self) -> usize {
        self.half_length.get()
    }

    /// Reject out-of-range knobs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidParameter`] naming the first bad knob.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.dt_relax > 0.0 && self.dt_relax <= 1.0) {
            return Err(ConfigurationError::InvalidParameter {
                name: "dt_relax",
                message: format!("{} is outside (0, 1]", self.dt_relax),
            });
        }
        if !(self.source_frequency > 0.0) {
            return Err(ConfigurationError::InvalidParameter {
                name: "source_frequency",
                message: format!("{} must be positive", self.source_frequency),
            });
        }
        for (name, value) in [
            ("block_x", self.block_x),
            ("block_y", self.block_y),
            ("block_z", self.block_z),
        ] {
            if value == 0 {
                return Err(ConfigurationError::InvalidParameter {
                    name,
                    message: "cache block must be non-zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Largest stable time step for the second-derivative stencil.
    ///
    /// `dt = sqrt(4 / a2) / sqrt(1/dx² + 1/dz² [+ 1/dy²]) / max_velocity * dt_relax`
    /// where `a2 = |c0| + 2 Σ |ci|`. The y term only counts in 3D.
    pub fn stable_dt(&self, cells: &CellDimensions, max_velocity: f32, three_d: bool) -> f32 {
        let coeff = self.half_length.second_derivative();
        let a1 = 4.0_f32;
        let a2 = coeff[0].abs() + 2.0 * coeff[1..].iter().map(|c| c.abs()).sum::<f32>();
        let mut inv_sq = 1.0 / (cells.dx * cells.dx) + 1.0 / (cells.dz * cells.dz);
        if three_d {
            inv_sq += 1.0 / (cells.dy * cells.dy);
        }
        (a1 / a2).sqrt() / inv_sq.sqrt() / max_velocity * self.dt_relax
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ALL: [HalfLength; 5] = [
        HalfLength::O2,
        HalfLength::O4,
        HalfLength::O8,
        HalfLength::O12,
        HalfLength::O16,
    ];

    #[test]
    fn test_half_length_round_trip() {
        for hl in ALL {
            assert_eq!(HalfLength::try_from(hl.get()), Ok(hl));
        }
        assert_eq!(
            HalfLength::try_from(3),
            Err(ConfigurationError::UnsupportedHalfLength(3))
        );
    }

    #[test]
    fn test_coefficient_table_lengths() {
        for hl in ALL {
            assert_eq!(hl.second_derivative().len(), hl.get() + 1);
            assert_eq!(hl.first_derivative().len(), hl.get() + 1);
            assert_eq!(hl.staggered().len(), hl.get() + 1);
        }
    }

    #[test]
    fn test_second_derivative_annihilates_constants() {
        // c0 + 2 Σ ci = 0 for a consistent second-derivative stencil
        for hl in ALL {
            let c = hl.second_derivative();
            let sum = c[0] + 2.0 * c[1..].iter().sum::<f32>();
            assert!(sum.abs() < 1e-5, "hl={} sum={sum}", hl.get());
        }
    }

    #[test]
    fn test_staggered_is_consistent_first_derivative() {
        // Σ ci (2i - 1) = 1 so the stencil is exact for linear fields
        for hl in ALL {
            let c = hl.staggered();
            let moment: f32 = c
                .iter()
                .enumerate()
                .skip(1)
                .map(|(i, ci)| ci * (2 * i - 1) as f32)
                .sum();
            assert_relative_eq!(moment, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_stable_dt_matches_hand_calculation() {
        let params = ComputationParameters::new(HalfLength::O2, 0);
        let cells = CellDimensions::new(10.0, 10.0, 10.0);
        // a2 = 2 + 2 = 4, sqrt(4/4) = 1, sqrt(2/100) = 0.141421
        let dt = params.stable_dt(&cells, 2000.0, false);
        assert_relative_eq!(dt, 1.0 / (2.0_f32 / 100.0).sqrt() / 2000.0 * 0.4, epsilon = 1e-7);

        let dt3 = params.stable_dt(&cells, 2000.0, true);
        assert!(dt3 < dt);
    }

    #[test]
    fn test_validate_rejects_bad_knobs() {
        let mut params = ComputationParameters::default();
        assert!(params.validate().is_ok());

        params.dt_relax = 1.5;
        assert!(params.validate().is_err());

        params.dt_relax = 0.4;
        params.block_z = 0;
        assert!(matches!(
            params.validate(),
            Err(ConfigurationError::InvalidParameter { name: "block_z", .. })
        ));
    }

    #[test]
    fn test_half_length_deserializes_from_integer() {
        let hl: HalfLength = serde_json::from_str("4").unwrap();
        assert_eq!(hl, HalfLength::O8);
        assert!(serde_json::from_str::<HalfLength>("5").is_err());
    }
}
