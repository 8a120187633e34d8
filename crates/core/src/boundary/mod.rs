//! Absorbing boundary conditions
//!
//! A boundary manager owns the extension policies for the model properties
//! and any auxiliary memory its damping needs. Per shot it goes through
//! `re_extend_model`, forward stepping with `apply_boundary`,
//! `adjust_model_for_backward` and backward stepping with `apply_boundary`.
//!
//! # Example
//!
//! ```rust,ignore
//! use rtm_core::boundary::{create_boundary_manager, BoundaryConfig};
//!
//! let mut boundary =
//!     create_boundary_manager(&BoundaryConfig::default(), grid.formulation, &params)?;
//! boundary.extend_model(&mut grid)?;
//! ```

mod cpml;
pub mod extension;
mod none;
mod random;
mod sponge;
mod staggered_cpml;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigurationError;
use crate::grid::{Formulation, GridBox};
use crate::parameters::ComputationParameters;

pub use cpml::CpmlBoundaryManager;
pub use none::NoBoundaryManager;
pub use random::RandomBoundaryManager;
pub use sponge::SpongeBoundaryManager;
pub use staggered_cpml::StaggeredCpmlBoundaryManager;

/// Which half of a time step the boundary is applied after
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    /// After the pressure update (kernel id 0)
    Pressure,
    /// After the particle-velocity update of a staggered step (kernel id 1)
    Velocity,
}

/// Absorbing boundary condition
pub trait BoundaryManager: Send {
    /// Name used in logs and errors
    fn name(&self) -> &'static str;

    /// Extend the properties into the padding once after model load.
    ///
    /// # Errors
    ///
    /// Fails when the grid does not match the manager's formulation.
    fn extend_model(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError>;

    /// Prepare the properties and auxiliary memory for a new shot.
    ///
    /// # Errors
    ///
    /// Fails when the grid does not match the manager's formulation.
    fn re_extend_model(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError>;

    /// Prepare for the backward pass of the current shot.
    ///
    /// # Errors
    ///
    /// Fails when the grid does not match the manager's formulation.
    fn adjust_model_for_backward(&mut self, grid: &mut GridBox) -> Result<(), ConfigurationError>;

    /// Correct the wavefields after one phase of a kernel step.
    ///
    /// # Arguments
    ///
    /// * `grid` - Grid whose buffers were just rotated by the kernel
    /// * `phase` - Which update the kernel just finished
    ///
    /// # Errors
    ///
    /// Fails when the grid does not match the manager's formulation.
    fn apply_boundary(
        &mut self,
        grid: &mut GridBox,
        phase: StepPhase,
    ) -> Result<(), ConfigurationError>;

    /// False for managers whose damping cannot be run backwards in time
    fn is_reversible(&self) -> bool;
}

fn default_true() -> bool {
    true
}

/// CPML tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpmlSettings {
    /// Damp the top face as well
    pub use_top_layer: bool,
    /// Target reflection coefficient
    pub reflect_coeff: f32,
    /// Frequency shift of the complex stretching
    pub shift_ratio: f32,
    /// Damping profile scale; 0.1 on second-order grids and 1.0 on staggered
    /// grids when absent
    pub relax_cp: Option<f32>,
}

impl Default for CpmlSettings {
    fn default() -> Self {
        Self {
            use_top_layer: true,
            reflect_coeff: 0.1,
            shift_ratio: 0.1,
            relax_cp: None,
        }
    }
}

impl CpmlSettings {
    /// Damping profile scale used on grids of `formulation`
    pub fn relax_cp(&self, formulation: Formulation) -> f32 {
        self.relax_cp.unwrap_or(match formulation {
            Formulation::AcousticSecond => 0.1,
            Formulation::Staggered => 1.0,
        })
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let relax_cp = self.relax_cp.unwrap_or(1.0);
        let checks = [
            ("reflect_coeff", self.reflect_coeff, self.reflect_coeff > 0.0 && self.reflect_coeff < 1.0),
            ("shift_ratio", self.shift_ratio, self.shift_ratio > 0.0),
            ("relax_cp", relax_cp, relax_cp > 0.0),
        ];
        for (name, value, ok) in checks {
            if !ok {
                return Err(ConfigurationError::InvalidParameter {
                    name,
                    message: format!("{value} is out of range"),
                });
            }
        }
        Ok(())
    }
}

/// Boundary selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BoundaryConfig {
    /// Reflective walls
    None,
    /// Randomized padding
    Random {
        /// Fixed seed, clock-seeded when absent
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Exponential sponge
    Sponge {
        /// Damp the top face as well
        #[serde(default = "default_true")]
        use_top_layer: bool,
    },
    /// Convolutional PML
    Cpml(CpmlSettings),
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        BoundaryConfig::Sponge {
            use_top_layer: true,
        }
    }
}

impl BoundaryConfig {
    /// Short name used in configuration and errors
    pub fn name(&self) -> &'static str {
        match self {
            BoundaryConfig::None => "none",
            BoundaryConfig::Random { .. } => "random",
            BoundaryConfig::Sponge { .. } => "sponge",
            BoundaryConfig::Cpml(_) => "cpml",
        }
    }

    /// True when the boundary damps energy irreversibly
    pub fn is_absorbing(&self) -> bool {
        matches!(self, BoundaryConfig::Sponge { .. } | BoundaryConfig::Cpml(_))
    }

    /// Reject out-of-range knobs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidParameter`].
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            BoundaryConfig::Cpml(settings) => settings.validate(),
            _ => Ok(()),
        }
    }
}

/// Build the boundary manager for a formulation
///
/// # Arguments
///
/// * `config` - Which boundary and its knobs
/// * `formulation` - Wave equation of the grids it will manage
/// * `params` - Stencil radius and boundary thickness
///
/// # Errors
///
/// Returns [`ConfigurationError::InvalidParameter`] for out-of-range CPML knobs.
pub fn create_boundary_manager(
    config: &BoundaryConfig,
    formulation: Formulation,
    params: &ComputationParameters,
) -> Result<Box<dyn BoundaryManager>, ConfigurationError> {
    config.validate()?;
    let manager: Box<dyn BoundaryManager> = match (config, formulation) {
        (BoundaryConfig::None, _) => Box::new(NoBoundaryManager::new(formulation, params)),
        (BoundaryConfig::Random { seed }, _) => {
            Box::new(RandomBoundaryManager::new(formulation, params, *seed))
        }
        (BoundaryConfig::Sponge { use_top_layer }, _) => Box::new(SpongeBoundaryManager::new(
            formulation,
            params,
            *use_top_layer,
        )),
        (BoundaryConfig::Cpml(settings), Formulation::AcousticSecond) => {
            Box::new(CpmlBoundaryManager::new(params, settings.clone()))
        }
        (BoundaryConfig::Cpml(settings), Formulation::Staggered) => {
            Box::new(StaggeredCpmlBoundaryManager::new(params, settings.clone()))
        }
    };
    info!(
        boundary = manager.name(),
        %formulation,
        boundary_length = params.boundary_length,
        "Boundary manager created"
    );
    Ok(manager)
}
