//! Forward collectors
//!
//! A forward collector makes the source wavefield available again while the
//! receiver wavefield is propagated backwards. Frames are handed back in
//! reverse order: after the `k`-th [`ForwardCollector::fetch_forward`] the
//! current pressure of [`ForwardCollector::forward_grid`] equals the frame
//! that was current after forward step `nt - k`.
//!
//! Three strategies exist:
//!
//! - [`TwoPropagation`] stores every frame, spilling chunks to disk (raw or
//!   quantized and compressed) when they exceed the memory budget.
//! - [`ReversePropagation`] stores nothing and runs the wave equation
//!   backwards from the final forward state. Only valid for reversible
//!   boundaries.
//! - [`ReverseInjection`] runs the wave equation backwards as well, but
//!   overwrites the half-length shell around the model after every step
//!   with values recorded during the forward pass.
//!
//! Each strategy handles both formulations.

mod boundary_saver;
mod checkpoint;
mod reverse_injection;
mod reverse_propagation;
mod stepper;
mod two_propagation;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConfigurationError, Result};
use crate::grid::{Formulation, GridBox};
use crate::parameters::ComputationParameters;

pub use boundary_saver::BoundaryShell;
pub use checkpoint::{ChunkCodec, ChunkStore};
pub use reverse_injection::ReverseInjection;
pub use reverse_propagation::ReversePropagation;
pub use two_propagation::TwoPropagation;

/// Strategy that re-supplies forward frames during the backward pass
pub trait ForwardCollector {
    /// Name used in logs, timers and errors
    fn name(&self) -> &'static str;

    /// Prepare for a forward (`true`) or backward (`false`) pass.
    ///
    /// Both zero the main grid's wavefields. The backward call first captures
    /// whatever the strategy needs from the final forward state.
    ///
    /// # Errors
    ///
    /// Storage failures while flushing frames and grids of the wrong
    /// formulation.
    fn reset_grid(&mut self, main: &mut GridBox, forward_run: bool) -> Result<()>;

    /// Record the current forward frame; called before every forward step.
    ///
    /// # Errors
    ///
    /// Storage failures while spilling a full chunk.
    fn save_forward(&mut self, main: &GridBox) -> Result<()>;

    /// Move the forward grid one frame back in time.
    ///
    /// # Errors
    ///
    /// Storage failures while loading a chunk and kernel errors while
    /// re-simulating. A failed load never exposes a partial frame.
    fn fetch_forward(&mut self) -> Result<()>;

    /// Grid holding the most recently fetched frame, once the backward pass
    /// has been prepared
    fn forward_grid(&self) -> Option<&GridBox>;
}

/// Relative precision beyond which quantized values would not fit an `i32`
const MAX_PRECISION_BITS: f32 = 31.0;

fn default_write_path() -> PathBuf {
    PathBuf::from("results")
}

fn default_tolerance() -> f32 {
    0.01
}

fn default_true() -> bool {
    true
}

/// Forward collector selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ForwardCollectorConfig {
    /// Store every frame uncompressed
    Two {
        /// Directory for spilled chunks (`<write_path>/two_prop`)
        #[serde(default = "default_write_path")]
        write_path: PathBuf,
        /// In-memory budget for frames, unlimited when absent
        #[serde(default)]
        memory_budget_bytes: Option<u64>,
    },
    /// Store every frame, spilled chunks quantized and compressed
    TwoCompression {
        /// Directory for spilled chunks (`<write_path>/two_prop`)
        #[serde(default = "default_write_path")]
        write_path: PathBuf,
        /// In-memory budget for frames, unlimited when absent
        #[serde(default)]
        memory_budget_bytes: Option<u64>,
        /// Absolute error bound, or precision bits in relative mode
        #[serde(default = "default_tolerance")]
        zfp_tolerance: f32,
        /// Encode the frames of a chunk in parallel
        #[serde(default = "default_true")]
        zfp_parallel: bool,
        /// Interpret the tolerance relative to the frame maximum
        #[serde(default)]
        zfp_relative: bool,
    },
    /// Re-simulate backwards without storage
    Three,
    /// Re-simulate backwards, restoring the half-length shell from storage
    OptimalCheckpointing,
}

impl Default for ForwardCollectorConfig {
    fn default() -> Self {
        ForwardCollectorConfig::Two {
            write_path: default_write_path(),
            memory_budget_bytes: None,
        }
    }
}

impl ForwardCollectorConfig {
    /// Short name used in configuration and errors
    pub fn name(&self) -> &'static str {
        match self {
            ForwardCollectorConfig::Two { .. } => "two",
            ForwardCollectorConfig::TwoCompression { .. } => "two-compression",
            ForwardCollectorConfig::Three => "three",
            ForwardCollectorConfig::OptimalCheckpointing => "optimal-checkpointing",
        }
    }

    /// Reject out-of-range knobs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidParameter`].
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if let ForwardCollectorConfig::TwoCompression {
            zfp_tolerance,
            zfp_relative,
            ..
        } = self
        {
            if !(*zfp_tolerance > 0.0 && zfp_tolerance.is_finite()) {
                return Err(ConfigurationError::InvalidParameter {
                    name: "zfp_tolerance",
                    message: format!("{zfp_tolerance} must be positive"),
                });
            }
            if *zfp_relative && *zfp_tolerance > MAX_PRECISION_BITS {
                return Err(ConfigurationError::InvalidParameter {
                    name: "zfp_tolerance",
                    message: format!(
                        "{zfp_tolerance} precision bits exceed {MAX_PRECISION_BITS}"
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Build the forward collector for a formulation
///
/// # Errors
///
/// Returns [`ConfigurationError::InvalidParameter`] for out-of-range knobs.
pub fn create_forward_collector(
    config: &ForwardCollectorConfig,
    formulation: Formulation,
    params: &ComputationParameters,
) -> std::result::Result<Box<dyn ForwardCollector>, ConfigurationError> {
    config.validate()?;
    let collector: Box<dyn ForwardCollector> = match config {
        ForwardCollectorConfig::Two {
            write_path,
            memory_budget_bytes,
        } => Box::new(TwoPropagation::new(
            ChunkStore::new(write_path, ChunkCodec::Raw),
            *memory_budget_bytes,
        )),
        ForwardCollectorConfig::TwoCompression {
            write_path,
            memory_budget_bytes,
            zfp_tolerance,
            zfp_parallel,
            zfp_relative,
        } => {
            info!(
                zfp_tolerance,
                zfp_parallel, zfp_relative, "Compressed checkpoints enabled"
            );
            Box::new(TwoPropagation::new(
                ChunkStore::new(
                    write_path,
                    ChunkCodec::Quantized {
                        tolerance: *zfp_tolerance,
                        relative: *zfp_relative,
                        parallel: *zfp_parallel,
                    },
                ),
                *memory_budget_bytes,
            ))
        }
        ForwardCollectorConfig::Three => Box::new(ReversePropagation::new(formulation, params)),
        ForwardCollectorConfig::OptimalCheckpointing => {
            Box::new(ReverseInjection::new(formulation, params))
        }
    };
    info!(collector = collector.name(), %formulation, "Forward collector created");
    Ok(collector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_json() {
        let config: ForwardCollectorConfig =
            serde_json::from_str(r#"{"type":"two-compression"}"#).unwrap();
        assert_eq!(
            config,
            ForwardCollectorConfig::TwoCompression {
                write_path: PathBuf::from("results"),
                memory_budget_bytes: None,
                zfp_tolerance: 0.01,
                zfp_parallel: true,
                zfp_relative: false,
            }
        );
        let config: ForwardCollectorConfig =
            serde_json::from_str(r#"{"type":"optimal-checkpointing"}"#).unwrap();
        assert_eq!(config.name(), "optimal-checkpointing");
    }

    #[test]
    fn test_rejects_relative_precision_beyond_i32() {
        let config = |bits: f32| ForwardCollectorConfig::TwoCompression {
            write_path: PathBuf::from("results"),
            memory_budget_bytes: None,
            zfp_tolerance: bits,
            zfp_parallel: false,
            zfp_relative: true,
        };
        assert!(config(31.0).validate().is_ok());
        assert!(matches!(
            config(40.0).validate(),
            Err(ConfigurationError::InvalidParameter {
                name: "zfp_tolerance",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_non_positive_tolerance() {
        let config = ForwardCollectorConfig::TwoCompression {
            write_path: PathBuf::from("results"),
            memory_budget_bytes: None,
            zfp_tolerance: 0.0,
            zfp_parallel: false,
            zfp_relative: false,
        };
        assert!(matches!(
            create_forward_collector(
                &config,
                Formulation::AcousticSecond,
                &ComputationParameters::default()
            ),
            Err(ConfigurationError::InvalidParameter {
                name: "zfp_tolerance",
                ..
            })
        ));
    }
}
