//! Reverse Time Migration Core Library
//!
//! Acoustic wave propagation for seismic imaging. Implements finite-difference
//! kernels for the second-order pressure equation and the first-order
//! staggered velocity-pressure system, absorbing boundaries, and the
//! strategies that re-supply the source wavefield during backward
//! propagation.
//!
//! ## Components
//!
//! - Kernels with stencil radii 1, 2, 4, 6 and 8 in 2D and 3D
//! - Boundaries: reflective, randomized, exponential sponge and CPML
//! - Forward collectors: full checkpointing (optionally compressed), reverse
//!   propagation and boundary-shell re-injection
//! - A shot loop with cross-correlation imaging, observation callbacks and
//!   named timers

// Grid state and model preparation
pub mod grid;
pub mod model;
pub mod parameters;

// Propagation components
pub mod boundary;
pub mod collector;
pub mod kernel;

// Shot loop
pub mod engine;

pub mod error;
pub mod profiler;

// Re-export the types most callers need
pub use boundary::{create_boundary_manager, BoundaryConfig, BoundaryManager, CpmlSettings};
pub use collector::{create_forward_collector, ForwardCollector, ForwardCollectorConfig};
pub use engine::{
    Callback, CallbackCollection, EngineConfig, Location, MigrationData, NormCallback,
    RickerSource, RtmEngine, Shot, ShotTraces,
};
pub use error::{ConfigurationError, Result, RtmError, StorageError};
pub use grid::{CellDimensions, Formulation, GridBox, GridSize, WaveField};
pub use kernel::{create_kernel, ComputationKernel, KernelMode};
pub use model::ModelBuilder;
pub use parameters::{ComputationParameters, HalfLength};
pub use profiler::Timer;
