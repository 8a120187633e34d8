//! Shot loop tying the components together
//!
//! `RtmEngine` owns one kernel, one boundary manager and one forward
//! collector. Per shot it places the window around the source, propagates
//! the source wavefield forward while the collector records it, then
//! propagates the recorded traces backwards and correlates the two
//! wavefields into the shot image before stacking it.
//!
//! # Example
//!
//! ```rust,ignore
//! use rtm_core::engine::{EngineConfig, RtmEngine, CallbackCollection};
//!
//! let mut engine = RtmEngine::new(EngineConfig::default())?;
//! let mut callbacks = CallbackCollection::new();
//! engine.initialize(&mut grid, &mut callbacks)?;
//! let image = engine.migrate(&mut grid, &shots, &mut callbacks)?;
//! ```

mod callbacks;
mod correlation;
mod source;
mod traces;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::boundary::{create_boundary_manager, BoundaryConfig, BoundaryManager};
use crate::collector::{create_forward_collector, ForwardCollector, ForwardCollectorConfig};
use crate::error::{ConfigurationError, Result};
use crate::grid::{Formulation, GridBox};
use crate::kernel::{create_kernel, ComputationKernel, KernelMode};
use crate::parameters::ComputationParameters;
use crate::profiler::Timer;

pub use callbacks::{Callback, CallbackCollection, NormCallback};
pub use correlation::{CrossCorrelation, MigrationData};
pub use source::{Location, RickerSource, SourceInjector};
pub use traces::{ShotTraces, TraceManager};

const NAME: &str = "RtmEngine";

/// Everything needed to assemble an engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wave equation
    pub formulation: Formulation,
    /// Stencil, boundary thickness, source frequency and cache blocks
    pub parameters: ComputationParameters,
    /// Absorbing boundary
    pub boundary: BoundaryConfig,
    /// Forward wavefield strategy
    pub collector: ForwardCollectorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            formulation: Formulation::AcousticSecond,
            parameters: ComputationParameters::default(),
            boundary: BoundaryConfig::default(),
            collector: ForwardCollectorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reject out-of-range knobs and unusable combinations.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidParameter`] for a bad knob and
    /// [`ConfigurationError::IncompatibleCollector`] when the storage-free
    /// collector is paired with a damping boundary.
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        self.parameters.validate()?;
        self.boundary.validate()?;
        self.collector.validate()?;
        if matches!(self.collector, ForwardCollectorConfig::Three) && self.boundary.is_absorbing() {
            return Err(ConfigurationError::IncompatibleCollector {
                collector: self.collector.name(),
                boundary: self.boundary.name(),
            });
        }
        Ok(())
    }
}

/// One shot to migrate: the source and the traces it produced
pub struct Shot {
    /// Source wavelet and position
    pub source: Box<dyn SourceInjector>,
    /// Recorded data
    pub traces: Box<dyn TraceManager>,
}

impl Shot {
    /// Shot from any source and trace manager
    pub fn new(
        source: impl SourceInjector + 'static,
        traces: impl TraceManager + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            traces: Box::new(traces),
        }
    }
}

/// Padding per side of the model, y only in 3D
fn padding(grid: &GridBox, params: &ComputationParameters) -> (usize, usize) {
    let pad = params.half() + params.boundary_length;
    let y_pad = if grid.grid_size.is_3d() { pad } else { 0 };
    (pad, y_pad)
}

/// Full-grid coordinates of a model location, `None` outside the model
fn full_coordinates(
    grid: &GridBox,
    params: &ComputationParameters,
    location: Location,
) -> Option<(usize, usize, usize)> {
    let (pad, y_pad) = padding(grid, params);
    let g = grid.grid_size;
    let full = (location.x + pad, location.y + y_pad, location.z + pad);
    let inside = full.0 < g.nx - pad && full.1 < g.ny - y_pad && full.2 < g.nz - pad;
    inside.then_some(full)
}

/// Window index of a model location, `None` outside the active window
fn window_cell(grid: &GridBox, params: &ComputationParameters, location: Location) -> Option<usize> {
    let (fx, fy, fz) = full_coordinates(grid, params, location)?;
    let window = grid.window;
    let x = fx.checked_sub(window.start_x)?;
    let y = fy.checked_sub(window.start_y)?;
    let z = fz.checked_sub(window.start_z)?;
    let w = window.size;
    (x < w.nx && y < w.ny && z < w.nz).then(|| w.index(x, y, z))
}

/// Centre the window on the source, clamped to the grid, and return the
/// source's window index
fn place_window(
    grid: &mut GridBox,
    params: &ComputationParameters,
    source: Location,
) -> std::result::Result<usize, ConfigurationError> {
    let (fx, fy, fz) = full_coordinates(grid, params, source).ok_or_else(|| {
        ConfigurationError::InvalidGeometry(format!(
            "source at ({}, {}, {}) lies outside the model",
            source.x, source.y, source.z
        ))
    })?;
    let w = grid.window_size();
    let g = grid.grid_size;
    let start = |full: usize, window: usize, limit: usize| {
        full.saturating_sub(window / 2).min(limit - window)
    };
    grid.setup_window(
        start(fx, w.nx, g.nx),
        start(fy, w.ny, g.ny),
        start(fz, w.nz, g.nz),
    )?;
    window_cell(grid, params, source).ok_or(ConfigurationError::MissingGrid("source cell"))
}

/// Kernel, boundary and collector of one engine
struct Propagation {
    kernel: Box<dyn ComputationKernel>,
    boundary: Box<dyn BoundaryManager>,
    collector: Box<dyn ForwardCollector>,
}

impl Propagation {
    fn forward(
        &mut self,
        grid: &mut GridBox,
        source: &dyn SourceInjector,
        cell: usize,
        timer: &Timer,
        callbacks: &mut dyn Callback,
    ) -> Result<()> {
        let _forward = timer.scope("Engine::Forward");
        self.kernel.set_mode(KernelMode::Forward);
        for t in 1..grid.nt {
            {
                let _scope = timer.scope("ForwardCollector::SaveForward");
                self.collector.save_forward(grid)?;
            }
            {
                let _scope = timer.scope("SourceInjector::ApplySource");
                source.apply_source(grid, cell, t);
            }
            {
                let _scope = timer.scope("Forward::ComputationKernel::Step");
                self.kernel.step(grid, self.boundary.as_mut())?;
            }
            callbacks.after_forward_step(grid, t);
            trace!(time_step = t, "Forward step");
        }
        Ok(())
    }

    fn backward(
        &mut self,
        grid: &mut GridBox,
        traces: &dyn TraceManager,
        cells: &[Option<usize>],
        correlation: &mut CrossCorrelation,
        timer: &Timer,
        callbacks: &mut dyn Callback,
    ) -> Result<()> {
        let _backward = timer.scope("Engine::Backward");
        self.kernel.set_mode(KernelMode::Backward);
        for t in (1..grid.nt).rev() {
            {
                let _scope = timer.scope("TraceManager::ApplyTraces");
                traces.apply_traces(grid, cells, t);
            }
            {
                let _scope = timer.scope("Backward::ComputationKernel::Step");
                self.kernel.step(grid, self.boundary.as_mut())?;
            }
            {
                let _scope = timer.scope("ForwardCollector::FetchForward");
                self.collector.fetch_forward()?;
            }
            let forward = self
                .collector
                .forward_grid()
                .ok_or(ConfigurationError::MissingGrid("forward grid"))?;
            callbacks.after_backward_step(grid, t);
            callbacks.after_fetch_step(forward, t);
            {
                let _scope = timer.scope("Correlation::Correlate");
                correlation.correlate(forward, grid)?;
            }
            trace!(time_step = t, "Backward step");
        }
        Ok(())
    }
}

/// Reverse time migration driver
pub struct RtmEngine {
    config: EngineConfig,
    parts: Propagation,
    correlation: Option<CrossCorrelation>,
    timer: Timer,
}

impl RtmEngine {
    /// Validate `config` and build every component.
    ///
    /// # Errors
    ///
    /// See [`EngineConfig::validate`].
    pub fn new(config: EngineConfig) -> std::result::Result<Self, ConfigurationError> {
        config.validate()?;
        let params = &config.parameters;
        let kernel = create_kernel(config.formulation, params);
        let boundary = create_boundary_manager(&config.boundary, config.formulation, params)?;
        let collector = create_forward_collector(&config.collector, config.formulation, params)?;
        info!(
            formulation = %config.formulation,
            kernel = kernel.name(),
            boundary = boundary.name(),
            collector = collector.name(),
            "Engine assembled"
        );
        Ok(Self {
            config,
            parts: Propagation {
                kernel,
                boundary,
                collector,
            },
            correlation: None,
            timer: Timer::new(),
        })
    }

    /// Configuration the engine was built from
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Timings of everything run so far
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Extend the model into the padding and size the image buffers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::GridMismatch`] when the grid carries
    /// another formulation.
    pub fn initialize(&mut self, grid: &mut GridBox, callbacks: &mut dyn Callback) -> Result<()> {
        callbacks.before_initialization(&self.config.parameters);
        grid.expect_formulation(NAME, self.config.formulation)?;
        self.parts.boundary.extend_model(grid)?;
        self.correlation = Some(CrossCorrelation::new(grid, self.config.parameters.clone()));
        callbacks.after_initialization(grid);
        info!(
            nx = grid.grid_size.nx,
            ny = grid.grid_size.ny,
            nz = grid.grid_size.nz,
            nt = grid.nt,
            dt = grid.dt,
            "Engine initialized"
        );
        Ok(())
    }

    /// Migrate every shot and return the stacked image.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingGrid`] before
    /// [`RtmEngine::initialize`], [`ConfigurationError::InvalidGeometry`] for
    /// a source outside the model, and any collector storage error.
    pub fn migrate(
        &mut self,
        grid: &mut GridBox,
        shots: &[Shot],
        callbacks: &mut dyn Callback,
    ) -> Result<MigrationData> {
        for (index, shot) in shots.iter().enumerate() {
            info!(shot = index, total = shots.len(), "Migrating shot");
            self.migrate_shot(grid, shot, callbacks)?;
        }
        let correlation = self
            .correlation
            .as_ref()
            .ok_or(ConfigurationError::MissingGrid("cross correlation"))?;
        callbacks.after_migration(grid, correlation.stacked());
        self.timer.log_summary();
        Ok(correlation.migration_data(grid))
    }

    fn migrate_shot(
        &mut self,
        grid: &mut GridBox,
        shot: &Shot,
        callbacks: &mut dyn Callback,
    ) -> Result<()> {
        let _shot = self.timer.scope("Engine::MigrateShot");
        let params = &self.config.parameters;
        let parts = &mut self.parts;
        let correlation = self
            .correlation
            .as_mut()
            .ok_or(ConfigurationError::MissingGrid("cross correlation"))?;
        correlation.reset_shot();

        let source_cell = {
            let _scope = self.timer.scope("ModelHandler::SetupWindow");
            place_window(grid, params, shot.source.location())?
        };
        let receiver_cells: Vec<Option<usize>> = shot
            .traces
            .receivers()
            .iter()
            .map(|&location| window_cell(grid, params, location))
            .collect();
        debug!(
            start_x = grid.window.start_x,
            start_y = grid.window.start_y,
            start_z = grid.window.start_z,
            placed = receiver_cells.iter().flatten().count(),
            receivers = receiver_cells.len(),
            "Window placed"
        );
        {
            let _scope = self.timer.scope("BoundaryManager::ReExtendModel");
            parts.boundary.re_extend_model(grid)?;
        }
        {
            let _scope = self.timer.scope("ForwardCollector::ResetGrid(Forward)");
            parts.collector.reset_grid(grid, true)?;
        }

        callbacks.before_forward_propagation(grid);
        parts.forward(grid, &*shot.source, source_cell, &self.timer, callbacks)?;

        {
            let _scope = self.timer.scope("ForwardCollector::ResetGrid(Backward)");
            parts.collector.reset_grid(grid, false)?;
        }
        {
            let _scope = self.timer.scope("BoundaryManager::AdjustModelForBackward");
            parts.boundary.adjust_model_for_backward(grid)?;
        }

        callbacks.before_backward_propagation(grid);
        parts.backward(
            grid,
            &*shot.traces,
            &receiver_cells,
            correlation,
            &self.timer,
            callbacks,
        )?;

        callbacks.before_shot_stacking(grid, correlation.shot_correlation());
        {
            let _scope = self.timer.scope("Correlation::Stack");
            correlation.stack(grid);
        }
        callbacks.after_shot_stacking(grid, correlation.stacked());
        Ok(())
    }

    /// Forward-model one shot and record the pressure at `receivers`.
    ///
    /// Runs the same window placement, boundary preparation and forward
    /// stepping as a migration, without any collector involvement.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidGeometry`] for a source outside
    /// the model and propagates kernel errors.
    pub fn model_shot(
        &mut self,
        grid: &mut GridBox,
        source: &dyn SourceInjector,
        receivers: Vec<Location>,
    ) -> Result<ShotTraces> {
        let _model = self.timer.scope("Engine::ModelShot");
        grid.expect_formulation(NAME, self.config.formulation)?;
        let params = &self.config.parameters;
        let source_cell = place_window(grid, params, source.location())?;
        let cells: Vec<Option<usize>> = receivers
            .iter()
            .map(|&location| window_cell(grid, params, location))
            .collect();
        self.parts.boundary.re_extend_model(grid)?;
        grid.reset_wavefields();
        self.parts.kernel.set_mode(KernelMode::Forward);

        let mut traces = ShotTraces::new(receivers, grid.nt);
        for t in 1..grid.nt {
            source.apply_source(grid, source_cell, t);
            self.parts
                .kernel
                .step(grid, self.parts.boundary.as_mut())?;
            traces.record(grid, &cells, t);
        }
        info!(
            receivers = traces.receiver_count(),
            nt = traces.nt(),
            "Shot modelled"
        );
        Ok(traces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;
    use crate::parameters::HalfLength;

    fn config(boundary: BoundaryConfig, collector: ForwardCollectorConfig) -> EngineConfig {
        let mut parameters = ComputationParameters::new(HalfLength::O4, 5);
        parameters.source_frequency = 25.0;
        EngineConfig {
            formulation: Formulation::AcousticSecond,
            parameters,
            boundary,
            collector,
        }
    }

    #[test]
    fn test_three_rejected_with_absorbing_boundary() {
        let cfg = config(BoundaryConfig::default(), ForwardCollectorConfig::Three);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigurationError::IncompatibleCollector {
                collector: "three",
                boundary: "sponge"
            })
        ));
        let cfg = config(BoundaryConfig::None, ForwardCollectorConfig::Three);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_config_from_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{"formulation":"staggered","boundary":{"type":"none"},"collector":{"type":"three"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.formulation, Formulation::Staggered);
        assert_eq!(cfg.parameters.boundary_length, 20);
        assert!(RtmEngine::new(cfg).is_ok());
    }

    #[test]
    fn test_window_centres_on_source_and_clamps() {
        let params = ComputationParameters::new(HalfLength::O2, 2);
        let mut grid = ModelBuilder::homogeneous(30, 1, 20, 10.0, 1500.0)
            .window(10, 1, 10)
            .build(&params)
            .unwrap();
        // window is 16 wide, full grid 36 x 26, pad 3
        let cell = place_window(&mut grid, &params, Location::new_2d(15, 2)).unwrap();
        assert_eq!(grid.window.start_x, 10);
        assert_eq!(grid.window.start_z, 0);
        assert_eq!(cell, grid.window_size().index(8, 0, 5));

        place_window(&mut grid, &params, Location::new_2d(29, 19)).unwrap();
        assert_eq!(grid.window.start_x, 20);
        assert_eq!(grid.window.start_z, 10);

        assert!(matches!(
            place_window(&mut grid, &params, Location::new_2d(30, 0)),
            Err(ConfigurationError::InvalidGeometry(_))
        ));
        assert_eq!(window_cell(&grid, &params, Location::new_2d(0, 0)), None);
    }

    #[test]
    fn test_migrate_requires_initialize() {
        let cfg = config(BoundaryConfig::None, ForwardCollectorConfig::Three);
        let params = cfg.parameters.clone();
        let mut engine = RtmEngine::new(cfg).unwrap();
        let mut grid = ModelBuilder::homogeneous(10, 1, 10, 10.0, 1500.0)
            .total_time(0.01)
            .build(&params)
            .unwrap();
        let source = RickerSource::new(Location::new_2d(5, 1), 25.0);
        let traces = ShotTraces::new(vec![Location::new_2d(2, 0)], grid.nt);
        let shots = [Shot::new(source, traces)];
        let err = engine
            .migrate(&mut grid, &shots, &mut CallbackCollection::new())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            crate::error::RtmError::Configuration(ConfigurationError::MissingGrid(_))
        ));
    }

    #[test]
    fn test_model_then_migrate_records_timers() {
        let cfg = config(
            BoundaryConfig::Sponge {
                use_top_layer: true,
            },
            ForwardCollectorConfig::Two {
                write_path: std::path::PathBuf::from("unused"),
                memory_budget_bytes: None,
            },
        );
        let params = cfg.parameters.clone();
        let mut engine = RtmEngine::new(cfg).unwrap();
        let mut grid = ModelBuilder::homogeneous(24, 1, 24, 10.0, 1500.0)
            .total_time(0.08)
            .build(&params)
            .unwrap();
        let mut callbacks = CallbackCollection::new();
        engine.initialize(&mut grid, &mut callbacks).unwrap();

        let source = RickerSource::new(Location::new_2d(12, 2), 25.0);
        let receivers: Vec<Location> = (0..24).map(|x| Location::new_2d(x, 0)).collect();
        let traces = engine.model_shot(&mut grid, &source, receivers).unwrap();
        assert!(traces.samples().iter().any(|v| v.abs() > 0.0));

        let shots = [Shot::new(source, traces)];
        let image = engine.migrate(&mut grid, &shots, &mut callbacks).unwrap();
        assert_eq!((image.nx, image.nz), (24, 24));
        assert!(image.max_abs() > 0.0);
        assert!(image.image.iter().all(|v| v.is_finite()));

        let timer = engine.timer();
        let steps = timer.entry("Forward::ComputationKernel::Step").unwrap();
        assert_eq!(steps.count as usize, grid.nt - 1);
        assert_eq!(timer.entry("Engine::MigrateShot").unwrap().count, 1);
        assert_eq!(
            timer.entry("ForwardCollector::FetchForward").unwrap().count as usize,
            grid.nt - 1
        );
    }
}
