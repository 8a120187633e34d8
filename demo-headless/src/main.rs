use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use rtm_core::engine::SourceInjector;
use rtm_core::{
    BoundaryConfig, CallbackCollection, CellDimensions, ComputationParameters, CpmlSettings,
    EngineConfig, ForwardCollectorConfig, Formulation, GridBox, GridSize, HalfLength, Location,
    MigrationData, ModelBuilder, NormCallback, RickerSource, RtmEngine, Shot,
};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormulationArg {
    Second,
    Staggered,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BoundaryArg {
    None,
    Random,
    Sponge,
    Cpml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CollectorArg {
    Two,
    TwoCompression,
    Three,
    OptimalCheckpointing,
}

/// Reverse time migration of a synthetic two-layer model
#[derive(Parser, Debug)]
#[command(name = "rtm-headless")]
#[command(about = "Headless reverse time migration demo", long_about = None)]
struct Args {
    /// Engine configuration as JSON; overrides the engine flags below
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wave equation
    #[arg(short, long, value_enum, default_value_t = FormulationArg::Second)]
    formulation: FormulationArg,

    /// Stencil half length (1, 2, 4, 6 or 8)
    #[arg(long, default_value_t = 4)]
    half_length: usize,

    /// Absorbing layer thickness in cells
    #[arg(long, default_value_t = 20)]
    boundary_length: usize,

    /// Boundary condition
    #[arg(short, long, value_enum, default_value_t = BoundaryArg::Cpml)]
    boundary: BoundaryArg,

    /// Forward wavefield strategy
    #[arg(long, value_enum, default_value_t = CollectorArg::Two)]
    collector: CollectorArg,

    /// Directory for spilled checkpoints
    #[arg(long, default_value = "results")]
    write_path: PathBuf,

    /// In-memory budget for stored frames in bytes
    #[arg(long)]
    memory_budget: Option<u64>,

    /// Model cells along x
    #[arg(long, default_value_t = 200)]
    nx: usize,

    /// Model cells along y (1 for 2D)
    #[arg(long, default_value_t = 1)]
    ny: usize,

    /// Model cells along z
    #[arg(long, default_value_t = 150)]
    nz: usize,

    /// Cell size in meters
    #[arg(long, default_value_t = 10.0)]
    spacing: f32,

    /// Recording time in seconds
    #[arg(short, long, default_value_t = 0.8)]
    time: f32,

    /// Peak source frequency in Hz
    #[arg(long, default_value_t = 15.0)]
    frequency: f32,

    /// Upper layer velocity in m/s
    #[arg(long, default_value_t = 1800.0)]
    upper_velocity: f32,

    /// Lower layer velocity in m/s
    #[arg(long, default_value_t = 2800.0)]
    lower_velocity: f32,

    /// Interface depth as a fraction of the model depth
    #[arg(long, default_value_t = 0.5)]
    interface: f32,

    /// Log the wavefield norm every N steps (0 disables)
    #[arg(long, default_value_t = 0)]
    norm_every: usize,
}

impl Args {
    fn engine_config(&self) -> Result<EngineConfig, Box<dyn std::error::Error>> {
        if let Some(path) = &self.config {
            let text = std::fs::read_to_string(path)?;
            let config: EngineConfig = serde_json::from_str(&text)?;
            info!(path = %path.display(), "Loaded engine configuration");
            return Ok(config);
        }
        let half_length = HalfLength::try_from(self.half_length)?;
        let mut parameters = ComputationParameters::new(half_length, self.boundary_length);
        parameters.source_frequency = self.frequency;
        let boundary = match self.boundary {
            BoundaryArg::None => BoundaryConfig::None,
            BoundaryArg::Random => BoundaryConfig::Random { seed: None },
            BoundaryArg::Sponge => BoundaryConfig::Sponge {
                use_top_layer: true,
            },
            BoundaryArg::Cpml => BoundaryConfig::Cpml(CpmlSettings::default()),
        };
        let collector = match self.collector {
            CollectorArg::Two => ForwardCollectorConfig::Two {
                write_path: self.write_path.clone(),
                memory_budget_bytes: self.memory_budget,
            },
            CollectorArg::TwoCompression => ForwardCollectorConfig::TwoCompression {
                write_path: self.write_path.clone(),
                memory_budget_bytes: self.memory_budget,
                zfp_tolerance: 0.01,
                zfp_parallel: true,
                zfp_relative: false,
            },
            CollectorArg::Three => ForwardCollectorConfig::Three,
            CollectorArg::OptimalCheckpointing => ForwardCollectorConfig::OptimalCheckpointing,
        };
        let formulation = match self.formulation {
            FormulationArg::Second => Formulation::AcousticSecond,
            FormulationArg::Staggered => Formulation::Staggered,
        };
        Ok(EngineConfig {
            formulation,
            parameters,
            boundary,
            collector,
        })
    }

    /// Two-layer model, or its smoothed version for migration
    fn model(
        &self,
        config: &EngineConfig,
        smooth: bool,
    ) -> Result<GridBox, rtm_core::ConfigurationError> {
        let interface = self.interface * self.nz as f32;
        let (upper, lower) = (self.upper_velocity, self.lower_velocity);
        // linear ramp across the interface for the migration model
        let half_width = if smooth { (self.nz as f32 * 0.1).max(1.0) } else { 0.0 };
        ModelBuilder::from_fn(
            GridSize::new(self.nx, self.ny, self.nz),
            CellDimensions::new(self.spacing, self.spacing, self.spacing),
            move |_, _, z| {
                let depth = z as f32 - interface;
                if half_width == 0.0 {
                    if depth < 0.0 {
                        upper
                    } else {
                        lower
                    }
                } else {
                    let w = ((depth + half_width) / (2.0 * half_width)).clamp(0.0, 1.0);
                    upper + (lower - upper) * w
                }
            },
        )
        .formulation(config.formulation)
        .total_time(self.time)
        .build(&config.parameters)
    }
}

fn print_summary(engine: &RtmEngine, grid: &GridBox, image: &MigrationData) {
    println!("\n=== Migration Complete ===");
    println!(
        "Grid: {} x {} x {} (padded), dt = {:.6} s, nt = {}",
        grid.grid_size.nx, grid.grid_size.ny, grid.grid_size.nz, grid.dt, grid.nt
    );

    // depth of the strongest image row, averaged over x
    let mut best = (0, 0.0_f32);
    for z in 0..image.nz {
        let mut energy = 0.0;
        for y in 0..image.ny {
            for x in 0..image.nx {
                energy += image.get(x, y, z).abs();
            }
        }
        if energy > best.1 {
            best = (z, energy);
        }
    }
    println!(
        "Image: {} x {} x {}, max |value| = {:.4e}, strongest row at z = {} ({:.0} m)",
        image.nx,
        image.ny,
        image.nz,
        image.max_abs(),
        best.0,
        best.0 as f32 * image.cells.dz
    );

    println!("\nTimer                                    | Count | Total (ms) | Avg (ms)");
    println!("-----------------------------------------|-------|------------|---------");
    for (name, entry) in engine.timer().summary() {
        println!(
            "{:40} | {:5} | {:10.2} | {:8.3}",
            name,
            entry.count,
            entry.total.as_secs_f64() * 1000.0,
            entry.average().as_secs_f64() * 1000.0
        );
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.engine_config()?;
    let frequency = config.parameters.source_frequency;
    let mut engine = RtmEngine::new(config.clone())?;
    let mut callbacks = CallbackCollection::new();
    if args.norm_every > 0 {
        callbacks.register(Box::new(NormCallback::new(args.norm_every)));
    }

    let source = RickerSource::new(Location::new(args.nx / 2, args.ny / 2, 2), frequency);
    let receivers: Vec<Location> = (0..args.ny)
        .flat_map(|y| (0..args.nx).map(move |x| Location::new(x, y, 0)))
        .collect();

    println!("=== RTM Headless Demo ===\n");
    println!(
        "Model: {} x {} x {} cells of {:.1} m, layers {:.0} / {:.0} m/s",
        args.nx, args.ny, args.nz, args.spacing, args.upper_velocity, args.lower_velocity
    );
    println!(
        "Formulation: {}, boundary: {}, collector: {}",
        config.formulation,
        config.boundary.name(),
        config.collector.name()
    );

    let mut true_model = args.model(&config, false)?;
    engine.initialize(&mut true_model, &mut callbacks)?;
    let traces = engine.model_shot(&mut true_model, &source, receivers)?;
    println!(
        "Synthesised {} traces of {} samples (source cut-off at step {})",
        traces.receiver_count(),
        traces.nt(),
        source.cut_off_step(true_model.dt)
    );

    let mut migration_model = args.model(&config, true)?;
    engine.initialize(&mut migration_model, &mut callbacks)?;
    let shots = [Shot::new(source, traces)];
    let image = engine.migrate(&mut migration_model, &shots, &mut callbacks)?;

    print_summary(&engine, &migration_model, &image);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
