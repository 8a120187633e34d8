//! Physical sanity of the kernels and boundaries
//!
//! - Stencils differentiate quadratics exactly at every half length and
//!   converge at their formal order
//! - Buffer rotation is a cycle of length two or three
//! - First arrivals travel at the model velocity and never ahead of it
//! - Absorbing layers leave the model untouched until the wave reaches them
//! - The sponge drains energy that the reflective boundary keeps

use approx::assert_relative_eq;
use rtm_core::engine::SourceInjector;
use rtm_core::{
    create_boundary_manager, create_kernel, BoundaryConfig, CellDimensions, ComputationParameters,
    CpmlSettings, EngineConfig, Formulation, GridBox, GridSize, HalfLength, Location, ModelBuilder,
    NormCallback, RickerSource, RtmEngine,
};

#[ctor::ctor]
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const ALL: [HalfLength; 5] = [
    HalfLength::O2,
    HalfLength::O4,
    HalfLength::O8,
    HalfLength::O12,
    HalfLength::O16,
];

/// Set `prev = curr = |r - centre|²` in cell units and take one step.
///
/// With unit spacing the update adds `vel * 2 * dims` at every stencil
/// interior cell.
fn check_quadratic(half_length: HalfLength, ny: usize) {
    let params = ComputationParameters::new(half_length, 0);
    let mut grid = ModelBuilder::from_fn(
        GridSize::new(6, ny, 6),
        CellDimensions::new(1.0, 1.0, 1.0),
        |_, _, _| 1.0,
    )
    .build(&params)
    .unwrap();
    let kernel = create_kernel(Formulation::AcousticSecond, &params);
    let mut boundary =
        create_boundary_manager(&BoundaryConfig::None, Formulation::AcousticSecond, &params)
            .unwrap();
    boundary.extend_model(&mut grid).unwrap();

    let size = grid.window_size();
    let three_d = size.is_3d();
    let centre = |n: usize| n as f32 / 2.0;
    let quadratic = |x: usize, y: usize, z: usize| {
        let mut value =
            (x as f32 - centre(size.nx)).powi(2) + (z as f32 - centre(size.nz)).powi(2);
        if three_d {
            value += (y as f32 - centre(size.ny)).powi(2);
        }
        value
    };
    {
        let buffers = grid.pressure_buffers_mut("test").unwrap();
        for y in 0..size.ny {
            for z in 0..size.nz {
                for x in 0..size.nx {
                    buffers.curr_mut().set(x, y, z, quadratic(x, y, z));
                    buffers.prev_mut().set(x, y, z, quadratic(x, y, z));
                }
            }
        }
    }
    kernel.step(&mut grid, boundary.as_mut()).unwrap();

    let hl = params.half();
    let laplacian = if three_d { 6.0 } else { 4.0 };
    let ys = if three_d { hl..size.ny - hl } else { 0..1 };
    for y in ys {
        for z in hl..size.nz - hl {
            for x in hl..size.nx - hl {
                let change = grid.pressure_current().get(x, y, z) - quadratic(x, y, z);
                let expected = grid.velocity.get(x, y, z) * laplacian;
                assert_relative_eq!(change, expected, max_relative = 1e-2);
            }
        }
    }
}

#[test]
fn test_stencils_exact_for_quadratics_2d() {
    for half_length in ALL {
        check_quadratic(half_length, 1);
    }
}

#[test]
fn test_stencils_exact_for_quadratics_3d() {
    for half_length in ALL {
        check_quadratic(half_length, 6);
    }
}

/// Largest Laplacian error of `sin(2 pi x / wavelength)` along x, relative
/// to the exact `k²`
fn sine_laplacian_error(half_length: HalfLength, wavelength: f64) -> f64 {
    let params = ComputationParameters::new(half_length, 0);
    let mut grid = ModelBuilder::from_fn(
        GridSize::new(64, 1, 4),
        CellDimensions::new(1.0, 1.0, 1.0),
        |_, _, _| 1.0,
    )
    .build(&params)
    .unwrap();
    let kernel = create_kernel(Formulation::AcousticSecond, &params);
    let mut boundary =
        create_boundary_manager(&BoundaryConfig::None, Formulation::AcousticSecond, &params)
            .unwrap();
    boundary.extend_model(&mut grid).unwrap();

    let size = grid.window_size();
    let k = std::f64::consts::TAU / wavelength;
    let wave = |x: usize| (k * x as f64).sin() as f32;
    {
        let buffers = grid.pressure_buffers_mut("test").unwrap();
        for z in 0..size.nz {
            for x in 0..size.nx {
                buffers.curr_mut().set(x, 0, z, wave(x));
                buffers.prev_mut().set(x, 0, z, wave(x));
            }
        }
    }
    kernel.step(&mut grid, boundary.as_mut()).unwrap();

    let hl = params.half();
    let mut worst = 0.0_f64;
    for z in hl..size.nz - hl {
        for x in hl..size.nx - hl {
            let change = grid.pressure_current().get(x, 0, z) - wave(x);
            let numeric = f64::from(change) / f64::from(grid.velocity.get(x, 0, z));
            let exact = -k * k * f64::from(wave(x));
            worst = worst.max((numeric - exact).abs());
        }
    }
    worst / (k * k)
}

#[test]
fn test_stencil_error_shrinks_at_formal_order() {
    // halving the spacing relative to the wavelength divides the error by 2^order
    for (half_length, wavelength) in [(HalfLength::O2, 16.0), (HalfLength::O4, 8.0)] {
        let coarse = sine_laplacian_error(half_length, wavelength);
        let fine = sine_laplacian_error(half_length, 2.0 * wavelength);
        let order = 2 * half_length.get();
        let expected = 2.0_f64.powi(order as i32);
        let ratio = coarse / fine;
        assert!(
            ratio > 0.7 * expected && ratio < 1.3 * expected,
            "order {order}: ratio {ratio}"
        );
    }
}

#[test]
fn test_rotation_returns_to_original_slots() {
    let params = ComputationParameters::new(HalfLength::O4, 2);
    let kernel = create_kernel(Formulation::AcousticSecond, &params);
    for (three, period) in [(false, 2), (true, 3)] {
        let mut grid = ModelBuilder::homogeneous(8, 1, 8, 10.0, 1500.0)
            .three_buffers(three)
            .build(&params)
            .unwrap();
        grid.velocity.fill(0.0);
        let mut boundary =
            create_boundary_manager(&BoundaryConfig::None, Formulation::AcousticSecond, &params)
                .unwrap();
        let start = grid.pressure_buffers_mut("test").unwrap().slot_indices();
        for step in 1..=period {
            kernel.step(&mut grid, boundary.as_mut()).unwrap();
            let slots = grid.pressure_buffers_mut("test").unwrap().slot_indices();
            assert_eq!(slots == start, step == period, "three buffers: {three}");
        }
    }
}

fn arrival_config(formulation: Formulation) -> EngineConfig {
    let mut parameters = ComputationParameters::new(HalfLength::O8, 20);
    parameters.source_frequency = 20.0;
    EngineConfig {
        formulation,
        parameters,
        boundary: BoundaryConfig::Sponge {
            use_top_layer: true,
        },
        ..EngineConfig::default()
    }
}

/// First step at which a trace reaches a tenth of its own peak
fn first_arrival(trace: &[f32]) -> usize {
    let peak = trace.iter().fold(0.0_f32, |m, v| m.max(v.abs()));
    trace
        .iter()
        .position(|v| v.abs() >= 0.1 * peak)
        .unwrap_or(trace.len())
}

fn check_arrivals(formulation: Formulation) {
    let velocity = 2000.0;
    let spacing = 10.0;
    let config = arrival_config(formulation);
    let mut grid = ModelBuilder::homogeneous(100, 1, 40, spacing, velocity)
        .formulation(formulation)
        .total_time(0.4)
        .build(&config.parameters)
        .unwrap();
    let mut engine = RtmEngine::new(config.clone()).unwrap();
    let mut norms = NormCallback::new(1);
    engine.initialize(&mut grid, &mut norms).unwrap();
    assert_eq!(grid.pressure_current().l2_norm(), 0.0);

    let source = RickerSource::new(Location::new_2d(20, 20), 20.0);
    let (near, far) = (20_usize, 50_usize);
    let receivers = vec![Location::new_2d(20 + near, 20), Location::new_2d(20 + far, 20)];
    let traces = engine.model_shot(&mut grid, &source, receivers).unwrap();
    assert_eq!(traces.sample(0, 0), 0.0);
    assert_eq!(traces.sample(0, 1), 0.0);

    let trace = |i: usize| -> Vec<f32> {
        (0..traces.nt())
            .map(|t| traces.sample(t, i))
            .collect()
    };
    let (t_near, t_far) = (first_arrival(&trace(0)), first_arrival(&trace(1)));
    assert!(t_far < traces.nt(), "no arrival at the far receiver");

    let dt = grid.dt;
    // never ahead of the physical wavefront
    let far_time = (far as f32 * spacing) / velocity;
    assert!(
        t_far as f32 * dt >= 0.95 * far_time,
        "{formulation}: arrival at {} s before {far_time} s",
        t_far as f32 * dt
    );
    let measured = ((far - near) as f32 * spacing) / ((t_far - t_near) as f32 * dt);
    assert_relative_eq!(measured, velocity, max_relative = 0.15);
}

#[test]
fn test_second_order_arrivals_travel_at_model_velocity() {
    check_arrivals(Formulation::AcousticSecond);
}

#[test]
fn test_staggered_arrivals_travel_at_model_velocity() {
    check_arrivals(Formulation::Staggered);
}

/// Centre shot on a 60x60 model; returns the grid after `steps` forward
/// steps (all of them by default) and the pressure norm after each step
fn run_centre_shot(
    boundary: &BoundaryConfig,
    total_time: f32,
    steps: Option<usize>,
) -> (GridBox, Vec<f64>) {
    let mut params = ComputationParameters::new(HalfLength::O4, 20);
    params.source_frequency = 20.0;
    let mut grid = ModelBuilder::homogeneous(60, 1, 60, 10.0, 2000.0)
        .total_time(total_time)
        .build(&params)
        .unwrap();
    let kernel = create_kernel(Formulation::AcousticSecond, &params);
    let mut manager =
        create_boundary_manager(boundary, Formulation::AcousticSecond, &params).unwrap();
    manager.extend_model(&mut grid).unwrap();
    manager.re_extend_model(&mut grid).unwrap();

    let pad = params.half() + params.boundary_length;
    let cell = grid.window_size().index(30 + pad, 0, 30 + pad);
    let source = RickerSource::new(Location::new_2d(30, 30), params.source_frequency);
    let steps = steps.unwrap_or(grid.nt - 1);
    let mut norms = Vec::with_capacity(steps);
    for t in 1..=steps {
        source.apply_source(&mut grid, cell, t);
        kernel.step(&mut grid, manager.as_mut()).unwrap();
        norms.push(grid.pressure_current().l2_norm());
    }
    (grid, norms)
}

fn model_interior(grid: &GridBox) -> Vec<f32> {
    let pad = 22;
    let size = grid.window_size();
    (pad..size.nz - pad)
        .flat_map(|z| (pad..size.nx - pad).map(move |x| (x, z)))
        .map(|(x, z)| grid.pressure_current().get(x, 0, z))
        .collect()
}

#[test]
fn test_absorbing_layers_idle_before_arrival() {
    // the front is about 12 cells out, the layers start at 30
    let steps = 50;
    let (reference, _) = run_centre_shot(&BoundaryConfig::None, 0.5, Some(steps));
    let expected = model_interior(&reference);
    let peak = expected.iter().fold(0.0_f32, |m, v| m.max(v.abs()));
    assert!(peak > 0.0);

    for boundary in [
        BoundaryConfig::Sponge {
            use_top_layer: true,
        },
        BoundaryConfig::Cpml(CpmlSettings::default()),
    ] {
        let (grid, _) = run_centre_shot(&boundary, 0.5, Some(steps));
        for (a, b) in expected.iter().zip(model_interior(&grid)) {
            assert!(
                (a - b).abs() <= 1e-4 * peak,
                "{}: {a} vs {b}",
                boundary.name()
            );
        }
    }
}

#[test]
fn test_sponge_drains_energy() {
    let mean_tail = |norms: &[f64]| norms[norms.len() - 50..].iter().sum::<f64>() / 50.0;
    let (_, reflective) = run_centre_shot(&BoundaryConfig::None, 1.0, None);
    let (grid, absorbed) = run_centre_shot(
        &BoundaryConfig::Sponge {
            use_top_layer: true,
        },
        1.0,
        None,
    );
    assert!(grid.pressure_current().data.iter().all(|v| v.is_finite()));
    let (kept, drained) = (mean_tail(&reflective), mean_tail(&absorbed));
    assert!(drained < 0.6 * kept, "sponge {drained} vs reflective {kept}");
}
