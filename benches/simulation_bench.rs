//! Performance benchmarks for the LEMS runtime.
//!
//! Run with: `cargo bench`
//! Or for specific bench: `cargo bench --bench simulation_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use lems_runtime::model::{
    Action, ChildSlot, Component, ComponentType, DerivedVariable, Dynamics, EventConnection,
    EventHandler, EventPort, ForEach, Model, Parameter, Reduce, StateVariable, Structure,
    TimeDerivative,
};
use lems_runtime::{Expression, ResolvedModel, SimulationBuilder};

// ============================================================================
// Benchmark Models
// ============================================================================

/// A population of leaky integrators that reset and spike onto a counter.
fn population_model(size: usize) -> Model {
    let mut model = Model::with_standard_units();
    model
        .add(
            ComponentType::new("iaf")
                .with_parameter(Parameter::new("tau", "time"))
                .with_parameter(Parameter::new("drive", "none"))
                .with_event_port(EventPort::output("spike"))
                .with_dynamics(
                    Dynamics::new()
                        .with_state_variable(StateVariable::new("v", "none"))
                        .with_time_derivative(TimeDerivative::new("v", "(drive - v) / tau").unwrap())
                        .with_handler(
                            EventHandler::on_condition(
                                "v > 0.8",
                                vec![Action::assign("v", "0").unwrap(), Action::event_out("spike")],
                            )
                            .unwrap(),
                        ),
                ),
        )
        .unwrap();
    model
        .add(
            ComponentType::new("tally")
                .with_event_port(EventPort::input("in"))
                .with_dynamics(
                    Dynamics::new()
                        .with_state_variable(StateVariable::new("n", "none"))
                        .with_handler(EventHandler::on_event(
                            "in",
                            vec![Action::assign("n", "n + 1").unwrap()],
                        )),
                ),
        )
        .unwrap();
    model
        .add(
            ComponentType::new("population")
                .with_parameter(Parameter::component_ref("cell", "iaf"))
                .with_parameter(Parameter::new("size", "none"))
                .with_child_slot(ChildSlot::single("sink", "tally"))
                .with_structure(
                    Structure::new()
                        .with_multi_instantiate("cell", "size")
                        .with_for_each(
                            ForEach::new("[*]", "c")
                                .with_event_connection(EventConnection::new("c", "sink")),
                        ),
                )
                .with_dynamics(Dynamics::new().with_derived_variable(DerivedVariable::select(
                    "vsum",
                    "none",
                    "[*]/v",
                    Some(Reduce::Add),
                ))),
        )
        .unwrap();
    model
        .add(
            Component::new("cell", "iaf")
                .with_parameter("tau", "10ms")
                .with_parameter("drive", "1"),
        )
        .unwrap();
    model
        .add(
            Component::new("pop", "population")
                .with_parameter("cell", "cell")
                .with_parameter("size", size.to_string())
                .with_child(Component::new("sink", "tally")),
        )
        .unwrap();
    model
}

fn resolved(size: usize) -> ResolvedModel {
    population_model(size).resolve().unwrap()
}

// ============================================================================
// Expression Benchmarks
// ============================================================================

fn bench_expression_parse(c: &mut Criterion) {
    let text = "(gmax * m^3 * h * (erev - v)) / (1 + exp(-(v - vhalf) / k))";
    c.bench_function("expression_parse", |b| {
        b.iter(|| black_box(Expression::parse(black_box(text)).unwrap()));
    });
}

// ============================================================================
// Build Benchmarks
// ============================================================================

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for size in [10, 100, 1000].iter() {
        let model = resolved(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("cells", size), size, |b, _| {
            b.iter(|| {
                let mut builder = SimulationBuilder::new(&model);
                builder.add_run("pop", 1.0e-4, 1.0e-2).unwrap();
                black_box(builder.build());
            });
        });
    }

    group.finish();
}

// ============================================================================
// Scheduler Benchmarks
// ============================================================================

fn bench_population_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("population_run");

    for size in [10, 100, 1000].iter() {
        let model = resolved(*size);
        // 100 steps per run
        group.throughput(Throughput::Elements(*size as u64 * 100));
        group.bench_with_input(BenchmarkId::new("cells", size), size, |b, _| {
            b.iter(|| {
                let mut builder = SimulationBuilder::new(&model);
                builder.add_run("pop", 1.0e-4, 1.0e-2).unwrap();
                let mut sim = builder.build();
                black_box(sim.run().unwrap().steps_executed);
            });
        });
    }

    group.finish();
}

fn bench_multi_rate(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_rate");

    for roots in [2, 4, 8].iter() {
        let mut model = population_model(10);
        for i in 0..*roots {
            model
                .add(
                    Component::new(format!("extra{i}"), "iaf")
                        .with_parameter("tau", "10ms")
                        .with_parameter("drive", "1"),
                )
                .unwrap();
        }
        let model = model.resolve().unwrap();

        group.throughput(Throughput::Elements(*roots as u64));
        group.bench_with_input(BenchmarkId::new("roots", roots), roots, |b, &roots| {
            b.iter(|| {
                let mut builder = SimulationBuilder::new(&model);
                for i in 0..roots {
                    // Timesteps of 0.1ms, 0.2ms, ...
                    let dt = 1.0e-4 * (i + 1) as f64;
                    builder.add_run(&format!("extra{i}"), dt, 1.0e-2).unwrap();
                }
                let mut sim = builder.build();
                black_box(sim.run().unwrap().steps_executed);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_expression_parse,
    bench_build,
    bench_population_run,
    bench_multi_rate,
);

criterion_main!(benches);
