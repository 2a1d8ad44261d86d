//! End-to-end tests: model construction, resolution, building and running.
//!
//! These tests verify complete simulation scenarios including:
//! - Runs declared through simulation targets
//! - Runs declared through a configuration file
//! - Multi-rate scheduling
//! - Checkpoint and restore

use approx::{assert_abs_diff_eq, assert_relative_eq};

use lems_runtime::model::{
    Action, Component, ComponentType, Dynamics, EventHandler, Exposure, Model, Parameter, Record,
    Run, SimulationSpec, StateVariable, Target, TimeDerivative,
};
use lems_runtime::{SimConfig, SimConfigBuilder, SimulationBuilder, SimulationStats};

// ============================================================================
// Model Fixtures
// ============================================================================

fn leaky_type() -> ComponentType {
    ComponentType::new("leaky")
        .with_parameter(Parameter::new("tau", "time"))
        .with_parameter(Parameter::new("v0", "none"))
        .with_exposure(Exposure::new("v", "none"))
        .with_dynamics(
            Dynamics::new()
                .with_state_variable(StateVariable::new("v", "none"))
                .with_time_derivative(TimeDerivative::new("v", "-v / tau").unwrap())
                .with_handler(EventHandler::on_start(vec![Action::assign("v", "v0").unwrap()])),
        )
}

fn sim_type() -> ComponentType {
    ComponentType::new("sim")
        .with_parameter(Parameter::component_ref("target", "leaky"))
        .with_parameter(Parameter::new("step", "time"))
        .with_parameter(Parameter::new("length", "time"))
        .with_parameter(Parameter::path("quantity"))
        .with_simulation(
            SimulationSpec::new()
                .with_run(Run::new("target", "t", "step", "length"))
                .with_record(Record::new("quantity")),
        )
}

fn leaky_model() -> Model {
    let mut model = Model::with_standard_units();
    model.add(leaky_type()).unwrap();
    model
        .add(
            Component::new("cell", "leaky")
                .with_parameter("tau", "10ms")
                .with_parameter("v0", "1"),
        )
        .unwrap();
    model
}

// ============================================================================
// Simulation Targets
// ============================================================================

#[test]
fn test_leaky_integrator_matches_exponential() {
    let mut model = leaky_model();
    model.add(sim_type()).unwrap();
    model
        .add(
            Component::new("sim0", "sim")
                .with_parameter("target", "cell")
                .with_parameter("step", "0.01ms")
                .with_parameter("length", "50ms")
                .with_parameter("quantity", "v"),
        )
        .unwrap();
    model.add(Target::new("sim0")).unwrap();

    let resolved = model.resolve().unwrap();
    let mut builder = SimulationBuilder::new(&resolved);
    builder.add_targets().unwrap();
    let mut sim = builder.build();
    let stats = sim.run().unwrap();
    assert_eq!(stats.steps_executed, 5000);

    let tau = 0.01;
    let recording = sim.recording("v").unwrap();
    assert_eq!(recording.len(), 5000);
    for &(t, v) in &recording.samples {
        assert_abs_diff_eq!(v, (-t / tau).exp(), epsilon = 1e-3);
    }

    let v = sim.value("cell", "v").unwrap();
    assert_relative_eq!(v, (-5.0f64).exp(), max_relative = 0.01);
}

#[test]
fn test_targets_require_known_component() {
    let mut model = leaky_model();
    model.add(Target::new("missing")).unwrap();
    assert!(model.resolve().is_err());
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_driven_run() {
    let yaml = r#"
simulation:
  name: leaky
  trace_steps: true

runs:
  - component: cell
    step: 0.01ms
    total: 5ms

records:
  - run: cell
    quantity: v
    scale: 1000
"#;
    let config = SimConfig::from_yaml(yaml).unwrap();

    let model = leaky_model();
    let resolved = model.resolve().unwrap();
    let mut builder = SimulationBuilder::new(&resolved);
    builder.apply_config(&config).unwrap();
    let mut sim = builder.build();
    sim.run().unwrap();

    let recording = sim.recording("v").unwrap();
    assert_eq!(recording.len(), 500);
    assert_eq!(recording.scale, 1000.0);
    assert_eq!(sim.stats().trace.len(), 500);
    assert!(recording.to_csv().starts_with("time,v\n"));
}

#[test]
fn test_config_collects_named_stats() {
    let config = SimConfigBuilder::new()
        .name("leaky-stats")
        .collect_stats(true)
        .add_run("cell", "1ms", "5ms")
        .build()
        .unwrap();

    let model = leaky_model();
    let resolved = model.resolve().unwrap();
    let mut builder = SimulationBuilder::new(&resolved);
    builder.apply_config(&config).unwrap();
    let mut sim = builder.build();
    sim.run().unwrap();

    let stats = sim.collected_stats().unwrap();
    assert_eq!(stats.metadata.name, "leaky-stats");
    assert_eq!(stats.scheduler.steps_executed, 5);
    assert_eq!(stats.runnables["cell"].steps, 5);
    assert!(stats.summary().starts_with("leaky-stats (lems-runtime"));

    // Without the flag nothing is collected
    let config = SimConfigBuilder::new().add_run("cell", "1ms", "5ms").build().unwrap();
    let mut builder = SimulationBuilder::new(&resolved);
    builder.apply_config(&config).unwrap();
    let mut sim = builder.build();
    sim.run().unwrap();
    assert!(sim.collected_stats().is_none());
}

#[test]
fn test_config_rejects_wrong_dimension() {
    let config = SimConfigBuilder::new()
        .add_run("cell", "1mV", "5ms")
        .build()
        .unwrap();

    let model = leaky_model();
    let resolved = model.resolve().unwrap();
    let mut builder = SimulationBuilder::new(&resolved);
    assert!(matches!(
        builder.apply_config(&config),
        Err(lems_runtime::Error::Unit(_))
    ));
}

#[test]
fn test_frozen_run_keeps_shadow() {
    let config = SimConfigBuilder::new()
        .add_frozen_run("cell", "1ms", "5ms")
        .build()
        .unwrap();

    let model = leaky_model();
    let resolved = model.resolve().unwrap();
    let mut builder = SimulationBuilder::new(&resolved);
    builder.apply_config(&config).unwrap();
    let mut sim = builder.build();
    sim.run().unwrap();

    let cell = sim.lookup("cell").unwrap();
    let runnable = sim.network().get(cell).unwrap();
    assert!(!runnable.is_plastic());
    assert_eq!(runnable.shadow_value("v"), Some(1.0));
    // Every step takes the same decrement, computed from the frozen shadow value
    assert_relative_eq!(runnable.value("v").unwrap(), 0.5, max_relative = 1e-9);
}

// ============================================================================
// Scheduling
// ============================================================================

#[test]
fn test_multi_rate_runs() {
    let mut model = leaky_model();
    model
        .add(
            Component::new("slow", "leaky")
                .with_parameter("tau", "10ms")
                .with_parameter("v0", "1"),
        )
        .unwrap();

    let resolved = model.resolve().unwrap();
    let mut builder = SimulationBuilder::new(&resolved).with_trace(true);
    let fast = builder.add_run("cell", 1.0e-3, 9.0e-3).unwrap();
    let slow = builder.add_run("slow", 3.0e-3, 9.0e-3).unwrap();
    let mut sim = builder.build();
    let stats = sim.run().unwrap().clone();

    assert_eq!(sim.network().get(fast).unwrap().steps(), 9);
    assert_eq!(sim.network().get(slow).unwrap().steps(), 3);
    assert_eq!(stats.steps_executed, 12);

    for pair in stats.trace.windows(2) {
        assert!(pair[0].time <= pair[1].time);
    }
}

#[test]
fn test_duplicate_run_rejected() {
    let model = leaky_model();
    let resolved = model.resolve().unwrap();
    let mut builder = SimulationBuilder::new(&resolved);
    builder.add_run("cell", 1.0e-3, 1.0e-2).unwrap();
    assert!(builder.add_run("cell", 1.0e-3, 1.0e-2).is_err());
}

// ============================================================================
// Inheritance
// ============================================================================

#[test]
fn test_fixed_subtype_runs_like_base() {
    let mut model = leaky_model();
    model
        .add(ComponentType::new("leaky10").extending("leaky").with_fixed("tau", "10ms"))
        .unwrap();
    model
        .add(Component::new("fixed", "leaky10").with_parameter("v0", "1"))
        .unwrap();

    let resolved = model.resolve().unwrap();
    let mut builder = SimulationBuilder::new(&resolved);
    builder.add_run("cell", 1.0e-4, 2.0e-2).unwrap();
    builder.add_run("fixed", 1.0e-4, 2.0e-2).unwrap();
    let mut sim = builder.build();
    sim.run().unwrap();

    assert_eq!(sim.value("cell", "v"), sim.value("fixed", "v"));
    assert!(resolved.component_type("leaky10").unwrap().is_a("leaky"));
}

// ============================================================================
// Checkpointing
// ============================================================================

#[test]
fn test_checkpoint_restore_reproduces_run() {
    let model = leaky_model();
    let resolved = model.resolve().unwrap();
    let mut builder = SimulationBuilder::new(&resolved);
    let cell = builder.add_run("cell", 1.0e-4, 1.0e-2).unwrap();
    builder.add_record(cell, "v", 1.0, None).unwrap();
    let mut sim = builder.build();

    for _ in 0..10 {
        sim.network_mut().step(cell).unwrap();
    }
    let checkpoint = sim.checkpoint();
    let at_checkpoint = sim.value("cell", "v").unwrap();

    sim.run().unwrap();
    let first_run: Vec<(f64, f64)> = sim.recording("v").unwrap().samples.clone();
    let final_v = sim.value("cell", "v").unwrap();
    assert_eq!(first_run.len(), 100);

    sim.restore(&checkpoint).unwrap();
    assert_eq!(sim.value("cell", "v"), Some(at_checkpoint));
    assert_eq!(sim.recording("v").unwrap().len(), 10);
    assert_eq!(sim.network().get(cell).unwrap().steps(), 10);

    sim.run().unwrap();
    assert_eq!(sim.value("cell", "v"), Some(final_v));
    assert_eq!(sim.recording("v").unwrap().samples, first_run);
}

#[test]
fn test_snapshot_and_stats() {
    let model = leaky_model();
    let resolved = model.resolve().unwrap();
    let mut builder = SimulationBuilder::new(&resolved);
    let cell = builder.add_run("cell", 1.0e-3, 5.0e-3).unwrap();
    let mut sim = builder.build();
    sim.run().unwrap();

    let snapshot = sim.snapshot(cell).unwrap();
    assert_eq!(snapshot.id, "cell");
    assert_eq!(snapshot.component, "cell");
    assert_relative_eq!(snapshot.variables["tau"], 0.01);
    let json = serde_json::to_value(&snapshot).unwrap();
    assert!(json["variables"]["v"].as_f64().unwrap() < 1.0);

    let mut stats = SimulationStats::new().with_name("leaky");
    stats.collect(&sim);
    assert_eq!(stats.scheduler.steps_executed, 5);
    assert_eq!(stats.runnables["cell"].steps, 5);
    assert!(stats.to_csv().contains("steps_executed,5"));
}
