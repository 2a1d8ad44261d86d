//! Tests for the per-step protocol: derivatives, derived variables,
//! regimes, events, selections and kinetic schemes.

use approx::{assert_abs_diff_eq, assert_relative_eq};

use lems_runtime::model::{
    Action, Case, ChildSlot, Component, ComponentType, ConditionalDerivedVariable,
    DerivedVariable, Dynamics, EventConnection, EventHandler, EventPort, KineticScheme, Model,
    Parameter, Reduce, Regime, StateVariable, Structure, TimeDerivative,
};
use lems_runtime::{EmittedEvent, Error, EventCallback, SimBuildError, Simulation, SimulationBuilder};
use std::sync::{Arc, Mutex};

fn build(model: &Model, component: &str, dt: f64, total: f64) -> Result<Simulation, Error> {
    let resolved = model.resolve()?;
    let mut builder = SimulationBuilder::new(&resolved);
    builder.add_run(component, dt, total)?;
    Ok(builder.build())
}

fn step(sim: &mut Simulation, times: usize) {
    let root = sim.roots()[0];
    for _ in 0..times {
        sim.network_mut().step(root).unwrap();
    }
}

// ============================================================================
// Integration Order
// ============================================================================

fn oscillator(name: &str, x_first: bool) -> ComponentType {
    let dx = TimeDerivative::new("x", "y").unwrap();
    let dy = TimeDerivative::new("y", "-x").unwrap();
    let (first, second) = if x_first { (dx, dy) } else { (dy, dx) };
    ComponentType::new(name).with_dynamics(
        Dynamics::new()
            .with_state_variable(StateVariable::new("x", "none"))
            .with_state_variable(StateVariable::new("y", "none"))
            .with_time_derivative(first)
            .with_time_derivative(second)
            .with_handler(EventHandler::on_start(vec![Action::assign("x", "1").unwrap()])),
    )
}

#[test]
fn test_derivatives_read_previous_step() {
    let mut model = Model::with_standard_units();
    model.add(oscillator("xy", true)).unwrap();
    model.add(oscillator("yx", false)).unwrap();
    model.add(Component::new("a", "xy")).unwrap();
    model.add(Component::new("b", "yx")).unwrap();

    let mut sim_a = build(&model, "a", 0.1, 1.0).unwrap();
    let mut sim_b = build(&model, "b", 0.1, 1.0).unwrap();

    step(&mut sim_a, 1);
    // Explicit Euler from (1, 0)
    assert_relative_eq!(sim_a.value("a", "x").unwrap(), 1.0);
    assert_relative_eq!(sim_a.value("a", "y").unwrap(), -0.1);

    sim_a.run().unwrap();
    sim_b.run().unwrap();
    assert_eq!(sim_a.value("a", "x"), sim_b.value("b", "x"));
    assert_eq!(sim_a.value("a", "y"), sim_b.value("b", "y"));
}

// ============================================================================
// Derived Variables
// ============================================================================

#[test]
fn test_derived_variables_follow_dependencies() {
    let mut model = Model::with_standard_units();
    model
        .add(
            ComponentType::new("chain")
                .with_parameter(Parameter::new("k", "none"))
                .with_dynamics(
                    Dynamics::new()
                        .with_state_variable(StateVariable::new("v", "none"))
                        .with_derived_variable(DerivedVariable::new("a", "none", "b + 1").unwrap())
                        .with_derived_variable(DerivedVariable::new("b", "none", "c * 2").unwrap())
                        .with_derived_variable(DerivedVariable::new("c", "none", "v + k").unwrap())
                        .with_conditional_derived_variable(ConditionalDerivedVariable::new(
                            "sign",
                            "none",
                            vec![
                                Case::when("a > 10", "1").unwrap(),
                                Case::otherwise("-1").unwrap(),
                            ],
                        ))
                        .with_handler(EventHandler::on_start(vec![Action::assign("v", "2").unwrap()])),
                ),
        )
        .unwrap();
    model
        .add(Component::new("c0", "chain").with_parameter("k", "3"))
        .unwrap();

    let sim = build(&model, "c0", 0.1, 1.0).unwrap();
    // Derived values are computed at initialization
    assert_eq!(sim.value("c0", "c"), Some(5.0));
    assert_eq!(sim.value("c0", "b"), Some(10.0));
    assert_eq!(sim.value("c0", "a"), Some(11.0));
    assert_eq!(sim.value("c0", "sign"), Some(1.0));
}

#[test]
fn test_derived_cycle_is_build_error() {
    let mut model = Model::with_standard_units();
    model
        .add(
            ComponentType::new("loop").with_dynamics(
                Dynamics::new()
                    .with_derived_variable(DerivedVariable::new("a", "none", "b").unwrap())
                    .with_derived_variable(DerivedVariable::new("b", "none", "a").unwrap()),
            ),
        )
        .unwrap();
    model.add(Component::new("l0", "loop")).unwrap();

    let err = build(&model, "l0", 0.1, 1.0).unwrap_err();
    match err {
        Error::Build(SimBuildError::CyclicDependency { runnable, variables }) => {
            assert_eq!(runnable, "l0");
            assert_eq!(variables, vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unresolved_symbol_is_build_error() {
    let mut model = Model::with_standard_units();
    model
        .add(
            ComponentType::new("typo").with_dynamics(
                Dynamics::new()
                    .with_state_variable(StateVariable::new("v", "none"))
                    .with_time_derivative(TimeDerivative::new("v", "-v / tauu").unwrap()),
            ),
        )
        .unwrap();
    model.add(Component::new("t0", "typo")).unwrap();

    assert!(matches!(
        build(&model, "t0", 0.1, 1.0),
        Err(Error::Build(SimBuildError::UnresolvedSymbol { symbol, .. })) if symbol == "tauu"
    ));
}

// ============================================================================
// Regimes
// ============================================================================

fn switch_model() -> Model {
    let mut model = Model::with_standard_units();
    model
        .add(
            ComponentType::new("switch").with_dynamics(
                Dynamics::new()
                    .with_state_variable(StateVariable::new("x", "none"))
                    .with_state_variable(StateVariable::new("entered", "none"))
                    .with_regime(
                        Regime::new("up")
                            .initial()
                            .with_time_derivative(TimeDerivative::new("x", "1").unwrap())
                            .with_handler(
                                EventHandler::on_condition("x > 0.55", vec![Action::transition("down")])
                                    .unwrap(),
                            ),
                    )
                    .with_regime(
                        Regime::new("down")
                            .with_time_derivative(TimeDerivative::new("x", "-1").unwrap())
                            .with_handler(EventHandler::on_entry(vec![
                                Action::assign("entered", "entered + 1").unwrap(),
                            ])),
                    ),
            ),
        )
        .unwrap();
    model.add(Component::new("s0", "switch")).unwrap();
    model
}

#[test]
fn test_transition_applies_at_commit_boundary() {
    let mut sim = build(&switch_model(), "s0", 0.1, 2.0).unwrap();
    let root = sim.roots()[0];
    assert_eq!(sim.network().get(root).unwrap().regime(), Some("up"));

    step(&mut sim, 5);
    assert_eq!(sim.network().get(root).unwrap().regime(), Some("up"));
    assert_relative_eq!(sim.value("s0", "x").unwrap(), 0.5, max_relative = 1e-12);

    // The condition fires during step 6; that step still integrates as "up"
    step(&mut sim, 1);
    assert_eq!(sim.network().get(root).unwrap().regime(), Some("down"));
    assert_relative_eq!(sim.value("s0", "x").unwrap(), 0.6, max_relative = 1e-12);
    assert_eq!(sim.value("s0", "entered"), Some(0.0));

    step(&mut sim, 1);
    assert_relative_eq!(sim.value("s0", "x").unwrap(), 0.5, max_relative = 1e-12);
    assert_eq!(sim.value("s0", "entered"), Some(1.0));

    // Entry actions run once per activation
    step(&mut sim, 3);
    assert_eq!(sim.value("s0", "entered"), Some(1.0));
}

#[test]
fn test_unknown_transition_is_build_error() {
    let mut model = Model::with_standard_units();
    model
        .add(
            ComponentType::new("bad").with_dynamics(
                Dynamics::new()
                    .with_state_variable(StateVariable::new("x", "none"))
                    .with_handler(
                        EventHandler::on_condition("x > 1", vec![Action::transition("nowhere")])
                            .unwrap(),
                    ),
            ),
        )
        .unwrap();
    model.add(Component::new("b0", "bad")).unwrap();

    assert!(matches!(
        build(&model, "b0", 0.1, 1.0),
        Err(Error::Build(SimBuildError::UnknownRegime { regime, .. })) if regime == "nowhere"
    ));
}

// ============================================================================
// Events
// ============================================================================

fn spiking_model() -> Model {
    let mut model = Model::with_standard_units();
    model
        .add(
            ComponentType::new("spiker")
                .with_parameter(Parameter::new("rate", "per_time"))
                .with_event_port(EventPort::output("spike"))
                .with_dynamics(
                    Dynamics::new()
                        .with_state_variable(StateVariable::new("v", "none"))
                        .with_time_derivative(TimeDerivative::new("v", "rate").unwrap())
                        .with_handler(
                            EventHandler::on_condition(
                                "v > 0.95",
                                vec![Action::assign("v", "0").unwrap(), Action::event_out("spike")],
                            )
                            .unwrap(),
                        ),
                ),
        )
        .unwrap();
    model
        .add(
            ComponentType::new("counter")
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
            ComponentType::new("net")
                .with_child_slot(ChildSlot::single("src", "spiker"))
                .with_child_slot(ChildSlot::single("dst", "counter"))
                .with_structure(
                    Structure::new().with_event_connection(EventConnection::new("src", "dst")),
                ),
        )
        .unwrap();
    // The counter is declared first, so it steps before the spiker
    model
        .add(
            Component::new("net0", "net")
                .with_child(Component::new("c1", "counter"))
                .with_child(Component::new("s1", "spiker").with_parameter("rate", "10per_s")),
        )
        .unwrap();
    model
}

#[test]
fn test_events_are_consumed_on_next_step() {
    let model = spiking_model();
    let resolved = model.resolve().unwrap();
    let mut builder = SimulationBuilder::new(&resolved);
    let root = builder.add_run("net0", 0.01, 0.3).unwrap();
    builder.add_event_record(root, "src", "spike").unwrap();
    let mut sim = builder.build();

    step(&mut sim, 10);
    assert_abs_diff_eq!(sim.value("net0/src", "v").unwrap(), 0.0);
    assert_eq!(sim.value("net0/dst", "n"), Some(0.0));
    let dst = sim.lookup("net0/dst").unwrap();
    assert_eq!(sim.network().get(dst).unwrap().pending_events("in"), Some(1));

    step(&mut sim, 1);
    assert_eq!(sim.value("net0/dst", "n"), Some(1.0));
    assert_eq!(sim.network().get(dst).unwrap().pending_events("in"), Some(0));

    sim.run().unwrap();
    let src = sim.lookup("net0/src").unwrap();
    let log = sim.network().get(src).unwrap().event_log("spike").unwrap();
    assert_eq!(log.len(), 3);
    assert_abs_diff_eq!(log[0], 0.1, epsilon = 1e-9);
    // The spike from the final step is still waiting at the counter
    assert_eq!(sim.value("net0/dst", "n"), Some(2.0));
    assert_eq!(sim.network().get(dst).unwrap().pending_events("in"), Some(1));
}

#[test]
fn test_custom_callback_sees_emissions() {
    let model = spiking_model();
    let resolved = model.resolve().unwrap();
    let mut builder = SimulationBuilder::new(&resolved);
    let root = builder.add_run("net0", 0.01, 0.25).unwrap();
    builder.add_event_record(root, "src", "spike").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let src = builder.network().lookup("net0/src").unwrap();
    builder
        .network_mut()
        .get_mut(src)
        .unwrap()
        .register_event_out_callback("spike", EventCallback::custom(move |t| sink.lock().unwrap().push(t)))
        .unwrap();

    let mut sim = builder.build();
    sim.run().unwrap();

    let seen = seen.lock().unwrap().clone();
    let logged: Vec<f64> = sim
        .network()
        .get(src)
        .unwrap()
        .emitted_events()
        .iter()
        .map(|e: &EmittedEvent| e.time)
        .collect();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen, logged);
}

#[test]
fn test_missing_port_is_build_error() {
    let mut model = spiking_model();
    model
        .add(
            ComponentType::new("bad_net")
                .with_child_slot(ChildSlot::single("a", "counter"))
                .with_child_slot(ChildSlot::single("b", "counter"))
                .with_structure(Structure::new().with_event_connection(EventConnection::new("a", "b"))),
        )
        .unwrap();
    model
        .add(
            Component::new("bad0", "bad_net")
                .with_child(Component::new("ca", "counter"))
                .with_child(Component::new("cb", "counter")),
        )
        .unwrap();

    assert!(matches!(
        build(&model, "bad0", 0.01, 0.1),
        Err(Error::Build(SimBuildError::MissingPort { direction: "out", .. }))
    ));
}

// ============================================================================
// Selections
// ============================================================================

fn channel_model() -> Model {
    let mut model = Model::with_standard_units();
    model
        .add(ComponentType::new("channel").with_parameter(Parameter::new("g", "none")))
        .unwrap();
    model
        .add(
            ComponentType::new("cell")
                .with_child_slot(ChildSlot::collection("channels", "channel"))
                .with_dynamics(
                    Dynamics::new()
                        .with_derived_variable(DerivedVariable::select(
                            "gtotal",
                            "none",
                            "channels[*]/g",
                            Some(Reduce::Add),
                        ))
                        .with_derived_variable(DerivedVariable::select(
                            "gproduct",
                            "none",
                            "channels[*]/g",
                            Some(Reduce::Multiply),
                        ))
                        .with_derived_variable(DerivedVariable::new("gmean", "none", "gtotal / 2").unwrap()),
                ),
        )
        .unwrap();
    model
}

#[test]
fn test_select_reduces_over_collection() {
    let mut model = channel_model();
    model
        .add(
            Component::new("cell0", "cell")
                .with_child(Component::new("na", "channel").with_parameter("g", "2"))
                .with_child(Component::new("k", "channel").with_parameter("g", "3")),
        )
        .unwrap();

    let mut sim = build(&model, "cell0", 0.1, 1.0).unwrap();
    assert_eq!(sim.value("cell0", "gtotal"), Some(5.0));
    assert_eq!(sim.value("cell0", "gproduct"), Some(6.0));
    assert_eq!(sim.value("cell0", "gmean"), Some(2.5));

    sim.run().unwrap();
    assert_eq!(sim.value("cell0", "gtotal"), Some(5.0));
}

#[test]
fn test_select_over_empty_collection_uses_seed() {
    let mut model = channel_model();
    model.add(Component::new("bare", "cell")).unwrap();

    let sim = build(&model, "bare", 0.1, 1.0).unwrap();
    assert_eq!(sim.value("bare", "gtotal"), Some(0.0));
    assert_eq!(sim.value("bare", "gproduct"), Some(1.0));
}

#[test]
fn test_select_without_reduce_needs_single_value() {
    let mut model = channel_model();
    model
        .add(
            ComponentType::new("probe")
                .with_child_slot(ChildSlot::collection("channels", "channel"))
                .with_dynamics(Dynamics::new().with_derived_variable(DerivedVariable::select(
                    "g",
                    "none",
                    "channels[*]/g",
                    None,
                ))),
        )
        .unwrap();
    model
        .add(
            Component::new("probe0", "probe")
                .with_child(Component::new("c1", "channel").with_parameter("g", "1"))
                .with_child(Component::new("c2", "channel").with_parameter("g", "1")),
        )
        .unwrap();

    assert!(matches!(
        build(&model, "probe0", 0.1, 1.0),
        Err(Error::Build(SimBuildError::InvalidDerivedVariable { .. }))
    ));
}

// ============================================================================
// Kinetic Schemes
// ============================================================================

fn gate_model(state: Dynamics) -> Model {
    let mut model = Model::with_standard_units();
    model
        .add(ComponentType::new("state").with_dynamics(state))
        .unwrap();
    model
        .add(
            ComponentType::new("transition")
                .with_parameter(Parameter::link("from"))
                .with_parameter(Parameter::link("to"))
                .with_parameter(Parameter::new("rf", "per_time"))
                .with_parameter(Parameter::new("rr", "per_time")),
        )
        .unwrap();
    model
        .add(
            ComponentType::new("gate")
                .with_child_slot(ChildSlot::collection("states", "state"))
                .with_child_slot(ChildSlot::collection("transitions", "transition"))
                .with_dynamics(Dynamics::new().with_kinetic_scheme(KineticScheme {
                    name: "ks".into(),
                    nodes: "states".into(),
                    state_variable: "occupancy".into(),
                    edges: "transitions".into(),
                    edge_source: "from".into(),
                    edge_target: "to".into(),
                    forward_rate: "rf".into(),
                    reverse_rate: "rr".into(),
                })),
        )
        .unwrap();
    model
        .add(
            Component::new("gate0", "gate")
                .with_child(Component::new("closed", "state"))
                .with_child(Component::new("open", "state"))
                .with_child(
                    Component::new("t1", "transition")
                        .with_parameter("from", "closed")
                        .with_parameter("to", "open")
                        .with_parameter("rf", "100per_s")
                        .with_parameter("rr", "50per_s"),
                ),
        )
        .unwrap();
    model
}

#[test]
fn test_kinetic_scheme_stays_normalized() {
    let model = gate_model(Dynamics::new().with_state_variable(StateVariable::new("occupancy", "none")));
    let mut sim = build(&model, "gate0", 1.0e-4, 0.1).unwrap();
    assert_eq!(sim.value("gate0/closed", "occupancy"), Some(0.5));
    assert_eq!(sim.value("gate0/open", "occupancy"), Some(0.5));

    for _ in 0..100 {
        step(&mut sim, 10);
        let closed = sim.value("gate0/closed", "occupancy").unwrap();
        let open = sim.value("gate0/open", "occupancy").unwrap();
        assert_abs_diff_eq!(closed + open, 1.0, epsilon = 1e-12);
    }

    // Equilibrium: open / closed = rf / rr
    let open = sim.value("gate0/open", "occupancy").unwrap();
    assert_abs_diff_eq!(open, 2.0 / 3.0, epsilon = 1e-4);
}

#[test]
fn test_kinetic_scheme_renormalizes_occupancies() {
    // Both states start fully occupied
    let model = gate_model(
        Dynamics::new()
            .with_state_variable(StateVariable::new("occupancy", "none"))
            .with_handler(EventHandler::on_start(vec![Action::assign("occupancy", "1").unwrap()])),
    );
    let mut sim = build(&model, "gate0", 1.0e-4, 0.1).unwrap();
    assert_eq!(sim.value("gate0/closed", "occupancy"), Some(1.0));
    assert_eq!(sim.value("gate0/open", "occupancy"), Some(1.0));

    step(&mut sim, 1);
    let closed = sim.value("gate0/closed", "occupancy").unwrap();
    let open = sim.value("gate0/open", "occupancy").unwrap();
    // Flow of 1e-4 * (100 - 50) moves from closed to open, then both are scaled by 1/2
    assert_relative_eq!(closed, 0.995 / 2.0, epsilon = 1e-12);
    assert_relative_eq!(open, 1.005 / 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(closed + open, 1.0, epsilon = 1e-12);
}
