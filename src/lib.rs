//! # LEMS Runtime
//!
//! A runtime for hybrid dynamical models: component types with parameters,
//! state variables, time derivatives, event handlers, regimes and kinetic
//! schemes, composed into hierarchies and integrated with fixed timesteps.
//!
//! ## Pipeline
//!
//! - **Model**: component types and components are registered with
//!   [`Model::add`]. Parameter values are unit literals such as `"20ms"`.
//! - **Resolution**: [`Model::resolve`] flattens type inheritance, binds and
//!   converts parameters to SI values and produces fattened components.
//! - **Compilation**: a [`SimulationBuilder`] instantiates runnables, binds
//!   every expression to variable slots, orders derived variables and wires
//!   event connections.
//! - **Scheduling**: [`Simulation::run`] steps every run root at its own
//!   timestep in global time order.
//!
//! Within a step, expressions read the *shadow* (previous step) values of
//! state variables, so the order runnables step in never changes results.
//!
//! ## Quick Start
//!
//! ```rust
//! use lems_runtime::model::{ComponentType, Component, Dynamics, Model, Parameter, StateVariable, TimeDerivative};
//! use lems_runtime::SimulationBuilder;
//!
//! let leaky = ComponentType::new("leaky")
//!     .with_parameter(Parameter::new("tau", "time"))
//!     .with_dynamics(
//!         Dynamics::new()
//!             .with_state_variable(StateVariable::new("v", "none"))
//!             .with_time_derivative(TimeDerivative::new("v", "-v / tau").unwrap()),
//!     );
//!
//! let mut model = Model::with_standard_units();
//! model.add(leaky).unwrap();
//! model.add(Component::new("cell", "leaky").with_parameter("tau", "10ms")).unwrap();
//!
//! let resolved = model.resolve().unwrap();
//! let mut builder = SimulationBuilder::new(&resolved);
//! let cell = builder.add_run("cell", 1e-4, 0.01).unwrap();
//! builder.network_mut().get_mut(cell).unwrap().set_value("v", 1.0);
//!
//! let mut sim = builder.build();
//! sim.run().unwrap();
//! assert!(sim.value("cell", "v").unwrap() < 0.4);
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use lems_runtime::config::SimConfig;
//!
//! let config = SimConfig::from_file("runs.yaml")?;
//! builder.apply_config(&config)?;
//! ```

pub mod types;
pub mod error;
pub mod expr;
pub mod units;
pub mod model;
pub mod resolve;
pub mod compile;
pub mod runnable;
pub mod event;
pub mod engine;
pub mod config;
pub mod stats;

// Re-export commonly used types
pub use types::{PortId, RunnableId, SimTime};
pub use error::{Error, EvalError, ModelError, ParseError, Result, SimBuildError, SimError, UnitError};
pub use expr::Expression;
pub use units::UnitRegistry;
pub use model::{Component, ComponentType, Model};
pub use resolve::{FatComponent, ResolvedModel, ResolvedType};
pub use compile::SimulationBuilder;
pub use runnable::{Checkpoint, Network, Recording, Runnable, Snapshot, VariableStore};
pub use event::{EmittedEvent, EventCallback};
pub use engine::{Scheduler, SchedulerStats, Simulation, TraceEntry};
pub use config::{ConfigError, ConfigFormat, SimConfig, SimConfigBuilder};
pub use stats::{SimulationStats, StatsCollector, Timer};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// overrides `level` when set.
///
/// # Example
///
/// ```rust,ignore
/// lems_runtime::init_logging("debug");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
