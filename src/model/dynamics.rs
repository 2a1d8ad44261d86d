//! Declarative dynamics: regimes, variables, handlers and kinetic schemes.

use crate::error::ParseError;
use crate::expr::Expression;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateVariable {
    pub name: String,
    pub dimension: String,
}

impl StateVariable {
    pub fn new(name: impl Into<String>, dimension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dimension: dimension.into(),
        }
    }
}

/// `d(variable)/dt = value`
#[derive(Clone, Debug, PartialEq)]
pub struct TimeDerivative {
    pub variable: String,
    pub value: Expression,
}

impl TimeDerivative {
    pub fn new(variable: impl Into<String>, value: &str) -> Result<Self, ParseError> {
        Ok(Self {
            variable: variable.into(),
            value: Expression::parse(value)?,
        })
    }
}

/// Aggregation applied over a selection of runnables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reduce {
    Add,
    Multiply,
}

impl Reduce {
    /// Value of an empty selection.
    pub fn seed(self) -> f64 {
        match self {
            Reduce::Add => 0.0,
            Reduce::Multiply => 1.0,
        }
    }

    pub fn combine(self, acc: f64, value: f64) -> f64 {
        match self {
            Reduce::Add => acc + value,
            Reduce::Multiply => acc * value,
        }
    }
}

/// A variable recomputed every step, either from an expression or by
/// selecting a quantity across other runnables.
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedVariable {
    pub name: String,
    pub dimension: String,
    pub value: Option<Expression>,
    pub select: Option<String>,
    pub reduce: Option<Reduce>,
}

impl DerivedVariable {
    pub fn new(
        name: impl Into<String>,
        dimension: impl Into<String>,
        value: &str,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            name: name.into(),
            dimension: dimension.into(),
            value: Some(Expression::parse(value)?),
            select: None,
            reduce: None,
        })
    }

    /// A variable aggregating the quantity at `path` (e.g. `channels[*]/g`).
    pub fn select(
        name: impl Into<String>,
        dimension: impl Into<String>,
        path: impl Into<String>,
        reduce: Option<Reduce>,
    ) -> Self {
        Self {
            name: name.into(),
            dimension: dimension.into(),
            value: None,
            select: Some(path.into()),
            reduce,
        }
    }
}

/// One branch of a conditional derived variable; `condition: None` is the
/// fallback branch.
#[derive(Clone, Debug, PartialEq)]
pub struct Case {
    pub condition: Option<Expression>,
    pub value: Expression,
}

impl Case {
    pub fn when(condition: &str, value: &str) -> Result<Self, ParseError> {
        Ok(Self {
            condition: Some(Expression::parse(condition)?),
            value: Expression::parse(value)?,
        })
    }

    pub fn otherwise(value: &str) -> Result<Self, ParseError> {
        Ok(Self {
            condition: None,
            value: Expression::parse(value)?,
        })
    }
}

/// A derived variable taking the value of the first case whose condition
/// holds.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionalDerivedVariable {
    pub name: String,
    pub dimension: String,
    pub cases: Vec<Case>,
}

impl ConditionalDerivedVariable {
    pub fn new(name: impl Into<String>, dimension: impl Into<String>, cases: Vec<Case>) -> Self {
        Self {
            name: name.into(),
            dimension: dimension.into(),
            cases,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    StateAssignment { variable: String, value: Expression },
    EventOut { port: String },
    Transition { regime: String },
}

impl Action {
    pub fn assign(variable: impl Into<String>, value: &str) -> Result<Self, ParseError> {
        Ok(Action::StateAssignment {
            variable: variable.into(),
            value: Expression::parse(value)?,
        })
    }

    pub fn event_out(port: impl Into<String>) -> Self {
        Action::EventOut { port: port.into() }
    }

    pub fn transition(regime: impl Into<String>) -> Self {
        Action::Transition {
            regime: regime.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventHandler {
    /// Runs once when the runnable is initialized.
    OnStart { actions: Vec<Action> },
    /// Runs on the first step after the owning regime becomes active.
    OnEntry { actions: Vec<Action> },
    /// Runs once per event queued on `port`.
    OnEvent { port: String, actions: Vec<Action> },
    /// Runs whenever `test` holds after derived variables are updated.
    OnCondition { test: Expression, actions: Vec<Action> },
}

impl EventHandler {
    pub fn on_start(actions: Vec<Action>) -> Self {
        EventHandler::OnStart { actions }
    }

    pub fn on_entry(actions: Vec<Action>) -> Self {
        EventHandler::OnEntry { actions }
    }

    pub fn on_event(port: impl Into<String>, actions: Vec<Action>) -> Self {
        EventHandler::OnEvent {
            port: port.into(),
            actions,
        }
    }

    pub fn on_condition(test: &str, actions: Vec<Action>) -> Result<Self, ParseError> {
        Ok(EventHandler::OnCondition {
            test: Expression::parse(test)?,
            actions,
        })
    }

    pub fn actions(&self) -> &[Action] {
        match self {
            EventHandler::OnStart { actions }
            | EventHandler::OnEntry { actions }
            | EventHandler::OnEvent { actions, .. }
            | EventHandler::OnCondition { actions, .. } => actions,
        }
    }
}

/// Population flow between the nodes of a children collection.
///
/// Each edge runnable links a source and a target node through its
/// `edge_source`/`edge_target` link parameters and exposes forward and
/// reverse rates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KineticScheme {
    pub name: String,
    pub nodes: String,
    pub state_variable: String,
    pub edges: String,
    pub edge_source: String,
    pub edge_target: String,
    pub forward_rate: String,
    pub reverse_rate: String,
}

/// One hybrid-automaton state. The unnamed default regime is always active.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Regime {
    pub name: String,
    pub initial: bool,
    pub state_variables: Vec<StateVariable>,
    pub time_derivatives: Vec<TimeDerivative>,
    pub derived_variables: Vec<DerivedVariable>,
    pub conditional_derived_variables: Vec<ConditionalDerivedVariable>,
    pub event_handlers: Vec<EventHandler>,
    pub kinetic_schemes: Vec<KineticScheme>,
}

impl Regime {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    pub fn with_state_variable(mut self, variable: StateVariable) -> Self {
        self.state_variables.push(variable);
        self
    }

    pub fn with_time_derivative(mut self, derivative: TimeDerivative) -> Self {
        self.time_derivatives.push(derivative);
        self
    }

    pub fn with_derived_variable(mut self, variable: DerivedVariable) -> Self {
        self.derived_variables.push(variable);
        self
    }

    pub fn with_conditional_derived_variable(mut self, variable: ConditionalDerivedVariable) -> Self {
        self.conditional_derived_variables.push(variable);
        self
    }

    pub fn with_handler(mut self, handler: EventHandler) -> Self {
        self.event_handlers.push(handler);
        self
    }

    pub fn with_kinetic_scheme(mut self, scheme: KineticScheme) -> Self {
        self.kinetic_schemes.push(scheme);
        self
    }
}

/// Default regime plus named regimes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dynamics {
    pub default: Regime,
    pub regimes: Vec<Regime>,
}

impl Dynamics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state_variable(mut self, variable: StateVariable) -> Self {
        self.default.state_variables.push(variable);
        self
    }

    pub fn with_time_derivative(mut self, derivative: TimeDerivative) -> Self {
        self.default.time_derivatives.push(derivative);
        self
    }

    pub fn with_derived_variable(mut self, variable: DerivedVariable) -> Self {
        self.default.derived_variables.push(variable);
        self
    }

    pub fn with_conditional_derived_variable(mut self, variable: ConditionalDerivedVariable) -> Self {
        self.default.conditional_derived_variables.push(variable);
        self
    }

    pub fn with_handler(mut self, handler: EventHandler) -> Self {
        self.default.event_handlers.push(handler);
        self
    }

    pub fn with_kinetic_scheme(mut self, scheme: KineticScheme) -> Self {
        self.default.kinetic_schemes.push(scheme);
        self
    }

    pub fn with_regime(mut self, regime: Regime) -> Self {
        self.regimes.push(regime);
        self
    }
}
