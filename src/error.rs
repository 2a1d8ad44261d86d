//! Error taxonomy.
//!
//! Errors surface at the earliest phase that can detect them: expression
//! parsing, model resolution, runnable construction, and finally the run
//! itself. None of them are retried.

use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed expression text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos} in '{text}'")]
    UnexpectedChar { text: String, ch: char, pos: usize },

    #[error("invalid number '{literal}' in '{text}'")]
    InvalidNumber { text: String, literal: String },

    #[error("unknown operator '{op}' in '{text}'")]
    UnknownOperator { text: String, op: String },

    #[error("unknown function '{name}' in '{text}'")]
    UnknownFunction { text: String, name: String },

    #[error("unbalanced parentheses in '{0}'")]
    UnbalancedParens(String),

    #[error("missing operand in '{0}'")]
    MissingOperand(String),

    #[error("unexpected operand in '{0}'")]
    UnexpectedOperand(String),
}

/// Expression evaluation failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unresolved symbol '{0}'")]
    UnresolvedSymbol(String),
}

/// Unit literal conversion failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("invalid quantity literal '{0}'")]
    InvalidLiteral(String),

    #[error("unknown unit '{symbol}' in '{literal}'")]
    UnknownUnit { literal: String, symbol: String },

    #[error("'{literal}' has dimension '{found}', expected '{expected}'")]
    DimensionMismatch {
        literal: String,
        expected: String,
        found: String,
    },

    #[error("unit '{symbol}' refers to unknown dimension '{dimension}'")]
    UnknownDimension { symbol: String, dimension: String },
}

/// Inheritance conflicts, duplicate declarations, missing parameters and
/// dimension errors found while resolving the declarative model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("duplicate {kind} '{name}' in {owner}")]
    Duplicate {
        owner: String,
        kind: &'static str,
        name: String,
    },

    #[error("unknown component type '{name}' (referenced by {referrer})")]
    UnknownType { name: String, referrer: String },

    #[error("unknown component '{id}' (referenced by {referrer})")]
    UnknownComponent { id: String, referrer: String },

    #[error("cyclic inheritance through '{0}'")]
    CyclicInheritance(String),

    #[error("component '{component}' has no value for parameter '{parameter}'")]
    UnresolvedParameter { component: String, parameter: String },

    #[error("component '{component}' sets undeclared parameter '{parameter}'")]
    UndeclaredParameter { component: String, parameter: String },

    #[error("parameter '{parameter}' of '{component}': {source}")]
    Unit {
        component: String,
        parameter: String,
        #[source]
        source: UnitError,
    },

    #[error("'{name}' in '{owner}' cannot be evaluated: {source}")]
    Eval {
        owner: String,
        name: String,
        #[source]
        source: EvalError,
    },

    #[error("derived parameters {names:?} of '{owner}' depend on each other")]
    CyclicDerivedParameters { owner: String, names: Vec<String> },

    #[error("time derivative of '{variable}' in '{component_type}' targets no state variable")]
    InvalidTimeDerivative {
        component_type: String,
        variable: String,
    },

    #[error("component type '{0}' marks more than one regime as initial")]
    MultipleInitialRegimes(String),

    #[error("component '{component}' of type '{found}' is not accepted by '{expected}'")]
    TypeMismatch {
        component: String,
        expected: String,
        found: String,
    },

    #[error("component '{0}' has neither a type nor a base component")]
    Untyped(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Failures while turning a resolved component into runnables.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimBuildError {
    #[error("unresolved symbol '{symbol}' in '{runnable}'")]
    UnresolvedSymbol { runnable: String, symbol: String },

    #[error("cyclic dependency among derived variables {variables:?} in '{runnable}'")]
    CyclicDependency {
        runnable: String,
        variables: Vec<String>,
    },

    #[error("unresolvable component reference '{reference}' in '{runnable}'")]
    UnresolvedComponent { runnable: String, reference: String },

    #[error("derived variable '{variable}' in '{runnable}' {reason}")]
    InvalidDerivedVariable {
        runnable: String,
        variable: String,
        reason: &'static str,
    },

    #[error("'{runnable}' has no {direction} port{}", port_suffix(.port))]
    MissingPort {
        runnable: String,
        direction: &'static str,
        port: Option<String>,
    },

    #[error("'{runnable}' has several {direction} ports {candidates:?}; name one explicitly")]
    AmbiguousPort {
        runnable: String,
        direction: &'static str,
        candidates: Vec<String>,
    },

    #[error("unknown regime '{regime}' in '{runnable}'")]
    UnknownRegime { runnable: String, regime: String },

    #[error("path '{path}' not found from '{runnable}'")]
    PathNotFound { runnable: String, path: String },

    #[error("parameter '{parameter}' of '{runnable}' is not {expected}")]
    ParameterKind {
        runnable: String,
        parameter: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Unit(#[from] UnitError),
}

fn port_suffix(port: &Option<String>) -> String {
    port.as_ref().map(|p| format!(" '{p}'")).unwrap_or_default()
}

/// Run-time misuse of the network or the scheduler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("duplicate runnable id '{0}'")]
    DuplicateRunnable(String),

    #[error("runnable '{0}' is not configured with a positive timestep")]
    NotConfigured(String),

    #[error("invalid timestep {timestep} / duration {total} for '{runnable}'")]
    InvalidTiming {
        runnable: String,
        timestep: f64,
        total: f64,
    },

    #[error("unknown runnable handle {0}")]
    UnknownRunnable(usize),

    #[error("checkpoint covers {expected} runnables but the network has {found}")]
    CheckpointMismatch { expected: usize, found: usize },
}

/// Umbrella error for callers driving the whole pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Build(#[from] SimBuildError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}
