//! Bound expressions and the compiled per-configuration procedures.

use indexmap::{IndexMap, IndexSet};

use crate::error::SimBuildError;
use crate::expr::{Expr, Expression};
use crate::model::{KineticScheme, Reduce, Requirement};
use crate::runnable::{Network, Runnable};
use crate::types::{RunnableId, SimTime};

/// Where a bound symbol reads its value from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Source {
    /// Elapsed time of the runnable.
    Time,
    /// Model constant, inlined.
    Const(f64),
    /// Current value of an own slot.
    Current(usize),
    /// Last committed value of an own slot.
    Shadow(usize),
    /// Current value of a slot of another runnable.
    Remote { runnable: RunnableId, slot: usize },
}

pub type BoundExpr = Expr<Source>;

/// Evaluates a bound expression against the network.
///
/// `own` is the runnable the expression was bound for.
pub(crate) fn eval(runnables: &[Runnable], own: RunnableId, expr: &BoundExpr, time: SimTime) -> f64 {
    let store = &runnables[own.0].store;
    expr.eval(|source| match *source {
        Source::Time => time,
        Source::Const(value) => value,
        Source::Current(slot) => store.value(slot),
        Source::Shadow(slot) => store.shadow(slot),
        Source::Remote { runnable, slot } => runnables[runnable.0].store.value(slot),
    })
}

#[derive(Clone, Debug)]
pub(crate) enum BoundAction {
    Assign { slot: usize, value: BoundExpr },
    EventOut { port: String },
    Transition { regime: usize },
}

#[derive(Clone, Debug)]
pub(crate) enum DerivedStep {
    Value {
        slot: usize,
        value: BoundExpr,
    },
    Cases {
        slot: usize,
        cases: Vec<(Option<BoundExpr>, BoundExpr)>,
    },
    Select {
        slot: usize,
        name: String,
        path: String,
        reduce: Option<Reduce>,
        /// Filled by the link pass.
        sources: Vec<(RunnableId, usize)>,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct BoundEdge {
    pub source: usize,
    pub target: usize,
    pub forward: (RunnableId, usize),
    pub reverse: (RunnableId, usize),
}

/// Node populations and the edges moving occupancy between them.
#[derive(Clone, Debug, Default)]
pub(crate) struct BoundKinetic {
    pub nodes: Vec<(RunnableId, usize)>,
    pub edges: Vec<BoundEdge>,
}

/// Compiled procedures of one regime configuration.
#[derive(Clone, Debug, Default)]
pub(crate) struct Program {
    pub time_derivatives: Vec<(usize, BoundExpr)>,
    pub derived: Vec<DerivedStep>,
    pub on_start: Vec<BoundAction>,
    pub on_entry: Vec<BoundAction>,
    pub on_event: Vec<(String, Vec<BoundAction>)>,
    pub on_condition: Vec<(BoundExpr, Vec<BoundAction>)>,
    pub kinetic_schemes: Vec<KineticScheme>,
    /// Filled by the link pass, parallel to `kinetic_schemes`.
    pub kinetics: Vec<BoundKinetic>,
}

/// Resolves names used by one runnable's expressions to storage.
pub(crate) struct Binder<'a> {
    pub network: &'a Network,
    pub runnable: RunnableId,
    pub constants: &'a IndexMap<String, f64>,
    pub requirements: &'a IndexMap<String, Requirement>,
    /// Derived variables of the configuration being compiled.
    pub derived: &'a IndexSet<String>,
}

impl Binder<'_> {
    fn owner(&self) -> &Runnable {
        self.network.runnable(self.runnable)
    }

    fn unresolved(&self, symbol: &str) -> SimBuildError {
        SimBuildError::UnresolvedSymbol {
            runnable: self.owner().id().to_string(),
            symbol: symbol.to_string(),
        }
    }

    /// Binds one symbol; `in_derivative` selects shadow reads for own
    /// non-derived names.
    pub fn source(&self, symbol: &str, in_derivative: bool) -> Result<Source, SimBuildError> {
        if symbol == "t" {
            return Ok(Source::Time);
        }
        if let Some(&value) = self.constants.get(symbol) {
            return Ok(Source::Const(value));
        }
        if self.requirements.contains_key(symbol) {
            let mut ancestor = self.owner().parent();
            while let Some(id) = ancestor {
                let runnable = self.network.runnable(id);
                if let Some(slot) = runnable.store.slot(symbol) {
                    return Ok(Source::Remote { runnable: id, slot });
                }
                ancestor = runnable.parent();
            }
            return Err(self.unresolved(symbol));
        }
        let slot = self
            .owner()
            .store
            .slot(symbol)
            .ok_or_else(|| self.unresolved(symbol))?;
        if in_derivative && !self.derived.contains(symbol) {
            Ok(Source::Shadow(slot))
        } else {
            Ok(Source::Current(slot))
        }
    }

    pub fn bind(&self, expression: &Expression, in_derivative: bool) -> Result<BoundExpr, SimBuildError> {
        expression
            .ast()
            .map_symbols(&mut |symbol: &String| self.source(symbol, in_derivative))
    }

    /// Slot of an own variable targeted by an assignment or derivative.
    pub fn slot(&self, name: &str) -> Result<usize, SimBuildError> {
        self.owner()
            .store
            .slot(name)
            .ok_or_else(|| self.unresolved(name))
    }
}
