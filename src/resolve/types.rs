//! Resolved component types: declarations merged along the extends chain.

use indexmap::{IndexMap, IndexSet};

use crate::error::ModelError;
use crate::model::{
    Attachments, ChildSlot, ComponentType, ConditionalDerivedVariable, Constant, DerivedParameter,
    DerivedVariable, EventHandler, EventPort, Exposure, KineticScheme, Parameter, Regime,
    Requirement, SimulationSpec, StateVariable, Structure, TimeDerivative,
};

/// A regime with its declarations keyed by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedRegime {
    pub name: String,
    pub initial: bool,
    pub state_variables: IndexMap<String, StateVariable>,
    /// Keyed by the target state variable.
    pub time_derivatives: IndexMap<String, TimeDerivative>,
    pub derived_variables: IndexMap<String, DerivedVariable>,
    pub conditional_derived_variables: IndexMap<String, ConditionalDerivedVariable>,
    pub event_handlers: Vec<EventHandler>,
    pub kinetic_schemes: Vec<KineticScheme>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedDynamics {
    pub default: ResolvedRegime,
    pub regimes: IndexMap<String, ResolvedRegime>,
}

impl ResolvedDynamics {
    /// Name of the regime flagged initial, if any.
    pub fn initial_regime(&self) -> Option<&str> {
        self.regimes
            .values()
            .find(|r| r.initial)
            .map(|r| r.name.as_str())
    }

    /// Every state variable across all regimes, default regime first.
    pub fn state_variables(&self) -> impl Iterator<Item = &StateVariable> {
        self.default
            .state_variables
            .values()
            .chain(self.regimes.values().flat_map(|r| r.state_variables.values()))
    }

    /// Every derived variable name across all regimes, without repeats.
    pub fn derived_names(&self) -> IndexSet<&str> {
        std::iter::once(&self.default)
            .chain(self.regimes.values())
            .flat_map(|r| {
                r.derived_variables
                    .keys()
                    .chain(r.conditional_derived_variables.keys())
            })
            .map(String::as_str)
            .collect()
    }
}

/// A component type with inheritance applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedType {
    pub name: String,
    /// Own name plus the names of every ancestor type.
    pub accepted: IndexSet<String>,
    pub parameters: IndexMap<String, Parameter>,
    pub derived_parameters: IndexMap<String, DerivedParameter>,
    pub constants: IndexMap<String, Constant>,
    pub exposures: IndexMap<String, Exposure>,
    pub requirements: IndexMap<String, Requirement>,
    pub event_ports: IndexMap<String, EventPort>,
    pub child_slots: IndexMap<String, ChildSlot>,
    pub attachments: IndexMap<String, Attachments>,
    pub dynamics: ResolvedDynamics,
    pub structure: Structure,
    pub simulation: SimulationSpec,
}

impl ResolvedType {
    /// Indexes a type's own declarations, rejecting duplicates.
    pub(crate) fn from_declared(declared: &ComponentType) -> Result<Self, ModelError> {
        let owner = declared.name.as_str();
        let mut accepted = IndexSet::new();
        accepted.insert(declared.name.clone());

        Ok(Self {
            name: declared.name.clone(),
            accepted,
            parameters: keyed(owner, "parameter", &declared.parameters, |p| &p.name)?,
            derived_parameters: keyed(
                owner,
                "derived parameter",
                &declared.derived_parameters,
                |p| &p.name,
            )?,
            constants: keyed(owner, "constant", &declared.constants, |c| &c.name)?,
            exposures: keyed(owner, "exposure", &declared.exposures, |e| &e.name)?,
            requirements: keyed(owner, "requirement", &declared.requirements, |r| &r.name)?,
            event_ports: keyed(owner, "event port", &declared.event_ports, |p| &p.name)?,
            child_slots: keyed(owner, "child slot", &declared.child_slots, |s| &s.name)?,
            attachments: keyed(owner, "attachments", &declared.attachments, |a| &a.name)?,
            dynamics: ResolvedDynamics {
                default: resolve_regime(owner, &declared.dynamics.default)?,
                regimes: {
                    let mut regimes = IndexMap::new();
                    for regime in &declared.dynamics.regimes {
                        let resolved = resolve_regime(owner, regime)?;
                        if regimes.insert(regime.name.clone(), resolved).is_some() {
                            return Err(duplicate(owner, "regime", &regime.name));
                        }
                    }
                    regimes
                },
            },
            structure: declared.structure.clone(),
            simulation: declared.simulation.clone(),
        })
    }

    /// Layers this type's declarations over an already resolved base.
    pub(crate) fn inherit(self, base: &ResolvedType) -> Result<Self, ModelError> {
        let owner = self.name.clone();

        let mut accepted = self.accepted;
        accepted.extend(base.accepted.iter().cloned());

        let mut structure = base.structure.clone();
        structure.extend(&self.structure);
        let mut simulation = base.simulation.clone();
        simulation.extend(&self.simulation);

        Ok(Self {
            name: self.name,
            accepted,
            parameters: overriding(&base.parameters, self.parameters),
            derived_parameters: overriding(&base.derived_parameters, self.derived_parameters),
            constants: overriding(&base.constants, self.constants),
            exposures: overriding(&base.exposures, self.exposures),
            requirements: overriding(&base.requirements, self.requirements),
            event_ports: overriding(&base.event_ports, self.event_ports),
            child_slots: overriding(&base.child_slots, self.child_slots),
            attachments: overriding(&base.attachments, self.attachments),
            dynamics: inherit_dynamics(&owner, &base.dynamics, self.dynamics)?,
            structure,
            simulation,
        })
    }

    /// Applies `Fixed` values to declared or inherited parameters.
    pub(crate) fn apply_fixed(&mut self, declared: &ComponentType) -> Result<(), ModelError> {
        for (name, literal) in &declared.fixed {
            let parameter =
                self.parameters
                    .get_mut(name)
                    .ok_or_else(|| ModelError::UndeclaredParameter {
                        component: self.name.clone(),
                        parameter: name.clone(),
                    })?;
            parameter.value = Some(literal.clone());
        }
        Ok(())
    }

    /// Post-merge checks: name clashes across declaration kinds within each
    /// regime configuration, time-derivative targets, and the initial regime.
    pub(crate) fn validate(&self) -> Result<(), ModelError> {
        let owner = self.name.as_str();

        let mut statics: IndexSet<&str> = IndexSet::new();
        for name in self
            .parameters
            .keys()
            .chain(self.derived_parameters.keys())
            .chain(self.constants.keys())
        {
            if !statics.insert(name.as_str()) {
                return Err(duplicate(owner, "name", name));
            }
        }

        let default = &self.dynamics.default;
        check_configuration(owner, &statics, &[default])?;
        check_derivatives(owner, default, None)?;
        for regime in self.dynamics.regimes.values() {
            check_configuration(owner, &statics, &[default, regime])?;
            check_derivatives(owner, default, Some(regime))?;
        }

        let initial = self.dynamics.regimes.values().filter(|r| r.initial).count();
        if initial > 1 {
            return Err(ModelError::MultipleInitialRegimes(self.name.clone()));
        }
        Ok(())
    }

    /// True if a component of this type fills a slot declared for `type_name`.
    pub fn is_a(&self, type_name: &str) -> bool {
        type_name.is_empty() || self.accepted.contains(type_name)
    }
}

fn check_configuration(
    owner: &str,
    statics: &IndexSet<&str>,
    regimes: &[&ResolvedRegime],
) -> Result<(), ModelError> {
    let mut seen = statics.clone();
    for regime in regimes {
        for name in regime
            .state_variables
            .keys()
            .chain(regime.derived_variables.keys())
            .chain(regime.conditional_derived_variables.keys())
        {
            if !seen.insert(name.as_str()) {
                return Err(duplicate(owner, "name", name));
            }
        }
    }
    Ok(())
}

fn check_derivatives(
    owner: &str,
    default: &ResolvedRegime,
    regime: Option<&ResolvedRegime>,
) -> Result<(), ModelError> {
    let checked = regime.unwrap_or(default);
    for variable in checked.time_derivatives.keys() {
        let declared = default.state_variables.contains_key(variable)
            || regime.is_some_and(|r| r.state_variables.contains_key(variable));
        if !declared {
            return Err(ModelError::InvalidTimeDerivative {
                component_type: owner.to_string(),
                variable: variable.clone(),
            });
        }
    }
    Ok(())
}

fn resolve_regime(owner: &str, regime: &Regime) -> Result<ResolvedRegime, ModelError> {
    Ok(ResolvedRegime {
        name: regime.name.clone(),
        initial: regime.initial,
        state_variables: keyed(owner, "state variable", &regime.state_variables, |s| &s.name)?,
        time_derivatives: keyed(
            owner,
            "time derivative",
            &regime.time_derivatives,
            |t| &t.variable,
        )?,
        derived_variables: keyed(
            owner,
            "derived variable",
            &regime.derived_variables,
            |d| &d.name,
        )?,
        conditional_derived_variables: keyed(
            owner,
            "conditional derived variable",
            &regime.conditional_derived_variables,
            |d| &d.name,
        )?,
        event_handlers: regime.event_handlers.clone(),
        kinetic_schemes: regime.kinetic_schemes.clone(),
    })
}

fn inherit_dynamics(
    owner: &str,
    base: &ResolvedDynamics,
    own: ResolvedDynamics,
) -> Result<ResolvedDynamics, ModelError> {
    let default = inherit_regime(owner, &base.default, own.default)?;
    let mut regimes = base.regimes.clone();
    for (name, regime) in own.regimes {
        let merged = match base.regimes.get(&name) {
            Some(base_regime) => inherit_regime(owner, base_regime, regime)?,
            None => regime,
        };
        regimes.insert(name, merged);
    }
    Ok(ResolvedDynamics { default, regimes })
}

fn inherit_regime(
    owner: &str,
    base: &ResolvedRegime,
    own: ResolvedRegime,
) -> Result<ResolvedRegime, ModelError> {
    let mut event_handlers = base.event_handlers.clone();
    event_handlers.extend(own.event_handlers);
    let mut kinetic_schemes = base.kinetic_schemes.clone();
    kinetic_schemes.extend(own.kinetic_schemes);

    Ok(ResolvedRegime {
        name: own.name,
        initial: own.initial || base.initial,
        state_variables: strict(owner, "state variable", &base.state_variables, own.state_variables)?,
        time_derivatives: strict(
            owner,
            "time derivative",
            &base.time_derivatives,
            own.time_derivatives,
        )?,
        derived_variables: strict(
            owner,
            "derived variable",
            &base.derived_variables,
            own.derived_variables,
        )?,
        conditional_derived_variables: strict(
            owner,
            "conditional derived variable",
            &base.conditional_derived_variables,
            own.conditional_derived_variables,
        )?,
        event_handlers,
        kinetic_schemes,
    })
}

fn keyed<T: Clone>(
    owner: &str,
    kind: &'static str,
    items: &[T],
    name: impl Fn(&T) -> &String,
) -> Result<IndexMap<String, T>, ModelError> {
    let mut map = IndexMap::with_capacity(items.len());
    for item in items {
        if map.insert(name(item).clone(), item.clone()).is_some() {
            return Err(duplicate(owner, kind, name(item)));
        }
    }
    Ok(map)
}

/// Base entries first; a derived entry replaces the base's in place.
fn overriding<T: Clone>(
    base: &IndexMap<String, T>,
    own: IndexMap<String, T>,
) -> IndexMap<String, T> {
    let mut merged = base.clone();
    for (name, item) in own {
        merged.insert(name, item);
    }
    merged
}

fn strict<T: Clone>(
    owner: &str,
    kind: &'static str,
    base: &IndexMap<String, T>,
    own: IndexMap<String, T>,
) -> Result<IndexMap<String, T>, ModelError> {
    let mut merged = base.clone();
    for (name, item) in own {
        if merged.contains_key(&name) {
            return Err(duplicate(owner, kind, &name));
        }
        merged.insert(name, item);
    }
    Ok(merged)
}

fn duplicate(owner: &str, kind: &'static str, name: &str) -> ModelError {
    ModelError::Duplicate {
        owner: owner.to_string(),
        kind,
        name: name.to_string(),
    }
}
