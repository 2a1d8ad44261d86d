//! Declarative model: dimensions, units, component types, components,
//! constants and simulation targets.
//!
//! A [`Model`] is populated through [`Model::add`] and then resolved into a
//! fully bound [`ResolvedModel`](crate::resolve::ResolvedModel).

pub mod component;
pub mod dynamics;
pub mod simulation;
pub mod structure;

pub use component::{
    Attachments, ChildSlot, Component, ComponentType, Constant, DerivedParameter, EventPort,
    Exposure, Parameter, ParameterKind, PortDirection, Requirement,
};
pub use dynamics::{
    Action, Case, ConditionalDerivedVariable, DerivedVariable, Dynamics, EventHandler,
    KineticScheme, Reduce, Regime, StateVariable, TimeDerivative,
};
pub use simulation::{EventRecord, Record, Run, SimulationSpec};
pub use structure::{ChildInstance, EventConnection, ForEach, MultiInstantiate, Structure, With};

use indexmap::IndexMap;
use tracing::debug;

use crate::error::ModelError;
use crate::resolve::{ResolvedModel, Resolver};
use crate::units::{Dimension, Unit, UnitRegistry};

const MODEL: &str = "model";

/// Marks a component as a root to simulate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub component: String,
}

impl Target {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }
}

/// Anything that can be added to a [`Model`].
#[derive(Clone, Debug)]
pub enum Entity {
    Dimension(Dimension),
    Unit(Unit),
    ComponentType(ComponentType),
    Component(Component),
    Constant(Constant),
    Target(Target),
}

impl From<Dimension> for Entity {
    fn from(value: Dimension) -> Self {
        Entity::Dimension(value)
    }
}

impl From<Unit> for Entity {
    fn from(value: Unit) -> Self {
        Entity::Unit(value)
    }
}

impl From<ComponentType> for Entity {
    fn from(value: ComponentType) -> Self {
        Entity::ComponentType(value)
    }
}

impl From<Component> for Entity {
    fn from(value: Component) -> Self {
        Entity::Component(value)
    }
}

impl From<Constant> for Entity {
    fn from(value: Constant) -> Self {
        Entity::Constant(value)
    }
}

impl From<Target> for Entity {
    fn from(value: Target) -> Self {
        Entity::Target(value)
    }
}

/// Container for everything a simulation is resolved from.
#[derive(Clone, Debug, Default)]
pub struct Model {
    units: UnitRegistry,
    component_types: IndexMap<String, ComponentType>,
    components: IndexMap<String, Component>,
    constants: IndexMap<String, Constant>,
    targets: Vec<Target>,
    next_id: usize,
}

impl Model {
    /// An empty model with no dimensions or units.
    pub fn new() -> Self {
        Self::default()
    }

    /// A model pre-populated with [`UnitRegistry::standard`].
    pub fn with_standard_units() -> Self {
        Self {
            units: UnitRegistry::standard(),
            ..Self::default()
        }
    }

    /// Adds an entity. Names and ids must be unique per entity kind.
    ///
    /// Components without an id (and their nested children) receive a
    /// generated one.
    pub fn add(&mut self, entity: impl Into<Entity>) -> Result<(), ModelError> {
        match entity.into() {
            Entity::Dimension(dimension) => {
                if self.units.dimension(&dimension.name).is_some() {
                    return Err(duplicate("dimension", &dimension.name));
                }
                self.units.add_dimension(dimension);
            }
            Entity::Unit(unit) => {
                if self.units.unit(&unit.symbol).is_some() {
                    return Err(duplicate("unit", &unit.symbol));
                }
                self.units.add_unit(unit);
            }
            Entity::ComponentType(component_type) => {
                if self.component_types.contains_key(&component_type.name) {
                    return Err(duplicate("component type", &component_type.name));
                }
                debug!(name = %component_type.name, "Adding component type");
                self.component_types
                    .insert(component_type.name.clone(), component_type);
            }
            Entity::Component(mut component) => {
                self.assign_ids(&mut component);
                if self.components.contains_key(&component.id) {
                    return Err(duplicate("component", &component.id));
                }
                debug!(id = %component.id, "Adding component");
                self.components.insert(component.id.clone(), component);
            }
            Entity::Constant(constant) => {
                if self.constants.contains_key(&constant.name) {
                    return Err(duplicate("constant", &constant.name));
                }
                self.constants.insert(constant.name.clone(), constant);
            }
            Entity::Target(target) => self.targets.push(target),
        }
        Ok(())
    }

    fn assign_ids(&mut self, component: &mut Component) {
        if component.id.is_empty() {
            let stem = component
                .type_name
                .as_deref()
                .or(component.extends.as_deref())
                .unwrap_or("component");
            component.id = format!("{stem}__{}", self.next_id);
            self.next_id += 1;
        }
        for child in &mut component.children {
            self.assign_ids(child);
        }
    }

    /// Resolves types and components into bound numeric form.
    pub fn resolve(&self) -> Result<ResolvedModel, ModelError> {
        Resolver::new(self).resolve()
    }

    pub fn units(&self) -> &UnitRegistry {
        &self.units
    }

    pub fn component_type(&self, name: &str) -> Option<&ComponentType> {
        self.component_types.get(name)
    }

    pub fn component_types(&self) -> impl Iterator<Item = &ComponentType> {
        self.component_types.values()
    }

    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.get(id)
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn constants(&self) -> impl Iterator<Item = &Constant> {
        self.constants.values()
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }
}

fn duplicate(kind: &'static str, name: &str) -> ModelError {
    ModelError::Duplicate {
        owner: MODEL.to_string(),
        kind,
        name: name.to_string(),
    }
}
