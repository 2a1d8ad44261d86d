//! Component types and components.

use indexmap::IndexMap;

use crate::error::ParseError;
use crate::expr::Expression;
use crate::model::dynamics::Dynamics;
use crate::model::simulation::SimulationSpec;
use crate::model::structure::Structure;

/// What a declared parameter holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    /// A numeric quantity of the named dimension.
    Quantity(String),
    /// Free text.
    Text,
    /// A path to a runnable or quantity, kept as text.
    Path,
    /// The id of a sibling component, kept as text.
    Link,
    /// The id of another component, which is resolved along with the owner.
    /// An empty `accepts` admits any type.
    ComponentRef { accepts: String },
}

/// A declared parameter, optionally with a fixed (default) literal.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub value: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, dimension: impl Into<String>) -> Self {
        Self::with_kind(name, ParameterKind::Quantity(dimension.into()))
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParameterKind::Text)
    }

    pub fn path(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParameterKind::Path)
    }

    pub fn link(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParameterKind::Link)
    }

    pub fn component_ref(name: impl Into<String>, accepts: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            ParameterKind::ComponentRef {
                accepts: accepts.into(),
            },
        )
    }

    fn with_kind(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value: None,
        }
    }

    /// Sets the fixed value used when a component does not provide one.
    pub fn with_value(mut self, literal: impl Into<String>) -> Self {
        self.value = Some(literal.into());
        self
    }
}

/// A parameter computed from other parameters and constants.
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedParameter {
    pub name: String,
    pub dimension: String,
    pub value: Expression,
}

impl DerivedParameter {
    pub fn new(
        name: impl Into<String>,
        dimension: impl Into<String>,
        value: &str,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            name: name.into(),
            dimension: dimension.into(),
            value: Expression::parse(value)?,
        })
    }
}

/// A named constant with a unit literal, declared on a type or on the model.
#[derive(Clone, Debug, PartialEq)]
pub struct Constant {
    pub name: String,
    pub dimension: String,
    pub value: String,
}

impl Constant {
    pub fn new(
        name: impl Into<String>,
        dimension: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dimension: dimension.into(),
            value: value.into(),
        }
    }
}

/// A quantity made visible to parents, paths and recorders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exposure {
    pub name: String,
    pub dimension: String,
}

impl Exposure {
    pub fn new(name: impl Into<String>, dimension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dimension: dimension.into(),
        }
    }
}

/// A quantity a component reads from its nearest ancestor that has it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub dimension: String,
}

impl Requirement {
    pub fn new(name: impl Into<String>, dimension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dimension: dimension.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortDirection {
    In,
    Out,
}

impl PortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            PortDirection::In => "in",
            PortDirection::Out => "out",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventPort {
    pub name: String,
    pub direction: PortDirection,
}

impl EventPort {
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::In,
        }
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Out,
        }
    }
}

/// A slot for nested components: a single `Child` or a `Children` collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildSlot {
    pub name: String,
    pub type_name: String,
    pub multiple: bool,
}

impl ChildSlot {
    pub fn single(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            multiple: false,
        }
    }

    pub fn collection(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            multiple: true,
        }
    }
}

/// A collection filled at build time, e.g. by event-connection receivers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachments {
    pub name: String,
    pub type_name: String,
}

impl Attachments {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Reusable declaration of parameters, dynamics and structure.
///
/// Declarations are kept as ordered lists exactly as written; duplicate
/// detection and inheritance happen during resolution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComponentType {
    pub name: String,
    pub extends: Option<String>,
    pub parameters: Vec<Parameter>,
    /// Values fixed for parameters declared here or inherited.
    pub fixed: Vec<(String, String)>,
    pub derived_parameters: Vec<DerivedParameter>,
    pub constants: Vec<Constant>,
    pub exposures: Vec<Exposure>,
    pub requirements: Vec<Requirement>,
    pub event_ports: Vec<EventPort>,
    pub child_slots: Vec<ChildSlot>,
    pub attachments: Vec<Attachments>,
    pub dynamics: Dynamics,
    pub structure: Structure,
    pub simulation: SimulationSpec,
}

impl ComponentType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn extending(mut self, base: impl Into<String>) -> Self {
        self.extends = Some(base.into());
        self
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_fixed(mut self, parameter: impl Into<String>, literal: impl Into<String>) -> Self {
        self.fixed.push((parameter.into(), literal.into()));
        self
    }

    pub fn with_derived_parameter(mut self, parameter: DerivedParameter) -> Self {
        self.derived_parameters.push(parameter);
        self
    }

    pub fn with_constant(mut self, constant: Constant) -> Self {
        self.constants.push(constant);
        self
    }

    pub fn with_exposure(mut self, exposure: Exposure) -> Self {
        self.exposures.push(exposure);
        self
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn with_event_port(mut self, port: EventPort) -> Self {
        self.event_ports.push(port);
        self
    }

    pub fn with_child_slot(mut self, slot: ChildSlot) -> Self {
        self.child_slots.push(slot);
        self
    }

    pub fn with_attachments(mut self, attachments: Attachments) -> Self {
        self.attachments.push(attachments);
        self
    }

    pub fn with_dynamics(mut self, dynamics: Dynamics) -> Self {
        self.dynamics = dynamics;
        self
    }

    pub fn with_structure(mut self, structure: Structure) -> Self {
        self.structure = structure;
        self
    }

    pub fn with_simulation(mut self, simulation: SimulationSpec) -> Self {
        self.simulation = simulation;
        self
    }
}

/// A named instance of a component type with concrete parameter literals.
///
/// A component either names its type directly or extends another component,
/// inheriting its type and parameter values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Component {
    pub id: String,
    pub type_name: Option<String>,
    pub extends: Option<String>,
    pub parameters: IndexMap<String, String>,
    pub children: Vec<Component>,
}

impl Component {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: Some(type_name.into()),
            ..Self::default()
        }
    }

    /// A component whose id is assigned by the model when added.
    pub fn anonymous(type_name: impl Into<String>) -> Self {
        Self::new("", type_name)
    }

    /// A component inheriting type and values from the component `base`.
    pub fn extending(id: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extends: Some(base.into()),
            ..Self::default()
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, literal: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), literal.into());
        self
    }

    pub fn with_child(mut self, child: Component) -> Self {
        self.children.push(child);
        self
    }
}
