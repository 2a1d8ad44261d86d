//! Resolution: type inheritance followed by component fattening.
//!
//! Types are resolved base-first and memoized, so every type is merged
//! exactly once however many components use it. Components are then
//! fattened: parameter literals are inherited along component extends
//! chains, converted to SI through the unit registry, and component
//! references are resolved recursively.
//!
//! Resolution is fail-fast: the first error aborts and names the offending
//! type, component or parameter.

pub mod fatten;
pub mod types;

pub use fatten::{BoundParameter, FatComponent, ParamValue};
pub use types::{ResolvedDynamics, ResolvedRegime, ResolvedType};

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info};

use crate::error::ModelError;
use crate::model::{Component, Model, ParameterKind};
use crate::units::UnitRegistry;

/// A model with every type and component resolved.
#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub units: UnitRegistry,
    pub types: IndexMap<String, Arc<ResolvedType>>,
    /// Every fattened component by id, nested ones included.
    pub components: IndexMap<String, Arc<FatComponent>>,
    /// Ids of the top-level components, in declaration order.
    pub roots: Vec<String>,
    pub constants: IndexMap<String, f64>,
    pub targets: Vec<String>,
}

impl ResolvedModel {
    pub fn component(&self, id: &str) -> Option<&Arc<FatComponent>> {
        self.components.get(id)
    }

    pub fn component_type(&self, name: &str) -> Option<&Arc<ResolvedType>> {
        self.types.get(name)
    }
}

/// Literals and children of a component after following its extends chain.
struct Flattened<'m> {
    type_name: String,
    literals: IndexMap<String, String>,
    children: Vec<&'m Component>,
}

pub(crate) struct Resolver<'m> {
    model: &'m Model,
    index: HashMap<String, &'m Component>,
    types: IndexMap<String, Arc<ResolvedType>>,
    resolving: IndexSet<String>,
    components: IndexMap<String, Arc<FatComponent>>,
    fattening: IndexSet<String>,
    constants: IndexMap<String, f64>,
}

impl<'m> Resolver<'m> {
    pub(crate) fn new(model: &'m Model) -> Self {
        Self {
            model,
            index: HashMap::new(),
            types: IndexMap::new(),
            resolving: IndexSet::new(),
            components: IndexMap::new(),
            fattening: IndexSet::new(),
            constants: IndexMap::new(),
        }
    }

    pub(crate) fn resolve(mut self) -> Result<ResolvedModel, ModelError> {
        let model = self.model;
        let units = model.units();
        units.validate().map_err(|source| ModelError::Unit {
            component: "model".into(),
            parameter: "units".into(),
            source,
        })?;

        for constant in model.constants() {
            let value = units
                .convert(&constant.value, Some(&constant.dimension))
                .map_err(|source| ModelError::Unit {
                    component: "model".into(),
                    parameter: constant.name.clone(),
                    source,
                })?;
            self.constants.insert(constant.name.clone(), value);
        }

        for component in model.components() {
            self.index_component(component)?;
        }

        for component_type in model.component_types() {
            self.resolve_type(&component_type.name, "model")?;
        }

        let mut roots = Vec::new();
        for component in model.components() {
            self.fatten(&component.id, "model")?;
            roots.push(component.id.clone());
        }

        let mut targets = Vec::new();
        for target in model.targets() {
            if !self.components.contains_key(&target.component) {
                return Err(ModelError::UnknownComponent {
                    id: target.component.clone(),
                    referrer: "target".into(),
                });
            }
            targets.push(target.component.clone());
        }

        info!(
            types = self.types.len(),
            components = self.components.len(),
            roots = roots.len(),
            "Resolved model"
        );

        Ok(ResolvedModel {
            units: units.clone(),
            types: self.types,
            components: self.components,
            roots,
            constants: self.constants,
            targets,
        })
    }

    fn index_component(&mut self, component: &'m Component) -> Result<(), ModelError> {
        if self.index.insert(component.id.clone(), component).is_some() {
            return Err(ModelError::Duplicate {
                owner: "model".into(),
                kind: "component",
                name: component.id.clone(),
            });
        }
        for child in &component.children {
            self.index_component(child)?;
        }
        Ok(())
    }

    fn resolve_type(&mut self, name: &str, referrer: &str) -> Result<Arc<ResolvedType>, ModelError> {
        if let Some(resolved) = self.types.get(name) {
            return Ok(Arc::clone(resolved));
        }
        let model = self.model;
        let declared = model
            .component_type(name)
            .ok_or_else(|| ModelError::UnknownType {
                name: name.to_string(),
                referrer: referrer.to_string(),
            })?;
        if !self.resolving.insert(name.to_string()) {
            return Err(ModelError::CyclicInheritance(name.to_string()));
        }

        let mut resolved = ResolvedType::from_declared(declared)?;
        if let Some(base) = &declared.extends {
            let base = self.resolve_type(base, name)?;
            resolved = resolved.inherit(&base)?;
        }
        resolved.apply_fixed(declared)?;
        resolved.validate()?;

        self.resolving.shift_remove(name);
        debug!(name, parameters = resolved.parameters.len(), "Resolved component type");
        let resolved = Arc::new(resolved);
        self.types.insert(name.to_string(), Arc::clone(&resolved));
        Ok(resolved)
    }

    fn flatten(
        &self,
        component: &'m Component,
        chain: &mut Vec<String>,
    ) -> Result<Flattened<'m>, ModelError> {
        if chain.contains(&component.id) {
            return Err(ModelError::CyclicInheritance(component.id.clone()));
        }
        chain.push(component.id.clone());

        let mut flattened = match (&component.type_name, &component.extends) {
            (Some(type_name), _) => Flattened {
                type_name: type_name.clone(),
                literals: IndexMap::new(),
                children: Vec::new(),
            },
            (None, Some(base)) => {
                let base_component =
                    *self
                        .index
                        .get(base)
                        .ok_or_else(|| ModelError::UnknownComponent {
                            id: base.clone(),
                            referrer: component.id.clone(),
                        })?;
                self.flatten(base_component, chain)?
            }
            (None, None) => return Err(ModelError::Untyped(component.id.clone())),
        };

        for (name, literal) in &component.parameters {
            flattened.literals.insert(name.clone(), literal.clone());
        }
        flattened.children.extend(component.children.iter());
        Ok(flattened)
    }

    fn fatten(&mut self, id: &str, referrer: &str) -> Result<Arc<FatComponent>, ModelError> {
        if let Some(fat) = self.components.get(id) {
            return Ok(Arc::clone(fat));
        }
        let component = *self
            .index
            .get(id)
            .ok_or_else(|| ModelError::UnknownComponent {
                id: id.to_string(),
                referrer: referrer.to_string(),
            })?;
        if !self.fattening.insert(id.to_string()) {
            return Err(ModelError::CyclicInheritance(id.to_string()));
        }

        let Flattened {
            type_name,
            literals,
            children,
        } = self.flatten(component, &mut Vec::new())?;
        let component_type = self.resolve_type(&type_name, id)?;

        if let Some(name) = literals
            .keys()
            .find(|name| !component_type.parameters.contains_key(*name))
        {
            return Err(ModelError::UndeclaredParameter {
                component: id.to_string(),
                parameter: name.clone(),
            });
        }

        let model = self.model;
        let units = model.units();
        let mut parameters = IndexMap::with_capacity(component_type.parameters.len());
        for (name, declared) in &component_type.parameters {
            let literal = literals
                .get(name)
                .or(declared.value.as_ref())
                .ok_or_else(|| ModelError::UnresolvedParameter {
                    component: id.to_string(),
                    parameter: name.clone(),
                })?
                .clone();

            let value = match &declared.kind {
                ParameterKind::Quantity(dimension) => ParamValue::Number(
                    units
                        .convert(&literal, Some(dimension))
                        .map_err(|source| ModelError::Unit {
                            component: id.to_string(),
                            parameter: name.clone(),
                            source,
                        })?,
                ),
                ParameterKind::Text | ParameterKind::Path | ParameterKind::Link => {
                    ParamValue::Text(literal.clone())
                }
                ParameterKind::ComponentRef { accepts } => {
                    let referee = self.fatten(&literal, id)?;
                    if !referee.component_type.is_a(accepts) {
                        return Err(ModelError::TypeMismatch {
                            component: literal.clone(),
                            expected: accepts.clone(),
                            found: referee.type_name().to_string(),
                        });
                    }
                    ParamValue::Component(literal.clone())
                }
            };
            parameters.insert(name.clone(), BoundParameter { literal, value });
        }

        let mut constants = IndexMap::with_capacity(component_type.constants.len());
        for (name, constant) in &component_type.constants {
            let value = units
                .convert(&constant.value, Some(&constant.dimension))
                .map_err(|source| ModelError::Unit {
                    component: id.to_string(),
                    parameter: name.clone(),
                    source,
                })?;
            constants.insert(name.clone(), value);
        }

        // Scan until every derived parameter whose inputs are known is evaluated
        let mut unresolved: IndexSet<&str> = component_type
            .derived_parameters
            .keys()
            .map(String::as_str)
            .collect();
        let mut evaluated: HashMap<&str, f64> = HashMap::new();
        while !unresolved.is_empty() {
            let mut progressed = false;
            for (name, derived) in &component_type.derived_parameters {
                if !unresolved.contains(name.as_str())
                    || derived.value.symbols().iter().any(|s| unresolved.contains(s))
                {
                    continue;
                }
                let value = derived
                    .value
                    .evaluate(|symbol| {
                        evaluated
                            .get(symbol)
                            .or_else(|| constants.get(symbol))
                            .or_else(|| self.constants.get(symbol))
                            .copied()
                            .or_else(|| match parameters.get(symbol).map(|p| &p.value) {
                                Some(ParamValue::Number(v)) => Some(*v),
                                _ => None,
                            })
                    })
                    .map_err(|source| ModelError::Eval {
                        owner: id.to_string(),
                        name: name.clone(),
                        source,
                    })?;
                evaluated.insert(name.as_str(), value);
                unresolved.shift_remove(name.as_str());
                progressed = true;
            }
            if !progressed {
                return Err(ModelError::CyclicDerivedParameters {
                    owner: id.to_string(),
                    names: unresolved.iter().map(|n| n.to_string()).collect(),
                });
            }
        }
        let derived_parameters: IndexMap<String, f64> = component_type
            .derived_parameters
            .keys()
            .filter_map(|name| evaluated.get(name.as_str()).map(|v| (name.clone(), *v)))
            .collect();

        let mut fat_children = Vec::with_capacity(children.len());
        for child in children {
            fat_children.push(self.fatten(&child.id, id)?);
        }

        self.fattening.shift_remove(id);
        let fat = Arc::new(FatComponent {
            id: id.to_string(),
            component_type,
            parameters,
            derived_parameters,
            constants,
            children: fat_children,
        });
        self.components.insert(id.to_string(), Arc::clone(&fat));
        Ok(fat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnitError;
    use crate::model::{
        Component, ComponentType, Constant, DerivedParameter, Dynamics, Parameter, StateVariable,
        Target, TimeDerivative,
    };
    use approx::assert_relative_eq;

    fn leaky_type() -> ComponentType {
        ComponentType::new("leaky")
            .with_parameter(Parameter::new("tau", "time"))
            .with_parameter(Parameter::new("v0", "voltage").with_value("-65mV"))
            .with_dynamics(
                Dynamics::new()
                    .with_state_variable(StateVariable::new("v", "voltage"))
                    .with_time_derivative(TimeDerivative::new("v", "-v / tau").unwrap()),
            )
    }

    #[test]
    fn test_fixed_default_and_conversion() {
        let mut model = Model::with_standard_units();
        model.add(leaky_type()).unwrap();
        model
            .add(Component::new("cell", "leaky").with_parameter("tau", "20ms"))
            .unwrap();

        let resolved = model.resolve().unwrap();
        let cell = resolved.component("cell").unwrap();
        assert_relative_eq!(cell.number("tau").unwrap(), 0.02, max_relative = 1e-12);
        assert_relative_eq!(cell.number("v0").unwrap(), -0.065, max_relative = 1e-12);
        assert_eq!(cell.parameters["tau"].literal, "20ms");
    }

    #[test]
    fn test_missing_parameter_names_component() {
        let mut model = Model::with_standard_units();
        model.add(leaky_type()).unwrap();
        model.add(Component::new("cell", "leaky")).unwrap();

        let err = model.resolve().unwrap_err();
        assert_eq!(
            err,
            ModelError::UnresolvedParameter {
                component: "cell".into(),
                parameter: "tau".into()
            }
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut model = Model::with_standard_units();
        model.add(leaky_type()).unwrap();
        model
            .add(Component::new("cell", "leaky").with_parameter("tau", "10 mV"))
            .unwrap();

        match model.resolve().unwrap_err() {
            ModelError::Unit { component, parameter, source } => {
                assert_eq!(component, "cell");
                assert_eq!(parameter, "tau");
                assert!(matches!(source, UnitError::DimensionMismatch { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cyclic_type_inheritance() {
        let mut model = Model::new();
        model.add(ComponentType::new("a").extending("b")).unwrap();
        model.add(ComponentType::new("b").extending("a")).unwrap();
        assert!(matches!(
            model.resolve().unwrap_err(),
            ModelError::CyclicInheritance(_)
        ));
    }

    #[test]
    fn test_unknown_base_type() {
        let mut model = Model::new();
        model.add(ComponentType::new("a").extending("missing")).unwrap();
        assert_eq!(
            model.resolve().unwrap_err(),
            ModelError::UnknownType {
                name: "missing".into(),
                referrer: "a".into()
            }
        );
    }

    #[test]
    fn test_chain_matches_manual_merge() {
        let a = ComponentType::new("A")
            .with_parameter(Parameter::new("p", "none"))
            .with_parameter(Parameter::new("q", "none"));
        let b = ComponentType::new("B")
            .extending("A")
            .with_parameter(Parameter::new("r", "none"))
            .with_fixed("q", "2");
        let c = ComponentType::new("C")
            .extending("B")
            .with_parameter(Parameter::new("p", "none").with_value("7"));

        let mut chained = Model::new();
        for ct in [a, b, c] {
            chained.add(ct).unwrap();
        }
        let chained = chained.resolve().unwrap();

        let manual = ComponentType::new("C")
            .with_parameter(Parameter::new("p", "none").with_value("7"))
            .with_parameter(Parameter::new("q", "none").with_value("2"))
            .with_parameter(Parameter::new("r", "none"));
        let mut flat = Model::new();
        flat.add(manual).unwrap();
        let flat = flat.resolve().unwrap();

        let chained_c = &chained.types["C"];
        let flat_c = &flat.types["C"];
        assert_eq!(chained_c.parameters, flat_c.parameters);
        assert_eq!(chained_c.dynamics, flat_c.dynamics);
        assert!(chained_c.is_a("A") && chained_c.is_a("B"));

        // resolving twice is idempotent
        let mut again = Model::new();
        again.add(ComponentType::new("A").with_parameter(Parameter::new("p", "none"))).unwrap();
        let first = again.resolve().unwrap();
        let second = again.resolve().unwrap();
        assert_eq!(first.types["A"], second.types["A"]);
    }

    #[test]
    fn test_component_extends_component() {
        let mut model = Model::with_standard_units();
        model.add(leaky_type()).unwrap();
        model
            .add(Component::new("proto", "leaky").with_parameter("tau", "10ms"))
            .unwrap();
        model
            .add(Component::extending("variant", "proto").with_parameter("v0", "-70mV"))
            .unwrap();

        let resolved = model.resolve().unwrap();
        let variant = resolved.component("variant").unwrap();
        assert_eq!(variant.type_name(), "leaky");
        assert_relative_eq!(variant.number("tau").unwrap(), 0.01, max_relative = 1e-12);
        assert_relative_eq!(variant.number("v0").unwrap(), -0.07, max_relative = 1e-12);
    }

    #[test]
    fn test_component_reference_and_type_check() {
        let mut model = Model::with_standard_units();
        model.add(leaky_type()).unwrap();
        model.add(ComponentType::new("other")).unwrap();
        model
            .add(
                ComponentType::new("population")
                    .with_parameter(Parameter::component_ref("component", "leaky"))
                    .with_parameter(Parameter::new("size", "none")),
            )
            .unwrap();
        model
            .add(Component::new("cell", "leaky").with_parameter("tau", "10ms"))
            .unwrap();
        model.add(Component::new("x", "other")).unwrap();
        model
            .add(
                Component::new("pop", "population")
                    .with_parameter("component", "cell")
                    .with_parameter("size", "3"),
            )
            .unwrap();
        let resolved = model.resolve().unwrap();
        assert_eq!(resolved.component("pop").unwrap().component_ref("component"), Some("cell"));

        model
            .add(
                Component::new("bad", "population")
                    .with_parameter("component", "x")
                    .with_parameter("size", "1"),
            )
            .unwrap();
        assert!(matches!(
            model.resolve().unwrap_err(),
            ModelError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_derived_parameters_and_constants() {
        let mut model = Model::with_standard_units();
        model.add(Constant::new("scale", "none", "2")).unwrap();
        model
            .add(
                ComponentType::new("t")
                    .with_parameter(Parameter::new("a", "none"))
                    .with_constant(Constant::new("k", "none", "3"))
                    .with_derived_parameter(DerivedParameter::new("b", "none", "a * k").unwrap())
                    .with_derived_parameter(
                        DerivedParameter::new("c", "none", "b * scale").unwrap(),
                    ),
            )
            .unwrap();
        model.add(Component::new("x", "t").with_parameter("a", "5")).unwrap();
        model.add(Target::new("x")).unwrap();

        let resolved = model.resolve().unwrap();
        let x = resolved.component("x").unwrap();
        assert_eq!(x.number("b"), Some(15.0));
        assert_eq!(x.number("c"), Some(30.0));
        assert_eq!(resolved.targets, vec!["x".to_string()]);
    }

    #[test]
    fn test_derived_parameters_resolve_forward_references() {
        let mut model = Model::with_standard_units();
        model
            .add(
                ComponentType::new("t")
                    .with_parameter(Parameter::new("a", "none"))
                    .with_derived_parameter(DerivedParameter::new("c", "none", "b + 1").unwrap())
                    .with_derived_parameter(DerivedParameter::new("b", "none", "a * 2").unwrap()),
            )
            .unwrap();
        model.add(Component::new("x", "t").with_parameter("a", "5")).unwrap();

        let resolved = model.resolve().unwrap();
        let x = resolved.component("x").unwrap();
        assert_eq!(x.number("b"), Some(10.0));
        assert_eq!(x.number("c"), Some(11.0));
        let order: Vec<&str> = x.derived_parameters.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["c", "b"]);
    }

    #[test]
    fn test_derived_parameter_cycle() {
        let mut model = Model::with_standard_units();
        model
            .add(
                ComponentType::new("t")
                    .with_derived_parameter(DerivedParameter::new("p", "none", "q + 1").unwrap())
                    .with_derived_parameter(DerivedParameter::new("q", "none", "p").unwrap()),
            )
            .unwrap();
        model.add(Component::new("x", "t")).unwrap();

        match model.resolve().unwrap_err() {
            ModelError::CyclicDerivedParameters { owner, names } => {
                assert_eq!(owner, "x");
                assert_eq!(names, vec!["p".to_string(), "q".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nested_children_are_fattened() {
        let mut model = Model::with_standard_units();
        model.add(leaky_type()).unwrap();
        model.add(ComponentType::new("group")).unwrap();
        model
            .add(
                Component::new("g", "group")
                    .with_child(Component::new("c1", "leaky").with_parameter("tau", "1ms")),
            )
            .unwrap();
        let resolved = model.resolve().unwrap();
        assert_eq!(resolved.roots, vec!["g".to_string()]);
        assert_eq!(resolved.component("g").unwrap().children[0].id, "c1");
        assert!(resolved.component("c1").is_some());
    }

    #[test]
    fn test_undeclared_parameter() {
        let mut model = Model::with_standard_units();
        model.add(leaky_type()).unwrap();
        model
            .add(
                Component::new("cell", "leaky")
                    .with_parameter("tau", "1ms")
                    .with_parameter("bogus", "1"),
            )
            .unwrap();
        assert!(matches!(
            model.resolve().unwrap_err(),
            ModelError::UndeclaredParameter { .. }
        ));
    }
}
