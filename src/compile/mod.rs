//! Turns resolved components into runnables with compiled procedures.
//!
//! Building a subtree takes three passes over every runnable it creates:
//!
//! 1. **instantiate**: stores, nested children, `ChildInstance` and
//!    `MultiInstantiate` copies;
//! 2. **compile**: one [`Program`] per regime configuration, then
//!    structural wiring (`With`, `ForEach`, `EventConnection`), which may
//!    instantiate receiver proxies that are compiled in turn;
//! 3. **link**: select paths and kinetic schemes, which need the whole
//!    subtree in place.

pub(crate) mod bind;
mod order;
mod structure;

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info, warn};

use crate::config::SimConfig;
use crate::engine::Simulation;
use crate::error::{Result, SimBuildError, SimError};
use crate::event::EventCallback;
use crate::model::{Action, EventConnection, EventHandler, ForEach, KineticScheme, PortDirection, Structure};
use crate::resolve::{FatComponent, ResolvedModel, ResolvedRegime, ResolvedType};
use crate::runnable::{Network, Recorder, Recording, Runnable, VariableStore};
use crate::types::{RunnableId, SimTime};
use crate::units::UnitRegistry;

use bind::{Binder, BoundAction, BoundEdge, BoundKinetic, DerivedStep, Program};
use order::{order_derived, Dependent};
use structure::{resolve_quantity, resolve_runnables, select_port, Bindings};

/// Collection receiving event-connection proxies when neither the
/// connection nor the target type names one.
const DEFAULT_RECEIVERS: &str = "receivers";

/// Builds a [`Simulation`] from a resolved model.
pub struct SimulationBuilder<'m> {
    model: &'m ResolvedModel,
    network: Network,
    roots: Vec<RunnableId>,
    runs: IndexMap<String, RunnableId>,
    receivers: usize,
    trace: bool,
    stats: Option<String>,
}

impl<'m> SimulationBuilder<'m> {
    pub fn new(model: &'m ResolvedModel) -> Self {
        Self {
            model,
            network: Network::new(),
            roots: Vec::new(),
            runs: IndexMap::new(),
            receivers: 0,
            trace: false,
            stats: None,
        }
    }

    /// Records `(time, runnable)` for every step taken by the scheduler.
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }

    /// Makes the built simulation collect statistics under `name`.
    pub fn with_stats(mut self, name: impl Into<String>) -> Self {
        self.stats = Some(name.into());
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    /// Root runnable built for a component by [`add_run`](Self::add_run).
    pub fn run_root(&self, component_id: &str) -> Option<RunnableId> {
        self.runs.get(component_id).copied()
    }

    /// Builds the runnable subtree for a component, optionally as a named
    /// child of an existing runnable.
    pub fn build_runnable(
        &mut self,
        component_id: &str,
        parent: Option<RunnableId>,
    ) -> Result<RunnableId> {
        let referrer = match parent {
            Some(p) => self.network.runnable(p).id().to_string(),
            None => "model".to_string(),
        };
        let fat = self.component(component_id, &referrer)?;
        let instance_id = match parent {
            Some(_) => format!("{referrer}/{component_id}"),
            None => component_id.to_string(),
        };

        let start = self.network.len();
        let id = self.instantiate(fat, parent, instance_id)?;
        if let Some(p) = parent {
            self.network
                .runnable_mut(p)
                .children
                .insert(component_id.to_string(), id);
        }

        let mut next = start;
        while next < self.network.len() {
            self.compile(RunnableId(next))?;
            next += 1;
        }
        for index in start..self.network.len() {
            self.link(RunnableId(index))?;
        }

        info!(
            component = component_id,
            runnables = self.network.len() - start,
            "Built runnable tree"
        );
        Ok(id)
    }

    /// Builds a component as a scheduler root with its own timestep.
    pub fn add_run(&mut self, component_id: &str, timestep: SimTime, total: SimTime) -> Result<RunnableId> {
        let id = self.build_runnable(component_id, None)?;
        self.network.runnable_mut(id).configure(timestep, total)?;
        self.roots.push(id);
        self.runs.insert(component_id.to_string(), id);
        info!(component = component_id, timestep, total, "Added run");
        Ok(id)
    }

    /// Records a quantity path, resolved from a run root, every step.
    pub fn add_record(
        &mut self,
        root: RunnableId,
        quantity: &str,
        scale: f64,
        color: Option<String>,
    ) -> Result<()> {
        self.check_root(root)?;
        let slots = resolve_quantity(&self.network, root, quantity, &Bindings::new())?;
        let several = slots.len() > 1;
        for (id, slot) in slots {
            let runnable = self.network.runnable_mut(id);
            let label = if several {
                let variable = quantity.rsplit('/').next().unwrap_or(quantity);
                format!("{}/{variable}", runnable.id())
            } else {
                quantity.to_string()
            };
            runnable.recorders.push(Recorder {
                slot,
                recording: Recording::new(label)
                    .with_scale(scale)
                    .with_color(color.clone()),
            });
        }
        Ok(())
    }

    /// Logs emissions on `port` of every runnable at `path`.
    pub fn add_event_record(&mut self, root: RunnableId, path: &str, port: &str) -> Result<()> {
        self.check_root(root)?;
        for id in resolve_runnables(&self.network, root, path, &Bindings::new())? {
            self.network.runnable_mut(id).record_events(port)?;
        }
        Ok(())
    }

    fn check_root(&self, root: RunnableId) -> Result<()> {
        match self.network.get(root) {
            Some(_) => Ok(()),
            None => Err(SimError::UnknownRunnable(root.index()).into()),
        }
    }

    /// Adds the runs, records and event records declared by the model's
    /// simulation targets. A record attaches to the nearest preceding run.
    pub fn add_targets(&mut self) -> Result<()> {
        for target in &self.model.targets {
            let fat = self.component(target, "target")?;
            self.add_simulation(&fat, None)?;
        }
        Ok(())
    }

    fn add_simulation(&mut self, fat: &Arc<FatComponent>, context: Option<RunnableId>) -> Result<()> {
        let spec = &fat.component_type.simulation;
        let mut context = context;

        for run in &spec.runs {
            let component = fat
                .component_ref(&run.component)
                .ok_or_else(|| unresolved_component(&fat.id, &run.component))?;
            let step = number(fat, &run.increment)?;
            let total = number(fat, &run.total)?;
            if run.variable != "t" {
                warn!(
                    component = %fat.id,
                    variable = %run.variable,
                    "Time is bound as 't' in expressions"
                );
            }
            context = Some(self.add_run(component, step, total)?);
        }

        for record in &spec.records {
            let Some(root) = context else {
                warn!(component = %fat.id, "Record outside any run; skipped");
                continue;
            };
            let quantity = text(fat, &record.quantity)?;
            let scale = match &record.scale {
                Some(parameter) => number(fat, parameter)?,
                None => 1.0,
            };
            let color = record
                .color
                .as_ref()
                .and_then(|p| fat.text(p))
                .map(str::to_string);
            self.add_record(root, quantity, scale, color)?;
        }

        for record in &spec.event_records {
            let Some(root) = context else {
                warn!(component = %fat.id, "Event record outside any run; skipped");
                continue;
            };
            let path = text(fat, &record.quantity)?;
            let port = text(fat, &record.event_port)?;
            self.add_event_record(root, path, port)?;
        }

        for child in &fat.children {
            self.add_simulation(child, context)?;
        }
        Ok(())
    }

    /// Adds the runs and records of a configuration file.
    pub fn apply_config(&mut self, config: &SimConfig) -> Result<()> {
        config.validate()?;
        let units: &UnitRegistry = &self.model.units;
        self.trace |= config.simulation.trace_steps;
        if config.simulation.collect_stats {
            self.stats = Some(config.simulation.name.clone());
        }

        for run in &config.runs {
            let step = units.convert(&run.step, Some("time"))?;
            let total = units.convert(&run.total, Some("time"))?;
            let id = self.add_run(&run.component, step, total)?;
            if !run.plastic {
                self.network.runnable_mut(id).freeze();
            }
        }
        for record in &config.records {
            let root = self
                .run_root(&record.run)
                .ok_or_else(|| unresolved_component("config", &record.run))?;
            self.add_record(root, &record.quantity, record.scale.unwrap_or(1.0), None)?;
        }
        Ok(())
    }

    /// Initializes every run root and hands the network to a simulation.
    pub fn build(mut self) -> Simulation {
        for root in &self.roots {
            self.network.initialize(*root);
        }
        info!(
            roots = self.roots.len(),
            runnables = self.network.len(),
            "Simulation ready"
        );
        let simulation = Simulation::new(self.network, self.roots).with_trace(self.trace);
        match self.stats {
            Some(name) => simulation.with_stats(name),
            None => simulation,
        }
    }

    fn component(&self, id: &str, referrer: &str) -> Result<Arc<FatComponent>> {
        self.model
            .component(id)
            .cloned()
            .ok_or_else(|| unresolved_component(referrer, id).into())
    }

    // ---- instantiate ----

    fn instantiate(
        &mut self,
        fat: Arc<FatComponent>,
        parent: Option<RunnableId>,
        instance_id: String,
    ) -> Result<RunnableId> {
        let component_type = Arc::clone(&fat.component_type);
        let store = build_store(&fat, &component_type);
        let id = self.network.insert(Runnable::new(
            instance_id.clone(),
            Arc::clone(&fat),
            parent,
            store,
        ))?;
        debug!(id = %instance_id, component = %fat.id, component_type = %fat.type_name(), "Instantiated runnable");

        for slot in component_type.child_slots.values().filter(|s| s.multiple) {
            self.network
                .runnable_mut(id)
                .collections
                .entry(slot.name.clone())
                .or_default();
        }
        for attachments in component_type.attachments.values() {
            self.network
                .runnable_mut(id)
                .collections
                .entry(attachments.name.clone())
                .or_default();
        }

        let mut filled: IndexSet<&str> = IndexSet::new();
        for child in &fat.children {
            let single = component_type.child_slots.values().find(|s| {
                !s.multiple && !filled.contains(s.name.as_str()) && child.component_type.is_a(&s.type_name)
            });
            let multiple = component_type
                .child_slots
                .values()
                .find(|s| s.multiple && child.component_type.is_a(&s.type_name));

            match (single, multiple) {
                (Some(slot), _) => {
                    filled.insert(slot.name.as_str());
                    let child_id =
                        self.instantiate(Arc::clone(child), Some(id), format!("{instance_id}/{}", slot.name))?;
                    self.network
                        .runnable_mut(id)
                        .children
                        .insert(slot.name.clone(), child_id);
                }
                (None, Some(slot)) => {
                    let child_id =
                        self.instantiate(Arc::clone(child), Some(id), format!("{instance_id}/{}", child.id))?;
                    self.network
                        .runnable_mut(id)
                        .collections
                        .entry(slot.name.clone())
                        .or_default()
                        .push(child_id);
                }
                (None, None) => {
                    let child_id =
                        self.instantiate(Arc::clone(child), Some(id), format!("{instance_id}/{}", child.id))?;
                    self.network
                        .runnable_mut(id)
                        .children
                        .insert(child.id.clone(), child_id);
                }
            }
        }

        for instance in &component_type.structure.child_instances {
            match fat.component_ref(&instance.component) {
                Some(reference) => {
                    let referee = self.component(reference, &instance_id)?;
                    let child_id = self.instantiate(
                        referee,
                        Some(id),
                        format!("{instance_id}/{}", instance.component),
                    )?;
                    self.network
                        .runnable_mut(id)
                        .children
                        .insert(instance.component.clone(), child_id);
                }
                None if self.network.runnable(id).child(&instance.component).is_some() => {}
                None => return Err(unresolved_component(&instance_id, &instance.component).into()),
            }
        }

        for multi in &component_type.structure.multi_instantiates {
            let reference = fat
                .component_ref(&multi.component)
                .ok_or_else(|| unresolved_component(&instance_id, &multi.component))?;
            let prototype = self.component(reference, &instance_id)?;
            let count = fat.number(&multi.number).ok_or_else(|| SimBuildError::ParameterKind {
                runnable: instance_id.clone(),
                parameter: multi.number.clone(),
                expected: "a number",
            })?;
            if count < 0.0 || count.fract() != 0.0 {
                return Err(SimBuildError::ParameterKind {
                    runnable: instance_id.clone(),
                    parameter: multi.number.clone(),
                    expected: "a non-negative integer",
                }
                .into());
            }
            for index in 0..count as usize {
                let child_id = self.instantiate(
                    Arc::clone(&prototype),
                    Some(id),
                    format!("{instance_id}[{index}]"),
                )?;
                self.network.runnable_mut(id).array.push(child_id);
            }
        }

        Ok(id)
    }

    // ---- compile ----

    fn compile(&mut self, id: RunnableId) -> Result<()> {
        let component_type = Arc::clone(&self.network.runnable(id).component().component_type);
        let dynamics = &component_type.dynamics;

        let mut programs = Vec::with_capacity(dynamics.regimes.len() + 1);
        programs.push(self.compile_configuration(id, &component_type, None)?);
        for regime in dynamics.regimes.values() {
            programs.push(self.compile_configuration(id, &component_type, Some(regime))?);
        }
        self.network.runnable_mut(id).programs = Arc::new(programs);

        self.wire(id, &component_type.structure)
    }

    fn compile_configuration(
        &self,
        id: RunnableId,
        component_type: &ResolvedType,
        regime: Option<&ResolvedRegime>,
    ) -> std::result::Result<Program, SimBuildError> {
        let runnable = self.network.runnable(id);
        let name = runnable.id();
        let layers: Vec<&ResolvedRegime> = std::iter::once(&component_type.dynamics.default)
            .chain(regime)
            .collect();

        let derived: IndexSet<String> = layers
            .iter()
            .flat_map(|l| {
                l.derived_variables
                    .keys()
                    .chain(l.conditional_derived_variables.keys())
            })
            .cloned()
            .collect();
        let binder = Binder {
            network: &self.network,
            runnable: id,
            constants: &self.model.constants,
            requirements: &component_type.requirements,
            derived: &derived,
        };

        let mut program = Program::default();

        for layer in &layers {
            for (variable, derivative) in &layer.time_derivatives {
                program
                    .time_derivatives
                    .push((binder.slot(variable)?, binder.bind(&derivative.value, true)?));
            }
        }

        let mut dependents = Vec::new();
        let mut expressions = IndexMap::new();
        for layer in &layers {
            for variable in layer.derived_variables.values() {
                let invalid = |reason| SimBuildError::InvalidDerivedVariable {
                    runnable: name.to_string(),
                    variable: variable.name.clone(),
                    reason,
                };
                match (&variable.value, &variable.select, variable.reduce) {
                    (Some(_), Some(_), _) => return Err(invalid("has both a value and a select")),
                    (None, None, _) => return Err(invalid("has neither a value nor a select")),
                    (Some(_), None, Some(_)) => return Err(invalid("has a reduce without a select")),
                    (None, Some(path), reduce) => program.derived.push(DerivedStep::Select {
                        slot: binder.slot(&variable.name)?,
                        name: variable.name.clone(),
                        path: path.clone(),
                        reduce,
                        sources: Vec::new(),
                    }),
                    (Some(value), None, None) => {
                        dependents.push(Dependent {
                            name: variable.name.as_str(),
                            symbols: value.symbols(),
                        });
                        let step = DerivedStep::Value {
                            slot: binder.slot(&variable.name)?,
                            value: binder.bind(value, false)?,
                        };
                        expressions.insert(variable.name.as_str(), step);
                    }
                }
            }
            for variable in layer.conditional_derived_variables.values() {
                if variable.cases.is_empty() {
                    return Err(SimBuildError::InvalidDerivedVariable {
                        runnable: name.to_string(),
                        variable: variable.name.clone(),
                        reason: "has no cases",
                    });
                }
                let mut symbols = Vec::new();
                let mut cases = Vec::with_capacity(variable.cases.len());
                for case in &variable.cases {
                    let condition = match &case.condition {
                        Some(condition) => {
                            symbols.extend(condition.symbols());
                            Some(binder.bind(condition, false)?)
                        }
                        None => None,
                    };
                    symbols.extend(case.value.symbols());
                    cases.push((condition, binder.bind(&case.value, false)?));
                }
                dependents.push(Dependent {
                    name: variable.name.as_str(),
                    symbols,
                });
                expressions.insert(
                    variable.name.as_str(),
                    DerivedStep::Cases {
                        slot: binder.slot(&variable.name)?,
                        cases,
                    },
                );
            }
        }
        for variable in order_derived(name, dependents)? {
            if let Some(step) = expressions.shift_remove(variable) {
                program.derived.push(step);
            }
        }

        let entry_layer = layers.len() - 1;
        for (index, layer) in layers.iter().enumerate() {
            for handler in &layer.event_handlers {
                match handler {
                    EventHandler::OnStart { actions } => {
                        program.on_start.extend(bind_actions(&binder, runnable, actions)?)
                    }
                    EventHandler::OnEntry { actions } if index == entry_layer => {
                        program.on_entry.extend(bind_actions(&binder, runnable, actions)?)
                    }
                    EventHandler::OnEntry { .. } => {}
                    EventHandler::OnEvent { port, actions } => {
                        if runnable.pending_events(port).is_none() {
                            return Err(SimBuildError::MissingPort {
                                runnable: name.to_string(),
                                direction: PortDirection::In.as_str(),
                                port: Some(port.clone()),
                            });
                        }
                        program
                            .on_event
                            .push((port.clone(), bind_actions(&binder, runnable, actions)?));
                    }
                    EventHandler::OnCondition { test, actions } => program.on_condition.push((
                        binder.bind(test, false)?,
                        bind_actions(&binder, runnable, actions)?,
                    )),
                }
            }
            program
                .kinetic_schemes
                .extend(layer.kinetic_schemes.iter().cloned());
        }

        Ok(program)
    }

    fn wire(&mut self, owner: RunnableId, structure: &Structure) -> Result<()> {
        let mut bindings = Bindings::new();
        for with in &structure.withs {
            let bound = resolve_runnables(&self.network, owner, &with.instance, &bindings)?;
            bindings.insert(with.as_name.clone(), bound);
        }
        for for_each in &structure.for_each {
            self.wire_for_each(owner, for_each, &mut bindings)?;
        }
        for connection in &structure.event_connections {
            self.connect(owner, connection, &bindings)?;
        }
        Ok(())
    }

    fn wire_for_each(&mut self, owner: RunnableId, for_each: &ForEach, bindings: &mut Bindings) -> Result<()> {
        let instances = resolve_runnables(&self.network, owner, &for_each.instances, bindings)?;
        for instance in instances {
            bindings.insert(for_each.as_name.clone(), vec![instance]);
            for nested in &for_each.for_each {
                self.wire_for_each(owner, nested, bindings)?;
            }
            for connection in &for_each.event_connections {
                self.connect(owner, connection, bindings)?;
            }
        }
        bindings.shift_remove(&for_each.as_name);
        Ok(())
    }

    fn connect(&mut self, owner: RunnableId, connection: &EventConnection, bindings: &Bindings) -> Result<()> {
        let sources = resolve_runnables(&self.network, owner, &connection.from, bindings)?;
        let targets = resolve_runnables(&self.network, owner, &connection.to, bindings)?;

        for source in sources {
            let out_port = select_port(
                &self.network,
                source,
                PortDirection::Out,
                connection.source_port.as_deref(),
            )?;
            for target in &targets {
                let receiver = match &connection.receiver {
                    Some(parameter) => self.instantiate_receiver(owner, *target, parameter, connection)?,
                    None => *target,
                };
                let in_port = select_port(
                    &self.network,
                    receiver,
                    PortDirection::In,
                    connection.target_port.as_deref(),
                )?;
                debug!(
                    from = %self.network.runnable(source).id(),
                    to = %self.network.runnable(receiver).id(),
                    port = %in_port,
                    "Event connection"
                );
                self.network
                    .runnable_mut(source)
                    .register_event_out_callback(&out_port, EventCallback::deliver(receiver, in_port))?;
            }
        }
        Ok(())
    }

    fn instantiate_receiver(
        &mut self,
        owner: RunnableId,
        target: RunnableId,
        parameter: &str,
        connection: &EventConnection,
    ) -> Result<RunnableId> {
        let owner_runnable = self.network.runnable(owner);
        let reference = owner_runnable
            .component()
            .component_ref(parameter)
            .ok_or_else(|| unresolved_component(owner_runnable.id(), parameter))?
            .to_string();
        let proxy = self.component(&reference, owner_runnable.id())?;

        let target_runnable = self.network.runnable(target);
        let container = connection
            .receiver_container
            .clone()
            .or_else(|| {
                target_runnable
                    .component()
                    .component_type
                    .attachments
                    .keys()
                    .next()
                    .cloned()
            })
            .unwrap_or_else(|| DEFAULT_RECEIVERS.to_string());
        let instance_id = format!("{}/{container}[{}]", target_runnable.id(), self.receivers);
        self.receivers += 1;

        let receiver = self.instantiate(proxy, Some(target), instance_id)?;
        self.network
            .runnable_mut(target)
            .collections
            .entry(container)
            .or_default()
            .push(receiver);
        Ok(receiver)
    }

    // ---- link ----

    fn link(&mut self, id: RunnableId) -> Result<()> {
        let mut programs = std::mem::take(&mut self.network.runnable_mut(id).programs);
        let mut populations = Vec::new();

        for program in Arc::make_mut(&mut programs).iter_mut() {
            for step in &mut program.derived {
                if let DerivedStep::Select {
                    name,
                    path,
                    reduce,
                    sources,
                    ..
                } = step
                {
                    *sources = resolve_quantity(&self.network, id, path, &Bindings::new())?;
                    if reduce.is_none() && sources.len() != 1 {
                        return Err(SimBuildError::InvalidDerivedVariable {
                            runnable: self.network.runnable(id).id().to_string(),
                            variable: name.clone(),
                            reason: "must select exactly one value without a reduce",
                        }
                        .into());
                    }
                }
            }
            program.kinetics = program
                .kinetic_schemes
                .iter()
                .map(|scheme| self.bind_kinetic(id, scheme))
                .collect::<std::result::Result<_, _>>()?;
            populations.extend(program.kinetics.iter().map(|k| k.nodes.clone()));
        }
        self.network.runnable_mut(id).programs = programs;

        for nodes in populations {
            let share = 1.0 / nodes.len().max(1) as f64;
            for (node, slot) in nodes {
                self.network.runnable_mut(node).store.reset(slot, share);
            }
        }
        Ok(())
    }

    fn bind_kinetic(
        &self,
        id: RunnableId,
        scheme: &KineticScheme,
    ) -> std::result::Result<BoundKinetic, SimBuildError> {
        let network = &self.network;
        let runnable = network.runnable(id);
        let missing = |path: &str| SimBuildError::PathNotFound {
            runnable: runnable.id().to_string(),
            path: path.to_string(),
        };

        let node_ids = runnable
            .collection(&scheme.nodes)
            .ok_or_else(|| missing(&scheme.nodes))?;
        let nodes = node_ids
            .iter()
            .map(|node| {
                network
                    .runnable(*node)
                    .store()
                    .slot(&scheme.state_variable)
                    .map(|slot| (*node, slot))
                    .ok_or_else(|| missing(&format!("{}/{}", scheme.nodes, scheme.state_variable)))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let node_index = |edge: &Runnable, link: &str| {
            let linked = edge.text(link).ok_or_else(|| SimBuildError::ParameterKind {
                runnable: edge.id().to_string(),
                parameter: link.to_string(),
                expected: "a link",
            })?;
            node_ids
                .iter()
                .position(|node| {
                    let node = network.runnable(*node);
                    node.component().id == linked || node.id().rsplit('/').next() == Some(linked)
                })
                .ok_or_else(|| missing(linked))
        };
        let rate = |edge_id: RunnableId, variable: &str| {
            network
                .runnable(edge_id)
                .store()
                .slot(variable)
                .map(|slot| (edge_id, slot))
                .ok_or_else(|| missing(&format!("{}/{variable}", scheme.edges)))
        };

        let edges = runnable
            .collection(&scheme.edges)
            .ok_or_else(|| missing(&scheme.edges))?
            .iter()
            .map(|edge_id| {
                let edge = network.runnable(*edge_id);
                Ok(BoundEdge {
                    source: node_index(edge, &scheme.edge_source)?,
                    target: node_index(edge, &scheme.edge_target)?,
                    forward: rate(*edge_id, &scheme.forward_rate)?,
                    reverse: rate(*edge_id, &scheme.reverse_rate)?,
                })
            })
            .collect::<std::result::Result<Vec<_>, SimBuildError>>()?;

        Ok(BoundKinetic { nodes, edges })
    }
}

fn build_store(fat: &FatComponent, component_type: &ResolvedType) -> VariableStore {
    let mut store = VariableStore::new();
    for (name, value) in fat.numbers() {
        store.declare(name, value);
    }
    for variable in component_type.dynamics.state_variables() {
        store.declare(&variable.name, 0.0);
    }
    for name in component_type.dynamics.derived_names() {
        store.declare(name, 0.0);
    }
    for exposure in component_type.exposures.keys() {
        store.declare(exposure, 0.0);
    }
    store
}

fn bind_actions(
    binder: &Binder<'_>,
    runnable: &Runnable,
    actions: &[Action],
) -> std::result::Result<Vec<BoundAction>, SimBuildError> {
    actions
        .iter()
        .map(|action| match action {
            Action::StateAssignment { variable, value } => Ok(BoundAction::Assign {
                slot: binder.slot(variable)?,
                value: binder.bind(value, false)?,
            }),
            Action::EventOut { port } => {
                if !runnable.event_out.contains_key(port) {
                    return Err(SimBuildError::MissingPort {
                        runnable: runnable.id().to_string(),
                        direction: PortDirection::Out.as_str(),
                        port: Some(port.clone()),
                    });
                }
                Ok(BoundAction::EventOut { port: port.clone() })
            }
            Action::Transition { regime } => runnable
                .regime_index(regime)
                .map(|regime| BoundAction::Transition { regime })
                .ok_or_else(|| SimBuildError::UnknownRegime {
                    runnable: runnable.id().to_string(),
                    regime: regime.clone(),
                }),
        })
        .collect()
}

fn unresolved_component(runnable: &str, reference: &str) -> SimBuildError {
    SimBuildError::UnresolvedComponent {
        runnable: runnable.to_string(),
        reference: reference.to_string(),
    }
}

fn number(fat: &FatComponent, parameter: &str) -> std::result::Result<f64, SimBuildError> {
    fat.number(parameter).ok_or_else(|| SimBuildError::ParameterKind {
        runnable: fat.id.clone(),
        parameter: parameter.to_string(),
        expected: "a number",
    })
}

fn text<'f>(fat: &'f FatComponent, parameter: &str) -> std::result::Result<&'f str, SimBuildError> {
    fat.text(parameter).ok_or_else(|| SimBuildError::ParameterKind {
        runnable: fat.id.clone(),
        parameter: parameter.to_string(),
        expected: "text",
    })
}
