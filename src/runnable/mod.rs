//! Runnable instances: the executable form of fattened components.
//!
//! A runnable owns its variable store, its event ports, its compiled
//! procedures and links to its parent and children. Runnables live in a
//! [`Network`] arena and refer to each other by [`RunnableId`].

pub mod network;
pub mod recorder;
pub mod store;

pub use network::{Checkpoint, Network, Snapshot};
pub use recorder::Recording;
pub use store::VariableStore;

pub(crate) use recorder::Recorder;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::compile::bind::Program;
use crate::error::{SimBuildError, SimError};
use crate::event::{EmittedEvent, EventCallback};
use crate::model::PortDirection;
use crate::resolve::FatComponent;
use crate::types::{RunnableId, SimTime};

/// One instantiated component.
#[derive(Debug)]
pub struct Runnable {
    pub(crate) id: String,
    pub(crate) component: Arc<FatComponent>,
    pub(crate) parent: Option<RunnableId>,
    pub(crate) store: VariableStore,
    pub(crate) text: IndexMap<String, String>,
    pub(crate) children: IndexMap<String, RunnableId>,
    pub(crate) array: Vec<RunnableId>,
    pub(crate) collections: IndexMap<String, Vec<RunnableId>>,
    pub(crate) event_in: IndexMap<String, u32>,
    pub(crate) event_out: IndexMap<String, Vec<EventCallback>>,
    pub(crate) timestep: SimTime,
    pub(crate) total: SimTime,
    pub(crate) steps: u64,
    pub(crate) time_completed: SimTime,
    pub(crate) plastic: bool,
    /// Index into `regimes`; `None` means only the default regime is active.
    pub(crate) regime: Option<usize>,
    pub(crate) pending_regime: Option<usize>,
    pub(crate) entered: bool,
    pub(crate) regimes: Vec<String>,
    /// Slot 0 is the default regime alone, slot `i + 1` is default plus
    /// `regimes[i]`.
    pub(crate) programs: Arc<Vec<Program>>,
    pub(crate) recorders: Vec<Recorder>,
    pub(crate) event_log: IndexMap<String, Vec<SimTime>>,
}

impl Runnable {
    pub(crate) fn new(
        id: String,
        component: Arc<FatComponent>,
        parent: Option<RunnableId>,
        store: VariableStore,
    ) -> Self {
        let component_type = Arc::clone(&component.component_type);
        let mut event_in = IndexMap::new();
        let mut event_out = IndexMap::new();
        for port in component_type.event_ports.values() {
            match port.direction {
                PortDirection::In => {
                    event_in.insert(port.name.clone(), 0);
                }
                PortDirection::Out => {
                    event_out.insert(port.name.clone(), Vec::new());
                }
            }
        }
        let regimes: Vec<String> = component_type.dynamics.regimes.keys().cloned().collect();
        let regime = component_type
            .dynamics
            .initial_regime()
            .and_then(|name| regimes.iter().position(|r| r == name));
        let text = component
            .texts()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        Self {
            id,
            component,
            parent,
            store,
            text,
            children: IndexMap::new(),
            array: Vec::new(),
            collections: IndexMap::new(),
            event_in,
            event_out,
            timestep: 0.0,
            total: 0.0,
            steps: 0,
            time_completed: 0.0,
            plastic: true,
            regime,
            pending_regime: None,
            entered: true,
            regimes,
            programs: Arc::new(Vec::new()),
            recorders: Vec::new(),
            event_log: IndexMap::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(id: &str, store: VariableStore) -> Self {
        let component = Arc::new(FatComponent {
            id: id.to_string(),
            component_type: Arc::default(),
            parameters: IndexMap::new(),
            derived_parameters: IndexMap::new(),
            constants: IndexMap::new(),
            children: Vec::new(),
        });
        Self::new(id.to_string(), component, None, store)
    }

    /// Sets the timestep and total duration used when this runnable is a
    /// scheduler root.
    pub fn configure(&mut self, timestep: SimTime, total: SimTime) -> Result<(), SimError> {
        if !(timestep.is_finite() && timestep > 0.0 && total.is_finite() && total >= 0.0) {
            return Err(SimError::InvalidTiming {
                runnable: self.id.clone(),
                timestep,
                total,
            });
        }
        self.timestep = timestep;
        self.total = total;
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.timestep > 0.0
    }

    /// Adds a callback run whenever this runnable emits on `port`.
    pub fn register_event_out_callback(
        &mut self,
        port: &str,
        callback: EventCallback,
    ) -> Result<(), SimBuildError> {
        let callbacks = self
            .event_out
            .get_mut(port)
            .ok_or_else(|| SimBuildError::MissingPort {
                runnable: self.id.clone(),
                direction: PortDirection::Out.as_str(),
                port: Some(port.to_string()),
            })?;
        callbacks.push(callback);
        Ok(())
    }

    /// Queues one event on an in port, consumed at this runnable's next step.
    pub fn increment_event_in(&mut self, port: &str) -> Result<(), SimBuildError> {
        let counter = self
            .event_in
            .get_mut(port)
            .ok_or_else(|| SimBuildError::MissingPort {
                runnable: self.id.clone(),
                direction: PortDirection::In.as_str(),
                port: Some(port.to_string()),
            })?;
        *counter += 1;
        Ok(())
    }

    /// Stops committing current values to the shadow buffer.
    pub fn freeze(&mut self) {
        self.plastic = false;
    }

    pub fn thaw(&mut self) {
        self.plastic = true;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn component(&self) -> &FatComponent {
        &self.component
    }

    pub fn parent(&self) -> Option<RunnableId> {
        self.parent
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.store.get(name)
    }

    pub fn shadow_value(&self, name: &str) -> Option<f64> {
        self.store.get_shadow(name)
    }

    /// Overwrites both buffers of a variable; returns false if unknown.
    pub fn set_value(&mut self, name: &str, value: f64) -> bool {
        match self.store.slot(name) {
            Some(slot) => {
                self.store.reset(slot, value);
                true
            }
            None => false,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.text.get(name).map(String::as_str)
    }

    pub fn child(&self, name: &str) -> Option<RunnableId> {
        self.children.get(name).copied()
    }

    pub fn array(&self) -> &[RunnableId] {
        &self.array
    }

    pub fn collection(&self, name: &str) -> Option<&[RunnableId]> {
        self.collections.get(name).map(Vec::as_slice)
    }

    /// Named children, then the instance array, then collections.
    pub fn child_ids(&self) -> impl Iterator<Item = RunnableId> + '_ {
        self.children
            .values()
            .copied()
            .chain(self.array.iter().copied())
            .chain(self.collections.values().flatten().copied())
    }

    /// Name of the active named regime, if any.
    pub fn regime(&self) -> Option<&str> {
        self.regime.map(|r| self.regimes[r].as_str())
    }

    pub fn pending_events(&self, port: &str) -> Option<u32> {
        self.event_in.get(port).copied()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn time_completed(&self) -> SimTime {
        self.time_completed
    }

    pub fn timestep(&self) -> SimTime {
        self.timestep
    }

    pub fn total(&self) -> SimTime {
        self.total
    }

    pub fn is_plastic(&self) -> bool {
        self.plastic
    }

    pub fn recordings(&self) -> impl Iterator<Item = &Recording> {
        self.recorders.iter().map(|r| &r.recording)
    }

    /// Emission times on a port registered for event recording.
    pub fn event_log(&self, port: &str) -> Option<&[SimTime]> {
        self.event_log.get(port).map(Vec::as_slice)
    }

    /// Every logged emission in time order; simultaneous emissions keep
    /// the order their ports were registered in.
    pub fn emitted_events(&self) -> Vec<EmittedEvent> {
        let mut events: Vec<EmittedEvent> = self
            .event_log
            .iter()
            .flat_map(|(port, times)| times.iter().map(move |t| EmittedEvent::new(*t, port.as_str())))
            .collect();
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        events
    }

    /// Starts logging emission times on an out port.
    pub fn record_events(&mut self, port: &str) -> Result<(), SimBuildError> {
        if !self.event_out.contains_key(port) {
            return Err(SimBuildError::MissingPort {
                runnable: self.id.clone(),
                direction: PortDirection::Out.as_str(),
                port: Some(port.to_string()),
            });
        }
        self.event_log.entry(port.to_string()).or_default();
        Ok(())
    }

    pub(crate) fn program(&self) -> usize {
        self.regime.map_or(0, |r| r + 1)
    }

    pub(crate) fn regime_index(&self, name: &str) -> Option<usize> {
        self.regimes.iter().position(|r| r == name)
    }
}
