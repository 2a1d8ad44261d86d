//! Arena of runnables and the per-step protocol.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::compile::bind::{eval, BoundAction, DerivedStep, Program};
use crate::error::SimError;
use crate::event::EventCallback;
use crate::runnable::{Recording, Runnable};
use crate::types::{RunnableId, SimTime};

/// Tolerance when comparing elapsed time against the total duration, so
/// accumulated rounding does not add a step.
const TIME_EPSILON: f64 = 1e-9;

/// All runnables of a simulation, addressed by [`RunnableId`].
#[derive(Debug, Default)]
pub struct Network {
    runnables: Vec<Runnable>,
    by_id: HashMap<String, RunnableId>,
}

/// Serializable view of a runnable subtree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub component: String,
    pub regime: Option<String>,
    pub variables: IndexMap<String, f64>,
    pub children: Vec<Snapshot>,
}

#[derive(Clone, Debug, PartialEq)]
struct RunnableState {
    current: Vec<f64>,
    shadow: Vec<f64>,
    regime: Option<usize>,
    pending_regime: Option<usize>,
    entered: bool,
    event_in: Vec<u32>,
    steps: u64,
    time_completed: SimTime,
    plastic: bool,
    recorder_lens: Vec<usize>,
    event_log_lens: Vec<usize>,
}

/// Saved values, regimes, counters and recorder lengths of every runnable.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    states: Vec<RunnableState>,
}

impl Checkpoint {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, runnable: Runnable) -> Result<RunnableId, SimError> {
        if self.by_id.contains_key(&runnable.id) {
            return Err(SimError::DuplicateRunnable(runnable.id.clone()));
        }
        let id = RunnableId(self.runnables.len());
        self.by_id.insert(runnable.id.clone(), id);
        self.runnables.push(runnable);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.runnables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runnables.is_empty()
    }

    /// Looks up a runnable by its instance id (e.g. `net/pop[0]`).
    pub fn lookup(&self, id: &str) -> Option<RunnableId> {
        self.by_id.get(id).copied()
    }

    pub fn get(&self, id: RunnableId) -> Option<&Runnable> {
        self.runnables.get(id.0)
    }

    pub fn get_mut(&mut self, id: RunnableId) -> Option<&mut Runnable> {
        self.runnables.get_mut(id.0)
    }

    pub(crate) fn runnable(&self, id: RunnableId) -> &Runnable {
        &self.runnables[id.0]
    }

    pub(crate) fn runnable_mut(&mut self, id: RunnableId) -> &mut Runnable {
        &mut self.runnables[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (RunnableId, &Runnable)> {
        self.runnables
            .iter()
            .enumerate()
            .map(|(i, r)| (RunnableId(i), r))
    }

    /// Every recording in the network, in runnable order.
    pub fn recordings(&self) -> impl Iterator<Item = &Recording> {
        self.runnables.iter().flat_map(|r| r.recordings())
    }

    /// Advances a configured runnable by one timestep.
    ///
    /// Returns the elapsed time, or 0 once its total duration is reached.
    pub fn step(&mut self, id: RunnableId) -> Result<SimTime, SimError> {
        let runnable = self
            .runnables
            .get(id.0)
            .ok_or(SimError::UnknownRunnable(id.0))?;
        if !runnable.is_configured() {
            return Err(SimError::NotConfigured(runnable.id.clone()));
        }
        let dt = runnable.timestep;
        if runnable.steps as f64 * dt >= runnable.total - TIME_EPSILON {
            return Ok(0.0);
        }
        self.single_step(id, dt);
        Ok(dt)
    }

    /// Runs the step protocol on `id` and then its whole subtree.
    pub(crate) fn single_step(&mut self, id: RunnableId, dt: SimTime) {
        let programs = Arc::clone(&self.runnables[id.0].programs);
        let t0 = self.runnables[id.0].time_completed;
        let t1 = t0 + dt;

        if let Some(program) = programs.get(self.runnables[id.0].program()) {
            self.integrate(id, program, t0, dt);
            self.handle_events(id, program, t1);
            self.update_derived(id, program, t1);
            for (test, actions) in &program.on_condition {
                if eval(&self.runnables, id, test, t1) != 0.0 {
                    self.run_actions(id, actions, t1);
                }
            }
            self.advance_kinetics(program, dt);
        }

        let runnable = &mut self.runnables[id.0];
        if runnable.plastic {
            runnable.store.commit();
        }
        if let Some(next) = runnable.pending_regime.take() {
            if runnable.regime != Some(next) {
                debug!(
                    runnable = %runnable.id,
                    from = ?runnable.regime(),
                    to = %runnable.regimes[next],
                    time = t1,
                    "Regime transition"
                );
                runnable.regime = Some(next);
                runnable.entered = true;
            }
        }
        for recorder in &mut runnable.recorders {
            let value = runnable.store.value(recorder.slot);
            recorder.recording.samples.push((t1, value));
        }
        runnable.steps += 1;
        runnable.time_completed = t1;
        trace!(runnable = %runnable.id, time = t1, "Stepped");

        let children: Vec<RunnableId> = runnable.child_ids().collect();
        for child in children {
            self.single_step(child, dt);
        }
    }

    fn integrate(&mut self, id: RunnableId, program: &Program, t0: SimTime, dt: SimTime) {
        if program.time_derivatives.is_empty() {
            return;
        }
        let updates: Vec<(usize, f64)> = program
            .time_derivatives
            .iter()
            .map(|(slot, rate)| {
                let x = self.runnables[id.0].store.value(*slot);
                (*slot, x + dt * eval(&self.runnables, id, rate, t0))
            })
            .collect();
        let store = &mut self.runnables[id.0].store;
        for (slot, value) in updates {
            store.set(slot, value);
        }
    }

    fn handle_events(&mut self, id: RunnableId, program: &Program, time: SimTime) {
        if std::mem::take(&mut self.runnables[id.0].entered) {
            self.run_actions(id, &program.on_entry, time);
        }
        for (port, actions) in &program.on_event {
            let count = self.runnables[id.0].event_in.get(port).copied().unwrap_or(0);
            for _ in 0..count {
                self.run_actions(id, actions, time);
            }
        }
        for counter in self.runnables[id.0].event_in.values_mut() {
            *counter = 0;
        }
    }

    pub(crate) fn update_derived(&mut self, id: RunnableId, program: &Program, time: SimTime) {
        for step in &program.derived {
            let (slot, value) = match step {
                DerivedStep::Value { slot, value } => (*slot, eval(&self.runnables, id, value, time)),
                DerivedStep::Cases { slot, cases } => {
                    let chosen = cases.iter().find(|(condition, _)| {
                        condition
                            .as_ref()
                            .map_or(true, |c| eval(&self.runnables, id, c, time) != 0.0)
                    });
                    let value = chosen.map_or(0.0, |(_, value)| eval(&self.runnables, id, value, time));
                    (*slot, value)
                }
                DerivedStep::Select {
                    slot,
                    reduce,
                    sources,
                    ..
                } => {
                    let values = sources
                        .iter()
                        .map(|(runnable, slot)| self.runnables[runnable.0].store.value(*slot));
                    let value = match reduce {
                        Some(reduce) => values.fold(reduce.seed(), |acc, v| reduce.combine(acc, v)),
                        None => values.last().unwrap_or(0.0),
                    };
                    (*slot, value)
                }
            };
            self.runnables[id.0].store.set(slot, value);
        }
    }

    fn advance_kinetics(&mut self, program: &Program, dt: SimTime) {
        for scheme in &program.kinetics {
            // Flows use last step's occupancies
            let mut next: Vec<f64> = scheme
                .nodes
                .iter()
                .map(|(r, s)| self.runnables[r.0].store.shadow(*s))
                .collect();
            for edge in &scheme.edges {
                let rate = |(r, s): (RunnableId, usize)| self.runnables[r.0].store.value(s);
                let (sr, ss) = scheme.nodes[edge.source];
                let (tr, ts) = scheme.nodes[edge.target];
                let source = self.runnables[sr.0].store.shadow(ss);
                let target = self.runnables[tr.0].store.shadow(ts);
                let flow = dt * (rate(edge.forward) * source - rate(edge.reverse) * target);
                next[edge.source] -= flow;
                next[edge.target] += flow;
            }
            let total: f64 = next.iter().sum();
            if total > 0.0 {
                next.iter_mut().for_each(|p| *p /= total);
            }
            for ((runnable, slot), value) in scheme.nodes.iter().zip(next) {
                self.runnables[runnable.0].store.set(*slot, value);
            }
        }
    }

    fn run_actions(&mut self, id: RunnableId, actions: &[BoundAction], time: SimTime) {
        for action in actions {
            match action {
                BoundAction::Assign { slot, value } => {
                    let value = eval(&self.runnables, id, value, time);
                    self.runnables[id.0].store.set(*slot, value);
                }
                BoundAction::EventOut { port } => self.emit(id, port, time),
                BoundAction::Transition { regime } => {
                    self.runnables[id.0].pending_regime = Some(*regime);
                }
            }
        }
    }

    fn emit(&mut self, id: RunnableId, port: &str, time: SimTime) {
        let runnable = &mut self.runnables[id.0];
        if let Some(log) = runnable.event_log.get_mut(port) {
            log.push(time);
        }
        let callbacks = runnable.event_out.get(port).cloned().unwrap_or_default();
        trace!(runnable = %runnable.id, port, time, targets = callbacks.len(), "Event out");
        for callback in callbacks {
            match callback {
                EventCallback::Deliver { target, port } => {
                    if let Some(counter) = self.runnables[target.0].event_in.get_mut(&port) {
                        *counter += 1;
                    }
                }
                EventCallback::Custom(f) => f(time),
            }
        }
    }

    /// Runs start-up actions (parents first), computes derived variables
    /// (children first) and commits the subtree rooted at `id`.
    pub(crate) fn initialize(&mut self, id: RunnableId) {
        self.run_start_actions(id);
        self.derive_subtree(id);
        self.commit_subtree(id);
    }

    fn run_start_actions(&mut self, id: RunnableId) {
        let programs = Arc::clone(&self.runnables[id.0].programs);
        if let Some(program) = programs.get(self.runnables[id.0].program()) {
            self.run_actions(id, &program.on_start, 0.0);
        }
        let children: Vec<RunnableId> = self.runnables[id.0].child_ids().collect();
        for child in children {
            self.run_start_actions(child);
        }
    }

    fn derive_subtree(&mut self, id: RunnableId) {
        let children: Vec<RunnableId> = self.runnables[id.0].child_ids().collect();
        for child in children {
            self.derive_subtree(child);
        }
        let programs = Arc::clone(&self.runnables[id.0].programs);
        let time = self.runnables[id.0].time_completed;
        if let Some(program) = programs.get(self.runnables[id.0].program()) {
            self.update_derived(id, program, time);
        }
    }

    fn commit_subtree(&mut self, id: RunnableId) {
        self.runnables[id.0].store.commit();
        let children: Vec<RunnableId> = self.runnables[id.0].child_ids().collect();
        for child in children {
            self.commit_subtree(child);
        }
    }

    /// Saves the mutable state of every runnable.
    pub fn checkpoint(&self) -> Checkpoint {
        let states = self
            .runnables
            .iter()
            .map(|r| {
                let (current, shadow) = r.store.buffers();
                RunnableState {
                    current: current.to_vec(),
                    shadow: shadow.to_vec(),
                    regime: r.regime,
                    pending_regime: r.pending_regime,
                    entered: r.entered,
                    event_in: r.event_in.values().copied().collect(),
                    steps: r.steps,
                    time_completed: r.time_completed,
                    plastic: r.plastic,
                    recorder_lens: r.recorders.iter().map(|rec| rec.recording.len()).collect(),
                    event_log_lens: r.event_log.values().map(Vec::len).collect(),
                }
            })
            .collect();
        Checkpoint { states }
    }

    /// Rolls every runnable back to a checkpoint taken from this network.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<(), SimError> {
        if checkpoint.states.len() != self.runnables.len() {
            return Err(SimError::CheckpointMismatch {
                expected: checkpoint.states.len(),
                found: self.runnables.len(),
            });
        }
        for (runnable, state) in self.runnables.iter_mut().zip(&checkpoint.states) {
            if !runnable.store.restore(&state.current, &state.shadow) {
                return Err(SimError::CheckpointMismatch {
                    expected: state.current.len(),
                    found: runnable.store.len(),
                });
            }
            runnable.regime = state.regime;
            runnable.pending_regime = state.pending_regime;
            runnable.entered = state.entered;
            for (counter, saved) in runnable.event_in.values_mut().zip(&state.event_in) {
                *counter = *saved;
            }
            runnable.steps = state.steps;
            runnable.time_completed = state.time_completed;
            runnable.plastic = state.plastic;
            for (recorder, len) in runnable.recorders.iter_mut().zip(&state.recorder_lens) {
                recorder.recording.samples.truncate(*len);
            }
            for (log, len) in runnable.event_log.values_mut().zip(&state.event_log_lens) {
                log.truncate(*len);
            }
        }
        debug!(runnables = self.runnables.len(), "Restored checkpoint");
        Ok(())
    }

    /// Captures the subtree rooted at `id`.
    pub fn snapshot(&self, id: RunnableId) -> Result<Snapshot, SimError> {
        let runnable = self
            .runnables
            .get(id.0)
            .ok_or(SimError::UnknownRunnable(id.0))?;
        let children = runnable
            .child_ids()
            .map(|child| self.snapshot(child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Snapshot {
            id: runnable.id.clone(),
            component: runnable.component.id.clone(),
            regime: runnable.regime().map(str::to_string),
            variables: runnable
                .store
                .iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
            children,
        })
    }
}
