//! Multi-rate scheduler and the simulation facade.
//!
//! Every run root advances at its own timestep. The scheduler keeps the
//! roots in a priority queue keyed by the time each is next due, so a root
//! due at `T` always finishes its step before any root due later starts.
//! Due times are compared on a nanosecond grid, so roots whose timesteps
//! are multiples of one another meet at the same instant. Ties go to the
//! root queued first.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SimError;
use crate::runnable::{Checkpoint, Network, Recording, Snapshot};
use crate::stats::{SimulationStats, Timer};
use crate::types::{RunnableId, SimTime};

/// One executed step, in execution order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Start time of the step
    pub time: SimTime,
    /// Root that stepped
    pub runnable: String,
}

/// Statistics collected by a scheduler run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Total number of root steps executed
    pub steps_executed: u64,
    /// Latest completion time over all roots
    pub final_time: SimTime,
    /// Number of scheduled roots
    pub roots: usize,
    /// Executed steps, when tracing is enabled
    pub trace: Vec<TraceEntry>,
}

/// Resolution of the scheduling grid, in seconds.
const DUE_RESOLUTION: f64 = 1.0e-9;

#[derive(Debug)]
struct Due {
    tick: i64,
    seq: u64,
    id: RunnableId,
}

impl Due {
    /// Due entry for the next step of a runnable that has completed `steps`.
    fn next(id: RunnableId, steps: u64, timestep: SimTime, seq: u64) -> Self {
        let time = steps as f64 * timestep;
        Self {
            tick: (time / DUE_RESOLUTION).round() as i64,
            seq,
            id,
        }
    }
}

impl Ord for Due {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest tick first, then earliest queued
        other
            .tick
            .cmp(&self.tick)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Due {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Due {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Due {}

/// Drives a set of configured roots until each reaches its total duration.
#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    trace: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `(time, runnable)` for every executed step.
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }

    /// Runs every root to completion.
    ///
    /// Each root is first due at the time it has already completed, so a
    /// restored network resumes where it left off.
    pub fn run(&self, network: &mut Network, roots: &[RunnableId]) -> Result<SchedulerStats, SimError> {
        let mut seen = HashSet::new();
        let mut queue = BinaryHeap::with_capacity(roots.len());
        let mut seq = 0u64;

        for &id in roots {
            let runnable = network.get(id).ok_or(SimError::UnknownRunnable(id.index()))?;
            if !seen.insert(id) {
                return Err(SimError::DuplicateRunnable(runnable.id().to_string()));
            }
            if !runnable.is_configured() {
                return Err(SimError::NotConfigured(runnable.id().to_string()));
            }
            queue.push(Due::next(id, runnable.steps(), runnable.timestep(), seq));
            seq += 1;
        }

        let mut stats = SchedulerStats {
            roots: roots.len(),
            ..SchedulerStats::default()
        };

        while let Some(due) = queue.pop() {
            let start = network.runnable(due.id).time_completed();
            let elapsed = network.step(due.id)?;
            let runnable = network.runnable(due.id);
            if elapsed <= 0.0 {
                debug!(runnable = %runnable.id(), time = start, "Run complete");
                continue;
            }
            stats.steps_executed += 1;
            stats.final_time = stats.final_time.max(runnable.time_completed());
            if self.trace {
                stats.trace.push(TraceEntry {
                    time: start,
                    runnable: runnable.id().to_string(),
                });
            }
            queue.push(Due::next(due.id, runnable.steps(), runnable.timestep(), seq));
            seq += 1;
        }

        info!(
            roots = stats.roots,
            steps = stats.steps_executed,
            final_time = stats.final_time,
            "Scheduler finished"
        );
        Ok(stats)
    }
}

/// A built network together with the roots the scheduler drives.
#[derive(Debug)]
pub struct Simulation {
    network: Network,
    roots: Vec<RunnableId>,
    scheduler: Scheduler,
    stats: SchedulerStats,
    /// Filled after every run when statistics collection is enabled
    collected: Option<SimulationStats>,
}

impl Simulation {
    pub fn new(network: Network, roots: Vec<RunnableId>) -> Self {
        Self {
            network,
            roots,
            scheduler: Scheduler::new(),
            stats: SchedulerStats::default(),
            collected: None,
        }
    }

    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.scheduler = self.scheduler.with_trace(enabled);
        self
    }

    /// Collects named [`SimulationStats`] after every run.
    pub fn with_stats(mut self, name: impl Into<String>) -> Self {
        self.collected = Some(SimulationStats::new().with_name(name));
        self
    }

    /// Runs every root until its total duration is reached.
    pub fn run(&mut self) -> Result<&SchedulerStats, SimError> {
        let timer = Timer::start();
        self.stats = self.scheduler.run(&mut self.network, &self.roots)?;
        if let Some(mut collected) = self.collected.take() {
            collected.collect(self);
            collected.set_wall_time(timer.elapsed());
            self.collected = Some(collected);
        }
        Ok(&self.stats)
    }

    /// Statistics of the most recent run.
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Statistics collected by the most recent run, if enabled.
    pub fn collected_stats(&self) -> Option<&SimulationStats> {
        self.collected.as_ref()
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn roots(&self) -> &[RunnableId] {
        &self.roots
    }

    /// Looks up a runnable by instance id.
    pub fn lookup(&self, id: &str) -> Option<RunnableId> {
        self.network.lookup(id)
    }

    /// Current value of `variable` on the runnable with instance id `id`.
    pub fn value(&self, id: &str, variable: &str) -> Option<f64> {
        self.network
            .lookup(id)
            .and_then(|r| self.network.get(r))
            .and_then(|r| r.value(variable))
    }

    pub fn recordings(&self) -> impl Iterator<Item = &Recording> {
        self.network.recordings()
    }

    /// First recording of `quantity`.
    pub fn recording(&self, quantity: &str) -> Option<&Recording> {
        self.network.recordings().find(|r| r.quantity == quantity)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.network.checkpoint()
    }

    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<(), SimError> {
        self.network.restore(checkpoint)
    }

    pub fn snapshot(&self, id: RunnableId) -> Result<Snapshot, SimError> {
        self.network.snapshot(id)
    }

    /// Exports run statistics and per-root progress as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        let roots: Vec<serde_json::Value> = self
            .roots
            .iter()
            .filter_map(|id| self.network.get(*id))
            .map(|r| {
                serde_json::json!({
                    "id": r.id(),
                    "timestep": r.timestep(),
                    "total": r.total(),
                    "steps": r.steps(),
                    "time_completed": r.time_completed(),
                })
            })
            .collect();

        serde_json::json!({
            "scheduler": {
                "steps_executed": self.stats.steps_executed,
                "final_time": self.stats.final_time,
                "root_count": self.roots.len(),
                "runnable_count": self.network.len(),
            },
            "roots": roots,
        })
    }
}
