//! Statistics collection and export for simulation runs.
//!
//! [`SimulationStats`] is filled from a finished [`Simulation`]: scheduler
//! totals, one row per runnable and wall-clock throughput when the run was
//! timed through a [`StatsCollector`]. It exports as JSON, CSV or a readable
//! summary.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::engine::Simulation;
use crate::error::SimError;
use crate::types::SimTime;

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    pub metadata: SimulationMetadata,

    pub scheduler: SchedulerSummary,

    /// Per-runnable progress, keyed by instance id
    pub runnables: IndexMap<String, RunnableStats>,

    pub timing: TimingStats,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationMetadata {
    pub name: String,

    /// Version of this crate that produced the run
    pub version: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchedulerSummary {
    /// Latest completion time over all roots
    pub final_time: SimTime,

    /// Root steps popped from the schedule
    pub steps_executed: u64,

    pub root_count: usize,

    pub runnable_count: usize,

    pub recording_count: usize,

    /// Samples over all recordings
    pub sample_count: usize,
}

/// Progress of one runnable at collection time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnableStats {
    /// Component the runnable was built from
    pub component: String,

    /// Active named regime
    pub regime: Option<String>,

    pub steps: u64,

    pub time_completed: SimTime,

    /// Logged emissions over every recorded port
    pub events_logged: usize,
}

/// Wall-clock throughput; zero when the run was not timed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    pub wall_time_ms: f64,

    /// Simulated seconds per wall-clock second
    pub sim_time_per_second: f64,

    pub steps_per_second: f64,
}

impl SimulationStats {
    pub fn new() -> Self {
        Self {
            metadata: SimulationMetadata {
                name: String::new(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// Fills scheduler and runnable statistics from a simulation.
    pub fn collect(&mut self, simulation: &Simulation) {
        let network = simulation.network();
        let run = simulation.stats();

        self.scheduler = SchedulerSummary {
            final_time: run.final_time,
            steps_executed: run.steps_executed,
            root_count: simulation.roots().len(),
            runnable_count: network.len(),
            recording_count: network.recordings().count(),
            sample_count: network.recordings().map(|r| r.len()).sum(),
        };

        self.runnables = network
            .iter()
            .map(|(_, r)| {
                let stats = RunnableStats {
                    component: r.component().id.clone(),
                    regime: r.regime().map(str::to_string),
                    steps: r.steps(),
                    time_completed: r.time_completed(),
                    events_logged: r.event_log.values().map(Vec::len).sum(),
                };
                (r.id().to_string(), stats)
            })
            .collect();
    }

    /// Derives throughput from the wall-clock duration of the run.
    pub fn set_wall_time(&mut self, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        self.timing.wall_time_ms = seconds * 1000.0;
        if seconds > 0.0 {
            self.timing.sim_time_per_second = self.scheduler.final_time / seconds;
            self.timing.steps_per_second = self.scheduler.steps_executed as f64 / seconds;
        }
    }

    /// Scalar metrics in export order.
    fn metrics(&self) -> [(&'static str, String); 9] {
        let s = &self.scheduler;
        let t = &self.timing;
        [
            ("final_time", s.final_time.to_string()),
            ("steps_executed", s.steps_executed.to_string()),
            ("root_count", s.root_count.to_string()),
            ("runnable_count", s.runnable_count.to_string()),
            ("recording_count", s.recording_count.to_string()),
            ("sample_count", s.sample_count.to_string()),
            ("wall_time_ms", format!("{:.2}", t.wall_time_ms)),
            ("sim_time_per_second", format!("{:.2}", t.sim_time_per_second)),
            ("steps_per_second", format!("{:.2}", t.steps_per_second)),
        ]
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Scalar metrics as `metric,value` rows.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("metric,value\n");
        for (metric, value) in self.metrics() {
            csv.push_str(metric);
            csv.push(',');
            csv.push_str(&value);
            csv.push('\n');
        }
        csv
    }

    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// One row per runnable.
    pub fn runnables_to_csv(&self) -> String {
        let mut csv = String::from("runnable,component,regime,steps,time_completed,events_logged\n");
        for (id, r) in &self.runnables {
            csv.push_str(&format!(
                "{id},{},{},{},{},{}\n",
                r.component,
                r.regime.as_deref().unwrap_or_default(),
                r.steps,
                r.time_completed,
                r.events_logged,
            ));
        }
        csv
    }

    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        let title = if self.metadata.name.is_empty() {
            "simulation"
        } else {
            self.metadata.name.as_str()
        };
        writeln!(w, "{title} (lems-runtime {})", self.metadata.version)?;
        for (metric, value) in self.metrics() {
            writeln!(w, "  {metric:<20} {value}")?;
        }

        let mut regimes: IndexMap<&str, usize> = IndexMap::new();
        for r in self.runnables.values() {
            if let Some(regime) = &r.regime {
                *regimes.entry(regime.as_str()).or_default() += 1;
            }
        }
        for (regime, count) in regimes {
            writeln!(w, "  regime {regime}: {count} runnables")?;
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Wall-clock stopwatch.
#[derive(Clone, Copy, Debug)]
pub struct Timer(Instant);

impl Timer {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

/// Runs a simulation under a timer and collects its statistics.
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: SimulationStats,
}

impl StatsCollector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            stats: SimulationStats::new().with_name(name),
        }
    }

    /// Runs `simulation` to completion and refreshes the statistics.
    pub fn run(&mut self, simulation: &mut Simulation) -> Result<&SimulationStats, SimError> {
        let timer = Timer::start();
        simulation.run()?;
        let elapsed = timer.elapsed();

        self.stats.collect(simulation);
        self.stats.set_wall_time(elapsed);
        Ok(&self.stats)
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn into_stats(self) -> SimulationStats {
        self.stats
    }
}
