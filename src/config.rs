//! Configuration system for simulation runs.
//!
//! A configuration names the components to run, their timestep and duration,
//! and the quantities to record. It complements the runs a model declares
//! through its simulation targets.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   name: leaky
//!   log_level: debug
//!   trace_steps: true
//!
//! runs:
//!   - component: cell0
//!     step: 0.01ms
//!     total: 50ms
//!
//! records:
//!   - run: cell0
//!     quantity: v
//!     scale: 1000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read or write configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("unsupported configuration extension '{0}'")]
    UnknownFormat(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Serialization format of a configuration file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Picks the format from a file extension (`yaml`, `yml` or `json`).
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }
}

/// Global simulation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Name used in statistics and reports
    #[serde(default = "default_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether the scheduler records every executed step
    #[serde(default)]
    pub trace_steps: bool,

    /// Whether to collect detailed statistics
    #[serde(default)]
    pub collect_stats: bool,
}

fn default_name() -> String {
    "simulation".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_plastic() -> bool {
    true
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            trace_steps: false,
            collect_stats: false,
        }
    }
}

/// A component run as a scheduler root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Component id in the model
    pub component: String,

    /// Timestep literal, e.g. `0.01ms`
    pub step: String,

    /// Duration literal, e.g. `50ms`
    pub total: String,

    /// Whether current values are committed to the shadow buffer each step
    #[serde(default = "default_plastic")]
    pub plastic: bool,
}

/// A quantity recorded on a configured run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Component of the run the path is resolved from
    pub run: String,

    /// Path to a variable, e.g. `pop[0]/v`
    pub quantity: String,

    /// Display scale stored with the recording
    #[serde(default)]
    pub scale: Option<f64>,
}

/// Complete simulation configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Global simulation parameters
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Run definitions
    #[serde(default)]
    pub runs: Vec<RunConfig>,

    /// Record definitions
    #[serde(default)]
    pub records: Vec<RecordConfig>,
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a configuration.
    pub fn parse(text: &str, format: ConfigFormat) -> ConfigResult<Self> {
        let config: SimConfig = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(text)?,
            ConfigFormat::Json => serde_json::from_str(text)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        Self::parse(yaml, ConfigFormat::Yaml)
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Self::parse(json, ConfigFormat::Json)
    }

    /// Loads a configuration, choosing the format from the extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        Self::parse(&std::fs::read_to_string(path)?, format)
    }

    pub fn render(&self, format: ConfigFormat) -> ConfigResult<String> {
        Ok(match format {
            ConfigFormat::Yaml => serde_yaml::to_string(self)?,
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
        })
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        self.render(ConfigFormat::Yaml)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        self.render(ConfigFormat::Json)
    }

    /// Writes the configuration in the format named by the extension.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let text = self.render(ConfigFormat::from_path(path)?)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Checks run and record declarations against each other.
    ///
    /// Unit literals are only checked for presence here; their dimensions
    /// are checked against the model's unit registry when the runs are built.
    pub fn validate(&self) -> ConfigResult<()> {
        let level = &self.simulation.log_level;
        if level.parse::<LevelFilter>().is_err() {
            return Err(ConfigError::Validation(format!("unknown log level '{level}'")));
        }

        let mut components = HashSet::new();
        for run in &self.runs {
            if run.component.trim().is_empty() {
                return Err(ConfigError::Validation("a run names no component".to_string()));
            }
            if run.step.trim().is_empty() || run.total.trim().is_empty() {
                let message = format!("run '{}' needs both a step and a total", run.component);
                return Err(ConfigError::Validation(message));
            }
            if !components.insert(run.component.as_str()) {
                let message = format!("component '{}' is run twice", run.component);
                return Err(ConfigError::Validation(message));
            }
        }

        for record in &self.records {
            let problem = if !components.contains(record.run.as_str()) {
                Some(format!("record '{}' is on '{}', which is not run", record.quantity, record.run))
            } else if record.quantity.trim().is_empty() {
                Some(format!("a record on '{}' has no quantity", record.run))
            } else {
                record
                    .scale
                    .filter(|scale| !scale.is_finite() || *scale == 0.0)
                    .map(|scale| format!("record '{}' has scale {scale}", record.quantity))
            };
            if let Some(message) = problem {
                return Err(ConfigError::Validation(message));
            }
        }

        if self.runs.iter().any(|r| !r.plastic) {
            tracing::warn!("Frozen runs never commit; their shadow values stay at initial state");
        }

        Ok(())
    }

    /// Installs the global subscriber at the configured log level.
    pub fn init_logging(&self) {
        crate::init_logging(&self.simulation.log_level);
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Finds a run configuration by component id.
    pub fn find_run(&self, component: &str) -> Option<&RunConfig> {
        self.runs.iter().find(|r| r.component == component)
    }
}

/// Assembles a [`SimConfig`] in code.
#[derive(Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.simulation.name = name.into();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Enables the scheduler step trace.
    pub fn trace_steps(mut self, enable: bool) -> Self {
        self.config.simulation.trace_steps = enable;
        self
    }

    pub fn collect_stats(mut self, enable: bool) -> Self {
        self.config.simulation.collect_stats = enable;
        self
    }

    /// Adds a run with unit literals for its timestep and duration.
    pub fn add_run(
        mut self,
        component: impl Into<String>,
        step: impl Into<String>,
        total: impl Into<String>,
    ) -> Self {
        self.config.runs.push(RunConfig {
            component: component.into(),
            step: step.into(),
            total: total.into(),
            plastic: true,
        });
        self
    }

    /// Adds a run that never commits current values to the shadow buffer.
    pub fn add_frozen_run(
        self,
        component: impl Into<String>,
        step: impl Into<String>,
        total: impl Into<String>,
    ) -> Self {
        let mut builder = self.add_run(component, step, total);
        if let Some(run) = builder.config.runs.last_mut() {
            run.plastic = false;
        }
        builder
    }

    /// Records a quantity on a run.
    pub fn add_record(
        mut self,
        run: impl Into<String>,
        quantity: impl Into<String>,
        scale: Option<f64>,
    ) -> Self {
        self.config.records.push(RecordConfig {
            run: run.into(),
            quantity: quantity.into(),
            scale,
        });
        self
    }

    pub fn build(self) -> ConfigResult<SimConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
