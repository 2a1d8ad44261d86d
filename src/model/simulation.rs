//! Simulation declarations: which components run, and what is recorded.
//!
//! Every field names a parameter of the declaring component type, so the
//! concrete values come from the component being simulated.

/// Runs the referenced component at a fixed increment for a total duration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Run {
    /// Component-reference parameter naming the component to run.
    pub component: String,
    /// Name of the time variable exposed to expressions.
    pub variable: String,
    /// Time parameter holding the step size.
    pub increment: String,
    /// Time parameter holding the total duration.
    pub total: String,
}

impl Run {
    pub fn new(
        component: impl Into<String>,
        variable: impl Into<String>,
        increment: impl Into<String>,
        total: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            variable: variable.into(),
            increment: increment.into(),
            total: total.into(),
        }
    }
}

/// Records a quantity of the enclosing run every step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Path parameter naming the quantity, e.g. `pop[0]/v`.
    pub quantity: String,
    /// Optional numeric parameter used as a display scale.
    pub scale: Option<String>,
    /// Optional text parameter carried through to consumers.
    pub color: Option<String>,
}

impl Record {
    pub fn new(quantity: impl Into<String>) -> Self {
        Self {
            quantity: quantity.into(),
            scale: None,
            color: None,
        }
    }

    pub fn with_scale(mut self, scale: impl Into<String>) -> Self {
        self.scale = Some(scale.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Logs the times at which a runnable emits events on a port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    /// Path parameter naming the runnable.
    pub quantity: String,
    /// Text parameter naming the out port.
    pub event_port: String,
}

impl EventRecord {
    pub fn new(quantity: impl Into<String>, event_port: impl Into<String>) -> Self {
        Self {
            quantity: quantity.into(),
            event_port: event_port.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimulationSpec {
    pub runs: Vec<Run>,
    pub records: Vec<Record>,
    pub event_records: Vec<EventRecord>,
}

impl SimulationSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run(mut self, run: Run) -> Self {
        self.runs.push(run);
        self
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    pub fn with_event_record(mut self, record: EventRecord) -> Self {
        self.event_records.push(record);
        self
    }

    pub fn extend(&mut self, other: &SimulationSpec) {
        self.runs.extend(other.runs.iter().cloned());
        self.records.extend(other.records.iter().cloned());
        self.event_records.extend(other.event_records.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty() && self.records.is_empty() && self.event_records.is_empty()
    }
}
