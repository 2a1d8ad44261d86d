//! Time series recorded from runnable variables.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::types::SimTime;

/// Samples of one quantity, taken at the end of every step of its owner.
///
/// Values are stored in SI; `scale` is carried for consumers that display
/// them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Quantity path as declared, e.g. `pop[0]/v`.
    pub quantity: String,
    pub scale: f64,
    pub color: Option<String>,
    pub samples: Vec<(SimTime, f64)>,
}

impl Recording {
    pub fn new(quantity: impl Into<String>) -> Self {
        Self {
            quantity: quantity.into(),
            scale: 1.0,
            color: None,
            samples: Vec::new(),
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_color(mut self, color: Option<String>) -> Self {
        self.color = color;
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = SimTime> + '_ {
        self.samples.iter().map(|(t, _)| *t)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|(_, v)| *v)
    }

    pub fn last(&self) -> Option<(SimTime, f64)> {
        self.samples.last().copied()
    }

    /// Two-column CSV with a `time,<quantity>` header.
    pub fn to_csv(&self) -> String {
        let mut csv = String::with_capacity(16 * (self.samples.len() + 1));
        let _ = writeln!(csv, "time,{}", self.quantity);
        for (time, value) in &self.samples {
            let _ = writeln!(csv, "{time},{value}");
        }
        csv
    }
}

/// Binds a recording to a slot of the runnable that owns it.
#[derive(Clone, Debug)]
pub(crate) struct Recorder {
    pub slot: usize,
    pub recording: Recording,
}
