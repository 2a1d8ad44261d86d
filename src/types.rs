//! Core type definitions for the runtime.
//!
//! This module defines the fundamental types shared by the compiler, the
//! runnable tree and the scheduler.

use serde::{Deserialize, Serialize};

/// Simulation time, in seconds.
///
/// Every runnable advances on the same timeline; timesteps and durations are
/// SI values produced by the unit registry.
pub type SimTime = f64;

/// Name of an event port on a component type.
pub type PortId = String;

/// Stable handle to a runnable stored in a [`Network`](crate::runnable::Network).
///
/// Handles stay valid for the lifetime of the network; runnables are never
/// removed once built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunnableId(pub(crate) usize);

impl RunnableId {
    /// Returns the arena index of this handle.
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for RunnableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_aliases() {
        let time: SimTime = 0.5;
        let port: PortId = "spike".to_string();

        assert_eq!(time, 0.5);
        assert_eq!(port, "spike");
    }

    #[test]
    fn test_runnable_id_display() {
        let id = RunnableId(7);
        assert_eq!(id.index(), 7);
        assert_eq!(id.to_string(), "#7");
    }
}
