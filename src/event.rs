//! Event delivery between runnables.
//!
//! Events carry no payload. Emitting on an out port runs every callback
//! registered on that port; the usual callback increments an in-port counter
//! on the target, which the target drains at its own next step.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{PortId, RunnableId, SimTime};

/// What happens when a runnable emits on an out port.
#[derive(Clone)]
pub enum EventCallback {
    /// Queue one event on `port` of `target`.
    Deliver { target: RunnableId, port: PortId },
    /// Invoke an external hook with the emission time.
    Custom(Arc<dyn Fn(SimTime) + Send + Sync>),
}

impl EventCallback {
    pub fn deliver(target: RunnableId, port: impl Into<PortId>) -> Self {
        EventCallback::Deliver {
            target,
            port: port.into(),
        }
    }

    pub fn custom(f: impl Fn(SimTime) + Send + Sync + 'static) -> Self {
        EventCallback::Custom(Arc::new(f))
    }

    /// The runnable this callback delivers to, if any.
    pub fn target(&self) -> Option<RunnableId> {
        match self {
            EventCallback::Deliver { target, .. } => Some(*target),
            EventCallback::Custom(_) => None,
        }
    }
}

impl fmt::Debug for EventCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventCallback::Deliver { target, port } => f
                .debug_struct("Deliver")
                .field("target", target)
                .field("port", port)
                .finish(),
            EventCallback::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One emitted event, as seen in a runnable's event log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub time: SimTime,
    pub port: PortId,
}

impl EmittedEvent {
    pub fn new(time: SimTime, port: impl Into<PortId>) -> Self {
        Self {
            time,
            port: port.into(),
        }
    }
}
