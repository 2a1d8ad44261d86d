//! Structural declarations applied while building runnables.

/// Instantiates the component named by a component-reference parameter (or
/// confirms a filled child slot) as a named child.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildInstance {
    pub component: String,
}

/// Instantiates `number` copies of a referenced component into the owner's
/// instance array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiInstantiate {
    /// Component-reference parameter naming the prototype.
    pub component: String,
    /// Numeric parameter holding the copy count.
    pub number: String,
}

/// Binds a name to a runnable path for later structural statements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct With {
    pub instance: String,
    pub as_name: String,
}

/// Wires an event-out port to an event-in port.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventConnection {
    pub from: String,
    pub to: String,
    pub source_port: Option<String>,
    pub target_port: Option<String>,
    /// Component-reference parameter naming a proxy instantiated per
    /// connection to receive the event in place of the target.
    pub receiver: Option<String>,
    /// Attachment collection of the target that holds the receiver.
    pub receiver_container: Option<String>,
}

impl EventConnection {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            ..Self::default()
        }
    }

    pub fn with_ports(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_port = Some(source.into());
        self.target_port = Some(target.into());
        self
    }

    pub fn with_receiver(mut self, receiver: impl Into<String>, container: Option<String>) -> Self {
        self.receiver = Some(receiver.into());
        self.receiver_container = container;
        self
    }
}

/// Iterates over the runnables at `instances`, binding each to `as_name`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForEach {
    pub instances: String,
    pub as_name: String,
    pub for_each: Vec<ForEach>,
    pub event_connections: Vec<EventConnection>,
}

impl ForEach {
    pub fn new(instances: impl Into<String>, as_name: impl Into<String>) -> Self {
        Self {
            instances: instances.into(),
            as_name: as_name.into(),
            ..Self::default()
        }
    }

    pub fn with_for_each(mut self, nested: ForEach) -> Self {
        self.for_each.push(nested);
        self
    }

    pub fn with_event_connection(mut self, connection: EventConnection) -> Self {
        self.event_connections.push(connection);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Structure {
    pub child_instances: Vec<ChildInstance>,
    pub multi_instantiates: Vec<MultiInstantiate>,
    pub withs: Vec<With>,
    pub for_each: Vec<ForEach>,
    pub event_connections: Vec<EventConnection>,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_child_instance(mut self, component: impl Into<String>) -> Self {
        self.child_instances.push(ChildInstance {
            component: component.into(),
        });
        self
    }

    pub fn with_multi_instantiate(
        mut self,
        component: impl Into<String>,
        number: impl Into<String>,
    ) -> Self {
        self.multi_instantiates.push(MultiInstantiate {
            component: component.into(),
            number: number.into(),
        });
        self
    }

    pub fn with_with(mut self, instance: impl Into<String>, as_name: impl Into<String>) -> Self {
        self.withs.push(With {
            instance: instance.into(),
            as_name: as_name.into(),
        });
        self
    }

    pub fn with_for_each(mut self, for_each: ForEach) -> Self {
        self.for_each.push(for_each);
        self
    }

    pub fn with_event_connection(mut self, connection: EventConnection) -> Self {
        self.event_connections.push(connection);
        self
    }

    /// Appends another structure's entries after this one's.
    pub fn extend(&mut self, other: &Structure) {
        self.child_instances.extend(other.child_instances.iter().cloned());
        self.multi_instantiates.extend(other.multi_instantiates.iter().cloned());
        self.withs.extend(other.withs.iter().cloned());
        self.for_each.extend(other.for_each.iter().cloned());
        self.event_connections.extend(other.event_connections.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.child_instances.is_empty()
            && self.multi_instantiates.is_empty()
            && self.withs.is_empty()
            && self.for_each.is_empty()
            && self.event_connections.is_empty()
    }
}
