//! Path resolution and port selection for structural wiring.
//!
//! Paths are `/`-separated segments resolved from a runnable:
//!
//! - `..` moves to the parent;
//! - `name` selects a named child, a collection, a collection member by
//!   component id, or a `With`/`ForEach` binding when it is the first
//!   segment;
//! - `name[i]` and `name[*]` index into a collection, or into the instance
//!   array of a single runnable.
//!
//! A quantity path ends with a variable name, e.g. `pop[0]/v`.

use indexmap::IndexMap;

use crate::error::SimBuildError;
use crate::model::PortDirection;
use crate::runnable::Network;
use crate::types::RunnableId;

/// Names bound by `With` and `ForEach` while wiring one structure.
pub(crate) type Bindings = IndexMap<String, Vec<RunnableId>>;

enum Index {
    All,
    At(usize),
}

fn not_found(network: &Network, from: RunnableId, path: &str) -> SimBuildError {
    SimBuildError::PathNotFound {
        runnable: network.runnable(from).id().to_string(),
        path: path.to_string(),
    }
}

fn split_segment(segment: &str) -> Option<(&str, Option<Index>)> {
    match segment.strip_suffix(']') {
        None => Some((segment, None)),
        Some(head) => {
            let (name, index) = head.split_once('[')?;
            let index = match index.trim() {
                "*" => Index::All,
                n => Index::At(n.parse().ok()?),
            };
            Some((name, Some(index)))
        }
    }
}

/// A collection member built from the component with id `name`.
fn member_by_component(network: &Network, owner: RunnableId, name: &str) -> Option<RunnableId> {
    network
        .runnable(owner)
        .collections
        .values()
        .flatten()
        .copied()
        .find(|m| network.runnable(*m).component().id == name)
}

/// Resolves a runnable path to every runnable it names.
pub(crate) fn resolve_runnables(
    network: &Network,
    from: RunnableId,
    path: &str,
    bindings: &Bindings,
) -> Result<Vec<RunnableId>, SimBuildError> {
    let mut current = vec![from];

    for (position, segment) in path.split('/').filter(|s| !s.is_empty()).enumerate() {
        if segment == "." {
            continue;
        }
        if segment == ".." {
            current = current
                .iter()
                .map(|id| network.runnable(*id).parent())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| not_found(network, from, path))?;
            continue;
        }

        let (name, index) =
            split_segment(segment).ok_or_else(|| not_found(network, from, path))?;
        let mut next = Vec::new();
        for id in &current {
            let runnable = network.runnable(*id);
            // A single runnable indexes into its instance array; a
            // collection indexes into its members.
            let (members, single) = match (position, bindings.get(name)) {
                (0, Some(bound)) => (bound.clone(), bound.len() == 1),
                _ if name.is_empty() => (vec![*id], true),
                _ => {
                    if let Some(child) = runnable.child(name) {
                        (vec![child], true)
                    } else if let Some(collection) = runnable.collection(name) {
                        (collection.to_vec(), false)
                    } else if let Some(member) = member_by_component(network, *id, name) {
                        (vec![member], true)
                    } else {
                        return Err(not_found(network, from, path));
                    }
                }
            };

            match index {
                None => next.extend(members),
                Some(Index::All) if single => {
                    next.extend(members.iter().flat_map(|m| network.runnable(*m).array().to_vec()))
                }
                Some(Index::All) => next.extend(members),
                Some(Index::At(i)) => {
                    let pool = if single {
                        network.runnable(members[0]).array().to_vec()
                    } else {
                        members
                    };
                    let member = pool.get(i).ok_or_else(|| not_found(network, from, path))?;
                    next.push(*member);
                }
            }
        }
        current = next;
    }
    Ok(current)
}

/// Resolves `runnable-path/variable` to the slots it names.
pub(crate) fn resolve_quantity(
    network: &Network,
    from: RunnableId,
    path: &str,
    bindings: &Bindings,
) -> Result<Vec<(RunnableId, usize)>, SimBuildError> {
    let (prefix, variable) = path.rsplit_once('/').unwrap_or(("", path));
    let runnables = resolve_runnables(network, from, prefix, bindings)?;
    runnables
        .into_iter()
        .map(|id| {
            network
                .runnable(id)
                .store()
                .slot(variable)
                .map(|slot| (id, slot))
                .ok_or_else(|| not_found(network, from, path))
        })
        .collect()
}

/// Picks the named port, or the only port of that direction.
pub(crate) fn select_port(
    network: &Network,
    id: RunnableId,
    direction: PortDirection,
    explicit: Option<&str>,
) -> Result<String, SimBuildError> {
    let runnable = network.runnable(id);
    let candidates: Vec<&String> = runnable
        .component()
        .component_type
        .event_ports
        .values()
        .filter(|p| p.direction == direction)
        .map(|p| &p.name)
        .collect();

    match explicit {
        Some(port) if candidates.iter().any(|c| *c == port) => Ok(port.to_string()),
        Some(port) => Err(SimBuildError::MissingPort {
            runnable: runnable.id().to_string(),
            direction: direction.as_str(),
            port: Some(port.to_string()),
        }),
        None => match candidates.as_slice() {
            [only] => Ok((*only).clone()),
            [] => Err(SimBuildError::MissingPort {
                runnable: runnable.id().to_string(),
                direction: direction.as_str(),
                port: None,
            }),
            many => Err(SimBuildError::AmbiguousPort {
                runnable: runnable.id().to_string(),
                direction: direction.as_str(),
                candidates: many.iter().map(|c| c.to_string()).collect(),
            }),
        },
    }
}
