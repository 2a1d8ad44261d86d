//! Evaluation order of derived variables.

use indexmap::IndexSet;

use crate::error::SimBuildError;

/// An expression-valued derived variable and the names it references.
#[derive(Clone, Debug)]
pub(crate) struct Dependent<'a> {
    pub name: &'a str,
    pub symbols: Vec<&'a str>,
}

/// Orders expression-valued derived variables so each is computed after
/// every derived variable it reads.
///
/// Each scan walks the still-unordered variables in declaration order and
/// takes every one whose references are all ordered (or are not derived
/// variables at all). A scan that takes nothing means the rest form a cycle.
pub(crate) fn order_derived<'a>(
    runnable: &str,
    variables: Vec<Dependent<'a>>,
) -> Result<Vec<&'a str>, SimBuildError> {
    let mut unordered: IndexSet<&str> = variables.iter().map(|v| v.name).collect();
    let mut remaining = variables;
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let before = ordered.len();
        remaining.retain(|variable| {
            let ready = variable.symbols.iter().all(|s| !unordered.contains(s));
            if ready {
                unordered.shift_remove(variable.name);
                ordered.push(variable.name);
            }
            !ready
        });
        if ordered.len() == before {
            return Err(SimBuildError::CyclicDependency {
                runnable: runnable.to_string(),
                variables: remaining.iter().map(|v| v.name.to_string()).collect(),
            });
        }
    }
    Ok(ordered)
}
