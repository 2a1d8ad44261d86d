//! Double-buffered variable storage for one runnable.

use indexmap::IndexMap;

/// Named slots holding the current value and the shadow (last committed)
/// value of every numeric quantity of a runnable.
///
/// Slots are assigned in declaration order and never move, so compiled
/// procedures address them by index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariableStore {
    index: IndexMap<String, usize>,
    current: Vec<f64>,
    shadow: Vec<f64>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `name` with an initial value in both buffers and returns its
    /// slot. Redeclaring keeps the existing slot and value.
    pub fn declare(&mut self, name: &str, value: f64) -> usize {
        if let Some(&slot) = self.index.get(name) {
            return slot;
        }
        let slot = self.current.len();
        self.index.insert(name.to_string(), slot);
        self.current.push(value);
        self.shadow.push(value);
        slot
    }

    pub fn slot(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Current value of `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.slot(name).map(|slot| self.current[slot])
    }

    /// Last committed value of `name`.
    pub fn get_shadow(&self, name: &str) -> Option<f64> {
        self.slot(name).map(|slot| self.shadow[slot])
    }

    #[inline]
    pub fn value(&self, slot: usize) -> f64 {
        self.current[slot]
    }

    #[inline]
    pub fn shadow(&self, slot: usize) -> f64 {
        self.shadow[slot]
    }

    #[inline]
    pub fn set(&mut self, slot: usize, value: f64) {
        self.current[slot] = value;
    }

    /// Writes both buffers, used when seeding values outside a step.
    pub fn reset(&mut self, slot: usize, value: f64) {
        self.current[slot] = value;
        self.shadow[slot] = value;
    }

    /// Copies current values into the shadow buffer.
    pub fn commit(&mut self) {
        self.shadow.copy_from_slice(&self.current);
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// `(name, current value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.index
            .iter()
            .map(|(name, &slot)| (name.as_str(), self.current[slot]))
    }

    pub(crate) fn buffers(&self) -> (&[f64], &[f64]) {
        (&self.current, &self.shadow)
    }

    /// Restores both buffers from a checkpoint; returns false if the sizes
    /// do not match this store.
    pub(crate) fn restore(&mut self, current: &[f64], shadow: &[f64]) -> bool {
        if current.len() != self.current.len() || shadow.len() != self.shadow.len() {
            return false;
        }
        self.current.copy_from_slice(current);
        self.shadow.copy_from_slice(shadow);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_is_idempotent() {
        let mut store = VariableStore::new();
        let a = store.declare("v", -0.065);
        let b = store.declare("w", 0.0);
        assert_eq!((a, b), (0, 1));
        assert_eq!(store.declare("v", 1.0), 0);
        assert_eq!(store.get("v"), Some(-0.065));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_shadow_lags_until_commit() {
        let mut store = VariableStore::new();
        let slot = store.declare("x", 1.0);
        store.set(slot, 2.0);
        assert_eq!(store.value(slot), 2.0);
        assert_eq!(store.shadow(slot), 1.0);

        store.commit();
        assert_eq!(store.get_shadow("x"), Some(2.0));
    }

    #[test]
    fn test_restore_rejects_size_mismatch() {
        let mut store = VariableStore::new();
        store.declare("x", 1.0);
        assert!(!store.restore(&[1.0, 2.0], &[1.0, 2.0]));
        assert!(store.restore(&[5.0], &[4.0]));
        assert_eq!(store.get("x"), Some(5.0));
        assert_eq!(store.get_shadow("x"), Some(4.0));
    }
}
