//! Keyed scratch storage for stateful operators (`spec.md` §4.2.8): "Storage
//! operators that must remember seen keys ... request a keyed scratch store
//! from the runtime. The store is opaque to the operator and is expected to
//! survive only for the operator's lifetime." Each stateful operator simply
//! owns one of these directly rather than threading a separate runtime
//! handle through — the same "operator scratch state is owned exclusively by
//! the operator" rule `spec.md` §9 states for ownership generally.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Scratch<K: Ord, V>(BTreeMap<K, V>);

impl<K: Ord, V> Scratch<K, V> {
    pub fn new() -> Self {
        Scratch(BTreeMap::new())
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.0.get_mut(key)
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.0.insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.0.keys()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
