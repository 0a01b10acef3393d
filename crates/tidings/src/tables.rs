//! Registration tables for exact, namespace and global subscriptions.
//!
//! A key present in any table always maps to a non-empty set. Removing the
//! last listener removes the entry, so `event_names` and `listener_count`
//! never need a cleanup pass.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::key::{EventKey, Route};
use crate::listener::{Listener, ListenerSet};

/// Tables shared between a dispatcher, its clones and its subscriptions
pub(crate) type SharedTables<P> = Arc<Mutex<Tables<P>>>;

pub(crate) struct Tables<P> {
    /// Exact key -> listeners
    exact: HashMap<EventKey, ListenerSet<P>>,
    /// Exact keys in order of first registration
    exact_order: Vec<EventKey>,
    /// Namespace prefix (separator included) -> listeners
    namespace: HashMap<Arc<str>, ListenerSet<P>>,
    /// Listeners for every event
    global: ListenerSet<P>,
}

impl<P> Tables<P> {
    pub(crate) fn new() -> Self {
        Self {
            exact: HashMap::new(),
            exact_order: Vec::new(),
            namespace: HashMap::new(),
            global: ListenerSet::new(),
        }
    }

    pub(crate) fn shared() -> SharedTables<P> {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Add a listener under a route. Returns `false` if the pair already existed.
    pub(crate) fn insert(&mut self, route: &Route, listener: Listener<P>) -> bool {
        match route {
            Route::Global => self.global.insert(listener),
            Route::Namespace(prefix) => self
                .namespace
                .entry(Arc::clone(prefix))
                .or_insert_with(ListenerSet::new)
                .insert(listener),
            Route::Exact(key) => {
                if let Some(set) = self.exact.get_mut(key) {
                    return set.insert(listener);
                }
                let mut set = ListenerSet::new();
                set.insert(listener);
                self.exact.insert(key.clone(), set);
                self.exact_order.push(key.clone());
                true
            }
        }
    }

    /// Remove a listener from a route. Returns `true` if it was registered.
    pub(crate) fn remove(&mut self, route: &Route, listener: &Listener<P>) -> bool {
        match route {
            Route::Global => self.global.remove(listener),
            Route::Namespace(prefix) => {
                let Some(set) = self.namespace.get_mut(prefix) else {
                    return false;
                };
                let removed = set.remove(listener);
                // Clean up empty entries
                if set.is_empty() {
                    self.namespace.remove(prefix);
                }
                removed
            }
            Route::Exact(key) => {
                let Some(set) = self.exact.get_mut(key) else {
                    return false;
                };
                let removed = set.remove(listener);
                if set.is_empty() {
                    self.remove_exact_entry(key);
                }
                removed
            }
        }
    }

    /// Drop every listener under a route. Returns how many were removed.
    pub(crate) fn remove_all(&mut self, route: &Route) -> usize {
        match route {
            Route::Global => {
                let count = self.global.len();
                self.global.clear();
                count
            }
            Route::Namespace(prefix) => self
                .namespace
                .remove(prefix)
                .map(|set| set.len())
                .unwrap_or(0),
            Route::Exact(key) => self
                .remove_exact_entry(key)
                .map(|set| set.len())
                .unwrap_or(0),
        }
    }

    fn remove_exact_entry(&mut self, key: &EventKey) -> Option<ListenerSet<P>> {
        let set = self.exact.remove(key)?;
        self.exact_order.retain(|k| k != key);
        Some(set)
    }

    pub(crate) fn count(&self, route: &Route) -> usize {
        match route {
            Route::Global => self.global.len(),
            Route::Namespace(prefix) => self.namespace.get(prefix).map_or(0, ListenerSet::len),
            Route::Exact(key) => self.exact.get(key).map_or(0, ListenerSet::len),
        }
    }

    pub(crate) fn contains(&self, route: &Route, listener: &Listener<P>) -> bool {
        match route {
            Route::Global => self.global.contains(listener),
            Route::Namespace(prefix) => self
                .namespace
                .get(prefix)
                .is_some_and(|set| set.contains(listener)),
            Route::Exact(key) => self.exact.get(key).is_some_and(|set| set.contains(listener)),
        }
    }

    pub(crate) fn event_names(&self) -> Vec<EventKey> {
        self.exact_order.clone()
    }

    pub(crate) fn clear(&mut self) {
        self.exact.clear();
        self.exact_order.clear();
        self.namespace.clear();
        self.global.clear();
    }

    pub(crate) fn snapshot_exact(&self, key: &EventKey) -> Vec<Listener<P>> {
        self.exact
            .get(key)
            .map(ListenerSet::snapshot)
            .unwrap_or_default()
    }

    pub(crate) fn snapshot_namespace(&self, prefix: &str) -> Vec<Listener<P>> {
        self.namespace
            .get(prefix)
            .map(ListenerSet::snapshot)
            .unwrap_or_default()
    }

    pub(crate) fn snapshot_global(&self) -> Vec<Listener<P>> {
        self.global.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Listener<()> {
        Listener::new(|_| Ok(()))
    }

    #[test]
    fn test_insert_is_idempotent_per_pair() {
        let mut tables = Tables::new();
        let route = Route::classify("ping".into());
        let listener = noop();

        assert!(tables.insert(&route, listener.clone()));
        assert!(!tables.insert(&route, listener.clone()));
        assert_eq!(tables.count(&route), 1);
    }

    #[test]
    fn test_empty_sets_are_dropped() {
        let mut tables = Tables::new();
        let exact = Route::classify("ping".into());
        let namespace = Route::classify("user.*".into());
        let listener = noop();

        tables.insert(&exact, listener.clone());
        tables.insert(&namespace, listener.clone());
        assert!(tables.remove(&exact, &listener));
        assert!(tables.remove(&namespace, &listener));

        assert!(tables.exact.is_empty());
        assert!(tables.namespace.is_empty());
        assert!(tables.event_names().is_empty());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut tables = Tables::<()>::new();
        let listener = noop();
        assert!(!tables.remove(&Route::classify("nope".into()), &listener));
        assert!(!tables.remove(&Route::classify("nope.*".into()), &listener));
        assert!(!tables.remove(&Route::Global, &listener));
    }

    #[test]
    fn test_event_names_follow_first_registration() {
        let mut tables = Tables::new();
        let a = Route::classify("a".into());
        let b = Route::classify("b".into());
        let first = noop();
        let second = noop();

        tables.insert(&a, first.clone());
        tables.insert(&b, first.clone());
        tables.insert(&a, second.clone());
        tables.insert(&Route::classify("ns.*".into()), first.clone());
        assert_eq!(tables.event_names(), vec![EventKey::from("a"), EventKey::from("b")]);

        // Re-registering after removal moves the key to the back
        tables.remove(&a, &first);
        tables.remove(&a, &second);
        tables.insert(&a, first);
        assert_eq!(tables.event_names(), vec![EventKey::from("b"), EventKey::from("a")]);
    }

    #[test]
    fn test_remove_all_counts() {
        let mut tables = Tables::new();
        let route = Route::classify("user.*".into());
        tables.insert(&route, noop());
        tables.insert(&route, noop());

        assert_eq!(tables.remove_all(&route), 2);
        assert_eq!(tables.remove_all(&route), 0);
        assert_eq!(tables.count(&route), 0);
    }
}
