//! Handler values stored in the registration tables.
//!
//! Handlers come in two shapes. Exact and namespace subscribers only see the
//! payload; global subscribers also see the key that was published. Both are
//! stored behind the same invocation adapter so the publish loop never has to
//! care which shape it is calling.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::key::EventKey;

/// Result returned by handlers. An `Err` is reported to the caller of `emit`.
pub type HandlerResult = anyhow::Result<()>;

/// Uniform invocation adapter behind every [`Listener`]
type InvokeFn<P> = dyn Fn(&EventKey, Option<&P>) -> HandlerResult + Send + Sync;

/// A registered event handler.
///
/// Cloning is cheap and preserves identity: a clone unregisters the same
/// subscription as the original, and registering a clone next to its original
/// is a no-op.
pub struct Listener<P> {
    invoke: Arc<InvokeFn<P>>,
}

impl<P: 'static> Listener<P> {
    /// Create a handler that receives only the payload.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(Option<&P>) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            invoke: Arc::new(move |_key: &EventKey, payload: Option<&P>| handler(payload)),
        }
    }

    /// Create a handler that also receives the originating key.
    ///
    /// This is the natural shape for global (`"*"`) subscriptions.
    pub fn keyed<F>(handler: F) -> Self
    where
        F: Fn(&EventKey, Option<&P>) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            invoke: Arc::new(handler),
        }
    }
}

impl<P> Listener<P> {
    /// Invoke the handler for a published event.
    pub fn call(&self, key: &EventKey, payload: Option<&P>) -> HandlerResult {
        (self.invoke)(key, payload)
    }

    /// Check whether two listeners are the same handler.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.invoke, &other.invoke)
    }

    /// Get a non-owning reference that keeps the listener's identity.
    pub(crate) fn downgrade(&self) -> WeakListener<P> {
        WeakListener {
            invoke: Arc::downgrade(&self.invoke),
        }
    }
}

/// Non-owning listener reference held by subscriptions.
///
/// Once no table or caller holds the listener, upgrading fails and the
/// subscription it belongs to is known to be gone.
pub(crate) struct WeakListener<P> {
    invoke: Weak<InvokeFn<P>>,
}

impl<P> WeakListener<P> {
    pub(crate) fn upgrade(&self) -> Option<Listener<P>> {
        self.invoke.upgrade().map(|invoke| Listener { invoke })
    }
}

impl<P> Clone for WeakListener<P> {
    fn clone(&self) -> Self {
        Self {
            invoke: Weak::clone(&self.invoke),
        }
    }
}

impl<P> Clone for Listener<P> {
    fn clone(&self) -> Self {
        Self {
            invoke: Arc::clone(&self.invoke),
        }
    }
}

impl<P> fmt::Debug for Listener<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("ptr", &Arc::as_ptr(&self.invoke).cast::<()>())
            .finish()
    }
}

/// Insertion-ordered set of listeners, unique by identity.
pub(crate) struct ListenerSet<P> {
    listeners: Vec<Listener<P>>,
}

impl<P> ListenerSet<P> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Add a listener. Returns `false` if it was already present.
    pub(crate) fn insert(&mut self, listener: Listener<P>) -> bool {
        if self.contains(&listener) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    /// Remove a listener. Returns `true` if it was present.
    pub(crate) fn remove(&mut self, listener: &Listener<P>) -> bool {
        let before_len = self.listeners.len();
        self.listeners.retain(|l| !l.same_as(listener));
        self.listeners.len() < before_len
    }

    pub(crate) fn contains(&self, listener: &Listener<P>) -> bool {
        self.listeners.iter().any(|l| l.same_as(listener))
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Copy the current members for iteration outside the table lock.
    pub(crate) fn snapshot(&self) -> Vec<Listener<P>> {
        self.listeners.clone()
    }

    pub(crate) fn clear(&mut self) {
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_payload_listener_ignores_key() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let listener = Listener::new(move |payload: Option<&usize>| {
            seen_clone.store(*payload.unwrap_or(&0), Ordering::SeqCst);
            Ok(())
        });

        listener.call(&EventKey::from("anything"), Some(&9)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn test_keyed_listener_receives_key() {
        let listener = Listener::<()>::keyed(|key, payload| {
            assert_eq!(key, &EventKey::from("user.created"));
            assert!(payload.is_none());
            Ok(())
        });
        listener.call(&EventKey::from("user.created"), None).unwrap();
    }

    #[test]
    fn test_identity_follows_clones() {
        let a = Listener::<()>::new(|_| Ok(()));
        let b = Listener::<()>::new(|_| Ok(()));
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_weak_listener_dies_with_last_owner() {
        let a = Listener::<()>::new(|_| Ok(()));
        let weak = a.downgrade();
        assert!(weak.upgrade().is_some_and(|l| l.same_as(&a)));

        drop(a);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_set_rejects_duplicates_and_keeps_order() {
        let a = Listener::<()>::new(|_| Ok(()));
        let b = Listener::<()>::new(|_| Ok(()));
        let mut set = ListenerSet::new();

        assert!(set.insert(a.clone()));
        assert!(set.insert(b.clone()));
        assert!(!set.insert(a.clone()));
        assert_eq!(set.len(), 2);

        let snapshot = set.snapshot();
        assert!(snapshot[0].same_as(&a));
        assert!(snapshot[1].same_as(&b));

        assert!(set.remove(&a));
        assert!(!set.remove(&a));
        assert_eq!(set.len(), 1);
    }
}
