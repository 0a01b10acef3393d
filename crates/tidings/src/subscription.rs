//! Unsubscribe handles returned by `on` and `once`.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::key::Route;
use crate::listener::{Listener, WeakListener};
use crate::tables::{SharedTables, Tables};

/// Capability to remove one (route, listener) pair.
///
/// Dropping a subscription does not unsubscribe. It holds no strong
/// references, so it never keeps a dispatcher or a handler alive, and calling
/// [`unsubscribe`](Self::unsubscribe) after the pair is gone is a no-op.
pub struct Subscription<P> {
    tables: Weak<Mutex<Tables<P>>>,
    route: Route,
    listener: WeakListener<P>,
}

impl<P> Subscription<P> {
    pub(crate) fn new(tables: &SharedTables<P>, route: Route, listener: &Listener<P>) -> Self {
        Self {
            tables: Arc::downgrade(tables),
            route,
            listener: listener.downgrade(),
        }
    }

    /// Remove the subscribed pair. Safe to call any number of times.
    ///
    /// Returns `true` only for the call that actually removed it.
    pub fn unsubscribe(&self) -> bool {
        let Some(tables) = self.tables.upgrade() else {
            return false;
        };
        let Some(listener) = self.listener.upgrade() else {
            return false;
        };
        let removed = tables.lock().remove(&self.route, &listener);
        tracing::debug!(route = %self.route, removed, "unsubscribed");
        removed
    }

    /// Check whether the pair is still registered.
    pub fn is_active(&self) -> bool {
        match (self.tables.upgrade(), self.listener.upgrade()) {
            (Some(tables), Some(listener)) => tables.lock().contains(&self.route, &listener),
            _ => false,
        }
    }

    /// Get the route this subscription was registered under.
    pub fn route(&self) -> &Route {
        &self.route
    }
}

impl<P> Clone for Subscription<P> {
    fn clone(&self) -> Self {
        Self {
            tables: Weak::clone(&self.tables),
            route: self.route.clone(),
            listener: self.listener.clone(),
        }
    }
}

impl<P> fmt::Debug for Subscription<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("route", &self.route)
            .finish()
    }
}
