//! The event dispatcher.
//!
//! A [`Dispatcher`] owns three registration tables and publishes events to
//! them synchronously, in a fixed order:
//!
//! 1. exact listeners of the published key
//! 2. namespace listeners of every prefix of the key, shortest prefix
//!    first, as one tier
//! 3. global listeners, which also receive the key
//!
//! All three tiers are snapshotted under one lock before any listener runs.
//! Listeners may therefore subscribe, unsubscribe, emit or clear from inside
//! a handler; the changes apply to later publishes only.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::config::{DispatcherConfig, ErrorPolicy};
use crate::error::{DispatchError, DispatchResult};
use crate::key::{EventKey, Route};
use crate::listener::{HandlerResult, Listener};
use crate::subscription::Subscription;
use crate::tables::{SharedTables, Tables};
use crate::wait::{WaitFor, WaitOptions};

/// In-process publish/subscribe dispatcher.
///
/// Clones share the same tables. Separate `Dispatcher::new()` instances never
/// share anything.
///
/// # Example
///
/// ```
/// use tidings::Dispatcher;
///
/// let bus: Dispatcher<u32> = Dispatcher::new();
///
/// let sub = bus.on_fn("user.created", |id| {
///     println!("created {:?}", id);
///     Ok(())
/// });
/// bus.on_keyed("*", |key, _| {
///     println!("saw {}", key);
///     Ok(())
/// });
///
/// bus.emit("user.created", 7).unwrap();
/// sub.unsubscribe();
/// assert_eq!(bus.listener_count("user.created"), 0);
/// ```
pub struct Dispatcher<P> {
    tables: SharedTables<P>,
    config: Arc<DispatcherConfig>,
}

impl<P: Send + Sync + 'static> Dispatcher<P> {
    /// Create a dispatcher with empty tables and default settings.
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            tables: Tables::shared(),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    // ====================================================================
    // Registration
    // ====================================================================

    /// Register a listener.
    ///
    /// `"*"` registers a global listener, `"prefix.*"` and `"prefix:*"`
    /// register namespace listeners, and any other key an exact listener.
    /// Registering the same pair twice has no further effect.
    pub fn on(&self, key: impl Into<EventKey>, listener: Listener<P>) -> Subscription<P> {
        self.register(Route::classify(key.into()), listener)
    }

    /// Register a closure that receives the payload.
    pub fn on_fn<F>(&self, key: impl Into<EventKey>, handler: F) -> Subscription<P>
    where
        F: Fn(Option<&P>) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(key, Listener::new(handler))
    }

    /// Register a closure that receives the published key and the payload.
    pub fn on_keyed<F>(&self, key: impl Into<EventKey>, handler: F) -> Subscription<P>
    where
        F: Fn(&EventKey, Option<&P>) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(key, Listener::keyed(handler))
    }

    /// Remove a listener. Unknown pairs are ignored.
    pub fn off(&self, key: impl Into<EventKey>, listener: &Listener<P>) {
        let route = Route::classify(key.into());
        let removed = self.tables.lock().remove(&route, listener);
        tracing::debug!(route = %route, removed, "off");
    }

    /// Remove every listener registered under a key. Returns how many were removed.
    pub fn off_all(&self, key: impl Into<EventKey>) -> usize {
        let route = Route::classify(key.into());
        let removed = self.tables.lock().remove_all(&route);
        tracing::debug!(route = %route, removed, "off_all");
        removed
    }

    /// Register a listener that removes itself before its first call.
    ///
    /// Removal happens before the wrapped listener runs, so an emit of the
    /// same key from inside it does not reach it again.
    pub fn once(&self, key: impl Into<EventKey>, listener: Listener<P>) -> Subscription<P> {
        let slot: Arc<OnceLock<Subscription<P>>> = Arc::new(OnceLock::new());
        let fired = AtomicBool::new(false);

        let wrapper = {
            let slot = Arc::clone(&slot);
            Listener::keyed(move |key, payload| {
                // An outer snapshot may still hold us after we unsubscribed
                if fired.swap(true, Ordering::AcqRel) {
                    return Ok(());
                }
                if let Some(subscription) = slot.get() {
                    subscription.unsubscribe();
                }
                listener.call(key, payload)
            })
        };

        // The slot is filled before the wrapper becomes reachable
        let route = Route::classify(key.into());
        let subscription = Subscription::new(&self.tables, route.clone(), &wrapper);
        // Fresh slot, so this set cannot fail
        slot.set(subscription.clone()).ok();
        self.insert(&route, wrapper);
        subscription
    }

    pub fn once_fn<F>(&self, key: impl Into<EventKey>, handler: F) -> Subscription<P>
    where
        F: Fn(Option<&P>) -> HandlerResult + Send + Sync + 'static,
    {
        self.once(key, Listener::new(handler))
    }

    pub fn once_keyed<F>(&self, key: impl Into<EventKey>, handler: F) -> Subscription<P>
    where
        F: Fn(&EventKey, Option<&P>) -> HandlerResult + Send + Sync + 'static,
    {
        self.once(key, Listener::keyed(handler))
    }

    fn register(&self, route: Route, listener: Listener<P>) -> Subscription<P> {
        let subscription = Subscription::new(&self.tables, route.clone(), &listener);
        self.insert(&route, listener);
        subscription
    }

    fn insert(&self, route: &Route, listener: Listener<P>) {
        let added = self.tables.lock().insert(route, listener);
        tracing::debug!(route = %route, wildcard = route.is_wildcard(), added, "on");
    }

    // ====================================================================
    // Publishing
    // ====================================================================

    /// Publish an event with a payload.
    pub fn emit(&self, key: impl Into<EventKey>, payload: P) -> DispatchResult<()> {
        self.publish(key, Some(payload))
    }

    /// Publish an event that carries no payload.
    pub fn emit_void(&self, key: impl Into<EventKey>) -> DispatchResult<()> {
        self.publish(key, None)
    }

    /// Publish an event and run every matching listener before returning.
    ///
    /// A listener `Err` is reported according to the configured
    /// [`ErrorPolicy`]; with `Isolate` the rest of the failing tier still runs
    /// and later tiers are skipped. Panics are not caught.
    pub fn publish(&self, key: impl Into<EventKey>, payload: Option<P>) -> DispatchResult<()> {
        let key = key.into();
        let prefixes = key.namespace_prefixes();

        // One namespace tier, shortest prefix first
        let tiers: [Vec<Listener<P>>; 3] = {
            let tables = self.tables.lock();
            let exact = tables.snapshot_exact(&key);
            let namespace = prefixes
                .iter()
                .flat_map(|prefix| tables.snapshot_namespace(prefix))
                .collect();
            let global = tables.snapshot_global();
            [exact, namespace, global]
        };

        tracing::trace!(
            key = %key,
            exact = tiers[0].len(),
            namespace = tiers[1].len(),
            global = tiers[2].len(),
            "emit"
        );

        for tier in &tiers {
            self.invoke_tier(&key, payload.as_ref(), tier)?;
        }
        Ok(())
    }

    fn invoke_tier(
        &self,
        key: &EventKey,
        payload: Option<&P>,
        listeners: &[Listener<P>],
    ) -> DispatchResult<()> {
        let mut first_error = None;

        for listener in listeners {
            let Err(source) = listener.call(key, payload) else {
                continue;
            };
            match self.config.error_policy {
                ErrorPolicy::FailFast => {
                    return Err(DispatchError::Handler {
                        key: key.clone(),
                        source,
                    });
                }
                ErrorPolicy::Isolate if first_error.is_none() => first_error = Some(source),
                ErrorPolicy::Isolate => {
                    tracing::debug!(key = %key, error = %source, "dropping additional handler error");
                }
            }
        }

        match first_error {
            Some(source) => Err(DispatchError::Handler {
                key: key.clone(),
                source,
            }),
            None => Ok(()),
        }
    }

    // ====================================================================
    // Introspection
    // ====================================================================

    /// Number of listeners registered under exactly this key, prefix or `"*"`.
    pub fn listener_count(&self, key: impl Into<EventKey>) -> usize {
        let route = Route::classify(key.into());
        self.tables.lock().count(&route)
    }

    pub fn has_listeners(&self, key: impl Into<EventKey>) -> bool {
        self.listener_count(key) > 0
    }

    /// Exact keys with listeners, in order of first registration.
    pub fn event_names(&self) -> Vec<EventKey> {
        self.tables.lock().event_names()
    }

    /// Remove every listener. Publishes already in progress are unaffected.
    pub fn clear(&self) {
        self.tables.lock().clear();
        tracing::debug!("cleared all listeners");
    }
}

impl<P: Clone + Send + Sync + 'static> Dispatcher<P> {
    /// Wait for the next event on `key` that passes the options' filter.
    ///
    /// The listener is registered and the timeout starts before this returns.
    /// `key` may be exact, a namespace wildcard or `"*"`. The future resolves
    /// to a clone of the payload and fails with [`DispatchError::Timeout`],
    /// [`DispatchError::Aborted`] or [`DispatchError::Filter`]. A token that is
    /// already cancelled fails the wait without registering anything.
    ///
    /// # Panics
    ///
    /// With a timeout (explicit or from [`DispatcherConfig`]) this must be
    /// called inside a Tokio runtime with the time driver enabled.
    pub fn wait_for(&self, key: impl Into<EventKey>, options: WaitOptions<P>) -> WaitFor<P> {
        let WaitOptions {
            filter,
            timeout,
            cancellation,
        } = options;

        if cancellation.as_ref().is_some_and(|token| token.is_cancelled()) {
            return WaitFor::failed(DispatchError::Aborted);
        }

        let timeout = timeout.or_else(|| self.config.default_wait_timeout());
        let (wait, state) = WaitFor::arm(timeout, cancellation);

        let listener = {
            let state = Arc::clone(&state);
            Listener::keyed(move |_key, payload| {
                {
                    let mut state = state.lock();
                    if state.is_settled() || state.settle_if_expired() {
                        return Ok(());
                    }
                }
                // Run the filter unlocked; it may publish re-entrantly
                let accepted = match &filter {
                    Some(filter) => filter(payload),
                    None => Ok(true),
                };
                match accepted {
                    Ok(true) => {
                        state.lock().accept(payload);
                    }
                    Ok(false) => {}
                    Err(error) => {
                        state.lock().settle(Err(DispatchError::Filter(error)), "filter");
                    }
                }
                Ok(())
            })
        };

        let subscription = self.register(Route::classify(key.into()), listener);
        state.lock().attach(subscription);
        wait
    }
}

impl<P: Send + Sync + 'static> Default for Dispatcher<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for Dispatcher<P> {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            config: Arc::clone(&self.config),
        }
    }
}

impl<P> fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.lock();
        f.debug_struct("Dispatcher")
            .field("event_names", &tables.event_names())
            .field("global", &tables.count(&Route::Global))
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Listener<u32>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let make = move |name: &str| {
            let log = Arc::clone(&log_clone);
            let name = name.to_string();
            Listener::new(move |_payload: Option<&u32>| {
                log.lock().push(name.clone());
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn test_duplicate_registration_fires_once() {
        let bus = Dispatcher::new();
        let (log, make) = recorder();
        let listener = make("a");

        bus.on("ping", listener.clone());
        bus.on("ping", listener.clone());
        bus.emit("ping", 1).unwrap();

        assert_eq!(*log.lock(), vec!["a"]);
        assert_eq!(bus.listener_count("ping"), 1);
    }

    #[test]
    fn test_off_removes_and_ignores_unknown() {
        let bus = Dispatcher::new();
        let (log, make) = recorder();
        let listener = make("a");

        bus.off("ping", &listener);
        bus.on("ping", listener.clone());
        bus.off("ping", &listener);
        bus.emit("ping", 1).unwrap();

        assert!(log.lock().is_empty());
        assert!(bus.event_names().is_empty());
    }

    #[test]
    fn test_integer_and_symbol_keys_are_exact() {
        let bus = Dispatcher::new();
        let (log, make) = recorder();
        let symbol = crate::Symbol::new("ready");

        bus.on(7i64, make("int"));
        bus.on(&symbol, make("symbol"));
        bus.on("*", make("global"));

        bus.emit(7i64, 0).unwrap();
        bus.emit(symbol.clone(), 0).unwrap();
        bus.emit(crate::Symbol::new("ready"), 0).unwrap();

        assert_eq!(*log.lock(), vec!["int", "global", "symbol", "global", "global"]);
    }

    #[test]
    fn test_off_all_clears_one_route() {
        let bus = Dispatcher::new();
        let (_log, make) = recorder();
        bus.on("user.*", make("a"));
        bus.on("user.*", make("b"));
        bus.on("user.created", make("c"));

        assert_eq!(bus.off_all("user.*"), 2);
        assert_eq!(bus.listener_count("user.*"), 0);
        assert_eq!(bus.listener_count("user.created"), 1);
    }

    #[test]
    fn test_clones_share_tables_but_instances_do_not() {
        let bus = Dispatcher::new();
        let clone = bus.clone();
        let other = Dispatcher::<u32>::new();
        let (_log, make) = recorder();

        clone.on("ping", make("a"));
        assert_eq!(bus.listener_count("ping"), 1);
        assert_eq!(other.listener_count("ping"), 0);
    }

    #[test]
    fn test_subscription_outliving_dispatcher_is_harmless() {
        let bus = Dispatcher::new();
        let (_log, make) = recorder();
        let sub = bus.on("ping", make("a"));
        drop(bus);

        assert!(!sub.is_active());
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_once_subscription_tracks_its_registration() {
        let bus = Dispatcher::new();
        let (log, make) = recorder();
        let sub = bus.once("ping", make("a"));

        assert!(sub.is_active());
        bus.emit("ping", 1).unwrap();
        bus.emit("ping", 2).unwrap();

        assert!(!sub.is_active());
        assert!(!sub.unsubscribe());
        assert_eq!(*log.lock(), vec!["a"]);
    }
}
