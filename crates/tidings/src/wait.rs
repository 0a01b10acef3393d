//! Waiting for the next matching event.
//!
//! [`Dispatcher::wait_for`](crate::Dispatcher::wait_for) registers a temporary
//! listener and returns a [`WaitFor`] future. Three triggers race to settle it:
//!
//! - a publish whose payload passes the filter
//! - the timeout elapsing
//! - the cancellation token firing
//!
//! All of them go through [`WaitState::settle`], which takes the oneshot
//! sender. Whoever takes it first wins; teardown (unsubscribing the listener)
//! runs before the result is sent, and never runs twice.
//!
//! The future only observes the timer and the token when it is polled, so a
//! publish checks them too: an event arriving after the deadline or after
//! cancellation settles the wait with that failure instead of a match.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::error::{DispatchError, DispatchResult};
use crate::subscription::Subscription;

/// Fallible payload predicate used by `wait_for`
pub(crate) type FilterFn<P> = dyn Fn(Option<&P>) -> anyhow::Result<bool> + Send + Sync;

type WaitOutcome<P> = DispatchResult<Option<P>>;

/// Options for [`Dispatcher::wait_for`](crate::Dispatcher::wait_for).
///
/// ```rust,ignore
/// let options = WaitOptions::new()
///     .filter(|p: Option<&u32>| p.is_some_and(|v| *v > 10))
///     .timeout_ms(500)
///     .cancel_on(shutdown.clone());
/// ```
pub struct WaitOptions<P> {
    pub(crate) filter: Option<Arc<FilterFn<P>>>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl<P: 'static> WaitOptions<P> {
    /// Accept any payload, no timeout, no cancellation.
    pub fn new() -> Self {
        Self {
            filter: None,
            timeout: None,
            cancellation: None,
        }
    }

    /// Only settle on payloads for which `filter` returns `true`.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(Option<&P>) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(move |payload: Option<&P>| Ok(filter(payload))));
        self
    }

    /// Like [`filter`](Self::filter), but an `Err` fails the wait.
    pub fn try_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(Option<&P>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Fail with [`DispatchError::Timeout`] if nothing matches in time.
    ///
    /// The clock starts when `wait_for` is called.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_ms(self, millis: u64) -> Self {
        self.timeout(Duration::from_millis(millis))
    }

    /// Fail with [`DispatchError::Aborted`] when `token` is cancelled.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl<P: 'static> Default for WaitOptions<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for WaitOptions<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitOptions")
            .field("filter", &self.filter.is_some())
            .field("timeout", &self.timeout)
            .field("cancellation", &self.cancellation)
            .finish()
    }
}

/// State shared between a pending wait and its temporary listener.
pub(crate) struct WaitState<P> {
    sender: Option<oneshot::Sender<WaitOutcome<P>>>,
    subscription: Option<Subscription<P>>,
    deadline: Option<(Instant, Duration)>,
    cancellation: Option<CancellationToken>,
}

impl<P> WaitState<P> {
    pub(crate) fn is_settled(&self) -> bool {
        self.sender.is_none()
    }

    pub(crate) fn attach(&mut self, subscription: Subscription<P>) {
        self.subscription = Some(subscription);
    }

    /// Failure from a trigger that fired before the future noticed it.
    fn expired(&self) -> Option<(DispatchError, &'static str)> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Some((DispatchError::Aborted, "cancelled"));
        }
        match self.deadline {
            Some((at, duration)) if Instant::now() >= at => {
                Some((DispatchError::Timeout(duration), "timeout"))
            }
            _ => None,
        }
    }

    /// Settle the wait. Returns `false` if another trigger already did.
    pub(crate) fn settle(&mut self, outcome: WaitOutcome<P>, trigger: &'static str) -> bool {
        let Some(sender) = self.sender.take() else {
            return false;
        };
        self.detach();
        tracing::debug!(trigger, ok = outcome.is_ok(), "wait settled");
        // Receiver gone means the wait was dropped
        let _ = sender.send(outcome);
        true
    }

    /// Settle with a published payload once the filter accepted it.
    ///
    /// An elapsed deadline or a cancelled token takes precedence over the
    /// match.
    pub(crate) fn accept(&mut self, payload: Option<&P>) -> bool
    where
        P: Clone,
    {
        match self.expired() {
            Some((error, trigger)) => self.settle(Err(error), trigger),
            None => self.settle(Ok(payload.cloned()), "matched"),
        }
    }

    /// Settle with an already fired trigger. Returns `false` if the wait is
    /// still live.
    pub(crate) fn settle_if_expired(&mut self) -> bool {
        match self.expired() {
            Some((error, trigger)) => self.settle(Err(error), trigger),
            None => false,
        }
    }

    /// Give up without a result.
    fn teardown(&mut self) {
        self.sender = None;
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

pub(crate) type SharedWaitState<P> = Arc<Mutex<WaitState<P>>>;

/// Future returned by [`Dispatcher::wait_for`](crate::Dispatcher::wait_for).
///
/// Resolves to the payload of the first accepted event (`None` for void
/// events). Dropping it before it resolves unregisters its listener.
#[must_use = "a wait does nothing unless awaited, and dropping it unsubscribes"]
pub struct WaitFor<P> {
    state: SharedWaitState<P>,
    receiver: oneshot::Receiver<WaitOutcome<P>>,
    deadline: Option<(Pin<Box<Sleep>>, Duration)>,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
}

impl<P> WaitFor<P> {
    /// Create the wait and its shared state; the caller registers the
    /// listener and attaches its subscription.
    ///
    /// # Panics
    ///
    /// Arming a timeout panics outside a Tokio runtime with the time driver
    /// enabled.
    pub(crate) fn arm(
        timeout: Option<Duration>,
        cancellation: Option<CancellationToken>,
    ) -> (Self, SharedWaitState<P>) {
        let (sender, receiver) = oneshot::channel();
        // A deadline past the clock's range never fires
        let deadline_at = timeout.and_then(|duration| {
            Instant::now()
                .checked_add(duration)
                .map(|at| (at, duration))
        });
        let state = Arc::new(Mutex::new(WaitState {
            sender: Some(sender),
            subscription: None,
            deadline: deadline_at,
            cancellation: cancellation.clone(),
        }));

        let deadline =
            deadline_at.map(|(at, duration)| (Box::pin(tokio::time::sleep_until(at)), duration));
        let cancelled = cancellation.map(|token| Box::pin(token.cancelled_owned()));

        let wait = Self {
            state: Arc::clone(&state),
            receiver,
            deadline,
            cancelled,
        };
        (wait, state)
    }

    /// Create a wait that has already failed.
    pub(crate) fn failed(error: DispatchError) -> Self {
        let (wait, state) = Self::arm(None, None);
        state.lock().settle(Err(error), "precondition");
        wait
    }

    fn disarm(&mut self) {
        self.deadline = None;
        self.cancelled = None;
    }

    /// Settle from the future side, then read whichever outcome won.
    fn fail(&mut self, error: DispatchError, trigger: &'static str) -> WaitOutcome<P> {
        self.state.lock().settle(Err(error), trigger);
        self.disarm();
        // settle always leaves a value in the channel, ours or the winner's
        self.receiver.try_recv().unwrap_or(Err(DispatchError::Aborted))
    }
}

impl<P> Future for WaitFor<P> {
    type Output = WaitOutcome<P>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Poll::Ready(outcome) = Pin::new(&mut this.receiver).poll(cx) {
            this.disarm();
            return Poll::Ready(outcome.unwrap_or(Err(DispatchError::Aborted)));
        }

        if let Some(cancelled) = this.cancelled.as_mut() {
            if cancelled.as_mut().poll(cx).is_ready() {
                return Poll::Ready(this.fail(DispatchError::Aborted, "cancelled"));
            }
        }

        if let Some((sleep, duration)) = this.deadline.as_mut() {
            if sleep.as_mut().poll(cx).is_ready() {
                let duration = *duration;
                return Poll::Ready(this.fail(DispatchError::Timeout(duration), "timeout"));
            }
        }

        Poll::Pending
    }
}

impl<P> Drop for WaitFor<P> {
    fn drop(&mut self) {
        self.state.lock().teardown();
    }
}

impl<P> fmt::Debug for WaitFor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitFor")
            .field("timeout", &self.deadline.as_ref().map(|(_, d)| *d))
            .field("cancellable", &self.cancelled.is_some())
            .finish()
    }
}
