//! The demand channel between a source and a sink.

use std::sync::Arc;

/// Backing behaviour of a [`Subscription`] handle.
///
/// Implemented by the driver of a generated source and by operator gates
/// that translate demand on its way upstream.
pub(crate) trait Demand: Send + Sync {
    fn request(&self, n: u64);
    fn cancel(&self);
    fn is_cancelled(&self) -> bool;
}

/// The per-run control object mediating demand and cancellation between one
/// source and one sink.
///
/// A fresh subscription is handed to the sink's `on_subscribe` for every
/// `subscribe` call. The sink declares willingness to receive values with
/// [`request`](Subscription::request) and may stop the flow at any time with
/// [`cancel`](Subscription::cancel). Once cancelled, or once the terminal
/// signal has been delivered, the subscription is inert: both methods become
/// no-ops and no further values arrive.
///
/// Handles are cheap to clone; all clones refer to the same run.
pub struct Subscription {
    inner: Arc<dyn Demand>,
}

impl Clone for Subscription {
    fn clone(&self) -> Subscription {
        Subscription { inner: self.inner.clone() }
    }
}

impl Subscription {
    pub(crate) fn new(inner: Arc<dyn Demand>) -> Subscription {
        Subscription { inner }
    }

    /// Declare willingness to receive up to `n` more values.
    ///
    /// Demand accumulates and saturates rather than overflowing; requesting
    /// `u64::MAX` asks for an effectively unbounded amount. Requesting zero,
    /// or requesting on an inert subscription, does nothing.
    ///
    /// A source with values at hand emits synchronously on the requesting
    /// call stack. Calling `request` from inside a callback is fine — the
    /// new demand is picked up by the emission loop already running further
    /// up the stack, it never re-enters the sink recursively.
    pub fn request(&self, n: u64) {
        self.inner.request(n);
    }

    /// Stop the flow.
    ///
    /// Idempotent. The source stops emitting as soon as it observes the
    /// cancellation and delivers no terminal signal afterwards. Cancelling
    /// is also how an abandoned, partially consumed pipeline releases its
    /// per-run state.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Whether this subscription has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}
