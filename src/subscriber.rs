//! The sink protocol and delivery adapters.
//!
//! Application sinks implement [`Subscriber`] and are shared as
//! `Arc<RwLock<_>>`. The pipeline reaches them through a weak reference, so
//! subscribing never extends a sink's lifetime: once the last outside handle
//! is gone the next delivery fails and the pipeline cancels itself.

use std::sync::{RwLock, Weak};

use crate::counted::LiveToken;
use crate::error::StreamError;
use crate::subscription::Subscription;

/// A sink of values driven by a source through callbacks.
///
/// The source guarantees the protocol: `on_subscribe` first and exactly
/// once, then at most as many `on_next` calls as the sink has requested,
/// then exactly one of `on_complete` or `on_error`, after which nothing.
/// Calls for one subscription are totally ordered and never overlap.
pub trait Subscriber: Send {
    /// The type of the values being consumed.
    type Item;

    /// Receives the control handle for this run, before anything else.
    ///
    /// No values flow until the sink requests them — this is the natural
    /// place for an initial `request`.
    fn on_subscribe(&mut self, subscription: Subscription);

    /// Receives one value. Never called with zero outstanding demand.
    fn on_next(&mut self, item: Self::Item);

    /// The sequence is exhausted. Final call.
    fn on_complete(&mut self);

    /// The sequence failed. Final call.
    fn on_error(&mut self, error: StreamError);
}

/// An error that can occur when delivering to a weakly referenced sink.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub(crate) enum SinkError {
    Disappeared,
    Poisoned,
}

/// Perform some delivery on a weak reference to a locked sink and report
/// failure instead of extending the sink's lifetime.
pub(crate) fn with_weak<T, U, F: FnOnce(&mut T) -> U>(
    weak: &Weak<RwLock<T>>,
    f: F,
) -> Result<U, SinkError> {
    weak.upgrade()
        .ok_or(SinkError::Disappeared)
        .and_then(|lock| {
            lock.write()
                .map(|mut t| f(&mut t))
                .map_err(|_| SinkError::Poisoned)
        })
}

/// Adapter placing a shared application sink at the end of a sink chain.
///
/// Holds the sink weakly; a failed delivery cancels upstream.
pub(crate) struct WeakSink<S> {
    weak: Weak<RwLock<S>>,
    subscription: Option<Subscription>,
    _token: LiveToken,
}

impl<S> WeakSink<S> {
    pub fn new(weak: Weak<RwLock<S>>) -> WeakSink<S> {
        WeakSink {
            weak,
            subscription: None,
            _token: LiveToken::new("subscriber"),
        }
    }

    fn cancel_upstream(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }
}

impl<S> Subscriber for WeakSink<S>
where
    S: Subscriber + Send + Sync,
{
    type Item = S::Item;

    fn on_subscribe(&mut self, subscription: Subscription) {
        self.subscription = Some(subscription.clone());
        if with_weak(&self.weak, |sink| sink.on_subscribe(subscription)).is_err() {
            self.cancel_upstream();
        }
    }

    fn on_next(&mut self, item: S::Item) {
        if with_weak(&self.weak, |sink| sink.on_next(item)).is_err() {
            self.cancel_upstream();
        }
    }

    fn on_complete(&mut self) {
        let _ = with_weak(&self.weak, |sink| sink.on_complete());
        self.subscription = None;
    }

    fn on_error(&mut self, error: StreamError) {
        let _ = with_weak(&self.weak, |sink| sink.on_error(error));
        self.subscription = None;
    }
}

/// Sink built from a plain closure, used by `for_each`.
///
/// Requests an unbounded amount up front and discards terminal signals.
pub(crate) struct ClosureSink<T, F> {
    f: F,
    _token: LiveToken,
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<T, F> ClosureSink<T, F> {
    pub fn new(f: F) -> ClosureSink<T, F> {
        ClosureSink {
            f,
            _token: LiveToken::new("subscriber"),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T, F> Subscriber for ClosureSink<T, F>
where
    T: Send,
    F: FnMut(T) + Send,
{
    type Item = T;

    fn on_subscribe(&mut self, subscription: Subscription) {
        subscription.request(u64::MAX);
    }

    fn on_next(&mut self, item: T) {
        (self.f)(item);
    }

    fn on_complete(&mut self) {}

    fn on_error(&mut self, _error: StreamError) {}
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, RwLock};
    use std::thread;

    use super::*;

    #[test]
    fn with_weak_no_error() {
        let a = Arc::new(RwLock::new(3));
        let weak = Arc::downgrade(&a);
        assert_eq!(with_weak(&weak, |a| *a = 4), Ok(()));
        assert_eq!(*a.read().unwrap(), 4);
    }

    #[test]
    fn with_weak_disappeared() {
        let weak = Arc::downgrade(&Arc::new(RwLock::new(3)));
        assert_eq!(with_weak(&weak, |_| ()), Err(SinkError::Disappeared));
    }

    #[test]
    fn with_weak_poisoned() {
        let a = Arc::new(RwLock::new(3));
        let a2 = a.clone();
        let weak = Arc::downgrade(&a);
        let _ = thread::spawn(move || {
            let _guard = a2.write().unwrap();
            panic!();
        })
        .join();
        assert_eq!(with_weak(&weak, |_| ()), Err(SinkError::Poisoned));
    }
}
