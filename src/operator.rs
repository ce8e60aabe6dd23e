//! Interposed subscriber/subscription pairs.
//!
//! An operator turns one flowable into another by placing an adapter
//! between the upstream source and the downstream sink: a subscriber
//! towards the previous stage and, where demand needs translating, a
//! subscription towards the next one.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::counted::LiveToken;
use crate::error::StreamError;
use crate::flowable::{Flow, Flowable};
use crate::subscriber::Subscriber;
use crate::subscription::{Demand, Subscription};

/// `map`: transform values with a pure function.
pub(crate) struct MapFlow<A, B, F> {
    upstream: Flowable<A>,
    f: Arc<F>,
    _token: LiveToken,
    _marker: PhantomData<fn() -> B>,
}

impl<A: 'static, B, F> MapFlow<A, B, F> {
    pub fn new(upstream: Flowable<A>, f: F) -> MapFlow<A, B, F> {
        MapFlow {
            upstream,
            f: Arc::new(f),
            _token: LiveToken::new("flowable"),
            _marker: PhantomData,
        }
    }
}

impl<A, B, F> Flow for MapFlow<A, B, F>
where
    A: 'static,
    B: 'static,
    F: Fn(A) -> B + Send + Sync + 'static,
{
    type Item = B;

    fn subscribe_raw(&self, sink: Box<dyn Subscriber<Item = B>>) {
        self.upstream.subscribe_raw(Box::new(MapSubscriber {
            downstream: sink,
            f: self.f.clone(),
            _token: LiveToken::new("subscriber"),
            _marker: PhantomData,
        }));
    }
}

/// Map's upstream-facing sink. The subscription passes through untouched,
/// so demand and cancellation reach upstream one-to-one.
struct MapSubscriber<A, B, F> {
    downstream: Box<dyn Subscriber<Item = B>>,
    f: Arc<F>,
    _token: LiveToken,
    _marker: PhantomData<fn(A)>,
}

impl<A, B, F> Subscriber for MapSubscriber<A, B, F>
where
    F: Fn(A) -> B + Send + Sync,
{
    type Item = A;

    fn on_subscribe(&mut self, subscription: Subscription) {
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, item: A) {
        let mapped = (self.f)(item);
        self.downstream.on_next(mapped);
    }

    fn on_complete(&mut self) {
        self.downstream.on_complete();
    }

    fn on_error(&mut self, error: StreamError) {
        self.downstream.on_error(error);
    }
}

/// `try_map`: transform values with a function that may fail.
pub(crate) struct TryMapFlow<A, B, F> {
    upstream: Flowable<A>,
    f: Arc<F>,
    _token: LiveToken,
    _marker: PhantomData<fn() -> B>,
}

impl<A: 'static, B, F> TryMapFlow<A, B, F> {
    pub fn new(upstream: Flowable<A>, f: F) -> TryMapFlow<A, B, F> {
        TryMapFlow {
            upstream,
            f: Arc::new(f),
            _token: LiveToken::new("flowable"),
            _marker: PhantomData,
        }
    }
}

impl<A, B, F> Flow for TryMapFlow<A, B, F>
where
    A: 'static,
    B: 'static,
    F: Fn(A) -> Result<B, StreamError> + Send + Sync + 'static,
{
    type Item = B;

    fn subscribe_raw(&self, sink: Box<dyn Subscriber<Item = B>>) {
        self.upstream.subscribe_raw(Box::new(TryMapSubscriber {
            downstream: Some(sink),
            upstream: None,
            f: self.f.clone(),
            _token: LiveToken::new("subscriber"),
            _marker: PhantomData,
        }));
    }
}

/// Try-map's upstream-facing sink. A failed transform cancels upstream and
/// becomes the run's single `on_error`; whatever upstream still delivers
/// afterwards is swallowed.
struct TryMapSubscriber<A, B, F> {
    downstream: Option<Box<dyn Subscriber<Item = B>>>,
    upstream: Option<Subscription>,
    f: Arc<F>,
    _token: LiveToken,
    _marker: PhantomData<fn(A)>,
}

impl<A, B, F> Subscriber for TryMapSubscriber<A, B, F>
where
    F: Fn(A) -> Result<B, StreamError> + Send + Sync,
{
    type Item = A;

    fn on_subscribe(&mut self, subscription: Subscription) {
        self.upstream = Some(subscription.clone());
        if let Some(downstream) = self.downstream.as_mut() {
            downstream.on_subscribe(subscription);
        }
    }

    fn on_next(&mut self, item: A) {
        if self.downstream.is_none() {
            return;
        }
        let mapped = (self.f)(item);
        match mapped {
            Ok(value) => {
                if let Some(downstream) = self.downstream.as_mut() {
                    downstream.on_next(value);
                }
            }
            Err(error) => {
                if let Some(upstream) = self.upstream.take() {
                    upstream.cancel();
                }
                if let Some(mut downstream) = self.downstream.take() {
                    downstream.on_error(error);
                }
            }
        }
    }

    fn on_complete(&mut self) {
        self.upstream = None;
        if let Some(mut downstream) = self.downstream.take() {
            downstream.on_complete();
        }
    }

    fn on_error(&mut self, error: StreamError) {
        self.upstream = None;
        if let Some(mut downstream) = self.downstream.take() {
            downstream.on_error(error);
        }
    }
}

/// `take`: pass through at most `n` values, then complete.
pub(crate) struct TakeFlow<T> {
    upstream: Flowable<T>,
    limit: u64,
    _token: LiveToken,
}

impl<T: 'static> TakeFlow<T> {
    pub fn new(upstream: Flowable<T>, limit: u64) -> TakeFlow<T> {
        TakeFlow {
            upstream,
            limit,
            _token: LiveToken::new("flowable"),
        }
    }
}

impl<T: 'static> Flow for TakeFlow<T> {
    type Item = T;

    fn subscribe_raw(&self, sink: Box<dyn Subscriber<Item = T>>) {
        self.upstream.subscribe_raw(Box::new(TakeSubscriber {
            downstream: Some(sink),
            upstream: None,
            remaining: self.limit,
            limit: self.limit,
            _token: LiveToken::new("subscriber"),
        }));
    }
}

/// Take's downstream-facing subscription. Forwards requests upstream only
/// up to the remaining budget, so upstream is never over-requested.
struct TakeGate {
    upstream: Subscription,
    limit: u64,
    granted: AtomicU64,
    cancelled: AtomicBool,
    _token: LiveToken,
}

impl Demand for TakeGate {
    fn request(&self, n: u64) {
        if n == 0 || self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        let mut granted = self.granted.load(Ordering::SeqCst);
        let give = loop {
            let available = self.limit - granted;
            if available == 0 {
                break 0;
            }
            let give = n.min(available);
            match self.granted.compare_exchange(
                granted,
                granted + give,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break give,
                Err(changed) => granted = changed,
            }
        };
        if give > 0 {
            self.upstream.request(give);
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.upstream.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Take's upstream-facing sink, owner of the per-run countdown.
struct TakeSubscriber<T> {
    downstream: Option<Box<dyn Subscriber<Item = T>>>,
    upstream: Option<Subscription>,
    remaining: u64,
    limit: u64,
    _token: LiveToken,
}

impl<T> Subscriber for TakeSubscriber<T> {
    type Item = T;

    fn on_subscribe(&mut self, subscription: Subscription) {
        let gate = Arc::new(TakeGate {
            upstream: subscription.clone(),
            limit: self.limit,
            granted: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            _token: LiveToken::new("subscription"),
        });
        self.upstream = Some(subscription);
        if let Some(downstream) = self.downstream.as_mut() {
            downstream.on_subscribe(Subscription::new(gate.clone()));
        }
        if self.limit == 0 && !gate.is_cancelled() {
            if let Some(upstream) = self.upstream.take() {
                upstream.cancel();
            }
            if let Some(mut downstream) = self.downstream.take() {
                downstream.on_complete();
            }
        }
    }

    fn on_next(&mut self, item: T) {
        if self.remaining == 0 {
            return;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            // The bound is hit: deliver the final value, cancel upstream,
            // complete downstream. Cancellation wins over any terminal
            // upstream races in after this.
            if let Some(mut downstream) = self.downstream.take() {
                downstream.on_next(item);
                if let Some(upstream) = self.upstream.take() {
                    upstream.cancel();
                }
                downstream.on_complete();
            }
        } else if let Some(downstream) = self.downstream.as_mut() {
            downstream.on_next(item);
        }
    }

    fn on_complete(&mut self) {
        self.upstream = None;
        if let Some(mut downstream) = self.downstream.take() {
            downstream.on_complete();
        }
    }

    fn on_error(&mut self, error: StreamError) {
        self.upstream = None;
        if let Some(mut downstream) = self.downstream.take() {
            downstream.on_error(error);
        }
    }
}
