//! Utilities for the test suite.

use std::sync::{Arc, RwLock};

use crate::error::StreamError;
use crate::flowable::Flowable;
use crate::subscriber::Subscriber;
use crate::subscription::Subscription;

/// A sink that records everything it receives.
pub struct Collector<T> {
    pub values: Vec<T>,
    pub completed: bool,
    pub error: Option<StreamError>,
    pub subscription: Option<Subscription>,
    request: u64,
}

impl<T> Collector<T> {
    /// A collector requesting an unbounded amount on subscribe.
    pub fn unbounded() -> Collector<T> {
        Collector::with_request(u64::MAX)
    }

    /// A collector requesting exactly `request` values on subscribe.
    pub fn with_request(request: u64) -> Collector<T> {
        Collector {
            values: vec![],
            completed: false,
            error: None,
            subscription: None,
            request,
        }
    }
}

impl<T: Send> Subscriber for Collector<T> {
    type Item = T;

    fn on_subscribe(&mut self, subscription: Subscription) {
        subscription.request(self.request);
        self.subscription = Some(subscription);
    }

    fn on_next(&mut self, item: T) {
        self.values.push(item);
    }

    fn on_complete(&mut self) {
        self.completed = true;
    }

    fn on_error(&mut self, error: StreamError) {
        self.error = Some(error);
    }
}

/// Run a flowable against an unbounded collector and hand back the record.
pub fn drain<T: Send + Sync + 'static>(flowable: &Flowable<T>) -> Collector<T> {
    let sink = Arc::new(RwLock::new(Collector::unbounded()));
    flowable.subscribe(&sink);
    Arc::try_unwrap(sink)
        .ok()
        .expect("collector still referenced by the pipeline")
        .into_inner()
        .unwrap()
}
