//! Repeatable, demand-driven descriptions of value sequences.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use crate::error::StreamError;
use crate::generate::{Emitter, GeneratedFlow};
use crate::operator::{MapFlow, TakeFlow, TryMapFlow};
use crate::subscriber::{ClosureSink, Subscriber, WeakSink};

/// One variant of a flowable: something a sink chain can be subscribed to.
pub(crate) trait Flow: Send + Sync {
    /// The type of the values being produced.
    type Item;

    /// Drive a fresh, independent run against the given sink chain.
    fn subscribe_raw(&self, sink: Box<dyn Subscriber<Item = Self::Item>>);
}

/// A cold, repeatable description of a sequence of values.
///
/// Nothing happens until [`subscribe`](Flowable::subscribe) is called; every
/// subscription drives its own independent run with its own state, so a
/// flowable can be subscribed any number of times. Values flow only against
/// demand declared through the run's [`Subscription`](crate::Subscription) —
/// a source never outpaces its sink.
///
/// Handles are cheap to clone and share the underlying description.
pub struct Flowable<T> {
    inner: Arc<dyn Flow<Item = T>>,
}

impl<T> Clone for Flowable<T> {
    fn clone(&self) -> Flowable<T> {
        Flowable { inner: self.inner.clone() }
    }
}

impl<T: 'static> Flowable<T> {
    pub(crate) fn from_flow<F>(flow: F) -> Flowable<T>
    where
        F: Flow<Item = T> + 'static,
    {
        Flowable { inner: Arc::new(flow) }
    }

    pub(crate) fn subscribe_raw(&self, sink: Box<dyn Subscriber<Item = T>>) {
        self.inner.subscribe_raw(sink);
    }

    /// Create a source from a generator closure.
    ///
    /// This is the primitive all factories are built on. The generator is
    /// invoked whenever its subscription may have demand; it should emit
    /// while the emitter's budget is positive, terminate with `complete` or
    /// `error` when the sequence ends, and return once out of budget. The
    /// stored closure is cloned for every subscription, so captured state is
    /// per-run and re-subscribing always starts over.
    ///
    /// ```
    /// use siphon::Flowable;
    ///
    /// let odds = Flowable::generate({
    ///     let mut next = 1;
    ///     move |out| {
    ///         while out.budget() > 0 {
    ///             out.next(next);
    ///             next += 2;
    ///         }
    ///     }
    /// });
    /// let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    /// let sink = seen.clone();
    /// odds.take(4).for_each(move |v| sink.lock().unwrap().push(v));
    /// assert_eq!(*seen.lock().unwrap(), vec![1, 3, 5, 7]);
    /// ```
    pub fn generate<G>(gen: G) -> Flowable<T>
    where
        G: FnMut(&mut Emitter<'_, T>) + Clone + Send + Sync + 'static,
    {
        Flowable::from_flow(GeneratedFlow::new(gen))
    }

    /// Subscribe a sink, starting a fresh run.
    ///
    /// Calls the sink's `on_subscribe` exactly once and before anything
    /// else; emission then follows the sink's demand. With a synchronous
    /// source everything up to the terminal signal happens during this call.
    ///
    /// The pipeline holds the sink weakly — dropping the last outside
    /// handle cancels the run at its next delivery. Callbacks are delivered
    /// while the sink's lock is held, so a sink must not be sampled from
    /// inside its own callbacks.
    pub fn subscribe<S>(&self, subscriber: &Arc<RwLock<S>>)
    where
        S: Subscriber<Item = T> + Send + Sync + 'static,
    {
        self.subscribe_raw(Box::new(WeakSink::new(Arc::downgrade(subscriber))));
    }

    /// Subscribe with a closure receiving each value.
    ///
    /// A shorthand for sinks that only care about values: demand is
    /// unbounded and terminal signals are discarded. Use
    /// [`subscribe`](Flowable::subscribe) for the full protocol. Note that
    /// an unbounded request against an endless source such as
    /// [`cycle`](Flowable::cycle) does not return.
    pub fn for_each<F>(&self, f: F)
    where
        T: Send,
        F: FnMut(T) + Send + 'static,
    {
        self.subscribe_raw(Box::new(ClosureSink::new(f)));
    }

    /// Transform every value with a pure function.
    ///
    /// Demand and cancellation pass through untouched — `map` neither
    /// buffers nor changes item counts.
    ///
    /// ```
    /// use std::sync::{Arc, Mutex};
    /// use siphon::Flowable;
    ///
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let sink = seen.clone();
    /// Flowable::range(1, 4)
    ///     .map(|v| v * v)
    ///     .for_each(move |v| sink.lock().unwrap().push(v));
    /// assert_eq!(*seen.lock().unwrap(), vec![1, 4, 9]);
    /// ```
    pub fn map<B, F>(&self, f: F) -> Flowable<B>
    where
        B: 'static,
        F: Fn(T) -> B + Send + Sync + 'static,
    {
        Flowable::from_flow(MapFlow::new(self.clone(), f))
    }

    /// Transform every value with a function that may fail.
    ///
    /// On the first `Err` the run cancels upstream and delivers exactly one
    /// `on_error` downstream; no further values follow.
    pub fn try_map<B, F>(&self, f: F) -> Flowable<B>
    where
        B: 'static,
        F: Fn(T) -> Result<B, StreamError> + Send + Sync + 'static,
    {
        Flowable::from_flow(TryMapFlow::new(self.clone(), f))
    }

    /// Pass through at most `n` values, then complete.
    ///
    /// Completes right after the n-th value, cancelling upstream; a racing
    /// upstream terminal is ignored. Demand is translated so that upstream
    /// is never asked for more than the remaining budget. `take(0)`
    /// completes on subscribe without requesting anything.
    pub fn take(&self, n: u64) -> Flowable<T> {
        Flowable::from_flow(TakeFlow::new(self.clone(), n))
    }
}

impl<T: Clone + Send + Sync + 'static> Flowable<T> {
    /// Emit one value, then complete.
    ///
    /// ```
    /// use std::sync::{Arc, Mutex};
    /// use siphon::Flowable;
    ///
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let sink = seen.clone();
    /// Flowable::just(22).for_each(move |v| sink.lock().unwrap().push(v));
    /// assert_eq!(*seen.lock().unwrap(), vec![22]);
    /// ```
    pub fn just(value: T) -> Flowable<T> {
        let mut slot = Some(value);
        Flowable::generate(move |out| {
            if out.budget() > 0 {
                if let Some(item) = slot.take() {
                    out.next(item);
                }
            }
            if slot.is_none() {
                out.complete();
            }
        })
    }

    /// Emit each of the given values in order, then complete.
    ///
    /// The values are cloned once per subscription and moved out one by one
    /// as they are emitted.
    pub fn items<I>(values: I) -> Flowable<T>
    where
        I: IntoIterator<Item = T>,
    {
        let mut pending: VecDeque<T> = values.into_iter().collect();
        Flowable::generate(move |out| {
            while out.budget() > 0 {
                match pending.pop_front() {
                    Some(item) => out.next(item),
                    None => break,
                }
            }
            if pending.is_empty() {
                out.complete();
            }
        })
    }

    /// Repeat a template value endlessly.
    ///
    /// Every emission is an independent copy of the template, so nothing a
    /// downstream stage does to an emitted value can affect later emissions.
    /// The sequence never completes on its own — bound it with
    /// [`take`](Flowable::take).
    pub fn cycle(value: T) -> Flowable<T> {
        Flowable::generate(move |out| {
            while out.budget() > 0 {
                out.next(value.clone());
            }
        })
    }

    /// Repeat the given values in order, wrapping around endlessly.
    ///
    /// Like [`cycle`](Flowable::cycle), each emission is an independent copy.
    /// An empty template completes immediately.
    pub fn cycle_items<I>(values: I) -> Flowable<T>
    where
        I: IntoIterator<Item = T>,
    {
        let template: Vec<T> = values.into_iter().collect();
        let mut cursor = 0;
        Flowable::generate(move |out| {
            if template.is_empty() {
                out.complete();
                return;
            }
            while out.budget() > 0 {
                out.next(template[cursor].clone());
                cursor = (cursor + 1) % template.len();
            }
        })
    }
}

impl<T: 'static> Flowable<T> {
    /// Complete immediately, emitting nothing.
    pub fn empty() -> Flowable<T> {
        Flowable::generate(|out| out.complete())
    }

    /// Fail immediately, emitting nothing.
    ///
    /// Accepts a pre-built [`StreamError`] or anything convertible into
    /// one, such as a message string:
    ///
    /// ```
    /// use siphon::{Flowable, StreamError};
    ///
    /// let from_message = Flowable::<i32>::error("something broke!");
    /// let from_value = Flowable::<i32>::error(StreamError::new("something broke!"));
    /// # drop((from_message, from_value));
    /// ```
    pub fn error<E: Into<StreamError>>(error: E) -> Flowable<T> {
        let error = error.into();
        Flowable::generate(move |out| out.error(error.clone()))
    }
}

impl Flowable<i64> {
    /// Emit the integers of `[start, end)` in order, then complete.
    ///
    /// An empty interval (`end <= start`) completes immediately.
    pub fn range(start: i64, end: i64) -> Flowable<i64> {
        let mut next = start;
        Flowable::generate(move |out| {
            while next < end && out.budget() > 0 {
                out.next(next);
                next += 1;
            }
            if next >= end {
                out.complete();
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::drain;

    #[test]
    fn just_emits_once() {
        let collector = drain(&Flowable::just(22));
        assert_eq!(collector.values, vec![22]);
        assert!(collector.completed);
        assert!(collector.error.is_none());
    }

    #[test]
    fn items_preserve_order() {
        let collector = drain(&Flowable::items(vec![12, 34, 56, 98]));
        assert_eq!(collector.values, vec![12, 34, 56, 98]);
        assert!(collector.completed);
    }

    #[test]
    fn items_of_nothing_complete() {
        let collector = drain(&Flowable::items(Vec::<i32>::new()));
        assert!(collector.values.is_empty());
        assert!(collector.completed);
    }

    #[test]
    fn range_covers_the_interval() {
        let collector = drain(&Flowable::range(10, 15));
        assert_eq!(collector.values, vec![10, 11, 12, 13, 14]);
        assert!(collector.completed);
    }

    #[test]
    fn empty_interval_completes_immediately() {
        let collector = drain(&Flowable::range(7, 7));
        assert!(collector.values.is_empty());
        assert!(collector.completed);

        let collector = drain(&Flowable::range(5, -5));
        assert!(collector.values.is_empty());
        assert!(collector.completed);
    }

    #[test]
    fn cycle_repeats_under_take() {
        let collector = drain(&Flowable::cycle(7).take(4));
        assert_eq!(collector.values, vec![7, 7, 7, 7]);
        assert!(collector.completed);
    }

    #[test]
    fn cycle_items_wrap_around() {
        let collector = drain(&Flowable::cycle_items(vec!["a", "b"]).take(5));
        assert_eq!(collector.values, vec!["a", "b", "a", "b", "a"]);
        assert!(collector.completed);
    }

    #[test]
    fn cycle_items_of_nothing_complete() {
        let collector = drain(&Flowable::cycle_items(Vec::<i32>::new()));
        assert!(collector.values.is_empty());
        assert!(collector.completed);
    }

    #[test]
    fn error_terminates_immediately() {
        let collector = drain(&Flowable::<i32>::error("something broke!"));
        assert!(collector.values.is_empty());
        assert!(!collector.completed);
        assert_eq!(
            collector.error.as_ref().map(|e| e.message().to_string()),
            Some(String::from("something broke!"))
        );
    }

    #[test]
    fn empty_terminates_immediately() {
        let collector = drain(&Flowable::<i32>::empty());
        assert!(collector.values.is_empty());
        assert!(collector.completed);
        assert!(collector.error.is_none());
    }

    #[test]
    fn clones_subscribe_independently() {
        let flowable = Flowable::items(vec![1, 2, 3]);
        let other = flowable.clone();
        assert_eq!(drain(&flowable).values, vec![1, 2, 3]);
        assert_eq!(drain(&other).values, vec![1, 2, 3]);
    }

    #[test]
    fn for_each_drains_the_sequence() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        Flowable::range(0, 4).for_each(move |v| sink.lock().unwrap().push(v));
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
    }
}
