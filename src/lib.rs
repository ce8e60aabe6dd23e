//! An experimental library for demand-driven reactive streams
//!
//! *Siphon* provides primitives for composing lazy, pull-regulated
//! sequences of values. A pipeline never buffers and never outruns its
//! consumer: values flow only against demand the sink has declared, the
//! sequence terminates exactly once, and tearing a pipeline down releases
//! every object it allocated.
//!
//!
//! # The protocol
//!
//! Three roles cooperate per subscription:
//!
//! - A [`Flowable`] is a cold, repeatable description of a sequence.
//!   Subscribing it twice produces two independent runs.
//! - A [`Subscriber`] is the sink, driven purely through callbacks:
//!   `on_subscribe` first, then at most as many `on_next` calls as it has
//!   requested, then exactly one of `on_complete` or `on_error`.
//! - A [`Subscription`] is the control channel handed to the sink: it
//!   carries demand upstream via `request` and may stop the run via
//!   `cancel`.
//!
//! Data flows downstream through the callbacks; control flows upstream
//! through the subscription. The operators [`map`](Flowable::map) and
//! [`take`](Flowable::take) interpose transparently in both directions.
//!
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, RwLock};
//! use siphon::{Flowable, StreamError, Subscriber, Subscription};
//!
//! struct Collect {
//!     values: Vec<String>,
//!     completed: bool,
//! }
//!
//! impl Subscriber for Collect {
//!     type Item = String;
//!
//!     fn on_subscribe(&mut self, subscription: Subscription) {
//!         subscription.request(u64::MAX);
//!     }
//!
//!     fn on_next(&mut self, item: String) {
//!         self.values.push(item);
//!     }
//!
//!     fn on_complete(&mut self) {
//!         self.completed = true;
//!     }
//!
//!     fn on_error(&mut self, _error: StreamError) {}
//! }
//!
//! let squares = Flowable::range(1, 4)
//!     .map(|v| v * v)
//!     .map(|v| v.to_string());
//!
//! let sink = Arc::new(RwLock::new(Collect { values: vec![], completed: false }));
//! squares.subscribe(&sink);
//!
//! let collect = sink.read().unwrap();
//! assert_eq!(collect.values, vec!["1", "4", "9"]);
//! assert!(collect.completed);
//! ```
//!
//! Sources are built with the factories on [`Flowable`] —
//! [`just`](Flowable::just), [`items`](Flowable::items),
//! [`range`](Flowable::range), [`cycle`](Flowable::cycle),
//! [`error`](Flowable::error), [`empty`](Flowable::empty) — or from
//! scratch with a generator closure via [`generate`](Flowable::generate).
//!
//!
//! # Lifecycle accounting
//!
//! Every core object registers itself with a process-wide counter,
//! readable through [`live_objects`]. Once a pipeline has terminated (or
//! been cancelled) and the outside handles are dropped, the counter
//! returns to its prior value; the test suite asserts this for every kind
//! of pipeline. A run abandoned without a terminal keeps its per-run state
//! alive until cancelled — `cancel` is the release valve.

#![warn(missing_docs)]

pub use crate::counted::{live_objects, live_objects_of};
pub use crate::error::StreamError;
pub use crate::flowable::Flowable;
pub use crate::generate::Emitter;
pub use crate::subscriber::Subscriber;
pub use crate::subscription::Subscription;

mod counted;
mod error;
mod flowable;
mod generate;
mod operator;
mod subscriber;
mod subscription;

#[cfg(test)]
mod testing;
