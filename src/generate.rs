//! Demand-gated emission for generated sources.
//!
//! Every factory source is a generator closure run by a per-subscription
//! [`Driver`]. The driver owns the demand counter and the downstream sink
//! chain, pumps the generator while demand is outstanding, and tears the
//! whole chain down the moment the run goes inert. Requests arriving from
//! inside a callback only raise the counter — the loop already running
//! further up the stack picks them up, so callbacks for one subscription
//! never overlap.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::counted::LiveToken;
use crate::error::StreamError;
use crate::flowable::Flow;
use crate::subscriber::Subscriber;
use crate::subscription::{Demand, Subscription};

/// Demand counter and termination flags shared between the driver and the
/// emitter handed to the generator.
struct State {
    demand: AtomicU64,
    cancelled: AtomicBool,
    terminated: AtomicBool,
}

impl State {
    fn new() -> State {
        State {
            demand: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        }
    }

    fn active(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst) && !self.terminated.load(Ordering::SeqCst)
    }

    fn demand(&self) -> u64 {
        self.demand.load(Ordering::SeqCst)
    }

    fn add_demand(&self, n: u64) {
        let _ = self
            .demand
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| {
                Some(d.saturating_add(n))
            });
    }

    /// Consume one unit of demand. `u64::MAX` is treated as unbounded and
    /// never decremented.
    fn claim(&self) -> bool {
        if !self.active() {
            return false;
        }
        let mut current = self.demand.load(Ordering::SeqCst);
        loop {
            if current == 0 {
                return false;
            }
            if current == u64::MAX {
                return true;
            }
            match self.demand.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(changed) => current = changed,
            }
        }
    }
}

/// Handle through which a generator closure emits into its sink.
///
/// A generator is invoked whenever its subscription may have demand. It
/// should emit while [`budget`](Emitter::budget) is positive, deliver
/// [`complete`](Emitter::complete) or [`error`](Emitter::error) when the
/// sequence is finished, and simply return when it runs out of budget — it
/// will be invoked again once more demand arrives. After a terminal call,
/// or once the run is cancelled, every method is a no-op.
pub struct Emitter<'a, T> {
    sink: &'a mut dyn Subscriber<Item = T>,
    state: &'a State,
    emitted: u64,
}

impl<'a, T> Emitter<'a, T> {
    /// Outstanding demand; zero once the run has gone inert.
    ///
    /// `u64::MAX` means an effectively unbounded amount was requested.
    pub fn budget(&self) -> u64 {
        if self.state.active() {
            self.state.demand()
        } else {
            0
        }
    }

    /// Emit one value, consuming one unit of demand.
    ///
    /// Without outstanding demand the value is discarded, so generators
    /// should check [`budget`](Emitter::budget) before producing one.
    pub fn next(&mut self, item: T) {
        if !self.state.claim() {
            return;
        }
        self.emitted += 1;
        self.sink.on_next(item);
    }

    /// Deliver normal termination.
    pub fn complete(&mut self) {
        if !self.state.active() {
            return;
        }
        self.state.terminated.store(true, Ordering::SeqCst);
        self.sink.on_complete();
    }

    /// Deliver failure termination.
    pub fn error(&mut self, error: StreamError) {
        if !self.state.active() {
            return;
        }
        self.state.terminated.store(true, Ordering::SeqCst);
        self.sink.on_error(error);
    }
}

/// Lifecycle of one subscription's generator and sink chain.
enum Stage<T, G> {
    /// Between `on_subscribe` and the sink being attached.
    Idle(G),
    /// Emitting, or parked awaiting demand.
    Live(G, Box<dyn Subscriber<Item = T>>),
    /// Torn down; generator and sink chain have been dropped.
    Done,
}

/// The per-subscription engine behind a generated source.
struct Driver<T, G> {
    state: State,
    /// Exclusion flag for the drive loop; reentrant calls only bump the
    /// atomics above and return.
    driving: AtomicBool,
    attached: AtomicBool,
    torn: AtomicBool,
    stage: Mutex<Stage<T, G>>,
    _token: LiveToken,
}

impl<T, G> Driver<T, G>
where
    T: 'static,
    G: FnMut(&mut Emitter<'_, T>) + Send + 'static,
{
    fn new(gen: G) -> Driver<T, G> {
        Driver {
            state: State::new(),
            driving: AtomicBool::new(false),
            attached: AtomicBool::new(false),
            torn: AtomicBool::new(false),
            stage: Mutex::new(Stage::Idle(gen)),
            _token: LiveToken::new("subscription"),
        }
    }

    fn attach(&self, sink: Box<dyn Subscriber<Item = T>>) {
        {
            let mut stage = self.stage.lock().unwrap();
            // A cancel arriving during `on_subscribe` has already moved the
            // stage to Done; the sink is then dropped without attaching.
            if let Stage::Idle(gen) = mem::replace(&mut *stage, Stage::Done) {
                *stage = Stage::Live(gen, sink);
            }
        }
        self.attached.store(true, Ordering::SeqCst);
        self.drive();
    }

    /// Run the generator until demand is exhausted or the run goes inert,
    /// then tear down if it did. Only one caller is ever inside the guarded
    /// section; everyone else has already deposited demand or flags.
    fn drive(&self) {
        loop {
            if self.driving.swap(true, Ordering::SeqCst) {
                return;
            }
            {
                let mut stage = self.stage.lock().unwrap();
                if let Stage::Live(gen, sink) = &mut *stage {
                    loop {
                        if !self.state.active() {
                            break;
                        }
                        let mut emitter = Emitter {
                            sink: sink.as_mut(),
                            state: &self.state,
                            emitted: 0,
                        };
                        gen(&mut emitter);
                        let progressed = emitter.emitted > 0;
                        if !progressed || !self.state.active() || self.state.demand() == 0 {
                            break;
                        }
                    }
                }
                if !self.state.active() {
                    *stage = Stage::Done;
                    self.torn.store(true, Ordering::SeqCst);
                }
            }
            self.driving.store(false, Ordering::SeqCst);
            if !self.needs_drive() {
                return;
            }
        }
    }

    /// Whether work deposited while the loop was held still needs a pass.
    fn needs_drive(&self) -> bool {
        if self.torn.load(Ordering::SeqCst) || !self.attached.load(Ordering::SeqCst) {
            return false;
        }
        !self.state.active() || self.state.demand() > 0
    }
}

impl<T, G> Demand for Driver<T, G>
where
    T: 'static,
    G: FnMut(&mut Emitter<'_, T>) + Send + 'static,
{
    fn request(&self, n: u64) {
        if n == 0 || !self.state.active() {
            return;
        }
        self.state.add_demand(n);
        self.drive();
    }

    fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.drive();
    }

    fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

/// A source described by a generator closure.
///
/// The stored generator is only ever cloned; each subscription runs its own
/// copy, which is what makes the flowable cold and re-subscribable.
pub(crate) struct GeneratedFlow<T, G> {
    gen: G,
    _token: LiveToken,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T, G> GeneratedFlow<T, G> {
    pub fn new(gen: G) -> GeneratedFlow<T, G> {
        GeneratedFlow {
            gen,
            _token: LiveToken::new("flowable"),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T, G> Flow for GeneratedFlow<T, G>
where
    T: 'static,
    G: FnMut(&mut Emitter<'_, T>) + Clone + Send + Sync + 'static,
{
    type Item = T;

    fn subscribe_raw(&self, mut sink: Box<dyn Subscriber<Item = T>>) {
        let driver = Arc::new(Driver::new(self.gen.clone()));
        sink.on_subscribe(Subscription::new(driver.clone()));
        // Demand requested during `on_subscribe` has accumulated on the
        // driver; attaching starts the first pass, which also lets sources
        // with an immediate terminal (empty, error) finish without demand.
        driver.attach(sink);
    }
}

#[cfg(test)]
mod test {
    use crate::flowable::Flowable;
    use crate::testing::{drain, Collector};
    use std::sync::{Arc, RwLock};

    #[test]
    fn emits_only_requested_amount() {
        let flowable = Flowable::range(0, 100);
        let sink = Arc::new(RwLock::new(Collector::with_request(3)));
        flowable.subscribe(&sink);
        let collector = sink.read().unwrap();
        assert_eq!(collector.values, vec![0, 1, 2]);
        assert!(!collector.completed);
        assert!(collector.error.is_none());
    }

    #[test]
    fn parked_run_resumes_on_later_request() {
        let flowable = Flowable::range(0, 5);
        let sink = Arc::new(RwLock::new(Collector::with_request(2)));
        flowable.subscribe(&sink);
        let subscription = sink
            .read()
            .unwrap()
            .subscription
            .clone()
            .expect("subscribed");
        subscription.request(2);
        assert_eq!(sink.read().unwrap().values, vec![0, 1, 2, 3]);
        subscription.request(u64::MAX);
        let collector = sink.read().unwrap();
        assert_eq!(collector.values, vec![0, 1, 2, 3, 4]);
        assert!(collector.completed);
    }

    #[test]
    fn reentrant_request_extends_the_run() {
        // A sink that paces itself one value per callback exercises the
        // request-from-inside-on_next path.
        struct OneAtATime {
            values: Vec<i64>,
            completed: bool,
            subscription: Option<crate::Subscription>,
        }

        impl crate::Subscriber for OneAtATime {
            type Item = i64;

            fn on_subscribe(&mut self, subscription: crate::Subscription) {
                subscription.request(1);
                self.subscription = Some(subscription);
            }

            fn on_next(&mut self, item: i64) {
                self.values.push(item);
                if let Some(subscription) = &self.subscription {
                    subscription.request(1);
                }
            }

            fn on_complete(&mut self) {
                self.completed = true;
            }

            fn on_error(&mut self, _error: crate::StreamError) {}
        }

        let sink = Arc::new(RwLock::new(OneAtATime {
            values: vec![],
            completed: false,
            subscription: None,
        }));
        Flowable::range(10, 15).subscribe(&sink);
        let paced = sink.read().unwrap();
        assert_eq!(paced.values, vec![10, 11, 12, 13, 14]);
        assert!(paced.completed);
    }

    #[test]
    fn cancel_stops_emission_without_terminal() {
        struct CancelAfterTwo {
            values: Vec<i64>,
            terminated: bool,
            subscription: Option<crate::Subscription>,
        }

        impl crate::Subscriber for CancelAfterTwo {
            type Item = i64;

            fn on_subscribe(&mut self, subscription: crate::Subscription) {
                subscription.request(u64::MAX);
                self.subscription = Some(subscription);
            }

            fn on_next(&mut self, item: i64) {
                self.values.push(item);
                if self.values.len() == 2 {
                    if let Some(subscription) = &self.subscription {
                        subscription.cancel();
                    }
                }
            }

            fn on_complete(&mut self) {
                self.terminated = true;
            }

            fn on_error(&mut self, _error: crate::StreamError) {
                self.terminated = true;
            }
        }

        let sink = Arc::new(RwLock::new(CancelAfterTwo {
            values: vec![],
            terminated: false,
            subscription: None,
        }));
        Flowable::range(0, 1_000_000).subscribe(&sink);
        let cancelled = sink.read().unwrap();
        assert_eq!(cancelled.values, vec![0, 1]);
        assert!(!cancelled.terminated);
    }

    #[test]
    fn generator_sees_immediate_terminal_without_demand() {
        let collector = drain(&Flowable::<i64>::empty());
        assert!(collector.values.is_empty());
        assert!(collector.completed);
    }

    #[test]
    fn resubscription_starts_fresh() {
        let flowable = Flowable::range(0, 3);
        assert_eq!(drain(&flowable).values, vec![0, 1, 2]);
        assert_eq!(drain(&flowable).values, vec![0, 1, 2]);
    }
}
