//! Live-object accounting.
//!
//! Every core object of a pipeline registers itself here on construction and
//! deregisters when dropped. After a pipeline has been fully released the
//! count must return to its prior value; a residue indicates a leak or an
//! ownership cycle. The counters exist for diagnostics and tests, not for
//! normal operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use lazy_static::lazy_static;

static LIVE: AtomicUsize = AtomicUsize::new(0);

lazy_static! {
    static ref KINDS: Mutex<HashMap<&'static str, usize>> = Mutex::new(HashMap::new());
}

/// The number of live core objects in the process.
///
/// Counts every flowable body, operator adapter, subscription driver and
/// gate currently alive, across all pipelines.
pub fn live_objects() -> usize {
    LIVE.load(Ordering::SeqCst)
}

/// The number of live core objects of one kind.
///
/// The kinds in use are `"flowable"`, `"subscriber"` and `"subscription"`.
pub fn live_objects_of(kind: &str) -> usize {
    KINDS
        .lock()
        .unwrap()
        .get(kind)
        .cloned()
        .unwrap_or(0)
}

/// Registration guard embedded in every counted object.
pub(crate) struct LiveToken {
    kind: &'static str,
}

impl LiveToken {
    pub fn new(kind: &'static str) -> LiveToken {
        LIVE.fetch_add(1, Ordering::SeqCst);
        *KINDS.lock().unwrap().entry(kind).or_insert(0) += 1;
        LiveToken { kind }
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        LIVE.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = KINDS.lock().unwrap().get_mut(self.kind) {
            *count -= 1;
        }
    }
}
