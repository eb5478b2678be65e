//! Single threaded reactor
//!
//! A minimal cooperative event loop in the style of a GUI toolkit's main loop.
//! Everything registered with a [`Reactor`] runs on the thread that pumps it:
//! deferred calls, one-shot timers and [`EventSource`]s that marshal work done
//! elsewhere back onto the loop thread.
//!
//! Other threads can't touch the reactor, they can only [`Notifier::notify`] it
//! so a blocked [`Reactor::run_until`] wakes up and dispatches its sources.
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use std::time::Duration;
//! use because::reactor::Reactor;
//!
//! let reactor = Reactor::new();
//! let fired = Rc::new(Cell::new(false));
//!
//! let f = fired.clone();
//! reactor.start_timer(Duration::from_millis(1), move || f.set(true));
//!
//! assert!(reactor.run_until(|| fired.get()));
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

mod manager;
mod signal;

pub use manager::{ConnectionManager, NativeRequest, Reply, ReplyState};
pub use signal::{Signal, SlotId};

#[cfg(test)]
mod test;

/// Something the reactor polls on every pass.
pub trait EventSource {
    /// Deliver whatever arrived since the last pass. Returns `true` if anything
    /// was delivered.
    fn dispatch(&self) -> bool;

    /// Tell if the source is still expecting events.
    fn has_pending(&self) -> bool;
}

/// Identifies a started timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

type Callback = Box<dyn FnOnce()>;

/// Handle to a single threaded event loop.
///
/// Cloning gives another handle to the same loop.
#[derive(Clone)]
pub struct Reactor {
    inner: Rc<Inner>,
}

struct Inner {
    deferred: RefCell<VecDeque<Callback>>,
    timers: RefCell<BTreeMap<(Instant, TimerId), Callback>>,
    next_timer: Cell<u64>,
    sources: RefCell<Vec<Weak<dyn EventSource>>>,
    wakeup: Arc<Wakeup>,
}

impl Reactor {
    /// Create a new, empty reactor.
    pub fn new() -> Self {
        Reactor {
            inner: Rc::new(Inner {
                deferred: RefCell::new(VecDeque::new()),
                timers: RefCell::new(BTreeMap::new()),
                next_timer: Cell::new(0),
                sources: RefCell::new(Vec::new()),
                wakeup: Arc::new(Wakeup::default()),
            }),
        }
    }

    /// A handle other threads can use to wake this reactor.
    pub fn notifier(&self) -> Notifier {
        Notifier {
            wakeup: self.inner.wakeup.clone(),
        }
    }

    /// Run `f` on a later pass of the loop.
    pub fn defer(&self, f: impl FnOnce() + 'static) {
        self.inner.deferred.borrow_mut().push_back(Box::new(f));
    }

    /// Run `f` once, `after` from now.
    pub fn start_timer(&self, after: Duration, f: impl FnOnce() + 'static) -> TimerId {
        let id = TimerId(self.inner.next_timer.get());
        self.inner.next_timer.set(id.0 + 1);

        let deadline = Instant::now() + after;
        self.inner
            .timers
            .borrow_mut()
            .insert((deadline, id), Box::new(f));

        id
    }

    /// Stop a timer. Returns `true` if it had not fired yet.
    pub fn stop_timer(&self, id: TimerId) -> bool {
        let mut timers = self.inner.timers.borrow_mut();
        let key = timers.keys().find(|(_, t)| *t == id).copied();
        key.map(|k| timers.remove(&k).is_some()).unwrap_or(false)
    }

    /// Tell if a timer is waiting to fire.
    pub fn timer_active(&self, id: TimerId) -> bool {
        self.inner.timers.borrow().keys().any(|(_, t)| *t == id)
    }

    /// Register a source to be dispatched on every pass.
    ///
    /// The reactor only holds a weak reference, dropped sources are forgotten.
    pub fn register(&self, source: Weak<dyn EventSource>) {
        self.inner.sources.borrow_mut().push(source);
    }

    /// Run one pass over sources, due timers and deferred calls without blocking.
    ///
    /// Returns `true` if anything ran.
    pub fn process_events(&self) -> bool {
        self.inner.wakeup.take();

        let mut did_work = false;

        // Snapshot, since dispatching may register new sources.
        let sources: Vec<_> = {
            let mut sources = self.inner.sources.borrow_mut();
            sources.retain(|s| s.strong_count() > 0);
            sources.iter().filter_map(|s| s.upgrade()).collect()
        };
        for source in sources {
            did_work |= source.dispatch();
        }

        let now = Instant::now();
        loop {
            let due = {
                let mut timers = self.inner.timers.borrow_mut();
                match timers.first_key_value() {
                    Some((k, _)) if k.0 <= now => timers.pop_first().map(|(_, f)| f),
                    _ => None,
                }
            };
            let Some(f) = due else {
                break;
            };
            f();
            did_work = true;
        }

        // Calls deferred while running these wait for the next pass.
        let count = self.inner.deferred.borrow().len();
        for _ in 0..count {
            let next = self.inner.deferred.borrow_mut().pop_front();
            let Some(f) = next else {
                break;
            };
            f();
            did_work = true;
        }

        did_work
    }

    /// Pump the loop until `done` holds.
    ///
    /// Blocks the calling thread between passes. This starves anything else the
    /// thread should be doing, e.g. painting a UI, so it's a last resort.
    ///
    /// Returns `false` if the reactor ran out of things that could ever make
    /// `done` hold: no deferred calls, timers, or sources with pending work.
    pub fn run_until(&self, mut done: impl FnMut() -> bool) -> bool {
        loop {
            if done() {
                return true;
            }

            if self.process_events() {
                continue;
            }

            if done() {
                return true;
            }

            if self.is_idle() {
                debug!("Reactor idle before condition was met");
                return false;
            }

            let next_deadline = self
                .inner
                .timers
                .borrow()
                .first_key_value()
                .map(|(k, _)| k.0);

            self.inner.wakeup.wait(next_deadline);
        }
    }

    fn is_idle(&self) -> bool {
        if !self.inner.deferred.borrow().is_empty() || !self.inner.timers.borrow().is_empty() {
            return false;
        }

        let sources = self.inner.sources.borrow();
        !sources
            .iter()
            .filter_map(|s| s.upgrade())
            .any(|s| s.has_pending())
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Reactor::new()
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("deferred", &self.inner.deferred.borrow().len())
            .field("timers", &self.inner.timers.borrow().len())
            .field("sources", &self.inner.sources.borrow().len())
            .finish()
    }
}

// //////////////////////////////////////////////////////////////////////////////////////////// WAKEUP

#[derive(Default)]
struct Wakeup {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl Wakeup {
    fn notify(&self) {
        let mut pending = lock(&self.pending);
        *pending = true;
        self.cond.notify_all();
    }

    fn take(&self) -> bool {
        std::mem::replace(&mut *lock(&self.pending), false)
    }

    fn wait(&self, deadline: Option<Instant>) {
        let mut pending = lock(&self.pending);

        while !*pending {
            match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return;
                    }
                    pending = match self.cond.wait_timeout(pending, d - now) {
                        Ok((g, _)) => g,
                        Err(poisoned) => poisoned.into_inner().0,
                    };
                }
                None => {
                    pending = match self.cond.wait(pending) {
                        Ok(g) => g,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                }
            }
        }
    }
}

// The flag is a plain bool, a panic elsewhere can't leave it inconsistent.
fn lock(m: &Mutex<bool>) -> std::sync::MutexGuard<'_, bool> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Thread safe handle that wakes a [`Reactor`].
#[derive(Clone)]
pub struct Notifier {
    wakeup: Arc<Wakeup>,
}

impl Notifier {
    /// Wake the reactor if it's blocked in [`Reactor::run_until`], or make its next
    /// wait return immediately.
    pub fn notify(&self) {
        self.wakeup.notify();
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier").finish()
    }
}
