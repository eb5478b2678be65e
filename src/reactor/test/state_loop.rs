use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use crate::reactor::Reactor;

#[test]
fn deferred_runs_on_next_pass() {
    let reactor = Reactor::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    let o = order.clone();
    let r = reactor.clone();
    reactor.defer(move || {
        o.borrow_mut().push(1);
        let o = o.clone();
        // Deferred from within a deferred call, waits for the pass after.
        r.defer(move || o.borrow_mut().push(2));
    });

    assert!(reactor.process_events());
    assert_eq!(*order.borrow(), [1]);

    assert!(reactor.process_events());
    assert_eq!(*order.borrow(), [1, 2]);

    assert!(!reactor.process_events());
}

#[test]
fn timers_fire_in_deadline_order() {
    let reactor = Reactor::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    let o = order.clone();
    reactor.start_timer(Duration::from_millis(10), move || o.borrow_mut().push("late"));
    let o = order.clone();
    reactor.start_timer(Duration::from_millis(1), move || o.borrow_mut().push("early"));

    let start = Instant::now();
    assert!(reactor.run_until(|| order.borrow().len() == 2));
    assert!(start.elapsed() >= Duration::from_millis(10));

    assert_eq!(*order.borrow(), ["early", "late"]);
}

#[test]
fn stopped_timer_never_fires() {
    let reactor = Reactor::new();
    let fired = Rc::new(Cell::new(false));

    let f = fired.clone();
    let id = reactor.start_timer(Duration::from_millis(1), move || f.set(true));
    assert!(reactor.timer_active(id));

    assert!(reactor.stop_timer(id));
    assert!(!reactor.stop_timer(id));
    assert!(!reactor.timer_active(id));

    thread::sleep(Duration::from_millis(2));
    reactor.process_events();
    assert!(!fired.get());
}

#[test]
fn run_until_gives_up_when_idle() {
    let reactor = Reactor::new();
    assert!(!reactor.run_until(|| false));
    assert!(reactor.run_until(|| true));
}

#[test]
fn notifier_wakes_blocked_loop() {
    let reactor = Reactor::new();
    let notifier = reactor.notifier();
    let woken = Rc::new(Cell::new(0));

    // A far timer keeps the loop from going idle.
    let far = reactor.start_timer(Duration::from_secs(60), || {});

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        notifier.notify();
    });

    let w = woken.clone();
    let start = Instant::now();
    reactor.run_until(move || {
        w.set(w.get() + 1);
        w.get() > 2
    });

    assert!(start.elapsed() < Duration::from_secs(30));
    assert!(reactor.stop_timer(far));
    handle.join().unwrap();
}
