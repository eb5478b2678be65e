use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use http::StatusCode;

use crate::pool::WorkerPool;
use crate::reactor::{ConnectionManager, NativeRequest, Reactor, ReplyState};
use crate::tls::TlsConfig;
use crate::transfer::test::get;
use crate::transfer::test::mock::MockTransport;

fn setup(transport: MockTransport) -> (Reactor, ConnectionManager, Arc<MockTransport>) {
    let reactor = Reactor::new();
    let transport = Arc::new(transport);
    let pool = Arc::new(WorkerPool::new(1).unwrap());
    let manager = ConnectionManager::new(&reactor, transport.clone(), pool);
    (reactor, manager, transport)
}

fn tls() -> Arc<TlsConfig> {
    Arc::new(TlsConfig::default())
}

#[test]
fn native_request_shares_body() {
    let request = http::Request::post("http://example.test/a")
        .body(b"payload".to_vec())
        .unwrap();
    let native = NativeRequest::pack(&request);
    let body = native.body().clone();

    assert_eq!(&*body, b"payload");
    assert_eq!(Arc::strong_count(&body), 2);
}

#[test]
fn finished_reply_holds_outcome() {
    let (reactor, manager, _transport) = setup(MockTransport::ok(201, b"made"));

    let reply = manager
        .send(NativeRequest::pack(&get("http://example.test/a")), tls())
        .unwrap();
    assert_eq!(reply.state(), ReplyState::Running);
    assert_eq!(manager.in_flight(), 1);

    let r = reply.clone();
    assert!(reactor.run_until(move || !r.is_running()));

    assert_eq!(reply.state(), ReplyState::Finished);
    assert_eq!(manager.in_flight(), 0);

    let response = reply.take_outcome().unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.body(), b"made");

    // Taken only once.
    assert!(reply.take_outcome().is_none());
}

#[test]
fn error_precedes_finished() {
    let (reactor, manager, _transport) = setup(MockTransport::failing("reset", 104));

    let reply = manager
        .send(NativeRequest::pack(&get("http://example.test/a")), tls())
        .unwrap();

    let order = Rc::new(RefCell::new(Vec::new()));
    let o = order.clone();
    reply
        .error()
        .connect(move |e| o.borrow_mut().push(format!("error {}", e.message())));
    let o = order.clone();
    reply.finished().connect(move |_| o.borrow_mut().push("finished".into()));

    let r = reply.clone();
    assert!(reactor.run_until(move || !r.is_running()));

    assert_eq!(*order.borrow(), ["error reset", "finished"]);
}

#[test]
fn panicking_exchange_still_finishes() {
    let (reactor, manager, _transport) = setup(MockTransport::panicking());

    let reply = manager
        .send(NativeRequest::pack(&get("http://example.test/a")), tls())
        .unwrap();

    let order = Rc::new(RefCell::new(Vec::new()));
    let o = order.clone();
    reply
        .error()
        .connect(move |e| o.borrow_mut().push(format!("error {}", e.message())));
    let o = order.clone();
    reply.finished().connect(move |_| o.borrow_mut().push("finished".into()));

    let r = reply.clone();
    assert!(reactor.run_until(move || !r.is_running()));

    assert_eq!(reply.state(), ReplyState::Finished);
    assert_eq!(manager.in_flight(), 0);
    assert_eq!(*order.borrow(), ["error worker dropped the exchange", "finished"]);
    assert!(reply.take_outcome().unwrap().is_err());
}

#[test]
fn abort_emits_only_finished_later() {
    let (reactor, manager, transport) = setup(MockTransport::ok(200, b"").gated());

    let reply = manager
        .send(NativeRequest::pack(&get("http://example.test/a")), tls())
        .unwrap();
    transport.wait_entered(1);

    let order = Rc::new(RefCell::new(Vec::new()));
    let o = order.clone();
    reply.error().connect(move |_| o.borrow_mut().push("error"));
    let o = order.clone();
    reply.finished().connect(move |_| o.borrow_mut().push("finished"));

    reply.abort();
    assert_eq!(reply.state(), ReplyState::Aborted);
    assert_eq!(manager.in_flight(), 0);
    // Deferred to the next pass.
    assert!(order.borrow().is_empty());

    reply.abort();
    reactor.process_events();
    assert_eq!(*order.borrow(), ["finished"]);

    transport.release();
}

#[test]
fn close_drops_outcome_and_slots() {
    let (reactor, manager, _transport) = setup(MockTransport::ok(200, b"{}"));

    let reply = manager
        .send(NativeRequest::pack(&get("http://example.test/a")), tls())
        .unwrap();
    reply.finished().connect(|_| {});

    let r = reply.clone();
    assert!(reactor.run_until(move || !r.is_running()));

    reply.close();
    reply.close();

    assert_eq!(reply.state(), ReplyState::Closed);
    assert!(reply.take_outcome().is_none());
    assert!(reply.finished().is_empty());
}
