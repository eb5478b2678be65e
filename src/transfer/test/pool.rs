use std::sync::Arc;
use std::thread;
use std::time::Duration;

use futures::executor::block_on;
use http::StatusCode;

use super::mock::MockTransport;
use super::{get, state};
use crate::pool::WorkerPool;
use crate::transfer::{Phase, PoolTransfer, Transfer};
use crate::{Error, Future};

fn pool(threads: usize) -> Arc<WorkerPool> {
    Arc::new(WorkerPool::new(threads).unwrap())
}

#[test]
fn get_returns_response() {
    let transport = Arc::new(MockTransport::ok(200, b"{}"));
    let mut transfer = PoolTransfer::new(state(get("http://example.test/a")), transport, pool(2));

    transfer.start().unwrap();
    let response = transfer.wait().unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), b"{}");
    assert!(transfer.duration() > Duration::ZERO);
    assert_eq!(transfer.phase(), Phase::Terminal);
}

#[test]
fn empty_url_fails_at_start() {
    let transport = Arc::new(MockTransport::ok(200, b""));
    let request = http::Request::builder().body(vec![]).unwrap();
    let mut transfer = PoolTransfer::new(state(request), transport.clone(), pool(1));

    let err = transfer.start().unwrap_err();
    assert!(err.is_construction());
    assert_eq!(transfer.phase(), Phase::NotStarted);
    assert_eq!(transfer.duration(), Duration::ZERO);

    // and nothing was submitted
    assert!(!transfer.cancel());
    assert_eq!(transport.calls(), 0);
}

#[test]
fn start_twice_dispatches_once() {
    let transport = Arc::new(MockTransport::ok(200, b""));
    let mut transfer =
        PoolTransfer::new(state(get("http://example.test/a")), transport.clone(), pool(2));

    transfer.start().unwrap();
    transfer.start().unwrap();
    transfer.wait().unwrap();
    transfer.wait().unwrap();

    assert_eq!(transport.calls(), 1);
}

#[test]
fn wait_starts() {
    let transport = Arc::new(MockTransport::ok(204, b""));
    let mut transfer = PoolTransfer::new(state(get("http://example.test/a")), transport, pool(1));

    let response = transfer.wait().unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[test]
fn transport_failure() {
    let transport = Arc::new(MockTransport::failing("timed out", 110));
    let mut transfer = PoolTransfer::new(state(get("http://example.test/a")), transport, pool(1));

    let err = transfer.wait().unwrap_err();
    assert_eq!(err.as_transfer().and_then(|e| e.code()), Some(110));
    assert!(transfer.response().is_none());
    assert!(transfer.error().is_some());
}

#[test]
fn cancel_while_queued() {
    let pool = pool(1);

    // Keep the only worker busy.
    let blocker = Arc::new(MockTransport::ok(200, b"").gated());
    let mut first =
        PoolTransfer::new(state(get("http://example.test/first")), blocker.clone(), pool.clone());
    first.start().unwrap();
    blocker.wait_entered(1);

    let transport = Arc::new(MockTransport::ok(200, b""));
    let mut second =
        PoolTransfer::new(state(get("http://example.test/second")), transport.clone(), pool);
    second.start().unwrap();

    assert!(second.cancel());
    assert!(!second.cancel());
    assert_eq!(second.wait().unwrap_err(), Error::Cancelled);
    assert_eq!(second.phase(), Phase::Terminal);
    assert!(second.response().is_none());
    assert!(second.error().is_none());

    blocker.release();
    first.wait().unwrap();
    assert_eq!(transport.calls(), 0);
}

#[test]
fn cancel_after_begun_delivers_result() {
    let transport = Arc::new(MockTransport::ok(200, b"late").gated());
    let mut transfer =
        PoolTransfer::new(state(get("http://example.test/a")), transport.clone(), pool(1));

    transfer.start().unwrap();
    transport.wait_entered(1);

    assert!(!transfer.cancel());

    transport.release();
    let response = transfer.wait().unwrap();
    assert_eq!(response.body(), b"late");
}

#[test]
fn close_is_idempotent_and_final() {
    let transport = Arc::new(MockTransport::ok(200, b"{}"));
    let mut transfer = PoolTransfer::new(state(get("http://example.test/a")), transport, pool(1));

    transfer.wait().unwrap();
    transfer.close();
    transfer.close();

    assert_eq!(transfer.wait().unwrap_err(), Error::Closed);
    assert!(transfer.response().is_none());
    assert_eq!(transfer.phase(), Phase::Closed);
}

#[test]
fn awaited() {
    let transport = Arc::new(MockTransport::ok(200, b"{}"));
    let transfer = PoolTransfer::new(state(get("http://example.test/a")), transport.clone(), pool(1));

    let response = block_on(transfer).unwrap();
    assert_eq!(response.body(), b"{}");
    assert_eq!(transport.calls(), 1);
}

#[test]
fn awaited_chain_sets_guard() {
    let transport = Arc::new(MockTransport::ok(200, b"{}"));
    let transfer = PoolTransfer::new(state(get("http://example.test/a")), transport, pool(1));

    let mut chain = Future::then(transfer, |r: crate::Response| r.body().len());
    let len = block_on(&mut chain).unwrap();

    assert_eq!(len, 2);
    assert!(chain.callback_started());
    assert!(!chain.cancel());
}

#[test]
fn concurrent_transfers() {
    let transport = Arc::new(MockTransport::ok(200, b"{}"));
    let pool = pool(4);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let transport = transport.clone();
            let pool = pool.clone();
            thread::spawn(move || {
                let url = format!("http://example.test/{}", i);
                let mut transfer = PoolTransfer::new(state(get(&url)), transport, pool);
                transfer.wait().unwrap().status()
            })
        })
        .collect();

    for h in handles {
        assert_eq!(h.join().unwrap(), StatusCode::OK);
    }
    assert_eq!(transport.calls(), 8);
}
