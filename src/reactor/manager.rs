use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use http::{HeaderMap, Method, Uri};

use crate::pool::{JobHandle, WorkerPool};
use crate::tls::TlsConfig;
use crate::transport::{Exchange, Progress, Transport};
use crate::{Error, Request, Response, TransferError};

use super::{EventSource, Notifier, Reactor, Signal};

/// A request in the shape the manager sends it.
///
/// The body is a shared buffer. Whoever issues the request must keep its own
/// reference alive for as long as the reply exists.
#[derive(Debug, Clone)]
pub struct NativeRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Arc<[u8]>,
}

impl NativeRequest {
    /// Pack a request, copying its body into a shared buffer.
    pub fn pack(request: &Request) -> Self {
        NativeRequest {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            body: Arc::from(request.body().as_slice()),
        }
    }

    /// The shared body buffer.
    pub fn body(&self) -> &Arc<[u8]> {
        &self.body
    }
}

enum ReplyEvent {
    Progress(Progress),
    Finished(Result<Response, TransferError>),
}

/// Dispatches requests on behalf of a [`Reactor`].
///
/// Exchanges run on a worker pool. Their progress and completion are queued and
/// delivered as [`Reply`] signals on the reactor thread, the next time the
/// reactor processes events. The manager is confined to the reactor thread.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Rc<ManagerInner>,
}

struct ManagerInner {
    reactor: Reactor,
    notifier: Notifier,
    transport: Arc<dyn Transport>,
    pool: Arc<WorkerPool>,
    sender: Sender<(u64, ReplyEvent)>,
    receiver: Receiver<(u64, ReplyEvent)>,
    replies: RefCell<HashMap<u64, Rc<ReplyInner>>>,
    next_id: Cell<u64>,
}

impl ConnectionManager {
    /// Create a manager and register it with the reactor.
    pub fn new(reactor: &Reactor, transport: Arc<dyn Transport>, pool: Arc<WorkerPool>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();

        let inner = Rc::new(ManagerInner {
            reactor: reactor.clone(),
            notifier: reactor.notifier(),
            transport,
            pool,
            sender,
            receiver,
            replies: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        });

        let weak: Weak<ManagerInner> = Rc::downgrade(&inner);
        reactor.register(weak);

        ConnectionManager { inner }
    }

    /// The reactor delivering this manager's signals.
    pub fn reactor(&self) -> &Reactor {
        &self.inner.reactor
    }

    /// Number of replies still running.
    pub fn in_flight(&self) -> usize {
        self.inner.replies.borrow().len()
    }

    /// Issue a request and get the handle of the in-flight reply.
    pub fn send(&self, request: NativeRequest, tls: Arc<TlsConfig>) -> Result<Reply, Error> {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let aborted = Arc::new(AtomicBool::new(false));

        let job = {
            let transport = self.inner.transport.clone();
            let aborted = aborted.clone();
            let delivery = Delivery {
                id,
                sender: self.inner.sender.clone(),
                notifier: self.inner.notifier.clone(),
                finished: false,
            };

            self.inner.pool.submit(move || {
                let on_progress = |p: Progress| {
                    if !aborted.load(Ordering::Acquire) {
                        delivery.send(ReplyEvent::Progress(p));
                    }
                };

                let exchange = Exchange::from_parts(
                    &request.method,
                    &request.uri,
                    &request.headers,
                    &request.body,
                    &tls,
                )
                .with_progress(&on_progress);

                let outcome = transport.exchange(exchange);
                delivery.finish(outcome);
            })?
        };

        let inner = Rc::new(ReplyInner {
            id,
            state: Cell::new(ReplyState::Running),
            aborted,
            job,
            outcome: RefCell::new(None),
            reactor: self.inner.reactor.clone(),
            manager: Rc::downgrade(&self.inner),
            upload_progress: Signal::new(),
            download_progress: Signal::new(),
            error: Signal::new(),
            finished: Signal::new(),
        });

        self.inner.replies.borrow_mut().insert(id, inner.clone());

        debug!("Reply {} issued", id);

        Ok(Reply { inner })
    }
}

/// Sends the events of one exchange back to the manager.
///
/// A job that ends without an outcome, by panicking or by being dropped unrun,
/// still delivers `Finished` with an error.
struct Delivery {
    id: u64,
    sender: Sender<(u64, ReplyEvent)>,
    notifier: Notifier,
    finished: bool,
}

impl Delivery {
    fn send(&self, event: ReplyEvent) {
        // The manager may be gone, then nobody is listening.
        if self.sender.send((self.id, event)).is_ok() {
            self.notifier.notify();
        }
    }

    fn finish(mut self, outcome: Result<Response, TransferError>) {
        self.finished = true;
        self.send(ReplyEvent::Finished(outcome));
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        debug!("Reply {} lost its exchange", self.id);
        self.send(ReplyEvent::Finished(Err(TransferError::new(
            "worker dropped the exchange",
        ))));
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl EventSource for ManagerInner {
    fn dispatch(&self) -> bool {
        let mut delivered = false;

        while let Ok((id, event)) = self.receiver.try_recv() {
            // Release the table before emitting, slots may issue new requests.
            let reply = self.replies.borrow().get(&id).cloned();

            let Some(reply) = reply else {
                trace!("Drop event for reply {} that is no longer running", id);
                continue;
            };

            delivered = true;

            match event {
                ReplyEvent::Progress(Progress::Upload { sent, total }) => {
                    reply.upload_progress.emit(&(sent, total));
                }
                ReplyEvent::Progress(Progress::Download { received, total }) => {
                    reply.download_progress.emit(&(received, total));
                }
                ReplyEvent::Finished(outcome) => {
                    self.replies.borrow_mut().remove(&id);
                    reply.finish(outcome);
                }
            }
        }

        delivered
    }

    fn has_pending(&self) -> bool {
        !self.replies.borrow().is_empty()
    }
}

// //////////////////////////////////////////////////////////////////////////////////////////// REPLY

/// Where a [`Reply`] is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyState {
    /// The exchange is ongoing.
    Running,
    /// The exchange ended, with a response or an error.
    Finished,
    /// Aborted before it ended.
    Aborted,
    /// Closed, nothing can be read from it anymore.
    Closed,
}

/// Handle to one in-flight exchange of a [`ConnectionManager`].
///
/// Signals are emitted on the reactor thread. `error` always precedes `finished`
/// when the exchange failed. An aborted reply emits only `finished`.
#[derive(Clone)]
pub struct Reply {
    inner: Rc<ReplyInner>,
}

struct ReplyInner {
    id: u64,
    state: Cell<ReplyState>,
    aborted: Arc<AtomicBool>,
    job: JobHandle,
    outcome: RefCell<Option<Result<Response, TransferError>>>,
    reactor: Reactor,
    manager: Weak<ManagerInner>,
    upload_progress: Signal<(u64, u64)>,
    download_progress: Signal<(u64, Option<u64>)>,
    error: Signal<TransferError>,
    finished: Signal<()>,
}

impl ReplyInner {
    fn finish(&self, outcome: Result<Response, TransferError>) {
        if self.state.get() != ReplyState::Running {
            return;
        }
        self.state.set(ReplyState::Finished);

        debug!("Reply {} finished, ok: {}", self.id, outcome.is_ok());

        let error = outcome.as_ref().err().cloned();
        *self.outcome.borrow_mut() = Some(outcome);

        if let Some(e) = error {
            self.error.emit(&e);
        }
        self.finished.emit(&());
    }
}

impl Reply {
    /// Reply number, unique within its manager.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current state.
    pub fn state(&self) -> ReplyState {
        self.inner.state.get()
    }

    /// Tell if the exchange is ongoing.
    pub fn is_running(&self) -> bool {
        self.state() == ReplyState::Running
    }

    /// Take the outcome of a finished exchange.
    ///
    /// Returns `None` if the reply isn't finished, or the outcome was already taken.
    pub fn take_outcome(&self) -> Option<Result<Response, TransferError>> {
        self.inner.outcome.borrow_mut().take()
    }

    /// Stop the exchange.
    ///
    /// Progress stops being delivered at once, `finished` is emitted on the next
    /// reactor pass. Does nothing unless the reply is running. An exchange a worker
    /// already began runs to its end on that worker, but its outcome is dropped.
    pub fn abort(&self) {
        if !self.is_running() {
            return;
        }

        self.inner.aborted.store(true, Ordering::Release);
        let dequeued = self.inner.job.cancel();
        self.inner.state.set(ReplyState::Aborted);

        if let Some(manager) = self.inner.manager.upgrade() {
            manager.replies.borrow_mut().remove(&self.inner.id);
        }

        debug!("Reply {} aborted, dequeued: {}", self.inner.id, dequeued);

        let inner = self.inner.clone();
        self.inner.reactor.defer(move || inner.finished.emit(&()));
    }

    /// Abort if running, drop any outcome and disconnect every slot.
    pub fn close(&self) {
        self.abort();
        self.inner.state.set(ReplyState::Closed);
        self.inner.outcome.borrow_mut().take();

        self.inner.upload_progress.disconnect_all();
        self.inner.download_progress.disconnect_all();
        self.inner.error.disconnect_all();
        self.inner.finished.disconnect_all();
    }

    /// Request body bytes sent so far, and the body length.
    pub fn upload_progress(&self) -> &Signal<(u64, u64)> {
        &self.inner.upload_progress
    }

    /// Response body bytes received so far, and the announced length.
    pub fn download_progress(&self) -> &Signal<(u64, Option<u64>)> {
        &self.inner.download_progress
    }

    /// The exchange failed.
    pub fn error(&self) -> &Signal<TransferError> {
        &self.inner.error
    }

    /// The reply ended, for whatever reason.
    pub fn finished(&self) -> &Signal<()> {
        &self.inner.finished
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.get())
            .finish()
    }
}
