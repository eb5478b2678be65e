use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use crate::message::check_target;
use crate::reactor::{ConnectionManager, NativeRequest, Reactor, Reply, Signal, TimerId};
use crate::{Error, Future, Response, TransferError};

use super::{Phase, Transfer, TransferState};

/// Notifications of a [`ReactorTransfer`], emitted on the reactor thread.
///
/// Exactly one of `succeeded` and `failed` is emitted for a transfer that ends
/// with an outcome, always before `finished`. A cancelled transfer only emits
/// `finished`.
#[derive(Debug, Default)]
pub struct TransferSignals {
    /// Request body bytes sent, and the body length.
    pub upload_progress: Signal<(u64, u64)>,
    /// Response body bytes received, and the announced length.
    pub download_progress: Signal<(u64, Option<u64>)>,
    /// A response is available.
    pub succeeded: Signal<Response>,
    /// No response is available because the exchange failed.
    pub failed: Signal<TransferError>,
    /// The transfer ended, for whatever reason.
    pub finished: Signal<()>,
}

impl TransferSignals {
    fn disconnect_all(&self) {
        self.upload_progress.disconnect_all();
        self.download_progress.disconnect_all();
        self.succeeded.disconnect_all();
        self.failed.disconnect_all();
        self.finished.disconnect_all();
    }
}

/// A transfer issued through a reactor's [`ConnectionManager`].
///
/// Meant to be driven by the reactor: connect to [`ReactorTransfer::signals`]
/// and let the loop run. `wait()` pumps the reactor until the transfer finished,
/// which blocks the reactor thread and should be avoided where that thread has
/// other duties.
///
/// When a timeout is set, a timer started along with the request cancels it and
/// flags [`Transfer::timed_out`] unless it finishes first.
///
/// Confined to the reactor thread.
pub struct ReactorTransfer {
    shared: Rc<RefCell<Shared>>,
    signals: Rc<TransferSignals>,
    manager: ConnectionManager,
}

struct Shared {
    state: TransferState,
    reply: Option<Reply>,
    // Backs the body of the in-flight reply, held until close.
    body: Option<Arc<[u8]>>,
    timer: Option<TimerId>,
    timeout: Option<Duration>,
    ran_finish: bool,
}

impl ReactorTransfer {
    /// Transfer for the given state, issued through `manager`.
    pub fn new(state: TransferState, manager: ConnectionManager, timeout: Option<Duration>) -> Self {
        ReactorTransfer {
            shared: Rc::new(RefCell::new(Shared {
                state,
                reply: None,
                body: None,
                timer: None,
                timeout,
                ran_finish: false,
            })),
            signals: Rc::new(TransferSignals::default()),
            manager,
        }
    }

    /// Notifications of this transfer.
    pub fn signals(&self) -> &TransferSignals {
        &self.signals
    }

    /// Tell if the transfer went through its finish handling.
    pub fn is_finished(&self) -> bool {
        self.shared.borrow().ran_finish
    }

    fn reactor(&self) -> &Reactor {
        self.manager.reactor()
    }

    fn connect_reply(&self, reply: &Reply) {
        let signals = Rc::downgrade(&self.signals);
        reply.upload_progress().connect(move |v| {
            if let Some(s) = signals.upgrade() {
                s.upload_progress.emit(v);
            }
        });

        let signals = Rc::downgrade(&self.signals);
        reply.download_progress().connect(move |v| {
            if let Some(s) = signals.upgrade() {
                s.download_progress.emit(v);
            }
        });

        let shared = Rc::downgrade(&self.shared);
        let signals = Rc::downgrade(&self.signals);
        reply.error().connect(move |e| on_error(&shared, &signals, e));

        let shared = Rc::downgrade(&self.shared);
        let signals = Rc::downgrade(&self.signals);
        let reactor = self.reactor().clone();
        reply
            .finished()
            .connect(move |_| on_finished(&shared, &signals, &reactor));
    }
}

fn on_error(shared: &Weak<RefCell<Shared>>, signals: &Weak<TransferSignals>, error: &TransferError) {
    let (Some(shared), Some(signals)) = (shared.upgrade(), signals.upgrade()) else {
        return;
    };

    {
        let mut s = shared.borrow_mut();
        if s.ran_finish || s.state.error().is_some() {
            return;
        }
        s.state.fail(error.clone());
    }

    signals.failed.emit(error);
}

fn on_finished(shared: &Weak<RefCell<Shared>>, signals: &Weak<TransferSignals>, reactor: &Reactor) {
    let (Some(shared), Some(signals)) = (shared.upgrade(), signals.upgrade()) else {
        return;
    };

    let outcome = {
        let mut s = shared.borrow_mut();

        if let Some(timer) = s.timer.take() {
            reactor.stop_timer(timer);
        }

        if s.ran_finish {
            return;
        }
        s.ran_finish = true;

        if s.state.error().is_some() {
            // Already reported as failed.
            None
        } else {
            let taken = s.reply.as_ref().and_then(|r| r.take_outcome());
            match taken {
                Some(Ok(response)) => {
                    s.state.complete(response.clone());
                    Some(Ok(response))
                }
                Some(Err(error)) => {
                    s.state.fail(error.clone());
                    Some(Err(error))
                }
                None => {
                    s.state.mark_cancelled();
                    None
                }
            }
        }
    };

    match outcome {
        Some(Ok(response)) => signals.succeeded.emit(&response),
        Some(Err(error)) => signals.failed.emit(&error),
        None => {}
    }

    signals.finished.emit(&());
}

fn on_timeout(shared: &Weak<RefCell<Shared>>, reactor: &Reactor) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    let mut s = shared.borrow_mut();
    // The timer fired, so it's no longer running.
    s.timer = None;
    s.state.set_timed_out();
    debug!(target: s.state.log_target(), "Timed out");
    cancel_shared(&mut s, reactor);
}

fn cancel_shared(s: &mut Shared, reactor: &Reactor) -> bool {
    if let Some(timer) = s.timer.take() {
        reactor.stop_timer(timer);
    }

    s.state.mark_stopped();

    match &s.reply {
        Some(reply) if reply.is_running() => {
            // finished follows on the next pass, teardown is left to close().
            reply.abort();
            true
        }
        _ => false,
    }
}

impl Future for ReactorTransfer {
    type Output = Response;

    fn start(&mut self) -> Result<(), Error> {
        let reply = {
            let mut s = self.shared.borrow_mut();

            if s.state.phase() != Phase::NotStarted {
                return Ok(());
            }

            check_target(s.state.request())?;

            let native = NativeRequest::pack(s.state.request());
            let body = native.body().clone();

            let reply = self.manager.send(native, s.state.tls().clone())?;

            s.body = Some(body);
            s.state.mark_started();

            if let Some(timeout) = s.timeout {
                let shared = Rc::downgrade(&self.shared);
                let reactor = self.reactor().clone();
                let id = self
                    .reactor()
                    .start_timer(timeout, move || on_timeout(&shared, &reactor));
                s.timer = Some(id);
            }

            s.reply = Some(reply.clone());
            reply
        };

        // Signals are delivered by the reactor, nothing fires before this returns.
        self.connect_reply(&reply);

        Ok(())
    }

    fn wait(&mut self) -> Result<Response, Error> {
        if self.shared.borrow().state.phase() == Phase::Closed {
            return Err(Error::Closed);
        }

        self.start()?;

        let shared = self.shared.clone();
        if !self.reactor().run_until(|| shared.borrow().ran_finish) {
            let target = self.shared.borrow().state.log_target();
            warn!(target: target, "Reactor went idle before the transfer finished");
        }

        let mut s = self.shared.borrow_mut();
        s.state.mark_stopped();
        s.state.outcome()
    }

    fn cancel(&mut self) -> bool {
        let mut s = self.shared.borrow_mut();
        cancel_shared(&mut s, self.manager.reactor())
    }

    fn close(&mut self) {
        self.cancel();

        let reply = {
            let mut s = self.shared.borrow_mut();
            if s.state.phase() == Phase::Closed {
                return;
            }

            s.body = None;
            s.timer = None;
            s.state.close();
            s.reply.take()
        };

        if let Some(reply) = reply {
            reply.close();
        }

        self.signals.disconnect_all();
    }
}

impl Transfer for ReactorTransfer {
    fn inspect<R>(&self, f: impl FnOnce(&TransferState) -> R) -> R {
        f(&self.shared.borrow().state)
    }
}

impl fmt::Debug for ReactorTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.shared.borrow();
        f.debug_struct("ReactorTransfer")
            .field("state", &s.state)
            .field("reply", &s.reply)
            .field("ran_finish", &s.ran_finish)
            .finish()
    }
}
