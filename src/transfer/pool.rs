use std::future::Future as StdFuture;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::message::check_target;
use crate::pool::{JobHandle, WorkerPool};
use crate::transport::{Exchange, Transport};
use crate::{Error, Future, Response, TransferError};

use super::{Phase, Transfer, TransferState};

type Outcome = Result<Response, TransferError>;

/// A transfer whose exchange runs on a [`WorkerPool`].
///
/// `start()` submits the exchange, `wait()` blocks until a worker has done it.
/// `cancel()` only succeeds while the exchange is still queued. Once a worker has
/// begun, the exchange runs to its end and its outcome is delivered.
///
/// The transfer is also a [`std::future::Future`], so it can be awaited instead of
/// waited on.
pub struct PoolTransfer {
    state: TransferState,
    transport: Arc<dyn Transport>,
    pool: Arc<WorkerPool>,
    pending: Option<Pending>,
}

struct Pending {
    job: JobHandle,
    receiver: oneshot::Receiver<Outcome>,
}

impl PoolTransfer {
    /// Transfer for the given state, exchanged over `transport` on `pool`.
    pub fn new(state: TransferState, transport: Arc<dyn Transport>, pool: Arc<WorkerPool>) -> Self {
        PoolTransfer {
            state,
            transport,
            pool,
            pending: None,
        }
    }

    fn settle(&mut self, received: Result<Outcome, oneshot::Canceled>) -> Result<Response, Error> {
        let pending = self.pending.take();

        match received {
            Ok(Ok(response)) => self.state.complete(response),
            Ok(Err(error)) => self.state.fail(error),
            Err(oneshot::Canceled) => {
                let cancelled = pending.map(|p| p.job.is_cancelled()).unwrap_or(false);
                if cancelled {
                    self.state.mark_cancelled();
                } else {
                    // The job ended without sending, i.e. it panicked.
                    self.state
                        .fail(TransferError::new("worker dropped the exchange"));
                }
            }
        }

        self.state.mark_stopped();
        self.state.outcome()
    }
}

impl Future for PoolTransfer {
    type Output = Response;

    fn start(&mut self) -> Result<(), Error> {
        if self.state.phase() != Phase::NotStarted {
            return Ok(());
        }

        check_target(self.state.request())?;

        let (sender, receiver) = oneshot::channel();

        let request = self.state.request().clone();
        let tls = self.state.tls().clone();
        let transport = self.transport.clone();

        let job = self.pool.submit(move || {
            let outcome = transport.exchange(Exchange::new(&request, &tls));
            // The transfer may have been dropped meanwhile.
            let _ = sender.send(outcome);
        })?;

        self.state.mark_started();
        debug!(target: self.state.log_target(), "Submitted to worker pool");

        self.pending = Some(Pending { job, receiver });

        Ok(())
    }

    fn wait(&mut self) -> Result<Response, Error> {
        self.start()?;

        let Some(pending) = self.pending.as_mut() else {
            return self.state.outcome();
        };

        let received = futures::executor::block_on(&mut pending.receiver);
        self.settle(received)
    }

    fn cancel(&mut self) -> bool {
        self.state.mark_stopped();

        let Some(pending) = &self.pending else {
            return false;
        };

        if !pending.job.cancel() {
            trace!(target: self.state.log_target(), "Exchange already begun, can't cancel");
            return false;
        }

        self.pending = None;
        self.state.mark_cancelled();
        true
    }

    fn close(&mut self) {
        self.cancel();
        // A running exchange still finishes on its worker, nobody receives it.
        self.pending = None;
        self.state.close();
    }
}

impl StdFuture for PoolTransfer {
    type Output = Result<Response, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<Response, Error>> {
        let this = self.get_mut();

        if let Err(e) = Future::start(this) {
            return Poll::Ready(Err(e));
        }

        let Some(pending) = this.pending.as_mut() else {
            return Poll::Ready(this.state.outcome());
        };

        match Pin::new(&mut pending.receiver).poll(cx) {
            Poll::Ready(received) => Poll::Ready(this.settle(received)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Transfer for PoolTransfer {
    fn inspect<R>(&self, f: impl FnOnce(&TransferState) -> R) -> R {
        f(&self.state)
    }
}

impl std::fmt::Debug for PoolTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolTransfer")
            .field("state", &self.state)
            .field("pending", &self.pending.as_ref().map(|p| p.job.state()))
            .finish()
    }
}
