//! HTTP transfers
//!
//! A transfer is a [`Future`] for one request/response exchange. Every backend
//! keeps the same per-transfer bookkeeping in a [`TransferState`] and moves it
//! through the same lifecycle:
//!
//! ```text
//!  NotStarted --start()--> InFlight --completion--> Terminal --close()--> Closed
//! ```
//!
//! In `Terminal` at most one of response and error is set. Neither is set when
//! the transfer was cancelled, in which case [`Transfer::timed_out`] tells whether
//! that was done by the deadline timer.
//!
//! The backends differ in where the exchange runs:
//!
//! * [`BlockingTransfer`] runs it inline in `wait()`.
//! * [`PoolTransfer`] submits it to a worker pool in `start()`.
//! * [`ReactorTransfer`] issues it through a reactor's connection manager and
//!   reports back with signals.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::tls::TlsConfig;
use crate::{Error, Future, Request, Response, TransferError};

mod blocking;
mod pool;
mod reactor;

pub use blocking::BlockingTransfer;
pub use pool::PoolTransfer;
pub use reactor::{ReactorTransfer, TransferSignals};

#[cfg(test)]
pub(crate) mod test;

/// Lifecycle phase of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, not yet started.
    NotStarted,
    /// Started, no outcome yet.
    InFlight,
    /// Ended with a response, an error, or cancellation.
    Terminal,
    /// Closed and permanently unusable.
    Closed,
}

/// Bookkeeping shared by every transfer backend.
///
/// Owns the request, a shared read-only TLS configuration, and the outcome and
/// timing of the exchange.
#[derive(Debug)]
pub struct TransferState {
    request: Arc<Request>,
    tls: Arc<TlsConfig>,
    log_target: &'static str,
    phase: Phase,
    response: Option<Response>,
    error: Option<TransferError>,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    timed_out: bool,
}

impl TransferState {
    /// State for a transfer that is not started.
    pub fn new(request: Request, tls: Arc<TlsConfig>, log_target: &'static str) -> Self {
        TransferState {
            request: Arc::new(request),
            tls,
            log_target,
            phase: Phase::NotStarted,
            response: None,
            error: None,
            started_at: None,
            stopped_at: None,
            timed_out: false,
        }
    }

    /// The request being transferred.
    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    /// TLS configuration for the exchange.
    pub fn tls(&self) -> &Arc<TlsConfig> {
        &self.tls
    }

    /// Target for log records of this transfer.
    pub fn log_target(&self) -> &'static str {
        self.log_target
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Response, once the exchange succeeded.
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Error, once the exchange failed.
    pub fn error(&self) -> Option<&TransferError> {
        self.error.as_ref()
    }

    /// Tell if the deadline timer cancelled the transfer.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Time between start and stop, or start and now if not stopped.
    ///
    /// Zero if never started.
    pub fn duration(&self) -> Duration {
        let Some(started_at) = self.started_at else {
            return Duration::ZERO;
        };
        let until = self.stopped_at.unwrap_or_else(Instant::now);
        until.saturating_duration_since(started_at)
    }

    /// Record the start. Returns `true` the first time, when the transfer goes
    /// in flight.
    pub fn mark_started(&mut self) -> bool {
        if self.phase != Phase::NotStarted {
            return false;
        }
        self.started_at = Some(Instant::now());
        self.phase = Phase::InFlight;
        debug!(target: self.log_target, "Start {} {}", self.request.method(), self.request.uri());
        true
    }

    /// Record the stop. Only the first stop after starting counts.
    pub fn mark_stopped(&mut self) {
        if self.started_at.is_some() && self.stopped_at.is_none() {
            self.stopped_at = Some(Instant::now());
        }
    }

    /// Enter the terminal phase with a response.
    pub fn complete(&mut self, response: Response) {
        if self.phase != Phase::InFlight {
            return;
        }
        debug!(
            target: self.log_target,
            "Response {} for {}",
            response.status(),
            self.request.uri()
        );
        self.mark_stopped();
        self.response = Some(response);
        self.error = None;
        self.phase = Phase::Terminal;
    }

    /// Enter the terminal phase with an error.
    pub fn fail(&mut self, error: TransferError) {
        if self.phase != Phase::InFlight {
            return;
        }
        debug!(target: self.log_target, "Failed {}: {}", self.request.uri(), error);
        self.mark_stopped();
        self.response = None;
        self.error = Some(error);
        self.phase = Phase::Terminal;
    }

    /// Enter the terminal phase without an outcome.
    pub fn mark_cancelled(&mut self) {
        if self.phase != Phase::InFlight {
            return;
        }
        debug!(target: self.log_target, "Cancelled {}", self.request.uri());
        self.mark_stopped();
        self.phase = Phase::Terminal;
    }

    /// Flag that the deadline timer fired.
    pub fn set_timed_out(&mut self) {
        self.timed_out = true;
    }

    /// What `wait()` hands out in the current phase.
    pub fn outcome(&self) -> Result<Response, Error> {
        if self.phase == Phase::Closed {
            return Err(Error::Closed);
        }
        if let Some(response) = &self.response {
            return Ok(response.clone());
        }
        if let Some(error) = &self.error {
            return Err(Error::Transfer(error.clone()));
        }
        if self.timed_out {
            return Err(Error::TimedOut);
        }
        Err(Error::Cancelled)
    }

    /// Enter the closed phase, dropping the outcome.
    pub fn close(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        trace!(target: self.log_target, "Close {}", self.request.uri());
        self.mark_stopped();
        self.response = None;
        self.error = None;
        self.phase = Phase::Closed;
    }
}

/// A [`Future`] for one HTTP exchange.
///
/// `wait()` yields the [`Response`], whatever its status. Failure to complete the
/// exchange is [`Error::Transfer`].
pub trait Transfer: Future<Output = Response> {
    /// Look at the bookkeeping of this transfer.
    fn inspect<R>(&self, f: impl FnOnce(&TransferState) -> R) -> R;

    /// The request being transferred.
    fn request(&self) -> Arc<Request> {
        self.inspect(|s| s.request().clone())
    }

    /// Response, once the exchange succeeded.
    fn response(&self) -> Option<Response> {
        self.inspect(|s| s.response().cloned())
    }

    /// Error, once the exchange failed.
    fn error(&self) -> Option<TransferError> {
        self.inspect(|s| s.error().cloned())
    }

    /// Tell if the deadline timer cancelled the transfer.
    fn timed_out(&self) -> bool {
        self.inspect(|s| s.timed_out())
    }

    /// Time between start and stop, or start and now if still running.
    fn duration(&self) -> Duration {
        self.inspect(|s| s.duration())
    }

    /// Current lifecycle phase.
    fn phase(&self) -> Phase {
        self.inspect(|s| s.phase())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use http::{HeaderMap, StatusCode};

    use super::*;

    fn state() -> TransferState {
        let req = http::Request::get("http://example.test/a")
            .body(vec![])
            .unwrap();
        TransferState::new(req, Arc::new(TlsConfig::default()), "because")
    }

    #[test]
    fn duration_zero_until_started() {
        let mut s = state();
        assert_eq!(s.duration(), Duration::ZERO);
        s.mark_stopped();
        assert_eq!(s.duration(), Duration::ZERO);
    }

    #[test]
    fn duration_grows_while_running() {
        let mut s = state();
        assert!(s.mark_started());
        let a = s.duration();
        thread::sleep(Duration::from_millis(2));
        let b = s.duration();
        assert!(b >= a);
        assert!(b > Duration::ZERO);
    }

    #[test]
    fn duration_frozen_once_stopped() {
        let mut s = state();
        s.mark_started();
        thread::sleep(Duration::from_millis(1));
        s.mark_stopped();
        let a = s.duration();
        thread::sleep(Duration::from_millis(2));
        s.mark_stopped();
        assert_eq!(s.duration(), a);
    }

    #[test]
    fn mark_started_once() {
        let mut s = state();
        assert!(s.mark_started());
        assert!(!s.mark_started());
        assert_eq!(s.phase(), Phase::InFlight);
    }

    #[test]
    fn response_xor_error() {
        let mut s = state();
        s.mark_started();
        s.complete(Response::new(StatusCode::OK, HeaderMap::new(), vec![]));
        s.fail(TransferError::new("late"));
        assert!(s.response().is_some());
        assert!(s.error().is_none());
        assert_eq!(s.phase(), Phase::Terminal);
    }

    #[test]
    fn outcome_before_completion_needs_flight() {
        let mut s = state();
        // Nothing can complete a transfer that is not in flight.
        s.complete(Response::new(StatusCode::OK, HeaderMap::new(), vec![]));
        assert!(s.response().is_none());
        assert_eq!(s.phase(), Phase::NotStarted);
    }

    #[test]
    fn cancelled_outcome() {
        let mut s = state();
        s.mark_started();
        s.mark_cancelled();
        assert_eq!(s.outcome(), Err(Error::Cancelled));

        s.set_timed_out();
        assert_eq!(s.outcome(), Err(Error::TimedOut));
    }

    #[test]
    fn close_drops_outcome() {
        let mut s = state();
        s.mark_started();
        s.fail(TransferError::new("reset").with_code(104));
        assert!(matches!(s.outcome(), Err(Error::Transfer(_))));

        s.close();
        s.close();
        assert_eq!(s.outcome(), Err(Error::Closed));
        assert!(s.error().is_none());
        assert_eq!(s.phase(), Phase::Closed);
    }
}
