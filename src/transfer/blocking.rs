use std::sync::Arc;

use crate::message::check_target;
use crate::transport::{Exchange, Transport};
use crate::{Error, Future, Response};

use super::{Phase, Transfer, TransferState};

/// A transfer that performs the whole exchange inside `wait()`.
///
/// There is nothing running in the background, so `start()` only checks the
/// request and records the time, and `cancel()` always returns `false`. The first
/// `wait()` does the exchange, later ones return the same outcome.
pub struct BlockingTransfer {
    state: TransferState,
    transport: Arc<dyn Transport>,
}

impl BlockingTransfer {
    /// Transfer for the given state, exchanged over `transport`.
    pub fn new(state: TransferState, transport: Arc<dyn Transport>) -> Self {
        BlockingTransfer { state, transport }
    }
}

impl Future for BlockingTransfer {
    type Output = Response;

    fn start(&mut self) -> Result<(), Error> {
        if self.state.phase() != Phase::NotStarted {
            return Ok(());
        }

        check_target(self.state.request())?;
        self.state.mark_started();
        Ok(())
    }

    fn wait(&mut self) -> Result<Response, Error> {
        match self.state.phase() {
            Phase::Closed | Phase::Terminal => return self.state.outcome(),
            Phase::NotStarted | Phase::InFlight => {}
        }

        // Never started if the request is unusable, there is no time to stop.
        self.start()?;

        let request = self.state.request().clone();
        let tls = self.state.tls().clone();

        debug!(target: self.state.log_target(), "Exchange inline");

        match self.transport.exchange(Exchange::new(&request, &tls)) {
            Ok(response) => self.state.complete(response),
            Err(error) => self.state.fail(error),
        }

        self.state.mark_stopped();
        self.state.outcome()
    }

    fn cancel(&mut self) -> bool {
        self.state.mark_stopped();
        false
    }

    fn close(&mut self) {
        self.cancel();
        self.state.close();
    }
}

impl Transfer for BlockingTransfer {
    fn inspect<R>(&self, f: impl FnOnce(&TransferState) -> R) -> R {
        f(&self.state)
    }
}

impl std::fmt::Debug for BlockingTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingTransfer")
            .field("state", &self.state)
            .finish()
    }
}
