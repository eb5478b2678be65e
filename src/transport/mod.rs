//! Exchange logic
//!
//! A [`Transport`] performs one complete request/response exchange, blocking the
//! calling thread. It is the only piece that does network I/O. The transfer
//! backends differ in _where_ they call it: inline in `wait()`, on a worker pool,
//! or on behalf of a reactor.

use std::fmt;

use http::{HeaderMap, Method, Uri};

use crate::tls::TlsConfig;
use crate::{Request, Response, TransferError};

mod agent;

pub use agent::AgentTransport;

/// Something able to carry out an HTTP exchange.
///
/// Implementations must be usable from many threads at once, since the pool and
/// reactor backends share one transport between all their transfers.
pub trait Transport: Send + Sync {
    /// Perform the exchange, blocking until the full response is read.
    ///
    /// Failing to produce a response is a [`TransferError`]. An HTTP error status is
    /// a successful exchange.
    fn exchange(&self, exchange: Exchange<'_>) -> Result<Response, TransferError>;
}

/// Counters reported while an exchange is ongoing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Request bytes written so far, out of the total body length.
    Upload {
        /// Body bytes sent.
        sent: u64,
        /// Body length.
        total: u64,
    },
    /// Response body bytes read so far, and the total if the server announced one.
    Download {
        /// Body bytes received.
        received: u64,
        /// Announced body length.
        total: Option<u64>,
    },
}

/// Borrowed view of everything needed for one exchange.
pub struct Exchange<'a> {
    method: &'a Method,
    uri: &'a Uri,
    headers: &'a HeaderMap,
    body: &'a [u8],
    tls: &'a TlsConfig,
    progress: Option<&'a (dyn Fn(Progress) + 'a)>,
}

impl<'a> Exchange<'a> {
    /// Exchange for a request.
    pub fn new(request: &'a Request, tls: &'a TlsConfig) -> Self {
        Exchange {
            method: request.method(),
            uri: request.uri(),
            headers: request.headers(),
            body: request.body(),
            tls,
            progress: None,
        }
    }

    /// Exchange from separate parts, where the body lives in a different buffer
    /// than the rest of the request.
    pub fn from_parts(
        method: &'a Method,
        uri: &'a Uri,
        headers: &'a HeaderMap,
        body: &'a [u8],
        tls: &'a TlsConfig,
    ) -> Self {
        Exchange {
            method,
            uri,
            headers,
            body,
            tls,
            progress: None,
        }
    }

    /// Observe progress of the exchange.
    pub fn with_progress(mut self, progress: &'a (dyn Fn(Progress) + 'a)) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        self.method
    }

    /// Request target.
    pub fn uri(&self) -> &Uri {
        self.uri
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        self.headers
    }

    /// Request body, empty if there is none.
    pub fn body(&self) -> &[u8] {
        self.body
    }

    /// TLS parameters for `https` targets.
    pub fn tls(&self) -> &TlsConfig {
        self.tls
    }

    /// Report progress to the observer, if there is one.
    pub fn report(&self, progress: Progress) {
        if let Some(f) = self.progress {
            f(progress);
        }
    }
}

impl fmt::Debug for Exchange<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("method", self.method)
            .field("uri", self.uri)
            .field("body_len", &self.body.len())
            .finish()
    }
}
