//! Client factory
//!
//! A [`Client`] holds a TLS configuration and a backend, and turns requests into
//! started transfers. It keeps no per-request state, one client serves any number
//! of requests.
//!
//! The backend decides what kind of transfer is made. The three provided ones
//! cover blocking, worker pool and reactor dispatch. Any other [`Backend`] can be
//! plugged in with [`Client::with_backend`].

use std::sync::Arc;
use std::time::Duration;

use crate::pool::WorkerPool;
use crate::reactor::{ConnectionManager, Reactor};
use crate::tls::TlsConfig;
use crate::transfer::{BlockingTransfer, PoolTransfer, ReactorTransfer, Transfer, TransferState};
use crate::transport::{AgentTransport, Transport};
use crate::{Error, Future, Request};

/// Settings for building a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// TLS parameters shared by all transfers.
    pub tls: TlsConfig,
    /// Deadline of reactor transfers. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Connect timeout of the HTTP transport.
    pub connect_timeout: Option<Duration>,
    /// Send and receive timeout of the HTTP transport.
    pub io_timeout: Option<Duration>,
    /// Worker threads of the pool and reactor backends.
    pub pool_threads: usize,
    /// Target of the log records of this client's transfers.
    pub log_target: &'static str,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            tls: TlsConfig::default(),
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(30)),
            io_timeout: Some(Duration::from_secs(60)),
            pool_threads: 4,
            log_target: "because",
        }
    }
}

impl ClientConfig {
    fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(AgentTransport::new(
            &self.tls,
            self.connect_timeout,
            self.io_timeout,
        ))
    }
}

/// Makes the transfers of a [`Client`].
pub trait Backend {
    /// The kind of transfer made.
    type Transfer: Transfer;

    /// Make an unstarted transfer for the prepared state.
    fn transfer(&self, state: TransferState) -> Self::Transfer;
}

/// Backend running each exchange inline in `wait()`.
#[derive(Clone)]
pub struct BlockingBackend {
    transport: Arc<dyn Transport>,
}

impl BlockingBackend {
    /// Backend over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        BlockingBackend { transport }
    }
}

impl Backend for BlockingBackend {
    type Transfer = BlockingTransfer;

    fn transfer(&self, state: TransferState) -> BlockingTransfer {
        BlockingTransfer::new(state, self.transport.clone())
    }
}

/// Backend submitting each exchange to a shared worker pool.
#[derive(Clone)]
pub struct PoolBackend {
    transport: Arc<dyn Transport>,
    pool: Arc<WorkerPool>,
}

impl PoolBackend {
    /// Backend over the given transport and pool.
    pub fn new(transport: Arc<dyn Transport>, pool: Arc<WorkerPool>) -> Self {
        PoolBackend { transport, pool }
    }
}

impl Backend for PoolBackend {
    type Transfer = PoolTransfer;

    fn transfer(&self, state: TransferState) -> PoolTransfer {
        PoolTransfer::new(state, self.transport.clone(), self.pool.clone())
    }
}

/// Backend issuing each exchange through a reactor's connection manager.
///
/// Confined to the reactor thread.
#[derive(Clone)]
pub struct ReactorBackend {
    manager: ConnectionManager,
    timeout: Option<Duration>,
}

impl ReactorBackend {
    /// Backend over the given manager, with a deadline for each transfer.
    pub fn new(manager: ConnectionManager, timeout: Option<Duration>) -> Self {
        ReactorBackend { manager, timeout }
    }

    /// The connection manager.
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }
}

impl Backend for ReactorBackend {
    type Transfer = ReactorTransfer;

    fn transfer(&self, state: TransferState) -> ReactorTransfer {
        ReactorTransfer::new(state, self.manager.clone(), self.timeout)
    }
}

/// Makes HTTP transfers according to a fixed policy.
///
/// ```no_run
/// use because::{Client, ClientConfig, Future};
///
/// let client = Client::blocking(ClientConfig::default());
///
/// let request = because::http::Request::get("http://example.test/a")
///     .body(vec![])
///     .unwrap();
///
/// let mut transfer = client.send(request).unwrap();
/// let response = transfer.wait().unwrap();
/// println!("{}", response.status());
/// ```
pub struct Client<B> {
    backend: B,
    tls: Arc<TlsConfig>,
    log_target: &'static str,
}

impl Client<BlockingBackend> {
    /// Client whose transfers run inline in `wait()`.
    pub fn blocking(config: ClientConfig) -> Self {
        let backend = BlockingBackend::new(config.transport());
        Client::with_backend(backend, config)
    }
}

impl Client<PoolBackend> {
    /// Client whose transfers run on a worker pool.
    pub fn pool(config: ClientConfig) -> Result<Self, Error> {
        let pool = Arc::new(WorkerPool::new(config.pool_threads)?);
        let backend = PoolBackend::new(config.transport(), pool);
        Ok(Client::with_backend(backend, config))
    }
}

impl Client<ReactorBackend> {
    /// Client whose transfers are driven by `reactor`.
    pub fn reactor(reactor: &Reactor, config: ClientConfig) -> Result<Self, Error> {
        let pool = Arc::new(WorkerPool::new(config.pool_threads)?);
        let manager = ConnectionManager::new(reactor, config.transport(), pool);
        let backend = ReactorBackend::new(manager, config.timeout);
        Ok(Client::with_backend(backend, config))
    }
}

impl<B: Backend> Client<B> {
    /// Client over any backend.
    pub fn with_backend(backend: B, config: ClientConfig) -> Self {
        Client {
            backend,
            tls: Arc::new(config.tls),
            log_target: config.log_target,
        }
    }

    /// The backend making transfers.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// TLS parameters shared by all transfers.
    pub fn tls(&self) -> &TlsConfig {
        &self.tls
    }

    /// Make a transfer for the request without starting it.
    pub fn transfer(&self, request: Request) -> B::Transfer {
        let state = TransferState::new(request, self.tls.clone(), self.log_target);
        self.backend.transfer(state)
    }

    /// Make a transfer for the request and start it.
    ///
    /// Doesn't wait for the exchange. Fails only if the transfer can't be
    /// dispatched at all.
    pub fn send(&self, request: Request) -> Result<B::Transfer, Error> {
        let mut transfer = self.transfer(request);
        transfer.start()?;
        Ok(transfer)
    }
}

impl<B> std::fmt::Debug for Client<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("backend", &std::any::type_name::<B>())
            .field("log_target", &self.log_target)
            .finish()
    }
}
