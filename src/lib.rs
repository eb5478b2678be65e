//! Portable HTTP transfer futures.
//!
//! because lets request/response/callback logic be written once and run
//! unmodified whether the exchange happens inline on the calling thread, on a
//! background worker pool, or under a single threaded cooperative reactor such as
//! a GUI main loop.
//!
//! # Futures
//!
//! Every pending value implements the small [`Future`] contract:
//!
//! * **start** - cue background progress, never blocks.
//! * **wait** - block until the value is ready.
//! * **cancel** - best effort, `true` only if pending work was stopped.
//! * **close** - release resources, idempotent.
//!
//! [`Present`] is a value that is already there. [`Then`] applies a callback to
//! the value of a source future, and chains are built by nesting them:
//!
//! ```
//! use because::{Future, Present};
//!
//! let mut parsed = Present::new("{}")
//!     .then(|body| body.len())
//!     .then(|len| len * 2);
//!
//! assert_eq!(parsed.wait().unwrap(), 4);
//! ```
//!
//! # Transfers
//!
//! A [`Client`] turns a [`Request`] into a started [`Transfer`], a future whose
//! value is the [`Response`]. What kind of transfer depends on the client's
//! [`Backend`]:
//!
//! * [`Client::blocking`] - exchange inline in `wait()`.
//! * [`Client::pool`] - exchange on a [`pool::WorkerPool`], started by `start()`.
//! * [`Client::reactor`] - exchange issued through a [`reactor::Reactor`], results
//!   delivered as signals.
//!
//! ```no_run
//! use because::{Client, ClientConfig, Future, Transfer};
//!
//! let client = Client::pool(ClientConfig::default())?;
//!
//! let request = because::http::Request::get("http://example.test/a")
//!     .body(vec![])
//!     .unwrap();
//!
//! let mut transfer = client
//!     .send(request)?
//!     .then(|response| response.into_body());
//!
//! let body = transfer.wait()?;
//! println!("{} bytes in {:?}", body.len(), transfer.source().duration());
//! # Ok::<_, because::Error>(())
//! ```
//!
//! # Errors
//!
//! Failing to complete an exchange is [`Error::Transfer`] carrying a
//! [`TransferError`]. An HTTP error status is not an error, it's a normal
//! `Response`. Cancellation is not an error either, it's the boolean of
//! [`Future::cancel`].
//!
//! # Logging
//!
//! All logging goes through the [`log`](https://docs.rs/log) crate. Transfers log
//! under their client's [`ClientConfig::log_target`].

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![deny(missing_docs)]

#[macro_use]
extern crate log;

mod error;
mod future;
mod message;

pub mod client;
pub mod pool;
pub mod reactor;
pub mod tls;
pub mod transfer;
pub mod transport;

pub use client::{Backend, Client, ClientConfig};
pub use error::{Error, TransferError};
pub use future::{scoped, Future, Present, Then};
pub use message::{Request, Response};
pub use transfer::Transfer;

pub use http;
