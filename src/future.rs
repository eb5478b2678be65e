//! Portable futures
//!
//! The [`Future`] trait is the one contract shared by every kind of pending work in
//! this crate, whether it is computed on the caller's thread, on a worker pool or
//! by a single threaded reactor. It is deliberately smaller than
//! [`std::future::Future`]: four calls, no wakers.
//!
//! * **start** - cue that background progress is wanted. Never blocks, idempotent.
//! * **wait** - block until the value is ready and return it.
//! * **cancel** - best effort, `true` only if pending work was actually stopped.
//! * **close** - release resources. Idempotent, never fails.
//!
//! Call chains such as "send, then parse, then cache" are built by nesting
//! [`Then`], each wrapping the previous one as its source:
//!
//! ```
//! use because::{Future, Present};
//!
//! let mut chain = Present::new(5)
//!     .then(|v| v * 2)
//!     .then(|v| v.to_string());
//!
//! assert_eq!(chain.wait().unwrap(), "10");
//! assert!(!chain.cancel());
//! ```
//!
//! Where a suspension based caller is available, [`Present`] and [`Then`] also
//! implement [`std::future::Future`] with the same semantics.

use std::future::Future as StdFuture;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::Error;

/// Capability set of all pending values in this crate.
pub trait Future {
    /// The value produced by [`Future::wait`].
    type Output;

    /// Cue that the caller would like progress to be made in the background.
    ///
    /// Returns immediately. Calling it repeatedly is harmless. Futures that can't
    /// make background progress do nothing. Errors that prevent the work from being
    /// dispatched at all are returned from here.
    fn start(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Block until the value is ready, then return it.
    fn wait(&mut self) -> Result<Self::Output, Error>;

    /// Attempt to stop pending work.
    ///
    /// Returns `true` only if something was actually stopped. Not being able to
    /// cancel is never an error.
    fn cancel(&mut self) -> bool {
        false
    }

    /// Release resources held by the future.
    ///
    /// Not guaranteed to be called, see [`scoped`] for deterministic cleanup.
    fn close(&mut self) {}

    /// Chain a callback that is applied once to the value of this future.
    fn then<C, T>(self, callback: C) -> Then<Self, C>
    where
        Self: Sized,
        C: FnOnce(Self::Output) -> T,
    {
        Then::new(self, callback)
    }
}

impl<F: Future + ?Sized> Future for Box<F> {
    type Output = F::Output;

    fn start(&mut self) -> Result<(), Error> {
        (**self).start()
    }

    fn wait(&mut self) -> Result<F::Output, Error> {
        (**self).wait()
    }

    fn cancel(&mut self) -> bool {
        (**self).cancel()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Use a future within a bounded scope.
///
/// The future is waited on entry, the value handed to `body`, and the future is
/// closed on every way out of the scope, including when `wait` fails or `body`
/// panics.
pub fn scoped<F, R>(future: F, body: impl FnOnce(F::Output) -> R) -> Result<R, Error>
where
    F: Future,
{
    let mut guard = CloseGuard(future);
    let value = guard.0.wait()?;
    Ok(body(value))
}

struct CloseGuard<F: Future>(F);

impl<F: Future> Drop for CloseGuard<F> {
    fn drop(&mut self) {
        self.0.close();
    }
}

// //////////////////////////////////////////////////////////////////////////////////////////// PRESENT

/// A future whose value already exists.
///
/// It's a present, all you have to do is unwrap it.
///
/// `wait()` can be called any number of times and hands out a clone each time,
/// hence the `T: Clone` bound of the [`Future`] impl. Wrap values that are
/// expensive to clone in an `Arc`, or take the value once with
/// [`Present::into_inner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Present<T> {
    value: T,
}

impl<T> Present<T> {
    /// Wrap a value.
    pub fn new(value: T) -> Self {
        Present { value }
    }

    /// Unwrap without going through the future contract.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Clone> Future for Present<T> {
    type Output = T;

    fn wait(&mut self) -> Result<T, Error> {
        Ok(self.value.clone())
    }
}

impl<T: Clone + Unpin> StdFuture for Present<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<T, Error>> {
        Poll::Ready(Ok(self.value.clone()))
    }
}

// //////////////////////////////////////////////////////////////////////////////////////////// THEN

/// A future that waits for a source future, then applies a callback to its value.
///
/// The callback runs at most once. Once it has begun, [`Future::cancel`] returns
/// `false` regardless of what the source would report, since the caller of `wait()`
/// is going to receive its value.
pub struct Then<F, C> {
    source: F,
    callback: Option<C>,
    running_callback: bool,
}

impl<F, C> Then<F, C> {
    /// Compose a source future with a single argument callback.
    pub fn new(source: F, callback: C) -> Self {
        Then {
            source,
            callback: Some(callback),
            running_callback: false,
        }
    }

    /// Tell if the callback has begun executing.
    pub fn callback_started(&self) -> bool {
        self.running_callback
    }

    /// The wrapped source future.
    pub fn source(&self) -> &F {
        &self.source
    }
}

impl<F, C, T> Future for Then<F, C>
where
    F: Future,
    C: FnOnce(F::Output) -> T,
{
    type Output = T;

    fn start(&mut self) -> Result<(), Error> {
        self.source.start()
    }

    fn wait(&mut self) -> Result<T, Error> {
        if self.callback.is_none() {
            return Err(Error::Consumed);
        }

        let value = self.source.wait()?;

        let Some(callback) = self.callback.take() else {
            return Err(Error::Consumed);
        };

        self.running_callback = true;
        Ok(callback(value))
    }

    fn cancel(&mut self) -> bool {
        // The caller of wait() still gets its value, so there is nothing to cancel.
        if self.running_callback {
            return false;
        }
        self.source.cancel()
    }

    fn close(&mut self) {
        self.source.close()
    }
}

impl<F, C, S, T> StdFuture for Then<F, C>
where
    F: StdFuture<Output = Result<S, Error>> + Unpin,
    C: FnOnce(S) -> T + Unpin,
{
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T, Error>> {
        let this = self.get_mut();

        if this.callback.is_none() {
            return Poll::Ready(Err(Error::Consumed));
        }

        let value = match Pin::new(&mut this.source).poll(cx) {
            Poll::Ready(Ok(v)) => v,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        };

        let Some(callback) = this.callback.take() else {
            return Poll::Ready(Err(Error::Consumed));
        };

        this.running_callback = true;
        Poll::Ready(Ok(callback(value)))
    }
}

impl<F, C> std::fmt::Debug for Then<F, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Then")
            .field("running_callback", &self.running_callback)
            .field("consumed", &self.callback.is_none())
            .finish()
    }
}
