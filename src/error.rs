use std::fmt;
use std::io;

/// Error type for because.
///
/// The first group of variants are construction errors, raised immediately when a
/// request, transfer or TLS configuration can't be used. Failures to complete an
/// exchange are carried by [`Error::Transfer`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The transfer can't be started, e.g. the request has no usable target.
    InvalidTransfer(String),
    /// The TLS configuration was rejected.
    InvalidTlsConfig(String),
    /// The exchange could not be completed.
    Transfer(TransferError),
    /// The work was cancelled before producing a value.
    Cancelled,
    /// The work was cancelled by its deadline timer.
    TimedOut,
    /// The future was closed and can't produce a value anymore.
    Closed,
    /// The single value of this future was already handed out.
    Consumed,
    /// The worker pool no longer accepts jobs.
    PoolShutdown,
    /// A worker thread could not be spawned.
    Spawn(String),
}

impl Error {
    /// Tell if this error was raised while constructing or starting work, before
    /// anything was dispatched.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Error::InvalidTransfer(_) | Error::InvalidTlsConfig(_)
        )
    }

    /// The transport error, if this is one.
    pub fn as_transfer(&self) -> Option<&TransferError> {
        match self {
            Error::Transfer(v) => Some(v),
            _ => None,
        }
    }
}

impl From<TransferError> for Error {
    fn from(value: TransferError) -> Self {
        Error::Transfer(value)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transfer(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidTransfer(v) => write!(f, "invalid transfer: {}", v),
            Error::InvalidTlsConfig(v) => write!(f, "invalid tls config: {}", v),
            Error::Transfer(v) => write!(f, "transfer failed: {}", v),
            Error::Cancelled => write!(f, "cancelled"),
            Error::TimedOut => write!(f, "timed out"),
            Error::Closed => write!(f, "closed"),
            Error::Consumed => write!(f, "value already consumed"),
            Error::PoolShutdown => write!(f, "worker pool is shut down"),
            Error::Spawn(v) => write!(f, "failed to spawn worker: {}", v),
        }
    }
}

/// Failure to complete an exchange.
///
/// Connection failures, timeouts and protocol violations end up here. An HTTP error
/// status is _not_ a `TransferError`, it's a normal [`Response`][crate::Response]
/// with a non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferError {
    message: String,
    code: Option<i32>,
}

impl TransferError {
    /// Create an error with a message and no code.
    pub fn new(message: impl Into<String>) -> Self {
        TransferError {
            message: message.into(),
            code: None,
        }
    }

    /// Attach a backend specific code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Human readable description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Backend specific code, such as an OS error number.
    pub fn code(&self) -> Option<i32> {
        self.code
    }
}

impl From<io::Error> for TransferError {
    fn from(value: io::Error) -> Self {
        let code = value.raw_os_error();
        TransferError {
            message: value.to_string(),
            code,
        }
    }
}

impl From<ureq::Error> for TransferError {
    fn from(value: ureq::Error) -> Self {
        match value {
            ureq::Error::Io(e) => e.into(),
            e => TransferError::new(e.to_string()),
        }
    }
}

impl std::error::Error for TransferError {}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_class() {
        assert!(Error::InvalidTransfer("x".into()).is_construction());
        assert!(Error::InvalidTlsConfig("x".into()).is_construction());
        assert!(!Error::Transfer(TransferError::new("x")).is_construction());
        assert!(!Error::Cancelled.is_construction());
        assert!(!Error::Closed.is_construction());
    }

    #[test]
    fn transfer_error_display_with_code() {
        let err = TransferError::new("connection refused").with_code(111);
        assert_eq!(err.to_string(), "connection refused (code 111)");
        assert_eq!(err.code(), Some(111));

        let err = TransferError::new("connection refused");
        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn transfer_error_from_io() {
        let io = io::Error::from_raw_os_error(111);
        let err: TransferError = io.into();
        assert_eq!(err.code(), Some(111));
    }

    #[test]
    fn wrapped_transfer_error_is_source() {
        use std::error::Error as _;
        let err: Error = TransferError::new("reset").into();
        assert_eq!(err.as_transfer().map(|e| e.message()), Some("reset"));
        assert!(err.source().is_some());
    }

    #[test]
    fn ureq_io_error_keeps_code() {
        let err: TransferError = ureq::Error::Io(io::Error::from_raw_os_error(104)).into();
        assert_eq!(err.code(), Some(104));
    }
}
