//! Contains the `Error` and `Result` types that `zteradb` uses.

use std::sync::Arc;

use thiserror::Error;

use crate::client::options::ServerAddress;

/// The result type for all methods that can return an error in the `zteradb` crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur in the `zteradb` crate. The inner
/// [`ErrorKind`](enum.ErrorKind.html) is boxed to keep the type small enough to
/// pass through `Result` cheaply, and I/O errors are wrapped in an `Arc` so that
/// errors remain cloneable.
#[derive(Clone, Debug, Error)]
#[error("{kind}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
        }
    }

    /// Creates an `Authentication` error with the provided reason.
    pub(crate) fn authentication_error(reason: impl Into<String>) -> Self {
        ErrorKind::Authentication {
            message: reason.into(),
        }
        .into()
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        ErrorKind::Configuration {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_condition(message: impl Into<String>) -> Self {
        ErrorKind::InvalidCondition {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_query(message: impl Into<String>) -> Self {
        ErrorKind::InvalidQuery {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        ErrorKind::InvalidResponse {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        ErrorKind::Internal {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn server_error(response_code: i32, message: impl Into<String>) -> Self {
        ErrorKind::Server {
            response_code,
            message: message.into(),
        }
        .into()
    }

    /// Construct a generic network timeout error.
    pub(crate) fn network_timeout() -> Self {
        ErrorKind::Io(Arc::new(std::io::ErrorKind::TimedOut.into())).into()
    }

    pub(crate) fn wait_queue_timeout(address: ServerAddress) -> Self {
        ErrorKind::WaitQueueTimeout { address }.into()
    }

    /// Whether this error occurred while authenticating a session.
    pub fn is_authentication(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Authentication { .. })
    }

    /// Whether this error is a network I/O error.
    pub fn is_network_error(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Io(..))
    }

    /// Whether this error is a network timeout.
    pub fn is_network_timeout(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::TimedOut)
    }

    /// Whether this error was reported by the server in a query response.
    pub fn is_server_error(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Server { .. })
    }

    /// The response code attached to a server-reported error, if any.
    pub fn server_response_code(&self) -> Option<i32> {
        match self.kind.as_ref() {
            ErrorKind::Server { response_code, .. } => Some(*response_code),
            _ => None,
        }
    }

    /// Gets the message for this error, if applicable, for use in testing.
    #[cfg(test)]
    pub(crate) fn message(&self) -> Option<String> {
        match self.kind.as_ref() {
            ErrorKind::Configuration { message }
            | ErrorKind::InvalidCondition { message }
            | ErrorKind::InvalidQuery { message }
            | ErrorKind::Authentication { message }
            | ErrorKind::InvalidResponse { message }
            | ErrorKind::Internal { message }
            | ErrorKind::Server { message, .. } => Some(message.clone()),
            _ => None,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        ErrorKind::Io(Arc::new(err)).into()
    }
}

/// The types of errors that can occur.
#[allow(missing_docs)]
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The client configuration was invalid.
    #[error("invalid configuration: {message}")]
    #[non_exhaustive]
    Configuration { message: String },

    /// A filter condition failed validation when it was constructed.
    #[error("invalid filter condition: {message}")]
    #[non_exhaustive]
    InvalidCondition { message: String },

    /// A query could not be built or rendered.
    #[error("invalid query: {message}")]
    #[non_exhaustive]
    InvalidQuery { message: String },

    /// An error occurred while attempting to authenticate a session, either
    /// because the server rejected the handshake or because its proof of the
    /// shared secret did not verify.
    #[error("authentication failed: {message}")]
    #[non_exhaustive]
    Authentication { message: String },

    /// Wrapper around [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html).
    /// Timeouts surface here with [`std::io::ErrorKind::TimedOut`]; see
    /// [`Error::is_network_timeout`].
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// The server returned a reply that could not be decoded.
    #[error("invalid server reply: {message}")]
    #[non_exhaustive]
    InvalidResponse { message: String },

    /// The server reported an error for a request.
    #[error("server error (code {response_code}): {message}")]
    #[non_exhaustive]
    Server { response_code: i32, message: String },

    /// The connection pool was at its maximum size and no session became
    /// available within the wait queue timeout.
    #[error("timed out waiting for an available session from the pool for {address}")]
    #[non_exhaustive]
    WaitQueueTimeout { address: ServerAddress },

    #[error("internal error: {message}")]
    #[non_exhaustive]
    Internal { message: String },
}
