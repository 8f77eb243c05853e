//! Error types for transports and connection drivers.
//!
//! The two enums encode an asymmetric policy:
//!
//! - [`TransportError`] is what a [`Transport`](crate::Transport) returns.
//!   Read failures are fatal to a connection, write failures are not.
//! - [`IoThreadError`] is what [`IoThread::start`](crate::IoThread::start)
//!   returns. Callers match on it to decide between reconnecting, logging,
//!   or exiting.

use std::sync::Arc;

use thiserror::Error;

/// Failure reported by a transport read or write.
///
/// `Clone` so that one read failure can be delivered both to the downstream
/// error sink and to the caller of `start`.
#[derive(Clone, Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection (end of stream).
    #[error("connection closed by peer")]
    Closed,

    /// Underlying I/O failure.
    #[error("transport i/o error: {0}")]
    Io(Arc<std::io::Error>),

    /// An inbound frame exceeded the configured size limit.
    #[error("inbound frame exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Configured maximum.
        max: usize,
    },

    /// The operation was aborted because its cancellation token fired.
    #[error("transport operation cancelled")]
    Cancelled,
}

impl TransportError {
    /// Whether this is a clean end-of-stream rather than a failure.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// The I/O error kind, if this wraps an I/O error.
    #[must_use]
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Io(err) => Some(err.kind()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// Reason an [`IoThread`](crate::IoThread) stopped running.
#[derive(Clone, Debug, Error)]
pub enum IoThreadError {
    /// The transport read failed; the connection is gone.
    #[error("read failed: {0}")]
    Read(#[source] TransportError),

    /// The caller's cancellation token fired.
    #[error("io thread cancelled")]
    Cancelled,

    /// `start` was called on an instance that has already been started.
    #[error("io thread already started")]
    AlreadyStarted,

    /// The downstream consumer dropped the inbound queue receiver.
    #[error("downstream inbound queue closed")]
    InboundClosed,

    /// The input pump went away without reporting an error.
    #[error("input pump exited unexpectedly")]
    PumpExited,

    /// A stop hook failed.
    #[error("failed to stop io thread: {0}")]
    Stop(String),
}

impl IoThreadError {
    /// Whether the loop ended because of cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The transport failure that ended the loop, if any.
    #[must_use]
    pub fn read_error(&self) -> Option<&TransportError> {
        match self {
            Self::Read(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the loop ended because the peer closed the connection.
    #[must_use]
    pub fn is_peer_closed(&self) -> bool {
        self.read_error().is_some_and(TransportError::is_closed)
    }
}

/// Result type for io thread operations.
pub type Result<T> = std::result::Result<T, IoThreadError>;
