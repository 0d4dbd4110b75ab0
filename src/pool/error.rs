//! Errors surfaced by [`ConnPool`](super::ConnPool) and its lease futures.

use std::{io, sync::Arc};

use thiserror::Error;

use crate::error::ErrorKind;

/// Failure of a pool operation or a lease.
///
/// Cloneable so a single outcome can reach both a lease future and its
/// callback.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// The pool has been shut down.
    #[error("connection pool is shut down")]
    Shutdown,
    /// The caller passed an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The operation is not valid in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// The lease or connect attempt did not finish in time.
    #[error("timed out waiting for a connection")]
    Timeout,
    /// The lease or connect attempt was cancelled.
    #[error("lease cancelled")]
    Cancelled,
    /// The connector failed to establish a session.
    #[error("connect failed: {0}")]
    Connect(#[source] Arc<io::Error>),
    /// The route could not be resolved to an address.
    #[error("route resolution failed: {0}")]
    Resolve(#[source] Arc<io::Error>),
}

impl PoolError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Shutdown | Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Timeout => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Connect(e) if e.kind() == io::ErrorKind::TimedOut => ErrorKind::Timeout,
            Self::Connect(_) | Self::Resolve(_) => ErrorKind::Io,
        }
    }
}

impl From<PoolError> for io::Error {
    fn from(err: PoolError) -> Self {
        let kind = match &err {
            PoolError::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            PoolError::Timeout => io::ErrorKind::TimedOut,
            PoolError::Connect(e) | PoolError::Resolve(e) => e.kind(),
            PoolError::Shutdown | PoolError::InvalidState(_) | PoolError::Cancelled => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
