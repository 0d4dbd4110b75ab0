//! Canonical error classification for the crate.
//!
//! Codec and pool failures carry their own structured error types
//! ([`CodecError`](crate::codec::CodecError) and
//! [`PoolError`](crate::pool::PoolError)). Both map onto the closed set of
//! kinds defined here so callers can react to a failure class without
//! matching on every variant.

use std::fmt;

/// Closed set of failure classes shared by codecs and the connection pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller supplied an argument the operation cannot accept.
    InvalidArgument,
    /// The operation is not valid in the current lifecycle state, for
    /// example writing after an encoder completed or leasing after shutdown.
    InvalidState,
    /// Bytes on the wire violate the transfer-coding structure.
    MalformedFraming,
    /// The channel closed before a message body was complete.
    PrematureClose,
    /// A connect or lease attempt outlived its deadline.
    Timeout,
    /// The operation was cancelled before it produced a result.
    Cancelled,
    /// Any other transport failure.
    Io,
}

impl ErrorKind {
    /// Return the kind as a static label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidState => "invalid_state",
            Self::MalformedFraming => "malformed_framing",
            Self::PrematureClose => "premature_close",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
