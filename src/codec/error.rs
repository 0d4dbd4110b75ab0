//! Error types for the codec layer.
//!
//! This module provides a structured error taxonomy that distinguishes
//! between framing errors (malformed chunk coding on the wire), protocol
//! errors (footer and header syntax), premature end-of-stream, lifecycle
//! misuse, and plain I/O failures.
//!
//! # Error Categories
//!
//! - [`FramingError`]: Chunk-size lines, chunk terminators and line limits that violate RFC 7230
//!   §4.1.
//! - [`ProtocolError`]: Footer lines and message headers that cannot be interpreted.
//! - [`EofError`]: The channel closed while a body was still incomplete.
//! - [`CodecError`]: Top-level enum wrapping all categories plus lifecycle and I/O errors.
//!
//! Malformed framing and premature closure are deliberately separate
//! variants: bytes seen before a premature close were syntactically valid,
//! while a framing error means the stream can no longer be trusted.

use std::io;

use thiserror::Error;

use crate::error::ErrorKind;

/// Malformed chunk coding detected while decoding.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The chunk-size line contains something other than hex digits before
    /// the optional extension separator.
    #[error("invalid chunk size line: {line:?}")]
    InvalidChunkSize {
        /// The offending line, lossily decoded.
        line: String,
    },

    /// The chunk size does not fit in 64 bits.
    #[error("chunk size overflows: {digits}")]
    ChunkSizeOverflow {
        /// Hex digits as received.
        digits: String,
    },

    /// The two bytes following chunk data were not CRLF.
    #[error("chunk data not terminated by CRLF: found {found:02x?}")]
    InvalidChunkTerminator {
        /// Bytes found where CRLF was expected.
        found: Vec<u8>,
    },

    /// A framing or footer line exceeded the configured limit.
    #[error("line exceeds {limit} bytes")]
    LineTooLong {
        /// Configured maximum line length.
        limit: usize,
    },
}

/// Header or footer syntax violations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A footer line is neither a `name: value` pair nor a continuation.
    #[error("malformed footer line: {line:?}")]
    MalformedFooter {
        /// The offending line.
        line: String,
    },

    /// More footers than the configured limit.
    #[error("too many footers: limit is {limit}")]
    TooManyFooters {
        /// Configured maximum footer count.
        limit: usize,
    },

    /// A `Content-Length` header is not a decimal number or disagrees with
    /// another `Content-Length` header.
    #[error("invalid content length: {value:?}")]
    InvalidContentLength {
        /// The offending header value.
        value: String,
    },

    /// A request carries a transfer coding that does not end in `chunked`.
    #[error("unsupported transfer encoding: {value:?}")]
    UnsupportedTransferEncoding {
        /// The offending header value.
        value: String,
    },
}

/// The channel closed before the body was complete.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// A length-delimited body ended early.
    #[error("premature EOF: {received} of {expected} content bytes received")]
    TruncatedContent {
        /// Body bytes received before EOF.
        received: u64,
        /// Declared content length.
        expected: u64,
    },

    /// A chunk ended before its declared size.
    #[error("truncated chunk: {received} of {expected} bytes received")]
    TruncatedChunk {
        /// Chunk bytes received before EOF.
        received: u64,
        /// Declared chunk size.
        expected: u64,
    },

    /// EOF while reading a chunk-size line or the CRLF after chunk data.
    #[error("premature EOF in chunk framing")]
    MidChunkFraming,

    /// EOF while reading footers after the last chunk.
    #[error("premature EOF in chunk footers")]
    MidFooters,
}

/// Top-level codec error taxonomy.
///
/// # Examples
///
/// ```
/// use wireline::{
///     ErrorKind,
///     codec::{CodecError, EofError, FramingError},
/// };
///
/// let err = CodecError::Framing(FramingError::InvalidChunkSize { line: "5zz".into() });
/// assert_eq!(err.kind(), ErrorKind::MalformedFraming);
///
/// let err = CodecError::Eof(EofError::MidChunkFraming);
/// assert!(err.is_premature_close());
/// ```
#[derive(Debug, Error)]
pub enum CodecError {
    /// Malformed chunk coding.
    #[error("malformed chunk coding: {0}")]
    Framing(#[from] FramingError),

    /// Footer or header syntax error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The channel closed before the body was complete.
    #[error("connection closed: {0}")]
    Eof(#[from] EofError),

    /// Transport layer I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The codec is not in a state that permits the operation.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The caller passed an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl CodecError {
    /// Classify the error into the crate-wide [`ErrorKind`] set.
    ///
    /// Footer syntax errors are reported as [`ErrorKind::Io`] rather than
    /// [`ErrorKind::MalformedFraming`]: the chunk coding itself was intact.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Framing(_) => ErrorKind::MalformedFraming,
            Self::Eof(_) => ErrorKind::PrematureClose,
            Self::Protocol(_) => ErrorKind::Io,
            Self::Io(e) if e.kind() == io::ErrorKind::TimedOut => ErrorKind::Timeout,
            Self::Io(_) => ErrorKind::Io,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Returns `true` if the channel closed before the body was complete.
    #[must_use]
    pub fn is_premature_close(&self) -> bool { matches!(self, Self::Eof(_)) }

    /// Returns `true` if the wire bytes violated the chunk coding.
    #[must_use]
    pub fn is_malformed(&self) -> bool { matches!(self, Self::Framing(_)) }

    /// Returns the error category as a string for logging and metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Protocol(_) => "protocol",
            Self::Eof(_) => "eof",
            Self::Io(_) => "io",
            Self::InvalidState(_) => "state",
            Self::InvalidArgument(_) => "argument",
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::Framing(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Protocol(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Eof(e) => io::Error::new(io::ErrorKind::UnexpectedEof, e),
            CodecError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            CodecError::InvalidState(msg) => io::Error::other(msg),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
