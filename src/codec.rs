//! Content-transfer codecs for HTTP/1.1 message bodies.
//!
//! Decoders turn wire bytes into payload bytes and encoders do the reverse,
//! for the three framings HTTP/1.1 defines:
//!
//! - identity: bytes pass through until the connection closes;
//! - length-delimited: exactly `Content-Length` bytes (RFC 7230 §3.3.2);
//! - chunked: `<hex-size>\r\n<data>\r\n` frames ending with a zero-size chunk and optional footers
//!   (RFC 7230 §4.1).
//!
//! Every codec is incremental. A call moves as many bytes as the channel has
//! ready and returns; state is kept on the codec so the next call resumes
//! exactly where the previous one stopped, even mid-line. Codecs never block
//! and never spin waiting for input.
//!
//! Two drivers are provided. The [`ContentDecoder`] / [`ContentEncoder`]
//! traits work against a non-blocking channel plus a session buffer, as a
//! readiness-driven reactor would call them. The `tokio_util`
//! [`Decoder`](tokio_util::codec::Decoder) and
//! [`Encoder`](tokio_util::codec::Encoder) implementations let the same codecs
//! run under `FramedRead` / `FramedWrite`.
//!
//! # Error Handling
//!
//! Failures are reported through [`CodecError`]; see the [`error`] module for
//! the taxonomy.

use std::io::{Read, Write};

use bytes::Bytes;

use crate::{
    buffer::{SessionInputBuffer, SessionOutputBuffer},
    channel::{FileChannel, ensure_no_gap},
    metrics::TransportMetrics,
};

pub mod chunked;
pub mod error;
pub mod framing;
pub mod header;
pub mod identity;
pub mod length;

pub use chunked::{ChunkConfig, ChunkDecoder, ChunkEncoder};
pub use error::{CodecError, EofError, FramingError, ProtocolError};
pub use framing::{BodyDecoder, BodyEncoder, ContentFraming};
pub use header::Header;
pub use identity::{IdentityDecoder, IdentityEncoder};
pub use length::{LengthDelimitedDecoder, LengthDelimitedEncoder};

/// Largest slice moved per `transfer` call.
pub const TRANSFER_CHUNK_SIZE: usize = 8 * 1024;

/// Item accepted by the `tokio_util` encoders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BodyChunk {
    /// Payload bytes.
    Data(Bytes),
    /// End of the body.
    End,
}

/// Incremental body decoder driven by channel readiness.
pub trait ContentDecoder {
    /// Decode payload bytes into `dst`.
    ///
    /// Bytes already in `buffer` are consumed before the channel is read.
    /// Returns `Ok(Some(n))` with the payload bytes written (zero when
    /// nothing was ready) or `Ok(None)` once the body is complete. After
    /// completion every call returns `Ok(None)` without touching the channel.
    ///
    /// # Errors
    /// Returns a [`CodecError`] for malformed framing, premature closure or
    /// channel failures. Errors are terminal for this decoder.
    fn read<R: Read + ?Sized>(
        &mut self,
        channel: &mut R,
        buffer: &mut SessionInputBuffer,
        dst: &mut [u8],
    ) -> Result<Option<usize>, CodecError>;

    /// Decode up to `count` payload bytes straight into `file` at
    /// `position`.
    ///
    /// Accounting and truncation behave exactly like [`read`](Self::read).
    ///
    /// # Errors
    /// Fails like [`read`](Self::read), and with an I/O error if `position`
    /// lies beyond the end of `file`.
    fn transfer<R, F>(
        &mut self,
        channel: &mut R,
        buffer: &mut SessionInputBuffer,
        file: &mut F,
        position: u64,
        count: u64,
    ) -> Result<Option<u64>, CodecError>
    where
        R: Read + ?Sized,
        F: FileChannel + ?Sized,
    {
        if self.is_completed() {
            return Ok(None);
        }
        ensure_no_gap(file, position)?;
        let mut scratch = [0_u8; TRANSFER_CHUNK_SIZE];
        let limit = usize::try_from(count).map_or(TRANSFER_CHUNK_SIZE, |c| c.min(TRANSFER_CHUNK_SIZE));
        match self.read(channel, buffer, &mut scratch[..limit])? {
            None => Ok(None),
            Some(n) => {
                write_all_at(file, &scratch[..n], position)?;
                Ok(Some(n as u64))
            }
        }
    }

    /// Returns `true` once the body has been fully decoded.
    fn is_completed(&self) -> bool;

    /// Bytes this decoder pulled directly from the channel.
    fn metrics(&self) -> &TransportMetrics;
}

/// Incremental body encoder driven by channel readiness.
pub trait ContentEncoder {
    /// Encode payload from `src`, returning how many payload bytes were
    /// accepted.
    ///
    /// Zero means the channel is congested and the caller should retry once
    /// it becomes writable.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidState`] once the encoder has completed,
    /// or a channel failure.
    fn write<W: Write + ?Sized>(
        &mut self,
        channel: &mut W,
        buffer: &mut SessionOutputBuffer,
        src: &[u8],
    ) -> Result<usize, CodecError>;

    /// Encode up to `count` bytes read from `file` at `position`.
    ///
    /// # Errors
    /// Fails like [`write`](Self::write) or when the file cannot be read.
    fn transfer<W, F>(
        &mut self,
        channel: &mut W,
        buffer: &mut SessionOutputBuffer,
        file: &mut F,
        position: u64,
        count: u64,
    ) -> Result<u64, CodecError>
    where
        W: Write + ?Sized,
        F: FileChannel + ?Sized,
    {
        if self.is_completed() {
            return Err(CodecError::InvalidState("encoder already completed"));
        }
        let mut scratch = [0_u8; TRANSFER_CHUNK_SIZE];
        let limit = usize::try_from(count).map_or(TRANSFER_CHUNK_SIZE, |c| c.min(TRANSFER_CHUNK_SIZE));
        let read = file.read_at(&mut scratch[..limit], position)?;
        if read == 0 {
            return Ok(0);
        }
        let written = self.write(channel, buffer, &scratch[..read])?;
        Ok(written as u64)
    }

    /// Finish the body, emitting any terminal framing.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidState`] if completion is not allowed in
    /// the current state, or a channel failure.
    fn complete<W: Write + ?Sized>(
        &mut self,
        channel: &mut W,
        buffer: &mut SessionOutputBuffer,
    ) -> Result<(), CodecError>;

    /// Returns `true` once the body has been fully encoded.
    fn is_completed(&self) -> bool;

    /// Bytes this encoder moved onto the channel.
    fn metrics(&self) -> &TransportMetrics;
}

fn write_all_at<F: FileChannel + ?Sized>(file: &mut F, mut src: &[u8], mut position: u64) -> std::io::Result<()> {
    while !src.is_empty() {
        let n = file.write_at(src, position)?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::WriteZero));
        }
        src = &src[n..];
        position += n as u64;
    }
    Ok(())
}

/// Record a failure in logs and metrics before handing it back.
pub(crate) fn report(err: CodecError) -> CodecError {
    tracing::debug!(error = %err, kind = %err.kind(), "content codec failed");
    crate::metrics::inc_codec_errors(err.kind());
    err
}

#[cfg(test)]
mod tests;
