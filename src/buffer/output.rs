//! Outbound session buffer.

use std::io::Write;

use bytes::{Buf, BytesMut};

use super::config::BufferConfig;
use crate::{channel::write_ready, codec::CodecError, metrics::TransportMetrics};

const CRLF: &[u8] = b"\r\n";

/// Growable buffer filled by encoders and flushed to a channel.
///
/// Writes never fail for lack of space; [`flush`](Self::flush) moves as much
/// as the channel accepts and keeps the rest in order.
#[derive(Debug)]
pub struct SessionOutputBuffer {
    buf: BytesMut,
    config: BufferConfig,
    metrics: TransportMetrics,
}

impl Default for SessionOutputBuffer {
    fn default() -> Self {
        let config = BufferConfig::default();
        Self {
            buf: BytesMut::with_capacity(config.buffer_size_value()),
            config,
            metrics: TransportMetrics::new(),
        }
    }
}

impl SessionOutputBuffer {
    /// Create a buffer using the default configuration.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create a buffer with `config`.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidArgument`] if the buffer size is zero.
    pub fn with_config(config: BufferConfig) -> Result<Self, CodecError> {
        let config = config.validate()?;
        Ok(Self {
            buf: BytesMut::with_capacity(config.buffer_size_value()),
            config,
            metrics: TransportMetrics::new(),
        })
    }

    /// Append raw bytes.
    pub fn write(&mut self, src: &[u8]) { self.buf.extend_from_slice(src); }

    /// Append `line` followed by CRLF.
    pub fn write_line(&mut self, line: &[u8]) {
        self.buf.extend_from_slice(line);
        self.buf.extend_from_slice(CRLF);
    }

    /// Append `line` encoded with the configured charset, followed by CRLF.
    ///
    /// # Errors
    /// Returns an error if `line` cannot be represented in the charset.
    pub fn write_line_str(&mut self, line: &str) -> Result<(), CodecError> {
        let encoded = self.config.charset_value().encode(line)?;
        self.write_line(&encoded);
        Ok(())
    }

    /// Move buffered bytes to `channel` until it stops accepting them.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    /// Propagates channel failures.
    pub fn flush<W: Write + ?Sized>(&mut self, channel: &mut W) -> std::io::Result<usize> {
        let mut total = 0;
        while !self.buf.is_empty() {
            let n = write_ready(channel, &self.buf)?;
            if n == 0 {
                break;
            }
            self.buf.advance(n);
            total += n;
        }
        self.metrics.increment(total as u64);
        Ok(total)
    }

    /// Returns `true` if bytes are waiting to be flushed.
    #[must_use]
    pub fn has_data(&self) -> bool { !self.buf.is_empty() }

    /// Number of bytes waiting to be flushed.
    #[must_use]
    pub fn len(&self) -> usize { self.buf.len() }

    /// Returns `true` when nothing is waiting to be flushed.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }

    /// Returns `true` once enough output is pending that encoders should stop
    /// accepting payload until a flush makes room.
    #[must_use]
    pub fn is_saturated(&self) -> bool { self.buf.len() >= self.config.fragment_size_hint_value().max(1) }

    /// Discard pending output.
    pub fn clear(&mut self) { self.buf.clear(); }

    /// Discard pending output and zero the byte counter.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.metrics.reset();
    }

    /// Byte counter for data flushed to the channel.
    #[must_use]
    pub fn metrics(&self) -> &TransportMetrics { &self.metrics }

    /// Buffer configuration.
    #[must_use]
    pub fn config(&self) -> &BufferConfig { &self.config }

    /// Pending bytes.
    #[must_use]
    pub fn peek(&self) -> &[u8] { &self.buf }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut BytesMut { &mut self.buf }
}
