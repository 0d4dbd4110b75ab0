//! Inbound session buffer.

use std::io::Read;

use bytes::{Buf, Bytes, BytesMut};

use super::config::BufferConfig;
use crate::{
    channel::read_ready,
    codec::{CodecError, FramingError},
    metrics::TransportMetrics,
};

/// Growable buffer filled from a channel and drained by decoders.
///
/// Bytes are consumed strictly in arrival order. `fill` counts every byte
/// pulled off the channel in [`metrics`](Self::metrics), so decoders that
/// drain this buffer do not count those bytes a second time.
#[derive(Debug)]
pub struct SessionInputBuffer {
    buf: BytesMut,
    config: BufferConfig,
    metrics: TransportMetrics,
}

impl Default for SessionInputBuffer {
    fn default() -> Self {
        let config = BufferConfig::default();
        Self {
            buf: BytesMut::with_capacity(config.buffer_size_value()),
            config,
            metrics: TransportMetrics::new(),
        }
    }
}

impl SessionInputBuffer {
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

    /// Pull whatever the channel has ready into the buffer.
    ///
    /// Returns `Ok(Some(n))` with the bytes added (zero when nothing was
    /// ready) or `Ok(None)` at end-of-stream.
    ///
    /// # Errors
    /// Propagates channel failures.
    pub fn fill<R: Read + ?Sized>(&mut self, channel: &mut R) -> std::io::Result<Option<usize>> {
        let start = self.buf.len();
        let step = self.config.buffer_size_value();
        self.buf.resize(start + step, 0);
        let result = read_ready(channel, &mut self.buf[start..]);
        let read = match &result {
            Ok(Some(n)) => *n,
            _ => 0,
        };
        self.buf.truncate(start + read);
        self.metrics.increment(read as u64);
        result
    }

    /// Returns `true` if unread bytes are buffered.
    #[must_use]
    pub fn has_data(&self) -> bool { !self.buf.is_empty() }

    /// Number of unread bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.buf.len() }

    /// Returns `true` when no unread bytes are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }

    /// Current allocated capacity.
    #[must_use]
    pub fn capacity(&self) -> usize { self.buf.capacity() }

    /// Copy up to `dst.len()` unread bytes into `dst`, returning the count.
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.buf.len());
        dst[..n].copy_from_slice(&self.buf[..n]);
        self.buf.advance(n);
        n
    }

    /// Split off up to `max` unread bytes without copying.
    pub fn take(&mut self, max: usize) -> Bytes {
        let n = max.min(self.buf.len());
        self.buf.split_to(n).freeze()
    }

    /// Peek at the unread bytes.
    #[must_use]
    pub fn peek(&self) -> &[u8] { &self.buf }

    /// Discard `n` unread bytes.
    ///
    /// # Panics
    /// Panics if `n` exceeds [`len`](Self::len).
    pub fn consume(&mut self, n: usize) { self.buf.advance(n); }

    /// Move one complete line (without its terminator) into `line`.
    ///
    /// Lines end with LF; a preceding CR is stripped. Returns `Ok(true)` when a
    /// line was produced and `Ok(false)` when more input is needed. At
    /// end-of-stream any unterminated remainder is returned as the final line.
    /// Bytes of an incomplete line stay buffered, so repeated calls resume
    /// where the previous one stopped.
    ///
    /// # Errors
    /// Returns [`FramingError::LineTooLong`] if the line exceeds the configured
    /// limit.
    pub fn read_line(&mut self, line: &mut BytesMut, end_of_stream: bool) -> Result<bool, CodecError> {
        let limit = self.config.max_line_length_value();
        match self.buf.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let mut content = self.buf.split_to(pos + 1);
                content.truncate(pos);
                if content.last() == Some(&b'\r') {
                    content.truncate(pos - 1);
                }
                check_line_length(line.len() + content.len(), limit)?;
                line.extend_from_slice(&content);
                Ok(true)
            }
            None => {
                check_line_length(line.len() + self.buf.len(), limit)?;
                if end_of_stream && !self.buf.is_empty() {
                    let rest = self.buf.split();
                    line.extend_from_slice(&rest);
                    return Ok(true);
                }
                Ok(false)
            }
        }
    }

    /// Read one complete line decoded with the configured charset.
    ///
    /// # Errors
    /// Fails like [`read_line`](Self::read_line) and when the bytes are not
    /// valid in the configured charset.
    pub fn read_line_str(&mut self, line: &mut String, end_of_stream: bool) -> Result<bool, CodecError> {
        let mut raw = BytesMut::new();
        if !self.read_line(&mut raw, end_of_stream)? {
            return Ok(false);
        }
        line.push_str(&self.config.charset_value().decode(&raw)?);
        Ok(true)
    }

    /// Discard all unread bytes.
    pub fn clear(&mut self) { self.buf.clear(); }

    /// Discard unread bytes and zero the byte counter, ready for the next
    /// exchange on a reused connection.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.metrics.reset();
    }

    /// Byte counter for data pulled from the channel.
    #[must_use]
    pub fn metrics(&self) -> &TransportMetrics { &self.metrics }

    /// Buffer configuration.
    #[must_use]
    pub fn config(&self) -> &BufferConfig { &self.config }

    /// Mutable access to the raw storage, for `tokio_util` adapters.
    pub fn as_bytes_mut(&mut self) -> &mut BytesMut { &mut self.buf }
}

fn check_line_length(length: usize, limit: usize) -> Result<(), CodecError> {
    if limit > 0 && length > limit {
        return Err(FramingError::LineTooLong { limit }.into());
    }
    Ok(())
}
