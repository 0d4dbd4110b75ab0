//! Length-delimited transfer: exactly `Content-Length` bytes.

use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{BodyChunk, CodecError, ContentDecoder, ContentEncoder, EofError, identity::write_payload, report};
use crate::{
    buffer::{SessionInputBuffer, SessionOutputBuffer},
    channel::read_ready,
    metrics::{Direction, TransportMetrics, add_codec_bytes},
};

fn clamp(remaining: u64, available: usize) -> usize {
    usize::try_from(remaining).map_or(available, |r| r.min(available))
}

/// Decoder for bodies of a declared length.
///
/// Never reads past the declared length: surplus bytes on the channel or in
/// the session buffer are left for the next message.
#[derive(Debug)]
pub struct LengthDelimitedDecoder {
    content_length: u64,
    transferred: u64,
    metrics: TransportMetrics,
    completed: bool,
}

impl LengthDelimitedDecoder {
    /// Create a decoder for a body of `content_length` bytes.
    #[must_use]
    pub fn new(content_length: u64) -> Self {
        Self {
            content_length,
            transferred: 0,
            metrics: TransportMetrics::new(),
            completed: false,
        }
    }

    /// Declared body length.
    #[must_use]
    pub fn content_length(&self) -> u64 { self.content_length }

    /// Payload bytes still expected.
    #[must_use]
    pub fn remaining(&self) -> u64 { self.content_length - self.transferred }

    fn truncated(&self, received: u64) -> CodecError {
        report(
            EofError::TruncatedContent {
                received,
                expected: self.content_length,
            }
            .into(),
        )
    }
}

impl ContentDecoder for LengthDelimitedDecoder {
    fn read<R: Read + ?Sized>(
        &mut self,
        channel: &mut R,
        buffer: &mut SessionInputBuffer,
        dst: &mut [u8],
    ) -> Result<Option<usize>, CodecError> {
        if self.completed {
            return Ok(None);
        }
        let remaining = self.remaining();
        if remaining == 0 {
            self.completed = true;
            return Ok(None);
        }
        let limit = clamp(remaining, dst.len());
        let dst = &mut dst[..limit];
        let mut total = buffer.read_into(dst);
        if total < limit {
            match read_ready(channel, &mut dst[total..]).map_err(|e| report(e.into()))? {
                Some(n) => {
                    self.metrics.increment(n as u64);
                    total += n;
                }
                None => return Err(self.truncated(self.transferred + total as u64)),
            }
        }
        self.transferred += total as u64;
        if self.transferred == self.content_length {
            self.completed = true;
        }
        add_codec_bytes(Direction::Inbound, total as u64);
        Ok(Some(total))
    }

    fn is_completed(&self) -> bool { self.completed }

    fn metrics(&self) -> &TransportMetrics { &self.metrics }
}

impl Decoder for LengthDelimitedDecoder {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let remaining = self.remaining();
        if remaining == 0 {
            self.completed = true;
            return Ok(None);
        }
        let n = clamp(remaining, src.len());
        if n == 0 {
            return Ok(None);
        }
        let data = src.split_to(n).freeze();
        self.transferred += n as u64;
        self.metrics.increment(n as u64);
        add_codec_bytes(Direction::Inbound, n as u64);
        if self.transferred == self.content_length {
            self.completed = true;
        }
        Ok(Some(data))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(data) => Ok(Some(data)),
            None if self.completed => Ok(None),
            None => Err(self.truncated(self.transferred)),
        }
    }
}

/// Encoder for bodies of a declared length.
///
/// Writes are accepted up to the declared length. Once it is reached the
/// encoder completes and further writes fail with
/// [`CodecError::InvalidState`].
#[derive(Debug)]
pub struct LengthDelimitedEncoder {
    content_length: u64,
    written: u64,
    metrics: TransportMetrics,
    completed: bool,
}

impl LengthDelimitedEncoder {
    /// Create an encoder for a body of `content_length` bytes.
    #[must_use]
    pub fn new(content_length: u64) -> Self {
        Self {
            content_length,
            written: 0,
            metrics: TransportMetrics::new(),
            completed: content_length == 0,
        }
    }

    /// Payload bytes still to be written.
    #[must_use]
    pub fn remaining(&self) -> u64 { self.content_length - self.written }
}

impl ContentEncoder for LengthDelimitedEncoder {
    fn write<W: Write + ?Sized>(
        &mut self,
        channel: &mut W,
        buffer: &mut SessionOutputBuffer,
        src: &[u8],
    ) -> Result<usize, CodecError> {
        if self.completed {
            return Err(report(CodecError::InvalidState("declared content length already written")));
        }
        let limit = clamp(self.remaining(), src.len());
        let accepted = write_payload(channel, buffer, &src[..limit], &mut self.metrics)?;
        self.written += accepted as u64;
        if self.remaining() == 0 {
            self.completed = true;
            let flushed = buffer.flush(channel)?;
            self.metrics.increment(flushed as u64);
        }
        Ok(accepted)
    }

    /// Verify the declared length was written and flush what is buffered.
    ///
    /// Completion happens implicitly when the last declared byte is written,
    /// so this succeeds any number of times once that has happened.
    fn complete<W: Write + ?Sized>(
        &mut self,
        channel: &mut W,
        buffer: &mut SessionOutputBuffer,
    ) -> Result<(), CodecError> {
        if !self.completed {
            return Err(report(CodecError::InvalidState("declared content length not reached")));
        }
        let flushed = buffer.flush(channel)?;
        self.metrics.increment(flushed as u64);
        Ok(())
    }

    fn is_completed(&self) -> bool { self.completed }

    fn metrics(&self) -> &TransportMetrics { &self.metrics }
}

impl Encoder<BodyChunk> for LengthDelimitedEncoder {
    type Error = CodecError;

    fn encode(&mut self, item: BodyChunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            BodyChunk::Data(data) if data.is_empty() => Ok(()),
            BodyChunk::Data(_) if self.completed => Err(report(CodecError::InvalidState(
                "declared content length already written",
            ))),
            BodyChunk::Data(data) => {
                if data.len() as u64 > self.remaining() {
                    return Err(report(CodecError::InvalidState("body exceeds declared content length")));
                }
                self.written += data.len() as u64;
                self.metrics.increment(data.len() as u64);
                add_codec_bytes(Direction::Outbound, data.len() as u64);
                dst.extend_from_slice(&data);
                if self.remaining() == 0 {
                    self.completed = true;
                }
                Ok(())
            }
            BodyChunk::End if self.completed => Ok(()),
            BodyChunk::End => Err(report(CodecError::InvalidState("declared content length not reached"))),
        }
    }
}
