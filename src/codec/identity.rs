//! Identity transfer coding: bytes pass through until the connection closes.

use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{BodyChunk, CodecError, ContentDecoder, ContentEncoder, report};
use crate::{
    buffer::{SessionInputBuffer, SessionOutputBuffer},
    channel::{read_ready, write_ready},
    metrics::{Direction, TransportMetrics, add_codec_bytes},
};

/// Decoder for bodies delimited by connection close.
#[derive(Debug, Default)]
pub struct IdentityDecoder {
    metrics: TransportMetrics,
    completed: bool,
}

impl IdentityDecoder {
    /// Create a decoder for a close-delimited body.
    #[must_use]
    pub fn new() -> Self { Self::default() }
}

impl ContentDecoder for IdentityDecoder {
    fn read<R: Read + ?Sized>(
        &mut self,
        channel: &mut R,
        buffer: &mut SessionInputBuffer,
        dst: &mut [u8],
    ) -> Result<Option<usize>, CodecError> {
        if self.completed {
            return Ok(None);
        }
        let mut total = buffer.read_into(dst);
        if total < dst.len() {
            match read_ready(channel, &mut dst[total..]).map_err(|e| report(e.into()))? {
                Some(n) => {
                    self.metrics.increment(n as u64);
                    total += n;
                }
                None => {
                    self.completed = true;
                    if total == 0 {
                        return Ok(None);
                    }
                }
            }
        }
        add_codec_bytes(Direction::Inbound, total as u64);
        Ok(Some(total))
    }

    fn is_completed(&self) -> bool { self.completed }

    fn metrics(&self) -> &TransportMetrics { &self.metrics }
}

impl Decoder for IdentityDecoder {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.completed || src.is_empty() {
            return Ok(None);
        }
        let data = src.split().freeze();
        self.metrics.increment(data.len() as u64);
        add_codec_bytes(Direction::Inbound, data.len() as u64);
        Ok(Some(data))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let data = self.decode(src)?;
        if data.is_none() {
            self.completed = true;
        }
        Ok(data)
    }
}

/// Encoder for close-delimited bodies.
#[derive(Debug, Default)]
pub struct IdentityEncoder {
    metrics: TransportMetrics,
    completed: bool,
}

impl IdentityEncoder {
    /// Create an encoder for a close-delimited body.
    #[must_use]
    pub fn new() -> Self { Self::default() }
}

impl ContentEncoder for IdentityEncoder {
    fn write<W: Write + ?Sized>(
        &mut self,
        channel: &mut W,
        buffer: &mut SessionOutputBuffer,
        src: &[u8],
    ) -> Result<usize, CodecError> {
        if self.completed {
            return Err(report(CodecError::InvalidState("encoder already completed")));
        }
        write_payload(channel, buffer, src, &mut self.metrics)
    }

    fn complete<W: Write + ?Sized>(
        &mut self,
        channel: &mut W,
        buffer: &mut SessionOutputBuffer,
    ) -> Result<(), CodecError> {
        if self.completed {
            return Err(report(CodecError::InvalidState("encoder already completed")));
        }
        self.completed = true;
        let flushed = buffer.flush(channel)?;
        self.metrics.increment(flushed as u64);
        Ok(())
    }

    fn is_completed(&self) -> bool { self.completed }

    fn metrics(&self) -> &TransportMetrics { &self.metrics }
}

impl Encoder<BodyChunk> for IdentityEncoder {
    type Error = CodecError;

    fn encode(&mut self, item: BodyChunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.completed {
            return Err(report(CodecError::InvalidState("encoder already completed")));
        }
        match item {
            BodyChunk::Data(data) => {
                self.metrics.increment(data.len() as u64);
                add_codec_bytes(Direction::Outbound, data.len() as u64);
                dst.extend_from_slice(&data);
            }
            BodyChunk::End => self.completed = true,
        }
        Ok(())
    }
}

/// Move payload toward the channel, buffering small writes and bypassing
/// the buffer for large ones once it has drained.
///
/// Bytes written straight to the channel, and bytes flushed out of the
/// buffer here, are counted in `metrics`.
pub(super) fn write_payload<W: Write + ?Sized>(
    channel: &mut W,
    buffer: &mut SessionOutputBuffer,
    src: &[u8],
    metrics: &mut TransportMetrics,
) -> Result<usize, CodecError> {
    if src.is_empty() {
        return Ok(0);
    }
    let flushed = buffer.flush(channel)?;
    metrics.increment(flushed as u64);

    let hint = buffer.config().fragment_size_hint_value();
    let accepted = if buffer.has_data() {
        let room = hint.saturating_sub(buffer.len());
        let n = src.len().min(room);
        buffer.write(&src[..n]);
        n
    } else if src.len() < hint {
        buffer.write(src);
        let flushed = buffer.flush(channel)?;
        metrics.increment(flushed as u64);
        src.len()
    } else {
        let n = write_ready(channel, src)?;
        metrics.increment(n as u64);
        n
    };
    add_codec_bytes(Direction::Outbound, accepted as u64);
    Ok(accepted)
}
