use std::io::Write;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

use super::ChunkConfig;
use crate::{
    buffer::SessionOutputBuffer,
    codec::{BodyChunk, CodecError, ContentEncoder, Header, report},
    metrics::{Direction, TransportMetrics, add_codec_bytes},
};

const CRLF: &[u8] = b"\r\n";

/// Encoder producing `Transfer-Encoding: chunked` bodies.
///
/// Every accepted write becomes one or more `<hex-size>\r\n<data>\r\n`
/// frames of at most [`ChunkConfig::max_chunk_size`] payload bytes. The
/// terminal zero-size chunk is only written by [`complete`](ContentEncoder::complete)
/// or [`complete_with_footers`](Self::complete_with_footers).
#[derive(Debug)]
pub struct ChunkEncoder {
    config: ChunkConfig,
    metrics: TransportMetrics,
    completed: bool,
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self {
            config: ChunkConfig::default(),
            metrics: TransportMetrics::new(),
            completed: false,
        }
    }
}

impl ChunkEncoder {
    /// Create an encoder with default limits.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create an encoder with custom limits.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidArgument`] if the maximum chunk size is
    /// zero.
    pub fn with_config(config: ChunkConfig) -> Result<Self, CodecError> {
        Ok(Self {
            config: config.validate_for_encoder()?,
            metrics: TransportMetrics::new(),
            completed: false,
        })
    }

    /// Write the terminal chunk followed by `footers`.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidState`] if the body was already
    /// completed, an encoding error if a footer cannot be represented in the
    /// buffer charset, or a channel failure.
    pub fn complete_with_footers<W: Write + ?Sized>(
        &mut self,
        channel: &mut W,
        buffer: &mut SessionOutputBuffer,
        footers: &[Header],
    ) -> Result<(), CodecError> {
        if self.completed {
            return Err(report(CodecError::InvalidState("chunked body already completed")));
        }
        self.completed = true;
        buffer.write_line(b"0");
        for footer in footers {
            buffer.write_line_str(&footer.to_string())?;
        }
        buffer.write(CRLF);
        let flushed = buffer.flush(channel)?;
        self.metrics.increment(flushed as u64);
        tracing::trace!(footers = footers.len(), "chunked body completed");
        Ok(())
    }

    fn put_frames(&self, dst: &mut BytesMut, src: &[u8]) {
        for chunk in src.chunks(self.config.max_chunk_size_value()) {
            put_chunk(dst, chunk);
        }
    }
}

impl ContentEncoder for ChunkEncoder {
    fn write<W: Write + ?Sized>(
        &mut self,
        channel: &mut W,
        buffer: &mut SessionOutputBuffer,
        src: &[u8],
    ) -> Result<usize, CodecError> {
        if self.completed {
            return Err(report(CodecError::InvalidState("chunked body already completed")));
        }
        if src.is_empty() {
            return Ok(0);
        }
        let flushed = buffer.flush(channel)?;
        self.metrics.increment(flushed as u64);
        if buffer.is_saturated() {
            return Ok(0);
        }
        let n = src.len().min(self.config.max_chunk_size_value());
        put_chunk(buffer.as_bytes_mut(), &src[..n]);
        let flushed = buffer.flush(channel)?;
        self.metrics.increment(flushed as u64);
        add_codec_bytes(Direction::Outbound, n as u64);
        Ok(n)
    }

    fn complete<W: Write + ?Sized>(
        &mut self,
        channel: &mut W,
        buffer: &mut SessionOutputBuffer,
    ) -> Result<(), CodecError> {
        self.complete_with_footers(channel, buffer, &[])
    }

    fn is_completed(&self) -> bool { self.completed }

    fn metrics(&self) -> &TransportMetrics { &self.metrics }
}

impl Encoder<BodyChunk> for ChunkEncoder {
    type Error = CodecError;

    fn encode(&mut self, item: BodyChunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.completed {
            return Err(report(CodecError::InvalidState("chunked body already completed")));
        }
        match item {
            BodyChunk::Data(data) => {
                let before = dst.len();
                self.put_frames(dst, &data);
                self.metrics.increment((dst.len() - before) as u64);
                add_codec_bytes(Direction::Outbound, data.len() as u64);
            }
            BodyChunk::End => {
                self.completed = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                self.metrics.increment(5);
            }
        }
        Ok(())
    }
}

fn put_chunk(dst: &mut BytesMut, data: &[u8]) {
    dst.put_slice(format!("{:x}", data.len()).as_bytes());
    dst.put_slice(CRLF);
    dst.put_slice(data);
    dst.put_slice(CRLF);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_split_at_max_chunk_size() {
        let config = ChunkConfig::default().max_chunk_size(4);
        let mut encoder = ChunkEncoder::with_config(config).expect("valid config");
        let mut dst = BytesMut::new();
        encoder
            .encode(BodyChunk::Data(bytes::Bytes::from_static(b"abcdefghij")), &mut dst)
            .expect("encode data");
        encoder.encode(BodyChunk::End, &mut dst).expect("encode end");
        assert_eq!(&dst[..], b"4\r\nabcd\r\n4\r\nefgh\r\n2\r\nij\r\n0\r\n\r\n");
    }

    #[test]
    fn empty_data_emits_nothing() {
        let mut encoder = ChunkEncoder::new();
        let mut dst = BytesMut::new();
        encoder
            .encode(BodyChunk::Data(bytes::Bytes::new()), &mut dst)
            .expect("encode empty");
        assert!(dst.is_empty());
        assert!(!encoder.is_completed());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = ChunkEncoder::with_config(ChunkConfig::default().max_chunk_size(0))
            .expect_err("zero chunk size");
        assert!(matches!(err, CodecError::InvalidArgument(_)));
    }

    #[test]
    fn hex_size_is_lowercase() {
        let mut dst = BytesMut::new();
        put_chunk(&mut dst, &[0_u8; 255]);
        assert!(dst.starts_with(b"ff\r\n"));
    }
}
