//! Incremental chunked-body decoder.

use std::io::Read;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use super::ChunkConfig;
use crate::{
    buffer::{Charset, SessionInputBuffer},
    codec::{CodecError, ContentDecoder, EofError, FramingError, Header, ProtocolError, report},
    metrics::{Direction, TransportMetrics, add_codec_bytes},
};

/// Position of the decoder within the chunked stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Expecting a `size[;ext]` line.
    Size,
    /// Inside chunk data.
    Data { size: u64, remaining: u64 },
    /// Expecting the CRLF that closes chunk data.
    DataCrlf,
    /// Reading footers after the zero-size chunk.
    Footers,
    /// The empty line after the footers was seen.
    Done,
}

/// Decoder for `Transfer-Encoding: chunked` bodies.
///
/// The decoder consumes whatever bytes are available and keeps partial
/// lines on itself, so input may arrive in fragments of any size, down to a
/// single byte per call.
///
/// # Examples
///
/// ```
/// use wireline::{
///     buffer::SessionInputBuffer,
///     codec::{ChunkDecoder, ContentDecoder},
/// };
///
/// let mut channel: &[u8] = b"5\r\nhello\r\n0\r\nChecksum: abc\r\n\r\n";
/// let mut buffer = SessionInputBuffer::new();
/// let mut decoder = ChunkDecoder::new();
/// let mut body = [0_u8; 16];
///
/// let n = decoder.read(&mut channel, &mut buffer, &mut body).unwrap().unwrap();
/// assert_eq!(&body[..n], b"hello");
/// assert!(decoder.is_completed());
/// assert_eq!(decoder.footers()[0].value(), "abc");
/// ```
#[derive(Debug)]
pub struct ChunkDecoder {
    state: State,
    line: BytesMut,
    pending_footer: Option<Header>,
    footers: Vec<Header>,
    config: ChunkConfig,
    metrics: TransportMetrics,
}

impl Default for ChunkDecoder {
    fn default() -> Self { Self::with_config(ChunkConfig::default()) }
}

impl ChunkDecoder {
    /// Create a decoder with default limits.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create a decoder with custom limits.
    #[must_use]
    pub fn with_config(config: ChunkConfig) -> Self {
        Self {
            state: State::Size,
            line: BytesMut::new(),
            pending_footer: None,
            footers: Vec::new(),
            config,
            metrics: TransportMetrics::new(),
        }
    }

    /// Footers received after the last chunk.
    ///
    /// Empty until decoding completes, and when the body carried none.
    #[must_use]
    pub fn footers(&self) -> &[Header] { &self.footers }

    /// Return the decoder to its initial state for a new body.
    pub fn reset(&mut self) {
        self.state = State::Size;
        self.line.clear();
        self.pending_footer = None;
        self.footers.clear();
        self.metrics.reset();
    }

    /// Consume framing from `src` and split off up to `max` payload bytes.
    ///
    /// Returns `Ok(None)` when more input is needed or the body is complete.
    fn next_payload(&mut self, src: &mut BytesMut, max: usize) -> Result<Option<Bytes>, CodecError> {
        loop {
            match self.state {
                State::Size => {
                    if !take_line(src, &mut self.line, self.config.max_line_length_value())? {
                        return Ok(None);
                    }
                    let size = parse_chunk_size(&self.line)?;
                    self.line.clear();
                    self.state = if size == 0 {
                        State::Footers
                    } else {
                        State::Data { size, remaining: size }
                    };
                }
                State::Data { size, remaining } => {
                    let n = usize::try_from(remaining).map_or(src.len(), |r| r.min(src.len())).min(max);
                    if n == 0 {
                        return Ok(None);
                    }
                    let data = src.split_to(n).freeze();
                    let remaining = remaining - n as u64;
                    self.state = if remaining == 0 {
                        State::DataCrlf
                    } else {
                        State::Data { size, remaining }
                    };
                    return Ok(Some(data));
                }
                State::DataCrlf => {
                    match src.first() {
                        None => return Ok(None),
                        Some(&b'\r') => {}
                        Some(_) => return Err(invalid_terminator(src)),
                    }
                    match src.get(1) {
                        None => return Ok(None),
                        Some(&b'\n') => {}
                        Some(_) => return Err(invalid_terminator(src)),
                    }
                    src.advance(2);
                    self.state = State::Size;
                }
                State::Footers => {
                    if !take_line(src, &mut self.line, self.config.max_footer_line_length_value())? {
                        return Ok(None);
                    }
                    if self.accept_footer_line()? {
                        self.state = State::Done;
                        tracing::trace!(footers = self.footers.len(), "chunked body complete");
                        return Ok(None);
                    }
                }
                State::Done => return Ok(None),
            }
        }
    }

    /// Process one complete footer line; returns `true` at the empty line
    /// that ends the body.
    fn accept_footer_line(&mut self) -> Result<bool, CodecError> {
        if self.line.is_empty() {
            self.flush_footer()?;
            return Ok(true);
        }
        let text = Charset::Latin1.decode(&self.line)?.into_owned();
        if text.starts_with([' ', '\t']) {
            let Some(pending) = self.pending_footer.as_mut() else {
                return Err(ProtocolError::MalformedFooter { line: text }.into());
            };
            pending.append_folded(text.trim_matches([' ', '\t']));
            let limit = self.config.max_footer_line_length_value();
            if limit > 0 && pending.name().len() + pending.value().len() + 2 > limit {
                return Err(FramingError::LineTooLong { limit }.into());
            }
        } else {
            let header = Header::parse(&text)?;
            self.flush_footer()?;
            self.pending_footer = Some(header);
        }
        self.line.clear();
        Ok(false)
    }

    fn flush_footer(&mut self) -> Result<(), CodecError> {
        if let Some(header) = self.pending_footer.take() {
            let limit = self.config.max_footer_count_value();
            if self.footers.len() >= limit {
                return Err(ProtocolError::TooManyFooters { limit }.into());
            }
            self.footers.push(header);
        }
        Ok(())
    }

    fn premature_close(&self) -> CodecError {
        let err = match self.state {
            State::Data { size, remaining } => EofError::TruncatedChunk {
                received: size - remaining,
                expected: size,
            },
            State::Footers => EofError::MidFooters,
            State::Size | State::DataCrlf | State::Done => EofError::MidChunkFraming,
        };
        report(err.into())
    }
}

impl ContentDecoder for ChunkDecoder {
    fn read<R: Read + ?Sized>(
        &mut self,
        channel: &mut R,
        buffer: &mut SessionInputBuffer,
        dst: &mut [u8],
    ) -> Result<Option<usize>, CodecError> {
        if self.state == State::Done {
            return Ok(None);
        }
        let mut total = 0;
        let mut end_of_stream = false;
        loop {
            while total < dst.len() {
                let Some(data) = self
                    .next_payload(buffer.as_bytes_mut(), dst.len() - total)
                    .map_err(report)?
                else {
                    break;
                };
                dst[total..total + data.len()].copy_from_slice(&data);
                total += data.len();
            }
            if self.state == State::Done || total == dst.len() {
                break;
            }
            if end_of_stream {
                return Err(self.premature_close());
            }
            match buffer.fill(channel).map_err(|e| report(e.into()))? {
                None => end_of_stream = true,
                Some(0) => break,
                Some(n) => self.metrics.increment(n as u64),
            }
        }
        add_codec_bytes(Direction::Inbound, total as u64);
        if total == 0 && self.state == State::Done {
            return Ok(None);
        }
        Ok(Some(total))
    }

    fn is_completed(&self) -> bool { self.state == State::Done }

    fn metrics(&self) -> &TransportMetrics { &self.metrics }
}

impl Decoder for ChunkDecoder {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let before = src.len();
        let data = self.next_payload(src, usize::MAX);
        // Framing consumed from `src` counts as wire bytes, as on the channel path.
        self.metrics.increment((before - src.len()) as u64);
        let data = data.map_err(report)?;
        if let Some(data) = &data {
            add_codec_bytes(Direction::Inbound, data.len() as u64);
        }
        Ok(data)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(data) => Ok(Some(data)),
            None if self.is_completed() => Ok(None),
            None => Err(self.premature_close()),
        }
    }
}

/// Move bytes up to and including the next LF from `src` into `line`.
///
/// Returns `true` once a full line is in `line` (terminator stripped). A
/// partial line is kept in `line` and `src` is drained, so the next call
/// continues it.
fn take_line(src: &mut BytesMut, line: &mut BytesMut, limit: usize) -> Result<bool, CodecError> {
    let Some(pos) = src.iter().position(|&b| b == b'\n') else {
        line.extend_from_slice(src);
        src.clear();
        // A trailing CR may still be followed by its LF.
        if limit > 0 && line.len() > limit + 1 {
            return Err(FramingError::LineTooLong { limit }.into());
        }
        return Ok(false);
    };
    line.extend_from_slice(&src[..pos]);
    src.advance(pos + 1);
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    if limit > 0 && line.len() > limit {
        return Err(FramingError::LineTooLong { limit }.into());
    }
    Ok(true)
}

/// Parse `size[;ext...]`, discarding extensions.
fn parse_chunk_size(line: &[u8]) -> Result<u64, CodecError> {
    let size_part = line
        .iter()
        .position(|&b| b == b';')
        .map_or(line, |separator| &line[..separator]);
    let digits = size_part.trim_ascii();
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_hexdigit) {
        return Err(FramingError::InvalidChunkSize {
            line: String::from_utf8_lossy(line).into_owned(),
        }
        .into());
    }
    let digits = String::from_utf8_lossy(digits);
    u64::from_str_radix(&digits, 16).map_err(|_| {
        FramingError::ChunkSizeOverflow {
            digits: digits.into_owned(),
        }
        .into()
    })
}

fn invalid_terminator(src: &BytesMut) -> CodecError {
    FramingError::InvalidChunkTerminator {
        found: src.iter().take(2).copied().collect(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(b"5" as &[u8], 5)]
    #[case(b"1a", 26)]
    #[case(b"FF;name=value", 255)]
    #[case(b"10 ; ext", 16)]
    #[case(b"0", 0)]
    fn chunk_size_lines_parse(#[case] line: &[u8], #[case] expected: u64) {
        assert_eq!(parse_chunk_size(line).expect("valid chunk size"), expected);
    }

    #[rstest]
    #[case(b"5zz" as &[u8])]
    #[case(b"")]
    #[case(b";ext")]
    #[case(b"+5")]
    #[case(b"-1")]
    #[case(b"0x10")]
    fn chunk_size_garbage_is_malformed(#[case] line: &[u8]) {
        let err = parse_chunk_size(line).expect_err("garbage must be rejected");
        assert!(err.is_malformed(), "unexpected error: {err}");
    }

    #[test]
    fn chunk_size_overflow_is_malformed() {
        let err = parse_chunk_size(b"1ffffffffffffffff").expect_err("overflow must be rejected");
        assert!(matches!(err, CodecError::Framing(FramingError::ChunkSizeOverflow { .. })));
    }

    #[test]
    fn take_line_resumes_across_fragments() {
        let mut line = BytesMut::new();
        let mut src = BytesMut::from(&b"1"[..]);
        assert!(!take_line(&mut src, &mut line, 16).expect("partial line"));
        src.extend_from_slice(b"a\r");
        assert!(!take_line(&mut src, &mut line, 16).expect("partial line"));
        src.extend_from_slice(b"\nrest");
        assert!(take_line(&mut src, &mut line, 16).expect("complete line"));
        assert_eq!(&line[..], b"1a");
        assert_eq!(&src[..], b"rest");
    }

    #[test]
    fn folded_footer_joins_continuation() {
        let mut decoder = ChunkDecoder::new();
        let mut src = BytesMut::from(&b"0\r\nX-Note: first\r\n\t second\r\n\r\n"[..]);
        assert!(decoder.decode(&mut src).expect("decode").is_none());
        assert!(decoder.is_completed());
        assert_eq!(decoder.footers(), &[Header::new("X-Note", "first second")]);
    }

    #[test]
    fn continuation_without_footer_is_malformed() {
        let mut decoder = ChunkDecoder::new();
        let mut src = BytesMut::from(&b"0\r\n folded\r\n\r\n"[..]);
        let err = decoder.decode(&mut src).expect_err("orphan continuation");
        assert!(matches!(err, CodecError::Protocol(ProtocolError::MalformedFooter { .. })));
    }

    #[test]
    fn footer_count_limit_is_enforced() {
        let mut decoder = ChunkDecoder::with_config(ChunkConfig::default().max_footer_count(1));
        let mut src = BytesMut::from(&b"0\r\nA: 1\r\nB: 2\r\n\r\n"[..]);
        let err = decoder.decode(&mut src).expect_err("too many footers");
        assert!(matches!(err, CodecError::Protocol(ProtocolError::TooManyFooters { limit: 1 })));
    }

    #[test]
    fn overlong_size_line_is_rejected() {
        let mut decoder = ChunkDecoder::with_config(ChunkConfig::default().max_line_length(4));
        let mut src = BytesMut::from(&b"000000001\r\n"[..]);
        let err = decoder.decode(&mut src).expect_err("line too long");
        assert!(matches!(err, CodecError::Framing(FramingError::LineTooLong { limit: 4 })));
    }

    #[test]
    fn framed_decode_counts_wire_bytes() {
        let wire = b"3\r\nabc\r\n0\r\n\r\n";
        let mut decoder = ChunkDecoder::new();
        let mut src = BytesMut::from(&wire[..]);
        let mut body = Vec::new();
        while let Some(data) = decoder.decode(&mut src).expect("decode") {
            body.extend_from_slice(&data);
        }

        assert_eq!(body, b"abc");
        assert!(decoder.is_completed());
        assert!(src.is_empty());
        assert_eq!(decoder.metrics().bytes_transferred(), wire.len() as u64);
    }

    #[test]
    fn reset_allows_decoding_a_second_body() {
        let mut decoder = ChunkDecoder::new();
        let mut src = BytesMut::from(&b"0\r\nA: 1\r\n\r\n"[..]);
        assert!(decoder.decode(&mut src).expect("decode").is_none());
        assert!(decoder.is_completed());

        decoder.reset();
        assert!(!decoder.is_completed());
        assert!(decoder.footers().is_empty());

        let mut src = BytesMut::from(&b"1\r\nz\r\n0\r\n\r\n"[..]);
        let data = decoder.decode(&mut src).expect("decode").expect("payload");
        assert_eq!(&data[..], b"z");
    }
}
