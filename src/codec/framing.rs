//! Selecting body framing from message headers (RFC 7230 §3.3.3).

use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{
    BodyChunk,
    ChunkConfig,
    ChunkDecoder,
    ChunkEncoder,
    CodecError,
    ContentDecoder,
    ContentEncoder,
    Header,
    IdentityDecoder,
    IdentityEncoder,
    LengthDelimitedDecoder,
    LengthDelimitedEncoder,
    ProtocolError,
};
use crate::{
    buffer::{SessionInputBuffer, SessionOutputBuffer},
    metrics::TransportMetrics,
};

/// How the body of a message is delimited on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentFraming {
    /// The body runs until the connection closes.
    Identity,
    /// The body is exactly this many bytes.
    Length(u64),
    /// The body uses chunked transfer coding.
    Chunked,
}

impl ContentFraming {
    /// Framing of a request body with `headers`.
    ///
    /// A request with neither `Transfer-Encoding` nor `Content-Length` has no
    /// body.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] for invalid or conflicting
    /// `Content-Length` values, or a transfer coding that does not end in
    /// `chunked`.
    ///
    /// # Examples
    ///
    /// ```
    /// use wireline::codec::{ContentFraming, Header};
    ///
    /// let headers = [Header::new("Content-Length", "42")];
    /// assert_eq!(ContentFraming::for_request(&headers).unwrap(), ContentFraming::Length(42));
    /// assert_eq!(ContentFraming::for_request(&[]).unwrap(), ContentFraming::Length(0));
    /// ```
    pub fn for_request(headers: &[Header]) -> Result<Self, CodecError> { select(headers, true) }

    /// Framing of a response body with `headers`.
    ///
    /// A response with neither header is delimited by connection close, as is
    /// one whose transfer coding does not end in `chunked`.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] for invalid or conflicting
    /// `Content-Length` values.
    pub fn for_response(headers: &[Header]) -> Result<Self, CodecError> { select(headers, false) }

    /// Decoder for this framing with default chunk limits.
    #[must_use]
    pub fn decoder(self) -> BodyDecoder { self.decoder_with_config(ChunkConfig::default()) }

    /// Decoder for this framing, applying `config` to chunked bodies.
    #[must_use]
    pub fn decoder_with_config(self, config: ChunkConfig) -> BodyDecoder {
        match self {
            Self::Identity => BodyDecoder::Identity(IdentityDecoder::new()),
            Self::Length(length) => BodyDecoder::Length(LengthDelimitedDecoder::new(length)),
            Self::Chunked => BodyDecoder::Chunked(ChunkDecoder::with_config(config)),
        }
    }

    /// Encoder for this framing with default chunk limits.
    #[must_use]
    pub fn encoder(self) -> BodyEncoder {
        match self {
            Self::Identity => BodyEncoder::Identity(IdentityEncoder::new()),
            Self::Length(length) => BodyEncoder::Length(LengthDelimitedEncoder::new(length)),
            Self::Chunked => BodyEncoder::Chunked(ChunkEncoder::new()),
        }
    }
}

fn select(headers: &[Header], is_request: bool) -> Result<ContentFraming, CodecError> {
    let codings: Vec<&str> = headers
        .iter()
        .filter(|h| h.is("Transfer-Encoding"))
        .flat_map(|h| h.value().split(','))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    if let Some(last) = codings.last() {
        if last.eq_ignore_ascii_case("chunked") {
            return Ok(ContentFraming::Chunked);
        }
        if is_request {
            return Err(ProtocolError::UnsupportedTransferEncoding {
                value: codings.join(", "),
            }
            .into());
        }
        return Ok(ContentFraming::Identity);
    }

    let mut length = None;
    for value in headers
        .iter()
        .filter(|h| h.is("Content-Length"))
        .flat_map(|h| h.value().split(','))
        .map(str::trim)
    {
        let invalid = || ProtocolError::InvalidContentLength { value: value.to_owned() };
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid().into());
        }
        let parsed: u64 = value.parse().map_err(|_| invalid())?;
        match length {
            Some(previous) if previous != parsed => return Err(invalid().into()),
            _ => length = Some(parsed),
        }
    }
    Ok(match length {
        Some(length) => ContentFraming::Length(length),
        None if is_request => ContentFraming::Length(0),
        None => ContentFraming::Identity,
    })
}

macro_rules! dispatch {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Self::Identity($inner) => $body,
            Self::Length($inner) => $body,
            Self::Chunked($inner) => $body,
        }
    };
}

/// Decoder for whichever framing a message selected.
#[derive(Debug)]
pub enum BodyDecoder {
    /// Close-delimited body.
    Identity(IdentityDecoder),
    /// Body of a declared length.
    Length(LengthDelimitedDecoder),
    /// Chunked body.
    Chunked(ChunkDecoder),
}

impl BodyDecoder {
    /// Footers received after a chunked body; empty for other framings.
    #[must_use]
    pub fn footers(&self) -> &[Header] {
        match self {
            Self::Chunked(decoder) => decoder.footers(),
            Self::Identity(_) | Self::Length(_) => &[],
        }
    }
}

impl ContentDecoder for BodyDecoder {
    fn read<R: Read + ?Sized>(
        &mut self,
        channel: &mut R,
        buffer: &mut SessionInputBuffer,
        dst: &mut [u8],
    ) -> Result<Option<usize>, CodecError> {
        dispatch!(self, d => d.read(channel, buffer, dst))
    }

    fn is_completed(&self) -> bool { dispatch!(self, d => d.is_completed()) }

    fn metrics(&self) -> &TransportMetrics { dispatch!(self, d => d.metrics()) }
}

impl Decoder for BodyDecoder {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        dispatch!(self, d => d.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        dispatch!(self, d => d.decode_eof(src))
    }
}

/// Encoder for whichever framing a message selected.
#[derive(Debug)]
pub enum BodyEncoder {
    /// Close-delimited body.
    Identity(IdentityEncoder),
    /// Body of a declared length.
    Length(LengthDelimitedEncoder),
    /// Chunked body.
    Chunked(ChunkEncoder),
}

impl ContentEncoder for BodyEncoder {
    fn write<W: Write + ?Sized>(
        &mut self,
        channel: &mut W,
        buffer: &mut SessionOutputBuffer,
        src: &[u8],
    ) -> Result<usize, CodecError> {
        dispatch!(self, e => e.write(channel, buffer, src))
    }

    fn complete<W: Write + ?Sized>(
        &mut self,
        channel: &mut W,
        buffer: &mut SessionOutputBuffer,
    ) -> Result<(), CodecError> {
        dispatch!(self, e => e.complete(channel, buffer))
    }

    fn is_completed(&self) -> bool { dispatch!(self, e => e.is_completed()) }

    fn metrics(&self) -> &TransportMetrics { dispatch!(self, e => e.metrics()) }
}

impl Encoder<BodyChunk> for BodyEncoder {
    type Error = CodecError;

    fn encode(&mut self, item: BodyChunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dispatch!(self, e => e.encode(item, dst))
    }
}
