//! Unit tests for the content-transfer codecs.
//!
//! Decoders run against scripted non-blocking channels, so fragmentation,
//! `WouldBlock` and premature close are exercised deterministically.

use std::io::{self, Cursor};

use bytes::{Bytes, BytesMut};
use rstest::rstest;
use tokio_util::codec::{Decoder, Encoder};
use tracing_test::traced_test;
use wireline_testing::ScriptedChannel;

use super::*;
use crate::error::ErrorKind;

const SCENARIO: &[u8] = b"5\r\n01234\r\n5\r\n56789\r\n6\r\nabcdef\r\n0\r\n\r\n";
const WITH_FOOTERS: &[u8] = b"3;name=value\r\nabc\r\n1\r\nd\r\n0\r\nChecksum: 42\r\nX-Note: first\r\n second\r\n\r\n";

fn decode_all<D: ContentDecoder>(
    decoder: &mut D,
    channel: &mut ScriptedChannel,
    buffer: &mut SessionInputBuffer,
) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    let mut dst = [0_u8; 7];
    while let Some(n) = decoder.read(channel, buffer, &mut dst)? {
        out.extend_from_slice(&dst[..n]);
    }
    Ok(out)
}

#[test]
fn chunked_scenario_decodes_sixteen_bytes() {
    let mut channel = ScriptedChannel::new().data(SCENARIO);
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = ChunkDecoder::new();

    let body = decode_all(&mut decoder, &mut channel, &mut buffer).expect("valid chunked body");

    assert_eq!(body, b"0123456789abcdef");
    assert!(decoder.is_completed());
    assert!(decoder.footers().is_empty());
    assert_eq!(decoder.metrics().bytes_transferred(), SCENARIO.len() as u64);
}

#[test]
fn completed_decoder_never_touches_channel_again() {
    let mut channel = ScriptedChannel::new().data(SCENARIO).data(b"next message");
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = ChunkDecoder::new();
    decode_all(&mut decoder, &mut channel, &mut buffer).expect("valid chunked body");

    let reads = channel.reads();
    let transferred = decoder.metrics().bytes_transferred();
    let mut dst = [0_u8; 16];
    for _ in 0..3 {
        assert_eq!(decoder.read(&mut channel, &mut buffer, &mut dst).expect("read"), None);
    }
    assert_eq!(channel.reads(), reads);
    assert_eq!(decoder.metrics().bytes_transferred(), transferred);
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(5)]
#[case(13)]
#[case(WITH_FOOTERS.len())]
fn chunked_decoding_ignores_fragmentation(#[case] fragment: usize) {
    let mut channel = ScriptedChannel::fragmented(WITH_FOOTERS, fragment);
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = ChunkDecoder::new();

    let body = decode_all(&mut decoder, &mut channel, &mut buffer).expect("valid chunked body");

    assert_eq!(body, b"abcd");
    assert_eq!(
        decoder.footers(),
        &[Header::new("Checksum", "42"), Header::new("X-Note", "first second")]
    );
}

#[test]
fn chunked_decoder_returns_zero_while_channel_would_block() {
    let mut channel = ScriptedChannel::new().data(b"5\r\n01").would_block().data(b"234\r\n0\r\n\r\n");
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = ChunkDecoder::new();
    let mut dst = [0_u8; 16];

    assert_eq!(decoder.read(&mut channel, &mut buffer, &mut dst).expect("read"), Some(2));
    assert_eq!(decoder.read(&mut channel, &mut buffer, &mut dst).expect("read"), Some(3));
    assert_eq!(&dst[..3], b"234");
    assert_eq!(decoder.read(&mut channel, &mut buffer, &mut dst).expect("read"), None);
    assert!(decoder.is_completed());
}

#[test]
fn non_hex_chunk_size_is_malformed_not_premature() {
    let mut channel = ScriptedChannel::new().data(b"5\r\n01234\r\n5zz\r\n56789\r\n");
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = ChunkDecoder::new();

    let err = decode_all(&mut decoder, &mut channel, &mut buffer).expect_err("malformed size");

    assert!(err.is_malformed());
    assert!(!err.is_premature_close());
    assert_eq!(err.kind(), ErrorKind::MalformedFraming);
}

#[test]
#[traced_test]
fn codec_failures_are_traced_with_their_kind() {
    let mut channel = ScriptedChannel::new().data(b"zz\r\n");
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = ChunkDecoder::new();

    decode_all(&mut decoder, &mut channel, &mut buffer).expect_err("malformed size");

    assert!(logs_contain("content codec failed"));
    assert!(logs_contain("kind=malformed_framing"));
}

#[test]
fn truncated_chunk_is_premature_close() {
    let mut channel = ScriptedChannel::new().data(b"5\r\n012");
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = ChunkDecoder::new();

    let err = decode_all(&mut decoder, &mut channel, &mut buffer).expect_err("truncated body");

    assert!(err.is_premature_close());
    assert!(matches!(
        err,
        CodecError::Eof(EofError::TruncatedChunk { received: 3, expected: 5 })
    ));
    assert_eq!(err.kind(), ErrorKind::PrematureClose);
}

#[rstest]
#[case(b"5\r\n0123" as &[u8], "in size line")]
#[case(b"3\r\nabc\r", "in data terminator")]
#[case(b"0\r\nChecksum: 4", "in footers")]
#[case(b"", "before any byte")]
fn closure_anywhere_before_completion_fails(#[case] wire: &[u8], #[case] _where: &str) {
    let mut channel = ScriptedChannel::new().data(wire);
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = ChunkDecoder::new();

    let err = decode_all(&mut decoder, &mut channel, &mut buffer).expect_err("premature close");
    assert!(err.is_premature_close(), "unexpected error: {err}");
}

#[rstest]
#[case(b"3\r\nabcXY0\r\n\r\n" as &[u8])]
#[case(b"3\r\nabc\n0\r\n\r\n")]
#[case(b"3\r\nabc\rX0\r\n\r\n")]
fn chunk_data_must_end_with_crlf(#[case] wire: &[u8]) {
    let mut channel = ScriptedChannel::fragmented(wire, 1);
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = ChunkDecoder::new();

    let err = decode_all(&mut decoder, &mut channel, &mut buffer).expect_err("bad terminator");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::InvalidChunkTerminator { .. })
    ));
}

#[test]
fn footer_without_colon_is_protocol_error() {
    let mut channel = ScriptedChannel::new().data(b"0\r\nno colon here\r\n\r\n");
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = ChunkDecoder::new();

    let err = decode_all(&mut decoder, &mut channel, &mut buffer).expect_err("malformed footer");

    assert!(matches!(err, CodecError::Protocol(ProtocolError::MalformedFooter { .. })));
    assert!(!err.is_malformed());
    assert_eq!(io::Error::from(err).kind(), io::ErrorKind::InvalidData);
}

#[test]
fn bytes_after_terminal_chunk_stay_buffered() {
    let mut channel = ScriptedChannel::new().data(b"1\r\nz\r\n0\r\n\r\nHTTP/1.1 200 OK\r\n");
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = ChunkDecoder::new();

    let body = decode_all(&mut decoder, &mut channel, &mut buffer).expect("valid chunked body");

    assert_eq!(body, b"z");
    assert_eq!(buffer.peek(), b"HTTP/1.1 200 OK\r\n");
}

#[test]
fn length_decoder_leaves_surplus_on_channel() {
    let mut channel = ScriptedChannel::new().data(b"helloEXTRA");
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = LengthDelimitedDecoder::new(5);

    let body = decode_all(&mut decoder, &mut channel, &mut buffer).expect("complete body");

    assert_eq!(body, b"hello");
    assert!(decoder.is_completed());
    let mut rest = [0_u8; 16];
    let n = io::Read::read(&mut channel, &mut rest).expect("surplus still readable");
    assert_eq!(&rest[..n], b"EXTRA");
}

#[test]
fn length_decoder_counts_only_channel_bytes() {
    let mut prefill = ScriptedChannel::new().data(b"abc");
    let mut buffer = SessionInputBuffer::new();
    buffer.fill(&mut prefill).expect("fill");

    let mut channel = ScriptedChannel::new().data(b"defgh");
    let mut decoder = LengthDelimitedDecoder::new(8);
    let body = decode_all(&mut decoder, &mut channel, &mut buffer).expect("complete body");

    assert_eq!(body, b"abcdefgh");
    assert_eq!(decoder.metrics().bytes_transferred(), 5);
}

#[test]
fn zero_length_completes_without_reading() {
    let mut channel = ScriptedChannel::new().data(b"unrelated");
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = LengthDelimitedDecoder::new(0);
    let mut dst = [0_u8; 4];

    assert_eq!(decoder.read(&mut channel, &mut buffer, &mut dst).expect("read"), None);
    assert!(decoder.is_completed());
    assert_eq!(decoder.metrics().bytes_transferred(), 0);
    assert_eq!(channel.reads(), 0);
}

#[test]
fn short_length_body_is_truncated_content() {
    let mut channel = ScriptedChannel::new().data(b"abc");
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = LengthDelimitedDecoder::new(5);

    let err = decode_all(&mut decoder, &mut channel, &mut buffer).expect_err("truncated");
    assert!(matches!(
        err,
        CodecError::Eof(EofError::TruncatedContent { received: 3, expected: 5 })
    ));
}

#[test]
fn identity_decoder_runs_until_close() {
    let mut channel = ScriptedChannel::fragmented(b"close delimited", 4);
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = IdentityDecoder::new();

    let body = decode_all(&mut decoder, &mut channel, &mut buffer).expect("body");

    assert_eq!(body, b"close delimited");
    assert!(decoder.is_completed());
    assert_eq!(decoder.metrics().bytes_transferred(), 15);
}

#[test]
fn transfer_writes_payload_into_file() {
    let mut channel = ScriptedChannel::new().data(b"2\r\nhi\r\n3\r\nall\r\n0\r\n\r\n");
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = ChunkDecoder::new();
    let mut file = Cursor::new(b"> ".to_vec());
    let mut position = 2;

    while let Some(n) = decoder
        .transfer(&mut channel, &mut buffer, &mut file, position, 64)
        .expect("transfer")
    {
        position += n;
    }

    assert_eq!(file.into_inner(), b"> hiall");
}

#[test]
fn transfer_refuses_to_leave_a_gap() {
    let mut channel = ScriptedChannel::new().data(b"hello");
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = LengthDelimitedDecoder::new(5);
    let mut file = Cursor::new(Vec::new());

    let err = decoder
        .transfer(&mut channel, &mut buffer, &mut file, 10, 5)
        .expect_err("gap");

    assert!(matches!(&err, CodecError::Io(e) if e.kind() == io::ErrorKind::InvalidInput));
    assert_eq!(channel.reads(), 0);
}

#[test]
fn chunk_encoder_frames_writes_and_terminates_once() {
    let mut channel = ScriptedChannel::new();
    let mut buffer = SessionOutputBuffer::new();
    let mut encoder = ChunkEncoder::new();

    assert_eq!(encoder.write(&mut channel, &mut buffer, b"hello").expect("write"), 5);
    assert_eq!(encoder.write(&mut channel, &mut buffer, b"").expect("empty write"), 0);
    encoder.complete(&mut channel, &mut buffer).expect("complete");

    assert_eq!(channel.written(), b"5\r\nhello\r\n0\r\n\r\n");
    assert!(encoder.is_completed());
    assert!(matches!(
        encoder.write(&mut channel, &mut buffer, b"late"),
        Err(CodecError::InvalidState(_))
    ));
    assert!(matches!(
        encoder.complete(&mut channel, &mut buffer),
        Err(CodecError::InvalidState(_))
    ));
}

#[test]
fn chunk_encoder_emits_footers() {
    let mut channel = ScriptedChannel::new();
    let mut buffer = SessionOutputBuffer::new();
    let mut encoder = ChunkEncoder::new();

    encoder.write(&mut channel, &mut buffer, b"abc").expect("write");
    encoder
        .complete_with_footers(&mut channel, &mut buffer, &[Header::new("Checksum", "42")])
        .expect("complete");

    assert_eq!(channel.written(), b"3\r\nabc\r\n0\r\nChecksum: 42\r\n\r\n");
}

#[test]
fn chunk_encoder_stops_accepting_when_saturated() {
    let mut channel = ScriptedChannel::new();
    channel.block_writes();
    let mut buffer = SessionOutputBuffer::new();
    let mut encoder = ChunkEncoder::new();
    let payload = vec![b'x'; 4096];

    assert_eq!(encoder.write(&mut channel, &mut buffer, &payload).expect("write"), 4096);
    assert_eq!(encoder.write(&mut channel, &mut buffer, &payload).expect("write"), 0);

    channel.unblock_writes();
    assert_eq!(encoder.write(&mut channel, &mut buffer, b"y").expect("write"), 1);
    assert!(buffer.is_empty());
    assert!(channel.written().starts_with(b"1000\r\n"));
    assert!(channel.written().ends_with(b"\r\n1\r\ny\r\n"));
}

#[test]
fn chunk_encoder_transfers_from_file() {
    let mut channel = ScriptedChannel::new();
    let mut buffer = SessionOutputBuffer::new();
    let mut encoder = ChunkEncoder::new();
    let mut file = Cursor::new(b"__payload".to_vec());

    let n = encoder
        .transfer(&mut channel, &mut buffer, &mut file, 2, 100)
        .expect("transfer");

    assert_eq!(n, 7);
    assert_eq!(channel.written(), b"7\r\npayload\r\n");
}

#[test]
fn length_encoder_accepts_up_to_declared_length() {
    let mut channel = ScriptedChannel::new();
    let mut buffer = SessionOutputBuffer::new();
    let mut encoder = LengthDelimitedEncoder::new(5);

    assert!(matches!(
        encoder.complete(&mut channel, &mut buffer),
        Err(CodecError::InvalidState(_))
    ));
    assert_eq!(encoder.write(&mut channel, &mut buffer, b"0123456789").expect("write"), 5);
    assert!(encoder.is_completed());
    assert_eq!(channel.written(), b"01234");

    encoder.complete(&mut channel, &mut buffer).expect("complete");
    encoder.complete(&mut channel, &mut buffer).expect("complete again");
}

#[test]
fn completed_encoders_reject_both_write_paths() {
    let mut channel = ScriptedChannel::new();
    let mut buffer = SessionOutputBuffer::new();
    let mut file = Cursor::new(b"data".to_vec());
    let mut encoder = LengthDelimitedEncoder::new(2);
    encoder.write(&mut channel, &mut buffer, b"ab").expect("write");

    assert!(matches!(
        encoder.write(&mut channel, &mut buffer, b"c"),
        Err(CodecError::InvalidState(_))
    ));
    assert!(matches!(
        encoder.transfer(&mut channel, &mut buffer, &mut file, 0, 4),
        Err(CodecError::InvalidState(_))
    ));
}

#[test]
fn identity_encoder_completes_once() {
    let mut channel = ScriptedChannel::new();
    let mut buffer = SessionOutputBuffer::new();
    let mut encoder = IdentityEncoder::new();

    encoder.write(&mut channel, &mut buffer, b"raw").expect("write");
    encoder.complete(&mut channel, &mut buffer).expect("complete");

    assert_eq!(channel.written(), b"raw");
    assert!(matches!(
        encoder.complete(&mut channel, &mut buffer),
        Err(CodecError::InvalidState(_))
    ));
}

#[test]
fn tokio_codecs_round_trip_chunked_body() {
    let mut encoder = ChunkEncoder::new();
    let mut wire = BytesMut::new();
    for part in [&b"first"[..], b"", b"second"] {
        encoder
            .encode(BodyChunk::Data(Bytes::copy_from_slice(part)), &mut wire)
            .expect("encode");
    }
    encoder.encode(BodyChunk::End, &mut wire).expect("encode end");

    let mut decoder = ChunkDecoder::new();
    let mut body = Vec::new();
    while let Some(data) = decoder.decode_eof(&mut wire).expect("decode") {
        body.extend_from_slice(&data);
    }
    assert_eq!(body, b"firstsecond");
    assert!(decoder.is_completed());
}

#[test]
fn tokio_decode_eof_reports_truncation() {
    let mut decoder = LengthDelimitedDecoder::new(4);
    let mut src = BytesMut::from(&b"ab"[..]);
    assert_eq!(decoder.decode_eof(&mut src).expect("partial").as_deref(), Some(&b"ab"[..]));
    let err = decoder.decode_eof(&mut src).expect_err("truncated");
    assert!(err.is_premature_close());
}

#[rstest]
#[case(&[], ContentFraming::Length(0))]
#[case(&[("Content-Length", "12")], ContentFraming::Length(12))]
#[case(&[("Content-Length", "7, 7")], ContentFraming::Length(7))]
#[case(&[("transfer-encoding", "chunked")], ContentFraming::Chunked)]
#[case(&[("Transfer-Encoding", "gzip, chunked"), ("Content-Length", "3")], ContentFraming::Chunked)]
fn request_framing_follows_headers(#[case] headers: &[(&str, &str)], #[case] expected: ContentFraming) {
    let headers: Vec<Header> = headers.iter().map(|(n, v)| Header::new(*n, *v)).collect();
    assert_eq!(ContentFraming::for_request(&headers).expect("framing"), expected);
}

#[rstest]
#[case(&[("Content-Length", "1"), ("Content-Length", "2")])]
#[case(&[("Content-Length", "-1")])]
#[case(&[("Content-Length", "")])]
#[case(&[("Transfer-Encoding", "gzip")])]
fn bad_request_framing_is_rejected(#[case] headers: &[(&str, &str)]) {
    let headers: Vec<Header> = headers.iter().map(|(n, v)| Header::new(*n, *v)).collect();
    let err = ContentFraming::for_request(&headers).expect_err("invalid framing");
    assert!(matches!(err, CodecError::Protocol(_)));
}

#[rstest]
#[case(&[], ContentFraming::Identity)]
#[case(&[("Transfer-Encoding", "gzip")], ContentFraming::Identity)]
#[case(&[("Content-Length", "0")], ContentFraming::Length(0))]
fn response_framing_defaults_to_identity(#[case] headers: &[(&str, &str)], #[case] expected: ContentFraming) {
    let headers: Vec<Header> = headers.iter().map(|(n, v)| Header::new(*n, *v)).collect();
    assert_eq!(ContentFraming::for_response(&headers).expect("framing"), expected);
}

#[test]
fn body_decoder_exposes_chunked_footers() {
    let mut channel = ScriptedChannel::new().data(WITH_FOOTERS);
    let mut buffer = SessionInputBuffer::new();
    let mut decoder = ContentFraming::Chunked.decoder();

    let body = decode_all(&mut decoder, &mut channel, &mut buffer).expect("body");

    assert_eq!(body, b"abcd");
    assert_eq!(decoder.footers().len(), 2);
    assert!(ContentFraming::Length(1).decoder().footers().is_empty());
}
