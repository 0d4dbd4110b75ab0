#![cfg(feature = "metrics")]
//! Tests for `wireline` metrics helpers.
//!
//! These tests verify that counters update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use bytes::{Bytes, BytesMut};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use tokio_util::codec::{Decoder, Encoder};
use wireline::{
    buffer::SessionInputBuffer,
    codec::{BodyChunk, ChunkDecoder, ChunkEncoder, ContentDecoder},
    metrics::{self as wm, Direction, Outcome},
};
use wireline_testing::ScriptedChannel;

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter_value(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(k, _, _, _)| {
            k.key().name() == name
                && label.is_none_or(|(key, value)| {
                    k.key()
                        .labels()
                        .any(|l| l.key() == key && l.value() == value)
                })
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case(Outcome::Completed, "completed")]
#[case(Outcome::Failed, "failed")]
#[case(Outcome::Cancelled, "cancelled")]
#[case(Outcome::Timeout, "timeout")]
fn lease_outcomes_are_labelled(#[case] outcome: Outcome, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || wm::inc_leases(outcome));
    assert_eq!(counter_value(&snapshotter, wm::POOL_LEASES, Some(("outcome", label))), 1);
}

#[test]
fn codec_bytes_accumulate_per_direction() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        wm::add_codec_bytes(Direction::Inbound, 10);
        wm::add_codec_bytes(Direction::Inbound, 6);
        wm::add_codec_bytes(Direction::Outbound, 3);
    });
    assert_eq!(counter_value(&snapshotter, wm::CODEC_BYTES, Some(("direction", "inbound"))), 16);
    assert_eq!(counter_value(&snapshotter, wm::CODEC_BYTES, Some(("direction", "outbound"))), 3);
}

#[test]
fn decoding_records_payload_bytes_and_failures() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let mut channel = ScriptedChannel::new().data(b"4\r\nwire\r\nxyz\r\n");
        let mut buffer = SessionInputBuffer::new();
        let mut decoder = ChunkDecoder::new();
        let mut dst = [0_u8; 4];
        assert_eq!(decoder.read(&mut channel, &mut buffer, &mut dst).ok().flatten(), Some(4));
        assert!(decoder.read(&mut channel, &mut buffer, &mut dst).is_err());
    });

    assert_eq!(counter_value(&snapshotter, wm::CODEC_BYTES, Some(("direction", "inbound"))), 4);
    assert_eq!(
        counter_value(&snapshotter, wm::CODEC_ERRORS, Some(("kind", "malformed_framing"))),
        1
    );
}

#[test]
fn framed_codecs_record_payload_bytes() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let mut encoder = ChunkEncoder::new();
        let mut wire = BytesMut::new();
        encoder
            .encode(BodyChunk::Data(Bytes::from_static(b"hello")), &mut wire)
            .expect("encode data");
        encoder.encode(BodyChunk::End, &mut wire).expect("encode end");

        let mut decoder = ChunkDecoder::new();
        while decoder.decode(&mut wire).expect("decode").is_some() {}
        assert!(decoder.is_completed());
    });

    assert_eq!(counter_value(&snapshotter, wm::CODEC_BYTES, Some(("direction", "outbound"))), 5);
    assert_eq!(counter_value(&snapshotter, wm::CODEC_BYTES, Some(("direction", "inbound"))), 5);
}

#[test]
fn evictions_are_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        (0..3).for_each(|_| wm::inc_evictions());
    });
    assert_eq!(counter_value(&snapshotter, wm::POOL_EVICTIONS, None), 3);
}
