//! Property checks for chunked bodies crossing fragmented channels.
//!
//! Arbitrary payload sequences are encoded with a random maximum chunk size
//! and decoded from a channel that splits the wire bytes at a random
//! fragment size. The decoded body must match the concatenated payloads no
//! matter where the fragment boundaries fall.

use proptest::{
    collection::vec,
    prelude::{Strategy, any},
    prop_assert,
    prop_assert_eq,
    test_runner::{Config as ProptestConfig, RngAlgorithm, TestCaseError, TestRng, TestRunner},
};
use wireline::{
    buffer::{SessionInputBuffer, SessionOutputBuffer},
    codec::{ChunkConfig, ChunkDecoder, ChunkEncoder, ContentDecoder, ContentEncoder},
};
use wireline_testing::ScriptedChannel;

fn deterministic_runner(cases: u32) -> TestRunner {
    let config = ProptestConfig {
        cases,
        ..ProptestConfig::default()
    };
    let rng = TestRng::deterministic_rng(RngAlgorithm::ChaCha);
    TestRunner::new_with_rng(config, rng)
}

#[derive(Clone, Debug)]
struct Case {
    payloads: Vec<Vec<u8>>,
    max_chunk: usize,
    fragment: usize,
    scratch: usize,
}

fn case_strategy() -> impl Strategy<Value = Case> {
    (
        vec(vec(any::<u8>(), 0..300), 0..8),
        1_usize..64,
        1_usize..17,
        1_usize..128,
    )
        .prop_map(|(payloads, max_chunk, fragment, scratch)| Case {
            payloads,
            max_chunk,
            fragment,
            scratch,
        })
}

fn encode(case: &Case) -> Result<Vec<u8>, TestCaseError> {
    let config = ChunkConfig::default().max_chunk_size(case.max_chunk);
    let mut encoder = ChunkEncoder::with_config(config).map_err(|e| TestCaseError::fail(e.to_string()))?;
    let mut channel = ScriptedChannel::new();
    let mut buffer = SessionOutputBuffer::new();
    for payload in &case.payloads {
        let mut rest = payload.as_slice();
        while !rest.is_empty() {
            let n = encoder
                .write(&mut channel, &mut buffer, rest)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert!(n > 0, "unblocked channel must accept payload");
            prop_assert!(n <= case.max_chunk);
            rest = &rest[n..];
        }
    }
    encoder
        .complete(&mut channel, &mut buffer)
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert!(buffer.is_empty());
    Ok(channel.written().to_vec())
}

fn decode(wire: &[u8], case: &Case) -> Result<Vec<u8>, TestCaseError> {
    let mut decoder = ChunkDecoder::new();
    let mut channel = ScriptedChannel::fragmented(wire, case.fragment);
    let mut buffer = SessionInputBuffer::new();
    let mut dst = vec![0_u8; case.scratch];
    let mut body = Vec::new();
    // Every call yields payload or consumes a fragment until completion.
    for _ in 0..=2 * wire.len() + 2 {
        match decoder
            .read(&mut channel, &mut buffer, &mut dst)
            .map_err(|e| TestCaseError::fail(e.to_string()))?
        {
            None => return Ok(body),
            Some(n) => body.extend_from_slice(&dst[..n]),
        }
    }
    Err(TestCaseError::fail("decoder made no progress"))
}

#[test]
fn fragmented_chunked_bodies_decode_intact() {
    let mut runner = deterministic_runner(128);
    runner
        .run(&case_strategy(), |case| {
            let wire = encode(&case)?;
            let body = decode(&wire, &case)?;
            prop_assert_eq!(body, case.payloads.concat());
            Ok(())
        })
        .expect("generated chunked bodies should decode intact");
}

#[test]
fn truncated_chunked_bodies_never_decode_cleanly() {
    let strategy = case_strategy().prop_flat_map(|case| {
        let payloads = case.payloads.clone();
        (proptest::strategy::Just(case), 0_usize..=payloads.concat().len())
    });
    let mut runner = deterministic_runner(64);
    runner
        .run(&strategy, |(case, cut)| {
            let wire = encode(&case)?;
            let cut = cut.min(wire.len().saturating_sub(1));
            let mut decoder = ChunkDecoder::new();
            let mut channel = ScriptedChannel::fragmented(&wire[..cut], case.fragment);
            let mut buffer = SessionInputBuffer::new();
            let mut dst = vec![0_u8; case.scratch];
            for _ in 0..=2 * wire.len() + 2 {
                match decoder.read(&mut channel, &mut buffer, &mut dst) {
                    Err(e) => {
                        prop_assert!(e.is_premature_close(), "unexpected error: {e}");
                        return Ok(());
                    }
                    Ok(None) => return Err(TestCaseError::fail("truncated body completed")),
                    Ok(Some(_)) => {}
                }
            }
            Err(TestCaseError::fail("decoder made no progress"))
        })
        .expect("truncated chunked bodies should report premature close");
}
