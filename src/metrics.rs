//! Metric helpers for `wireline`.
//!
//! This module defines metric names and thin helpers wrapping the
//! [`metrics`](https://docs.rs/metrics) crate, plus [`TransportMetrics`], the
//! plain byte counter each codec and session buffer owns. With the `metrics`
//! feature disabled the recorder helpers are no-ops.

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::error::ErrorKind;

/// Name of the counter tracking lease outcomes.
pub const POOL_LEASES: &str = "wireline_pool_leases_total";
/// Name of the counter tracking connect outcomes.
pub const POOL_CONNECTS: &str = "wireline_pool_connects_total";
/// Name of the counter tracking idle entries evicted to make room.
pub const POOL_EVICTIONS: &str = "wireline_pool_evictions_total";
/// Name of the counter tracking body bytes moved by codecs.
pub const CODEC_BYTES: &str = "wireline_codec_bytes_total";
/// Name of the counter tracking codec failures.
pub const CODEC_ERRORS: &str = "wireline_codec_errors_total";

/// Direction of body bytes through a codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Bytes decoded from the wire.
    Inbound,
    /// Bytes encoded onto the wire.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Outcome label attached to lease and connect counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The operation produced a connection.
    Completed,
    /// The operation failed.
    Failed,
    /// The operation was cancelled.
    Cancelled,
    /// The operation timed out.
    Timeout,
}

impl Outcome {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Failed => "failed",
            Outcome::Cancelled => "cancelled",
            Outcome::Timeout => "timeout",
        }
    }
}

/// Record a resolved lease.
pub fn inc_leases(outcome: Outcome) {
    #[cfg(feature = "metrics")]
    counter!(POOL_LEASES, "outcome" => outcome.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// Record a resolved connect attempt.
pub fn inc_connects(outcome: Outcome) {
    #[cfg(feature = "metrics")]
    counter!(POOL_CONNECTS, "outcome" => outcome.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// Record an idle entry closed to free capacity for another lease.
pub fn inc_evictions() {
    #[cfg(feature = "metrics")]
    counter!(POOL_EVICTIONS).increment(1);
}

/// Record body bytes moved through a codec.
pub fn add_codec_bytes(direction: Direction, bytes: u64) {
    #[cfg(feature = "metrics")]
    counter!(CODEC_BYTES, "direction" => direction.as_str()).increment(bytes);
    #[cfg(not(feature = "metrics"))]
    let _ = (direction, bytes);
}

/// Record a codec failure.
pub fn inc_codec_errors(kind: ErrorKind) {
    #[cfg(feature = "metrics")]
    counter!(CODEC_ERRORS, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Byte counter owned by a codec or session buffer.
///
/// Codecs count only bytes they pull from (or push to) the channel
/// themselves; bytes that were already sitting in a session buffer were
/// counted by that buffer when it was filled. Driven through `tokio_util`,
/// a codec counts the bytes it consumes from or appends to the frame
/// buffer, chunk framing included.
///
/// The `wireline_codec_bytes_total` counter records body payload on both
/// paths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportMetrics {
    bytes_transferred: u64,
}

impl TransportMetrics {
    /// Create a zeroed counter.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Total bytes counted so far.
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 { self.bytes_transferred }

    /// Add `count` bytes to the counter.
    pub fn increment(&mut self, count: u64) {
        self.bytes_transferred = self.bytes_transferred.saturating_add(count);
    }

    /// Reset the counter to zero.
    pub fn reset(&mut self) { self.bytes_transferred = 0; }
}
