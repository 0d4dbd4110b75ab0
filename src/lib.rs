#![doc(html_root_url = "https://docs.rs/wireline/latest")]
//! Public API for the `wireline` library.
//!
//! This crate provides the transport core of an HTTP/1.1 client or server:
//! session buffers over non-blocking channels, incremental body codecs for
//! the identity, length-delimited and chunked framings, and a route-aware
//! pool of persistent connections.

pub mod buffer;
pub mod channel;
pub mod codec;
pub mod error;
pub mod metrics;
pub mod pool;

pub use buffer::{BufferConfig, Charset, SessionInputBuffer, SessionOutputBuffer};
pub use codec::{CodecError, ContentDecoder, ContentEncoder, ContentFraming};
pub use error::ErrorKind;
pub use metrics::{CODEC_BYTES, CODEC_ERRORS, POOL_CONNECTS, POOL_EVICTIONS, POOL_LEASES, TransportMetrics};
pub use pool::{ConnPool, PoolConfig, PoolEntry, PoolError, PoolStats};
