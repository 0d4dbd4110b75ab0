//! Test doubles for exercising `wireline` without real sockets.
//!
//! [`ScriptedChannel`] replays a fixed script of reads against the codecs,
//! [`RecordingConnector`] captures the connect attempts a
//! [`ConnPool`](wireline::pool::ConnPool) makes so a test can settle them
//! by hand, and [`logger`] serialises access to captured log output.
//!
//! ```rust
//! use std::io::Read;
//!
//! use wireline_testing::ScriptedChannel;
//!
//! let mut channel = ScriptedChannel::fragmented(b"hello", 2);
//! let mut buf = [0_u8; 8];
//! assert_eq!(channel.read(&mut buf).unwrap(), 2);
//! ```

mod channel;
pub mod connector;
pub mod logging;

pub use channel::ScriptedChannel;
pub use connector::{ClosingFactory, RecordingConnector, StaticResolver, TestConnection, TestPool, test_pool};
pub use logging::{LoggerHandle, logger};
