//! Session buffers sitting between a raw channel and the codecs.
//!
//! A [`SessionInputBuffer`] absorbs whatever the channel has ready and hands
//! bytes or complete lines to decoders and header parsers. A
//! [`SessionOutputBuffer`] collects framing and payload bytes from encoders
//! and flushes them to the channel as it becomes writable. Both grow on
//! demand and never drop unread bytes.

mod config;
mod input;
mod output;

pub use config::{BufferConfig, Charset};
pub use input::SessionInputBuffer;
pub use output::SessionOutputBuffer;
