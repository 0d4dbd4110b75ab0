//! Scripted non-blocking channels.

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
};

#[derive(Debug)]
enum Step {
    Data(Vec<u8>),
    WouldBlock,
    Fail(io::ErrorKind),
}

/// In-memory channel replaying a script of reads and recording writes.
///
/// Each `read` call consumes at most one scripted step, so a payload split
/// into fragments reaches the codec one fragment per call. Once the script
/// is exhausted reads report end-of-stream, or `WouldBlock` when the channel
/// was built with [`keep_open`](Self::keep_open).
///
/// ```
/// use std::io::Read;
///
/// use wireline_testing::ScriptedChannel;
///
/// let mut channel = ScriptedChannel::new().data(b"ab").would_block().data(b"c");
/// let mut buf = [0_u8; 8];
/// assert_eq!(channel.read(&mut buf).unwrap(), 2);
/// assert!(channel.read(&mut buf).is_err());
/// assert_eq!(channel.read(&mut buf).unwrap(), 1);
/// assert_eq!(channel.read(&mut buf).unwrap(), 0);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    script: VecDeque<Step>,
    keep_open: bool,
    written: Vec<u8>,
    write_limit: Option<usize>,
    writes_blocked: bool,
    reads: usize,
}

impl ScriptedChannel {
    /// Create an empty channel that reports end-of-stream immediately.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Channel delivering `bytes` split into fragments of `size` bytes.
    #[must_use]
    pub fn fragmented(bytes: &[u8], size: usize) -> Self {
        bytes
            .chunks(size.max(1))
            .fold(Self::new(), |channel, fragment| channel.data(fragment))
    }

    /// Queue one read delivering `bytes`.
    #[must_use]
    pub fn data(mut self, bytes: &[u8]) -> Self {
        self.script.push_back(Step::Data(bytes.to_vec()));
        self
    }

    /// Queue one read reporting `WouldBlock`.
    #[must_use]
    pub fn would_block(mut self) -> Self {
        self.script.push_back(Step::WouldBlock);
        self
    }

    /// Queue one read failing with `kind`.
    #[must_use]
    pub fn fail(mut self, kind: io::ErrorKind) -> Self {
        self.script.push_back(Step::Fail(kind));
        self
    }

    /// Report `WouldBlock` instead of end-of-stream once the script is spent.
    #[must_use]
    pub fn keep_open(mut self) -> Self {
        self.keep_open = true;
        self
    }

    /// Accept at most `limit` bytes per `write` call.
    #[must_use]
    pub fn write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Make writes report `WouldBlock` until [`unblock_writes`](Self::unblock_writes).
    pub fn block_writes(&mut self) { self.writes_blocked = true; }

    /// Let writes through again.
    pub fn unblock_writes(&mut self) { self.writes_blocked = false; }

    /// Bytes written so far.
    #[must_use]
    pub fn written(&self) -> &[u8] { &self.written }

    /// Number of `read` calls observed.
    #[must_use]
    pub fn reads(&self) -> usize { self.reads }

    /// Returns `true` once every scripted step was consumed.
    #[must_use]
    pub fn is_drained(&self) -> bool { self.script.is_empty() }
}

impl Read for ScriptedChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        match self.script.pop_front() {
            None if self.keep_open => Err(io::ErrorKind::WouldBlock.into()),
            None => Ok(0),
            Some(Step::WouldBlock) => Err(io::ErrorKind::WouldBlock.into()),
            Some(Step::Fail(kind)) => Err(kind.into()),
            Some(Step::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.script.push_front(Step::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
        }
    }
}

impl Write for ScriptedChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.writes_blocked {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}
