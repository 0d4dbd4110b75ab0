//! Non-blocking channel conventions shared by session buffers and codecs.
//!
//! A channel is any [`Read`]/[`Write`] implementation following the
//! non-blocking conventions used by readiness-driven reactors:
//!
//! - `Err(WouldBlock)` means no bytes are ready right now;
//! - `Ok(0)` from `read` with a non-empty destination means end-of-stream;
//! - `Err(Interrupted)` is retried transparently.
//!
//! The helpers here fold those conventions into plain values so callers never
//! spin waiting for input.

use std::io::{self, Read, Seek, SeekFrom, Write};

/// Read whatever the channel has ready into `dst`.
///
/// Returns `Ok(Some(n))` with `n` possibly zero when nothing is ready, or
/// `Ok(None)` once the channel reports end-of-stream.
///
/// # Errors
/// Propagates any channel error other than `WouldBlock` and `Interrupted`.
pub fn read_ready<R: Read + ?Sized>(channel: &mut R, dst: &mut [u8]) -> io::Result<Option<usize>> {
    if dst.is_empty() {
        return Ok(Some(0));
    }
    loop {
        match channel.read(dst) {
            Ok(0) => return Ok(None),
            Ok(n) => return Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Some(0)),
            Err(e) => return Err(e),
        }
    }
}

/// Write as much of `src` as the channel accepts right now.
///
/// # Errors
/// Returns `WriteZero` if the channel accepts nothing without signalling
/// `WouldBlock`, and propagates any other channel error.
pub fn write_ready<W: Write + ?Sized>(channel: &mut W, src: &[u8]) -> io::Result<usize> {
    if src.is_empty() {
        return Ok(0);
    }
    loop {
        match channel.write(src) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "channel accepted no bytes",
                ));
            }
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
            Err(e) => return Err(e),
        }
    }
}

/// Positioned access to a file-like target used by `transfer` paths.
///
/// Implemented for every `Read + Write + Seek` type, which covers
/// [`std::fs::File`] and in-memory cursors.
pub trait FileChannel {
    /// Current size of the file in bytes.
    ///
    /// # Errors
    /// Propagates failures from the underlying file.
    fn size(&mut self) -> io::Result<u64>;

    /// Write `src` starting at `position`, returning the bytes written.
    ///
    /// # Errors
    /// Propagates failures from the underlying file.
    fn write_at(&mut self, src: &[u8], position: u64) -> io::Result<usize>;

    /// Read into `dst` starting at `position`, returning the bytes read.
    ///
    /// # Errors
    /// Propagates failures from the underlying file.
    fn read_at(&mut self, dst: &mut [u8], position: u64) -> io::Result<usize>;
}

impl<T: Read + Write + Seek> FileChannel for T {
    fn size(&mut self) -> io::Result<u64> { self.seek(SeekFrom::End(0)) }

    fn write_at(&mut self, src: &[u8], position: u64) -> io::Result<usize> {
        self.seek(SeekFrom::Start(position))?;
        self.write(src)
    }

    fn read_at(&mut self, dst: &mut [u8], position: u64) -> io::Result<usize> {
        self.seek(SeekFrom::Start(position))?;
        self.read(dst)
    }
}

/// Reject a write that would leave a hole between the file end and
/// `position`.
pub(crate) fn ensure_no_gap<F: FileChannel + ?Sized>(file: &mut F, position: u64) -> io::Result<()> {
    let size = file.size()?;
    if position > size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("position {position} is past the end of the file ({size} bytes)"),
        ));
    }
    Ok(())
}
