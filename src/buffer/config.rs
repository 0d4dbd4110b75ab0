//! Configuration for session buffers.

use std::borrow::Cow;

use crate::codec::CodecError;

/// Default initial capacity and fill increment for session buffers.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;
/// Default upper bound on a single line read from a session buffer.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024;
/// Default number of buffered output bytes after which encoders flush
/// before accepting more payload.
pub const DEFAULT_FRAGMENT_SIZE_HINT: usize = 2 * 1024;

/// Character set used to turn header and footer lines into text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Charset {
    /// ISO-8859-1: every byte maps to the code point of the same value.
    #[default]
    Latin1,
    /// UTF-8; invalid sequences are rejected.
    Utf8,
}

impl Charset {
    /// Decode a raw line into text.
    ///
    /// # Errors
    /// Returns [`CodecError::Io`] with `InvalidData` if the bytes are not
    /// valid in this charset.
    pub fn decode<'a>(self, bytes: &'a [u8]) -> Result<Cow<'a, str>, CodecError> {
        match self {
            Self::Latin1 => {
                if bytes.is_ascii() {
                    // ASCII is valid UTF-8, so no copy is needed.
                    Ok(Cow::Borrowed(std::str::from_utf8(bytes).map_err(invalid_data)?))
                } else {
                    Ok(Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()))
                }
            }
            Self::Utf8 => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(invalid_data),
        }
    }

    /// Encode text into the bytes sent on the wire.
    ///
    /// # Errors
    /// Returns [`CodecError::Io`] with `InvalidData` when a character cannot
    /// be represented in this charset.
    pub fn encode<'a>(self, text: &'a str) -> Result<Cow<'a, [u8]>, CodecError> {
        match self {
            Self::Utf8 => Ok(Cow::Borrowed(text.as_bytes())),
            Self::Latin1 if text.is_ascii() => Ok(Cow::Borrowed(text.as_bytes())),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(invalid_data))
                .collect::<Result<Vec<u8>, _>>()
                .map(Cow::Owned),
        }
    }
}

fn invalid_data<E>(error: E) -> CodecError
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    CodecError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, error))
}

/// Tunables shared by [`SessionInputBuffer`](super::SessionInputBuffer) and
/// [`SessionOutputBuffer`](super::SessionOutputBuffer).
///
/// # Examples
///
/// ```
/// use wireline::buffer::{BufferConfig, Charset};
///
/// let config = BufferConfig::default()
///     .buffer_size(4096)
///     .charset(Charset::Utf8);
/// assert_eq!(config.buffer_size_value(), 4096);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferConfig {
    buffer_size: usize,
    max_line_length: usize,
    charset: Charset,
    fragment_size_hint: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            charset: Charset::Latin1,
            fragment_size_hint: DEFAULT_FRAGMENT_SIZE_HINT,
        }
    }
}

impl BufferConfig {
    /// Initial capacity, also used as the read size when filling.
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Longest line accepted by line reads. Zero disables the limit.
    #[must_use]
    pub fn max_line_length(mut self, length: usize) -> Self {
        self.max_line_length = length;
        self
    }

    /// Charset used for textual line access.
    #[must_use]
    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    /// Buffered output volume after which encoders flush before accepting
    /// more payload.
    #[must_use]
    pub fn fragment_size_hint(mut self, hint: usize) -> Self {
        self.fragment_size_hint = hint;
        self
    }

    /// Configured initial capacity.
    #[must_use]
    pub const fn buffer_size_value(&self) -> usize { self.buffer_size }

    /// Configured line limit; zero means unlimited.
    #[must_use]
    pub const fn max_line_length_value(&self) -> usize { self.max_line_length }

    /// Configured line charset.
    #[must_use]
    pub const fn charset_value(&self) -> Charset { self.charset }

    /// Configured flush threshold for encoders.
    #[must_use]
    pub const fn fragment_size_hint_value(&self) -> usize { self.fragment_size_hint }

    pub(crate) fn validate(self) -> Result<Self, CodecError> {
        if self.buffer_size == 0 {
            return Err(CodecError::InvalidArgument("buffer size must be positive"));
        }
        Ok(self)
    }
}
