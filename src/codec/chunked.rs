//! Chunked transfer coding (RFC 7230 §4.1).

mod decoder;
mod encoder;

pub use decoder::ChunkDecoder;
pub use encoder::ChunkEncoder;

use super::CodecError;

/// Default limit on a chunk-size line, extensions included.
pub const DEFAULT_MAX_CHUNK_LINE_LENGTH: usize = 1024;
/// Default limit on the number of footers after the last chunk.
pub const DEFAULT_MAX_FOOTER_COUNT: usize = 100;
/// Default limit on a single (unfolded) footer line.
pub const DEFAULT_MAX_FOOTER_LINE_LENGTH: usize = 8 * 1024;
/// Default upper bound on the payload carried by one encoded chunk.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Limits applied by [`ChunkDecoder`] and [`ChunkEncoder`].
///
/// # Examples
///
/// ```
/// use wireline::codec::ChunkConfig;
///
/// let config = ChunkConfig::default().max_chunk_size(1024).max_footer_count(8);
/// assert_eq!(config.max_chunk_size_value(), 1024);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    max_line_length: usize,
    max_footer_count: usize,
    max_footer_line_length: usize,
    max_chunk_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_CHUNK_LINE_LENGTH,
            max_footer_count: DEFAULT_MAX_FOOTER_COUNT,
            max_footer_line_length: DEFAULT_MAX_FOOTER_LINE_LENGTH,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

impl ChunkConfig {
    /// Longest accepted chunk-size line.
    #[must_use]
    pub fn max_line_length(mut self, length: usize) -> Self {
        self.max_line_length = length;
        self
    }

    /// Most footers accepted after the last chunk.
    #[must_use]
    pub fn max_footer_count(mut self, count: usize) -> Self {
        self.max_footer_count = count;
        self
    }

    /// Longest accepted footer, folded continuation lines included.
    #[must_use]
    pub fn max_footer_line_length(mut self, length: usize) -> Self {
        self.max_footer_line_length = length;
        self
    }

    /// Largest payload the encoder places in one chunk.
    #[must_use]
    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    /// Configured chunk-size line limit.
    #[must_use]
    pub const fn max_line_length_value(&self) -> usize { self.max_line_length }

    /// Configured footer count limit.
    #[must_use]
    pub const fn max_footer_count_value(&self) -> usize { self.max_footer_count }

    /// Configured footer line limit.
    #[must_use]
    pub const fn max_footer_line_length_value(&self) -> usize { self.max_footer_line_length }

    /// Configured encoder chunk size.
    #[must_use]
    pub const fn max_chunk_size_value(&self) -> usize { self.max_chunk_size }

    fn validate_for_encoder(self) -> Result<Self, CodecError> {
        if self.max_chunk_size == 0 {
            return Err(CodecError::InvalidArgument("maximum chunk size must be positive"));
        }
        Ok(self)
    }
}
