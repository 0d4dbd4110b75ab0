//! Minimal header representation used for chunk footers and framing
//! selection.

use std::fmt;

use super::error::{CodecError, ProtocolError};

/// A single `name: value` header or footer field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    /// Create a header from its parts.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse a single unfolded `name: value` line.
    ///
    /// Surrounding whitespace is trimmed from the value. The name must be
    /// non-empty and must not contain whitespace.
    ///
    /// # Errors
    /// Returns [`ProtocolError::MalformedFooter`] when the line has no colon
    /// or an unusable name.
    pub fn parse(line: &str) -> Result<Self, CodecError> {
        let malformed = || ProtocolError::MalformedFooter { line: line.to_owned() };
        let (name, value) = line.split_once(':').ok_or_else(malformed)?;
        if name.is_empty() || name.bytes().any(|b| b.is_ascii_whitespace()) {
            return Err(malformed().into());
        }
        Ok(Self::new(name, value.trim_matches([' ', '\t'])))
    }

    /// Header name as received.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Header value with surrounding whitespace removed.
    #[must_use]
    pub fn value(&self) -> &str { &self.value }

    /// Case-insensitive name comparison.
    #[must_use]
    pub fn is(&self, name: &str) -> bool { self.name.eq_ignore_ascii_case(name) }

    /// Join an obs-fold continuation onto the value with a single space.
    pub(crate) fn append_folded(&mut self, continuation: &str) {
        if continuation.is_empty() {
            return;
        }
        if !self.value.is_empty() {
            self.value.push(' ');
        }
        self.value.push_str(continuation);
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}: {}", self.name, self.value) }
}
