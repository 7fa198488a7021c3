//! Message Delimiter
//!
//! A message ends at the first occurrence of the delimiter anywhere in the
//! text accumulated for a connection. The delimiter is an arbitrary non-empty
//! string; there is no escaping, so a payload cannot contain it.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The delimiter used when none is configured.
pub const DEFAULT_DELIMITER: &str = ";";

/// Errors produced when building a [`Delimiter`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The delimiter string was empty
    #[error("delimiter must not be empty")]
    EmptyDelimiter,

    /// An escape sequence in the delimiter was not recognised
    #[error("invalid escape sequence in delimiter: \\{0}")]
    InvalidEscape(char),

    /// The delimiter ended with a lone backslash
    #[error("delimiter ends with an unfinished escape sequence")]
    DanglingEscape,

    /// The delimiter holds a character the single-byte wire charset cannot carry
    #[error("delimiter character {0:?} is outside ISO-8859-1")]
    Unrepresentable(char),
}

/// A validated, non-empty end-of-message marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Delimiter(String);

impl Delimiter {
    /// Creates a delimiter from a literal string.
    pub fn new(delimiter: impl Into<String>) -> Result<Self, ConfigError> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(ConfigError::EmptyDelimiter);
        }
        // Received text only ever holds U+0000..=U+00FF
        if let Some(c) = delimiter.chars().find(|&c| u32::from(c) > 0xFF) {
            return Err(ConfigError::Unrepresentable(c));
        }
        Ok(Self(delimiter))
    }

    /// Creates a delimiter from a string containing backslash escapes.
    ///
    /// Supported escapes: `\n`, `\r`, `\t`, `\0` and `\\`. This is how the
    /// command line spells control characters, e.g. `--delimiter '\r\n'`.
    pub fn from_escaped(input: &str) -> Result<Self, ConfigError> {
        let mut out = String::with_capacity(input.len());
        let mut chars = input.chars();

        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('0') => out.push('\0'),
                Some('\\') => out.push('\\'),
                Some(other) => return Err(ConfigError::InvalidEscape(other)),
                None => return Err(ConfigError::DanglingEscape),
            }
        }

        Self::new(out)
    }

    /// Returns the delimiter text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the byte offset of the first occurrence of the delimiter in `text`.
    pub fn find_in(&self, text: &str) -> Option<usize> {
        text.find(self.0.as_str())
    }

    /// Returns true if `text` contains the delimiter.
    pub fn is_in(&self, text: &str) -> bool {
        self.find_in(text).is_some()
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self(DEFAULT_DELIMITER.to_string())
    }
}

impl FromStr for Delimiter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_escaped(s)
    }
}

impl fmt::Display for Delimiter {
    /// Writes the delimiter with control characters escaped, for logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_debug())
    }
}
