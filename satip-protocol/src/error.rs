//! Error types for channel and parameter handling.

use thiserror::Error;

/// Errors raised while parsing a compact transponder parameter string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    /// A key letter that has no meaning in a parameter string.
    #[error("Unknown parameter key '{0}'")]
    UnknownKey(char),

    /// A key that requires a number was not followed by one.
    #[error("Missing value for parameter key '{0}'")]
    MissingValue(char),

    /// A key carries a number outside of its legal set.
    #[error("Invalid value {value} for parameter key '{key}'")]
    InvalidValue { key: char, value: u32 },
}

/// Errors raised while parsing a source code such as `S19.2E`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The string was empty.
    #[error("Empty source code")]
    Empty,

    /// The leading character is not one of `A`, `C`, `S` or `T`.
    #[error("Unknown source type '{0}'")]
    UnknownKind(char),

    /// The orbital position of a satellite source could not be read.
    #[error("Invalid orbital position: {0}")]
    InvalidPosition(String),
}
