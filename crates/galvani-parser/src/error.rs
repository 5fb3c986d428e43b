//! Error types for galvani-parser.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("unknown component type: {0}")]
    UnknownType(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("circuit error: {0}")]
    Circuit(#[from] galvani_core::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn at(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
