//! Errors raised while building core values.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// A value could not be constructed from its raw input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Out-of-range or otherwise unusable input, such as package number 0.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier that does not parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
