//! # Token Error Types

use thiserror::Error;

/// Errors from parsing portal tokens and stored token hashes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// A presented token is not 64 lowercase hex characters.
    ///
    /// The offending value is deliberately not included.
    #[error("malformed portal token")]
    MalformedToken,

    /// A stored hash is not a 64-character hex SHA-256 digest.
    #[error("invalid token hash: {0}")]
    InvalidHash(String),
}
