//! Error types for odnix-crypto

use thiserror::Error;

/// Errors that can occur in odnix-crypto operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Ciphertext is empty or not a whole number of blocks
    #[error("Invalid ciphertext length: {0} bytes (need a non-zero multiple of 16)")]
    InvalidLength(usize),

    /// Trailing pad byte out of range or pad bytes inconsistent
    #[error("Invalid padding")]
    InvalidPadding,

    /// Peer public value outside (1, p - 1) or unparseable
    #[error("Invalid DH public value")]
    InvalidPublicValue,
}

/// Result type for odnix-crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;
