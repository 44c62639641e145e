//! # Odnix Crypto
//!
//! Cryptographic primitives for the Odnix secure transport.
//!
//! ## Components
//!
//! - **IGE**: AES-256 in Infinite Garble Extension mode with PKCS#7 padding
//! - **KDF**: SHA-256 message key, cipher key and IV schedule
//! - **Key Exchange**: finite-field Diffie-Hellman and the derived AuthKey
//! - **Hashing**: SHA-256 / SHA-1 helpers and constant-time comparison
//!
//! ## Security
//!
//! - Key material is zeroized on drop and redacted from `Debug` output
//! - IGE provides no integrity by itself; receivers must verify the message key
//! - The DH exchange is unauthenticated (passive-observer protection only)

pub mod errors;
pub mod hashing;
pub mod ige;
pub mod kdf;
pub mod key_exchange;

pub use errors::*;
pub use hashing::*;
pub use ige::*;
pub use kdf::*;
pub use key_exchange::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::hashing::*;
    pub use crate::ige::*;
    pub use crate::kdf::*;
    pub use crate::key_exchange::*;
}
