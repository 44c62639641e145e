//! # Odnix Core
//!
//! Mathematical foundation for the Odnix transport: the fixed Diffie-Hellman
//! group and the arbitrary-precision arithmetic the handshake runs on.
//!
//! ## Group
//!
//! ```text
//! p = RFC 3526 2048-bit MODP prime
//! g = 3
//! public  = g^private mod p
//! shared  = peer_public^private mod p
//! ```
//!
//! Everything here is pure compute. Randomness, hashing and key handling live
//! in `odnix-crypto`.

pub mod bigint;
pub mod constants;

pub use bigint::*;
pub use constants::*;

pub use num_bigint::BigUint;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bigint::*;
    pub use crate::constants::*;
    pub use num_bigint::BigUint;
}
