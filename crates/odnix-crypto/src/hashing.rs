//! Hashing
//!
//! SHA-256 drives the whole key schedule; SHA-1 is only used to fingerprint
//! the AuthKey into its 8-byte identifier.

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// SHA-256 output size
pub const HASH_SIZE: usize = 32;

/// SHA-1 output size
pub const SHA1_SIZE: usize = 20;

/// Hash function wrapper
pub struct OdnixHash;

impl OdnixHash {
    /// SHA-256 of `data`
    pub fn sha256(data: &[u8]) -> [u8; HASH_SIZE] {
        Sha256::digest(data).into()
    }

    /// SHA-256 over the concatenation of `parts`, without building it
    pub fn sha256_many(parts: &[&[u8]]) -> [u8; HASH_SIZE] {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().into()
    }

    /// SHA-1 of `data`
    pub fn sha1(data: &[u8]) -> [u8; SHA1_SIZE] {
        Sha1::digest(data).into()
    }
}

/// Constant-time comparison to prevent timing attacks
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_answer() {
        assert_eq!(
            hex::encode(OdnixHash::sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha1_known_answer() {
        assert_eq!(
            hex::encode(OdnixHash::sha1(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_sha256_many_matches_concatenation() {
        let joined = OdnixHash::sha256(b"auth-key||payload");
        let parts = OdnixHash::sha256_many(&[b"auth-key".as_slice(), b"||", b"payload"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn test_constant_time_eq() {
        let a = [1u8, 2, 3, 4];
        let b = [1u8, 2, 3, 4];
        let c = [1u8, 2, 3, 5];

        assert!(constant_time_eq(&a, &b));
        assert!(!constant_time_eq(&a, &c));
        assert!(!constant_time_eq(&a, &[1, 2, 3]));
    }
}
