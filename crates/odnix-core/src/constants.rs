//! Odnix Group Constants
//!
//! Diffie-Hellman group parameters and the fixed sizes shared by every layer
//! of the transport.

// =============================================================================
// DIFFIE-HELLMAN GROUP
// =============================================================================

/// DH prime modulus `p`, big-endian hex.
///
/// The 2048-bit MODP group prime from RFC 3526 (group 14). It is a safe prime,
/// so every public value in `(1, p - 1)` lies in a subgroup of order `q` or `2q`.
pub const DH_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05",
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB",
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

/// DH generator `g`.
pub const DH_GENERATOR: u32 = 3;

/// Bit length of the DH prime.
pub const DH_PRIME_BITS: u64 = 2048;

/// Byte length of a value reduced modulo the DH prime.
pub const DH_PRIME_BYTES: usize = 256;

/// Bits of randomness in a client-side private exponent.
pub const CLIENT_PRIVATE_BITS: u64 = 256;

// =============================================================================
// KEY AND NONCE SIZES
// =============================================================================

/// AuthKey size (SHA-256 output)
pub const AUTH_KEY_SIZE: usize = 32;

/// Auth key identifier size
pub const AUTH_KEY_ID_SIZE: usize = 8;

/// Message key size (truncated SHA-256)
pub const MESSAGE_KEY_SIZE: usize = 16;

/// Handshake nonce size
pub const NONCE_SIZE: usize = 16;

/// Per-session salt size
pub const SALT_SIZE: usize = 8;

/// Per-session identifier size
pub const SESSION_ID_SIZE: usize = 8;

/// AES block size
pub const BLOCK_SIZE: usize = 16;

/// Full IGE IV (two chaining blocks)
pub const IGE_IV_SIZE: usize = 2 * BLOCK_SIZE;

/// AES-256 key size
pub const CIPHER_KEY_SIZE: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prime_hex_length() {
        assert_eq!(DH_PRIME_HEX.len(), DH_PRIME_BYTES * 2);
        assert!(DH_PRIME_HEX.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sizes_consistent() {
        assert_eq!(IGE_IV_SIZE, 32);
        assert_eq!(DH_PRIME_BITS as usize, DH_PRIME_BYTES * 8);
        assert!(MESSAGE_KEY_SIZE < AUTH_KEY_SIZE);
    }
}
