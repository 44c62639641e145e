//! Big-Integer Arithmetic
//!
//! Modular exponentiation and the encodings used to move DH values across
//! the handshake: minimal big-endian bytes, lower-case hex, decimal.

use num_bigint::BigUint;
use std::sync::OnceLock;

use crate::constants::{DH_GENERATOR, DH_PRIME_HEX};

/// Compute `base^exponent mod modulus`.
///
/// # Panics
/// Panics if `modulus` is zero. The modulus always comes from
/// [`DhParameters`], so a zero modulus is a programming error.
pub fn modexp(base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> BigUint {
    assert!(modulus.bits() > 0, "modexp: modulus must be non-zero");
    base.modpow(exponent, modulus)
}

/// Minimal big-endian encoding (no leading zero bytes, `[0]` for zero).
pub fn to_bytes_be(value: &BigUint) -> Vec<u8> {
    value.to_bytes_be()
}

/// Lower-case hex without prefix or leading zeros.
pub fn to_hex(value: &BigUint) -> String {
    value.to_str_radix(16)
}

/// Parse hex, accepting an optional `0x` prefix and either case.
pub fn parse_hex(s: &str) -> Option<BigUint> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if s.is_empty() {
        return None;
    }
    BigUint::parse_bytes(s.as_bytes(), 16)
}

/// Parse a base-10 integer.
pub fn parse_decimal(s: &str) -> Option<BigUint> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    BigUint::parse_bytes(s.as_bytes(), 10)
}

/// Diffie-Hellman group parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhParameters {
    prime: BigUint,
    generator: BigUint,
    prime_minus_one: BigUint,
}

static STANDARD: OnceLock<DhParameters> = OnceLock::new();

impl DhParameters {
    /// The process-wide Odnix group.
    pub fn standard() -> &'static DhParameters {
        STANDARD.get_or_init(|| {
            let prime = BigUint::parse_bytes(DH_PRIME_HEX.as_bytes(), 16)
                .expect("DH_PRIME_HEX is a valid hex constant");
            Self::new(prime, BigUint::from(DH_GENERATOR))
        })
    }

    /// Build a custom group.
    ///
    /// # Panics
    /// Panics if `prime` is below 5, which leaves no valid public values.
    pub fn new(prime: BigUint, generator: BigUint) -> Self {
        assert!(prime >= BigUint::from(5u32), "DH prime is too small");
        let prime_minus_one = &prime - 1u32;
        Self {
            prime,
            generator,
            prime_minus_one,
        }
    }

    /// Prime modulus `p`
    pub fn prime(&self) -> &BigUint {
        &self.prime
    }

    /// Generator `g`
    pub fn generator(&self) -> &BigUint {
        &self.generator
    }

    /// `p` as a decimal string, the form carried in `res_dh_params`.
    pub fn prime_decimal(&self) -> String {
        self.prime.to_str_radix(10)
    }

    /// `g^exponent mod p`
    pub fn public_value(&self, exponent: &BigUint) -> BigUint {
        modexp(&self.generator, exponent, &self.prime)
    }

    /// `peer_public^exponent mod p`
    pub fn shared_value(&self, peer_public: &BigUint, exponent: &BigUint) -> BigUint {
        modexp(peer_public, exponent, &self.prime)
    }

    /// A peer public value must satisfy `1 < value < p - 1`.
    ///
    /// `0`, `1` and `p - 1` force the shared secret into a trivial subgroup.
    pub fn is_valid_public(&self, value: &BigUint) -> bool {
        *value > BigUint::from(1u32) && *value < self.prime_minus_one
    }

    /// Check a received `(p, g)` pair against this group.
    pub fn matches(&self, prime: &BigUint, generator: &BigUint) -> bool {
        self.prime == *prime && self.generator == *generator
    }

    /// Upper bound (exclusive) for a private exponent: `p - 1`.
    pub fn private_upper_bound(&self) -> &BigUint {
        &self.prime_minus_one
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DH_PRIME_BITS, DH_PRIME_BYTES};

    #[test]
    fn test_modexp_small() {
        let r = modexp(&BigUint::from(4u32), &BigUint::from(13u32), &BigUint::from(497u32));
        assert_eq!(r, BigUint::from(445u32));
    }

    #[test]
    fn test_modexp_zero_exponent() {
        let r = modexp(&BigUint::from(7u32), &BigUint::from(0u32), &BigUint::from(11u32));
        assert_eq!(r, BigUint::from(1u32));
    }

    #[test]
    #[should_panic(expected = "modulus must be non-zero")]
    fn test_modexp_zero_modulus_panics() {
        modexp(&BigUint::from(2u32), &BigUint::from(3u32), &BigUint::from(0u32));
    }

    #[test]
    fn test_standard_group_shape() {
        let params = DhParameters::standard();
        assert_eq!(params.prime().bits(), DH_PRIME_BITS);
        assert_eq!(to_bytes_be(params.prime()).len(), DH_PRIME_BYTES);
        assert_eq!(params.generator(), &BigUint::from(DH_GENERATOR));
    }

    #[test]
    fn test_fermat_witness() {
        // 3^(p-1) mod p == 1 for prime p
        let params = DhParameters::standard();
        let r = modexp(
            &BigUint::from(3u32),
            params.private_upper_bound(),
            params.prime(),
        );
        assert_eq!(r, BigUint::from(1u32));
    }

    #[test]
    fn test_shared_secret_symmetry() {
        let params = DhParameters::standard();
        let a = BigUint::parse_bytes(b"1d3c5f7e9a2b4c6d8e0f1a3b5c7d9e0f", 16).unwrap();
        let b = BigUint::parse_bytes(b"6a5b4c3d2e1f0a9b8c7d6e5f4a3b2c1d0e", 16).unwrap();

        let ga = params.public_value(&a);
        let gb = params.public_value(&b);

        assert_eq!(params.shared_value(&gb, &a), params.shared_value(&ga, &b));
    }

    #[test]
    fn test_public_value_validation() {
        let params = DhParameters::standard();
        let p_minus_one = params.private_upper_bound().clone();

        assert!(!params.is_valid_public(&BigUint::from(0u32)));
        assert!(!params.is_valid_public(&BigUint::from(1u32)));
        assert!(!params.is_valid_public(&p_minus_one));
        assert!(!params.is_valid_public(params.prime()));
        assert!(params.is_valid_public(&BigUint::from(2u32)));
        assert!(params.is_valid_public(&(&p_minus_one - 1u32)));
    }

    #[test]
    fn test_hex_roundtrip() {
        let v = BigUint::from(0xdead_beef_u64);
        assert_eq!(to_hex(&v), "deadbeef");
        assert_eq!(parse_hex("deadbeef"), Some(v.clone()));
        assert_eq!(parse_hex("0xDEADBEEF"), Some(v));
    }

    #[test]
    fn test_parse_hex_rejects_garbage() {
        assert_eq!(parse_hex(""), None);
        assert_eq!(parse_hex("0x"), None);
        assert_eq!(parse_hex("xyz"), None);
        assert_eq!(parse_hex("12 34"), None);
    }

    #[test]
    fn test_prime_decimal_parses_back() {
        let params = DhParameters::standard();
        let decimal = params.prime_decimal();
        assert_eq!(parse_decimal(&decimal).as_ref(), Some(params.prime()));
    }

    #[test]
    fn test_minimal_bytes() {
        assert_eq!(to_bytes_be(&BigUint::from(0x0102u32)), vec![1, 2]);
        assert_eq!(to_bytes_be(&BigUint::from(0u32)), vec![0]);
    }

    #[test]
    fn test_matches() {
        let params = DhParameters::standard();
        assert!(params.matches(params.prime(), &BigUint::from(3u32)));
        assert!(!params.matches(params.prime(), &BigUint::from(2u32)));
        assert!(!params.matches(&BigUint::from(23u32), &BigUint::from(3u32)));
    }
}
