//! Finite-Field Diffie-Hellman
//!
//! Ephemeral key pairs over the Odnix group and the AuthKey derived from
//! their shared secret.
//!
//! ```text
//! client                                  server
//!   b  <- [1, p-2]                          a  <- [1, p-2]
//!   gb  = g^b mod p  ───── gb ─────►        ga  = g^a mod p
//!                    ◄──── ga ─────
//!   s   = ga^b mod p                        s   = gb^a mod p
//!
//!   auth_key    = SHA-256(be_bytes(s))
//!   auth_key_id = SHA-1(auth_key)[12..20]
//! ```
//!
//! The exchange is unauthenticated. It protects against passive observers
//! only.

use num_bigint::{BigUint, RandBigInt};
use odnix_core::{bigint, DhParameters, AUTH_KEY_ID_SIZE, AUTH_KEY_SIZE};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::errors::{CryptoError, CryptoResult};
use crate::hashing::{OdnixHash, SHA1_SIZE};

/// Shared session key, 32 bytes
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuthKey([u8; AUTH_KEY_SIZE]);

impl AuthKey {
    /// Hash a raw DH shared secret into an AuthKey.
    pub fn from_shared_secret(shared: &BigUint) -> Self {
        let encoded = Zeroizing::new(bigint::to_bytes_be(shared));
        Self(OdnixHash::sha256(&encoded))
    }

    /// Wrap existing key bytes
    pub fn from_bytes(bytes: [u8; AUTH_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; AUTH_KEY_SIZE] {
        &self.0
    }

    /// Last 8 bytes of `SHA-1(auth_key)`
    pub fn id(&self) -> [u8; AUTH_KEY_ID_SIZE] {
        let digest = OdnixHash::sha1(&self.0);
        let mut id = [0u8; AUTH_KEY_ID_SIZE];
        id.copy_from_slice(&digest[SHA1_SIZE - AUTH_KEY_ID_SIZE..]);
        id
    }
}

impl PartialEq for AuthKey {
    fn eq(&self, other: &Self) -> bool {
        crate::hashing::constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for AuthKey {}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthKey")
            .field("id", &hex::encode(self.id()))
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Ephemeral DH key pair
///
/// The private exponent is held as big-endian bytes so it can be wiped.
/// [`DhKeyPair::agree`] consumes the pair, so one pair yields one secret.
pub struct DhKeyPair {
    private: Zeroizing<Vec<u8>>,
    public: BigUint,
}

impl DhKeyPair {
    /// Generate a pair with a private exponent uniform in `[1, p - 2]`.
    pub fn generate(params: &DhParameters) -> Self {
        let mut rng = rand::thread_rng();
        let low = BigUint::from(1u32);
        loop {
            let private = rng.gen_biguint_range(&low, params.private_upper_bound());
            let pair = Self::from_private(params, private);
            if params.is_valid_public(&pair.public) {
                return pair;
            }
        }
    }

    /// Generate a pair with a `bits`-bit private exponent.
    ///
    /// Cheaper than [`DhKeyPair::generate`]; used on the client side.
    pub fn generate_short(params: &DhParameters, bits: u64) -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let private = rng.gen_biguint(bits);
            if private.bits() == 0 || &private >= params.private_upper_bound() {
                continue;
            }
            let pair = Self::from_private(params, private);
            if params.is_valid_public(&pair.public) {
                return pair;
            }
        }
    }

    /// Build a pair from a known exponent
    pub fn from_private(params: &DhParameters, private: BigUint) -> Self {
        let public = params.public_value(&private);
        Self {
            private: Zeroizing::new(private.to_bytes_be()),
            public,
        }
    }

    /// Public value `g^private mod p`
    pub fn public(&self) -> &BigUint {
        &self.public
    }

    /// Public value as lower-case hex
    pub fn public_hex(&self) -> String {
        bigint::to_hex(&self.public)
    }

    /// Combine with the peer's public value and derive the AuthKey.
    ///
    /// Fails with [`CryptoError::InvalidPublicValue`] unless `1 < peer < p - 1`.
    pub fn agree(self, params: &DhParameters, peer_public: &BigUint) -> CryptoResult<AuthKey> {
        if !params.is_valid_public(peer_public) {
            return Err(CryptoError::InvalidPublicValue);
        }
        let private = BigUint::from_bytes_be(&self.private);
        let shared = params.shared_value(peer_public, &private);
        Ok(AuthKey::from_shared_secret(&shared))
    }

    /// Parse a hex public value and agree on it.
    pub fn agree_hex(self, params: &DhParameters, peer_hex: &str) -> CryptoResult<AuthKey> {
        let peer = bigint::parse_hex(peer_hex).ok_or(CryptoError::InvalidPublicValue)?;
        self.agree(params, &peer)
    }
}

impl std::fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyPair")
            .field("public_bits", &self.public.bits())
            .field("private", &"[REDACTED]")
            .finish()
    }
}
