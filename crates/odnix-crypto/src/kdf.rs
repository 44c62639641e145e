//! Message Key Derivation
//!
//! Per-message key material is derived from the AuthKey and the plaintext
//! being protected:
//!
//! ```text
//! message_key = SHA-256(auth_key || inner)[0..16]
//! cipher_key  = SHA-256(message_key || auth_key)
//! iv          = SHA-256(auth_key || message_key)
//! ```
//!
//! The receiver only gets `message_key` from the wire. After decrypting it
//! must recompute the key over the recovered plaintext and compare.

use odnix_core::{AUTH_KEY_SIZE, CIPHER_KEY_SIZE, IGE_IV_SIZE, MESSAGE_KEY_SIZE};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::hashing::{constant_time_eq, OdnixHash};

/// Cipher key and IV for one message
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MessageKeys {
    message_key: [u8; MESSAGE_KEY_SIZE],
    cipher_key: [u8; CIPHER_KEY_SIZE],
    iv: [u8; IGE_IV_SIZE],
}

impl MessageKeys {
    /// Message key carried on the wire
    pub fn message_key(&self) -> &[u8; MESSAGE_KEY_SIZE] {
        &self.message_key
    }

    /// AES-256 key
    pub fn cipher_key(&self) -> &[u8; CIPHER_KEY_SIZE] {
        &self.cipher_key
    }

    /// Two-block IGE IV
    pub fn iv(&self) -> &[u8; IGE_IV_SIZE] {
        &self.iv
    }
}

impl std::fmt::Debug for MessageKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageKeys")
            .field("message_key", &hex::encode(self.message_key))
            .field("cipher_key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}

/// Odnix key schedule
pub struct OdnixKdf;

impl OdnixKdf {
    /// `SHA-256(auth_key || inner)[0..16]`
    pub fn message_key(auth_key: &[u8; AUTH_KEY_SIZE], inner: &[u8]) -> [u8; MESSAGE_KEY_SIZE] {
        let digest = OdnixHash::sha256_many(&[auth_key.as_slice(), inner]);
        let mut key = [0u8; MESSAGE_KEY_SIZE];
        key.copy_from_slice(&digest[..MESSAGE_KEY_SIZE]);
        key
    }

    /// `SHA-256(message_key || auth_key)`
    pub fn cipher_key(
        message_key: &[u8; MESSAGE_KEY_SIZE],
        auth_key: &[u8; AUTH_KEY_SIZE],
    ) -> [u8; CIPHER_KEY_SIZE] {
        OdnixHash::sha256_many(&[message_key.as_slice(), auth_key.as_slice()])
    }

    /// `SHA-256(auth_key || message_key)`
    pub fn iv(
        auth_key: &[u8; AUTH_KEY_SIZE],
        message_key: &[u8; MESSAGE_KEY_SIZE],
    ) -> [u8; IGE_IV_SIZE] {
        OdnixHash::sha256_many(&[auth_key.as_slice(), message_key.as_slice()])
    }

    /// Expand a received message key into cipher key and IV.
    pub fn derive(auth_key: &[u8; AUTH_KEY_SIZE], message_key: &[u8; MESSAGE_KEY_SIZE]) -> MessageKeys {
        MessageKeys {
            message_key: *message_key,
            cipher_key: Self::cipher_key(message_key, auth_key),
            iv: Self::iv(auth_key, message_key),
        }
    }

    /// Full schedule for an outgoing plaintext.
    pub fn for_plaintext(auth_key: &[u8; AUTH_KEY_SIZE], inner: &[u8]) -> MessageKeys {
        let message_key = Self::message_key(auth_key, inner);
        Self::derive(auth_key, &message_key)
    }

    /// Recompute the message key over `inner` and compare with `received`.
    pub fn verify_message_key(
        auth_key: &[u8; AUTH_KEY_SIZE],
        inner: &[u8],
        received: &[u8; MESSAGE_KEY_SIZE],
    ) -> bool {
        let expected = Self::message_key(auth_key, inner);
        constant_time_eq(&expected, received)
    }
}
