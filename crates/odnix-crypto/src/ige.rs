//! AES-256 IGE Encryption
//!
//! Infinite Garble Extension mode built on raw AES-256 block operations.
//!
//! ```text
//! encrypt: C_i = E(P_i ^ C_{i-1}) ^ P_{i-1}
//! decrypt: P_i = D(C_i ^ P_{i-1}) ^ C_{i-1}
//! seeds:   C_0 = iv[0..16], P_0 = iv[16..32]
//! ```
//!
//! A flipped ciphertext bit garbles every following plaintext block, but IGE
//! is not authenticated on its own. Integrity comes from the message key
//! check in the session layer.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes256, Block};
use odnix_core::{BLOCK_SIZE, CIPHER_KEY_SIZE, IGE_IV_SIZE};

use crate::errors::{CryptoError, CryptoResult};

/// AES-256 in IGE mode
pub struct IgeCipher {
    cipher: Aes256,
}

impl IgeCipher {
    /// Create a new cipher with the given 32-byte key
    pub fn new(key: &[u8; CIPHER_KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256::new(GenericArray::from_slice(key)),
        }
    }

    /// PKCS#7-pad and encrypt.
    ///
    /// Always succeeds: padding makes the input block aligned, and an already
    /// aligned input gains a full block of padding.
    pub fn encrypt(&self, plaintext: &[u8], iv: &[u8; IGE_IV_SIZE]) -> Vec<u8> {
        let padded = pkcs7_pad(plaintext);
        self.encrypt_aligned(&padded, iv)
    }

    /// Decrypt and strip PKCS#7 padding.
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8; IGE_IV_SIZE]) -> CryptoResult<Vec<u8>> {
        let mut plaintext = self.decrypt_blocks(ciphertext, iv)?;
        let unpadded_len = pkcs7_unpadded_len(&plaintext)?;
        plaintext.truncate(unpadded_len);
        Ok(plaintext)
    }

    /// Encrypt block-aligned data without padding.
    pub fn encrypt_blocks(&self, data: &[u8], iv: &[u8; IGE_IV_SIZE]) -> CryptoResult<Vec<u8>> {
        check_aligned(data)?;
        Ok(self.encrypt_aligned(data, iv))
    }

    /// Decrypt block-aligned data without touching padding.
    pub fn decrypt_blocks(&self, data: &[u8], iv: &[u8; IGE_IV_SIZE]) -> CryptoResult<Vec<u8>> {
        check_aligned(data)?;

        let (mut prev_cipher, mut prev_plain) = split_iv(iv);
        let mut out = Vec::with_capacity(data.len());

        for chunk in data.chunks_exact(BLOCK_SIZE) {
            let mut block = Block::default();
            for i in 0..BLOCK_SIZE {
                block[i] = chunk[i] ^ prev_plain[i];
            }
            self.cipher.decrypt_block(&mut block);
            for i in 0..BLOCK_SIZE {
                block[i] ^= prev_cipher[i];
            }

            out.extend_from_slice(&block);
            prev_cipher.copy_from_slice(chunk);
            prev_plain.copy_from_slice(&block);
        }

        Ok(out)
    }

    fn encrypt_aligned(&self, data: &[u8], iv: &[u8; IGE_IV_SIZE]) -> Vec<u8> {
        debug_assert_eq!(data.len() % BLOCK_SIZE, 0);

        let (mut prev_cipher, mut prev_plain) = split_iv(iv);
        let mut out = Vec::with_capacity(data.len());

        for chunk in data.chunks_exact(BLOCK_SIZE) {
            let mut block = Block::default();
            for i in 0..BLOCK_SIZE {
                block[i] = chunk[i] ^ prev_cipher[i];
            }
            self.cipher.encrypt_block(&mut block);
            for i in 0..BLOCK_SIZE {
                block[i] ^= prev_plain[i];
            }

            out.extend_from_slice(&block);
            prev_cipher.copy_from_slice(&block);
            prev_plain.copy_from_slice(chunk);
        }

        out
    }

    /// Ciphertext length for a plaintext of `plaintext_len` bytes
    pub fn ciphertext_len(plaintext_len: usize) -> usize {
        plaintext_len + (BLOCK_SIZE - plaintext_len % BLOCK_SIZE)
    }
}

fn split_iv(iv: &[u8; IGE_IV_SIZE]) -> ([u8; BLOCK_SIZE], [u8; BLOCK_SIZE]) {
    let mut prev_cipher = [0u8; BLOCK_SIZE];
    let mut prev_plain = [0u8; BLOCK_SIZE];
    prev_cipher.copy_from_slice(&iv[..BLOCK_SIZE]);
    prev_plain.copy_from_slice(&iv[BLOCK_SIZE..]);
    (prev_cipher, prev_plain)
}

fn check_aligned(data: &[u8]) -> CryptoResult<()> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidLength(data.len()));
    }
    Ok(())
}

/// PKCS#7 padding to the AES block size
pub fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad_len, pad_len as u8);
    padded
}

/// Length of `data` once its PKCS#7 padding is removed.
///
/// The trailing byte must be in `[1, 16]` and every pad byte must repeat it.
pub fn pkcs7_unpadded_len(data: &[u8]) -> CryptoResult<usize> {
    let pad_len = *data.last().ok_or(CryptoError::InvalidPadding)? as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE || pad_len > data.len() {
        return Err(CryptoError::InvalidPadding);
    }

    let (body, pad) = data.split_at(data.len() - pad_len);
    if pad.iter().any(|&b| b as usize != pad_len) {
        return Err(CryptoError::InvalidPadding);
    }
    Ok(body.len())
}
