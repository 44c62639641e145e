//! Odnix Wire Format
//!
//! ## Wire Frame
//!
//! ```text
//! +-------------+-------------+---------------------------+
//! | AuthKeyId   | MessageKey  | AES-256-IGE ciphertext    |
//! | 8 bytes     | 16 bytes    | N bytes (N % 16 == 0)     |
//! +-------------+-------------+---------------------------+
//! ```
//!
//! ## Inner Payload (plaintext under the ciphertext)
//!
//! ```text
//! +------+-----------+--------+--------+--------+------+---------+
//! | Salt | SessionId | MsgId  | SeqNo  | Length | Data | Padding |
//! | 8B   | 8B        | 8B LE  | 4B LE  | 4B LE  | len  | 12..27B |
//! +------+-----------+--------+--------+--------+------+---------+
//! ```
//!
//! `SeqNo` is absent in the [`PayloadLayout::Compact`] layout. Padding is
//! random and brings the total to a multiple of 16.

use odnix_core::{AUTH_KEY_ID_SIZE, BLOCK_SIZE, MESSAGE_KEY_SIZE, SALT_SIZE, SESSION_ID_SIZE};
use rand::RngCore;

use crate::constants::*;
use crate::errors::{ProtocolError, ProtocolResult};
use crate::session::{Salt, SessionId};

/// Encrypted envelope as it travels on the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    /// Identifies the AuthKey that encrypted this frame
    pub auth_key_id: [u8; AUTH_KEY_ID_SIZE],
    /// Truncated SHA-256 over the inner payload
    pub message_key: [u8; MESSAGE_KEY_SIZE],
    /// IGE ciphertext
    pub ciphertext: Vec<u8>,
}

impl WireFrame {
    /// Create a new wire frame
    pub fn new(
        auth_key_id: [u8; AUTH_KEY_ID_SIZE],
        message_key: [u8; MESSAGE_KEY_SIZE],
        ciphertext: Vec<u8>,
    ) -> Self {
        Self {
            auth_key_id,
            message_key,
            ciphertext,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.extend_from_slice(&self.auth_key_id);
        buf.extend_from_slice(&self.message_key);
        buf.extend_from_slice(&self.ciphertext);
        buf
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() < WIRE_HEADER_SIZE {
            return Err(ProtocolError::MalformedFrame(format!(
                "frame too short: {} bytes (need at least {})",
                data.len(),
                WIRE_HEADER_SIZE
            )));
        }

        let (header, ciphertext) = data.split_at(WIRE_HEADER_SIZE);
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(ProtocolError::MalformedFrame(format!(
                "ciphertext length {} is not a positive multiple of {}",
                ciphertext.len(),
                BLOCK_SIZE
            )));
        }

        let mut auth_key_id = [0u8; AUTH_KEY_ID_SIZE];
        auth_key_id.copy_from_slice(&header[..AUTH_KEY_ID_SIZE]);
        let mut message_key = [0u8; MESSAGE_KEY_SIZE];
        message_key.copy_from_slice(&header[AUTH_KEY_ID_SIZE..]);

        Ok(Self {
            auth_key_id,
            message_key,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Total encoded size
    pub fn size(&self) -> usize {
        WIRE_HEADER_SIZE + self.ciphertext.len()
    }
}

/// Decrypted inner payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerPayload {
    /// Sender's session salt
    pub salt: Salt,
    /// Sender's session id
    pub session_id: SessionId,
    /// Time-derived message id
    pub msg_id: u64,
    /// Sequence number (zero in the compact layout)
    pub seq_no: u32,
    /// Application data
    pub data: Vec<u8>,
}

impl InnerPayload {
    /// Create a new inner payload
    pub fn new(salt: Salt, session_id: SessionId, msg_id: u64, seq_no: u32, data: Vec<u8>) -> Self {
        Self {
            salt,
            session_id,
            msg_id,
            seq_no,
            data,
        }
    }

    /// Serialize with random padding
    pub fn encode(&self, layout: PayloadLayout) -> ProtocolResult<Vec<u8>> {
        let data_len = u32::try_from(self.data.len()).map_err(|_| ProtocolError::PayloadTooLarge {
            got: self.data.len(),
            max: u32::MAX as usize,
        })?;

        let unpadded = layout.header_size() + self.data.len();
        let pad_len = padding_len(unpadded);

        let mut buf = Vec::with_capacity(unpadded + pad_len);
        buf.extend_from_slice(self.salt.as_bytes());
        buf.extend_from_slice(self.session_id.as_bytes());
        buf.extend_from_slice(&self.msg_id.to_le_bytes());
        if layout.has_seq_no() {
            buf.extend_from_slice(&self.seq_no.to_le_bytes());
        }
        buf.extend_from_slice(&data_len.to_le_bytes());
        buf.extend_from_slice(&self.data);

        let mut padding = vec![0u8; pad_len];
        rand::thread_rng().fill_bytes(&mut padding);
        buf.extend_from_slice(&padding);

        Ok(buf)
    }

    /// Deserialize, validating the length field and padding
    pub fn decode(data: &[u8], layout: PayloadLayout) -> ProtocolResult<Self> {
        let header_size = layout.header_size();
        if data.len() < header_size {
            return Err(ProtocolError::MalformedFrame(format!(
                "inner payload too short: {} bytes (need at least {})",
                data.len(),
                header_size
            )));
        }
        if data.len() % BLOCK_SIZE != 0 {
            return Err(ProtocolError::MalformedFrame(format!(
                "inner payload length {} is not block aligned",
                data.len()
            )));
        }

        let mut offset = 0;
        let salt = Salt::from_slice(&data[offset..offset + SALT_SIZE])?;
        offset += SALT_SIZE;
        let session_id = SessionId::from_slice(&data[offset..offset + SESSION_ID_SIZE])?;
        offset += SESSION_ID_SIZE;
        let msg_id = read_u64(&data[offset..offset + MSG_ID_SIZE]);
        offset += MSG_ID_SIZE;
        let seq_no = if layout.has_seq_no() {
            let v = read_u32(&data[offset..offset + SEQ_NO_SIZE]);
            offset += SEQ_NO_SIZE;
            v
        } else {
            0
        };
        let declared = read_u32(&data[offset..offset + LENGTH_SIZE]) as usize;
        offset += LENGTH_SIZE;

        let remaining = data.len() - offset;
        if declared > remaining {
            return Err(ProtocolError::MalformedFrame(format!(
                "declared length {} exceeds remaining {} bytes",
                declared, remaining
            )));
        }

        let pad_len = remaining - declared;
        if !(MIN_PADDING..MAX_PADDING).contains(&pad_len) {
            return Err(ProtocolError::MalformedFrame(format!(
                "padding of {} bytes outside [{}, {})",
                pad_len, MIN_PADDING, MAX_PADDING
            )));
        }

        Ok(Self {
            salt,
            session_id,
            msg_id,
            seq_no,
            data: data[offset..offset + declared].to_vec(),
        })
    }
}

/// Padding needed after `unpadded` bytes: at least 12, total a multiple of 16
pub fn padding_len(unpadded: usize) -> usize {
    let pad = BLOCK_SIZE - (unpadded % BLOCK_SIZE);
    if pad < MIN_PADDING {
        pad + BLOCK_SIZE
    } else {
        pad
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}
