//! TL Service Messages
//!
//! Minimal Type Language encoding for the service objects carried inside
//! established sessions. Every object starts with a little-endian 32-bit
//! constructor id.
//!
//! ```text
//! rpc_request         0x6a157529  JSON {method, params}
//! rpc_result          0xf35c6d01  req_msg_id:u64  JSON result
//! update_new_message  0x1f2b3c4d  message_id:u64  pts:u32  content:bytes
//! ```
//!
//! TL byte strings shorter than 254 bytes carry a 1-byte length, longer ones
//! `0xfe` plus a 3-byte length. Both are zero-padded to a 4-byte boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ProtocolError, ProtocolResult};

/// Longest TL byte string (3-byte length)
pub const MAX_TL_BYTES: usize = (1 << 24) - 1;

const LONG_BYTES_MARKER: u8 = 0xfe;

/// Append-only TL encoder
#[derive(Debug, Default)]
pub struct TlWriter {
    buf: Vec<u8>,
}

impl TlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Length-prefixed, 4-byte aligned byte string
    pub fn write_bytes(&mut self, data: &[u8]) -> ProtocolResult<()> {
        let len = data.len();
        let header = if len < LONG_BYTES_MARKER as usize {
            self.buf.push(len as u8);
            1
        } else if len <= MAX_TL_BYTES {
            self.buf.push(LONG_BYTES_MARKER);
            self.buf.extend_from_slice(&(len as u32).to_le_bytes()[..3]);
            4
        } else {
            return Err(ProtocolError::PayloadTooLarge {
                got: len,
                max: MAX_TL_BYTES,
            });
        };
        self.buf.extend_from_slice(data);
        self.buf.resize(self.buf.len() + tl_padding(header + len), 0);
        Ok(())
    }

    /// Unframed trailing bytes
    pub fn write_raw(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked TL decoder
#[derive(Debug)]
pub struct TlReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TlReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> ProtocolResult<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(ProtocolError::InvalidTl(format!(
                "need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.data.len() - self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> ProtocolResult<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_bytes(&mut self) -> ProtocolResult<&'a [u8]> {
        let first = self.take(1)?[0];
        let (len, header) = if first == LONG_BYTES_MARKER {
            let b = self.take(3)?;
            (u32::from_le_bytes([b[0], b[1], b[2], 0]) as usize, 4)
        } else if first < LONG_BYTES_MARKER {
            (first as usize, 1)
        } else {
            return Err(ProtocolError::InvalidTl(format!(
                "invalid length byte 0x{:02x}",
                first
            )));
        };
        let data = self.take(len)?;
        self.take(tl_padding(header + len))?;
        Ok(data)
    }

    /// Everything not yet consumed
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

fn tl_padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// A TL object with a fixed constructor id
pub trait TlObject: Sized {
    /// 32-bit constructor id
    const CONSTRUCTOR_ID: u32;

    /// Encode everything after the constructor id
    fn write_body(&self, writer: &mut TlWriter) -> ProtocolResult<()>;

    /// Decode everything after the constructor id
    fn read_body(reader: &mut TlReader<'_>) -> ProtocolResult<Self>;

    /// Serialize with constructor id
    fn to_bytes(&self) -> ProtocolResult<Vec<u8>> {
        let mut writer = TlWriter::new();
        writer.write_u32(Self::CONSTRUCTOR_ID);
        self.write_body(&mut writer)?;
        Ok(writer.finish())
    }

    /// Deserialize, checking the constructor id
    fn from_bytes(data: &[u8]) -> ProtocolResult<Self> {
        let mut reader = TlReader::new(data);
        let id = reader.read_u32()?;
        if id != Self::CONSTRUCTOR_ID {
            return Err(ProtocolError::InvalidTl(format!(
                "expected constructor 0x{:08x}, got 0x{:08x}",
                Self::CONSTRUCTOR_ID,
                id
            )));
        }
        Self::read_body(&mut reader)
    }
}

/// Method call with JSON parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

impl TlObject for RpcRequest {
    const CONSTRUCTOR_ID: u32 = 0x6a15_7529;

    fn write_body(&self, writer: &mut TlWriter) -> ProtocolResult<()> {
        writer.write_raw(&serde_json::to_vec(self)?);
        Ok(())
    }

    fn read_body(reader: &mut TlReader<'_>) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(reader.read_rest())?)
    }
}

/// Answer to the request sent with `req_msg_id`
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResult {
    pub req_msg_id: u64,
    pub result: Value,
}

impl TlObject for RpcResult {
    const CONSTRUCTOR_ID: u32 = 0xf35c_6d01;

    fn write_body(&self, writer: &mut TlWriter) -> ProtocolResult<()> {
        writer.write_u64(self.req_msg_id);
        writer.write_raw(&serde_json::to_vec(&self.result)?);
        Ok(())
    }

    fn read_body(reader: &mut TlReader<'_>) -> ProtocolResult<Self> {
        let req_msg_id = reader.read_u64()?;
        let result = serde_json::from_slice(reader.read_rest())?;
        Ok(Self { req_msg_id, result })
    }
}

/// Push notification for a new chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNewMessage {
    pub message_id: u64,
    pub pts: u32,
    pub content: String,
}

impl TlObject for UpdateNewMessage {
    const CONSTRUCTOR_ID: u32 = 0x1f2b_3c4d;

    fn write_body(&self, writer: &mut TlWriter) -> ProtocolResult<()> {
        writer.write_u64(self.message_id);
        writer.write_u32(self.pts);
        writer.write_bytes(self.content.as_bytes())
    }

    fn read_body(reader: &mut TlReader<'_>) -> ProtocolResult<Self> {
        let message_id = reader.read_u64()?;
        let pts = reader.read_u32()?;
        let content = String::from_utf8(reader.read_bytes()?.to_vec())
            .map_err(|_| ProtocolError::InvalidTl("content is not UTF-8".into()))?;
        Ok(Self {
            message_id,
            pts,
            content,
        })
    }
}

/// Decoded application payload
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationMessage {
    RpcRequest(RpcRequest),
    RpcResult(RpcResult),
    UpdateNewMessage(UpdateNewMessage),
    /// Plain structured record
    Json(Value),
}

impl ApplicationMessage {
    /// TL when the payload opens with a known constructor id, JSON otherwise.
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        let constructor = data
            .get(..4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));

        let message = match constructor {
            Some(id) if id == RpcRequest::CONSTRUCTOR_ID => {
                Self::RpcRequest(RpcRequest::from_bytes(data)?)
            }
            Some(id) if id == RpcResult::CONSTRUCTOR_ID => {
                Self::RpcResult(RpcResult::from_bytes(data)?)
            }
            Some(id) if id == UpdateNewMessage::CONSTRUCTOR_ID => {
                Self::UpdateNewMessage(UpdateNewMessage::from_bytes(data)?)
            }
            _ => Self::Json(serde_json::from_slice(data)?),
        };
        Ok(message)
    }

    /// Serialize for `wrap`
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        match self {
            Self::RpcRequest(req) => req.to_bytes(),
            Self::RpcResult(res) => res.to_bytes(),
            Self::UpdateNewMessage(update) => update.to_bytes(),
            Self::Json(value) => Ok(serde_json::to_vec(value)?),
        }
    }
}
