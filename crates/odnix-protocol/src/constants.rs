//! Protocol Constants
//!
//! Frame sizes, payload layouts, timeouts and error codes.

use odnix_core::{AUTH_KEY_ID_SIZE, MESSAGE_KEY_SIZE, SALT_SIZE, SESSION_ID_SIZE};
use serde::{Deserialize, Serialize};

/// Wire frame header: auth key id + message key
pub const WIRE_HEADER_SIZE: usize = AUTH_KEY_ID_SIZE + MESSAGE_KEY_SIZE;

/// Minimum random padding inside the inner payload
pub const MIN_PADDING: usize = 12;

/// Padding never reaches this many bytes
pub const MAX_PADDING: usize = MIN_PADDING + 16;

/// Message id field size
pub const MSG_ID_SIZE: usize = 8;

/// Sequence number field size
pub const SEQ_NO_SIZE: usize = 4;

/// Length field size
pub const LENGTH_SIZE: usize = 4;

/// Default cap on a single application payload
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Default cap on a single channel frame (payload plus envelope overhead)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 2 * 1024 * 1024;

/// Handshake timeout in seconds
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 30;

/// Session timeout in seconds (idle)
pub const SESSION_IDLE_TIMEOUT_SECS: u64 = 300;

/// Inner payload header layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadLayout {
    /// salt, session id, msg id, seq no, length
    #[default]
    Sequenced,
    /// salt, session id, msg id, length
    Compact,
}

impl PayloadLayout {
    /// Header bytes before the application data
    pub const fn header_size(self) -> usize {
        match self {
            PayloadLayout::Sequenced => {
                SALT_SIZE + SESSION_ID_SIZE + MSG_ID_SIZE + SEQ_NO_SIZE + LENGTH_SIZE
            }
            PayloadLayout::Compact => SALT_SIZE + SESSION_ID_SIZE + MSG_ID_SIZE + LENGTH_SIZE,
        }
    }

    /// Whether the sequence number field is present
    pub const fn has_seq_no(self) -> bool {
        matches!(self, PayloadLayout::Sequenced)
    }
}

/// Channel frame kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// UTF-8 text (handshake JSON or base64 wire frames)
    Text = 0x01,
    /// Raw wire frame
    Binary = 0x02,
    /// Orderly shutdown
    Close = 0x08,
}

impl FrameKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(FrameKind::Text),
            0x02 => Some(FrameKind::Binary),
            0x08 => Some(FrameKind::Close),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Error codes for logging and peer-facing close reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Unknown/generic error
    Unknown = 0x00,
    /// Frame could not be parsed
    MalformedFrame = 0x01,
    /// Message key did not match the decrypted payload
    IntegrityMismatch = 0x02,
    /// Frame carried a foreign auth key id
    UnknownAuthKey = 0x03,
    /// Payload operation before the handshake finished
    NotEstablished = 0x04,
    /// Handshake failed
    HandshakeFailed = 0x05,
    /// Handshake did not finish in time
    HandshakeTimeout = 0x06,
    /// Session already closed
    SessionClosed = 0x07,
    /// Payload or frame above the configured limit
    PayloadTooLarge = 0x08,
    /// Gateway at capacity
    ServerFull = 0x09,
}

impl ErrorCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => ErrorCode::MalformedFrame,
            0x02 => ErrorCode::IntegrityMismatch,
            0x03 => ErrorCode::UnknownAuthKey,
            0x04 => ErrorCode::NotEstablished,
            0x05 => ErrorCode::HandshakeFailed,
            0x06 => ErrorCode::HandshakeTimeout,
            0x07 => ErrorCode::SessionClosed,
            0x08 => ErrorCode::PayloadTooLarge,
            0x09 => ErrorCode::ServerFull,
            _ => ErrorCode::Unknown,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}
