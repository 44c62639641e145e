//! Channel Framing
//!
//! Message boundaries over a byte stream:
//!
//! ```text
//! +-------------+--------+------------------+
//! | Length      | Kind   | Body             |
//! | 4 bytes LE  | 1 byte | Length - 1 bytes |
//! +-------------+--------+------------------+
//! ```
//!
//! `Length` counts the kind byte plus the body. Oversized frames and unknown
//! kinds are rejected before the body is read.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::FrameKind;
use crate::errors::{ProtocolError, ProtocolResult};

/// One channel message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFrame {
    /// JSON handshake record or base64 wire frame
    Text(String),
    /// Raw wire frame
    Binary(Vec<u8>),
    /// Orderly shutdown
    Close,
}

impl ChannelFrame {
    /// Frame kind byte
    pub fn kind(&self) -> FrameKind {
        match self {
            ChannelFrame::Text(_) => FrameKind::Text,
            ChannelFrame::Binary(_) => FrameKind::Binary,
            ChannelFrame::Close => FrameKind::Close,
        }
    }

    /// Body bytes
    pub fn body(&self) -> &[u8] {
        match self {
            ChannelFrame::Text(text) => text.as_bytes(),
            ChannelFrame::Binary(data) => data,
            ChannelFrame::Close => &[],
        }
    }

    /// Serialize with the length prefix
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self.body();
        let len = (body.len() + 1) as u32;
        let mut buf = Vec::with_capacity(4 + 1 + body.len());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.push(self.kind().to_u8());
        buf.extend_from_slice(body);
        buf
    }

    fn from_parts(kind: FrameKind, body: Vec<u8>) -> ProtocolResult<Self> {
        match kind {
            FrameKind::Text => String::from_utf8(body)
                .map(ChannelFrame::Text)
                .map_err(|_| ProtocolError::MalformedFrame("text frame is not UTF-8".into())),
            FrameKind::Binary => Ok(ChannelFrame::Binary(body)),
            FrameKind::Close => Ok(ChannelFrame::Close),
        }
    }
}

/// Write one frame and flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &ChannelFrame,
) -> ProtocolResult<()> {
    writer.write_all(&frame.to_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// Returns `Ok(None)` when the stream ends cleanly before a new frame.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> ProtocolResult<Option<ChannelFrame>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_bytes) as usize;
    if len == 0 {
        return Err(ProtocolError::MalformedFrame("zero-length frame".into()));
    }
    if len > max_frame_size {
        return Err(ProtocolError::PayloadTooLarge {
            got: len,
            max: max_frame_size,
        });
    }

    let kind_byte = reader.read_u8().await?;
    let kind = FrameKind::from_u8(kind_byte).ok_or(ProtocolError::UnknownFrameKind(kind_byte))?;

    let mut body = vec![0u8; len - 1];
    reader.read_exact(&mut body).await?;

    ChannelFrame::from_parts(kind, body).map(Some)
}
