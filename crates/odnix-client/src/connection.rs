//! Connection Management
//!
//! The framed TCP channel to the gateway and its counters.

use odnix_protocol::{read_frame, write_frame, ChannelFrame};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::errors::{ClientError, ClientResult};

/// Connection information
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Server address
    pub server_addr: SocketAddr,
    /// Connection time
    pub connected_at: Instant,
    /// Last activity time
    pub last_activity: Instant,
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Frames sent
    pub frames_sent: u64,
    /// Frames received
    pub frames_received: u64,
}

impl ConnectionInfo {
    /// Create new connection info
    pub fn new(server_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            server_addr,
            connected_at: now,
            last_activity: now,
            bytes_sent: 0,
            bytes_received: 0,
            frames_sent: 0,
            frames_received: 0,
        }
    }

    /// Record sent data
    pub fn record_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.frames_sent += 1;
        self.last_activity = Instant::now();
    }

    /// Record received data
    pub fn record_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
        self.frames_received += 1;
        self.last_activity = Instant::now();
    }

    /// Get connection duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Get idle time
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Framed channel to the gateway
pub struct ServerConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    max_frame_size: usize,
    info: ConnectionInfo,
}

impl ServerConnection {
    /// Connect to `addr` within `timeout`
    pub async fn connect(
        addr: SocketAddr,
        timeout: Duration,
        max_frame_size: usize,
    ) -> ClientResult<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(|e| ClientError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true).ok();

        debug!("TCP connection to {} open", addr);
        Ok(Self::from_stream(stream, addr, max_frame_size))
    }

    fn from_stream(stream: TcpStream, addr: SocketAddr, max_frame_size: usize) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            max_frame_size,
            info: ConnectionInfo::new(addr),
        }
    }

    /// Send one frame
    pub async fn send(&mut self, frame: &ChannelFrame) -> ClientResult<()> {
        write_frame(&mut self.writer, frame).await?;
        self.info.record_sent(frame.body().len());
        Ok(())
    }

    /// Receive one frame, `None` once the gateway has gone away
    pub async fn receive(&mut self) -> ClientResult<Option<ChannelFrame>> {
        let frame = read_frame(&mut self.reader, self.max_frame_size).await?;
        if let Some(frame) = &frame {
            self.info.record_received(frame.body().len());
        }
        Ok(frame)
    }

    /// Flush and shut down the write side
    pub async fn shutdown(&mut self) -> ClientResult<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Connection counters
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }
}
