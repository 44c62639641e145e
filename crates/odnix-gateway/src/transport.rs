//! Frame Transport
//!
//! Async channel abstraction the connection task talks through. The TCP
//! implementation splits the stream into buffered halves and speaks the
//! length-prefixed channel framing from `odnix_protocol::channel`.

use async_trait::async_trait;
use odnix_protocol::{read_frame, write_frame, ChannelFrame};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use crate::errors::GatewayResult;

/// Trait for bidirectional async frame transport.
#[async_trait]
pub trait FrameTransport: Send {
    /// Send one frame.
    async fn send(&mut self, frame: &ChannelFrame) -> GatewayResult<()>;

    /// Receive one frame, `None` once the peer has gone away.
    async fn receive(&mut self) -> GatewayResult<Option<ChannelFrame>>;

    /// Flush and shut down the write side.
    async fn close(&mut self) -> GatewayResult<()>;

    /// Peer address as a string.
    fn peer_addr(&self) -> &str;
}

/// Buffered framed connection over any split byte stream.
pub struct FramedConnection<R, W> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
    peer_addr: String,
    max_frame_size: usize,
}

/// Framed connection over a TCP stream
pub type TcpConnection = FramedConnection<ReadHalf<TcpStream>, WriteHalf<TcpStream>>;

impl<R, W> FramedConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap already split halves.
    pub fn new(reader: R, writer: W, peer_addr: impl Into<String>, max_frame_size: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            peer_addr: peer_addr.into(),
            max_frame_size,
        }
    }
}

impl TcpConnection {
    /// Create a framed connection from a TCP stream.
    pub fn from_tcp(stream: TcpStream, max_frame_size: usize) -> Self {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let (read_half, write_half) = tokio::io::split(stream);
        Self::new(read_half, write_half, peer_addr, max_frame_size)
    }
}

#[async_trait]
impl<R, W> FrameTransport for FramedConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: &ChannelFrame) -> GatewayResult<()> {
        write_frame(&mut self.writer, frame).await?;
        Ok(())
    }

    async fn receive(&mut self) -> GatewayResult<Option<ChannelFrame>> {
        Ok(read_frame(&mut self.reader, self.max_frame_size).await?)
    }

    async fn close(&mut self) -> GatewayResult<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odnix_protocol::DEFAULT_MAX_FRAME_SIZE;

    fn duplex_pair() -> (
        FramedConnection<ReadHalf<tokio::io::DuplexStream>, WriteHalf<tokio::io::DuplexStream>>,
        FramedConnection<ReadHalf<tokio::io::DuplexStream>, WriteHalf<tokio::io::DuplexStream>>,
    ) {
        let (a, b) = tokio::io::duplex(4096);
        let (ar, aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        (
            FramedConnection::new(ar, aw, "a", DEFAULT_MAX_FRAME_SIZE),
            FramedConnection::new(br, bw, "b", DEFAULT_MAX_FRAME_SIZE),
        )
    }

    #[tokio::test]
    async fn test_send_receive() {
        let (mut a, mut b) = duplex_pair();

        a.send(&ChannelFrame::Text("hello".into())).await.unwrap();
        a.send(&ChannelFrame::Binary(vec![1, 2, 3])).await.unwrap();

        assert_eq!(b.receive().await.unwrap(), Some(ChannelFrame::Text("hello".into())));
        assert_eq!(b.receive().await.unwrap(), Some(ChannelFrame::Binary(vec![1, 2, 3])));
        assert_eq!(b.peer_addr(), "b");
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let (mut a, mut b) = duplex_pair();

        a.send(&ChannelFrame::Close).await.unwrap();
        a.close().await.unwrap();

        assert_eq!(b.receive().await.unwrap(), Some(ChannelFrame::Close));
        assert_eq!(b.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tcp_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let mut conn = TcpConnection::from_tcp(stream, DEFAULT_MAX_FRAME_SIZE);
            conn.send(&ChannelFrame::Binary(vec![7; 32])).await.unwrap();
            conn.receive().await.unwrap()
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut server = TcpConnection::from_tcp(stream, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(server.receive().await.unwrap(), Some(ChannelFrame::Binary(vec![7; 32])));
        server.send(&ChannelFrame::Close).await.unwrap();

        assert_eq!(client_task.await.unwrap(), Some(ChannelFrame::Close));
    }
}
