//! Length-prefixed TCP transport.
//!
//! [`FramedTransport`] speaks the 2-byte length-prefixed framing described in
//! [`crate::transport`] over any `AsyncRead + AsyncWrite` stream.
//! [`TcpTransport`] is the concrete alias for `tokio::net::TcpStream`, and
//! [`TcpConnector`] opens such transports for the controller.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-tcp` feature is enabled
//! (it is enabled by default).
//!
//! # Cancel Safety
//!
//! [`recv`](Transport::recv) only awaits `AsyncReadExt::read`, which is
//! cancel-safe, and keeps partially received frames in an internal buffer, so
//! dropping the future between reads never loses bytes.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{MatchControlError, Result};
use crate::transport::{encode_frame, Connector, FrameDecoder, Transport};

/// Bytes requested from the stream per read.
const READ_CHUNK_LEN: usize = 4096;

/// A [`FramedTransport`] over a TCP connection.
pub type TcpTransport = FramedTransport<TcpStream>;

/// A [`Transport`] that frames payloads over a byte stream.
#[derive(Debug)]
pub struct FramedTransport<S> {
    stream: S,
    decoder: FrameDecoder,
    closed: bool,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an already-connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(),
            closed: false,
        }
    }
}

impl FramedTransport<TcpStream> {
    /// Open a TCP connection to `address` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::Connect`] if the connection cannot be established.
    pub async fn connect(address: &str) -> Result<Self> {
        tracing::debug!(address = %address, "connecting to core server");

        let stream =
            TcpStream::connect(address)
                .await
                .map_err(|source| MatchControlError::Connect {
                    address: address.to_string(),
                    source,
                })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(address = %address, "failed to set TCP_NODELAY: {e}");
        }

        tracing::info!(address = %address, "core server connection established");
        Ok(Self::new(stream))
    }

    /// Like [`connect`](Self::connect), but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::Connect`] with an
    /// [`ErrorKind::TimedOut`](std::io::ErrorKind::TimedOut) source if the
    /// deadline elapses.
    pub async fn connect_with_timeout(address: &str, timeout: Duration) -> Result<Self> {
        tokio::time::timeout(timeout, Self::connect(address))
            .await
            .map_err(|_| MatchControlError::Connect {
                address: address.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no connection after {timeout:?}"),
                ),
            })?
    }
}

#[async_trait]
impl<S> Transport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        if self.closed {
            return Err(MatchControlError::TransportClosed);
        }
        let bytes = encode_frame(&frame)?;
        self.stream
            .write_all(&bytes)
            .await
            .map_err(|e| MatchControlError::TransportSend(e.to_string()))?;
        self.stream
            .flush()
            .await
            .map_err(|e| MatchControlError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>>> {
        if self.closed {
            return None;
        }
        let mut chunk = [0u8; READ_CHUNK_LEN];
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Some(Ok(frame));
            }
            match self.stream.read(&mut chunk).await {
                Ok(0) if self.decoder.has_partial_frame() => {
                    return Some(Err(MatchControlError::TransportReceive(
                        "connection closed in the middle of a frame".into(),
                    )));
                }
                Ok(0) => return None,
                Ok(n) => match chunk.get(..n) {
                    Some(read) => self.decoder.extend(read),
                    None => {
                        return Some(Err(MatchControlError::TransportReceive(format!(
                            "read reported {n} bytes into a {READ_CHUNK_LEN}-byte buffer"
                        ))));
                    }
                },
                Err(e) => return Some(Err(MatchControlError::TransportReceive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Opens [`TcpTransport`]s.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on connection attempts after `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn Transport>> {
        let transport = match self.connect_timeout {
            Some(timeout) => TcpTransport::connect_with_timeout(address, timeout).await?,
            None => TcpTransport::connect(address).await?,
        };
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn tcp_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<TcpTransport>();
    }

    #[tokio::test]
    async fn send_writes_length_prefixed_frame() {
        let mock = tokio_test::io::Builder::new()
            .write(&[0x00, 0x05, b'h', b'e', b'l', b'l', b'o'])
            .build();
        let mut transport = FramedTransport::new(mock);
        transport.send(b"hello".to_vec()).await.unwrap();
    }

    #[tokio::test]
    async fn recv_reassembles_frames_split_across_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(&[0x00])
            .read(&[0x03, b'o', b'n'])
            .read(&[b'e', 0x00, 0x03, b't', b'w', b'o'])
            .build();
        let mut transport = FramedTransport::new(mock);

        assert_eq!(transport.recv().await.unwrap().unwrap(), b"one".to_vec());
        assert_eq!(transport.recv().await.unwrap().unwrap(), b"two".to_vec());
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_reports_eof_inside_frame() {
        let mock = tokio_test::io::Builder::new()
            .read(&[0x00, 0x08, b'p', b'a'])
            .build();
        let mut transport = FramedTransport::new(mock);

        let err = transport.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, MatchControlError::TransportReceive(_)));
    }

    #[tokio::test]
    async fn duplex_round_trip() {
        let (client, server) = tokio::io::duplex(64);
        let mut client = FramedTransport::new(client);
        let mut server = FramedTransport::new(server);

        client.send(b"ping".to_vec()).await.unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap(), b"ping".to_vec());

        server.send(b"pong".to_vec()).await.unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), b"pong".to_vec());
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let (client, _server) = tokio::io::duplex(64);
        let mut transport = FramedTransport::new(client);
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send(b"late".to_vec()).await.unwrap_err();
        assert!(matches!(err, MatchControlError::TransportClosed));
        assert!(transport.recv().await.is_none());
    }

    /// Stream whose write half refuses to shut down.
    struct StuckShutdown;

    impl AsyncRead for StuckShutdown {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for StuckShutdown {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "peer already gone",
            )))
        }
    }

    #[tokio::test]
    async fn failed_shutdown_is_an_io_error() {
        let mut transport = FramedTransport::new(StuckShutdown);
        let err = transport.close().await.unwrap_err();
        assert!(matches!(
            err,
            MatchControlError::Io(ref e) if e.kind() == std::io::ErrorKind::NotConnected
        ));
        // The transport counts as closed either way.
        assert!(transport.close().await.is_ok());
    }

    #[tokio::test]
    async fn connector_reaches_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = FramedTransport::new(stream);
            let frame = transport.recv().await.unwrap().unwrap();
            transport.send(frame).await.unwrap();
        });

        let connector = TcpConnector::new().with_connect_timeout(Duration::from_secs(5));
        let mut transport = connector.connect(&address).await.unwrap();
        transport.send(b"echo".to_vec()).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), b"echo".to_vec());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = TcpTransport::connect("127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, MatchControlError::Connect { .. }));
    }

    #[tokio::test]
    async fn connect_with_timeout_reports_connect_error() {
        // Non-routable documentation address; either times out or is refused.
        let err = TcpTransport::connect_with_timeout("192.0.2.1:1", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, MatchControlError::Connect { .. }));
    }
}
