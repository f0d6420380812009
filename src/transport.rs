//! Transport abstraction for the core server protocol.
//!
//! A [`Transport`] moves opaque frame payloads in both directions; the packet
//! pump in [`crate::session`] turns them into [`Packet`](crate::protocol::Packet)s.
//! A [`Connector`] opens new transports, which the match-ready state machine
//! needs because the server severs the controller's connection whenever a new
//! match starts.
//!
//! # Framing
//!
//! Byte-stream transports carry each payload as a 2-byte big-endian length
//! followed by the payload itself. [`encode_frame`] and [`FrameDecoder`]
//! implement that framing without touching any I/O, so they can be shared by
//! every stream-based transport.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use rlbot_match_control::error::MatchControlError;
//! use rlbot_match_control::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: Vec<u8>) -> Result<(), MatchControlError> {
//!         // Write one complete frame payload
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<Vec<u8>, MatchControlError>> {
//!         // Read the next frame payload; `None` once the peer closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), MatchControlError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::{MatchControlError, Result};

/// Size of the length prefix in front of every frame.
pub const FRAME_HEADER_LEN: usize = 2;

/// Largest payload a single frame can carry.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// A bidirectional frame transport to the core server.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe: the packet pump polls it
/// inside `tokio::select!` next to the outbound queue. If `recv` is cancelled
/// before completion, calling it again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one frame payload to the server.
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::TransportSend`] if the frame could not be written.
    async fn send(&mut self, frame: Vec<u8>) -> Result<()>;

    /// Receive the next frame payload from the server.
    ///
    /// Returns:
    /// - `Some(Ok(payload))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly by the server
    async fn recv(&mut self) -> Option<Result<Vec<u8>>>;

    /// Close the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown handshake fails. Resources are released
    /// regardless.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        (**self).send(frame).await
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>>> {
        (**self).recv().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

/// Opens transports to the core server.
///
/// The controller connects once per operation and once more for every
/// server-initiated reconnect, always to the same `host:port`.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to `address`.
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::Connect`] if the server cannot be reached.
    async fn connect(&self, address: &str) -> Result<Box<dyn Transport>>;
}

/// Prefix `payload` with its length.
///
/// # Errors
///
/// Returns [`MatchControlError::FrameTooLarge`] if the payload is longer than
/// [`MAX_FRAME_LEN`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len =
        u16::try_from(payload.len()).map_err(|_| MatchControlError::FrameTooLarge(payload.len()))?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Reassembles length-prefixed frames from arbitrary chunks of a byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame payload, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let len = usize::from(u16::from_be_bytes(*self.buf.first_chunk::<FRAME_HEADER_LEN>()?));
        let end = FRAME_HEADER_LEN + len;
        let payload = self.buf.get(FRAME_HEADER_LEN..end)?.to_vec();
        self.buf.drain(..end);
        Some(payload)
    }

    /// Returns `true` if part of a frame is buffered.
    pub fn has_partial_frame(&self) -> bool {
        !self.buf.is_empty()
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

    #[test]
    fn encode_frame_prefixes_big_endian_length() {
        let frame = encode_frame(b"abc").unwrap();
        assert_eq!(frame, vec![0x00, 0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn encode_frame_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_FRAME_LEN + 1];
        let err = encode_frame(&payload).unwrap_err();
        assert!(matches!(err, MatchControlError::FrameTooLarge(n) if n == MAX_FRAME_LEN + 1));
    }

    #[test]
    fn decoder_waits_for_complete_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0x00]);
        assert!(decoder.next_frame().is_none());
        decoder.extend(&[0x04, b'p', b'i']);
        assert!(decoder.next_frame().is_none());
        assert!(decoder.has_partial_frame());
        decoder.extend(&[b'n', b'g']);
        assert_eq!(decoder.next_frame().unwrap(), b"ping".to_vec());
        assert!(!decoder.has_partial_frame());
    }

    #[test]
    fn decoder_splits_back_to_back_frames() {
        let mut bytes = encode_frame(b"one").unwrap();
        bytes.extend(encode_frame(b"").unwrap());
        bytes.extend(encode_frame(b"three").unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes);
        assert_eq!(decoder.next_frame().unwrap(), b"one".to_vec());
        assert_eq!(decoder.next_frame().unwrap(), Vec::<u8>::new());
        assert_eq!(decoder.next_frame().unwrap(), b"three".to_vec());
        assert!(decoder.next_frame().is_none());
    }
}
