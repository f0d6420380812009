//! Error types for the match controller.

use std::time::Duration;

use thiserror::Error;

use crate::waiter::WaitPhase;

/// Errors that can occur while driving a match through the core server.
#[derive(Debug, Error)]
pub enum MatchControlError {
    /// The server could not be reached.
    #[error("failed to connect to server at {address}: {source}")]
    Connect {
        /// Address that was dialled (`host:port`).
        address: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a frame to the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to read a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed by the remote end.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a packet payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An outbound payload does not fit in a single frame.
    #[error("frame of {0} bytes exceeds the maximum frame length")]
    FrameTooLarge(usize),

    /// Attempted to send on a session whose packet pump has already exited.
    #[error("not connected to server")]
    NotConnected,

    /// A bounded wait ran out of time.
    #[error("timed out waiting for {phase} after {after:?}")]
    TimedOut {
        /// Which wait expired.
        phase: WaitPhase,
        /// Length of the window that elapsed.
        after: Duration,
    },

    /// The server ended the match while we were waiting on it.
    #[error("match was {reason}")]
    Disconnected {
        /// Phase-specific description, e.g. `ended while loading`.
        reason: String,
    },

    /// A request or environment value could not be turned into a valid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for match controller operations.
pub type Result<T> = std::result::Result<T, MatchControlError>;
