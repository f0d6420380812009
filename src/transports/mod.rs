//! Transport implementations for the core server protocol.
//!
//! This module provides concrete [`Transport`](crate::Transport) implementations
//! behind feature gates. Enable the corresponding Cargo feature to pull in
//! a transport:
//!
//! | Feature         | Transport                            |
//! |-----------------|--------------------------------------|
//! | `transport-tcp` | [`TcpTransport`], [`TcpConnector`]   |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), rlbot_match_control::MatchControlError> {
//! use rlbot_match_control::{Connector, TcpConnector};
//!
//! let connector = TcpConnector::default();
//! let mut transport = connector.connect("127.0.0.1:23234").await?;
//! transport.send(br#"{"type":"InitComplete"}"#.to_vec()).await?;
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-tcp")]
pub mod tcp;

#[cfg(feature = "transport-tcp")]
pub use tcp::{FramedTransport, TcpConnector, TcpTransport};
