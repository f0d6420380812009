//! # RLBot Match Control
//!
//! Async controller for matches run by an RLBot-style core server.
//!
//! The controller starts, stops and reconfigures matches over a persistent,
//! length-prefixed packet connection, and knows when the match it asked for
//! is actually running: the server drops the controller's connection whenever
//! a new match starts, so readiness is judged only from packets that arrive
//! on a session opened after that drop.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **TCP built-in**: the default `transport-tcp` feature provides [`TcpConnector`]
//! - **Bounded waits**: every wait ends in a [`WaitOutcome`] within its window
//! - **Loadout preview**: showcase scenes and in-place loadout swaps
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-tcp")]
//! # async fn run() -> Result<(), rlbot_match_control::MatchControlError> {
//! use rlbot_match_control::{MatchController, StartMatchOptions};
//!
//! let controller = MatchController::from_env()?;
//! let options = StartMatchOptions {
//!     map: "Stadium_P".into(),
//!     game_mode: "Soccar".into(),
//!     launcher: "steam".into(),
//!     ..StartMatchOptions::default()
//! };
//!
//! let result = controller.start_match(&options).await;
//! println!("success: {}, message: {}", result.success, result.message);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod loadout;
pub mod match_ready;
pub mod options;
pub mod protocol;
pub mod session;
pub mod showcase;
pub mod transport;
pub mod transports;
pub mod waiter;

// Re-export primary types for ergonomic imports.
pub use config::{ControllerConfig, ServerAddress};
pub use controller::{ActionResult, MatchController};
pub use error::MatchControlError;
pub use loadout::{LoadoutAction, LoadoutConditions};
pub use match_ready::{MatchReadyMachine, ReadyState, ReadyWindows};
pub use options::{LoadoutPreviewOptions, StartMatchOptions};
pub use protocol::{MatchPhase, Packet};
pub use session::{PumpEvent, Session, SessionConfig};
pub use showcase::ShowcaseType;
pub use transport::{Connector, Transport};
pub use waiter::{WaitOutcome, WaitPhase};

#[cfg(feature = "transport-tcp")]
pub use transports::{TcpConnector, TcpTransport};
