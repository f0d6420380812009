//! Waiting for a freshly configured match to become playable.
//!
//! Once a match configuration has been sent, the server tears down whatever
//! was running, signals the controller's session to disconnect, and loads the
//! new match. The controller cannot tell packets of the old match from those
//! of the new one, so it keys on the connection instead: only packets that
//! arrive on a session opened *after* the server's `DisconnectSignal` belong
//! to the requested match.
//!
//! ```text
//!  AwaitReconnect ──DisconnectSignal──▶ AwaitInit ──GamePacket──▶ AwaitActive ──live──▶ Ready
//!        │          (reconnect)             │ FieldInfo → InitComplete  │
//!        └──── load window ─────────────────┘                          └── ready window
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::protocol::{ConnectionSettings, GamePacket, Packet};
use crate::session::{PacketSender, Session, SessionConfig};
use crate::transport::Connector;
use crate::waiter::{connect_until, wait_for, Step, WaitOutcome, WaitPhase};

/// Default time allowed for the server to unload the old match and load the new one.
pub const DEFAULT_LOAD_WINDOW: Duration = Duration::from_secs(120);

/// Default time allowed for a loaded match to go live.
pub const DEFAULT_READY_WINDOW: Duration = Duration::from_secs(20);

/// Deadlines of the two wait phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyWindows {
    /// Spans the reconnect and the load, measured from the start of the wait.
    pub load: Duration,
    /// Starts once the first game packet of the new match arrives.
    pub ready: Duration,
}

impl Default for ReadyWindows {
    fn default() -> Self {
        Self {
            load: DEFAULT_LOAD_WINDOW,
            ready: DEFAULT_READY_WINDOW,
        }
    }
}

/// Where the wait currently is.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyState {
    /// Draining the old match until the server drops this session.
    AwaitReconnect,
    /// On a fresh session, waiting for the new match's first game packet.
    AwaitInit,
    /// The new match is loaded; waiting for a live phase.
    AwaitActive(Box<GamePacket>),
    /// The match is live.
    Ready(Box<GamePacket>),
}

impl ReadyState {
    /// Fold one packet into the state.
    ///
    /// A `Ready` step ends the current stage and carries the next one:
    /// `AwaitInit` after `AwaitReconnect` (the caller reconnects),
    /// `AwaitActive` once the match is loaded and `Ready` once it is live.
    /// `sender` belongs to the session the packet arrived on.
    pub fn advance(self, packet: Packet, sender: &PacketSender) -> Step<ReadyState> {
        match self {
            ReadyState::AwaitReconnect => match packet {
                Packet::DisconnectSignal => Step::Ready(ReadyState::AwaitInit),
                _ => Step::Pending(ReadyState::AwaitReconnect),
            },
            ReadyState::AwaitInit => match packet {
                Packet::FieldInfo(_) => match sender.send(Packet::InitComplete) {
                    Ok(()) => Step::Pending(ReadyState::AwaitInit),
                    Err(e) => Step::Failed(e),
                },
                Packet::GamePacket(game) => Step::Ready(ReadyState::AwaitActive(game)),
                Packet::DisconnectSignal => Step::Ended("ended while loading".into()),
                _ => Step::Pending(ReadyState::AwaitInit),
            },
            ReadyState::AwaitActive(last) => match packet {
                Packet::GamePacket(game) if game.phase().is_live() => {
                    Step::Ready(ReadyState::Ready(game))
                }
                Packet::GamePacket(game) => Step::Pending(ReadyState::AwaitActive(game)),
                Packet::DisconnectSignal => Step::Ended("ended while waiting to start".into()),
                _ => Step::Pending(ReadyState::AwaitActive(last)),
            },
            ReadyState::Ready(game) => Step::Ready(ReadyState::Ready(game)),
        }
    }
}

/// Drives a session from "configuration sent" to "match is live".
pub struct MatchReadyMachine<'a, C: ?Sized> {
    connector: &'a C,
    session_config: &'a SessionConfig,
    windows: ReadyWindows,
}

impl<'a, C: Connector + ?Sized> MatchReadyMachine<'a, C> {
    pub fn new(connector: &'a C, session_config: &'a SessionConfig, windows: ReadyWindows) -> Self {
        Self {
            connector,
            session_config,
            windows,
        }
    }

    /// Run the wait on `session`, which must already have sent its match
    /// configuration.
    ///
    /// Reconnects once, to the session's address. Every exit queues a
    /// best-effort `DisconnectSignal` and shuts the current session down; on
    /// success the live snapshot is returned.
    pub async fn run(&self, session: Session) -> WaitOutcome<GamePacket> {
        self.run_until(session, Instant::now() + self.windows.load).await
    }

    /// Like [`run`](Self::run), with the load window already running out at
    /// `load_deadline`.
    ///
    /// The reconnect itself counts against the same deadline.
    pub async fn run_until(
        &self,
        session: Session,
        load_deadline: Instant,
    ) -> WaitOutcome<GamePacket> {
        let mut session = session;

        // AwaitReconnect
        let sender = session.sender();
        let outcome = wait_for(
            &mut session,
            WaitPhase::MatchLoad,
            self.windows.load,
            load_deadline,
            ReadyState::AwaitReconnect,
            |state, packet| state.advance(packet, &sender),
        )
        .await;
        if let Some(failure) = failure_of(outcome) {
            return abandon(session, failure).await;
        }

        debug!(address = %session.address(), "server dropped the session, reconnecting");
        let address = session.address().to_string();
        session.shutdown().await;
        let mut session = match connect_until(
            self.connector,
            &address,
            self.session_config,
            WaitPhase::MatchLoad,
            self.windows.load,
            load_deadline,
        )
        .await
        {
            WaitOutcome::Ready(session) => session,
            failure => return failure.map(|_| GamePacket::default()),
        };
        if let Err(e) = session.send(Packet::ConnectionSettings(ConnectionSettings::controller(
            true,
        ))) {
            return abandon(session, WaitOutcome::TransportError(e)).await;
        }

        // AwaitInit, still under the load deadline
        let sender = session.sender();
        let outcome = wait_for(
            &mut session,
            WaitPhase::MatchLoad,
            self.windows.load,
            load_deadline,
            ReadyState::AwaitInit,
            |state, packet| state.advance(packet, &sender),
        )
        .await;
        let loaded = match outcome {
            WaitOutcome::Ready(ReadyState::AwaitActive(game)) => game,
            WaitOutcome::Ready(other) => {
                return abandon(session, unexpected_state(&other)).await;
            }
            failure => return abandon(session, failure.map(|_| GamePacket::default())).await,
        };
        debug!(phase = ?loaded.phase(), "new match loaded");

        let live = if loaded.phase().is_live() {
            loaded
        } else {
            // AwaitActive, under a fresh ready deadline
            let ready_deadline = Instant::now() + self.windows.ready;
            let outcome = wait_for(
                &mut session,
                WaitPhase::MatchReady,
                self.windows.ready,
                ready_deadline,
                ReadyState::AwaitActive(loaded),
                |state, packet| state.advance(packet, &sender),
            )
            .await;
            match outcome {
                WaitOutcome::Ready(ReadyState::Ready(game)) => game,
                WaitOutcome::Ready(other) => {
                    return abandon(session, unexpected_state(&other)).await;
                }
                failure => return abandon(session, failure.map(|_| GamePacket::default())).await,
            }
        };

        info!(phase = ?live.phase(), "match is ready");
        abandon(session, WaitOutcome::Ready(*live)).await
    }
}

/// The failure carried by `outcome`, re-typed, or `None` if it is ready.
fn failure_of(outcome: WaitOutcome<ReadyState>) -> Option<WaitOutcome<GamePacket>> {
    if outcome.is_ready() {
        None
    } else {
        Some(outcome.map(|_| GamePacket::default()))
    }
}

fn unexpected_state(state: &ReadyState) -> WaitOutcome<GamePacket> {
    WaitOutcome::Disconnected(format!("left in unexpected wait state {state:?}"))
}

/// Leave `session` and hand back `outcome`.
///
/// Timeouts already queued their disconnect inside the waiter.
async fn abandon<T>(session: Session, outcome: WaitOutcome<T>) -> WaitOutcome<T> {
    if !matches!(outcome, WaitOutcome::TimedOut { .. }) {
        let _ = session.disconnect();
    }
    session.shutdown().await;
    outcome
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
    use crate::error::Result;
    use crate::protocol::{decode_packet, FieldInfo, MatchInfo, MatchPhase};
    use crate::transport::Transport;
    use tokio::sync::mpsc;

    fn game(phase: MatchPhase) -> Box<GamePacket> {
        Box::new(GamePacket {
            match_info: MatchInfo {
                match_phase: phase,
                ..MatchInfo::default()
            },
            players: vec![],
        })
    }

    #[test]
    fn default_windows() {
        let windows = ReadyWindows::default();
        assert_eq!(windows.load, Duration::from_secs(120));
        assert_eq!(windows.ready, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn await_reconnect_ignores_everything_but_disconnect() {
        let (session, _sent) = sink_session();
        let sender = session.sender();
        let step = ReadyState::AwaitReconnect
            .advance(Packet::GamePacket(game(MatchPhase::Active)), &sender);
        assert!(matches!(step, Step::Pending(ReadyState::AwaitReconnect)));

        let step = ReadyState::AwaitReconnect.advance(Packet::DisconnectSignal, &sender);
        assert!(matches!(step, Step::Ready(ReadyState::AwaitInit)));
    }

    #[tokio::test]
    async fn await_init_replies_to_field_info() {
        let (session, mut sent) = sink_session();
        let sender = session.sender();
        let step = ReadyState::AwaitInit
            .advance(Packet::FieldInfo(Box::new(FieldInfo::default())), &sender);
        assert!(matches!(step, Step::Pending(ReadyState::AwaitInit)));
        let frame = sent.recv().await.unwrap();
        assert_eq!(decode_packet(&frame).unwrap(), Packet::InitComplete);

        let step = ReadyState::AwaitInit
            .advance(Packet::GamePacket(game(MatchPhase::Inactive)), &sender);
        assert!(matches!(step, Step::Ready(ReadyState::AwaitActive(_))));

        let step = ReadyState::AwaitInit.advance(Packet::DisconnectSignal, &sender);
        assert!(matches!(step, Step::Ended(reason) if reason == "ended while loading"));
    }

    #[tokio::test]
    async fn await_active_only_accepts_live_phases() {
        let (session, _sent) = sink_session();
        let sender = session.sender();
        for phase in [
            MatchPhase::Inactive,
            MatchPhase::Countdown,
            MatchPhase::GoalScored,
            MatchPhase::Replay,
            MatchPhase::Paused,
            MatchPhase::Ended,
        ] {
            let step = ReadyState::AwaitActive(game(MatchPhase::Inactive))
                .advance(Packet::GamePacket(game(phase)), &sender);
            assert!(matches!(step, Step::Pending(ReadyState::AwaitActive(_))), "{phase:?}");
        }
        for phase in [MatchPhase::Kickoff, MatchPhase::Active] {
            let step = ReadyState::AwaitActive(game(MatchPhase::Inactive))
                .advance(Packet::GamePacket(game(phase)), &sender);
            assert!(matches!(step, Step::Ready(ReadyState::Ready(_))), "{phase:?}");
        }

        let step = ReadyState::AwaitActive(game(MatchPhase::Countdown))
            .advance(Packet::DisconnectSignal, &sender);
        assert!(matches!(step, Step::Ended(reason) if reason == "ended while waiting to start"));
    }

    /// Transport that records sent frames and never receives.
    struct SinkTransport(mpsc::UnboundedSender<Vec<u8>>);

    #[async_trait::async_trait]
    impl Transport for SinkTransport {
        async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
            let _ = self.0.send(frame);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<Vec<u8>>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn sink_session() -> (Session, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::start(SinkTransport(tx), "sink", &SessionConfig::new());
        (session, rx)
    }
}
