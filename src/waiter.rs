//! Deadline-bounded folds over a session's packet stream.
//!
//! [`wait_for`] is the single wait primitive every orchestrator builds on. It
//! feeds each inbound packet to a callback together with the state folded so
//! far, until the callback says the wait is over or the deadline passes.

use std::fmt;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::MatchControlError;
use crate::protocol::Packet;
use crate::session::{PumpEvent, Session, SessionConfig};
use crate::transport::Connector;

/// What a bounded wait was waiting for. Shows up in timeout errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    /// The server tearing down the old match and loading the new one.
    MatchLoad,
    /// A loaded match reaching a live phase.
    MatchReady,
    /// Any live game packet.
    GamePacket,
    /// The showcase bot alone on the requested team.
    ShowcaseBot,
    /// A connection to the server being accepted.
    Connect,
}

impl fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitPhase::MatchLoad => "match load",
            WaitPhase::MatchReady => "match ready",
            WaitPhase::GamePacket => "game packet",
            WaitPhase::ShowcaseBot => "showcase bot",
            WaitPhase::Connect => "server connection",
        };
        f.write_str(name)
    }
}

/// Decision returned by a wait callback for one packet.
#[derive(Debug)]
pub enum Step<S> {
    /// Keep waiting with the updated state.
    Pending(S),
    /// This wait is over; finish with this state.
    ///
    /// The state says what comes next. For a multi-stage wait it is the
    /// stage to enter, not necessarily a finished result.
    Ready(S),
    /// The server ended the session; finish as disconnected.
    Ended(String),
    /// The callback itself failed, usually on a reply send.
    Failed(MatchControlError),
}

/// How a bounded wait finished.
#[derive(Debug)]
pub enum WaitOutcome<T> {
    Ready(T),
    TimedOut { phase: WaitPhase, after: Duration },
    Disconnected(String),
    TransportError(MatchControlError),
}

impl<T> WaitOutcome<T> {
    /// Returns `true` for [`WaitOutcome::Ready`].
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready(_))
    }

    /// Transform the ready value, keeping failures as they are.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WaitOutcome<U> {
        match self {
            WaitOutcome::Ready(value) => WaitOutcome::Ready(f(value)),
            WaitOutcome::TimedOut { phase, after } => WaitOutcome::TimedOut { phase, after },
            WaitOutcome::Disconnected(reason) => WaitOutcome::Disconnected(reason),
            WaitOutcome::TransportError(e) => WaitOutcome::TransportError(e),
        }
    }

    /// Convert into a `Result`, turning every failure into its
    /// [`MatchControlError`].
    ///
    /// # Errors
    ///
    /// [`MatchControlError::TimedOut`], [`MatchControlError::Disconnected`] or
    /// the transport error that ended the wait.
    pub fn into_result(self) -> Result<T, MatchControlError> {
        match self {
            WaitOutcome::Ready(value) => Ok(value),
            WaitOutcome::TimedOut { phase, after } => {
                Err(MatchControlError::TimedOut { phase, after })
            }
            WaitOutcome::Disconnected(reason) => Err(MatchControlError::Disconnected { reason }),
            WaitOutcome::TransportError(e) => Err(e),
        }
    }
}

/// Fold packets from `session` through `on_packet` until it returns a final
/// [`Step`] or `deadline` passes.
///
/// `window` is only reported back in [`WaitOutcome::TimedOut`]; the caller
/// owns the deadline so that one timer can span several waits. On timeout a
/// best-effort `DisconnectSignal` is queued and its failure ignored.
pub async fn wait_for<S, F>(
    session: &mut Session,
    phase: WaitPhase,
    window: Duration,
    deadline: Instant,
    state: S,
    mut on_packet: F,
) -> WaitOutcome<S>
where
    F: FnMut(S, Packet) -> Step<S>,
{
    let mut state = state;
    loop {
        let event = match timeout_at(deadline, session.next_event()).await {
            Ok(event) => event,
            Err(_) => {
                warn!(%phase, "timed out after {window:?}");
                let _ = session.disconnect();
                return WaitOutcome::TimedOut {
                    phase,
                    after: window,
                };
            }
        };

        let packet = match event {
            Some(PumpEvent::Packet(packet)) => packet,
            Some(PumpEvent::Failed(e)) => return WaitOutcome::TransportError(e),
            None => return WaitOutcome::TransportError(MatchControlError::TransportClosed),
        };

        state = match on_packet(state, packet) {
            Step::Pending(next) => next,
            Step::Ready(done) => {
                debug!(%phase, "wait satisfied");
                return WaitOutcome::Ready(done);
            }
            Step::Ended(reason) => return WaitOutcome::Disconnected(reason),
            Step::Failed(e) => return WaitOutcome::TransportError(e),
        };
    }
}

/// Open a session to `address`, giving up at `deadline`.
///
/// Like [`wait_for`], `window` is only reported back in
/// [`WaitOutcome::TimedOut`].
pub async fn connect_until<C: Connector + ?Sized>(
    connector: &C,
    address: &str,
    config: &SessionConfig,
    phase: WaitPhase,
    window: Duration,
    deadline: Instant,
) -> WaitOutcome<Session> {
    match timeout_at(deadline, Session::connect(connector, address, config)).await {
        Ok(Ok(session)) => WaitOutcome::Ready(session),
        Ok(Err(e)) => WaitOutcome::TransportError(e),
        Err(_) => {
            warn!(%phase, address = %address, "no connection after {window:?}");
            WaitOutcome::TimedOut {
                phase,
                after: window,
            }
        }
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
    use crate::error::Result;
    use crate::protocol::{decode_packet, encode_packet, GamePacket, MatchInfo, MatchPhase};
    use crate::transport::Transport;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Transport fed from a channel; sent frames go to another channel.
    struct ChannelTransport {
        inbound: mpsc::UnboundedReceiver<Option<Vec<u8>>>,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
            let _ = self.outbound.send(frame);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<Vec<u8>>> {
            match self.inbound.recv().await {
                Some(Some(frame)) => Some(Ok(frame)),
                Some(None) => None,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        session: Session,
        inbound: mpsc::UnboundedSender<Option<Vec<u8>>>,
        outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    }

    impl Harness {
        fn new() -> Self {
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let transport = ChannelTransport {
                inbound: in_rx,
                outbound: out_tx,
            };
            Self {
                session: Session::start(transport, "harness", &SessionConfig::new()),
                inbound: in_tx,
                outbound: out_rx,
            }
        }

        fn push(&self, packet: &Packet) {
            self.inbound
                .send(Some(encode_packet(packet).unwrap()))
                .unwrap();
        }

        async fn next_sent(&mut self) -> Packet {
            decode_packet(&self.outbound.recv().await.unwrap()).unwrap()
        }
    }

    fn game_packet(phase: MatchPhase) -> Packet {
        Packet::GamePacket(Box::new(GamePacket {
            match_info: MatchInfo {
                match_phase: phase,
                ..MatchInfo::default()
            },
            players: vec![],
        }))
    }

    /// Counts packets until a live one arrives.
    fn until_live(count: u32, packet: Packet) -> Step<u32> {
        match packet {
            Packet::GamePacket(p) if p.phase().is_live() => Step::Ready(count + 1),
            Packet::DisconnectSignal => Step::Ended("gone".into()),
            _ => Step::Pending(count + 1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn folds_state_until_ready() {
        let mut h = Harness::new();
        h.push(&game_packet(MatchPhase::Inactive));
        h.push(&game_packet(MatchPhase::Countdown));
        h.push(&game_packet(MatchPhase::Kickoff));

        let window = Duration::from_secs(5);
        let outcome = wait_for(
            &mut h.session,
            WaitPhase::GamePacket,
            window,
            Instant::now() + window,
            0,
            until_live,
        )
        .await;

        assert!(matches!(outcome, WaitOutcome::Ready(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_at_deadline_and_disconnects() {
        let mut h = Harness::new();
        h.push(&game_packet(MatchPhase::Paused));

        let window = Duration::from_secs(20);
        let start = Instant::now();
        let outcome = wait_for(
            &mut h.session,
            WaitPhase::MatchReady,
            window,
            start + window,
            0,
            until_live,
        )
        .await;

        match outcome {
            WaitOutcome::TimedOut { phase, after } => {
                assert_eq!(phase, WaitPhase::MatchReady);
                assert_eq!(after, window);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(start.elapsed(), window);
        assert_eq!(h.next_sent().await, Packet::DisconnectSignal);
    }

    #[tokio::test(start_paused = true)]
    async fn ended_step_reports_disconnected() {
        let mut h = Harness::new();
        h.push(&Packet::DisconnectSignal);

        let window = Duration::from_secs(5);
        let outcome = wait_for(
            &mut h.session,
            WaitPhase::GamePacket,
            window,
            Instant::now() + window,
            0,
            until_live,
        )
        .await;

        assert!(matches!(outcome, WaitOutcome::Disconnected(reason) if reason == "gone"));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_transport_is_a_transport_error() {
        let mut h = Harness::new();
        h.inbound.send(None).unwrap();

        let window = Duration::from_secs(5);
        let outcome = wait_for(
            &mut h.session,
            WaitPhase::GamePacket,
            window,
            Instant::now() + window,
            0,
            until_live,
        )
        .await;

        assert!(matches!(
            outcome,
            WaitOutcome::TransportError(MatchControlError::TransportClosed)
        ));
    }

    /// Connector that never answers.
    struct SilentConnector;

    #[async_trait]
    impl Connector for SilentConnector {
        async fn connect(&self, _address: &str) -> Result<Box<dyn Transport>> {
            std::future::pending().await
        }
    }

    /// Connector that always refuses.
    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, address: &str) -> Result<Box<dyn Transport>> {
            Err(MatchControlError::Connect {
                address: address.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_gives_up_at_deadline() {
        let window = Duration::from_secs(7);
        let start = Instant::now();
        let outcome = connect_until(
            &SilentConnector,
            "core:23234",
            &SessionConfig::new(),
            WaitPhase::Connect,
            window,
            start + window,
        )
        .await;

        match outcome {
            WaitOutcome::TimedOut { phase, after } => {
                assert_eq!(phase, WaitPhase::Connect);
                assert_eq!(after, window);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(start.elapsed(), window);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_refusal_is_a_transport_error() {
        let outcome = connect_until(
            &RefusingConnector,
            "core:23234",
            &SessionConfig::new(),
            WaitPhase::Connect,
            Duration::from_secs(7),
            Instant::now() + Duration::from_secs(7),
        )
        .await;

        assert!(matches!(
            outcome,
            WaitOutcome::TransportError(MatchControlError::Connect { .. })
        ));
    }

    #[test]
    fn connect_phase_display() {
        assert_eq!(WaitPhase::Connect.to_string(), "server connection");
    }

    #[test]
    fn into_result_maps_failures() {
        let timed_out: WaitOutcome<()> = WaitOutcome::TimedOut {
            phase: WaitPhase::MatchLoad,
            after: Duration::from_secs(120),
        };
        let err = timed_out.into_result().unwrap_err();
        assert_eq!(err.to_string(), "timed out waiting for match load after 120s");

        let ended: WaitOutcome<()> = WaitOutcome::Disconnected("ended while loading".into());
        let err = ended.into_result().unwrap_err();
        assert_eq!(err.to_string(), "match was ended while loading");

        assert_eq!(WaitOutcome::Ready(7).map(|n| n * 2).into_result().unwrap(), 14);
    }
}
