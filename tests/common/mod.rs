#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for match controller integration tests.
//!
//! Provides a scripted [`MockTransport`], a [`MockConnector`] that hands the
//! scripts out one connection at a time, and builders for common packets.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use rlbot_match_control::error::Result;
use rlbot_match_control::protocol::{
    decode_packet, encode_packet, FieldInfo, GamePacket, MatchInfo, MatchPhase, Packet, PlayerInfo,
};
use rlbot_match_control::{
    Connector, ControllerConfig, MatchControlError, MatchController, Transport,
};

// ── MockTransport ───────────────────────────────────────────────────

/// One scripted step of the server side of a connection.
#[derive(Debug)]
pub enum Incoming {
    /// Deliver this packet.
    Packet(Packet),
    /// Deliver these raw frame bytes.
    Raw(Vec<u8>),
    /// Deliver nothing for this long.
    Delay(Duration),
    /// Close the connection cleanly.
    Close,
    /// Fail the receive with this message.
    Error(String),
}

/// Packets the controller sent on one connection, in order.
pub type SentLog = Arc<StdMutex<Vec<Packet>>>;

/// A scripted transport.
///
/// `recv()` walks the script in order and hangs forever once it runs out.
/// Delays survive cancellation: a `recv()` dropped mid-delay resumes the same
/// deadline on the next call.
pub struct MockTransport {
    incoming: VecDeque<Incoming>,
    wake_at: Option<Instant>,
    sent: SentLog,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(incoming: Vec<Incoming>) -> (Self, SentLog, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            wake_at: None,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        let packet = decode_packet(&frame).expect("controller sent an undecodable frame");
        self.sent.lock().unwrap().push(packet);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>>> {
        loop {
            if let Some(at) = self.wake_at {
                tokio::time::sleep_until(at).await;
                self.wake_at = None;
            }
            match self.incoming.pop_front() {
                Some(Incoming::Packet(packet)) => return Some(Ok(encode_packet(&packet).unwrap())),
                Some(Incoming::Raw(bytes)) => return Some(Ok(bytes)),
                Some(Incoming::Delay(delay)) => self.wake_at = Some(Instant::now() + delay),
                Some(Incoming::Close) => return None,
                Some(Incoming::Error(message)) => {
                    return Some(Err(MatchControlError::TransportReceive(message)))
                }
                None => std::future::pending::<()>().await,
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out one scripted transport per `connect()`, in order. Once the
/// scripts run out it refuses the connection, or never answers if built with
/// [`silent_connector`].
pub struct MockConnector {
    transports: StdMutex<VecDeque<MockTransport>>,
    silent_when_empty: bool,
    connects: Arc<AtomicUsize>,
    addresses: Arc<StdMutex<Vec<String>>>,
}

/// The test's view of everything a [`MockConnector`] served.
#[derive(Clone)]
pub struct MockServer {
    sent: Vec<SentLog>,
    closed: Vec<Arc<AtomicBool>>,
    connects: Arc<AtomicUsize>,
    addresses: Arc<StdMutex<Vec<String>>>,
}

impl MockServer {
    /// Number of successful and failed connection attempts.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Packets sent on the `index`th connection.
    pub fn sent(&self, index: usize) -> Vec<Packet> {
        self.sent[index].lock().unwrap().clone()
    }

    /// Whether the `index`th connection was closed by the controller.
    pub fn closed(&self, index: usize) -> bool {
        self.closed[index].load(Ordering::Relaxed)
    }

    /// Every address the controller dialled.
    pub fn addresses(&self) -> Vec<String> {
        self.addresses.lock().unwrap().clone()
    }
}

pub fn mock_connector(scripts: Vec<Vec<Incoming>>) -> (MockConnector, MockServer) {
    build_connector(scripts, false)
}

/// Like [`mock_connector`], but connects past the scripts hang forever.
pub fn silent_connector(scripts: Vec<Vec<Incoming>>) -> (MockConnector, MockServer) {
    build_connector(scripts, true)
}

fn build_connector(
    scripts: Vec<Vec<Incoming>>,
    silent_when_empty: bool,
) -> (MockConnector, MockServer) {
    let mut transports = VecDeque::new();
    let mut sent = Vec::new();
    let mut closed = Vec::new();
    for script in scripts {
        let (transport, log, flag) = MockTransport::new(script);
        transports.push_back(transport);
        sent.push(log);
        closed.push(flag);
    }
    let connects = Arc::new(AtomicUsize::new(0));
    let addresses = Arc::new(StdMutex::new(Vec::new()));
    let connector = MockConnector {
        transports: StdMutex::new(transports),
        silent_when_empty,
        connects: Arc::clone(&connects),
        addresses: Arc::clone(&addresses),
    };
    let server = MockServer {
        sent,
        closed,
        connects,
        addresses,
    };
    (connector, server)
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.addresses.lock().unwrap().push(address.to_string());
        let next = self.transports.lock().unwrap().pop_front();
        match next {
            Some(transport) => Ok(Box::new(transport)),
            None if self.silent_when_empty => std::future::pending().await,
            None => Err(MatchControlError::Connect {
                address: address.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "no script left"),
            }),
        }
    }
}

/// A controller with default windows over scripted connections.
pub fn controller(scripts: Vec<Vec<Incoming>>) -> (MatchController<MockConnector>, MockServer) {
    controller_with(ControllerConfig::default(), scripts)
}

pub fn controller_with(
    config: ControllerConfig,
    scripts: Vec<Vec<Incoming>>,
) -> (MatchController<MockConnector>, MockServer) {
    let (connector, server) = mock_connector(scripts);
    (MatchController::with_connector(config, connector), server)
}

/// A controller whose connects past `scripts` never complete.
pub fn silent_controller(
    config: ControllerConfig,
    scripts: Vec<Vec<Incoming>>,
) -> (MatchController<MockConnector>, MockServer) {
    let (connector, server) = silent_connector(scripts);
    (MatchController::with_connector(config, connector), server)
}

// ── Packet builders ─────────────────────────────────────────────────

pub fn game(phase: MatchPhase) -> Incoming {
    Incoming::Packet(game_packet(phase, true, vec![]))
}

pub fn game_with(phase: MatchPhase, unlimited: bool, players: Vec<PlayerInfo>) -> Incoming {
    Incoming::Packet(game_packet(phase, unlimited, players))
}

pub fn game_packet(phase: MatchPhase, unlimited: bool, players: Vec<PlayerInfo>) -> Packet {
    Packet::GamePacket(Box::new(GamePacket {
        match_info: MatchInfo {
            match_phase: phase,
            is_unlimited_time: unlimited,
            ..MatchInfo::default()
        },
        players,
    }))
}

pub fn field_info() -> Incoming {
    Incoming::Packet(Packet::FieldInfo(Box::new(FieldInfo::default())))
}

pub fn disconnect() -> Incoming {
    Incoming::Packet(Packet::DisconnectSignal)
}

pub fn delay(secs: u64) -> Incoming {
    Incoming::Delay(Duration::from_secs(secs))
}

/// The preview match's bot.
pub fn showcase_bot(team: u32) -> PlayerInfo {
    PlayerInfo {
        name: "Showcase".into(),
        agent_id: "gui/loadout-preview".into(),
        team,
        is_bot: true,
    }
}

/// Some other bot.
pub fn other_bot(team: u32) -> PlayerInfo {
    PlayerInfo {
        name: "Nexto".into(),
        agent_id: "rolv/nexto".into(),
        team,
        is_bot: true,
    }
}

pub fn human(team: u32) -> PlayerInfo {
    PlayerInfo {
        name: "Player".into(),
        agent_id: String::new(),
        team,
        is_bot: false,
    }
}

/// Count the packets of one kind.
pub fn count_kind(packets: &[Packet], kind: &str) -> usize {
    packets.iter().filter(|p| p.kind() == kind).count()
}

/// Poll `condition` until it holds, advancing (paused) time in small steps.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}
