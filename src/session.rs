//! Sessions and the packet pump.
//!
//! A [`Session`] owns one connection to the core server. Starting it spawns a
//! background packet pump that is the only reader of the transport: it
//! decodes inbound frames and republishes them, in order, as [`PumpEvent`]s on
//! a bounded channel held by the session. Outbound packets are queued on an
//! unbounded channel and written by the same task, so sending never blocks
//! the caller.
//!
//! The pump stops after publishing a [`Packet::DisconnectSignal`] (the server
//! is going away), after a transport failure (published as
//! [`PumpEvent::Failed`]), or when the session is shut down. A reconnect
//! always means a new `Session`, and with it a new pump.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut session = Session::connect(&connector, "127.0.0.1:23234", &SessionConfig::new()).await?;
//! session.send(Packet::ConnectionSettings(ConnectionSettings::controller(true)))?;
//! session.send(Packet::InitComplete)?;
//!
//! while let Some(event) = session.next_event().await {
//!     match event {
//!         PumpEvent::Packet(Packet::GamePacket(packet)) => { /* … */ }
//!         PumpEvent::Packet(Packet::DisconnectSignal) => break,
//!         PumpEvent::Failed(e) => return Err(e),
//!         _ => {}
//!     }
//! }
//! session.shutdown().await;
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{MatchControlError, Result};
use crate::protocol::{decode_packet, encode_packet, Packet};
use crate::transport::{Connector, Transport};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Tuning for a [`Session`].
///
/// ```
/// use rlbot_match_control::session::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::new()
///     .with_event_channel_capacity(0)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.event_channel_capacity, 1);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the bounded event channel.
    ///
    /// The pump awaits free capacity instead of dropping packets, so a slow
    /// consumer applies backpressure to the socket rather than losing state.
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`Session::shutdown`] waits for the pump to flush queued
    /// packets before aborting it.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity of the bounded event channel. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Events ──────────────────────────────────────────────────────────

/// Something the packet pump observed.
#[derive(Debug)]
pub enum PumpEvent {
    /// A decoded inbound packet.
    Packet(Packet),
    /// The transport failed or was closed; the pump has stopped.
    Failed(MatchControlError),
}

// ── Outbound handle ─────────────────────────────────────────────────

/// Cloneable handle for queueing packets on a session.
///
/// Lets packet callbacks reply (for example with `InitComplete`) while the
/// session itself is borrowed by a waiter.
#[derive(Debug, Clone)]
pub struct PacketSender {
    tx: mpsc::UnboundedSender<Packet>,
}

impl PacketSender {
    /// Queue a packet for the pump to write.
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::NotConnected`] if the pump has exited.
    pub fn send(&self, packet: Packet) -> Result<()> {
        self.tx
            .send(packet)
            .map_err(|_| MatchControlError::NotConnected)
    }

    /// Tell the server this side is leaving. The socket stays open; the
    /// server is expected to close it.
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::NotConnected`] if the pump has exited.
    pub fn disconnect(&self) -> Result<()> {
        self.send(Packet::DisconnectSignal)
    }

    /// Returns `true` while the pump still accepts packets.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// One live connection to the core server plus its packet pump.
pub struct Session {
    /// Address this session was opened against; reconnects reuse it.
    address: String,
    /// Outbound queue to the pump.
    sender: PacketSender,
    /// Inbound events from the pump.
    events: mpsc::Receiver<PumpEvent>,
    /// Handle to the pump task.
    task: Option<JoinHandle<()>>,
    /// Oneshot sender asking the pump to flush and exit.
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl Session {
    /// Open a connection through `connector` and start its pump.
    ///
    /// # Errors
    ///
    /// Returns whatever the connector returns, normally
    /// [`MatchControlError::Connect`].
    pub async fn connect<C: Connector + ?Sized>(
        connector: &C,
        address: &str,
        config: &SessionConfig,
    ) -> Result<Self> {
        let transport = connector.connect(address).await?;
        Ok(Self::start(transport, address, config))
    }

    /// Start a pump over an already-connected transport.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use = "dropping the session immediately shuts the pump down"]
    pub fn start(
        transport: impl Transport,
        address: impl Into<String>,
        config: &SessionConfig,
    ) -> Self {
        let address = address.into();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Packet>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<PumpEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(pump_loop(
            transport,
            cmd_rx,
            event_tx,
            shutdown_rx,
            address.clone(),
        ));

        Self {
            address,
            sender: PacketSender { tx: cmd_tx },
            events: event_rx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Address this session is connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// A cloneable handle for queueing packets on this session.
    pub fn sender(&self) -> PacketSender {
        self.sender.clone()
    }

    /// Queue a packet for the pump to write.
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::NotConnected`] if the pump has exited.
    pub fn send(&self, packet: Packet) -> Result<()> {
        self.sender.send(packet)
    }

    /// Queue a [`Packet::DisconnectSignal`].
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::NotConnected`] if the pump has exited.
    pub fn disconnect(&self) -> Result<()> {
        self.sender.disconnect()
    }

    /// Wait for the next event from the pump.
    ///
    /// Returns `None` once the pump has exited and every event was consumed.
    /// Cancel-safe.
    pub async fn next_event(&mut self) -> Option<PumpEvent> {
        self.events.recv().await
    }

    /// Stop the pump after it has written every queued packet.
    ///
    /// Waits at most the configured shutdown timeout, then aborts the pump.
    pub async fn shutdown(mut self) {
        debug!(address = %self.address, "session shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // Unblocks a pump waiting for space on a full event channel.
        self.events.close();

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("packet pump terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("packet pump did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("packet pump aborted: {join_err}");
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("connected", &self.sender.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The pump may still be flushing; let it finish on its own.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

// ── Packet pump ─────────────────────────────────────────────────────

/// Background task that owns the transport.
///
/// Exits when:
/// - A `DisconnectSignal` was received and published
/// - The transport fails or is closed by the server
/// - The session asks it to shut down, or drops its event receiver
async fn pump_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<Packet>,
    event_tx: mpsc::Sender<PumpEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
    address: String,
) {
    debug!(address = %address, "packet pump started");

    loop {
        tokio::select! {
            // Branch 1: outgoing packet from the session
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(packet) => {
                        if let Err(e) = write_packet(&mut transport, &packet).await {
                            error!("transport send error: {e}");
                            publish(&event_tx, PumpEvent::Failed(e)).await;
                            break;
                        }
                    }
                    // Every sender is gone; nothing more can be queued.
                    None => break,
                }
            }

            // Branch 2: shutdown signal (or the session was dropped)
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                break;
            }

            // Branch 3: incoming frame from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(frame)) => match decode_packet(&frame) {
                        Ok(packet) => {
                            let disconnect = packet.is_disconnect();
                            if !publish(&event_tx, PumpEvent::Packet(packet)).await {
                                break;
                            }
                            if disconnect {
                                debug!("disconnect signal received, stopping packet pump");
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("failed to decode inbound frame ({} bytes), skipping: {e}", frame.len());
                        }
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        publish(&event_tx, PumpEvent::Failed(e)).await;
                        break;
                    }
                    None => {
                        debug!("transport closed by server");
                        publish(&event_tx, PumpEvent::Failed(MatchControlError::TransportClosed)).await;
                        break;
                    }
                }
            }
        }
    }

    flush_outbound(&mut transport, &mut cmd_rx).await;
    let _ = transport.close().await;
    debug!(address = %address, "packet pump exited");
}

/// Serialize and write one packet.
async fn write_packet(transport: &mut impl Transport, packet: &Packet) -> Result<()> {
    debug!(kind = packet.kind(), "sending packet");
    let payload = match encode_packet(packet) {
        Ok(payload) => payload,
        Err(e) => {
            // Serialization errors are programming bugs; don't kill the pump.
            error!("failed to serialize {}: {e}", packet.kind());
            return Ok(());
        }
    };
    transport.send(payload).await
}

/// Write whatever is still queued, stopping at the first failure.
async fn flush_outbound(
    transport: &mut impl Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<Packet>,
) {
    cmd_rx.close();
    while let Ok(packet) = cmd_rx.try_recv() {
        if let Err(e) = write_packet(transport, &packet).await {
            debug!("dropping queued {} after send failure: {e}", packet.kind());
            break;
        }
    }
}

/// Publish an event, waiting for channel capacity. Returns `false` if the
/// session stopped listening.
async fn publish(event_tx: &mpsc::Sender<PumpEvent>, event: PumpEvent) -> bool {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
        return false;
    }
    true
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use crate::protocol::{GamePacket, MatchInfo, MatchPhase, StopCommand};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    // ── Mock transport ──────────────────────────────────────────────

    /// A mock transport that records sent frames and replays scripted ones.
    struct MockTransport {
        /// Frames that `recv()` will yield in order.
        incoming: VecDeque<Option<Result<Vec<u8>>>>,
        /// Recorded outgoing frames.
        sent: Arc<StdMutex<Vec<Vec<u8>>>>,
        /// Whether `close()` was called.
        closed: Arc<AtomicBool>,
        /// Fail every send.
        fail_sends: bool,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<Result<Vec<u8>>>>,
        ) -> (Self, Arc<StdMutex<Vec<Vec<u8>>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
                fail_sends: false,
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
            if self.fail_sends {
                return Err(MatchControlError::TransportSend("broken pipe".into()));
            }
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<Vec<u8>>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // All scripted frames delivered; hang so the pump stays alive.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn frame(packet: &Packet) -> Option<Result<Vec<u8>>> {
        Some(Ok(encode_packet(packet).unwrap()))
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

    fn sent_packets(sent: &Arc<StdMutex<Vec<Vec<u8>>>>) -> Vec<Packet> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|f| decode_packet(f).unwrap())
            .collect()
    }

    async fn next_packet(session: &mut Session) -> Packet {
        match session.next_event().await {
            Some(PumpEvent::Packet(packet)) => packet,
            other => panic!("expected packet, got {other:?}"),
        }
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn pump_publishes_packets_in_order() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            frame(&Packet::InitComplete),
            frame(&game_packet(MatchPhase::Inactive)),
            frame(&game_packet(MatchPhase::Kickoff)),
        ]);
        let mut session = Session::start(transport, "mock", &SessionConfig::new());

        assert_eq!(next_packet(&mut session).await, Packet::InitComplete);
        assert_eq!(next_packet(&mut session).await, game_packet(MatchPhase::Inactive));
        assert_eq!(next_packet(&mut session).await, game_packet(MatchPhase::Kickoff));

        session.shutdown().await;
    }

    #[tokio::test]
    async fn pump_stops_after_disconnect_signal() {
        let (transport, _sent, closed) = MockTransport::new(vec![
            frame(&Packet::DisconnectSignal),
            frame(&game_packet(MatchPhase::Active)),
        ]);
        let mut session = Session::start(transport, "mock", &SessionConfig::new());

        assert_eq!(next_packet(&mut session).await, Packet::DisconnectSignal);
        // The packet scripted after the signal is never read.
        assert!(session.next_event().await.is_none());
        assert!(closed.load(Ordering::Relaxed));

        let err = session.send(Packet::InitComplete).unwrap_err();
        assert!(matches!(err, MatchControlError::NotConnected));
    }

    #[tokio::test]
    async fn pump_reports_receive_error_and_stops() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            frame(&game_packet(MatchPhase::Active)),
            Some(Err(MatchControlError::TransportReceive("reset by peer".into()))),
        ]);
        let mut session = Session::start(transport, "mock", &SessionConfig::new());

        assert!(matches!(next_packet(&mut session).await, Packet::GamePacket(_)));
        match session.next_event().await {
            Some(PumpEvent::Failed(MatchControlError::TransportReceive(msg))) => {
                assert_eq!(msg, "reset by peer");
            }
            other => panic!("expected receive failure, got {other:?}"),
        }
        assert!(session.next_event().await.is_none());
    }

    #[tokio::test]
    async fn pump_reports_clean_close_as_transport_closed() {
        let (transport, _sent, _closed) = MockTransport::new(vec![None]);
        let mut session = Session::start(transport, "mock", &SessionConfig::new());

        assert!(matches!(
            session.next_event().await,
            Some(PumpEvent::Failed(MatchControlError::TransportClosed))
        ));
    }

    #[tokio::test]
    async fn pump_skips_undecodable_frames() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(br#"{"type":"BallPrediction","data":{}}"#.to_vec())),
            frame(&Packet::InitComplete),
        ]);
        let mut session = Session::start(transport, "mock", &SessionConfig::new());

        assert_eq!(next_packet(&mut session).await, Packet::InitComplete);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_flushes_queued_packets() {
        let (transport, sent, closed) = MockTransport::new(vec![]);
        let session = Session::start(transport, "mock", &SessionConfig::new());

        session.send(Packet::InitComplete).unwrap();
        session
            .send(Packet::StopCommand(StopCommand {
                shutdown_server: false,
            }))
            .unwrap();
        session.disconnect().unwrap();
        session.shutdown().await;

        assert_eq!(
            sent_packets(&sent),
            vec![
                Packet::InitComplete,
                Packet::StopCommand(StopCommand {
                    shutdown_server: false
                }),
                Packet::DisconnectSignal,
            ]
        );
        assert!(closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn send_failure_is_published_as_event() {
        let (mut transport, _sent, _closed) = MockTransport::new(vec![]);
        transport.fail_sends = true;
        let mut session = Session::start(transport, "mock", &SessionConfig::new());

        session.send(Packet::InitComplete).unwrap();
        assert!(matches!(
            session.next_event().await,
            Some(PumpEvent::Failed(MatchControlError::TransportSend(_)))
        ));
    }

    #[tokio::test]
    async fn dropping_session_lets_pump_flush() {
        let (transport, sent, closed) = MockTransport::new(vec![]);
        let session = Session::start(transport, "mock", &SessionConfig::new());
        session.disconnect().unwrap();
        drop(session);

        for _ in 0..100 {
            if closed.load(Ordering::Relaxed) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(closed.load(Ordering::Relaxed));
        assert_eq!(sent_packets(&sent), vec![Packet::DisconnectSignal]);
    }

    #[tokio::test]
    async fn single_slot_channel_does_not_stall_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            frame(&game_packet(MatchPhase::Active)),
            frame(&game_packet(MatchPhase::Active)),
            frame(&game_packet(MatchPhase::Active)),
        ]);
        let config = SessionConfig::new().with_event_channel_capacity(1);
        let session = Session::start(transport, "mock", &config);
        tokio::task::yield_now().await;

        // Nobody reads; shutdown must still complete well within its timeout.
        tokio::time::timeout(Duration::from_millis(500), session.shutdown())
            .await
            .unwrap();
    }

    #[test]
    fn session_config_clamps_capacity() {
        let config = SessionConfig::new().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }
}
