//! The match controller: every operation the GUI can ask for.
//!
//! [`MatchController`] owns the resolved server address, the wait windows and
//! the static hold loop, if one is running. Each operation opens its own
//! session, does its work and disconnects; nothing is shared between calls
//! except the hold loop handle.
//!
//! # Example
//!
//! ```rust,ignore
//! let controller = MatchController::from_env()?;
//!
//! let result = controller.start_match(options).await;
//! if !result.success {
//!     eprintln!("could not start match: {}", result.message);
//! }
//!
//! controller.set_showcase_type("boost", 1).await;
//! controller.stop_match(false).await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::error::{MatchControlError, Result};
use crate::loadout::{LoadoutAction, LoadoutConditions};
use crate::match_ready::MatchReadyMachine;
use crate::options::{LoadoutPreviewOptions, StartMatchOptions};
use crate::protocol::{
    ConnectionSettings, ExistingMatchBehavior, GamePacket, MatchConfiguration, Packet,
    StopCommand,
};
use crate::session::{PumpEvent, Session, SessionConfig};
use crate::showcase::{hold_pose, is_showcase_bot, ShowcaseScene, ShowcaseType};
use crate::transport::Connector;
use crate::waiter::{connect_until, wait_for, Step, WaitPhase};

#[cfg(feature = "transport-tcp")]
use crate::transports::TcpConnector;

// ── Results ─────────────────────────────────────────────────────────

/// Outcome of a controller operation, as reported back to the GUI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    /// Empty on success.
    pub message: String,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl<T> From<Result<T>> for ActionResult {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => {
                warn!("operation failed: {e}");
                Self::failed(e.to_string())
            }
        }
    }
}

// ── Hold loop ───────────────────────────────────────────────────────

/// Owner side of a running hold loop. Dropping it cancels the loop.
#[derive(Debug)]
struct HoldHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl HoldHandle {
    /// Cancel the loop and wait up to `grace` for it to leave its session.
    async fn stop(mut self, grace: Duration) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            warn!("hold loop did not stop within {grace:?}; aborting task");
            self.task.abort();
        }
    }

    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for HoldHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }
}

/// Re-apply the resting pose on every game packet until the server leaves,
/// the session fails, no packet arrives within `idle`, or `cancel` fires.
async fn hold_loop<C: Connector + ?Sized>(
    connector: Arc<C>,
    address: String,
    session_config: SessionConfig,
    idle: Duration,
    mut cancel: oneshot::Receiver<()>,
) {
    let connect = connect_until(
        connector.as_ref(),
        &address,
        &session_config,
        WaitPhase::Connect,
        idle,
        Instant::now() + idle,
    );
    let mut session = tokio::select! {
        _ = &mut cancel => {
            debug!("hold loop cancelled before connecting");
            return;
        }
        connected = connect => match connected.into_result() {
            Ok(session) => session,
            Err(e) => {
                warn!("hold loop could not connect: {e}");
                return;
            }
        },
    };

    let setup = session
        .send(Packet::ConnectionSettings(ConnectionSettings::controller(true)))
        .and_then(|()| session.send(Packet::InitComplete));
    if let Err(e) = setup {
        warn!("hold loop could not initialize: {e}");
        session.shutdown().await;
        return;
    }
    debug!(address = %address, "hold loop started");

    let pose = Packet::DesiredGameState(Box::new(hold_pose()));
    loop {
        let event = tokio::select! {
            _ = &mut cancel => {
                debug!("hold loop cancelled");
                break;
            }
            event = tokio::time::timeout(idle, session.next_event()) => event,
        };

        match event {
            Ok(Some(PumpEvent::Packet(Packet::GamePacket(_)))) => {
                if let Err(e) = session.send(pose.clone()) {
                    debug!("hold loop stopped: {e}");
                    break;
                }
            }
            Ok(Some(PumpEvent::Packet(Packet::DisconnectSignal))) => {
                debug!("server ended the hold loop session");
                break;
            }
            Ok(Some(PumpEvent::Packet(_))) => {}
            Ok(Some(PumpEvent::Failed(e))) => {
                debug!("hold loop session failed: {e}");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                warn!("no game packet for {idle:?}, stopping hold loop");
                break;
            }
        }
    }

    let _ = session.disconnect();
    session.shutdown().await;
    debug!("hold loop exited");
}

// ── Controller ──────────────────────────────────────────────────────

/// Drives matches on one core server.
pub struct MatchController<C: Connector> {
    config: ControllerConfig,
    connector: Arc<C>,
    hold: Mutex<Option<HoldHandle>>,
}

#[cfg(feature = "transport-tcp")]
impl MatchController<TcpConnector> {
    /// A controller that talks TCP to `config.address`.
    pub fn new(config: ControllerConfig) -> Self {
        let connector = match config.connect_timeout {
            Some(timeout) => TcpConnector::new().with_connect_timeout(timeout),
            None => TcpConnector::new(),
        };
        Self::with_connector(config, connector)
    }

    /// A controller for the server named by `RLBOT_SERVER_IP` and `RLBOT_SERVER_PORT`.
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::InvalidConfig`] if the port is not a valid
    /// port number.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ControllerConfig::from_env()?))
    }
}

impl<C: Connector> MatchController<C> {
    /// A controller that opens its sessions through `connector`.
    pub fn with_connector(config: ControllerConfig, connector: C) -> Self {
        Self {
            config,
            connector: Arc::new(connector),
            hold: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    // ── Matches ─────────────────────────────────────────────────────

    /// Start the match described by a GUI request and wait until it is live.
    pub async fn start_match(&self, options: &StartMatchOptions) -> ActionResult {
        let result = match options.to_match_configuration() {
            Ok(config) => self.start_and_wait(config).await,
            Err(e) => Err(e),
        };
        result.into()
    }

    /// Send `match_config` and wait until the new match is live.
    ///
    /// Stops the hold loop first, since the new match replaces the showcase.
    ///
    /// # Errors
    ///
    /// Fails if the server cannot be reached, the match does not load within
    /// the load window or go live within the ready window, or the server ends
    /// it first.
    pub async fn start_and_wait(&self, match_config: MatchConfiguration) -> Result<GamePacket> {
        self.stop_showcase_hold().await;
        info!(
            address = %self.config.address,
            players = match_config.player_configurations.len(),
            "starting match"
        );

        let load_window = self.config.load_window;
        let load_deadline = Instant::now() + load_window;
        let session = self
            .open_session(true, WaitPhase::MatchLoad, load_window, load_deadline)
            .await?;
        let sent = session
            .send(Packet::InitComplete)
            .and_then(|()| session.send(Packet::MatchConfiguration(Box::new(match_config))));
        if let Err(e) = sent {
            session.shutdown().await;
            return Err(e);
        }

        MatchReadyMachine::new(
            self.connector.as_ref(),
            &self.config.session,
            self.config.ready_windows(),
        )
        .run_until(session, load_deadline)
        .await
        .into_result()
    }

    /// Ask the server to stop the running match.
    pub async fn stop_match(&self, shutdown_server: bool) -> ActionResult {
        self.try_stop_match(shutdown_server).await.into()
    }

    async fn try_stop_match(&self, shutdown_server: bool) -> Result<()> {
        self.stop_showcase_hold().await;
        info!(shutdown_server, "stopping match");

        let address = self.config.address.to_string();
        let window = self.config.ready_window;
        let session = connect_until(
            self.connector.as_ref(),
            &address,
            &self.config.session,
            WaitPhase::Connect,
            window,
            Instant::now() + window,
        )
        .await
        .into_result()?;
        let sent = session
            .send(Packet::StopCommand(StopCommand { shutdown_server }))
            .and_then(|()| session.disconnect());
        session.shutdown().await;
        sent
    }

    // ── Loadout preview ─────────────────────────────────────────────

    /// Start a preview match showing `options.loadout` and wait until it is live.
    pub async fn launch_preview_loadout(
        &self,
        options: &LoadoutPreviewOptions,
        behavior: ExistingMatchBehavior,
    ) -> ActionResult {
        let result = match options.preview_match(behavior) {
            Ok(config) => self.start_and_wait(config).await,
            Err(e) => Err(e),
        };
        result.into()
    }

    /// Put `options.loadout` on the showcase car.
    pub async fn set_loadout(&self, options: &LoadoutPreviewOptions) -> ActionResult {
        self.apply_loadout(options).await.into()
    }

    /// Put `options.loadout` on the showcase car, restarting or respawning
    /// the preview match when the running one cannot take it in place.
    ///
    /// Returns the action that was taken. Does not wait for a restarted match
    /// to load.
    ///
    /// # Errors
    ///
    /// Fails if the server cannot be reached, no live game packet arrives
    /// within the ready window, or the server ends the session.
    pub async fn apply_loadout(&self, options: &LoadoutPreviewOptions) -> Result<LoadoutAction> {
        let window = self.config.ready_window;
        let deadline = Instant::now() + window;
        let mut session = self
            .open_session(false, WaitPhase::GamePacket, window, deadline)
            .await?;
        let result = self.apply_loadout_on(&mut session, options, deadline).await;
        close_session(session, result).await
    }

    async fn apply_loadout_on(
        &self,
        session: &mut Session,
        options: &LoadoutPreviewOptions,
        deadline: Instant,
    ) -> Result<LoadoutAction> {
        session.send(Packet::InitComplete)?;
        let packet = wait_for_live_packet(
            session,
            WaitPhase::GamePacket,
            self.config.ready_window,
            deadline,
            |_| true,
        )
        .await?;

        let conditions = LoadoutConditions::from_packet(&packet, options.team);
        let action = LoadoutAction::choose(conditions);
        info!(?action, ?conditions, "applying loadout");
        session.send(action.packet(options)?)?;
        Ok(action)
    }

    // ── Showcase ────────────────────────────────────────────────────

    /// Pose the showcase car as named by the GUI (`static`, `boost`,
    /// `throttle`, `back-center-kickoff` or `goal-explosion`).
    pub async fn set_showcase_type(&self, showcase_type: &str, team: u32) -> ActionResult {
        let result = match showcase_type.parse::<ShowcaseType>() {
            Ok(kind) => self.apply_showcase(kind, team).await,
            Err(e) => Err(e),
        };
        result.into()
    }

    /// Pose the showcase car on `team`.
    ///
    /// Waits until the showcase bot is alone in a live match on `team`. A
    /// running hold loop is stopped first; [`ShowcaseType::Static`] starts a
    /// new one.
    ///
    /// # Errors
    ///
    /// Fails if the server cannot be reached, the showcase bot does not show
    /// up within the ready window, or the server ends the session.
    pub async fn apply_showcase(&self, kind: ShowcaseType, team: u32) -> Result<()> {
        self.stop_showcase_hold().await;

        let window = self.config.ready_window;
        let deadline = Instant::now() + window;
        let mut session = self
            .open_session(false, WaitPhase::ShowcaseBot, window, deadline)
            .await?;
        let result = self
            .apply_showcase_on(&mut session, kind, team, deadline)
            .await;
        let result = close_session(session, result).await;

        if result.is_ok() && kind.holds_pose() {
            self.start_showcase_hold().await;
        }
        result
    }

    async fn apply_showcase_on(
        &self,
        session: &mut Session,
        kind: ShowcaseType,
        team: u32,
        deadline: Instant,
    ) -> Result<()> {
        session.send(Packet::InitComplete)?;
        let packet = wait_for_live_packet(
            session,
            WaitPhase::ShowcaseBot,
            self.config.ready_window,
            deadline,
            |game| {
                game.sole_player()
                    .is_some_and(|player| is_showcase_bot(player) && player.team == team)
            },
        )
        .await?;
        debug!(phase = ?packet.phase(), "showcase bot is ready");

        info!(%kind, team, "setting showcase");
        let scene = ShowcaseScene::new(kind, team);
        session.send(Packet::DesiredGameState(Box::new(scene.state)))?;
        session.send(Packet::PlayerInput(scene.input))?;
        Ok(())
    }

    /// Stop the hold loop, if one is running.
    pub async fn stop_showcase_hold(&self) {
        let handle = self.hold.lock().await.take();
        if let Some(handle) = handle {
            debug!("stopping hold loop");
            handle.stop(self.config.session.shutdown_timeout).await;
        }
    }

    /// Returns `true` while a hold loop is running.
    pub async fn is_holding(&self) -> bool {
        self.hold
            .lock()
            .await
            .as_ref()
            .is_some_and(HoldHandle::is_running)
    }

    async fn start_showcase_hold(&self) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(hold_loop(
            Arc::clone(&self.connector),
            self.config.address.to_string(),
            self.config.session.clone(),
            self.config.load_window,
            cancel_rx,
        ));
        let previous = self.hold.lock().await.replace(HoldHandle {
            cancel: Some(cancel_tx),
            task,
        });
        // Replacing drops, and so cancels, any loop started concurrently.
        drop(previous);
    }

    // ── Helpers ─────────────────────────────────────────────────────

    /// Connect and negotiate a controller session. The connect counts
    /// against `deadline`, the deadline of the wait that follows.
    async fn open_session(
        &self,
        close_between_matches: bool,
        phase: WaitPhase,
        window: Duration,
        deadline: Instant,
    ) -> Result<Session> {
        let address = self.config.address.to_string();
        let session = connect_until(
            self.connector.as_ref(),
            &address,
            &self.config.session,
            phase,
            window,
            deadline,
        )
        .await
        .into_result()?;
        let settings = ConnectionSettings::controller(close_between_matches);
        if let Err(e) = session.send(Packet::ConnectionSettings(settings)) {
            session.shutdown().await;
            return Err(e);
        }
        Ok(session)
    }
}

impl<C: Connector> std::fmt::Debug for MatchController<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Wait until `deadline` for a live game packet that `accept` likes.
async fn wait_for_live_packet(
    session: &mut Session,
    phase: WaitPhase,
    window: Duration,
    deadline: Instant,
    accept: impl Fn(&GamePacket) -> bool,
) -> Result<Box<GamePacket>> {
    let outcome = wait_for(session, phase, window, deadline, None, |last, packet| {
        match packet {
            Packet::GamePacket(game) if game.phase().is_live() && accept(&game) => {
                Step::Ready(Some(game))
            }
            Packet::GamePacket(game) => Step::Pending(Some(game)),
            Packet::DisconnectSignal => Step::Ended(format!("ended while waiting for {phase}")),
            _ => Step::Pending(last),
        }
    })
    .await;
    outcome
        .into_result()?
        .ok_or(MatchControlError::TransportClosed)
}

/// Leave `session`, keeping `result`. Timeouts already queued their
/// disconnect.
async fn close_session<T>(session: Session, result: Result<T>) -> Result<T> {
    if !matches!(result, Err(MatchControlError::TimedOut { .. })) {
        let _ = session.disconnect();
    }
    session.shutdown().await;
    result
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
    fn action_result_from_result() {
        let ok: ActionResult = Result::Ok(5).into();
        assert_eq!(ok, ActionResult::ok());

        let failed: ActionResult = Result::<()>::Err(MatchControlError::Disconnected {
            reason: "ended while loading".into(),
        })
        .into();
        assert!(!failed.success);
        assert_eq!(failed.message, "match was ended while loading");
    }

    #[test]
    fn action_result_json_shape() {
        let json = serde_json::to_value(ActionResult::failed("boom")).unwrap();
        assert_eq!(json, serde_json::json!({ "success": false, "message": "boom" }));
    }
}
