//! Packet types exchanged with the core server.
//!
//! Every packet is a variant of [`Packet`]. On the wire a packet is the JSON
//! document produced by serde's adjacent tagging (`{"type": ..., "data": ...}`)
//! wrapped in a length-prefixed frame (see [`crate::transport`]). Large
//! payloads are boxed to keep the enum small.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Team index of the blue team.
pub const BLUE_TEAM: u32 = 0;
/// Team index of the orange team.
pub const ORANGE_TEAM: u32 = 1;

// ── Enums ───────────────────────────────────────────────────────────

/// Lifecycle stage of the match the server is currently running.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// No match is loaded or the match has not started yet.
    #[default]
    Inactive,
    /// Pre-kickoff countdown.
    Countdown,
    /// Kickoff is in progress; cars can drive.
    Kickoff,
    /// Regular play.
    Active,
    /// A goal was just scored.
    GoalScored,
    /// Goal replay is playing.
    Replay,
    /// The game is paused.
    Paused,
    /// The match is over.
    Ended,
}

impl MatchPhase {
    /// Returns `true` if the match is live and playable.
    ///
    /// Only `Kickoff` and `Active` count. Every other phase, in particular
    /// `Inactive`, `Ended` and `Paused`, means the match is not ready.
    pub fn is_live(self) -> bool {
        matches!(self, MatchPhase::Kickoff | MatchPhase::Active)
    }

    /// Returns `true` if the match has finished or was never started.
    pub fn is_over(self) -> bool {
        matches!(self, MatchPhase::Ended | MatchPhase::Inactive)
    }
}

/// Game mode of a match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[default]
    Soccar,
    Hoops,
    Dropshot,
    Snowday,
    Rumble,
    Heatseeker,
    Gridiron,
    Knockout,
}

/// How the server should launch the game client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Launcher {
    Steam,
    Epic,
    /// Launcher named by the `launcher_arg` of the match configuration.
    Custom,
    /// Attach to an already running game.
    #[default]
    NoLaunch,
}

/// Whether agents may draw debug rendering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DebugRendering {
    #[default]
    OffByDefault,
    OnByDefault,
    AlwaysOff,
}

impl TryFrom<u8> for DebugRendering {
    type Error = u8;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(DebugRendering::OffByDefault),
            1 => Ok(DebugRendering::OnByDefault),
            2 => Ok(DebugRendering::AlwaysOff),
            other => Err(other),
        }
    }
}

/// How the server reconciles a new match configuration with a match already in progress.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExistingMatchBehavior {
    /// Always tear down the running match and start a new one.
    #[default]
    Restart,
    /// Restart only if the configuration differs from the running match.
    RestartIfDifferent,
    /// Keep the running match and spawn the configured players into it.
    ContinueAndSpawn,
}

impl TryFrom<u8> for ExistingMatchBehavior {
    type Error = u8;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(ExistingMatchBehavior::Restart),
            1 => Ok(ExistingMatchBehavior::RestartIfDifferent),
            2 => Ok(ExistingMatchBehavior::ContinueAndSpawn),
            other => Err(other),
        }
    }
}

/// Skill level of a built-in (Psyonix) bot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PsyonixSkill {
    Beginner,
    Rookie,
    #[default]
    Pro,
    AllStar,
}

impl From<u8> for PsyonixSkill {
    fn from(skill: u8) -> Self {
        match skill {
            0 => PsyonixSkill::Beginner,
            1 => PsyonixSkill::Rookie,
            2 => PsyonixSkill::Pro,
            _ => PsyonixSkill::AllStar,
        }
    }
}

/// Match length mutator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchLengthMutator {
    #[default]
    FiveMinutes,
    TenMinutes,
    TwentyMinutes,
    Unlimited,
}

/// Boost amount mutator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoostAmountMutator {
    #[default]
    NormalBoost,
    UnlimitedBoost,
    SlowRecharge,
    RapidRecharge,
    NoBoost,
}

// ── Session negotiation ─────────────────────────────────────────────

/// First packet of every session, describing what this client wants to receive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConnectionSettings {
    /// Agent id this connection speaks for; empty for a controller.
    pub agent_id: String,
    pub wants_ball_predictions: bool,
    pub wants_comms: bool,
    /// Ask the server to close this connection when a new match starts.
    pub close_between_matches: bool,
}

impl ConnectionSettings {
    /// Settings for a controller connection that carries no agent.
    pub fn controller(close_between_matches: bool) -> Self {
        Self {
            close_between_matches,
            ..Self::default()
        }
    }
}

/// Asks the server to stop the running match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StopCommand {
    /// Also shut down the server process.
    pub shutdown_server: bool,
}

// ── Match configuration ─────────────────────────────────────────────

/// Kind of player occupying a car.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayerClass {
    /// A bot process started by the server.
    CustomBot,
    /// A built-in bot.
    Psyonix { bot_skill: PsyonixSkill },
    /// A human at the keyboard.
    Human,
}

/// Paint ids of a loadout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LoadoutPaint {
    pub car_paint_id: u32,
    pub decal_paint_id: u32,
    pub wheels_paint_id: u32,
    pub boost_paint_id: u32,
    pub antenna_paint_id: u32,
    pub hat_paint_id: u32,
    pub trails_paint_id: u32,
    pub goal_explosion_paint_id: u32,
}

/// Cosmetic items of a car.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PlayerLoadout {
    pub team_color_id: u32,
    pub custom_color_id: u32,
    pub car_id: u32,
    pub decal_id: u32,
    pub wheels_id: u32,
    pub boost_id: u32,
    pub antenna_id: u32,
    pub hat_id: u32,
    pub paint_finish_id: u32,
    pub custom_finish_id: u32,
    pub engine_audio_id: u32,
    pub trails_id: u32,
    pub goal_explosion_id: u32,
    pub loadout_paint: LoadoutPaint,
}

/// One car in a match configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfiguration {
    pub variety: PlayerClass,
    pub name: String,
    pub agent_id: String,
    pub team: u32,
    pub root_dir: String,
    pub run_command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loadout: Option<PlayerLoadout>,
    /// Left at zero so the server assigns it.
    pub spawn_id: i32,
    pub hivemind: bool,
}

/// One script process in a match configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptConfiguration {
    pub name: String,
    pub agent_id: String,
    pub root_dir: String,
    pub run_command: String,
    /// Left at zero so the server assigns it.
    pub script_id: i32,
}

/// Mutator settings of a match.
///
/// Only the mutators the controller inspects are typed; the rest pass through
/// untouched from the requesting UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MutatorSettings {
    #[serde(default)]
    pub match_length: MatchLengthMutator,
    #[serde(default)]
    pub boost_amount: BoostAmountMutator,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Full description of a match to start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MatchConfiguration {
    pub launcher: Launcher,
    pub launcher_arg: String,
    pub auto_start_agents: bool,
    pub wait_for_agents: bool,
    pub game_map_upk: String,
    pub player_configurations: Vec<PlayerConfiguration>,
    pub script_configurations: Vec<ScriptConfiguration>,
    pub game_mode: GameMode,
    pub skip_replays: bool,
    pub instant_start: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutators: Option<MutatorSettings>,
    pub existing_match_behavior: ExistingMatchBehavior,
    pub enable_rendering: DebugRendering,
    pub enable_state_setting: bool,
    pub auto_save_replay: bool,
    pub freeplay: bool,
}

// ── Server state ────────────────────────────────────────────────────

/// A point or direction in field coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// A boost pad on the field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct BoostPad {
    pub location: Vector3,
    pub is_full_boost: bool,
}

/// A goal on the field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct GoalInfo {
    pub team_num: u32,
    pub location: Vector3,
    pub direction: Vector3,
    pub width: f32,
    pub height: f32,
}

/// Static description of the loaded arena, sent once per match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FieldInfo {
    #[serde(default)]
    pub boost_pads: Vec<BoostPad>,
    #[serde(default)]
    pub goals: Vec<GoalInfo>,
}

/// Match-wide part of a [`GamePacket`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MatchInfo {
    pub match_phase: MatchPhase,
    #[serde(default)]
    pub is_unlimited_time: bool,
    #[serde(default)]
    pub seconds_elapsed: f32,
    #[serde(default)]
    pub game_time_remaining: f32,
}

/// Snapshot of one car in a [`GamePacket`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlayerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub agent_id: String,
    pub team: u32,
    pub is_bot: bool,
}

/// Per-tick snapshot of the running match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GamePacket {
    pub match_info: MatchInfo,
    #[serde(default)]
    pub players: Vec<PlayerInfo>,
}

impl GamePacket {
    /// Phase of the match this snapshot describes.
    pub fn phase(&self) -> MatchPhase {
        self.match_info.match_phase
    }

    /// The only player in the match, if there is exactly one.
    pub fn sole_player(&self) -> Option<&PlayerInfo> {
        match self.players.as_slice() {
            [player] => Some(player),
            _ => None,
        }
    }
}

// ── State setting ───────────────────────────────────────────────────

/// A vector whose components may each be left untouched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Vector3Partial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
}

impl Vector3Partial {
    /// A vector with all three components set.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }
}

/// A rotation whose components may each be left untouched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct RotatorPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll: Option<f32>,
}

impl RotatorPartial {
    /// A rotation with all three components set.
    pub fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self {
            pitch: Some(pitch),
            yaw: Some(yaw),
            roll: Some(roll),
        }
    }
}

/// Desired physics of a car or ball; unset fields keep their current value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DesiredPhysics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Vector3Partial>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<RotatorPartial>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Vector3Partial>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angular_velocity: Option<Vector3Partial>,
}

/// Desired state of one car.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DesiredCarState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physics: Option<DesiredPhysics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost_amount: Option<f32>,
}

/// Desired state of one ball.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DesiredBallState {
    pub physics: DesiredPhysics,
}

/// Overwrites parts of the running game state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DesiredGameState {
    #[serde(default)]
    pub ball_states: Vec<DesiredBallState>,
    #[serde(default)]
    pub car_states: Vec<DesiredCarState>,
}

/// Controller inputs for one car.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ControllerState {
    pub throttle: f32,
    pub steer: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub jump: bool,
    pub boost: bool,
    pub handbrake: bool,
    pub use_item: bool,
}

/// Drives one car with the given controller state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PlayerInput {
    pub player_index: u32,
    pub controller_state: ControllerState,
}

/// Replaces the loadout of a car in the running match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct SetLoadout {
    pub index: u32,
    pub loadout: PlayerLoadout,
}

// ── Packets ─────────────────────────────────────────────────────────

/// Every packet kind the controller sends or receives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum Packet {
    /// Negotiates what this connection wants (outbound, first packet).
    ConnectionSettings(ConnectionSettings),
    /// Starts or reconfigures a match (outbound; echoed inbound).
    MatchConfiguration(Box<MatchConfiguration>),
    /// Tells the server this connection finished initializing (outbound).
    InitComplete,
    /// Arena description (inbound, once per match).
    FieldInfo(Box<FieldInfo>),
    /// Per-tick match snapshot (inbound).
    GamePacket(Box<GamePacket>),
    /// The sender is leaving the session (both directions).
    DisconnectSignal,
    /// Stops the running match (outbound).
    StopCommand(StopCommand),
    /// Replaces a car's loadout (outbound).
    SetLoadout(Box<SetLoadout>),
    /// Overwrites game state (outbound).
    DesiredGameState(Box<DesiredGameState>),
    /// Drives a car (outbound).
    PlayerInput(PlayerInput),
}

impl Packet {
    /// Short name of the packet kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::ConnectionSettings(_) => "ConnectionSettings",
            Packet::MatchConfiguration(_) => "MatchConfiguration",
            Packet::InitComplete => "InitComplete",
            Packet::FieldInfo(_) => "FieldInfo",
            Packet::GamePacket(_) => "GamePacket",
            Packet::DisconnectSignal => "DisconnectSignal",
            Packet::StopCommand(_) => "StopCommand",
            Packet::SetLoadout(_) => "SetLoadout",
            Packet::DesiredGameState(_) => "DesiredGameState",
            Packet::PlayerInput(_) => "PlayerInput",
        }
    }

    /// Returns `true` for [`Packet::DisconnectSignal`].
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Packet::DisconnectSignal)
    }
}

/// Serialize a packet into a frame payload.
///
/// # Errors
///
/// Returns [`MatchControlError::Serialization`](crate::MatchControlError::Serialization)
/// if serde fails, which only happens for non-finite floats in map keys and similar
/// programming errors.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(packet)?)
}

/// Deserialize a frame payload into a packet.
///
/// # Errors
///
/// Returns [`MatchControlError::Serialization`](crate::MatchControlError::Serialization)
/// if the payload is not a known packet.
pub fn decode_packet(payload: &[u8]) -> Result<Packet> {
    Ok(serde_json::from_slice(payload)?)
}
