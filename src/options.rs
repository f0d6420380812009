//! Match requests as sent by the GUI, and their conversion to
//! [`MatchConfiguration`]s.
//!
//! All request types deserialize from the camelCase JSON the frontend
//! produces. Conversion is lenient where a sensible default exists (unknown
//! game modes and launchers are logged and defaulted) and strict where the
//! server would misbehave (unknown numeric codes).

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MatchControlError, Result};
use crate::protocol::{
    BoostAmountMutator, DebugRendering, ExistingMatchBehavior, GameMode, Launcher, LoadoutPaint,
    MatchConfiguration, MatchLengthMutator, MutatorSettings, PlayerClass, PlayerConfiguration,
    PlayerLoadout, PsyonixSkill, ScriptConfiguration, BLUE_TEAM, ORANGE_TEAM,
};

/// Display name of the bot that occupies preview matches.
pub const SHOWCASE_BOT_NAME: &str = "Showcase";

/// Agent id of the bot that occupies preview matches.
pub const SHOWCASE_AGENT_ID: &str = "gui/loadout-preview";

// ── Loadouts ────────────────────────────────────────────────────────

/// Paint ids of one team's loadout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamPaintConfig {
    pub car_paint_id: u32,
    pub decal_paint_id: u32,
    pub wheels_paint_id: u32,
    pub boost_paint_id: u32,
    pub antenna_paint_id: u32,
    pub hat_paint_id: u32,
    pub trails_paint_id: u32,
    pub goal_explosion_paint_id: u32,
}

/// A car loadout for one team, as edited in the GUI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamLoadoutConfig {
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
    pub paint: TeamPaintConfig,
}

impl TeamLoadoutConfig {
    pub fn to_player_loadout(&self) -> PlayerLoadout {
        PlayerLoadout {
            team_color_id: self.team_color_id,
            custom_color_id: self.custom_color_id,
            car_id: self.car_id,
            decal_id: self.decal_id,
            wheels_id: self.wheels_id,
            boost_id: self.boost_id,
            antenna_id: self.antenna_id,
            hat_id: self.hat_id,
            paint_finish_id: self.paint_finish_id,
            custom_finish_id: self.custom_finish_id,
            engine_audio_id: self.engine_audio_id,
            trails_id: self.trails_id,
            goal_explosion_id: self.goal_explosion_id,
            loadout_paint: LoadoutPaint {
                car_paint_id: self.paint.car_paint_id,
                decal_paint_id: self.paint.decal_paint_id,
                wheels_paint_id: self.paint.wheels_paint_id,
                boost_paint_id: self.paint.boost_paint_id,
                antenna_paint_id: self.paint.antenna_paint_id,
                hat_paint_id: self.paint.hat_paint_id,
                trails_paint_id: self.paint.trails_paint_id,
                goal_explosion_paint_id: self.paint.goal_explosion_paint_id,
            },
        }
    }
}

/// A bot's loadout for both teams.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadoutConfig {
    pub blue_loadout: TeamLoadoutConfig,
    pub orange_loadout: TeamLoadoutConfig,
}

impl LoadoutConfig {
    /// The loadout for `team`; anything but blue gets the orange one.
    pub fn for_team(&self, team: u32) -> &TeamLoadoutConfig {
        if team == BLUE_TEAM {
            &self.blue_loadout
        } else {
            &self.orange_loadout
        }
    }
}

// ── Players ─────────────────────────────────────────────────────────

/// The `[settings]` table of a bot or script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BotSettings {
    pub name: String,
    /// Usually `<developer>/<botname>`.
    pub agent_id: String,
    pub loadout_file: String,
    pub root_dir: String,
    pub logo_file: String,
    pub run_command: String,
    pub run_command_linux: String,
    pub hivemind: bool,
}

impl BotSettings {
    /// The command for the platform this controller runs on.
    pub fn platform_run_command(&self) -> &str {
        if cfg!(windows) {
            &self.run_command
        } else {
            &self.run_command_linux
        }
    }
}

/// A bot or script's configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BotConfig {
    pub settings: BotSettings,
}

/// A discovered bot or script, as listed in the GUI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BotInfo {
    pub config: BotConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loadout: Option<LoadoutConfig>,
    #[serde(default)]
    pub toml_path: String,
}

impl BotInfo {
    pub fn to_player_configuration(&self, team: u32) -> PlayerConfiguration {
        let settings = &self.config.settings;
        PlayerConfiguration {
            variety: PlayerClass::CustomBot,
            name: settings.name.clone(),
            agent_id: settings.agent_id.clone(),
            team,
            root_dir: settings.root_dir.clone(),
            run_command: settings.platform_run_command().to_string(),
            loadout: self
                .loadout
                .as_ref()
                .map(|loadout| loadout.for_team(team).to_player_loadout()),
            spawn_id: 0,
            hivemind: settings.hivemind,
        }
    }

    pub fn to_script_configuration(&self) -> ScriptConfiguration {
        let settings = &self.config.settings;
        ScriptConfiguration {
            name: settings.name.clone(),
            agent_id: settings.agent_id.clone(),
            root_dir: settings.root_dir.clone(),
            run_command: settings.platform_run_command().to_string(),
            script_id: 0,
        }
    }
}

/// A built-in bot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PsyonixBotInfo {
    /// Beginner: 0, Rookie: 1, Pro: 2, AllStar: 3.
    #[serde(default)]
    pub skill: u8,
}

/// A human player.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HumanInfo {}

/// One roster entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "sort", content = "player", rename_all = "lowercase")]
pub enum PlayerEntry {
    Rlbot(BotInfo),
    Psyonix(PsyonixBotInfo),
    Human(HumanInfo),
}

impl PlayerEntry {
    pub fn to_player_configuration(&self, team: u32) -> PlayerConfiguration {
        match self {
            PlayerEntry::Rlbot(bot) => bot.to_player_configuration(team),
            PlayerEntry::Psyonix(info) => anonymous_player(
                PlayerClass::Psyonix {
                    bot_skill: PsyonixSkill::from(info.skill),
                },
                team,
            ),
            PlayerEntry::Human(_) => anonymous_player(PlayerClass::Human, team),
        }
    }
}

fn anonymous_player(variety: PlayerClass, team: u32) -> PlayerConfiguration {
    PlayerConfiguration {
        variety,
        name: String::new(),
        agent_id: String::new(),
        team,
        root_dir: String::new(),
        run_command: String::new(),
        loadout: Some(PlayerLoadout::default()),
        spawn_id: 0,
        hivemind: false,
    }
}

// ── Match requests ──────────────────────────────────────────────────

/// Toggles below the main match form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtraOptions {
    pub freeplay: bool,
    /// Wire code of a [`DebugRendering`].
    pub enable_rendering: u8,
    pub enable_state_setting: bool,
    pub instant_start: bool,
    pub skip_replays: bool,
    pub auto_save_replay: bool,
    /// Wire code of an [`ExistingMatchBehavior`].
    pub existing_match_behavior: u8,
    pub auto_start_agents: bool,
    pub wait_for_agents: bool,
}

/// A request to start a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StartMatchOptions {
    pub map: String,
    pub game_mode: String,
    pub scripts: Vec<BotInfo>,
    pub blue_players: Vec<PlayerEntry>,
    pub orange_players: Vec<PlayerEntry>,
    pub mutator_settings: MutatorSettings,
    pub extra_options: ExtraOptions,
    pub launcher: String,
    pub launcher_arg: String,
}

impl StartMatchOptions {
    /// Build the match configuration for this request.
    ///
    /// Blue players come first, then orange players.
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::InvalidConfig`] for an unknown rendering or
    /// existing-match-behavior code.
    pub fn to_match_configuration(&self) -> Result<MatchConfiguration> {
        let extra = &self.extra_options;
        let enable_rendering = DebugRendering::try_from(extra.enable_rendering).map_err(|code| {
            MatchControlError::InvalidConfig(format!("unknown rendering option {code}"))
        })?;
        let existing_match_behavior = ExistingMatchBehavior::try_from(
            extra.existing_match_behavior,
        )
        .map_err(|code| {
            MatchControlError::InvalidConfig(format!("unknown existing match behavior {code}"))
        })?;

        let player_configurations = self
            .blue_players
            .iter()
            .map(|player| player.to_player_configuration(BLUE_TEAM))
            .chain(
                self.orange_players
                    .iter()
                    .map(|player| player.to_player_configuration(ORANGE_TEAM)),
            )
            .collect();

        Ok(MatchConfiguration {
            launcher: parse_launcher(&self.launcher),
            launcher_arg: self.launcher_arg.clone(),
            auto_start_agents: extra.auto_start_agents,
            wait_for_agents: extra.wait_for_agents,
            game_map_upk: self.map.clone(),
            player_configurations,
            script_configurations: self
                .scripts
                .iter()
                .map(BotInfo::to_script_configuration)
                .collect(),
            game_mode: parse_game_mode(&self.game_mode),
            skip_replays: extra.skip_replays,
            instant_start: extra.instant_start,
            mutators: Some(self.mutator_settings.clone()),
            existing_match_behavior,
            enable_rendering,
            enable_state_setting: extra.enable_state_setting,
            auto_save_replay: extra.auto_save_replay,
            freeplay: extra.freeplay,
        })
    }
}

/// A request to preview a loadout on the showcase bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadoutPreviewOptions {
    pub map: String,
    pub loadout: TeamLoadoutConfig,
    pub team: u32,
    pub launcher: String,
    pub launcher_arg: String,
}

impl LoadoutPreviewOptions {
    /// The single-bot match that shows off this loadout.
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::InvalidConfig`] if the launcher is not one
    /// of `steam`, `epic`, `legendary`, `heroic`, `custom` or `nolaunch`.
    pub fn preview_match(&self, behavior: ExistingMatchBehavior) -> Result<MatchConfiguration> {
        let (launcher, launcher_arg) = match self.launcher.as_str() {
            "steam" => (Launcher::Steam, self.launcher_arg.clone()),
            "epic" => (Launcher::Epic, self.launcher_arg.clone()),
            "legendary" | "heroic" => (Launcher::Custom, self.launcher.clone()),
            "custom" => (Launcher::Custom, self.launcher_arg.clone()),
            "nolaunch" => (Launcher::NoLaunch, self.launcher_arg.clone()),
            _ => {
                return Err(MatchControlError::InvalidConfig(
                    "no launcher specified".into(),
                ))
            }
        };

        let showcase = PlayerConfiguration {
            variety: PlayerClass::CustomBot,
            name: SHOWCASE_BOT_NAME.to_string(),
            agent_id: SHOWCASE_AGENT_ID.to_string(),
            team: self.team,
            root_dir: String::new(),
            run_command: String::new(),
            loadout: Some(self.loadout.to_player_loadout()),
            spawn_id: 0,
            hivemind: false,
        };

        Ok(MatchConfiguration {
            launcher,
            launcher_arg,
            auto_start_agents: false,
            wait_for_agents: false,
            game_map_upk: self.map.clone(),
            player_configurations: vec![showcase],
            script_configurations: vec![],
            game_mode: GameMode::Soccar,
            skip_replays: true,
            instant_start: true,
            mutators: Some(MutatorSettings {
                match_length: MatchLengthMutator::Unlimited,
                boost_amount: BoostAmountMutator::UnlimitedBoost,
                ..MutatorSettings::default()
            }),
            existing_match_behavior: behavior,
            enable_rendering: DebugRendering::AlwaysOff,
            enable_state_setting: true,
            auto_save_replay: false,
            freeplay: false,
        })
    }
}

/// Parse a GUI game mode name, defaulting to Soccar.
pub fn parse_game_mode(name: &str) -> GameMode {
    match name {
        "Soccar" => GameMode::Soccar,
        "Hoops" => GameMode::Hoops,
        "Dropshot" => GameMode::Dropshot,
        "Snowday" => GameMode::Snowday,
        "Rumble" => GameMode::Rumble,
        "Heatseeker" => GameMode::Heatseeker,
        "Gridiron" => GameMode::Gridiron,
        "Knockout" => GameMode::Knockout,
        other => {
            warn!(game_mode = other, "unknown game mode, defaulting to Soccar");
            GameMode::Soccar
        }
    }
}

/// Parse a GUI launcher name, defaulting to no launch.
pub fn parse_launcher(name: &str) -> Launcher {
    match name {
        "steam" => Launcher::Steam,
        "epic" => Launcher::Epic,
        "custom" => Launcher::Custom,
        "nolaunch" => Launcher::NoLaunch,
        other => {
            warn!(launcher = other, "unknown launcher, defaulting to NoLaunch");
            Launcher::NoLaunch
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
    use serde_json::json;

    fn bot(name: &str) -> BotInfo {
        BotInfo {
            config: BotConfig {
                settings: BotSettings {
                    name: name.to_string(),
                    agent_id: format!("dev/{name}"),
                    root_dir: format!("/bots/{name}"),
                    run_command: "run.bat".into(),
                    run_command_linux: "./run.sh".into(),
                    ..BotSettings::default()
                },
            },
            loadout: None,
            toml_path: String::new(),
        }
    }

    #[test]
    fn game_mode_names() {
        assert_eq!(parse_game_mode("Hoops"), GameMode::Hoops);
        assert_eq!(parse_game_mode("Knockout"), GameMode::Knockout);
        assert_eq!(parse_game_mode(""), GameMode::Soccar);
        assert_eq!(parse_game_mode("hoops"), GameMode::Soccar);
    }

    #[test]
    fn launcher_names() {
        assert_eq!(parse_launcher("steam"), Launcher::Steam);
        assert_eq!(parse_launcher("epic"), Launcher::Epic);
        assert_eq!(parse_launcher("custom"), Launcher::Custom);
        assert_eq!(parse_launcher("nolaunch"), Launcher::NoLaunch);
        assert_eq!(parse_launcher("legendary"), Launcher::NoLaunch);
    }

    #[test]
    fn start_match_options_from_gui_json() {
        let options: StartMatchOptions = serde_json::from_value(json!({
            "map": "Stadium_P",
            "gameMode": "Hoops",
            "scripts": [],
            "bluePlayers": [
                { "sort": "rlbot", "player": {
                    "config": { "settings": {
                        "name": "Atba", "agentId": "rlbot/atba",
                        "runCommand": "atba.exe", "runCommandLinux": "./atba"
                    } },
                    "tomlPath": "/bots/atba/bot.toml"
                } },
                { "sort": "human", "player": {} }
            ],
            "orangePlayers": [
                { "sort": "psyonix", "player": { "skill": 3 } }
            ],
            "extraOptions": {
                "enableRendering": 1,
                "existingMatchBehavior": 2,
                "instantStart": true
            },
            "launcher": "steam",
            "launcherArg": ""
        }))
        .unwrap();

        let config = options.to_match_configuration().unwrap();
        assert_eq!(config.game_mode, GameMode::Hoops);
        assert_eq!(config.launcher, Launcher::Steam);
        assert_eq!(config.game_map_upk, "Stadium_P");
        assert_eq!(config.enable_rendering, DebugRendering::OnByDefault);
        assert_eq!(
            config.existing_match_behavior,
            ExistingMatchBehavior::ContinueAndSpawn
        );
        assert!(config.instant_start);

        let players = &config.player_configurations;
        assert_eq!(players.len(), 3);
        assert_eq!(players[0].name, "Atba");
        assert_eq!(players[0].team, BLUE_TEAM);
        assert_eq!(players[0].variety, PlayerClass::CustomBot);
        assert_eq!(players[1].variety, PlayerClass::Human);
        assert_eq!(players[1].team, BLUE_TEAM);
        assert_eq!(
            players[2].variety,
            PlayerClass::Psyonix {
                bot_skill: PsyonixSkill::AllStar
            }
        );
        assert_eq!(players[2].team, ORANGE_TEAM);
    }

    #[test]
    fn unknown_codes_are_rejected() {
        let mut options = StartMatchOptions::default();
        options.extra_options.existing_match_behavior = 9;
        assert!(matches!(
            options.to_match_configuration(),
            Err(MatchControlError::InvalidConfig(_))
        ));

        let mut options = StartMatchOptions::default();
        options.extra_options.enable_rendering = 3;
        assert!(matches!(
            options.to_match_configuration(),
            Err(MatchControlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn bot_uses_platform_command_and_team_loadout() {
        let mut info = bot("Nexto");
        info.loadout = Some(LoadoutConfig {
            blue_loadout: TeamLoadoutConfig {
                car_id: 23,
                ..TeamLoadoutConfig::default()
            },
            orange_loadout: TeamLoadoutConfig {
                car_id: 4284,
                ..TeamLoadoutConfig::default()
            },
        });

        let blue = info.to_player_configuration(BLUE_TEAM);
        let orange = info.to_player_configuration(ORANGE_TEAM);
        assert_eq!(blue.loadout.unwrap().car_id, 23);
        assert_eq!(orange.loadout.unwrap().car_id, 4284);

        let expected = if cfg!(windows) { "run.bat" } else { "./run.sh" };
        assert_eq!(blue.run_command, expected);
        assert_eq!(info.to_script_configuration().run_command, expected);
        assert_eq!(blue.spawn_id, 0);
    }

    #[test]
    fn bot_without_loadout_leaves_it_to_the_server() {
        let config = bot("Atba").to_player_configuration(ORANGE_TEAM);
        assert!(config.loadout.is_none());
    }

    #[test]
    fn preview_match_has_single_showcase_bot() {
        let options = LoadoutPreviewOptions {
            map: "Mannfield".into(),
            loadout: TeamLoadoutConfig {
                car_id: 1856,
                paint: TeamPaintConfig {
                    car_paint_id: 12,
                    ..TeamPaintConfig::default()
                },
                ..TeamLoadoutConfig::default()
            },
            team: ORANGE_TEAM,
            launcher: "epic".into(),
            launcher_arg: String::new(),
        };

        let config = options
            .preview_match(ExistingMatchBehavior::ContinueAndSpawn)
            .unwrap();
        assert_eq!(config.player_configurations.len(), 1);
        let showcase = &config.player_configurations[0];
        assert_eq!(showcase.name, SHOWCASE_BOT_NAME);
        assert_eq!(showcase.agent_id, SHOWCASE_AGENT_ID);
        assert_eq!(showcase.team, ORANGE_TEAM);
        let loadout = showcase.loadout.unwrap();
        assert_eq!(loadout.car_id, 1856);
        assert_eq!(loadout.loadout_paint.car_paint_id, 12);

        assert_eq!(config.launcher, Launcher::Epic);
        assert_eq!(config.game_mode, GameMode::Soccar);
        let mutators = config.mutators.unwrap();
        assert_eq!(mutators.match_length, MatchLengthMutator::Unlimited);
        assert_eq!(mutators.boost_amount, BoostAmountMutator::UnlimitedBoost);
        assert_eq!(config.enable_rendering, DebugRendering::AlwaysOff);
        assert!(config.enable_state_setting);
        assert!(config.instant_start);
        assert!(config.skip_replays);
        assert!(!config.auto_save_replay);
        assert!(!config.freeplay);
        assert_eq!(
            config.existing_match_behavior,
            ExistingMatchBehavior::ContinueAndSpawn
        );
    }

    #[test]
    fn preview_launcher_handling() {
        let mut options = LoadoutPreviewOptions {
            launcher: "heroic".into(),
            launcher_arg: "ignored".into(),
            ..LoadoutPreviewOptions::default()
        };
        let config = options.preview_match(ExistingMatchBehavior::Restart).unwrap();
        assert_eq!(config.launcher, Launcher::Custom);
        assert_eq!(config.launcher_arg, "heroic");

        options.launcher = "custom".into();
        let config = options.preview_match(ExistingMatchBehavior::Restart).unwrap();
        assert_eq!(config.launcher_arg, "ignored");

        options.launcher = "origin".into();
        let err = options
            .preview_match(ExistingMatchBehavior::Restart)
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration: no launcher specified");
    }

    #[test]
    fn loadout_json_is_camel_case() {
        let loadout: TeamLoadoutConfig = serde_json::from_value(json!({
            "teamColorId": 1,
            "goalExplosionId": 3,
            "paint": { "goalExplosionPaintId": 5 }
        }))
        .unwrap();
        let player = loadout.to_player_loadout();
        assert_eq!(player.team_color_id, 1);
        assert_eq!(player.goal_explosion_id, 3);
        assert_eq!(player.loadout_paint.goal_explosion_paint_id, 5);
    }
}
