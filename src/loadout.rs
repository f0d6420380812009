//! Choosing how to apply a loadout to a running preview match.

use crate::error::Result;
use crate::options::LoadoutPreviewOptions;
use crate::protocol::{ExistingMatchBehavior, GamePacket, Packet, SetLoadout};

/// Facts about the running match that decide how a loadout is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadoutConditions {
    /// The match has ended or never started.
    pub match_over: bool,
    /// Exactly one player is in the match and it is a bot.
    pub sole_bot: bool,
    /// The match has no time limit.
    pub unlimited_time: bool,
    /// The sole player is on the requested team.
    pub same_team: bool,
}

impl LoadoutConditions {
    pub fn from_packet(packet: &GamePacket, team: u32) -> Self {
        let sole = packet.sole_player();
        Self {
            match_over: packet.phase().is_over(),
            sole_bot: sole.is_some_and(|player| player.is_bot),
            unlimited_time: packet.match_info.is_unlimited_time,
            same_team: sole.is_some_and(|player| player.team == team),
        }
    }
}

/// How to get the requested loadout onto the showcase car.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadoutAction {
    /// Start a fresh preview match.
    Restart,
    /// Keep the match and spawn the showcase bot on the requested team.
    ContinueAndSpawn,
    /// Swap the loadout of the car in place.
    SetLoadout,
}

impl LoadoutAction {
    /// Exactly one action for every combination of conditions.
    pub fn choose(conditions: LoadoutConditions) -> Self {
        if conditions.match_over || !conditions.sole_bot || !conditions.unlimited_time {
            LoadoutAction::Restart
        } else if !conditions.same_team {
            LoadoutAction::ContinueAndSpawn
        } else {
            LoadoutAction::SetLoadout
        }
    }

    /// The packet that carries out this action for `options`.
    ///
    /// # Errors
    ///
    /// Fails like [`LoadoutPreviewOptions::preview_match`] when a new match
    /// has to be configured.
    pub fn packet(self, options: &LoadoutPreviewOptions) -> Result<Packet> {
        let behavior = match self {
            LoadoutAction::Restart => ExistingMatchBehavior::Restart,
            LoadoutAction::ContinueAndSpawn => ExistingMatchBehavior::ContinueAndSpawn,
            LoadoutAction::SetLoadout => {
                return Ok(Packet::SetLoadout(Box::new(SetLoadout {
                    index: 0,
                    loadout: options.loadout.to_player_loadout(),
                })));
            }
        };
        let config = options.preview_match(behavior)?;
        Ok(Packet::MatchConfiguration(Box::new(config)))
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
    use crate::options::TeamLoadoutConfig;
    use crate::protocol::{MatchInfo, MatchPhase, PlayerInfo, BLUE_TEAM, ORANGE_TEAM};

    #[test]
    fn every_combination_picks_exactly_one_action() {
        use LoadoutAction::{ContinueAndSpawn, Restart, SetLoadout};

        // (match_over, sole_bot, unlimited_time, same_team) => action
        let table = [
            (false, false, false, false, Restart),
            (false, false, false, true, Restart),
            (false, false, true, false, Restart),
            (false, false, true, true, Restart),
            (false, true, false, false, Restart),
            (false, true, false, true, Restart),
            (false, true, true, false, ContinueAndSpawn),
            (false, true, true, true, SetLoadout),
            (true, false, false, false, Restart),
            (true, false, false, true, Restart),
            (true, false, true, false, Restart),
            (true, false, true, true, Restart),
            (true, true, false, false, Restart),
            (true, true, false, true, Restart),
            (true, true, true, false, Restart),
            (true, true, true, true, Restart),
        ];
        assert_eq!(table.len(), 16);
        for (match_over, sole_bot, unlimited_time, same_team, expected) in table {
            let conditions = LoadoutConditions {
                match_over,
                sole_bot,
                unlimited_time,
                same_team,
            };
            assert_eq!(LoadoutAction::choose(conditions), expected, "{conditions:?}");
        }
    }

    fn packet(phase: MatchPhase, unlimited: bool, players: Vec<PlayerInfo>) -> GamePacket {
        GamePacket {
            match_info: MatchInfo {
                match_phase: phase,
                is_unlimited_time: unlimited,
                ..MatchInfo::default()
            },
            players,
        }
    }

    fn bot_on(team: u32) -> PlayerInfo {
        PlayerInfo {
            name: "Showcase".into(),
            agent_id: "gui/loadout-preview".into(),
            team,
            is_bot: true,
        }
    }

    #[test]
    fn conditions_from_packet() {
        let p = packet(MatchPhase::Active, true, vec![bot_on(ORANGE_TEAM)]);
        let c = LoadoutConditions::from_packet(&p, ORANGE_TEAM);
        assert_eq!(
            c,
            LoadoutConditions {
                match_over: false,
                sole_bot: true,
                unlimited_time: true,
                same_team: true,
            }
        );
        assert!(!LoadoutConditions::from_packet(&p, BLUE_TEAM).same_team);

        let crowded = packet(MatchPhase::Kickoff, true, vec![bot_on(0), bot_on(1)]);
        assert!(!LoadoutConditions::from_packet(&crowded, BLUE_TEAM).sole_bot);

        let human = PlayerInfo {
            is_bot: false,
            ..bot_on(BLUE_TEAM)
        };
        let p = packet(MatchPhase::Ended, false, vec![human]);
        let c = LoadoutConditions::from_packet(&p, BLUE_TEAM);
        assert!(c.match_over);
        assert!(!c.sole_bot);
        assert!(!c.unlimited_time);
    }

    #[test]
    fn actions_build_matching_packets() {
        let options = LoadoutPreviewOptions {
            loadout: TeamLoadoutConfig {
                car_id: 7,
                ..TeamLoadoutConfig::default()
            },
            team: ORANGE_TEAM,
            launcher: "nolaunch".into(),
            ..LoadoutPreviewOptions::default()
        };

        match LoadoutAction::SetLoadout.packet(&options).unwrap() {
            Packet::SetLoadout(set) => {
                assert_eq!(set.index, 0);
                assert_eq!(set.loadout.car_id, 7);
            }
            other => panic!("unexpected {other:?}"),
        }
        match LoadoutAction::Restart.packet(&options).unwrap() {
            Packet::MatchConfiguration(config) => {
                assert_eq!(config.existing_match_behavior, ExistingMatchBehavior::Restart);
            }
            other => panic!("unexpected {other:?}"),
        }
        match LoadoutAction::ContinueAndSpawn.packet(&options).unwrap() {
            Packet::MatchConfiguration(config) => {
                assert_eq!(
                    config.existing_match_behavior,
                    ExistingMatchBehavior::ContinueAndSpawn
                );
                assert_eq!(config.player_configurations[0].team, ORANGE_TEAM);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
