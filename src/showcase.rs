//! Showcase scenes for the loadout preview.
//!
//! A scene is one state-setting packet plus one controller input that puts
//! the showcase car into a pose that shows off part of its loadout.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MatchControlError;
use crate::options::{SHOWCASE_AGENT_ID, SHOWCASE_BOT_NAME};
use crate::protocol::{
    ControllerState, DesiredBallState, DesiredCarState, DesiredGameState, DesiredPhysics,
    PlayerInfo, PlayerInput, RotatorPartial, Vector3Partial, BLUE_TEAM,
};

/// A quarter turn in radians.
const HALF_PI: f32 = std::f32::consts::FRAC_PI_2;

/// Resting height of a car on the floor.
const CAR_REST_Z: f32 = 20.0;

/// Which part of the loadout to show off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShowcaseType {
    /// Car held still at center field, boosting.
    Static,
    /// Car circling while boosting.
    Boost,
    /// Car circling on throttle.
    Throttle,
    /// Car at its team's back-center kickoff spot.
    BackCenterKickoff,
    /// Ball about to be driven into the team's own net.
    GoalExplosion,
}

impl ShowcaseType {
    pub fn as_str(self) -> &'static str {
        match self {
            ShowcaseType::Static => "static",
            ShowcaseType::Boost => "boost",
            ShowcaseType::Throttle => "throttle",
            ShowcaseType::BackCenterKickoff => "back-center-kickoff",
            ShowcaseType::GoalExplosion => "goal-explosion",
        }
    }

    /// Whether the scene needs the hold loop to keep the car in place.
    pub fn holds_pose(self) -> bool {
        self == ShowcaseType::Static
    }
}

impl fmt::Display for ShowcaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShowcaseType {
    type Err = MatchControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(ShowcaseType::Static),
            "boost" => Ok(ShowcaseType::Boost),
            "throttle" => Ok(ShowcaseType::Throttle),
            "back-center-kickoff" => Ok(ShowcaseType::BackCenterKickoff),
            "goal-explosion" => Ok(ShowcaseType::GoalExplosion),
            other => Err(MatchControlError::InvalidConfig(format!(
                "unknown showcase type {other:?}"
            ))),
        }
    }
}

/// Sign that mirrors along-field (Y) values for a team: `-1` for blue, `+1` for orange.
pub fn team_sign(team: u32) -> f32 {
    if team == BLUE_TEAM {
        -1.0
    } else {
        1.0
    }
}

/// Returns `true` if `player` is the preview match's showcase bot.
pub fn is_showcase_bot(player: &PlayerInfo) -> bool {
    player.name == SHOWCASE_BOT_NAME || player.agent_id == SHOWCASE_AGENT_ID
}

/// Car pose that the hold loop re-applies: at rest, center field.
pub fn hold_pose() -> DesiredGameState {
    DesiredGameState {
        ball_states: vec![],
        car_states: vec![DesiredCarState {
            physics: Some(resting_car()),
            boost_amount: None,
        }],
    }
}

fn resting_car() -> DesiredPhysics {
    DesiredPhysics {
        location: Some(Vector3Partial::new(0.0, 0.0, CAR_REST_Z)),
        rotation: Some(RotatorPartial::new(0.0, 0.0, 0.0)),
        velocity: Some(Vector3Partial::new(0.0, 0.0, 0.0)),
        angular_velocity: Some(Vector3Partial::new(0.0, 0.0, 0.0)),
    }
}

/// The packets that set up one showcase.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowcaseScene {
    pub state: DesiredGameState,
    pub input: PlayerInput,
}

impl ShowcaseScene {
    /// Build the scene for a car on `team`.
    pub fn new(kind: ShowcaseType, team: u32) -> Self {
        let sign = team_sign(team);
        let mut car = resting_car();
        let mut ball = DesiredPhysics {
            location: Some(Vector3Partial::new(0.0, 0.0, -100.0)),
            rotation: None,
            velocity: Some(Vector3Partial::new(0.0, 0.0, 0.0)),
            angular_velocity: Some(Vector3Partial::new(0.0, 0.0, 0.0)),
        };
        let mut controller = ControllerState::default();

        match kind {
            ShowcaseType::Static => {
                controller.boost = true;
            }
            ShowcaseType::Boost => {
                controller.boost = true;
                controller.steer = 1.0;
                set_y(&mut car.location, -1140.0);
                set_x(&mut car.velocity, 2300.0);
                set_z(&mut car.angular_velocity, 3.5);
            }
            ShowcaseType::Throttle => {
                controller.throttle = 1.0;
                controller.steer = 0.56;
                set_y(&mut car.location, -1140.0);
                set_x(&mut car.velocity, 1410.0);
                set_z(&mut car.angular_velocity, 1.5);
            }
            ShowcaseType::BackCenterKickoff => {
                set_y(&mut car.location, 4608.0 * sign);
                set_yaw(&mut car.rotation, -HALF_PI * sign);
            }
            ShowcaseType::GoalExplosion => {
                set_y(&mut car.location, -2000.0 * sign);
                set_yaw(&mut car.rotation, -HALF_PI * sign);
                set_y(&mut car.velocity, -2300.0 * sign);
                ball.location = Some(Vector3Partial::new(0.0, -3500.0 * sign, 93.0));
            }
        }

        Self {
            state: DesiredGameState {
                ball_states: vec![DesiredBallState { physics: ball }],
                car_states: vec![DesiredCarState {
                    physics: Some(car),
                    boost_amount: None,
                }],
            },
            input: PlayerInput {
                player_index: 0,
                controller_state: controller,
            },
        }
    }
}

fn set_x(v: &mut Option<Vector3Partial>, x: f32) {
    v.get_or_insert_with(Vector3Partial::default).x = Some(x);
}

fn set_y(v: &mut Option<Vector3Partial>, y: f32) {
    v.get_or_insert_with(Vector3Partial::default).y = Some(y);
}

fn set_z(v: &mut Option<Vector3Partial>, z: f32) {
    v.get_or_insert_with(Vector3Partial::default).z = Some(z);
}

fn set_yaw(r: &mut Option<RotatorPartial>, yaw: f32) {
    r.get_or_insert_with(RotatorPartial::default).yaw = Some(yaw);
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
    use crate::protocol::ORANGE_TEAM;

    fn car(scene: &ShowcaseScene) -> DesiredPhysics {
        scene.state.car_states[0].physics.unwrap()
    }

    fn ball(scene: &ShowcaseScene) -> DesiredPhysics {
        scene.state.ball_states[0].physics
    }

    #[test]
    fn parses_gui_names() {
        for kind in [
            ShowcaseType::Static,
            ShowcaseType::Boost,
            ShowcaseType::Throttle,
            ShowcaseType::BackCenterKickoff,
            ShowcaseType::GoalExplosion,
        ] {
            assert_eq!(kind.as_str().parse::<ShowcaseType>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
        assert!(matches!(
            "spin".parse::<ShowcaseType>(),
            Err(MatchControlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn team_sign_mirrors_blue() {
        assert_eq!(team_sign(BLUE_TEAM), -1.0);
        assert_eq!(team_sign(ORANGE_TEAM), 1.0);
    }

    #[test]
    fn static_scene_boosts_at_rest() {
        let scene = ShowcaseScene::new(ShowcaseType::Static, BLUE_TEAM);
        assert!(scene.input.controller_state.boost);
        assert_eq!(scene.input.controller_state.throttle, 0.0);
        assert_eq!(car(&scene), resting_car());
        assert_eq!(
            ball(&scene).location,
            Some(Vector3Partial::new(0.0, 0.0, -100.0))
        );
        assert!(ShowcaseType::Static.holds_pose());
        assert!(!ShowcaseType::Boost.holds_pose());
    }

    #[test]
    fn boost_and_throttle_circle() {
        let boost = ShowcaseScene::new(ShowcaseType::Boost, ORANGE_TEAM);
        assert!(boost.input.controller_state.boost);
        assert_eq!(boost.input.controller_state.steer, 1.0);
        let physics = car(&boost);
        assert_eq!(physics.location.unwrap().y, Some(-1140.0));
        assert_eq!(physics.velocity.unwrap().x, Some(2300.0));
        assert_eq!(physics.angular_velocity.unwrap().z, Some(3.5));

        let throttle = ShowcaseScene::new(ShowcaseType::Throttle, BLUE_TEAM);
        assert_eq!(throttle.input.controller_state.throttle, 1.0);
        assert_eq!(throttle.input.controller_state.steer, 0.56);
        let physics = car(&throttle);
        assert_eq!(physics.location.unwrap().y, Some(-1140.0));
        assert_eq!(physics.velocity.unwrap().x, Some(1410.0));
        assert_eq!(physics.angular_velocity.unwrap().z, Some(1.5));
    }

    #[test]
    fn kickoff_spot_is_mirrored_per_team() {
        let blue = car(&ShowcaseScene::new(ShowcaseType::BackCenterKickoff, BLUE_TEAM));
        let orange = car(&ShowcaseScene::new(ShowcaseType::BackCenterKickoff, ORANGE_TEAM));
        assert_eq!(blue.location.unwrap().y, Some(-4608.0));
        assert_eq!(orange.location.unwrap().y, Some(4608.0));
        assert_eq!(blue.rotation.unwrap().yaw, Some(HALF_PI));
        assert_eq!(orange.rotation.unwrap().yaw, Some(-HALF_PI));
    }

    #[test]
    fn goal_explosion_drives_ball_into_own_net() {
        let scene = ShowcaseScene::new(ShowcaseType::GoalExplosion, ORANGE_TEAM);
        let physics = car(&scene);
        assert_eq!(physics.location.unwrap().y, Some(-2000.0));
        assert_eq!(physics.velocity.unwrap().y, Some(-2300.0));
        assert_eq!(
            ball(&scene).location,
            Some(Vector3Partial::new(0.0, -3500.0, 93.0))
        );

        let blue = ShowcaseScene::new(ShowcaseType::GoalExplosion, BLUE_TEAM);
        assert_eq!(ball(&blue).location.unwrap().y, Some(3500.0));
    }

    #[test]
    fn showcase_bot_is_recognised_by_name_or_agent() {
        let mut player = PlayerInfo {
            name: "Showcase".into(),
            agent_id: String::new(),
            team: BLUE_TEAM,
            is_bot: true,
        };
        assert!(is_showcase_bot(&player));
        player.name = "Showcase (2)".into();
        assert!(!is_showcase_bot(&player));
        player.agent_id = "gui/loadout-preview".into();
        assert!(is_showcase_bot(&player));
    }

    #[test]
    fn hold_pose_is_resting_car_only() {
        let pose = hold_pose();
        assert!(pose.ball_states.is_empty());
        assert_eq!(pose.car_states[0].physics, Some(resting_car()));
    }
}
