#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Packet serialization tests.
//!
//! Pins the JSON shape of the packets the controller exchanges with the core
//! server, and checks that whole packets survive the length-prefixed framing.

use rlbot_match_control::protocol::{
    decode_packet, encode_packet, ConnectionSettings, DebugRendering, ExistingMatchBehavior,
    GamePacket, MatchConfiguration, MatchInfo, MatchLengthMutator, MatchPhase, MutatorSettings,
    Packet, PlayerClass, PlayerInfo, PsyonixSkill, StopCommand, Vector3Partial, BLUE_TEAM,
    ORANGE_TEAM,
};
use rlbot_match_control::transport::{encode_frame, FrameDecoder};
use rlbot_match_control::MatchControlError;
use serde_json::json;

fn to_json(packet: &Packet) -> serde_json::Value {
    serde_json::from_slice(&encode_packet(packet).unwrap()).unwrap()
}

// ════════════════════════════════════════════════════════════════════
// Packet envelope
// ════════════════════════════════════════════════════════════════════

#[test]
fn unit_packets_carry_only_the_tag() {
    assert_eq!(to_json(&Packet::InitComplete), json!({"type": "InitComplete"}));
    assert_eq!(
        to_json(&Packet::DisconnectSignal),
        json!({"type": "DisconnectSignal"})
    );
}

#[test]
fn payload_packets_use_type_and_data() {
    let packet = Packet::StopCommand(StopCommand {
        shutdown_server: true,
    });
    assert_eq!(
        to_json(&packet),
        json!({"type": "StopCommand", "data": {"shutdown_server": true}})
    );
}

#[test]
fn controller_settings_carry_no_agent() {
    let packet = Packet::ConnectionSettings(ConnectionSettings::controller(true));
    assert_eq!(
        to_json(&packet),
        json!({
            "type": "ConnectionSettings",
            "data": {
                "agent_id": "",
                "wants_ball_predictions": false,
                "wants_comms": false,
                "close_between_matches": true
            }
        })
    );
}

#[test]
fn unknown_packet_type_is_rejected() {
    let err = decode_packet(br#"{"type":"BallPrediction","data":{}}"#).unwrap_err();
    assert!(matches!(err, MatchControlError::Serialization(_)));
}

#[test]
fn garbage_payload_is_rejected() {
    assert!(decode_packet(b"\xff\x00not json").is_err());
}

#[test]
fn packet_kind_names_match_tags() {
    for packet in [
        Packet::InitComplete,
        Packet::DisconnectSignal,
        Packet::StopCommand(StopCommand::default()),
        Packet::GamePacket(Box::default()),
    ] {
        assert_eq!(to_json(&packet)["type"], packet.kind());
    }
}

// ════════════════════════════════════════════════════════════════════
// Server state
// ════════════════════════════════════════════════════════════════════

#[test]
fn game_packet_tolerates_missing_optional_fields() {
    let packet = decode_packet(
        br#"{"type":"GamePacket","data":{"match_info":{"match_phase":"kickoff"}}}"#,
    )
    .unwrap();
    match packet {
        Packet::GamePacket(game) => {
            assert_eq!(game.phase(), MatchPhase::Kickoff);
            assert!(!game.match_info.is_unlimited_time);
            assert!(game.players.is_empty());
            assert!(game.sole_player().is_none());
        }
        other => panic!("expected game packet, got {other:?}"),
    }
}

#[test]
fn game_packet_with_players() {
    let packet = decode_packet(
        br#"{"type":"GamePacket","data":{
            "match_info":{"match_phase":"active","is_unlimited_time":true},
            "players":[{"name":"Showcase","agent_id":"gui/loadout-preview","team":1,"is_bot":true}]
        }}"#,
    )
    .unwrap();
    let Packet::GamePacket(game) = packet else {
        panic!("expected game packet");
    };
    let player = game.sole_player().unwrap();
    assert_eq!(player.team, ORANGE_TEAM);
    assert_eq!(player.agent_id, "gui/loadout-preview");
    assert!(game.match_info.is_unlimited_time);
}

#[test]
fn sole_player_needs_exactly_one() {
    let player = PlayerInfo {
        team: BLUE_TEAM,
        is_bot: true,
        ..PlayerInfo::default()
    };
    let game = GamePacket {
        match_info: MatchInfo::default(),
        players: vec![player.clone(), player],
    };
    assert!(game.sole_player().is_none());
}

#[test]
fn match_phases_are_snake_case() {
    let names = [
        (MatchPhase::Inactive, "inactive"),
        (MatchPhase::Countdown, "countdown"),
        (MatchPhase::Kickoff, "kickoff"),
        (MatchPhase::Active, "active"),
        (MatchPhase::GoalScored, "goal_scored"),
        (MatchPhase::Replay, "replay"),
        (MatchPhase::Paused, "paused"),
        (MatchPhase::Ended, "ended"),
    ];
    for (phase, name) in names {
        assert_eq!(serde_json::to_value(phase).unwrap(), json!(name));
    }
}

#[test]
fn only_kickoff_and_active_are_live() {
    let live: Vec<_> = [
        MatchPhase::Inactive,
        MatchPhase::Countdown,
        MatchPhase::Kickoff,
        MatchPhase::Active,
        MatchPhase::GoalScored,
        MatchPhase::Replay,
        MatchPhase::Paused,
        MatchPhase::Ended,
    ]
    .into_iter()
    .filter(|phase| phase.is_live())
    .collect();
    assert_eq!(live, vec![MatchPhase::Kickoff, MatchPhase::Active]);
    assert!(MatchPhase::Ended.is_over());
    assert!(MatchPhase::Inactive.is_over());
    assert!(!MatchPhase::Paused.is_over());
}

// ════════════════════════════════════════════════════════════════════
// Match configuration
// ════════════════════════════════════════════════════════════════════

#[test]
fn player_class_uses_kind_tag() {
    assert_eq!(
        serde_json::to_value(PlayerClass::CustomBot).unwrap(),
        json!({"kind": "custom_bot"})
    );
    assert_eq!(
        serde_json::to_value(PlayerClass::Psyonix {
            bot_skill: PsyonixSkill::AllStar
        })
        .unwrap(),
        json!({"kind": "psyonix", "bot_skill": "all_star"})
    );
}

#[test]
fn numeric_codes_map_to_enums() {
    assert_eq!(PsyonixSkill::from(0), PsyonixSkill::Beginner);
    assert_eq!(PsyonixSkill::from(9), PsyonixSkill::AllStar);
    assert_eq!(DebugRendering::try_from(2), Ok(DebugRendering::AlwaysOff));
    assert_eq!(DebugRendering::try_from(3), Err(3));
    assert_eq!(
        ExistingMatchBehavior::try_from(2),
        Ok(ExistingMatchBehavior::ContinueAndSpawn)
    );
    assert_eq!(ExistingMatchBehavior::try_from(5), Err(5));
}

#[test]
fn unknown_mutators_pass_through() {
    let mutators: MutatorSettings = serde_json::from_value(json!({
        "match_length": "unlimited",
        "respawn_time": "two_seconds"
    }))
    .unwrap();
    assert_eq!(mutators.match_length, MatchLengthMutator::Unlimited);
    assert_eq!(mutators.other["respawn_time"], json!("two_seconds"));

    let value = serde_json::to_value(&mutators).unwrap();
    assert_eq!(value["respawn_time"], json!("two_seconds"));
    assert_eq!(value["boost_amount"], json!("normal_boost"));
}

#[test]
fn match_configuration_omits_missing_mutators() {
    let packet = Packet::MatchConfiguration(Box::default());
    let value = to_json(&packet);
    assert!(value["data"].get("mutators").is_none());
    assert_eq!(value["data"]["launcher"], json!("no_launch"));
    assert_eq!(value["data"]["existing_match_behavior"], json!("restart"));

    let decoded = decode_packet(&encode_packet(&packet).unwrap()).unwrap();
    assert_eq!(
        decoded,
        Packet::MatchConfiguration(Box::new(MatchConfiguration::default()))
    );
}

// ════════════════════════════════════════════════════════════════════
// State setting
// ════════════════════════════════════════════════════════════════════

#[test]
fn partial_vectors_skip_unset_components() {
    let only_x = Vector3Partial {
        x: Some(1.0),
        ..Vector3Partial::default()
    };
    assert_eq!(serde_json::to_value(only_x).unwrap(), json!({"x": 1.0}));
    assert_eq!(
        serde_json::to_value(Vector3Partial::new(1.0, 2.0, 3.0)).unwrap(),
        json!({"x": 1.0, "y": 2.0, "z": 3.0})
    );
}

// ════════════════════════════════════════════════════════════════════
// Framing
// ════════════════════════════════════════════════════════════════════

#[test]
fn framed_packets_survive_byte_by_byte_delivery() {
    let packets = [
        Packet::ConnectionSettings(ConnectionSettings::controller(false)),
        Packet::InitComplete,
        Packet::StopCommand(StopCommand {
            shutdown_server: false,
        }),
    ];
    let mut stream = Vec::new();
    for packet in &packets {
        stream.extend(encode_frame(&encode_packet(packet).unwrap()).unwrap());
    }

    let mut decoder = FrameDecoder::new();
    let mut decoded = Vec::new();
    for byte in stream {
        decoder.extend(&[byte]);
        while let Some(payload) = decoder.next_frame() {
            decoded.push(decode_packet(&payload).unwrap());
        }
    }
    assert_eq!(decoded, packets);
    assert!(!decoder.has_partial_frame());
}

#[test]
fn frame_header_is_big_endian_payload_length() {
    let payload = encode_packet(&Packet::InitComplete).unwrap();
    let frame = encode_frame(&payload).unwrap();
    let len = u16::from_be_bytes([frame[0], frame[1]]);
    assert_eq!(usize::from(len), payload.len());
    assert_eq!(&frame[2..], payload.as_slice());
}
