#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Start-and-wait scenarios: the reconnect cycle, the two wait windows and
//! every way the wait can end.

mod common;

use std::time::Duration;

use rlbot_match_control::protocol::{ConnectionSettings, MatchConfiguration, MatchPhase, Packet};
use rlbot_match_control::{
    ControllerConfig, MatchControlError, MatchReadyMachine, ReadyWindows, Session, SessionConfig,
    WaitOutcome, WaitPhase,
};
use tokio::time::Instant;

use common::{
    controller, controller_with, count_kind, delay, disconnect, field_info, game, mock_connector,
    silent_connector, silent_controller, Incoming,
};

fn settings(close_between_matches: bool) -> Packet {
    Packet::ConnectionSettings(ConnectionSettings::controller(close_between_matches))
}

// ════════════════════════════════════════════════════════════════════
// Ready paths
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn ready_after_reconnect_and_kickoff() {
    let (controller, server) = controller(vec![
        vec![game(MatchPhase::Active), disconnect()],
        vec![field_info(), game(MatchPhase::Inactive), game(MatchPhase::Kickoff)],
    ]);

    let config = MatchConfiguration {
        game_map_upk: "Stadium_P".into(),
        ..MatchConfiguration::default()
    };
    let packet = controller.start_and_wait(config.clone()).await.unwrap();
    assert_eq!(packet.phase(), MatchPhase::Kickoff);

    assert_eq!(server.connects(), 2);
    assert_eq!(
        server.sent(0),
        vec![
            settings(true),
            Packet::InitComplete,
            Packet::MatchConfiguration(Box::new(config)),
        ]
    );
    assert_eq!(
        server.sent(1),
        vec![settings(true), Packet::InitComplete, Packet::DisconnectSignal]
    );
    assert!(server.closed(0));
    assert!(server.closed(1));
}

#[tokio::test(start_paused = true)]
async fn one_init_complete_per_field_info() {
    let (controller, server) = controller(vec![
        vec![disconnect()],
        vec![
            field_info(),
            game(MatchPhase::Inactive),
            game(MatchPhase::Countdown),
            game(MatchPhase::Active),
        ],
    ]);

    controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap();
    assert_eq!(count_kind(&server.sent(1), "InitComplete"), 1);
}

#[tokio::test(start_paused = true)]
async fn first_packet_already_live_is_ready() {
    let (controller, server) = controller(vec![
        vec![disconnect()],
        vec![game(MatchPhase::Active)],
    ]);

    let packet = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap();
    assert_eq!(packet.phase(), MatchPhase::Active);
    assert_eq!(count_kind(&server.sent(1), "InitComplete"), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_uses_the_same_address() {
    let (controller, server) = controller(vec![
        vec![disconnect()],
        vec![game(MatchPhase::Kickoff)],
    ]);

    controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap();
    assert_eq!(
        server.addresses(),
        vec!["127.0.0.1:23234".to_string(), "127.0.0.1:23234".to_string()]
    );
}

// ════════════════════════════════════════════════════════════════════
// Stale packets and phase gating
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn live_packets_of_the_old_match_are_ignored() {
    let (controller, server) = controller(vec![
        vec![
            game(MatchPhase::Kickoff),
            game(MatchPhase::Active),
            disconnect(),
            // Never read: the pump stops at the disconnect.
            game(MatchPhase::Active),
        ],
        vec![game(MatchPhase::Inactive)],
    ]);

    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MatchControlError::TimedOut {
            phase: WaitPhase::MatchReady,
            ..
        }
    ));
    assert_eq!(server.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn only_kickoff_and_active_are_ready() {
    let (controller, _server) = controller(vec![
        vec![disconnect()],
        vec![
            game(MatchPhase::Inactive),
            game(MatchPhase::Countdown),
            game(MatchPhase::GoalScored),
            game(MatchPhase::Replay),
            game(MatchPhase::Paused),
            game(MatchPhase::Ended),
        ],
    ]);

    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MatchControlError::TimedOut {
            phase: WaitPhase::MatchReady,
            ..
        }
    ));
}

// ════════════════════════════════════════════════════════════════════
// Timers
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn load_times_out_without_reconnect() {
    let (controller, server) = controller(vec![vec![game(MatchPhase::Active)]]);

    let start = Instant::now();
    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();

    match err {
        MatchControlError::TimedOut { phase, after } => {
            assert_eq!(phase, WaitPhase::MatchLoad);
            assert_eq!(after, Duration::from_secs(120));
        }
        other => panic!("expected load timeout, got {other:?}"),
    }
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(120) && elapsed < Duration::from_secs(121));
    assert_eq!(server.connects(), 1);
    assert_eq!(server.sent(0).last(), Some(&Packet::DisconnectSignal));
}

#[tokio::test(start_paused = true)]
async fn load_window_spans_reconnect_and_init() {
    let (controller, _server) = controller(vec![
        vec![delay(100), disconnect()],
        vec![delay(30), game(MatchPhase::Active)],
    ]);

    let start = Instant::now();
    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MatchControlError::TimedOut {
            phase: WaitPhase::MatchLoad,
            ..
        }
    ));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(120) && elapsed < Duration::from_secs(121));
}

#[tokio::test(start_paused = true)]
async fn ready_window_starts_when_load_finishes() {
    let (controller, _server) = controller(vec![
        vec![delay(119), disconnect()],
        vec![game(MatchPhase::Countdown)],
    ]);

    let start = Instant::now();
    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();

    match err {
        MatchControlError::TimedOut { phase, after } => {
            assert_eq!(phase, WaitPhase::MatchReady);
            assert_eq!(after, Duration::from_secs(20));
        }
        other => panic!("expected ready timeout, got {other:?}"),
    }
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(139) && elapsed < Duration::from_secs(140));
}

#[tokio::test(start_paused = true)]
async fn never_runs_past_both_windows() {
    let config = ControllerConfig::default()
        .with_load_window(Duration::from_secs(10))
        .with_ready_window(Duration::from_secs(5));
    let (controller, _server) = controller_with(
        config,
        vec![
            vec![delay(9), disconnect()],
            vec![delay(1), game(MatchPhase::Countdown), delay(3), game(MatchPhase::Paused)],
        ],
    );

    let start = Instant::now();
    let result = controller.start_and_wait(MatchConfiguration::default()).await;
    assert!(result.is_err());
    assert!(start.elapsed() <= Duration::from_secs(15));
}

// ════════════════════════════════════════════════════════════════════
// Server-ended matches and transport failures
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn disconnect_while_waiting_to_start() {
    let (controller, _server) = controller(vec![
        vec![disconnect()],
        vec![game(MatchPhase::Countdown), delay(5), disconnect()],
    ]);

    let start = Instant::now();
    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();

    match err {
        MatchControlError::Disconnected { reason } => {
            assert_eq!(reason, "ended while waiting to start");
        }
        other => panic!("expected disconnect, got {other:?}"),
    }
    assert!(start.elapsed() < Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_loading() {
    let (controller, _server) = controller(vec![
        vec![disconnect()],
        vec![field_info(), disconnect()],
    ]);

    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "match was ended while loading");
}

#[tokio::test(start_paused = true)]
async fn failed_reconnect_is_a_transport_error() {
    let (controller, server) = controller(vec![vec![disconnect()]]);

    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MatchControlError::Connect { .. }));
    assert_eq!(server.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn receive_error_after_reconnect() {
    let (controller, _server) = controller(vec![
        vec![disconnect()],
        vec![
            game(MatchPhase::Countdown),
            Incoming::Error("connection reset".into()),
        ],
    ]);

    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MatchControlError::TransportReceive(msg) if msg == "connection reset"));
}

#[tokio::test(start_paused = true)]
async fn closed_connection_before_reconnect() {
    let (controller, server) = controller(vec![vec![Incoming::Close]]);

    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MatchControlError::TransportClosed));
    assert_eq!(server.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn unreachable_server_fails_fast() {
    let (controller, server) = controller(vec![]);

    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MatchControlError::Connect { .. }));
    assert_eq!(server.connects(), 1);
}

// ════════════════════════════════════════════════════════════════════
// Connects that never complete
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn stalled_reconnect_times_out_loading() {
    let (controller, server) = silent_controller(
        ControllerConfig::default(),
        vec![vec![disconnect(), game(MatchPhase::Active)]],
    );

    let start = Instant::now();
    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();

    match err {
        MatchControlError::TimedOut { phase, after } => {
            assert_eq!(phase, WaitPhase::MatchLoad);
            assert_eq!(after, Duration::from_secs(120));
        }
        other => panic!("expected load timeout, got {other:?}"),
    }
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(120) && elapsed < Duration::from_secs(121));
    assert_eq!(server.connects(), 2);
    assert!(server.closed(0));
}

#[tokio::test(start_paused = true)]
async fn stalled_reconnect_shares_the_load_deadline() {
    let (controller, _server) = silent_controller(
        ControllerConfig::default(),
        vec![vec![delay(100), disconnect()]],
    );

    let start = Instant::now();
    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MatchControlError::TimedOut {
            phase: WaitPhase::MatchLoad,
            ..
        }
    ));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(120) && elapsed < Duration::from_secs(121));
}

#[tokio::test(start_paused = true)]
async fn stalled_first_connect_times_out_loading() {
    let (controller, server) = silent_controller(ControllerConfig::default(), vec![]);

    let start = Instant::now();
    let err = controller
        .start_and_wait(MatchConfiguration::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MatchControlError::TimedOut {
            phase: WaitPhase::MatchLoad,
            ..
        }
    ));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(120) && elapsed < Duration::from_secs(121));
    assert_eq!(server.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn machine_never_waits_past_both_windows_on_a_stalled_reconnect() {
    let (connector, _server) =
        silent_connector(vec![vec![disconnect(), game(MatchPhase::Active)]]);
    let session_config = SessionConfig::new();
    let session = Session::connect(&connector, "core:23234", &session_config)
        .await
        .unwrap();
    let windows = ReadyWindows {
        load: Duration::from_secs(10),
        ready: Duration::from_secs(5),
    };

    let start = Instant::now();
    let machine = MatchReadyMachine::new(&connector, &session_config, windows);
    match machine.run(session).await {
        WaitOutcome::TimedOut { phase, after } => {
            assert_eq!(phase, WaitPhase::MatchLoad);
            assert_eq!(after, Duration::from_secs(10));
        }
        other => panic!("expected load timeout, got {other:?}"),
    }
    assert!(start.elapsed() <= Duration::from_secs(15));
}

// ════════════════════════════════════════════════════════════════════
// The state machine on its own
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn machine_reports_outcome_without_controller() {
    let (connector, server) = mock_connector(vec![
        vec![disconnect()],
        vec![game(MatchPhase::Inactive), game(MatchPhase::Active)],
    ]);
    let session_config = SessionConfig::new();
    let session = Session::connect(&connector, "core:23234", &session_config)
        .await
        .unwrap();

    let machine = MatchReadyMachine::new(&connector, &session_config, ReadyWindows::default());
    match machine.run(session).await {
        WaitOutcome::Ready(packet) => assert_eq!(packet.phase(), MatchPhase::Active),
        other => panic!("expected ready, got {other:?}"),
    }
    assert_eq!(server.addresses(), vec!["core:23234", "core:23234"]);
}
