//! # Start Match Example
//!
//! Starts a one-versus-one match between two built-in bots and waits until
//! the match is live:
//!
//! 1. Read the server address from `RLBOT_SERVER_IP` / `RLBOT_SERVER_PORT`
//! 2. Send the match configuration
//! 3. Follow the server's reconnect until kickoff
//!
//! ## Running
//!
//! ```sh
//! # Start the core server, then:
//! cargo run --example start_match
//!
//! # Pick the map and launcher:
//! cargo run --example start_match -- Mannfield epic
//! ```

use rlbot_match_control::options::{ExtraOptions, PlayerEntry, PsyonixBotInfo};
use rlbot_match_control::{MatchController, StartMatchOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` to see every packet the controller handles.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let mut args = std::env::args().skip(1);
    let map = args.next().unwrap_or_else(|| "Stadium_P".to_string());
    let launcher = args.next().unwrap_or_else(|| "steam".to_string());

    let controller = MatchController::from_env()?;
    tracing::info!("Using core server at {}", controller.config().address);

    let options = StartMatchOptions {
        map,
        game_mode: "Soccar".into(),
        blue_players: vec![PlayerEntry::Psyonix(PsyonixBotInfo { skill: 1 })],
        orange_players: vec![PlayerEntry::Psyonix(PsyonixBotInfo { skill: 3 })],
        extra_options: ExtraOptions {
            instant_start: true,
            ..ExtraOptions::default()
        },
        launcher,
        ..StartMatchOptions::default()
    };

    // ── Start and wait ──────────────────────────────────────────────
    let result = controller.start_match(&options).await;
    if result.success {
        tracing::info!("Match is live");
    } else {
        tracing::error!("Match did not start: {}", result.message);
    }

    Ok(())
}
