//! # Stop Match Example
//!
//! Stops whatever match the core server is running.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example stop_match
//!
//! # Also shut the server down:
//! cargo run --example stop_match -- --shutdown
//! ```

use rlbot_match_control::MatchController;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let shutdown_server = std::env::args().skip(1).any(|arg| arg == "--shutdown");

    let controller = MatchController::from_env()?;
    let result = controller.stop_match(shutdown_server).await;
    if result.success {
        tracing::info!(shutdown_server, "Match stopped");
    } else {
        tracing::error!("Could not stop the match: {}", result.message);
    }

    Ok(())
}
