//! Head Pan Player
//!
//! Plays a track whose stereo balance follows the head position reported by
//! the tracking service. Usage: `head-pan-player [ws://host:port/path]`

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use head_pan_player::{app, audio::list_devices, config::AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Head Pan Player");

    // Load or create config
    let mut config = AppConfig::load_or_default();
    if let Some(endpoint) = std::env::args().nth(1) {
        config.connection.endpoint = endpoint;
    }
    config.validate()?;

    // List available output devices
    println!("\n=== Available Output Devices ===");
    for device in list_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    ID: {}", device.id);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();

    tracing::info!(
        "Dashboard at http://{}:{}",
        config.ui.bind_address,
        config.ui.http_port
    );

    app::run(config).await
}
