//! Monitor binary: tails the tracker's log files and renders a periodic
//! status block.

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use orderflow::monitor::Monitor;
use orderflow::{logging, shutdown_signal, Config, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let config = Config::load(Some(&config_path))?;
    config.validate()?;

    logging::init_tracing(&config.app.log_level, &config.app.env)?;

    tracing::info!(
        log_file = %config.tracker.log_file,
        events_file = %config.tracker.events_file,
        "Starting monitor"
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let mut monitor = Monitor::new(&config);
    monitor.run(&cancel).await;

    tracing::info!("Monitor shutdown complete");
    Ok(())
}
