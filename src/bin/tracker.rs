//! Tracker binary: consumes order events with durable audit logging,
//! retries, a dead letter queue and periodic health metrics.

use std::path::PathBuf;
use std::sync::Arc;

use orderflow::kafka::DeadLetterQueue;
use orderflow::tracker::Tracker;
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
    config.log_config();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting tracker");

    let dlq = DeadLetterQueue::connect(&config.kafka.broker, &config.dlq.topic, config.dlq.enabled)?;

    let mut tracker = Tracker::new(&config).with_dlq(dlq);
    tracker.initialize()?;

    tracing::info!(
        log_file = %config.tracker.log_file,
        events_file = %config.tracker.events_file,
        "Tracker is running"
    );

    let tracker = Arc::new(tracker);
    let runner = Arc::clone(&tracker);
    let mut run_handle = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        // The read loop can stop on its own when the broker stays down
        _ = &mut run_handle => {},
        _ = shutdown_signal() => {
            tracker.stop();
            let _ = run_handle.await;
        },
    }

    tracker.close();
    tracing::info!("Tracker shutdown complete");
    Ok(())
}
