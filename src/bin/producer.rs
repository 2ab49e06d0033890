//! Producer binary: synthesizes order events and publishes them to the
//! primary topic at a fixed interval.

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use orderflow::producer::OrderProducer;
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

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting producer");

    let mut producer = OrderProducer::connect(&config)?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    producer.run(&cancel).await;
    producer.close();

    tracing::info!("Producer shutdown complete");
    Ok(())
}
