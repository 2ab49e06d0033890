//! Console diagnostics for the pipeline binaries
//!
//! Configures structured logging using the tracing crate: JSON output for
//! production, pretty formatting for development. This is operator output
//! only; the tracker's durable health and audit files are written by the
//! [`crate::logfile`] module.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

use crate::error::Result;

/// Initialize the logging system
pub fn init_tracing(log_level: &str, environment: &str) -> Result<()> {
    // RUST_LOG takes precedence over the configured level
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("orderflow={}", log_level)));

    let is_production = environment == "production";

    if is_production {
        let formatting_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true);

        Registry::default()
            .with(env_filter)
            .with(formatting_layer)
            .try_init()
            .map_err(|e| {
                crate::error::Error::internal(format!("Failed to initialize tracing: {}", e))
            })?;
    } else {
        let formatting_layer = fmt::layer().pretty().with_target(true);

        Registry::default()
            .with(env_filter)
            .with(formatting_layer)
            .try_init()
            .map_err(|e| {
                crate::error::Error::internal(format!("Failed to initialize tracing: {}", e))
            })?;
    }

    tracing::info!(
        environment = environment,
        log_level = log_level,
        "Logging initialized"
    );

    Ok(())
}
