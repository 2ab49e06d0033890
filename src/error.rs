//! Error handling module for the order pipeline
//!
//! This module defines the error types used throughout the application,
//! providing a unified error handling strategy shared by the producer,
//! tracker and monitor binaries.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the order pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kafka related errors
    #[error("Kafka error: {0}")]
    Kafka(String),

    /// The broker cluster is unreachable (typed "all brokers down" or a
    /// connection-refused style failure)
    #[error("Kafka brokers unavailable: {0}")]
    BrokerUnavailable(String),

    /// Validation errors for incoming data
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Message handler errors
    #[error("Handler error: {0}")]
    Handler(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Shutdown in progress
    #[error("Service is shutting down")]
    ShuttingDown,
}

impl Error {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create a Kafka error
    pub fn kafka<S: Into<String>>(msg: S) -> Self {
        Error::Kafka(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a handler error
    pub fn handler<S: Into<String>>(msg: S) -> Self {
        Error::Handler(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Check whether this error signals an unreachable broker cluster.
    ///
    /// Matches either the typed [`Error::BrokerUnavailable`] variant (mapped
    /// from librdkafka's "all brokers down" code) or the well-known substrings
    /// librdkafka embeds in transport error text.
    pub fn is_broker_unavailable(&self) -> bool {
        match self {
            Error::BrokerUnavailable(_) => true,
            Error::Kafka(msg) => {
                msg.contains("brokers are down") || msg.contains("Connection refused")
            },
            _ => false,
        }
    }
}

/// Convert from anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
