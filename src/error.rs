//! Error types for the simulator.

use thiserror::Error;

use crate::config::ConfigError;

/// Failure to hand a single reading to a publisher.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize reading: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("broker client rejected publish: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("broker link closed")]
    LinkClosed,

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
}

impl PublishError {
    /// Whether the publisher can no longer deliver anything.
    pub fn is_link_lost(&self) -> bool {
        matches!(self, PublishError::LinkClosed | PublishError::Client(_))
    }
}

/// Top-level simulator error.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to connect to broker at {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: rumqttc::ConnectionError,
    },

    #[error("broker at {host}:{port} refused the connection: {code:?}")]
    Refused {
        host: String,
        port: u16,
        code: rumqttc::ConnectReturnCode,
    },

    #[error("timed out connecting to broker at {host}:{port}")]
    ConnectTimeout { host: String, port: u16 },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
