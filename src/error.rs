//! Error types for the sensor streamer.
//!
//! Only [`TransportError`] ends a running session. Serialization failures
//! drop a single sample, and a missing location permission is not an error
//! at all: the GPS stream is simply left out.

use thiserror::Error;

/// Failures of the outbound datagram socket. Fatal to the running session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Destination host could not be resolved
    #[error("failed to resolve '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Resolution succeeded but produced no usable address
    #[error("no address found for '{0}'")]
    NoAddress(String),

    /// Local ephemeral socket could not be bound
    #[error("failed to bind local socket: {0}")]
    Bind(#[source] std::io::Error),

    /// The OS rejected a datagram
    #[error("send to {target} failed: {source}")]
    Send {
        target: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The socket was already closed
    #[error("socket closed")]
    Closed,
}

/// A sample that could not be turned into a datagram. The sample is dropped.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("non-finite value in field '{field}'")]
    NonFiniteValue { field: String },

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record of {size} bytes exceeds datagram limit of {max} bytes")]
    TooLarge { size: usize, max: usize },
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid destination host '{0}'")]
    InvalidHost(String),

    #[error("port {0} out of range 0..=65534")]
    InvalidPort(u32),

    #[error("sampling interval {0}us out of range 0..=200000")]
    InvalidSamplingInterval(u32),

    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings parse error: {0}")]
    Parse(String),

    #[error("settings serialize error: {0}")]
    Serialize(String),
}

/// Errors reported by a [`SourceRegistry`](crate::sensors::SourceRegistry).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("sensor '{0}' is not available on this device")]
    UnknownSensor(String),

    #[error("sensor '{0}' is already subscribed")]
    AlreadySubscribed(String),

    #[error("platform error: {0}")]
    Platform(String),
}

/// Synchronous failures of session control operations.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("source registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("failed to spawn delivery worker: {0}")]
    Spawn(#[source] std::io::Error),
}
