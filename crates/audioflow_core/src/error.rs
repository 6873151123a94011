//! Stream and Engine Error Types

use std::time::Duration;

use thiserror::Error;

/// Errors reported by an audio engine (hardware, driver or engine thread)
///
/// Cloneable so the same failure can reach a write acknowledgment and the
/// event subscriber.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("No audio devices found")]
    NoDevicesFound,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to play audio stream: {0}")]
    StreamPlayError(String),

    #[error("Sample format not supported by this host: {0}")]
    UnsupportedFormat(String),

    #[error("Audio hardware error: {0}")]
    Hardware(String),

    #[error("Engine not running")]
    NotRunning,

    #[error("Channel send error - engine thread is gone")]
    ChannelSendError,

    #[error("Channel receive error - engine thread is gone")]
    ChannelRecvError,
}

/// Errors surfaced by the stream layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// Invalid or missing configuration, detected before the engine is built
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// The caller broke a stream invariant (e.g. write after end)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The operation was discarded because the stream shut down
    #[error("Stream closed")]
    Closed,

    #[error("Engine did not confirm shutdown within {0:?}")]
    ShutdownTimeout(Duration),
}

impl StreamError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        StreamError::Protocol(message.into())
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        StreamError::Configuration(message.into())
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for stream operations
pub type StreamResult<T> = Result<T, StreamError>;
