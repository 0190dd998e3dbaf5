//! Error types for the Ayame signaling client

/// Result type alias using the crate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or driving a media channel
///
/// Asynchronous failures (socket drops, rejected registration, negotiation
/// failures) never come back through this type; they are delivered as
/// [`ChannelEvent`](crate::ChannelEvent)s. This enum covers the synchronous
/// edges: configuration, file loading, codec use and a dead coordination task.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// WebSocket connect, read or write failure
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Media engine error
    #[error("Media engine error: {0}")]
    MediaError(String),

    /// The channel's coordination task is no longer running
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}
