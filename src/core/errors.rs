use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Protocol error: {status} - {body}")]
    ProtocolError { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponseFormat(String),

    #[error("Topic already subscribed: {0}")]
    DuplicateTopic(String),

    #[error("Topic not subscribed: {0}")]
    NotSubscribed(String),

    #[error("Streaming connection is not established")]
    NotConnected,

    #[error("Streaming connection already started")]
    AlreadyStarted,

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}

impl ExchangeError {
    /// Whether the venue rejected the credentials or signature
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthError(_))
    }

    /// Whether the failure happened below the application protocol
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::TransportError(_))
    }
}
