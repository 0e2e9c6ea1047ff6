use crate::core::errors::ExchangeError;
use tokio_tungstenite::tungstenite::Message;

/// Codec trait for handling venue-specific WebSocket frame encoding/decoding
///
/// Every outbound frame carries a request id so the venue's asynchronous
/// replies can be correlated with the request that caused them.
pub trait WsCodec: Send + Sync + 'static {
    /// The type representing parsed inbound frames
    type Message: Send + Sync;

    /// Encode a subscribe request for a single topic
    fn encode_subscription(
        &self,
        id: &str,
        topic: &str,
        private: bool,
    ) -> Result<Message, ExchangeError>;

    /// Encode an unsubscribe request for a single topic
    fn encode_unsubscription(
        &self,
        id: &str,
        topic: &str,
        private: bool,
    ) -> Result<Message, ExchangeError>;

    /// Encode an application-level keep-alive
    fn encode_ping(&self, id: &str) -> Result<Message, ExchangeError>;

    /// Decode a raw WebSocket message into a typed message
    ///
    /// # Returns
    /// - `Ok(Some(message))` - Successfully decoded message
    /// - `Ok(None)` - Message was ignored/filtered by codec
    /// - `Err(error)` - Failed to decode message
    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError>;
}
