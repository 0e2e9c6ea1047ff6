use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsCodec;
use crate::exchanges::kumex::types::{InboundMessage, MessageKind, WsRequest};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_tungstenite::tungstenite::Message;

/// Monotonic request ids for outbound frames, seeded from the wall clock
#[derive(Debug)]
pub struct RequestIds {
    next: AtomicU64,
}

impl RequestIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(chrono::Utc::now().timestamp_millis() as u64),
        }
    }

    pub fn next_id(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// KuMex streaming codec
#[derive(Debug, Default, Clone, Copy)]
pub struct KumexCodec;

impl KumexCodec {
    pub fn new() -> Self {
        Self
    }

    fn encode(request: &WsRequest<'_>) -> Result<Message, ExchangeError> {
        serde_json::to_string(request)
            .map(Message::Text)
            .map_err(|e| ExchangeError::SerializationError(e.to_string()))
    }

    fn classify(value: &Value) -> Option<MessageKind> {
        match value.get("type").and_then(Value::as_str) {
            Some("welcome") => Some(MessageKind::Welcome),
            Some("ack") => Some(MessageKind::Ack),
            Some("pong" | "ping") => Some(MessageKind::Pong),
            Some("error") => Some(MessageKind::Error),
            Some("message") => Some(MessageKind::Message),
            // data frames are recognised by their topic alone
            None if value.get("topic").is_some() => Some(MessageKind::Message),
            _ => None,
        }
    }
}

impl WsCodec for KumexCodec {
    type Message = InboundMessage;

    fn encode_subscription(
        &self,
        id: &str,
        topic: &str,
        private: bool,
    ) -> Result<Message, ExchangeError> {
        Self::encode(&WsRequest {
            id,
            kind: "subscribe",
            topic: Some(topic),
            private_channel: Some(private),
            response: Some(true),
        })
    }

    fn encode_unsubscription(
        &self,
        id: &str,
        topic: &str,
        private: bool,
    ) -> Result<Message, ExchangeError> {
        Self::encode(&WsRequest {
            id,
            kind: "unsubscribe",
            topic: Some(topic),
            private_channel: Some(private),
            response: Some(true),
        })
    }

    fn encode_ping(&self, id: &str) -> Result<Message, ExchangeError> {
        Self::encode(&WsRequest {
            id,
            kind: "ping",
            topic: None,
            private_channel: None,
            response: None,
        })
    }

    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError> {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(data) => String::from_utf8(data).map_err(|e| {
                ExchangeError::InvalidResponseFormat(format!(
                    "Invalid UTF-8 in binary message: {}",
                    e
                ))
            })?,
            // transport-level control frames are handled by tungstenite
            _ => return Ok(None),
        };

        let value: Value = serde_json::from_str(&text).map_err(|e| {
            ExchangeError::InvalidResponseFormat(format!("Failed to parse frame: {}", e))
        })?;

        let Some(kind) = Self::classify(&value) else {
            return Ok(None);
        };

        let id = value.get("id").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let topic = value
            .get("topic")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Some(InboundMessage {
            kind,
            id,
            topic,
            payload: value,
        }))
    }
}
