use crate::core::errors::ExchangeError;
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, instrument};

/// Write half of an open WebSocket connection
pub type WsSink = Pin<Box<dyn Sink<Message, Error = ExchangeError> + Send>>;

/// Read half of an open WebSocket connection
pub type WsStream = Pin<Box<dyn Stream<Item = Result<Message, ExchangeError>> + Send>>;

/// WebSocket connection and reconnection settings
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Heartbeat interval in milliseconds, used when the venue does not advertise one
    pub heartbeat_interval_ms: u64,
    /// Reconnect budget; the connection is attempted at most this many times plus one
    pub max_reconnect_attempts: u32,
    /// Fixed delay between connection attempts in milliseconds
    pub reconnect_delay_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,    // 10 seconds
            heartbeat_interval_ms: 30_000, // 30 seconds
            max_reconnect_attempts: 10,
            reconnect_delay_ms: 5_000, // 5 seconds
        }
    }
}

impl WsConfig {
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Opens WebSocket connections - pure transport, no reconnection policy
#[async_trait]
pub trait WsConnector: Send + Sync + 'static {
    /// Open a connection and return its split halves
    ///
    /// # Arguments
    /// * `url` - Fully composed endpoint URL
    /// * `requires_encryption` - Reject endpoints that would not use TLS
    async fn connect(
        &self,
        url: &str,
        requires_encryption: bool,
    ) -> Result<(WsSink, WsStream), ExchangeError>;
}

/// Tungstenite-based connector
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    exchange_name: String,
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new(exchange_name: String) -> Self {
        Self {
            exchange_name,
            connect_timeout: WsConfig::default().connect_timeout(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl WsConnector for TungsteniteConnector {
    #[instrument(skip(self, url), fields(exchange = %self.exchange_name))]
    async fn connect(
        &self,
        url: &str,
        requires_encryption: bool,
    ) -> Result<(WsSink, WsStream), ExchangeError> {
        if requires_encryption && !url.starts_with("wss://") {
            return Err(ExchangeError::TransportError(
                "Endpoint requires encryption but is not a wss:// URL".to_string(),
            ));
        }

        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                ExchangeError::TransportError("WebSocket connection timeout".to_string())
            })?
            .map_err(|e| {
                ExchangeError::TransportError(format!("WebSocket connection failed: {}", e))
            })?;

        debug!("WebSocket transport established");

        let (write, read) = ws_stream.split();
        let sink: WsSink = Box::pin(write.sink_map_err(|e| {
            ExchangeError::TransportError(format!("Failed to send WebSocket message: {}", e))
        }));
        let stream: WsStream = Box::pin(read.map(|frame| {
            frame.map_err(|e| ExchangeError::TransportError(format!("WebSocket error: {}", e)))
        }));

        Ok((sink, stream))
    }
}
