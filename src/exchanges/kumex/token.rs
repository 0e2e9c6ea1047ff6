use crate::core::errors::ExchangeError;
use crate::core::kernel::RestClient;
use crate::exchanges::kumex::rest::KumexRest;
use crate::exchanges::kumex::types::{BulletToken, StreamParams};
use rand::Rng;
use reqwest::{Method, Url};
use std::time::Duration;
use tracing::{debug, instrument};

pub const BULLET_PUBLIC: &str = "/api/v1/bullet-public";
pub const BULLET_PRIVATE: &str = "/api/v1/bullet-private";

/// Subtracted from the advertised ping timeout so one more ping fits in
pub const HEARTBEAT_MARGIN: Duration = Duration::from_secs(1);

/// Obtains connection tokens and streaming parameters
#[derive(Debug, Clone)]
pub struct TokenProvider<R: RestClient> {
    rest: KumexRest<R>,
}

impl<R: RestClient> TokenProvider<R> {
    pub fn new(rest: KumexRest<R>) -> Self {
        Self { rest }
    }

    /// Request a token and compose the endpoint for one session
    #[instrument(skip(self))]
    pub async fn get_stream_params(&self, private: bool) -> Result<StreamParams, ExchangeError> {
        let endpoint = if private { BULLET_PRIVATE } else { BULLET_PUBLIC };
        let data = self
            .rest
            .call(Method::POST, endpoint, &[], None, private, None)
            .await?;
        let bullet: BulletToken = serde_json::from_value(data).map_err(|e| {
            ExchangeError::InvalidResponseFormat(format!("Malformed bullet token: {}", e))
        })?;

        let server = bullet.instance_servers.first().ok_or_else(|| {
            ExchangeError::InvalidResponseFormat("Bullet token lists no instance servers".to_string())
        })?;

        let endpoint_url = compose_endpoint(&server.endpoint, &bullet.token, &connect_id(), private)?;
        let heartbeat_interval = heartbeat_interval(Duration::from_millis(server.ping_timeout));
        debug!(
            encrypt = server.encrypt,
            heartbeat_ms = heartbeat_interval.as_millis() as u64,
            "stream parameters obtained"
        );

        Ok(StreamParams {
            endpoint_url,
            requires_encryption: server.encrypt,
            heartbeat_interval,
        })
    }
}

/// Per-connection identifier: wall-clock millis plus a random suffix
pub fn connect_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("{}{:04}", millis, suffix)
}

pub fn compose_endpoint(
    endpoint: &str,
    token: &str,
    connect_id: &str,
    private: bool,
) -> Result<String, ExchangeError> {
    let mut params = vec![("token", token), ("connectId", connect_id)];
    if private {
        params.push(("acceptUserMessage", "true"));
    }
    Url::parse_with_params(endpoint, &params)
        .map(String::from)
        .map_err(|e| {
            ExchangeError::InvalidResponseFormat(format!("Invalid stream endpoint {}: {}", endpoint, e))
        })
}

/// Ping timeout minus the margin; halves very short timeouts instead
pub fn heartbeat_interval(ping_timeout: Duration) -> Duration {
    if ping_timeout > HEARTBEAT_MARGIN * 2 {
        ping_timeout - HEARTBEAT_MARGIN
    } else {
        ping_timeout / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::kumex::test_support::MockRest;
    use serde_json::json;

    fn bullet() -> serde_json::Value {
        json!({
            "code": "200000",
            "data": {
                "token": "tok123",
                "instanceServers": [{
                    "endpoint": "wss://ws-api-futures.kucoin.com/endpoint",
                    "encrypt": true,
                    "protocol": "websocket",
                    "pingInterval": 18000,
                    "pingTimeout": 10000
                }]
            }
        })
    }

    #[tokio::test]
    async fn test_public_stream_params() {
        let mock = MockRest::new();
        mock.respond(BULLET_PUBLIC, bullet());
        let provider = TokenProvider::new(KumexRest::new(mock.clone()));

        let params = provider.get_stream_params(false).await.unwrap();
        assert!(params.endpoint_url.starts_with("wss://ws-api-futures.kucoin.com/endpoint?token=tok123&connectId="));
        assert!(!params.endpoint_url.contains("acceptUserMessage"));
        assert!(params.requires_encryption);
        assert_eq!(params.heartbeat_interval, Duration::from_secs(9));

        let calls = mock.calls();
        assert_eq!(calls[0].method, Method::POST);
        assert!(!calls[0].authenticated);
    }

    #[tokio::test]
    async fn test_private_stream_params_are_signed_and_flagged() {
        let mock = MockRest::new();
        mock.respond(BULLET_PRIVATE, bullet());
        let provider = TokenProvider::new(KumexRest::new(mock.clone()));

        let params = provider.get_stream_params(true).await.unwrap();
        assert!(params.endpoint_url.ends_with("&acceptUserMessage=true"));
        assert_eq!(mock.calls()[0].endpoint, BULLET_PRIVATE);
        assert!(mock.calls()[0].authenticated);
    }

    #[tokio::test]
    async fn test_token_without_servers_is_rejected() {
        let mock = MockRest::new();
        mock.respond(
            BULLET_PUBLIC,
            json!({"code": "200000", "data": {"token": "t", "instanceServers": []}}),
        );
        let provider = TokenProvider::new(KumexRest::new(mock));
        assert!(matches!(
            provider.get_stream_params(false).await,
            Err(ExchangeError::InvalidResponseFormat(_))
        ));
    }

    #[test]
    fn test_heartbeat_interval_keeps_margin() {
        assert_eq!(heartbeat_interval(Duration::from_millis(10_000)), Duration::from_millis(9_000));
        assert_eq!(heartbeat_interval(Duration::from_millis(1_500)), Duration::from_millis(750));
        assert!(heartbeat_interval(Duration::from_millis(50_000)) < Duration::from_millis(50_000));
    }

    #[test]
    fn test_connect_ids_differ() {
        let ids: std::collections::HashSet<String> = (0..20).map(|_| connect_id()).collect();
        assert!(ids.len() > 1);
    }
}
