use crate::core::errors::ExchangeError;
use crate::core::kernel::{RawResponse, RestClient, RestRequest};
use crate::exchanges::kumex::types::{KumexResponse, SUCCESS_CODE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;

/// Venue codes that mean the credentials or signature were rejected
const AUTH_ERROR_CODES: &[&str] = &[
    "400001", // missing KC-API headers
    "400002", // invalid timestamp
    "400003", // key does not exist
    "400004", // invalid passphrase
    "400005", // invalid signature
    "400006", // IP not whitelisted
    "400007", // access denied
    "411100", // user frozen
];

/// KuMex REST API client: request path plus envelope validation
#[derive(Debug, Clone)]
pub struct KumexRest<R: RestClient> {
    rest_client: R,
}

impl<R: RestClient> KumexRest<R> {
    pub fn new(rest_client: R) -> Self {
        Self { rest_client }
    }

    /// Issue a call and unwrap the response envelope
    ///
    /// For GET/DELETE `params` become the sorted query string; otherwise they
    /// are JSON-encoded into the body. `timeout` overrides the client default.
    #[instrument(skip(self, query, body), fields(method = %method, endpoint = %endpoint))]
    pub async fn call(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        authenticated: bool,
        timeout: Option<Duration>,
    ) -> Result<Value, ExchangeError> {
        let mut request = RestRequest::new(method, endpoint)
            .authenticated(authenticated)
            .with_timeout(timeout);
        if matches!(request.method, Method::GET | Method::DELETE) {
            request = request.with_query(query);
        } else if let Some(body) = body {
            request = request.with_body(body);
        }

        let raw = self.rest_client.request(request).await?;
        unwrap_envelope(&raw)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        let value = self
            .call(Method::GET, endpoint, query, None, authenticated, None)
            .await?;
        decode(value)
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Value,
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        let value = self
            .call(Method::POST, endpoint, &[], Some(body), authenticated, None)
            .await?;
        decode(value)
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        let value = self
            .call(Method::DELETE, endpoint, query, None, authenticated, None)
            .await?;
        decode(value)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ExchangeError> {
    serde_json::from_value(value).map_err(|e| {
        ExchangeError::InvalidResponseFormat(format!("Failed to deserialize payload: {}", e))
    })
}

/// Validate and unwrap a venue response envelope
///
/// Success (`code == "200000"`) returns the nested `data` when present and
/// non-null, otherwise the whole envelope. Anything else is an error carrying
/// the HTTP status and raw body text.
pub fn unwrap_envelope(raw: &RawResponse) -> Result<Value, ExchangeError> {
    let parsed: Option<Value> = serde_json::from_str(&raw.body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(code_as_string);

    if (200..300).contains(&raw.status) {
        let (Some(value), Some(code)) = (parsed, code) else {
            return Err(malformed(raw));
        };

        if code == SUCCESS_CODE {
            let envelope: KumexResponse =
                serde_json::from_value(value.clone()).map_err(|_| malformed(raw))?;
            return Ok(match envelope.data {
                Some(data) if !data.is_null() => data,
                _ => value,
            });
        }

        return Err(map_failure(raw, Some(&code)));
    }

    Err(map_failure(raw, code.as_deref()))
}

/// Envelope without a readable status code
fn malformed(raw: &RawResponse) -> ExchangeError {
    ExchangeError::ProtocolError {
        status: raw.status,
        body: raw.body.clone(),
    }
}

fn code_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn map_failure(raw: &RawResponse, code: Option<&str>) -> ExchangeError {
    let auth_shaped = raw.status == 401 || code.is_some_and(|c| AUTH_ERROR_CODES.contains(&c));
    if auth_shaped {
        ExchangeError::AuthError(format!("{}-{}", raw.status, raw.body))
    } else {
        ExchangeError::ProtocolError {
            status: raw.status,
            body: raw.body.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::kumex::test_support::MockRest;
    use serde_json::json;

    fn raw(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_success_unwraps_data() {
        let value = unwrap_envelope(&raw(200, r#"{"code":"200000","data":{"foo":1}}"#)).unwrap();
        assert_eq!(value, json!({"foo": 1}));
    }

    #[test]
    fn test_success_without_data_returns_envelope() {
        let value = unwrap_envelope(&raw(200, r#"{"code":"200000"}"#)).unwrap();
        assert_eq!(value, json!({"code": "200000"}));

        let value = unwrap_envelope(&raw(200, r#"{"code":"200000","data":null}"#)).unwrap();
        assert_eq!(value["code"], "200000");
    }

    #[test]
    fn test_other_code_is_protocol_error_with_status_and_body() {
        let body = r#"{"code":"300000","msg":"Order does not exist"}"#;
        match unwrap_envelope(&raw(200, body)) {
            Err(ExchangeError::ProtocolError { status, body: text }) => {
                assert_eq!(status, 200);
                assert_eq!(text, body);
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_http_failure_with_non_json_body() {
        match unwrap_envelope(&raw(502, "Bad Gateway")) {
            Err(ExchangeError::ProtocolError { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "Bad Gateway");
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_auth_codes_map_to_auth_error() {
        let err = unwrap_envelope(&raw(401, r#"{"code":"400005","msg":"Invalid KC-API-SIGN"}"#))
            .unwrap_err();
        assert!(err.is_auth());

        let err = unwrap_envelope(&raw(200, r#"{"code":"400003","msg":"KC-API-KEY not exists"}"#))
            .unwrap_err();
        assert!(err.is_auth());

        let err = unwrap_envelope(&raw(401, "Unauthorized")).unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn test_malformed_success_body_is_protocol_error() {
        match unwrap_envelope(&raw(200, "not json")) {
            Err(ExchangeError::ProtocolError { status, body }) => {
                assert_eq!(status, 200);
                assert_eq!(body, "not json");
            }
            other => panic!("expected protocol error, got {:?}", other),
        }

        let body = r#"{"data":{}}"#;
        match unwrap_envelope(&raw(200, body)) {
            Err(ExchangeError::ProtocolError { status, body: text }) => {
                assert_eq!(status, 200);
                assert_eq!(text, body);
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_sends_query_and_post_sends_body() {
        let mock = MockRest::new();
        mock.respond("/api/v1/ticker", json!({"code": "200000", "data": {"ok": true}}));
        mock.respond("/api/v1/orders", json!({"code": "200000", "data": {"ok": true}}));
        let rest = KumexRest::new(mock.clone());

        let _: Value = rest
            .get("/api/v1/ticker", &[("symbol", "XBTUSDM")], false)
            .await
            .unwrap();
        let _: Value = rest
            .post("/api/v1/orders", &json!({"size": 1}), true)
            .await
            .unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0].method, Method::GET);
        assert_eq!(calls[0].query, vec![("symbol".to_string(), "XBTUSDM".to_string())]);
        assert!(calls[0].body.is_none());
        assert!(!calls[0].authenticated);
        assert_eq!(calls[1].method, Method::POST);
        assert_eq!(calls[1].body, Some(json!({"size": 1})));
        assert!(calls[1].authenticated);
    }

    #[tokio::test]
    async fn test_per_call_timeout_reaches_transport() {
        let mock = MockRest::new();
        mock.respond("/api/v1/ticker", json!({"code": "200000", "data": {}}));
        let rest = KumexRest::new(mock.clone());

        rest.call(
            Method::GET,
            "/api/v1/ticker",
            &[("symbol", "XBTUSDM")],
            None,
            false,
            Some(Duration::from_secs(3)),
        )
        .await
        .unwrap();
        let _: Value = rest
            .get("/api/v1/ticker", &[("symbol", "XBTUSDM")], false)
            .await
            .unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0].timeout, Some(Duration::from_secs(3)));
        assert_eq!(calls[1].timeout, None);
    }
}
