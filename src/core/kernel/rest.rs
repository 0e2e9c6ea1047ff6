use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::Signer;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{instrument, trace};

/// A single HTTP request as seen by the transport
#[derive(Debug, Clone)]
pub struct RestRequest<'a> {
    pub method: Method,
    pub endpoint: &'a str,
    pub query_params: &'a [(&'a str, &'a str)],
    pub body: Option<&'a Value>,
    pub authenticated: bool,
    /// Overrides the client-wide timeout for this call
    pub timeout: Option<Duration>,
}

impl<'a> RestRequest<'a> {
    pub fn new(method: Method, endpoint: &'a str) -> Self {
        Self {
            method,
            endpoint,
            query_params: &[],
            body: None,
            authenticated: false,
            timeout: None,
        }
    }

    pub fn with_query(mut self, query_params: &'a [(&'a str, &'a str)]) -> Self {
        self.query_params = query_params;
        self
    }

    pub fn with_body(mut self, body: &'a Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Status and raw body of an HTTP response, before any venue interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// REST client trait for making HTTP requests
///
/// The transport signs and sends; interpreting the response envelope is left
/// to the venue layer.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Send a request and return the raw response
    ///
    /// Fails only with `TransportError` (or `AuthError` when signing is requested
    /// without a signer); HTTP error statuses are returned as data.
    async fn request(&self, request: RestRequest<'_>) -> Result<RawResponse, ExchangeError>;

    async fn get(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<RawResponse, ExchangeError> {
        self.request(
            RestRequest::new(Method::GET, endpoint)
                .with_query(query_params)
                .authenticated(authenticated),
        )
        .await
    }

    async fn post(
        &self,
        endpoint: &str,
        body: &Value,
        authenticated: bool,
    ) -> Result<RawResponse, ExchangeError> {
        self.request(
            RestRequest::new(Method::POST, endpoint)
                .with_body(body)
                .authenticated(authenticated),
        )
        .await
    }

    async fn put(
        &self,
        endpoint: &str,
        body: &Value,
        authenticated: bool,
    ) -> Result<RawResponse, ExchangeError> {
        self.request(
            RestRequest::new(Method::PUT, endpoint)
                .with_body(body)
                .authenticated(authenticated),
        )
        .await
    }

    async fn delete(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<RawResponse, ExchangeError> {
        self.request(
            RestRequest::new(Method::DELETE, endpoint)
                .with_query(query_params)
                .authenticated(authenticated),
        )
        .await
    }
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Default request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
}

impl RestClientConfig {
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            exchange_name,
            timeout_seconds: 30,
            user_agent: "kumex-connector/0.1".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
        }
    }

    /// Set the signer for authenticated requests
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(|e| {
                ExchangeError::TransportError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(ReqwestRest {
            client,
            config: self.config,
            signer: self.signer,
        })
    }
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    /// Get the current timestamp in milliseconds
    fn get_timestamp() -> Result<u64, ExchangeError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .map_err(|e| ExchangeError::TransportError(format!("Failed to get timestamp: {}", e)))
    }
}

/// Build the query string with parameters sorted by key
///
/// Keys and values are percent-encoded here, once. The signed path and the
/// path actually sent are both this exact string.
pub fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Path plus canonical query, the form both sent and signed
pub fn request_path(endpoint: &str, query_string: &str) -> String {
    if query_string.is_empty() {
        endpoint.to_string()
    } else {
        format!("{}?{}", endpoint, query_string)
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    #[instrument(skip(self, request), fields(exchange = %self.config.exchange_name, method = %request.method, endpoint = %request.endpoint))]
    async fn request(&self, request: RestRequest<'_>) -> Result<RawResponse, ExchangeError> {
        let query_string = canonical_query(request.query_params);
        let url = format!(
            "{}{}",
            self.config.base_url,
            request_path(request.endpoint, &query_string)
        );

        let body = match request.body {
            Some(value) => serde_json::to_vec(value).map_err(|e| {
                ExchangeError::SerializationError(format!(
                    "Failed to serialize request body: {}",
                    e
                ))
            })?,
            None => Vec::new(),
        };

        let mut builder = self.client.request(request.method.clone(), &url);

        if request.authenticated {
            let signer = self.signer.as_ref().ok_or_else(|| {
                ExchangeError::AuthError(
                    "Authentication required but no signer provided".to_string(),
                )
            })?;
            let timestamp = Self::get_timestamp()?;
            let headers = signer.sign_request(
                request.method.as_str(),
                request.endpoint,
                &query_string,
                &body,
                timestamp,
            )?;
            for (key, value) in headers {
                builder = builder.header(&key, &value);
            }
        }

        if !body.is_empty() {
            builder = builder.header("Content-Type", "application/json").body(body);
        }

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ExchangeError::TransportError(format!("Request timed out: {}", e))
            } else {
                ExchangeError::TransportError(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            ExchangeError::TransportError(format!("Failed to read response body: {}", e))
        })?;

        trace!("Response {}: {}", status, body);

        Ok(RawResponse { status, body })
    }
}
