//! In-memory REST and WebSocket transports for unit tests

use crate::core::errors::ExchangeError;
use crate::core::kernel::{RawResponse, RestClient, RestRequest, WsConnector, WsSink, WsStream};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub authenticated: bool,
    pub timeout: Option<Duration>,
}

#[derive(Default)]
struct MockRestState {
    responses: HashMap<String, RawResponse>,
    calls: Vec<RecordedCall>,
}

/// `RestClient` answering from canned responses keyed by endpoint
#[derive(Clone, Default)]
pub struct MockRest {
    state: Arc<Mutex<MockRestState>>,
}

impl MockRest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, endpoint: &str, body: Value) {
        self.respond_raw(endpoint, 200, &body.to_string());
    }

    pub fn respond_raw(&self, endpoint: &str, status: u16, body: &str) {
        self.state.lock().unwrap().responses.insert(
            endpoint.to_string(),
            RawResponse {
                status,
                body: body.to_string(),
            },
        );
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl RestClient for MockRest {
    async fn request(&self, request: RestRequest<'_>) -> Result<RawResponse, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall {
            method: request.method.clone(),
            endpoint: request.endpoint.to_string(),
            query: request
                .query_params
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            body: request.body.cloned(),
            authenticated: request.authenticated,
            timeout: request.timeout,
        });
        Ok(state
            .responses
            .get(request.endpoint)
            .cloned()
            .unwrap_or_else(|| RawResponse {
                status: 404,
                body: "Not Found".to_string(),
            }))
    }
}

/// Test side of one in-memory WebSocket connection
pub struct MockSession {
    pub outbound: UnboundedReceiver<Message>,
    pub inbound: UnboundedSender<Result<Message, ExchangeError>>,
}

impl MockSession {
    pub fn push(&self, frame: Value) {
        let _ = self
            .inbound
            .unbounded_send(Ok(Message::Text(frame.to_string())));
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.inbound.unbounded_send(Ok(Message::Text(text.to_string())));
    }

    /// Next outbound frame as JSON
    pub async fn next_frame(&mut self) -> Value {
        let message = tokio::time::timeout(Duration::from_secs(2), self.outbound.next())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("outbound channel closed");
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected outbound frame {:?}", other),
        }
    }

    /// Next outbound frame of the given `type`, skipping others such as pings
    pub async fn next_frame_of(&mut self, kind: &str) -> Value {
        loop {
            let frame = self.next_frame().await;
            if frame["type"] == kind {
                return frame;
            }
        }
    }
}

/// `WsConnector` that refuses the first `fail_first` attempts
pub struct MockConnector {
    fail_first: usize,
    attempts: Mutex<Vec<Instant>>,
    sessions: tokio::sync::mpsc::UnboundedSender<MockSession>,
}

impl MockConnector {
    pub fn new(fail_first: usize) -> (Arc<Self>, tokio::sync::mpsc::UnboundedReceiver<MockSession>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (
            Arc::new(Self {
                fail_first,
                attempts: Mutex::new(Vec::new()),
                sessions: tx,
            }),
            rx,
        )
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl WsConnector for MockConnector {
    async fn connect(
        &self,
        _url: &str,
        _requires_encryption: bool,
    ) -> Result<(WsSink, WsStream), ExchangeError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(Instant::now());
            attempts.len()
        };
        if attempt <= self.fail_first {
            return Err(ExchangeError::TransportError(format!(
                "connection refused (attempt {})",
                attempt
            )));
        }

        let (out_tx, out_rx) = unbounded::<Message>();
        let (in_tx, in_rx) = unbounded::<Result<Message, ExchangeError>>();
        let _ = self.sessions.send(MockSession {
            outbound: out_rx,
            inbound: in_tx,
        });

        let sink: WsSink = Box::pin(
            out_tx.sink_map_err(|e| ExchangeError::TransportError(format!("send failed: {}", e))),
        );
        let stream: WsStream = Box::pin(in_rx);
        Ok((sink, stream))
    }
}

/// Wait until `predicate` holds, polling every few milliseconds
pub async fn eventually<F: Fn() -> bool>(predicate: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !predicate() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
