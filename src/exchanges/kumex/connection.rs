use crate::core::errors::ExchangeError;
use crate::core::kernel::{WsCodec, WsConfig, WsConnector, WsSink, WsStream};
use crate::exchanges::kumex::codec::{KumexCodec, RequestIds};
use crate::exchanges::kumex::registry::{SubscriptionHandle, TopicCallback, TopicRegistry};
use crate::exchanges::kumex::topics;
use crate::exchanges::kumex::types::{InboundMessage, MessageKind, StreamParams};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Observable connection status
///
/// `session` increases every time a connection is established, so observers
/// can tell a reconnect apart from a status update they already saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub session: u64,
}

/// Shortest period the heartbeat task runs at
pub const MIN_HEARTBEAT: Duration = Duration::from_millis(100);

/// Resolved once: `Ok` when the stream first comes up, `Err` when it never will
pub type ReadySignal = oneshot::Receiver<Result<(), ExchangeError>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner<C: WsConnector> {
    connector: Arc<C>,
    config: WsConfig,
    codec: KumexCodec,
    ids: RequestIds,
    registry: TopicRegistry,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    status: watch::Sender<ConnectionStatus>,
    ready: Mutex<Option<oneshot::Sender<Result<(), ExchangeError>>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

/// Owner of the single streaming connection
///
/// Runs the connect/reconnect loop and the heartbeat on background tasks and
/// routes inbound frames to the topic registry. Cloning yields another handle
/// to the same connection.
pub struct ConnectionManager<C: WsConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: WsConnector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: WsConnector> ConnectionManager<C> {
    pub fn new(connector: Arc<C>, config: WsConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus {
            state: ConnectionState::Disconnected,
            session: 0,
        });
        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                codec: KumexCodec::new(),
                ids: RequestIds::new(),
                registry: TopicRegistry::new(),
                sink: tokio::sync::Mutex::new(None),
                status,
                ready: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the connection and heartbeat tasks without waiting for readiness
    pub fn launch(&self, params: StreamParams) -> Result<ReadySignal, ExchangeError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(ExchangeError::AlreadyStarted);
        }

        let (tx, rx) = oneshot::channel();
        *lock(&self.inner.ready) = Some(tx);
        self.inner.set_state(ConnectionState::Connecting);

        let heartbeat = heartbeat_period(params.heartbeat_interval, &self.inner.config);
        let run = tokio::spawn(Arc::clone(&self.inner).run(params));
        let beat = tokio::spawn(Arc::clone(&self.inner).heartbeat(heartbeat));
        lock(&self.inner.tasks).extend([run, beat]);
        Ok(rx)
    }

    /// Connect and wait until the stream is up or the reconnect budget is spent
    pub async fn start(&self, params: StreamParams) -> Result<(), ExchangeError> {
        let ready = self.launch(params)?;
        ready.await.map_err(|_| {
            ExchangeError::TransportError("Connection task ended before becoming ready".to_string())
        })?
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.status().state
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.inner.registry.contains(topic)
    }

    pub fn topics(&self) -> Vec<String> {
        self.inner.registry.topics()
    }

    /// Register `callback` for `topic` and send the subscribe request
    ///
    /// The registration is rolled back if the request cannot be sent.
    #[instrument(skip(self, callback), fields(exchange = "kumex"))]
    pub async fn subscribe(
        &self,
        topic: &str,
        callback: TopicCallback,
    ) -> Result<SubscriptionHandle, ExchangeError> {
        self.ensure_connected()?;
        let handle = self.inner.registry.register(topic, callback)?;
        if let Err(e) = self.inner.send_subscribe(topic).await {
            let _ = self.inner.registry.unregister(topic);
            return Err(e);
        }
        Ok(handle)
    }

    /// Replace the callback for `topic` and send a fresh subscribe request
    #[instrument(skip(self, callback), fields(exchange = "kumex"))]
    pub async fn resubscribe(
        &self,
        topic: &str,
        callback: TopicCallback,
    ) -> Result<SubscriptionHandle, ExchangeError> {
        self.ensure_connected()?;
        let (handle, replaced) = self.inner.registry.replace(topic, callback);
        if let Err(e) = self.inner.send_subscribe(topic).await {
            if !replaced {
                let _ = self.inner.registry.unregister(topic);
            }
            return Err(e);
        }
        Ok(handle)
    }

    /// Stop dispatching `topic` and send the unsubscribe request
    #[instrument(skip(self), fields(exchange = "kumex"))]
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ExchangeError> {
        self.ensure_connected()?;
        self.inner.registry.unregister(topic)?;
        let id = self.inner.ids.next_id();
        let frame =
            self.inner
                .codec
                .encode_unsubscription(&id, topic, topics::is_private(topic))?;
        self.inner.registry.track_pending(&id, topic);
        if let Err(e) = self.inner.send(frame).await {
            self.inner.registry.resolve_pending(&id);
            return Err(e);
        }
        Ok(())
    }

    /// Send a subscribe request for every registered topic
    ///
    /// Returns how many were sent; individual failures are logged.
    pub async fn resend_subscriptions(&self) -> Result<usize, ExchangeError> {
        self.ensure_connected()?;
        let mut sent = 0;
        for topic in self.inner.registry.topics() {
            match self.inner.send_subscribe(&topic).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(topic = %topic, error = %e, "failed to resubscribe"),
            }
        }
        info!(sent, "subscriptions re-sent");
        Ok(sent)
    }

    /// Stop both tasks, close the transport and clear all subscriptions
    ///
    /// No callback runs after this returns.
    pub async fn close(&self) {
        self.inner.status.send_modify(|s| s.state = ConnectionState::Closing);

        let tasks = std::mem::take(&mut *lock(&self.inner.tasks));
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }

        if let Some(mut sink) = self.inner.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "error while closing stream");
            }
        }
        self.inner.registry.clear();
        self.inner.resolve_ready(Err(ExchangeError::TransportError(
            "Connection closed".to_string(),
        )));
        info!("stream closed");
    }

    fn ensure_connected(&self) -> Result<(), ExchangeError> {
        if self.state() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(ExchangeError::NotConnected)
        }
    }
}

/// Venue-derived interval, else the configured one, never below `MIN_HEARTBEAT`
fn heartbeat_period(advertised: Duration, config: &WsConfig) -> Duration {
    let period = if advertised.is_zero() {
        config.heartbeat_interval()
    } else {
        advertised
    };
    if period < MIN_HEARTBEAT {
        warn!(?period, minimum = ?MIN_HEARTBEAT, "heartbeat interval too short, clamping");
        return MIN_HEARTBEAT;
    }
    period
}

impl<C: WsConnector> Inner<C> {
    fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    fn is_closing(&self) -> bool {
        self.state() == ConnectionState::Closing
    }

    /// Closing is terminal and never overwritten
    fn set_state(&self, state: ConnectionState) {
        self.status.send_if_modified(|s| {
            if s.state == ConnectionState::Closing || s.state == state {
                return false;
            }
            s.state = state;
            true
        });
    }

    fn mark_connected(&self) {
        self.status.send_if_modified(|s| {
            if s.state == ConnectionState::Closing {
                return false;
            }
            s.state = ConnectionState::Connected;
            s.session += 1;
            true
        });
    }

    fn resolve_ready(&self, result: Result<(), ExchangeError>) {
        if let Some(tx) = lock(&self.ready).take() {
            let _ = tx.send(result);
        }
    }

    async fn send(&self, frame: Message) -> Result<(), ExchangeError> {
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(ExchangeError::NotConnected)?;
        sink.send(frame).await
    }

    async fn send_subscribe(&self, topic: &str) -> Result<(), ExchangeError> {
        let id = self.ids.next_id();
        let frame = self
            .codec
            .encode_subscription(&id, topic, topics::is_private(topic))?;
        self.registry.track_pending(&id, topic);
        if let Err(e) = self.send(frame).await {
            self.registry.resolve_pending(&id);
            return Err(e);
        }
        debug!(topic, id = %id, "subscribe sent");
        Ok(())
    }

    #[instrument(skip_all, fields(exchange = "kumex"))]
    async fn run(self: Arc<Self>, params: StreamParams) {
        let max_attempts = u64::from(self.config.max_reconnect_attempts) + 1;
        let delay = self.config.reconnect_delay();
        let mut attempt: u64 = 0;

        while attempt < max_attempts && !self.is_closing() {
            attempt += 1;
            self.set_state(ConnectionState::Connecting);
            info!(attempt, max_attempts, "connecting stream");

            match self
                .connector
                .connect(&params.endpoint_url, params.requires_encryption)
                .await
            {
                Ok((sink, stream)) => {
                    *self.sink.lock().await = Some(sink);
                    self.mark_connected();
                    self.resolve_ready(Ok(()));
                    info!(attempt, "stream connected");

                    self.read_frames(stream).await;

                    self.sink.lock().await.take();
                    self.registry.discard_pending();
                    if self.is_closing() {
                        return;
                    }
                    warn!(attempt, "stream lost");
                }
                Err(e) => warn!(attempt, error = %e, "connection attempt failed"),
            }

            if attempt < max_attempts && !self.is_closing() {
                self.set_state(ConnectionState::Connecting);
                sleep(delay).await;
            }
        }

        if self.is_closing() {
            return;
        }
        self.set_state(ConnectionState::Disconnected);
        error!(attempts = attempt, "reconnect budget exhausted");
        self.resolve_ready(Err(ExchangeError::TransportError(format!(
            "Failed to connect after {} attempts",
            attempt
        ))));
    }

    /// Process frames in arrival order until the transport fails or closes
    async fn read_frames(&self, mut stream: WsStream) {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Close(reason)) => {
                    debug!(?reason, "close frame received");
                    break;
                }
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.send(Message::Pong(data)).await {
                        warn!(error = %e, "failed to send pong response");
                    }
                }
                Ok(message) => match self.codec.decode_message(message) {
                    Ok(Some(inbound)) => self.handle(inbound),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "dropping malformed frame"),
                },
                Err(e) => {
                    warn!(error = %e, "stream error");
                    break;
                }
            }
        }
    }

    fn handle(&self, message: InboundMessage) {
        match message.kind {
            MessageKind::Welcome => {
                debug!("welcome received");
                self.resolve_ready(Ok(()));
            }
            MessageKind::Ack => {
                let topic = message
                    .id
                    .as_deref()
                    .and_then(|id| self.registry.resolve_pending(id));
                match topic {
                    Some(topic) => {
                        debug!(topic = %topic, "request acknowledged");
                        self.registry.dispatch(&topic, MessageKind::Ack, &message.payload);
                    }
                    None => debug!(id = ?message.id, "ack for unknown request"),
                }
            }
            MessageKind::Pong => trace!("pong"),
            MessageKind::Error => {
                warn!(payload = %message.payload, "venue reported error");
                if let Some(topic) = message
                    .id
                    .as_deref()
                    .and_then(|id| self.registry.resolve_pending(id))
                {
                    self.registry.dispatch(&topic, MessageKind::Error, &message.payload);
                }
            }
            MessageKind::Message => {
                if let Some(topic) = message.topic.as_deref() {
                    self.registry.dispatch(topic, MessageKind::Message, &message.payload);
                }
            }
        }
    }

    /// Ping while connected; idle through reconnects, stop once terminal
    async fn heartbeat(self: Arc<Self>, every: Duration) {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.state() {
                ConnectionState::Connected => {
                    let id = self.ids.next_id();
                    let result = match self.codec.encode_ping(&id) {
                        Ok(frame) => self.send(frame).await,
                        Err(e) => Err(e),
                    };
                    match result {
                        Ok(()) => trace!(id = %id, "ping sent"),
                        Err(e) => debug!(error = %e, "heartbeat send failed"),
                    }
                }
                ConnectionState::Connecting => {}
                ConnectionState::Disconnected | ConnectionState::Closing => break,
            }
        }
    }
}
