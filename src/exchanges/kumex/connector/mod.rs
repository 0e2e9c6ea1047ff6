use crate::core::errors::ExchangeError;
use crate::core::kernel::{ReqwestRest, RestClient, TungsteniteConnector, WsConfig, WsConnector};
use crate::exchanges::kumex::connection::{ConnectionManager, ConnectionState, ConnectionStatus};
use crate::exchanges::kumex::registry::{SubscriptionHandle, TopicCallback};
use crate::exchanges::kumex::rest::KumexRest;
use crate::exchanges::kumex::token::TokenProvider;
use crate::exchanges::kumex::topics;
use crate::exchanges::kumex::types::{
    AccountOverview, CancelResponse, MarkPrice, OrderRequest, OrderResponse, Ticker,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

pub mod account;
pub mod market_data;
pub mod trading;

pub use account::Account;
pub use market_data::MarketData;
pub use trading::Trading;

#[async_trait]
pub trait MarketDataSource {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;

    async fn get_current_mark_price(&self, symbol: &str) -> Result<MarkPrice, ExchangeError>;
}

#[async_trait]
pub trait OrderPlacer {
    async fn place_order(&self, order: OrderRequest) -> Result<OrderResponse, ExchangeError>;

    async fn cancel_order(&self, order_id: &str) -> Result<CancelResponse, ExchangeError>;
}

#[async_trait]
pub trait AccountSource {
    async fn get_account_overview(&self, currency: &str) -> Result<AccountOverview, ExchangeError>;
}

/// Produces a fresh REST transport on every `setup()`
pub type RestFactory<R> = Arc<dyn Fn() -> Result<R, ExchangeError> + Send + Sync>;

/// Operation groups sharing one REST transport
struct RestGroups<R: RestClient> {
    rest: R,
    market: MarketData<R>,
    trading: Trading<R>,
    account: Account<R>,
}

struct Stream<C: WsConnector> {
    manager: ConnectionManager<C>,
    resubscriber: JoinHandle<()>,
}

impl<C: WsConnector> Stream<C> {
    async fn shutdown(self) {
        self.resubscriber.abort();
        let _ = self.resubscriber.await;
        self.manager.close().await;
    }
}

/// KuMex connector: REST operation groups plus the streaming connection
///
/// `setup()` acquires the REST transport, `connect_stream()` opens the stream
/// and `release()` tears both down. Every reconnect re-sends the registered
/// subscriptions.
pub struct KumexConnector<R: RestClient + Clone = ReqwestRest, C: WsConnector = TungsteniteConnector>
{
    rest_factory: RestFactory<R>,
    connector: Arc<C>,
    ws_config: WsConfig,
    groups: Option<RestGroups<R>>,
    stream: Option<Stream<C>>,
}

impl<R, C> KumexConnector<R, C>
where
    R: RestClient + Clone + 'static,
    C: WsConnector,
{
    pub fn new(rest_factory: RestFactory<R>, connector: Arc<C>, ws_config: WsConfig) -> Self {
        Self {
            rest_factory,
            connector,
            ws_config,
            groups: None,
            stream: None,
        }
    }

    /// Acquire the REST transport; a second call is a no-op
    pub fn setup(&mut self) -> Result<(), ExchangeError> {
        if self.groups.is_some() {
            return Ok(());
        }
        let rest = (self.rest_factory)()?;
        self.groups = Some(RestGroups {
            market: MarketData::new(&rest),
            trading: Trading::new(&rest),
            account: Account::new(&rest),
            rest,
        });
        info!("kumex connector set up");
        Ok(())
    }

    pub fn is_setup(&self) -> bool {
        self.groups.is_some()
    }

    /// Fetch a connection token and start the stream
    ///
    /// Returns once connected, or with `TransportError` when the reconnect
    /// budget is spent; in that case `state()` reports `Disconnected` until
    /// the next call replaces the exhausted stream.
    ///
    /// Replacing an exhausted stream drops its subscriptions. The new stream
    /// starts empty and callers subscribe again.
    #[instrument(skip(self), fields(exchange = "kumex"))]
    pub async fn connect_stream(&mut self, private: bool) -> Result<(), ExchangeError> {
        if self.state() != ConnectionState::Disconnected {
            return Err(ExchangeError::AlreadyStarted);
        }
        if let Some(exhausted) = self.stream.take() {
            let dropped = exhausted.manager.topics();
            if !dropped.is_empty() {
                warn!(topics = ?dropped, "dropping subscriptions of exhausted stream");
            }
            exhausted.shutdown().await;
        }
        let rest = self.groups()?.rest.clone();
        let params = TokenProvider::new(KumexRest::new(rest))
            .get_stream_params(private)
            .await?;

        let manager = ConnectionManager::new(Arc::clone(&self.connector), self.ws_config.clone());
        let resubscriber = tokio::spawn(resubscribe_on_reconnect(
            manager.clone(),
            manager.state_changes(),
        ));
        let ready = manager.launch(params)?;
        self.stream = Some(Stream {
            manager,
            resubscriber,
        });

        ready.await.map_err(|_| {
            ExchangeError::TransportError("Connection task ended before becoming ready".to_string())
        })?
    }

    /// Tear down the stream and the REST transport
    ///
    /// Both are always attempted and both references are cleared.
    pub async fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.shutdown().await;
        }
        if self.groups.take().is_some() {
            info!("kumex REST transport released");
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.stream
            .as_ref()
            .map_or(ConnectionState::Disconnected, |s| s.manager.state())
    }

    pub fn status(&self) -> Option<ConnectionStatus> {
        self.stream.as_ref().map(|s| s.manager.status())
    }

    pub fn state_changes(&self) -> Option<watch::Receiver<ConnectionStatus>> {
        self.stream.as_ref().map(|s| s.manager.state_changes())
    }

    /// The streaming operation group
    pub fn websocket(&self) -> Result<&ConnectionManager<C>, ExchangeError> {
        self.stream
            .as_ref()
            .map(|s| &s.manager)
            .ok_or(ExchangeError::NotConnected)
    }

    pub async fn subscribe(
        &self,
        topic: &str,
        callback: TopicCallback,
    ) -> Result<SubscriptionHandle, ExchangeError> {
        self.websocket()?.subscribe(topic, callback).await
    }

    pub async fn resubscribe(
        &self,
        topic: &str,
        callback: TopicCallback,
    ) -> Result<SubscriptionHandle, ExchangeError> {
        self.websocket()?.resubscribe(topic, callback).await
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ExchangeError> {
        self.websocket()?.unsubscribe(topic).await
    }

    pub async fn subscribe_market_ticker(
        &self,
        symbol: &str,
        callback: TopicCallback,
    ) -> Result<SubscriptionHandle, ExchangeError> {
        self.subscribe(&topics::ticker(symbol), callback).await
    }

    pub fn market(&self) -> Result<&MarketData<R>, ExchangeError> {
        self.groups().map(|g| &g.market)
    }

    pub fn trading(&self) -> Result<&Trading<R>, ExchangeError> {
        self.groups().map(|g| &g.trading)
    }

    pub fn account(&self) -> Result<&Account<R>, ExchangeError> {
        self.groups().map(|g| &g.account)
    }

    fn groups(&self) -> Result<&RestGroups<R>, ExchangeError> {
        self.groups
            .as_ref()
            .ok_or_else(|| ExchangeError::NotInitialized("call setup() first".to_string()))
    }
}

/// Re-send every registered subscription each time a new session comes up
async fn resubscribe_on_reconnect<C: WsConnector>(
    manager: ConnectionManager<C>,
    mut changes: watch::Receiver<ConnectionStatus>,
) {
    let mut seen = changes.borrow().session;
    while changes.changed().await.is_ok() {
        let status = *changes.borrow_and_update();
        match status.state {
            ConnectionState::Connected if status.session > seen => {
                let reconnected = seen > 0;
                seen = status.session;
                if reconnected {
                    if let Err(e) = manager.resend_subscriptions().await {
                        warn!(error = %e, "resubscription after reconnect failed");
                    }
                }
            }
            ConnectionState::Disconnected | ConnectionState::Closing => break,
            _ => {}
        }
    }
}

#[async_trait]
impl<R: RestClient + Clone + 'static, C: WsConnector> MarketDataSource for KumexConnector<R, C> {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        self.market()?.get_ticker(symbol).await
    }

    async fn get_current_mark_price(&self, symbol: &str) -> Result<MarkPrice, ExchangeError> {
        self.market()?.get_current_mark_price(symbol).await
    }
}

#[async_trait]
impl<R: RestClient + Clone + 'static, C: WsConnector> OrderPlacer for KumexConnector<R, C> {
    async fn place_order(&self, order: OrderRequest) -> Result<OrderResponse, ExchangeError> {
        self.trading()?.place_order(order).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelResponse, ExchangeError> {
        self.trading()?.cancel_order(order_id).await
    }
}

#[async_trait]
impl<R: RestClient + Clone + 'static, C: WsConnector> AccountSource for KumexConnector<R, C> {
    async fn get_account_overview(&self, currency: &str) -> Result<AccountOverview, ExchangeError> {
        self.account()?.get_account_overview(currency).await
    }
}
