pub mod codec;
pub mod registry;
pub mod signer;
pub mod token;
pub mod topics;
pub mod types;

pub mod builder;
pub mod connection;
pub mod connector;
pub mod rest;

#[cfg(test)]
mod test_support;

// Re-export main components
pub use builder::{build_connector, build_connector_from_env, KumexBuilder};
pub use codec::{KumexCodec, RequestIds};
pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus, ReadySignal};
pub use connector::{
    Account, AccountSource, KumexConnector, MarketData, MarketDataSource, OrderPlacer,
    RestFactory, Trading,
};
pub use registry::{Subscription, SubscriptionHandle, TopicCallback, TopicRegistry};
pub use rest::{unwrap_envelope, KumexRest};
pub use signer::KumexSigner;
pub use token::TokenProvider;
pub use types::{
    AccountOverview, BulletToken, CancelResponse, InboundMessage, InstanceServer, KumexResponse,
    MarkPrice, MessageKind, OrderRequest, OrderResponse, OrderSide, OrderType, StreamParams, Ticker,
};
