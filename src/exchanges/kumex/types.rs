use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Application status code the venue uses for success
pub const SUCCESS_CODE: &str = "200000";

/// Response envelope wrapping every REST payload
#[derive(Debug, Clone, Deserialize)]
pub struct KumexResponse {
    pub code: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub msg: Option<String>,
}

/// Reply of the bullet (connection token) endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletToken {
    pub token: String,
    pub instance_servers: Vec<InstanceServer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceServer {
    pub endpoint: String,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub ping_interval: Option<u64>,
    /// Milliseconds after which the venue drops a silent connection
    pub ping_timeout: u64,
}

/// Everything needed to open one streaming session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    pub endpoint_url: String,
    pub requires_encryption: bool,
    pub heartbeat_interval: Duration,
}

/// Outbound streaming frame
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WsRequest<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_channel: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<bool>,
}

/// Classification of an inbound streaming frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Session is ready (`welcome`)
    Welcome,
    /// Acknowledgement of a subscribe/unsubscribe request
    Ack,
    Pong,
    /// Venue-reported error; never fatal to the connection
    Error,
    /// Topic data frame
    Message,
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub kind: MessageKind,
    pub id: Option<String>,
    pub topic: Option<String>,
    /// The whole frame as received
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOverview {
    pub currency: String,
    #[serde(default)]
    pub account_equity: f64,
    #[serde(default, rename = "unrealisedPNL")]
    pub unrealised_pnl: f64,
    #[serde(default)]
    pub margin_balance: f64,
    #[serde(default)]
    pub position_margin: f64,
    #[serde(default)]
    pub order_margin: f64,
    #[serde(default)]
    pub frozen_funds: f64,
    #[serde(default)]
    pub available_balance: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPrice {
    pub symbol: String,
    #[serde(default)]
    pub granularity: u64,
    #[serde(default)]
    pub time_point: i64,
    pub value: f64,
    #[serde(default)]
    pub index_price: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub symbol: String,
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub size: u64,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub best_bid_price: Decimal,
    #[serde(default)]
    pub best_bid_size: u64,
    #[serde(with = "rust_decimal::serde::str")]
    pub best_ask_price: Decimal,
    #[serde(default)]
    pub best_ask_size: u64,
    #[serde(default)]
    pub trade_id: String,
    #[serde(default)]
    pub ts: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// Order placement request; `size` is in contract lots
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub client_oid: String,
    pub side: OrderSide,
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub leverage: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::str_option"
    )]
    pub price: Option<Decimal>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    #[serde(default)]
    pub cancelled_order_ids: Vec<String>,
}
