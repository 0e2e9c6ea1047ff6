//! Venue-agnostic transport layer
//!
//! The kernel owns HTTP and WebSocket plumbing only. It signs and sends REST
//! requests, opens WebSocket connections and defines the codec seam; the
//! venue layer under `exchanges` decides what the bytes mean.
//!
//! - `RestClient` / `ReqwestRest`: HTTP transport with pluggable `Signer`
//! - `WsConnector` / `TungsteniteConnector`: opens split WebSocket halves
//! - `WsCodec`: venue frame encoding/decoding
//!
//! ```rust,no_run
//! use kumex_connector::core::kernel::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let rest = RestClientBuilder::new(RestClientConfig::new(
//!     "https://api-futures.kucoin.com".to_string(),
//!     "kumex".to_string(),
//! ))
//! .build()?;
//!
//! let raw = rest.get("/api/v1/timestamp", &[], false).await?;
//! println!("{} {}", raw.status, raw.body);
//! # Ok(())
//! # }
//! ```
pub mod codec;
pub mod rest;
pub mod signer;
pub mod ws;

pub use codec::WsCodec;
pub use rest::{
    canonical_query, request_path, RawResponse, ReqwestRest, RestClient, RestClientBuilder,
    RestClientConfig, RestRequest,
};
pub use signer::{hmac_sha256_base64, SignatureResult, Signer};
pub use ws::{TungsteniteConnector, WsConfig, WsConnector, WsSink, WsStream};
