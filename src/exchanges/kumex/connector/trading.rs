use crate::core::errors::ExchangeError;
use crate::core::kernel::RestClient;
use crate::exchanges::kumex::connector::OrderPlacer;
use crate::exchanges::kumex::rest::KumexRest;
use crate::exchanges::kumex::types::{CancelResponse, OrderRequest, OrderResponse};
use async_trait::async_trait;
use rand::Rng;
use tracing::info;

/// Order placement and cancellation
#[derive(Debug, Clone)]
pub struct Trading<R: RestClient> {
    rest: KumexRest<R>,
}

impl<R: RestClient + Clone> Trading<R> {
    pub fn new(rest: &R) -> Self {
        Self {
            rest: KumexRest::new(rest.clone()),
        }
    }
}

/// Client order id unique enough for the venue's idempotency window
pub fn new_client_oid() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let nonce: u64 = rand::thread_rng().gen();
    format!("{}{:016x}", millis, nonce)
}

#[async_trait]
impl<R: RestClient> OrderPlacer for Trading<R> {
    /// Fills in a client order id when the request carries none
    async fn place_order(&self, mut order: OrderRequest) -> Result<OrderResponse, ExchangeError> {
        if order.client_oid.is_empty() {
            order.client_oid = new_client_oid();
        }
        let body = serde_json::to_value(&order)
            .map_err(|e| ExchangeError::SerializationError(e.to_string()))?;
        let response: OrderResponse = self.rest.post("/api/v1/orders", &body, true).await?;
        info!(
            symbol = %order.symbol,
            client_oid = %order.client_oid,
            order_id = %response.order_id,
            "order placed"
        );
        Ok(response)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelResponse, ExchangeError> {
        let endpoint = format!("/api/v1/orders/{}", order_id);
        self.rest.delete(&endpoint, &[], true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::kumex::test_support::MockRest;
    use crate::exchanges::kumex::types::{OrderSide, OrderType};
    use reqwest::Method;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn order() -> OrderRequest {
        OrderRequest {
            client_oid: String::new(),
            side: OrderSide::Sell,
            symbol: "XBTUSDM".to_string(),
            order_type: OrderType::Limit,
            leverage: "5".to_string(),
            price: Some(Decimal::new(31_000, 0)),
            size: 1,
            reduce_only: Some(true),
        }
    }

    #[tokio::test]
    async fn test_place_order_generates_client_oid() {
        let mock = MockRest::new();
        mock.respond(
            "/api/v1/orders",
            json!({"code": "200000", "data": {"orderId": "5bd6e9286d99522a52e458de"}}),
        );
        let trading = Trading::new(&mock);

        let response = trading.place_order(order()).await.unwrap();
        assert_eq!(response.order_id, "5bd6e9286d99522a52e458de");

        let call = &mock.calls()[0];
        assert_eq!(call.method, Method::POST);
        assert!(call.authenticated);
        let body = call.body.as_ref().unwrap();
        assert!(!body["clientOid"].as_str().unwrap().is_empty());
        assert_eq!(body["side"], "sell");
        assert_eq!(body["price"], "31000");
        assert_eq!(body["reduceOnly"], true);
    }

    #[tokio::test]
    async fn test_caller_client_oid_is_kept() {
        let mock = MockRest::new();
        mock.respond(
            "/api/v1/orders",
            json!({"code": "200000", "data": {"orderId": "1"}}),
        );
        let trading = Trading::new(&mock);
        let mut request = order();
        request.client_oid = "mine".to_string();
        trading.place_order(request).await.unwrap();
        assert_eq!(mock.calls()[0].body.as_ref().unwrap()["clientOid"], "mine");
    }

    #[tokio::test]
    async fn test_cancel_order() {
        let mock = MockRest::new();
        mock.respond(
            "/api/v1/orders/abc",
            json!({"code": "200000", "data": {"cancelledOrderIds": ["abc"]}}),
        );
        let trading = Trading::new(&mock);
        let cancelled = trading.cancel_order("abc").await.unwrap();
        assert_eq!(cancelled.cancelled_order_ids, vec!["abc".to_string()]);
        assert_eq!(mock.calls()[0].method, Method::DELETE);
    }

    #[test]
    fn test_client_oids_differ() {
        assert_ne!(new_client_oid(), new_client_oid());
    }
}
