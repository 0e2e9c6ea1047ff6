use crate::core::errors::ExchangeError;
use crate::core::kernel::RestClient;
use crate::exchanges::kumex::connector::MarketDataSource;
use crate::exchanges::kumex::rest::KumexRest;
use crate::exchanges::kumex::types::{MarkPrice, Ticker};
use async_trait::async_trait;

/// Public market data endpoints
#[derive(Debug, Clone)]
pub struct MarketData<R: RestClient> {
    rest: KumexRest<R>,
}

impl<R: RestClient + Clone> MarketData<R> {
    pub fn new(rest: &R) -> Self {
        Self {
            rest: KumexRest::new(rest.clone()),
        }
    }
}

#[async_trait]
impl<R: RestClient> MarketDataSource for MarketData<R> {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        self.rest
            .get("/api/v1/ticker", &[("symbol", symbol)], false)
            .await
    }

    async fn get_current_mark_price(&self, symbol: &str) -> Result<MarkPrice, ExchangeError> {
        let endpoint = format!("/api/v1/mark-price/{}/current", symbol);
        self.rest.get(&endpoint, &[], false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::kumex::test_support::MockRest;
    use serde_json::json;

    #[tokio::test]
    async fn test_mark_price() {
        let mock = MockRest::new();
        mock.respond(
            "/api/v1/mark-price/XBTUSDM/current",
            json!({
                "code": "200000",
                "data": {
                    "symbol": "XBTUSDM",
                    "granularity": 1000,
                    "timePoint": 1_700_000_000_000_i64,
                    "value": 30_000.5,
                    "indexPrice": 30_001.0
                }
            }),
        );
        let market = MarketData::new(&mock);

        let mark = market.get_current_mark_price("XBTUSDM").await.unwrap();
        assert_eq!(mark.symbol, "XBTUSDM");
        assert!((mark.value - 30_000.5).abs() < f64::EPSILON);
        assert!(!mock.calls()[0].authenticated);
    }

    #[tokio::test]
    async fn test_ticker_query() {
        let mock = MockRest::new();
        mock.respond(
            "/api/v1/ticker",
            json!({
                "code": "200000",
                "data": {
                    "sequence": 1,
                    "symbol": "XBTUSDM",
                    "side": "buy",
                    "size": 3,
                    "price": "30000.1",
                    "bestBidSize": 10,
                    "bestBidPrice": "30000.0",
                    "bestAskPrice": "30000.2",
                    "bestAskSize": 4,
                    "tradeId": "abc",
                    "ts": 1_700_000_000_000_i64
                }
            }),
        );
        let market = MarketData::new(&mock);
        let ticker = market.get_ticker("XBTUSDM").await.unwrap();
        assert_eq!(ticker.best_bid_price.to_string(), "30000.0");
        assert_eq!(
            mock.calls()[0].query,
            vec![("symbol".to_string(), "XBTUSDM".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_protocol_error() {
        let mock = MockRest::new();
        let market = MarketData::new(&mock);
        match market.get_current_mark_price("NOPE").await {
            Err(ExchangeError::ProtocolError { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }
}
