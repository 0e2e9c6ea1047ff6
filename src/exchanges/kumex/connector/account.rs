use crate::core::errors::ExchangeError;
use crate::core::kernel::RestClient;
use crate::exchanges::kumex::connector::AccountSource;
use crate::exchanges::kumex::rest::KumexRest;
use crate::exchanges::kumex::types::AccountOverview;
use async_trait::async_trait;

/// Account endpoints
#[derive(Debug, Clone)]
pub struct Account<R: RestClient> {
    rest: KumexRest<R>,
}

impl<R: RestClient + Clone> Account<R> {
    pub fn new(rest: &R) -> Self {
        Self {
            rest: KumexRest::new(rest.clone()),
        }
    }
}

#[async_trait]
impl<R: RestClient> AccountSource for Account<R> {
    async fn get_account_overview(&self, currency: &str) -> Result<AccountOverview, ExchangeError> {
        self.rest
            .get("/api/v1/account-overview", &[("currency", currency)], true)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::kumex::test_support::MockRest;
    use serde_json::json;

    #[tokio::test]
    async fn test_account_overview_is_signed_and_parsed() {
        let mock = MockRest::new();
        mock.respond(
            "/api/v1/account-overview",
            json!({
                "code": "200000",
                "data": {
                    "accountEquity": 99.8999305281,
                    "unrealisedPNL": 0,
                    "marginBalance": 99.8999305281,
                    "positionMargin": 0,
                    "orderMargin": 0,
                    "frozenFunds": 0,
                    "availableBalance": 99.8999305281,
                    "currency": "XBT"
                }
            }),
        );
        let account = Account::new(&mock);

        let overview = account.get_account_overview("XBT").await.unwrap();
        assert_eq!(overview.currency, "XBT");
        assert!((overview.available_balance - 99.899_930_528_1).abs() < 1e-9);

        let call = &mock.calls()[0];
        assert!(call.authenticated);
        assert_eq!(call.query, vec![("currency".to_string(), "XBT".to_string())]);
    }

    #[tokio::test]
    async fn test_rejected_credentials_surface_as_auth_error() {
        let mock = MockRest::new();
        mock.respond_raw(
            "/api/v1/account-overview",
            401,
            r#"{"code":"400005","msg":"Invalid KC-API-SIGN"}"#,
        );
        let account = Account::new(&mock);
        let err = account.get_account_overview("XBT").await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(mock.calls().len(), 1);
    }
}
