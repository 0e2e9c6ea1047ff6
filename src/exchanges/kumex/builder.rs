use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    ReqwestRest, RestClient, RestClientBuilder, RestClientConfig, TungsteniteConnector, WsConfig,
    WsConnector,
};
use crate::exchanges::kumex::connector::{KumexConnector, RestFactory};
use crate::exchanges::kumex::signer::KumexSigner;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating KuMex connectors
#[derive(Debug, Clone)]
pub struct KumexBuilder {
    config: ExchangeConfig,
    rest_timeout: u64,
    ws_config: WsConfig,
}

impl Default for KumexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KumexBuilder {
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig::read_only(),
            rest_timeout: 30,
            ws_config: WsConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExchangeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_credentials(
        mut self,
        api_key: String,
        secret_key: String,
        passphrase: String,
    ) -> Self {
        let sandbox = self.config.sandbox;
        let base_url = self.config.base_url.take();
        self.config = ExchangeConfig::new(api_key, secret_key, passphrase).sandbox(sandbox);
        self.config.base_url = base_url;
        self
    }

    pub fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.config.sandbox = sandbox;
        self
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.config.base_url = Some(base_url);
        self
    }

    /// Default REST timeout in seconds
    pub fn with_rest_timeout(mut self, timeout: u64) -> Self {
        self.rest_timeout = timeout;
        self
    }

    pub fn with_ws_config(mut self, ws_config: WsConfig) -> Self {
        self.ws_config = ws_config;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.ws_config = self.ws_config.with_max_reconnect_attempts(attempts);
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.ws_config = self.ws_config.with_reconnect_delay(delay);
        self
    }

    pub fn rest_config(&self) -> RestClientConfig {
        RestClientConfig::new(self.config.rest_base_url(), "kumex".to_string())
            .with_timeout(self.rest_timeout)
    }

    /// Build a connector on reqwest and tungstenite
    ///
    /// Requests are signed only when all three credentials are present.
    pub fn build(self) -> KumexConnector<ReqwestRest, TungsteniteConnector> {
        let rest_config = self.rest_config();
        let signer = self.config.has_credentials().then(|| {
            Arc::new(KumexSigner::new(
                self.config.api_key().to_string(),
                self.config.secret_key().to_string(),
                self.config.passphrase().to_string(),
            ))
        });

        let rest_factory: RestFactory<ReqwestRest> = Arc::new(move || {
            let mut builder = RestClientBuilder::new(rest_config.clone());
            if let Some(signer) = &signer {
                builder = builder.with_signer(signer.clone());
            }
            builder.build()
        });
        let connector = TungsteniteConnector::new("kumex".to_string())
            .with_connect_timeout(self.ws_config.connect_timeout());

        KumexConnector::new(rest_factory, Arc::new(connector), self.ws_config)
    }

    /// Build a connector on caller-supplied transports
    pub fn build_with<R, C>(self, rest_factory: RestFactory<R>, connector: Arc<C>) -> KumexConnector<R, C>
    where
        R: RestClient + Clone + 'static,
        C: WsConnector,
    {
        KumexConnector::new(rest_factory, connector, self.ws_config)
    }
}

/// Convenience function to build a connector from a configuration
pub fn build_connector(config: ExchangeConfig) -> KumexConnector {
    KumexBuilder::new().with_config(config).build()
}

pub fn build_connector_from_env() -> Result<KumexConnector, ExchangeError> {
    let config = ExchangeConfig::from_env("KUMEX")?;
    Ok(build_connector(config))
}
