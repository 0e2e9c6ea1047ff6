use kumex_connector::core::config::ExchangeConfig;
use kumex_connector::exchanges::kumex::{topics, AccountSource, MarketDataSource, MessageKind};
use kumex_connector::KumexBuilder;
use std::sync::Arc;
use tracing::{error, info, warn};

const SYMBOL: &str = "XBTUSDM";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // credentials are optional; without them only public calls work
    let config = ExchangeConfig::from_env_file("KUMEX").unwrap_or_else(|e| {
        warn!("{}; continuing with public endpoints only", e);
        ExchangeConfig::read_only()
    });
    let authenticated = config.has_credentials();

    let mut kumex = KumexBuilder::new().with_config(config).build();
    kumex.setup()?;

    match kumex.get_current_mark_price(SYMBOL).await {
        Ok(mark) => info!(symbol = %mark.symbol, value = mark.value, "mark price"),
        Err(e) => error!("Error fetching mark price: {}", e),
    }

    if authenticated {
        match kumex.get_account_overview("XBT").await {
            Ok(overview) => info!(
                equity = overview.account_equity,
                available = overview.available_balance,
                "account overview"
            ),
            Err(e) => error!("Error fetching account overview: {}", e),
        }
    }

    if let Err(e) = kumex.connect_stream(false).await {
        error!("Stream did not come up: {}", e);
        kumex.release().await;
        return Ok(());
    }

    kumex
        .subscribe_market_ticker(
            SYMBOL,
            Arc::new(|kind, frame| {
                match kind {
                    MessageKind::Ack => info!(topic = %topics::ticker(SYMBOL), "ticker subscribed"),
                    MessageKind::Message => info!(
                        price = %frame["data"]["price"],
                        best_bid = %frame["data"]["bestBidPrice"],
                        best_ask = %frame["data"]["bestAskPrice"],
                        "ticker"
                    ),
                    _ => {}
                }
                Ok(())
            }),
        )
        .await?;

    info!("streaming; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    kumex.release().await;
    info!("released");
    Ok(())
}
