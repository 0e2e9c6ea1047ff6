//! Topic names for the KuMex streaming API

pub fn ticker(symbol: &str) -> String {
    format!("/contractMarket/ticker:{}", symbol)
}

/// Level 2 order book deltas
pub fn level2(symbol: &str) -> String {
    format!("/contractMarket/level2:{}", symbol)
}

/// Public trade executions
pub fn execution(symbol: &str) -> String {
    format!("/contractMarket/execution:{}", symbol)
}

/// Private order lifecycle updates for the authenticated account
pub const TRADE_ORDERS: &str = "/contractMarket/tradeOrders";

/// Whether `topic` must be requested over a private channel
pub fn is_private(topic: &str) -> bool {
    topic == TRADE_ORDERS || topic.starts_with("/contractAccount/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        assert_eq!(ticker("XBTUSDM"), "/contractMarket/ticker:XBTUSDM");
        assert_eq!(level2("XBTUSDM"), "/contractMarket/level2:XBTUSDM");
        assert_eq!(execution("ETHUSDTM"), "/contractMarket/execution:ETHUSDTM");
    }

    #[test]
    fn test_private_topics() {
        assert!(is_private(TRADE_ORDERS));
        assert!(is_private("/contractAccount/wallet"));
        assert!(!is_private(&ticker("XBTUSDM")));
    }
}
