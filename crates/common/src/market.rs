use async_trait::async_trait;

use crate::{Bar, Result};

/// REST side of the market-data provider.
///
/// `PolygonRest` in `crates/engine` implements this for production.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Ranked candidate symbols priced at or below `max_price`, at most `limit`.
    async fn candidates(&self, max_price: f64, limit: usize) -> Result<Vec<String>>;

    /// Most recent one-minute bars for `symbol`, oldest first.
    async fn minute_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>>;
}
