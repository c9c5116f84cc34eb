pub mod yahoo;

pub use yahoo::YahooClient;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{HistoryRange, HistorySeries, RawInfoRecord};

/// Narrow view of the upstream market-data provider.
///
/// Unknown symbols come back as an empty record or empty series rather than
/// an error; deciding "not found" is left to the caller.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_info(&self, ticker: &str) -> Result<RawInfoRecord>;

    async fn fetch_history(&self, ticker: &str, range: &HistoryRange) -> Result<HistorySeries>;
}
