// =============================================================================
// Binance market data — the queries the watcher needs from the exchange
// =============================================================================

pub mod client;

pub use client::BinanceClient;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::market_data::{Candle, TickerStat};
use crate::types::SymbolConfig;

/// Read-only market data source used by the watch list and the scheduler.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// 24h ticker statistics of every pair quoted in the configured asset.
    async fn fetch_ticker_stats(&self) -> Result<Vec<TickerStat>, FetchError>;

    /// The latest closed candle of `config.symbol`, per the pick policy.
    async fn fetch_latest_candle(&self, config: &SymbolConfig) -> Result<Candle, FetchError>;
}
