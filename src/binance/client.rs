// =============================================================================
// Binance Futures REST client — public market data only
// =============================================================================
//
// Two unsigned endpoints are used:
//
//   GET /fapi/v1/ticker/24hr   24h stats for every symbol (watch-list ranking)
//   GET /fapi/v1/klines        recent candles for one symbol
//
// Every request is bounded by the reqwest client timeout so a stalled
// exchange delays the scheduler but never hangs it.
// =============================================================================

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::binance::MarketData;
use crate::error::FetchError;
use crate::market_data::{Candle, TickerStat};
use crate::runtime_config::RuntimeConfig;
use crate::types::{CandlePick, SymbolConfig};

const TICKER_24H_PATH: &str = "/fapi/v1/ticker/24hr";
const KLINES_PATH: &str = "/fapi/v1/klines";

/// Binance USDⓈ-M futures client for public market data.
#[derive(Debug, Clone)]
pub struct BinanceClient {
    base_url: String,
    quote_asset: String,
    excluded_quote: String,
    candle_pick: CandlePick,
    client: reqwest::Client,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Build a client from the runtime configuration.
    pub fn new(config: &RuntimeConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .context("failed to build reqwest client for BinanceClient")?;

        debug!(base_url = %config.binance_base_url, "BinanceClient initialised");

        Ok(Self {
            base_url: config.binance_base_url.trim_end_matches('/').to_string(),
            quote_asset: config.quote_asset.clone(),
            excluded_quote: config.excluded_quote.clone(),
            candle_pick: config.candle_pick,
            client,
        })
    }

    /// Send a GET and return the parsed JSON body of a 2xx response.
    async fn get_json(
        &self,
        endpoint: &'static str,
        query: &[(&str, String)],
    ) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let resp = self.client.get(&url).query(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json::<Value>().await?)
    }
}

#[async_trait]
impl MarketData for BinanceClient {
    /// GET /fapi/v1/ticker/24hr, filtered to the configured quote asset.
    #[instrument(skip(self), name = "binance::fetch_ticker_stats")]
    async fn fetch_ticker_stats(&self) -> Result<Vec<TickerStat>, FetchError> {
        let body = self.get_json(TICKER_24H_PATH, &[]).await?;
        let stats = parse_ticker_stats(&body)?;
        let stats = filter_quote_pairs(stats, &self.quote_asset, &self.excluded_quote);

        debug!(count = stats.len(), quote = %self.quote_asset, "ticker stats fetched");
        Ok(stats)
    }

    /// GET /fapi/v1/klines for one symbol.
    ///
    /// Array indices of each row:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5..] ignored
    #[instrument(skip(self, config), fields(symbol = %config.symbol), name = "binance::fetch_latest_candle")]
    async fn fetch_latest_candle(&self, config: &SymbolConfig) -> Result<Candle, FetchError> {
        let query = [
            ("symbol", config.symbol.clone()),
            ("interval", config.interval.clone()),
            ("limit", config.limit.to_string()),
        ];
        let body = self.get_json(KLINES_PATH, &query).await?;

        let rows = body
            .as_array()
            .ok_or_else(|| FetchError::Malformed("klines response is not an array".into()))?;

        let candle = select_candle(rows, self.candle_pick)?;
        debug!(
            open_time = %candle.open_time,
            rows = rows.len(),
            "kline fetched"
        );
        Ok(candle)
    }
}

// -----------------------------------------------------------------------------
// Parsing helpers
// -----------------------------------------------------------------------------

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &Value, name: &str) -> Result<f64, FetchError> {
    match val {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| FetchError::Malformed(format!("failed to parse {name} '{s}' as f64"))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| FetchError::Malformed(format!("{name} is not a valid f64"))),
        other => Err(FetchError::Malformed(format!(
            "expected string or number for {name}, got: {other}"
        ))),
    }
}

/// Parse one kline row `[openTime, open, high, low, close, ...]`.
pub fn parse_kline_row(row: &Value) -> Result<Candle, FetchError> {
    let arr = row
        .as_array()
        .ok_or_else(|| FetchError::Malformed("kline entry is not an array".into()))?;

    if arr.len() < 5 {
        return Err(FetchError::Malformed(format!(
            "kline entry has {} elements, expected at least 5",
            arr.len()
        )));
    }

    let open_time = match &arr[0] {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| FetchError::Malformed(format!("bad kline open time: {}", arr[0])))?;

    Ok(Candle::from_millis(
        open_time,
        parse_str_f64(&arr[1], "open")?,
        parse_str_f64(&arr[2], "high")?,
        parse_str_f64(&arr[3], "low")?,
        parse_str_f64(&arr[4], "close")?,
    ))
}

/// Pick the candle designated by `pick` from the tail of `rows`.
pub fn select_candle(rows: &[Value], pick: CandlePick) -> Result<Candle, FetchError> {
    let offset = pick.offset_from_end();
    if rows.len() <= offset {
        return Err(FetchError::Malformed(format!(
            "klines response has {} rows, {:?} needs at least {}",
            rows.len(),
            pick,
            offset + 1
        )));
    }
    parse_kline_row(&rows[rows.len() - 1 - offset])
}

/// Parse the 24h ticker array. Entries with an unreadable volume are skipped.
pub fn parse_ticker_stats(body: &Value) -> Result<Vec<TickerStat>, FetchError> {
    let entries = body
        .as_array()
        .ok_or_else(|| FetchError::Malformed("ticker response is not an array".into()))?;

    let mut stats = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(symbol) = entry["symbol"].as_str() else {
            warn!("skipping ticker entry without symbol");
            continue;
        };
        match parse_str_f64(&entry["quoteVolume"], "quoteVolume") {
            Ok(quote_volume) if quote_volume.is_finite() => stats.push(TickerStat {
                symbol: symbol.to_string(),
                quote_volume,
            }),
            Ok(_) | Err(_) => {
                warn!(symbol, "skipping ticker entry with unreadable quoteVolume");
            }
        }
    }
    Ok(stats)
}

/// Keep pairs quoted in `quote`, dropping any ending in `excluded`.
pub fn filter_quote_pairs(stats: Vec<TickerStat>, quote: &str, excluded: &str) -> Vec<TickerStat> {
    stats
        .into_iter()
        .filter(|t| t.symbol.ends_with(quote))
        .filter(|t| excluded.is_empty() || !t.symbol.ends_with(excluded))
        .collect()
}

/// Sort by quote volume, highest first, and keep the top `n`.
pub fn rank_by_quote_volume(mut stats: Vec<TickerStat>, n: usize) -> Vec<TickerStat> {
    stats.sort_by(|a, b| b.quote_volume.total_cmp(&a.quote_volume));
    stats.truncate(n);
    stats
}
