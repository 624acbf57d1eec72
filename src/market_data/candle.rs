use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLC candle as returned by the klines endpoint. Fresh on every
/// fetch and dropped after analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(open_time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
        }
    }

    /// Build a candle from a Binance millisecond open time. Out-of-range
    /// timestamps fall back to the Unix epoch.
    pub fn from_millis(open_time_ms: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        let open_time = Utc
            .timestamp_millis_opt(open_time_ms)
            .single()
            .unwrap_or_default();
        Self::new(open_time, open, high, low, close)
    }

    /// Top of the candle body.
    pub fn body_top(&self) -> f64 {
        self.open.max(self.close)
    }

    /// Bottom of the candle body.
    pub fn body_bottom(&self) -> f64 {
        self.open.min(self.close)
    }
}

/// 24h ticker statistics for one symbol, reduced to what ranking needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerStat {
    pub symbol: String,
    pub quote_volume: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_millis_converts_to_utc() {
        let c = Candle::from_millis(1_700_000_000_000, 1.0, 2.0, 0.5, 1.5);
        assert_eq!(c.open_time.timestamp(), 1_700_000_000);
        assert_eq!(c.body_top(), 1.5);
        assert_eq!(c.body_bottom(), 1.0);
    }
}
