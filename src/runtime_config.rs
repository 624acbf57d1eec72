// =============================================================================
// Runtime Configuration — watcher settings from JSON + environment
// =============================================================================
//
// Every tunable of the watcher lives here.  Settings are read once at startup
// from an optional JSON file, then overridden by environment variables (a
// `.env` file is honoured through dotenv in main.rs).  All fields carry a
// serde default so a partial or empty file still loads.
//
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{CandlePick, ClassificationMode, SymbolConfig, TrendConvention, WatchMode};
use crate::wick_analyzer::AnalyzerSettings;

/// One year; larger values overflow the refresh clock arithmetic.
const MAX_REFRESH_INTERVAL_HOURS: u64 = 24 * 365;
const MAX_REFRESH_RETRY_SECS: u64 = 24 * 3600;
const MAX_UTC_OFFSET_HOURS: i32 = 14;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_excluded_quote() -> String {
    "BUSD".to_string()
}

fn default_top_n() -> usize {
    10
}

fn default_interval() -> String {
    "5m".to_string()
}

fn default_limit() -> u32 {
    2
}

fn default_refresh_interval_hours() -> u64 {
    24
}

fn default_refresh_retry_secs() -> u64 {
    60
}

fn default_threshold_pct() -> f64 {
    0.4
}

fn default_boundary_minutes() -> u32 {
    5
}

fn default_boundary_window_secs() -> u32 {
    3
}

fn default_idle_poll_secs() -> u64 {
    1
}

fn default_error_backoff_secs() -> u64 {
    10
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_notify_timeout_secs() -> u64 {
    10
}

fn default_display_utc_offset_hours() -> i32 {
    7
}

fn default_price_decimals() -> usize {
    8
}

fn default_binance_base_url() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration of the watcher.
#[derive(Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Watch list ---------------------------------------------------------

    /// Fixed single pair or top-N by quote volume.
    #[serde(default)]
    pub mode: WatchMode,

    /// The tracked pair in fixed mode.
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Quote currency a symbol must end with to enter the ranking.
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    /// Quote currency suffix that is always excluded from the ranking.
    #[serde(default = "default_excluded_quote")]
    pub excluded_quote: String,

    /// Size of the top-volume watch list.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Kline interval requested for every symbol.
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Number of klines requested per fetch.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Hours between two successful top-volume refreshes.
    #[serde(default = "default_refresh_interval_hours")]
    pub refresh_interval_hours: u64,

    /// Seconds to wait before retrying a failed refresh.
    #[serde(default = "default_refresh_retry_secs")]
    pub refresh_retry_secs: u64,

    // --- Analysis -----------------------------------------------------------

    /// Upper wick threshold, percent of the body top.
    #[serde(default = "default_threshold_pct")]
    pub upper_threshold_pct: f64,

    /// Lower wick threshold, percent of the low.
    #[serde(default = "default_threshold_pct")]
    pub lower_threshold_pct: f64,

    #[serde(default)]
    pub classification: ClassificationMode,

    #[serde(default)]
    pub trend_convention: TrendConvention,

    /// Which kline of the response is analysed.
    #[serde(default)]
    pub candle_pick: CandlePick,

    /// Report the high-low range as a percentage of the low.
    #[serde(default)]
    pub include_total_range: bool,

    // --- Scheduling ---------------------------------------------------------

    /// Sampling happens when minute-of-hour is a multiple of this value.
    #[serde(default = "default_boundary_minutes")]
    pub boundary_minutes: u32,

    /// Leading window (seconds past the boundary minute) that still counts
    /// as the boundary.
    #[serde(default = "default_boundary_window_secs")]
    pub boundary_window_secs: u32,

    #[serde(default = "default_idle_poll_secs")]
    pub idle_poll_secs: u64,

    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,

    // --- Transport ----------------------------------------------------------

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,

    #[serde(default = "default_binance_base_url")]
    pub binance_base_url: String,

    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,

    #[serde(default)]
    pub telegram_bot_token: Option<String>,

    #[serde(default)]
    pub telegram_chat_id: Option<String>,

    // --- Presentation -------------------------------------------------------

    /// Fixed UTC offset used for timestamps in messages.
    #[serde(default = "default_display_utc_offset_hours")]
    pub display_utc_offset_hours: i32,

    /// Decimal places for prices in messages.
    #[serde(default = "default_price_decimals")]
    pub price_decimals: usize,

    /// Send a critical alert when a candle fetch fails (the fixed-pair bot
    /// does this; the top-volume bot only logs).
    #[serde(default)]
    pub alert_on_candle_error: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::top_volume()
    }
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("mode", &self.mode)
            .field("symbol", &self.symbol)
            .field("top_n", &self.top_n)
            .field("interval", &self.interval)
            .field("limit", &self.limit)
            .field("upper_threshold_pct", &self.upper_threshold_pct)
            .field("lower_threshold_pct", &self.lower_threshold_pct)
            .field("classification", &self.classification)
            .field("trend_convention", &self.trend_convention)
            .field("candle_pick", &self.candle_pick)
            .field("telegram_bot_token", &self.telegram_bot_token.as_ref().map(|_| "<redacted>"))
            .field("telegram_chat_id", &self.telegram_chat_id)
            .finish_non_exhaustive()
    }
}

impl RuntimeConfig {
    /// Settings of the top-volume bot: top 10 USDT pairs, 0.4% on either
    /// wick with the lower wick taking priority, LONG/SHORT tags.
    pub fn top_volume() -> Self {
        Self {
            mode: WatchMode::TopVolume,
            symbol: default_symbol(),
            quote_asset: default_quote_asset(),
            excluded_quote: default_excluded_quote(),
            top_n: default_top_n(),
            interval: default_interval(),
            limit: default_limit(),
            refresh_interval_hours: default_refresh_interval_hours(),
            refresh_retry_secs: default_refresh_retry_secs(),
            upper_threshold_pct: default_threshold_pct(),
            lower_threshold_pct: default_threshold_pct(),
            classification: ClassificationMode::Priority,
            trend_convention: TrendConvention::WickBias,
            candle_pick: CandlePick::Last,
            include_total_range: false,
            boundary_minutes: default_boundary_minutes(),
            boundary_window_secs: default_boundary_window_secs(),
            idle_poll_secs: default_idle_poll_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            notify_timeout_secs: default_notify_timeout_secs(),
            binance_base_url: default_binance_base_url(),
            telegram_api_url: default_telegram_api_url(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            display_utc_offset_hours: default_display_utc_offset_hours(),
            price_decimals: default_price_decimals(),
            alert_on_candle_error: false,
        }
    }

    /// Settings of the BTCUSDT bot: exclusive 0.22% / 0.29% thresholds on
    /// the last closed candle, body-based trend, total range reported.
    pub fn fixed_btc() -> Self {
        Self {
            mode: WatchMode::Fixed,
            upper_threshold_pct: 0.22,
            lower_threshold_pct: 0.29,
            classification: ClassificationMode::Exclusive,
            trend_convention: TrendConvention::Body,
            candle_pick: CandlePick::SecondToLast,
            include_total_range: true,
            boundary_window_secs: 5,
            http_timeout_secs: 30,
            notify_timeout_secs: 5,
            price_decimals: 2,
            alert_on_candle_error: true,
            ..Self::top_volume()
        }
    }

    /// One of the named presets: `top_volume` or `fixed_btc`.
    pub fn preset(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "top_volume" | "top10" => Ok(Self::top_volume()),
            "fixed_btc" | "btc" => Ok(Self::fixed_btc()),
            other => bail!("unknown preset '{other}' (expected top_volume or fixed_btc)"),
        }
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            mode = %config.mode,
            "config loaded"
        );

        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = Some(v);
        }
        if let Some(v) = get("TELEGRAM_CHAT_ID") {
            self.telegram_chat_id = Some(v);
        }
        if let Some(v) = get("WICK_WATCH_MODE") {
            self.mode = v.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(v) = get("WICK_WATCH_SYMBOL") {
            self.symbol = v.to_uppercase();
        }
        if let Some(v) = get("WICK_WATCH_TOP_N") {
            self.top_n = v
                .parse()
                .with_context(|| format!("WICK_WATCH_TOP_N is not a count: {v}"))?;
        }
        if let Some(v) = get("WICK_WATCH_UPPER_PCT") {
            self.upper_threshold_pct = v
                .parse()
                .with_context(|| format!("WICK_WATCH_UPPER_PCT is not a number: {v}"))?;
        }
        if let Some(v) = get("WICK_WATCH_LOWER_PCT") {
            self.lower_threshold_pct = v
                .parse()
                .with_context(|| format!("WICK_WATCH_LOWER_PCT is not a number: {v}"))?;
        }
        if let Some(v) = get("WICK_WATCH_INTERVAL") {
            self.interval = v;
        }
        if let Some(v) = get("WICK_WATCH_CLASSIFICATION") {
            self.classification = v.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(v) = get("WICK_WATCH_CANDLE_PICK") {
            self.candle_pick = v.parse().map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }

    /// Reject settings the scheduler or analyzer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.upper_threshold_pct > 0.0 && self.lower_threshold_pct > 0.0) {
            bail!(
                "wick thresholds must be positive (upper={}, lower={})",
                self.upper_threshold_pct,
                self.lower_threshold_pct
            );
        }
        if self.mode == WatchMode::TopVolume && self.top_n == 0 {
            bail!("top_n must be at least 1");
        }
        if self.mode == WatchMode::Fixed && self.symbol.trim().is_empty() {
            bail!("fixed mode needs a symbol");
        }
        if self.boundary_minutes == 0 || 60 % self.boundary_minutes != 0 {
            bail!("boundary_minutes must divide 60, got {}", self.boundary_minutes);
        }
        if self.boundary_window_secs == 0 || self.boundary_window_secs >= 60 {
            bail!("boundary_window_secs must be in 1..60, got {}", self.boundary_window_secs);
        }
        let needed = self.candle_pick.offset_from_end() as u32 + 1;
        if self.limit < needed {
            bail!(
                "limit {} is too small for candle pick {:?} (needs {})",
                self.limit,
                self.candle_pick,
                needed
            );
        }
        if !(1..=MAX_REFRESH_INTERVAL_HOURS).contains(&self.refresh_interval_hours) {
            bail!(
                "refresh_interval_hours must be in 1..={MAX_REFRESH_INTERVAL_HOURS}, got {}",
                self.refresh_interval_hours
            );
        }
        if !(1..=MAX_REFRESH_RETRY_SECS).contains(&self.refresh_retry_secs) {
            bail!(
                "refresh_retry_secs must be in 1..={MAX_REFRESH_RETRY_SECS}, got {}",
                self.refresh_retry_secs
            );
        }
        if self.display_utc_offset_hours.abs() > MAX_UTC_OFFSET_HOURS {
            bail!(
                "display_utc_offset_hours must be within ±{MAX_UTC_OFFSET_HOURS}, got {}",
                self.display_utc_offset_hours
            );
        }
        self.display_offset()?;
        if self.telegram_bot_token.is_none() || self.telegram_chat_id.is_none() {
            warn!("TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID missing; notifications will only be logged");
        }
        Ok(())
    }

    /// Timezone used when rendering timestamps for humans.
    pub fn display_offset(&self) -> Result<FixedOffset> {
        self.display_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .with_context(|| {
                format!(
                    "display_utc_offset_hours out of range: {}",
                    self.display_utc_offset_hours
                )
            })
    }

    /// Threshold and policy settings handed to the analyzer.
    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            upper_threshold_pct: self.upper_threshold_pct,
            lower_threshold_pct: self.lower_threshold_pct,
            mode: self.classification,
            trend_convention: self.trend_convention,
            include_total_range: self.include_total_range,
        }
    }

    /// Watch-list entry for `symbol` with the configured interval and limit.
    pub fn symbol_config(&self, symbol: impl Into<String>) -> SymbolConfig {
        SymbolConfig::new(symbol, self.interval.clone(), self.limit)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_top_volume_bot() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.mode, WatchMode::TopVolume);
        assert_eq!(cfg.top_n, 10);
        assert_eq!(cfg.interval, "5m");
        assert_eq!(cfg.limit, 2);
        assert_eq!(cfg.classification, ClassificationMode::Priority);
        assert_eq!(cfg.candle_pick, CandlePick::Last);
        assert_eq!(cfg.boundary_minutes, 5);
        assert_eq!(cfg.error_backoff_secs, 10);
        assert!((cfg.lower_threshold_pct - 0.4).abs() < f64::EPSILON);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn fixed_preset_matches_btc_bot() {
        let cfg = RuntimeConfig::fixed_btc();
        assert_eq!(cfg.mode, WatchMode::Fixed);
        assert_eq!(cfg.symbol, "BTCUSDT");
        assert_eq!(cfg.classification, ClassificationMode::Exclusive);
        assert_eq!(cfg.trend_convention, TrendConvention::Body);
        assert_eq!(cfg.candle_pick, CandlePick::SecondToLast);
        assert!(cfg.include_total_range);
        assert!(cfg.alert_on_candle_error);
        assert!((cfg.upper_threshold_pct - 0.22).abs() < f64::EPSILON);
        assert!((cfg.lower_threshold_pct - 0.29).abs() < f64::EPSILON);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn presets_by_name() {
        assert_eq!(RuntimeConfig::preset("fixed_btc").unwrap().mode, WatchMode::Fixed);
        assert_eq!(RuntimeConfig::preset(" TOP_VOLUME ").unwrap().mode, WatchMode::TopVolume);
        assert!(RuntimeConfig::preset("scalper").is_err());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.mode, WatchMode::TopVolume);
        assert_eq!(cfg.quote_asset, "USDT");
        assert_eq!(cfg.excluded_quote, "BUSD");
        assert_eq!(cfg.binance_base_url, "https://fapi.binance.com");
        assert!(cfg.telegram_bot_token.is_none());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "mode": "fixed", "symbol": "ETHUSDT", "candle_pick": "second_to_last" }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.mode, WatchMode::Fixed);
        assert_eq!(cfg.symbol, "ETHUSDT");
        assert_eq!(cfg.candle_pick, CandlePick::SecondToLast);
        assert_eq!(cfg.top_n, 10);
    }

    #[test]
    fn env_overrides_replace_values() {
        let env: HashMap<&str, &str> = [
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-100"),
            ("WICK_WATCH_MODE", "fixed"),
            ("WICK_WATCH_SYMBOL", "solusdt"),
            ("WICK_WATCH_LOWER_PCT", "0.5"),
            ("WICK_WATCH_CLASSIFICATION", "exclusive"),
            ("WICK_WATCH_TOP_N", "  "),
        ]
        .into_iter()
        .collect();

        let mut cfg = RuntimeConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(cfg.telegram_bot_token.as_deref(), Some("123:abc"));
        assert_eq!(cfg.telegram_chat_id.as_deref(), Some("-100"));
        assert_eq!(cfg.mode, WatchMode::Fixed);
        assert_eq!(cfg.symbol, "SOLUSDT");
        assert!((cfg.lower_threshold_pct - 0.5).abs() < f64::EPSILON);
        assert_eq!(cfg.classification, ClassificationMode::Exclusive);
        assert_eq!(cfg.top_n, 10, "blank values are ignored");
    }

    #[test]
    fn env_override_with_bad_number_fails() {
        let mut cfg = RuntimeConfig::default();
        let err = cfg
            .apply_overrides(|k| (k == "WICK_WATCH_UPPER_PCT").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("WICK_WATCH_UPPER_PCT"));
    }

    #[test]
    fn validate_rejects_bad_settings() {
        let mut cfg = RuntimeConfig::default();
        cfg.boundary_minutes = 7;
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.candle_pick = CandlePick::SecondToLast;
        cfg.limit = 1;
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.top_n = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.upper_threshold_pct = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.display_utc_offset_hours = 30;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_bounds_time_settings() {
        let mut cfg = RuntimeConfig::default();
        cfg.refresh_interval_hours = u64::MAX;
        assert!(cfg.validate().is_err());
        cfg.refresh_interval_hours = 24 * 365 + 1;
        assert!(cfg.validate().is_err());
        cfg.refresh_interval_hours = 24 * 365;
        assert!(cfg.validate().is_ok());

        let mut cfg = RuntimeConfig::default();
        cfg.refresh_retry_secs = 0;
        assert!(cfg.validate().is_err());
        cfg.refresh_retry_secs = u64::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.display_utc_offset_hours = i32::MAX;
        assert!(cfg.validate().is_err());
        assert!(cfg.display_offset().is_err(), "no overflow panic");
        cfg.display_utc_offset_hours = -14;
        assert!(cfg.validate().is_ok());
        cfg.display_utc_offset_hours = 15;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_output_redacts_token() {
        let mut cfg = RuntimeConfig::default();
        cfg.telegram_bot_token = Some("secret-token".into());
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("secret-token"));
        assert!(dbg.contains("<redacted>"));
    }
}
