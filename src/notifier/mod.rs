// =============================================================================
// Notifier — formats analysis results and alerts, delivers them best-effort
// =============================================================================
//
// Delivery failures are logged here and never returned: a missed message must
// not disturb the polling loop.
// =============================================================================

pub mod telegram;

pub use telegram::TelegramClient;

use async_trait::async_trait;
use chrono::FixedOffset;
use tracing::{error, info};

use crate::error::DeliveryError;
use crate::market_data::Candle;
use crate::wick_analyzer::AnalysisResult;

const SEPARATOR: &str = "━━━━━━━━━━━━━━";
const CRITICAL_PREFIX: &str = "🚨 *CRITICAL ALERT* 🚨\n";
const WARNING_PREFIX: &str = "⚠️ *ALERT* ⚠️\n";

/// Transport that puts a text message in front of a human.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<(), DeliveryError>;
}

/// Best-effort delivery of classifications and operational alerts.
#[derive(Debug)]
pub struct Notifier<S> {
    sink: S,
    display_tz: FixedOffset,
    price_decimals: usize,
}

impl<S: MessageSink> Notifier<S> {
    pub fn new(sink: S, display_tz: FixedOffset, price_decimals: usize) -> Self {
        Self {
            sink,
            display_tz,
            price_decimals,
        }
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Send a classification message. Neutral results are never sent.
    ///
    /// Returns `true` when the message was handed to the transport without
    /// error.
    pub async fn send_classification(
        &self,
        symbol: &str,
        candle: &Candle,
        result: &AnalysisResult,
    ) -> bool {
        if result.is_neutral() {
            return false;
        }

        let text = format_classification(
            symbol,
            candle,
            result,
            self.display_tz,
            self.price_decimals,
        );

        match self.sink.send_text(&text).await {
            Ok(()) => {
                info!(symbol, wick = %result.wick_type, "📱 classification sent");
                true
            }
            Err(e) => {
                error!(symbol, error = %e, "📱 failed to send classification");
                false
            }
        }
    }

    /// Send an operational alert. Critical alerts carry a distinct header.
    pub async fn send_alert(&self, message: &str, critical: bool) -> bool {
        let text = format_alert(message, critical);

        match self.sink.send_text(&text).await {
            Ok(()) => {
                info!(critical, "📱 alert sent");
                true
            }
            Err(e) => {
                error!(critical, error = %e, "📱 failed to send alert");
                false
            }
        }
    }
}

/// Render the alert text with its severity header.
pub fn format_alert(message: &str, critical: bool) -> String {
    let prefix = if critical { CRITICAL_PREFIX } else { WARNING_PREFIX };
    format!("{prefix}{message}")
}

/// Render the Markdown message for a non-neutral classification.
pub fn format_classification(
    symbol: &str,
    candle: &Candle,
    result: &AnalysisResult,
    display_tz: FixedOffset,
    price_decimals: usize,
) -> String {
    let when = candle
        .open_time
        .with_timezone(&display_tz)
        .format("%Y-%m-%d %H:%M:%S %:z");

    let mut msg = format!(
        "📊 *{symbol} - {wick} candle* at {when}\n\
        {SEPARATOR}\n\
        📈 Open: {open:.p$}\n\
        📉 Close: {close:.p$}\n\
        🔺 High: {high:.p$}\n\
        🔻 Low: {low:.p$}\n\
        {SEPARATOR}\n",
        wick = result.wick_type,
        open = result.open,
        close = result.close,
        high = result.high,
        low = result.low,
        p = price_decimals,
    );

    if let Some(range) = result.total_range_pct {
        msg.push_str(&format!("📏 Range: {range:.4}%\n"));
    }

    msg.push_str(&format!(
        "🔼 Upper wick: {:.4}%\n\
        🔽 Lower wick: {:.4}%\n\
        🎯 Trend: {}",
        result.upper_wick_pct, result.lower_wick_pct, result.trend
    ));

    msg
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Trend, WickType};
    use std::sync::Mutex;

    /// In-memory sink that records every message and can be told to fail.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub sent: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn messages(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send_text(&self, text: &str) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(text.to_string());
            if self.fail {
                Err(DeliveryError::Rejected {
                    status: 502,
                    body: "bad gateway".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn vn() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn candle() -> Candle {
        // 2023-11-14 22:13:20 UTC
        Candle::from_millis(1_700_000_000_000, 100.0, 100.0, 98.5, 99.0)
    }

    fn result(wick_type: WickType, total_range_pct: Option<f64>) -> AnalysisResult {
        AnalysisResult {
            wick_type,
            open: 100.0,
            high: 100.0,
            low: 98.5,
            close: 99.0,
            upper_wick_pct: 0.0,
            lower_wick_pct: 0.50761,
            total_range_pct,
            trend: Trend::Long,
        }
    }

    #[test]
    fn classification_message_uses_display_timezone() {
        let text = format_classification("BTCUSDT", &candle(), &result(WickType::LowerWick, None), vn(), 2);
        assert!(text.starts_with("📊 *BTCUSDT - LOWER WICK candle* at 2023-11-15 05:13:20 +07:00"));
        assert!(text.contains("📈 Open: 100.00"));
        assert!(text.contains("🔻 Low: 98.50"));
        assert!(text.contains("🔽 Lower wick: 0.5076%"));
        assert!(text.contains("🔼 Upper wick: 0.0000%"));
        assert!(text.ends_with("🎯 Trend: LONG"));
        assert!(!text.contains("Range"));
    }

    #[test]
    fn classification_message_includes_range_when_present() {
        let text = format_classification("BTCUSDT", &candle(), &result(WickType::LowerWick, Some(1.5228)), vn(), 8);
        assert!(text.contains("📏 Range: 1.5228%"));
        assert!(text.contains("📉 Close: 99.00000000"));
    }

    #[test]
    fn alert_prefixes_differ_by_severity() {
        assert!(format_alert("boom", true).starts_with("🚨 *CRITICAL ALERT* 🚨\nboom"));
        assert!(format_alert("hello", false).starts_with("⚠️ *ALERT* ⚠️\nhello"));
    }

    #[tokio::test]
    async fn neutral_result_is_never_sent() {
        let notifier = Notifier::new(RecordingSink::default(), vn(), 2);
        let sent = notifier
            .send_classification("BTCUSDT", &candle(), &result(WickType::Neutral, None))
            .await;
        assert!(!sent);
        assert!(notifier.sink().messages().is_empty());
    }

    #[tokio::test]
    async fn non_neutral_result_is_delivered() {
        let notifier = Notifier::new(RecordingSink::default(), vn(), 2);
        let sent = notifier
            .send_classification("ETHUSDT", &candle(), &result(WickType::UpperWick, None))
            .await;
        assert!(sent);
        let msgs = notifier.sink().messages();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("ETHUSDT - UPPER WICK"));
    }

    #[tokio::test]
    async fn delivery_failures_are_swallowed() {
        let notifier = Notifier::new(RecordingSink::failing(), vn(), 2);
        assert!(
            !notifier
                .send_classification("BTCUSDT", &candle(), &result(WickType::LowerWick, None))
                .await
        );
        assert!(!notifier.send_alert("fetch failed", true).await);
        assert_eq!(notifier.sink().messages().len(), 2);
    }
}
