// =============================================================================
// Watch List — the symbols sampled every cycle
// =============================================================================
//
// Fixed mode holds one configured pair forever.  Top-volume mode re-ranks the
// exchange's pairs by 24h quote volume once per refresh interval and replaces
// the whole list at once; a failed refresh keeps the previous list.
//
// While the ticker endpoint keeps failing the retry delay doubles, up to
// MAX_RETRY_DOUBLINGS times, and only the first failure of a streak raises a
// critical alert.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::binance::client::rank_by_quote_volume;
use crate::binance::MarketData;
use crate::error::FetchError;
use crate::notifier::{MessageSink, Notifier};
use crate::runtime_config::RuntimeConfig;
use crate::types::{SymbolConfig, WatchMode};

/// Cap on retry-delay doublings: 60s grows to at most 32 minutes.
const MAX_RETRY_DOUBLINGS: u32 = 5;

/// Immutable snapshot of the watched symbols. Cloning is cheap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchList(Arc<Vec<SymbolConfig>>);

impl WatchList {
    pub fn new(entries: Vec<SymbolConfig>) -> Self {
        Self(Arc::new(entries))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SymbolConfig> {
        self.0.iter()
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.0.iter().map(|c| c.symbol.as_str()).collect()
    }

    /// Whether two snapshots are the very same allocation.
    #[cfg(test)]
    pub fn same_snapshot(&self, other: &WatchList) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Settings for rebuilding the top-volume list.
#[derive(Debug, Clone)]
struct RankingSpec {
    top_n: usize,
    interval: String,
    limit: u32,
    refresh_interval: Duration,
    retry_after: Duration,
}

#[derive(Debug)]
enum Source {
    Fixed,
    TopVolume(RankingSpec),
}

/// Owner of the current watch list and its refresh bookkeeping.
#[derive(Debug)]
pub struct WatchListManager {
    source: Source,
    current: WatchList,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    failure_streak: u32,
}

impl WatchListManager {
    /// A constant single-entry list.
    pub fn fixed(entry: SymbolConfig) -> Self {
        Self {
            source: Source::Fixed,
            current: WatchList::new(vec![entry]),
            last_success: None,
            last_failure: None,
            failure_streak: 0,
        }
    }

    /// An initially empty list refreshed from the ticker ranking.
    pub fn top_volume(
        top_n: usize,
        interval: impl Into<String>,
        limit: u32,
        refresh_interval: Duration,
        retry_after: Duration,
    ) -> Self {
        Self {
            source: Source::TopVolume(RankingSpec {
                top_n,
                interval: interval.into(),
                limit,
                refresh_interval,
                retry_after,
            }),
            current: WatchList::default(),
            last_success: None,
            last_failure: None,
            failure_streak: 0,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        match config.mode {
            WatchMode::Fixed => Self::fixed(config.symbol_config(config.symbol.clone())),
            WatchMode::TopVolume => Self::top_volume(
                config.top_n,
                config.interval.clone(),
                config.limit,
                Duration::hours(config.refresh_interval_hours as i64),
                Duration::seconds(config.refresh_retry_secs as i64),
            ),
        }
    }

    /// The list as of the last refresh, without touching the network.
    pub fn current(&self) -> WatchList {
        self.current.clone()
    }

    #[cfg(test)]
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    /// Delay before the next attempt after `failure_streak` failures in a row.
    fn retry_delay(&self, spec: &RankingSpec) -> Duration {
        let doublings = self.failure_streak.saturating_sub(1).min(MAX_RETRY_DOUBLINGS);
        spec.retry_after * (1i32 << doublings)
    }

    /// Whether a refresh should run at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let Source::TopVolume(spec) = &self.source else {
            return false;
        };
        if let Some(failed_at) = self.last_failure {
            if now - failed_at < self.retry_delay(spec) {
                return false;
            }
        }
        match self.last_success {
            None => true,
            Some(at) => now - at >= spec.refresh_interval,
        }
    }

    /// Return the current list, rebuilding it first when due.
    ///
    /// On failure the previous list is kept and a critical alert is sent.
    pub async fn refresh_if_due<M, S>(
        &mut self,
        now: DateTime<Utc>,
        market: &M,
        notifier: &Notifier<S>,
    ) -> WatchList
    where
        M: MarketData + ?Sized,
        S: MessageSink,
    {
        if !self.is_due(now) {
            return self.current();
        }
        let Source::TopVolume(spec) = &self.source else {
            return self.current();
        };

        info!(top_n = spec.top_n, "🔁 refreshing top symbols by quote volume");

        match Self::build(spec, market).await {
            Ok(list) => {
                info!(
                    count = list.len(),
                    symbols = ?list.symbols(),
                    failed_attempts = self.failure_streak,
                    "✅ watch list updated"
                );
                self.current = list;
                self.last_success = Some(now);
                self.last_failure = None;
                self.failure_streak = 0;
            }
            Err(e) => {
                self.failure_streak = self.failure_streak.saturating_add(1);
                self.last_failure = Some(now);
                warn!(
                    error = %e,
                    kept = self.current.len(),
                    streak = self.failure_streak,
                    retry_in_secs = self.retry_delay(spec).num_seconds(),
                    "watch list refresh failed, keeping previous list"
                );
                if self.failure_streak == 1 {
                    notifier
                        .send_alert(&format!("Failed to fetch top symbols:\n```\n{e}\n```"), true)
                        .await;
                }
            }
        }

        self.current()
    }

    async fn build<M: MarketData + ?Sized>(
        spec: &RankingSpec,
        market: &M,
    ) -> Result<WatchList, FetchError> {
        let stats = market.fetch_ticker_stats().await?;
        let ranked = rank_by_quote_volume(stats, spec.top_n);
        if ranked.is_empty() {
            return Err(FetchError::Malformed(
                "no symbol matched the quote filter".into(),
            ));
        }
        Ok(WatchList::new(
            ranked
                .into_iter()
                .map(|t| SymbolConfig::new(t.symbol, spec.interval.clone(), spec.limit))
                .collect(),
        ))
    }
}
