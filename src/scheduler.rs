// =============================================================================
// Polling Scheduler — boundary-aligned sampling loop
// =============================================================================
//
// One cooperative loop drives everything:
//
//   IDLE ──► REFRESHING ──► (boundary?) ──► SAMPLING ──► sleep to next boundary
//     ▲            │                                         │
//     └── 1s poll ◄┘                                         ▼
//                                                          IDLE
//
// Any error or panic escaping a tick is caught here, reported as a critical
// alert, and followed by a fixed backoff (ERROR_BACKOFF) before the next tick.
// The loop never exits on its own.
// =============================================================================

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::Once;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use crate::binance::MarketData;
use crate::notifier::{MessageSink, Notifier};
use crate::runtime_config::RuntimeConfig;
use crate::watch_list::{WatchList, WatchListManager};
use crate::wick_analyzer::{classify, AnalyzerSettings};

// -----------------------------------------------------------------------------
// Clock
// -----------------------------------------------------------------------------

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// -----------------------------------------------------------------------------
// State & settings
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Refreshing,
    Sampling,
    ErrorBackoff,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Refreshing => write!(f, "REFRESHING"),
            Self::Sampling => write!(f, "SAMPLING"),
            Self::ErrorBackoff => write!(f, "ERROR_BACKOFF"),
        }
    }
}

/// Timing knobs of the loop.
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub boundary_minutes: u32,
    pub boundary_window_secs: u32,
    pub idle_poll: Duration,
    pub error_backoff: Duration,
    pub alert_on_candle_error: bool,
    pub display_tz: FixedOffset,
}

impl ScheduleSettings {
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        Ok(Self {
            boundary_minutes: config.boundary_minutes,
            boundary_window_secs: config.boundary_window_secs,
            idle_poll: Duration::from_secs(config.idle_poll_secs.max(1)),
            error_backoff: Duration::from_secs(config.error_backoff_secs),
            alert_on_candle_error: config.alert_on_candle_error,
            display_tz: config.display_offset()?,
        })
    }
}

/// Counters of one sampling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sampled: usize,
    pub notified: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Not at a fresh boundary; nothing sampled.
    Waiting,
    Sampled(CycleReport),
    BackedOff,
}

/// Result of one loop iteration: what happened and how long to sleep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub outcome: StepOutcome,
    pub sleep: Duration,
}

// -----------------------------------------------------------------------------
// Boundary arithmetic
// -----------------------------------------------------------------------------

/// Start of the sampling boundary `now` falls in, if any: minute-of-hour is a
/// multiple of `granularity_min` and second-of-minute is below `window_secs`.
pub fn sampling_boundary(
    now: DateTime<Utc>,
    granularity_min: u32,
    window_secs: u32,
) -> Result<Option<DateTime<Utc>>> {
    if granularity_min == 0 || now.minute() % granularity_min != 0 || now.second() >= window_secs {
        return Ok(None);
    }
    let start = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .with_context(|| format!("cannot truncate {now} to its minute"))?;
    Ok(Some(start))
}

/// Time left until the next boundary: the period minus the seconds already
/// spent in the current granularity window. Never shorter than one second.
pub fn until_next_boundary(now: DateTime<Utc>, granularity_min: u32) -> Duration {
    let period = u64::from(granularity_min.max(1)) * 60;
    let into_window = u64::from(now.minute() % granularity_min.max(1)) * 60 + u64::from(now.second());
    Duration::from_secs(period.saturating_sub(into_window).max(1))
}

// -----------------------------------------------------------------------------
// Error traces
// -----------------------------------------------------------------------------

/// Longest trace sent in an alert; Telegram rejects messages over 4096 chars.
const MAX_TRACE_CHARS: usize = 3000;

thread_local! {
    static LAST_PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a panic hook that records where the panic happened and the stack at
/// that point, for the backoff alert to pick up. Installed once per process.
pub fn install_panic_trace_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "unknown location".to_string());
            let trace = format!("panicked at {location}\n{}", Backtrace::force_capture());
            LAST_PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn take_panic_trace() -> Option<String> {
    LAST_PANIC_TRACE.with(|slot| slot.borrow_mut().take())
}

/// The error's own backtrace when one was captured, else the current stack.
fn error_trace(e: &anyhow::Error) -> String {
    let bt = e.backtrace();
    if bt.status() == BacktraceStatus::Captured {
        bt.to_string()
    } else {
        Backtrace::force_capture().to_string()
    }
}

fn truncate_trace(trace: &str) -> String {
    if trace.chars().count() <= MAX_TRACE_CHARS {
        return trace.to_string();
    }
    let mut cut: String = trace.chars().take(MAX_TRACE_CHARS).collect();
    cut.push_str("\n...");
    cut
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// -----------------------------------------------------------------------------
// PollingScheduler
// -----------------------------------------------------------------------------

/// The control loop. Owns the watch list and every collaborator.
pub struct PollingScheduler<M, S, C> {
    market: M,
    notifier: Notifier<S>,
    watch_list: WatchListManager,
    analyzer: AnalyzerSettings,
    settings: ScheduleSettings,
    clock: C,
    state: SchedulerState,
    last_sampled: Option<DateTime<Utc>>,
}

impl<M, S, C> PollingScheduler<M, S, C>
where
    M: MarketData,
    S: MessageSink,
    C: Clock,
{
    pub fn new(
        market: M,
        notifier: Notifier<S>,
        watch_list: WatchListManager,
        analyzer: AnalyzerSettings,
        settings: ScheduleSettings,
        clock: C,
    ) -> Self {
        Self {
            market,
            notifier,
            watch_list,
            analyzer,
            settings,
            clock,
            state: SchedulerState::Idle,
            last_sampled: None,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    #[cfg(test)]
    pub fn notifier(&self) -> &Notifier<S> {
        &self.notifier
    }

    #[cfg(test)]
    pub fn watch_list(&self) -> WatchList {
        self.watch_list.current()
    }

    /// Send the one-time startup alert.
    pub async fn announce_startup(&self, banner: &str) {
        info!(banner, "🟢 watcher starting");
        self.notifier.send_alert(banner, false).await;
    }

    /// Tick, sleep, repeat. Never returns.
    pub async fn run_forever(&mut self) {
        install_panic_trace_hook();
        info!(
            granularity_min = self.settings.boundary_minutes,
            window_secs = self.settings.boundary_window_secs,
            "polling loop started"
        );
        loop {
            let step = self.step().await;
            debug!(
                state = %self.state,
                outcome = ?step.outcome,
                sleep_ms = step.sleep.as_millis() as u64,
                "tick finished"
            );
            tokio::time::sleep(step.sleep).await;
            self.state = SchedulerState::Idle;
        }
    }

    /// One guarded loop iteration at the clock's current time.
    pub async fn step(&mut self) -> Step {
        let now = self.clock.now();
        let outcome = AssertUnwindSafe(self.tick(now)).catch_unwind().await;

        match outcome {
            Ok(Ok(step)) => step,
            Ok(Err(e)) => {
                let trace = error_trace(&e);
                self.back_off(format!("{e:#}"), trace).await
            }
            Err(payload) => {
                let detail = format!("panic: {}", panic_message(payload.as_ref()));
                let trace =
                    take_panic_trace().unwrap_or_else(|| Backtrace::force_capture().to_string());
                self.back_off(detail, trace).await
            }
        }
    }

    async fn tick(&mut self, now: DateTime<Utc>) -> Result<Step> {
        self.state = SchedulerState::Refreshing;
        let watch_list = self
            .watch_list
            .refresh_if_due(now, &self.market, &self.notifier)
            .await;

        let boundary = sampling_boundary(
            now,
            self.settings.boundary_minutes,
            self.settings.boundary_window_secs,
        )?;

        let Some(boundary) = boundary.filter(|b| self.last_sampled != Some(*b)) else {
            self.state = SchedulerState::Idle;
            return Ok(Step {
                outcome: StepOutcome::Waiting,
                sleep: self.settings.idle_poll,
            });
        };

        self.state = SchedulerState::Sampling;
        info!(
            at = %now.with_timezone(&self.settings.display_tz).format("%Y-%m-%d %H:%M:%S"),
            symbols = watch_list.len(),
            "⏱ sampling boundary"
        );

        let report = self.sample(&watch_list).await;
        self.last_sampled = Some(boundary);

        let sleep = until_next_boundary(self.clock.now(), self.settings.boundary_minutes);
        info!(
            sampled = report.sampled,
            notified = report.notified,
            failed = report.failed,
            sleep_secs = sleep.as_secs(),
            "sampling pass complete"
        );

        self.state = SchedulerState::Idle;
        Ok(Step {
            outcome: StepOutcome::Sampled(report),
            sleep,
        })
    }

    /// Fetch, classify and notify every symbol in turn. One symbol failing
    /// does not stop the others.
    async fn sample(&self, watch_list: &WatchList) -> CycleReport {
        let mut report = CycleReport::default();

        for cfg in watch_list.iter() {
            let candle = match self.market.fetch_latest_candle(cfg).await {
                Ok(candle) => candle,
                Err(e) => {
                    report.failed += 1;
                    warn!(symbol = %cfg.symbol, error = %e, "candle fetch failed, skipping symbol");
                    if self.settings.alert_on_candle_error {
                        self.notifier
                            .send_alert(
                                &format!("Failed to fetch candle for {}:\n```\n{e}\n```", cfg.symbol),
                                true,
                            )
                            .await;
                    }
                    continue;
                }
            };

            let result = classify(&candle, &self.analyzer);
            report.sampled += 1;
            info!(
                symbol = %cfg.symbol,
                wick = %result.wick_type,
                upper_pct = result.upper_wick_pct,
                lower_pct = result.lower_wick_pct,
                trend = %result.trend,
                "✔️ candle classified"
            );

            if self
                .notifier
                .send_classification(&cfg.symbol, &candle, &result)
                .await
            {
                report.notified += 1;
            } else {
                debug!(symbol = %cfg.symbol, "no notification delivered");
            }
        }

        report
    }

    async fn back_off(&mut self, detail: String, trace: String) -> Step {
        self.state = SchedulerState::ErrorBackoff;
        error!(
            error = %detail,
            backoff_secs = self.settings.error_backoff.as_secs(),
            "polling loop error"
        );
        debug!(trace = %trace, "polling loop error trace");
        let trace = truncate_trace(&trace);
        self.notifier
            .send_alert(
                &format!("Loop error:\n```\n{detail}\n\nStack trace:\n{trace}\n```"),
                true,
            )
            .await;
        Step {
            outcome: StepOutcome::BackedOff,
            sleep: self.settings.error_backoff,
        }
    }
}
