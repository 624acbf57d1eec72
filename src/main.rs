// =============================================================================
// Wick Watch — Main Entry Point
// =============================================================================
//
// Polls Binance futures candles on 5-minute boundaries, measures the upper and
// lower wicks of the latest candle of every watched pair, and posts a Telegram
// message when a wick crosses its threshold.  Runs until Ctrl+C.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod binance;
mod error;
mod market_data;
mod notifier;
mod runtime_config;
mod scheduler;
mod types;
mod watch_list;
mod wick_analyzer;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::binance::BinanceClient;
use crate::notifier::{Notifier, TelegramClient};
use crate::runtime_config::RuntimeConfig;
use crate::scheduler::{PollingScheduler, ScheduleSettings, SystemClock};
use crate::types::WatchMode;
use crate::watch_list::WatchListManager;

const DEFAULT_CONFIG_PATH: &str = "wick_watch.json";

fn startup_banner(config: &RuntimeConfig) -> String {
    let target = match config.mode {
        WatchMode::Fixed => config.symbol.clone(),
        WatchMode::TopVolume => format!("TOP {} by 24h volume", config.top_n),
    };
    format!(
        "Wick watcher started for {target} ({} candles, upper ≥ {}%, lower ≥ {}%).",
        config.interval, config.upper_threshold_pct, config.lower_threshold_pct
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║              Wick Watch — Starting Up                   ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path =
        std::env::var("WICK_WATCH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());

    let mut config = match RuntimeConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            let preset = std::env::var("WICK_WATCH_PRESET").unwrap_or_else(|_| "top_volume".into());
            warn!(error = %e, preset = %preset, "Failed to load config, using preset");
            RuntimeConfig::preset(&preset)?
        }
    };
    config.apply_env_overrides()?;
    config.validate()?;

    info!(
        mode = %config.mode,
        interval = %config.interval,
        classification = ?config.classification,
        candle_pick = ?config.candle_pick,
        "Configuration ready"
    );

    // ── 2. Collaborators ─────────────────────────────────────────────────
    let market = BinanceClient::new(&config)?;
    let telegram = TelegramClient::new(&config)?;
    let notifier = Notifier::new(telegram, config.display_offset()?, config.price_decimals);
    let watch_list = WatchListManager::from_config(&config);

    let mut scheduler = PollingScheduler::new(
        market,
        notifier,
        watch_list,
        config.analyzer_settings(),
        ScheduleSettings::from_config(&config)?,
        SystemClock,
    );

    // ── 3. Run until interrupted ─────────────────────────────────────────
    scheduler.announce_startup(&startup_banner(&config)).await;

    tokio::select! {
        _ = scheduler.run_forever() => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            warn!("Shutdown signal received, stopping");
        }
    }

    info!("Wick Watch shut down complete.");
    Ok(())
}
