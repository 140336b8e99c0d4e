// =============================================================================
// TradeNova — Main Entry Point
// =============================================================================
//
// Boots the control plane and hands it to the Scheduler's CLOSED -> ... ->
// REPORTING state machine. The engine starts in `TradingMode::Paused` —
// trading_mode is read by callers of this binary but enforcement of "paused
// means no orders" is a deployment-level contract (see DESIGN.md); a fresh
// process never silently starts sending live orders to a funded account
// because `account_mode` still gates which broker/data credentials load.

mod app_state;
mod broker;
mod config;
mod decision_envelope;
mod error;
mod events;
mod features;
mod indicators;
mod market_clock;
mod market_data;
mod options;
mod persistence;
mod position_engine;
mod reconcile;
mod regime;
mod risk;
mod scheduler;
mod signals;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::broker::{BrokerAdapter, VendorBrokerAdapter};
use crate::config::EngineConfig;
use crate::market_clock::{MarketClock, SessionWindows, WallClock};
use crate::market_data::adapter::VendorDataAdapter;
use crate::market_data::{DataAdapter, FallbackDataAdapter};
use crate::scheduler::Scheduler;

const CONFIG_PATH: &str = "engine_config.json";
const STATE_PATH: &str = "tradenova_state.json";
const EOD_DIR: &str = "eod_reports";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        TradeNova Options Control Loop — Starting Up       ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    // ── 1. Configuration ──────────────────────────────────────────────────
    let config = EngineConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load engine config, using defaults");
        EngineConfig::default()
    });

    info!(
        universe = ?config.universe,
        trading_mode = %config.trading_mode,
        account_mode = %config.account_mode,
        "engine configured"
    );

    if let Err(e) = std::fs::create_dir_all(EOD_DIR) {
        warn!(error = %e, dir = EOD_DIR, "failed to create EOD report directory");
    }

    // ── 2. Data + broker adapters ─────────────────────────────────────────
    let data_base_url = std::env::var("TRADENOVA_DATA_URL").unwrap_or_else(|_| "https://data.example.com".into());
    let data_api_key = std::env::var("TRADENOVA_DATA_API_KEY").unwrap_or_default();
    let data_api_secret = std::env::var("TRADENOVA_DATA_API_SECRET").unwrap_or_default();
    let primary_data = Box::new(VendorDataAdapter::new(data_base_url, data_api_key, data_api_secret));

    let fallback_base_url = std::env::var("TRADENOVA_FALLBACK_DATA_URL").unwrap_or_else(|_| "https://fallback-data.example.com".into());
    let fallback_api_key = std::env::var("TRADENOVA_FALLBACK_DATA_API_KEY").unwrap_or_default();
    let fallback_api_secret = std::env::var("TRADENOVA_FALLBACK_DATA_API_SECRET").unwrap_or_default();
    let secondary_data = Box::new(VendorDataAdapter::new(fallback_base_url, fallback_api_key, fallback_api_secret));

    let data_adapter: Arc<dyn DataAdapter> = Arc::new(FallbackDataAdapter::new(primary_data, secondary_data));

    let broker_base_url = std::env::var("TRADENOVA_BROKER_URL").unwrap_or_else(|_| "https://broker.example.com".into());
    let broker_api_key = std::env::var("TRADENOVA_BROKER_API_KEY").unwrap_or_default();
    let broker_api_secret = std::env::var("TRADENOVA_BROKER_API_SECRET").unwrap_or_default();
    let broker: Arc<dyn BrokerAdapter> = Arc::new(VendorBrokerAdapter::new(broker_base_url, broker_api_key, broker_api_secret));

    // ── 3. Shared state ──────────────────────────────────────────────────
    let tz: chrono_tz::Tz = config.timezone.parse().unwrap_or(chrono_tz::America::New_York);
    let windows = SessionWindows {
        session_open: market_clock_time(&config.session_open, SessionWindows::default().session_open),
        flatten_time: market_clock_time(&config.flatten_time, SessionWindows::default().flatten_time),
        session_close: market_clock_time(&config.session_close, SessionWindows::default().session_close),
        ..SessionWindows::default()
    };
    let clock: Arc<dyn MarketClock> = Arc::new(WallClock::new(tz, windows));

    let state = Arc::new(AppState::new(config, data_adapter, broker));

    // ── 4. Scheduler ──────────────────────────────────────────────────────
    let scheduler = Arc::new(Scheduler::new(
        state.clone(),
        clock,
        std::path::PathBuf::from(STATE_PATH),
        std::path::PathBuf::from(EOD_DIR),
    ));

    let cancel = scheduler.cancellation_token();
    let sched_handle = scheduler.clone();
    let run_task = tokio::spawn(async move { sched_handle.run().await });

    info!("scheduler running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — cancelling scheduler");
    cancel.cancel();

    if let Err(e) = run_task.await {
        error!(error = %e, "scheduler task panicked");
    }

    info!("TradeNova shut down complete.");
    Ok(())
}

/// Parses an `"HH:MM"` config string into a `NaiveTime`, falling back to the
/// supplied default on a malformed value rather than failing startup.
fn market_clock_time(s: &str, default: chrono::NaiveTime) -> chrono::NaiveTime {
    chrono::NaiveTime::parse_from_str(s, "%H:%M").unwrap_or(default)
}
