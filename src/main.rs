// =============================================================================
// Dólar Futuro Arbitrage Monitor — Main Entry Point
// =============================================================================
//
// Polls spot dollar quotes, keeps the latest snapshot in shared state and
// serves the arbitrage dashboard API.  Nothing here places orders.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod arbitrage;
mod market_data;
mod runtime_config;
mod types;

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::arbitrage::calendar::parse_as_of;
use crate::arbitrage::{ArbitrageEngine, FixedClock};
use crate::market_data::QuoteFeed;
use crate::runtime_config::RuntimeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Dólar futuro arbitrage monitor — starting up");

    let config_path =
        std::env::var("DOLAR_CONFIG_PATH").unwrap_or_else(|_| "runtime_config.json".into());

    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    if let Ok(url) = std::env::var("DOLAR_QUOTE_URL") {
        config.quote_source_url = url;
    }

    info!(
        contracts = ?config.contract_ids(),
        margin_pct = config.margin_pct,
        poll_interval_secs = config.poll_interval_secs,
        "Configured contract calendar"
    );

    // ── 2. Build shared state & feed ─────────────────────────────────────
    let feed = QuoteFeed::new(&config)?;
    let poll_every = std::time::Duration::from_secs(config.poll_interval_secs.max(1));

    // DOLAR_AS_OF pins "now" so a past session can be replayed.
    let as_of = std::env::var("DOLAR_AS_OF").ok().and_then(|raw| {
        let parsed = parse_as_of(&raw);
        if parsed.is_none() {
            warn!(value = %raw, "Ignoring unparseable DOLAR_AS_OF");
        }
        parsed
    });
    let state = match as_of {
        Some(at) => {
            info!(as_of = %at, "Evaluating with a fixed clock");
            let engine =
                ArbitrageEngine::from_config(&config).with_clock(Arc::new(FixedClock(at)));
            Arc::new(AppState::with_engine(config, config_path.clone(), engine))
        }
        None => Arc::new(AppState::new(config, config_path.clone())),
    };

    // ── 3. Quote poller ──────────────────────────────────────────────────
    let poll_state = state.clone();
    tokio::spawn(async move {
        info!(url = %feed.url(), "Quote poller starting");
        let mut interval = tokio::time::interval(poll_every);
        loop {
            interval.tick().await;
            let outcome = feed.fetch().await;
            poll_state.apply_feed_outcome(outcome, feed.fallback());
            debug!(
                version = poll_state.current_state_version(),
                "market snapshot published"
            );
        }
    });

    // ── 4. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr =
        std::env::var("DOLAR_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8050".into());

    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %bind_addr, error = %e, "Failed to bind API server");
                return;
            }
        };
        info!(addr = %bind_addr, "API server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    if let Err(e) = state.runtime_config.read().save(&config_path) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Dólar futuro arbitrage monitor shut down complete.");
    Ok(())
}
