// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`.  The monitor is single-user and
// read-mostly, so every endpoint is public.
//
// CORS is configured permissively so the dashboard front end can be served
// from any origin.
// =============================================================================

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use crate::app_state::AppState;

/// Message returned when the contract or futures price is missing or invalid.
pub const INVALID_INPUT_MSG: &str = "Enter a valid futures price and contract";

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/contracts", get(contracts))
        .route("/api/v1/market", get(market))
        .route("/api/v1/arbitrage", get(arbitrage))
        .route("/api/v1/selection", post(set_selection))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
    /// WebSocket frames pushed since startup, across all connections.
    ws_messages_sent: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
        ws_messages_sent: state.ws_sequence_number.load(Ordering::Relaxed),
    };
    Json(resp)
}

// =============================================================================
// Snapshots
// =============================================================================

async fn full_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

async fn contracts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.contract_summaries())
}

async fn market(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let market = state.market();
    let body = serde_json::json!({
        "status": market.status,
        "fetched_at": market.fetched_at,
        "quotes": market.quotes,
        "rates": market.rates,
        "rate_lines": market.rates.lines(),
        "last_fetch_error": state.last_fetch_error.read().clone(),
    });
    Json(body)
}

// =============================================================================
// Arbitrage evaluation
// =============================================================================

#[derive(Deserialize)]
struct ArbitrageQuery {
    #[serde(default)]
    contract: Option<String>,
    /// Kept as text so a malformed number gets our own 400 body.
    #[serde(default)]
    futures_price: Option<String>,
}

fn parse_price(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p > 0.0)
}

fn invalid_input() -> axum::response::Response {
    let body = serde_json::json!({ "error": INVALID_INPUT_MSG });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

async fn arbitrage(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArbitrageQuery>,
) -> impl IntoResponse {
    let contract = query
        .contract
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let price = query.futures_price.as_deref().and_then(parse_price);

    let (Some(contract), Some(price)) = (contract, price) else {
        debug!("arbitrage request rejected: missing or invalid input");
        return invalid_input();
    };

    Json(state.report(price, contract)).into_response()
}

// =============================================================================
// Dashboard selection
// =============================================================================

#[derive(Deserialize)]
struct SelectionUpdate {
    #[serde(default)]
    contract: Option<String>,
    #[serde(default)]
    futures_price: Option<f64>,
}

async fn set_selection(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SelectionUpdate>,
) -> impl IntoResponse {
    if let Some(price) = update.futures_price {
        if !(price.is_finite() && price > 0.0) {
            return invalid_input();
        }
    }
    let contract = update.contract.map(|c| c.trim().to_string());
    if matches!(contract.as_deref(), Some("")) {
        return invalid_input();
    }

    let changes = state.update_selection(contract, update.futures_price);
    let config = state.runtime_config.read();
    let body = serde_json::json!({
        "contract": config.default_contract,
        "futures_price": config.default_futures_price,
        "changes": changes,
    });
    Json(body).into_response()
}
