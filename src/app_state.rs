// =============================================================================
// Central Application State — Dólar futuro arbitrage monitor
// =============================================================================
//
// Holds the latest market snapshot published by the poller, the arbitrage
// engine and the dashboard selection.  The REST API and the WebSocket feed
// read from here; only the poller and the selection endpoint write.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock for all mutable shared collections.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::arbitrage::calendar::days_between;
use crate::arbitrage::{ArbitrageEngine, Evaluation};
use crate::market_data::{FeedOutcome, FeedStatus, MarketSnapshot};
use crate::runtime_config::RuntimeConfig;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for the dashboard error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

// =============================================================================
// AppState
// =============================================================================

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Incremented on every meaningful state mutation. The WebSocket feed
    /// uses this to detect changes and push updates.
    pub state_version: AtomicU64,

    /// WebSocket message sequence number (incremented per message sent).
    pub ws_sequence_number: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub config_path: String,

    // ── Core ────────────────────────────────────────────────────────────
    pub engine: ArbitrageEngine,

    // ── Market Data ─────────────────────────────────────────────────────
    pub market: RwLock<MarketSnapshot>,
    pub last_fetch_ok: RwLock<Option<std::time::Instant>>,
    pub last_fetch_error: RwLock<Option<String>>,

    // ── Error Log ───────────────────────────────────────────────────────
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig, config_path: impl Into<String>) -> Self {
        let engine = ArbitrageEngine::from_config(&config);
        Self::with_engine(config, config_path, engine)
    }

    /// Construct with a pre-built engine (e.g. one running on a fixed clock).
    pub fn with_engine(
        config: RuntimeConfig,
        config_path: impl Into<String>,
        engine: ArbitrageEngine,
    ) -> Self {
        let market = MarketSnapshot::zeroed(
            &config.quote_fields,
            &config.funding_rates,
            FeedStatus::Pending,
        );

        Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),
            runtime_config: Arc::new(RwLock::new(config)),
            config_path: config_path.into(),
            engine,
            market: RwLock::new(market),
            last_fetch_ok: RwLock::new(None),
            last_fetch_error: RwLock::new(None),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error message. Oldest entries are evicted beyond
    /// [`MAX_RECENT_ERRORS`].
    pub fn push_error(&self, msg: String) {
        let record = ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);

        self.increment_version();
    }

    // ── Market Data ─────────────────────────────────────────────────────

    /// Publish the result of one poll. A failed fetch publishes `fallback`
    /// (all zeros) so downstream evaluation degrades to "no opportunities".
    pub fn apply_feed_outcome(&self, outcome: FeedOutcome, fallback: MarketSnapshot) {
        match outcome {
            FeedOutcome::Success(snapshot) => {
                *self.market.write() = snapshot;
                *self.last_fetch_ok.write() = Some(std::time::Instant::now());
                *self.last_fetch_error.write() = None;
                self.increment_version();
            }
            FeedOutcome::Unavailable(reason) => {
                *self.market.write() = fallback;
                *self.last_fetch_error.write() = Some(reason.clone());
                self.push_error(format!("quote feed unavailable: {reason}"));
            }
        }
    }

    pub fn market(&self) -> MarketSnapshot {
        self.market.read().clone()
    }

    // ── Evaluation ──────────────────────────────────────────────────────

    /// Evaluate `contract` at `futures_price` against the latest snapshot.
    /// The clock is read once so the evaluation and the reported day count
    /// agree.
    pub fn report(&self, futures_price: f64, contract: String) -> SelectionReport {
        let now = self.engine.now();
        let calendar = self.engine.calendar();
        let known_contract = calendar.is_known(&contract);
        let expiry = calendar
            .lookup(&contract)
            .unwrap_or_else(|| calendar.default_expiry());

        let evaluation = {
            let market = self.market.read();
            self.engine.evaluate_at(
                futures_price,
                &contract,
                &market.quotes,
                &market.rates,
                now,
            )
        };

        SelectionReport {
            days_to_expiry: days_between(now, expiry),
            expiry,
            known_contract,
            has_opportunities: evaluation.has_opportunities(),
            lines: evaluation.lines(),
            contract,
            futures_price,
            evaluation,
        }
    }

    pub fn contract_summaries(&self) -> Vec<ContractSummary> {
        let ids = self.runtime_config.read().contract_ids();
        ids.into_iter()
            .map(|id| ContractSummary {
                expiry: self.engine.calendar().expiry(&id),
                days_to_expiry: self.engine.days_to_expiry(&id),
                contract: id,
            })
            .collect()
    }

    // ── Selection ───────────────────────────────────────────────────────

    /// Change the contract and price evaluated in pushed snapshots. Returns
    /// the list of changes applied.
    pub fn update_selection(
        &self,
        contract: Option<String>,
        futures_price: Option<f64>,
    ) -> Vec<String> {
        let mut config = self.runtime_config.write();
        let mut changes = Vec::new();

        if let Some(contract) = contract {
            if config.default_contract != contract {
                changes.push(format!(
                    "default_contract: {} -> {}",
                    config.default_contract, contract
                ));
                config.default_contract = contract;
            }
        }
        if let Some(price) = futures_price {
            if config.default_futures_price != price {
                changes.push(format!(
                    "default_futures_price: {} -> {}",
                    config.default_futures_price, price
                ));
                config.default_futures_price = price;
            }
        }

        if changes.is_empty() {
            return changes;
        }

        info!(changes = ?changes, "dashboard selection updated");
        let config_clone = config.clone();
        drop(config);

        if let Err(e) = config_clone.save(&self.config_path) {
            warn!(error = %e, "failed to save selection to disk");
        }
        self.increment_version();
        changes
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Full dashboard payload for `GET /api/v1/state` and the WebSocket feed.
    pub fn build_snapshot(&self) -> DashboardSnapshot {
        let (contract, futures_price) = {
            let config = self.runtime_config.read();
            (config.default_contract.clone(), config.default_futures_price)
        };

        let selection = self.report(futures_price, contract);
        let market = self.market();

        DashboardSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            as_of: self.engine.now(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            rate_lines: market.rates.lines(),
            market,
            contracts: self.contract_summaries(),
            selection,
            last_fetch_ok_age_s: self.last_fetch_ok.read().map(|t| t.elapsed().as_secs()),
            last_fetch_error: self.last_fetch_error.read().clone(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

// =============================================================================
// Snapshot types
// =============================================================================

/// One listed contract with its resolved expiry.
#[derive(Debug, Clone, Serialize)]
pub struct ContractSummary {
    pub contract: String,
    pub expiry: NaiveDate,
    pub days_to_expiry: i64,
}

/// An evaluation together with its inputs and display lines.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionReport {
    pub contract: String,
    pub futures_price: f64,
    pub expiry: NaiveDate,
    pub days_to_expiry: i64,
    /// False when the month code is not listed and the default expiry was used.
    pub known_contract: bool,
    pub has_opportunities: bool,
    pub evaluation: Evaluation,
    pub lines: Vec<String>,
}

/// Full dashboard state snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    /// Local instant the evaluation was run as of.
    pub as_of: NaiveDateTime,
    pub uptime_secs: u64,
    pub market: MarketSnapshot,
    pub rate_lines: Vec<String>,
    pub contracts: Vec<ContractSummary>,
    pub selection: SelectionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetch_ok_age_s: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetch_error: Option<String>,
    pub recent_errors: Vec<ErrorRecord>,
}
