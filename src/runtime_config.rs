// =============================================================================
// Runtime Configuration — Contract calendar, thresholds and feed settings
// =============================================================================
//
// Every tunable of the monitor lives here: the ROFEX contract table, the
// arbitrage margin band, the simulated funding rates and the quote source.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::RateSet;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

fn default_symbol() -> String {
    "DLR".to_string()
}

fn default_contracts() -> Vec<ContractSpec> {
    vec![
        ContractSpec::new("OCT25", ymd(2025, 10, 31)),
        ContractSpec::new("NOV25", ymd(2025, 11, 30)),
        ContractSpec::new("DEC25", ymd(2025, 12, 31)),
        ContractSpec::new("JAN26", ymd(2026, 1, 31)),
    ]
}

fn default_expiry() -> NaiveDate {
    ymd(2025, 12, 31)
}

fn default_margin_pct() -> f64 {
    5.0
}

fn default_day_count_basis() -> f64 {
    360.0
}

fn default_funding_rates() -> RateSet {
    [("Caucion 7d", 40.0), ("Caucion 30d", 42.0)]
        .into_iter()
        .collect()
}

fn default_quote_source_url() -> String {
    "https://criptoya.com/api/dolar".to_string()
}

fn default_quote_fields() -> Vec<QuoteField> {
    vec![
        QuoteField::new("Blue", "blue", 1.0),
        QuoteField::new("CCL", "ccl", 1.0),
        QuoteField::new("MEP", "mep", 1.0),
        QuoteField::new("A3500", "mayorista", 1.65),
    ]
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_contract() -> String {
    "DLR/OCT25".to_string()
}

fn default_futures_price() -> f64 {
    1600.0
}

fn default_multiplier() -> f64 {
    1.0
}

// =============================================================================
// ContractSpec / QuoteField
// =============================================================================

/// A listed contract month and its expiry (last calendar day of the month).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    /// Month code as it appears after the symbol separator, e.g. `DEC25`.
    pub code: String,
    pub expiry: NaiveDate,
}

impl ContractSpec {
    pub fn new(code: impl Into<String>, expiry: NaiveDate) -> Self {
        Self {
            code: code.into(),
            expiry,
        }
    }
}

/// Maps one field of the quote source JSON onto a named quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteField {
    /// Quote name shown on the dashboard (`Blue`, `A3500`, ...).
    pub name: String,
    /// Top-level key in the source response (`blue`, `mayorista`, ...).
    pub key: String,
    /// Scale applied to the source price.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl QuoteField {
    pub fn new(name: impl Into<String>, key: impl Into<String>, multiplier: f64) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            multiplier,
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the monitor.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Contract calendar --------------------------------------------------

    /// Futures symbol prefix (`DLR`).
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Recognised contract months.
    #[serde(default = "default_contracts")]
    pub contracts: Vec<ContractSpec>,

    /// Expiry used for any contract code missing from `contracts`.
    #[serde(default = "default_expiry")]
    pub default_expiry: NaiveDate,

    // --- Arbitrage thresholds -----------------------------------------------

    /// Half-width of the no-signal band around the average funding rate, in
    /// percentage points.
    #[serde(default = "default_margin_pct")]
    pub margin_pct: f64,

    /// Day-count convention for simple-interest annualisation.
    #[serde(default = "default_day_count_basis")]
    pub day_count_basis: f64,

    /// Caución rates used as the funding benchmark (annual %).
    #[serde(default = "default_funding_rates")]
    pub funding_rates: RateSet,

    // --- Quote feed ---------------------------------------------------------

    #[serde(default = "default_quote_source_url")]
    pub quote_source_url: String,

    #[serde(default = "default_quote_fields")]
    pub quote_fields: Vec<QuoteField>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // --- Dashboard defaults -------------------------------------------------

    /// Contract evaluated in the pushed dashboard snapshot.
    #[serde(default = "default_contract")]
    pub default_contract: String,

    /// Futures price (ARS) evaluated in the pushed dashboard snapshot.
    #[serde(default = "default_futures_price")]
    pub default_futures_price: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            contracts: default_contracts(),
            default_expiry: default_expiry(),
            margin_pct: default_margin_pct(),
            day_count_basis: default_day_count_basis(),
            funding_rates: default_funding_rates(),
            quote_source_url: default_quote_source_url(),
            quote_fields: default_quote_fields(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            default_contract: default_contract(),
            default_futures_price: default_futures_price(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            contracts = ?config.contract_ids(),
            margin_pct = config.margin_pct,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Full contract identifiers, e.g. `["DLR/OCT25", "DLR/NOV25", ...]`.
    pub fn contract_ids(&self) -> Vec<String> {
        self.contracts
            .iter()
            .map(|c| format!("{}/{}", self.symbol, c.code))
            .collect()
    }
}
