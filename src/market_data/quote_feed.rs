// =============================================================================
// Quote Feed — Spot dollar quotes from the public quote aggregator
// =============================================================================
//
// A single GET returns every dollar variant keyed by name:
//
//   { "blue": { "price": 1520.0, ... }, "ccl": { "price": ... }, ... }
//
// Each configured `QuoteField` picks one key, reads its `price` and applies
// its multiplier (A3500 is derived from `mayorista` x 1.65).  Missing or
// non-numeric prices become 0.0, the "unavailable" sentinel.
//
// Caución rates have no public source and come from configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::runtime_config::{QuoteField, RuntimeConfig};
use crate::types::{QuoteSet, RateSet};

/// Characters of a non-2xx response body kept in the failure reason.
const ERROR_BODY_SNIPPET: usize = 200;

// =============================================================================
// MarketSnapshot / FeedOutcome
// =============================================================================

/// Whether the last snapshot came from the live source or a zero fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    Live,
    Unavailable,
    /// No fetch has completed yet.
    Pending,
}

impl std::fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Pending => write!(f, "pending"),
        }
    }
}

/// Quotes and funding rates as of one poll.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub quotes: QuoteSet,
    pub rates: RateSet,
    pub status: FeedStatus,
    /// ISO 8601 timestamp of the poll.
    pub fetched_at: String,
}

impl MarketSnapshot {
    /// Every configured quote and rate at zero.
    pub fn zeroed(fields: &[QuoteField], rates: &RateSet, status: FeedStatus) -> Self {
        Self {
            quotes: fields.iter().map(|f| (f.name.clone(), 0.0)).collect(),
            rates: rates.zeroed(),
            status,
            fetched_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Result of one fetch attempt.
#[derive(Debug, Clone)]
pub enum FeedOutcome {
    Success(MarketSnapshot),
    Unavailable(String),
}

// =============================================================================
// Parsing
// =============================================================================

fn price_of(body: &Value, key: &str) -> f64 {
    let Some(price) = body.get(key).and_then(|entry| entry.get("price")) else {
        return 0.0;
    };
    price
        .as_f64()
        .or_else(|| price.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|p: &f64| p.is_finite() && *p >= 0.0)
        .unwrap_or(0.0)
}

/// Build a `QuoteSet` from a quote source response.
pub fn parse_quotes(body: &Value, fields: &[QuoteField]) -> QuoteSet {
    fields
        .iter()
        .map(|f| (f.name.clone(), price_of(body, &f.key) * f.multiplier))
        .collect()
}

// =============================================================================
// QuoteFeed
// =============================================================================

/// Fetches spot quotes over HTTP and pairs them with configured caución rates.
pub struct QuoteFeed {
    client: reqwest::Client,
    url: String,
    fields: Vec<QuoteField>,
    rates: RateSet,
}

impl QuoteFeed {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build reqwest client for QuoteFeed")?;
        Ok(Self::with_client(client, config))
    }

    /// Create a feed that re-uses an existing HTTP client.
    pub fn with_client(client: reqwest::Client, config: &RuntimeConfig) -> Self {
        Self {
            client,
            url: config.quote_source_url.clone(),
            fields: config.quote_fields.clone(),
            rates: config.funding_rates.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The snapshot to publish when a fetch fails.
    pub fn fallback(&self) -> MarketSnapshot {
        MarketSnapshot::zeroed(&self.fields, &self.rates, FeedStatus::Unavailable)
    }

    /// Fetch the latest quotes. Any transport, status or parse failure is
    /// reported as `Unavailable` rather than an error.
    #[instrument(skip(self), name = "quote_feed::fetch")]
    pub async fn fetch(&self) -> FeedOutcome {
        match self.fetch_quotes().await {
            Ok(quotes) => FeedOutcome::Success(MarketSnapshot {
                quotes,
                rates: self.rates.clone(),
                status: FeedStatus::Live,
                fetched_at: Utc::now().to_rfc3339(),
            }),
            Err(e) => {
                warn!(url = %self.url, error = %e, "quote fetch failed");
                FeedOutcome::Unavailable(format!("{e:#}"))
            }
        }
    }

    async fn fetch_quotes(&self) -> Result<QuoteSet> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("GET {}", self.url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(ERROR_BODY_SNIPPET).collect();
            anyhow::bail!("quote source returned {}: {}", status, snippet.trim());
        }

        let body: Value = resp
            .json()
            .await
            .context("failed to parse quote response body")?;

        if !body.is_object() {
            anyhow::bail!("quote response is not an object");
        }

        let quotes = parse_quotes(&body, &self.fields);
        if quotes.is_empty() {
            anyhow::bail!("no quote fields configured");
        }
        debug!(
            count = quotes.len(),
            available = quotes.available().count(),
            "quotes fetched"
        );
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Vec<QuoteField> {
        RuntimeConfig::default().quote_fields
    }

    #[test]
    fn parse_full_response() {
        let body = json!({
            "blue": { "ask": 1530.0, "price": 1520.0 },
            "ccl": { "price": 1545.5 },
            "mep": { "price": 1510.0 },
            "mayorista": { "price": 1000.0 },
            "oficial": { "price": 1050.0 }
        });
        let quotes = parse_quotes(&body, &fields());
        assert_eq!(quotes.len(), 4);
        assert_eq!(quotes.get("Blue"), Some(1520.0));
        assert_eq!(quotes.get("CCL"), Some(1545.5));
        assert_eq!(quotes.get("MEP"), Some(1510.0));
        assert!((quotes.get("A3500").unwrap() - 1650.0).abs() < 1e-9);
    }

    #[test]
    fn missing_entries_become_zero() {
        let body = json!({ "blue": { "price": 1520.0 }, "ccl": {} });
        let quotes = parse_quotes(&body, &fields());
        assert_eq!(quotes.get("Blue"), Some(1520.0));
        assert_eq!(quotes.get("CCL"), Some(0.0));
        assert_eq!(quotes.get("MEP"), Some(0.0));
        assert_eq!(quotes.get("A3500"), Some(0.0));
    }

    #[test]
    fn string_and_garbage_prices() {
        let body = json!({
            "blue": { "price": "1520.25" },
            "ccl": { "price": "n/a" },
            "mep": { "price": -5.0 },
            "mayorista": { "price": null }
        });
        let quotes = parse_quotes(&body, &fields());
        assert_eq!(quotes.get("Blue"), Some(1520.25));
        assert_eq!(quotes.get("CCL"), Some(0.0));
        assert_eq!(quotes.get("MEP"), Some(0.0));
        assert_eq!(quotes.get("A3500"), Some(0.0));
    }

    #[test]
    fn zeroed_snapshot_keeps_names() {
        let cfg = RuntimeConfig::default();
        let snap = MarketSnapshot::zeroed(&cfg.quote_fields, &cfg.funding_rates, FeedStatus::Pending);
        assert_eq!(snap.quotes.len(), 4);
        assert!(snap.quotes.iter().all(|q| q.price == 0.0));
        assert_eq!(snap.rates.len(), 2);
        assert_eq!(snap.status, FeedStatus::Pending);
    }

    /// Serve `router` on an ephemeral loopback port and return a feed aimed at it.
    async fn feed_against(router: axum::Router) -> QuoteFeed {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let mut cfg = RuntimeConfig::default();
        cfg.quote_source_url = format!("http://{addr}/api/dolar");
        cfg.request_timeout_secs = 5;
        QuoteFeed::new(&cfg).unwrap()
    }

    #[tokio::test]
    async fn error_status_is_reported_before_decoding() {
        use axum::http::StatusCode;
        use axum::response::Html;
        use axum::routing::get;

        let router = axum::Router::new().route(
            "/api/dolar",
            get(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Html("<html><body>maintenance</body></html>"),
                )
            }),
        );
        let feed = feed_against(router).await;

        match feed.fetch().await {
            FeedOutcome::Unavailable(reason) => {
                assert!(reason.contains("503"), "reason: {reason}");
                assert!(reason.contains("maintenance"), "reason: {reason}");
                assert!(!reason.contains("decoding"), "reason: {reason}");
            }
            FeedOutcome::Success(_) => panic!("expected Unavailable"),
        }
    }

    #[tokio::test]
    async fn live_response_is_parsed() {
        use axum::routing::get;

        let router = axum::Router::new().route(
            "/api/dolar",
            get(|| async {
                axum::Json(json!({
                    "blue": { "price": 1520.0 },
                    "ccl": { "price": 1545.5 },
                    "mayorista": { "price": 1000.0 }
                }))
            }),
        );
        let feed = feed_against(router).await;

        match feed.fetch().await {
            FeedOutcome::Success(snap) => {
                assert_eq!(snap.status, FeedStatus::Live);
                assert_eq!(snap.quotes.get("Blue"), Some(1520.0));
                assert_eq!(snap.quotes.get("MEP"), Some(0.0));
                assert!((snap.quotes.get("A3500").unwrap() - 1650.0).abs() < 1e-9);
                assert_eq!(snap.rates.average(), Some(41.0));
            }
            FeedOutcome::Unavailable(reason) => panic!("unexpected failure: {reason}"),
        }
    }

    #[tokio::test]
    async fn non_object_body_is_unavailable() {
        use axum::routing::get;

        let router = axum::Router::new()
            .route("/api/dolar", get(|| async { axum::Json(json!([1, 2, 3])) }));
        let feed = feed_against(router).await;

        match feed.fetch().await {
            FeedOutcome::Unavailable(reason) => assert!(reason.contains("not an object")),
            FeedOutcome::Success(_) => panic!("expected Unavailable"),
        }
    }

    #[tokio::test]
    async fn unreachable_source_is_unavailable() {
        let mut cfg = RuntimeConfig::default();
        // Port 9 on loopback (discard) is closed on test hosts.
        cfg.quote_source_url = "http://127.0.0.1:9/api/dolar".to_string();
        cfg.request_timeout_secs = 2;
        let feed = QuoteFeed::new(&cfg).unwrap();

        match feed.fetch().await {
            FeedOutcome::Unavailable(reason) => assert!(!reason.is_empty()),
            FeedOutcome::Success(_) => panic!("expected Unavailable"),
        }
        let fallback = feed.fallback();
        assert_eq!(fallback.status, FeedStatus::Unavailable);
        assert!(fallback.quotes.iter().all(|q| q.price == 0.0));
    }
}
