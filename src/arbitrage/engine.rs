// =============================================================================
// Arbitrage Engine — Implied rate vs caución funding rate
// =============================================================================
//
// For every available spot quote the futures price implies a simple-interest
// annual rate:
//
//   implied = ((futures / spot) - 1) * (basis / days) * 100      basis = 360
//
// That rate is compared against the average caución rate with a fixed band:
//
//   implied > avg + margin  =>  LONG   buy futures, sell spot leg
//   implied < avg - margin  =>  SHORT  sell futures, buy spot leg
//   otherwise               =>  no signal for that quote
//
// Evaluation never fails: expired contracts, empty funding data and zero
// (unavailable) quotes all map onto an `Evaluation` variant.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::arbitrage::calendar::{Clock, ContractCalendar, SystemClock};
use crate::runtime_config::RuntimeConfig;
use crate::types::{Direction, QuoteSet, RateSet};

pub const NO_OPPORTUNITIES_MSG: &str = "No arbitrage opportunities";
pub const NO_FUNDING_DATA_MSG: &str = "No funding rate data";

// =============================================================================
// Signal
// =============================================================================

/// One arbitrage opportunity against a single spot quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub direction: Direction,
    pub contract: String,
    pub futures_price: f64,
    /// Spot quote used as the hedge leg.
    pub quote: String,
    /// Implied annual rate in percent, rounded to 2 decimals.
    pub implied_rate_pct: f64,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.direction {
            Direction::Long => write!(
                f,
                "LONG arbitrage: buy {} at {}, sell {} (implied rate: {:.2}%)",
                self.contract, self.futures_price, self.quote, self.implied_rate_pct
            ),
            Direction::Short => write!(
                f,
                "SHORT arbitrage: sell {} at {}, buy {} (implied rate: {:.2}%)",
                self.contract, self.futures_price, self.quote, self.implied_rate_pct
            ),
            Direction::None => write!(
                f,
                "{} vs {}: no signal (implied rate: {:.2}%)",
                self.contract, self.quote, self.implied_rate_pct
            ),
        }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Result of one arbitrage evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Evaluation {
    /// At least one quote produced a signal.
    Signals { signals: Vec<Signal> },
    /// Evaluated; every quote was unavailable or inside the band.
    NoOpportunities,
    /// Contract expires today or already expired; nothing was evaluated.
    Expired { days_to_expiry: i64 },
    /// The funding rate set was empty, so there is no benchmark.
    NoFundingData,
}

impl Evaluation {
    pub fn signals(&self) -> &[Signal] {
        match self {
            Self::Signals { signals } => signals,
            _ => &[],
        }
    }

    pub fn has_opportunities(&self) -> bool {
        !self.signals().is_empty()
    }

    /// Dashboard text lines. Expired contracts render nothing.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::Signals { signals } => signals.iter().map(|s| s.to_string()).collect(),
            Self::NoOpportunities => vec![NO_OPPORTUNITIES_MSG.to_string()],
            Self::NoFundingData => vec![NO_FUNDING_DATA_MSG.to_string()],
            Self::Expired { .. } => Vec::new(),
        }
    }
}

// =============================================================================
// Pure helpers
// =============================================================================

/// Simple-interest annualised rate (percent) implied by `futures` over `spot`.
pub fn implied_annualized_rate(futures: f64, spot: f64, days: i64, basis: f64) -> f64 {
    ((futures / spot) - 1.0) * (basis / days as f64) * 100.0
}

/// Band classification. Boundaries are exclusive on both sides.
pub fn classify(implied_pct: f64, avg_funding_pct: f64, margin_pct: f64) -> Direction {
    if implied_pct > avg_funding_pct + margin_pct {
        Direction::Long
    } else if implied_pct < avg_funding_pct - margin_pct {
        Direction::Short
    } else {
        Direction::None
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// =============================================================================
// ArbitrageEngine
// =============================================================================

/// Stateless evaluator; holds only its calendar, thresholds and clock.
#[derive(Clone)]
pub struct ArbitrageEngine {
    calendar: ContractCalendar,
    margin_pct: f64,
    day_count_basis: f64,
    clock: Arc<dyn Clock>,
}

impl ArbitrageEngine {
    pub fn new(calendar: ContractCalendar, margin_pct: f64, day_count_basis: f64) -> Self {
        Self {
            calendar,
            margin_pct,
            day_count_basis,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            ContractCalendar::from_config(config),
            config.margin_pct,
            config.day_count_basis,
        )
    }

    /// Replace the wall clock, e.g. with a `FixedClock` for reproducible runs.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn calendar(&self) -> &ContractCalendar {
        &self.calendar
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn days_to_expiry(&self, contract: &str) -> i64 {
        self.calendar.days_to_expiry(contract, self.clock.now())
    }

    /// Evaluate every quote against the funding benchmark as of the engine's
    /// clock.
    pub fn evaluate(
        &self,
        futures_price: f64,
        contract: &str,
        quotes: &QuoteSet,
        rates: &RateSet,
    ) -> Evaluation {
        self.evaluate_at(futures_price, contract, quotes, rates, self.clock.now())
    }

    /// Same as [`evaluate`](Self::evaluate) with an explicit `now`.
    pub fn evaluate_at(
        &self,
        futures_price: f64,
        contract: &str,
        quotes: &QuoteSet,
        rates: &RateSet,
        now: NaiveDateTime,
    ) -> Evaluation {
        let days = self.calendar.days_to_expiry(contract, now);
        if days <= 0 {
            debug!(contract, days, "contract expired, skipping evaluation");
            return Evaluation::Expired {
                days_to_expiry: days,
            };
        }

        let Some(avg_funding) = rates.average() else {
            debug!(contract, "no funding rates, skipping evaluation");
            return Evaluation::NoFundingData;
        };

        let mut signals = Vec::new();
        for quote in quotes.available() {
            let implied =
                implied_annualized_rate(futures_price, quote.price, days, self.day_count_basis);
            let direction = classify(implied, avg_funding, self.margin_pct);

            debug!(
                contract,
                quote = %quote.name,
                implied = format!("{:.4}", implied),
                avg_funding,
                direction = %direction,
                "quote evaluated"
            );

            if direction == Direction::None {
                continue;
            }

            signals.push(Signal {
                direction,
                contract: contract.to_string(),
                futures_price,
                quote: quote.name.clone(),
                implied_rate_pct: round2(implied),
            });
        }

        if signals.is_empty() {
            Evaluation::NoOpportunities
        } else {
            Evaluation::Signals { signals }
        }
    }
}

impl std::fmt::Debug for ArbitrageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbitrageEngine")
            .field("calendar", &self.calendar)
            .field("margin_pct", &self.margin_pct)
            .field("day_count_basis", &self.day_count_basis)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::calendar::FixedClock;
    use chrono::NaiveDate;

    /// Midnight, `days` before the DEC25 expiry (2025-12-31).
    fn days_before_dec25(days: i64) -> NaiveDateTime {
        let expiry = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        (expiry - chrono::Duration::days(days))
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn engine_at(now: NaiveDateTime) -> ArbitrageEngine {
        ArbitrageEngine::from_config(&RuntimeConfig::default())
            .with_clock(Arc::new(FixedClock(now)))
    }

    fn rates(values: &[(&str, f64)]) -> RateSet {
        values.iter().map(|(n, r)| (*n, *r)).collect()
    }

    fn quotes(values: &[(&str, f64)]) -> QuoteSet {
        values.iter().map(|(n, p)| (*n, *p)).collect()
    }

    // ---- pure helpers ----------------------------------------------------

    #[test]
    fn implied_rate_formula() {
        let implied = implied_annualized_rate(1650.0, 1600.0, 30, 360.0);
        assert!((implied - 37.5).abs() < 1e-9, "got {implied}");
    }

    #[test]
    fn implied_rate_negative_when_futures_below_spot() {
        let implied = implied_annualized_rate(1500.0, 1600.0, 90, 360.0);
        assert!((implied - (-25.0)).abs() < 1e-9, "got {implied}");
    }

    #[test]
    fn classification_boundaries_are_strict() {
        assert_eq!(classify(45.0, 40.0, 5.0), Direction::None);
        assert_eq!(classify(45.01, 40.0, 5.0), Direction::Long);
        assert_eq!(classify(35.0, 40.0, 5.0), Direction::None);
        assert_eq!(classify(34.99, 40.0, 5.0), Direction::Short);
        assert_eq!(classify(40.0, 40.0, 5.0), Direction::None);
    }

    // ---- evaluate --------------------------------------------------------

    #[test]
    fn end_to_end_zero_quote_skipped() {
        let engine = engine_at(days_before_dec25(90));
        assert_eq!(engine.days_to_expiry("DLR/DEC25"), 90);

        // avg 32; implied(A) = 26.67 sits below the 27 lower band edge.
        let result = engine.evaluate(
            1600.0,
            "DLR/DEC25",
            &quotes(&[("A", 1500.0), ("B", 0.0)]),
            &rates(&[("x", 30.0), ("y", 34.0)]),
        );
        let signals = result.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].quote, "A");
        assert_eq!(signals[0].direction, Direction::Short);
        assert!((signals[0].implied_rate_pct - 26.67).abs() < 1e-9);
    }

    #[test]
    fn end_to_end_no_opportunity_inside_band() {
        let engine = engine_at(days_before_dec25(90));
        // implied(A) = 26.67 vs avg 28: inside [23, 33].
        let result = engine.evaluate(
            1600.0,
            "DLR/DEC25",
            &quotes(&[("A", 1500.0), ("B", 0.0)]),
            &rates(&[("x", 26.0), ("y", 30.0)]),
        );
        assert_eq!(result, Evaluation::NoOpportunities);
        assert_eq!(result.lines(), vec![NO_OPPORTUNITIES_MSG]);
    }

    #[test]
    fn long_signal_when_futures_rich() {
        let engine = engine_at(days_before_dec25(30));
        let result = engine.evaluate(
            1650.0,
            "DLR/DEC25",
            &quotes(&[("Blue", 1600.0)]),
            &rates(&[("Caucion 7d", 30.0)]),
        );
        let signals = result.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].direction, Direction::Long);
        assert_eq!(signals[0].quote, "Blue");
        assert_eq!(signals[0].contract, "DLR/DEC25");
        assert!((signals[0].implied_rate_pct - 37.5).abs() < 1e-9);
        assert_eq!(
            result.lines(),
            vec!["LONG arbitrage: buy DLR/DEC25 at 1650, sell Blue (implied rate: 37.50%)"]
        );
    }

    #[test]
    fn short_signal_when_futures_cheap() {
        let engine = engine_at(days_before_dec25(90));
        let result = engine.evaluate(
            1500.0,
            "DLR/DEC25",
            &quotes(&[("MEP", 1600.0)]),
            &rates(&[("Caucion 7d", 40.0), ("Caucion 30d", 42.0)]),
        );
        let signals = result.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].direction, Direction::Short);
        assert!((signals[0].implied_rate_pct - (-25.0)).abs() < 1e-9);
        assert!(result.lines()[0].starts_with("SHORT arbitrage: sell DLR/DEC25 at 1500, buy MEP"));
    }

    #[test]
    fn signals_follow_quote_order_and_skip_band() {
        let engine = engine_at(days_before_dec25(90));
        // avg 41: LONG above 46, SHORT below 36.
        let result = engine.evaluate(
            1600.0,
            "DLR/DEC25",
            &quotes(&[
                ("CCL", 1400.0),   // implied 57.14 -> LONG
                ("Blue", 1450.0),  // implied 41.38 -> band
                ("MEP", 0.0),      // unavailable
                ("A3500", 1590.0), // implied 2.52 -> SHORT
            ]),
            &rates(&[("Caucion 7d", 40.0), ("Caucion 30d", 42.0)]),
        );
        let summary: Vec<(Direction, &str)> = result
            .signals()
            .iter()
            .map(|s| (s.direction, s.quote.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![(Direction::Long, "CCL"), (Direction::Short, "A3500")]
        );
        assert!((result.signals()[0].implied_rate_pct - 57.14).abs() < 1e-9);
    }

    #[test]
    fn zero_quotes_never_influence_output() {
        let engine = engine_at(days_before_dec25(30));
        let rs = rates(&[("Caucion 7d", 30.0)]);
        let with_zero = engine.evaluate(
            1650.0,
            "DLR/DEC25",
            &quotes(&[("Blue", 0.0), ("CCL", 1600.0), ("MEP", 0.0)]),
            &rs,
        );
        let without = engine.evaluate(1650.0, "DLR/DEC25", &quotes(&[("CCL", 1600.0)]), &rs);
        assert_eq!(with_zero, without);
        assert!(with_zero.signals().iter().all(|s| s.quote == "CCL"));
    }

    #[test]
    fn all_zero_inputs_yield_no_opportunities() {
        let engine = engine_at(days_before_dec25(30));
        let cfg = RuntimeConfig::default();
        let result = engine.evaluate(
            1600.0,
            "DLR/DEC25",
            &quotes(&[("Blue", 0.0), ("CCL", 0.0), ("MEP", 0.0), ("A3500", 0.0)]),
            &cfg.funding_rates.zeroed(),
        );
        assert_eq!(result, Evaluation::NoOpportunities);
    }

    #[test]
    fn expired_contract_is_not_evaluated() {
        let engine = engine_at(days_before_dec25(0));
        let result = engine.evaluate(
            9999.0,
            "DLR/DEC25",
            &quotes(&[("Blue", 1.0)]),
            &rates(&[("Caucion 7d", 40.0)]),
        );
        assert_eq!(result, Evaluation::Expired { days_to_expiry: 0 });
        assert!(!result.has_opportunities());
        assert!(result.lines().is_empty());

        let later = engine.evaluate_at(
            9999.0,
            "DLR/OCT25",
            &quotes(&[("Blue", 1.0)]),
            &rates(&[("Caucion 7d", 40.0)]),
            days_before_dec25(0),
        );
        assert_eq!(later, Evaluation::Expired { days_to_expiry: -61 });
    }

    #[test]
    fn empty_rates_yield_no_funding_data() {
        let engine = engine_at(days_before_dec25(30));
        let result = engine.evaluate(
            1650.0,
            "DLR/DEC25",
            &quotes(&[("Blue", 1600.0)]),
            &RateSet::new(),
        );
        assert_eq!(result, Evaluation::NoFundingData);
        assert_eq!(result.lines(), vec![NO_FUNDING_DATA_MSG]);
    }

    #[test]
    fn unknown_contract_uses_default_expiry() {
        let engine = engine_at(days_before_dec25(30));
        assert_eq!(engine.days_to_expiry("DLR/MAR27"), 30);
        let result = engine.evaluate(
            1650.0,
            "DLR/MAR27",
            &quotes(&[("Blue", 1600.0)]),
            &rates(&[("Caucion 7d", 30.0)]),
        );
        assert_eq!(result.signals().len(), 1);
        assert_eq!(result.signals()[0].contract, "DLR/MAR27");
    }

    #[test]
    fn evaluation_is_idempotent_with_fixed_clock() {
        let engine = engine_at(days_before_dec25(45));
        let qs = quotes(&[("Blue", 1500.0), ("CCL", 1580.0), ("MEP", 0.0)]);
        let rs = rates(&[("Caucion 7d", 40.0), ("Caucion 30d", 42.0)]);
        let a = engine.evaluate(1610.0, "DLR/DEC25", &qs, &rs);
        let b = engine.evaluate(1610.0, "DLR/DEC25", &qs, &rs);
        assert_eq!(a, b);
    }

    #[test]
    fn evaluation_serialises_with_outcome_tag() {
        let json = serde_json::to_value(Evaluation::Expired { days_to_expiry: -3 }).unwrap();
        assert_eq!(json["outcome"], "expired");
        assert_eq!(json["days_to_expiry"], -3);

        let json = serde_json::to_value(Evaluation::NoOpportunities).unwrap();
        assert_eq!(json["outcome"], "no_opportunities");
    }
}
